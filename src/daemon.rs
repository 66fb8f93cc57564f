use std::path::Path;

#[cfg(unix)]
pub fn daemonize(working_directory: &Path) -> anyhow::Result<()> {
    use daemonize::Daemonize;

    Daemonize::new()
        .pid_file("/tmp/smtp-intake.pid")
        .chown_pid_file(true)
        .working_directory(working_directory)
        .umask(0o027)
        .start()
        .map_err(|e| anyhow::anyhow!("Failed to start daemon mode: {}", e))
}

#[cfg(not(unix))]
pub fn daemonize(_working_directory: &Path) -> anyhow::Result<()> {
    anyhow::bail!("Daemon mode is only supported on unix")
}
