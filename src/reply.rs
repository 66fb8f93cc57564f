//! Server replies and their wire encoding.

use std::borrow::Cow;
use std::fmt;

use crate::error::SmtpError;

/// A reply code with one or more text lines.
///
/// Multi-line replies use `-` after the code on every line but the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<Cow<'static, str>>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn multiline(code: u16, lines: Vec<Cow<'static, str>>) -> Self {
        Self { code, lines }
    }

    pub fn greeting(hostname: &str, banner: &str) -> Self {
        Self::new(220, format!("{} {}", hostname, banner))
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn ehlo(starttls: bool) -> Self {
        if starttls {
            Self::multiline(250, vec!["Hello".into(), "STARTTLS".into()])
        } else {
            Self::new(250, "Hello")
        }
    }

    pub fn start_data() -> Self {
        Self::new(354, "Enter message, ending with \".\" on a line by itself")
    }

    pub fn ready_for_tls() -> Self {
        Self::new(220, "Ready to start TLS")
    }

    pub fn bye() -> Self {
        Self::new(221, "Bye")
    }

    pub fn local_error() -> Self {
        Self::new(451, "Requested action aborted: local error in processing")
    }

    pub fn idle_timeout(hostname: &str) -> Self {
        Self::new(421, format!("{} Idle timeout, closing connection", hostname))
    }

    pub fn too_many_connections() -> Self {
        Self::new(421, "Too many connections from your IP")
    }

    pub fn line_too_long() -> Self {
        Self::new(500, "Line too long")
    }

    pub fn is_positive(&self) -> bool {
        self.code < 400
    }
}

impl From<&SmtpError> for Reply {
    fn from(err: &SmtpError) -> Self {
        match err {
            SmtpError::NotGreeted => Reply::new(503, "HELO First"),
            SmtpError::BadSequence => Reply::new(503, "Bad sequence of commands"),
            SmtpError::Unrecognized => Reply::new(500, "Unknown command"),
            SmtpError::Syntax => Reply::new(501, "Syntax error in parameters"),
            SmtpError::TlsUnavailable => Reply::new(454, "TLS not available"),
            SmtpError::MessageTooLarge { .. } => Reply::new(552, "Too much mail data"),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{}{}{}\r\n", self.code, sep, line)?;
        }
        Ok(())
    }
}
