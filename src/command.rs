/// One protocol command line split into its verb and argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Upper-cased verb, e.g. `MAIL`.
    pub verb: String,
    /// Everything after the first whitespace run, trimmed. Empty if absent.
    pub argument: String,
}

impl Command {
    pub fn parse(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        let (verb, argument) = match text.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (text, ""),
        };

        Self {
            verb: verb.to_ascii_uppercase(),
            argument: argument.to_string(),
        }
    }

    /// Returns the path of a `MAIL FROM:` / `RCPT TO:` style argument.
    ///
    /// `keyword` is matched case-insensitively against the text before the
    /// first colon; the returned path is the trimmed text after it.
    pub fn path(&self, keyword: &str) -> Option<&str> {
        let (head, path) = self.argument.split_once(':')?;
        if !head.trim().eq_ignore_ascii_case(keyword) {
            return None;
        }
        Some(path.trim())
    }
}

/// True for the line that ends a message body.
pub fn is_body_terminator(line: &[u8]) -> bool {
    line == b"."
}

/// Removes the escaping dot from a body line that starts with `..`.
pub fn unstuff(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") {
        &line[1..]
    } else {
        line
    }
}
