use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use rand::Rng;
use tracing::debug;

use crate::command::{is_body_terminator, unstuff, Command};
use crate::error::SmtpError;
use crate::logging::escape_untrusted;
use crate::reply::Reply;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Unique per-connection identifier, also the name of the first stored message.
///
/// Combines a local timestamp, a process-wide counter and a random suffix, so
/// two sessions opened in the same second never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let seq = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen();
        Self(format!(
            "{}_{:06}_{:08x}",
            Local::now().format("%Y%m%d_%H%M%S"),
            seq,
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitGreeting,
    Ready,
    ReceivingData,
    Closed,
}

/// A completed message body, ready to be handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub body: Vec<u8>,
}

/// What the connection has to do after a line was processed.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Body line absorbed, nothing to send.
    None,
    Reply(Reply),
    /// Send the reply, then upgrade the transport and call [`Session::mark_secure`].
    StartTls(Reply),
    /// Persist the message, then answer with `250` or `451`.
    Deliver(Message),
    /// Send the reply, then close the connection.
    Close(Reply),
}

pub struct Session {
    id: SessionId,
    client_domain: Option<String>,
    sender: Option<String>,
    recipients: Vec<String>,
    greeted: bool,
    secure: bool,
    state: State,
    body: Option<Vec<u8>>,
    body_too_large: bool,
    // MAIL/RCPT seen before the transport was secured
    cleartext_transaction: bool,
    starttls_available: bool,
    max_message_size: usize,
    delivered: u32,
}

impl Session {
    pub fn new(starttls_available: bool, max_message_size: usize) -> Self {
        Self {
            id: SessionId::generate(),
            client_domain: None,
            sender: None,
            recipients: Vec::new(),
            greeted: false,
            secure: false,
            state: State::AwaitGreeting,
            body: None,
            body_too_large: false,
            cleartext_transaction: false,
            starttls_available,
            max_message_size,
            delivered: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    pub fn is_greeted(&self) -> bool {
        self.greeted
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Records that the transport is now encrypted. Never reverts.
    pub fn mark_secure(&mut self) {
        self.secure = true;
        self.reset_transaction();
    }

    /// Feeds one framed line (terminator already stripped) into the session.
    pub fn handle_line(&mut self, line: &[u8]) -> Action {
        match self.state {
            State::ReceivingData => self.receive_body_line(line),
            State::Closed => Action::None,
            State::AwaitGreeting | State::Ready => {
                let command = Command::parse(line);
                self.execute(&command)
                    .unwrap_or_else(|err| Action::Reply(Reply::from(&err)))
            }
        }
    }

    fn execute(&mut self, command: &Command) -> Result<Action, SmtpError> {
        let verb = command.verb.as_str();
        if !self.greeted && verb != "HELO" && verb != "EHLO" {
            return Err(SmtpError::NotGreeted);
        }

        match verb {
            "HELO" | "EHLO" => {
                self.client_domain = Some(command.argument.clone()).filter(|d| !d.is_empty());
                self.greeted = true;
                self.reset_transaction();
                self.state = State::Ready;
                if verb == "EHLO" {
                    Ok(Action::Reply(Reply::ehlo(self.can_starttls())))
                } else {
                    Ok(Action::Reply(Reply::ok()))
                }
            }

            "NOOP" => Ok(Action::Reply(Reply::ok())),

            "RSET" => {
                self.reset_transaction();
                Ok(Action::Reply(Reply::ok()))
            }

            "MAIL" => {
                let sender = command.path("FROM").ok_or(SmtpError::Syntax)?;
                debug!("MAIL FROM {}", escape_untrusted(sender));
                self.sender = Some(sender.to_string());
                self.cleartext_transaction |= !self.secure;
                Ok(Action::Reply(Reply::ok()))
            }

            "RCPT" => {
                if self.sender.is_none() {
                    return Err(SmtpError::BadSequence);
                }
                let recipient = command.path("TO").ok_or(SmtpError::Syntax)?;
                debug!("RCPT TO {}", escape_untrusted(recipient));
                self.recipients.push(recipient.to_string());
                self.cleartext_transaction |= !self.secure;
                Ok(Action::Reply(Reply::ok()))
            }

            "DATA" => {
                if self.sender.is_none() || self.recipients.is_empty() {
                    return Err(SmtpError::BadSequence);
                }
                self.body = Some(Vec::new());
                self.body_too_large = false;
                self.state = State::ReceivingData;
                Ok(Action::Reply(Reply::start_data()))
            }

            "STARTTLS" => {
                if !self.starttls_available {
                    return Err(SmtpError::TlsUnavailable);
                }
                if self.secure || self.cleartext_transaction {
                    return Err(SmtpError::BadSequence);
                }
                Ok(Action::StartTls(Reply::ready_for_tls()))
            }

            "QUIT" => {
                self.state = State::Closed;
                Ok(Action::Close(Reply::bye()))
            }

            _ => Err(SmtpError::Unrecognized),
        }
    }

    fn receive_body_line(&mut self, line: &[u8]) -> Action {
        if is_body_terminator(line) {
            return self.finish_body();
        }

        let Some(body) = self.body.as_mut() else {
            return Action::None;
        };
        if self.body_too_large {
            return Action::None;
        }

        let line = unstuff(line);
        if body.len() + line.len() + 2 > self.max_message_size {
            self.body_too_large = true;
            body.clear();
            return Action::None;
        }
        body.extend_from_slice(line);
        body.extend_from_slice(b"\r\n");
        Action::None
    }

    fn finish_body(&mut self) -> Action {
        let body = self.body.take().unwrap_or_default();
        let sender = self.sender.take().unwrap_or_default();
        let recipients = mem::take(&mut self.recipients);
        self.state = State::Ready;

        if mem::take(&mut self.body_too_large) {
            return Action::Reply(Reply::from(&SmtpError::MessageTooLarge {
                max: self.max_message_size,
            }));
        }

        self.delivered += 1;
        let id = if self.delivered == 1 {
            self.id.to_string()
        } else {
            format!("{}-{}", self.id, self.delivered)
        };

        Action::Deliver(Message {
            id,
            sender,
            recipients,
            body,
        })
    }

    fn can_starttls(&self) -> bool {
        self.starttls_available && !self.secure
    }

    fn reset_transaction(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }
}
