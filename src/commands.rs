//! NNTP command lines and the replies they accept

use crate::error::{NntpError, Result};
use crate::response::codes;
use std::fmt;

/// Longest command line a client may send, CRLF included (RFC 3977 §3.1)
pub const MAX_COMMAND_LINE: usize = 512;

/// One protocol request
///
/// Holds the line sent to the server (without CRLF) and the reply codes that
/// count as success. By default any 1xx or 2xx reply succeeds; other codes
/// fail the command with the error kind from
/// [`failure_kind`](crate::response::failure_kind).
///
/// # Example
///
/// ```
/// use nntp_engine::Command;
///
/// let cmd = Command::new("GROUP misc.test").unwrap().expecting(&[211]);
/// assert!(cmd.accepts(211));
/// assert!(!cmd.accepts(411));
/// assert_eq!(cmd.wire(), b"GROUP misc.test\r\n");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    line: String,
    expected: Option<Vec<u16>>,
    body_codes: Option<Vec<u16>>,
}

impl Command {
    /// Build a command from its line, without the CRLF terminator
    ///
    /// # Errors
    ///
    /// [`NntpError::InvalidData`] if the line is empty, contains CR, LF or NUL,
    /// or would exceed [`MAX_COMMAND_LINE`] on the wire.
    pub fn new(line: impl Into<String>) -> Result<Self> {
        let line = line.into();
        if line.trim().is_empty() {
            return Err(NntpError::invalid_data("empty command line"));
        }
        if line.contains(['\r', '\n', '\0']) {
            return Err(NntpError::invalid_data(
                "command line contains CR, LF or NUL",
            )
            .with_command(mask(&line)));
        }
        if line.len() + 2 > MAX_COMMAND_LINE {
            return Err(NntpError::invalid_data(format!(
                "command line is {} bytes, limit is {}",
                line.len() + 2,
                MAX_COMMAND_LINE
            ))
            .with_command(mask(&line)));
        }
        Ok(Self {
            line,
            expected: None,
            body_codes: None,
        })
    }

    /// Only count the given codes as success
    pub fn expecting(mut self, codes: &[u16]) -> Self {
        self.expected = Some(codes.to_vec());
        self
    }

    /// Replies with these codes carry a multi-line body for this command
    ///
    /// Replaces the default body table for this command only. LISTGROUP is
    /// the usual case: its 211 has a body while GROUP's 211 does not.
    pub fn with_body_codes(mut self, codes: &[u16]) -> Self {
        self.body_codes = Some(codes.to_vec());
        self
    }

    /// Whether a reply with `code` is followed by a dot-terminated body
    pub fn has_body(&self, code: u16) -> bool {
        match &self.body_codes {
            Some(codes) => codes.contains(&code),
            None => codes::has_multiline_body(code),
        }
    }

    /// Whether `code` completes this command successfully
    pub fn accepts(&self, code: u16) -> bool {
        match &self.expected {
            Some(codes) => codes.contains(&code),
            None => (100..300).contains(&code),
        }
    }

    /// The command line, without CRLF
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The command verb, upper-cased
    pub fn verb(&self) -> String {
        self.line
            .split_ascii_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    /// The line safe to log: the AUTHINFO PASS argument is replaced by `****`
    pub fn masked(&self) -> String {
        mask(&self.line)
    }

    /// Bytes to put on the wire, CRLF included
    pub fn wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.line.len() + 2);
        bytes.extend_from_slice(self.line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    /// Size of [`wire`](Self::wire) without building it
    pub fn wire_len(&self) -> usize {
        self.line.len() + 2
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("line", &self.masked())
            .field("expected", &self.expected)
            .field("body_codes", &self.body_codes)
            .finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

fn mask(line: &str) -> String {
    let mut words = line.split_ascii_whitespace();
    match (words.next(), words.next()) {
        (Some(verb), Some(sub))
            if verb.eq_ignore_ascii_case("AUTHINFO") && sub.eq_ignore_ascii_case("PASS") =>
        {
            format!("{verb} {sub} ****")
        }
        _ => line.to_string(),
    }
}

// Authentication and connection management commands

/// Build AUTHINFO USER command (RFC 4643 §2.3)
///
/// 281 means no password is needed, 381 asks for AUTHINFO PASS.
pub fn authinfo_user(username: &str) -> Result<Command> {
    Ok(Command::new(format!("AUTHINFO USER {username}"))?
        .expecting(&[codes::AUTH_ACCEPTED, codes::AUTH_CONTINUE]))
}

/// Build AUTHINFO PASS command (RFC 4643 §2.3)
pub fn authinfo_pass(password: &str) -> Result<Command> {
    Ok(Command::new(format!("AUTHINFO PASS {password}"))?.expecting(&[codes::AUTH_ACCEPTED]))
}

/// Build QUIT command
pub fn quit() -> Command {
    fixed("QUIT", &[codes::CLOSING_CONNECTION])
}

/// Build MODE READER command
pub fn mode_reader() -> Command {
    fixed(
        "MODE READER",
        &[codes::READY_POSTING_ALLOWED, codes::READY_NO_POSTING],
    )
}

/// Build CAPABILITIES command (RFC 3977 §5.2)
pub fn capabilities() -> Command {
    fixed("CAPABILITIES", &[codes::CAPABILITY_LIST])
}

/// Build DATE command (RFC 3977 §7.1)
pub fn date() -> Command {
    fixed("DATE", &[codes::SERVER_DATE])
}

/// Build HELP command
pub fn help() -> Command {
    fixed("HELP", &[codes::HELP_TEXT_FOLLOWS])
}

/// Build LISTGROUP command (RFC 3977 §6.1.2)
///
/// The 211 reply is followed by the article numbers, one per line.
pub fn listgroup(group: &str) -> Result<Command> {
    Ok(Command::new(format!("LISTGROUP {group}"))?
        .expecting(&[codes::GROUP_SELECTED])
        .with_body_codes(&[codes::GROUP_SELECTED]))
}

fn fixed(line: &str, expected: &[u16]) -> Command {
    Command {
        line: line.to_string(),
        expected: Some(expected.to_vec()),
        body_codes: None,
    }
}
