//! NNTP reply types, status codes and the code → behavior tables

use crate::error::{ErrorKind, NntpError, Result};

/// NNTP reply with status code, message, and optional multi-line body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit status code
    pub code: u16,
    /// Text after the code on the status line
    pub message: String,
    /// Multi-line body with dot-stuffing removed (empty for single-line replies)
    pub lines: Vec<String>,
}

impl Reply {
    /// Parse a status line (`<code> <message>`) into a body-less reply
    ///
    /// # Errors
    ///
    /// [`NntpError::InvalidData`] when the line does not start with exactly
    /// three ASCII digits.
    pub fn parse_status_line(line: &str) -> Result<Self> {
        // Strip UTF-8 BOM if present (some broken servers/proxies add it)
        let line = line.trim_start_matches('\u{FEFF}');

        let bytes = line.as_bytes();
        if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(malformed(line));
        }

        // Catches "99999" being parsed as "999" with message "99"
        if bytes.len() > 3 && bytes[3].is_ascii_digit() {
            return Err(malformed(line));
        }

        let code = line[..3].parse::<u16>().map_err(|_| malformed(line))?;

        let message = match bytes.get(3) {
            Some(b' ') => line[4..].to_string(),
            Some(_) => line[3..].to_string(),
            None => String::new(),
        };

        Ok(Reply {
            code,
            message,
            lines: Vec::new(),
        })
    }

    /// The status line as it would appear on the wire, without CRLF
    pub fn status_line(&self) -> String {
        if self.message.is_empty() {
            self.code.to_string()
        } else {
            format!("{} {}", self.code, self.message)
        }
    }

    /// Class of the reply, from its first digit
    pub fn class(&self) -> ReplyClass {
        ReplyClass::of(self.code)
    }

    /// 1xx
    pub fn is_informational(&self) -> bool {
        self.class() == ReplyClass::Informational
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        self.class() == ReplyClass::Success
    }

    /// 3xx
    pub fn is_continuation(&self) -> bool {
        self.class() == ReplyClass::Continuation
    }

    /// 4xx or 5xx
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    /// Whether a dot-terminated body follows this status line, by the
    /// default table
    ///
    /// A command can override the table with
    /// [`Command::with_body_codes`](crate::Command::with_body_codes).
    pub fn has_body(&self) -> bool {
        codes::has_multiline_body(self.code)
    }
}

fn malformed(line: &str) -> NntpError {
    NntpError::invalid_data(format!(
        "malformed status line: {}",
        line.chars().take(100).collect::<String>()
    ))
    .with_reply_line(line)
}

/// Reply class, the first digit of the status code (RFC 3977 §3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Continuation,
    /// 4xx
    TransientFailure,
    /// 5xx
    PermanentFailure,
    /// anything else
    Unknown,
}

impl ReplyClass {
    /// Class of a status code
    pub fn of(code: u16) -> Self {
        match code / 100 {
            1 => ReplyClass::Informational,
            2 => ReplyClass::Success,
            3 => ReplyClass::Continuation,
            4 => ReplyClass::TransientFailure,
            5 => ReplyClass::PermanentFailure,
            _ => ReplyClass::Unknown,
        }
    }
}

/// Error a command fails with when the server answers `code` and the command
/// did not accept it
pub fn failure_kind(code: u16) -> ErrorKind {
    match (code, ReplyClass::of(code)) {
        (
            codes::COMMAND_NOT_RECOGNIZED
            | codes::COMMAND_SYNTAX_ERROR
            | codes::FEATURE_NOT_SUPPORTED,
            _,
        ) => ErrorKind::UnsupportedCommand,
        (_, ReplyClass::TransientFailure) => ErrorKind::Temporary,
        (_, ReplyClass::PermanentFailure) => ErrorKind::Permanent,
        _ => ErrorKind::UnexpectedResponse,
    }
}

/// Strip NNTP byte-stuffing from a body line (leading ".." becomes ".")
pub fn unescape_body_line(line: &str) -> &str {
    match line.strip_prefix('.') {
        Some(rest) if rest.starts_with('.') => rest,
        _ => line,
    }
}

/// NNTP response codes (RFC 3977, RFC 4643)
pub mod codes {
    // 1xx
    /// HELP text (§7.2)
    pub const HELP_TEXT_FOLLOWS: u16 = 100;
    /// CAPABILITIES list (§5.2)
    pub const CAPABILITY_LIST: u16 = 101;
    /// DATE reply (§7.1)
    pub const SERVER_DATE: u16 = 111;

    // 2xx
    /// Greeting: service available, posting allowed
    pub const READY_POSTING_ALLOWED: u16 = 200;
    /// Greeting: service available, posting prohibited
    pub const READY_NO_POSTING: u16 = 201;
    /// QUIT acknowledged
    pub const CLOSING_CONNECTION: u16 = 205;
    /// GROUP selected
    pub const GROUP_SELECTED: u16 = 211;
    /// LIST information (§7.6)
    pub const LIST_INFORMATION_FOLLOWS: u16 = 215;
    /// ARTICLE
    pub const ARTICLE_FOLLOWS: u16 = 220;
    /// HEAD
    pub const HEAD_FOLLOWS: u16 = 221;
    /// BODY
    pub const BODY_FOLLOWS: u16 = 222;
    /// STAT
    pub const ARTICLE_STAT: u16 = 223;
    /// OVER
    pub const OVERVIEW_INFO_FOLLOWS: u16 = 224;
    /// HDR
    pub const HEADERS_FOLLOW: u16 = 225;
    /// NEWNEWS (§7.4)
    pub const NEW_ARTICLE_LIST_FOLLOWS: u16 = 230;
    /// NEWGROUPS (§7.3)
    pub const NEW_NEWSGROUPS_FOLLOW: u16 = 231;
    /// Authentication accepted
    pub const AUTH_ACCEPTED: u16 = 281;

    // 3xx
    /// Continue with authentication
    pub const AUTH_CONTINUE: u16 = 381;

    // 4xx
    /// Service temporarily unavailable
    pub const SERVICE_UNAVAILABLE: u16 = 400;
    /// Authentication required (RFC 4643)
    pub const AUTH_REQUIRED: u16 = 480;
    /// Authentication rejected
    pub const AUTH_REJECTED: u16 = 481;
    /// Authentication out of sequence
    pub const AUTH_OUT_OF_SEQUENCE: u16 = 482;
    /// Encryption or authentication required (RFC 4643)
    pub const ENCRYPTION_REQUIRED: u16 = 483;

    // 5xx
    /// Command not recognized
    pub const COMMAND_NOT_RECOGNIZED: u16 = 500;
    /// Command syntax error
    pub const COMMAND_SYNTAX_ERROR: u16 = 501;
    /// Access denied / command unavailable
    pub const ACCESS_DENIED: u16 = 502;
    /// Feature not supported / optional functionality absent (RFC 3977)
    pub const FEATURE_NOT_SUPPORTED: u16 = 503;

    /// Codes followed by a dot-terminated body (RFC 3977 §3.2)
    const MULTILINE: [u16; 10] = [
        HELP_TEXT_FOLLOWS,
        CAPABILITY_LIST,
        LIST_INFORMATION_FOLLOWS,
        ARTICLE_FOLLOWS,
        HEAD_FOLLOWS,
        BODY_FOLLOWS,
        OVERVIEW_INFO_FOLLOWS,
        HEADERS_FOLLOW,
        NEW_ARTICLE_LIST_FOLLOWS,
        NEW_NEWSGROUPS_FOLLOW,
    ];

    /// Whether replies with this code carry a multi-line body
    pub fn has_multiline_body(code: u16) -> bool {
        MULTILINE.contains(&code)
    }
}
