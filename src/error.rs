//! NNTP error types

use crate::client::ConnectionId;
use crate::response::Reply;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Flat error code of an [`NntpError`]
///
/// Every failure surfaced by the engine falls into exactly one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retryable failure (4xx reply, dropped connection, timeout)
    Temporary,
    /// Non-retryable failure (5xx reply, unrecoverable I/O error)
    Permanent,
    /// The server answered with a code the command did not expect
    UnexpectedResponse,
    /// Framing violation (line too long, unsolicited reply, out-of-sequence command)
    Protocol,
    /// Data that cannot be parsed (non-numeric status code, illegal command text)
    InvalidData,
    /// The server does not know or support the command (500, 501, 503)
    UnsupportedCommand,
    /// The command was discarded before a reply arrived
    Aborted,
    /// The server rejected the credentials
    AuthFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Temporary => "temporary error",
            ErrorKind::Permanent => "permanent error",
            ErrorKind::UnexpectedResponse => "unexpected response",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::InvalidData => "invalid data",
            ErrorKind::UnsupportedCommand => "unsupported command",
            ErrorKind::Aborted => "aborted",
            ErrorKind::AuthFailed => "authentication failed",
        };
        f.write_str(name)
    }
}

/// Where an error came from: the connection, the command and the raw reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Connection that produced the error
    pub connection: Option<ConnectionId>,
    /// Command line that was in flight (passwords are masked)
    pub command: Option<String>,
    /// Raw reply status line
    pub reply_line: Option<String>,
    /// Reply code
    pub reply_code: Option<u16>,
    /// Reply message (status line without the code)
    pub reply_message: Option<String>,
}

/// NNTP protocol and connection errors
#[derive(Error, Debug, Clone)]
pub enum NntpError {
    /// Retryable failure
    #[error("Temporary error: {message}")]
    Temporary {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
        /// Underlying I/O error, if any
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// Non-retryable failure
    #[error("Permanent error: {message}")]
    Permanent {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
        /// Underlying I/O error, if any
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// Reply code the command did not expect
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
    },

    /// Protocol framing violation
    #[error("Protocol error: {message}")]
    Protocol {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
    },

    /// Unparseable or illegal data
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
    },

    /// Command not supported by the server
    #[error("Unsupported command: {message}")]
    UnsupportedCommand {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
    },

    /// Command discarded before completion
    #[error("Aborted: {message}")]
    Aborted {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
    },

    /// Authentication rejected
    #[error("Authentication failed: {message}")]
    AuthFailed {
        /// Human readable description
        message: String,
        /// Origin of the error
        context: Box<ErrorContext>,
    },
}

macro_rules! constructor {
    ($(#[$doc:meta])* $name:ident => $variant:ident) => {
        $(#[$doc])*
        pub fn $name(message: impl Into<String>) -> Self {
            NntpError::$variant {
                message: message.into(),
                context: Box::default(),
            }
        }
    };
}

impl NntpError {
    /// Retryable failure without an I/O source
    pub fn temporary(message: impl Into<String>) -> Self {
        NntpError::Temporary {
            message: message.into(),
            context: Box::default(),
            source: None,
        }
    }

    /// Non-retryable failure without an I/O source
    pub fn permanent(message: impl Into<String>) -> Self {
        NntpError::Permanent {
            message: message.into(),
            context: Box::default(),
            source: None,
        }
    }

    constructor!(
        /// Reply code the command did not expect
        unexpected_response => UnexpectedResponse
    );
    constructor!(
        /// Protocol framing violation
        protocol => Protocol
    );
    constructor!(
        /// Unparseable or illegal data
        invalid_data => InvalidData
    );
    constructor!(
        /// Command not supported by the server
        unsupported_command => UnsupportedCommand
    );
    constructor!(
        /// Command discarded before completion
        aborted => Aborted
    );
    constructor!(
        /// Authentication rejected
        auth_failed => AuthFailed
    );

    /// Classify a transport failure
    ///
    /// Dropped, reset or timed-out connections are worth a reconnect and map to
    /// [`ErrorKind::Temporary`]; everything else is [`ErrorKind::Permanent`].
    pub fn from_io(err: io::Error) -> Self {
        use io::ErrorKind as Io;

        let kind = err.kind();
        let message = err.to_string();
        let source = Some(Arc::new(err));
        let context = Box::default();
        match kind {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::TimedOut
            | Io::Interrupted
            | Io::WouldBlock
            | Io::UnexpectedEof => NntpError::Temporary {
                message,
                context,
                source,
            },
            _ => NntpError::Permanent {
                message,
                context,
                source,
            },
        }
    }

    /// Build the error a failed reply maps to, with the reply recorded in the context
    pub fn from_reply(kind: ErrorKind, reply: &Reply) -> Self {
        let message = reply.status_line();
        let err = match kind {
            ErrorKind::Temporary => NntpError::temporary(message),
            ErrorKind::Permanent => NntpError::permanent(message),
            ErrorKind::UnexpectedResponse => NntpError::unexpected_response(message),
            ErrorKind::Protocol => NntpError::protocol(message),
            ErrorKind::InvalidData => NntpError::invalid_data(message),
            ErrorKind::UnsupportedCommand => NntpError::unsupported_command(message),
            ErrorKind::Aborted => NntpError::aborted(message),
            ErrorKind::AuthFailed => NntpError::auth_failed(message),
        };
        err.with_reply(reply)
    }

    /// Flat error code
    pub fn kind(&self) -> ErrorKind {
        match self {
            NntpError::Temporary { .. } => ErrorKind::Temporary,
            NntpError::Permanent { .. } => ErrorKind::Permanent,
            NntpError::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            NntpError::Protocol { .. } => ErrorKind::Protocol,
            NntpError::InvalidData { .. } => ErrorKind::InvalidData,
            NntpError::UnsupportedCommand { .. } => ErrorKind::UnsupportedCommand,
            NntpError::Aborted { .. } => ErrorKind::Aborted,
            NntpError::AuthFailed { .. } => ErrorKind::AuthFailed,
        }
    }

    /// Description without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            NntpError::Temporary { message, .. }
            | NntpError::Permanent { message, .. }
            | NntpError::UnexpectedResponse { message, .. }
            | NntpError::Protocol { message, .. }
            | NntpError::InvalidData { message, .. }
            | NntpError::UnsupportedCommand { message, .. }
            | NntpError::Aborted { message, .. }
            | NntpError::AuthFailed { message, .. } => message,
        }
    }

    /// Origin of the error
    pub fn context(&self) -> &ErrorContext {
        match self {
            NntpError::Temporary { context, .. }
            | NntpError::Permanent { context, .. }
            | NntpError::UnexpectedResponse { context, .. }
            | NntpError::Protocol { context, .. }
            | NntpError::InvalidData { context, .. }
            | NntpError::UnsupportedCommand { context, .. }
            | NntpError::Aborted { context, .. }
            | NntpError::AuthFailed { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            NntpError::Temporary { context, .. }
            | NntpError::Permanent { context, .. }
            | NntpError::UnexpectedResponse { context, .. }
            | NntpError::Protocol { context, .. }
            | NntpError::InvalidData { context, .. }
            | NntpError::UnsupportedCommand { context, .. }
            | NntpError::Aborted { context, .. }
            | NntpError::AuthFailed { context, .. } => context,
        }
    }

    /// Whether retrying on a fresh connection may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Temporary | ErrorKind::Aborted)
    }

    /// Record the originating connection (kept if already set)
    pub fn with_connection(mut self, connection: ConnectionId) -> Self {
        self.context_mut().connection.get_or_insert(connection);
        self
    }

    /// Record the command that was in flight
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.context_mut().command = Some(command.into());
        self
    }

    /// Record the raw reply line that triggered the error
    pub fn with_reply_line(mut self, line: impl Into<String>) -> Self {
        self.context_mut().reply_line = Some(line.into());
        self
    }

    /// Record a parsed reply
    pub fn with_reply(mut self, reply: &Reply) -> Self {
        let context = self.context_mut();
        context.reply_line = Some(reply.status_line());
        context.reply_code = Some(reply.code);
        context.reply_message = Some(reply.message.clone());
        self
    }
}

impl From<io::Error> for NntpError {
    fn from(err: io::Error) -> Self {
        NntpError::from_io(err)
    }
}

/// Result type alias using NntpError
pub type Result<T> = std::result::Result<T, NntpError>;
