//! Connection state types for the NNTP engine

use crate::response::codes;
use std::fmt;

/// Connection status
///
/// Exactly one value holds at any time; only the engine changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// No transport
    Disconnected,
    /// Transport being established, or waiting for the greeting
    Connecting,
    /// Greeting received, not yet classified
    Connected,
    /// The server wants AUTHINFO before serving commands
    NeedAuth,
    /// Ready for commands, posting allowed
    Ready,
    /// Ready for commands, posting not allowed
    ReadOnly,
    /// Failed; reconnect to continue
    Error,
}

impl Status {
    /// Whether queued commands may be written to the server
    pub fn can_send(self) -> bool {
        matches!(
            self,
            Status::Connected | Status::NeedAuth | Status::Ready | Status::ReadOnly
        )
    }

    /// Whether the engine accepts commands (possibly queuing them until the greeting)
    pub fn accepts_commands(self) -> bool {
        self == Status::Connecting || self.can_send()
    }

    /// Whether a new connection may be started
    pub fn can_connect(self) -> bool {
        matches!(self, Status::Disconnected | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Disconnected => "disconnected",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::NeedAuth => "need-auth",
            Status::Ready => "ready",
            Status::ReadOnly => "read-only",
            Status::Error => "error",
        };
        f.write_str(name)
    }
}

/// Lifecycle event delivered to the [`Delegate`](super::Delegate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The greeting granted access or asked for authentication
    Connected,
    /// The connection was closed (by the caller, by QUIT or by the server)
    Disconnected,
    /// AUTHINFO was accepted
    Authenticated,
    /// AUTHINFO was rejected; status is [`Status::Error`]
    AuthenticationFailed,
    /// The connection failed; status is [`Status::Error`]
    Error,
}

/// AUTHINFO progress on the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AuthState {
    /// Not authenticated, no exchange running
    Idle,
    /// AUTHINFO USER/PASS queued or in flight
    InProgress,
    /// Successfully authenticated
    Authenticated,
}

/// Status a greeting code leads to (RFC 3977 §5.1, RFC 4643 §2.2)
pub(super) fn greeting_status(code: u16) -> Status {
    match code {
        codes::READY_POSTING_ALLOWED => Status::Ready,
        codes::READY_NO_POSTING => Status::ReadOnly,
        codes::AUTH_REQUIRED | codes::ENCRYPTION_REQUIRED => Status::NeedAuth,
        _ => Status::Error,
    }
}

/// Status after successful authentication, given the greeting code
pub(super) fn authenticated_status(greeting: Option<u16>) -> Status {
    match greeting {
        Some(codes::READY_NO_POSTING) => Status::ReadOnly,
        _ => Status::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_table() {
        assert_eq!(greeting_status(200), Status::Ready);
        assert_eq!(greeting_status(201), Status::ReadOnly);
        assert_eq!(greeting_status(480), Status::NeedAuth);
        assert_eq!(greeting_status(483), Status::NeedAuth);
        assert_eq!(greeting_status(400), Status::Error);
        assert_eq!(greeting_status(502), Status::Error);
        assert_eq!(greeting_status(281), Status::Error);
    }

    #[test]
    fn test_authenticated_status() {
        assert_eq!(authenticated_status(Some(201)), Status::ReadOnly);
        assert_eq!(authenticated_status(Some(480)), Status::Ready);
        assert_eq!(authenticated_status(Some(200)), Status::Ready);
        assert_eq!(authenticated_status(None), Status::Ready);
    }

    #[test]
    fn test_sending_is_gated_by_status() {
        for status in [Status::Disconnected, Status::Connecting, Status::Error] {
            assert!(!status.can_send(), "{status}");
        }
        for status in [Status::Connected, Status::NeedAuth, Status::Ready, Status::ReadOnly] {
            assert!(status.can_send(), "{status}");
        }
        assert!(Status::Connecting.accepts_commands());
        assert!(!Status::Error.accepts_commands());
        assert!(Status::Error.can_connect());
        assert!(!Status::Ready.can_connect());
    }
}
