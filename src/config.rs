//! NNTP server and engine configuration

use crate::error::{NntpError, Result};

/// Default input buffer: the largest amount of unconsumed reply data held at once (256KB)
pub const DEFAULT_INPUT_BUFFER: usize = 256 * 1024;

/// Default output buffer: the largest amount of queued command text (64KB)
pub const DEFAULT_OUTPUT_BUFFER: usize = 64 * 1024;

/// Default longest accepted line, CRLF included (16KB)
pub const DEFAULT_MAX_LINE: usize = 16 * 1024;

/// Bounds of the buffered stream adapters
///
/// # Example
///
/// ```
/// use nntp_engine::BufferLimits;
///
/// let limits = BufferLimits {
///     max_line: 4096,
///     ..BufferLimits::default()
/// };
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BufferLimits {
    /// Maximum bytes buffered on the input side
    pub input: usize,
    /// Maximum bytes queued on the output side
    pub output: usize,
    /// Longest line accepted from the server, CRLF included
    pub max_line: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT_BUFFER,
            output: DEFAULT_OUTPUT_BUFFER,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

impl BufferLimits {
    /// Check the limits are usable
    ///
    /// # Errors
    ///
    /// [`NntpError::InvalidData`] if a limit is zero or a full line could not
    /// fit in the input buffer.
    pub fn validate(&self) -> Result<()> {
        if self.input == 0 || self.output == 0 || self.max_line < 3 {
            return Err(NntpError::invalid_data(format!(
                "buffer limits too small: {self:?}"
            )));
        }
        if self.max_line > self.input {
            return Err(NntpError::invalid_data(format!(
                "max line {} exceeds input buffer {}",
                self.max_line, self.input
            )));
        }
        Ok(())
    }
}

/// Where and how to reach a server
///
/// Credentials are not part of it: they are handed to
/// [`Nntp::authenticate`](crate::Nntp::authenticate) once the greeting asks
/// for them.
///
/// # Example
///
/// ```
/// use nntp_engine::{BufferLimits, ServerConfig};
///
/// let secure = ServerConfig::tls("news.example.com");
/// assert_eq!(secure.port, 563);
///
/// let local = ServerConfig {
///     host: "127.0.0.1".to_string(),
///     port: 1119,
///     tls: false,
///     allow_insecure_tls: false,
///     limits: BufferLimits::default(),
/// };
/// assert!(!local.tls);
/// ```
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Hostname or address literal
    pub host: String,

    /// TCP port; 119 is plain NNTP, 563 is NNTP over TLS
    pub port: u16,

    /// Wrap the connection in TLS
    #[cfg_attr(feature = "serde", serde(default = "default_tls"))]
    pub tls: bool,

    /// Skip certificate validation
    ///
    /// Any certificate is accepted, expired and self-signed ones included, so
    /// the connection can be intercepted. Meant for test servers only.
    #[cfg_attr(feature = "serde", serde(default))]
    pub allow_insecure_tls: bool,

    /// Buffer bounds for this connection
    #[cfg_attr(feature = "serde", serde(default))]
    pub limits: BufferLimits,
}

#[cfg(feature = "serde")]
fn default_tls() -> bool {
    true
}

impl ServerConfig {
    /// Configuration for `host:port`, with TLS when `tls` is set
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            allow_insecure_tls: false,
            limits: BufferLimits::default(),
        }
    }

    /// TLS on port 563
    pub fn tls(host: impl Into<String>) -> Self {
        Self::new(host, 563, true)
    }

    /// Plain TCP on port 119
    ///
    /// AUTHINFO PASS travels in clear text over such a connection.
    pub fn plain(host: impl Into<String>) -> Self {
        Self::new(host, 119, false)
    }

    /// TLS on port 563 without certificate validation
    pub fn tls_insecure(host: impl Into<String>) -> Self {
        Self {
            allow_insecure_tls: true,
            ..Self::tls(host)
        }
    }

    /// Replace the buffer limits
    pub fn with_limits(mut self, limits: BufferLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let cases = [
            (ServerConfig::new("h", 1119, false), 1119, false, false),
            (ServerConfig::tls("h"), 563, true, false),
            (ServerConfig::plain("h"), 119, false, false),
            (ServerConfig::tls_insecure("h"), 563, true, true),
        ];
        for (config, port, tls, insecure) in cases {
            assert_eq!(config.host, "h");
            assert_eq!((config.port, config.tls, config.allow_insecure_tls), (port, tls, insecure));
            assert_eq!(config.limits, BufferLimits::default());
        }
    }

    #[test]
    fn test_limits_validation() {
        assert!(BufferLimits::default().validate().is_ok());

        let limits = BufferLimits {
            input: 1024,
            output: 1024,
            max_line: 2048,
        };
        assert!(limits.validate().is_err());

        let limits = BufferLimits {
            output: 0,
            ..BufferLimits::default()
        };
        assert!(limits.validate().is_err());

        let limits = BufferLimits {
            max_line: 2,
            ..BufferLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_with_limits() {
        let limits = BufferLimits {
            input: 4096,
            output: 512,
            max_line: 1024,
        };
        let config = ServerConfig::plain("localhost").with_limits(limits);
        assert_eq!(config.limits, limits);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"host":"news.example.com","port":563}"#).unwrap();
        assert!(config.tls);
        assert!(!config.allow_insecure_tls);
        assert_eq!(config.limits, BufferLimits::default());

        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
