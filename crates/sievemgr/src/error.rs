//! Error types for the ManageSieve library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during ManageSieve operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Connection establishment failed: the transport could not be opened,
    /// the greeting was not OK, or the server advertised no SASL mechanisms.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Invalid session state for the requested operation. Raised before any
    /// bytes are written to the transport.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested SASL mechanism is not advertised by the server.
    #[error("Authentication mechanism {0} not supported by this server")]
    UnsupportedMechanism(String),

    /// Requested SASL mechanism is not implemented by this client.
    #[error("Authentication mechanism {0} not supported by this client")]
    UnsupportedByClient(String),

    /// Script name contains bytes that cannot be framed safely.
    #[error("Invalid script name: {0:?}")]
    InvalidScriptName(String),

    /// Server returned NO. The message is the server's diagnostic, with any
    /// literal continuation already folded in. The session stays usable.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server sent BYE (disconnecting). The session is no longer usable.
    #[error("Server sent BYE: {message}")]
    Bye {
        /// Text of the BYE line.
        message: String,
        /// Referral target from a `(REFERRAL "url")` response code, if the
        /// server supplied one. Reconnection is left to the caller.
        referral: Option<String>,
    },

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
