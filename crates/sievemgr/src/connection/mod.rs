//! ManageSieve connection management.
//!
//! This module provides connection handling for ManageSieve servers,
//! including:
//! - Configuration (host, port, security mode, credentials, limits)
//! - TLS/plaintext stream abstraction
//! - Framed I/O for the line-and-literal wire format
//! - High-level session with runtime state tracking

mod config;
mod framed;
mod session;
mod stream;

pub use config::{Security, SessionConfig, SessionConfigBuilder};
pub use framed::FramedStream;
pub use session::SieveSession;
pub use stream::{SieveStream, connect_plain, connect_tls, create_tls_connector};
