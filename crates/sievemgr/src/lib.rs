//! # sievemgr
//!
//! An async client library for the ManageSieve protocol as spoken by
//! Cyrus timsieved and compatible servers, for managing Sieve mail
//! filtering scripts remotely.
//!
//! ## Features
//!
//! - **Runtime state tracking**: Commands are checked against the
//!   session state before any bytes are written, so a mistake cannot
//!   desynchronize the connection
//! - **Full dialect support**: AUTHENTICATE (PLAIN and LOGIN),
//!   LISTSCRIPTS, GETSCRIPT, PUTSCRIPT, SETACTIVE, DELETESCRIPT,
//!   CAPABILITY, LOGOUT
//! - **Literal-aware framing**: Script bodies travel as raw byte
//!   literals and are never mistaken for OK/NO/BYE status lines
//! - **TLS via rustls**: Secure connections without OpenSSL dependency
//! - **Active-script caching**: One LISTSCRIPTS answers later
//!   active-script queries without another round trip
//!
//! ## Quick Start
//!
//! ```ignore
//! use sievemgr::{SessionConfig, SieveSession};
//!
//! #[tokio::main]
//! async fn main() -> sievemgr::Result<()> {
//!     let config = SessionConfig::builder("sieve.example.com")
//!         .credentials("user@example.com", "password")
//!         .build();
//!
//!     let mut session = SieveSession::connect(config).await?;
//!
//!     // List stored scripts
//!     for name in session.list_scripts().await? {
//!         println!("script: {name}");
//!     }
//!
//!     // Upload a script and make it the active one
//!     let script = "require [\"fileinto\"];\nif header :contains \"subject\" \"[spam]\" {\n    fileinto \"Junk\";\n}\n";
//!     session.install_script("spam-filter", script, true).await?;
//!
//!     if let Some(active) = session.get_active().await? {
//!         println!("active: {active}");
//!     }
//!
//!     session.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! The session tracks the protocol state at runtime and refuses
//! commands that are invalid where it currently stands:
//!
//! ```text
//! ┌─────────────────┐
//! │   Disconnected  │ ─── connect() ───→ Authorization
//! └─────────────────┘
//!          ▲
//!          │ logout() or fatal error
//!          │
//! ┌─────────────────┐
//! │  Authorization  │ ─── authenticate() ───→ Transaction
//! └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Transaction   │ ─── LISTSCRIPTS, GETSCRIPT, PUTSCRIPT,
//! └─────────────────┘     SETACTIVE, DELETESCRIPT, CAPABILITY, LOGOUT
//! ```
//!
//! A NO reply is an ordinary refusal and leaves the session where it
//! was; transport errors, BYE and timeouts return it to Disconnected.
//!
//! ## Modules
//!
//! - [`command`]: Command builders and wire serialization
//! - [`connection`]: Stream, framing, configuration and the session
//! - [`sasl`]: SASL mechanisms and response encoding
//! - [`types`]: Capabilities and session state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
mod parser;
pub mod sasl;
pub mod types;

pub use command::Command;
pub use connection::{
    FramedStream, Security, SessionConfig, SessionConfigBuilder, SieveSession, SieveStream,
    connect_plain, connect_tls, create_tls_connector,
};
pub use error::{Error, Result};
pub use sasl::Mechanism;
pub use types::{Capabilities, SessionState};

/// Default ManageSieve port, as used by timsieved deployments that
/// predate the registered port.
pub const DEFAULT_PORT: u16 = 2000;
