//! High-level ManageSieve session.
//!
//! This module provides `SieveSession`, which owns the framed stream and
//! tracks the protocol state at runtime. A command issued in the wrong
//! state fails before any bytes reach the wire, so the connection never
//! desynchronizes over a local mistake.
//!
//! ## Design
//!
//! A failed command does not necessarily end the session: a NO reply
//! leaves the connection synchronized and the session usable. Transport
//! errors, BYE, timeouts and framing violations do end it; the stream
//! position cannot be trusted after any of them.
//!
//! ## Example
//!
//! ```ignore
//! use sievemgr::{SessionConfig, SieveSession};
//!
//! let config = SessionConfig::builder("sieve.example.com")
//!     .credentials("user", "password")
//!     .build();
//!
//! let mut session = SieveSession::connect(config).await?;
//!
//! for name in session.list_scripts().await? {
//!     println!("{name}");
//! }
//! session.install_script("vacation", "keep;", true).await?;
//! session.logout().await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::config::{Security, SessionConfig};
use super::framed::FramedStream;
use super::stream::{SieveStream, connect_plain, connect_tls};
use crate::command::{Command, validate_script_name};
use crate::parser::{self, StatusLine};
use crate::sasl::{self, Mechanism};
use crate::types::{Capabilities, SessionState};
use crate::{Error, Result};

/// Outcome of one step of a multi-step SASL exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaslStep {
    /// The server sent a challenge and expects another response.
    Challenge,
    /// The server completed the exchange with OK.
    Done,
}

/// A ManageSieve session over a plaintext or TLS stream.
///
/// Generic over the transport so tests can drive it with in-memory
/// streams; production code uses [`SieveSession::connect`], which yields
/// a session over [`SieveStream`].
pub struct SieveSession<S> {
    stream: Option<FramedStream<S>>,
    state: SessionState,
    config: SessionConfig,
    capabilities: Capabilities,
    /// Cached knowledge of the active script.
    ///
    /// `None` means unknown, `Some(None)` means known to have no active
    /// script, `Some(Some(name))` means `name` is known to be active.
    active_script: Option<Option<String>>,
}

impl SieveSession<SieveStream> {
    /// Connects to the configured server, consumes the greeting and
    /// authenticates, returning a session ready for script commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be opened, the greeting
    /// is not OK, no SASL mechanism is available, or authentication
    /// fails.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        tracing::info!(host = %config.host, port = config.port, "connecting");

        let dial = async {
            let stream = match config.security {
                Security::None => connect_plain(&config.host, config.port).await,
                Security::Implicit => connect_tls(&config.host, config.port).await,
            };
            stream.map_err(|err| {
                Error::Connection(format!(
                    "failed to connect to {}:{}: {err}",
                    config.host, config.port
                ))
            })
        };
        let stream = timed(config.connect_timeout, dial).await?;
        tracing::debug!(tls = stream.is_tls(), "transport established");

        let mut session = Self::from_stream(stream, config).await?;
        session.authenticate().await?;
        Ok(session)
    }
}

impl<S> SieveSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Builds a session over an already connected stream, reading the
    /// server greeting.
    ///
    /// On an OK greeting the announced capabilities are stored and the
    /// session enters the Authorization state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the greeting is NO or BYE, or if
    /// the server advertises no SASL mechanisms.
    pub async fn from_stream(stream: S, config: SessionConfig) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = timed(
            config.io_timeout,
            Self::read_response(&mut framed, config.max_response_size),
        )
        .await;

        let body = match greeting {
            Ok(body) => body,
            Err(Error::No(message)) | Err(Error::Bye { message, .. }) => {
                return Err(Error::Connection(format!(
                    "server refused session: {message}"
                )));
            }
            Err(err) => return Err(err),
        };

        let capabilities = Capabilities::parse(&body);
        if capabilities.sasl.is_empty() {
            return Err(Error::Connection(
                "no authentication mechanisms available".to_string(),
            ));
        }

        tracing::debug!(
            implementation = capabilities.implementation.as_deref().unwrap_or(""),
            sasl = ?capabilities.sasl,
            "greeting received"
        );

        Ok(Self {
            stream: Some(framed),
            state: SessionState::Authorization,
            config,
            capabilities,
            active_script: None,
        })
    }

    /// Authenticates with the configured mechanism and credentials.
    ///
    /// The mechanism is checked against the server's SASL announcement
    /// and against this client's implemented set before anything is
    /// written. A NO reply (bad credentials) leaves the session in the
    /// Authorization state for another attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Authorization state,
    /// [`Error::UnsupportedMechanism`] or [`Error::UnsupportedByClient`]
    /// for mechanism mismatches, and [`Error::No`] when the server
    /// rejects the credentials.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.require_state(SessionState::Authorization)?;

        let requested = self.config.mechanism.clone();
        if !self.capabilities.supports_sasl(&requested) {
            return Err(Error::UnsupportedMechanism(requested));
        }
        let Some(mechanism) = Mechanism::from_name(&requested) else {
            return Err(Error::UnsupportedByClient(requested));
        };

        tracing::debug!(mechanism = %mechanism, user = %self.config.user, "authenticating");

        match mechanism {
            Mechanism::Plain => {
                let initial = sasl::plain_response(
                    &self.config.authzid,
                    &self.config.user,
                    &self.config.password,
                );
                self.exchange(&Command::Authenticate {
                    mechanism,
                    initial_response: Some(initial),
                })
                .await?;
            }
            Mechanism::Login => {
                let user = sasl::login_response(&self.config.user);
                let password = sasl::login_response(&self.config.password);

                let step = self
                    .sasl_step(&Command::Authenticate {
                        mechanism,
                        initial_response: None,
                    })
                    .await?;
                if step == SaslStep::Challenge {
                    let step = self.sasl_step(&Command::SaslResponse { data: user }).await?;
                    if step == SaslStep::Challenge {
                        self.exchange(&Command::SaslResponse { data: password })
                            .await?;
                    }
                }
            }
        }

        self.state = SessionState::Transaction;
        tracing::info!(user = %self.config.user, "authenticated");
        Ok(())
    }

    /// Lists the stored scripts, in server order.
    ///
    /// Also refreshes the active-script cache: after a successful call
    /// the session knows exactly which script is active, including the
    /// case where none is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state, or
    /// the server's refusal.
    pub async fn list_scripts(&mut self) -> Result<Vec<String>> {
        self.require_state(SessionState::Transaction)?;

        let body = self.exchange(&Command::ListScripts).await?;

        let mut scripts = Vec::new();
        let mut active = None;
        for line in body.lines() {
            if let Some((name, is_active)) = parser::parse_list_line(line) {
                if is_active {
                    active = Some(name.clone());
                }
                scripts.push(name);
            }
        }

        self.active_script = Some(active);
        tracing::debug!(count = scripts.len(), "listed scripts");
        Ok(scripts)
    }

    /// Returns the name of the active script, or `None` if no script is
    /// active.
    ///
    /// Served from the session's cache when a previous LISTSCRIPTS or
    /// SETACTIVE already established the answer; otherwise one
    /// LISTSCRIPTS round trip is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state, or
    /// the server's refusal.
    pub async fn get_active(&mut self) -> Result<Option<String>> {
        self.require_state(SessionState::Transaction)?;

        if let Some(cached) = &self.active_script {
            return Ok(cached.clone());
        }

        self.list_scripts().await?;
        Ok(self.active_script.clone().unwrap_or(None))
    }

    /// Fetches the source of the named script.
    ///
    /// The literal marker announcing the script body is stripped, as is
    /// trailing whitespace added by the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state,
    /// [`Error::InvalidScriptName`] for names that cannot be sent, and
    /// [`Error::No`] if the script does not exist.
    pub async fn get_script(&mut self, name: &str) -> Result<String> {
        self.require_state(SessionState::Transaction)?;
        validate_script_name(name)?;

        let body = self
            .exchange(&Command::GetScript {
                name: name.to_string(),
            })
            .await?;

        Ok(parser::strip_literal_prefix(&body).trim_end().to_string())
    }

    /// Uploads a script, optionally activating it.
    ///
    /// Upload and activation are separate commands: if the upload
    /// succeeds and the activation is refused, the script stays
    /// installed but inactive, and the returned error comes from the
    /// activation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state,
    /// [`Error::InvalidScriptName`] for names that cannot be sent, and
    /// [`Error::No`] if the server rejects the script, for instance when
    /// it does not parse.
    pub async fn install_script(
        &mut self,
        name: &str,
        script: &str,
        make_active: bool,
    ) -> Result<()> {
        self.require_state(SessionState::Transaction)?;
        validate_script_name(name)?;

        self.exchange(&Command::PutScript {
            name: name.to_string(),
            script: script.to_string(),
        })
        .await?;
        tracing::info!(script = %name, bytes = script.len(), "installed script");

        if make_active {
            self.set_active(name).await?;
        }
        Ok(())
    }

    /// Marks the named script active. An empty name deactivates all
    /// filtering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state,
    /// [`Error::InvalidScriptName`] for names that cannot be sent, and
    /// [`Error::No`] if the script does not exist.
    pub async fn set_active(&mut self, name: &str) -> Result<()> {
        self.require_state(SessionState::Transaction)?;
        validate_script_name(name)?;

        self.exchange(&Command::SetActive {
            name: name.to_string(),
        })
        .await?;

        if name.is_empty() {
            self.active_script = Some(None);
            tracing::info!("deactivated filtering");
        } else {
            self.active_script = Some(Some(name.to_string()));
            tracing::info!(script = %name, "activated script");
        }
        Ok(())
    }

    /// Deletes the named script.
    ///
    /// Servers refuse to delete the active script; deactivate it first
    /// with [`SieveSession::set_active`] and an empty name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state,
    /// [`Error::InvalidScriptName`] for names that cannot be sent, and
    /// [`Error::No`] if the script does not exist or is active.
    pub async fn remove_script(&mut self, name: &str) -> Result<()> {
        self.require_state(SessionState::Transaction)?;
        validate_script_name(name)?;

        self.exchange(&Command::DeleteScript {
            name: name.to_string(),
        })
        .await?;

        // If the server deleted what we believed was the active script,
        // the cached answer is no longer trustworthy.
        if self
            .active_script
            .as_ref()
            .is_some_and(|active| active.as_deref() == Some(name))
        {
            self.active_script = None;
        }

        tracing::info!(script = %name, "removed script");
        Ok(())
    }

    /// Requests a fresh capability announcement and replaces the stored
    /// one wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state, or
    /// the server's refusal.
    pub async fn capability(&mut self) -> Result<Capabilities> {
        self.require_state(SessionState::Transaction)?;

        let body = self.exchange(&Command::Capability).await?;
        self.capabilities = Capabilities::parse(&body);
        Ok(self.capabilities.clone())
    }

    /// Ends the session with LOGOUT and drops the connection.
    ///
    /// The session is Disconnected afterwards whether or not the server
    /// acknowledged cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the Transaction state, or
    /// the failure that prevented a clean goodbye.
    pub async fn logout(&mut self) -> Result<()> {
        self.require_state(SessionState::Transaction)?;

        let result = self.exchange(&Command::Logout).await;

        self.stream = None;
        self.state = SessionState::Disconnected;
        self.active_script = None;

        if result.is_ok() {
            tracing::info!("logged out");
        }
        result.map(|_| ())
    }

    /// Returns the capabilities announced in the greeting, or by the
    /// most recent [`SieveSession::capability`] call.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if a transport is attached.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Returns true if authentication has completed.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    // === Private helpers ===

    /// Fails with [`Error::InvalidState`] unless the session is in the
    /// expected state. Nothing is written in the failure case.
    fn require_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("not in {expected} state")))
        }
    }

    /// Drops the connection after an error that leaves the stream
    /// position unknown.
    fn poison(&mut self, err: &Error) {
        tracing::warn!(error = %err, "closing session after fatal error");
        self.stream = None;
        self.state = SessionState::Disconnected;
        self.active_script = None;
    }

    /// Writes one command and reads its complete response, applying the
    /// session's failure policy: NO keeps the session alive, every other
    /// error poisons it.
    async fn exchange(&mut self, cmd: &Command) -> Result<String> {
        let outcome = self.try_exchange(cmd).await;
        if let Err(err) = &outcome {
            if !matches!(err, Error::No(_)) {
                self.poison(err);
            }
        }
        outcome
    }

    async fn try_exchange(&mut self, cmd: &Command) -> Result<String> {
        let io_timeout = self.config.io_timeout;
        let max_size = self.config.max_response_size;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("not connected".to_string()))?;

        tracing::debug!(command = cmd.name(), "sending command");
        timed(io_timeout, stream.write_command(&cmd.serialize())).await?;
        timed(io_timeout, Self::read_response(stream, max_size)).await
    }

    /// Writes one step of a SASL exchange and reads the server's
    /// reaction, with the same failure policy as [`Self::exchange`].
    async fn sasl_step(&mut self, cmd: &Command) -> Result<SaslStep> {
        let outcome = self.try_sasl_step(cmd).await;
        if let Err(err) = &outcome {
            if !matches!(err, Error::No(_)) {
                self.poison(err);
            }
        }
        outcome
    }

    async fn try_sasl_step(&mut self, cmd: &Command) -> Result<SaslStep> {
        let io_timeout = self.config.io_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("not connected".to_string()))?;

        tracing::debug!(command = cmd.name(), "sending command");
        timed(io_timeout, stream.write_command(&cmd.serialize())).await?;
        timed(io_timeout, Self::read_sasl_step(stream)).await
    }

    /// Reads one unit of a SASL exchange: either a server challenge or
    /// a terminating status line.
    async fn read_sasl_step(stream: &mut FramedStream<S>) -> Result<SaslStep> {
        let line = stream.read_line().await?;
        let text = std::str::from_utf8(&line).ok().map(str::trim_end);

        if let Some(status) = text.and_then(parser::parse_status) {
            return match status {
                StatusLine::Ok { .. } => Ok(SaslStep::Done),
                StatusLine::No { rest } => {
                    let message = Self::read_no_message(stream, rest).await?;
                    Err(Error::No(message.trim().to_string()))
                }
                StatusLine::Bye { rest } => Err(Self::bye_error(rest)),
            };
        }

        // A challenge. The bytes are discarded: the mechanisms this
        // client speaks have fixed prompts.
        if let Some(len) = text.and_then(parser::parse_literal_marker) {
            stream.read_literal(len).await?;
            stream.read_line().await?;
        }

        Ok(SaslStep::Challenge)
    }

    /// Reads response lines until a status line arrives.
    ///
    /// Body lines accumulate verbatim, including literal payloads
    /// announced by `{N}` markers; literal bytes are consumed raw and
    /// never examined for status words.
    async fn read_response(stream: &mut FramedStream<S>, max_size: usize) -> Result<String> {
        let mut body: Vec<u8> = Vec::new();

        loop {
            let line = stream.read_line().await?;
            let text = std::str::from_utf8(&line).ok().map(str::trim_end);

            if let Some(status) = text.and_then(parser::parse_status) {
                return match status {
                    StatusLine::Ok { .. } => String::from_utf8(body)
                        .map_err(|_| Error::Protocol("response body is not valid UTF-8".to_string())),
                    StatusLine::No { rest } => {
                        let mut message = Self::read_no_message(stream, rest).await?;
                        if !body.is_empty() {
                            message = format!("{}{message}", String::from_utf8_lossy(&body));
                        }
                        Err(Error::No(message.trim().to_string()))
                    }
                    StatusLine::Bye { rest } => Err(Self::bye_error(rest)),
                };
            }

            body.extend_from_slice(&line);

            if let Some(len) = text.and_then(parser::parse_literal_marker) {
                let literal = stream.read_literal(len).await?;
                body.extend_from_slice(&literal);
            }

            if body.len() > max_size {
                return Err(Error::Protocol("response too large".to_string()));
            }
        }
    }

    /// Builds the diagnostic for a NO status, folding in the literal
    /// continuation when the rest of the line announces one. CRLFs in
    /// the continuation are flattened to spaces.
    async fn read_no_message(stream: &mut FramedStream<S>, rest: &str) -> Result<String> {
        let mut message = parser::strip_trailing_marker(rest).to_string();

        if let Some(len) = parser::parse_literal_marker(rest) {
            let literal = stream.read_literal(len).await?;
            let continuation = String::from_utf8_lossy(&literal).replace("\r\n", " ");
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&continuation);
            // Consume the CRLF that terminates the status line after
            // its literal.
            stream.read_line().await?;
        }

        Ok(message)
    }

    fn bye_error(rest: &str) -> Error {
        let (referral, tail) = parser::parse_bye_referral(rest);
        Error::Bye {
            message: tail.to_string(),
            referral,
        }
    }
}

impl<S> std::fmt::Debug for SieveSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SieveSession")
            .field("host", &self.config.host)
            .field("state", &self.state)
            .field("active_script", &self.active_script)
            .finish_non_exhaustive()
    }
}

/// Runs a future against a deadline, mapping elapsed time to
/// [`Error::Timeout`].
async fn timed<T, F>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(duration)),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"\"IMPLEMENTATION\" \"Cyrus timsieved v2.2.12\"\r\n\
        \"SASL\" \"PLAIN LOGIN\"\r\n\
        \"SIEVE\" \"fileinto vacation\"\r\n\
        OK\r\n";

    fn config() -> SessionConfig {
        SessionConfig::builder("sieve.example.com")
            .credentials("joe", "sesame")
            .build()
    }

    #[tokio::test]
    async fn test_greeting_enters_authorization() {
        let mock = Builder::new().read(GREETING).build();
        let session = SieveSession::from_stream(mock, config()).await.unwrap();

        assert_eq!(session.state(), SessionState::Authorization);
        assert!(session.is_connected());
        assert!(!session.is_authenticated());
        assert_eq!(
            session.capabilities().implementation.as_deref(),
            Some("Cyrus timsieved v2.2.12")
        );
        assert!(session.capabilities().supports_sasl("PLAIN"));
        assert!(session.capabilities().has_extension("vacation"));
    }

    #[tokio::test]
    async fn test_greeting_no_is_connection_error() {
        let mock = Builder::new().read(b"NO \"Service unavailable\"\r\n").build();
        let err = SieveSession::from_stream(mock, config()).await.unwrap_err();

        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_greeting_without_sasl_is_connection_error() {
        let mock = Builder::new()
            .read(b"\"IMPLEMENTATION\" \"x\"\r\nOK\r\n")
            .build();
        let err = SieveSession::from_stream(mock, config()).await.unwrap_err();

        assert!(matches!(err, Error::Connection(_)));
        assert!(err.to_string().contains("no authentication mechanisms"));
    }

    #[tokio::test]
    async fn test_authenticate_plain() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        assert_eq!(session.state(), SessionState::Transaction);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_authenticate_login_three_steps() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"LOGIN\"\r\n")
            .read(b"{12}\r\nVXNlcm5hbWU6\r\n")
            .write(b"\"am9l\"\r\n")
            .read(b"{12}\r\nUGFzc3dvcmQ6\r\n")
            .write(b"\"c2VzYW1l\"\r\n")
            .read(b"OK\r\n")
            .build();

        let config = SessionConfig::builder("sieve.example.com")
            .credentials("joe", "sesame")
            .mechanism("LOGIN")
            .build();

        let mut session = SieveSession::from_stream(mock, config).await.unwrap();
        session.authenticate().await.unwrap();

        assert_eq!(session.state(), SessionState::Transaction);
    }

    #[tokio::test]
    async fn test_authenticate_rejected_keeps_authorization_state() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"NO \"Authentication failed\"\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        let err = session.authenticate().await.unwrap_err();

        assert!(matches!(err, Error::No(_)));
        assert_eq!(session.state(), SessionState::Authorization);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_authenticate_requires_authorization_state() {
        // The mock would panic if the second attempt wrote anything.
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(session.state(), SessionState::Transaction);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_authenticate_login_rejected_password_step() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"LOGIN\"\r\n")
            .read(b"{12}\r\nVXNlcm5hbWU6\r\n")
            .write(b"\"am9l\"\r\n")
            .read(b"{12}\r\nUGFzc3dvcmQ6\r\n")
            .write(b"\"c2VzYW1l\"\r\n")
            .read(b"NO \"Authentication failed\"\r\n")
            .build();

        let config = SessionConfig::builder("sieve.example.com")
            .credentials("joe", "sesame")
            .mechanism("LOGIN")
            .build();

        let mut session = SieveSession::from_stream(mock, config).await.unwrap();
        let err = session.authenticate().await.unwrap_err();

        assert!(matches!(err, Error::No(_)));
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_unadvertised_mechanism_writes_nothing() {
        // The mock would panic on any write.
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .build();

        let config = SessionConfig::builder("sieve.example.com")
            .credentials("joe", "sesame")
            .mechanism("DIGEST-MD5")
            .build();

        let mut session = SieveSession::from_stream(mock, config).await.unwrap();
        let err = session.authenticate().await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedMechanism(_)));
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_advertised_but_unimplemented_mechanism() {
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN CRAM-MD5\"\r\nOK\r\n")
            .build();

        let config = SessionConfig::builder("sieve.example.com")
            .credentials("joe", "sesame")
            .mechanism("CRAM-MD5")
            .build();

        let mut session = SieveSession::from_stream(mock, config).await.unwrap();
        let err = session.authenticate().await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedByClient(_)));
    }

    #[tokio::test]
    async fn test_script_command_requires_transaction_state() {
        let mock = Builder::new().read(GREETING).build();
        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();

        let err = session.list_scripts().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // Still usable: the refusal happened before any write.
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_logout_requires_transaction_state() {
        let mock = Builder::new().read(GREETING).build();
        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();

        let err = session.logout().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_list_scripts_and_active_cache() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"\"vacation\"\r\n\"main\" ACTIVE\r\nOK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let scripts = session.list_scripts().await.unwrap();
        assert_eq!(scripts, vec!["vacation", "main"]);

        // Cache hit: the mock has no further actions, so a round trip
        // here would panic.
        let active = session.get_active().await.unwrap();
        assert_eq!(active.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_get_active_none_is_cached_too() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"\"vacation\"\r\nOK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        assert_eq!(session.get_active().await.unwrap(), None);
        assert_eq!(session.get_active().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_script_strips_literal_marker() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"vacation\"\r\n")
            .read(b"{22}\r\nrequire [\"vacation\"];\n\r\nOK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let script = session.get_script("vacation").await.unwrap();
        assert_eq!(script, "require [\"vacation\"];");
    }

    #[tokio::test]
    async fn test_no_reply_keeps_session_usable() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"missing\"\r\n")
            .read(b"NO \"Script does not exist\"\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"OK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let err = session.get_script("missing").await.unwrap_err();
        assert!(matches!(err, Error::No(ref msg) if msg.contains("does not exist")));
        assert!(session.is_authenticated());

        assert_eq!(session.list_scripts().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_no_with_literal_continuation() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"PUTSCRIPT \"bad\" {8+}\r\nkeep ;;;\r\n")
            .read(b"NO {24+}\r\nscript errors:\r\nline 3 x\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let err = session
            .install_script("bad", "keep ;;;", false)
            .await
            .unwrap_err();

        match err {
            Error::No(msg) => assert_eq!(msg, "script errors: line 3 x"),
            other => panic!("expected NO, got {other:?}"),
        }
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_no_literal_count_covering_the_cr() {
        // Some servers count the CR of the final CRLF into the literal,
        // leaving a lone LF behind it.
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"bad\"\r\n")
            .read(b"NO {11+}\r\nBad script\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let err = session.get_script("bad").await.unwrap_err();
        match err {
            Error::No(msg) => assert_eq!(msg, "Bad script"),
            other => panic!("expected NO, got {other:?}"),
        }
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_bye_poisons_session() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"BYE (REFERRAL \"sieve://backend.example.com\") \"Try the backend\"\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let err = session.list_scripts().await.unwrap_err();
        match err {
            Error::Bye { referral, .. } => {
                assert_eq!(referral.as_deref(), Some("sieve://backend.example.com"));
            }
            other => panic!("expected BYE, got {other:?}"),
        }

        assert_eq!(session.state(), SessionState::Disconnected);
        let err = session.list_scripts().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_install_and_activate() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"PUTSCRIPT \"main\" {5+}\r\nkeep;\r\n")
            .read(b"OK\r\n")
            .write(b"SETACTIVE \"main\"\r\n")
            .read(b"OK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        session.install_script("main", "keep;", true).await.unwrap();
        assert_eq!(session.get_active().await.unwrap().as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_deactivate_with_empty_name() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"SETACTIVE \"\"\r\n")
            .read(b"OK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        session.set_active("").await.unwrap();
        assert_eq!(session.get_active().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_script_name_writes_nothing() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let err = session.get_script("bad\"name").await.unwrap_err();
        assert!(matches!(err, Error::InvalidScriptName(_)));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_capability_refresh_replaces() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"CAPABILITY\r\n")
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        let caps = session.capability().await.unwrap();
        assert_eq!(caps.sasl, vec!["PLAIN"]);
        // Wholesale replacement: keys absent from the refresh are gone.
        assert!(session.capabilities().implementation.is_none());
        assert!(session.capabilities().extensions.is_empty());
    }

    #[tokio::test]
    async fn test_logout() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n")
            .read(b"OK\r\n")
            .write(b"LOGOUT\r\n")
            .read(b"OK \"Logout completed\"\r\n")
            .build();

        let mut session = SieveSession::from_stream(mock, config()).await.unwrap();
        session.authenticate().await.unwrap();

        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_debug_omits_password() {
        let mock = Builder::new().read(GREETING).build();
        let session = SieveSession::from_stream(mock, config()).await.unwrap();

        let rendered = format!("{session:?}");
        assert!(rendered.contains("sieve.example.com"));
        assert!(!rendered.contains("sesame"));
    }
}
