//! Session configuration types.

use std::time::Duration;

/// Connection security mode.
///
/// The dialect predates STARTTLS upgrades, so the choice is made before
/// connecting: either plaintext for the lifetime of the session or TLS
/// from the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 2000, the traditional timsieved port).
    #[default]
    None,
    /// TLS from the start (port 4190 wrapped). **Recommended.**
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => crate::DEFAULT_PORT,
            Self::Implicit => 4190,
        }
    }
}

/// ManageSieve session configuration.
///
/// Carries the server address, transport choice, credentials and the
/// operational limits applied to every exchange.
#[derive(Clone)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-exchange read/write timeout.
    pub io_timeout: Duration,
    /// Upper bound on the accumulated size of a single response.
    pub max_response_size: usize,
    /// Requested SASL mechanism name, matched against the server's
    /// SASL capability before any authentication bytes are sent.
    pub mechanism: String,
    /// Authentication identity (the user logging in).
    pub user: String,
    /// Password for the authentication identity.
    pub password: String,
    /// Authorization identity for proxy authentication, usually empty.
    pub authzid: String,
}

impl SessionConfig {
    /// Creates a new configuration with the dialect defaults: plaintext
    /// on port 2000 and the PLAIN mechanism.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: crate::DEFAULT_PORT,
            security: Security::None,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(60),
            max_response_size: 1024 * 1024,
            mechanism: "PLAIN".to_string(),
            user: String::new(),
            password: String::new(),
            authzid: String::new(),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .field("max_response_size", &self.max_response_size)
            .field("mechanism", &self.mechanism)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("authzid", &self.authzid)
            .finish()
    }
}

/// Builder for session configuration.
#[derive(Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
    max_response_size: usize,
    mechanism: String,
    user: String,
    password: String,
    authzid: String,
}

impl SessionConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::None,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(60),
            max_response_size: 1024 * 1024,
            mechanism: "PLAIN".to_string(),
            user: String::new(),
            password: String::new(),
            authzid: String::new(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-exchange I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the maximum accumulated response size.
    #[must_use]
    pub const fn max_response_size(mut self, limit: usize) -> Self {
        self.max_response_size = limit;
        self
    }

    /// Sets the SASL mechanism to request.
    #[must_use]
    pub fn mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = mechanism.into();
        self
    }

    /// Sets the authentication identity and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Sets the authorization identity for proxy authentication.
    #[must_use]
    pub fn authzid(mut self, authzid: impl Into<String>) -> Self {
        self.authzid = authzid.into();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            host: self.host,
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            max_response_size: self.max_response_size,
            mechanism: self.mechanism,
            user: self.user,
            password: self.password,
            authzid: self.authzid,
        }
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

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 2000);
        assert_eq!(Security::Implicit.default_port(), 4190);
    }

    #[test]
    fn test_config_new() {
        let config = SessionConfig::new("sieve.example.com");
        assert_eq!(config.host, "sieve.example.com");
        assert_eq!(config.port, 2000);
        assert_eq!(config.security, Security::None);
        assert_eq!(config.mechanism, "PLAIN");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(60));
        assert_eq!(config.max_response_size, 1024 * 1024);
        assert!(config.user.is_empty());
        assert!(config.authzid.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::builder("sieve.example.com")
            .port(2000)
            .security(Security::None)
            .credentials("joe", "sesame")
            .mechanism("login")
            .authzid("admin")
            .connect_timeout(Duration::from_secs(10))
            .build();

        assert_eq!(config.host, "sieve.example.com");
        assert_eq!(config.port, 2000);
        assert_eq!(config.security, Security::None);
        assert_eq!(config.user, "joe");
        assert_eq!(config.password, "sesame");
        assert_eq!(config.mechanism, "login");
        assert_eq!(config.authzid, "admin");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder_default_port_follows_security() {
        let config = SessionConfig::builder("sieve.example.com")
            .security(Security::Implicit)
            .build();
        assert_eq!(config.port, 4190);

        let config = SessionConfig::builder("sieve.example.com").build();
        assert_eq!(config.port, 2000);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SessionConfig::builder("sieve.example.com")
            .credentials("joe", "sesame")
            .build();

        let rendered = format!("{config:?}");
        assert!(rendered.contains("joe"));
        assert!(!rendered.contains("sesame"));
    }
}
