//! Core ManageSieve types: server capabilities and session state.

use crate::parser::parse_quoted_pair;

/// Session state as defined by the ManageSieve dialect.
///
/// The protocol has three states:
/// - `Disconnected`: no transport; initial and terminal
/// - `Authorization`: greeting received, waiting for authentication
/// - `Transaction`: authenticated, script management available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not connected.
    ///
    /// Initial state, and terminal state after LOGOUT or a fatal
    /// transport failure. No commands are valid; a new connection
    /// requires a new session.
    #[default]
    Disconnected,

    /// Connected, greeting consumed, not yet authenticated.
    ///
    /// In this state only one command is valid:
    /// - AUTHENTICATE
    Authorization,

    /// Authenticated.
    ///
    /// In this state the script-management commands are valid:
    /// - LISTSCRIPTS
    /// - GETSCRIPT
    /// - PUTSCRIPT
    /// - SETACTIVE
    /// - DELETESCRIPT
    /// - CAPABILITY
    /// - LOGOUT
    Transaction,
}

impl SessionState {
    /// Returns `true` if a transport is attached (any state past connect).
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns `true` if authentication has completed.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Transaction)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Authorization => write!(f, "Authorization"),
            Self::Transaction => write!(f, "Transaction"),
        }
    }
}

/// Capabilities announced by the server in the greeting and in response
/// to the CAPABILITY command.
///
/// The announcement is one quoted key per line, optionally followed by a
/// quoted value. Keys are matched case-insensitively; unrecognized keys
/// are skipped for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Server implementation string (the `IMPLEMENTATION` key).
    pub implementation: Option<String>,
    /// SASL mechanism names (the `SASL` key), in server order, case as given.
    pub sasl: Vec<String>,
    /// Sieve language extensions (the `SIEVE` key), in server order.
    pub extensions: Vec<String>,
    /// Whether the server announced STARTTLS. Detection only; this client
    /// does not negotiate an upgrade.
    pub starttls: bool,
}

impl Capabilities {
    /// Parses a capability announcement body.
    ///
    /// Each call builds a complete set from scratch, so assigning the
    /// result replaces any previously stored capabilities wholesale.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut caps = Self::default();

        for line in body.lines() {
            let Some((key, value)) = parse_quoted_pair(line) else {
                continue;
            };
            match key.to_ascii_lowercase().as_str() {
                "implementation" => caps.implementation = value.map(str::to_string),
                "sasl" => caps.sasl = split_names(value),
                "sieve" => caps.extensions = split_names(value),
                "starttls" => caps.starttls = true,
                _ => {}
            }
        }

        caps
    }

    /// Returns true if the server advertises the given SASL mechanism.
    #[must_use]
    pub fn supports_sasl(&self, mechanism: &str) -> bool {
        self.sasl
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mechanism))
    }

    /// Returns true if the server supports the given Sieve extension.
    #[must_use]
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }
}

/// Splits a whitespace-separated capability value into names.
fn split_names(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
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
    fn test_session_state_default() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }

    #[test]
    fn test_is_connected() {
        assert!(!SessionState::Disconnected.is_connected());
        assert!(SessionState::Authorization.is_connected());
        assert!(SessionState::Transaction.is_connected());
    }

    #[test]
    fn test_is_authenticated() {
        assert!(!SessionState::Disconnected.is_authenticated());
        assert!(!SessionState::Authorization.is_authenticated());
        assert!(SessionState::Transaction.is_authenticated());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Transaction.to_string(), "Transaction");
        assert_eq!(SessionState::Authorization.to_string(), "Authorization");
    }

    #[test]
    fn test_parse_full_announcement() {
        let body = "\"IMPLEMENTATION\" \"Cyrus timsieved v2.2.12\"\r\n\
                    \"SASL\" \"PLAIN LOGIN\"\r\n\
                    \"SIEVE\" \"fileinto reject envelope vacation\"\r\n\
                    \"STARTTLS\"\r\n";
        let caps = Capabilities::parse(body);

        assert_eq!(
            caps.implementation.as_deref(),
            Some("Cyrus timsieved v2.2.12")
        );
        assert_eq!(caps.sasl, vec!["PLAIN", "LOGIN"]);
        assert_eq!(
            caps.extensions,
            vec!["fileinto", "reject", "envelope", "vacation"]
        );
        assert!(caps.starttls);
    }

    #[test]
    fn test_parse_keys_case_insensitive() {
        let caps = Capabilities::parse("\"sasl\" \"PLAIN\"\r\n\"Starttls\"\r\n");
        assert_eq!(caps.sasl, vec!["PLAIN"]);
        assert!(caps.starttls);
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let body = "\"MAXREDIRECTS\" \"5\"\r\n\"SASL\" \"PLAIN\"\r\n\"NOTIFY\" \"mailto\"\r\n";
        let caps = Capabilities::parse(body);
        assert_eq!(caps.sasl, vec!["PLAIN"]);
        assert!(caps.implementation.is_none());
        assert!(caps.extensions.is_empty());
    }

    #[test]
    fn test_parse_ignores_non_capability_lines() {
        let caps = Capabilities::parse("garbage line\r\n\r\n\"SASL\" \"PLAIN\"\r\n");
        assert_eq!(caps.sasl, vec!["PLAIN"]);
    }

    #[test]
    fn test_parse_empty_body() {
        let caps = Capabilities::parse("");
        assert_eq!(caps, Capabilities::default());
        assert!(caps.sasl.is_empty());
        assert!(!caps.starttls);
    }

    #[test]
    fn test_parse_replaces_not_merges() {
        let first = Capabilities::parse(
            "\"IMPLEMENTATION\" \"Old\"\r\n\"SASL\" \"PLAIN LOGIN\"\r\n\"STARTTLS\"\r\n",
        );
        let second = Capabilities::parse("\"SASL\" \"PLAIN\"\r\n");

        assert_eq!(first.sasl, vec!["PLAIN", "LOGIN"]);
        assert_eq!(second.sasl, vec!["PLAIN"]);
        assert!(second.implementation.is_none());
        assert!(!second.starttls);
    }

    #[test]
    fn test_parse_idempotent() {
        let body = "\"IMPLEMENTATION\" \"Test\"\r\n\"SASL\" \"PLAIN LOGIN\"\r\n";
        assert_eq!(Capabilities::parse(body), Capabilities::parse(body));
    }

    #[test]
    fn test_supports_sasl() {
        let caps = Capabilities::parse("\"SASL\" \"PLAIN LOGIN\"\r\n");
        assert!(caps.supports_sasl("PLAIN"));
        assert!(caps.supports_sasl("plain"));
        assert!(caps.supports_sasl("Login"));
        assert!(!caps.supports_sasl("DIGEST-MD5"));
    }

    #[test]
    fn test_has_extension() {
        let caps = Capabilities::parse("\"SIEVE\" \"fileinto vacation\"\r\n");
        assert!(caps.has_extension("fileinto"));
        assert!(caps.has_extension("VACATION"));
        assert!(!caps.has_extension("imapflags"));
    }
}
