//! SASL mechanisms and response encoding.
//!
//! The client implements PLAIN and LOGIN. PLAIN completes in a single
//! command; LOGIN is a relic that Cyrus timsieved still speaks and needs
//! two continuation lines. Both carry their data base64-encoded inside
//! quoted strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// SASL mechanisms implemented by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// RFC 4616 PLAIN: authorization identity, authentication identity
    /// and password in one base64 initial response.
    Plain,

    /// Legacy LOGIN: username and password each sent as a separate
    /// base64 continuation line.
    Login,
}

impl Mechanism {
    /// Canonical name as it appears in SASL capability lists.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }

    /// Looks up a mechanism by name, case-insensitively.
    ///
    /// Returns `None` for mechanisms this client does not implement.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PLAIN") {
            Some(Self::Plain)
        } else if name.eq_ignore_ascii_case("LOGIN") {
            Some(Self::Login)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the PLAIN initial response.
///
/// # Format
///
/// `base64(authzid NUL authcid NUL password)`
///
/// The authorization identity is usually empty, which asks the server to
/// derive it from the authentication identity.
#[must_use]
pub fn plain_response(authzid: &str, user: &str, password: &str) -> String {
    STANDARD.encode(format!("{authzid}\0{user}\0{password}"))
}

/// Encodes one LOGIN continuation value (username or password).
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value)
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
    fn test_mechanism_names() {
        assert_eq!(Mechanism::Plain.name(), "PLAIN");
        assert_eq!(Mechanism::Login.name(), "LOGIN");
        assert_eq!(Mechanism::Plain.to_string(), "PLAIN");
    }

    #[test]
    fn test_from_name_case_insensitive() {
        assert_eq!(Mechanism::from_name("PLAIN"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::from_name("plain"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::from_name("Login"), Some(Mechanism::Login));
    }

    #[test]
    fn test_from_name_unknown() {
        assert_eq!(Mechanism::from_name("DIGEST-MD5"), None);
        assert_eq!(Mechanism::from_name("CRAM-MD5"), None);
        assert_eq!(Mechanism::from_name(""), None);
    }

    #[test]
    fn test_plain_response_layout() {
        let decoded = STANDARD.decode(plain_response("", "joe", "sesame")).unwrap();
        assert_eq!(decoded, b"\0joe\0sesame");
    }

    #[test]
    fn test_plain_response_with_authzid() {
        let decoded = STANDARD
            .decode(plain_response("admin", "joe", "sesame"))
            .unwrap();
        assert_eq!(decoded, b"admin\0joe\0sesame");
    }

    #[test]
    fn test_login_response() {
        assert_eq!(login_response("joe"), "am9l");
        assert_eq!(STANDARD.decode(login_response("sesame")).unwrap(), b"sesame");
    }
}
