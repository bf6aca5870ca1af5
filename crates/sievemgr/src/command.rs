//! ManageSieve command construction and serialization.
//!
//! Commands are plain lines. Arguments are sent as quoted strings, and
//! script bodies as non-synchronizing literals (`{N+}`), so a command
//! and its payload always serialize into a single buffer and a single
//! write.

use crate::error::{Error, Result};
use crate::sasl::Mechanism;

/// A client command in the ManageSieve dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Requests a fresh capability announcement.
    Capability,

    /// Ends the session. The server replies OK and closes the connection.
    Logout,

    /// Starts a SASL exchange.
    ///
    /// PLAIN carries its whole response inline; LOGIN sends the mechanism
    /// name alone and continues with [`Command::SaslResponse`] lines.
    Authenticate {
        /// The mechanism to use.
        mechanism: Mechanism,
        /// Base64-encoded initial response, for mechanisms that take one.
        initial_response: Option<String>,
    },

    /// One continuation line of an ongoing SASL exchange, sent as a bare
    /// quoted string.
    SaslResponse {
        /// Base64-encoded step data.
        data: String,
    },

    /// Lists stored scripts and which one is active.
    ListScripts,

    /// Fetches the named script's source.
    GetScript {
        /// Script name.
        name: String,
    },

    /// Uploads a script under the given name, replacing any existing one.
    ///
    /// The server validates the script and refuses the upload with NO if
    /// it does not parse. Uploading never changes which script is active.
    PutScript {
        /// Script name.
        name: String,
        /// Complete script source.
        script: String,
    },

    /// Marks the named script active, deactivating the previous one.
    ///
    /// An empty name deactivates filtering altogether.
    SetActive {
        /// Script name, or empty to deactivate.
        name: String,
    },

    /// Deletes the named script. The server refuses with NO if the script
    /// is currently active.
    DeleteScript {
        /// Script name.
        name: String,
    },
}

impl Command {
    /// Returns the protocol keyword for this command, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::Authenticate { .. } | Self::SaslResponse { .. } => "AUTHENTICATE",
            Self::ListScripts => "LISTSCRIPTS",
            Self::GetScript { .. } => "GETSCRIPT",
            Self::PutScript { .. } => "PUTSCRIPT",
            Self::SetActive { .. } => "SETACTIVE",
            Self::DeleteScript { .. } => "DELETESCRIPT",
        }
    }

    /// Serializes the command into wire bytes, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                write_quoted(&mut buf, mechanism.name());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    write_quoted(&mut buf, resp);
                }
            }
            Self::SaslResponse { data } => write_quoted(&mut buf, data),
            Self::ListScripts => buf.extend_from_slice(b"LISTSCRIPTS"),
            Self::GetScript { name } => {
                buf.extend_from_slice(b"GETSCRIPT ");
                write_quoted(&mut buf, name);
            }
            Self::PutScript { name, script } => {
                buf.extend_from_slice(b"PUTSCRIPT ");
                write_quoted(&mut buf, name);
                buf.extend_from_slice(format!(" {{{}+}}\r\n", script.len()).as_bytes());
                buf.extend_from_slice(script.as_bytes());
            }
            Self::SetActive { name } => {
                buf.extend_from_slice(b"SETACTIVE ");
                write_quoted(&mut buf, name);
            }
            Self::DeleteScript { name } => {
                buf.extend_from_slice(b"DELETESCRIPT ");
                write_quoted(&mut buf, name);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Writes a quoted string, escaping backslash and double-quote.
fn write_quoted(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for &b in s.as_bytes() {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

/// Checks that a script name can travel as a quoted string.
///
/// Double quotes, backslashes and control characters are rejected; the
/// empty name passes because SETACTIVE uses it to deactivate filtering.
pub(crate) fn validate_script_name(name: &str) -> Result<()> {
    let ok = name
        .chars()
        .all(|c| c != '"' && c != '\\' && c != '\u{7f}' && c >= ' ');

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidScriptName(name.to_string()))
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
    fn test_serialize_capability() {
        assert_eq!(Command::Capability.serialize(), b"CAPABILITY\r\n");
    }

    #[test]
    fn test_serialize_logout() {
        assert_eq!(Command::Logout.serialize(), b"LOGOUT\r\n");
    }

    #[test]
    fn test_serialize_authenticate_plain() {
        let cmd = Command::Authenticate {
            mechanism: Mechanism::Plain,
            initial_response: Some("AGpvZQBzZXNhbWU=".to_string()),
        };
        assert_eq!(
            cmd.serialize(),
            b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n"
        );
    }

    #[test]
    fn test_serialize_authenticate_login() {
        let cmd = Command::Authenticate {
            mechanism: Mechanism::Login,
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTHENTICATE \"LOGIN\"\r\n");
    }

    #[test]
    fn test_serialize_sasl_response() {
        let cmd = Command::SaslResponse {
            data: "dXNlcg==".to_string(),
        };
        assert_eq!(cmd.serialize(), b"\"dXNlcg==\"\r\n");
    }

    #[test]
    fn test_serialize_listscripts() {
        assert_eq!(Command::ListScripts.serialize(), b"LISTSCRIPTS\r\n");
    }

    #[test]
    fn test_serialize_getscript() {
        let cmd = Command::GetScript {
            name: "vacation".to_string(),
        };
        assert_eq!(cmd.serialize(), b"GETSCRIPT \"vacation\"\r\n");
    }

    #[test]
    fn test_serialize_putscript_literal() {
        let cmd = Command::PutScript {
            name: "test".to_string(),
            script: "require [\"fileinto\"];".to_string(),
        };
        assert_eq!(
            cmd.serialize(),
            b"PUTSCRIPT \"test\" {21+}\r\nrequire [\"fileinto\"];\r\n"
        );
    }

    #[test]
    fn test_serialize_putscript_counts_bytes_not_chars() {
        let cmd = Command::PutScript {
            name: "t".to_string(),
            script: "# caf\u{e9}\r\n".to_string(),
        };
        assert_eq!(
            cmd.serialize(),
            b"PUTSCRIPT \"t\" {9+}\r\n# caf\xc3\xa9\r\n\r\n"
        );
    }

    #[test]
    fn test_serialize_setactive() {
        let cmd = Command::SetActive {
            name: "main".to_string(),
        };
        assert_eq!(cmd.serialize(), b"SETACTIVE \"main\"\r\n");
    }

    #[test]
    fn test_serialize_setactive_empty_deactivates() {
        let cmd = Command::SetActive {
            name: String::new(),
        };
        assert_eq!(cmd.serialize(), b"SETACTIVE \"\"\r\n");
    }

    #[test]
    fn test_serialize_deletescript() {
        let cmd = Command::DeleteScript {
            name: "old".to_string(),
        };
        assert_eq!(cmd.serialize(), b"DELETESCRIPT \"old\"\r\n");
    }

    #[test]
    fn test_serialize_escapes_quoted() {
        let cmd = Command::GetScript {
            name: "a\"b\\c".to_string(),
        };
        assert_eq!(cmd.serialize(), b"GETSCRIPT \"a\\\"b\\\\c\"\r\n");
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Command::ListScripts.name(), "LISTSCRIPTS");
        assert_eq!(
            Command::SaslResponse {
                data: String::new()
            }
            .name(),
            "AUTHENTICATE"
        );
    }

    #[test]
    fn test_validate_script_name_accepts() {
        assert!(validate_script_name("vacation").is_ok());
        assert!(validate_script_name("my scripts/2024").is_ok());
        assert!(validate_script_name("r\u{e9}ponse automatique").is_ok());
        assert!(validate_script_name("").is_ok());
    }

    #[test]
    fn test_validate_script_name_rejects() {
        assert!(validate_script_name("a\"b").is_err());
        assert!(validate_script_name("a\\b").is_err());
        assert!(validate_script_name("a\r\nLOGOUT").is_err());
        assert!(validate_script_name("a\tb").is_err());
        assert!(validate_script_name("a\u{7f}b").is_err());
    }
}
