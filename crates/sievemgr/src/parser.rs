//! Line-level parsing for ManageSieve responses.
//!
//! The dialect is line-oriented: a response is zero or more body lines
//! followed by a status line. Only three shapes need real parsing, which
//! these helpers cover: quoted key/value capability lines, LISTSCRIPTS
//! entries, and the `{N}` / `{N+}` literal length markers that announce
//! raw byte payloads.

/// A recognized status line, split into the status word and the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusLine<'a> {
    /// `OK [text]`: the command succeeded.
    Ok {
        /// Human-readable trailing text, possibly empty.
        rest: &'a str,
    },
    /// `NO [text]`: the command failed, session still usable.
    No {
        /// Diagnostic text, possibly ending in a literal marker.
        rest: &'a str,
    },
    /// `BYE [text]`: the server is closing the connection.
    Bye {
        /// Trailing text, possibly starting with a response code.
        rest: &'a str,
    },
}

/// Classifies a response line as a status line.
///
/// The status word must be the whole first whitespace-delimited token,
/// compared case-insensitively. Returns `None` for body lines, including
/// lines that merely start with the letters `OK`, `NO` or `BYE` (for
/// example a script line beginning with `notify`).
pub(crate) fn parse_status(line: &str) -> Option<StatusLine<'_>> {
    let line = line.trim_end();
    let (word, rest) = match line.find(' ') {
        Some(pos) => (&line[..pos], line[pos + 1..].trim_start()),
        None => (line, ""),
    };

    if word.eq_ignore_ascii_case("OK") {
        Some(StatusLine::Ok { rest })
    } else if word.eq_ignore_ascii_case("NO") {
        Some(StatusLine::No { rest })
    } else if word.eq_ignore_ascii_case("BYE") {
        Some(StatusLine::Bye { rest })
    } else {
        None
    }
}

/// Parses a literal length marker at the end of a line.
///
/// Matches `{N}` and the non-synchronizing `{N+}` form. The marker must
/// close the line; an embedded brace elsewhere does not count. Returns
/// the announced byte count.
pub(crate) fn parse_literal_marker(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let open = line.rfind('{')?;
    let inner = line[open + 1..].strip_suffix('}')?;
    let digits = inner.strip_suffix('+').unwrap_or(inner);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Removes the literal marker from the end of a status rest, if present.
///
/// Used when building NO diagnostics: the marker announces the length of
/// the continuation that follows and carries no meaning of its own.
pub(crate) fn strip_trailing_marker(rest: &str) -> &str {
    if parse_literal_marker(rest).is_some() {
        if let Some(open) = rest.rfind('{') {
            return rest[..open].trim_end();
        }
    }
    rest
}

/// Extracts a REFERRAL response code from the trailing text of a BYE.
///
/// The shape is `(REFERRAL "url") [text]`. Returns the referral URL, if
/// any, and the remaining human-readable text. An unterminated quoted
/// URL is accepted and runs to the end of the line.
pub(crate) fn parse_bye_referral(rest: &str) -> (Option<String>, &str) {
    let Some(inner) = rest.strip_prefix('(') else {
        return (None, rest);
    };
    let Some(word) = inner.get(..8) else {
        return (None, rest);
    };
    if !word.eq_ignore_ascii_case("referral") {
        return (None, rest);
    }

    let Some(quoted) = inner[8..].trim_start().strip_prefix('"') else {
        return (None, rest);
    };
    match quoted.find('"') {
        Some(end) => {
            let url = quoted[..end].to_string();
            let tail = quoted[end + 1..].trim_start_matches(')').trim();
            (Some(url), tail)
        }
        None => (Some(quoted.to_string()), ""),
    }
}

/// Parses one LISTSCRIPTS entry: a quoted name, optionally flagged with
/// ` ACTIVE` (matched case-insensitively).
///
/// Returns the name and whether it is the active script. Lines that do
/// not fit the shape yield `None` and are skipped by the caller.
pub(crate) fn parse_list_line(line: &str) -> Option<(String, bool)> {
    let line = line.trim_end();
    let rest = line.strip_prefix('"')?;

    let (body, active) = match rest.len().checked_sub(7).and_then(|at| rest.get(at..)) {
        Some(tail) if tail.eq_ignore_ascii_case(" ACTIVE") => {
            (&rest[..rest.len() - 7], true)
        }
        _ => (rest, false),
    };

    let name = body.strip_suffix('"')?;
    Some((name.to_string(), active))
}

/// Parses a quoted capability line: `"KEY"` or `"KEY" "VALUE"`.
///
/// Keys are plain ASCII letters. The value, when present, spans from the
/// quote after the separating space to the last quote on the line, so
/// embedded quotes survive. Returns `None` for anything else.
pub(crate) fn parse_quoted_pair(line: &str) -> Option<(&str, Option<&str>)> {
    let line = line.trim_end();
    let rest = line.strip_prefix('"')?;
    let end = rest.find('"')?;
    let key = &rest[..end];

    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    let after = &rest[end + 1..];
    if after.is_empty() {
        return Some((key, None));
    }

    let value = after.strip_prefix(' ')?.strip_prefix('"')?.strip_suffix('"')?;
    Some((key, Some(value)))
}

/// Strips a leading literal marker line from a script body.
///
/// GETSCRIPT responses announce the script as a literal, and the marker
/// line arrives as part of the body. Exactly one leading marker is
/// removed; a script that itself starts with a brace is left alone
/// unless the whole first line is a well-formed marker.
pub(crate) fn strip_literal_prefix(body: &str) -> &str {
    let Some(end) = body.find('\n') else {
        return body;
    };
    let first = body[..end].trim_end();

    let Some(inner) = first.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        return body;
    };
    let digits = inner.strip_suffix('+').unwrap_or(inner);

    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        &body[end + 1..]
    } else {
        body
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
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_status_ok() {
        assert_eq!(parse_status("OK"), Some(StatusLine::Ok { rest: "" }));
        assert_eq!(
            parse_status("OK \"Logout completed\""),
            Some(StatusLine::Ok {
                rest: "\"Logout completed\""
            })
        );
        assert_eq!(parse_status("ok done"), Some(StatusLine::Ok { rest: "done" }));
    }

    #[test]
    fn test_parse_status_no() {
        assert_eq!(
            parse_status("NO \"Script does not exist\""),
            Some(StatusLine::No {
                rest: "\"Script does not exist\""
            })
        );
        assert_eq!(parse_status("No {24+}"), Some(StatusLine::No { rest: "{24+}" }));
    }

    #[test]
    fn test_parse_status_bye() {
        assert_eq!(
            parse_status("BYE \"Too many failures\""),
            Some(StatusLine::Bye {
                rest: "\"Too many failures\""
            })
        );
    }

    #[test]
    fn test_parse_status_rejects_prefix_lookalikes() {
        assert_eq!(parse_status("notify :method \"mailto\""), None);
        assert_eq!(parse_status("OKAY"), None);
        assert_eq!(parse_status("BYEBYE now"), None);
        assert_eq!(parse_status("nothing to see"), None);
    }

    #[test]
    fn test_parse_status_body_lines() {
        assert_eq!(parse_status("\"SASL\" \"PLAIN\""), None);
        assert_eq!(parse_status("if header :contains \"subject\" \"x\" {"), None);
        assert_eq!(parse_status(""), None);
    }

    #[test]
    fn test_parse_literal_marker() {
        assert_eq!(parse_literal_marker("{116}"), Some(116));
        assert_eq!(parse_literal_marker("{0+}"), Some(0));
        assert_eq!(parse_literal_marker("NO {24+}"), Some(24));
        assert_eq!(parse_literal_marker("{42}\r"), Some(42));
    }

    #[test]
    fn test_parse_literal_marker_rejects_malformed() {
        assert_eq!(parse_literal_marker("{}"), None);
        assert_eq!(parse_literal_marker("{+}"), None);
        assert_eq!(parse_literal_marker("{12a}"), None);
        assert_eq!(parse_literal_marker("{12} trailing"), None);
        assert_eq!(parse_literal_marker("no marker here"), None);
    }

    #[test]
    fn test_strip_trailing_marker() {
        assert_eq!(strip_trailing_marker("\"quota\" {24+}"), "\"quota\"");
        assert_eq!(strip_trailing_marker("{24+}"), "");
        assert_eq!(strip_trailing_marker("plain text"), "plain text");
    }

    #[test]
    fn test_parse_bye_referral() {
        let (url, tail) =
            parse_bye_referral("(REFERRAL \"sieve://backend.example.com\") Try there");
        assert_eq!(url.as_deref(), Some("sieve://backend.example.com"));
        assert_eq!(tail, "Try there");
    }

    #[test]
    fn test_parse_bye_referral_case_insensitive() {
        let (url, _) = parse_bye_referral("(referral \"sieve://other\")");
        assert_eq!(url.as_deref(), Some("sieve://other"));
    }

    #[test]
    fn test_parse_bye_referral_unterminated() {
        let (url, tail) = parse_bye_referral("(REFERRAL \"sieve://cut-off");
        assert_eq!(url.as_deref(), Some("sieve://cut-off"));
        assert_eq!(tail, "");
    }

    #[test]
    fn test_parse_bye_referral_absent() {
        let (url, tail) = parse_bye_referral("\"Too many failures\"");
        assert_eq!(url, None);
        assert_eq!(tail, "\"Too many failures\"");
    }

    #[test]
    fn test_parse_list_line() {
        assert_eq!(
            parse_list_line("\"vacation\""),
            Some(("vacation".to_string(), false))
        );
        assert_eq!(
            parse_list_line("\"main\" ACTIVE"),
            Some(("main".to_string(), true))
        );
        assert_eq!(
            parse_list_line("\"main\" active"),
            Some(("main".to_string(), true))
        );
    }

    #[test]
    fn test_parse_list_line_empty_name() {
        assert_eq!(parse_list_line("\"\""), Some((String::new(), false)));
    }

    #[test]
    fn test_parse_list_line_name_containing_active() {
        assert_eq!(
            parse_list_line("\"my ACTIVE script\""),
            Some(("my ACTIVE script".to_string(), false))
        );
    }

    #[test]
    fn test_parse_list_line_rejects_unquoted() {
        assert_eq!(parse_list_line("vacation"), None);
        assert_eq!(parse_list_line(""), None);
    }

    #[test]
    fn test_parse_quoted_pair() {
        assert_eq!(
            parse_quoted_pair("\"IMPLEMENTATION\" \"Cyrus timsieved v2.2.12\""),
            Some(("IMPLEMENTATION", Some("Cyrus timsieved v2.2.12")))
        );
        assert_eq!(parse_quoted_pair("\"STARTTLS\""), Some(("STARTTLS", None)));
        assert_eq!(parse_quoted_pair("\"SASL\" \"\""), Some(("SASL", Some(""))));
    }

    #[test]
    fn test_parse_quoted_pair_value_keeps_embedded_quotes() {
        assert_eq!(
            parse_quoted_pair("\"IMPLEMENTATION\" \"a \"weird\" server\""),
            Some(("IMPLEMENTATION", Some("a \"weird\" server")))
        );
    }

    #[test]
    fn test_parse_quoted_pair_rejects_malformed() {
        assert_eq!(parse_quoted_pair("IMPLEMENTATION \"x\""), None);
        assert_eq!(parse_quoted_pair("\"\" \"x\""), None);
        assert_eq!(parse_quoted_pair("\"KEY2\" \"x\""), None);
        assert_eq!(parse_quoted_pair("\"KEY\"\"x\""), None);
        assert_eq!(parse_quoted_pair(""), None);
    }

    #[test]
    fn test_strip_literal_prefix() {
        assert_eq!(
            strip_literal_prefix("{25+}\r\nrequire [\"fileinto\"];\r\n"),
            "require [\"fileinto\"];\r\n"
        );
        assert_eq!(
            strip_literal_prefix("{25}\nrequire [\"fileinto\"];\n"),
            "require [\"fileinto\"];\n"
        );
    }

    #[test]
    fn test_strip_literal_prefix_only_once() {
        assert_eq!(strip_literal_prefix("{4+}\r\n{4+}\r\nkeep;"), "{4+}\r\nkeep;");
    }

    #[test]
    fn test_strip_literal_prefix_leaves_scripts_alone() {
        assert_eq!(strip_literal_prefix("keep;\r\n"), "keep;\r\n");
        assert_eq!(strip_literal_prefix("{ not a marker\r\nkeep;"), "{ not a marker\r\nkeep;");
        assert_eq!(strip_literal_prefix("no newline at all"), "no newline at all");
    }

    proptest! {
        #[test]
        fn list_line_round_trips_any_safe_name(
            name in "[A-Za-z0-9 ._/-]{0,40}",
            active in any::<bool>(),
        ) {
            let line = if active {
                format!("\"{name}\" ACTIVE")
            } else {
                format!("\"{name}\"")
            };
            assert_eq!(parse_list_line(&line), Some((name, active)));
        }
    }
}
