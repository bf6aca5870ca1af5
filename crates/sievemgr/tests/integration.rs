//! Integration tests for the ManageSieve session.
//!
//! These tests use a mock stream to replay server responses without a
//! real server, and capture everything the client writes so the wire
//! interaction can be asserted byte for byte.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use sievemgr::{Error, SessionConfig, SessionState, SieveSession};

/// Mock stream that replays predefined responses.
///
/// Writes go to a shared log so tests can inspect them after the
/// session has taken ownership of the stream.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Arc<Mutex<Vec<u8>>>,
    /// When true, reads past the end of the canned responses hang
    /// instead of reporting EOF.
    stall_at_eof: bool,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
            stall_at_eof: false,
        };
        (stream, sent)
    }

    fn new_stalling(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let (mut stream, sent) = Self::new(responses);
        stream.stall_at_eof = true;
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            if self.stall_at_eof {
                return Poll::Pending;
            }
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

const GREETING: &[u8] = b"\"IMPLEMENTATION\" \"Cyrus timsieved v2.2.12\"\r\n\
    \"SASL\" \"PLAIN LOGIN\"\r\n\
    \"SIEVE\" \"fileinto reject envelope vacation\"\r\n\
    \"STARTTLS\"\r\n\
    OK\r\n";

fn config() -> SessionConfig {
    SessionConfig::builder("sieve.example.com")
        .credentials("joe", "sesame")
        .build()
}

#[tokio::test]
async fn test_greeting_capabilities() {
    let (stream, sent) = MockStream::new(GREETING);
    let session = SieveSession::from_stream(stream, config()).await.unwrap();

    assert_eq!(session.state(), SessionState::Authorization);
    let caps = session.capabilities();
    assert_eq!(caps.implementation.as_deref(), Some("Cyrus timsieved v2.2.12"));
    assert_eq!(caps.sasl, vec!["PLAIN", "LOGIN"]);
    assert!(caps.has_extension("reject"));
    assert!(caps.starttls);

    // Consuming the greeting writes nothing.
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_commands_refused_before_authentication_write_nothing() {
    let (stream, sent) = MockStream::new(GREETING);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();

    assert!(matches!(
        session.list_scripts().await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        session.get_script("x").await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        session.install_script("x", "keep;", false).await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        session.set_active("x").await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        session.remove_script("x").await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        session.get_active().await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        session.capability().await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(session.logout().await, Err(Error::InvalidState(_))));

    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Authorization);
}

#[tokio::test]
async fn test_mechanism_mismatch_writes_nothing() {
    let (stream, sent) = MockStream::new(GREETING);
    let config = SessionConfig::builder("sieve.example.com")
        .credentials("joe", "sesame")
        .mechanism("DIGEST-MD5")
        .build();
    let mut session = SieveSession::from_stream(stream, config).await.unwrap();

    let err = session.authenticate().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedMechanism(_)));
    assert!(err.to_string().contains("DIGEST-MD5"));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unimplemented_mechanism_writes_nothing() {
    let greeting = b"\"SASL\" \"PLAIN CRAM-MD5\"\r\nOK\r\n";
    let (stream, sent) = MockStream::new(greeting);
    let config = SessionConfig::builder("sieve.example.com")
        .credentials("joe", "sesame")
        .mechanism("cram-md5")
        .build();
    let mut session = SieveSession::from_stream(stream, config).await.unwrap();

    let err = session.authenticate().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedByClient(_)));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_full_session_wire_log() {
    let responses: Vec<u8> = [
        GREETING,
        b"OK\r\n",
        b"\"vacation\"\r\n\"main\" ACTIVE\r\nOK\r\n",
        b"OK\r\n",
        b"OK\r\n",
        b"OK \"Logout completed\"\r\n",
    ]
    .concat();

    let (stream, sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();

    session.authenticate().await.unwrap();
    assert_eq!(
        session.list_scripts().await.unwrap(),
        vec!["vacation", "main"]
    );
    assert_eq!(
        session.get_active().await.unwrap().as_deref(),
        Some("main")
    );
    session.install_script("main", "keep;", true).await.unwrap();
    session.logout().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    let expected: &[u8] = b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n\
        LISTSCRIPTS\r\n\
        PUTSCRIPT \"main\" {5+}\r\nkeep;\r\n\
        SETACTIVE \"main\"\r\n\
        LOGOUT\r\n";
    assert_eq!(sent.lock().unwrap().as_slice(), expected);
}

#[tokio::test]
async fn test_login_mechanism_wire_log() {
    let responses: Vec<u8> = [
        GREETING,
        b"{12}\r\nVXNlcm5hbWU6\r\n".as_slice(),
        b"{12}\r\nUGFzc3dvcmQ6\r\n",
        b"OK\r\n",
    ]
    .concat();

    let (stream, sent) = MockStream::new(&responses);
    let config = SessionConfig::builder("sieve.example.com")
        .credentials("joe", "sesame")
        .mechanism("LOGIN")
        .build();
    let mut session = SieveSession::from_stream(stream, config).await.unwrap();

    session.authenticate().await.unwrap();
    assert_eq!(session.state(), SessionState::Transaction);

    let expected: &[u8] = b"AUTHENTICATE \"LOGIN\"\r\n\"am9l\"\r\n\"c2VzYW1l\"\r\n";
    assert_eq!(sent.lock().unwrap().as_slice(), expected);
}

#[tokio::test]
async fn test_rejected_credentials_allow_retry() {
    let responses: Vec<u8> = [
        GREETING,
        b"NO \"Authentication failed\"\r\n".as_slice(),
        b"OK\r\n",
    ]
    .concat();

    let (stream, sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();

    let err = session.authenticate().await.unwrap_err();
    assert!(matches!(err, Error::No(ref msg) if msg.contains("Authentication failed")));
    assert_eq!(session.state(), SessionState::Authorization);

    // The same session accepts a second attempt on the same stream.
    session.authenticate().await.unwrap();
    assert_eq!(session.state(), SessionState::Transaction);

    let auth_line: &[u8] = b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n";
    let expected: Vec<u8> = [auth_line, auth_line].concat();
    assert_eq!(sent.lock().unwrap().as_slice(), expected.as_slice());
}

#[tokio::test]
async fn test_reauthentication_after_success_writes_nothing() {
    let responses: Vec<u8> = [GREETING, b"OK\r\n".as_slice()].concat();

    let (stream, sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    // Once authenticated, another attempt is refused locally and the
    // session keeps its state.
    let err = session.authenticate().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(session.state(), SessionState::Transaction);

    // The wire log still holds exactly one AUTHENTICATE line.
    let expected: &[u8] = b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n";
    assert_eq!(sent.lock().unwrap().as_slice(), expected);
}

#[tokio::test]
async fn test_upload_survives_refused_activation() {
    let responses: Vec<u8> = [
        GREETING,
        b"OK\r\n".as_slice(),
        b"OK\r\n",
        b"NO \"Cannot activate\"\r\n",
        b"\"drafted\"\r\nOK\r\n",
    ]
    .concat();

    let (stream, sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    let err = session
        .install_script("drafted", "keep;", true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No(_)));

    // The upload went through and the session is still usable: the
    // script shows up in a follow-up listing.
    assert_eq!(session.state(), SessionState::Transaction);
    assert_eq!(session.list_scripts().await.unwrap(), vec!["drafted"]);

    let expected: &[u8] = b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n\
        PUTSCRIPT \"drafted\" {5+}\r\nkeep;\r\n\
        SETACTIVE \"drafted\"\r\n\
        LISTSCRIPTS\r\n";
    assert_eq!(sent.lock().unwrap().as_slice(), expected);
}

#[tokio::test]
async fn test_script_content_cannot_fake_a_status_line() {
    let responses: Vec<u8> = [
        GREETING,
        b"OK\r\n".as_slice(),
        // 16 literal bytes, two of them spelling a line that starts
        // with NO, followed by the terminating CRLF and the real OK.
        b"{16}\r\nkeep;\r\nNO stop\r\n\r\nOK\r\n",
    ]
    .concat();

    let (stream, _sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    let script = session.get_script("tricky").await.unwrap();
    assert_eq!(script, "keep;\r\nNO stop");
    assert_eq!(session.state(), SessionState::Transaction);
}

#[tokio::test]
async fn test_no_literal_leaves_stream_synchronized() {
    let responses: Vec<u8> = [
        GREETING,
        b"OK\r\n".as_slice(),
        b"NO {24+}\r\nscript errors:\r\nline 3 x\r\n",
        b"\"keep-all\" ACTIVE\r\nOK\r\n",
    ]
    .concat();

    let (stream, _sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    let err = session
        .install_script("bad", "keep ;;;", false)
        .await
        .unwrap_err();
    match err {
        Error::No(msg) => assert_eq!(msg, "script errors: line 3 x"),
        other => panic!("expected NO, got {other:?}"),
    }

    // The continuation and its terminator were fully consumed: the
    // next response parses cleanly on the same stream.
    assert_eq!(session.list_scripts().await.unwrap(), vec!["keep-all"]);
    assert_eq!(
        session.get_active().await.unwrap().as_deref(),
        Some("keep-all")
    );
}

#[tokio::test]
async fn test_bye_with_referral_ends_session() {
    let responses: Vec<u8> = [
        GREETING,
        b"OK\r\n".as_slice(),
        b"BYE (REFERRAL \"sieve://backend.example.com\") \"Try the backend\"\r\n",
    ]
    .concat();

    let (stream, sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    let err = session.list_scripts().await.unwrap_err();
    match err {
        Error::Bye { message, referral } => {
            assert_eq!(referral.as_deref(), Some("sieve://backend.example.com"));
            assert_eq!(message, "\"Try the backend\"");
        }
        other => panic!("expected BYE, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);

    // Poisoned: later commands fail locally without touching the wire.
    let written_before = sent.lock().unwrap().len();
    assert!(matches!(
        session.list_scripts().await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(sent.lock().unwrap().len(), written_before);
}

#[tokio::test]
async fn test_remove_script() {
    let responses: Vec<u8> = [
        GREETING,
        b"OK\r\n".as_slice(),
        b"OK\r\n",
    ]
    .concat();

    let (stream, sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    session.remove_script("old-rules").await.unwrap();

    let expected: &[u8] = b"AUTHENTICATE \"PLAIN\" \"AGpvZQBzZXNhbWU=\"\r\n\
        DELETESCRIPT \"old-rules\"\r\n";
    assert_eq!(sent.lock().unwrap().as_slice(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_greeting_times_out() {
    let (stream, _sent) = MockStream::new_stalling(b"");
    let config = SessionConfig::builder("sieve.example.com")
        .credentials("joe", "sesame")
        .io_timeout(Duration::from_secs(5))
        .build();

    let err = SieveSession::from_stream(stream, config).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_response_times_out_and_poisons() {
    let responses: Vec<u8> = [GREETING, b"OK\r\n".as_slice()].concat();
    let (stream, _sent) = MockStream::new_stalling(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    let err = session.list_scripts().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_truncated_response_poisons() {
    // Connection drops mid-response: EOF before any status line.
    let responses: Vec<u8> = [GREETING, b"OK\r\n\"vacation\"\r\n".as_slice()].concat();
    let (stream, _sent) = MockStream::new(&responses);
    let mut session = SieveSession::from_stream(stream, config()).await.unwrap();
    session.authenticate().await.unwrap();

    let err = session.list_scripts().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}
