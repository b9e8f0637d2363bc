// Server session management

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use crate::common::error::Result;
use crate::protocol::command::{validate_command, CommandKind, Validation};
use crate::protocol::messages::Message;
use crate::storage::FileStore;
use crate::transport::{Connection, ConnectionStats};
use super::transfer::TransferManager;

/// Lifecycle of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Greeting,
    AwaitingCommand,
    Validating,
    Executing,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent QUIT
    Quit,
    /// Client closed the connection between frames
    PeerClosed,
    /// Connection dropped or reset mid-exchange
    ConnectionLost(String),
    /// Framing or local I/O failure; the message is the logged error
    Failed(String),
}

/// What [`ServerSession::run`] hands back once the connection is gone
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub peer: String,
    pub commands: u64,
    pub stats: ConnectionStats,
    pub end: SessionEnd,
}

enum Flow {
    Continue,
    Close,
}

/// One client conversation: greet, then command/reply until QUIT or
/// disconnect.
///
/// All session state lives here and is touched only by the thread running
/// the session. Shared state is limited to the file store.
pub struct ServerSession<S: Read + Write> {
    connection: Connection<S>,
    transfers: TransferManager,
    state: SessionState,
    commands: u64,
}

impl<S: Read + Write> ServerSession<S> {
    pub fn new(connection: Connection<S>, store: Arc<FileStore>) -> Self {
        Self {
            connection,
            transfers: TransferManager::new(store),
            state: SessionState::Greeting,
            commands: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &str {
        self.connection.peer()
    }

    /// Drive the session to completion.
    ///
    /// Never returns an error: failures end this session only, are logged
    /// with the peer, and the connection is dropped on return.
    pub fn run(mut self) -> SessionSummary {
        log::info!("[{}] Session started", self.peer());

        let end = match self.drive() {
            Ok(end) => end,
            Err(e) if e.is_disconnect() => {
                log::info!("[{}] Connection lost: {}", self.peer(), e);
                SessionEnd::ConnectionLost(e.to_string())
            }
            Err(e) if e.is_malformed() => {
                log::warn!("[{}] Closing after malformed frame: {}", self.peer(), e);
                SessionEnd::Failed(e.to_string())
            }
            Err(e) => {
                log::error!("[{}] Session error: {}", self.peer(), e);
                SessionEnd::Failed(e.to_string())
            }
        };

        self.transition(SessionState::Closing);
        let summary = SessionSummary {
            peer: self.peer().to_string(),
            commands: self.commands,
            stats: self.connection.stats(),
            end,
        };
        self.transition(SessionState::Closed);
        drop(self);

        log::info!(
            "[{}] Session closed after {} command(s) ({:?})",
            summary.peer,
            summary.commands,
            summary.end
        );
        summary
    }

    fn drive(&mut self) -> Result<SessionEnd> {
        self.connection.send(&Message::connection_established())?;
        self.transition(SessionState::AwaitingCommand);

        loop {
            let (command, filename) = match self.connection.receive()? {
                Some(Message::Command { command, filename }) => (command, filename),
                Some(Message::Unknown { kind }) => {
                    log::warn!("[{}] Ignoring message of unknown type {:?}", self.peer(), kind);
                    continue;
                }
                Some(other) => {
                    log::warn!("[{}] Ignoring unexpected {} message", self.peer(), other.kind());
                    continue;
                }
                None => {
                    log::info!("[{}] Client disconnected", self.peer());
                    return Ok(SessionEnd::PeerClosed);
                }
            };

            self.transition(SessionState::Validating);
            let kind = match validate_command(&command) {
                Validation::Supported(kind) => kind,
                Validation::Unsupported { code, message } => {
                    log::warn!("[{}] {}", self.peer(), message);
                    self.connection.send(&Message::response(code, message))?;
                    self.transition(SessionState::AwaitingCommand);
                    continue;
                }
            };

            self.transition(SessionState::Executing);
            self.commands += 1;
            match self.execute(kind, filename.as_deref())? {
                Flow::Continue => self.transition(SessionState::AwaitingCommand),
                Flow::Close => return Ok(SessionEnd::Quit),
            }
        }
    }

    fn execute(&mut self, kind: CommandKind, filename: Option<&str>) -> Result<Flow> {
        log::debug!("[{}] Executing {} {:?}", self.peer(), kind, filename);

        match kind {
            CommandKind::Ls => self.transfers.list(&mut self.connection)?,
            CommandKind::Get => self.transfers.send_file(&mut self.connection, filename)?,
            CommandKind::Put => self.transfers.receive_file(&mut self.connection, filename)?,
            CommandKind::Quit => {
                self.connection.send(&Message::goodbye())?;
                return Ok(Flow::Close);
            }
        }
        Ok(Flow::Continue)
    }

    fn transition(&mut self, next: SessionState) {
        log::trace!("[{}] {} -> {}", self.connection.peer(), self.state, next);
        self.state = next;
    }
}

/// Run a full session on an accepted stream
pub fn run_session<S: Read + Write>(connection: Connection<S>, store: Arc<FileStore>) -> SessionSummary {
    ServerSession::new(connection, store).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec;
    use std::io::{self, Cursor};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted client: reads from `input`, output outlives the session
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run_script(messages: &[Message]) -> (SessionSummary, Vec<Message>) {
        let mut input = Vec::new();
        for msg in messages {
            codec::write_message(&mut input, msg).unwrap();
        }
        run_raw(input)
    }

    fn run_raw(input: Vec<u8>) -> (SessionSummary, Vec<Message>) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(temp_dir.path()).unwrap());
        store.write("a.txt", b"hello").unwrap();

        let output = Arc::new(Mutex::new(Vec::new()));
        let stream = Scripted { input: Cursor::new(input), output: Arc::clone(&output) };
        let summary = run_session(Connection::new(stream, "test"), store);

        let written = output.lock().unwrap().clone();
        let mut output = Cursor::new(written);
        let mut replies = Vec::new();
        while let Some(msg) = codec::read_message(&mut output).unwrap() {
            if let Message::FileHeader { size, .. } = &msg {
                codec::read_body(&mut output, *size).unwrap();
            }
            replies.push(msg);
        }
        (summary, replies)
    }

    #[test]
    fn test_new_session_starts_in_greeting() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(temp_dir.path()).unwrap());
        let stream = Scripted { input: Cursor::new(Vec::new()), output: Arc::default() };

        let session = ServerSession::new(Connection::new(stream, "test"), store);
        assert_eq!(session.state(), SessionState::Greeting);
        assert_eq!(session.peer(), "test");
    }

    #[test]
    fn test_disconnect_mid_frame_is_connection_lost() {
        let mut input = Vec::new();
        codec::write_message(&mut input, &Message::command("LS", None)).unwrap();
        input.truncate(input.len() - 3);

        let (summary, replies) = run_raw(input);
        assert!(matches!(summary.end, SessionEnd::ConnectionLost(_)));
        assert_eq!(replies, vec![Message::connection_established()]);
    }

    #[test]
    fn test_disconnect_mid_upload_is_connection_lost() {
        let mut input = Vec::new();
        codec::write_message(&mut input, &Message::command("PUT", Some("big.bin"))).unwrap();
        codec::write_message(&mut input, &Message::file_header("big.bin", 1000)).unwrap();
        input.extend_from_slice(&[1u8; 10]);

        let (summary, _) = run_raw(input);
        assert!(matches!(summary.end, SessionEnd::ConnectionLost(_)));
    }

    #[test]
    fn test_greeting_then_quit() {
        let (summary, replies) = run_script(&[Message::command("QUIT", None)]);

        assert_eq!(replies, vec![Message::connection_established(), Message::goodbye()]);
        assert_eq!(summary.end, SessionEnd::Quit);
        assert_eq!(summary.commands, 1);
    }

    #[test]
    fn test_quit_stops_reading() {
        let (_, replies) = run_script(&[
            Message::command("QUIT", None),
            Message::command("LS", None),
        ]);
        assert_eq!(replies.len(), 2);
    }

    #[test]
    fn test_unsupported_command_keeps_session_open() {
        let (summary, replies) = run_script(&[
            Message::command("DELETE", Some("a.txt")),
            Message::command("GET", Some("a.txt")),
        ]);

        assert_eq!(summary.end, SessionEnd::PeerClosed);
        assert_eq!(replies[1], Message::response(400, "unsupported command: DELETE"));
        assert_eq!(replies[2], Message::file_header("a.txt", 5));
    }

    #[test]
    fn test_non_command_messages_are_ignored() {
        let (_, replies) = run_script(&[
            Message::ok("stray"),
            Message::command("LS", None),
        ]);
        assert_eq!(replies.len(), 2);
        assert!(matches!(replies[1], Message::Response { code: 200, data: Some(_), .. }));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let mut input = Vec::new();
        let payload = br#"{"type":"heartbeat"}"#;
        input.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        input.extend_from_slice(payload);
        codec::write_message(&mut input, &Message::command("QUIT", None)).unwrap();

        let (summary, replies) = run_raw(input);
        assert_eq!(summary.end, SessionEnd::Quit);
        assert_eq!(replies.last(), Some(&Message::goodbye()));
    }

    #[test]
    fn test_malformed_frame_ends_session() {
        let mut input = Vec::new();
        let payload = b"{not json";
        input.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        input.extend_from_slice(payload);
        codec::write_message(&mut input, &Message::command("LS", None)).unwrap();

        let (summary, replies) = run_raw(input);
        assert!(matches!(summary.end, SessionEnd::Failed(_)));
        assert_eq!(replies, vec![Message::connection_established()]);
    }

    #[test]
    fn test_put_then_ls() {
        let (_, replies) = run_script(&[
            Message::command("PUT", Some("b.txt")),
            Message::file_header("b.txt", 0),
            Message::command("LS", None),
        ]);

        assert_eq!(replies[1], Message::ok("Received 0 bytes"));
        match &replies[2] {
            Message::Response { message, .. } => {
                assert_eq!(message, "2 file(s): a.txt (5 bytes), b.txt (0 bytes)")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
