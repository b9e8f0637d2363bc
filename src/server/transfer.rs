// Server-side LS/GET/PUT execution

use std::io::{self, Read, Write};
use std::sync::Arc;
use crate::common::error::{Error, Result};
use crate::common::types::codes;
use crate::protocol::messages::Message;
use crate::storage::{validate_filename, FileStore};
use crate::transport::Connection;

/// Runs the data-carrying commands against the shared store.
///
/// Application failures (bad name, missing file, storage write error) are
/// reported to the client as a response and return `Ok`. An `Err` means the
/// connection itself is unusable and the session should close.
pub struct TransferManager {
    store: Arc<FileStore>,
}

impl TransferManager {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// LS: reply with the current listing
    pub fn list<S: Read + Write>(&self, conn: &mut Connection<S>) -> Result<()> {
        let files = self.store.list()?;
        log::info!("[{}] LS -> {} file(s)", conn.peer(), files.len());
        conn.send(&Message::listing(files))
    }

    /// GET: file header plus body, or a single error response
    pub fn send_file<S: Read + Write>(
        &self,
        conn: &mut Connection<S>,
        filename: Option<&str>,
    ) -> Result<()> {
        let name = match filename {
            Some(name) if !name.is_empty() => name,
            _ => return conn.send(&Message::response(codes::BAD_REQUEST, "filename required")),
        };

        let data = match self.store.read(name) {
            Ok(data) => data,
            Err(Error::FileNotFound(_)) => {
                log::info!("[{}] GET {}: not found", conn.peer(), name);
                return conn.send(&Message::response(codes::NOT_FOUND, "file not found"));
            }
            Err(Error::InvalidFilename(_)) => {
                log::warn!("[{}] GET rejected name {:?}", conn.peer(), name);
                return conn.send(&Message::response(codes::BAD_REQUEST, "invalid filename"));
            }
            Err(e) => return Err(e),
        };

        conn.send(&Message::file_header(name, data.len() as u64))?;
        conn.send_body(&data)?;
        log::info!("[{}] GET {}: sent {} bytes", conn.peer(), name, data.len());
        Ok(())
    }

    /// PUT: expects a file header next, then exactly `size` body bytes.
    ///
    /// The body is always consumed before the reply, whether or not it is
    /// stored, so the stream stays aligned on a frame boundary.
    pub fn receive_file<S: Read + Write>(
        &self,
        conn: &mut Connection<S>,
        filename: Option<&str>,
    ) -> Result<()> {
        let (header_name, size) = loop {
            match conn.receive()? {
                Some(Message::FileHeader { filename, size }) => break (filename, size),
                Some(Message::Unknown { kind }) => {
                    log::warn!("[{}] Ignoring message of unknown type {:?}", conn.peer(), kind);
                }
                Some(other) => {
                    log::warn!("[{}] PUT expected file header, got {}", conn.peer(), other.kind());
                    let reply = format!("expected file header, got {}", other.kind());
                    return conn.send(&Message::response(codes::BAD_REQUEST, reply));
                }
                None => return Err(Error::ConnectionClosed),
            }
        };

        let target = match check_upload_target(filename, &header_name) {
            Ok(name) => name,
            Err(reason) => {
                log::warn!("[{}] PUT rejected: {}", conn.peer(), reason);
                conn.receive_body_into(size, &mut io::sink())?;
                return conn.send(&Message::response(codes::BAD_REQUEST, reason));
            }
        };

        let mut upload = match self.store.begin_upload(target) {
            Ok(upload) => upload,
            Err(e) => {
                log::error!("[{}] PUT {}: cannot start upload: {}", conn.peer(), target, e);
                conn.receive_body_into(size, &mut io::sink())?;
                return conn.send(&Message::response(codes::SERVER_ERROR, "failed to store file"));
            }
        };

        let copy = conn.receive_body_into(size, &mut upload)?;
        if let Some(e) = copy.sink_error {
            // dropping the upload removes its temp file
            drop(upload);
            log::error!("[{}] PUT {}: write failed: {}", conn.peer(), target, e);
            return conn.send(&Message::response(codes::SERVER_ERROR, "failed to store file"));
        }

        match upload.commit() {
            Ok(written) => {
                log::info!("[{}] PUT {}: received {} bytes", conn.peer(), target, written);
                conn.send(&Message::ok(format!("Received {} bytes", written)))
            }
            Err(e) => {
                log::error!("[{}] PUT {}: commit failed: {}", conn.peer(), target, e);
                conn.send(&Message::response(codes::SERVER_ERROR, "failed to store file"))
            }
        }
    }
}

/// Pick the stored name for an upload, or the reason it is refused
fn check_upload_target<'a>(requested: Option<&'a str>, header_name: &str) -> std::result::Result<&'a str, String> {
    let name = match requested {
        Some(name) if !name.is_empty() => name,
        _ => return Err("filename required".to_string()),
    };
    if name != header_name {
        return Err(format!("file header names {:?}, expected {:?}", header_name, name));
    }
    if validate_filename(name).is_err() {
        return Err("invalid filename".to_string());
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn connection(input: Vec<u8>) -> Connection<Duplex> {
        Connection::new(Duplex { input: Cursor::new(input), output: Vec::new() }, "test")
    }

    fn replies(conn: Connection<Duplex>) -> Vec<Message> {
        let mut output = Cursor::new(conn.into_inner().output);
        let mut messages = Vec::new();
        while let Some(msg) = codec::read_message(&mut output).unwrap() {
            if let Message::FileHeader { size, .. } = &msg {
                codec::read_body(&mut output, *size).unwrap();
            }
            messages.push(msg);
        }
        messages
    }

    fn manager() -> (TempDir, TransferManager) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        (temp_dir, TransferManager::new(Arc::new(store)))
    }

    fn upload_frames(name: &str, body: &[u8]) -> Vec<u8> {
        let mut input = Vec::new();
        codec::write_message(&mut input, &Message::file_header(name, body.len() as u64)).unwrap();
        input.extend_from_slice(body);
        input
    }

    #[test]
    fn test_get_missing_file_is_404() {
        let (_dir, transfers) = manager();
        let mut conn = connection(Vec::new());
        transfers.send_file(&mut conn, Some("nope.txt")).unwrap();

        assert_eq!(replies(conn), vec![Message::response(404, "file not found")]);
    }

    #[test]
    fn test_get_without_filename_is_400() {
        let (_dir, transfers) = manager();
        let mut conn = connection(Vec::new());
        transfers.send_file(&mut conn, None).unwrap();

        assert_eq!(replies(conn), vec![Message::response(400, "filename required")]);
    }

    #[test]
    fn test_get_sends_header_and_body() {
        let (_dir, transfers) = manager();
        transfers.store().write("a.txt", b"hello").unwrap();

        let mut conn = connection(Vec::new());
        transfers.send_file(&mut conn, Some("a.txt")).unwrap();

        let mut output = Cursor::new(conn.into_inner().output);
        assert_eq!(
            codec::read_message(&mut output).unwrap(),
            Some(Message::file_header("a.txt", 5))
        );
        assert_eq!(codec::read_body(&mut output, 5).unwrap(), b"hello");
        assert!(codec::read_message(&mut output).unwrap().is_none());
    }

    #[test]
    fn test_put_stores_file() {
        let (_dir, transfers) = manager();
        let mut conn = connection(upload_frames("b.bin", &[0, 1, 2, 3]));
        transfers.receive_file(&mut conn, Some("b.bin")).unwrap();

        assert_eq!(replies(conn), vec![Message::ok("Received 4 bytes")]);
        assert_eq!(transfers.store().read("b.bin").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_put_name_mismatch_drains_body() {
        let (_dir, transfers) = manager();
        let mut input = upload_frames("other.txt", b"ignored");
        codec::write_message(&mut input, &Message::command("LS", None)).unwrap();

        let mut conn = connection(input);
        transfers.receive_file(&mut conn, Some("a.txt")).unwrap();

        // the next frame is still readable
        assert_eq!(conn.receive().unwrap(), Some(Message::command("LS", None)));
        match &replies(conn)[..] {
            [Message::Response { code: 400, .. }] => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(transfers.store().list().unwrap().is_empty());
    }

    #[test]
    fn test_put_invalid_name_is_400() {
        let (_dir, transfers) = manager();
        let mut conn = connection(upload_frames("../x", b"zz"));
        transfers.receive_file(&mut conn, Some("../x")).unwrap();

        assert_eq!(replies(conn), vec![Message::response(400, "invalid filename")]);
    }

    #[test]
    fn test_put_without_header_is_400() {
        let (_dir, transfers) = manager();
        let mut input = Vec::new();
        codec::write_message(&mut input, &Message::command("LS", None)).unwrap();

        let mut conn = connection(input);
        transfers.receive_file(&mut conn, Some("a.txt")).unwrap();

        assert_eq!(
            replies(conn),
            vec![Message::response(400, "expected file header, got command")]
        );
    }

    #[test]
    fn test_put_peer_gone_before_header() {
        let (_dir, transfers) = manager();
        let mut conn = connection(Vec::new());
        let result = transfers.receive_file(&mut conn, Some("a.txt"));
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_truncated_body_leaves_no_file() {
        let (dir, transfers) = manager();
        let mut input = Vec::new();
        codec::write_message(&mut input, &Message::file_header("a.txt", 100)).unwrap();
        input.extend_from_slice(b"only a few");

        let mut conn = connection(input);
        assert!(transfers.receive_file(&mut conn, Some("a.txt")).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_put_storage_failure_is_500() {
        let (dir, transfers) = manager();
        std::fs::create_dir(dir.path().join("taken")).unwrap();

        let mut input = upload_frames("taken", b"cannot land on a directory");
        codec::write_message(&mut input, &Message::command("LS", None)).unwrap();

        let mut conn = connection(input);
        transfers.receive_file(&mut conn, Some("taken")).unwrap();

        // body fully consumed, next command still aligned
        assert_eq!(conn.receive().unwrap(), Some(Message::command("LS", None)));
        assert_eq!(replies(conn), vec![Message::response(500, "failed to store file")]);

        assert!(dir.path().join("taken").is_dir());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.starts_with(crate::common::types::UPLOAD_TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
    }

    #[test]
    fn test_list_reports_files() {
        let (_dir, transfers) = manager();
        transfers.store().write("a.txt", b"hello").unwrap();

        let mut conn = connection(Vec::new());
        transfers.list(&mut conn).unwrap();

        match &replies(conn)[..] {
            [Message::Response { code: 200, message, data: Some(data) }] => {
                assert_eq!(message, "1 file(s): a.txt (5 bytes)");
                assert_eq!(data.files.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
