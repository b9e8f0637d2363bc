// Client module - blocking TCP client for the file server

pub mod progress;
pub mod shell;

pub use shell::Shell;

use std::fs::File;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use indicatif::ProgressBar;
use crate::common::config::ClientConfig;
use crate::common::error::{Error, Result};
use crate::common::types::{codes, FileEntry, MAX_REPLY_FRAME_SIZE};
use crate::protocol::messages::{Message, ResponseData};
use crate::storage::validate_filename;
use crate::transport::Connection;

/// Reply to LS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub message: String,
    pub files: Vec<FileEntry>,
}

/// One connection to a server, used strictly one request at a time
pub struct Client {
    connection: Connection<TcpStream>,
    config: ClientConfig,
    greeting: String,
}

impl Client {
    /// Connect and wait for the server greeting
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let stream = open_stream(&config)?;
        let mut connection = Connection::from_tcp(stream)?.with_max_frame_size(MAX_REPLY_FRAME_SIZE);

        let greeting = match connection.receive()? {
            Some(Message::Connection { code, message }) if codes::is_success(code) => message,
            Some(Message::Connection { code, message }) => return Err(Error::Remote { code, message }),
            Some(other) => {
                return Err(Error::Protocol(format!("expected greeting, got {}", other.kind())))
            }
            None => return Err(Error::ConnectionClosed),
        };

        log::info!("Connected to {}: {}", connection.peer(), greeting);
        Ok(Self { connection, config, greeting })
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a raw command and return the first reply as-is
    pub fn command(&mut self, command: &str, filename: Option<&str>) -> Result<Message> {
        self.connection.send(&Message::command(command, filename))?;
        self.next_message()
    }

    pub fn list(&mut self) -> Result<Listing> {
        self.connection.send(&Message::command("LS", None))?;
        let (message, data) = self.expect_ok()?;
        Ok(Listing {
            message,
            files: data.map(|d| d.files).unwrap_or_default(),
        })
    }

    /// Fetch `name` fully into memory
    pub fn download(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.download_with(name, &mut body, |_| {})?;
        Ok(body)
    }

    /// GET `name`, streaming the body into `sink`.
    ///
    /// `on_header` sees the advertised size before any body byte is read.
    pub fn download_with<W, F>(&mut self, name: &str, sink: &mut W, on_header: F) -> Result<u64>
    where
        W: Write + ?Sized,
        F: FnOnce(u64),
    {
        self.connection.send(&Message::command("GET", Some(name)))?;

        match self.next_message()? {
            Message::FileHeader { size, .. } => {
                on_header(size);
                let copy = self.connection.receive_body_into(size, sink)?;
                if let Some(e) = copy.sink_error {
                    return Err(Error::Io(e));
                }
                Ok(size)
            }
            Message::Response { code, message, .. } if !codes::is_success(code) => {
                Err(Error::Remote { code, message })
            }
            other => Err(Error::Protocol(format!("unexpected {} reply to GET", other.kind()))),
        }
    }

    /// Download `name` into `dir`, replacing any existing file only once the
    /// whole body has arrived.
    pub fn download_to(&mut self, name: &str, dir: &Path, bar: &ProgressBar) -> Result<PathBuf> {
        validate_filename(name)?;
        let mut part = tempfile::Builder::new()
            .prefix(".ftpx-download-")
            .suffix(".part")
            .tempfile_in(dir)?;

        {
            let mut writer = bar.wrap_write(part.as_file_mut());
            self.download_with(name, &mut writer, |size| bar.set_length(size))?;
        }
        part.as_file().sync_all()?;

        let target = dir.join(name);
        part.persist(&target).map_err(|e| Error::Io(e.error))?;
        log::info!("Saved {} to {:?}", name, target);
        Ok(target)
    }

    /// PUT `data` under `name`; returns the server's acknowledgment text
    pub fn upload(&mut self, name: &str, data: &[u8]) -> Result<String> {
        let mut source = data;
        self.upload_from(name, &mut source, data.len() as u64)
    }

    /// PUT exactly `size` bytes read from `source`
    pub fn upload_from<R: Read + ?Sized>(&mut self, name: &str, source: &mut R, size: u64) -> Result<String> {
        self.connection.send(&Message::command("PUT", Some(name)))?;
        self.connection.send(&Message::file_header(name, size))?;
        self.connection.send_body_from(source, size)?;

        let (message, _) = self.expect_ok()?;
        Ok(message)
    }

    /// Upload a local file under its own file name
    pub fn upload_file(&mut self, path: &Path, bar: &ProgressBar) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?
            .to_string();

        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let size = file.metadata()?.len();
        bar.set_length(size);

        let mut reader = bar.wrap_read(file);
        self.upload_from(&name, &mut reader, size)
    }

    /// Say goodbye and close the connection
    pub fn quit(mut self) -> Result<String> {
        self.connection.send(&Message::command("QUIT", None))?;
        let (message, _) = self.expect_ok()?;
        Ok(message)
    }

    /// Next known message; unknown types are skipped
    fn next_message(&mut self) -> Result<Message> {
        loop {
            match self.connection.receive()? {
                Some(Message::Unknown { kind }) => {
                    log::warn!("Ignoring message of unknown type {:?}", kind);
                }
                Some(message) => return Ok(message),
                None => return Err(Error::ConnectionClosed),
            }
        }
    }

    fn expect_ok(&mut self) -> Result<(String, Option<ResponseData>)> {
        match self.next_message()? {
            Message::Response { code, message, data } if codes::is_success(code) => Ok((message, data)),
            Message::Response { code, message, .. } => Err(Error::Remote { code, message }),
            other => Err(Error::Protocol(format!("expected response, got {}", other.kind()))),
        }
    }
}

fn open_stream(config: &ClientConfig) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in config.server_addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => Error::Io(e),
        None => Error::ConfigError(format!("{} resolved to no addresses", config.server_addr)),
    })
}
