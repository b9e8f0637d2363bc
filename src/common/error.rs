// Error types and error handling

use std::io;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// Frame could not be parsed; the stream cannot be resynchronized.
    MalformedFrame(String),
    /// A well-formed message arrived where a different one was required.
    Protocol(String),
    ConnectionClosed,
    FileNotFound(String),
    InvalidFilename(String),
    /// Non-success reply from the peer.
    Remote { code: u16, message: String },
    ConfigError(String),
    SerializationError(String),
}

impl Error {
    /// True when the failure came from the framing layer rather than the socket.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedFrame(_))
    }

    /// True when the peer went away, cleanly or not.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::MalformedFrame(e) => write!(f, "Malformed frame: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::FileNotFound(name) => write!(f, "File not found: {}", name),
            Error::InvalidFilename(name) => write!(f, "Invalid filename: {:?}", name),
            Error::Remote { code, message } => write!(f, "Server replied {}: {}", code, message),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::SerializationError(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
