// Common type definitions and constants

use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Status codes carried by `connection` and `response` messages.
///
/// Only the 200 / not-200 boundary is branched on; the other values are
/// informational.
pub mod codes {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const SERVER_ERROR: u16 = 500;

    pub fn is_success(code: u16) -> bool {
        code == OK
    }
}

/// One entry of an LS listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self { name: name.into(), size }
    }
}

// Constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5002";
pub const DEFAULT_ROOT_DIR: &str = "./server_files";
pub const DEFAULT_CLIENT_DIR: &str = "./client_files";
pub const FRAME_HEADER_LEN: usize = 4;
pub const MAX_FRAME_SIZE: usize = 1024 * 1024; // 1MB, requests
/// Replies can carry a whole listing, so clients accept larger frames
pub const MAX_REPLY_FRAME_SIZE: usize = 64 * 1024 * 1024; // 64MB
/// Files named in the text of an LS reply; the full set is in `data.files`
pub const LISTING_PREVIEW_LEN: usize = 20;
pub const BODY_BUFFER_SIZE: usize = 64 * 1024; // 64KB
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefix of in-flight upload files inside the store; hidden from listings.
pub const UPLOAD_TEMP_PREFIX: &str = ".ftpx-upload-";
