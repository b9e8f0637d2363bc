//! Minimal TCP file transfer server and client.
//!
//! Every message is a 4-byte big-endian length followed by a JSON object
//! tagged by `type`. A file travels as a `file_transfer_start` header
//! carrying the byte count, immediately followed by exactly that many raw
//! bytes on the same stream.

pub mod common;
pub mod protocol;
pub mod transport;
pub mod storage;
pub mod server;
pub mod client;

pub use common::error::{Error, Result};
pub use common::config::{ClientConfig, ServerConfig};
pub use client::Client;
pub use server::{Server, ShutdownHandle};
