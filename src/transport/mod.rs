// Transport layer module

pub mod connection;

pub use connection::{Connection, ConnectionStats};
