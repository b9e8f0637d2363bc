// Storage module - the shared file directory

pub mod locks;
pub mod store;

pub use locks::FileLocks;
pub use store::{validate_filename, FileStore, Upload};
