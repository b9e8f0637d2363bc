// Protocol module - message definitions, framing, command validation

pub mod codec;
pub mod command;
pub mod messages;

pub use codec::{read_message, read_message_limited, write_message, BodyCopy};
pub use command::{validate_command, CommandKind, Validation};
pub use messages::{Message, ResponseData};
