// Command vocabulary and validation

use std::fmt;
use crate::common::types::codes;

/// The fixed set of supported commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ls,
    Get,
    Put,
    Quit,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Ls,
        CommandKind::Get,
        CommandKind::Put,
        CommandKind::Quit,
    ];

    /// Case-insensitive lookup of a command token
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "LS" => Some(CommandKind::Ls),
            "GET" => Some(CommandKind::Get),
            "PUT" => Some(CommandKind::Put),
            "QUIT" => Some(CommandKind::Quit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Ls => "LS",
            CommandKind::Get => "GET",
            CommandKind::Put => "PUT",
            CommandKind::Quit => "QUIT",
        }
    }

    pub fn takes_filename(&self) -> bool {
        matches!(self, CommandKind::Get | CommandKind::Put)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a command token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Supported(CommandKind),
    Unsupported { code: u16, message: String },
}

impl Validation {
    pub fn code(&self) -> u16 {
        match self {
            Validation::Supported(_) => codes::OK,
            Validation::Unsupported { code, .. } => *code,
        }
    }
}

/// Map a raw command token to supported/unsupported plus an outcome code.
///
/// Pure: no I/O, no session state.
pub fn validate_command(token: &str) -> Validation {
    match CommandKind::parse(token) {
        Some(kind) => Validation::Supported(kind),
        None => Validation::Unsupported {
            code: codes::BAD_REQUEST,
            message: format!("unsupported command: {}", token.trim().to_ascii_uppercase()),
        },
    }
}
