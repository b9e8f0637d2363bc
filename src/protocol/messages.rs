// Protocol message types

use serde::{Serialize, Deserialize};
use crate::common::types::{codes, FileEntry, LISTING_PREVIEW_LEN};

/// Every `type` tag this side knows how to decode.
pub const KNOWN_TYPES: &[&str] = &["connection", "command", "response", "file_transfer_start"];

/// One framed message on the wire.
///
/// The JSON shape is an object tagged by `type`. A tag outside
/// [`KNOWN_TYPES`] decodes to [`Message::Unknown`] so the receiver can log and
/// drop it; `Unknown` itself is never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Server greeting, sent once right after accept
    Connection { code: u16, message: String },

    /// Client request; `filename` only for GET/PUT
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// Generic acknowledgment or error
    Response {
        code: u16,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },

    /// Precedes exactly `size` raw body bytes on the same stream
    #[serde(rename = "file_transfer_start")]
    FileHeader { filename: String, size: u64 },

    #[serde(skip)]
    Unknown { kind: String },
}

/// Structured payload attached to a response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl Message {
    pub fn connection_established() -> Self {
        Message::Connection {
            code: codes::OK,
            message: "Connection established".to_string(),
        }
    }

    pub fn command(command: impl Into<String>, filename: Option<&str>) -> Self {
        Message::Command {
            command: command.into(),
            filename: filename.map(str::to_string),
        }
    }

    pub fn response(code: u16, message: impl Into<String>) -> Self {
        Message::Response {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::response(codes::OK, message)
    }

    pub fn goodbye() -> Self {
        Self::ok("Goodbye")
    }

    /// LS reply: count and the first few names in the text, every name/size
    /// pair in `data`
    pub fn listing(files: Vec<FileEntry>) -> Self {
        Message::Response {
            code: codes::OK,
            message: describe_listing(&files),
            data: Some(ResponseData { files }),
        }
    }

    pub fn file_header(filename: impl Into<String>, size: u64) -> Self {
        Message::FileHeader {
            filename: filename.into(),
            size,
        }
    }

    /// The `type` tag as it appears on the wire
    pub fn kind(&self) -> &str {
        match self {
            Message::Connection { .. } => "connection",
            Message::Command { .. } => "command",
            Message::Response { .. } => "response",
            Message::FileHeader { .. } => "file_transfer_start",
            Message::Unknown { kind } => kind,
        }
    }
}

fn describe_listing(files: &[FileEntry]) -> String {
    if files.is_empty() {
        return "0 file(s)".to_string();
    }
    let names: Vec<String> = files
        .iter()
        .take(LISTING_PREVIEW_LEN)
        .map(|f| format!("{} ({} bytes)", f.name, f.size))
        .collect();

    let mut text = format!("{} file(s): {}", files.len(), names.join(", "));
    if files.len() > LISTING_PREVIEW_LEN {
        text.push_str(&format!(", ... and {} more", files.len() - LISTING_PREVIEW_LEN));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_shape() {
        let value = serde_json::to_value(Message::connection_established()).unwrap();
        assert_eq!(
            value,
            json!({"type": "connection", "code": 200, "message": "Connection established"})
        );
    }

    #[test]
    fn test_command_omits_missing_filename() {
        let value = serde_json::to_value(Message::command("LS", None)).unwrap();
        assert_eq!(value, json!({"type": "command", "command": "LS"}));

        let value = serde_json::to_value(Message::command("GET", Some("a.txt"))).unwrap();
        assert_eq!(value, json!({"type": "command", "command": "GET", "filename": "a.txt"}));
    }

    #[test]
    fn test_file_header_tag() {
        let value = serde_json::to_value(Message::file_header("a.txt", 5)).unwrap();
        assert_eq!(
            value,
            json!({"type": "file_transfer_start", "filename": "a.txt", "size": 5})
        );
    }

    #[test]
    fn test_empty_listing() {
        match Message::listing(Vec::new()) {
            Message::Response { code, message, data } => {
                assert_eq!(code, 200);
                assert_eq!(message, "0 file(s)");
                assert_eq!(data.unwrap().files.len(), 0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_listing_embeds_count_and_names() {
        let files = vec![FileEntry::new("a.txt", 5), FileEntry::new("b.bin", 0)];
        match Message::listing(files.clone()) {
            Message::Response { message, data, .. } => {
                assert_eq!(message, "2 file(s): a.txt (5 bytes), b.bin (0 bytes)");
                assert_eq!(data.unwrap().files, files);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_long_listing_text_is_truncated() {
        let files: Vec<FileEntry> = (0..25).map(|i| FileEntry::new(format!("f{:02}", i), 1)).collect();
        match Message::listing(files) {
            Message::Response { message, data, .. } => {
                assert!(message.starts_with("25 file(s): f00 (1 bytes), "));
                assert!(message.contains("f19 (1 bytes)"));
                assert!(!message.contains("f20"));
                assert!(message.ends_with(", ... and 5 more"));
                assert_eq!(data.unwrap().files.len(), 25);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_is_never_serialized() {
        let msg = Message::Unknown { kind: "ping".into() };
        assert_eq!(msg.kind(), "ping");
        assert!(serde_json::to_vec(&msg).is_err());
    }
}
