// Length-prefixed JSON framing and raw body transfer
//
// Frame: 4-byte big-endian payload length, then that many bytes of JSON.
// Bodies follow a FileHeader frame and carry no framing of their own.

use std::io::{self, Read, Write};
use serde_json::Value;
use crate::common::error::{Error, Result};
use crate::common::types::{BODY_BUFFER_SIZE, FRAME_HEADER_LEN, MAX_FRAME_SIZE, MAX_REPLY_FRAME_SIZE};
use super::messages::{Message, KNOWN_TYPES};

/// Serialize a message into a complete frame (prefix + payload).
///
/// Outgoing frames are only bounded by [`MAX_REPLY_FRAME_SIZE`]; the tighter
/// request limit is enforced by whoever reads them.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| Error::SerializationError(e.to_string()))?;

    if payload.len() > MAX_REPLY_FRAME_SIZE {
        return Err(Error::SerializationError(format!(
            "Message too large: {} bytes (max {})",
            payload.len(),
            MAX_REPLY_FRAME_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parse a frame payload.
///
/// Required fields are checked here so handlers only ever see complete
/// variants. An unrecognised but well-formed `type` is returned as
/// [`Message::Unknown`], not as an error.
pub fn decode_payload(payload: &[u8]) -> Result<Message> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::MalformedFrame(format!("invalid JSON: {}", e)))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => {
            return Err(Error::MalformedFrame(format!("non-string type field: {}", other)));
        }
        None => return Err(Error::MalformedFrame("missing type field".to_string())),
    };

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Ok(Message::Unknown { kind });
    }

    serde_json::from_value(value)
        .map_err(|e| Error::MalformedFrame(format!("invalid {} message: {}", kind, e)))
}

/// Write one message as a single contiguous frame.
///
/// # Returns
/// Number of bytes put on the wire, prefix included
pub fn write_message<W: Write + ?Sized>(writer: &mut W, message: &Message) -> Result<usize> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(frame.len())
}

/// Block until a whole frame is available and decode it.
///
/// # Returns
/// * `Ok(Some(msg))` - a complete message
/// * `Ok(None)` - the peer closed the stream cleanly between frames
/// * `Err(Error::MalformedFrame)` - oversized frame or undecodable payload
/// * `Err(Error::Io)` - socket failure, including EOF inside a frame
pub fn read_message<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Message>> {
    read_message_limited(reader, MAX_FRAME_SIZE)
}

/// [`read_message`] with a caller-chosen payload limit
pub fn read_message_limited<R: Read + ?Sized>(reader: &mut R, max_len: usize) -> Result<Option<Message>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;

    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside frame header",
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(Error::MalformedFrame(format!(
            "frame length {} exceeds limit {}",
            len, max_len
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    decode_payload(&payload).map(Some)
}

/// Write raw body bytes with no framing
pub fn write_body<W: Write + ?Sized>(writer: &mut W, body: &[u8]) -> Result<()> {
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Copy exactly `size` bytes from `source` to `writer`.
///
/// Fails with `UnexpectedEof` if the source runs dry early; at that point the
/// receiver has been promised more bytes than it will get and the stream is
/// no longer usable.
pub fn copy_body<R, W>(source: &mut R, size: u64, writer: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let copied = io::copy(&mut source.take(size), writer)?;
    if copied != size {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("body source ended after {} of {} bytes", copied, size),
        )));
    }
    writer.flush()?;
    Ok(copied)
}

/// Read exactly `size` body bytes into memory
pub fn read_body<R: Read + ?Sized>(reader: &mut R, size: u64) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(size.min(MAX_FRAME_SIZE as u64) as usize);
    let outcome = read_body_into(reader, size, &mut body)?;
    if let Some(e) = outcome.sink_error {
        return Err(e.into());
    }
    Ok(body)
}

/// Result of streaming a body into a sink
#[derive(Debug)]
pub struct BodyCopy {
    /// Bytes taken off the stream (always the declared size on success)
    pub received: u64,
    /// First sink failure, if any; later bytes were read and discarded
    pub sink_error: Option<io::Error>,
}

/// Read exactly `size` body bytes from `reader`, feeding them to `sink`.
///
/// A failing sink does not abort the read: the rest of the body is still
/// consumed so the next frame starts where the peer expects it.
pub fn read_body_into<R, W>(reader: &mut R, size: u64, sink: &mut W) -> Result<BodyCopy>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; BODY_BUFFER_SIZE.min(size.max(1) as usize)];
    let mut remaining = size;
    let mut sink_error = None;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed with {} body bytes outstanding", remaining),
                )));
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if sink_error.is_none() {
            if let Err(e) = sink.write_all(&buf[..n]) {
                sink_error = Some(e);
            }
        }
        remaining -= n as u64;
    }

    if sink_error.is_none() {
        if let Err(e) = sink.flush() {
            sink_error = Some(e);
        }
    }

    Ok(BodyCopy { received: size, sink_error })
}
