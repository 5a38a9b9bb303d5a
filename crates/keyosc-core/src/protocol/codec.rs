//! Binary codec for OSC 1.0 messages and bundles.
//!
//! Wire format of a message:
//! ```text
//! [address:padded-string][",itsb...":padded-string][arg 0][arg 1]...
//! ```
//! Wire format of a bundle:
//! ```text
//! ["#bundle\0":8][timetag:8]([element_size:4][element:N])*
//! ```
//! Strings are NUL-terminated and padded with NULs to a multiple of 4 bytes.
//! Blobs carry a 4-byte size and are padded the same way.  All multi-byte
//! numbers are big-endian.

use crate::protocol::messages::{OscArg, OscMessage, OscPacket, BUNDLE_TAG};
use thiserror::Error;

/// Bundles nested deeper than this are rejected.
const MAX_BUNDLE_DEPTH: usize = 8;

/// Errors that can occur during packet encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum OscError {
    /// The byte slice ended before a field was complete.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A string field has no NUL terminator inside the buffer.
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),

    /// A string to be encoded contains an interior NUL byte.
    #[error("string contains an interior NUL byte")]
    InteriorNul,

    /// Message addresses must start with `/`.
    #[error("invalid address pattern: {0:?}")]
    InvalidAddress(String),

    /// The type-tag string does not start with `,`.
    #[error("malformed type tag string: {0:?}")]
    MalformedTypeTags(String),

    /// The type tag is valid OSC but not supported by this codec.
    #[error("unsupported type tag: '{0}'")]
    UnsupportedTypeTag(char),

    /// A bundle element size is not a multiple of 4 or overruns the packet.
    #[error("invalid bundle element size {size} at offset {offset}")]
    InvalidElementSize { size: usize, offset: usize },

    /// Bundles nest deeper than [`MAX_BUNDLE_DEPTH`].
    #[error("bundle nesting exceeds {MAX_BUNDLE_DEPTH} levels")]
    BundleTooDeep,

    /// The packet starts with neither `/` nor `#bundle`.
    #[error("packet is neither a message nor a bundle")]
    UnrecognizedPacket,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a single [`OscMessage`] into a datagram payload.
///
/// # Errors
///
/// Returns [`OscError::InvalidAddress`] if the address does not start with
/// `/`, or [`OscError::InteriorNul`] if any string contains a NUL byte.
///
/// # Examples
///
/// ```rust
/// use keyosc_core::protocol::{decode_packet, encode_message, OscMessage, OscPacket};
///
/// let msg = OscMessage::with_arg("/keyosc/goto", 4);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes.len() % 4, 0);
/// assert_eq!(decode_packet(&bytes).unwrap(), OscPacket::Message(msg));
/// ```
pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>, OscError> {
    if !msg.address.starts_with('/') {
        return Err(OscError::InvalidAddress(msg.address.clone()));
    }

    let mut buf = Vec::with_capacity(msg.address.len() + 8 + msg.args.len() * 8);
    write_padded_str(&mut buf, &msg.address)?;

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    tags.extend(msg.args.iter().map(OscArg::type_tag));
    write_padded_str(&mut buf, &tags)?;

    for arg in &msg.args {
        match arg {
            OscArg::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Str(s) => write_padded_str(&mut buf, s)?,
            OscArg::Blob(data) => write_blob(&mut buf, data),
            OscArg::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Double(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::True | OscArg::False | OscArg::Nil => {} // no payload bytes
        }
    }
    Ok(buf)
}

/// Encodes an [`OscPacket`] (message or bundle, possibly nested).
///
/// # Errors
///
/// Propagates any [`OscError`] from the contained messages.
pub fn encode_packet(packet: &OscPacket) -> Result<Vec<u8>, OscError> {
    match packet {
        OscPacket::Message(msg) => encode_message(msg),
        OscPacket::Bundle { timetag, content } => {
            let mut buf = Vec::new();
            write_padded_str(&mut buf, BUNDLE_TAG)?;
            buf.extend_from_slice(&timetag.to_be_bytes());
            for element in content {
                let bytes = encode_packet(element)?;
                buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(&bytes);
            }
            Ok(buf)
        }
    }
}

/// Decodes one datagram into an [`OscPacket`].
///
/// # Errors
///
/// Returns [`OscError`] if the bytes are malformed.
pub fn decode_packet(bytes: &[u8]) -> Result<OscPacket, OscError> {
    decode_packet_at_depth(bytes, 0)
}

/// Flattens a packet into its messages in wire order.
///
/// Bundle time tags are discarded: KeyOSC executes everything immediately.
pub fn flatten_packet(packet: OscPacket) -> Vec<OscMessage> {
    let mut out = Vec::new();
    collect_messages(packet, &mut out);
    out
}

fn collect_messages(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle { content, .. } => {
            for element in content {
                collect_messages(element, out);
            }
        }
    }
}

// ── Packet decoding ───────────────────────────────────────────────────────────

fn decode_packet_at_depth(bytes: &[u8], depth: usize) -> Result<OscPacket, OscError> {
    match bytes.first() {
        Some(b'/') => decode_message(bytes).map(OscPacket::Message),
        Some(b'#') => decode_bundle(bytes, depth),
        Some(_) => Err(OscError::UnrecognizedPacket),
        None => Err(OscError::InsufficientData {
            needed: 4,
            available: 0,
        }),
    }
}

fn decode_bundle(bytes: &[u8], depth: usize) -> Result<OscPacket, OscError> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(OscError::BundleTooDeep);
    }

    let mut reader = Reader::new(bytes);
    let tag = reader.read_padded_str()?;
    if tag != BUNDLE_TAG {
        return Err(OscError::UnrecognizedPacket);
    }
    let timetag = reader.read_u64()?;

    let mut content = Vec::new();
    while !reader.is_empty() {
        let offset = reader.pos;
        let size = reader.read_u32()? as usize;
        if size % 4 != 0 || size > reader.remaining() {
            return Err(OscError::InvalidElementSize { size, offset });
        }
        let element = reader.take(size)?;
        content.push(decode_packet_at_depth(element, depth + 1)?);
    }

    Ok(OscPacket::Bundle { timetag, content })
}

fn decode_message(bytes: &[u8]) -> Result<OscMessage, OscError> {
    let mut reader = Reader::new(bytes);
    let address = reader.read_padded_str()?;
    if !address.starts_with('/') {
        return Err(OscError::InvalidAddress(address));
    }

    // OSC 1.0 tolerates senders that omit the type-tag string entirely.
    if reader.is_empty() {
        return Ok(OscMessage {
            address,
            args: Vec::new(),
        });
    }

    let tags = reader.read_padded_str()?;
    let Some(tag_chars) = tags.strip_prefix(',') else {
        return Err(OscError::MalformedTypeTags(tags));
    };

    let mut args = Vec::with_capacity(tag_chars.len());
    for tag in tag_chars.chars() {
        let arg = match tag {
            'i' => OscArg::Int(reader.read_u32()? as i32),
            'f' => OscArg::Float(f32::from_bits(reader.read_u32()?)),
            's' => OscArg::Str(reader.read_padded_str()?),
            'b' => OscArg::Blob(reader.read_blob()?),
            'h' => OscArg::Long(reader.read_u64()? as i64),
            'd' => OscArg::Double(f64::from_bits(reader.read_u64()?)),
            'T' => OscArg::True,
            'F' => OscArg::False,
            'N' => OscArg::Nil,
            other => return Err(OscError::UnsupportedTypeTag(other)),
        };
        args.push(arg);
    }

    Ok(OscMessage { address, args })
}

// ── Encode helpers ────────────────────────────────────────────────────────────

/// Number of bytes `len` occupies once rounded up to the 4-byte boundary.
fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn write_padded_str(buf: &mut Vec<u8>, s: &str) -> Result<(), OscError> {
    if s.as_bytes().contains(&0) {
        return Err(OscError::InteriorNul);
    }
    buf.extend_from_slice(s.as_bytes());
    // At least one NUL terminator, then pad to the boundary.
    let total = padded_len(s.len() + 1);
    buf.resize(buf.len() + (total - s.len()), 0);
    Ok(())
}

fn write_blob(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    buf.resize(buf.len() + (padded_len(data.len()) - data.len()), 0);
}

// ── Decode helpers ────────────────────────────────────────────────────────────

/// Forward-only cursor over a datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], OscError> {
        if self.remaining() < n {
            return Err(OscError::InsufficientData {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, OscError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, OscError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_padded_str(&mut self) -> Result<String, OscError> {
        let start = self.pos;
        let nul = self.buf[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(OscError::UnterminatedString(start))?;
        let s = std::str::from_utf8(&self.buf[start..start + nul])
            .map_err(|_| OscError::InvalidUtf8(start))?
            .to_string();
        self.take(padded_len(nul + 1))?;
        Ok(s)
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, OscError> {
        let size = self.read_u32()? as usize;
        let data = self.take(size)?.to_vec();
        self.take(padded_len(size) - size)?;
        Ok(data)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
