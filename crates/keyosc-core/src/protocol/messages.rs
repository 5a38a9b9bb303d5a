//! OSC 1.0 message and packet types.
//!
//! An OSC *message* is an address pattern (`/keyosc/goto`) followed by a list
//! of typed arguments.  A *bundle* groups messages (or further bundles) under
//! one 64-bit NTP time tag.  KeyOSC ignores time tags: every message is
//! handled as soon as it arrives.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Marker string that starts every OSC bundle.
pub const BUNDLE_TAG: &str = "#bundle";

/// The special "immediately" time tag defined by OSC 1.0.
pub const TIMETAG_IMMEDIATE: u64 = 1;

// ── Argument types ────────────────────────────────────────────────────────────

/// One typed OSC argument.
///
/// Each variant maps to a single type-tag character on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// `i` – 32-bit big-endian two's complement integer.
    Int(i32),
    /// `f` – 32-bit big-endian IEEE 754 float.
    Float(f32),
    /// `s` – NUL-terminated string padded to a 4-byte boundary.
    Str(String),
    /// `b` – 32-bit size followed by that many bytes, padded.
    Blob(Vec<u8>),
    /// `h` – 64-bit big-endian integer.
    Long(i64),
    /// `d` – 64-bit big-endian IEEE 754 double.
    Double(f64),
    /// `T` – true, no payload bytes.
    True,
    /// `F` – false, no payload bytes.
    False,
    /// `N` – nil, no payload bytes.
    Nil,
}

impl OscArg {
    /// Returns the type-tag character for this argument.
    pub fn type_tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
            OscArg::Long(_) => 'h',
            OscArg::Double(_) => 'd',
            OscArg::True => 'T',
            OscArg::False => 'F',
            OscArg::Nil => 'N',
        }
    }

    /// Returns the string payload, if this is a string argument.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for OscArg {
    fn from(value: i32) -> Self {
        OscArg::Int(value)
    }
}

impl From<&str> for OscArg {
    fn from(value: &str) -> Self {
        OscArg::Str(value.to_string())
    }
}

impl From<String> for OscArg {
    fn from(value: String) -> Self {
        OscArg::Str(value)
    }
}

// ── Messages and packets ──────────────────────────────────────────────────────

/// A single OSC message: address pattern plus ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Creates a message with no arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Creates a message with exactly one argument.
    pub fn with_arg(address: impl Into<String>, arg: impl Into<OscArg>) -> Self {
        Self {
            address: address.into(),
            args: vec![arg.into()],
        }
    }

    /// Appends an argument, builder style.
    pub fn arg(mut self, arg: impl Into<OscArg>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// The top-level unit carried by one UDP datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle {
        /// NTP-format time tag (seconds since 1900 in the upper 32 bits).
        timetag: u64,
        content: Vec<OscPacket>,
    },
}
