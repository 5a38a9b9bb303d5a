//! Inbound command parsing.
//!
//! Every inbound OSC message is turned into exactly one [`Command`] variant.
//! Addresses the bridge does not know become [`Command::Unknown`] rather than
//! an error, so the router can log and skip them explicitly.  Messages with a
//! known address but bad arguments fail with a [`CommandError`].
//!
//! Supported addresses (the `/keyosc` namespace prefix is optional):
//!
//! | Address                  | Argument           |
//! |--------------------------|--------------------|
//! | `/start`                 | –                  |
//! | `/start-from-beginning`  | –                  |
//! | `/stop`                  | –                  |
//! | `/next`                  | –                  |
//! | `/previous`              | –                  |
//! | `/goto`                  | slide number       |
//! | `/open`                  | path               |
//! | `/open-base64`           | base64 path        |
//! | `/close`                 | –                  |
//! | `/list`                  | optional directory |
//! | `/set-path`              | directory          |
//! | `/status`                | –                  |

use std::path::PathBuf;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use thiserror::Error;

use crate::protocol::messages::{OscArg, OscMessage};

/// Standard alphabet, padding optional.  Control surfaces differ on whether
/// they pad.
const PATH_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Activates the host application and restarts from slide 1.
    StartFromBeginning,
    Stop,
    Next,
    Previous,
    /// Jump to a 1-based slide number.
    GoTo(u32),
    Open(PathBuf),
    /// Same as [`Command::Open`]; the path has already been decoded.
    OpenBase64(PathBuf),
    /// Close the front document without saving.
    Close,
    /// List presentations in the given directory, or the configured one.
    List(Option<PathBuf>),
    SetPath(PathBuf),
    /// Force an immediate status refresh.
    Status,
    /// Any address outside the table above.
    Unknown(String),
}

/// Why a message with a known address could not become a command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{command}: missing argument")]
    MissingArgument { command: &'static str },

    #[error("{command}: expected {expected} argument, got type '{got}'")]
    WrongArgumentType {
        command: &'static str,
        expected: &'static str,
        got: char,
    },

    #[error("/goto: {0:?} is not an integer")]
    NotAnInteger(String),

    #[error("/goto: slide number {0} is out of range")]
    SlideOutOfRange(i64),

    #[error("/open-base64: invalid base64: {0}")]
    InvalidBase64(String),

    #[error("/open-base64: decoded path is not valid UTF-8")]
    DecodedNotUtf8,
}

impl Command {
    /// Parses `msg`, accepting addresses with or without `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when a known command has a missing or
    /// malformed argument.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keyosc_core::{Command, OscMessage};
    ///
    /// let cmd = Command::parse("/keyosc", &OscMessage::with_arg("/keyosc/goto", 4)).unwrap();
    /// assert_eq!(cmd, Command::GoTo(4));
    ///
    /// let bare = Command::parse("/keyosc", &OscMessage::new("/next")).unwrap();
    /// assert_eq!(bare, Command::Next);
    /// ```
    pub fn parse(namespace: &str, msg: &OscMessage) -> Result<Command, CommandError> {
        let address = strip_namespace(namespace, &msg.address);
        let first = msg.args.first();

        let cmd = match address {
            "/start" => Command::Start,
            "/start-from-beginning" => Command::StartFromBeginning,
            "/stop" => Command::Stop,
            "/next" => Command::Next,
            "/previous" => Command::Previous,
            "/goto" => Command::GoTo(parse_slide_number(first)?),
            "/open" => Command::Open(PathBuf::from(required_str("/open", first)?)),
            "/open-base64" => {
                let encoded = required_str("/open-base64", first)?;
                Command::OpenBase64(decode_base64_path(encoded)?)
            }
            "/close" => Command::Close,
            "/list" => Command::List(optional_str("/list", first)?.map(PathBuf::from)),
            "/set-path" => Command::SetPath(PathBuf::from(required_str("/set-path", first)?)),
            "/status" => Command::Status,
            _ => Command::Unknown(msg.address.clone()),
        };
        Ok(cmd)
    }

    /// `true` for commands that drive the presentation and are followed by a
    /// status refresh.
    pub fn changes_state(&self) -> bool {
        matches!(
            self,
            Command::Start
                | Command::StartFromBeginning
                | Command::Stop
                | Command::Next
                | Command::Previous
                | Command::GoTo(_)
                | Command::Open(_)
                | Command::OpenBase64(_)
                | Command::Close
        )
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::StartFromBeginning => "start-from-beginning",
            Command::Stop => "stop",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::GoTo(_) => "goto",
            Command::Open(_) => "open",
            Command::OpenBase64(_) => "open-base64",
            Command::Close => "close",
            Command::List(_) => "list",
            Command::SetPath(_) => "set-path",
            Command::Status => "status",
            Command::Unknown(_) => "unknown",
        }
    }
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn strip_namespace<'a>(namespace: &str, address: &'a str) -> &'a str {
    let prefix = namespace.trim_end_matches('/');
    if prefix.is_empty() {
        return address;
    }
    match address.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => address,
    }
}

fn required_str<'a>(command: &'static str, arg: Option<&'a OscArg>) -> Result<&'a str, CommandError> {
    match optional_str(command, arg)? {
        Some(s) => Ok(s),
        None => Err(CommandError::MissingArgument { command }),
    }
}

/// A blank string counts as absent.
fn optional_str<'a>(
    command: &'static str,
    arg: Option<&'a OscArg>,
) -> Result<Option<&'a str>, CommandError> {
    match arg {
        None | Some(OscArg::Nil) => Ok(None),
        Some(OscArg::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(OscArg::Str(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(CommandError::WrongArgumentType {
            command,
            expected: "string",
            got: other.type_tag(),
        }),
    }
}

fn parse_slide_number(arg: Option<&OscArg>) -> Result<u32, CommandError> {
    let raw: i64 = match arg {
        None | Some(OscArg::Nil) => {
            return Err(CommandError::MissingArgument { command: "/goto" })
        }
        Some(OscArg::Int(n)) => i64::from(*n),
        Some(OscArg::Long(n)) => *n,
        Some(OscArg::Float(f)) => float_slide(f64::from(*f))?,
        Some(OscArg::Double(d)) => float_slide(*d)?,
        Some(OscArg::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CommandError::NotAnInteger(s.clone()))?,
        Some(other) => {
            return Err(CommandError::WrongArgumentType {
                command: "/goto",
                expected: "integer",
                got: other.type_tag(),
            })
        }
    };

    if raw < 1 || raw > i64::from(u32::MAX) {
        return Err(CommandError::SlideOutOfRange(raw));
    }
    Ok(raw as u32)
}

/// Faders send floats; a whole-valued float is accepted as a slide number.
fn float_slide(value: f64) -> Result<i64, CommandError> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        Ok(value as i64)
    } else {
        Err(CommandError::NotAnInteger(value.to_string()))
    }
}

fn decode_base64_path(encoded: &str) -> Result<PathBuf, CommandError> {
    let bytes = PATH_BASE64
        .decode(encoded.trim())
        .map_err(|e| CommandError::InvalidBase64(e.to_string()))?;
    let path = String::from_utf8(bytes).map_err(|_| CommandError::DecodedNotUtf8)?;
    if path.trim().is_empty() {
        return Err(CommandError::MissingArgument {
            command: "/open-base64",
        });
    }
    Ok(PathBuf::from(path))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
