//! Protocol module containing OSC message types, the binary codec and the
//! refresh sequence counter.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_packet, encode_message, flatten_packet, OscError};
pub use messages::*;
pub use sequence::SequenceCounter;
