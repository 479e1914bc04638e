//! Protocol module containing message types, byte-order negotiation, the
//! binary codec, and receive framing.

pub mod codec;
pub mod endian;
pub mod framer;
pub mod messages;

pub use codec::{decode_header, decode_message, encode_message, ProtocolError};
pub use endian::{Endianness, EndiannessNegotiator, Negotiation};
pub use framer::{Frame, Framer, FramingError, OverflowError, ReceiveBuffer};
pub use messages::*;
