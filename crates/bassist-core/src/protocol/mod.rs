//! Controller protocol
//!
//! - `tlv`: `len ‖ tag ‖ value` records shared with advertising data
//! - `message`: frame header, message types and subtypes
//! - `command`: typed commands parsed from command frames
//! - `event`: typed events encoded into event frames
//! - `stream`: async framing over a byte stream

pub mod command;
pub mod event;
pub mod message;
pub mod stream;
pub mod tlv;

pub use command::{AddSourceRequest, Command};
pub use event::Event;
pub use message::{CommandSubtype, EventSubtype, Message, MessageType, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use stream::{read_message, write_message, StreamError};
pub use tlv::{TlvCodec, TlvEntry, TlvTag};
