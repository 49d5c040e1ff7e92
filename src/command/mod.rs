//! Wire constants for records carried over the transport ring.

pub mod message_header;
pub mod reuse_buffer;

pub use message_header::{RingMessageType, MESSAGE_HEADER_LENGTH};
pub use reuse_buffer::REUSE_BUFFER_BODY_LENGTH;
