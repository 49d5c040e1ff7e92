//! Header prefixing every record in the transport ring: `{ u32 type, u32
//! body_size }`. [`crate::transport::Transport::add_message`]/`next_message`
//! encode and decode this directly with `to_ne_bytes`/`from_ne_bytes` rather
//! than overlaying a struct on the ring's storage, since a message's header
//! or body can straddle the end of the ring and only
//! [`crate::concurrent::ring_buffer::RingBuffer::read_data`]/`write_data`
//! know how to split a copy across that wrap point.

/// The kinds of record carried on the transport ring.
///
/// Data-plane only; control messages (node/port updates, `set_param`,
/// `done`, ...) never touch this ring, they go over the resource channel
/// instead (see [`crate::control_protocol`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RingMessageType {
    /// Server → client: per-cycle input ports are staged, go process them.
    ProcessInput = 0,
    /// Server → client: per-cycle output ports are staged, go process them.
    ProcessOutput = 1,
    /// Client → server: output ports have been filled in.
    HaveOutput = 2,
    /// Client → server: input ports have been drained, ready for more.
    NeedInput = 3,
    /// Either direction: a buffer is no longer in use by the sender.
    ReuseBuffer = 4,
}

impl RingMessageType {
    /// Recover the enum from its wire value.
    pub fn from_u32(val: u32) -> Option<RingMessageType> {
        match val {
            0 => Some(RingMessageType::ProcessInput),
            1 => Some(RingMessageType::ProcessOutput),
            2 => Some(RingMessageType::HaveOutput),
            3 => Some(RingMessageType::NeedInput),
            4 => Some(RingMessageType::ReuseBuffer),
            _ => None,
        }
    }
}

/// Number of bytes a header occupies on the wire.
pub const MESSAGE_HEADER_LENGTH: usize = 8;
