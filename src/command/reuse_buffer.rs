//! Body of a `ReuseBuffer` ring message: `{ u32 port_id, u32 buffer_id }`.
//!
//! Encoded/decoded directly with `to_ne_bytes`/`from_ne_bytes` in
//! [`crate::proxy::ProxyNode`] rather than through an overlay struct, for the
//! same reason as [`super::message_header`]: the body sits right after a
//! header that may itself have wrapped.

/// Number of bytes a `ReuseBuffer` body occupies on the wire.
pub const REUSE_BUFFER_BODY_LENGTH: usize = 8;
