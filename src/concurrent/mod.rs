//! Shared-memory primitives used by the transport.
//!
//! The lock-free single-producer/single-consumer ring buffer lives in
//! [`ring_buffer`]. `PortIo` cells and ring headers are overlaid directly
//! onto the mapped region in [`crate::transport`] via plain pointer casts,
//! since both are fixed `#[repr(C)]` layouts with no wraparound to account
//! for; the ring's variable-length byte storage is the one thing that does
//! wrap, and `RingBuffer::read_data`/`write_data` handle that directly.

pub mod ring_buffer;
