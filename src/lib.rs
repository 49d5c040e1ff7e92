//! Server-side stand-in for a client's media-processing unit inside a media
//! graph server ("proxy node"), together with the shared-memory/eventfd
//! transport that carries per-cycle port I/O state and control messages
//! between server and client.
//!
//! This crate covers three things: the lock-free single-producer/single-
//! consumer ring buffer used to carry messages ([`concurrent::ring_buffer`]),
//! the transport built on top of it plus a shared memory region and a pair
//! of wakeup file descriptors ([`transport`]), and the proxy node state
//! machine that mediates between a graph engine's per-cycle I/O callbacks
//! and the transport ([`proxy`]).
//!
//! The encompassing graph engine, the wire encoding of structured
//! parameters, the client process itself, and resource/permission
//! bookkeeping are external collaborators, represented here only by the
//! trait boundaries in [`external`].
#![deny(missing_docs)]

#[cfg(target_endian = "big")]
compile_error!("proxy-node assumes little-endian shared memory layouts");

pub mod command;
pub mod concurrent;
pub mod context;
pub mod control_protocol;
pub mod error;
pub mod external;
pub mod node;
pub mod port;
pub mod proxy;
pub mod sequence;
pub mod transport;
pub mod util;

pub use error::{ProxyError, Result};
pub use node::Node;
pub use proxy::ProxyNode;
