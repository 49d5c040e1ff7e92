//! The resource channel: a reliable, ordered, fd-passing request/reply
//! channel to the client, carrying every control message that isn't a
//! per-cycle data-plane message (those go over the transport ring, see
//! [`crate::command`]).
//!
//! Split into two traits by direction of the call, not by message kind:
//! [`ResourceChannel`] is what the proxy calls on the client, and
//! [`ResourceChannelHandler`] is what the proxy implements to receive calls
//! the client makes on it. A concrete channel (backed by a real IPC
//! transport) implements `ResourceChannel` and drives a `ProxyNode`'s
//! `ResourceChannelHandler` impl as messages arrive.

use crate::error::Result;
use crate::node::NodeCommand;
use crate::port::{Direction, ParamBlob};

/// `update`'s `change_mask` bit selecting `max_inputs`.
pub const UPDATE_MAX_INPUTS: u32 = 1 << 0;
/// `update`'s `change_mask` bit selecting `max_outputs`.
pub const UPDATE_MAX_OUTPUTS: u32 = 1 << 1;
/// `update`'s `change_mask` bit selecting `params`.
pub const UPDATE_PARAMS: u32 = 1 << 2;

/// How a registered buffer's underlying memory is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// An anonymous shared-memory file descriptor (`memfd_create`).
    MemFd,
    /// A DMA-BUF file descriptor from a hardware device.
    DmaBuf,
}

/// One datum of a buffer, normalised for the wire: either an index into the
/// memory-region table built up by `add_mem` calls, or an offset relative to
/// another datum already registered that way.
#[derive(Debug, Clone)]
pub enum DataDescriptor {
    /// Indexes a previously registered region.
    Id {
        /// Id assigned by a preceding `add_mem` call.
        mem_id: u32,
        /// Maximum size of this datum's data.
        maxsize: u32,
    },
    /// An offset into a region some other datum of the same buffer already
    /// shares.
    MemPtr {
        /// Offset relative to the buffer's shared region.
        relative_offset: u32,
        /// Maximum size of this datum's data.
        maxsize: u32,
    },
    /// The datum's memory type could not be normalised.
    Invalid,
}

/// The wire form of a registered buffer, as sent by `use_buffers`.
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    /// Opaque handle the client uses to refer to this buffer.
    pub client_buffer_handle: u32,
    /// Metadata chunks (at most 4).
    pub metas: Vec<ParamBlob>,
    /// Data chunks (at most 4), normalised via preceding `add_mem` calls.
    pub datas: Vec<DataDescriptor>,
    /// Offset of this buffer's data within its backing region.
    pub offset: u32,
    /// Size of this buffer's data.
    pub size: u32,
}

/// Outbound calls the proxy makes on the client over the resource channel.
pub trait ResourceChannel {
    /// Forward a node-level parameter. `seq` is the sequence number the
    /// matching `done` reply will carry.
    fn set_param(&mut self, seq: u32, id: u32, flags: u32, blob: &ParamBlob) -> Result<()>;

    /// Forward a port-level parameter.
    fn port_set_param(
        &mut self,
        seq: u32,
        direction: Direction,
        id: u32,
        param_id: u32,
        flags: u32,
        blob: &ParamBlob,
    ) -> Result<()>;

    /// Register a shared-memory or DMA-BUF region the client will later see
    /// referenced by `mem_id` in a buffer descriptor.
    fn add_mem(
        &mut self,
        mem_id: u32,
        memory_type: MemoryType,
        fd: i32,
        flags: u32,
        mapoffset: u64,
        maxsize: u32,
    ) -> Result<()>;

    /// Send the normalised buffer descriptors for a port's new buffer pool.
    fn use_buffers(
        &mut self,
        seq: u32,
        direction: Direction,
        id: u32,
        buffers: &[BufferDescriptor],
    ) -> Result<()>;

    /// Send a command. `seq` is `None` for fire-and-forget commands
    /// (`ClockUpdate`), `Some` for everything else.
    fn command(&mut self, seq: Option<u32>, cmd: &NodeCommand) -> Result<()>;

    /// One-time publication of the transport: the shared-region handle plus
    /// the two wakeup file descriptors, sent after the first successful
    /// `done(0, 0)`.
    fn publish_transport(
        &mut self,
        region_fd: i32,
        region_size: u64,
        wakeup_us_fd: i32,
        wakeup_them_fd: i32,
    ) -> Result<()>;

    /// Tell the client to tear down its side of the resource.
    fn destroy(&mut self) -> Result<()>;
}

/// Inbound calls the client makes on the proxy over the resource channel.
/// `ProxyNode` implements this directly; a real channel dispatches each
/// incoming message to the matching method.
pub trait ResourceChannelHandler {
    /// Complete the pending async request identified by `seq`.
    /// `res == 0` indicates success. The very first `done(0, 0)` also marks
    /// the point at which the transport can be built.
    fn done(&mut self, seq: u32, res: i32);

    /// Update the node's capability caps and/or parameter list. Each of
    /// `max_inputs`, `max_outputs`, and `params` only takes effect if its
    /// corresponding `UPDATE_*` bit is set in `change_mask`; an unset field
    /// is left untouched.
    fn update(&mut self, change_mask: u32, max_inputs: u32, max_outputs: u32, params: Vec<ParamBlob>);

    /// Create, update, or remove a port. `change_mask == 0` means remove.
    fn port_update(
        &mut self,
        direction: Direction,
        id: u32,
        change_mask: u32,
        params: Vec<ParamBlob>,
        info: Option<ParamBlob>,
    );

    /// Toggle node activation, forwarded to the graph engine.
    fn set_active(&mut self, active: bool);

    /// An out-of-band event, forwarded upward through `callbacks.event`.
    fn event(&mut self, event: ParamBlob);

    /// Tear down the proxy.
    fn destroy(&mut self);
}
