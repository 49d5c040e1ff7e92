//! The node capability set the graph engine drives: eighteen operations
//! covering parameter negotiation, port lifecycle, buffer registration, and
//! the two per-cycle data-plane entry points.
//!
//! This is an explicit trait rather than a table of function pointers,
//! replacing the inline dispatch-table-of-callbacks the original exposes;
//! `ProxyNode` is the one implementer in this crate, but tests can supply
//! their own to exercise a graph engine in isolation.

use crate::error::{AsyncOutcome, ProxyError, Result};
use crate::external::GraphCallbacks;
use crate::port::{BufferDatum, Direction, ParamBlob, SharedMeta};

/// A command sent to the node via `send_command`.
///
/// `ClockUpdate` is fire-and-forget because it's high-frequency and
/// idempotent; every other command round-trips through the async-pending
/// sequencing.
#[derive(Debug, Clone)]
pub enum NodeCommand {
    /// A high-frequency, idempotent clock position update.
    ClockUpdate {
        /// Monotonic clock reading, in the graph engine's own units.
        nsec: u64,
    },
    /// Any other node command, opaque beyond its tagged id.
    Other(ParamBlob),
}

/// A buffer the graph engine is handing to `port_use_buffers`, prior to
/// normalisation into [`RegisteredBuffer`]'s wire-ready form.
#[derive(Debug, Clone)]
pub struct IncomingBuffer {
    /// Opaque handle the client will use to refer to this buffer.
    pub client_buffer_handle: u32,
    /// The buffer's own shared-memory descriptor, found on the buffer's
    /// metadata by the graph engine before handing it to `port_use_buffers`.
    /// `None` fails the whole call with [`crate::error::ProxyError::ArgInvalid`].
    pub shared_meta: Option<SharedMeta>,
    /// Metadata chunks (at most 4).
    pub metas: Vec<ParamBlob>,
    /// Data chunks (at most 4), not yet normalised for the wire.
    pub datas: Vec<BufferDatum>,
    /// Offset of this buffer's data within its backing region.
    pub offset: u32,
    /// Size of this buffer's data.
    pub size: u32,
}

/// Outcome of one `process_input`/`process_output` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Port state was staged and the client was signalled.
    Ok,
    /// Nothing to do this cycle; no message was sent.
    ///
    /// For `process_input`, this means `input_ready == 0`: every input
    /// port's I/O cell was reset to `NeedBuffer` so the graph engine
    /// recycles it, but no `ProcessInput` message went out.
    NeedBuffer,
}

/// Info describing a port, as carried by `port_get_info`/a port-update.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Direction of the port.
    pub direction: Direction,
    /// Port identifier.
    pub id: u32,
    /// Opaque info blob (name, media type, flags, ...).
    pub blob: Option<ParamBlob>,
}

/// The eighteen operations the graph engine drives on a proxy node.
pub trait Node {
    /// Iterate the node's parameter list starting at `*index`, advancing it
    /// by one per candidate, yielding the first blob matching `id` and
    /// passing `filter`. Returns `None` once the list is exhausted.
    fn enum_params(&self, id: u32, index: &mut u32, filter: Option<&ParamBlob>) -> Option<ParamBlob>;

    /// Forward a parameter to the client; returns the sequence number the
    /// eventual `done` reply will carry.
    fn set_param(&mut self, id: u32, flags: u32, blob: ParamBlob) -> Result<AsyncOutcome>;

    /// Send a command to the client. `ClockUpdate` completes immediately;
    /// everything else is async-pending.
    fn send_command(&mut self, cmd: NodeCommand) -> Result<AsyncOutcome>;

    /// Install the graph engine's per-cycle callbacks. Must be called
    /// before `process_input`/`process_output`.
    fn set_callbacks(&mut self, callbacks: Box<dyn GraphCallbacks>);

    /// `(n_inputs, max_inputs, n_outputs, max_outputs)`.
    fn get_n_ports(&self) -> (u32, u32, u32, u32);

    /// Valid port ids in `direction`, ascending.
    fn get_port_ids(&self, direction: Direction) -> Vec<u32>;

    /// Create a port at `id`; fails if out of range or already occupied.
    fn add_port(&mut self, direction: Direction, id: u32) -> Result<()>;

    /// Tear down an existing port; fails if it doesn't exist.
    fn remove_port(&mut self, direction: Direction, id: u32) -> Result<()>;

    /// Local read of a port's info; no transport activity.
    fn port_get_info(&self, direction: Direction, id: u32) -> Result<PortInfo>;

    /// Local read of a port's parameter list; same iteration contract as
    /// `enum_params`.
    fn port_enum_params(
        &self,
        direction: Direction,
        id: u32,
        param_id: u32,
        index: &mut u32,
        filter: Option<&ParamBlob>,
    ) -> Result<Option<ParamBlob>>;

    /// Forward a port parameter to the client; async-pending. A Format
    /// object flips the port's `have_format`.
    fn port_set_param(
        &mut self,
        direction: Direction,
        id: u32,
        param_id: u32,
        flags: u32,
        blob: ParamBlob,
    ) -> Result<AsyncOutcome>;

    /// Register a buffer pool on a port. Requires `have_format == true`;
    /// async-pending.
    fn port_use_buffers(
        &mut self,
        direction: Direction,
        id: u32,
        buffers: Vec<IncomingBuffer>,
    ) -> Result<AsyncOutcome>;

    /// Always fails with [`ProxyError::NotSupported`]; buffer allocation on
    /// behalf of the client is not implemented.
    fn port_alloc_buffers(&mut self, direction: Direction, id: u32) -> Result<AsyncOutcome> {
        let _ = (direction, id);
        Err(ProxyError::NotSupported)
    }

    /// Bind a port's I/O slot. Must happen before `process_input`/
    /// `process_output` will touch that port.
    fn port_set_io(&mut self, direction: Direction, id: u32, io_ref: u32) -> Result<()>;

    /// Return a buffer to circulation: appends a `ReuseBuffer` message and
    /// signals the client.
    fn port_reuse_buffer(&mut self, id: u32, buffer_id: u32) -> Result<()>;

    /// Always fails with [`ProxyError::NotSupported`]; kept as a stub until
    /// the protocol defines a port-directed command set.
    fn port_send_command(&mut self, direction: Direction, id: u32, cmd: NodeCommand) -> Result<()> {
        let _ = (direction, id, cmd);
        Err(ProxyError::NotSupported)
    }

    /// Drive one input cycle: stage input port state into the transport and
    /// signal the client, or report that no input is ready yet.
    fn process_input(&mut self) -> Result<CycleOutcome>;

    /// Drive one output cycle: stage output port state into the transport
    /// and signal the client, coalescing with any still-pending cycle.
    fn process_output(&mut self) -> Result<CycleOutcome>;
}
