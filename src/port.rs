//! Port table: the fixed-capacity arrays of input/output port slots that
//! back `get_n_ports`, `add_port`, `remove_port`, and the buffer pool each
//! port carries once it has a negotiated format.

use crate::error::{ProxyError, Result};

/// Maximum number of ports the table can track in one direction, absent an
/// explicit lower cap from [`crate::context::Context`].
pub const MAX_PORTS: usize = 64;

/// Maximum number of buffers a single port may have registered at once.
pub const BUFFERS_MAX: usize = 64;

/// Which way data flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Data flows from the client into the graph.
    Input,
    /// Data flows from the graph out to the client.
    Output,
}

/// An opaque, process-local description of a negotiated parameter (a
/// format, port info, or command payload). The proxy never interprets the
/// bytes itself beyond recognizing the Format object id; encoding and
/// decoding are the job of a [`crate::external::ParameterCodec`].
#[derive(Debug, Clone)]
pub struct ParamBlob {
    /// Type-map id identifying what kind of object this blob encodes.
    pub object_id: u32,
    /// The encoded bytes, opaque to everything but the codec.
    pub bytes: Vec<u8>,
}

/// One data location backing a registered buffer: either a file descriptor
/// shared with the client (a `memfd` or a `dma-buf`), or an offset into
/// memory the buffer's first datum already shared.
#[derive(Debug, Clone)]
pub enum BufferDatum {
    /// An anonymous shared-memory region (`memfd_create`), identified by
    /// `fd` until it is registered, at which point `mem_id` replaces it on
    /// the wire.
    MemFd {
        /// Raw file descriptor as supplied by the client; owned by the
        /// registered-memory table once registration succeeds.
        fd: i32,
        /// Client-supplied flags (e.g. read-only).
        flags: u32,
        /// Offset into the mapping where this datum's data begins.
        mapoffset: u64,
        /// Maximum size of the datum's data.
        maxsize: u32,
    },
    /// A DMA-BUF file descriptor from a hardware device; same registration
    /// path as `MemFd`, distinguished only by the memory type `add_mem`
    /// records.
    DmaBuf {
        /// Raw file descriptor as supplied by the client.
        fd: i32,
        /// Client-supplied flags.
        flags: u32,
        /// Offset into the mapping where this datum's data begins.
        mapoffset: u64,
        /// Maximum size of the datum's data.
        maxsize: u32,
    },
    /// A region with no fd of its own, sharing the buffer's first `MemFd`
    /// datum's mapping at `relative_offset`.
    MemPtr {
        /// Offset relative to the buffer's shared region.
        relative_offset: u32,
        /// Maximum size of the datum's data.
        maxsize: u32,
    },
    /// The datum's memory type was neither of the above and could not be
    /// normalised; kept only so the buffer's datum count stays accurate.
    Invalid,
    /// A datum that has been normalised for the wire: its underlying memory
    /// was registered and is now referred to purely by id.
    Id {
        /// Index into the registered-memory table.
        mem_id: u32,
        /// Maximum size of the datum's data.
        maxsize: u32,
    },
}

/// A buffer's own shared-memory descriptor (`spa_meta_shared` in the
/// original): the fd backing the buffer's `metas`/`datas` tables themselves,
/// distinct from any fd a datum carries. Registered as a `mem_id` of its own
/// before any of the buffer's datums are registered; a buffer lacking one is
/// rejected outright rather than silently accepted.
#[derive(Debug, Clone, Copy)]
pub struct SharedMeta {
    /// File descriptor backing the buffer's shared region.
    pub fd: i32,
    /// Client-supplied flags.
    pub flags: u32,
    /// Offset into the mapping where the buffer's region begins.
    pub mapoffset: u64,
    /// Size of the buffer's shared region.
    pub maxsize: u32,
}

/// A buffer a client has made available for a port, plus whatever metadata
/// (timing, header info, ...) travels alongside its data.
#[derive(Debug, Clone, Default)]
pub struct RegisteredBuffer {
    /// Opaque handle identifying this buffer to the client.
    pub client_buffer_handle: u32,
    /// Metadata chunks, at most 4 per the wire format.
    pub metas: Vec<ParamBlob>,
    /// Data chunks, at most 4 per the wire format.
    pub datas: Vec<BufferDatum>,
    /// Offset of this buffer's data within its backing region.
    pub offset: u32,
    /// Size of this buffer's data.
    pub size: u32,
    /// `true` once the buffer has been handed off and not yet returned by a
    /// `ReuseBuffer` message.
    pub outstanding: bool,
}

/// Status published in a port's `PortIo` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortIoStatus {
    /// Buffer is valid and ready to be consumed/produced.
    Ok,
    /// The side that owns the next step needs a buffer before continuing.
    NeedBuffer,
    /// A buffer is staged and ready for the peer to read.
    HaveBuffer,
    /// Something went wrong processing this port this cycle.
    Error,
}

/// A process-local mirror of a port's `PortIo` cell.
///
/// The graph engine reads and writes this copy rather than the shared
/// memory cell directly; the proxy is what ferries values between the two
/// at the right points in the cycle (staging into the transport before a
/// `Process*` message, copying back out after a `HaveOutput`/`NeedInput`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortIoCell {
    /// Current status.
    pub status: PortIoStatus,
    /// Buffer id currently referenced.
    pub buffer_id: u32,
}

impl Default for PortIoStatus {
    fn default() -> Self {
        PortIoStatus::NeedBuffer
    }
}

/// One input or output port.
#[derive(Debug, Clone)]
pub struct Port {
    /// Direction this port was created in.
    pub direction: Direction,
    /// Port identifier, stable for the port's lifetime.
    pub id: u32,
    /// Whether this slot currently holds a live port.
    pub valid: bool,
    /// Opaque port info blob (name, media type, ...) as last set by a
    /// port-update.
    pub info: Option<ParamBlob>,
    /// Whether a Format parameter has been negotiated; gates buffer
    /// registration.
    pub have_format: bool,
    /// Parameters advertised for this port.
    pub params: Vec<ParamBlob>,
    /// Buffers registered via `port_use_buffers`.
    pub buffers: Vec<RegisteredBuffer>,
    /// Index into the transport's `io_in`/`io_out` array this port has been
    /// bound to via `port_set_io`, if any. `process_input`/`process_output`
    /// ignore a port until this is set.
    pub io_slot: Option<u32>,
    /// Process-local mirror of this port's I/O cell; see [`PortIoCell`].
    pub io: PortIoCell,
}

impl Port {
    fn cleared(direction: Direction, id: u32) -> Self {
        Port {
            direction,
            id,
            valid: true,
            info: None,
            have_format: false,
            params: Vec::new(),
            buffers: Vec::new(),
            io_slot: None,
            io: PortIoCell::default(),
        }
    }

    fn invalidate(&mut self) {
        self.valid = false;
        self.info = None;
        self.have_format = false;
        self.params.clear();
        self.buffers.clear();
        self.io_slot = None;
        self.io = PortIoCell::default();
    }
}

fn empty_slot(direction: Direction, id: u32) -> Port {
    Port {
        direction,
        id,
        valid: false,
        info: None,
        have_format: false,
        params: Vec::new(),
        buffers: Vec::new(),
        io_slot: None,
        io: PortIoCell::default(),
    }
}

/// Fixed-capacity arrays of input and output port slots.
///
/// A port id is free iff `slots[id].valid == false`; `add_port`/`remove_port`
/// keep `n_inputs`/`n_outputs` equal to the number of valid slots in each
/// direction, matching the invariant the graph engine relies on in
/// `get_n_ports`.
#[derive(Debug)]
pub struct PortTable {
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    n_inputs: u32,
    n_outputs: u32,
    max_inputs: u32,
    max_outputs: u32,
}

impl PortTable {
    /// Build a table with `max_inputs`/`max_outputs` slots in each
    /// direction; a cap of 0 means "uncapped, up to [`MAX_PORTS`]".
    pub fn new(max_inputs: u32, max_outputs: u32) -> Self {
        let cap_in = if max_inputs == 0 { MAX_PORTS as u32 } else { max_inputs };
        let cap_out = if max_outputs == 0 { MAX_PORTS as u32 } else { max_outputs };

        let inputs = (0..cap_in).map(|id| empty_slot(Direction::Input, id)).collect();
        let outputs = (0..cap_out).map(|id| empty_slot(Direction::Output, id)).collect();

        PortTable {
            inputs,
            outputs,
            n_inputs: 0,
            n_outputs: 0,
            max_inputs,
            max_outputs,
        }
    }

    fn slots(&self, direction: Direction) -> &[Port] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    fn slots_mut(&mut self, direction: Direction) -> &mut Vec<Port> {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }

    /// `(n_inputs, max_inputs, n_outputs, max_outputs)`, reporting a max of 0
    /// as the current count (no explicit cap).
    pub fn counts(&self) -> (u32, u32, u32, u32) {
        let max_in = if self.max_inputs == 0 { self.n_inputs } else { self.max_inputs };
        let max_out = if self.max_outputs == 0 { self.n_outputs } else { self.max_outputs };
        (self.n_inputs, max_in, self.n_outputs, max_out)
    }

    /// Valid port ids in a direction, ascending.
    pub fn port_ids(&self, direction: Direction) -> Vec<u32> {
        self.slots(direction)
            .iter()
            .filter(|p| p.valid)
            .map(|p| p.id)
            .collect()
    }

    /// Look up a port by (direction, id).
    pub fn get(&self, direction: Direction, id: u32) -> Result<&Port> {
        self.slots(direction)
            .get(id as usize)
            .filter(|p| p.valid)
            .ok_or(ProxyError::ArgInvalid)
    }

    /// Look up a port by (direction, id), mutably.
    pub fn get_mut(&mut self, direction: Direction, id: u32) -> Result<&mut Port> {
        self.slots_mut(direction)
            .get_mut(id as usize)
            .filter(|p| p.valid)
            .ok_or(ProxyError::ArgInvalid)
    }

    /// Install a cleared port slot at `id`. Fails if `id` is out of range or
    /// already occupied.
    pub fn add_port(&mut self, direction: Direction, id: u32) -> Result<()> {
        let slot = self
            .slots_mut(direction)
            .get_mut(id as usize)
            .ok_or(ProxyError::ArgInvalid)?;
        if slot.valid {
            return Err(ProxyError::ArgInvalid);
        }
        *slot = Port::cleared(direction, id);

        match direction {
            Direction::Input => self.n_inputs += 1,
            Direction::Output => self.n_outputs += 1,
        }
        Ok(())
    }

    /// Tear down an existing port. Fails if the port does not exist.
    pub fn remove_port(&mut self, direction: Direction, id: u32) -> Result<()> {
        let slot = self
            .slots_mut(direction)
            .get_mut(id as usize)
            .filter(|p| p.valid)
            .ok_or(ProxyError::ArgInvalid)?;
        slot.invalidate();

        match direction {
            Direction::Input => self.n_inputs -= 1,
            Direction::Output => self.n_outputs -= 1,
        }
        Ok(())
    }

    /// Mark a port invalid without erroring if it is already gone, matching
    /// a `port_update` with `change_mask == 0` (a no-op the second time).
    pub fn clear_port(&mut self, direction: Direction, id: u32) {
        if self.remove_port(direction, id).is_err() {
            // Already gone; `port_update(change_mask=0)` twice is a no-op.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_tracks_counts() {
        let mut table = PortTable::new(0, 0);
        table.add_port(Direction::Input, 3).unwrap();
        assert_eq!(table.port_ids(Direction::Input), vec![3]);

        table.add_port(Direction::Input, 0).unwrap();
        assert_eq!(table.port_ids(Direction::Input), vec![0, 3]);

        table.remove_port(Direction::Input, 3).unwrap();
        assert_eq!(table.port_ids(Direction::Input), vec![0]);

        assert_eq!(table.counts().0, 1);
    }

    #[test]
    fn out_of_range_port_is_arg_invalid() {
        let mut table = PortTable::new(0, 0);
        assert_eq!(
            table.add_port(Direction::Input, MAX_PORTS as u32 + 1),
            Err(ProxyError::ArgInvalid)
        );
    }

    #[test]
    fn adding_an_occupied_port_fails() {
        let mut table = PortTable::new(0, 0);
        table.add_port(Direction::Input, 1).unwrap();
        assert_eq!(table.add_port(Direction::Input, 1), Err(ProxyError::ArgInvalid));
    }

    #[test]
    fn removing_a_port_clears_its_state() {
        let mut table = PortTable::new(0, 0);
        table.add_port(Direction::Output, 2).unwrap();
        {
            let port = table.get_mut(Direction::Output, 2).unwrap();
            port.have_format = true;
            port.buffers.push(RegisteredBuffer::default());
        }
        table.remove_port(Direction::Output, 2).unwrap();
        assert!(table.get(Direction::Output, 2).is_err());
    }

    #[test]
    fn clear_port_is_idempotent() {
        let mut table = PortTable::new(0, 0);
        table.add_port(Direction::Input, 5).unwrap();
        table.clear_port(Direction::Input, 5);
        table.clear_port(Direction::Input, 5);
        assert!(table.get(Direction::Input, 5).is_err());
    }
}
