//! Builder-style configuration for constructing a [`crate::proxy::ProxyNode`].

use crate::port::MAX_PORTS;
use crate::transport::DEFAULT_RING_SIZE;

/// Configuration accepted by [`crate::proxy::ProxyNode::with_context`].
///
/// A cap of 0 for `max_inputs`/`max_outputs` means "no explicit cap", taken
/// up to [`MAX_PORTS`] by the port table and reported back to the graph
/// engine as the current port count.
#[derive(Debug, Clone)]
pub struct Context {
    max_inputs: u32,
    max_outputs: u32,
    ring_size: u32,
    client_reuse: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            max_inputs: 0,
            max_outputs: 0,
            ring_size: DEFAULT_RING_SIZE,
            client_reuse: false,
        }
    }
}

impl Context {
    /// Cap the number of input ports. 0 means uncapped (up to
    /// [`MAX_PORTS`]).
    pub fn set_max_inputs(mut self, max_inputs: u32) -> Self {
        self.max_inputs = max_inputs;
        self
    }

    /// Cap the number of output ports. 0 means uncapped (up to
    /// [`MAX_PORTS`]).
    pub fn set_max_outputs(mut self, max_outputs: u32) -> Self {
        self.max_outputs = max_outputs;
        self
    }

    /// Set the transport ring's size in bytes. Must be a power of two.
    pub fn set_ring_size(mut self, ring_size: u32) -> Self {
        self.ring_size = ring_size;
        self
    }

    /// Whether the client recycles its own buffers (`true`), or whether the
    /// server should issue `ReuseBuffer` on the client's behalf during
    /// `process_input` (`false`, the default).
    pub fn set_client_reuse(mut self, client_reuse: bool) -> Self {
        self.client_reuse = client_reuse;
        self
    }

    pub(crate) fn max_inputs(&self) -> u32 {
        self.max_inputs
    }

    pub(crate) fn max_outputs(&self) -> u32 {
        self.max_outputs
    }

    pub(crate) fn ring_size(&self) -> u32 {
        self.ring_size
    }

    pub(crate) fn client_reuse(&self) -> bool {
        self.client_reuse
    }
}
