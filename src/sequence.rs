//! Sequence numbers for outbound async requests, and the registry that
//! matches a later `done(seq, res)` reply back to the call that produced it.
//!
//! The original C implementation folds "this call is pending" into its
//! return value via the `SPA_RESULT_RETURN_ASYNC` macro, using the sequence
//! number as a positive result code. [`AsyncOutcome`] in [`crate::error`]
//! reifies that as a real variant instead so a caller can't mistake a
//! pending id for a successful return value. `SequenceBroker` is the
//! promise registry that scheme implies: every call that returns
//! `Pending(seq)` has a matching entry here until its `done` arrives.

use std::collections::HashMap;

/// What kind of call a pending sequence number refers to, for callers that
/// want to know what's still outstanding without threading their own
/// bookkeeping through every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    /// A `set_param` request on the node itself.
    SetParam {
        /// Parameter object id that was sent.
        id: u32,
    },
    /// A `port_set_param` request.
    PortSetParam {
        /// Port the parameter was sent to.
        port_id: u32,
        /// Parameter object id that was sent.
        id: u32,
    },
    /// A `port_use_buffers` request.
    PortUseBuffers {
        /// Port the buffers were registered on.
        port_id: u32,
    },
    /// Any other command sent via `send_command`.
    Command,
}

/// Generates request sequence numbers and tracks which ones are still
/// awaiting a `done(seq, res)` reply.
///
/// Sequence space wraps at `u32::MAX`; this is considered sufficient
/// headroom as long as callers retire pending entries promptly, matching
/// the source protocol's assumption.
#[derive(Debug, Default)]
pub struct SequenceBroker {
    next_seq: u32,
    pending: HashMap<u32, PendingKind>,
}

impl SequenceBroker {
    /// A broker starting at sequence 0.
    pub fn new() -> Self {
        SequenceBroker {
            next_seq: 0,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next sequence number and register what it's for.
    /// Returns the sequence number to tag the outbound request with.
    pub fn begin(&mut self, kind: PendingKind) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.pending.insert(seq, kind);
        seq
    }

    /// Retire a pending entry on `done(seq, _)`, returning what it was for.
    /// `None` if `seq` was already retired or never issued (a protocol
    /// error on the client's part, logged by the caller).
    pub fn complete(&mut self, seq: u32) -> Option<PendingKind> {
        self.pending.remove(&seq)
    }

    /// Number of requests still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
