//! Trait boundaries toward the collaborators this crate treats as external:
//! the graph engine that schedules cycles, the reactor that owns the main
//! loop, the codec that understands parameter blobs, and the process-wide
//! tag registry. Each is a thin trait so the proxy can be driven and tested
//! without a real graph engine or client process present.

use crate::port::ParamBlob;

/// Per-cycle callbacks the proxy invokes on behalf of the graph engine,
/// installed once via `Node::set_callbacks` before any `process_input` or
/// `process_output` call.
pub trait GraphCallbacks {
    /// The client finished writing its output ports for the current cycle.
    fn have_output(&mut self);

    /// The client has drained its input ports and is ready for more.
    fn need_input(&mut self);

    /// The client returned a buffer it's no longer using.
    fn reuse_buffer(&mut self, port_id: u32, buffer_id: u32);

    /// An out-of-band event arrived from the client (state changes,
    /// errors, ...), forwarded upward without interpretation.
    fn event(&mut self, event: ParamBlob);
}

/// Readiness mask a data source is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoMask {
    /// Wake on readable.
    pub read: bool,
    /// Wake on error condition.
    pub error: bool,
    /// Wake on hangup.
    pub hangup: bool,
}

impl IoMask {
    /// The mask the data loop registers the transport's wakeup fd with:
    /// readable, plus the two conditions that mean the peer is gone.
    pub fn read_err_hup() -> Self {
        IoMask {
            read: true,
            error: true,
            hangup: true,
        }
    }
}

/// The reactor that owns the data-loop thread's event source registration.
///
/// A callback fires with the raw fd and which of the registered conditions
/// were observed; `true`/`true` for `error`/`hangup` is fatal to the proxy
/// per the wakeup fd contract.
pub trait MainLoop {
    /// Register `fd` as a data source, invoking `on_ready` when one of
    /// `mask`'s conditions is observed.
    fn add_data_source(&mut self, fd: i32, mask: IoMask, on_ready: Box<dyn FnMut() + Send>);

    /// Remove a previously registered data source. Must complete before any
    /// memory `fd` refers to is unmapped, so the loop can't read into freed
    /// memory mid-removal.
    fn remove_data_source(&mut self, fd: i32);
}

/// Operations the proxy needs on parameter blobs without interpreting their
/// contents itself.
pub trait ParameterCodec {
    /// Deep-copy a parameter blob.
    fn pod_copy(&self, blob: &ParamBlob) -> ParamBlob;

    /// Whether `blob`'s tagged object id matches `id`.
    fn pod_is_object_id(&self, blob: &ParamBlob, id: u32) -> bool;

    /// Whether `blob` passes the caller-supplied filter, itself a blob
    /// describing an acceptable subset.
    fn pod_filter(&self, blob: &ParamBlob, filter: &ParamBlob) -> bool;
}

/// Process-scoped registry translating tag strings to the `u32` ids used
/// throughout parameter, command, metadata, and memory-type blobs.
pub trait TypeMap {
    /// Look up (or register) the id for a tag string.
    fn id_for(&mut self, tag: &str) -> u32;

    /// Look up a tag string's previously assigned id, if any.
    fn id_of(&self, tag: &str) -> Option<u32>;
}

/// A `ParameterCodec` that treats blobs as opaque and only compares object
/// ids, suitable for tests and for callers with no real codec to plug in.
#[derive(Debug, Default)]
pub struct DefaultParameterCodec;

impl ParameterCodec for DefaultParameterCodec {
    fn pod_copy(&self, blob: &ParamBlob) -> ParamBlob {
        blob.clone()
    }

    fn pod_is_object_id(&self, blob: &ParamBlob, id: u32) -> bool {
        blob.object_id == id
    }

    fn pod_filter(&self, blob: &ParamBlob, filter: &ParamBlob) -> bool {
        blob.object_id == filter.object_id
    }
}

/// A `TypeMap` that hands out ids in registration order, backed by a plain
/// `Vec`; adequate for a single process's lifetime, which is the only
/// lifetime this registry needs to span.
#[derive(Debug, Default)]
pub struct StaticTypeMap {
    tags: Vec<String>,
}

impl TypeMap for StaticTypeMap {
    fn id_for(&mut self, tag: &str) -> u32 {
        if let Some(id) = self.id_of(tag) {
            return id;
        }
        self.tags.push(tag.to_string());
        (self.tags.len() - 1) as u32
    }

    fn id_of(&self, tag: &str) -> Option<u32> {
        self.tags.iter().position(|t| t == tag).map(|i| i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_type_map_is_stable_and_idempotent() {
        let mut map = StaticTypeMap::default();
        let a = map.id_for("Format");
        let b = map.id_for("PortInfo");
        assert_eq!(map.id_for("Format"), a);
        assert_ne!(a, b);
        assert_eq!(map.id_of("PortInfo"), Some(b));
        assert_eq!(map.id_of("Unregistered"), None);
    }
}
