//! Error types returned by operations on the proxy node and its transport.
//!
//! Mirrors the exception classes of the original C implementation
//! (`-EINVAL`, `-ENOTSUP`, `-EIO`, ring-full) as a closed `enum` rather than
//! a dynamic error trait object, since callers (the graph engine, the
//! control protocol's `done` dispatch) need to match on the kind.

use std::fmt;

/// Error kinds produced by the proxy node and its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyError {
    /// Null node, out-of-range port, free/used port mismatch, or malformed
    /// parameters.
    ArgInvalid,
    /// The operation is not implemented (`port_alloc_buffers`, an unknown
    /// `port_send_command`).
    NotSupported,
    /// `port_use_buffers` was called before a Format parameter arrived.
    NotReady,
    /// The transport ring could not accept a message; retryable on the next
    /// cycle.
    TransportFull,
    /// HUP or ERR was observed on a wakeup file descriptor.
    PeerDead,
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ProxyError::ArgInvalid => "invalid argument",
            ProxyError::NotSupported => "operation not supported",
            ProxyError::NotReady => "port is not ready (no format negotiated)",
            ProxyError::TransportFull => "transport ring is full",
            ProxyError::PeerDead => "peer is no longer responding",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ProxyError {}

/// Result type used throughout the crate.
pub type Result<T> = ::std::result::Result<T, ProxyError>;

/// Outcome of a control operation that may complete asynchronously.
///
/// `SPA_RESULT_RETURN_ASYNC` in the original encodes "pending with this
/// sequence number" directly into the return code; here it is a distinct
/// variant so callers can't mistake a pending operation for a synchronous
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncOutcome {
    /// The operation completed synchronously.
    Immediate,
    /// The operation was forwarded to the client and will complete later via
    /// a `done(seq, res)` reply carrying this sequence number.
    Pending(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_non_empty() {
        for e in [
            ProxyError::ArgInvalid,
            ProxyError::NotSupported,
            ProxyError::NotReady,
            ProxyError::TransportFull,
            ProxyError::PeerDead,
        ] {
            assert!(!e.to_string().is_empty());
        }
    }
}
