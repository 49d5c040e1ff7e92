//! The shared-memory region and wakeup file descriptor pair that carry
//! per-cycle port I/O state and data-plane messages between the proxy and
//! its client.
//!
//! Layout of the mapped region, all offsets 8-byte aligned:
//!
//! ```text
//! +----------------+----------------+-----------------+------------------+-----------+
//! | n_input_ports  | PortIo[max_in] | PortIo[max_out] | RingBuffer header | ring_bytes |
//! | n_output_ports |                |                  | (readindex..mask) |           |
//! +----------------+----------------+-----------------+------------------+-----------+
//! ```
//!
//! Both processes `mmap` the same backing `memfd`; a pair of `eventfd`s
//! carries readiness ("go look at the ring") independently of the ring
//! itself, since a SPSC ring has no way to wake a sleeping peer on its own.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap::MmapMut;

use crate::command::{RingMessageType, MESSAGE_HEADER_LENGTH};
use crate::concurrent::ring_buffer::RingBuffer;
use crate::error::{ProxyError, Result};
use crate::port::PortIoStatus;
use crate::util::bit::align;

/// Default size in bytes of the message ring, absent an explicit size from
/// [`crate::context::Context`].
pub const DEFAULT_RING_SIZE: u32 = 1 << 16;

const HEADER_LEN: usize = 8;
const RING_HEADER_LEN: usize = 16;
const PORT_IO_LEN: usize = 8;

/// One port's current buffer status, published by one side and read by the
/// other between synchronising ring messages.
#[repr(C)]
pub struct PortIo {
    status: AtomicU32,
    buffer_id: AtomicU32,
}

impl PortIo {
    /// Current status.
    pub fn status(&self) -> PortIoStatus {
        match self.status.load(Ordering::Relaxed) {
            0 => PortIoStatus::Ok,
            1 => PortIoStatus::NeedBuffer,
            2 => PortIoStatus::HaveBuffer,
            _ => PortIoStatus::Error,
        }
    }

    /// Publish a new status.
    pub fn set_status(&self, status: PortIoStatus) {
        let val = match status {
            PortIoStatus::Ok => 0,
            PortIoStatus::NeedBuffer => 1,
            PortIoStatus::HaveBuffer => 2,
            PortIoStatus::Error => 3,
        };
        self.status.store(val, Ordering::Relaxed);
    }

    /// Id of the buffer currently referenced by this cell.
    pub fn buffer_id(&self) -> u32 {
        self.buffer_id.load(Ordering::Relaxed)
    }

    /// Set the buffer id.
    pub fn set_buffer_id(&self, buffer_id: u32) {
        self.buffer_id.store(buffer_id, Ordering::Relaxed);
    }
}

fn os_error(context: &'static str, err: io::Error) -> ProxyError {
    log::error!("{}: {}", context, err);
    ProxyError::ArgInvalid
}

/// An owned wakeup file descriptor, closed on drop.
struct WakeupFd(RawFd);

impl WakeupFd {
    fn new() -> Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(os_error("eventfd", io::Error::last_os_error()));
        }
        Ok(WakeupFd(fd))
    }

    fn raw(&self) -> RawFd {
        self.0
    }

    /// Add 1 to the peer's counter, waking it if it's blocked in poll/epoll.
    fn signal(&self) -> Result<()> {
        let one: u64 = 1;
        let written = unsafe {
            libc::write(self.0, &one as *const u64 as *const libc::c_void, 8)
        };
        if written != 8 {
            return Err(ProxyError::PeerDead);
        }
        Ok(())
    }

    /// Drain the accumulated counter. Returns the count, or 0 if nothing was
    /// pending (`EAGAIN` on a non-blocking fd with no writes since the last
    /// drain).
    fn drain(&self) -> Result<u64> {
        let mut val: u64 = 0;
        let read = unsafe {
            libc::read(self.0, &mut val as *mut u64 as *mut libc::c_void, 8)
        };
        if read == 8 {
            Ok(val)
        } else {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Ok(0)
            } else {
                Err(ProxyError::PeerDead)
            }
        }
    }
}

impl Drop for WakeupFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// The shared-memory region plus the pair of wakeup file descriptors.
pub struct Transport {
    mmap: MmapMut,
    region_file: File,
    max_inputs: u32,
    max_outputs: u32,
    ring_size: u32,
    ring_size_bytes: u64,
    io_in_offset: usize,
    io_out_offset: usize,
    ring_header_offset: usize,
    ring_bytes_offset: usize,
    wakeup_us: WakeupFd,
    wakeup_them: WakeupFd,
}

impl Transport {
    /// Allocate the shared region sized for `max_inputs`/`max_outputs` ports
    /// and a `ring_size`-byte message ring (must be a power of two), and
    /// create the two wakeup file descriptors.
    pub fn new(max_inputs: u32, max_outputs: u32, ring_size: u32) -> Result<Self> {
        assert!(ring_size.is_power_of_two(), "ring size must be a power of two");

        let io_in_offset = align(HEADER_LEN, 8);
        let io_in_len = max_inputs as usize * PORT_IO_LEN;
        let io_out_offset = align(io_in_offset + io_in_len, 8);
        let io_out_len = max_outputs as usize * PORT_IO_LEN;
        let ring_header_offset = align(io_out_offset + io_out_len, 8);
        let ring_bytes_offset = align(ring_header_offset + RING_HEADER_LEN, 8);
        let total_len = ring_bytes_offset + ring_size as usize;

        let name = b"proxy-node-transport\0";
        let fd = unsafe {
            libc::memfd_create(name.as_ptr() as *const libc::c_char, libc::MFD_CLOEXEC)
        };
        if fd < 0 {
            return Err(os_error("memfd_create", io::Error::last_os_error()));
        }

        if unsafe { libc::ftruncate(fd, total_len as libc::off_t) } < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(os_error("ftruncate", err));
        }

        let file = unsafe { File::from_raw_fd(fd) };
        let mut mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|e| os_error("mmap", e))?
        };

        mmap[0..4].copy_from_slice(&0u32.to_ne_bytes());
        mmap[4..8].copy_from_slice(&0u32.to_ne_bytes());

        let transport = Transport {
            mmap,
            region_file: file,
            max_inputs,
            max_outputs,
            ring_size,
            ring_size_bytes: total_len as u64,
            io_in_offset,
            io_out_offset,
            ring_header_offset,
            ring_bytes_offset,
            wakeup_us: WakeupFd::new()?,
            wakeup_them: WakeupFd::new()?,
        };
        transport.ring_mut().init(ring_size);
        Ok(transport)
    }

    /// Raw file descriptor of the shared region, to be passed to the client
    /// alongside the two wakeup descriptors.
    pub fn region_fd(&self) -> RawFd {
        self.region_file.as_raw_fd()
    }

    /// Total size in bytes of the mapped region.
    pub fn region_size(&self) -> u64 {
        self.ring_size_bytes
    }

    fn ring(&self) -> &RingBuffer {
        unsafe { &*(self.mmap.as_ptr().add(self.ring_header_offset) as *const RingBuffer) }
    }

    #[allow(clippy::mut_from_ref)]
    fn ring_mut(&self) -> &mut RingBuffer {
        unsafe { &mut *(self.mmap.as_ptr().add(self.ring_header_offset) as *mut RingBuffer) }
    }

    fn ring_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.mmap.as_ptr().add(self.ring_bytes_offset),
                self.ring_size as usize,
            )
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn ring_bytes_mut(&self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.mmap.as_ptr().add(self.ring_bytes_offset) as *mut u8,
                self.ring_size as usize,
            )
        }
    }

    fn port_io(&self, base: usize, max: u32, port_id: u32) -> Result<&PortIo> {
        if port_id >= max {
            return Err(ProxyError::ArgInvalid);
        }
        let offset = base + port_id as usize * PORT_IO_LEN;
        Ok(unsafe { &*(self.mmap.as_ptr().add(offset) as *const PortIo) })
    }

    /// The input-port I/O cell at `port_id`.
    pub fn input_io(&self, port_id: u32) -> Result<&PortIo> {
        self.port_io(self.io_in_offset, self.max_inputs, port_id)
    }

    /// The output-port I/O cell at `port_id`.
    pub fn output_io(&self, port_id: u32) -> Result<&PortIo> {
        self.port_io(self.io_out_offset, self.max_outputs, port_id)
    }

    /// Raw file descriptor the owning side polls for incoming messages.
    pub fn wakeup_us_fd(&self) -> RawFd {
        self.wakeup_us.raw()
    }

    /// Raw file descriptor the owning side writes to, to wake the peer.
    pub fn wakeup_them_fd(&self) -> RawFd {
        self.wakeup_them.raw()
    }

    /// Signal the peer that new messages are available.
    pub fn signal_them(&self) -> Result<()> {
        self.wakeup_them.signal()
    }

    /// Drain our own wakeup counter; call once per wakeup before draining
    /// messages.
    pub fn drain_us(&self) -> Result<u64> {
        self.wakeup_us.drain()
    }

    /// Append a message to the ring. Fails with [`ProxyError::TransportFull`]
    /// if there isn't room; the caller is expected to retry on a later
    /// cycle.
    pub fn add_message(&self, message_type: RingMessageType, body: &[u8]) -> Result<()> {
        let needed = MESSAGE_HEADER_LENGTH as u32 + body.len() as u32;
        let (write_index, fill) = self.ring().get_write_index();
        if fill < 0 || fill as u32 + needed > self.ring_size {
            return Err(ProxyError::TransportFull);
        }

        let mut header = [0u8; MESSAGE_HEADER_LENGTH];
        header[0..4].copy_from_slice(&(message_type as u32).to_ne_bytes());
        header[4..8].copy_from_slice(&(body.len() as u32).to_ne_bytes());

        let ring = self.ring();
        let storage = self.ring_bytes_mut();
        ring.write_data(storage, ring.mask(write_index), &header);
        ring.write_data(
            storage,
            ring.mask(write_index.wrapping_add(MESSAGE_HEADER_LENGTH as u32)),
            body,
        );
        ring.write_update(write_index.wrapping_add(needed));
        Ok(())
    }

    /// Non-destructively peek the next message's header.
    ///
    /// Returns `None` if the ring is empty; `Err` if the header claims a
    /// body larger than the ring itself, which can only mean a corrupted or
    /// out-of-sync ring.
    pub fn next_message(&self) -> Result<Option<(RingMessageType, u32)>> {
        let ring = self.ring();
        let (read_index, fill) = ring.get_read_index();
        if fill <= 0 {
            return Ok(None);
        }

        let mut header = [0u8; MESSAGE_HEADER_LENGTH];
        ring.read_data(self.ring_bytes(), ring.mask(read_index), &mut header);
        let message_type = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let body_size = u32::from_ne_bytes([header[4], header[5], header[6], header[7]]);

        if body_size > self.ring_size {
            return Err(ProxyError::ArgInvalid);
        }
        let message_type = RingMessageType::from_u32(message_type).ok_or(ProxyError::ArgInvalid)?;
        Ok(Some((message_type, body_size)))
    }

    /// Consume the message most recently returned by [`next_message`], copying
    /// its body into `out` (which must be exactly `body_size` bytes).
    pub fn parse_message(&self, body_size: u32, out: &mut [u8]) -> Result<()> {
        let ring = self.ring();
        let (read_index, _) = ring.get_read_index();
        let body_offset = ring.mask(read_index.wrapping_add(MESSAGE_HEADER_LENGTH as u32));
        ring.read_data(self.ring_bytes(), body_offset, out);
        ring.read_update(
            read_index
                .wrapping_add(MESSAGE_HEADER_LENGTH as u32)
                .wrapping_add(body_size),
        );
        Ok(())
    }
}
