//! `ProxyNode`: the one [`Node`] implementation in this crate, and the
//! [`ResourceChannelHandler`] that drives it from the client side of the
//! resource channel.
//!
//! Everything the graph engine calls on a node funnels through here: port
//! lifecycle and parameter negotiation forward to the client over the
//! resource channel and return `Pending`; the two per-cycle operations stage
//! port state into the shared-memory transport and signal the client's
//! wakeup descriptor. The transport itself doesn't exist until the client's
//! first `done(0, 0)` arrives, at which point it's built and published.

use crate::command::{RingMessageType, REUSE_BUFFER_BODY_LENGTH};
use crate::context::Context;
use crate::control_protocol::{
    BufferDescriptor, DataDescriptor, MemoryType, ResourceChannel, ResourceChannelHandler,
    UPDATE_MAX_INPUTS, UPDATE_MAX_OUTPUTS, UPDATE_PARAMS,
};
use crate::error::{AsyncOutcome, ProxyError, Result};
use crate::external::{DefaultParameterCodec, GraphCallbacks, ParameterCodec, StaticTypeMap, TypeMap};
use crate::node::{CycleOutcome, IncomingBuffer, Node, NodeCommand, PortInfo};
use crate::port::{BufferDatum, Direction, ParamBlob, PortIoStatus, PortTable, RegisteredBuffer, SharedMeta};
use crate::sequence::{PendingKind, SequenceBroker};
use crate::transport::Transport;

/// Server-side proxy for a single client node: the port table, the pending
/// async-request ledger, and (once negotiated) the shared-memory transport.
pub struct ProxyNode {
    ports: PortTable,
    transport: Option<Transport>,
    sequence: SequenceBroker,
    input_ready: u32,
    out_pending: bool,
    callbacks: Option<Box<dyn GraphCallbacks>>,
    channel: Box<dyn ResourceChannel>,
    codec: Box<dyn ParameterCodec>,
    type_map: Box<dyn TypeMap>,
    format_param_id: u32,
    params: Vec<ParamBlob>,
    client_reuse: bool,
    max_inputs: u32,
    max_outputs: u32,
    ring_size: u32,
    n_mem: u32,
}

impl ProxyNode {
    /// Build a proxy with default configuration, a [`DefaultParameterCodec`],
    /// and a fresh [`StaticTypeMap`].
    pub fn new(channel: Box<dyn ResourceChannel>) -> Self {
        Self::with_context(
            Context::default(),
            channel,
            Box::new(DefaultParameterCodec),
            Box::new(StaticTypeMap::default()),
        )
    }

    /// Build a proxy with explicit configuration and collaborators.
    pub fn with_context(
        context: Context,
        channel: Box<dyn ResourceChannel>,
        codec: Box<dyn ParameterCodec>,
        mut type_map: Box<dyn TypeMap>,
    ) -> Self {
        let format_param_id = type_map.id_for("Format");
        ProxyNode {
            ports: PortTable::new(context.max_inputs(), context.max_outputs()),
            transport: None,
            sequence: SequenceBroker::new(),
            input_ready: 0,
            out_pending: false,
            callbacks: None,
            channel,
            codec,
            type_map,
            format_param_id,
            params: Vec::new(),
            client_reuse: context.client_reuse(),
            max_inputs: context.max_inputs(),
            max_outputs: context.max_outputs(),
            ring_size: context.ring_size(),
            n_mem: 0,
        }
    }

    /// The shared-memory transport, once the client's first `done(0, 0)` has
    /// arrived and it has been built.
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }

    fn require_transport(&self) -> Result<()> {
        if self.transport.is_some() {
            Ok(())
        } else {
            Err(ProxyError::NotReady)
        }
    }

    /// Drain the wakeup descriptor and dispatch every message currently
    /// queued on the transport ring. Call this when the main loop reports
    /// readiness on `transport().wakeup_us_fd()`.
    pub fn poll_transport(&mut self) -> Result<()> {
        self.require_transport()?;
        self.transport.as_ref().unwrap().drain_us()?;

        loop {
            let peek = self.transport.as_ref().unwrap().next_message()?;
            let (message_type, body_size) = match peek {
                Some(m) => m,
                None => break,
            };

            let mut body = vec![0u8; body_size as usize];
            self.transport.as_ref().unwrap().parse_message(body_size, &mut body)?;

            match message_type {
                RingMessageType::HaveOutput => self.handle_have_output()?,
                RingMessageType::NeedInput => self.handle_need_input()?,
                RingMessageType::ReuseBuffer => self.handle_reuse_buffer(&body)?,
                RingMessageType::ProcessInput | RingMessageType::ProcessOutput => {
                    log::warn!("unexpected {:?} on the inbound side of the ring", message_type);
                }
            }
        }
        Ok(())
    }

    fn handle_have_output(&mut self) -> Result<()> {
        let ids = self.ports.port_ids(Direction::Output);
        for id in ids {
            let slot = self.ports.get(Direction::Output, id)?.io_slot;
            if let Some(slot) = slot {
                let io = self.transport.as_ref().unwrap().output_io(slot)?;
                let (status, buffer_id) = (io.status(), io.buffer_id());
                let port = self.ports.get_mut(Direction::Output, id)?;
                port.io.status = status;
                port.io.buffer_id = buffer_id;
            }
        }
        self.out_pending = false;
        if let Some(callbacks) = &mut self.callbacks {
            callbacks.have_output();
        }
        Ok(())
    }

    fn handle_need_input(&mut self) -> Result<()> {
        let ids = self.ports.port_ids(Direction::Input);
        for id in ids {
            let slot = self.ports.get(Direction::Input, id)?.io_slot;
            if let Some(slot) = slot {
                let io = self.transport.as_ref().unwrap().input_io(slot)?;
                let (status, buffer_id) = (io.status(), io.buffer_id());
                let port = self.ports.get_mut(Direction::Input, id)?;
                port.io.status = status;
                port.io.buffer_id = buffer_id;
            }
        }
        self.input_ready += 1;
        if let Some(callbacks) = &mut self.callbacks {
            callbacks.need_input();
        }
        Ok(())
    }

    fn handle_reuse_buffer(&mut self, body: &[u8]) -> Result<()> {
        if !self.client_reuse {
            return Ok(());
        }
        if body.len() < REUSE_BUFFER_BODY_LENGTH {
            return Err(ProxyError::ArgInvalid);
        }
        let port_id = u32::from_ne_bytes([body[0], body[1], body[2], body[3]]);
        let buffer_id = u32::from_ne_bytes([body[4], body[5], body[6], body[7]]);
        if let Some(callbacks) = &mut self.callbacks {
            callbacks.reuse_buffer(port_id, buffer_id);
        }
        Ok(())
    }
}

impl Node for ProxyNode {
    fn enum_params(&self, id: u32, index: &mut u32, filter: Option<&ParamBlob>) -> Option<ParamBlob> {
        while (*index as usize) < self.params.len() {
            let candidate = &self.params[*index as usize];
            *index += 1;
            if !self.codec.pod_is_object_id(candidate, id) {
                continue;
            }
            if let Some(filter) = filter {
                if !self.codec.pod_filter(candidate, filter) {
                    continue;
                }
            }
            return Some(self.codec.pod_copy(candidate));
        }
        None
    }

    fn set_param(&mut self, id: u32, flags: u32, blob: ParamBlob) -> Result<AsyncOutcome> {
        let seq = self.sequence.begin(PendingKind::SetParam { id });
        self.channel.set_param(seq, id, flags, &blob)?;
        Ok(AsyncOutcome::Pending(seq))
    }

    fn send_command(&mut self, cmd: NodeCommand) -> Result<AsyncOutcome> {
        match cmd {
            NodeCommand::ClockUpdate { .. } => {
                self.channel.command(None, &cmd)?;
                Ok(AsyncOutcome::Immediate)
            }
            other => {
                let seq = self.sequence.begin(PendingKind::Command);
                self.channel.command(Some(seq), &other)?;
                Ok(AsyncOutcome::Pending(seq))
            }
        }
    }

    fn set_callbacks(&mut self, callbacks: Box<dyn GraphCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    fn get_n_ports(&self) -> (u32, u32, u32, u32) {
        self.ports.counts()
    }

    fn get_port_ids(&self, direction: Direction) -> Vec<u32> {
        self.ports.port_ids(direction)
    }

    fn add_port(&mut self, direction: Direction, id: u32) -> Result<()> {
        self.ports.add_port(direction, id)
    }

    fn remove_port(&mut self, direction: Direction, id: u32) -> Result<()> {
        self.ports.remove_port(direction, id)
    }

    fn port_get_info(&self, direction: Direction, id: u32) -> Result<PortInfo> {
        let port = self.ports.get(direction, id)?;
        Ok(PortInfo {
            direction: port.direction,
            id: port.id,
            blob: port.info.clone(),
        })
    }

    fn port_enum_params(
        &self,
        direction: Direction,
        id: u32,
        param_id: u32,
        index: &mut u32,
        filter: Option<&ParamBlob>,
    ) -> Result<Option<ParamBlob>> {
        let port = self.ports.get(direction, id)?;
        let mut i = *index;
        let result = loop {
            if (i as usize) >= port.params.len() {
                break None;
            }
            let candidate = &port.params[i as usize];
            i += 1;
            if !self.codec.pod_is_object_id(candidate, param_id) {
                continue;
            }
            if let Some(filter) = filter {
                if !self.codec.pod_filter(candidate, filter) {
                    continue;
                }
            }
            break Some(self.codec.pod_copy(candidate));
        };
        *index = i;
        Ok(result)
    }

    fn port_set_param(
        &mut self,
        direction: Direction,
        id: u32,
        param_id: u32,
        flags: u32,
        blob: ParamBlob,
    ) -> Result<AsyncOutcome> {
        let format_param_id = self.format_param_id;
        {
            let port = self.ports.get_mut(direction, id)?;
            if param_id == format_param_id {
                port.have_format = true;
            }
        }
        let seq = self.sequence.begin(PendingKind::PortSetParam { port_id: id, id: param_id });
        self.channel.port_set_param(seq, direction, id, param_id, flags, &blob)?;
        Ok(AsyncOutcome::Pending(seq))
    }

    fn port_use_buffers(
        &mut self,
        direction: Direction,
        id: u32,
        buffers: Vec<IncomingBuffer>,
    ) -> Result<AsyncOutcome> {
        {
            let port = self.ports.get(direction, id)?;
            if !port.have_format {
                return Err(ProxyError::NotReady);
            }
        }

        let mut descriptors = Vec::with_capacity(buffers.len());
        let mut registered = Vec::with_capacity(buffers.len());

        for buffer in buffers {
            let shared = buffer.shared_meta.ok_or_else(|| {
                log::error!("missing shared metadata on a buffer for port {}", id);
                ProxyError::ArgInvalid
            })?;

            let buffer_mem_id = self.n_mem;
            self.n_mem += 1;
            self.channel.add_mem(
                buffer_mem_id,
                MemoryType::MemFd,
                shared.fd,
                shared.flags,
                shared.mapoffset,
                shared.maxsize,
            )?;

            let mut wire_datas = Vec::with_capacity(buffer.datas.len());
            let mut normalized_datas = Vec::with_capacity(buffer.datas.len());
            let mut mem_offset: u32 = 0;
            for datum in buffer.datas {
                let (wire, normalized) = match datum {
                    BufferDatum::MemFd { fd, flags, mapoffset, maxsize } => {
                        let mem_id = self.n_mem;
                        self.n_mem += 1;
                        self.channel
                            .add_mem(mem_id, MemoryType::MemFd, fd, flags, mapoffset, maxsize)?;
                        (
                            DataDescriptor::Id { mem_id, maxsize },
                            BufferDatum::Id { mem_id, maxsize },
                        )
                    }
                    BufferDatum::DmaBuf { fd, flags, mapoffset, maxsize } => {
                        let mem_id = self.n_mem;
                        self.n_mem += 1;
                        self.channel
                            .add_mem(mem_id, MemoryType::DmaBuf, fd, flags, mapoffset, maxsize)?;
                        (
                            DataDescriptor::Id { mem_id, maxsize },
                            BufferDatum::Id { mem_id, maxsize },
                        )
                    }
                    BufferDatum::MemPtr { maxsize, .. } => {
                        let relative_offset = mem_offset;
                        mem_offset += maxsize;
                        (
                            DataDescriptor::MemPtr { relative_offset, maxsize },
                            BufferDatum::MemPtr { relative_offset, maxsize },
                        )
                    }
                    BufferDatum::Invalid | BufferDatum::Id { .. } => {
                        log::warn!("buffer datum on port {} could not be normalised for the wire", id);
                        (DataDescriptor::Invalid, BufferDatum::Invalid)
                    }
                };
                wire_datas.push(wire);
                normalized_datas.push(normalized);
            }

            descriptors.push(BufferDescriptor {
                client_buffer_handle: buffer.client_buffer_handle,
                metas: buffer.metas.clone(),
                datas: wire_datas,
                offset: buffer.offset,
                size: buffer.size,
            });

            registered.push(RegisteredBuffer {
                client_buffer_handle: buffer.client_buffer_handle,
                metas: buffer.metas,
                datas: normalized_datas,
                offset: buffer.offset,
                size: buffer.size,
                outstanding: false,
            });
        }

        let seq = self.sequence.begin(PendingKind::PortUseBuffers { port_id: id });
        self.channel.use_buffers(seq, direction, id, &descriptors)?;

        let port = self.ports.get_mut(direction, id)?;
        port.buffers = registered;

        Ok(AsyncOutcome::Pending(seq))
    }

    fn port_set_io(&mut self, direction: Direction, id: u32, io_ref: u32) -> Result<()> {
        let port = self.ports.get_mut(direction, id)?;
        port.io_slot = Some(io_ref);
        Ok(())
    }

    fn port_reuse_buffer(&mut self, id: u32, buffer_id: u32) -> Result<()> {
        self.require_transport()?;
        let mut body = [0u8; REUSE_BUFFER_BODY_LENGTH];
        body[0..4].copy_from_slice(&id.to_ne_bytes());
        body[4..8].copy_from_slice(&buffer_id.to_ne_bytes());
        let transport = self.transport.as_ref().unwrap();
        transport.add_message(RingMessageType::ReuseBuffer, &body)?;
        transport.signal_them()
    }

    fn process_input(&mut self) -> Result<CycleOutcome> {
        self.require_transport()?;

        if self.input_ready == 0 {
            let ids = self.ports.port_ids(Direction::Input);
            for id in &ids {
                if let Ok(port) = self.ports.get_mut(Direction::Input, *id) {
                    port.io.status = PortIoStatus::NeedBuffer;
                }
            }
            for id in ids {
                let slot = self.ports.get(Direction::Input, id)?.io_slot;
                if let Some(slot) = slot {
                    self.transport
                        .as_ref()
                        .unwrap()
                        .input_io(slot)?
                        .set_status(PortIoStatus::NeedBuffer);
                }
            }
            return Ok(CycleOutcome::NeedBuffer);
        }

        if !self.client_reuse {
            let ids = self.ports.port_ids(Direction::Input);
            for id in ids {
                let (slot, buffer_id) = {
                    let port = self.ports.get(Direction::Input, id)?;
                    (port.io_slot, port.io.buffer_id)
                };
                if slot.is_some() {
                    self.port_reuse_buffer(id, buffer_id)?;
                }
            }
        }

        let ids = self.ports.port_ids(Direction::Input);
        for id in ids {
            let (slot, status, buffer_id) = {
                let port = self.ports.get(Direction::Input, id)?;
                (port.io_slot, port.io.status, port.io.buffer_id)
            };
            if let Some(slot) = slot {
                let io = self.transport.as_ref().unwrap().input_io(slot)?;
                io.set_status(status);
                io.set_buffer_id(buffer_id);
            }
        }

        let transport = self.transport.as_ref().unwrap();
        transport.add_message(RingMessageType::ProcessInput, &[])?;
        transport.signal_them()?;
        self.input_ready -= 1;
        Ok(CycleOutcome::Ok)
    }

    fn process_output(&mut self) -> Result<CycleOutcome> {
        self.require_transport()?;

        if self.out_pending {
            let transport = self.transport.as_ref().unwrap();
            transport.add_message(RingMessageType::ProcessOutput, &[])?;
            transport.signal_them()?;
            return Ok(CycleOutcome::Ok);
        }

        let ids = self.ports.port_ids(Direction::Output);
        for id in ids {
            let (slot, status, buffer_id) = {
                let port = self.ports.get(Direction::Output, id)?;
                (port.io_slot, port.io.status, port.io.buffer_id)
            };
            if let Some(slot) = slot {
                let io = self.transport.as_ref().unwrap().output_io(slot)?;
                io.set_status(status);
                io.set_buffer_id(buffer_id);
            }
        }

        self.out_pending = true;
        let transport = self.transport.as_ref().unwrap();
        transport.add_message(RingMessageType::ProcessOutput, &[])?;
        transport.signal_them()?;
        Ok(CycleOutcome::Ok)
    }
}

impl ResourceChannelHandler for ProxyNode {
    fn done(&mut self, seq: u32, res: i32) {
        let first_success = seq == 0 && res == 0 && self.transport.is_none();

        if self.sequence.complete(seq).is_none() && seq != 0 {
            log::warn!("done(seq={}) with no matching pending request", seq);
        }

        if !first_success {
            return;
        }

        let (n_inputs, _, n_outputs, _) = self.ports.counts();
        let cap_in = if self.max_inputs == 0 { n_inputs } else { self.max_inputs };
        let cap_out = if self.max_outputs == 0 { n_outputs } else { self.max_outputs };

        match Transport::new(cap_in, cap_out, self.ring_size) {
            Ok(transport) => {
                let published = self.channel.publish_transport(
                    transport.region_fd(),
                    transport.region_size(),
                    transport.wakeup_us_fd(),
                    transport.wakeup_them_fd(),
                );
                if let Err(e) = published {
                    log::error!("failed to publish transport to client: {}", e);
                }
                self.transport = Some(transport);
            }
            Err(e) => log::error!("failed to build transport after initial done: {}", e),
        }
    }

    fn update(&mut self, change_mask: u32, max_inputs: u32, max_outputs: u32, params: Vec<ParamBlob>) {
        if change_mask & UPDATE_MAX_INPUTS != 0 {
            self.max_inputs = max_inputs;
        }
        if change_mask & UPDATE_MAX_OUTPUTS != 0 {
            self.max_outputs = max_outputs;
        }
        if change_mask & UPDATE_PARAMS != 0 {
            self.params = params;
        }
    }

    fn port_update(
        &mut self,
        direction: Direction,
        id: u32,
        change_mask: u32,
        params: Vec<ParamBlob>,
        info: Option<ParamBlob>,
    ) {
        if change_mask == 0 {
            self.ports.clear_port(direction, id);
            return;
        }

        if self.ports.get(direction, id).is_err() {
            if let Err(e) = self.ports.add_port(direction, id) {
                log::warn!("port_update for out-of-range port {:?}/{}: {}", direction, id, e);
                return;
            }
        }

        if let Ok(port) = self.ports.get_mut(direction, id) {
            port.params = params;
            if info.is_some() {
                port.info = info;
            }
        }
    }

    fn set_active(&mut self, active: bool) {
        log::debug!("node set_active({})", active);
    }

    fn event(&mut self, event: ParamBlob) {
        match &mut self.callbacks {
            Some(callbacks) => callbacks.event(event),
            None => log::warn!("event arrived with no callbacks installed"),
        }
    }

    fn destroy(&mut self) {
        self.transport = None;
        self.callbacks = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct ChannelLog {
        calls: Vec<String>,
        published: Option<(i32, u64, i32, i32)>,
    }

    struct FakeChannel {
        log: Rc<RefCell<ChannelLog>>,
    }

    impl ResourceChannel for FakeChannel {
        fn set_param(&mut self, seq: u32, id: u32, _flags: u32, _blob: &ParamBlob) -> Result<()> {
            self.log.borrow_mut().calls.push(format!("set_param({}, {})", seq, id));
            Ok(())
        }

        fn port_set_param(
            &mut self,
            seq: u32,
            _direction: Direction,
            id: u32,
            param_id: u32,
            _flags: u32,
            _blob: &ParamBlob,
        ) -> Result<()> {
            self.log
                .borrow_mut()
                .calls
                .push(format!("port_set_param({}, {}, {})", seq, id, param_id));
            Ok(())
        }

        fn add_mem(
            &mut self,
            mem_id: u32,
            memory_type: MemoryType,
            _fd: i32,
            _flags: u32,
            _mapoffset: u64,
            _maxsize: u32,
        ) -> Result<()> {
            self.log
                .borrow_mut()
                .calls
                .push(format!("add_mem({}, {:?})", mem_id, memory_type));
            Ok(())
        }

        fn use_buffers(
            &mut self,
            seq: u32,
            _direction: Direction,
            id: u32,
            buffers: &[BufferDescriptor],
        ) -> Result<()> {
            self.log
                .borrow_mut()
                .calls
                .push(format!("use_buffers({}, {}, {})", seq, id, buffers.len()));
            Ok(())
        }

        fn command(&mut self, seq: Option<u32>, _cmd: &NodeCommand) -> Result<()> {
            self.log.borrow_mut().calls.push(format!("command({:?})", seq));
            Ok(())
        }

        fn publish_transport(
            &mut self,
            region_fd: i32,
            region_size: u64,
            wakeup_us_fd: i32,
            wakeup_them_fd: i32,
        ) -> Result<()> {
            self.log.borrow_mut().published = Some((region_fd, region_size, wakeup_us_fd, wakeup_them_fd));
            Ok(())
        }

        fn destroy(&mut self) -> Result<()> {
            self.log.borrow_mut().calls.push("destroy".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCallbacks {
        have_output: u32,
        need_input: u32,
        reused: Vec<(u32, u32)>,
    }

    impl GraphCallbacks for FakeCallbacks {
        fn have_output(&mut self) {
            self.have_output += 1;
        }

        fn need_input(&mut self) {
            self.need_input += 1;
        }

        fn reuse_buffer(&mut self, port_id: u32, buffer_id: u32) {
            self.reused.push((port_id, buffer_id));
        }

        fn event(&mut self, _event: ParamBlob) {}
    }

    fn blob(object_id: u32) -> ParamBlob {
        ParamBlob { object_id, bytes: Vec::new() }
    }

    fn new_proxy() -> (ProxyNode, Rc<RefCell<ChannelLog>>) {
        let log = Rc::new(RefCell::new(ChannelLog::default()));
        let channel = Box::new(FakeChannel { log: log.clone() });
        let proxy = ProxyNode::with_context(
            Context::default().set_max_inputs(4).set_max_outputs(4).set_ring_size(4096),
            channel,
            Box::new(DefaultParameterCodec),
            Box::new(StaticTypeMap::default()),
        );
        (proxy, log)
    }

    #[test]
    fn add_port_then_set_param_flips_have_format() {
        let (mut proxy, log) = new_proxy();
        proxy.add_port(Direction::Input, 0).unwrap();

        let format_id = proxy.format_param_id;
        let outcome = proxy
            .port_set_param(Direction::Input, 0, format_id, 0, blob(format_id))
            .unwrap();
        assert_eq!(outcome, AsyncOutcome::Pending(0));
        assert!(proxy.ports.get(Direction::Input, 0).unwrap().have_format);
        assert_eq!(log.borrow().calls, vec!["port_set_param(0, 0, 0)".to_string()]);
    }

    #[test]
    fn port_use_buffers_requires_format_first() {
        let (mut proxy, _log) = new_proxy();
        proxy.add_port(Direction::Output, 1).unwrap();

        let buffers = vec![IncomingBuffer {
            client_buffer_handle: 1,
            shared_meta: None,
            metas: Vec::new(),
            datas: Vec::new(),
            offset: 0,
            size: 0,
        }];
        assert_eq!(
            proxy.port_use_buffers(Direction::Output, 1, buffers),
            Err(ProxyError::NotReady)
        );
    }

    #[test]
    fn port_use_buffers_normalises_memfd_and_registers_mem() {
        let (mut proxy, log) = new_proxy();
        proxy.add_port(Direction::Output, 1).unwrap();
        let format_id = proxy.format_param_id;
        proxy
            .port_set_param(Direction::Output, 1, format_id, 0, blob(format_id))
            .unwrap();

        let buffers = vec![IncomingBuffer {
            client_buffer_handle: 7,
            shared_meta: Some(SharedMeta { fd: 9, flags: 0, mapoffset: 0, maxsize: 8192 }),
            metas: Vec::new(),
            datas: vec![
                BufferDatum::MemFd { fd: 3, flags: 0, mapoffset: 0, maxsize: 4096 },
                BufferDatum::MemPtr { relative_offset: 4096, maxsize: 4096 },
            ],
            offset: 0,
            size: 8192,
        }];

        let outcome = proxy.port_use_buffers(Direction::Output, 1, buffers).unwrap();
        assert_eq!(outcome, AsyncOutcome::Pending(1));

        let port = proxy.ports.get(Direction::Output, 1).unwrap();
        assert_eq!(port.buffers.len(), 1);
        assert!(matches!(port.buffers[0].datas[0], BufferDatum::Id { mem_id: 1, .. }));
        assert!(matches!(
            port.buffers[0].datas[1],
            BufferDatum::MemPtr { relative_offset: 0, .. }
        ));

        let calls = log.borrow().calls.clone();
        assert!(calls.iter().any(|c| c.starts_with("add_mem(0,")));
        assert!(calls.iter().any(|c| c.starts_with("add_mem(1,")));
        assert!(calls.iter().any(|c| c.starts_with("use_buffers(1, 1, 1)")));
    }

    #[test]
    fn invalid_buffer_datum_is_logged_and_marked_invalid() {
        let (mut proxy, _log) = new_proxy();
        proxy.add_port(Direction::Input, 0).unwrap();
        let format_id = proxy.format_param_id;
        proxy
            .port_set_param(Direction::Input, 0, format_id, 0, blob(format_id))
            .unwrap();

        let buffers = vec![IncomingBuffer {
            client_buffer_handle: 0,
            shared_meta: Some(SharedMeta { fd: 5, flags: 0, mapoffset: 0, maxsize: 4096 }),
            metas: Vec::new(),
            datas: vec![BufferDatum::Invalid],
            offset: 0,
            size: 0,
        }];
        proxy.port_use_buffers(Direction::Input, 0, buffers).unwrap();
        let port = proxy.ports.get(Direction::Input, 0).unwrap();
        assert!(matches!(port.buffers[0].datas[0], BufferDatum::Invalid));
    }

    #[test]
    fn process_cycles_require_a_published_transport() {
        let (mut proxy, _log) = new_proxy();
        assert_eq!(proxy.process_input(), Err(ProxyError::NotReady));
        assert_eq!(proxy.process_output(), Err(ProxyError::NotReady));
    }

    #[test]
    fn done_zero_zero_builds_and_publishes_the_transport() {
        let (mut proxy, log) = new_proxy();
        assert!(proxy.transport().is_none());

        proxy.done(0, 0);

        assert!(proxy.transport().is_some());
        assert!(log.borrow().published.is_some());
    }

    #[test]
    fn process_input_reports_need_buffer_until_the_client_signals_ready() {
        let (mut proxy, _log) = new_proxy();
        proxy.done(0, 0);
        proxy.add_port(Direction::Input, 0).unwrap();
        proxy.port_set_io(Direction::Input, 0, 0).unwrap();

        assert_eq!(proxy.process_input().unwrap(), CycleOutcome::NeedBuffer);

        proxy.input_ready = 1;
        assert_eq!(proxy.process_input().unwrap(), CycleOutcome::Ok);
        assert_eq!(proxy.input_ready, 0);
    }

    #[test]
    fn have_output_message_resets_pending_and_fires_callback() {
        let (mut proxy, _log) = new_proxy();
        proxy.done(0, 0);
        proxy.add_port(Direction::Output, 0).unwrap();
        proxy.port_set_io(Direction::Output, 0, 0).unwrap();
        proxy.set_callbacks(Box::new(FakeCallbacks::default()));

        assert_eq!(proxy.process_output().unwrap(), CycleOutcome::Ok);
        assert!(proxy.out_pending);

        proxy
            .transport()
            .unwrap()
            .add_message(RingMessageType::HaveOutput, &[])
            .unwrap();
        proxy.poll_transport().unwrap();

        assert!(!proxy.out_pending);
    }

    #[test]
    fn port_update_with_zero_mask_removes_the_port() {
        let (mut proxy, _log) = new_proxy();
        proxy.port_update(Direction::Input, 2, 1, Vec::new(), None);
        assert!(proxy.ports.get(Direction::Input, 2).is_ok());

        proxy.port_update(Direction::Input, 2, 0, Vec::new(), None);
        assert!(proxy.ports.get(Direction::Input, 2).is_err());
    }

    #[test]
    fn destroy_drops_transport_and_callbacks() {
        let (mut proxy, _log) = new_proxy();
        proxy.done(0, 0);
        proxy.set_callbacks(Box::new(FakeCallbacks::default()));
        proxy.destroy();
        assert!(proxy.transport().is_none());
    }
}
