//! Shared fakes for the transport-aware integration tests: a resource
//! channel that just records what was sent, and graph callbacks that count
//! invocations instead of driving a real graph engine.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use proxy_node::control_protocol::{BufferDescriptor, MemoryType, ResourceChannel};
use proxy_node::error::Result;
use proxy_node::external::GraphCallbacks;
use proxy_node::node::NodeCommand;
use proxy_node::port::{Direction, ParamBlob};

#[derive(Default)]
pub struct ChannelLog {
    pub calls: Vec<String>,
    pub published: Option<(i32, u64, i32, i32)>,
}

pub struct RecordingChannel {
    pub log: Rc<RefCell<ChannelLog>>,
}

impl RecordingChannel {
    pub fn new() -> (Box<dyn ResourceChannel>, Rc<RefCell<ChannelLog>>) {
        let log = Rc::new(RefCell::new(ChannelLog::default()));
        (Box::new(RecordingChannel { log: log.clone() }), log)
    }
}

impl ResourceChannel for RecordingChannel {
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
pub struct CallbackCounts {
    pub have_output: u32,
    pub need_input: u32,
    pub reused: Vec<(u32, u32)>,
    pub events: u32,
}

pub struct CountingCallbacks {
    pub counts: Rc<RefCell<CallbackCounts>>,
}

impl CountingCallbacks {
    pub fn new() -> (Box<dyn GraphCallbacks>, Rc<RefCell<CallbackCounts>>) {
        let counts = Rc::new(RefCell::new(CallbackCounts::default()));
        (Box::new(CountingCallbacks { counts: counts.clone() }), counts)
    }
}

impl GraphCallbacks for CountingCallbacks {
    fn have_output(&mut self) {
        self.counts.borrow_mut().have_output += 1;
    }

    fn need_input(&mut self) {
        self.counts.borrow_mut().need_input += 1;
    }

    fn reuse_buffer(&mut self, port_id: u32, buffer_id: u32) {
        self.counts.borrow_mut().reused.push((port_id, buffer_id));
    }

    fn event(&mut self, _event: ParamBlob) {
        self.counts.borrow_mut().events += 1;
    }
}

pub fn blob(object_id: u32) -> ParamBlob {
    ParamBlob { object_id, bytes: Vec::new() }
}
