#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use v4l_stream::buffer::{Descriptor, Flags};
use v4l_stream::capability::{self, Capabilities};
use v4l_stream::io::Driver;
use v4l_stream::memory::Mapping;
use v4l_stream::{Error, Result, Timestamp};

/// What the next dequeue returns
#[derive(Debug, Clone)]
pub enum Event {
    /// Fill a queued buffer; `None` picks the oldest one
    Frame {
        index: Option<u32>,
        bytesused: u32,
        flags: u32,
        fill: u8,
    },
    /// Report an arbitrary index without consulting the queue
    RawIndex(u32),
    /// Fail the dequeue with an errno
    Errno(i32),
}

impl Event {
    pub fn frame(index: u32, bytesused: u32) -> Self {
        Event::Frame {
            index: Some(index),
            bytesused,
            flags: 0,
            fill: index as u8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub requests: Vec<u32>,
    pub queries: u32,
    pub maps: u32,
    pub unmaps: u32,
    pub queued: Vec<u32>,
    pub dequeued: u32,
    pub stream_on: u32,
    pub stream_off: u32,
}

impl Calls {
    pub fn queued_count(&self, index: u32) -> usize {
        self.queued.iter().filter(|i| **i == index).count()
    }
}

struct Inner {
    grant_limit: u32,
    buffer_len: usize,
    /// Deliver every queued buffer full when the script is empty
    auto: bool,
    fail_map_at: Option<u32>,
    fail_stream_on: Option<i32>,
    fail_stream_off: Option<i32>,
    fail_queue_once: Option<(u32, i32)>,

    granted: u32,
    streaming: bool,
    sequence: u32,
    driver_queue: VecDeque<u32>,
    mappings: HashMap<u32, (usize, usize)>,
    script: VecDeque<Event>,
    calls: Calls,
}

/// Scripted in-memory stand-in for a capture device
pub struct FakeDriver {
    caps: Capabilities,
    inner: Mutex<Inner>,
}

impl FakeDriver {
    pub fn new(grant_limit: u32, buffer_len: usize) -> Self {
        FakeDriver {
            caps: Capabilities {
                driver: "fake".into(),
                card: "Scripted Camera".into(),
                bus: "platform:fake".into(),
                version: (6, 1, 0),
                capabilities: capability::Flags::VIDEO_CAPTURE | capability::Flags::STREAMING,
            },
            inner: Mutex::new(Inner {
                grant_limit,
                buffer_len,
                auto: false,
                fail_map_at: None,
                fail_stream_on: None,
                fail_stream_off: None,
                fail_queue_once: None,
                granted: 0,
                streaming: false,
                sequence: 0,
                driver_queue: VecDeque::new(),
                mappings: HashMap::new(),
                script: VecDeque::new(),
                calls: Calls::default(),
            }),
        }
    }

    pub fn with_caps(mut self, flags: capability::Flags) -> Self {
        self.caps.capabilities = flags;
        self
    }

    /// Keep producing frames from whatever is queued
    pub fn auto(self) -> Self {
        self.lock().auto = true;
        self
    }

    pub fn fail_map_at(self, index: u32) -> Self {
        self.lock().fail_map_at = Some(index);
        self
    }

    pub fn fail_stream_on(self, errno: i32) -> Self {
        self.lock().fail_stream_on = Some(errno);
        self
    }

    /// Fail stream-off with `errno` until cleared with `None`
    pub fn set_fail_stream_off(&self, errno: Option<i32>) {
        self.lock().fail_stream_off = errno;
    }

    /// Fail the next queue call for `index` with `errno`
    pub fn fail_next_queue(&self, index: u32, errno: i32) {
        self.lock().fail_queue_once = Some((index, errno));
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn push(&self, event: Event) {
        self.lock().script.push_back(event);
    }

    /// Snapshot of the calls made so far
    pub fn calls(&self) -> Calls {
        self.lock().calls.clone()
    }

    /// Number of mappings currently handed out
    pub fn mapped(&self) -> usize {
        self.lock().mappings.len()
    }

    pub fn granted(&self) -> u32 {
        self.lock().granted
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    /// Indices currently owned by the fake
    pub fn driver_queue(&self) -> Vec<u32> {
        self.lock().driver_queue.iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn errno(op: &'static str, errno: i32) -> Error {
    Error::from_errno(op, errno)
}

impl Inner {
    fn ready(&self) -> bool {
        match self.script.front() {
            Some(Event::Frame { index: None, .. }) => !self.driver_queue.is_empty(),
            Some(_) => true,
            None => self.auto && self.streaming && !self.driver_queue.is_empty(),
        }
    }

    fn fill(&self, index: u32, bytesused: u32, fill: u8) {
        if let Some(&(ptr, len)) = self.mappings.get(&index) {
            let count = (bytesused as usize).min(len);
            unsafe { ptr::write_bytes(ptr as *mut u8, fill, count) };
        }
    }

    fn take(&mut self, index: Option<u32>) -> Option<u32> {
        let pos = match index {
            Some(index) => self.driver_queue.iter().position(|i| *i == index)?,
            None => 0,
        };
        self.driver_queue.remove(pos)
    }

    fn filled(&mut self, index: u32, bytesused: u32, flags: u32) -> Descriptor {
        self.sequence += 1;
        self.calls.dequeued += 1;

        let mut desc = Descriptor::mapped(
            index,
            index * self.buffer_len as u32,
            self.buffer_len as u32,
        );
        desc.bytesused = bytesused;
        desc.flags = Flags::MAPPED | Flags::DONE | Flags::from(flags);
        desc.sequence = self.sequence;
        desc.timestamp = Timestamp::new(self.sequence as i64, 0);
        desc
    }
}

impl Driver for FakeDriver {
    fn query_caps(&self) -> Result<Capabilities> {
        Ok(self.caps.clone())
    }

    fn request_buffers(&self, count: u32) -> Result<u32> {
        let mut inner = self.lock();
        inner.calls.requests.push(count);

        if count == 0 {
            if !inner.mappings.is_empty() {
                return Err(errno("VIDIOC_REQBUFS", libc::EBUSY));
            }
            inner.granted = 0;
            return Ok(0);
        }
        if inner.granted != 0 {
            return Err(errno("VIDIOC_REQBUFS", libc::EBUSY));
        }

        inner.granted = count.min(inner.grant_limit);
        Ok(inner.granted)
    }

    fn query_buffer(&self, index: u32) -> Result<Descriptor> {
        let mut inner = self.lock();
        inner.calls.queries += 1;
        if index >= inner.granted {
            return Err(errno("VIDIOC_QUERYBUF", libc::EINVAL));
        }

        let len = inner.buffer_len as u32;
        Ok(Descriptor::mapped(index, index * len, len))
    }

    fn queue_buffer(&self, index: u32) -> Result<Descriptor> {
        let mut inner = self.lock();
        inner.calls.queued.push(index);
        if let Some((failing, e)) = inner.fail_queue_once {
            if failing == index {
                inner.fail_queue_once = None;
                return Err(errno("VIDIOC_QBUF", e));
            }
        }
        if index >= inner.granted || inner.driver_queue.contains(&index) {
            return Err(errno("VIDIOC_QBUF", libc::EINVAL));
        }

        inner.driver_queue.push_back(index);
        let len = inner.buffer_len as u32;
        let mut desc = Descriptor::mapped(index, index * len, len);
        desc.flags |= Flags::QUEUED;
        Ok(desc)
    }

    fn dequeue_buffer(&self) -> Result<Descriptor> {
        let mut inner = self.lock();
        if !inner.streaming {
            return Err(errno("VIDIOC_DQBUF", libc::EINVAL));
        }

        match inner.script.pop_front() {
            Some(Event::Frame {
                index,
                bytesused,
                flags,
                fill,
            }) => match inner.take(index) {
                Some(index) => {
                    inner.fill(index, bytesused, fill);
                    Ok(inner.filled(index, bytesused, flags))
                }
                None => Err(errno("VIDIOC_DQBUF", libc::EAGAIN)),
            },
            Some(Event::RawIndex(index)) => Ok(inner.filled(index, 0, 0)),
            Some(Event::Errno(e)) => Err(errno("VIDIOC_DQBUF", e)),
            None if inner.auto => match inner.take(None) {
                Some(index) => {
                    let len = inner.buffer_len as u32;
                    inner.fill(index, len, index as u8);
                    Ok(inner.filled(index, len, 0))
                }
                None => Err(errno("VIDIOC_DQBUF", libc::EAGAIN)),
            },
            None => Err(errno("VIDIOC_DQBUF", libc::EAGAIN)),
        }
    }

    fn stream_on(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.stream_on += 1;
        if let Some(e) = inner.fail_stream_on {
            return Err(errno("VIDIOC_STREAMON", e));
        }
        inner.streaming = true;
        Ok(())
    }

    fn stream_off(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.stream_off += 1;
        if let Some(e) = inner.fail_stream_off {
            return Err(errno("VIDIOC_STREAMOFF", e));
        }
        inner.streaming = false;
        inner.driver_queue.clear();
        Ok(())
    }

    fn map(&self, offset: u32, length: usize) -> Result<Mapping> {
        let mut inner = self.lock();
        inner.calls.maps += 1;

        let index = offset / inner.buffer_len as u32;
        if inner.fail_map_at == Some(index) {
            return Err(errno("mmap", libc::ENOMEM));
        }

        let region: Box<[u8]> = vec![0u8; length].into_boxed_slice();
        let ptr = Box::into_raw(region) as *mut u8;
        inner.mappings.insert(index, (ptr as usize, length));

        let ptr = NonNull::new(ptr).ok_or_else(|| errno("mmap", libc::ENOMEM))?;
        Ok(unsafe { Mapping::from_raw_parts(ptr, length) })
    }

    fn unmap(&self, mapping: Mapping) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.unmaps += 1;

        let addr = mapping.as_ptr() as usize;
        let index = inner
            .mappings
            .iter()
            .find(|(_, (ptr, len))| *ptr == addr && *len == mapping.len())
            .map(|(index, _)| *index)
            .ok_or_else(|| errno("munmap", libc::EINVAL))?;
        inner.mappings.remove(&index);

        drop(unsafe {
            Box::from_raw(ptr::slice_from_raw_parts_mut(mapping.as_ptr(), mapping.len()))
        });
        Ok(())
    }

    fn wait_readable(&self, timeout: Duration) -> Result<()> {
        if self.lock().ready() {
            return Ok(());
        }

        // give producers a chance without spinning
        thread::sleep(timeout.min(Duration::from_millis(5)));
        if self.lock().ready() {
            Ok(())
        } else {
            Err(Error::Timeout(timeout))
        }
    }
}
