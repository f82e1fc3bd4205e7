//! Host-side stand-ins for the BPF maps and helpers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::channel::{EmitError, EventSink};
use crate::memory::{ForeignMemory, ReadError};
use crate::record::{COMM_LEN, CaptureRecord};
use crate::scratch::ScratchPool;
use crate::store::{ContextStore, PendingCall, StoreError};
use crate::task::TaskContext;

const EFAULT: i64 = -14;
const EAGAIN: i64 = -11;

/// Sparse address space made of mapped regions. Anything else faults.
#[derive(Default)]
pub struct Memory {
    regions: Vec<(u64, Vec<u8>)>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, base: u64, bytes: Vec<u8>) -> &mut Self {
        self.regions.push((base, bytes));
        self
    }

    pub fn map_u64(&mut self, addr: u64, value: u64) -> &mut Self {
        self.map(addr, value.to_ne_bytes().to_vec())
    }

    pub fn map_u32(&mut self, addr: u64, value: u32) -> &mut Self {
        self.map(addr, value.to_ne_bytes().to_vec())
    }
}

impl ForeignMemory for Memory {
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadError> {
        if addr == 0 {
            return Err(ReadError::Null);
        }
        let end = addr.checked_add(dst.len() as u64).ok_or(ReadError::Fault(EFAULT))?;
        for (base, bytes) in &self.regions {
            if addr >= *base && end <= base + bytes.len() as u64 {
                let start = (addr - base) as usize;
                dst.copy_from_slice(&bytes[start..start + dst.len()]);
                return Ok(());
            }
        }
        Err(ReadError::Fault(EFAULT))
    }
}

/// Fixed-capacity map with the BPF hash map's insert semantics.
pub struct Store {
    capacity: usize,
    entries: Mutex<HashMap<u64, PendingCall>>,
}

impl Store {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get(&self, key: u64) -> Option<PendingCall> {
        self.entries.lock().unwrap().get(&key).copied()
    }
}

impl ContextStore for Store {
    fn put(&self, key: u64, call: &PendingCall) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            return Err(StoreError::Full);
        }
        entries.insert(key, *call);
        Ok(())
    }

    fn take(&self, key: u64) -> Option<PendingCall> {
        self.entries.lock().unwrap().remove(&key)
    }
}

/// A single CPU's scratch slot.
pub struct Scratch {
    slot: RefCell<Box<CaptureRecord>>,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            slot: RefCell::new(Box::new(CaptureRecord::zeroed())),
        }
    }
}

impl ScratchPool for Scratch {
    fn acquire<R>(&self, f: impl FnOnce(&mut CaptureRecord) -> R) -> Option<R> {
        Some(f(&mut self.slot.borrow_mut()))
    }
}

/// Bounded backlog that drops once full.
pub struct Sink<T> {
    capacity: usize,
    records: Mutex<Vec<T>>,
}

impl<T: Copy> Sink<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<T> {
        self.records.lock().unwrap().clone()
    }
}

impl<T: Copy> EventSink<T> for Sink<T> {
    fn emit(&self, record: &T) -> Result<(), EmitError> {
        let mut records = self.records.lock().unwrap();
        if records.len() >= self.capacity {
            return Err(EmitError::Dropped(EAGAIN));
        }
        records.push(*record);
        Ok(())
    }
}

/// A thread with a ticking clock.
pub struct Task {
    pid_tgid: Cell<u64>,
    clock: Cell<u64>,
    comm: [u8; COMM_LEN],
}

impl Task {
    pub fn new(pid: u32, tid: u32, name: &str) -> Self {
        let mut comm = [0u8; COMM_LEN];
        let len = name.len().min(COMM_LEN);
        comm[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            pid_tgid: Cell::new(((pid as u64) << 32) | tid as u64),
            clock: Cell::new(1_000),
            comm,
        }
    }

    pub fn switch_to(&self, pid: u32, tid: u32) {
        self.pid_tgid.set(((pid as u64) << 32) | tid as u64);
    }
}

impl TaskContext for Task {
    fn pid_tgid(&self) -> u64 {
        self.pid_tgid.get()
    }

    fn timestamp_ns(&self) -> u64 {
        let now = self.clock.get();
        self.clock.set(now + 1);
        now
    }

    fn comm(&self) -> [u8; COMM_LEN] {
        self.comm
    }
}
