//! Entry/return correlation and record building for read/write probes.
//!
//! A call is seen twice: at entry, where its arguments are stashed in a
//! [`ContextStore`] under the calling thread's `pid_tgid`, and at return,
//! where the stash is taken back and, if the call transferred data, turned
//! into a [`CaptureRecord`] and emitted. Keys are thread-scoped, so two
//! threads can never see each other's arguments.
//!
//! Nothing here reports failure to the traced process. Every early exit is a
//! [`Skip`], which the probes discard.

use crate::channel::EventSink;
use crate::layout::SslLayout;
use crate::memory::ForeignMemory;
use crate::record::{CaptureRecord, Direction, Library, MAX_DATA_LEN, clamp_payload_len};
use crate::resolver::resolve_fd;
use crate::scratch::ScratchPool;
use crate::store::{ContextStore, PendingCall, StoreError};
use crate::task::{TargetFilter, TaskContext, split_pid_tgid};

/// Why a probe did not store a context or emit a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    /// The process is excluded by the [`TargetFilter`]
    FilteredPid,
    /// Return observed without a matching entry
    NoPendingCall,
    /// The call returned a negative count
    CallFailed,
    /// The context store is at capacity
    StoreFull,
    /// The context store refused the entry for another reason
    StoreRejected,
    /// No scratch slot for this CPU
    ScratchUnavailable,
    /// The emission channel's backlog is full
    ChannelFull,
    /// `connect` was given a null address
    NullAddress,
    /// `connect` address family other than IPv4
    AddressFamily,
}

impl From<StoreError> for Skip {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Full => Skip::StoreFull,
            StoreError::Rejected(_) => Skip::StoreRejected,
        }
    }
}

/// Current `pid_tgid`, if the filter admits its process.
#[inline(always)]
pub(crate) fn admit<T: TaskContext>(task: &T, filter: TargetFilter) -> Result<u64, Skip> {
    let pid_tgid = task.pid_tgid();
    let (pid, _) = split_pid_tgid(pid_tgid);
    if filter.matches(pid) {
        Ok(pid_tgid)
    } else {
        Err(Skip::FilteredPid)
    }
}

/// The read/write capture pipeline, borrowed over its collaborators.
///
/// The stores are passed per call because each library family and direction
/// has its own.
pub struct Capture<'a, T, M, P, K> {
    task: &'a T,
    memory: &'a M,
    scratch: &'a P,
    sink: &'a K,
    filter: TargetFilter,
}

impl<'a, T, M, P, K> Capture<'a, T, M, P, K>
where
    T: TaskContext,
    M: ForeignMemory,
    P: ScratchPool,
    K: EventSink<CaptureRecord>,
{
    pub const fn new(
        task: &'a T,
        memory: &'a M,
        scratch: &'a P,
        sink: &'a K,
        filter: TargetFilter,
    ) -> Self {
        Self {
            task,
            memory,
            scratch,
            sink,
            filter,
        }
    }

    /// Call entry for a library whose descriptor is not resolved.
    #[inline(always)]
    pub fn enter<S: ContextStore>(&self, store: &S, buf: u64, fd: u32) -> Result<(), Skip> {
        let pid_tgid = admit(self.task, self.filter)?;
        store.put(pid_tgid, &PendingCall::new(buf, fd))?;
        Ok(())
    }

    /// `SSL_read` / `SSL_write` entry: resolves the descriptor from `ssl`
    /// before stashing it alongside `buf`.
    #[inline(always)]
    pub fn enter_openssl<S: ContextStore>(
        &self,
        store: &S,
        layout: &SslLayout,
        direction: Direction,
        ssl: u64,
        buf: u64,
    ) -> Result<(), Skip> {
        let pid_tgid = admit(self.task, self.filter)?;
        let fd = resolve_fd(self.memory, layout, ssl, direction);
        store.put(pid_tgid, &PendingCall::new(buf, fd))?;
        Ok(())
    }

    /// Call return. Consumes the pending context and emits one record when
    /// `ret` is non-negative.
    #[inline(always)]
    pub fn exit<S: ContextStore>(
        &self,
        store: &S,
        library: Library,
        direction: Direction,
        ret: i64,
    ) -> Result<(), Skip> {
        let pid_tgid = admit(self.task, self.filter)?;
        let call = store.take(pid_tgid).ok_or(Skip::NoPendingCall)?;
        let len = clamp_payload_len(ret).ok_or(Skip::CallFailed)?;

        self.scratch
            .acquire(|record| {
                self.build_record(record, pid_tgid, library, direction, &call, len);
                self.sink.emit(record)
            })
            .ok_or(Skip::ScratchUnavailable)?
            .map_err(|_| Skip::ChannelFull)
    }

    /// Fill every field of `record`. A payload that cannot be copied leaves
    /// `data_len` at zero.
    #[inline(always)]
    fn build_record(
        &self,
        record: &mut CaptureRecord,
        pid_tgid: u64,
        library: Library,
        direction: Direction,
        call: &PendingCall,
        len: usize,
    ) {
        let (pid, tid) = split_pid_tgid(pid_tgid);
        record.timestamp_ns = self.task.timestamp_ns();
        record.pid = pid;
        record.tid = tid;
        record.direction = direction as u32;
        record.library = library as u32;
        record.fd = call.fd;
        record.data_len = 0;

        if len > 0 && len <= MAX_DATA_LEN {
            if self.memory.read_bytes(call.buf, &mut record.data[..len]).is_ok() {
                record.data_len = len as u32;
            }
        }

        record.comm = self.task.comm();
    }
}
