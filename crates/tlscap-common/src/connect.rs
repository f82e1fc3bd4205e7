//! Outbound connection attempts, seen at `connect` entry.
//!
//! Single-shot: there is no return probe, so a record means the process tried
//! to connect, not that it succeeded. Consumers join these records to capture
//! records by `(pid, fd)`.

use crate::capture::{Skip, admit};
use crate::channel::EventSink;
use crate::memory::ForeignMemory;
use crate::record::{AF_INET, ConnectRecord, SA_DATA_LEN};
use crate::task::{TargetFilter, TaskContext, split_pid_tgid};

/// Offset of `sa_data` within `struct sockaddr`
const SA_DATA_OFFSET: u64 = 2;

pub struct ConnectObserver<'a, T, M, K> {
    task: &'a T,
    memory: &'a M,
    sink: &'a K,
    filter: TargetFilter,
}

impl<'a, T, M, K> ConnectObserver<'a, T, M, K>
where
    T: TaskContext,
    M: ForeignMemory,
    K: EventSink<ConnectRecord>,
{
    pub const fn new(task: &'a T, memory: &'a M, sink: &'a K, filter: TargetFilter) -> Self {
        Self {
            task,
            memory,
            sink,
            filter,
        }
    }

    /// `int connect(int fd, const struct sockaddr *addr, socklen_t len)`
    #[inline(always)]
    pub fn observe(&self, fd: u32, sockaddr: u64) -> Result<(), Skip> {
        let pid_tgid = admit(self.task, self.filter)?;
        if sockaddr == 0 {
            return Err(Skip::NullAddress);
        }

        let family = self.memory.read_u16(sockaddr).unwrap_or(0);
        if family != AF_INET {
            return Err(Skip::AddressFamily);
        }

        let (pid, tid) = split_pid_tgid(pid_tgid);
        let mut record = ConnectRecord::zeroed();
        record.timestamp_ns = self.task.timestamp_ns();
        record.pid = pid;
        record.tid = tid;
        record.fd = fd;
        if self
            .memory
            .read_bytes(sockaddr + SA_DATA_OFFSET, &mut record.sa_data)
            .is_err()
        {
            record.sa_data = [0u8; SA_DATA_LEN];
        }
        record.comm = self.task.comm();

        self.sink.emit(&record).map_err(|_| Skip::ChannelFull)
    }
}
