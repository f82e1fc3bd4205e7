//! Identity of the thread that triggered the probe.

use crate::record::COMM_LEN;

/// Facts about the currently executing task.
pub trait TaskContext {
    /// `tgid << 32 | pid`, as returned by `bpf_get_current_pid_tgid`
    fn pid_tgid(&self) -> u64;

    /// Monotonic clock in nanoseconds
    fn timestamp_ns(&self) -> u64;

    fn comm(&self) -> [u8; COMM_LEN];
}

/// Split a `pid_tgid` into (process ID, thread ID).
#[inline(always)]
pub const fn split_pid_tgid(pid_tgid: u64) -> (u32, u32) {
    ((pid_tgid >> 32) as u32, pid_tgid as u32)
}

/// Process filter applied before any work is done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetFilter {
    /// Only this process is traced; 0 traces every process
    pub pid: u32,
}

impl TargetFilter {
    pub const ALL: TargetFilter = TargetFilter { pid: 0 };

    pub const fn pid(pid: u32) -> Self {
        TargetFilter { pid }
    }

    #[inline(always)]
    pub const fn matches(&self, pid: u32) -> bool {
        self.pid == 0 || self.pid == pid
    }
}
