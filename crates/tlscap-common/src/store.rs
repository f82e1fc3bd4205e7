//! In-flight call arguments, keyed by `pid_tgid`, held between a call's entry
//! and its return.

/// Arguments captured at call entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingCall {
    /// Address of the plaintext buffer argument
    pub buf: u64,
    /// Descriptor resolved at entry, or [`UNKNOWN_FD`](crate::UNKNOWN_FD)
    pub fd: u32,
    _pad: u32,
}

impl PendingCall {
    pub const fn new(buf: u64, fd: u32) -> Self {
        Self { buf, fd, _pad: 0 }
    }
}

/// Insertion into a [`ContextStore`] was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// Capacity reached and the key is not already present
    Full,
    /// Any other failure, with the helper's return code
    Rejected(i64),
}

/// Bounded concurrent map from `pid_tgid` to [`PendingCall`].
///
/// `put` overwrites an existing entry for the same key: a thread that entered
/// a call and never returned is replaced by its next entry. `take` removes the
/// entry whether or not the caller goes on to use it.
pub trait ContextStore {
    fn put(&self, key: u64, call: &PendingCall) -> Result<(), StoreError>;

    fn take(&self, key: u64) -> Option<PendingCall>;
}
