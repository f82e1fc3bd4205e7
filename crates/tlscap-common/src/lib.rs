//! Kernel/userspace contract and capture engine for tlscap.
//!
//! The eBPF object and the userspace loader share this crate. On the kernel
//! side it is `no_std` and supplies:
//!
//! - the flat `#[repr(C)]` records that travel through the ring buffers
//!   ([`CaptureRecord`], [`ConnectRecord`]),
//! - the per-version OpenSSL struct offsets ([`SslLayout`]),
//! - the engine that pairs call entries with call returns, builds records and
//!   resolves socket descriptors ([`Capture`], [`ConnectObserver`]).
//!
//! The engine never touches BPF helpers directly. It is written against the
//! small traits in [`memory`], [`store`], [`scratch`], [`channel`] and
//! [`task`], which the eBPF crate implements over maps and helpers and the
//! tests implement over plain host memory.
//!
//! # Feature Flags
//!
//! - **`user`**: `aya::Pod` impls, byte decoding and display helpers for the
//!   loader (pulls in `std`).

#![cfg_attr(not(any(test, feature = "user")), no_std)]

pub mod capture;
pub mod channel;
pub mod connect;
pub mod layout;
pub mod memory;
pub mod record;
pub mod resolver;
pub mod scratch;
pub mod store;
pub mod task;

#[cfg(feature = "user")]
pub mod userspace;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{Capture, Skip};
pub use channel::{EmitError, EventSink};
pub use connect::ConnectObserver;
pub use layout::{LibraryVersion, SslLayout};
pub use memory::{ForeignMemory, ReadError};
pub use record::{
    AF_INET, COMM_LEN, CaptureRecord, ConnectRecord, Direction, Library, MAX_DATA_LEN,
    SA_DATA_LEN, UNKNOWN_FD, clamp_payload_len,
};
pub use resolver::resolve_fd;
pub use scratch::ScratchPool;
pub use store::{ContextStore, PendingCall, StoreError};
pub use task::{TargetFilter, TaskContext, split_pid_tgid};
