//! Fixed-layout records emitted to userspace.
//!
//! Both records are `#[repr(C)]`, `Copy`, and built only from integers and
//! byte arrays, so a consumer in any language can decode them by offset and
//! every bit pattern is a valid value.

use core::mem::size_of;

/// Maximum plaintext bytes captured per call. Must stay a power of two.
pub const MAX_DATA_LEN: usize = 4096;

/// Command name length (TASK_COMM_LEN in the kernel)
pub const COMM_LEN: usize = 16;

/// Length of `sockaddr.sa_data`
pub const SA_DATA_LEN: usize = 14;

/// IPv4 address family, the only family the connection observer records.
pub const AF_INET: u16 = 2;

/// Descriptor reported when it could not be resolved, or for libraries whose
/// connection object is not introspected.
pub const UNKNOWN_FD: u32 = 0;

const _: () = assert!(MAX_DATA_LEN.is_power_of_two());
const _: () = assert!(size_of::<CaptureRecord>() == 4144);
const _: () = assert!(size_of::<ConnectRecord>() == 56);

/// Which side of the library boundary the plaintext crossed.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext returned by a read, after decryption
    Read = 0,
    /// Plaintext handed to a write, before encryption
    Write = 1,
}

impl Direction {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Direction::Read),
            1 => Some(Direction::Write),
            _ => None,
        }
    }
}

/// Library family whose call produced a [`CaptureRecord`].
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Library {
    /// `SSL_read` / `SSL_write`
    OpenSsl = 1,
    /// `PR_Read` / `PR_Write`
    Nspr = 2,
}

impl Library {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Library::OpenSsl),
            2 => Some(Library::Nspr),
            _ => None,
        }
    }
}

/// One completed read or write call.
///
/// Only `data[..data_len]` is meaningful; the tail of `data` is whatever the
/// per-CPU scratch slot held before.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CaptureRecord {
    /// Monotonic timestamp taken when the call returned
    pub timestamp_ns: u64,
    /// Process ID (tgid)
    pub pid: u32,
    /// Thread ID
    pub tid: u32,
    /// [`Direction`] as its raw discriminant
    pub direction: u32,
    /// [`Library`] as its raw discriminant
    pub library: u32,
    /// Socket descriptor, or [`UNKNOWN_FD`]
    pub fd: u32,
    /// Captured length, at most [`MAX_DATA_LEN`]
    pub data_len: u32,
    /// Process command name (null-terminated unless all 16 bytes are used)
    pub comm: [u8; COMM_LEN],
    /// Captured plaintext
    pub data: [u8; MAX_DATA_LEN],
}

impl CaptureRecord {
    pub const fn zeroed() -> Self {
        Self {
            timestamp_ns: 0,
            pid: 0,
            tid: 0,
            direction: 0,
            library: 0,
            fd: UNKNOWN_FD,
            data_len: 0,
            comm: [0u8; COMM_LEN],
            data: [0u8; MAX_DATA_LEN],
        }
    }

    /// The captured bytes, bounded by both `data_len` and the buffer.
    pub fn payload(&self) -> &[u8] {
        let len = (self.data_len as usize).min(MAX_DATA_LEN);
        &self.data[..len]
    }
}

/// One observed outbound connection attempt.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ConnectRecord {
    /// Monotonic timestamp taken when `connect` was entered
    pub timestamp_ns: u64,
    /// Process ID (tgid)
    pub pid: u32,
    /// Thread ID
    pub tid: u32,
    /// Socket descriptor passed to `connect`
    pub fd: u32,
    /// Raw `sockaddr.sa_data`: port then IPv4 address, network byte order
    pub sa_data: [u8; SA_DATA_LEN],
    /// Process command name
    pub comm: [u8; COMM_LEN],
    _pad: [u8; 6],
}

impl ConnectRecord {
    pub const fn zeroed() -> Self {
        Self {
            timestamp_ns: 0,
            pid: 0,
            tid: 0,
            fd: 0,
            sa_data: [0u8; SA_DATA_LEN],
            comm: [0u8; COMM_LEN],
            _pad: [0u8; 6],
        }
    }
}

/// Number of payload bytes to copy for a call that returned `ret`.
///
/// Negative returns are library errors and yield `None`. Larger transfers are
/// clamped to [`MAX_DATA_LEN`]. The masking form is what older verifiers
/// accept as a bounded length.
#[inline(always)]
pub const fn clamp_payload_len(ret: i64) -> Option<usize> {
    if ret < 0 {
        return None;
    }
    let len = ret as u64;
    if len < MAX_DATA_LEN as u64 {
        Some(len as usize & (MAX_DATA_LEN - 1))
    } else {
        Some(MAX_DATA_LEN)
    }
}
