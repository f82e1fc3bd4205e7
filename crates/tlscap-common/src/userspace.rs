//! Consumer-side decoding of the records read out of the ring buffers.

use std::fmt;
use std::mem::size_of;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::layout::SslLayout;
use crate::record::{COMM_LEN, CaptureRecord, ConnectRecord, Direction, Library, UNKNOWN_FD};

// SAFETY: #[repr(C)], Copy, and built only from integers and byte arrays.
unsafe impl aya::Pod for CaptureRecord {}
unsafe impl aya::Pod for ConnectRecord {}
unsafe impl aya::Pod for SslLayout {}

/// A ring buffer entry shorter than the record it should hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record truncated: expected {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for Truncated {}

/// Copy a `T` out of `bytes`, which need not be aligned.
///
/// Only for the record types here, for which every bit pattern is valid.
fn decode<T: aya::Pod>(bytes: &[u8]) -> Result<T, Truncated> {
    if bytes.len() < size_of::<T>() {
        return Err(Truncated {
            expected: size_of::<T>(),
            actual: bytes.len(),
        });
    }
    // SAFETY: length checked above; T is Pod.
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

fn comm_str(comm: &[u8; COMM_LEN]) -> String {
    let end = comm.iter().position(|&c| c == 0).unwrap_or(COMM_LEN);
    String::from_utf8_lossy(&comm[..end]).into_owned()
}

impl CaptureRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self, Truncated> {
        decode(bytes)
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::from_raw(self.direction)
    }

    pub fn library(&self) -> Option<Library> {
        Library::from_raw(self.library)
    }

    /// Descriptor, unless it is the unknown sentinel.
    pub fn descriptor(&self) -> Option<u32> {
        (self.fd != UNKNOWN_FD).then_some(self.fd)
    }

    pub fn process_name(&self) -> String {
        comm_str(&self.comm)
    }
}

impl fmt::Debug for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRecord")
            .field("timestamp_ns", &self.timestamp_ns)
            .field("pid", &self.pid)
            .field("tid", &self.tid)
            .field("direction", &self.direction())
            .field("library", &self.library())
            .field("fd", &self.fd)
            .field("data_len", &self.data_len)
            .field("comm", &self.process_name())
            .finish()
    }
}

impl ConnectRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self, Truncated> {
        decode(bytes)
    }

    /// Destination decoded from `sa_data` as a `sockaddr_in` tail.
    pub fn destination(&self) -> SocketAddrV4 {
        let port = u16::from_be_bytes([self.sa_data[0], self.sa_data[1]]);
        let ip = Ipv4Addr::new(
            self.sa_data[2],
            self.sa_data[3],
            self.sa_data[4],
            self.sa_data[5],
        );
        SocketAddrV4::new(ip, port)
    }

    pub fn process_name(&self) -> String {
        comm_str(&self.comm)
    }
}

impl fmt::Debug for ConnectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRecord")
            .field("timestamp_ns", &self.timestamp_ns)
            .field("pid", &self.pid)
            .field("tid", &self.tid)
            .field("fd", &self.fd)
            .field("destination", &self.destination())
            .field("comm", &self.process_name())
            .finish()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Read => "READ",
            Direction::Write => "WRITE",
        })
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Library::OpenSsl => "openssl",
            Library::Nspr => "nspr",
        })
    }
}
