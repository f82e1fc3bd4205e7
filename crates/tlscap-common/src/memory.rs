//! Best-effort reads from the traced process's address space.

/// A read from foreign memory failed. The traced process may have unmapped or
/// protected the page, or the pointer was never valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadError {
    /// Null address, rejected without attempting the copy
    Null,
    /// The copy faulted; carries the helper's return code
    Fault(i64),
}

/// Copy-out access to the traced process's memory.
///
/// Implementations must never fault the caller: an unreadable address is an
/// `Err`, not a crash.
pub trait ForeignMemory {
    /// Fill `dst` with `dst.len()` bytes starting at `addr`. Address 0 must
    /// yield [`ReadError::Null`].
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadError>;

    fn read_u64(&self, addr: u64) -> Result<u64, ReadError> {
        let mut raw = [0u8; 8];
        self.read_bytes(addr, &mut raw)?;
        Ok(u64::from_ne_bytes(raw))
    }

    fn read_u32(&self, addr: u64) -> Result<u32, ReadError> {
        let mut raw = [0u8; 4];
        self.read_bytes(addr, &mut raw)?;
        Ok(u32::from_ne_bytes(raw))
    }

    fn read_u16(&self, addr: u64) -> Result<u16, ReadError> {
        let mut raw = [0u8; 2];
        self.read_bytes(addr, &mut raw)?;
        Ok(u16::from_ne_bytes(raw))
    }
}
