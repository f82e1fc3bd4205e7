//! Socket descriptor recovery from an OpenSSL `SSL *`.
//!
//! Two dependent reads, `ssl->{r,w}bio` then `bio->num`, done with copies out
//! of the traced process rather than calls into libssl. The object can be
//! freed or half-initialised by another thread while we look at it, so any
//! failed read ends the walk with [`UNKNOWN_FD`].

use crate::layout::SslLayout;
use crate::memory::{ForeignMemory, ReadError};
use crate::record::{Direction, UNKNOWN_FD};

/// Walk `ssl` using `layout` and return the transport BIO's descriptor.
#[inline(always)]
pub fn try_resolve_fd<M: ForeignMemory>(
    memory: &M,
    layout: &SslLayout,
    ssl: u64,
    direction: Direction,
) -> Result<u32, ReadError> {
    if ssl == 0 {
        return Err(ReadError::Null);
    }
    let bio = memory.read_u64(ssl.wrapping_add(layout.transport_offset(direction)))?;
    if bio == 0 {
        return Err(ReadError::Null);
    }
    memory.read_u32(bio.wrapping_add(layout.bio_num))
}

/// [`try_resolve_fd`], with every failure mapped to [`UNKNOWN_FD`].
#[inline(always)]
pub fn resolve_fd<M: ForeignMemory>(
    memory: &M,
    layout: &SslLayout,
    ssl: u64,
    direction: Direction,
) -> u32 {
    try_resolve_fd(memory, layout, ssl, direction).unwrap_or(UNKNOWN_FD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LibraryVersion;
    use crate::testing::Memory;

    const SSL: u64 = 0x7f00_0000_1000;
    const RBIO: u64 = 0x7f00_0000_2000;
    const WBIO: u64 = 0x7f00_0000_3000;

    fn connection(layout: &SslLayout, read_fd: u32, write_fd: u32) -> Memory {
        let mut memory = Memory::new();
        memory
            .map_u64(SSL + layout.ssl_rbio, RBIO)
            .map_u64(SSL + layout.ssl_wbio, WBIO)
            .map_u32(RBIO + layout.bio_num, read_fd)
            .map_u32(WBIO + layout.bio_num, write_fd);
        memory
    }

    #[test]
    fn test_resolves_descriptor_per_direction() {
        let layout = SslLayout::OPENSSL_1_1_1;
        let memory = connection(&layout, 7, 9);

        assert_eq!(resolve_fd(&memory, &layout, SSL, Direction::Read), 7);
        assert_eq!(resolve_fd(&memory, &layout, SSL, Direction::Write), 9);
    }

    #[test]
    fn test_resolves_with_each_known_layout() {
        for version in [
            LibraryVersion::OpenSsl1_0_2,
            LibraryVersion::OpenSsl1_1_1,
            LibraryVersion::OpenSsl3_0,
        ] {
            let layout = version.layout();
            let memory = connection(&layout, 21, 21);
            assert_eq!(resolve_fd(&memory, &layout, SSL, Direction::Write), 21, "{version:?}");
        }
    }

    #[test]
    fn test_wrong_layout_does_not_fault() {
        let memory = connection(&SslLayout::OPENSSL_3_0, 5, 5);
        assert_eq!(
            resolve_fd(&memory, &SslLayout::OPENSSL_1_1_1, SSL, Direction::Read),
            UNKNOWN_FD
        );
    }

    #[test]
    fn test_invalid_transport_pointer_is_unknown() {
        let layout = SslLayout::OPENSSL_1_1_1;
        let mut memory = Memory::new();
        memory.map_u64(SSL + layout.ssl_wbio, 0xdead_beef_0000);

        assert_eq!(
            try_resolve_fd(&memory, &layout, SSL, Direction::Write),
            Err(ReadError::Fault(-14))
        );
        assert_eq!(resolve_fd(&memory, &layout, SSL, Direction::Write), UNKNOWN_FD);
    }

    #[test]
    fn test_null_pointers_are_unknown() {
        let layout = SslLayout::OPENSSL_1_1_1;
        let mut memory = Memory::new();
        memory.map_u64(SSL + layout.ssl_rbio, 0);

        assert_eq!(
            try_resolve_fd(&memory, &layout, SSL, Direction::Read),
            Err(ReadError::Null)
        );
        assert_eq!(
            try_resolve_fd(&memory, &layout, 0, Direction::Read),
            Err(ReadError::Null)
        );
        assert_eq!(resolve_fd(&memory, &layout, SSL, Direction::Write), UNKNOWN_FD);
    }
}
