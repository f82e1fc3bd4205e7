//! OpenSSL internal struct offsets, per library version.
//!
//! The socket descriptor lives at `ssl->rbio->num` (reads) or
//! `ssl->wbio->num` (writes). Neither struct is part of OpenSSL's public ABI,
//! so the offsets are data: the loader picks a [`SslLayout`] and writes it into
//! the eBPF object as a read-only global. A wrong layout degrades to
//! [`UNKNOWN_FD`](crate::UNKNOWN_FD) or a wrong descriptor, never a fault.

use crate::record::Direction;

/// Byte offsets used to walk `SSL -> BIO -> num`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SslLayout {
    /// Offset of `BIO *rbio` within `struct ssl_st`
    pub ssl_rbio: u64,
    /// Offset of `BIO *wbio` within `struct ssl_st`
    pub ssl_wbio: u64,
    /// Offset of `int num` within `struct bio_st`
    pub bio_num: u64,
}

impl SslLayout {
    /// `ssl_st { int version; int type; SSL_METHOD *method; BIO *rbio; BIO *wbio; }`
    /// and a `bio_st` without `callback_ex`.
    pub const OPENSSL_1_0_2: SslLayout = SslLayout {
        ssl_rbio: 0x10,
        ssl_wbio: 0x18,
        bio_num: 0x28,
    };

    /// `bio_st` gained `callback_ex` ahead of `num`.
    pub const OPENSSL_1_1_1: SslLayout = SslLayout {
        ssl_rbio: 0x10,
        ssl_wbio: 0x18,
        bio_num: 0x30,
    };

    /// `bio_st` gained a leading `OSSL_LIB_CTX *libctx`.
    pub const OPENSSL_3_0: SslLayout = SslLayout {
        ssl_rbio: 0x10,
        ssl_wbio: 0x18,
        bio_num: 0x38,
    };

    /// Offset of the transport BIO pointer used by calls in `direction`.
    #[inline(always)]
    pub const fn transport_offset(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Read => self.ssl_rbio,
            Direction::Write => self.ssl_wbio,
        }
    }
}

impl Default for SslLayout {
    fn default() -> Self {
        SslLayout::OPENSSL_1_1_1
    }
}

/// OpenSSL releases with a known [`SslLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryVersion {
    OpenSsl1_0_2,
    OpenSsl1_1_1,
    OpenSsl3_0,
}

impl LibraryVersion {
    pub const fn layout(self) -> SslLayout {
        match self {
            LibraryVersion::OpenSsl1_0_2 => SslLayout::OPENSSL_1_0_2,
            LibraryVersion::OpenSsl1_1_1 => SslLayout::OPENSSL_1_1_1,
            LibraryVersion::OpenSsl3_0 => SslLayout::OPENSSL_3_0,
        }
    }
}
