#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_user_buf,
    },
    macros::{map, uprobe, uretprobe},
    maps::{HashMap, PerCpuArray, RingBuf},
    programs::{ProbeContext, RetProbeContext},
};
use tlscap_common::{
    COMM_LEN, Capture, CaptureRecord, ConnectObserver, ConnectRecord, ContextStore, Direction,
    EmitError, EventSink, ForeignMemory, Library, PendingCall, ReadError, ScratchPool, Skip,
    SslLayout, StoreError, TargetFilter, TaskContext, UNKNOWN_FD,
};

const E2BIG: i64 = 7;

// =============================================================================
// Load-time configuration
// =============================================================================

/// Only this process is traced; 0 traces everything. Rewritten by the loader.
#[unsafe(no_mangle)]
static TARGET_PID: u32 = 0;

/// Struct offsets used to find the socket behind an `SSL *`. Rewritten by the
/// loader to match the installed libssl.
#[unsafe(no_mangle)]
static SSL_LAYOUT: SslLayout = SslLayout::OPENSSL_1_1_1;

#[inline(always)]
fn target_filter() -> TargetFilter {
    TargetFilter::pid(unsafe { core::ptr::read_volatile(&TARGET_PID) })
}

#[inline(always)]
fn ssl_layout() -> SslLayout {
    unsafe { core::ptr::read_volatile(&SSL_LAYOUT) }
}

// =============================================================================
// Maps
// =============================================================================

/// Capture records. 256KB holds about 60 full-size records.
#[map]
static DATA_EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

/// Connection attempts
#[map]
static CONNECT_EVENTS: RingBuf = RingBuf::with_byte_size(64 * 1024, 0);

/// Per-CPU slot the capture record is assembled in; too large for the stack.
#[map]
static SCRATCH: PerCpuArray<CaptureRecord> = PerCpuArray::with_max_entries(1, 0);

/// Pending calls keyed by pid_tgid, one map per library and direction so a
/// thread inside SSL_read that calls SSL_write cannot clobber its own entry.
#[map]
static OPENSSL_READ_ARGS: HashMap<u64, PendingCall> = HashMap::with_max_entries(1024, 0);

#[map]
static OPENSSL_WRITE_ARGS: HashMap<u64, PendingCall> = HashMap::with_max_entries(1024, 0);

#[map]
static NSPR_READ_ARGS: HashMap<u64, PendingCall> = HashMap::with_max_entries(1024, 0);

#[map]
static NSPR_WRITE_ARGS: HashMap<u64, PendingCall> = HashMap::with_max_entries(1024, 0);

// =============================================================================
// Helper adaptors
// =============================================================================

struct CurrentTask;

impl TaskContext for CurrentTask {
    #[inline(always)]
    fn pid_tgid(&self) -> u64 {
        bpf_get_current_pid_tgid()
    }

    #[inline(always)]
    fn timestamp_ns(&self) -> u64 {
        unsafe { bpf_ktime_get_ns() }
    }

    #[inline(always)]
    fn comm(&self) -> [u8; COMM_LEN] {
        bpf_get_current_comm().unwrap_or([0u8; COMM_LEN])
    }
}

struct UserMemory;

impl ForeignMemory for UserMemory {
    #[inline(always)]
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadError> {
        if addr == 0 {
            return Err(ReadError::Null);
        }
        unsafe { bpf_probe_read_user_buf(addr as *const u8, dst) }.map_err(ReadError::Fault)
    }
}

struct ArgsMap(&'static HashMap<u64, PendingCall>);

impl ContextStore for ArgsMap {
    #[inline(always)]
    fn put(&self, key: u64, call: &PendingCall) -> Result<(), StoreError> {
        self.0.insert(&key, call, 0).map_err(|ret| match ret {
            ret if ret == -E2BIG => StoreError::Full,
            ret => StoreError::Rejected(ret),
        })
    }

    #[inline(always)]
    fn take(&self, key: u64) -> Option<PendingCall> {
        let call = unsafe { self.0.get(&key) }.copied();
        let _ = self.0.remove(&key);
        call
    }
}

struct PerCpuScratch;

impl ScratchPool for PerCpuScratch {
    #[inline(always)]
    fn acquire<R>(&self, f: impl FnOnce(&mut CaptureRecord) -> R) -> Option<R> {
        let slot = SCRATCH.get_ptr_mut(0)?;
        Some(f(unsafe { &mut *slot }))
    }
}

struct DataRing;

impl EventSink<CaptureRecord> for DataRing {
    #[inline(always)]
    fn emit(&self, record: &CaptureRecord) -> Result<(), EmitError> {
        DATA_EVENTS
            .output::<CaptureRecord>(record, 0)
            .map_err(EmitError::Dropped)
    }
}

struct ConnectRing;

impl EventSink<ConnectRecord> for ConnectRing {
    #[inline(always)]
    fn emit(&self, record: &ConnectRecord) -> Result<(), EmitError> {
        CONNECT_EVENTS
            .output::<ConnectRecord>(record, 0)
            .map_err(EmitError::Dropped)
    }
}

#[inline(always)]
fn capture() -> Capture<'static, CurrentTask, UserMemory, PerCpuScratch, DataRing> {
    Capture::new(
        &CurrentTask,
        &UserMemory,
        &PerCpuScratch,
        &DataRing,
        target_filter(),
    )
}

// =============================================================================
// OpenSSL: SSL_write / SSL_read
// =============================================================================

/// int SSL_write(SSL *ssl, const void *buf, int num);
#[uprobe]
pub fn openssl_write_entry(ctx: ProbeContext) -> u32 {
    match try_openssl_entry(&ctx, &OPENSSL_WRITE_ARGS, Direction::Write) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

#[uretprobe]
pub fn openssl_write_return(ctx: RetProbeContext) -> u32 {
    match try_return(&ctx, &OPENSSL_WRITE_ARGS, Library::OpenSsl, Direction::Write) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

/// int SSL_read(SSL *ssl, void *buf, int num);
#[uprobe]
pub fn openssl_read_entry(ctx: ProbeContext) -> u32 {
    match try_openssl_entry(&ctx, &OPENSSL_READ_ARGS, Direction::Read) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

#[uretprobe]
pub fn openssl_read_return(ctx: RetProbeContext) -> u32 {
    match try_return(&ctx, &OPENSSL_READ_ARGS, Library::OpenSsl, Direction::Read) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

#[inline(always)]
fn try_openssl_entry(
    ctx: &ProbeContext,
    args: &'static HashMap<u64, PendingCall>,
    direction: Direction,
) -> Result<(), Skip> {
    let ssl: u64 = ctx.arg(0).unwrap_or(0);
    let buf: u64 = ctx.arg(1).unwrap_or(0);
    capture().enter_openssl(&ArgsMap(args), &ssl_layout(), direction, ssl, buf)
}

// =============================================================================
// NSPR: PR_Write / PR_Read
// =============================================================================

/// PRInt32 PR_Write(PRFileDesc *fd, const void *buf, PRInt32 amount);
#[uprobe]
pub fn nspr_write_entry(ctx: ProbeContext) -> u32 {
    match try_nspr_entry(&ctx, &NSPR_WRITE_ARGS) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

#[uretprobe]
pub fn nspr_write_return(ctx: RetProbeContext) -> u32 {
    match try_return(&ctx, &NSPR_WRITE_ARGS, Library::Nspr, Direction::Write) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

/// PRInt32 PR_Read(PRFileDesc *fd, void *buf, PRInt32 amount);
#[uprobe]
pub fn nspr_read_entry(ctx: ProbeContext) -> u32 {
    match try_nspr_entry(&ctx, &NSPR_READ_ARGS) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

#[uretprobe]
pub fn nspr_read_return(ctx: RetProbeContext) -> u32 {
    match try_return(&ctx, &NSPR_READ_ARGS, Library::Nspr, Direction::Read) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

/// `PRFileDesc` is opaque, so the descriptor stays unknown.
#[inline(always)]
fn try_nspr_entry(ctx: &ProbeContext, args: &'static HashMap<u64, PendingCall>) -> Result<(), Skip> {
    let buf: u64 = ctx.arg(1).unwrap_or(0);
    capture().enter(&ArgsMap(args), buf, UNKNOWN_FD)
}

#[inline(always)]
fn try_return(
    ctx: &RetProbeContext,
    args: &'static HashMap<u64, PendingCall>,
    library: Library,
    direction: Direction,
) -> Result<(), Skip> {
    // Both libraries return a 32-bit int; the upper half of the register is
    // not sign-extended.
    let ret = ctx.ret::<i32>() as i64;
    capture().exit(&ArgsMap(args), library, direction, ret)
}

// =============================================================================
// libc: connect
// =============================================================================

/// int connect(int sockfd, const struct sockaddr *addr, socklen_t addrlen);
#[uprobe]
pub fn libc_connect(ctx: ProbeContext) -> u32 {
    match try_libc_connect(&ctx) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

#[inline(always)]
fn try_libc_connect(ctx: &ProbeContext) -> Result<(), Skip> {
    let fd: u64 = ctx.arg(0).unwrap_or(0);
    let sockaddr: u64 = ctx.arg(1).unwrap_or(0);
    ConnectObserver::new(&CurrentTask, &UserMemory, &ConnectRing, target_filter())
        .observe(fd as u32, sockaddr)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[unsafe(link_section = "license")]
#[unsafe(no_mangle)]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
