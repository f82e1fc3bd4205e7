//! One-line text rendering of decoded records, and the counters printed on exit.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddrV4;

use tlscap_common::{CaptureRecord, ConnectRecord, Direction, Library};

/// Destination of each socket seen in `connect`, keyed by (pid, fd).
#[derive(Debug, Default)]
pub struct ConnectionTable {
    peers: HashMap<(u32, u32), SocketAddrV4>,
}

impl ConnectionTable {
    pub fn record(&mut self, record: &ConnectRecord) {
        self.peers
            .insert((record.pid, record.fd), record.destination());
    }

    pub fn peer_of(&self, record: &CaptureRecord) -> Option<SocketAddrV4> {
        let fd = record.descriptor()?;
        self.peers.get(&(record.pid, fd)).copied()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

fn tag(record: &CaptureRecord) -> String {
    let library = match record.library() {
        Some(Library::OpenSsl) => "SSL",
        Some(Library::Nspr) => "PR",
        None => "UNKNOWN",
    };
    let direction = match record.direction() {
        Some(direction) => direction.to_string(),
        None => "?".to_string(),
    };
    format!("{library}_{direction}")
}

pub fn format_capture(record: &CaptureRecord, peer: Option<SocketAddrV4>) -> String {
    let fd = record
        .descriptor()
        .map_or_else(|| "?".to_string(), |fd| fd.to_string());
    let mut line = format!(
        "[{}] pid={} tid={} comm={} fd={}",
        tag(record),
        record.pid,
        record.tid,
        record.process_name(),
        fd,
    );
    if let Some(peer) = peer {
        line.push_str(&format!(" peer={peer}"));
    }
    line.push_str(&format!(
        " len={} {}",
        record.data_len,
        format_data_preview(record.payload())
    ));
    line
}

pub fn format_connect(record: &ConnectRecord) -> String {
    format!(
        "[CONNECT] pid={} tid={} comm={} fd={} dst={}",
        record.pid,
        record.tid,
        record.process_name(),
        record.fd,
        record.destination(),
    )
}

/// Quoted text when the payload looks printable, a short hex dump otherwise.
pub fn format_data_preview(data: &[u8]) -> String {
    if data.is_empty() {
        return String::from("(no data)");
    }

    let data_slice = &data[..data.len().min(200)];
    let printable_count = data_slice
        .iter()
        .filter(|&&b| (0x20..0x7f).contains(&b) || b == b'\n' || b == b'\r')
        .count();

    if printable_count > data_slice.len() * 8 / 10 {
        let s = String::from_utf8_lossy(data_slice);
        let preview: String = s
            .chars()
            .take(100)
            .map(|c| match c {
                '\n' | '\r' => ' ',
                c => c,
            })
            .collect();
        format!("\"{}{}\"", preview, if data.len() > 100 { "..." } else { "" })
    } else {
        let hex: String = data_slice
            .iter()
            .take(32)
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        format!("[{}{}]", hex, if data.len() > 32 { " ..." } else { "" })
    }
}

/// Record counts for the exit summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub openssl_read: u64,
    pub openssl_write: u64,
    pub nspr_read: u64,
    pub nspr_write: u64,
    pub connect: u64,
    pub malformed: u64,
}

impl Summary {
    pub fn count_capture(&mut self, record: &CaptureRecord) {
        match (record.library(), record.direction()) {
            (Some(Library::OpenSsl), Some(Direction::Read)) => self.openssl_read += 1,
            (Some(Library::OpenSsl), Some(Direction::Write)) => self.openssl_write += 1,
            (Some(Library::Nspr), Some(Direction::Read)) => self.nspr_read += 1,
            (Some(Library::Nspr), Some(Direction::Write)) => self.nspr_write += 1,
            _ => self.malformed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.openssl_read + self.openssl_write + self.nspr_read + self.nspr_write + self.connect
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===========================================")?;
        writeln!(f, "  Summary")?;
        writeln!(f, "===========================================")?;
        writeln!(f, "  SSL_read records:   {}", self.openssl_read)?;
        writeln!(f, "  SSL_write records:  {}", self.openssl_write)?;
        writeln!(f, "  PR_Read records:    {}", self.nspr_read)?;
        writeln!(f, "  PR_Write records:   {}", self.nspr_write)?;
        writeln!(f, "  connect records:    {}", self.connect)?;
        if self.malformed > 0 {
            writeln!(f, "  malformed records:  {}", self.malformed)?;
        }
        writeln!(f, "  Total records:      {}", self.total())?;
        write!(f, "===========================================")
    }
}
