mod config;
mod probes;
mod render;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aya::maps::{MapData, RingBuf};
use clap::Parser;
use log::{debug, info, warn};
use tlscap_common::{CaptureRecord, ConnectRecord};

use crate::config::{Cli, TlscapConfig};
use crate::render::{ConnectionTable, Summary, format_capture, format_connect};

fn take_ring(ebpf: &mut aya::Ebpf, name: &str) -> anyhow::Result<RingBuf<MapData>> {
    let map = ebpf
        .take_map(name)
        .ok_or_else(|| anyhow::anyhow!("map {name} not found in eBPF object"))?;
    Ok(RingBuf::try_from(map)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::init();

    let config = TlscapConfig::load(&cli)?;

    // Bump the memlock rlimit for older kernels
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }

    let libssl = config.libssl();
    let mut ebpf = probes::load(&config, &libssl)?;

    if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
        debug!("eBPF logger not initialized: {e}");
    }

    probes::attach_all(&mut ebpf, &config, &libssl)?;

    let mut data_ring = take_ring(&mut ebpf, "DATA_EVENTS")?;
    let mut connect_ring = take_ring(&mut ebpf, "CONNECT_EVENTS")?;

    match config.pid {
        Some(pid) => info!("Tracing pid {pid}; press Ctrl+C to stop"),
        None => info!("Tracing all processes; press Ctrl+C to stop"),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut summary = Summary::default();
    let mut connections = ConnectionTable::default();

    while running.load(Ordering::SeqCst) {
        // Connections first, so captures in the same batch can be joined.
        while let Some(item) = connect_ring.next() {
            match ConnectRecord::decode(&item) {
                Ok(record) => {
                    summary.connect += 1;
                    connections.record(&record);
                    println!("{}", format_connect(&record));
                }
                Err(e) => {
                    summary.malformed += 1;
                    warn!("CONNECT_EVENTS: {e}");
                }
            }
        }

        while let Some(item) = data_ring.next() {
            match CaptureRecord::decode(&item) {
                Ok(record) => {
                    summary.count_capture(&record);
                    println!("{}", format_capture(&record, connections.peer_of(&record)));
                }
                Err(e) => {
                    summary.malformed += 1;
                    warn!("DATA_EVENTS: {e}");
                }
            }
        }

        // Sleep briefly to avoid busy-waiting
        std::thread::sleep(Duration::from_millis(10));
    }

    println!();
    println!("{summary}");
    debug!("{} connections tracked", connections.len());

    Ok(())
}
