//! Loading the eBPF object and attaching its programs.

use anyhow::{Context as _, anyhow, bail};
use aya::programs::UProbe;
use aya::{Ebpf, EbpfLoader};
use log::{debug, info, warn};

use crate::config::TlscapConfig;

/// A program in the object and the symbol it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSpec {
    pub program: &'static str,
    pub symbol: &'static str,
}

const fn probe(program: &'static str, symbol: &'static str) -> ProbeSpec {
    ProbeSpec { program, symbol }
}

pub const OPENSSL_PROBES: &[ProbeSpec] = &[
    probe("openssl_write_entry", "SSL_write"),
    probe("openssl_write_return", "SSL_write"),
    probe("openssl_read_entry", "SSL_read"),
    probe("openssl_read_return", "SSL_read"),
];

pub const NSPR_PROBES: &[ProbeSpec] = &[
    probe("nspr_write_entry", "PR_Write"),
    probe("nspr_write_return", "PR_Write"),
    probe("nspr_read_entry", "PR_Read"),
    probe("nspr_read_return", "PR_Read"),
];

pub const CONNECT_PROBES: &[ProbeSpec] = &[probe("libc_connect", "connect")];

#[cfg(embedded_ebpf)]
fn embedded_object() -> Option<&'static [u8]> {
    Some(aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/tlscap")))
}

#[cfg(not(embedded_ebpf))]
fn embedded_object() -> Option<&'static [u8]> {
    None
}

/// Load the object with the PID filter and OpenSSL layout baked in.
pub fn load(config: &TlscapConfig, libssl: &str) -> anyhow::Result<Ebpf> {
    let target_pid = config.target_pid();
    let layout = config.ssl_layout(libssl);
    debug!("TARGET_PID={target_pid} SSL_LAYOUT={layout:?}");

    let mut loader = EbpfLoader::new();
    loader
        .set_global("TARGET_PID", &target_pid, true)
        .set_global("SSL_LAYOUT", &layout, true);

    match (&config.object, embedded_object()) {
        (Some(path), _) => {
            info!("Loading eBPF object from {}", path.display());
            loader
                .load_file(path)
                .with_context(|| format!("loading {}", path.display()))
        }
        (None, Some(bytes)) => loader.load(bytes).context("loading embedded eBPF object"),
        (None, None) => bail!(
            "this build has no embedded eBPF object (bpf-linker was unavailable); pass --object"
        ),
    }
}

/// Attach every probe in `probes` to `target`. Stops at the first failure.
pub fn attach(
    ebpf: &mut Ebpf,
    probes: &[ProbeSpec],
    target: &str,
    pid: Option<u32>,
) -> anyhow::Result<()> {
    for spec in probes {
        let program: &mut UProbe = ebpf
            .program_mut(spec.program)
            .ok_or_else(|| anyhow!("program {} not found in eBPF object", spec.program))?
            .try_into()?;
        program.load()?;
        program
            .attach(spec.symbol, target, pid, None)
            .with_context(|| format!("attaching {} to {}:{}", spec.program, target, spec.symbol))?;
        debug!("Attached {} to {}:{}", spec.program, target, spec.symbol);
    }
    Ok(())
}

/// Attach each enabled library family. A family whose library is missing is
/// skipped with a warning; at least one must attach.
pub fn attach_all(ebpf: &mut Ebpf, config: &TlscapConfig, libssl: &str) -> anyhow::Result<()> {
    let pid = config.pid;
    let mut families = Vec::new();
    if config.openssl.enabled {
        families.push(("openssl", OPENSSL_PROBES, libssl.to_string()));
    }
    if config.nspr.enabled {
        families.push(("nspr", NSPR_PROBES, config.libnspr()));
    }
    if config.connect.enabled {
        families.push(("connect", CONNECT_PROBES, config.libc()));
    }

    let mut attached = 0;
    for (family, probes, target) in families {
        match attach(ebpf, probes, &target, pid) {
            Ok(()) => {
                info!("Attached {family} probes to {target}");
                attached += 1;
            }
            Err(e) => warn!("Skipping {family} probes: {e:#}"),
        }
    }
    if attached == 0 {
        bail!("no probes could be attached");
    }
    Ok(())
}
