//! Compiles `tlscap-ebpf` for the BPF target and places the object in
//! `OUT_DIR` for `include_bytes_aligned!`.
//!
//! The build is skipped, and the binary then needs `--object`, when
//! `TLSCAP_SKIP_EBPF_BUILD` is set or `bpf-linker` is not on `PATH`.

use anyhow::{Context as _, anyhow};
use aya_build::Toolchain;

fn main() -> anyhow::Result<()> {
    println!("cargo::rustc-check-cfg=cfg(embedded_ebpf)");
    println!("cargo:rerun-if-env-changed=TLSCAP_SKIP_EBPF_BUILD");

    if std::env::var_os("TLSCAP_SKIP_EBPF_BUILD").is_some() {
        println!("cargo:warning=TLSCAP_SKIP_EBPF_BUILD set; tlscap will need --object at runtime");
        return Ok(());
    }
    if let Err(e) = which::which("bpf-linker") {
        println!(
            "cargo:warning=bpf-linker not found ({e}); tlscap will need --object at runtime. \
             Install it with: cargo install bpf-linker"
        );
        return Ok(());
    }

    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .no_deps()
        .exec()
        .context("MetadataCommand::exec")?;
    let ebpf_package = packages
        .into_iter()
        .find(|cargo_metadata::Package { name, .. }| name.as_str() == "tlscap-ebpf")
        .ok_or_else(|| anyhow!("tlscap-ebpf package not found"))?;
    let cargo_metadata::Package {
        name,
        manifest_path,
        ..
    } = ebpf_package;
    let root_dir = manifest_path
        .parent()
        .ok_or_else(|| anyhow!("no parent for {manifest_path}"))?;
    let ebpf_package = aya_build::Package {
        name: name.as_str(),
        root_dir: root_dir.as_str(),
        ..Default::default()
    };
    aya_build::build_ebpf([ebpf_package], Toolchain::default())?;

    println!("cargo:rustc-cfg=embedded_ebpf");
    Ok(())
}
