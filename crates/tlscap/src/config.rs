//! Configuration for the loader
//!
//! Values come from, lowest precedence first:
//! - built-in defaults
//! - a TOML file (`--config`, `TLSCAP_CONFIG`, or `/etc/tlscap/config.toml`)
//! - command-line flags and their environment variables

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use tlscap_common::{LibraryVersion, SslLayout};

const SYSTEM_CONFIG_PATH: &str = "/etc/tlscap/config.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Default, Parser)]
#[command(name = "tlscap", version, about = "Capture TLS plaintext at the library boundary")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "TLSCAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only trace this PID
    #[arg(short, long, env = "TLSCAP_PID")]
    pub pid: Option<u32>,

    /// Path to libssl.so (auto-detected if not specified)
    #[arg(long)]
    pub libssl: Option<String>,

    /// OpenSSL struct layout; guessed from the libssl file name if not specified
    #[arg(long, value_enum)]
    pub openssl_version: Option<OpenSslVersion>,

    /// Path to libnspr4.so (auto-detected if not specified)
    #[arg(long)]
    pub libnspr: Option<String>,

    /// Path to the libc that provides connect()
    #[arg(long)]
    pub libc: Option<String>,

    /// Do not attach to SSL_read/SSL_write
    #[arg(long)]
    pub no_openssl: bool,

    /// Do not attach to PR_Read/PR_Write
    #[arg(long)]
    pub no_nspr: bool,

    /// Do not record connect() calls
    #[arg(long)]
    pub no_connect: bool,

    /// Compiled eBPF object to load instead of the embedded one
    #[arg(long, env = "TLSCAP_OBJECT")]
    pub object: Option<PathBuf>,
}

/// OpenSSL release line, which fixes the `ssl_st` / `bio_st` offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
pub enum OpenSslVersion {
    #[value(name = "1.0.2")]
    #[serde(rename = "1.0.2")]
    V1_0_2,
    #[value(name = "1.1.1")]
    #[serde(rename = "1.1.1")]
    V1_1_1,
    #[value(name = "3.0")]
    #[serde(rename = "3.0")]
    V3_0,
}

impl OpenSslVersion {
    pub fn layout(self) -> SslLayout {
        match self {
            OpenSslVersion::V1_0_2 => LibraryVersion::OpenSsl1_0_2,
            OpenSslVersion::V1_1_1 => LibraryVersion::OpenSsl1_1_1,
            OpenSslVersion::V3_0 => LibraryVersion::OpenSsl3_0,
        }
        .layout()
    }

    /// Guess from a soname such as `libssl.so.3` or `libssl.so.1.0.2k`.
    pub fn from_library_path(path: &str) -> Option<Self> {
        let name = Path::new(path).file_name()?.to_str()?;
        let (_, version) = name.split_once(".so.")?;
        if version == "3" || version.starts_with("3.") {
            Some(OpenSslVersion::V3_0)
        } else if version.starts_with("1.1") {
            Some(OpenSslVersion::V1_1_1)
        } else if version.starts_with("1.0") {
            Some(OpenSslVersion::V1_0_2)
        } else {
            None
        }
    }
}

/// Complete loader configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlscapConfig {
    /// Only trace this PID (unset traces every process)
    pub pid: Option<u32>,

    /// Path to a compiled eBPF object
    pub object: Option<PathBuf>,

    pub openssl: OpenSslSettings,

    pub nspr: LibrarySettings,

    pub connect: LibrarySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenSslSettings {
    pub enabled: bool,

    /// Path to libssl.so
    pub library: Option<String>,

    /// Struct layout to use
    pub version: Option<OpenSslVersion>,
}

impl Default for OpenSslSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            library: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibrarySettings {
    pub enabled: bool,

    /// Path or name of the shared object to attach to
    pub library: Option<String>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            library: None,
        }
    }
}

impl TlscapConfig {
    /// Load the file named by `cli` (or the system file), then apply the flags.
    pub fn load(cli: &Cli) -> ConfigResult<Self> {
        let mut config = match find_config_file(cli.config.as_deref())? {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.pid.is_some() {
            self.pid = cli.pid;
        }
        if cli.object.is_some() {
            self.object = cli.object.clone();
        }
        if cli.libssl.is_some() {
            self.openssl.library = cli.libssl.clone();
        }
        if cli.openssl_version.is_some() {
            self.openssl.version = cli.openssl_version;
        }
        if cli.libnspr.is_some() {
            self.nspr.library = cli.libnspr.clone();
        }
        if cli.libc.is_some() {
            self.connect.library = cli.libc.clone();
        }
        self.openssl.enabled &= !cli.no_openssl;
        self.nspr.enabled &= !cli.no_nspr;
        self.connect.enabled &= !cli.no_connect;
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.pid == Some(0) {
            return Err(ConfigError::ValidationError(
                "pid 0 is not a process; omit it to trace every process".to_string(),
            ));
        }
        if !self.openssl.enabled && !self.nspr.enabled && !self.connect.enabled {
            return Err(ConfigError::ValidationError(
                "openssl, nspr and connect are all disabled".to_string(),
            ));
        }
        if let Some(object) = &self.object {
            if !object.exists() {
                return Err(ConfigError::NotFound(object.clone()));
            }
        }
        Ok(())
    }

    /// Value for the probes' PID filter; 0 admits every process.
    pub fn target_pid(&self) -> u32 {
        self.pid.unwrap_or(0)
    }

    pub fn libssl(&self) -> String {
        self.openssl
            .library
            .clone()
            .or_else(|| find_library(LIBSSL_PATHS))
            .unwrap_or_else(|| "libssl".to_string())
    }

    pub fn libnspr(&self) -> String {
        self.nspr
            .library
            .clone()
            .or_else(|| find_library(LIBNSPR_PATHS))
            .unwrap_or_else(|| "libnspr4".to_string())
    }

    pub fn libc(&self) -> String {
        self.connect
            .library
            .clone()
            .unwrap_or_else(|| "libc".to_string())
    }

    /// Explicit version, else a guess from the library name, else 1.1.1.
    pub fn ssl_layout(&self, libssl: &str) -> SslLayout {
        match self.openssl.version {
            Some(version) => version.layout(),
            None => match OpenSslVersion::from_library_path(libssl) {
                Some(version) => {
                    info!("Using OpenSSL {:?} layout for {}", version, libssl);
                    version.layout()
                }
                None => {
                    warn!(
                        "Cannot tell the OpenSSL version of {}; assuming 1.1.1 (set --openssl-version)",
                        libssl
                    );
                    SslLayout::default()
                }
            },
        }
    }
}

fn find_config_file(cli_path: Option<&Path>) -> ConfigResult<Option<PathBuf>> {
    if let Some(path) = cli_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let system = PathBuf::from(SYSTEM_CONFIG_PATH);
    Ok(system.exists().then_some(system))
}

const LIBSSL_PATHS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libssl.so.3",
    "/usr/lib/x86_64-linux-gnu/libssl.so.1.1",
    "/usr/lib/aarch64-linux-gnu/libssl.so.3",
    "/usr/lib/aarch64-linux-gnu/libssl.so.1.1",
    "/lib/x86_64-linux-gnu/libssl.so.3",
    "/lib/x86_64-linux-gnu/libssl.so.1.1",
    "/lib/aarch64-linux-gnu/libssl.so.3",
    "/lib/aarch64-linux-gnu/libssl.so.1.1",
    "/usr/lib64/libssl.so.3",
    "/usr/lib64/libssl.so.1.1",
    "/usr/lib64/libssl.so.10",
    "/usr/lib/libssl.so.3",
    "/usr/lib/libssl.so.1.1",
];

const LIBNSPR_PATHS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libnspr4.so",
    "/usr/lib/aarch64-linux-gnu/libnspr4.so",
    "/lib/x86_64-linux-gnu/libnspr4.so",
    "/usr/lib64/libnspr4.so",
    "/usr/lib/libnspr4.so",
];

/// First candidate that exists on this system.
fn find_library(candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|path| Path::new(path).exists())
        .map(|path| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TlscapConfig::default();
        assert_eq!(config.target_pid(), 0);
        assert!(config.openssl.enabled);
        assert!(config.nspr.enabled);
        assert!(config.connect.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
            pid = 4242

            [openssl]
            library = "/opt/ssl/lib/libssl.so.3"
            version = "3.0"

            [nspr]
            enabled = false

            [connect]
            library = "/lib/x86_64-linux-gnu/libc.so.6"
        "#;
        let config: TlscapConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pid, Some(4242));
        assert_eq!(config.libssl(), "/opt/ssl/lib/libssl.so.3");
        assert_eq!(config.openssl.version, Some(OpenSslVersion::V3_0));
        assert!(!config.nspr.enabled);
        assert_eq!(config.libc(), "/lib/x86_64-linux-gnu/libc.so.6");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = toml::from_str::<TlscapConfig>("[openssl]\nlibary = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("libary"));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        assert!(toml::from_str::<TlscapConfig>("[openssl]\nversion = \"0.9.8\"\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config: TlscapConfig = toml::from_str(
            r#"
            pid = 1
            [openssl]
            library = "/from/file/libssl.so.1.1"
            "#,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "tlscap",
            "--pid",
            "2",
            "--libssl",
            "/from/cli/libssl.so.3",
            "--no-connect",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.pid, Some(2));
        assert_eq!(config.libssl(), "/from/cli/libssl.so.3");
        assert!(config.openssl.enabled);
        assert!(!config.connect.enabled);
    }

    #[test]
    fn test_cli_cannot_reenable_a_family() {
        let mut config: TlscapConfig = toml::from_str("[nspr]\nenabled = false\n").unwrap();
        config.apply_cli(&Cli::default());
        assert!(!config.nspr.enabled);
    }

    #[test]
    fn test_validation_rejects_pid_zero() {
        let config = TlscapConfig {
            pid: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_nothing_enabled() {
        let mut config = TlscapConfig::default();
        config.apply_cli(&Cli::parse_from([
            "tlscap",
            "--no-openssl",
            "--no-nspr",
            "--no-connect",
        ]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_missing_object() {
        let config = TlscapConfig {
            object: Some(PathBuf::from("/nonexistent/tlscap.o")),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/tlscap.toml")),
            ..Default::default()
        };
        assert!(matches!(
            TlscapConfig::load(&cli),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_version_from_library_path() {
        let cases = [
            ("/usr/lib/x86_64-linux-gnu/libssl.so.3", Some(OpenSslVersion::V3_0)),
            ("/usr/lib/libssl.so.1.1", Some(OpenSslVersion::V1_1_1)),
            ("/usr/lib64/libssl.so.1.0.2k", Some(OpenSslVersion::V1_0_2)),
            ("/usr/lib64/libssl.so.10", None),
            ("libssl", None),
        ];
        for (path, expected) in cases {
            assert_eq!(OpenSslVersion::from_library_path(path), expected, "{path}");
        }
    }

    #[test]
    fn test_layout_selection() {
        let mut config = TlscapConfig::default();
        assert_eq!(
            config.ssl_layout("/usr/lib/libssl.so.3"),
            SslLayout::OPENSSL_3_0
        );
        assert_eq!(config.ssl_layout("libssl"), SslLayout::OPENSSL_1_1_1);

        config.openssl.version = Some(OpenSslVersion::V1_0_2);
        assert_eq!(
            config.ssl_layout("/usr/lib/libssl.so.3"),
            SslLayout::OPENSSL_1_0_2
        );
    }
}
