//! `vesta.toml` configuration.
//!
//! ```toml
//! workdir = "/var/lib/vesta"
//! namespace = "default"
//! log_level = "info"
//! network_timeout_secs = 5
//! hard_classes = ["linux", "x86_64"]
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vesta_core::DEFAULT_NAMESPACE;
use vesta_eval::collab::system::DEFAULT_NETWORK_TIMEOUT_SECS;
use vesta_eval::DEFAULT_WORKDIR;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "vesta.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VestaConfig {
    /// Root of `modules/` and other per-host state.
    pub workdir: PathBuf,
    /// Namespace calls are evaluated in.
    pub namespace: String,
    /// `EnvFilter` directive, e.g. `info` or `vesta_eval=debug`.
    pub log_level: Option<String>,
    /// Per-query limit for a network transport. The built-in offline
    /// network answers immediately, so it only records the value.
    pub network_timeout_secs: u64,
    /// Classes defined as hard before anything runs.
    pub hard_classes: Vec<String>,
}

impl Default for VestaConfig {
    fn default() -> Self {
        VestaConfig {
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_level: None,
            network_timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
            hard_classes: Vec::new(),
        }
    }
}

/// Read and parse a config file.
pub fn read_config(path: &Path) -> Result<VestaConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Config from an explicit path, else `./vesta.toml` if it exists, else
/// the defaults. An explicit path that cannot be read is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<VestaConfig, String> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.is_file() {
                read_config(local)
            } else {
                Ok(VestaConfig::default())
            }
        }
    }
}
