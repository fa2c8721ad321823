use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Startup configuration. Environment variables (`EASM_API_BASE_URL`,
/// `EASM_API_KEY`) override file values; runtime overrides stored via
/// `easmctl config` override both, per request.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub state_file: Option<PathBuf>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("easmctl.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
