use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum combined size of the files in one upload request (in bytes)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// Bytes of each uploaded part kept in memory before spilling to disk
    #[serde(default = "default_upload_memory_limit")]
    pub upload_memory_limit: usize,

    /// Directory holding a theme to load from disk instead of the embedded one
    #[serde(default)]
    pub theme_path: Option<PathBuf>,
}

fn default_max_upload_size() -> u64 {
    4 * 1024 * 1024 * 1024 // 4 GiB
}

fn default_upload_memory_limit() -> usize {
    32 * 1024 * 1024 // 32 MiB
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            upload_memory_limit: default_upload_memory_limit(),
            theme_path: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Parse a byte count such as `1024`, `512MiB` or `4GB`.
///
/// Unit suffixes are case-insensitive and always binary, so `KB` and `KiB`
/// both mean 1024 bytes.
pub fn parse_byte_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {input:?}"))?;

    let shift = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        other => return Err(format!("unknown size unit: {other:?}")),
    };

    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size too large: {input:?}"))
}
