use crate::utils::error::{EtlError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Optional settings file. Every key is optional; environment variables win
/// over values given here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub project_id: Option<String>,
    pub gcs_bucket: Option<String>,
    pub gdrive_folder_id: Option<String>,
    pub secret_name: Option<String>,
    pub dataset: Option<String>,
    pub location: Option<String>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub chain_mode: Option<String>,
    pub max_parallel_tables: Option<usize>,
    pub schedule: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub load_poll_interval_ms: Option<u64>,
}

impl FileConfig {
    /// Reads and parses a TOML settings file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content, |name| std::env::var(name).ok());

        toml::from_str(&processed).map_err(|e| EtlError::Configuration {
            message: format!("TOML parsing error: {}", e),
        })
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Replaces `${VAR}` with the variable's value; unknown variables are left as-is.
pub fn substitute_env_vars(content: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
        })
        .into_owned()
}
