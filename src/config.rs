use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default history window for `chat` when `--max` is not given.
    pub max_history: Option<usize>,

    /// Prefilled model id when adding a profile.
    pub default_model: Option<String>,

    /// Prefilled endpoint base when adding a profile.
    pub default_endpoint: Option<String>,

    /// TCP connect timeout for API requests.
    pub connect_timeout_secs: Option<u64>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        if cfg.max_history == Some(0) {
            anyhow::bail!("max_history must be at least 1 ({})", path.display());
        }
        Ok(Some(cfg))
    }
}
