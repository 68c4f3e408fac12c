use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::SampleCatalog;
use crate::error::LaunchError;

pub const DEFAULT_CONFIG_FILE: &str = "mc-launch.json";
pub const DEFAULT_MERGE_REPO: &str = "/software/markus/alice/SubstructureAnalysis";
pub const DEFAULT_DOWNLOAD_SCRIPT: &str = "runDownloadAndMergeMCBatch.sh";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub samples: Option<SampleCatalog>,
    #[serde(default)]
    pub merge_repo: Option<Utf8PathBuf>,
    #[serde(default)]
    pub download_script: Option<String>,
    #[serde(default)]
    pub token_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub token_tmp_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub tools: ToolsEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsEntry {
    #[serde(default)]
    pub sbatch: Option<String>,
    #[serde(default)]
    pub alien_ls: Option<String>,
    #[serde(default)]
    pub token_info: Option<String>,
    #[serde(default)]
    pub token_init: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub sbatch: String,
    pub alien_ls: String,
    pub token_info: String,
    pub token_init: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            alien_ls: "alien_ls".to_string(),
            token_info: "alien-token-info".to_string(),
            token_init: "alien-token-init".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub samples: SampleCatalog,
    pub merge_repo: Utf8PathBuf,
    pub download_script: String,
    /// `None` means the per-user default under `/software`.
    pub token_dir: Option<Utf8PathBuf>,
    pub token_tmp_dir: Utf8PathBuf,
    pub tools: Tools,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LaunchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LaunchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LaunchError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = Tools::default();
        let tools = Tools {
            sbatch: config.tools.sbatch.unwrap_or(defaults.sbatch),
            alien_ls: config.tools.alien_ls.unwrap_or(defaults.alien_ls),
            token_info: config.tools.token_info.unwrap_or(defaults.token_info),
            token_init: config.tools.token_init.unwrap_or(defaults.token_init),
        };

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            samples: config.samples.unwrap_or_else(SampleCatalog::builtin),
            merge_repo: config
                .merge_repo
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_MERGE_REPO)),
            download_script: config
                .download_script
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_SCRIPT.to_string()),
            token_dir: config.token_dir,
            token_tmp_dir: config
                .token_tmp_dir
                .unwrap_or_else(|| Utf8PathBuf::from("/tmp")),
            tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default());
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.samples, SampleCatalog::builtin());
        assert_eq!(resolved.tools, Tools::default());
        assert_eq!(resolved.merge_repo, DEFAULT_MERGE_REPO);
        assert!(resolved.token_dir.is_none());
    }
}
