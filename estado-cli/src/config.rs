use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use estado_finance::{PipelineConfig, Provider, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ensure_estado_home;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub ocr: OcrSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub enabled: bool,
    pub provider: Provider,
    /// Provider default when unset
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: Provider::Anthropic,
            model: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

impl LlmSection {
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub template_threshold: f64,
    pub table_threshold: f64,
    pub document_timeout_secs: u64,
    pub ocr_language: String,
    pub render_dpi: u32,
    pub batch_size: usize,
    pub retry_attempts: u32,
    /// Budget for one language-model call, retries included
    pub llm_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            template_threshold: defaults.template_threshold,
            table_threshold: defaults.table_threshold,
            document_timeout_secs: defaults.document_timeout.as_secs(),
            ocr_language: defaults.ocr_language,
            render_dpi: defaults.render_dpi,
            batch_size: defaults.batch_size,
            retry_attempts: defaults.retry.attempts,
            llm_timeout_secs: defaults.retry.total_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub tesseract_command: String,
    pub pdftoppm_command: String,
    pub pdftotext_command: String,
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            tesseract_command: "tesseract".to_string(),
            pdftoppm_command: "pdftoppm".to_string(),
            pdftotext_command: "pdftotext".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        for (key, value) in [
            ("pipeline.template_threshold", p.template_threshold),
            ("pipeline.table_threshold", p.table_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    key,
                    message: format!("{value} is outside 0..=1"),
                });
            }
        }
        let positive = [
            ("pipeline.document_timeout_secs", p.document_timeout_secs == 0),
            ("pipeline.render_dpi", p.render_dpi == 0),
            ("pipeline.batch_size", p.batch_size == 0),
            ("pipeline.retry_attempts", p.retry_attempts == 0),
            ("pipeline.llm_timeout_secs", p.llm_timeout_secs == 0),
            ("llm.max_tokens", self.llm.max_tokens == 0),
        ];
        if let Some(&(key, _)) = positive.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::Invalid {
                key,
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn pipeline_config(&self, use_llm: bool) -> PipelineConfig {
        let p = &self.pipeline;
        PipelineConfig {
            template_threshold: p.template_threshold,
            table_threshold: p.table_threshold,
            document_timeout: Duration::from_secs(p.document_timeout_secs),
            ocr_language: p.ocr_language.clone(),
            render_dpi: p.render_dpi,
            batch_size: p.batch_size,
            retry: RetryPolicy {
                attempts: p.retry_attempts,
                total_timeout: Duration::from_secs(p.llm_timeout_secs),
                ..RetryPolicy::default()
            },
            use_llm: use_llm && self.llm.enabled,
            pdftotext_command: self.ocr.pdftotext_command.clone(),
        }
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(ensure_estado_home()?.join("config.toml"))
}

/// Defaults when the file does not exist.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config)?;
    fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_config() -> anyhow::Result<Config> {
    Ok(load_from(&config_path()?)?)
}

/// Write the defaults unless a config already exists. Returns the path and
/// whether it was written.
pub fn init_config() -> anyhow::Result<(PathBuf, bool)> {
    let path = config_path()?;
    if path.exists() {
        return Ok((path, false));
    }
    save_to(&path, &Config::default())?;
    Ok((path, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pipeline.batch_size, 40);
        assert_eq!(config.llm.model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[llm]\nprovider = \"openai\"\n\n[pipeline]\nbatch_size = 10\ndocument_timeout_secs = 30\n",
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.llm.provider, Provider::OpenAI);
        assert_eq!(config.llm.model_name(), "gpt-4o-mini");
        assert_eq!(config.pipeline.template_threshold, 0.6);

        let pipeline = config.pipeline_config(true);
        assert_eq!(pipeline.batch_size, 10);
        assert_eq!(pipeline.document_timeout, Duration::from_secs(30));
        assert!(!config.pipeline_config(false).use_llm);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.ocr.tesseract_command = "/opt/tesseract/bin/tesseract".to_string();
        save_to(&path, &config).unwrap();
        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "[pipeline]\ntemplate_threshold = 1.5\n").unwrap();
        assert!(matches!(
            load_from(&path),
            Err(ConfigError::Invalid { key: "pipeline.template_threshold", .. })
        ));

        fs::write(&path, "[pipeline]\nbatch_size = 0\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Invalid { .. })));

        fs::write(&path, "[llm]\nprovider = \"gemini\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }
}
