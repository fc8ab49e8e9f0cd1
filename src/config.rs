//! Configuration management

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::learning::LearningConfig;
use crate::pipeline::PipelineSettings;
use crate::predictor::PredictorConfig;

/// Where learned knowledge is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// One JSON document per collection in the data directory
    Json,
    /// `jarvis.db` in the data directory
    Sqlite,
    /// Nothing survives the process
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(StorageKind::Json),
            "sqlite" | "sql" | "db" => Ok(StorageKind::Sqlite),
            "memory" | "mem" | "none" => Ok(StorageKind::Memory),
            other => bail!("unknown storage kind '{}' (expected json, sqlite or memory)", other),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the persisted collections
    pub data_dir: PathBuf,

    pub storage: StorageKind,

    /// Retrain the predictor after this many new distinct samples
    pub retrain_every: usize,

    /// Predictor confidence (percent) needed to replace the rule-based intent
    pub accept_confidence: f32,

    /// Below this many samples the predictor reports zero confidence
    pub min_training_samples: usize,

    /// Rolling training window size
    pub training_window: usize,

    /// Predictor vocabulary cap, including the unknown-token slot
    pub vocab_cap: usize,

    /// How the user is addressed
    pub user_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageKind::Json,
            retrain_every: 10,
            accept_confidence: 70.0,
            min_training_samples: 5,
            training_window: 100,
            vocab_cap: 1000,
            user_name: "Sir".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let data_dir = std::env::var("JARVIS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let storage = match std::env::var("JARVIS_STORAGE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.storage,
        };

        let config = Self {
            data_dir,
            storage,
            retrain_every: env_parse("JARVIS_RETRAIN_EVERY", defaults.retrain_every),
            accept_confidence: env_parse("JARVIS_ACCEPT_CONFIDENCE", defaults.accept_confidence),
            min_training_samples: env_parse(
                "JARVIS_MIN_TRAINING_SAMPLES",
                defaults.min_training_samples,
            ),
            training_window: env_parse("JARVIS_TRAINING_WINDOW", defaults.training_window),
            vocab_cap: env_parse("JARVIS_VOCAB_CAP", defaults.vocab_cap),
            user_name: std::env::var("JARVIS_USER_NAME").unwrap_or(defaults.user_name),
        };
        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration (tests, throwaway sessions)
    pub fn ephemeral() -> Self {
        Self {
            storage: StorageKind::Memory,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrain_every == 0 {
            bail!("retrain interval must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.accept_confidence) {
            bail!("acceptance confidence must be a percentage, got {}", self.accept_confidence);
        }
        if self.training_window < self.min_training_samples {
            bail!(
                "training window ({}) is smaller than the minimum sample count ({})",
                self.training_window,
                self.min_training_samples
            );
        }
        if self.vocab_cap < 2 {
            bail!("vocabulary cap must leave room for at least one word");
        }
        Ok(())
    }

    pub fn predictor(&self) -> PredictorConfig {
        PredictorConfig {
            retrain_every: self.retrain_every,
            min_samples: self.min_training_samples,
            window: self.training_window,
            vocab_cap: self.vocab_cap,
            ..PredictorConfig::default()
        }
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            accept_confidence: self.accept_confidence,
            honorific: self.user_name.clone(),
            learning: LearningConfig::default(),
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("jarvis.db")
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jarvis")
}
