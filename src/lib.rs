//! JARVIS Core
//!
//! Intent resolution and adaptive learning engine for a personal assistant.
//!
//! # Features
//!
//! - **Classification**: rule-based intent, emotion and language per utterance
//! - **Resolution Pipeline**: eight ordered resolvers, first match wins
//! - **Knowledge Store**: patterns, word associations, taught answers, overrides
//! - **Intent Predictor**: bag-of-words softmax model retrained on a rolling window
//! - **Write-through Persistence**: JSON files, SQLite, or memory
//!
//! # Architecture
//!
//! ```text
//! front end ──► Engine::resolve ──► Classifier
//!                    │                  │
//!                    │              Pipeline ──► override / taught / predictor
//!                    │                  │         pattern / similar / fallback
//!                    │                  ▼
//!                    └──────────► FeedbackLoop ──► KnowledgeStore ──► StorageBackend
//!                                       └────────► IntentPredictor
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod learning;
pub mod pipeline;
pub mod predictor;
pub mod responders;
pub mod session;
pub mod storage;
pub mod templates;
pub mod tokenizer;

pub use classifier::{Classification, Emotion, Intent, Language, UtteranceClassifier};
pub use config::{EngineConfig, StorageKind};
pub use engine::{Engine, ResolveOptions, Resolution};
pub use error::{EngineError, StoreError};
pub use knowledge::{
    CustomOverride, KnowledgeStore, PatternOccurrence, PatternSummary, TaughtMatchKind,
};
pub use learning::{FeedbackLoop, LearningConfig, LearningEffect, LearningOutcome, LearningStats};
pub use pipeline::{pattern_key_for, Pipeline, PipelineSettings, Stage, TurnPlan};
pub use predictor::{IntentPredictor, Prediction, PredictorConfig, PredictorState};
pub use session::SessionContext;
pub use storage::{
    Collection, JsonDirBackend, MemoryBackend, SqliteBackend, StorageBackend, WriteFailure,
};
pub use tokenizer::{extract_keywords, PatternKey, Utterance};
