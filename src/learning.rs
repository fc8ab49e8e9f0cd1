//! Learning Feedback Loop
//!
//! Applies the learning effects a resolved turn produced:
//!
//! - Taught answers are stored and remembered as a pattern
//! - Ordinary turns are recorded into the pattern and association tables
//! - Every recorded turn feeds the predictor's rolling window, which
//!   retrains itself after every K new distinct samples
//!
//! Degenerate input (too short, or no keywords at all) is never recorded.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classifier::{Intent, Language};
use crate::error::StoreError;
use crate::knowledge::KnowledgeStore;
use crate::predictor::{IntentPredictor, TrainReport};
use crate::storage::{save_document, Collection, StorageBackend};
use crate::tokenizer::{extract_keywords, PatternKey, Utterance};

/// Context tag for patterns created by teaching
pub const TAUGHT_CONTEXT: &str = "user_taught";

/// Configuration for the feedback loop
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Inputs shorter than this (trimmed, in chars) are not recorded
    pub min_input_chars: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self { min_input_chars: 2 }
    }
}

/// One deferred write produced while planning a turn
#[derive(Debug, Clone, PartialEq)]
pub enum LearningEffect {
    /// Store a taught answer and remember the exchange as a pattern
    Teach { question: String, answer: String },
    /// Record the turn and feed it to the predictor
    Record {
        text: String,
        intent: Intent,
        context: String,
    },
    /// The predictor was consulted with a trained model
    PredictionMade,
}

/// What applying a turn's effects changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningOutcome {
    pub recorded: Option<PatternKey>,
    pub taught: bool,
    pub retrained: Option<TrainReport>,
    pub skipped_degenerate: bool,
}

/// Snapshot of everything learned so far
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningStats {
    pub interactions: u64,
    pub patterns: usize,
    pub phrasings: usize,
    pub associations: usize,
    pub taught_answers: usize,
    pub overrides: usize,
    pub active_overrides: usize,
    pub training_samples: usize,
    pub predictor_trained: bool,
    pub retrain_count: u64,
    pub predictions: u64,
    pub recent_accuracy: Option<f32>,
    pub degraded: bool,
}

impl LearningStats {
    pub fn collect(knowledge: &KnowledgeStore, predictor: &IntentPredictor) -> Self {
        let k = knowledge.stats();
        let p = predictor.stats();
        Self {
            interactions: k.interactions,
            patterns: k.patterns,
            phrasings: k.phrasings,
            associations: k.associations,
            taught_answers: k.taught_answers,
            overrides: k.overrides,
            active_overrides: k.active_overrides,
            training_samples: predictor.sample_count(),
            predictor_trained: predictor.is_trained(),
            retrain_count: p.retrain_count,
            predictions: p.predictions,
            recent_accuracy: p.recent_accuracy,
            degraded: k.degraded,
        }
    }

    /// Human-readable summary for the learning-stats intent
    pub fn summary(&self, language: Language) -> String {
        let accuracy = self
            .recent_accuracy
            .map(|a| format!("{:.0}%", a))
            .unwrap_or_else(|| "n/a".to_string());
        match language {
            Language::English => format!(
                "Sir, I've learned from {} interactions: {} patterns, {} word associations and {} taught answers. \
                 My intent model has {} samples, retrained {} times, recent accuracy {}.",
                self.interactions,
                self.patterns,
                self.associations,
                self.taught_answers,
                self.training_samples,
                self.retrain_count,
                accuracy
            ),
            Language::Hindi => format!(
                "Sir, maine {} baatcheet se seekha hai: {} patterns, {} word associations aur {} sikhaye gaye jawab. \
                 Model mein {} samples hain, {} baar retrain hua, accuracy {}.",
                self.interactions,
                self.patterns,
                self.associations,
                self.taught_answers,
                self.training_samples,
                self.retrain_count,
                accuracy
            ),
        }
    }
}

/// Whether an input is too thin to learn from
pub fn is_degenerate(text: &str, config: &LearningConfig) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() < config.min_input_chars || extract_keywords(trimmed).is_empty()
}

/// Applies learning effects and keeps the predictor persisted
pub struct FeedbackLoop {
    config: LearningConfig,
    backend: Arc<dyn StorageBackend>,
    degraded: bool,
}

impl FeedbackLoop {
    pub fn new(config: LearningConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            config,
            backend,
            degraded: false,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Whether a predictor write has failed
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Apply one turn's effects in order
    pub fn apply(
        &mut self,
        knowledge: &mut KnowledgeStore,
        predictor: &mut IntentPredictor,
        effects: &[LearningEffect],
    ) -> Result<LearningOutcome, StoreError> {
        let mut outcome = LearningOutcome::default();
        let mut predictor_dirty = false;

        for effect in effects {
            match effect {
                LearningEffect::Teach { question, answer } => {
                    knowledge.teach(question, answer)?;
                    let exchange = Utterance::new(&format!("{} {}", question, answer));
                    outcome.recorded = knowledge.record_interaction(&exchange, TAUGHT_CONTEXT)?;
                    outcome.taught = true;
                }
                LearningEffect::Record {
                    text,
                    intent,
                    context,
                } => {
                    if is_degenerate(text, &self.config) {
                        debug!("Skipping degenerate input: {:?}", text);
                        outcome.skipped_degenerate = true;
                        continue;
                    }
                    let utterance = Utterance::new(text.trim());
                    outcome.recorded = knowledge.record_interaction(&utterance, context)?;

                    outcome.retrained = predictor.observe(&utterance.text, *intent);
                    predictor_dirty = true;
                }
                LearningEffect::PredictionMade => {
                    predictor.note_prediction();
                    predictor_dirty = true;
                }
            }
        }

        if predictor_dirty {
            self.persist_predictor(predictor)?;
        }

        if let Some(report) = &outcome.retrained {
            info!(
                "Learning loop retrained predictor ({} samples)",
                report.samples
            );
        }
        Ok(outcome)
    }

    /// Write the predictor state through to the backend
    pub fn persist_predictor(&mut self, predictor: &IntentPredictor) -> Result<(), StoreError> {
        let body = predictor.render()?;
        match save_document(self.backend.as_ref(), Collection::Predictor, &body) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.degraded = true;
                Ok(())
            }
            Err(e) => {
                self.degraded = true;
                Err(e)
            }
        }
    }
}
