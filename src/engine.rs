//! Session Boundary
//!
//! [`Engine`] is the one entry point front ends talk to. It owns the
//! knowledge store, predictor and feedback loop behind a single async mutex,
//! so turns from the user and from background nudges are resolved one at a
//! time.
//!
//! A turn is planned without touching learned state and committed only if
//! it was neither cancelled nor past its deadline, making learning
//! all-or-nothing per turn.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{Emotion, Intent, UtteranceClassifier};
use crate::config::{EngineConfig, StorageKind};
use crate::error::{EngineError, Result, StoreError};
use crate::knowledge::{KnowledgeStore, PatternSummary};
use crate::learning::{FeedbackLoop, LearningOutcome, LearningStats};
use crate::pipeline::{Pipeline, PipelineSettings, Stage};
use crate::predictor::{IntentPredictor, Prediction, PredictorState};
use crate::session::SessionContext;
use crate::storage::{
    load_document, Collection, JsonDirBackend, MemoryBackend, SqliteBackend, StorageBackend,
};
use crate::tokenizer::{extract_keywords, PatternKey};

/// Per-call controls for [`Engine::resolve_with`]
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub cancel: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl ResolveOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            timeout: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: None,
            timeout: Some(timeout),
        }
    }
}

/// Outcome of one resolved turn
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub response: String,
    pub source_tag: &'static str,
    #[serde(skip)]
    pub stage: Stage,
    /// Intent the front end may act on (open an app, run a search, ...)
    pub intent: Intent,
    pub emotion: Emotion,
    pub session: SessionContext,
    #[serde(skip)]
    pub learning: LearningOutcome,
}

struct Inner {
    classifier: UtteranceClassifier,
    knowledge: KnowledgeStore,
    predictor: IntentPredictor,
    feedback: FeedbackLoop,
    settings: PipelineSettings,
}

impl Inner {
    /// Apply a mutation as a unit: if the store turns out to be unreachable,
    /// learned state is restored to what it was before.
    fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut Inner) -> Result<T, StoreError>,
    ) -> Result<T> {
        let knowledge = self.knowledge.clone();
        let predictor = self.predictor.clone();
        mutate(&mut *self).map_err(|e| {
            warn!("Storage unavailable, discarding in-memory changes: {}", e);
            self.knowledge = knowledge;
            self.predictor = predictor;
            storage_unavailable(e)
        })
    }
}

/// Shared, cloneable handle to the resolution engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Mutex<Inner>>,
    backend_name: &'static str,
}

impl Engine {
    /// Open the configured backend and load everything learned so far
    pub fn open(config: &EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let backend: Arc<dyn StorageBackend> = match config.storage {
            StorageKind::Json => Arc::new(JsonDirBackend::open(&config.data_dir)?),
            StorageKind::Sqlite => Arc::new(SqliteBackend::open(&config.sqlite_path())?),
            StorageKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Self::with_backend(config, backend)
    }

    /// Build on an explicit backend
    pub fn with_backend(config: &EngineConfig, backend: Arc<dyn StorageBackend>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let backend_name = backend.name();
        let knowledge = KnowledgeStore::open(backend.clone())?;
        let state: PredictorState = load_document(backend.as_ref(), Collection::Predictor)?;
        let predictor = IntentPredictor::from_state(config.predictor(), state);
        let settings = config.pipeline();
        let feedback = FeedbackLoop::new(settings.learning.clone(), backend);

        info!(
            "Engine ready ({} storage, {} training samples, predictor {})",
            backend_name,
            predictor.sample_count(),
            if predictor.is_trained() { "trained" } else { "untrained" }
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                classifier: UtteranceClassifier::new(),
                knowledge,
                predictor,
                feedback,
                settings,
            })),
            backend_name,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Resolve one utterance. Never fails for any text; only an unreachable
    /// store is an error.
    pub async fn resolve(&self, utterance: &str, context: &SessionContext) -> Result<Resolution> {
        self.resolve_with(utterance, context, ResolveOptions::default())
            .await
    }

    /// Resolve with caller cancellation and/or a deadline
    pub async fn resolve_with(
        &self,
        utterance: &str,
        context: &SessionContext,
        options: ResolveOptions,
    ) -> Result<Resolution> {
        let cancel = options.cancel.unwrap_or_default();
        let deadline = options.timeout.map(|t| (Instant::now() + t, t));

        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Resolution cancelled while waiting for the engine");
                return Err(EngineError::Cancelled);
            }
            _ = wait_until(deadline.map(|(at, _)| at)) => {
                let limit = deadline.map(|(_, t)| t).unwrap_or_default();
                return Err(EngineError::TimedOut(limit));
            }
            guard = self.inner.lock() => guard,
        };

        let inner = &mut *guard;
        let plan = Pipeline::new(
            &inner.classifier,
            &inner.knowledge,
            &inner.predictor,
            &inner.settings,
        )
        .plan(utterance, context);

        // Last chance to abandon the turn before anything is written
        if cancel.is_cancelled() {
            warn!("Resolution cancelled before commit, nothing learned");
            return Err(EngineError::Cancelled);
        }
        if let Some((at, limit)) = deadline {
            if Instant::now() >= at {
                warn!("Resolution exceeded {:?} before commit, nothing learned", limit);
                return Err(EngineError::TimedOut(limit));
            }
        }

        let learning = inner.commit(|inner| {
            inner
                .feedback
                .apply(&mut inner.knowledge, &mut inner.predictor, &plan.effects)
        })?;

        debug!(
            "Turn resolved via {} (intent {}, emotion {})",
            plan.stage,
            plan.intent.as_str(),
            plan.classification.emotion.as_str()
        );

        Ok(Resolution {
            response: plan.response,
            source_tag: plan.stage.tag(),
            stage: plan.stage,
            intent: plan.intent,
            emotion: plan.classification.emotion,
            session: plan.session,
            learning,
        })
    }

    /// Predictor output for a text, without learning anything
    pub async fn predict(&self, text: &str) -> Prediction {
        self.inner.lock().await.predictor.predict(text)
    }

    /// Bind an operator reply to a phrase (or a raw pattern key)
    pub async fn set_override(&self, phrase: &str, answer: &str) -> Result<PatternKey> {
        let key = operator_key(phrase)?;
        let mut inner = self.inner.lock().await;
        inner.commit(|inner| inner.knowledge.set_override(&key, answer))?;
        Ok(key)
    }

    pub async fn deactivate_override(&self, phrase: &str) -> Result<bool> {
        let key = operator_key(phrase)?;
        let mut inner = self.inner.lock().await;
        inner.commit(|inner| inner.knowledge.deactivate_override(&key))
    }

    pub async fn delete_override(&self, phrase: &str) -> Result<bool> {
        let key = operator_key(phrase)?;
        let mut inner = self.inner.lock().await;
        inner.commit(|inner| inner.knowledge.delete_override(&key))
    }

    pub async fn list_patterns(&self) -> Vec<PatternSummary> {
        self.inner.lock().await.knowledge.list_patterns()
    }

    pub async fn stats(&self) -> LearningStats {
        let inner = self.inner.lock().await;
        let mut stats = LearningStats::collect(&inner.knowledge, &inner.predictor);
        stats.degraded |= inner.feedback.is_degraded();
        stats
    }

    /// Serialized form of a collection exactly as it would be saved
    pub async fn render_collection(&self, collection: Collection) -> Result<String> {
        let inner = self.inner.lock().await;
        let body = match collection {
            Collection::Predictor => inner.predictor.render().map_err(StoreError::from),
            other => inner
                .knowledge
                .render(other)
                .map(Option::unwrap_or_default),
        };
        body.map_err(EngineError::from)
    }

    /// Rewrite every collection, e.g. before shutdown
    pub async fn flush(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.knowledge.flush().map_err(storage_unavailable)?;
        inner
            .feedback
            .persist_predictor(&inner.predictor)
            .map_err(storage_unavailable)?;
        info!("Knowledge flushed to {} storage", self.backend_name);
        Ok(())
    }
}

/// Accept either a raw key (`name_what_your`) or a phrase to derive it from
fn operator_key(phrase: &str) -> Result<PatternKey> {
    let trimmed = phrase.trim().to_lowercase();
    let raw_key =
        !trimmed.is_empty() && !trimmed.contains(char::is_whitespace) && trimmed.contains('_');
    let key = if raw_key {
        PatternKey::new(trimmed)
    } else {
        PatternKey::from_keywords(&extract_keywords(&trimmed))
    };
    if key.is_empty() {
        return Err(EngineError::Config(format!(
            "'{}' has no keywords to bind an override to",
            phrase
        )));
    }
    Ok(key)
}

fn storage_unavailable(e: StoreError) -> EngineError {
    EngineError::StorageUnavailable(e.to_string())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::open(&EngineConfig::ephemeral()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_identity() {
        let engine = engine();
        let r = engine
            .resolve("what is your name", &SessionContext::new())
            .await
            .unwrap();
        assert_eq!(r.source_tag, "identity");
    }

    #[tokio::test]
    async fn test_cancelled_turn_learns_nothing() {
        let engine = engine();
        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .resolve_with(
                "tell me about distributed systems",
                &SessionContext::new(),
                ResolveOptions::with_cancel(token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(engine.stats().await.interactions, 0);
    }

    #[tokio::test]
    async fn test_zero_timeout_times_out() {
        let engine = engine();
        let err = engine
            .resolve_with(
                "tell me about distributed systems",
                &SessionContext::new(),
                ResolveOptions::with_timeout(Duration::ZERO),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TimedOut(_)));
        assert_eq!(engine.stats().await.training_samples, 0);
    }

    #[tokio::test]
    async fn test_operator_key_forms() {
        assert_eq!(operator_key("name_what_your").unwrap().as_str(), "name_what_your");
        assert_eq!(operator_key("What is your name").unwrap().as_str(), "name_what_your");
        assert!(operator_key("is it").is_err());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let engine = engine();
        let other = engine.clone();
        other
            .resolve("open chrome browser", &SessionContext::new())
            .await
            .unwrap();
        assert_eq!(engine.stats().await.interactions, 1);
    }
}
