//! Knowledge Store
//!
//! The single source of truth for what has been learned:
//! - Pattern table: utterances grouped by pattern key, with frequency
//! - Word associations: which word follows which
//! - Taught answers: question/answer pairs supplied by the user
//! - Custom overrides: operator-authored replies that beat everything else
//!
//! Every mutation is written through to the storage backend before it
//! returns. Write failures are logged and the store keeps going in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::storage::{load_document, save_document, Collection, StorageBackend};
use crate::tokenizer::{extract_keywords, normalize_question, tokens, PatternKey, Utterance};

/// Minimum keyword overlap ratio for a fuzzy taught-answer match
const FUZZY_MIN_RATIO: f32 = 0.7;

/// Minimum shared keywords for fuzzy and similarity matches
pub const MIN_SHARED_KEYWORDS: usize = 2;

/// One remembered phrasing under a pattern key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternOccurrence {
    pub input_text: String,
    pub context: String,
    pub frequency: u32,
    pub last_seen: DateTime<Utc>,
}

/// All phrasings recorded under one key, in first-seen order
pub type PatternEntry = Vec<PatternOccurrence>;

pub type PatternTable = BTreeMap<PatternKey, PatternEntry>;
pub type WordAssociations = BTreeMap<String, Vec<String>>;
pub type TaughtAnswers = BTreeMap<String, String>;
pub type CustomOverrides = BTreeMap<PatternKey, CustomOverride>;

/// Operator-authored reply bound to a pattern key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOverride {
    pub answer: String,
    pub active: bool,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// How a taught answer was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaughtMatchKind {
    Exact,
    Normalized,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaughtMatch<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub kind: TaughtMatchKind,
}

/// Memory-editor view of one pattern key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSummary {
    pub key: PatternKey,
    pub phrasings: usize,
    pub total_frequency: u32,
    pub last_seen: Option<DateTime<Utc>>,
    pub sample: Option<String>,
    /// `Some(active)` when an override is bound to this key
    pub override_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeStats {
    pub patterns: usize,
    pub phrasings: usize,
    pub interactions: u64,
    pub associations: usize,
    pub taught_answers: usize,
    pub overrides: usize,
    pub active_overrides: usize,
    pub degraded: bool,
}

#[derive(Clone)]
pub struct KnowledgeStore {
    backend: Arc<dyn StorageBackend>,
    patterns: PatternTable,
    associations: WordAssociations,
    taught: TaughtAnswers,
    overrides: CustomOverrides,
    degraded: bool,
}

impl KnowledgeStore {
    /// Load every collection from the backend
    pub fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let patterns = load_document(backend.as_ref(), Collection::Patterns)?;
        let associations = load_document(backend.as_ref(), Collection::WordAssociations)?;
        let taught = load_document(backend.as_ref(), Collection::TaughtAnswers)?;
        let overrides = load_document(backend.as_ref(), Collection::CustomOverrides)?;

        let store = Self {
            backend,
            patterns,
            associations,
            taught,
            overrides,
            degraded: false,
        };

        let stats = store.stats();
        info!(
            "Knowledge store loaded ({}): {} patterns, {} taught answers, {} overrides",
            store.backend.name(),
            stats.patterns,
            stats.taught_answers,
            stats.overrides
        );
        Ok(store)
    }

    /// Whether a write has failed since the store was opened
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    // ------------------------------------------------------------------
    // Patterns and associations
    // ------------------------------------------------------------------

    /// Upsert the utterance under its pattern key and fold its word pairs
    /// into the association table.
    ///
    /// Returns the key it was recorded under, `None` for an empty key.
    pub fn record_interaction(
        &mut self,
        utterance: &Utterance,
        context: &str,
    ) -> Result<Option<PatternKey>, StoreError> {
        let key = utterance.pattern_key();
        if key.is_empty() {
            return Ok(None);
        }

        let entry = self.patterns.entry(key.clone()).or_default();
        match entry
            .iter_mut()
            .find(|o| o.input_text == utterance.text && o.context == context)
        {
            Some(existing) => {
                existing.frequency += 1;
                existing.last_seen = utterance.timestamp;
                debug!("Pattern {} seen again (x{})", key, existing.frequency);
            }
            None => {
                entry.push(PatternOccurrence {
                    input_text: utterance.text.clone(),
                    context: context.to_string(),
                    frequency: 1,
                    last_seen: utterance.timestamp,
                });
                debug!("New phrasing under pattern {}", key);
            }
        }

        let associations_changed = self.observe_word_pairs(&utterance.text);

        self.persist(Collection::Patterns)?;
        if associations_changed {
            self.persist(Collection::WordAssociations)?;
        }
        Ok(Some(key))
    }

    fn observe_word_pairs(&mut self, text: &str) -> bool {
        let words = tokens(text);
        let mut changed = false;
        for pair in words.windows(2) {
            let followers = self.associations.entry(pair[0].clone()).or_default();
            if !followers.contains(&pair[1]) {
                followers.push(pair[1].clone());
                changed = true;
            }
        }
        changed
    }

    pub fn lookup_pattern(&self, key: &PatternKey) -> Option<&PatternEntry> {
        self.patterns.get(key).filter(|e| !e.is_empty())
    }

    /// Keys sharing at least [`MIN_SHARED_KEYWORDS`] words with `keywords`,
    /// each with its most recently seen phrasing
    pub fn similar_patterns(&self, keywords: &[String]) -> Vec<(&PatternKey, &PatternOccurrence)> {
        let wanted: HashSet<&str> = keywords.iter().map(String::as_str).collect();
        self.patterns
            .iter()
            .filter(|(key, _)| {
                let shared: HashSet<&str> = key.words().filter(|w| wanted.contains(w)).collect();
                shared.len() >= MIN_SHARED_KEYWORDS
            })
            .filter_map(|(key, entry)| {
                entry
                    .iter()
                    .max_by_key(|o| o.last_seen)
                    .map(|latest| (key, latest))
            })
            .collect()
    }

    /// The most recently seen phrasing among similar keys
    pub fn most_recent_similar(&self, keywords: &[String]) -> Option<&PatternOccurrence> {
        self.similar_patterns(keywords)
            .into_iter()
            .map(|(_, occurrence)| occurrence)
            .max_by_key(|o| o.last_seen)
    }

    pub fn associations_for(&self, word: &str) -> &[String] {
        self.associations
            .get(&word.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Memory-editor listing, most frequent first
    pub fn list_patterns(&self) -> Vec<PatternSummary> {
        let mut list: Vec<PatternSummary> = self
            .patterns
            .iter()
            .map(|(key, entry)| {
                let latest = entry.iter().max_by_key(|o| o.last_seen);
                PatternSummary {
                    key: key.clone(),
                    phrasings: entry.len(),
                    total_frequency: entry.iter().map(|o| o.frequency).sum(),
                    last_seen: latest.map(|o| o.last_seen),
                    sample: latest.map(|o| o.input_text.clone()),
                    override_active: self.overrides.get(key).map(|o| o.active),
                }
            })
            .collect();
        list.sort_by(|a, b| {
            b.total_frequency
                .cmp(&a.total_frequency)
                .then_with(|| a.key.cmp(&b.key))
        });
        list
    }

    // ------------------------------------------------------------------
    // Taught answers
    // ------------------------------------------------------------------

    /// Store a user-taught answer under the question as asked
    pub fn teach(&mut self, question: &str, answer: &str) -> Result<(), StoreError> {
        let key = question.trim().to_lowercase();
        if key.is_empty() {
            return Ok(());
        }
        info!("Learned answer for: {}", key);
        self.taught.insert(key, answer.trim().to_string());
        self.persist(Collection::TaughtAnswers)
    }

    /// Exact match, then normalized match, then fuzzy keyword overlap
    pub fn lookup_taught(&self, text: &str) -> Option<TaughtMatch<'_>> {
        let exact = text.trim().to_lowercase();
        if let Some((q, a)) = self.taught.get_key_value(&exact) {
            return Some(TaughtMatch {
                question: q,
                answer: a,
                kind: TaughtMatchKind::Exact,
            });
        }

        let normalized = normalize_question(text);
        if let Some((q, a)) = self
            .taught
            .iter()
            .find(|(q, _)| normalize_question(q) == normalized)
        {
            return Some(TaughtMatch {
                question: q,
                answer: a,
                kind: TaughtMatchKind::Normalized,
            });
        }

        let wanted: HashSet<String> = extract_keywords(text).into_iter().collect();
        if wanted.len() < MIN_SHARED_KEYWORDS {
            return None;
        }

        let mut best: Option<(f32, &String, &String)> = None;
        for (q, a) in &self.taught {
            let have: HashSet<String> = extract_keywords(q).into_iter().collect();
            let shared = wanted.intersection(&have).count();
            if shared < MIN_SHARED_KEYWORDS {
                continue;
            }
            let ratio = shared as f32 / wanted.len().max(have.len()) as f32;
            if ratio >= FUZZY_MIN_RATIO && best.map_or(true, |(r, _, _)| ratio > r) {
                best = Some((ratio, q, a));
            }
        }

        best.map(|(ratio, q, a)| {
            debug!("Fuzzy taught match {:.2} for '{}'", ratio, q);
            TaughtMatch {
                question: q,
                answer: a,
                kind: TaughtMatchKind::Fuzzy,
            }
        })
    }

    // ------------------------------------------------------------------
    // Custom overrides
    // ------------------------------------------------------------------

    /// Add an override, or edit and re-activate an existing one
    pub fn set_override(&mut self, key: &PatternKey, answer: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        match self.overrides.get_mut(key) {
            Some(existing) => {
                existing.answer = answer.to_string();
                existing.active = true;
                existing.modified = Some(now);
                info!("Override edited: {}", key);
            }
            None => {
                self.overrides.insert(
                    key.clone(),
                    CustomOverride {
                        answer: answer.to_string(),
                        active: true,
                        created: now,
                        modified: None,
                    },
                );
                info!("Override added: {}", key);
            }
        }
        self.persist(Collection::CustomOverrides)
    }

    /// The override answer, if one is bound and active
    pub fn get_override(&self, key: &PatternKey) -> Option<&str> {
        self.overrides
            .get(key)
            .filter(|o| o.active)
            .map(|o| o.answer.as_str())
    }

    pub fn override_entry(&self, key: &PatternKey) -> Option<&CustomOverride> {
        self.overrides.get(key)
    }

    /// Returns false when no override is bound to `key`
    pub fn deactivate_override(&mut self, key: &PatternKey) -> Result<bool, StoreError> {
        let Some(existing) = self.overrides.get_mut(key) else {
            return Ok(false);
        };
        existing.active = false;
        existing.modified = Some(Utc::now());
        info!("Override deactivated: {}", key);
        self.persist(Collection::CustomOverrides)?;
        Ok(true)
    }

    /// Returns false when no override is bound to `key`
    pub fn delete_override(&mut self, key: &PatternKey) -> Result<bool, StoreError> {
        if self.overrides.remove(key).is_none() {
            return Ok(false);
        }
        info!("Override deleted: {}", key);
        self.persist(Collection::CustomOverrides)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Stats and persistence
    // ------------------------------------------------------------------

    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            patterns: self.patterns.len(),
            phrasings: self.patterns.values().map(Vec::len).sum(),
            interactions: self
                .patterns
                .values()
                .flatten()
                .map(|o| u64::from(o.frequency))
                .sum(),
            associations: self.associations.len(),
            taught_answers: self.taught.len(),
            overrides: self.overrides.len(),
            active_overrides: self.overrides.values().filter(|o| o.active).count(),
            degraded: self.degraded,
        }
    }

    /// Serialized form of one collection, exactly as it is saved
    pub fn render(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        let body = match collection {
            Collection::Patterns => serde_json::to_string_pretty(&self.patterns)?,
            Collection::WordAssociations => serde_json::to_string_pretty(&self.associations)?,
            Collection::TaughtAnswers => serde_json::to_string_pretty(&self.taught)?,
            Collection::CustomOverrides => serde_json::to_string_pretty(&self.overrides)?,
            Collection::Predictor => return Ok(None),
        };
        Ok(Some(body))
    }

    /// Write every knowledge collection
    pub fn flush(&mut self) -> Result<(), StoreError> {
        for collection in [
            Collection::Patterns,
            Collection::WordAssociations,
            Collection::TaughtAnswers,
            Collection::CustomOverrides,
        ] {
            self.persist(collection)?;
        }
        Ok(())
    }

    /// Write one collection through to the backend.
    ///
    /// Only an unreachable backend is an error; anything else is logged
    /// and the store carries on in memory.
    fn persist(&mut self, collection: Collection) -> Result<(), StoreError> {
        let Some(body) = self.render(collection)? else {
            return Ok(());
        };
        match save_document(self.backend.as_ref(), collection, &body) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, WriteFailure};

    fn store() -> (KnowledgeStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = KnowledgeStore::open(backend.clone()).unwrap();
        (store, backend)
    }

    #[test]
    fn test_record_interaction_increments_frequency() {
        let (mut store, _) = store();
        let u = Utterance::new("tell me about rust programming");

        let key = store.record_interaction(&u, "question").unwrap().unwrap();
        store.record_interaction(&u, "question").unwrap();
        store.record_interaction(&u, "question").unwrap();

        let entry = store.lookup_pattern(&key).unwrap();
        assert_eq!(entry.len(), 1);
        assert_eq!(entry[0].frequency, 3);

        // Same text under another context is a separate phrasing
        store.record_interaction(&u, "general").unwrap();
        assert_eq!(store.lookup_pattern(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_word_associations_deduplicated() {
        let (mut store, _) = store();
        store
            .record_interaction(&Utterance::new("play some music"), "media")
            .unwrap();
        store
            .record_interaction(&Utterance::new("play some music now"), "media")
            .unwrap();
        assert_eq!(store.associations_for("play"), ["some".to_string()]);
        assert_eq!(store.associations_for("music"), ["now".to_string()]);
        assert!(store.associations_for("unknown").is_empty());
    }

    #[test]
    fn test_empty_key_not_recorded() {
        let (mut store, _) = store();
        let recorded = store.record_interaction(&Utterance::new("is it"), "general").unwrap();
        assert!(recorded.is_none());
        assert_eq!(store.stats().patterns, 0);
    }

    #[test]
    fn test_lookup_taught_exact_normalized_fuzzy() {
        let (mut store, _) = store();
        store.teach("binary search kya hai", "X").unwrap();

        let m = store.lookup_taught("Binary search kya hai").unwrap();
        assert_eq!((m.answer, m.kind), ("X", TaughtMatchKind::Exact));

        let m = store.lookup_taught("binary search kya hai?").unwrap();
        assert_eq!((m.answer, m.kind), ("X", TaughtMatchKind::Normalized));

        store.teach("explain linked list traversal", "walk the nodes").unwrap();
        let m = store.lookup_taught("linked list traversal explain please").unwrap();
        assert_eq!(m.kind, TaughtMatchKind::Fuzzy);
        assert_eq!(m.answer, "walk the nodes");
    }

    #[test]
    fn test_fuzzy_requires_two_shared_keywords() {
        let (mut store, _) = store();
        store.teach("quantum", "physics").unwrap();
        assert!(store.lookup_taught("quantum stuff").is_none());
    }

    #[test]
    fn test_override_lifecycle() {
        let (mut store, _) = store();
        let key = PatternKey::new("name_what_your");

        store.set_override(&key, "I am JARVIS").unwrap();
        assert_eq!(store.get_override(&key), Some("I am JARVIS"));
        assert!(store.override_entry(&key).unwrap().modified.is_none());

        assert!(store.deactivate_override(&key).unwrap());
        assert!(store.get_override(&key).is_none());

        store.set_override(&key, "JARVIS here").unwrap();
        assert_eq!(store.get_override(&key), Some("JARVIS here"));
        assert!(store.override_entry(&key).unwrap().modified.is_some());

        assert!(store.delete_override(&key).unwrap());
        assert!(!store.delete_override(&key).unwrap());
    }

    #[test]
    fn test_similar_prefers_most_recent() {
        let (mut store, _) = store();
        let mut old = Utterance::new("python list sorting");
        old.timestamp = Utc::now() - chrono::Duration::minutes(10);
        for _ in 0..5 {
            store.record_interaction(&old, "question").unwrap();
        }
        store
            .record_interaction(&Utterance::new("python list comprehension"), "question")
            .unwrap();

        let kw = extract_keywords("python list slicing");
        let hit = store.most_recent_similar(&kw).unwrap();
        assert_eq!(hit.input_text, "python list comprehension");
    }

    #[test]
    fn test_write_failure_degrades() {
        let (mut store, backend) = store();
        backend.set_write_failure(Some(WriteFailure::Io));

        store.teach("what is rust", "a language").unwrap();
        assert!(store.is_degraded());
        assert_eq!(store.lookup_taught("what is rust").unwrap().answer, "a language");

        backend.set_write_failure(Some(WriteFailure::Unavailable));
        let err = store.teach("what is go", "another language").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_malformed_collection_starts_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.save(Collection::TaughtAnswers, "{not json").unwrap();
        let store = KnowledgeStore::open(backend).unwrap();
        assert_eq!(store.stats().taught_answers, 0);
    }

    #[test]
    fn test_list_patterns_marks_overrides() {
        let (mut store, _) = store();
        let u = Utterance::new("open chrome browser");
        let key = store.record_interaction(&u, "open_app").unwrap().unwrap();
        store.set_override(&key, "Opening it").unwrap();

        let list = store.list_patterns();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].override_active, Some(true));
        assert_eq!(list[0].sample.as_deref(), Some("open chrome browser"));
    }
}
