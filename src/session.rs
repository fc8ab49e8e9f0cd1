//! Session Context
//!
//! Per-session state the front end carries between turns: the sticky
//! response language and the single-slot pending question.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::classifier::{Classification, Language};

/// Per-turn language detections kept for the majority vote
const LANGUAGE_VOTE_WINDOW: usize = 5;

/// State carried across turns of one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Language responses are localized to
    pub language: Language,
    /// Utterance awaiting a user-taught answer
    pub pending_question: Option<String>,
    #[serde(default)]
    recent_languages: VecDeque<Language>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    /// Fold one classification into the sticky language.
    ///
    /// Returns the new language when the user explicitly asked for a switch.
    pub fn observe(&mut self, classification: &Classification) -> Option<Language> {
        if let Some(preferred) = classification.language_preference {
            self.language = preferred;
            self.recent_languages = std::iter::repeat(preferred)
                .take(LANGUAGE_VOTE_WINDOW)
                .collect();
            debug!("Language explicitly set to {}", preferred.as_str());
            return Some(preferred);
        }

        self.recent_languages.push_back(classification.language);
        while self.recent_languages.len() > LANGUAGE_VOTE_WINDOW {
            self.recent_languages.pop_front();
        }

        let disagreeing = self
            .recent_languages
            .iter()
            .filter(|l| **l != self.language)
            .count();
        if disagreeing * 2 > self.recent_languages.len() {
            self.language = if self.language == Language::English {
                Language::Hindi
            } else {
                Language::English
            };
            debug!("Language re-detected as {}", self.language.as_str());
        }

        None
    }

    /// Arm the pending slot. A still-pending question is replaced, not queued.
    pub fn arm_pending(&mut self, question: &str) {
        if let Some(previous) = &self.pending_question {
            debug!("Replacing unanswered pending question: {}", previous);
        }
        self.pending_question = Some(question.to_string());
    }

    pub fn take_pending(&mut self) -> Option<String> {
        self.pending_question.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(language: Language) -> Classification {
        Classification {
            language,
            ..Classification::default()
        }
    }

    #[test]
    fn test_language_sticky_until_majority() {
        let mut ctx = SessionContext::with_language(Language::English);
        ctx.recent_languages = std::iter::repeat(Language::English).take(5).collect();

        ctx.observe(&detected(Language::Hindi));
        assert_eq!(ctx.language, Language::English);
        ctx.observe(&detected(Language::Hindi));
        assert_eq!(ctx.language, Language::English);
        ctx.observe(&detected(Language::Hindi));
        assert_eq!(ctx.language, Language::Hindi);
    }

    #[test]
    fn test_explicit_preference_switches_immediately() {
        let mut ctx = SessionContext::new();
        let c = Classification {
            language_preference: Some(Language::Hindi),
            ..Classification::default()
        };
        assert_eq!(ctx.observe(&c), Some(Language::Hindi));
        assert_eq!(ctx.language, Language::Hindi);

        // One English utterance does not undo an explicit choice
        ctx.observe(&detected(Language::English));
        assert_eq!(ctx.language, Language::Hindi);
    }

    #[test]
    fn test_pending_slot_overwrites() {
        let mut ctx = SessionContext::new();
        ctx.arm_pending("first question");
        ctx.arm_pending("second question");
        assert_eq!(ctx.take_pending().as_deref(), Some("second question"));
        assert!(ctx.pending_question.is_none());
    }
}
