//! Response Resolution Pipeline
//!
//! Eight resolvers tried in a fixed order; the first to produce a reply
//! ends the turn:
//!
//! 1. pending taught answer
//! 2. identity / small talk
//! 3. custom override
//! 4. taught answer lookup
//! 5. intent responders (statistical predictor over rule-based intent),
//!    tagged `predictor` when the model replaced the rule intent and
//!    `intent` otherwise
//! 6. exact pattern recall
//! 7. similar pattern recall
//! 8. generic fallback, optionally arming the teach slot
//!
//! Planning only reads the knowledge store and predictor. Writes come back
//! as [`LearningEffect`]s that the engine commits afterwards, so a turn that
//! is abandoned before commit leaves no trace.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::classifier::{Classification, Intent, Language, UtteranceClassifier};
use crate::knowledge::KnowledgeStore;
use crate::learning::{is_degenerate, LearningConfig, LearningEffect};
use crate::predictor::IntentPredictor;
use crate::responders::{self, ResponderInput};
use crate::session::SessionContext;
use crate::templates::{self, FallbackKind};
use crate::tokenizer::{tokens, PatternKey, Utterance};

/// Stage that produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TaughtConfirmation,
    Identity,
    Override,
    Taught,
    Predictor,
    RuleResponder,
    Pattern,
    Similar,
    Fallback,
}

impl Stage {
    /// Resolver order. Stage 5 reports `RuleResponder` instead of
    /// `Predictor` when the rule-based intent answered.
    pub const ORDER: [Stage; 8] = [
        Stage::TaughtConfirmation,
        Stage::Identity,
        Stage::Override,
        Stage::Taught,
        Stage::Predictor,
        Stage::Pattern,
        Stage::Similar,
        Stage::Fallback,
    ];

    /// Source tag surfaced to the caller
    pub fn tag(&self) -> &'static str {
        match self {
            Stage::TaughtConfirmation => "taught_confirmation",
            Stage::Identity => "identity",
            Stage::Override => "override",
            Stage::Taught => "taught",
            Stage::Predictor => "predictor",
            Stage::RuleResponder => "intent",
            Stage::Pattern => "pattern",
            Stage::Similar => "similar",
            Stage::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Pipeline thresholds and presentation
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Predictor confidence (percent) needed to replace the rule-based intent
    pub accept_confidence: f32,
    /// How the user is addressed in templated replies
    pub honorific: String,
    pub learning: LearningConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            accept_confidence: 70.0,
            honorific: "Sir".to_string(),
            learning: LearningConfig::default(),
        }
    }
}

/// Result of planning one turn, not yet committed
#[derive(Debug, Clone)]
pub struct TurnPlan {
    pub response: String,
    pub stage: Stage,
    /// Intent surfaced to the front end
    pub intent: Intent,
    pub classification: Classification,
    pub session: SessionContext,
    pub effects: Vec<LearningEffect>,
}

/// Everything the stages read about the current turn
struct Turn<'a> {
    utterance: Utterance,
    tokens: Vec<String>,
    classification: Classification,
    language: Language,
    language_switch: Option<Language>,
    degenerate: bool,
    session: SessionContext,
    knowledge: &'a KnowledgeStore,
    predictor: &'a IntentPredictor,
}

/// A stage's accepted reply
struct StageReply {
    text: String,
    intent: Intent,
    effects: Vec<LearningEffect>,
}

impl StageReply {
    fn new(text: impl Into<String>, intent: Intent) -> Self {
        Self {
            text: text.into(),
            intent,
            effects: Vec::new(),
        }
    }

    fn with_effect(mut self, effect: LearningEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Read-only resolver over the current learned state
pub struct Pipeline<'a> {
    classifier: &'a UtteranceClassifier,
    knowledge: &'a KnowledgeStore,
    predictor: &'a IntentPredictor,
    settings: &'a PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        classifier: &'a UtteranceClassifier,
        knowledge: &'a KnowledgeStore,
        predictor: &'a IntentPredictor,
        settings: &'a PipelineSettings,
    ) -> Self {
        Self {
            classifier,
            knowledge,
            predictor,
            settings,
        }
    }

    /// Run every stage in order until one answers
    pub fn plan(&self, text: &str, context: &SessionContext) -> TurnPlan {
        let classification = self.classifier.classify(text);
        let mut session = context.clone();
        let language_switch = session.observe(&classification);

        let mut turn = Turn {
            utterance: Utterance::new(text.trim()),
            tokens: tokens(text),
            language: session.language,
            language_switch,
            degenerate: is_degenerate(text, &self.settings.learning),
            classification,
            session,
            knowledge: self.knowledge,
            predictor: self.predictor,
        };

        let mut effects = Vec::new();
        if self.predictor.is_trained() {
            effects.push(LearningEffect::PredictionMade);
        }

        let (stage, reply) = self.run_stages(&mut turn);
        effects.extend(reply.effects);

        debug!(
            "Resolved via {} as {} ({} effects)",
            stage,
            reply.intent.as_str(),
            effects.len()
        );

        TurnPlan {
            response: reply.text,
            stage,
            intent: reply.intent,
            classification: turn.classification,
            session: turn.session,
            effects,
        }
    }

    fn run_stages(&self, turn: &mut Turn<'_>) -> (Stage, StageReply) {
        if let Some(reply) = self.pending_answer(turn) {
            return (Stage::TaughtConfirmation, reply);
        }
        if let Some(reply) = self.identity(turn) {
            return (Stage::Identity, reply);
        }
        if let Some(reply) = self.custom_override(turn) {
            return (Stage::Override, reply);
        }
        if let Some(reply) = self.taught(turn) {
            return (Stage::Taught, reply);
        }
        if let Some(answered) = self.intent_responder(turn) {
            return answered;
        }
        if let Some(reply) = self.pattern(turn) {
            return (Stage::Pattern, reply);
        }
        if let Some(reply) = self.similar(turn) {
            return (Stage::Similar, reply);
        }
        (Stage::Fallback, self.fallback(turn))
    }

    /// Learning effect for an ordinary turn, skipped for degenerate input
    fn record(turn: &Turn<'_>, intent: Intent) -> Option<LearningEffect> {
        if turn.degenerate {
            return None;
        }
        Some(LearningEffect::Record {
            text: turn.utterance.text.clone(),
            intent,
            context: intent.as_str().to_string(),
        })
    }

    /// Fixed template text with the configured honorific
    fn fixed(&self, template: &str) -> String {
        templates::personalize(template, &self.settings.honorific)
    }

    fn accept(turn: &Turn<'_>, text: impl Into<String>, intent: Intent) -> StageReply {
        let mut reply = StageReply::new(text, intent);
        reply.effects.extend(Self::record(turn, intent));
        reply
    }

    // 1. The previous turn asked to be taught; this utterance is the answer
    fn pending_answer(&self, turn: &mut Turn<'_>) -> Option<StageReply> {
        let answer = turn.utterance.text.clone();
        if answer.is_empty() {
            return None;
        }
        let question = turn.session.take_pending()?;

        let text = templates::teach_confirmation(
            &question,
            &answer,
            turn.language,
            &self.settings.honorific,
        );
        Some(
            StageReply::new(text, Intent::Teach)
                .with_effect(LearningEffect::Teach { question, answer }),
        )
    }

    // 2. Fixed identity and small-talk replies, plus language switches
    fn identity(&self, turn: &Turn<'_>) -> Option<StageReply> {
        let intent = turn.classification.intent;
        if let Some(language) = turn.language_switch {
            let text = self.fixed(templates::language_switched(language));
            return Some(Self::accept(turn, text, intent));
        }

        let (topic, forced) = templates::match_small_talk(&turn.tokens)?;
        let language = forced.unwrap_or(turn.language);
        let text = self.fixed(templates::small_talk_reply(topic, language));
        Some(Self::accept(turn, text, Intent::Conversation))
    }

    // 3. Operator overrides beat every learned resolver
    fn custom_override(&self, turn: &Turn<'_>) -> Option<StageReply> {
        let key = turn.utterance.pattern_key();
        if key.is_empty() {
            return None;
        }
        let answer = turn.knowledge.get_override(&key)?;
        Some(Self::accept(turn, answer, turn.classification.intent))
    }

    // 4. Answers the user taught earlier
    fn taught(&self, turn: &Turn<'_>) -> Option<StageReply> {
        let found = turn.knowledge.lookup_taught(&turn.utterance.text)?;
        debug!("Taught answer matched ({:?}): {}", found.kind, found.question);
        let text = templates::taught_recall(found.answer, turn.language, &self.settings.honorific);
        Some(Self::accept(turn, text, turn.classification.intent))
    }

    // 5. Intent responders; a confident predictor replaces the rule-based intent
    fn intent_responder(&self, turn: &Turn<'_>) -> Option<(Stage, StageReply)> {
        let rule_intent = turn.classification.intent;
        let prediction = turn.predictor.predict(&turn.utterance.text);

        let (stage, intent) = if prediction.is_confident(self.settings.accept_confidence)
            && prediction.intent != rule_intent
        {
            debug!(
                "Predictor overrides {} with {} ({:.0}%)",
                rule_intent.as_str(),
                prediction.intent.as_str(),
                prediction.confidence_percent
            );
            (Stage::Predictor, prediction.intent)
        } else {
            (Stage::RuleResponder, rule_intent)
        };

        let input = ResponderInput {
            text: &turn.utterance.text,
            tokens: &turn.tokens,
            classification: &turn.classification,
            language: turn.language,
            honorific: &self.settings.honorific,
            knowledge: turn.knowledge,
            predictor: turn.predictor,
        };
        let text = responders::respond(intent, &input)?;
        Some((stage, Self::accept(turn, text, intent)))
    }

    // 6. Same pattern key seen before
    fn pattern(&self, turn: &Turn<'_>) -> Option<StageReply> {
        let key = turn.utterance.pattern_key();
        if key.is_empty() {
            return None;
        }
        let entry = turn.knowledge.lookup_pattern(&key)?;
        let frequency: u32 = entry.iter().map(|o| o.frequency).sum();
        let text = templates::pattern_recall(
            &turn.utterance.keywords,
            frequency,
            turn.language,
            &self.settings.honorific,
        );
        Some(Self::accept(turn, text, turn.classification.intent))
    }

    // 7. Most recently seen pattern sharing enough keywords
    fn similar(&self, turn: &Turn<'_>) -> Option<StageReply> {
        let previous = turn.knowledge.most_recent_similar(&turn.utterance.keywords)?;
        let text = templates::similar_recall(
            &previous.input_text,
            turn.language,
            &self.settings.honorific,
        );
        Some(Self::accept(turn, text, turn.classification.intent))
    }

    // 8. Generic reply; unresolved questions arm the teach slot
    fn fallback(&self, turn: &mut Turn<'_>) -> StageReply {
        let classification = &turn.classification;
        let kind = if classification.intent == Intent::Greeting {
            FallbackKind::Greeting
        } else if classification.is_question_like {
            FallbackKind::Question
        } else {
            FallbackKind::Unknown
        };

        let mut text = self.fixed(templates::fallback(kind, turn.language));

        if let Some(word) = turn.utterance.keywords.first() {
            if let Some(associated) = turn.knowledge.associations_for(word).first() {
                text.push_str(&templates::association_hint(word, associated));
            }
        }

        let mut text = templates::enhance(&text, classification.emotion);

        let wants_teaching = matches!(classification.intent, Intent::Question | Intent::General)
            || classification.is_question_like;
        if wants_teaching && !turn.degenerate {
            text.push(' ');
            text.push_str(&self.fixed(templates::teach_prompt(turn.language)));
            turn.session.arm_pending(&turn.utterance.text);
        }

        let intent = turn.classification.intent;
        Self::accept(turn, text, intent)
    }
}

/// Pattern key an utterance would be stored under
pub fn pattern_key_for(text: &str) -> PatternKey {
    Utterance::new(text).pattern_key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::PredictorConfig;
    use crate::storage::MemoryBackend;
    use std::sync::Arc;

    struct Fixture {
        classifier: UtteranceClassifier,
        knowledge: KnowledgeStore,
        predictor: IntentPredictor,
        settings: PipelineSettings,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                classifier: UtteranceClassifier::new(),
                knowledge: KnowledgeStore::open(Arc::new(MemoryBackend::new())).unwrap(),
                predictor: IntentPredictor::new(PredictorConfig::default()),
                settings: PipelineSettings::default(),
            }
        }

        fn plan(&self, text: &str, ctx: &SessionContext) -> TurnPlan {
            Pipeline::new(&self.classifier, &self.knowledge, &self.predictor, &self.settings)
                .plan(text, ctx)
        }
    }

    #[test]
    fn test_identity_stage() {
        let f = Fixture::new();
        let plan = f.plan("what is your name", &SessionContext::new());
        assert_eq!(plan.stage, Stage::Identity);
        assert!(plan.response.contains("JARVIS"));
        assert_eq!(plan.stage.tag(), "identity");
    }

    #[test]
    fn test_pending_answer_consumed() {
        let f = Fixture::new();
        let mut ctx = SessionContext::new();
        ctx.arm_pending("binary search kya hai");

        let plan = f.plan("halving the range each step", &ctx);
        assert_eq!(plan.stage, Stage::TaughtConfirmation);
        assert!(plan.session.pending_question.is_none());
        assert_eq!(
            plan.effects,
            vec![LearningEffect::Teach {
                question: "binary search kya hai".to_string(),
                answer: "halving the range each step".to_string(),
            }]
        );
    }

    #[test]
    fn test_fallback_arms_pending() {
        let f = Fixture::new();
        let plan = f.plan("what is quantum entanglement", &SessionContext::new());
        assert_eq!(plan.stage, Stage::Fallback);
        assert!(plan.response.contains(templates::teach_prompt(Language::English)));
        assert_eq!(
            plan.session.pending_question.as_deref(),
            Some("what is quantum entanglement")
        );
    }

    #[test]
    fn test_override_beats_taught() {
        let mut f = Fixture::new();
        f.knowledge.teach("what is rust language", "a systems language").unwrap();
        f.knowledge
            .set_override(&pattern_key_for("what is rust language"), "Operator says hi")
            .unwrap();

        let plan = f.plan("what is rust language", &SessionContext::new());
        assert_eq!(plan.stage, Stage::Override);
        assert_eq!(plan.response, "Operator says hi");
    }

    #[test]
    fn test_calculation_via_rule_intent() {
        let f = Fixture::new();
        let plan = f.plan("what is 2 + 3", &SessionContext::new());
        assert_eq!(plan.stage, Stage::RuleResponder);
        assert_eq!(plan.stage.tag(), "intent");
        assert_eq!(plan.intent, Intent::Calculation);
        assert_eq!(plan.response, "The answer is 5");
    }

    #[test]
    fn test_degenerate_input_records_nothing() {
        let f = Fixture::new();
        let plan = f.plan("", &SessionContext::new());
        assert_eq!(plan.stage, Stage::Fallback);
        assert!(plan.effects.is_empty());
        assert!(plan.session.pending_question.is_none());
    }

    #[test]
    fn test_honorific_applied() {
        let mut f = Fixture::new();
        f.settings.honorific = "Boss".to_string();
        let plan = f.plan("how are you", &SessionContext::new());
        assert!(!plan.response.contains("Sir"));
    }

    #[test]
    fn test_honorific_leaves_taught_text_alone() {
        let mut f = Fixture::new();
        f.settings.honorific = "Boss".to_string();

        let mut ctx = SessionContext::new();
        ctx.arm_pending("what is the brightest star");
        let plan = f.plan("Sirius in Canis Major", &ctx);
        assert!(plan.response.contains("Thank you, Boss!"));
        assert!(plan.response.contains("'Sirius in Canis Major'"));

        f.knowledge
            .teach("what is the brightest star", "Sirius in Canis Major")
            .unwrap();
        let plan = f.plan("what is the brightest star?", &SessionContext::new());
        assert_eq!(plan.stage, Stage::Taught);
        assert_eq!(plan.response, "I remember, Boss! Sirius in Canis Major");
    }

    fn train_disagreeing_predictor(f: &mut Fixture) {
        for (text, intent) in [
            ("zorblax quorp flimmer", Intent::TimeQuery),
            ("zorblax quorp", Intent::TimeQuery),
            ("zorblax flimmer", Intent::TimeQuery),
            ("what is the weather today", Intent::WeatherQuery),
            ("weather today please", Intent::WeatherQuery),
            ("the weather outside", Intent::WeatherQuery),
        ] {
            f.predictor.add_sample(text, intent);
        }
        assert!(f.predictor.train().is_some());
    }

    #[test]
    fn test_confident_predictor_replaces_rule_intent() {
        let mut f = Fixture::new();
        train_disagreeing_predictor(&mut f);

        let text = "zorblax quorp flimmer";
        assert_eq!(f.classifier.classify(text).intent, Intent::General);
        assert!(f.predictor.predict(text).is_confident(70.0));

        let plan = f.plan(text, &SessionContext::new());
        assert_eq!(plan.stage, Stage::Predictor);
        assert_eq!(plan.intent, Intent::TimeQuery);
        assert!(plan.response.contains("current time"));
    }

    #[test]
    fn test_agreeing_predictor_keeps_rule_tag() {
        let mut f = Fixture::new();
        train_disagreeing_predictor(&mut f);

        let text = "what is the weather today";
        assert_eq!(f.classifier.classify(text).intent, Intent::WeatherQuery);
        assert_eq!(f.predictor.predict(text).intent, Intent::WeatherQuery);

        let plan = f.plan(text, &SessionContext::new());
        assert_eq!(plan.stage, Stage::RuleResponder);
        assert_eq!(plan.intent, Intent::WeatherQuery);
    }

    #[test]
    fn test_predictor_below_threshold_does_not_override() {
        let mut f = Fixture::new();
        train_disagreeing_predictor(&mut f);
        f.settings.accept_confidence = 100.0;

        let plan = f.plan("zorblax quorp flimmer", &SessionContext::new());
        assert_ne!(plan.stage, Stage::Predictor);
        assert_eq!(plan.intent, Intent::General);
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let tags: Vec<&str> = Stage::ORDER.iter().map(Stage::tag).collect();
        assert_eq!(
            tags,
            vec![
                "taught_confirmation",
                "identity",
                "override",
                "taught",
                "predictor",
                "pattern",
                "similar",
                "fallback"
            ]
        );
    }
}
