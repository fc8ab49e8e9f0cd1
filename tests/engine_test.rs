//! Engine Integration Tests
//!
//! End-to-end turns through the resolution pipeline and learning loop.

use jarvis_core::{
    Engine, EngineConfig, EngineError, Intent, IntentPredictor, PredictorConfig, ResolveOptions,
    SessionContext,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn engine() -> Engine {
    Engine::open(&EngineConfig::ephemeral()).expect("Failed to open engine")
}

async fn say(engine: &Engine, text: &str) -> jarvis_core::Resolution {
    tokio_test::assert_ok!(engine.resolve(text, &SessionContext::new()).await)
}

#[tokio::test]
async fn test_identity_scenario() {
    let engine = engine();
    let r = say(&engine, "what is your name").await;

    assert_eq!(r.source_tag, "identity");
    assert!(r.response.contains("JARVIS"));
}

#[tokio::test]
async fn test_teach_then_recall_with_trailing_question_mark() {
    let engine = engine();

    // Unknown question arms the teach slot
    let first = say(&engine, "binary search kya hai").await;
    assert_eq!(first.source_tag, "fallback");
    assert_eq!(
        first.session.pending_question.as_deref(),
        Some("binary search kya hai")
    );

    // Next utterance is taken as the answer
    let taught = engine
        .resolve("halve the sorted range every step", &first.session)
        .await
        .unwrap();
    assert_eq!(taught.source_tag, "taught_confirmation");
    assert!(taught.session.pending_question.is_none());

    let recall = engine
        .resolve("binary search kya hai?", &taught.session)
        .await
        .unwrap();
    assert_eq!(recall.source_tag, "taught");
    assert!(recall.response.contains("halve the sorted range every step"));
}

#[tokio::test]
async fn test_custom_honorific_keeps_taught_answer_verbatim() {
    let config = EngineConfig {
        user_name: "Boss".to_string(),
        ..EngineConfig::ephemeral()
    };
    let engine = Engine::open(&config).unwrap();

    let first = say(&engine, "what is the brightest star").await;
    let taught = engine
        .resolve("Sirius in Canis Major", &first.session)
        .await
        .unwrap();
    assert!(taught.response.contains("'Sirius in Canis Major'"));
    assert!(taught.response.contains("Boss"));

    let recall = engine
        .resolve("what is the brightest star?", &taught.session)
        .await
        .unwrap();
    assert_eq!(recall.source_tag, "taught");
    assert!(recall.response.ends_with("Sirius in Canis Major"));
    assert!(!recall.response.contains("Bossius"));
}

#[tokio::test]
async fn test_rule_intent_replies_are_not_tagged_predictor() {
    let engine = engine();
    let r = say(&engine, "what time is it").await;
    assert_eq!(r.intent, Intent::TimeQuery);
    assert_eq!(r.source_tag, "intent");
}

#[tokio::test]
async fn test_unknown_utterance_reaches_fallback_and_arms_pending() {
    let engine = engine();
    let r = say(&engine, "what is quantum entanglement").await;

    assert_eq!(r.source_tag, "fallback");
    assert!(r.response.contains("teach me"));
    assert_eq!(
        r.session.pending_question.as_deref(),
        Some("what is quantum entanglement")
    );
}

#[tokio::test]
async fn test_new_pending_question_replaces_old() {
    let engine = engine();
    let first = say(&engine, "what is quantum entanglement").await;

    // A fresh unresolved question overwrites the slot only if the first was
    // never answered; here the second turn answers the first instead.
    let answered = engine
        .resolve("what is dark matter", &first.session)
        .await
        .unwrap();
    assert_eq!(answered.source_tag, "taught_confirmation");

    let mut ctx = SessionContext::new();
    ctx.arm_pending("first question here");
    ctx.arm_pending("second question here");
    assert_eq!(ctx.pending_question.as_deref(), Some("second question here"));
}

#[tokio::test]
async fn test_similarity_prefers_most_recent_over_most_frequent() {
    let engine = engine();

    for _ in 0..3 {
        say(&engine, "python list sorting").await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    say(&engine, "python list comprehension").await;

    let r = say(&engine, "python list slicing").await;
    assert_eq!(r.source_tag, "similar");
    assert!(r.response.contains("python list comprehension"));
}

#[tokio::test]
async fn test_repeated_input_hits_pattern_stage() {
    let engine = engine();
    say(&engine, "tell me about distributed consensus").await;
    let r = say(&engine, "tell me about distributed consensus").await;
    assert_eq!(r.source_tag, "pattern");
}

#[tokio::test]
async fn test_frequency_increases_without_duplicates() {
    let engine = engine();
    for expected in 1..=3u32 {
        say(&engine, "tell me about distributed consensus").await;
        let patterns = engine.list_patterns().await;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].phrasings, 1);
        assert_eq!(patterns[0].total_frequency, expected);
    }
}

#[tokio::test]
async fn test_override_always_wins() {
    let config = EngineConfig {
        retrain_every: 2,
        min_training_samples: 2,
        ..EngineConfig::ephemeral()
    };
    let engine = Engine::open(&config).unwrap();

    // Build up a taught answer, pattern frequency and a trained predictor
    let first = say(&engine, "what is rust language").await;
    engine
        .resolve("a systems programming language", &first.session)
        .await
        .unwrap();
    for text in ["open chrome browser", "close notepad window", "play jazz music"] {
        say(&engine, text).await;
    }
    for _ in 0..3 {
        say(&engine, "what is rust language").await;
    }

    engine
        .set_override("what is rust language", "Operator answer")
        .await
        .unwrap();

    let r = say(&engine, "what is rust language").await;
    assert_eq!(r.source_tag, "override");
    assert_eq!(r.response, "Operator answer");

    // Same pattern key, different word order
    let r = say(&engine, "rust language what").await;
    assert_eq!(r.source_tag, "override");

    // Deactivated overrides stop applying
    assert!(engine.deactivate_override("what is rust language").await.unwrap());
    let r = say(&engine, "what is rust language").await;
    assert_ne!(r.source_tag, "override");
}

#[tokio::test]
async fn test_calculation_and_intent_surfaced() {
    let engine = engine();
    let r = say(&engine, "what is 12 + 30").await;
    assert_eq!(r.intent, Intent::Calculation);
    assert!(r.response.contains("42"));

    let r = say(&engine, "open chrome browser").await;
    assert_eq!(r.intent, Intent::OpenApp);
    assert!(r.response.contains("chrome browser"));
}

#[tokio::test]
async fn test_language_switch_is_sticky() {
    let engine = engine();
    let r = say(&engine, "please talk in hindi").await;
    assert_eq!(r.source_tag, "identity");

    let r = engine
        .resolve("what is quantum entanglement", &r.session)
        .await
        .unwrap();
    assert!(r.response.contains("sikha"));
}

#[tokio::test]
async fn test_predictor_retrains_every_k() {
    let config = EngineConfig {
        retrain_every: 3,
        min_training_samples: 3,
        ..EngineConfig::ephemeral()
    };
    let engine = Engine::open(&config).unwrap();

    for text in [
        "open chrome browser",
        "close notepad window",
        "play some jazz music",
        "open the spotify app",
        "close the terminal",
        "pause the video",
    ] {
        say(&engine, text).await;
    }

    let stats = engine.stats().await;
    assert_eq!(stats.training_samples, 6);
    assert_eq!(stats.retrain_count, 2);
    assert!(stats.predictor_trained);
}

#[test]
fn test_predictor_retrains_once_after_ten_distinct_samples() {
    let samples = [
        ("play some jazz music", Intent::MediaControl),
        ("pause the song", Intent::MediaControl),
        ("open chrome browser", Intent::OpenApp),
        ("launch the calculator app", Intent::OpenApp),
        ("hello jarvis good morning", Intent::Greeting),
        ("hey there buddy", Intent::Greeting),
        ("what time is it now", Intent::TimeQuery),
        ("tell me the current clock time", Intent::TimeQuery),
        ("close notepad window", Intent::CloseApp),
        ("shut down spotify", Intent::CloseApp),
        ("search google for rust tutorials", Intent::WebSearch),
        ("look up weather radar online", Intent::WebSearch),
    ];

    let mut predictor = IntentPredictor::new(PredictorConfig::default());
    let mut retrained_at = Vec::new();
    for (i, (text, intent)) in samples.iter().enumerate() {
        assert_eq!(
            predictor.predict(text).confidence_percent == 0.0,
            i < 10,
            "confidence before training must be zero"
        );
        if predictor.observe(text, *intent).is_some() {
            retrained_at.push(i + 1);
        }
    }
    assert_eq!(retrained_at, vec![10]);

    let p = predictor.predict("close the notepad window");
    assert_eq!(p.intent, Intent::CloseApp);
    assert!(p.confidence_percent > 70.0, "{:?}", p);
}

#[tokio::test]
async fn test_cancelled_resolution_commits_nothing() {
    let engine = engine();
    let token = CancellationToken::new();
    token.cancel();

    let result = engine
        .resolve_with(
            "python list sorting",
            &SessionContext::new(),
            ResolveOptions::with_cancel(token),
        )
        .await;
    let err = tokio_test::assert_err!(result);
    assert!(matches!(err, EngineError::Cancelled));

    let stats = engine.stats().await;
    assert_eq!(stats.interactions, 0);
    assert_eq!(stats.training_samples, 0);
    assert!(engine.list_patterns().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_turns_are_serialized() {
    let engine = engine();
    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .resolve(&format!("remind topic number{}", i), &SessionContext::new())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = engine.stats().await;
    assert_eq!(stats.interactions, 10);
    assert_eq!(stats.training_samples, 10);
}

#[tokio::test]
async fn test_empty_input_never_errors() {
    let engine = engine();
    for text in ["", "   ", "?", "k"] {
        let r = say(&engine, text).await;
        assert_eq!(r.source_tag, "fallback");
        assert!(r.session.pending_question.is_none());
    }
    assert_eq!(engine.stats().await.interactions, 0);
}
