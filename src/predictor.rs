//! Statistical Intent Predictor
//!
//! Bag-of-words softmax regression over a bounded vocabulary, retrained
//! from scratch on a rolling window of recent (text, intent) samples.
//!
//! Training is full-batch gradient descent from zero weights, so the same
//! window always yields the same model.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

use crate::classifier::Intent;
use crate::tokenizer::tokens;

/// Out-of-vocabulary token, always at index 0
pub const UNKNOWN_TOKEN: &str = "<unk>";

/// Samples scored for the post-retrain accuracy figure
const ACCURACY_WINDOW: usize = 10;

/// Predictor tuning knobs
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    /// Retrain after this many new distinct samples
    pub retrain_every: usize,
    /// Below this many samples, predictions report zero confidence
    pub min_samples: usize,
    /// Rolling window size
    pub window: usize,
    /// Vocabulary size including the `<unk>` slot
    pub vocab_cap: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            retrain_every: 10,
            min_samples: 5,
            window: 100,
            vocab_cap: 1000,
            epochs: 800,
            learning_rate: 0.5,
            l2: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub text: String,
    pub intent: Intent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub intent: Intent,
    /// Top class probability, 0-100
    pub confidence_percent: f32,
}

impl Prediction {
    pub fn none() -> Self {
        Self {
            intent: Intent::General,
            confidence_percent: 0.0,
        }
    }

    /// Confidence strictly above the threshold
    pub fn is_confident(&self, threshold_percent: f32) -> bool {
        self.confidence_percent > threshold_percent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictorStats {
    pub retrain_count: u64,
    pub predictions: u64,
    /// Accuracy over the last few window samples after the latest retrain
    pub recent_accuracy: Option<f32>,
}

/// Everything the predictor persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictorState {
    pub vocabulary: BTreeMap<String, usize>,
    pub classes: Vec<Intent>,
    pub trained: bool,
    pub last_trained_sample_count: usize,
    /// One row per class: vocabulary weights followed by a bias
    pub weights: Vec<Vec<f64>>,
    pub window: VecDeque<TrainingSample>,
    pub new_since_train: usize,
    pub stats: PredictorStats,
}

/// Outcome of one retrain
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub samples: usize,
    pub classes: usize,
    pub vocabulary: usize,
    pub recent_accuracy: f32,
}

#[derive(Debug, Clone)]
pub struct IntentPredictor {
    config: PredictorConfig,
    state: PredictorState,
}

impl IntentPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            state: PredictorState::default(),
        }
    }

    /// Restore persisted state, discarding a model whose shape is broken
    pub fn from_state(config: PredictorConfig, mut state: PredictorState) -> Self {
        if state.trained && !model_shape_ok(&state) {
            warn!("Predictor model state is malformed, marking untrained");
            state.trained = false;
            state.weights.clear();
        }
        while state.window.len() > config.window {
            state.window.pop_front();
        }
        Self { config, state }
    }

    pub fn state(&self) -> &PredictorState {
        &self.state
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn stats(&self) -> &PredictorStats {
        &self.state.stats
    }

    pub fn is_trained(&self) -> bool {
        self.state.trained
    }

    pub fn sample_count(&self) -> usize {
        self.state.window.len()
    }

    /// Serialized state, as persisted
    pub fn render(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.state)
    }

    /// Append to the rolling window. Returns whether the sample was new;
    /// a repeat is moved to the newest slot instead.
    pub fn add_sample(&mut self, text: &str, intent: Intent) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        if let Some(pos) = self
            .state
            .window
            .iter()
            .position(|s| s.text == text && s.intent == intent)
        {
            if let Some(existing) = self.state.window.remove(pos) {
                self.state.window.push_back(existing);
            }
            return false;
        }

        self.state.window.push_back(TrainingSample {
            text: text.to_string(),
            intent,
        });
        while self.state.window.len() > self.config.window {
            self.state.window.pop_front();
        }
        self.state.new_since_train += 1;
        true
    }

    /// Add a sample and retrain when it completes a batch of new ones
    pub fn observe(&mut self, text: &str, intent: Intent) -> Option<TrainReport> {
        if !self.add_sample(text, intent) {
            return None;
        }
        if self.state.new_since_train < self.config.retrain_every {
            return None;
        }
        self.train()
    }

    pub fn note_prediction(&mut self) {
        self.state.stats.predictions += 1;
    }

    /// Retrain from scratch on the current window.
    ///
    /// Returns `None` (leaving the model untrained) when the window holds
    /// fewer than the minimum samples or a single intent.
    pub fn train(&mut self) -> Option<TrainReport> {
        self.state.new_since_train = 0;

        let samples: Vec<TrainingSample> = self.state.window.iter().cloned().collect();
        let classes: Vec<Intent> = Intent::ALL
            .iter()
            .copied()
            .filter(|i| samples.iter().any(|s| s.intent == *i))
            .collect();

        if samples.len() < self.config.min_samples || classes.len() < 2 {
            debug!(
                "Not training: {} samples, {} classes",
                samples.len(),
                classes.len()
            );
            self.state.trained = false;
            return None;
        }

        let vocabulary = build_vocabulary(&samples, self.config.vocab_cap);
        let features: Vec<Vec<usize>> = samples
            .iter()
            .map(|s| featurize(&vocabulary, &s.text))
            .collect();
        let labels: Vec<usize> = samples
            .iter()
            .map(|s| classes.iter().position(|c| *c == s.intent).unwrap_or(0))
            .collect();

        let width = vocabulary.len() + 1;
        let mut weights = vec![vec![0.0f64; width]; classes.len()];
        let n = samples.len() as f64;
        let lr = self.config.learning_rate;
        let l2 = self.config.l2;

        for _ in 0..self.config.epochs {
            let mut grad = vec![vec![0.0f64; width]; classes.len()];
            for (x, &y) in features.iter().zip(&labels) {
                let probs = softmax(&weights, x);
                for (c, p) in probs.iter().enumerate() {
                    let g = p - if c == y { 1.0 } else { 0.0 };
                    for &i in x {
                        grad[c][i] += g;
                    }
                    grad[c][width - 1] += g;
                }
            }
            for (row, g_row) in weights.iter_mut().zip(&grad) {
                for (w, g) in row.iter_mut().zip(g_row) {
                    *w -= lr * (g / n + l2 * *w);
                }
            }
        }

        self.state.vocabulary = vocabulary;
        self.state.classes = classes;
        self.state.weights = weights;
        self.state.trained = true;
        self.state.last_trained_sample_count = samples.len();

        let recent: Vec<&TrainingSample> = samples.iter().rev().take(ACCURACY_WINDOW).collect();
        let correct = recent
            .iter()
            .filter(|s| self.scores(&s.text).map(|(intent, _)| intent) == Some(s.intent))
            .count();
        let accuracy = correct as f32 * 100.0 / recent.len() as f32;

        self.state.stats.retrain_count += 1;
        self.state.stats.recent_accuracy = Some(accuracy);

        let report = TrainReport {
            samples: samples.len(),
            classes: self.state.classes.len(),
            vocabulary: self.state.vocabulary.len(),
            recent_accuracy: accuracy,
        };
        info!(
            "Predictor retrained on {} samples ({} intents, vocab {}), recent accuracy {:.0}%",
            report.samples, report.classes, report.vocabulary, report.recent_accuracy
        );
        Some(report)
    }

    /// Predict an intent; zero confidence whenever the model cannot be trusted
    pub fn predict(&self, text: &str) -> Prediction {
        if !self.state.trained || self.state.window.len() < self.config.min_samples {
            return Prediction::none();
        }
        match self.scores(text) {
            Some((intent, p)) => Prediction {
                intent,
                confidence_percent: (p * 100.0) as f32,
            },
            None => Prediction::none(),
        }
    }

    fn scores(&self, text: &str) -> Option<(Intent, f64)> {
        if !model_shape_ok(&self.state) {
            return None;
        }
        let x = featurize(&self.state.vocabulary, text);
        if x.is_empty() {
            return None;
        }
        let probs = softmax(&self.state.weights, &x);
        probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .and_then(|(c, p)| self.state.classes.get(c).map(|intent| (*intent, *p)))
    }
}

/// `<unk>` first, then tokens in first-seen order until the cap
fn build_vocabulary(samples: &[TrainingSample], cap: usize) -> BTreeMap<String, usize> {
    let mut vocabulary = BTreeMap::new();
    vocabulary.insert(UNKNOWN_TOKEN.to_string(), 0);
    for sample in samples {
        for token in tokens(&sample.text) {
            if vocabulary.len() >= cap.max(1) {
                return vocabulary;
            }
            let next = vocabulary.len();
            vocabulary.entry(token).or_insert(next);
        }
    }
    vocabulary
}

/// Sorted, deduplicated active feature indices
fn featurize(vocabulary: &BTreeMap<String, usize>, text: &str) -> Vec<usize> {
    let mut x: Vec<usize> = tokens(text)
        .iter()
        .map(|t| vocabulary.get(t).copied().unwrap_or(0))
        .collect();
    x.sort_unstable();
    x.dedup();
    x
}

fn softmax(weights: &[Vec<f64>], x: &[usize]) -> Vec<f64> {
    let logits: Vec<f64> = weights
        .iter()
        .map(|row| x.iter().map(|&i| row[i]).sum::<f64>() + row[row.len() - 1])
        .collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.iter().map(|e| e / total).collect()
}

fn model_shape_ok(state: &PredictorState) -> bool {
    let width = state.vocabulary.len() + 1;
    state.classes.len() >= 2
        && state.weights.len() == state.classes.len()
        && state.weights.iter().all(|row| row.len() == width)
        && state.vocabulary.values().all(|&i| i < state.vocabulary.len())
        && state.weights.iter().flatten().all(|w| w.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_must_exceed_threshold() {
        let at = Prediction {
            intent: Intent::OpenApp,
            confidence_percent: 70.0,
        };
        assert!(!at.is_confident(70.0));
        assert!(Prediction { confidence_percent: 70.5, ..at }.is_confident(70.0));
        assert!(!Prediction::none().is_confident(0.0));
    }

    fn corpus() -> Vec<(&'static str, Intent)> {
        vec![
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
        ]
    }

    #[test]
    fn test_zero_confidence_below_minimum() {
        let mut p = IntentPredictor::new(PredictorConfig::default());
        p.add_sample("play music", Intent::MediaControl);
        p.add_sample("open chrome", Intent::OpenApp);
        assert!(p.train().is_none());
        assert_eq!(p.predict("play music").confidence_percent, 0.0);
    }

    #[test]
    fn test_retrains_every_k_new_samples() {
        let mut p = IntentPredictor::new(PredictorConfig::default());
        let mut retrains = Vec::new();
        for (i, (text, intent)) in corpus().into_iter().enumerate() {
            if p.observe(text, intent).is_some() {
                retrains.push(i + 1);
            }
        }
        assert_eq!(retrains, vec![10]);
        assert_eq!(p.stats().retrain_count, 1);
        assert_eq!(p.state().last_trained_sample_count, 10);

        let pred = p.predict("please play some jazz music");
        assert_eq!(pred.intent, Intent::MediaControl);
        assert!(pred.confidence_percent > 70.0, "{:?}", pred);
    }

    #[test]
    fn test_duplicate_moves_to_newest() {
        let mut p = IntentPredictor::new(PredictorConfig::default());
        assert!(p.add_sample("a b c", Intent::General));
        assert!(p.add_sample("d e f", Intent::General));
        assert!(!p.add_sample("a b c", Intent::General));
        assert_eq!(p.sample_count(), 2);
        assert_eq!(p.state().window.back().unwrap().text, "a b c");
        assert_eq!(p.state().new_since_train, 2);
    }

    #[test]
    fn test_window_is_bounded() {
        let config = PredictorConfig {
            window: 3,
            ..PredictorConfig::default()
        };
        let mut p = IntentPredictor::new(config);
        for i in 0..5 {
            p.add_sample(&format!("sample number {}", i), Intent::General);
        }
        assert_eq!(p.sample_count(), 3);
        assert_eq!(p.state().window.front().unwrap().text, "sample number 2");
    }

    #[test]
    fn test_vocabulary_cap_maps_overflow_to_unknown() {
        let samples = vec![TrainingSample {
            text: "one two three four".to_string(),
            intent: Intent::General,
        }];
        let vocab = build_vocabulary(&samples, 3);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.get(UNKNOWN_TOKEN), Some(&0));
        assert_eq!(featurize(&vocab, "four"), vec![0]);
    }

    #[test]
    fn test_training_is_deterministic() {
        let mut a = IntentPredictor::new(PredictorConfig::default());
        let mut b = IntentPredictor::new(PredictorConfig::default());
        for (text, intent) in corpus() {
            a.add_sample(text, intent);
            b.add_sample(text, intent);
        }
        a.train();
        b.train();
        assert_eq!(a.state().weights, b.state().weights);
    }

    #[test]
    fn test_state_round_trip() {
        let mut p = IntentPredictor::new(PredictorConfig::default());
        for (text, intent) in corpus() {
            p.add_sample(text, intent);
        }
        p.train();

        let body = p.render().unwrap();
        let state: PredictorState = serde_json::from_str(&body).unwrap();
        let restored = IntentPredictor::from_state(PredictorConfig::default(), state);
        assert_eq!(restored.render().unwrap(), body);
        assert_eq!(
            restored.predict("shut down spotify"),
            p.predict("shut down spotify")
        );
    }

    #[test]
    fn test_malformed_state_is_untrained() {
        let state = PredictorState {
            trained: true,
            classes: vec![Intent::General, Intent::Greeting],
            weights: vec![vec![1.0]],
            ..PredictorState::default()
        };
        let p = IntentPredictor::from_state(PredictorConfig::default(), state);
        assert!(!p.is_trained());
        assert_eq!(p.predict("anything").confidence_percent, 0.0);
    }
}
