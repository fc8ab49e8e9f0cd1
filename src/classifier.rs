//! Utterance Classifier
//!
//! Turns raw text into an intent / emotion / language tuple.
//! Intent comes from ordered keyword rule groups; the first group that
//! matches wins and later groups are never consulted:
//!
//! 1. conversational (small talk, identity, greetings)
//! 2. question markers (question words, trailing `?`)
//! 3. domain commands (apps, search, media, teaching)
//! 4. emotional expression
//!
//! Anything else falls into [`Intent::General`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tokenizer::{contains_any, tokens};

/// Closed set of intents the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Conversation,
    Question,
    TimeQuery,
    WeatherQuery,
    Calculation,
    OpenApp,
    CloseApp,
    WebSearch,
    MediaControl,
    RealTimeSearch,
    Teach,
    LearningStats,
    EmotionalExpression,
    General,
}

impl Intent {
    pub const ALL: [Intent; 15] = [
        Intent::Greeting,
        Intent::Conversation,
        Intent::Question,
        Intent::TimeQuery,
        Intent::WeatherQuery,
        Intent::Calculation,
        Intent::OpenApp,
        Intent::CloseApp,
        Intent::WebSearch,
        Intent::MediaControl,
        Intent::RealTimeSearch,
        Intent::Teach,
        Intent::LearningStats,
        Intent::EmotionalExpression,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Conversation => "conversation",
            Intent::Question => "question",
            Intent::TimeQuery => "time_query",
            Intent::WeatherQuery => "weather_query",
            Intent::Calculation => "calculation",
            Intent::OpenApp => "open_app",
            Intent::CloseApp => "close_app",
            Intent::WebSearch => "web_search",
            Intent::MediaControl => "media_control",
            Intent::RealTimeSearch => "real_time_search",
            Intent::Teach => "teach",
            Intent::LearningStats => "learning_stats",
            Intent::EmotionalExpression => "emotional_expression",
            Intent::General => "general",
        }
    }

    /// Intents whose side effect the front end performs (app open, search, ...)
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            Intent::OpenApp
                | Intent::CloseApp
                | Intent::WebSearch
                | Intent::MediaControl
                | Intent::RealTimeSearch
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown intent: {}", s))
    }
}

/// Emotion bucket derived from sentiment polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Positive,
    Negative,
    #[default]
    Neutral,
    Excited,
    Sad,
}

impl Emotion {
    /// Bucket a polarity score in [-1, 1]
    pub fn from_polarity(polarity: f32) -> Self {
        if polarity > 0.5 {
            Emotion::Excited
        } else if polarity > 0.1 {
            Emotion::Positive
        } else if polarity < -0.5 {
            Emotion::Sad
        } else if polarity < -0.1 {
            Emotion::Negative
        } else {
            Emotion::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Positive => "positive",
            Emotion::Negative => "negative",
            Emotion::Neutral => "neutral",
            Emotion::Excited => "excited",
            Emotion::Sad => "sad",
        }
    }
}

/// Response language. English is primary, Hindi (romanized) is secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    English,
    Hindi,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Hindi => "hindi",
        }
    }
}

/// Classifier output for one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub emotion: Emotion,
    pub polarity: f32,
    pub is_question_like: bool,
    /// Language detected in this utterance alone
    pub language: Language,
    /// Explicit "talk to me in ..." request, if any
    pub language_preference: Option<Language>,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            intent: Intent::General,
            emotion: Emotion::Neutral,
            polarity: 0.0,
            is_question_like: false,
            language: Language::English,
            language_preference: None,
        }
    }
}

// Sentiment lexicon (word, polarity)
static SENTIMENT_LEXICON: &[(&str, f32)] = &[
    ("good", 0.7), ("great", 0.8), ("awesome", 1.0), ("amazing", 0.6),
    ("excellent", 1.0), ("wonderful", 1.0), ("fantastic", 0.4), ("best", 1.0),
    ("perfect", 1.0), ("nice", 0.6), ("happy", 0.8), ("love", 0.5),
    ("glad", 0.5), ("thanks", 0.2), ("cool", 0.35), ("fun", 0.3),
    ("incredible", 0.9), ("brilliant", 0.9), ("excited", 0.75), ("beautiful", 0.85),
    ("achha", 0.5), ("accha", 0.5), ("badhiya", 0.7), ("zabardast", 0.8),
    ("khush", 0.8), ("mast", 0.6), ("shandar", 0.8), ("kamaal", 0.9),
    ("bad", -0.7), ("terrible", -1.0), ("awful", -1.0), ("worst", -1.0),
    ("hate", -0.8), ("sad", -0.5), ("angry", -0.5), ("upset", -0.4),
    ("tired", -0.4), ("boring", -1.0), ("annoying", -0.8), ("horrible", -1.0),
    ("wrong", -0.5), ("problem", -0.2), ("stress", -0.3), ("lonely", -0.6),
    ("depressed", -0.8), ("frustrated", -0.7), ("disappointed", -0.75), ("broken", -0.4),
    ("bura", -0.7), ("ganda", -0.6), ("dukh", -0.6), ("udaas", -0.6),
    ("pareshan", -0.5), ("tension", -0.3), ("bekaar", -0.8), ("galat", -0.5),
];

static NEGATORS: &[&str] = &[
    "not", "never", "no", "don't", "dont", "isn't", "nahi", "nahin", "mat",
];

static INTENSIFIERS: &[&str] = &["very", "really", "so", "extremely", "too", "bahut", "kaafi", "ekdum"];

// Rule group 1: conversational
static SMALL_TALK_PHRASES: &[&str] = &[
    "how are you", "how do you do", "whats up", "what's up", "kaise ho", "kaisa hai",
    "kya haal hai", "what is your name", "whats your name", "what's your name", "your name",
    "who are you", "tum kaun ho", "aap kaun hain", "kaun ho tum", "tumhara naam", "aapka naam",
    "naam batao", "thank you", "thanks", "dhanyawad", "shukriya", "what can you do",
    "tum kya kar sakte ho", "good job", "well done", "tell me a joke", "joke", "mazak",
    "theek hai", "thik hai", "sahi hai", "okay", "ok", "bilkul", "haan", "kya chal raha",
    "kya ho raha", "train kar raha", "seekha raha", "busy hun", "kaam kar raha",
];

static GREETING_WORDS: &[&str] = &[
    "hello", "hi", "hey", "namaste", "namaskar", "greetings", "good morning",
    "good afternoon", "good evening",
];

// Rule group 2: question markers
static QUESTION_WORDS: &[&str] = &[
    "what", "when", "where", "who", "why", "how", "which", "kya", "kaise", "kab", "kahan",
    "kyun", "kyu", "kaun", "kitna",
];

static TIME_WORDS: &[&str] = &["time", "clock", "samay", "baje"];
static WEATHER_WORDS: &[&str] = &["weather", "temperature", "mausam", "raining", "barish"];
static MATH_WORDS: &[&str] = &["calculate", "math", "plus", "minus", "multiply", "divide", "jodo"];

// Rule group 3: domain commands, checked in this order
static TEACH_PHRASES: &[&str] = &[
    "teach jarvis", "learn this", "remember this", "sikhao", "sikh jao", "yaad rakho",
];
static STATS_PHRASES: &[&str] = &[
    "learning stats", "show stats", "memory stats", "kitna seekha", "adaptive stats",
];
static MEDIA_PHRASES: &[&str] = &[
    "open youtube", "youtube", "yt", "play video", "pause video", "stop video", "video chalao",
    "video roko", "play", "pause",
];
static SEARCH_PHRASES: &[&str] = &[
    "search for", "search", "google", "look up", "find", "search karo",
];
static OPEN_WORDS: &[&str] = &["open", "launch", "start", "run", "kholo", "chalu karo"];
static CLOSE_WORDS: &[&str] = &["close", "exit", "quit", "band karo", "band"];
static REALTIME_WORDS: &[&str] = &[
    "news", "headlines", "latest", "election", "chunav", "breaking", "winner",
];

// Rule group 4: emotional expression
static EMOTIONAL_WORDS: &[&str] = &[
    "feel", "feeling", "mood", "emotion", "sad", "happy", "upset", "lonely", "udaas", "khush",
];

// Language detection markers (romanized Hindi)
static HINDI_MARKERS: &[&str] = &[
    "kya", "hai", "hain", "kaise", "kahan", "kab", "kyun", "kaun", "kitna", "samay", "bata",
    "batao", "karo", "kijiye", "kholo", "band", "chalu", "namaste", "namaskar", "aap", "aapka",
    "mera", "meri", "main", "hum", "tum", "tumhara", "yeh", "woh", "achha", "accha", "bura",
    "theek", "sahi", "galat", "madad", "mein", "nahi", "nahin", "hun", "ho", "raha", "rahe",
    "naam", "mujhe", "kuch", "bhi", "aur",
];

// Explicit language switch requests
static HINDI_PREFERENCE: &[&str] = &[
    "hindi mein", "hindi me", "in hindi", "speak hindi", "hindi bolo", "hindi main",
    "switch to hindi", "talk in hindi",
];
static ENGLISH_PREFERENCE: &[&str] = &[
    "english mein", "english me", "in english", "speak english", "english bolo",
    "switch to english", "talk in english", "angrezi mein",
];

/// Share of Hindi marker tokens that flags an utterance as Hindi
const HINDI_TOKEN_RATIO: f32 = 0.3;

/// Rule-based utterance classifier
#[derive(Debug, Clone, Default)]
pub struct UtteranceClassifier;

impl UtteranceClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an utterance. Never fails; empty text maps to `General`/neutral.
    pub fn classify(&self, text: &str) -> Classification {
        let toks = tokens(text);
        if toks.is_empty() {
            return Classification::default();
        }

        let polarity = self.polarity(&toks);
        let is_question_like = contains_any(&toks, QUESTION_WORDS) || text.trim().ends_with('?');

        Classification {
            intent: self.intent(text, &toks, is_question_like),
            emotion: Emotion::from_polarity(polarity),
            polarity,
            is_question_like,
            language: Self::detect_language(&toks),
            language_preference: Self::language_preference(&toks),
        }
    }

    /// Lexicon sentiment polarity in [-1, 1]
    pub fn polarity(&self, toks: &[String]) -> f32 {
        let mut total = 0.0f32;
        let mut scored = 0usize;

        for (i, tok) in toks.iter().enumerate() {
            let Some(&(_, base)) = SENTIMENT_LEXICON.iter().find(|(w, _)| *w == tok.as_str()) else {
                continue;
            };

            let mut score = base;
            if i > 0 && INTENSIFIERS.contains(&toks[i - 1].as_str()) {
                score = (score * 1.3).clamp(-1.0, 1.0);
            }
            let window_start = i.saturating_sub(2);
            if toks[window_start..i].iter().any(|t| NEGATORS.contains(&t.as_str())) {
                score *= -0.5;
            }

            total += score;
            scored += 1;
        }

        if scored == 0 {
            0.0
        } else {
            total / scored as f32
        }
    }

    fn intent(&self, raw: &str, toks: &[String], is_question_like: bool) -> Intent {
        // Group 1: conversational
        if contains_any(toks, SMALL_TALK_PHRASES) {
            return Intent::Conversation;
        }
        if contains_any(toks, GREETING_WORDS) {
            return Intent::Greeting;
        }

        // Group 2: question markers
        if is_question_like {
            return if contains_any(toks, TIME_WORDS) {
                Intent::TimeQuery
            } else if contains_any(toks, WEATHER_WORDS) {
                Intent::WeatherQuery
            } else if contains_any(toks, MATH_WORDS) || raw.contains('+') {
                Intent::Calculation
            } else {
                Intent::Question
            };
        }

        // Group 3: domain commands
        if contains_any(toks, TEACH_PHRASES) {
            return Intent::Teach;
        }
        if contains_any(toks, STATS_PHRASES) {
            return Intent::LearningStats;
        }
        if contains_any(toks, MEDIA_PHRASES) {
            return Intent::MediaControl;
        }
        if contains_any(toks, SEARCH_PHRASES) {
            return Intent::WebSearch;
        }
        if contains_any(toks, CLOSE_WORDS) {
            return Intent::CloseApp;
        }
        if contains_any(toks, OPEN_WORDS) {
            return Intent::OpenApp;
        }
        if contains_any(toks, REALTIME_WORDS) {
            return Intent::RealTimeSearch;
        }
        if raw.contains('+') || contains_any(toks, MATH_WORDS) {
            return Intent::Calculation;
        }

        // Group 4: emotional expression
        if contains_any(toks, EMOTIONAL_WORDS) {
            return Intent::EmotionalExpression;
        }

        Intent::General
    }

    /// Per-utterance language by marker-token share
    pub fn detect_language(toks: &[String]) -> Language {
        if toks.is_empty() {
            return Language::English;
        }
        let hits = toks
            .iter()
            .filter(|t| HINDI_MARKERS.contains(&t.as_str()))
            .count();
        if hits as f32 / toks.len() as f32 >= HINDI_TOKEN_RATIO {
            Language::Hindi
        } else {
            Language::English
        }
    }

    /// Explicit request to switch response language
    pub fn language_preference(toks: &[String]) -> Option<Language> {
        if contains_any(toks, HINDI_PREFERENCE) {
            Some(Language::Hindi)
        } else if contains_any(toks, ENGLISH_PREFERENCE) {
            Some(Language::English)
        } else {
            None
        }
    }
}
