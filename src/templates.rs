//! Localized Response Templates
//!
//! Fixed English / Hindi (romanized) phrasing used by the pipeline stages.

use chrono::Timelike;
use rand::seq::SliceRandom;

use crate::classifier::{Emotion, Language};
use crate::tokenizer::contains_any;

/// Pick one line from a pool
pub fn pick(pool: &[&'static str]) -> &'static str {
    pool.choose(&mut rand::thread_rng()).copied().unwrap_or("")
}

/// Localized pair of pools
struct Localized {
    english: &'static [&'static str],
    hindi: &'static [&'static str],
}

impl Localized {
    fn pick(&self, language: Language) -> &'static str {
        match language {
            Language::English => pick(self.english),
            Language::Hindi => pick(self.hindi),
        }
    }
}

/// Fixed small-talk topics answered before any learned data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallTalk {
    HowAreYou,
    Identity,
    ThankYou,
    Capabilities,
    Joke,
}

struct SmallTalkEntry {
    topic: SmallTalk,
    english_patterns: &'static [&'static str],
    hindi_patterns: &'static [&'static str],
    responses: Localized,
}

static SMALL_TALK: &[SmallTalkEntry] = &[
    SmallTalkEntry {
        topic: SmallTalk::HowAreYou,
        english_patterns: &["how are you", "how do you do", "how are things", "whats up", "what's up"],
        hindi_patterns: &["kaise ho", "kaisa hai", "kya haal hai", "kaise chal raha hai"],
        responses: Localized {
            english: &[
                "I'm doing excellent, Sir! Ready to assist you.",
                "I'm functioning perfectly, thank you for asking, Sir.",
                "All systems operational, Sir. How may I help you?",
            ],
            hindi: &[
                "Main bilkul theek hun, Sir! Aapki seva ke liye taiyar hun.",
                "Main bahut achha hun, Sir. Aap kaise hain?",
                "Sab kuch theek chal raha hai, Sir. Aapki kya madad kar sakta hun?",
            ],
        },
    },
    SmallTalkEntry {
        topic: SmallTalk::Identity,
        english_patterns: &["what is your name", "whats your name", "what's your name", "who are you", "your name"],
        hindi_patterns: &["tumhara naam", "aapka naam", "tum kaun ho", "kaun ho tum", "aap kaun hain", "naam batao"],
        responses: Localized {
            english: &[
                "I am JARVIS, your AI assistant, Sir.",
                "My name is JARVIS. Just A Rather Very Intelligent System, Sir.",
                "I'm JARVIS, at your service, Sir.",
            ],
            hindi: &[
                "Main JARVIS hun, aapka AI assistant, Sir.",
                "Mera naam JARVIS hai. Main aapka digital sahayak hun, Sir.",
                "Main JARVIS hun, aapki seva mein, Sir.",
            ],
        },
    },
    SmallTalkEntry {
        topic: SmallTalk::ThankYou,
        english_patterns: &["thank you", "thanks", "appreciate it"],
        hindi_patterns: &["dhanyawad", "shukriya"],
        responses: Localized {
            english: &["You're most welcome, Sir!", "My pleasure to help, Sir.", "Glad I could help, Sir!"],
            hindi: &["Aapka swagat hai, Sir!", "Koi baat nahi, Sir. Madad karna mera kaam hai."],
        },
    },
    SmallTalkEntry {
        topic: SmallTalk::Capabilities,
        english_patterns: &["what can you do", "your capabilities", "what do you know"],
        hindi_patterns: &["tum kya kar sakte ho", "kya madad kar sakte ho"],
        responses: Localized {
            english: &[
                "I can open apps, tell the time, do simple sums, search the web and learn from our conversations, Sir.",
                "I answer questions, control applications and remember whatever you teach me, Sir.",
            ],
            hindi: &[
                "Main apps khol sakta hun, samay bata sakta hun, aur aapse seekh sakta hun, Sir.",
                "Main sawalon ke jawab de sakta hun aur jo aap sikhayenge woh yaad rakhta hun, Sir.",
            ],
        },
    },
    SmallTalkEntry {
        topic: SmallTalk::Joke,
        english_patterns: &["tell me a joke", "make me laugh", "joke"],
        hindi_patterns: &["joke sunao", "mazak karo", "hasao"],
        responses: Localized {
            english: &[
                "Why don't scientists trust atoms? Because they make up everything, Sir!",
                "Why do programmers prefer dark mode? Because light attracts bugs, Sir!",
            ],
            hindi: &[
                "Ek computer doctor ke paas gaya aur bola - Doctor sahab, mujhe virus ho gaya hai! Sir!",
                "Ek smartphone dusre se bola - Yaar, meri battery low hai. Dusra bola - Koi baat nahi, main bhi charge pe hun! Sir!",
            ],
        },
    },
];

/// Match a fixed small-talk topic. A Hindi pattern forces a Hindi reply.
pub fn match_small_talk(tokens: &[String]) -> Option<(SmallTalk, Option<Language>)> {
    for entry in SMALL_TALK {
        if contains_any(tokens, entry.english_patterns) {
            return Some((entry.topic, None));
        }
        if contains_any(tokens, entry.hindi_patterns) {
            return Some((entry.topic, Some(Language::Hindi)));
        }
    }
    None
}

pub fn small_talk_reply(topic: SmallTalk, language: Language) -> &'static str {
    SMALL_TALK
        .iter()
        .find(|e| e.topic == topic)
        .map(|e| e.responses.pick(language))
        .unwrap_or("")
}

pub fn language_switched(language: Language) -> &'static str {
    match language {
        Language::Hindi => "Theek hai Sir, ab main Hindi mein jawab dunga.",
        Language::English => "Alright Sir, I'll respond in English now.",
    }
}

/// Generic fallback categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    Greeting,
    Question,
    Unknown,
}

static FALLBACK_GREETING: Localized = Localized {
    english: &[
        "Good to see you, Sir!",
        "At your service, Sir.",
        "How may I assist you today, Sir?",
    ],
    hindi: &["Namaste Sir! Kya kaam hai aaj?", "Hello Sir! Main aapki seva ke liye taiyar hun."],
};

static FALLBACK_QUESTION: Localized = Localized {
    english: &[
        "That's an interesting question, Sir. Let me think about that.",
        "I'm processing that information, Sir.",
        "Let me analyze that for you, Sir.",
    ],
    hindi: &[
        "Sir, yeh mujhe samajh nahi aaya. Kya aap explain kar sakte hain?",
        "Maaf kijiye Sir, yeh mujhe nahi pata. Aap bata sakte hain?",
    ],
};

static FALLBACK_UNKNOWN: Localized = Localized {
    english: &[
        "I don't know this yet, Sir.",
        "I don't know about this, Sir. Could you tell me more so I can learn?",
        "This topic is new to me, Sir.",
    ],
    hindi: &[
        "Sir, yeh mujhe nahi aata.",
        "Sir, main iske baare mein nahi jaanta.",
        "Yeh topic mujhe naya hai, Sir.",
    ],
};

pub fn fallback(kind: FallbackKind, language: Language) -> &'static str {
    match kind {
        FallbackKind::Greeting => FALLBACK_GREETING.pick(language),
        FallbackKind::Question => FALLBACK_QUESTION.pick(language),
        FallbackKind::Unknown => FALLBACK_UNKNOWN.pick(language),
    }
}

pub fn teach_prompt(language: Language) -> &'static str {
    match language {
        Language::English => "Can you teach me? If you tell me, I'll remember it for next time, Sir.",
        Language::Hindi => "Kya aap mujhe sikha sakte hain? Agar aap bata denge to main yaad rakh lunga, Sir.",
    }
}

// Replies below embed user text verbatim, so the honorific goes in as an
// argument instead of through `personalize`.

pub fn teach_confirmation(
    question: &str,
    answer: &str,
    language: Language,
    honorific: &str,
) -> String {
    match language {
        Language::English => format!(
            "Thank you, {}! I've learned that '{}' means '{}'. I'll remember this for next time.",
            honorific, question, answer
        ),
        Language::Hindi => format!(
            "Dhanyawad {}! Maine '{}' ka jawab yaad rakh liya: '{}'. Agli baar main yeh answer dunga.",
            honorific, question, answer
        ),
    }
}

pub fn taught_recall(answer: &str, language: Language, honorific: &str) -> String {
    match language {
        Language::English => format!("I remember, {}! {}", honorific, answer),
        Language::Hindi => format!("Mujhe yaad hai, {}! {}", honorific, answer),
    }
}

/// Reply that references earlier occurrences of the same pattern
pub fn pattern_recall(
    keywords: &[String],
    frequency: u32,
    language: Language,
    honorific: &str,
) -> String {
    let topic = if keywords.is_empty() {
        "this".to_string()
    } else {
        keywords.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
    };
    match language {
        Language::English => format!(
            "I remember you asking about {} before, {}. That makes {} time{} now.",
            topic,
            honorific,
            frequency + 1,
            if frequency == 0 { "" } else { "s" }
        ),
        Language::Hindi => format!(
            "Mujhe yaad hai, {}, aap pehle bhi {} ke baare mein puch rahe the.",
            honorific, topic
        ),
    }
}

/// Reply seeded from the most recent similar utterance
pub fn similar_recall(previous_input: &str, language: Language, honorific: &str) -> String {
    let seed: String = previous_input.chars().take(30).collect();
    match language {
        Language::English => format!(
            "This reminds me of when you asked about {}..., {}.",
            seed, honorific
        ),
        Language::Hindi => format!(
            "Yeh mujhe yaad dilata hai jab aapne {}... ke baare mein pucha tha, {}.",
            seed, honorific
        ),
    }
}

pub fn association_hint(word: &str, associated: &str) -> String {
    format!(" I notice you often mention {} with {}.", associated, word)
}

/// Prefix a reply with an emotion-aware opener
pub fn enhance(base: &str, emotion: Emotion) -> String {
    match emotion {
        Emotion::Excited => format!("I can sense your excitement! {}", base),
        Emotion::Sad => format!("I understand this might be difficult. {}", base),
        Emotion::Negative => format!("I hear your concern. {}", base),
        Emotion::Positive => format!("I'm glad to help with that! {}", base),
        Emotion::Neutral => base.to_string(),
    }
}

/// Time-of-day greeting for the given hour
pub fn greeting_for_hour(hour: u32, language: Language) -> &'static str {
    match (language, hour) {
        (Language::English, 5..=11) => "Good morning, Sir!",
        (Language::English, 12..=16) => "Good afternoon, Sir!",
        (Language::English, 17..=21) => "Good evening, Sir! How may I assist you today?",
        (Language::English, _) => "Good evening, Sir! Working late tonight?",
        (Language::Hindi, 5..=11) => "Namaste Sir! Aapka din shubh ho.",
        (Language::Hindi, 12..=16) => "Namaste Sir! Aapka din kaisa ja raha hai?",
        (Language::Hindi, 17..=21) => "Namaste Sir! Aaj main aapki kya seva kar sakta hun?",
        (Language::Hindi, _) => "Namaste Sir! Raat mein kaam kar rahe hain?",
    }
}

pub fn greeting_now(language: Language) -> &'static str {
    greeting_for_hour(chrono::Local::now().hour(), language)
}

pub fn current_time(language: Language) -> String {
    let now = chrono::Local::now().format("%H:%M");
    match language {
        Language::English => format!("The current time is {}", now),
        Language::Hindi => format!("Abhi samay hai {}", now),
    }
}

pub fn calculation_result(result: f64, language: Language) -> String {
    let shown = if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        format!("{}", result as i64)
    } else {
        format!("{}", result)
    };
    match language {
        Language::English => format!("The answer is {}", shown),
        Language::Hindi => format!("Jawab hai {}", shown),
    }
}

pub fn only_addition(language: Language) -> &'static str {
    match language {
        Language::English => "I can only handle addition for now, Sir.",
        Language::Hindi => "Abhi main sirf jodna kar sakta hun, Sir.",
    }
}

pub fn emotional_reply(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Sad => "I'm sorry you're feeling down, Sir. Remember, I'm here to help in any way I can.",
        Emotion::Excited => "Your enthusiasm is wonderful, Sir! What's got you so excited?",
        Emotion::Negative => "I can sense your frustration, Sir. Let's see how we can make things better.",
        Emotion::Positive | Emotion::Neutral => "I appreciate you sharing your feelings with me, Sir.",
    }
}

pub fn weather_unavailable(language: Language) -> &'static str {
    match language {
        Language::English => "I don't have access to weather data yet, Sir. But I'm learning!",
        Language::Hindi => "Abhi mausam ki jankari nahi hai mere paas, Sir. Lekin main seekh raha hun!",
    }
}

pub fn action_ack(action: &str, language: Language, honorific: &str) -> String {
    match language {
        Language::English => format!("On it, {}. {}", honorific, action),
        Language::Hindi => format!("Abhi karta hun, {}. {}", honorific, action),
    }
}

/// Swap the default honorific in a fixed template. Never pass user text.
pub fn personalize(text: &str, honorific: &str) -> String {
    if honorific == "Sir" {
        text.to_string()
    } else {
        text.replace("Sir", honorific)
    }
}
