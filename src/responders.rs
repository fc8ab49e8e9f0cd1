//! Intent Responders
//!
//! One reply builder per intent, selected by an exhaustive match so a new
//! intent cannot be added without deciding how it is answered. A responder
//! returning `None` declines and the pipeline falls through.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::{Classification, Intent, Language};
use crate::knowledge::KnowledgeStore;
use crate::learning::LearningStats;
use crate::predictor::IntentPredictor;
use crate::templates;
use crate::tokenizer::contains_any;

static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

static ADDITION_WORDS: &[&str] = &["plus", "add", "sum", "jodo", "jod"];

static OPEN_VERBS: &[&str] = &["open", "launch", "start", "run", "kholo", "chalu"];
static CLOSE_VERBS: &[&str] = &["close", "quit", "exit", "kill", "band", "bandh", "shut"];
static SEARCH_VERBS: &[&str] = &["search", "google", "find", "look", "dhundo"];
static FILLER_WORDS: &[&str] = &[
    "the", "a", "an", "for", "up", "down", "on", "about", "please", "karo", "kar", "do",
];

/// Everything a responder may read
pub struct ResponderInput<'a> {
    pub text: &'a str,
    pub tokens: &'a [String],
    pub classification: &'a Classification,
    pub language: Language,
    pub honorific: &'a str,
    pub knowledge: &'a KnowledgeStore,
    pub predictor: &'a IntentPredictor,
}

/// Reply for `intent`, or `None` to decline
pub fn respond(intent: Intent, input: &ResponderInput<'_>) -> Option<String> {
    let lang = input.language;
    let fixed = |text: &str| Some(templates::personalize(text, input.honorific));
    let ack = |action: String| Some(templates::action_ack(&action, lang, input.honorific));

    match intent {
        Intent::Greeting => fixed(templates::greeting_now(lang)),
        Intent::TimeQuery => Some(templates::current_time(lang)),
        Intent::Calculation => Some(calculate(input.text, input.tokens, lang, input.honorific)),
        Intent::EmotionalExpression => {
            fixed(templates::emotional_reply(input.classification.emotion))
        }
        Intent::Conversation => {
            let (topic, forced) = templates::match_small_talk(input.tokens)?;
            fixed(templates::small_talk_reply(topic, forced.unwrap_or(lang)))
        }
        Intent::WeatherQuery => fixed(templates::weather_unavailable(lang)),
        Intent::OpenApp => ack(format!("Opening {}.", target_after(input.tokens, OPEN_VERBS)?)),
        Intent::CloseApp => ack(format!("Closing {}.", target_after(input.tokens, CLOSE_VERBS)?)),
        Intent::WebSearch => ack(format!(
            "Searching the web for {}.",
            target_after(input.tokens, SEARCH_VERBS)?
        )),
        Intent::RealTimeSearch => ack(format!("Looking up the latest on {}.", input.text.trim())),
        Intent::MediaControl => ack(format!("Media command: {}.", input.text.trim())),
        Intent::LearningStats => {
            let summary = LearningStats::collect(input.knowledge, input.predictor).summary(lang);
            fixed(summary.as_str())
        }
        Intent::Question | Intent::General | Intent::Teach => None,
    }
}

/// Sum every number in an addition; anything else is declined politely
fn calculate(text: &str, tokens: &[String], language: Language, honorific: &str) -> String {
    let numbers: Vec<f64> = NUMBER_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    let is_addition = text.contains('+') || contains_any(tokens, ADDITION_WORDS);
    if is_addition && numbers.len() >= 2 {
        templates::calculation_result(numbers.iter().sum(), language)
    } else {
        templates::personalize(templates::only_addition(language), honorific)
    }
}

/// Words following the first command verb, minus filler
fn target_after(tokens: &[String], verbs: &[&str]) -> Option<String> {
    let pos = tokens.iter().position(|t| verbs.contains(&t.as_str()))?;
    let target: Vec<&str> = tokens[pos + 1..]
        .iter()
        .map(String::as_str)
        .filter(|t| !FILLER_WORDS.contains(t) && !verbs.contains(t))
        .collect();
    if target.is_empty() {
        // Hinglish puts the verb last: "chrome kholo"
        let before: Vec<&str> = tokens[..pos]
            .iter()
            .map(String::as_str)
            .filter(|t| !FILLER_WORDS.contains(t))
            .collect();
        if before.is_empty() {
            return None;
        }
        return Some(before.join(" "));
    }
    Some(target.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokens;

    #[test]
    fn test_calculate_addition() {
        let t = tokens("what is 2 + 3");
        assert_eq!(calculate("what is 2 + 3", &t, Language::English, "Sir"), "The answer is 5");

        let t = tokens("add 1.5 and 2");
        assert_eq!(calculate("add 1.5 and 2", &t, Language::English, "Sir"), "The answer is 3.5");
    }

    #[test]
    fn test_calculate_rejects_other_operators() {
        let t = tokens("what is 6 * 7");
        assert_eq!(
            calculate("what is 6 * 7", &t, Language::English, "Sir"),
            templates::only_addition(Language::English)
        );
    }

    #[test]
    fn test_target_after() {
        assert_eq!(
            target_after(&tokens("please open the chrome browser"), OPEN_VERBS).as_deref(),
            Some("chrome browser")
        );
        assert_eq!(
            target_after(&tokens("chrome kholo"), OPEN_VERBS).as_deref(),
            Some("chrome")
        );
        assert!(target_after(&tokens("open"), OPEN_VERBS).is_none());
    }

    #[test]
    fn test_calculate_large_sum_does_not_saturate() {
        let text = "what is 10000000000000000000 + 1";
        let reply = calculate(text, &tokens(text), Language::English, "Sir");
        assert_eq!(reply, "The answer is 10000000000000000000");
    }
}
