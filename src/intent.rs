//! Intent classification
//!
//! Routes small talk away from the SQL pipeline before any schema read or
//! text-generation call happens. Exact literal membership after lowercasing
//! and trimming; no fuzzy matching.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmallTalk {
    Greeting,
    Acknowledgement,
    Thanks,
    Farewell,
    Filler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Conversational(SmallTalk),
    DataQuery,
}

impl Intent {
    pub fn is_conversational(&self) -> bool {
        matches!(self, Intent::Conversational(_))
    }
}

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "yo", "hola", "namaste", "sup",
    "good morning", "good afternoon", "good evening",
];

const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok", "okay", "k", "kk", "alright", "fine", "cool", "got it",
    "understood", "roger", "sure", "done",
];

const THANKS: &[&str] = &[
    "thanks", "thank you", "thx", "ty", "thanks a lot", "thank you so much",
    "much appreciated", "cheers",
];

const FAREWELLS: &[&str] = &[
    "bye", "goodbye", "see ya", "see you", "take care", "later",
    "catch you later", "cya", "gn", "good night",
];

const FILLER: &[&str] = &[
    "hmm", "hmmm", "hahaha", "lol", "haha", "nice", "great", "cool beans",
];

pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn classify(raw: &str) -> Intent {
    let text = normalize(raw);
    let table: [(&[&str], SmallTalk); 5] = [
        (GREETINGS, SmallTalk::Greeting),
        (ACKNOWLEDGEMENTS, SmallTalk::Acknowledgement),
        (THANKS, SmallTalk::Thanks),
        (FAREWELLS, SmallTalk::Farewell),
        (FILLER, SmallTalk::Filler),
    ];
    table
        .iter()
        .find(|(phrases, _)| phrases.contains(&text.as_str()))
        .map(|(_, kind)| Intent::Conversational(*kind))
        .unwrap_or(Intent::DataQuery)
}

/// Reply shown for small talk instead of SQL.
pub fn acknowledgement(kind: SmallTalk) -> &'static str {
    match kind {
        SmallTalk::Greeting => "Hello! Ask me anything about your connected database.",
        SmallTalk::Acknowledgement => "Got it. Ask a question about your data whenever you're ready.",
        SmallTalk::Thanks => "You're welcome! Let me know if you have more questions about your data.",
        SmallTalk::Farewell => "Goodbye! Come back any time you want to explore your data.",
        SmallTalk::Filler => "I'm here whenever you want to ask something about your database.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_phrases_are_conversational() {
        assert_eq!(classify("thanks"), Intent::Conversational(SmallTalk::Thanks));
        assert_eq!(classify("  Good Morning "), Intent::Conversational(SmallTalk::Greeting));
        assert_eq!(classify("cool beans"), Intent::Conversational(SmallTalk::Filler));
        assert_eq!(classify("CYA"), Intent::Conversational(SmallTalk::Farewell));
        assert_eq!(classify("kk"), Intent::Conversational(SmallTalk::Acknowledgement));
    }

    #[test]
    fn punctuation_breaks_exact_match() {
        assert_eq!(normalize("  Thanks!  "), "thanks!");
        assert_eq!(classify("  Thanks!  "), Intent::DataQuery);
    }

    #[test]
    fn questions_are_data_queries() {
        assert_eq!(classify("how many students are enrolled"), Intent::DataQuery);
        assert_eq!(classify("hello, show me the orders table"), Intent::DataQuery);
        assert_eq!(classify(""), Intent::DataQuery);
        assert!(!classify("list all tables").is_conversational());
        assert!(classify("hey").is_conversational());
    }

    #[test]
    fn phrase_sets_do_not_overlap() {
        let all: Vec<&str> = [GREETINGS, ACKNOWLEDGEMENTS, THANKS, FAREWELLS, FILLER].concat();
        let mut unique = all.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(all.len(), unique.len());
    }
}
