//! Routing keys and topic-pattern matching.
//!
//! Routing keys are dotted words such as `log.INFO`. Binding patterns follow the
//! AMQP topic exchange rules:
//!
//! - `*` matches exactly one word
//! - `#` matches zero or more words
//! - any other word matches itself literally

use std::fmt;

/// Name of the topic exchange carrying all event traffic.
pub const EXCHANGE_NAME: &str = "logs_topic";

/// Routing keys a listener binds to when no topics are configured.
pub const DEFAULT_TOPICS: [&str; 3] = ["log.INFO", "log.WARNING", "log.ERROR"];

/// Log severities with a dedicated routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// `log.INFO`
    Info,
    /// `log.WARNING`
    Warning,
    /// `log.ERROR`
    Error,
}

impl Severity {
    /// Routing key used when publishing at this severity.
    #[must_use]
    pub const fn routing_key(self) -> &'static str {
        match self {
            Self::Info => "log.INFO",
            Self::Warning => "log.WARNING",
            Self::Error => "log.ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.routing_key())
    }
}

/// Check whether `routing_key` matches the binding `pattern`.
///
/// # Example
///
/// ```
/// use event_relay_core::routing::topic_matches;
///
/// assert!(topic_matches("log.*", "log.INFO"));
/// assert!(topic_matches("#", "log.INFO"));
/// assert!(!topic_matches("log.INFO", "log.DEBUG"));
/// ```
#[must_use]
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // `#` swallows zero words, or one word and stays in place
            matches_words(rest, key) || (!key.is_empty() && matches_words(pattern, &key[1..]))
        }
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && matches_words(rest, tail),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exact_keys() {
        assert!(topic_matches("log.INFO", "log.INFO"));
        assert!(!topic_matches("log.INFO", "log.DEBUG"));
        assert!(!topic_matches("log.INFO", "log.INFO.extra"));
    }

    #[test]
    fn star_matches_one_word() {
        assert!(topic_matches("log.*", "log.ERROR"));
        assert!(!topic_matches("log.*", "log"));
        assert!(!topic_matches("log.*", "log.a.b"));
        assert!(topic_matches("*.INFO", "auth.INFO"));
    }

    #[test]
    fn hash_matches_zero_or_more_words() {
        assert!(topic_matches("log.#", "log"));
        assert!(topic_matches("log.#", "log.a.b.c"));
        assert!(topic_matches("#.ERROR", "log.ERROR"));
        assert!(topic_matches("#", ""));
        assert!(!topic_matches("log.#", "auth.INFO"));
    }

    #[test]
    fn severity_keys_are_the_default_topics() {
        let keys = [Severity::Info, Severity::Warning, Severity::Error].map(Severity::routing_key);
        assert_eq!(keys, DEFAULT_TOPICS);
    }

    proptest! {
        #[test]
        fn a_key_always_matches_itself(words in prop::collection::vec("[a-zA-Z]{1,8}", 1..5)) {
            let key = words.join(".");
            prop_assert!(topic_matches(&key, &key));
        }

        #[test]
        fn hash_matches_everything(words in prop::collection::vec("[a-zA-Z]{1,8}", 0..5)) {
            prop_assert!(topic_matches("#", &words.join(".")));
        }

        #[test]
        fn star_requires_equal_word_count(words in prop::collection::vec("[a-zA-Z]{1,8}", 1..5)) {
            let pattern = vec!["*"; words.len()].join(".");
            prop_assert!(topic_matches(&pattern, &words.join(".")));
            let longer = format!("{}.extra", words.join("."));
            prop_assert!(!topic_matches(&pattern, &longer));
        }
    }
}
