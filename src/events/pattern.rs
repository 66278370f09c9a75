//! # Topic patterns used by bulk removal.
//!
//! Patterns are parsed once when a removal is requested and then evaluated as a
//! plain predicate over topic names; the emit path never looks at patterns.
//!
//! | Input      | Pattern                  | Matches                        |
//! |------------|--------------------------|--------------------------------|
//! | `"*"`      | [`TopicPattern::Wildcard`] | the wildcard listener list     |
//! | `"net:*"`  | [`TopicPattern::Prefix`]   | every topic starting with `net:` |
//! | `"net:up"` | [`TopicPattern::Exact`]    | exactly `net:up`               |

/// The wildcard topic name.
pub const WILDCARD: &str = "*";

/// Parsed topic selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicPattern {
    /// The wildcard list itself.
    Wildcard,
    /// All topics whose name starts with the prefix.
    Prefix(String),
    /// A single topic.
    Exact(String),
}

impl TopicPattern {
    /// Parses a selector; only a trailing `*` is special.
    ///
    /// # Example
    /// ```
    /// use capcore::TopicPattern;
    ///
    /// assert_eq!(TopicPattern::parse("*"), TopicPattern::Wildcard);
    /// assert_eq!(TopicPattern::parse("battery:*"), TopicPattern::Prefix("battery:".into()));
    /// assert!(TopicPattern::parse("battery:*").matches("battery:level"));
    /// ```
    pub fn parse(raw: &str) -> Self {
        if raw == WILDCARD {
            TopicPattern::Wildcard
        } else if let Some(prefix) = raw.strip_suffix('*') {
            TopicPattern::Prefix(prefix.to_string())
        } else {
            TopicPattern::Exact(raw.to_string())
        }
    }

    /// True when `topic` (a concrete topic name) is selected by this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Wildcard => topic == WILDCARD,
            TopicPattern::Prefix(prefix) => topic.starts_with(prefix.as_str()),
            TopicPattern::Exact(name) => topic == name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_trailing_star_is_a_prefix() {
        assert_eq!(TopicPattern::parse("a*b"), TopicPattern::Exact("a*b".into()));
        assert_eq!(TopicPattern::parse("ab*"), TopicPattern::Prefix("ab".into()));
    }

    #[test]
    fn prefix_matches_and_rejects() {
        let p = TopicPattern::parse("net:*");
        assert!(p.matches("net:online"));
        assert!(p.matches("net:"));
        assert!(!p.matches("network"));
    }
}
