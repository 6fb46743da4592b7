//! Topic patterns and matching.
//!
//! Subscribers express interest either with a plain regular expression or with
//! an MQTT-style wildcard topic. Both compile down to a [`TopicMatcher`] that is
//! tested against literal published topics, anchored at the start of the topic.

use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// MQTT topic level separator.
pub const LEVEL_SEPARATOR: char = '/';

/// Matches exactly one topic level.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Matches the remainder of a topic. Only valid as the last level.
pub const MULTI_LEVEL_WILDCARD: &str = "#";

const SINGLE_LEVEL_GROUP: &str = "([^/]*)";
const MULTI_LEVEL_GROUP: &str = "(.*)";

/// Pattern compilation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternError {
    /// `#` used anywhere but the last level of an MQTT topic.
    #[error("Multi-level wildcard must be the last level: '{topic}' has '#' at level {level}")]
    MisplacedMultiLevelWildcard {
        /// The offending MQTT topic.
        topic: String,
        /// Zero-based level index of the misplaced `#`.
        level: usize,
    },

    /// The pattern is not a valid regular expression.
    #[error("Invalid topic pattern '{pattern}': {source}")]
    InvalidRegex {
        /// Regex source that failed to compile.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// An MQTT-style wildcard topic such as `sensors/+/temperature/#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MqttTopic(String);

impl MqttTopic {
    /// Wrap a wildcard topic. Validation happens on translation.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Get the topic as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Translate the wildcard topic into regex source.
    ///
    /// `+` levels become `([^/]*)`, a trailing `#` becomes `(.*)` and anchors
    /// the pattern with `$`. Every other level is kept as is.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::MisplacedMultiLevelWildcard`] if `#` is not the
    /// last level.
    pub fn as_regex(&self) -> Result<String, PatternError> {
        let levels: Vec<&str> = self.0.split(LEVEL_SEPARATOR).collect();
        let last = levels.len() - 1;
        let mut anchored = false;

        let mut translated = Vec::with_capacity(levels.len());
        for (level, segment) in levels.into_iter().enumerate() {
            match segment {
                SINGLE_LEVEL_WILDCARD => translated.push(SINGLE_LEVEL_GROUP),
                MULTI_LEVEL_WILDCARD if level == last => {
                    translated.push(MULTI_LEVEL_GROUP);
                    anchored = true;
                }
                MULTI_LEVEL_WILDCARD => {
                    return Err(PatternError::MisplacedMultiLevelWildcard {
                        topic: self.0.clone(),
                        level,
                    });
                }
                literal => translated.push(literal),
            }
        }

        let mut regex = translated.join("/");
        if anchored {
            regex.push('$');
        }
        Ok(regex)
    }
}

impl fmt::Display for MqttTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subscription pattern.
///
/// Two patterns are equal when their text is equal, whatever their kind. This
/// is the identity used by `unsubscribe`.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// A regular expression matched against the start of the topic.
    Regex(String),
    /// An MQTT wildcard topic, translated to a regular expression.
    Mqtt(MqttTopic),
}

impl Pattern {
    /// Get the pattern text as written by the subscriber.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Regex(source) => source,
            Self::Mqtt(topic) => topic.as_str(),
        }
    }

    /// Regex source for this pattern.
    fn regex_source(&self) -> Result<String, PatternError> {
        match self {
            Self::Regex(source) => Ok(source.clone()),
            Self::Mqtt(topic) => topic.as_regex(),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Self::Regex(source.to_string())
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self::Regex(source)
    }
}

impl From<&String> for Pattern {
    fn from(source: &String) -> Self {
        Self::Regex(source.clone())
    }
}

impl From<MqttTopic> for Pattern {
    fn from(topic: MqttTopic) -> Self {
        Self::Mqtt(topic)
    }
}

impl From<&MqttTopic> for Pattern {
    fn from(topic: &MqttTopic) -> Self {
        Self::Mqtt(topic.clone())
    }
}

/// A compiled subscription pattern.
#[derive(Debug, Clone)]
pub struct TopicMatcher {
    pattern: Pattern,
    source: Arc<str>,
    regex: Regex,
}

impl TopicMatcher {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if an MQTT topic misplaces `#` or the resulting regex
    /// is invalid.
    pub fn compile(pattern: impl Into<Pattern>) -> Result<Self, PatternError> {
        let pattern = pattern.into();
        let source = pattern.regex_source()?;

        // Only the start is anchored; the end is anchored by an explicit `$`.
        let regex = Regex::new(&format!("^(?:{source})")).map_err(|e| {
            PatternError::InvalidRegex {
                pattern: source.clone(),
                source: e,
            }
        })?;

        Ok(Self {
            pattern,
            source: source.into(),
            regex,
        })
    }

    /// Get the pattern this matcher was compiled from.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Get the regex source, after MQTT translation.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check whether a topic matches without capturing groups.
    #[must_use]
    pub fn is_match(&self, topic: &str) -> bool {
        self.regex.is_match(topic)
    }

    /// Match a published topic.
    #[must_use]
    pub fn matches(&self, topic: &str) -> Option<TopicMatch> {
        let captures = self.regex.captures(topic)?;
        Some(TopicMatch {
            topic: topic.into(),
            pattern: Arc::clone(&self.source),
            spans: captures.iter().map(|m| m.map(|m| m.range())).collect(),
        })
    }
}

/// The result of matching a topic against a [`TopicMatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicMatch {
    topic: Arc<str>,
    pattern: Arc<str>,
    /// Group 0 is the whole match.
    spans: Vec<Option<Range<usize>>>,
}

impl TopicMatch {
    /// Get the published topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Get the regex source that produced this match.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Get the matched portion of the topic.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.group(0).unwrap_or_default()
    }

    /// Get a capture group. Group 0 is the whole match.
    ///
    /// Returns `None` for groups that did not participate or do not exist.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        self.spans
            .get(index)
            .and_then(|span| span.clone())
            .map(|span| &self.topic[span])
    }

    /// Get all capture groups, excluding the whole match.
    #[must_use]
    pub fn groups(&self) -> Vec<Option<&str>> {
        (1..self.spans.len()).map(|i| self.group(i)).collect()
    }
}
