//! Processing strategies for the hot branch
//!
//! A strategy is selected once per invocation from [`Mode`] and owned by a
//! single engine run. Item-based strategies process one sample string per
//! iteration; the numeric strategy takes no items and lets the engine derive
//! the hot branch from the iteration index.

use fnv::FnvHashMap;
use regex::Regex;

use crate::params::Mode;

/// Fixed sample cycle fed to item-based strategies, indexed by `i % len`
///
/// Contains malformed and non-object entries on purpose so the tolerant
/// parse path is exercised on every cycle.
pub const SAMPLE_INPUTS: [&str; 8] = [
    r#"{"user":"alice","id":1}"#,
    r#"{"user":"bob","id":2,"admin":true}"#,
    r#"{"event":"login","ts":1700000000,"ok":true,"tags":["web"]}"#,
    r#"{"user":"carol"}"#,
    r#"{"user":"dave","id":4,"meta":{"a":1,"b":2}}"#,
    r#"{not valid json"#,
    r#"[1,2,3]"#,
    r#"{"user":"erin","id":5,"region":"eu","tier":"gold","beta":false}"#,
];

/// Pattern tested by the match strategy
pub const MATCH_PATTERN: &str = r#"^\{"user":"[a-z]+","id":\d+"#;

/// One "process an input item" capability
pub trait ProcessingStrategy {
    /// Process one sample and return its score
    fn process(&mut self, input: &str) -> i64;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Counts top-level JSON object keys, memoized per exact input string
#[derive(Debug, Default)]
pub struct KeyCountStrategy {
    cache: FnvHashMap<String, i64>,
    parses: u64,
}

impl KeyCountStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inputs that were actually parsed (cache misses)
    pub fn parse_count(&self) -> u64 {
        self.parses
    }

    /// Number of distinct inputs held in the cache
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    // Malformed or non-object input counts as zero keys.
    fn count_keys(&mut self, input: &str) -> i64 {
        self.parses += 1;
        match serde_json::from_str::<serde_json::Value>(input) {
            Ok(serde_json::Value::Object(map)) => map.len() as i64,
            _ => 0,
        }
    }
}

impl ProcessingStrategy for KeyCountStrategy {
    fn process(&mut self, input: &str) -> i64 {
        if let Some(&count) = self.cache.get(input) {
            return count;
        }
        let count = self.count_keys(input);
        self.cache.insert(input.to_string(), count);
        count
    }

    fn name(&self) -> &'static str {
        "parse"
    }
}

/// Tests each input against [`MATCH_PATTERN`]; no caching
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    pattern: Regex,
}

impl PatternStrategy {
    pub fn new() -> Self {
        Self::with_pattern(MATCH_PATTERN).expect("MATCH_PATTERN is a valid regex")
    }

    /// Build a matcher for a custom pattern
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Default for PatternStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStrategy for PatternStrategy {
    fn process(&mut self, input: &str) -> i64 {
        i64::from(self.pattern.is_match(input))
    }

    fn name(&self) -> &'static str {
        "match"
    }
}

/// Item-based strategies, dispatched by tag
#[derive(Debug)]
pub enum ItemStrategy {
    KeyCount(KeyCountStrategy),
    Pattern(PatternStrategy),
}

impl ProcessingStrategy for ItemStrategy {
    #[inline]
    fn process(&mut self, input: &str) -> i64 {
        match self {
            ItemStrategy::KeyCount(s) => s.process(input),
            ItemStrategy::Pattern(s) => s.process(input),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ItemStrategy::KeyCount(s) => s.name(),
            ItemStrategy::Pattern(s) => s.name(),
        }
    }
}

/// Strategy selected for one engine run
#[derive(Debug)]
pub enum Strategy {
    /// No item input; hot branch comes from the iteration index
    Numeric,
    /// Hot branch comes from processing sample items
    Items(ItemStrategy),
}

impl Strategy {
    /// Construct the strategy for `mode`
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Numeric => Strategy::Numeric,
            Mode::Parse => Strategy::Items(ItemStrategy::KeyCount(KeyCountStrategy::new())),
            Mode::Match => Strategy::Items(ItemStrategy::Pattern(PatternStrategy::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Numeric => "numeric",
            Strategy::Items(s) => s.name(),
        }
    }

    /// Parse-strategy instrumentation, if this is the parse strategy
    pub fn as_key_count(&self) -> Option<&KeyCountStrategy> {
        match self {
            Strategy::Items(ItemStrategy::KeyCount(s)) => Some(s),
            _ => None,
        }
    }
}
