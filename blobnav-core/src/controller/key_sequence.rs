//! src/controller/key_sequence.rs
//! ============================================================================
//! # `KeyBindingResolver`: Multi-Character Sequence Disambiguation
//!
//! Resolves typed characters against a `BindingTable`. When a sequence is both
//! a complete binding and a strict prefix of a longer one ("g" vs "gg") the
//! resolver waits; the shorter binding completes once the pending buffer goes
//! stale (either on the next keystroke or on an explicit `expire` tick).

use std::collections::HashMap;
use std::time::Duration;

use compact_str::CompactString;
use smallvec::SmallVec;
use tokio::time::Instant;
use tracing::trace;

use crate::controller::actions::BindingAction;
use crate::error::AppError;

/// Character sequence to action table. Matching is case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: HashMap<CompactString, BindingAction>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sequence: &str, action: BindingAction) -> Result<(), AppError> {
        if sequence.is_empty() {
            return Err(AppError::invalid_input(
                "binding",
                "key sequence must not be empty",
            ));
        }
        self.bindings.insert(CompactString::new(sequence), action);
        Ok(())
    }

    /// Build a table from `(sequence, action)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (&'a str, BindingAction)>,
    {
        let mut table = Self::new();
        for (sequence, action) in pairs {
            table.insert(sequence, action)?;
        }
        Ok(table)
    }

    #[must_use]
    pub fn get(&self, sequence: &str) -> Option<BindingAction> {
        self.bindings.get(sequence).copied()
    }

    /// True iff some binding strictly longer than `sequence` starts with it.
    #[must_use]
    pub fn has_longer_match(&self, sequence: &str) -> bool {
        self.bindings
            .keys()
            .any(|bound| bound.len() > sequence.len() && bound.starts_with(sequence))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, BindingAction)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A binding that completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub action: BindingAction,
    pub sequence: CompactString,
}

/// Outcome of feeding one character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedResult {
    /// Stale buffer that completed because the pause exceeded the timeout.
    pub flushed: Option<ResolvedBinding>,

    /// Binding completed by this character.
    pub resolved: Option<ResolvedBinding>,

    /// The buffer is a strict prefix of some longer binding.
    pub is_partial_match: bool,
}

impl FeedResult {
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.flushed.is_some() || self.resolved.is_some()
    }

    /// Action completed by this character (not a flushed stale one).
    #[must_use]
    pub fn action(&self) -> Option<BindingAction> {
        self.resolved.as_ref().map(|r| r.action)
    }

    /// Completed bindings in the order they fired.
    pub fn completions(&self) -> impl Iterator<Item = &ResolvedBinding> {
        self.flushed.iter().chain(self.resolved.iter())
    }
}

/// Pending characters plus the time the last one was accepted.
#[derive(Debug, Clone, Default)]
struct KeySequenceBuffer {
    pending: SmallVec<[char; 4]>,
    last_input: Option<Instant>,
}

impl KeySequenceBuffer {
    fn as_string(&self) -> CompactString {
        self.pending.iter().collect()
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        !self.pending.is_empty()
            && self
                .last_input
                .is_some_and(|last| now.saturating_duration_since(last) > timeout)
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.last_input = None;
    }
}

#[derive(Debug, Clone)]
pub struct KeyBindingResolver {
    buffer: KeySequenceBuffer,
    timeout: Duration,
}

impl KeyBindingResolver {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: KeySequenceBuffer::default(),
            timeout,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Characters typed so far that have not resolved.
    #[must_use]
    pub fn pending(&self) -> CompactString {
        self.buffer.as_string()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Feed one character typed at `now`.
    pub fn feed(&mut self, c: char, table: &BindingTable, now: Instant) -> FeedResult {
        let mut result = FeedResult {
            flushed: self.take_stale(table, now),
            ..FeedResult::default()
        };

        self.buffer.pending.push(c);
        self.buffer.last_input = Some(now);

        let sequence = self.buffer.as_string();
        let partial = table.has_longer_match(&sequence);
        let exact = table.get(&sequence);

        match (exact, partial) {
            // Longer sequences win; wait for more input or the timeout.
            (Some(_), true) | (None, true) => {
                result.is_partial_match = true;
            }
            (Some(action), false) => {
                self.buffer.clear();
                result.resolved = Some(ResolvedBinding { action, sequence });
            }
            (None, false) => {
                self.buffer.clear();
                if sequence.chars().count() > 1 {
                    // Aborted sequence: give the incoming key its own chance.
                    self.retry_single(c, table, now, &mut result);
                }
            }
        }

        trace!(
            marker = "KEY_SEQUENCE_FEED",
            operation_type = "input_handling",
            key = %c,
            pending = %self.buffer.as_string(),
            completed = result.completed(),
            partial = result.is_partial_match,
            "Resolver fed character"
        );

        result
    }

    /// Resolve the pending buffer if it has outlived the timeout.
    pub fn expire(&mut self, table: &BindingTable, now: Instant) -> Option<ResolvedBinding> {
        self.take_stale(table, now)
    }

    fn take_stale(&mut self, table: &BindingTable, now: Instant) -> Option<ResolvedBinding> {
        if !self.buffer.is_stale(now, self.timeout) {
            return None;
        }

        let sequence = self.buffer.as_string();
        self.buffer.clear();

        table
            .get(&sequence)
            .map(|action| ResolvedBinding { action, sequence })
    }

    fn retry_single(&mut self, c: char, table: &BindingTable, now: Instant, result: &mut FeedResult) {
        let single = CompactString::from(c.to_string());

        if table.has_longer_match(&single) {
            self.buffer.pending.push(c);
            self.buffer.last_input = Some(now);
            result.is_partial_match = true;
        } else if let Some(action) = table.get(&single) {
            result.resolved = Some(ResolvedBinding {
                action,
                sequence: single,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BindingAction::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn table() -> BindingTable {
        BindingTable::from_pairs([
            ("g", Refresh),
            ("gg", SelectFirst),
            ("G", SelectLast),
            ("j", MoveDown),
            ("dab", DownloadAll),
        ])
        .unwrap()
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_single_key_completes_immediately() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let result = resolver.feed('j', &table(), Instant::now());

        assert!(result.completed());
        assert_eq!(result.action(), Some(MoveDown));
        assert!(!result.is_partial_match);
        assert!(resolver.pending().is_empty());
    }

    #[test]
    fn test_longer_sequence_wins_over_prefix() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();

        let first = resolver.feed('g', &table(), t0);
        assert!(!first.completed());
        assert!(first.is_partial_match);

        let second = resolver.feed('g', &table(), ms(t0, 100));
        assert_eq!(second.action(), Some(SelectFirst));
        assert_eq!(second.resolved.unwrap().sequence, "gg");
    }

    #[test]
    fn test_exactly_one_completion_after_last_character() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();
        let results = [
            resolver.feed('d', &table(), t0),
            resolver.feed('a', &table(), ms(t0, 100)),
            resolver.feed('b', &table(), ms(t0, 200)),
        ];

        let completions: usize = results.iter().map(|r| r.completions().count()).sum();
        assert_eq!(completions, 1);
        assert_eq!(results[2].action(), Some(DownloadAll));
    }

    #[test]
    fn test_prefix_completes_after_timeout_without_more_keys() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();
        resolver.feed('g', &table(), t0);

        assert!(resolver.expire(&table(), ms(t0, 400)).is_none());
        let fired = resolver.expire(&table(), ms(t0, 501)).unwrap();
        assert_eq!(fired.action, Refresh);
        assert!(resolver.pending().is_empty());
    }

    #[test]
    fn test_gap_equal_to_timeout_is_not_stale() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();
        resolver.feed('g', &table(), t0);

        let result = resolver.feed('g', &table(), ms(t0, 500));
        assert!(result.flushed.is_none());
        assert_eq!(result.action(), Some(SelectFirst));
    }

    #[test]
    fn test_stale_prefix_then_same_prefix_does_not_double_complete() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();
        resolver.feed('g', &table(), t0);

        // Next keystroke arrives long after the timeout: the stale "g"
        // completes once and the new "g" starts a fresh pending sequence.
        let result = resolver.feed('g', &table(), ms(t0, 2_000));
        assert_eq!(result.flushed.as_ref().map(|r| r.action), Some(Refresh));
        assert!(result.resolved.is_none());
        assert!(result.is_partial_match);
        assert_eq!(resolver.pending(), "g");

        // A tick before the second timeout elapses fires nothing.
        assert!(resolver.expire(&table(), ms(t0, 2_100)).is_none());
        let second = resolver.expire(&table(), ms(t0, 2_600)).unwrap();
        assert_eq!(second.action, Refresh);
        assert!(resolver.expire(&table(), ms(t0, 5_000)).is_none());
    }

    #[test]
    fn test_tick_then_feed_fires_stale_once() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();
        resolver.feed('g', &table(), t0);

        assert!(resolver.expire(&table(), ms(t0, 900)).is_some());
        let next = resolver.feed('j', &table(), ms(t0, 1_000));
        assert!(next.flushed.is_none());
        assert_eq!(next.action(), Some(MoveDown));
    }

    #[test]
    fn test_unmatched_sequence_leaves_no_residue() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();

        let result = resolver.feed('z', &table(), t0);
        assert!(!result.completed());
        assert!(!result.is_partial_match);
        assert!(resolver.pending().is_empty());

        let next = resolver.feed('j', &table(), ms(t0, 10));
        assert_eq!(next.action(), Some(MoveDown));
    }

    #[test]
    fn test_aborted_sequence_retries_incoming_key() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();

        resolver.feed('d', &table(), t0);
        let result = resolver.feed('j', &table(), ms(t0, 50));
        assert_eq!(result.action(), Some(MoveDown));
        assert!(resolver.pending().is_empty());
    }

    #[test]
    fn test_aborted_sequence_restarts_with_incoming_prefix() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();

        resolver.feed('d', &table(), t0);
        let result = resolver.feed('g', &table(), ms(t0, 50));
        assert!(!result.completed());
        assert!(result.is_partial_match);
        assert_eq!(resolver.pending(), "g");
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let result = resolver.feed('G', &table(), Instant::now());
        assert_eq!(result.action(), Some(SelectLast));
    }

    #[test]
    fn test_timeout_baseline_resets_on_each_character() {
        let mut resolver = KeyBindingResolver::new(TIMEOUT);
        let t0 = Instant::now();

        resolver.feed('d', &table(), t0);
        resolver.feed('a', &table(), ms(t0, 400));
        // 800ms after the first key, but only 400ms after the last one.
        let result = resolver.feed('b', &table(), ms(t0, 800));
        assert!(result.flushed.is_none());
        assert_eq!(result.action(), Some(DownloadAll));
    }

    #[test]
    fn test_empty_binding_rejected() {
        let mut table = BindingTable::new();
        assert!(table.insert("", Quit).is_err());
    }
}
