use std::time::{Duration, Instant};

/// Coalesces rapid text deltas so the draft is touched at a bounded rate.
///
/// The batcher never sleeps: callers ask for [`TextBatcher::deadline`] and
/// drive the flush themselves.
#[derive(Debug)]
pub struct TextBatcher {
    pending: String,
    first_pending_at: Option<Instant>,
    interval: Duration,
    max_pending_chars: usize,
}

impl TextBatcher {
    #[must_use]
    pub fn new(interval: Duration, max_pending_chars: usize) -> Self {
        Self {
            pending: String::new(),
            first_pending_at: None,
            interval,
            max_pending_chars: max_pending_chars.max(1),
        }
    }

    /// Buffer `text`; returns `true` when the caller should flush now.
    pub fn push(&mut self, text: &str, now: Instant) -> bool {
        if text.is_empty() {
            return false;
        }
        self.pending.push_str(text);
        let first = *self.first_pending_at.get_or_insert(now);
        self.pending.len() >= self.max_pending_chars
            || now.saturating_duration_since(first) >= self.interval
    }

    /// Whether buffered text is older than the flush interval.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.first_pending_at
            .is_some_and(|first| now.saturating_duration_since(first) >= self.interval)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.first_pending_at.map(|first| first + self.interval)
    }

    /// Drain buffered text and clear the deadline.
    pub fn take(&mut self) -> Option<String> {
        self.first_pending_at = None;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Drop the deadline but keep the text for a final flush.
    pub fn cancel(&mut self) {
        self.first_pending_at = None;
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
