//! Per-stream cursors shared by every projection.
//!
//! A cursor records the last sequence number applied from one aggregate
//! stream, which makes projections idempotent under at-least-once delivery
//! (replays at or below the cursor are ignored).

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use rentkit_core::AggregateId;
use rentkit_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: &'static str,
        message: String,
    },

    #[error("event does not belong to its envelope stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// What to do with an incoming envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    /// Next event in the stream; apply it.
    Apply,
    /// Already applied; skip.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(cursors) => *cursors.get(&aggregate_id).unwrap_or(&0),
            Err(_) => 0,
        }
    }

    /// Classify `seq` against the stream's cursor.
    ///
    /// The first event seen for a stream may have any positive sequence
    /// number; after that increments must be exactly one.
    pub fn check(&self, aggregate_id: AggregateId, seq: u64) -> Result<CursorCheck, ProjectionError> {
        let last = self.last(aggregate_id);
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorCheck::Duplicate);
        }
        if seq != last + 1 && last != 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(aggregate_id, seq);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

/// Deterministic replay order: aggregate, then sequence.
pub fn replay_order(
    envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
) -> Vec<EventEnvelope<JsonValue>> {
    let mut envs: Vec<_> = envelopes.into_iter().collect();
    envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));
    envs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        assert_eq!(cursors.check(id, 1).unwrap(), CursorCheck::Apply);
        cursors.advance(id, 1);
        assert_eq!(cursors.check(id, 1).unwrap(), CursorCheck::Duplicate);
        assert_eq!(cursors.check(id, 2).unwrap(), CursorCheck::Apply);
        assert!(matches!(
            cursors.check(id, 3),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 3 })
        ));
    }

    #[test]
    fn zero_sequence_is_rejected() {
        let cursors = StreamCursors::new();
        assert!(cursors.check(AggregateId::new(), 0).is_err());
    }

    #[test]
    fn clear_resets_every_stream() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();
        cursors.advance(id, 4);
        cursors.clear();
        assert_eq!(cursors.last(id), 0);
    }
}
