//! Lifecycle metadata shared between the element and its pipeline.

use serde::{Deserialize, Serialize};

use crate::sniff::CodecFormat;

/// Position, size and codec of the stream an element is moving.
///
/// The element owns the authoritative copy and publishes snapshots to the
/// pipeline after every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Bytes already consumed or produced; the resume offset for the next open.
    pub byte_pos: u64,
    /// Total payload size once known from the response headers.
    pub total_bytes: Option<u64>,
    /// Codec detected from the response headers.
    pub codec: CodecFormat,
}

impl StreamInfo {
    /// Advances the resume offset after a successful transfer.
    pub(crate) fn advance(&mut self, count: usize) {
        self.byte_pos = self.byte_pos.saturating_add(count as u64);
    }

    /// Bytes left to transfer, when the total size is known.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.total_bytes
            .map(|total| total.saturating_sub(self.byte_pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_accumulates_position() {
        let mut info = StreamInfo {
            byte_pos: 10,
            ..StreamInfo::default()
        };
        info.advance(5);
        info.advance(0);
        assert_eq!(info.byte_pos, 15);
    }

    #[test]
    fn test_remaining_unknown_without_total() {
        let info = StreamInfo {
            byte_pos: 100,
            ..StreamInfo::default()
        };
        assert_eq!(info.remaining(), None);

        let info = StreamInfo {
            byte_pos: 100,
            total_bytes: Some(250),
            codec: CodecFormat::None,
        };
        assert_eq!(info.remaining(), Some(150));
    }
}
