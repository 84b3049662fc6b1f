//! # Per-User Counters and Offset Bands
//!
//! Every cashier issuing in a series owns a private band of raw numbers.
//! Bands never overlap, so two cashiers can never produce the same raw number
//! even though each only looks at its own counter row.
//!
//! ## Band Layout
//! ```text
//! series start_number = 1, band_size = 100000
//!
//!   base = start_number - 1 = 0
//!
//!   ┌──────────────────┬──────────────────┬──────────────────┐
//!   │ band k=0         │ band k=1         │ band k=2         │
//!   │ offset 0         │ offset 100000    │ offset 200000    │
//!   │ raws 1..=100000  │ 100001..=200000  │ 200001..=300000  │
//!   │ user A           │ user B           │ (free)           │
//!   └──────────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! ## Band Anchor
//! A band is measured from its anchor,
//! `start_offset + current_number - generations_at_current_offset`, the raw
//! offset the counter had reached when its current offset was set. Until the
//! first reassignment the anchor equals `start_offset`. Reassigning keeps the
//! running count, so the new band starts right after `new_offset + count`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::PerUserCounter;

// =============================================================================
// Offset Band
// =============================================================================

/// Raw range `[start_offset + 1, start_offset + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetBand {
    pub start_offset: i64,
    pub size: i64,
}

impl OffsetBand {
    pub const fn new(start_offset: i64, size: i64) -> Self {
        OffsetBand { start_offset, size }
    }

    /// First raw number of the band.
    pub const fn first(&self) -> i64 {
        self.start_offset + 1
    }

    /// Last raw number of the band.
    pub const fn last(&self) -> i64 {
        self.start_offset + self.size
    }

    pub const fn contains(&self, raw: i64) -> bool {
        raw >= self.first() && raw <= self.last()
    }

    pub const fn overlaps(&self, other: &OffsetBand) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

/// Lowest band offset `base + k * band_size` (k >= 0) that overlaps none of
/// `taken`.
///
/// ## Example
/// ```rust
/// use ornum_core::counter::next_free_offset;
///
/// assert_eq!(next_free_offset(0, 100_000, &[]), 0);
/// assert_eq!(next_free_offset(0, 100_000, &[0]), 100_000);
/// assert_eq!(next_free_offset(0, 100_000, &[100_000]), 0);
/// ```
pub fn next_free_offset(base: i64, band_size: i64, taken: &[i64]) -> i64 {
    debug_assert!(band_size > 0, "band size must be positive");
    let mut candidate = base;
    loop {
        let band = OffsetBand::new(candidate, band_size);
        let collides = taken
            .iter()
            .any(|offset| band.overlaps(&OffsetBand::new(*offset, band_size)));
        if !collides {
            return candidate;
        }
        candidate += band_size;
    }
}

/// Fails with `OffsetCollision` if the band anchored at `anchor` overlaps
/// the band of any counter in `others` belonging to a different user.
pub fn ensure_no_collision<'a, I>(
    series_id: &str,
    user_id: &str,
    anchor: i64,
    band_size: i64,
    others: I,
) -> CoreResult<()>
where
    I: IntoIterator<Item = &'a PerUserCounter>,
{
    let band = OffsetBand::new(anchor, band_size);

    for other in others {
        if other.user_id == user_id {
            continue;
        }
        if band.overlaps(&other.band(band_size)) {
            return Err(CoreError::OffsetCollision {
                series_id: series_id.to_string(),
                offset: anchor,
                conflicting_user: other.user_id.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Counter Arithmetic
// =============================================================================

impl PerUserCounter {
    /// Next raw number: `start_offset + current_number + 1`. Does not mutate.
    #[inline]
    pub fn next_number(&self) -> i64 {
        self.start_offset + self.current_number + 1
    }

    /// Raw offset the current band is measured from.
    #[inline]
    pub fn band_anchor(&self) -> i64 {
        self.start_offset + self.current_number - self.generations_at_current_offset
    }

    /// The band this counter currently owns.
    #[inline]
    pub fn band(&self, band_size: i64) -> OffsetBand {
        OffsetBand::new(self.band_anchor(), band_size)
    }

    /// Anchor the band would have after moving this counter to `new_offset`.
    #[inline]
    pub fn anchor_after_reassign(&self, new_offset: i64) -> i64 {
        new_offset + self.current_number
    }

    /// Returns the next raw number, or `OffsetBandExhausted` when it would
    /// fall outside the counter's band.
    pub fn ensure_band_capacity(&self, band_size: i64) -> CoreResult<i64> {
        let next = self.next_number();
        if next > self.band(band_size).last() {
            return Err(CoreError::OffsetBandExhausted {
                series_id: self.series_id.clone(),
                user_id: self.user_id.clone(),
                band_start: self.band_anchor(),
            });
        }
        Ok(next)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn counter(user: &str, offset: i64, current: i64) -> PerUserCounter {
        let now = Utc::now();
        PerUserCounter {
            id: format!("counter-{}", user),
            series_id: "series-1".to_string(),
            user_id: user.to_string(),
            start_offset: offset,
            current_number: current,
            last_generated_number: None,
            is_auto_assigned: true,
            offset_changed_at: None,
            generations_at_current_offset: current,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_next_number() {
        assert_eq!(counter("a", 0, 0).next_number(), 1);
        assert_eq!(counter("b", 100_000, 2).next_number(), 100_003);
    }

    #[test]
    fn test_band_bounds() {
        let band = OffsetBand::new(100_000, 100_000);
        assert_eq!(band.first(), 100_001);
        assert_eq!(band.last(), 200_000);
        assert!(band.contains(150_000));
        assert!(!band.contains(100_000));
    }

    #[test]
    fn test_band_overlap() {
        let a = OffsetBand::new(0, 100);
        assert!(a.overlaps(&OffsetBand::new(99, 100)));
        assert!(!a.overlaps(&OffsetBand::new(100, 100)));
        assert!(OffsetBand::new(50, 100).overlaps(&a));
    }

    #[test]
    fn test_next_free_offset_fills_gaps() {
        assert_eq!(next_free_offset(0, 100, &[0, 200]), 100);
        assert_eq!(next_free_offset(0, 100, &[0, 100, 200]), 300);
        // Manual offset straddling two bands blocks both
        assert_eq!(next_free_offset(0, 100, &[0, 150]), 300);
        // Base follows the series start
        assert_eq!(next_free_offset(999, 100, &[999]), 1099);
    }

    #[test]
    fn test_ensure_no_collision() {
        let others = vec![counter("a", 0, 3), counter("b", 100_000, 0)];

        assert!(ensure_no_collision("series-1", "c", 200_000, 100_000, &others).is_ok());
        // Own band is ignored
        assert!(ensure_no_collision("series-1", "a", 0, 100_000, &others).is_ok());

        let err = ensure_no_collision("series-1", "c", 150_000, 100_000, &others).unwrap_err();
        assert!(matches!(
            err,
            CoreError::OffsetCollision { ref conflicting_user, .. } if conflicting_user == "b"
        ));
    }

    #[test]
    fn test_reassigned_counter_gets_a_fresh_band() {
        let mut c = counter("a", 0, 5);
        assert!(c.ensure_band_capacity(5).is_err());

        // Move to the band anchored at 10: new_offset + count = 10
        c.start_offset = 5;
        c.generations_at_current_offset = 0;
        assert_eq!(c.band_anchor(), 10);
        assert_eq!(c.anchor_after_reassign(5), 10);
        assert_eq!(c.ensure_band_capacity(5).unwrap(), 11);
        assert_eq!(c.band(5), OffsetBand::new(10, 5));
    }

    #[test]
    fn test_band_capacity() {
        assert_eq!(counter("a", 0, 4).ensure_band_capacity(5).unwrap(), 5);
        assert!(matches!(
            counter("a", 0, 5).ensure_band_capacity(5),
            Err(CoreError::OffsetBandExhausted { band_start: 0, .. })
        ));
    }
}
