//! # Series Rules
//!
//! Limit, usage and validity-window rules of a numbering series.
//!
//! ## Counter Semantics
//! ```text
//! start_number = 1, end_number = 5
//!
//!   current_number:  0     1     2     3     4     5
//!                    │                             │
//!                 nothing                      exhausted
//!                 issued                    (has_reached_limit)
//!
//! usage_percentage = (current - start + 1) / (end - start + 1) * 100
//! ```

use chrono::NaiveDate;

use crate::error::{CoreError, CoreResult};
use crate::template::FormatTemplate;
use crate::types::{Series, UsageSnapshot};
use crate::NEAR_LIMIT_PERCENT;

impl Series {
    /// Lowest band anchor: the band anchored here opens at `start_number`.
    #[inline]
    pub fn band_base(&self) -> i64 {
        self.start_number - 1
    }

    /// True iff `end_number` is set and `current_number >= end_number`.
    pub fn has_reached_limit(&self) -> bool {
        matches!(self.end_number, Some(end) if self.current_number >= end)
    }

    /// Share of the series already issued, in percent. 0 when unbounded.
    pub fn usage_percentage(&self) -> f64 {
        match self.end_number {
            Some(end) => {
                let capacity = end - self.start_number + 1;
                if capacity <= 0 {
                    return 0.0;
                }
                let issued = self.current_number - self.start_number + 1;
                issued as f64 / capacity as f64 * 100.0
            }
            None => 0.0,
        }
    }

    /// True once usage reaches [`NEAR_LIMIT_PERCENT`].
    pub fn is_near_limit(&self) -> bool {
        self.usage_percentage() >= NEAR_LIMIT_PERCENT
    }

    /// Numbers issued so far through the global counter.
    pub fn issued_count(&self) -> i64 {
        self.current_number - self.start_number + 1
    }

    /// Numbers left before exhaustion, `None` for unbounded series.
    pub fn remaining(&self) -> Option<i64> {
        self.end_number.map(|end| (end - self.current_number).max(0))
    }

    /// True when the series is active, not soft-deleted and `as_of` lies in
    /// `[effective_from, effective_to]` (open-ended when `effective_to` is None).
    pub fn is_effective_on(&self, as_of: NaiveDate) -> bool {
        self.is_active
            && self.deleted_at.is_none()
            && self.effective_from <= as_of
            && self.effective_to.map_or(true, |to| as_of <= to)
    }

    /// Checks every precondition for issuing one more number.
    ///
    /// ## Order
    /// 1. Inactive / outside the window → `SeriesInactive`
    /// 2. Limit reached → `SeriesExhausted`
    pub fn ensure_can_issue(&self, as_of: NaiveDate) -> CoreResult<()> {
        if !self.is_effective_on(as_of) {
            return Err(CoreError::SeriesInactive {
                series_id: self.id.clone(),
                as_of,
            });
        }

        match self.end_number {
            Some(end_number) if self.current_number >= end_number => {
                Err(CoreError::SeriesExhausted {
                    series_id: self.id.clone(),
                    end_number,
                })
            }
            _ => Ok(()),
        }
    }

    /// Parses this series' format template.
    pub fn template(&self) -> CoreResult<FormatTemplate> {
        Ok(FormatTemplate::parse(&self.format_template)?)
    }

    /// Formats a raw number with this series' template and prefix.
    pub fn format_number(&self, raw: i64, as_of: NaiveDate) -> CoreResult<String> {
        Ok(self.template()?.render(self.prefix.as_deref(), raw, as_of))
    }

    /// Dashboard projection of the usage figures.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            series_id: self.id.clone(),
            issued: self.issued_count(),
            remaining: self.remaining(),
            usage_percentage: self.usage_percentage(),
            is_near_limit: self.is_near_limit(),
            has_reached_limit: self.has_reached_limit(),
        }
    }
}

/// Picks the single active series for a date.
///
/// Zero or several candidates is an error carrying the match count; the
/// caller decides, never this function.
pub fn select_active<'a, I>(candidates: I, as_of: NaiveDate) -> CoreResult<&'a Series>
where
    I: IntoIterator<Item = &'a Series>,
{
    let matching: Vec<&Series> = candidates
        .into_iter()
        .filter(|s| s.is_effective_on(as_of))
        .collect();

    match matching.as_slice() {
        [only] => Ok(*only),
        _ => Err(CoreError::NoActiveSeries {
            as_of,
            matches: matching.len(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn series(start: i64, end: Option<i64>, current: i64) -> Series {
        let now = Utc::now();
        Series {
            id: "series-1".to_string(),
            name: "OR 2025".to_string(),
            prefix: Some("OR".to_string()),
            start_number: start,
            end_number: end,
            current_number: current,
            format_template: "{PREFIX}-{YEAR}{MONTH}-{NUMBER:6}".to_string(),
            band_size: crate::DEFAULT_BAND_SIZE,
            is_active: true,
            effective_from: date(2025, 1, 1),
            effective_to: None,
            notes: None,
            created_by: "admin".to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_has_reached_limit() {
        assert!(!series(1, Some(5), 4).has_reached_limit());
        assert!(series(1, Some(5), 5).has_reached_limit());
        assert!(!series(1, None, 1_000_000).has_reached_limit());
    }

    #[test]
    fn test_usage_percentage() {
        assert_eq!(series(1, Some(100), 0).usage_percentage(), 0.0);
        assert_eq!(series(1, Some(100), 50).usage_percentage(), 50.0);
        assert_eq!(series(101, Some(200), 190).usage_percentage(), 90.0);
        assert_eq!(series(1, None, 50).usage_percentage(), 0.0);
    }

    #[test]
    fn test_is_near_limit() {
        assert!(!series(1, Some(100), 89).is_near_limit());
        assert!(series(1, Some(100), 90).is_near_limit());
        assert!(!series(1, None, 99).is_near_limit());
    }

    #[test]
    fn test_effective_window() {
        let mut s = series(1, None, 0);
        s.effective_to = Some(date(2025, 12, 31));

        assert!(!s.is_effective_on(date(2024, 12, 31)));
        assert!(s.is_effective_on(date(2025, 1, 1)));
        assert!(s.is_effective_on(date(2025, 12, 31)));
        assert!(!s.is_effective_on(date(2026, 1, 1)));

        s.is_active = false;
        assert!(!s.is_effective_on(date(2025, 6, 1)));
    }

    #[test]
    fn test_ensure_can_issue() {
        let s = series(1, Some(5), 5);
        assert!(matches!(
            s.ensure_can_issue(date(2025, 6, 1)),
            Err(CoreError::SeriesExhausted { end_number: 5, .. })
        ));

        let mut s = series(1, Some(5), 2);
        s.effective_to = Some(date(2025, 3, 1));
        assert!(matches!(
            s.ensure_can_issue(date(2025, 6, 1)),
            Err(CoreError::SeriesInactive { .. })
        ));

        assert!(series(1, Some(5), 4).ensure_can_issue(date(2025, 6, 1)).is_ok());
    }

    #[test]
    fn test_format_number_is_deterministic() {
        let s = series(1, None, 0);
        let d = date(2025, 10, 5);
        let first = s.format_number(42, d).unwrap();
        let second = s.format_number(42, d).unwrap();
        assert_eq!(first, "OR-202510-000042");
        assert_eq!(first, second);
    }

    #[test]
    fn test_select_active_rejects_ambiguity() {
        let a = series(1, None, 0);
        let mut b = series(1, None, 0);
        b.id = "series-2".to_string();
        let d = date(2025, 6, 1);

        assert!(matches!(
            select_active([&a, &b], d),
            Err(CoreError::NoActiveSeries { matches: 2, .. })
        ));
        assert!(matches!(
            select_active(std::iter::empty::<&Series>(), d),
            Err(CoreError::NoActiveSeries { matches: 0, .. })
        ));

        b.is_active = false;
        assert_eq!(select_active([&a, &b], d).unwrap().id, "series-1");
    }

    #[test]
    fn test_usage_snapshot() {
        let snapshot = series(1, Some(10), 9).usage_snapshot();
        assert_eq!(snapshot.issued, 9);
        assert_eq!(snapshot.remaining, Some(1));
        assert!(snapshot.is_near_limit);
        assert!(!snapshot.has_reached_limit);
    }
}
