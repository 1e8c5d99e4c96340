//! Query result types for reading sensor history.
//!
//! A query names a set of sensors and an inclusive time range `[start, end]`.
//! The answer holds, per requested sensor and in request order, the maximal
//! contiguous run of samples inside the range. A sensor with no recorded
//! history is a valid, empty answer; only an inverted range is an error.
//!
//! # Example Usage
//!
//! ```rust
//! use retrace::{RetentionConfig, Sample, Store};
//! use retrace::sample::secs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::new(RetentionConfig::default());
//! store.append(Sample::new(secs(1), "cpu_temp", 41.5));
//! store.append(Sample::new(secs(2), "cpu_temp", 42.0));
//!
//! let result = store.query(&["cpu_temp", "fan_rpm"], secs(0), secs(10))?;
//! assert_eq!(result.get("cpu_temp").unwrap().len(), 2);
//! assert!(result.get("fan_rpm").unwrap().is_empty());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashSet};

use crate::error::{QueryError, Result};
use crate::sample::Timestamp;
use crate::series::Series;

/// Rejects inverted ranges.
///
/// # Errors
///
/// Returns [`QueryError::InvalidRange`] if `start > end`.
pub fn validate_range(start: Timestamp, end: Timestamp) -> Result<()> {
    if start > end {
        return Err(QueryError::InvalidRange { start, end }.into());
    }
    Ok(())
}

/// The samples of one sensor inside the requested range.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    sensor_id: String,
    points: Vec<(Timestamp, f64)>,
    available_range: (Option<Timestamp>, Option<Timestamp>),
    fully_covered: bool,
    may_be_incomplete: bool,
}

impl SeriesQuery {
    /// Builds the answer for one sensor; `series` is `None` for an unknown sensor.
    pub(crate) fn from_series(
        sensor_id: &str,
        series: Option<&Series>,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        let (points, oldest, newest) = match series {
            Some(s) => (s.range(start, end), s.oldest(), s.newest()),
            None => (Vec::new(), None, None),
        };
        let (fully_covered, may_be_incomplete) = analyze_coverage(oldest, newest, start, end);

        Self {
            sensor_id: sensor_id.to_string(),
            points,
            available_range: (oldest, newest),
            fully_covered,
            may_be_incomplete,
        }
    }

    /// The sensor this answer belongs to.
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// The samples, oldest first.
    pub fn points(&self) -> &[(Timestamp, f64)] {
        &self.points
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no samples fell inside the range.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The time range the sensor's retained history spans, `(oldest, newest)`.
    ///
    /// Both are `None` if the sensor has no history.
    pub fn available_range(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        self.available_range
    }

    /// Whether the whole requested range lies inside the retained history.
    pub fn is_fully_covered(&self) -> bool {
        self.fully_covered
    }

    /// Whether the requested range starts before the oldest retained sample,
    /// meaning older data was evicted or never recorded.
    pub fn may_be_incomplete(&self) -> bool {
        self.may_be_incomplete
    }

    /// Returns the value at exactly `timestamp`, if any.
    pub fn value_at(&self, timestamp: Timestamp) -> Option<f64> {
        self.points
            .binary_search_by_key(&timestamp, |&(ts, _)| ts)
            .ok()
            .map(|i| self.points[i].1)
    }
}

/// Answer to a multi-sensor range query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    series: Vec<SeriesQuery>,
    requested_range: (Timestamp, Timestamp),
}

impl QueryResult {
    pub(crate) fn new(series: Vec<SeriesQuery>, requested_range: (Timestamp, Timestamp)) -> Self {
        Self {
            series,
            requested_range,
        }
    }

    /// The per-sensor answers, in request order.
    pub fn series(&self) -> &[SeriesQuery] {
        &self.series
    }

    /// Iterates the per-sensor answers.
    pub fn iter(&self) -> std::slice::Iter<'_, SeriesQuery> {
        self.series.iter()
    }

    /// Looks up the answer for one sensor.
    pub fn get(&self, sensor_id: &str) -> Option<&SeriesQuery> {
        self.series.iter().find(|s| s.sensor_id == sensor_id)
    }

    /// The sensor ids, in request order.
    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.sensor_id.as_str())
    }

    /// The `(start, end)` range that was requested.
    pub fn requested_range(&self) -> (Timestamp, Timestamp) {
        self.requested_range
    }

    /// Total number of samples across all sensors.
    pub fn total_points(&self) -> usize {
        self.series.iter().map(SeriesQuery::len).sum()
    }

    /// Whether no sensor had any sample in range.
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(SeriesQuery::is_empty)
    }

    /// The union of all sample timestamps, ascending.
    pub fn distinct_timestamps(&self) -> Vec<Timestamp> {
        let all: BTreeSet<Timestamp> = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|&(ts, _)| ts))
            .collect();
        all.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a SeriesQuery;
    type IntoIter = std::slice::Iter<'a, SeriesQuery>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.iter()
    }
}

/// Collapses repeated ids, keeping the first occurrence of each.
pub(crate) fn dedup_ids<'a, S: AsRef<str> + 'a>(ids: &'a [S]) -> Vec<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    ids.iter()
        .map(|id| id.as_ref())
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Determines if a time range is covered by a series' retained history.
///
/// # Arguments
///
/// * `oldest` - The oldest timestamp retained (None if empty)
/// * `newest` - The newest timestamp retained (None if empty)
/// * `start` - Start of the requested range
/// * `end` - End of the requested range
///
/// # Returns
///
/// `(fully_covered, may_be_incomplete)` where:
/// - `fully_covered` - True if the entire range is within retained history
/// - `may_be_incomplete` - True if some data might be missing
pub fn analyze_coverage(
    oldest: Option<Timestamp>,
    newest: Option<Timestamp>,
    start: Timestamp,
    end: Timestamp,
) -> (bool, bool) {
    match (oldest, newest) {
        (Some(oldest_ts), Some(newest_ts)) => {
            let fully_covered = start >= oldest_ts && end <= newest_ts;
            // Ending after the newest sample is normal for live graphs.
            let may_be_incomplete = start < oldest_ts;
            (fully_covered, may_be_incomplete)
        }
        _ => (false, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range() {
        assert!(validate_range(1, 1).is_ok());
        assert!(validate_range(1, 2).is_ok());
        let err = validate_range(3, 2).unwrap_err();
        assert!(matches!(
            err,
            crate::RetraceError::Query(QueryError::InvalidRange { start: 3, end: 2 })
        ));
    }

    #[test]
    fn test_analyze_coverage_full_coverage() {
        let (fully_covered, incomplete) = analyze_coverage(Some(1000), Some(5000), 2000, 4000);
        assert!(fully_covered);
        assert!(!incomplete);
    }

    #[test]
    fn test_analyze_coverage_starts_too_early() {
        let (fully_covered, incomplete) = analyze_coverage(Some(2000), Some(5000), 1000, 4000);
        assert!(!fully_covered);
        assert!(incomplete);
    }

    #[test]
    fn test_analyze_coverage_ends_too_late() {
        let (fully_covered, incomplete) = analyze_coverage(Some(1000), Some(3000), 2000, 5000);
        assert!(!fully_covered);
        assert!(!incomplete);
    }

    #[test]
    fn test_analyze_coverage_no_data() {
        let (fully_covered, incomplete) = analyze_coverage(None, None, 1000, 2000);
        assert!(!fully_covered);
        assert!(incomplete);
    }

    #[test]
    fn test_series_query_unknown_sensor() {
        let q = SeriesQuery::from_series("ghost", None, 0, 100);
        assert!(q.is_empty());
        assert_eq!(q.available_range(), (None, None));
        assert!(!q.is_fully_covered());
        assert!(q.may_be_incomplete());
    }

    #[test]
    fn test_series_query_coverage_flags() {
        let mut s = Series::new();
        for ts in [10, 20, 30, 40] {
            s.push(ts, 0.0);
        }

        let inside = SeriesQuery::from_series("cpu", Some(&s), 15, 35);
        assert!(inside.is_fully_covered());
        assert!(!inside.may_be_incomplete());

        let live = SeriesQuery::from_series("cpu", Some(&s), 20, 100);
        assert!(!live.is_fully_covered());
        assert!(!live.may_be_incomplete());

        let early = SeriesQuery::from_series("cpu", Some(&s), 0, 35);
        assert!(!early.is_fully_covered());
        assert!(early.may_be_incomplete());
    }

    #[test]
    fn test_value_at_and_distinct_timestamps() {
        let mut a = Series::new();
        a.push(1, 10.0);
        a.push(3, 30.0);
        let mut b = Series::new();
        b.push(2, 20.0);
        b.push(3, 31.0);

        let result = QueryResult::new(
            vec![
                SeriesQuery::from_series("a", Some(&a), 0, 10),
                SeriesQuery::from_series("b", Some(&b), 0, 10),
            ],
            (0, 10),
        );
        assert_eq!(result.distinct_timestamps(), vec![1, 2, 3]);
        assert_eq!(result.get("a").unwrap().value_at(3), Some(30.0));
        assert_eq!(result.get("a").unwrap().value_at(2), None);
        assert_eq!(result.total_points(), 4);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_dedup_ids_keeps_first_occurrence() {
        let ids = ["b", "a", "b", "c", "a"];
        assert_eq!(dedup_ids(&ids), vec!["b", "a", "c"]);
    }
}
