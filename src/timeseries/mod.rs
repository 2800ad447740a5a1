//! Daily per-species detection series: aggregation, gap filling, caching.

pub mod cache;

pub use self::cache::TimeSeriesBuilder;

use crate::source::DetectionEvent;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Detections for one species on one calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: u32,
}

/// Contiguous, strictly increasing daily counts for one species.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailySeries {
    points: Vec<DailyCount>,
}

impl DailySeries {
    /// Build a series from counts in any order, filling missing days with zero.
    pub fn from_counts(counts: impl IntoIterator<Item = (NaiveDate, u32)>) -> Self {
        let mut by_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for (day, count) in counts {
            *by_day.entry(day).or_default() += count;
        }
        Self {
            points: fill_gaps(&by_day),
        }
    }

    pub fn points(&self) -> &[DailyCount] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.points.iter().map(|p| p.count as u64).sum()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.day)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.day)
    }
}

/// Species name -> daily series, in deterministic species order.
pub type SeriesMap = BTreeMap<String, DailySeries>;

/// Bucket events into per-species daily counts.
///
/// Events without their own timestamp are placed on the day of `fallback`.
pub fn aggregate_daily(events: &[DetectionEvent], fallback: DateTime<Utc>) -> SeriesMap {
    let mut buckets: HashMap<&str, BTreeMap<NaiveDate, u32>> = HashMap::new();
    for ev in events {
        let day = ev.observed_at.unwrap_or(fallback).date_naive();
        *buckets
            .entry(ev.species.as_str())
            .or_default()
            .entry(day)
            .or_default() += 1;
    }

    buckets
        .into_iter()
        .map(|(species, by_day)| {
            (
                species.to_string(),
                DailySeries {
                    points: fill_gaps(&by_day),
                },
            )
        })
        .collect()
}

/// Materialize every day between the first and last observed day.
pub fn fill_gaps(by_day: &BTreeMap<NaiveDate, u32>) -> Vec<DailyCount> {
    let (Some((&start, _)), Some((&end, _))) = (by_day.first_key_value(), by_day.last_key_value())
    else {
        return Vec::new();
    };

    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|day| DailyCount {
            day,
            count: by_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

/// Species ranked by total detections, highest first; ties by name.
pub fn rank_by_volume(series: &SeriesMap, n: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = series
        .iter()
        .map(|(sp, s)| (sp.clone(), s.total()))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_gap_fill_between_first_and_last_day() {
        let events = vec![
            DetectionEvent::new("A", day0()),
            DetectionEvent::new("A", day0() + Duration::hours(3)),
            DetectionEvent::new("A", day0() + Duration::days(5)),
        ];
        let map = aggregate_daily(&events, Utc::now());
        let a = &map["A"];

        assert_eq!(a.len(), 6);
        let counts: Vec<u32> = a.points().iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![2, 0, 0, 0, 0, 1]);
        for w in a.points().windows(2) {
            assert_eq!(w[1].day, w[0].day.succ_opt().unwrap());
        }
    }

    #[test]
    fn test_untimed_events_use_fallback_day() {
        let fallback = day0() + Duration::days(2);
        let events = vec![
            DetectionEvent::new("B", day0()),
            DetectionEvent::untimed("B"),
        ];
        let map = aggregate_daily(&events, fallback);
        let b = &map["B"];
        assert_eq!(b.len(), 3);
        assert_eq!(b.last_day(), Some(fallback.date_naive()));
        assert_eq!(b.total(), 2);
    }

    #[test]
    fn test_species_are_independent() {
        let events = vec![
            DetectionEvent::new("A", day0()),
            DetectionEvent::new("B", day0() + Duration::days(10)),
        ];
        let map = aggregate_daily(&events, Utc::now());
        assert_eq!(map.len(), 2);
        assert_eq!(map["A"].len(), 1);
        assert_eq!(map["B"].len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_daily(&[], Utc::now()).is_empty());
        assert!(fill_gaps(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_rank_by_volume() {
        let d = day0().date_naive();
        let mut map = SeriesMap::new();
        map.insert("low".into(), DailySeries::from_counts([(d, 1)]));
        map.insert("high".into(), DailySeries::from_counts([(d, 9)]));
        map.insert("alsohigh".into(), DailySeries::from_counts([(d, 4), (d, 5)]));

        let ranked = rank_by_volume(&map, 2);
        assert_eq!(ranked, vec![("alsohigh".to_string(), 9), ("high".to_string(), 9)]);
    }
}
