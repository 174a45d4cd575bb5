//! Date-range filtering and period bucketing of parsed events.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;
use usage_core::models::{
    AggregatedSeries, BucketPolicy, DateRange, Event, Granularity, SeriesPoint,
};

// ── UsageAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that counts events per calendar period.
///
/// Nothing here mutates its inputs; every call builds fresh output.
pub struct UsageAggregator;

impl UsageAggregator {
    /// Events whose timestamp lies in `range`, in input order.
    pub fn filter_events<'a>(events: &'a [Event], range: &DateRange) -> Vec<&'a Event> {
        events.iter().filter(|e| range.contains(e.timestamp)).collect()
    }

    /// Count the events inside `range` per `granularity` bucket.
    ///
    /// Buckets come out sorted ascending. Without gap filling only observed
    /// buckets appear; an empty result means no event fell in the range.
    pub fn filter_and_bucket(
        events: &[Event],
        range: &DateRange,
        granularity: Granularity,
        policy: BucketPolicy,
    ) -> AggregatedSeries {
        let in_range = Self::filter_events(events, range);
        let mut counts = Self::count_by_bucket(&in_range, granularity, policy);

        if policy.fill_gaps {
            counts = Self::fill_gaps(counts, granularity);
        }

        debug!(
            "Bucketed {} of {} events into {} {} buckets",
            in_range.len(),
            events.len(),
            counts.len(),
            granularity
        );

        AggregatedSeries {
            granularity,
            points: counts
                .into_iter()
                .map(|(period, count)| SeriesPoint { period, count })
                .collect(),
        }
    }

    /// The bucket key `event` falls into.
    pub fn bucket_of(event: &Event, granularity: Granularity, policy: BucketPolicy) -> NaiveDate {
        granularity.bucket_of(event.date(), policy.week_start)
    }

    // ── Private ───────────────────────────────────────────────────────────────

    fn count_by_bucket(
        events: &[&Event],
        granularity: Granularity,
        policy: BucketPolicy,
    ) -> BTreeMap<NaiveDate, u64> {
        let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for event in events {
            *counts
                .entry(Self::bucket_of(event, granularity, policy))
                .or_insert(0) += 1;
        }
        counts
    }

    /// Insert zero-count buckets between the first and last observed key.
    fn fill_gaps(
        counts: BTreeMap<NaiveDate, u64>,
        granularity: Granularity,
    ) -> BTreeMap<NaiveDate, u64> {
        let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
            return counts;
        };

        let mut filled = counts;
        let mut cursor = first;
        while cursor < last {
            filled.entry(cursor).or_insert(0);
            match granularity.next_bucket(cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        filled
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use usage_core::models::WeekStart;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn event(ts: &str) -> Event {
        Event {
            timestamp: utc(ts),
            fields: vec![ts.to_string()],
        }
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    fn pairs(series: &AggregatedSeries) -> Vec<(String, u64)> {
        series
            .iter()
            .map(|p| (p.period.to_string(), p.count))
            .collect()
    }

    fn scenario_events() -> Vec<Event> {
        vec![
            event("2024-01-01T10:00:00Z"),
            event("2024-01-01T15:00:00Z"),
            event("2024-01-02T08:00:00Z"),
        ]
    }

    // ── filter_and_bucket ─────────────────────────────────────────────────────

    #[test]
    fn test_daily_counts_two_days() {
        let series = UsageAggregator::filter_and_bucket(
            &scenario_events(),
            &range("2024-01-01", "2024-01-02"),
            Granularity::Day,
            BucketPolicy::default(),
        );
        assert_eq!(
            pairs(&series),
            vec![("2024-01-01".to_string(), 2), ("2024-01-02".to_string(), 1)]
        );
        assert_eq!(series.granularity, Granularity::Day);
    }

    #[test]
    fn test_weekly_counts_monday_start() {
        let series = UsageAggregator::filter_and_bucket(
            &scenario_events(),
            &range("2024-01-01", "2024-01-02"),
            Granularity::Week,
            BucketPolicy::default(),
        );
        assert_eq!(pairs(&series), vec![("2024-01-01".to_string(), 3)]);
    }

    #[test]
    fn test_weekly_counts_sunday_start() {
        let events = vec![
            event("2024-01-06T12:00:00Z"), // Saturday
            event("2024-01-07T12:00:00Z"), // Sunday
            event("2024-01-08T12:00:00Z"), // Monday
        ];
        let policy = BucketPolicy {
            week_start: WeekStart::Sunday,
            fill_gaps: false,
        };
        let series = UsageAggregator::filter_and_bucket(
            &events,
            &range("2024-01-01", "2024-01-31"),
            Granularity::Week,
            policy,
        );
        assert_eq!(
            pairs(&series),
            vec![("2023-12-31".to_string(), 1), ("2024-01-07".to_string(), 2)]
        );
    }

    #[test]
    fn test_monthly_counts_across_year_end() {
        let events = vec![
            event("2023-12-31T23:59:59Z"),
            event("2024-01-01T00:00:00Z"),
            event("2024-01-31T12:00:00Z"),
            event("2024-02-29T12:00:00Z"),
        ];
        let series = UsageAggregator::filter_and_bucket(
            &events,
            &range("2023-12-01", "2024-02-29"),
            Granularity::Month,
            BucketPolicy::default(),
        );
        assert_eq!(
            pairs(&series),
            vec![
                ("2023-12-01".to_string(), 1),
                ("2024-01-01".to_string(), 2),
                ("2024-02-01".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_range_with_no_events_is_empty_series() {
        let series = UsageAggregator::filter_and_bucket(
            &scenario_events(),
            &range("2023-06-01", "2023-06-30"),
            Granularity::Day,
            BucketPolicy::default(),
        );
        assert!(series.is_empty());
        assert_eq!(series.total(), 0);
    }

    #[test]
    fn test_output_sorted_regardless_of_input_order() {
        let events = vec![
            event("2024-01-20T08:00:00Z"),
            event("2024-01-10T08:00:00Z"),
            event("2024-01-15T08:00:00Z"),
        ];
        let series = UsageAggregator::filter_and_bucket(
            &events,
            &range("2024-01-01", "2024-01-31"),
            Granularity::Day,
            BucketPolicy::default(),
        );
        let keys: Vec<String> = series.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(keys, vec!["2024-01-10", "2024-01-15", "2024-01-20"]);
    }

    #[test]
    fn test_boundaries_are_inclusive_to_the_microsecond() {
        let events = vec![
            event("2023-12-31T23:59:59.999999Z"), // just before start
            event("2024-01-01T00:00:00Z"),        // exactly start
            event("2024-01-02T23:59:59.999999Z"), // last instant of end
            event("2024-01-03T00:00:00Z"),        // just after end
        ];
        let r = range("2024-01-01", "2024-01-02");
        let kept = UsageAggregator::filter_events(&events, &r);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].timestamp, utc("2024-01-01T00:00:00Z"));
        assert_eq!(kept[1].timestamp, utc("2024-01-02T23:59:59.999999Z"));
    }

    #[test]
    fn test_sum_of_counts_matches_filtered_events() {
        let mut events = Vec::new();
        for day in 1..=28 {
            for hour in [0, 7, 13, 23] {
                if (day + hour) % 3 != 0 {
                    events.push(event(&format!("2024-02-{:02}T{:02}:30:00Z", day, hour)));
                }
            }
        }
        let r = range("2024-02-05", "2024-02-19");
        let expected = UsageAggregator::filter_events(&events, &r).len() as u64;

        for g in Granularity::ALL {
            for fill_gaps in [false, true] {
                for week_start in [WeekStart::Monday, WeekStart::Sunday] {
                    let policy = BucketPolicy {
                        week_start,
                        fill_gaps,
                    };
                    let series = UsageAggregator::filter_and_bucket(&events, &r, g, policy);
                    assert_eq!(series.total(), expected, "{} {:?}", g, policy);
                }
            }
        }
    }

    #[test]
    fn test_identical_inputs_identical_output() {
        let events = scenario_events();
        let r = range("2024-01-01", "2024-01-31");
        let policy = BucketPolicy::default();
        let a = UsageAggregator::filter_and_bucket(&events, &r, Granularity::Week, policy);
        let b = UsageAggregator::filter_and_bucket(&events, &r, Granularity::Week, policy);
        assert_eq!(a, b);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let events = vec![event("2024-01-02T00:00:00Z"), event("2024-01-01T00:00:00Z")];
        let before = events.clone();
        let _ = UsageAggregator::filter_and_bucket(
            &events,
            &range("2024-01-01", "2024-01-31"),
            Granularity::Month,
            BucketPolicy::default(),
        );
        assert_eq!(events, before);
    }

    // ── gap filling ───────────────────────────────────────────────────────────

    #[test]
    fn test_gaps_omitted_by_default() {
        let events = vec![event("2024-01-01T09:00:00Z"), event("2024-01-04T09:00:00Z")];
        let series = UsageAggregator::filter_and_bucket(
            &events,
            &range("2024-01-01", "2024-01-31"),
            Granularity::Day,
            BucketPolicy::default(),
        );
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_fill_gaps_daily() {
        let events = vec![event("2024-01-01T09:00:00Z"), event("2024-01-04T09:00:00Z")];
        let policy = BucketPolicy {
            fill_gaps: true,
            ..Default::default()
        };
        let series = UsageAggregator::filter_and_bucket(
            &events,
            &range("2023-12-01", "2024-01-31"),
            Granularity::Day,
            policy,
        );
        assert_eq!(
            pairs(&series),
            vec![
                ("2024-01-01".to_string(), 1),
                ("2024-01-02".to_string(), 0),
                ("2024-01-03".to_string(), 0),
                ("2024-01-04".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_fill_gaps_weekly_and_monthly() {
        let events = vec![event("2024-01-03T09:00:00Z"), event("2024-03-20T09:00:00Z")];
        let policy = BucketPolicy {
            fill_gaps: true,
            ..Default::default()
        };
        let r = range("2024-01-01", "2024-12-31");

        let monthly = UsageAggregator::filter_and_bucket(&events, &r, Granularity::Month, policy);
        assert_eq!(
            pairs(&monthly),
            vec![
                ("2024-01-01".to_string(), 1),
                ("2024-02-01".to_string(), 0),
                ("2024-03-01".to_string(), 1),
            ]
        );

        let weekly = UsageAggregator::filter_and_bucket(&events, &r, Granularity::Week, policy);
        // 2024-01-01 .. 2024-03-18 inclusive, Mondays.
        assert_eq!(weekly.len(), 12);
        assert_eq!(weekly.points[0].period, date("2024-01-01"));
        assert_eq!(weekly.points[11].period, date("2024-03-18"));
        assert_eq!(weekly.total(), 2);
    }

    #[test]
    fn test_fill_gaps_single_bucket_and_empty() {
        let policy = BucketPolicy {
            fill_gaps: true,
            ..Default::default()
        };
        let r = range("2024-01-01", "2024-01-31");

        let one = UsageAggregator::filter_and_bucket(
            &[event("2024-01-05T00:00:00Z")],
            &r,
            Granularity::Day,
            policy,
        );
        assert_eq!(one.len(), 1);

        let none = UsageAggregator::filter_and_bucket(&[], &r, Granularity::Day, policy);
        assert!(none.is_empty());
    }

    // ── bucket_of ─────────────────────────────────────────────────────────────

    #[test]
    fn test_bucket_of_uses_utc_date() {
        let ev = event("2024-01-07T23:30:00-02:00"); // 2024-01-08 01:30 UTC, a Monday
        assert_eq!(
            UsageAggregator::bucket_of(&ev, Granularity::Week, BucketPolicy::default()),
            date("2024-01-08")
        );
    }
}
