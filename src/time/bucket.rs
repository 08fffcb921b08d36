//! Floors a timestamp down to the start of its containing bar bucket.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use super::timeframe::{TimeUnit, Timeframe};

/// A Monday used as the reference point for flooring multi-week buckets.
/// Only `interval == 1` is reachable through the closed set of recognized
/// timeframe names, but the floor rule is defined for any positive
/// interval.
const WEEK_EPOCH: (i32, u32, u32) = (1970, 1, 5);

/// Map `(ts, timeframe)` to the instant identifying the bucket `ts` falls
/// into. Lower fields than the timeframe's unit are always zeroed; the
/// unit's own field is floored to a multiple of `interval` within its
/// natural parent period.
pub fn bucket_start(ts: DateTime<Utc>, tf: Timeframe) -> DateTime<Utc> {
    let interval = i64::from(tf.interval.max(1));
    match tf.unit {
        TimeUnit::Second => {
            let second = (i64::from(ts.second()) / interval) * interval;
            ts.date_naive()
                .and_hms_opt(ts.hour(), ts.minute(), 0)
                .unwrap()
                .and_utc()
                + Duration::seconds(second)
        }
        TimeUnit::Minute => {
            let minute = (i64::from(ts.minute()) / interval) * interval;
            ts.date_naive()
                .and_hms_opt(ts.hour(), 0, 0)
                .unwrap()
                .and_utc()
                + Duration::minutes(minute)
        }
        TimeUnit::Hour => {
            let hour = (i64::from(ts.hour()) / interval) * interval;
            ts.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc() + Duration::hours(hour)
        }
        TimeUnit::Day => {
            let day0 = i64::from(ts.day() - 1);
            let floored_day0 = (day0 / interval) * interval;
            let day = u32::try_from(floored_day0).unwrap_or(0) + 1;
            let day = day.min(days_in_month(ts.year(), ts.month()));
            NaiveDate::from_ymd_opt(ts.year(), ts.month(), day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
        }
        TimeUnit::Week => {
            let monday = ts.date_naive() - Duration::days(i64::from(ts.weekday().num_days_from_monday()));
            let epoch_monday =
                NaiveDate::from_ymd_opt(WEEK_EPOCH.0, WEEK_EPOCH.1, WEEK_EPOCH.2).unwrap();
            let weeks_since_epoch = (monday - epoch_monday).num_days().div_euclid(7);
            let floored_weeks = weeks_since_epoch.div_euclid(interval) * interval;
            let bucket_monday = epoch_monday + Duration::weeks(floored_weeks);
            bucket_monday.and_hms_opt(0, 0, 0).unwrap().and_utc()
        }
        TimeUnit::Month => {
            let month_index0 = i64::from(ts.year()) * 12 + i64::from(ts.month() - 1);
            let floored_index0 = month_index0.div_euclid(interval) * interval;
            let year = i32::try_from(floored_index0.div_euclid(12)).unwrap();
            let month = u32::try_from(floored_index0.rem_euclid(12)).unwrap() + 1;
            NaiveDate::from_ymd_opt(year, month, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap();
    let this_month_first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    (next_month_first - this_month_first).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn one_minute_bucket_floors_seconds() {
        let tf = Timeframe::new(1, TimeUnit::Minute);
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 12, 0, 30), tf),
            ts(2024, 1, 1, 12, 0, 0)
        );
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 12, 0, 59), tf),
            ts(2024, 1, 1, 12, 0, 0)
        );
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 12, 1, 0), tf),
            ts(2024, 1, 1, 12, 1, 0)
        );
    }

    #[test]
    fn five_minute_bucket_floors_within_hour() {
        let tf = Timeframe::new(5, TimeUnit::Minute);
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 12, 4, 59), tf),
            ts(2024, 1, 1, 12, 0, 0)
        );
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 12, 5, 0), tf),
            ts(2024, 1, 1, 12, 5, 0)
        );
    }

    #[test]
    fn seven_minute_bucket_resets_every_hour() {
        // 7 does not divide 60: buckets are 0,7,...,56 then reset at the
        // next hour, since flooring is always relative to the hour.
        let tf = Timeframe::new(7, TimeUnit::Minute);
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 12, 59, 0), tf),
            ts(2024, 1, 1, 12, 56, 0)
        );
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 13, 0, 0), tf),
            ts(2024, 1, 1, 13, 0, 0)
        );
    }

    #[test]
    fn four_hour_bucket() {
        let tf = Timeframe::new(4, TimeUnit::Hour);
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 5, 30, 0), tf),
            ts(2024, 1, 1, 4, 0, 0)
        );
    }

    #[test]
    fn one_day_bucket_is_midnight() {
        let tf = Timeframe::new(1, TimeUnit::Day);
        assert_eq!(
            bucket_start(ts(2024, 1, 1, 23, 59, 59), tf),
            ts(2024, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn one_week_bucket_is_monday_midnight() {
        let tf = Timeframe::new(1, TimeUnit::Week);
        // 2024-01-03 is a Wednesday; the ISO week's Monday is 2024-01-01.
        assert_eq!(
            bucket_start(ts(2024, 1, 3, 15, 0, 0), tf),
            ts(2024, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn one_month_bucket_is_first_of_month_midnight() {
        let tf = Timeframe::new(1, TimeUnit::Month);
        assert_eq!(
            bucket_start(ts(2024, 3, 17, 15, 0, 0), tf),
            ts(2024, 3, 1, 0, 0, 0)
        );
    }
}
