//! Five-field cron expressions: `minute hour day-of-month month day-of-week`.
//!
//! Fields accept `*`, single values, ranges (`a-b`), lists (`a,b,c`), and
//! steps (`*/n`, `a-b/n`). Day-of-week runs 0–6 with 0 = Sunday; 7 is
//! accepted as an alias for Sunday. Evaluation follows the classic cron
//! rule: when both day fields are restricted, a day matches if EITHER
//! matches. All evaluation is minute-resolution UTC.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use harvester_core::{HarvesterError, HarvesterResult};

/// Allowed value sets for one field, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldMask {
    bits: u64,
    /// Whether the field was written as a bare `*` (matters for the
    /// day-of-month/day-of-week OR rule).
    is_wildcard: bool,
}

impl FieldMask {
    fn contains(&self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

/// A parsed, immutable cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    minutes: FieldMask,
    hours: FieldMask,
    days_of_month: FieldMask,
    months: FieldMask,
    days_of_week: FieldMask,
    source: String,
}

impl CronExpression {
    /// Parse a 5-field expression; anything else is `InvalidCron`.
    pub fn parse(expr: &str) -> HarvesterResult<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(HarvesterError::invalid_cron(
                expr,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let minutes = parse_field(expr, fields[0], 0, 59)?;
        let hours = parse_field(expr, fields[1], 0, 23)?;
        let days_of_month = parse_field(expr, fields[2], 1, 31)?;
        let months = parse_field(expr, fields[3], 1, 12)?;
        let days_of_week = parse_dow_field(expr, fields[4])?;

        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            source: expr.to_string(),
        })
    }

    /// Pure syntax check, usable without keeping the parsed value.
    pub fn validate(expr: &str) -> HarvesterResult<()> {
        Self::parse(expr).map(|_| ())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the wall-clock minute containing `at` matches.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.months.contains(at.month())
            && self.day_matches(at)
            && self.hours.contains(at.hour())
            && self.minutes.contains(at.minute())
    }

    fn day_matches(&self, at: DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(at.day());
        let dow = self
            .days_of_week
            .contains(at.weekday().num_days_from_sunday());

        match (self.days_of_month.is_wildcard, self.days_of_week.is_wildcard) {
            // both restricted: either field may claim the day
            (false, false) => dom || dow,
            (false, true) => dom,
            (true, false) => dow,
            (true, true) => true,
        }
    }

    /// The next fire strictly after `after`, or `None` if no minute within
    /// the search horizon (four years) matches.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Truncate to the minute, then step forward.
        let mut candidate = Utc
            .with_ymd_and_hms(
                after.year(),
                after.month(),
                after.day(),
                after.hour(),
                after.minute(),
                0,
            )
            .single()?
            + Duration::minutes(1);

        let horizon = after + Duration::days(4 * 366);
        while candidate <= horizon {
            if !self.months.contains(candidate.month()) {
                // jump to the first minute of the next month
                let (year, month) = if candidate.month() == 12 {
                    (candidate.year() + 1, 1)
                } else {
                    (candidate.year(), candidate.month() + 1)
                };
                candidate = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(candidate) {
                candidate = Utc
                    .with_ymd_and_hms(
                        candidate.year(),
                        candidate.month(),
                        candidate.day(),
                        0,
                        0,
                        0,
                    )
                    .single()?
                    + Duration::days(1);
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = Utc
                    .with_ymd_and_hms(
                        candidate.year(),
                        candidate.month(),
                        candidate.day(),
                        candidate.hour(),
                        0,
                        0,
                    )
                    .single()?
                    + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }
        None
    }

    /// Time remaining until the next fire, measured from `now`.
    pub fn until_next_fire(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_fire(now).map(|next| next - now)
    }
}

impl std::fmt::Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(expr: &str, field: &str, min: u32, max: u32) -> HarvesterResult<FieldMask> {
    let mut bits = 0u64;
    let is_wildcard = field == "*";

    for item in field.split(',') {
        if item.is_empty() {
            return Err(HarvesterError::invalid_cron(expr, "empty list item"));
        }

        let (range_part, step) = match item.split_once('/') {
            Some((range, step_str)) => {
                let step: u32 = step_str.parse().map_err(|_| {
                    HarvesterError::invalid_cron(expr, format!("invalid step: {step_str}"))
                })?;
                if step == 0 {
                    return Err(HarvesterError::invalid_cron(expr, "step cannot be zero"));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let start = parse_value(expr, a, min, max)?;
            let end = parse_value(expr, b, min, max)?;
            if start > end {
                return Err(HarvesterError::invalid_cron(
                    expr,
                    format!("inverted range: {range_part}"),
                ));
            }
            (start, end)
        } else {
            let value = parse_value(expr, range_part, min, max)?;
            (value, value)
        };

        let mut value = start;
        while value <= end {
            bits |= 1u64 << value;
            value += step;
        }
    }

    Ok(FieldMask { bits, is_wildcard })
}

fn parse_value(expr: &str, raw: &str, min: u32, max: u32) -> HarvesterResult<u32> {
    let value: u32 = raw
        .parse()
        .map_err(|_| HarvesterError::invalid_cron(expr, format!("invalid value: {raw}")))?;
    if value < min || value > max {
        return Err(HarvesterError::invalid_cron(
            expr,
            format!("value {value} out of range {min}-{max}"),
        ));
    }
    Ok(value)
}

/// Day-of-week field with 7 folded onto Sunday.
fn parse_dow_field(expr: &str, field: &str) -> HarvesterResult<FieldMask> {
    let mut mask = parse_field(expr, field, 0, 7)?;
    if mask.contains(7) {
        mask.bits = (mask.bits & !(1u64 << 7)) | 1;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        for expr in ["", "* * * *", "* * * * * *", "invalid"] {
            let err = CronExpression::parse(expr).unwrap_err();
            assert!(
                err.to_string().starts_with(&format!("Invalid cron schedule: {expr}")),
                "message for {expr:?}: {err}"
            );
        }
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(CronExpression::parse("60 * * * *").is_err());
        assert!(CronExpression::parse("* 24 * * *").is_err());
        assert!(CronExpression::parse("* * 0 * *").is_err());
        assert!(CronExpression::parse("* * 32 * *").is_err());
        assert!(CronExpression::parse("* * * 13 *").is_err());
        assert!(CronExpression::parse("* * * * 8").is_err());
        assert!(CronExpression::parse("*/0 * * * *").is_err());
        assert!(CronExpression::parse("5-1 * * * *").is_err());
    }

    #[test]
    fn test_every_minute_fires_each_minute() {
        let cron = CronExpression::parse("*/1 * * * *").unwrap();
        let now = at(2025, 3, 10, 14, 7);
        assert_eq!(cron.next_fire(now), Some(at(2025, 3, 10, 14, 8)));
        // mid-minute input truncates to the minute boundary
        let mid = at(2025, 3, 10, 14, 7) + Duration::seconds(30);
        assert_eq!(cron.next_fire(mid), Some(at(2025, 3, 10, 14, 8)));
    }

    #[test]
    fn test_every_three_hours() {
        let cron = CronExpression::parse("0 */3 * * *").unwrap();
        assert_eq!(
            cron.next_fire(at(2025, 3, 10, 14, 7)),
            Some(at(2025, 3, 10, 15, 0))
        );
        assert_eq!(
            cron.next_fire(at(2025, 3, 10, 15, 0)),
            Some(at(2025, 3, 10, 18, 0))
        );
    }

    #[test]
    fn test_daily_at_two() {
        let cron = CronExpression::parse("0 2 * * *").unwrap();
        assert_eq!(
            cron.next_fire(at(2025, 3, 10, 2, 0)),
            Some(at(2025, 3, 11, 2, 0))
        );
        assert_eq!(
            cron.next_fire(at(2025, 3, 10, 1, 59)),
            Some(at(2025, 3, 10, 2, 0))
        );
    }

    #[test]
    fn test_weekly_sunday_midnight() {
        let cron = CronExpression::parse("0 0 * * 0").unwrap();
        // 2025-03-10 is a Monday; next Sunday is the 16th
        assert_eq!(
            cron.next_fire(at(2025, 3, 10, 5, 0)),
            Some(at(2025, 3, 16, 0, 0))
        );
        // 7 is an alias for Sunday
        let alias = CronExpression::parse("0 0 * * 7").unwrap();
        assert_eq!(
            alias.next_fire(at(2025, 3, 10, 5, 0)),
            Some(at(2025, 3, 16, 0, 0))
        );
    }

    #[test]
    fn test_lists_and_ranges() {
        let cron = CronExpression::parse("15,45 9-17 * * 1-5").unwrap();
        // Friday 17:45 → Monday 09:15
        assert_eq!(
            cron.next_fire(at(2025, 3, 14, 17, 45)),
            Some(at(2025, 3, 17, 9, 15))
        );
        assert_eq!(
            cron.next_fire(at(2025, 3, 12, 9, 15)),
            Some(at(2025, 3, 12, 9, 45))
        );
    }

    #[test]
    fn test_dom_dow_or_rule() {
        // both restricted: the 15th OR any Monday
        let cron = CronExpression::parse("0 0 15 * 1").unwrap();
        // from Sat 2025-03-08: Monday the 10th comes before the 15th
        assert_eq!(
            cron.next_fire(at(2025, 3, 8, 12, 0)),
            Some(at(2025, 3, 10, 0, 0))
        );
        // from the 11th (Tue): the 15th comes before next Monday (17th)
        assert_eq!(
            cron.next_fire(at(2025, 3, 11, 12, 0)),
            Some(at(2025, 3, 15, 0, 0))
        );
    }

    #[test]
    fn test_month_rollover() {
        let cron = CronExpression::parse("30 6 1 * *").unwrap();
        assert_eq!(
            cron.next_fire(at(2025, 1, 31, 23, 59)),
            Some(at(2025, 2, 1, 6, 30))
        );
        // year boundary
        assert_eq!(
            cron.next_fire(at(2025, 12, 15, 0, 0)),
            Some(at(2026, 1, 1, 6, 30))
        );
    }

    #[test]
    fn test_specific_month() {
        let cron = CronExpression::parse("0 12 25 12 *").unwrap();
        assert_eq!(
            cron.next_fire(at(2025, 3, 1, 0, 0)),
            Some(at(2025, 12, 25, 12, 0))
        );
    }

    #[test]
    fn test_matches_is_consistent_with_next_fire() {
        let cron = CronExpression::parse("*/5 * * * *").unwrap();
        let fire = cron.next_fire(at(2025, 6, 1, 10, 2)).unwrap();
        assert!(cron.matches(fire));
        assert_eq!(fire.minute() % 5, 0);
    }

    #[test]
    fn test_validate_is_pure() {
        assert!(CronExpression::validate("*/1 * * * *").is_ok());
        let err = CronExpression::validate("invalid").unwrap_err();
        assert!(err.to_string().contains("Invalid cron schedule: invalid"));
    }
}
