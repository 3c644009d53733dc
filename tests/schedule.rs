use std::time::Duration;

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use telegram_dice_bot::{next_reset_after, next_reset_at, wait_until_reset};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

#[test]
fn next_reset_is_the_following_midnight() {
    assert_eq!(
        next_reset_after(at(2025, 3, 14, 15, 30, 0)),
        at(2025, 3, 15, 0, 0, 0)
    );
    assert_eq!(
        next_reset_after(at(2025, 12, 31, 23, 59, 59)),
        at(2026, 1, 1, 0, 0, 0)
    );
}

#[test]
fn exactly_midnight_schedules_the_next_day() {
    // a run that fires on the dot must not be scheduled again immediately
    assert_eq!(
        next_reset_after(at(2025, 3, 14, 0, 0, 0)),
        at(2025, 3, 15, 0, 0, 0)
    );
}

/// UTC+1 that springs forward to UTC+2 at local midnight on 2025-03-30, so
/// the wall clock jumps from 23:59:59 straight to 01:00.
#[derive(Clone, Copy, Debug)]
struct MidnightDst;

fn plus_hours(h: i32) -> FixedOffset {
    FixedOffset::east_opt(h * 3600).unwrap()
}

impl TimeZone for MidnightDst {
    type Offset = FixedOffset;

    fn from_offset(_: &FixedOffset) -> Self {
        MidnightDst
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
        self.offset_from_local_datetime(&local.and_hms_opt(12, 0, 0).unwrap())
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        if *local < at(2025, 3, 30, 0, 0, 0) {
            LocalResult::Single(plus_hours(1))
        } else if *local < at(2025, 3, 30, 1, 0, 0) {
            LocalResult::None
        } else {
            LocalResult::Single(plus_hours(2))
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        if *utc < at(2025, 3, 29, 23, 0, 0) {
            plus_hours(1)
        } else {
            plus_hours(2)
        }
    }
}

fn local(naive: NaiveDateTime) -> DateTime<MidnightDst> {
    MidnightDst.from_local_datetime(&naive).single().unwrap()
}

#[test]
fn wait_is_measured_on_real_time() {
    let now = local(at(2025, 3, 28, 23, 30, 0));
    assert_eq!(wait_until_reset(&now), Duration::from_secs(30 * 60));

    let fixed = plus_hours(9).from_local_datetime(&at(2025, 6, 1, 18, 0, 0)).unwrap();
    assert_eq!(wait_until_reset(&fixed), Duration::from_secs(6 * 3600));
}

#[test]
fn skipped_midnight_resets_at_the_first_existing_hour() {
    // 22:00 at UTC+1 is 21:00Z; the clock jumps to 01:00 UTC+2 at 23:00Z
    let now = local(at(2025, 3, 29, 22, 0, 0));
    let next = next_reset_at(&now);
    assert_eq!(next.naive_local(), at(2025, 3, 30, 1, 0, 0));
    assert_eq!(next.naive_utc(), at(2025, 3, 29, 23, 0, 0));
    // two real hours, not the three a wall-clock subtraction would give
    assert_eq!(wait_until_reset(&now), Duration::from_secs(2 * 3600));
}

#[test]
fn the_day_after_the_jump_is_a_plain_midnight() {
    let now = local(at(2025, 3, 30, 12, 0, 0));
    assert_eq!(next_reset_at(&now).naive_local(), at(2025, 3, 31, 0, 0, 0));
    assert_eq!(wait_until_reset(&now), Duration::from_secs(12 * 3600));
}
