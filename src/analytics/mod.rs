//! Derived group metrics. Every function here is a pure computation over a
//! [`GroupData`](crate::models::GroupData) snapshot and an explicit "now";
//! nothing is cached or written back.

pub mod activity;
pub mod consistency;
pub mod forecast;
pub mod health;
pub mod schedule_time;
pub mod snapshot;
pub mod winback;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};

/// Percentage change from `previous` to `current`, rounded to a whole
/// percent. `None` when there is nothing to compare against.
pub fn change_rate(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some(((current - previous) / previous * 100.0).round())
}

/// `part / whole` as a whole percentage, 0 for an empty denominator.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 100.0).round()
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Calendar date of a UTC timestamp on the group's clock.
pub fn local_date(ts: DateTime<Utc>, offset: &FixedOffset) -> NaiveDate {
    ts.with_timezone(offset).date_naive()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use uuid::Uuid;

    use crate::models::{
        AttendanceMethod, AttendanceRecord, AttendanceStatus, Comment, Member, Post, Rsvp,
        RsvpResponse, Schedule,
    };

    pub fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    /// A wall-clock time in KST, returned as UTC.
    pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        kst()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    pub fn now_kst(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        kst().with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    pub fn member(name: &str, joined_at: DateTime<Utc>) -> Member {
        Member {
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            avatar_url: None,
            joined_at,
        }
    }

    pub fn schedule(group_id: Uuid, starts_at: DateTime<Utc>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            group_id,
            title: "Practice".to_string(),
            starts_at,
            ends_at: starts_at + chrono::Duration::hours(2),
            attendance_method: AttendanceMethod::Admin,
        }
    }

    pub fn attendance(
        schedule: &Schedule,
        member: &Member,
        status: AttendanceStatus,
    ) -> AttendanceRecord {
        AttendanceRecord {
            schedule_id: schedule.id,
            user_id: member.user_id,
            status,
            checked_at: schedule.starts_at,
        }
    }

    pub fn rsvp(schedule: &Schedule, member: &Member) -> Rsvp {
        Rsvp {
            schedule_id: schedule.id,
            user_id: member.user_id,
            response: RsvpResponse::Going,
            responded_at: schedule.starts_at - chrono::Duration::days(1),
        }
    }

    pub fn post(group_id: Uuid, author: &Member, created_at: DateTime<Utc>) -> Post {
        Post {
            id: Uuid::new_v4(),
            group_id,
            author_id: author.user_id,
            title: "Notice".to_string(),
            created_at,
            deleted_at: None,
        }
    }

    pub fn comment(post: &Post, author: &Member, created_at: DateTime<Utc>) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            post_id: post.id,
            author_id: author.user_id,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_rate_is_none_without_a_baseline() {
        assert_eq!(change_rate(5.0, 0.0), None);
        assert_eq!(change_rate(0.0, 0.0), None);
    }

    #[test]
    fn change_rate_rounds_to_whole_percent() {
        assert_eq!(change_rate(15.0, 10.0), Some(50.0));
        assert_eq!(change_rate(2.0, 3.0), Some(-33.0));
    }

    #[test]
    fn weeks_start_on_monday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(week_start(sunday), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        let monday = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn local_date_follows_group_offset() {
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let late_utc = NaiveDate::from_ymd_opt(2026, 3, 9)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(
            local_date(late_utc, &kst),
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
        );
    }
}
