use std::collections::HashSet;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{change_rate, local_date, percent, week_start};
use crate::models::GroupData;

pub const WEEK_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyHealthPoint {
    pub label: String,
    pub week_start: NaiveDate,
    pub attendance_rate: f64,
    pub activity_count: usize,
    pub new_member_count: usize,
    pub rsvp_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthMetric {
    pub current: f64,
    pub change_rate: Option<f64>,
    pub trend: Vec<f64>,
}

impl HealthMetric {
    fn from_trend(trend: Vec<f64>) -> Self {
        let current = trend.last().copied().unwrap_or(0.0);
        let previous = trend
            .len()
            .checked_sub(2)
            .map(|index| trend[index])
            .unwrap_or(0.0);
        HealthMetric {
            current,
            change_rate: change_rate(current, previous),
            trend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupHealthTrends {
    pub attendance_rate: HealthMetric,
    pub activity_count: HealthMetric,
    pub new_member_count: HealthMetric,
    pub rsvp_rate: HealthMetric,
    pub weeks: Vec<WeeklyHealthPoint>,
}

/// Weekly health for the eight Monday-aligned weeks ending with the current
/// one, oldest first. Weeks without data are zero-filled.
pub fn health_trends(data: &GroupData, now: DateTime<FixedOffset>) -> GroupHealthTrends {
    let offset = *now.offset();
    let current_week = week_start(now.date_naive());
    let member_count = data.members.len();

    let mut weeks = Vec::with_capacity(WEEK_COUNT);
    for (position, weeks_back) in (0..WEEK_COUNT).rev().enumerate() {
        let start = current_week - Duration::weeks(weeks_back as i64);
        let end = start + Duration::days(7);
        let in_week = |date: NaiveDate| date >= start && date < end;

        let schedule_ids: HashSet<Uuid> = data
            .schedules
            .iter()
            .filter(|schedule| in_week(local_date(schedule.starts_at, &offset)))
            .map(|schedule| schedule.id)
            .collect();

        let (attended, recorded) = data
            .attendance
            .iter()
            .filter(|record| schedule_ids.contains(&record.schedule_id))
            .fold((0usize, 0usize), |(attended, recorded), record| {
                (attended + usize::from(record.status.attended()), recorded + 1)
            });

        let posts = data
            .posts
            .iter()
            .filter(|post| post.is_live() && in_week(local_date(post.created_at, &offset)))
            .count();
        let comments = data
            .comments
            .iter()
            .filter(|comment| in_week(local_date(comment.created_at, &offset)))
            .count();

        let new_member_count = data
            .members
            .iter()
            .filter(|member| in_week(local_date(member.joined_at, &offset)))
            .count();

        let responses = data
            .rsvps
            .iter()
            .filter(|rsvp| schedule_ids.contains(&rsvp.schedule_id))
            .count();

        weeks.push(WeeklyHealthPoint {
            label: format!("W{}", position + 1),
            week_start: start,
            attendance_rate: percent(attended, recorded),
            activity_count: posts + comments,
            new_member_count,
            rsvp_rate: percent(responses, schedule_ids.len() * member_count),
        });
    }

    GroupHealthTrends {
        attendance_rate: HealthMetric::from_trend(
            weeks.iter().map(|week| week.attendance_rate).collect(),
        ),
        activity_count: HealthMetric::from_trend(
            weeks.iter().map(|week| week.activity_count as f64).collect(),
        ),
        new_member_count: HealthMetric::from_trend(
            weeks.iter().map(|week| week.new_member_count as f64).collect(),
        ),
        rsvp_rate: HealthMetric::from_trend(weeks.iter().map(|week| week.rsvp_rate).collect()),
        weeks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::*;
    use crate::models::AttendanceStatus;

    #[test]
    fn trend_is_always_eight_weeks_oldest_first() {
        let now = now_kst(2026, 3, 18, 12);
        let trends = health_trends(&GroupData::default(), now);

        assert_eq!(trends.weeks.len(), WEEK_COUNT);
        assert_eq!(trends.attendance_rate.trend.len(), WEEK_COUNT);
        assert_eq!(trends.activity_count.trend.len(), WEEK_COUNT);
        assert_eq!(trends.new_member_count.trend.len(), WEEK_COUNT);
        assert_eq!(trends.rsvp_rate.trend.len(), WEEK_COUNT);
        assert_eq!(trends.weeks[0].label, "W1");
        assert_eq!(
            trends.weeks[7].week_start,
            NaiveDate::from_ymd_opt(2026, 3, 16).unwrap()
        );
        assert_eq!(
            trends.weeks[0].week_start,
            NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()
        );
        assert!(trends.attendance_rate.trend.iter().all(|v| *v == 0.0));
        assert_eq!(trends.attendance_rate.change_rate, None);
    }

    #[test]
    fn weekly_rates_and_change_rate() {
        let group_id = Uuid::new_v4();
        let now = now_kst(2026, 3, 18, 12);
        let a = member("a", at(2025, 12, 1, 10));
        let b = member("b", at(2026, 3, 16, 10));

        let last_week = schedule(group_id, at(2026, 3, 10, 19));
        let this_week = schedule(group_id, at(2026, 3, 17, 19));

        let data = GroupData {
            attendance: vec![
                attendance(&last_week, &a, AttendanceStatus::Present),
                attendance(&last_week, &b, AttendanceStatus::Absent),
                attendance(&this_week, &a, AttendanceStatus::Late),
                attendance(&this_week, &b, AttendanceStatus::Present),
            ],
            rsvps: vec![rsvp(&this_week, &a)],
            members: vec![a, b],
            schedules: vec![last_week, this_week],
            ..Default::default()
        };

        let trends = health_trends(&data, now);
        assert_eq!(trends.attendance_rate.trend[6], 50.0);
        assert_eq!(trends.attendance_rate.current, 100.0);
        assert_eq!(trends.attendance_rate.change_rate, Some(100.0));
        assert_eq!(trends.new_member_count.current, 1.0);
        assert_eq!(trends.new_member_count.change_rate, None);
        assert_eq!(trends.rsvp_rate.current, 50.0);
        assert_eq!(trends.rsvp_rate.trend[6], 0.0);
        assert_eq!(trends.rsvp_rate.change_rate, None);
    }

    #[test]
    fn board_activity_counts_posts_and_comments() {
        let group_id = Uuid::new_v4();
        let now = now_kst(2026, 3, 18, 12);
        let a = member("a", at(2025, 12, 1, 10));
        let live = post(group_id, &a, at(2026, 3, 16, 9));
        let mut gone = post(group_id, &a, at(2026, 3, 16, 10));
        gone.deleted_at = Some(at(2026, 3, 17, 10));

        let data = GroupData {
            comments: vec![
                comment(&live, &a, at(2026, 3, 17, 9)),
                comment(&live, &a, at(2026, 3, 9, 9)),
            ],
            posts: vec![live, gone],
            members: vec![a],
            ..Default::default()
        };

        let trends = health_trends(&data, now);
        assert_eq!(trends.activity_count.current, 2.0);
        assert_eq!(trends.activity_count.trend[6], 1.0);
        assert_eq!(trends.activity_count.change_rate, Some(100.0));
    }
}
