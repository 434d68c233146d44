use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{change_rate, local_date, percent, week_start};
use crate::errors::AppError;
use crate::models::GroupData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformancePeriod {
    Week,
    Month,
}

impl FromStr for PerformancePeriod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "week" => Ok(PerformancePeriod::Week),
            "month" => Ok(PerformancePeriod::Month),
            other => Err(AppError::Validation(format!(
                "period must be 'week' or 'month', got '{other}'"
            ))),
        }
    }
}

impl PerformancePeriod {
    /// `[start, end)` of the current period and the start of the one before.
    fn bounds(self, today: NaiveDate) -> (NaiveDate, NaiveDate, NaiveDate) {
        match self {
            PerformancePeriod::Week => {
                let start = week_start(today);
                (start - Duration::weeks(1), start, start + Duration::weeks(1))
            }
            PerformancePeriod::Month => {
                let start = today.with_day(1).unwrap_or(today);
                (start - Months::new(1), start, start + Months::new(1))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetric {
    pub value: f64,
    pub change_rate: Option<f64>,
}

impl PerformanceMetric {
    fn new(current: f64, previous: f64) -> Self {
        PerformanceMetric {
            value: current,
            change_rate: change_rate(current, previous),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopContributor {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub activity_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub period: PerformancePeriod,
    pub period_start: NaiveDate,
    pub schedule_count: PerformanceMetric,
    pub attendance_rate: PerformanceMetric,
    pub content_count: PerformanceMetric,
    pub new_member_count: PerformanceMetric,
    pub top_contributor: Option<TopContributor>,
}

struct PeriodStats {
    schedule_count: usize,
    attendance_rate: f64,
    content_count: usize,
    new_member_count: usize,
    contributions: HashMap<Uuid, usize>,
}

fn period_stats(
    data: &GroupData,
    offset: &FixedOffset,
    start: NaiveDate,
    end: NaiveDate,
) -> PeriodStats {
    let within = |ts: DateTime<chrono::Utc>| {
        let date = local_date(ts, offset);
        date >= start && date < end
    };

    let schedule_ids: HashSet<Uuid> = data
        .schedules
        .iter()
        .filter(|schedule| within(schedule.starts_at))
        .map(|schedule| schedule.id)
        .collect();

    let records: Vec<_> = data
        .attendance
        .iter()
        .filter(|record| schedule_ids.contains(&record.schedule_id))
        .collect();
    let attended = records.iter().filter(|record| record.status.attended()).count();

    let mut contributions: HashMap<Uuid, usize> = HashMap::new();
    for post in data.posts.iter().filter(|p| p.is_live() && within(p.created_at)) {
        *contributions.entry(post.author_id).or_default() += 1;
    }
    for comment in data.comments.iter().filter(|c| within(c.created_at)) {
        *contributions.entry(comment.author_id).or_default() += 1;
    }

    PeriodStats {
        schedule_count: schedule_ids.len(),
        attendance_rate: percent(attended, records.len()),
        content_count: contributions.values().sum(),
        new_member_count: data.members.iter().filter(|m| within(m.joined_at)).count(),
        contributions,
    }
}

/// This week (or month) against the previous one.
pub fn performance_snapshot(
    data: &GroupData,
    now: DateTime<FixedOffset>,
    period: PerformancePeriod,
) -> PerformanceSnapshot {
    let offset = *now.offset();
    let (previous_start, start, end) = period.bounds(now.date_naive());
    let current = period_stats(data, &offset, start, end);
    let previous = period_stats(data, &offset, previous_start, start);

    let mut top_contributor: Option<TopContributor> = None;
    for member in data.members.iter() {
        let count = current
            .contributions
            .get(&member.user_id)
            .copied()
            .unwrap_or(0);
        let leads = match &top_contributor {
            Some(top) => count > top.activity_count,
            None => count > 0,
        };
        if leads {
            top_contributor = Some(TopContributor {
                user_id: member.user_id,
                name: member.name.clone(),
                avatar_url: member.avatar_url.clone(),
                activity_count: count,
            });
        }
    }

    PerformanceSnapshot {
        period,
        period_start: start,
        schedule_count: PerformanceMetric::new(
            current.schedule_count as f64,
            previous.schedule_count as f64,
        ),
        attendance_rate: PerformanceMetric::new(current.attendance_rate, previous.attendance_rate),
        content_count: PerformanceMetric::new(
            current.content_count as f64,
            previous.content_count as f64,
        ),
        new_member_count: PerformanceMetric::new(
            current.new_member_count as f64,
            previous.new_member_count as f64,
        ),
        top_contributor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::*;
    use crate::models::AttendanceStatus;

    #[test]
    fn monthly_snapshot_compares_with_previous_month() {
        let group_id = Uuid::new_v4();
        let a = member("a", at(2025, 1, 1, 9));
        let b = member("b", at(2026, 3, 3, 9));
        let feb = schedule(group_id, at(2026, 2, 10, 19));
        let mar1 = schedule(group_id, at(2026, 3, 3, 19));
        let mar2 = schedule(group_id, at(2026, 3, 10, 19));
        let p = post(group_id, &b, at(2026, 3, 5, 9));

        let data = GroupData {
            attendance: vec![
                attendance(&feb, &a, AttendanceStatus::Present),
                attendance(&feb, &b, AttendanceStatus::Absent),
                attendance(&mar1, &a, AttendanceStatus::Present),
                attendance(&mar2, &b, AttendanceStatus::Late),
            ],
            comments: vec![
                comment(&p, &a, at(2026, 3, 6, 9)),
                comment(&p, &b, at(2026, 3, 7, 9)),
            ],
            posts: vec![p],
            schedules: vec![feb, mar1, mar2],
            members: vec![a, b],
            ..Default::default()
        };

        let snap = performance_snapshot(&data, now_kst(2026, 3, 20, 12), PerformancePeriod::Month);
        assert_eq!(snap.period_start, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(snap.schedule_count.value, 2.0);
        assert_eq!(snap.schedule_count.change_rate, Some(100.0));
        assert_eq!(snap.attendance_rate.value, 100.0);
        assert_eq!(snap.attendance_rate.change_rate, Some(100.0));
        assert_eq!(snap.content_count.value, 3.0);
        assert_eq!(snap.content_count.change_rate, None);
        assert_eq!(snap.new_member_count.value, 1.0);

        let top = snap.top_contributor.expect("top contributor");
        assert_eq!(top.name, "b");
        assert_eq!(top.activity_count, 2);
    }

    #[test]
    fn quiet_week_has_no_top_contributor() {
        let data = GroupData {
            members: vec![member("a", at(2025, 1, 1, 9))],
            ..Default::default()
        };
        let snap = performance_snapshot(&data, now_kst(2026, 3, 20, 12), PerformancePeriod::Week);
        assert_eq!(snap.period_start, NaiveDate::from_ymd_opt(2026, 3, 16).unwrap());
        assert!(snap.top_contributor.is_none());
        assert_eq!(snap.schedule_count.value, 0.0);
        assert_eq!(snap.schedule_count.change_rate, None);
    }

    #[test]
    fn parses_period_names() {
        assert_eq!("week".parse::<PerformancePeriod>().unwrap(), PerformancePeriod::Week);
        assert!("year".parse::<PerformancePeriod>().is_err());
    }
}
