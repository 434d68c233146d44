use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{local_date, percent, week_start};
use crate::models::{AttendanceStatus, GroupData};

pub const HEATMAP_WEEKS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub has_schedule: bool,
    pub is_present: bool,
    /// 0 none, 1 up to 50%, 2 up to 80%, 3 above 80% of the day's schedules.
    pub intensity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAttendance {
    pub week_index: usize,
    pub schedule_count: usize,
    pub present_count: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceConsistency {
    pub user_id: Uuid,
    pub weeks: Vec<Vec<HeatmapCell>>,
    pub weekly: Vec<WeeklyAttendance>,
    pub current_streak: usize,
    pub longest_streak: usize,
    pub overall_rate: f64,
    pub consistency_score: f64,
}

fn intensity(attended: usize, scheduled: usize) -> u8 {
    if scheduled == 0 || attended == 0 {
        return 0;
    }
    let ratio = attended as f64 / scheduled as f64;
    if ratio > 0.8 {
        3
    } else if ratio > 0.5 {
        2
    } else {
        1
    }
}

/// Twelve-week attendance heatmap and streaks for one member.
pub fn attendance_consistency(
    data: &GroupData,
    user_id: Uuid,
    now: DateTime<FixedOffset>,
) -> AttendanceConsistency {
    let offset = *now.offset();
    let today = now.date_naive();
    let first_day = week_start(today) - Duration::weeks(HEATMAP_WEEKS as i64 - 1);

    let statuses: HashMap<Uuid, AttendanceStatus> = data
        .attendance
        .iter()
        .filter(|record| record.user_id == user_id)
        .map(|record| (record.schedule_id, record.status))
        .collect();

    // Every schedule that has started, oldest first. Streaks span full history.
    let mut past: Vec<(NaiveDate, DateTime<chrono::Utc>, bool)> = data
        .schedules
        .iter()
        .filter(|schedule| schedule.starts_at.with_timezone(&offset) <= now)
        .map(|schedule| {
            let attended = statuses
                .get(&schedule.id)
                .map(|status| status.attended())
                .unwrap_or(false);
            (local_date(schedule.starts_at, &offset), schedule.starts_at, attended)
        })
        .collect();
    past.sort_by_key(|(_, starts_at, _)| *starts_at);

    let mut per_day: HashMap<NaiveDate, (usize, usize)> = HashMap::new();
    for (date, _, attended) in past.iter().filter(|(date, _, _)| *date >= first_day) {
        let entry = per_day.entry(*date).or_default();
        entry.0 += 1;
        entry.1 += usize::from(*attended);
    }

    let mut weeks = Vec::with_capacity(HEATMAP_WEEKS);
    let mut weekly = Vec::with_capacity(HEATMAP_WEEKS);
    let (mut window_scheduled, mut window_attended) = (0usize, 0usize);

    for week_index in 0..HEATMAP_WEEKS {
        let start = first_day + Duration::weeks(week_index as i64);
        let mut cells = Vec::with_capacity(7);
        let (mut scheduled, mut attended) = (0usize, 0usize);
        for day in 0..7 {
            let date = start + Duration::days(day);
            let (day_scheduled, day_attended) = per_day.get(&date).copied().unwrap_or((0, 0));
            scheduled += day_scheduled;
            attended += day_attended;
            cells.push(HeatmapCell {
                date,
                has_schedule: day_scheduled > 0,
                is_present: day_attended > 0,
                intensity: intensity(day_attended, day_scheduled),
            });
        }
        window_scheduled += scheduled;
        window_attended += attended;
        weeks.push(cells);
        weekly.push(WeeklyAttendance {
            week_index,
            schedule_count: scheduled,
            present_count: attended,
            attendance_rate: percent(attended, scheduled),
        });
    }

    let mut longest_streak = 0;
    let mut run = 0;
    for (_, _, attended) in past.iter() {
        run = if *attended { run + 1 } else { 0 };
        longest_streak = longest_streak.max(run);
    }
    let current_streak = past
        .iter()
        .rev()
        .take_while(|(_, _, attended)| *attended)
        .count();

    AttendanceConsistency {
        user_id,
        weeks,
        consistency_score: consistency_score(&weekly),
        weekly,
        current_streak,
        longest_streak,
        overall_rate: percent(window_attended, window_scheduled),
    }
}

/// 100 minus the standard deviation of weekly rates, over weeks that had
/// schedules. Perfectly even attendance scores 100.
fn consistency_score(weekly: &[WeeklyAttendance]) -> f64 {
    let rates: Vec<f64> = weekly
        .iter()
        .filter(|week| week.schedule_count > 0)
        .map(|week| week.attendance_rate)
        .collect();
    if rates.is_empty() {
        return 0.0;
    }
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;
    let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rates.len() as f64;
    (100.0 - variance.sqrt()).clamp(0.0, 100.0).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::*;

    #[test]
    fn grid_is_twelve_weeks_of_seven_days() {
        let result =
            attendance_consistency(&GroupData::default(), Uuid::new_v4(), now_kst(2026, 3, 18, 12));
        assert_eq!(result.weeks.len(), HEATMAP_WEEKS);
        assert!(result.weeks.iter().all(|week| week.len() == 7));
        assert_eq!(
            result.weeks[11][0].date,
            NaiveDate::from_ymd_opt(2026, 3, 16).unwrap()
        );
        assert_eq!(result.overall_rate, 0.0);
        assert_eq!(result.consistency_score, 0.0);
    }

    #[test]
    fn intensity_bands() {
        assert_eq!(intensity(0, 2), 0);
        assert_eq!(intensity(1, 2), 1);
        assert_eq!(intensity(2, 3), 2);
        assert_eq!(intensity(1, 1), 3);
    }

    #[test]
    fn streaks_count_back_from_latest_schedule() {
        let group_id = Uuid::new_v4();
        let a = member("a", at(2025, 1, 1, 9));
        let days = [2, 4, 6, 9, 11];
        let schedules: Vec<_> = days
            .iter()
            .map(|d| schedule(group_id, at(2026, 3, *d, 19)))
            .collect();
        let statuses = [
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Present,
        ];
        let attendance_rows = schedules
            .iter()
            .zip(statuses)
            .map(|(s, status)| attendance(s, &a, status))
            .collect();
        let upcoming = schedule(group_id, at(2026, 3, 25, 19));
        let mut all = schedules.clone();
        all.push(upcoming);

        let data = GroupData {
            attendance: attendance_rows,
            schedules: all,
            members: vec![a.clone()],
            ..Default::default()
        };

        let result = attendance_consistency(&data, a.user_id, now_kst(2026, 3, 18, 12));
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.longest_streak, 2);
        assert_eq!(result.overall_rate, 80.0);
        // week of Mar 2: 2/3, week of Mar 9: 2/2, current week has none yet
        assert_eq!(result.weekly[9].attendance_rate, 67.0);
        assert_eq!(result.weekly[10].attendance_rate, 100.0);
        assert_eq!(result.weekly[11].attendance_rate, 0.0);
        assert_eq!(result.weekly[11].schedule_count, 0);
        let wednesday = &result.weeks[9][2];
        assert!(wednesday.has_schedule);
        assert_eq!(wednesday.intensity, 3);
        let friday = &result.weeks[9][4];
        assert!(friday.has_schedule);
        assert!(!friday.is_present);
        assert_eq!(friday.intensity, 0);
    }
}
