use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, Months, Timelike};
use serde::Serialize;
use uuid::Uuid;

use crate::models::GroupData;

pub const LOOKBACK_MONTHS: u32 = 3;
pub const MIN_SCHEDULES: usize = 3;

/// Sunday first, matching the day index stored alongside availability data.
pub const DAY_LABELS: [&str; 7] = ["일", "월", "화", "수", "목", "금", "토"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::Evening];

    /// 06–12 morning, 12–18 afternoon, everything else (18–06) evening.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeSlot::Morning,
            12..=17 => TimeSlot::Afternoon,
            _ => TimeSlot::Evening,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeSlot::Morning => "오전",
            TimeSlot::Afternoon => "오후",
            TimeSlot::Evening => "저녁",
        }
    }

    pub fn range(self) -> &'static str {
        match self {
            TimeSlot::Morning => "06-12",
            TimeSlot::Afternoon => "12-18",
            TimeSlot::Evening => "18-06",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotCell {
    pub day_index: u32,
    pub slot: TimeSlot,
    pub schedule_count: usize,
    pub present_count: usize,
    pub total_count: usize,
    /// Attended share of recorded rows, 0.0 to 1.0.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleTimeAnalysis {
    InsufficientData { schedule_count: usize },
    Ready {
        best: SlotCell,
        cells: Vec<SlotCell>,
        schedule_count: usize,
    },
}

/// Finds the (weekday, time slot) with the best turnout over the last three
/// months. Needs at least [`MIN_SCHEDULES`] schedules in the window.
pub fn optimal_schedule_time(data: &GroupData, now: DateTime<FixedOffset>) -> ScheduleTimeAnalysis {
    let offset = *now.offset();
    let since = now.checked_sub_months(Months::new(LOOKBACK_MONTHS)).unwrap_or(now);

    let mut cell_of: HashMap<Uuid, (u32, TimeSlot)> = HashMap::new();
    for schedule in data.schedules.iter() {
        let local = schedule.starts_at.with_timezone(&offset);
        if local < since || local > now {
            continue;
        }
        let day = local.weekday().num_days_from_sunday();
        cell_of.insert(schedule.id, (day, TimeSlot::from_hour(local.hour())));
    }

    let schedule_count = cell_of.len();
    if schedule_count < MIN_SCHEDULES {
        return ScheduleTimeAnalysis::InsufficientData { schedule_count };
    }

    // (schedules, attended, recorded)
    let mut tallies: HashMap<(u32, TimeSlot), (usize, usize, usize)> = HashMap::new();
    for cell in cell_of.values() {
        tallies.entry(*cell).or_default().0 += 1;
    }
    for record in data.attendance.iter() {
        if let Some(cell) = cell_of.get(&record.schedule_id) {
            let entry = tallies.entry(*cell).or_default();
            entry.1 += usize::from(record.status.attended());
            entry.2 += 1;
        }
    }

    let mut cells = Vec::new();
    for day_index in 0..7 {
        for slot in TimeSlot::ALL {
            let Some((schedules, present, total)) = tallies.get(&(day_index, slot)).copied() else {
                continue;
            };
            let rate = if total == 0 {
                0.0
            } else {
                present as f64 / total as f64
            };
            cells.push(SlotCell {
                day_index,
                slot,
                schedule_count: schedules,
                present_count: present,
                total_count: total,
                rate,
            });
        }
    }

    // Strict comparison keeps the first cell in enumeration order on ties.
    let mut best = &cells[0];
    for cell in cells.iter().skip(1) {
        if cell.rate > best.rate {
            best = cell;
        }
    }
    let best = best.clone();

    ScheduleTimeAnalysis::Ready {
        best,
        cells,
        schedule_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::*;
    use crate::models::AttendanceStatus;

    #[test]
    fn slots_wrap_evening_past_midnight() {
        assert_eq!(TimeSlot::from_hour(6), TimeSlot::Morning);
        assert_eq!(TimeSlot::from_hour(11), TimeSlot::Morning);
        assert_eq!(TimeSlot::from_hour(12), TimeSlot::Afternoon);
        assert_eq!(TimeSlot::from_hour(18), TimeSlot::Evening);
        assert_eq!(TimeSlot::from_hour(2), TimeSlot::Evening);
    }

    #[test]
    fn fewer_than_three_schedules_is_insufficient() {
        let group_id = Uuid::new_v4();
        let data = GroupData {
            schedules: vec![
                schedule(group_id, at(2026, 3, 2, 19)),
                schedule(group_id, at(2026, 3, 4, 19)),
                // older than three months, not counted
                schedule(group_id, at(2025, 11, 1, 19)),
            ],
            ..Default::default()
        };
        let result = optimal_schedule_time(&data, now_kst(2026, 3, 20, 12));
        assert_eq!(
            result,
            ScheduleTimeAnalysis::InsufficientData { schedule_count: 2 }
        );
    }

    #[test]
    fn best_cell_has_highest_rate() {
        let group_id = Uuid::new_v4();
        let a = member("a", at(2025, 1, 1, 9));
        let b = member("b", at(2025, 1, 1, 9));
        // 2026-03-02 is a Monday, 2026-03-07 a Saturday.
        let monday_evening = schedule(group_id, at(2026, 3, 2, 19));
        let saturday_morning = schedule(group_id, at(2026, 3, 7, 10));
        let saturday_morning_2 = schedule(group_id, at(2026, 3, 14, 10));

        let data = GroupData {
            attendance: vec![
                attendance(&monday_evening, &a, AttendanceStatus::Present),
                attendance(&monday_evening, &b, AttendanceStatus::Absent),
                attendance(&saturday_morning, &a, AttendanceStatus::Present),
                attendance(&saturday_morning, &b, AttendanceStatus::Late),
                attendance(&saturday_morning_2, &a, AttendanceStatus::Present),
            ],
            schedules: vec![monday_evening, saturday_morning, saturday_morning_2],
            members: vec![a, b],
            ..Default::default()
        };

        match optimal_schedule_time(&data, now_kst(2026, 3, 20, 12)) {
            ScheduleTimeAnalysis::Ready {
                best,
                cells,
                schedule_count,
            } => {
                assert_eq!(schedule_count, 3);
                assert_eq!(cells.len(), 2);
                assert_eq!(best.day_index, 6);
                assert_eq!(best.slot, TimeSlot::Morning);
                assert_eq!(best.schedule_count, 2);
                assert_eq!(best.rate, 1.0);
            }
            other => panic!("expected a recommendation, got {other:?}"),
        }
    }

    #[test]
    fn ties_resolve_to_first_cell_in_enumeration_order() {
        let group_id = Uuid::new_v4();
        let a = member("a", at(2025, 1, 1, 9));
        // Sunday afternoon, Tuesday morning, Tuesday evening
        let sunday = schedule(group_id, at(2026, 3, 8, 14));
        let tuesday_am = schedule(group_id, at(2026, 3, 10, 9));
        let tuesday_pm = schedule(group_id, at(2026, 3, 10, 20));

        let data = GroupData {
            attendance: vec![
                attendance(&tuesday_pm, &a, AttendanceStatus::Present),
                attendance(&tuesday_am, &a, AttendanceStatus::Present),
                attendance(&sunday, &a, AttendanceStatus::Present),
            ],
            schedules: vec![tuesday_pm, tuesday_am, sunday],
            members: vec![a],
            ..Default::default()
        };

        match optimal_schedule_time(&data, now_kst(2026, 3, 20, 12)) {
            ScheduleTimeAnalysis::Ready { best, .. } => {
                assert_eq!(best.day_index, 0);
                assert_eq!(best.slot, TimeSlot::Afternoon);
            }
            other => panic!("expected a recommendation, got {other:?}"),
        }
    }
}
