use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::GroupData;

pub const INACTIVE_THRESHOLD_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinbackCandidate {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub inactive_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinbackCampaign {
    pub candidates: Vec<WinbackCandidate>,
    pub total_count: usize,
}

/// Members with no attendance, post or comment in the trailing threshold
/// window, longest-idle first.
pub fn winback_candidates(data: &GroupData, now: DateTime<FixedOffset>) -> WinbackCampaign {
    let now = now.with_timezone(&Utc);
    let cutoff = now - Duration::days(INACTIVE_THRESHOLD_DAYS);

    let mut last_seen: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    let mut touch = |user_id: Uuid, ts: DateTime<Utc>| {
        if ts > now {
            return;
        }
        last_seen
            .entry(user_id)
            .and_modify(|latest| *latest = (*latest).max(ts))
            .or_insert(ts);
    };

    for record in data.attendance.iter().filter(|r| r.status.attended()) {
        touch(record.user_id, record.checked_at);
    }
    for post in data.posts.iter().filter(|p| p.is_live()) {
        touch(post.author_id, post.created_at);
    }
    for comment in data.comments.iter() {
        touch(comment.author_id, comment.created_at);
    }

    let mut candidates: Vec<WinbackCandidate> = data
        .members
        .iter()
        .filter_map(|member| {
            let last = last_seen.get(&member.user_id).copied();
            if matches!(last, Some(ts) if ts > cutoff) {
                return None;
            }
            let inactive_days = match last {
                Some(ts) => (now - ts).num_days(),
                None => INACTIVE_THRESHOLD_DAYS,
            };
            Some(WinbackCandidate {
                user_id: member.user_id,
                name: member.name.clone(),
                avatar_url: member.avatar_url.clone(),
                last_activity_at: last,
                inactive_days,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.inactive_days.cmp(&a.inactive_days));

    WinbackCampaign {
        total_count: candidates.len(),
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::*;
    use crate::models::AttendanceStatus;

    #[test]
    fn recently_active_members_are_not_candidates() {
        let group_id = Uuid::new_v4();
        let active = member("active", at(2025, 6, 1, 9));
        let data = GroupData {
            posts: vec![post(group_id, &active, at(2026, 3, 25, 9))],
            members: vec![active],
            ..Default::default()
        };
        let campaign = winback_candidates(&data, now_kst(2026, 3, 28, 12));
        assert!(campaign.candidates.is_empty());
        assert_eq!(campaign.total_count, 0);
    }

    #[test]
    fn old_activity_uses_real_timestamp() {
        let group_id = Uuid::new_v4();
        let faded = member("faded", at(2025, 6, 1, 9));
        let s = schedule(group_id, at(2026, 1, 27, 12));
        let data = GroupData {
            attendance: vec![attendance(&s, &faded, AttendanceStatus::Present)],
            members: vec![faded],
            schedules: vec![s],
            ..Default::default()
        };
        let campaign = winback_candidates(&data, now_kst(2026, 3, 28, 12));
        assert_eq!(campaign.candidates.len(), 1);
        assert_eq!(campaign.candidates[0].inactive_days, 60);
        assert!(campaign.candidates[0].last_activity_at.is_some());
    }

    #[test]
    fn members_without_history_default_to_threshold_and_sort_last() {
        let group_id = Uuid::new_v4();
        let silent = member("silent", at(2026, 3, 1, 9));
        let faded = member("faded", at(2025, 6, 1, 9));
        let absent_only = member("absent", at(2025, 6, 1, 9));
        let old = post(group_id, &faded, at(2026, 2, 6, 12));
        let s = schedule(group_id, at(2026, 3, 20, 19));

        let data = GroupData {
            attendance: vec![attendance(&s, &absent_only, AttendanceStatus::Absent)],
            posts: vec![old],
            members: vec![silent, faded, absent_only],
            schedules: vec![s],
            ..Default::default()
        };
        let campaign = winback_candidates(&data, now_kst(2026, 3, 28, 12));
        let names: Vec<&str> = campaign.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["faded", "silent", "absent"]);
        assert_eq!(campaign.candidates[0].inactive_days, 50);
        assert_eq!(campaign.candidates[1].inactive_days, INACTIVE_THRESHOLD_DAYS);
        assert_eq!(campaign.candidates[1].last_activity_at, None);
    }
}
