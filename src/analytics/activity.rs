use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::GroupData;

pub const WINDOW_DAYS: i64 = 30;

pub const ATTENDANCE_POINTS: u32 = 3;
pub const POST_POINTS: u32 = 2;
pub const COMMENT_POINTS: u32 = 1;
pub const RSVP_POINTS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityGrade {
    #[serde(rename = "매우 활발")]
    VeryActive,
    #[serde(rename = "활발")]
    Active,
    #[serde(rename = "보통")]
    Normal,
    #[serde(rename = "저조")]
    Low,
}

impl ActivityGrade {
    pub const ALL: [ActivityGrade; 4] = [
        ActivityGrade::VeryActive,
        ActivityGrade::Active,
        ActivityGrade::Normal,
        ActivityGrade::Low,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ActivityGrade::VeryActive => "매우 활발",
            ActivityGrade::Active => "활발",
            ActivityGrade::Normal => "보통",
            ActivityGrade::Low => "저조",
        }
    }

    /// Top 20% / next 30% / next 30% / bottom 20% by rank position.
    pub fn for_position(index: usize, total: usize) -> Self {
        let fraction = index as f64 / total.max(1) as f64;
        if fraction < 0.2 {
            ActivityGrade::VeryActive
        } else if fraction < 0.5 {
            ActivityGrade::Active
        } else if fraction < 0.8 {
            ActivityGrade::Normal
        } else {
            ActivityGrade::Low
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub attendance: u32,
    pub posts: u32,
    pub comments: u32,
    pub rsvp: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.attendance * ATTENDANCE_POINTS
            + self.posts * POST_POINTS
            + self.comments * COMMENT_POINTS
            + self.rsvp * RSVP_POINTS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberActivityScore {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub total_score: u32,
    pub breakdown: ScoreBreakdown,
    pub grade: ActivityGrade,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeSummary {
    pub grade: ActivityGrade,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDistribution {
    pub grade_summary: Vec<GradeSummary>,
    pub top5: Vec<MemberActivityScore>,
    pub total_members: usize,
    pub avg_score: f64,
    pub scores: Vec<MemberActivityScore>,
}

/// Scores every member over the trailing window and ranks them, highest
/// first. Members with equal scores keep their input order.
pub fn score_members(data: &GroupData, now: DateTime<FixedOffset>) -> Vec<MemberActivityScore> {
    let now = now.with_timezone(&Utc);
    let cutoff = now - Duration::days(WINDOW_DAYS);
    let in_window = |ts: DateTime<Utc>| ts > cutoff && ts <= now;

    let mut counts: HashMap<Uuid, ScoreBreakdown> = HashMap::new();

    for record in data.attendance.iter() {
        if record.status.attended() && in_window(record.checked_at) {
            counts.entry(record.user_id).or_default().attendance += 1;
        }
    }
    for post in data.posts.iter() {
        if post.is_live() && in_window(post.created_at) {
            counts.entry(post.author_id).or_default().posts += 1;
        }
    }
    for comment in data.comments.iter() {
        if in_window(comment.created_at) {
            counts.entry(comment.author_id).or_default().comments += 1;
        }
    }
    for rsvp in data.rsvps.iter() {
        if in_window(rsvp.responded_at) {
            counts.entry(rsvp.user_id).or_default().rsvp += 1;
        }
    }

    let mut scores: Vec<MemberActivityScore> = data
        .members
        .iter()
        .map(|member| {
            let breakdown = counts.remove(&member.user_id).unwrap_or_default();
            MemberActivityScore {
                user_id: member.user_id,
                name: member.name.clone(),
                avatar_url: member.avatar_url.clone(),
                total_score: breakdown.total(),
                breakdown,
                grade: ActivityGrade::Low,
                rank: 0,
            }
        })
        .collect();

    // Vec::sort_by is stable, so ties stay in member order.
    scores.sort_by(|a, b| b.total_score.cmp(&a.total_score));

    let total = scores.len();
    let mut previous: Option<(u32, usize)> = None;
    for (index, score) in scores.iter_mut().enumerate() {
        score.rank = match previous {
            Some((value, rank)) if value == score.total_score => rank,
            _ => index + 1,
        };
        previous = Some((score.total_score, score.rank));
        score.grade = ActivityGrade::for_position(index, total);
    }

    scores
}

pub fn activity_distribution(data: &GroupData, now: DateTime<FixedOffset>) -> ActivityDistribution {
    let scores = score_members(data, now);
    let total_members = scores.len();

    let grade_summary = ActivityGrade::ALL
        .iter()
        .map(|grade| GradeSummary {
            grade: *grade,
            count: scores.iter().filter(|score| score.grade == *grade).count(),
        })
        .collect();

    let avg_score = if total_members == 0 {
        0.0
    } else {
        let sum: u32 = scores.iter().map(|score| score.total_score).sum();
        (sum as f64 / total_members as f64 * 10.0).round() / 10.0
    };

    ActivityDistribution {
        grade_summary,
        top5: scores.iter().take(5).cloned().collect(),
        total_members,
        avg_score,
        scores,
    }
}
