use std::fmt::Write;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::analytics::activity::{activity_distribution, ActivityDistribution};
use crate::analytics::forecast::{
    forecast_finances, FinanceForecast, FORECAST_MONTHS, HISTORY_MONTHS,
};
use crate::analytics::health::{health_trends, GroupHealthTrends, HealthMetric};
use crate::analytics::schedule_time::{optimal_schedule_time, ScheduleTimeAnalysis, DAY_LABELS};
use crate::analytics::winback::{winback_candidates, WinbackCampaign};
use crate::models::GroupData;

/// Everything the dashboard shows, computed from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group_name: String,
    pub generated_at: DateTime<FixedOffset>,
    pub activity: ActivityDistribution,
    pub health: GroupHealthTrends,
    pub finance: FinanceForecast,
    pub schedule_time: ScheduleTimeAnalysis,
    pub winback: WinbackCampaign,
}

impl GroupReport {
    pub fn build(group_name: &str, data: &GroupData, now: DateTime<FixedOffset>) -> Self {
        GroupReport {
            group_name: group_name.to_string(),
            generated_at: now,
            activity: activity_distribution(data, now),
            health: health_trends(data, now),
            finance: forecast_finances(
                &data.transactions,
                now.date_naive(),
                HISTORY_MONTHS,
                FORECAST_MONTHS,
            ),
            schedule_time: optimal_schedule_time(data, now),
            winback: winback_candidates(data, now),
        }
    }
}

/// `+12%`, `-5%`, or `-` when there is nothing to compare against.
pub fn format_change(change_rate: Option<f64>) -> String {
    match change_rate {
        Some(rate) if rate > 0.0 => format!("+{rate}%"),
        Some(rate) => format!("{rate}%"),
        None => "-".to_string(),
    }
}

/// Whole won with thousands separators.
pub fn format_won(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-{grouped}원")
    } else {
        format!("{grouped}원")
    }
}

fn metric_line(output: &mut String, name: &str, metric: &HealthMetric, unit: &str) {
    let _ = writeln!(
        output,
        "- {}: {}{} ({} vs last week)",
        name,
        metric.current,
        unit,
        format_change(metric.change_rate)
    );
}

pub fn build_report(report: &GroupReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Group Report", report.group_name);
    let _ = writeln!(
        output,
        "Generated {}",
        report.generated_at.format("%Y-%m-%d %H:%M %:z")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Member Activity (last 30 days)");

    let activity = &report.activity;
    if activity.total_members == 0 {
        let _ = writeln!(output, "No members in this group yet.");
    } else {
        let _ = writeln!(
            output,
            "{} members, average score {:.1}",
            activity.total_members, activity.avg_score
        );
        for summary in activity.grade_summary.iter() {
            let _ = writeln!(output, "- {}: {}", summary.grade.label(), summary.count);
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "Top members:");
        for score in activity.top5.iter() {
            let _ = writeln!(
                output,
                "{}. {} score {} ({}; attendance {}, posts {}, comments {}, rsvp {})",
                score.rank,
                score.name,
                score.total_score,
                score.grade.label(),
                score.breakdown.attendance,
                score.breakdown.posts,
                score.breakdown.comments,
                score.breakdown.rsvp
            );
        }
    }

    let health = &report.health;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Health Trend (8 weeks)");
    metric_line(&mut output, "Attendance rate", &health.attendance_rate, "%");
    metric_line(&mut output, "Board activity", &health.activity_count, "");
    metric_line(&mut output, "New members", &health.new_member_count, "");
    metric_line(&mut output, "RSVP rate", &health.rsvp_rate, "%");

    let finance = &report.finance;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Finance Forecast");
    let _ = writeln!(
        output,
        "Projected balance {} ({})",
        format_won(finance.projected_balance),
        finance.health.label()
    );
    for month in finance.months.iter() {
        let _ = writeln!(
            output,
            "- {}{}: income {}, expense {}, net {}",
            month.month,
            if month.is_forecast { " (forecast)" } else { "" },
            format_won(month.income),
            format_won(month.expense),
            format_won(month.net)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Practice Time");
    match &report.schedule_time {
        ScheduleTimeAnalysis::InsufficientData { schedule_count } => {
            let _ = writeln!(
                output,
                "Not enough schedules to compare ({} in the last 3 months).",
                schedule_count
            );
        }
        ScheduleTimeAnalysis::Ready {
            best,
            schedule_count,
            ..
        } => {
            let _ = writeln!(
                output,
                "{}요일 {} ({}): {}% attendance across {} schedules ({} analysed)",
                DAY_LABELS[best.day_index as usize],
                best.slot.label(),
                best.slot.range(),
                (best.rate * 100.0).round(),
                best.schedule_count,
                schedule_count
            );
        }
    }

    let winback = &report.winback;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Winback Candidates");
    if winback.candidates.is_empty() {
        let _ = writeln!(output, "Everyone has been active in the last 30 days.");
    } else {
        for candidate in winback.candidates.iter() {
            let last_seen = candidate
                .last_activity_at
                .map(|at| at.with_timezone(report.generated_at.offset()).date_naive().to_string())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                output,
                "- {}: inactive {} days (last activity {})",
                candidate.name, candidate.inactive_days, last_seen
            );
        }
    }

    output
}
