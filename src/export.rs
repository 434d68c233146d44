use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate};
use serde::Serialize;

use crate::analytics::local_date;
use crate::errors::AppError;
use crate::models::GroupData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Attendance,
    Board,
    Finance,
}

impl FromStr for ExportKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "attendance" => Ok(ExportKind::Attendance),
            "board" => Ok(ExportKind::Board),
            "finance" => Ok(ExportKind::Finance),
            other => Err(AppError::Validation(format!("unknown export kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPeriod {
    ThisMonth,
    LastMonth,
    LastThreeMonths,
    All,
}

impl FromStr for ExportPeriod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "this_month" => Ok(ExportPeriod::ThisMonth),
            "last_month" => Ok(ExportPeriod::LastMonth),
            "last_3_months" => Ok(ExportPeriod::LastThreeMonths),
            "all" => Ok(ExportPeriod::All),
            other => Err(AppError::Validation(format!("unknown export period '{other}'"))),
        }
    }
}

/// Inclusive start, exclusive end; `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date < end)
    }
}

impl ExportPeriod {
    pub fn range(self, today: NaiveDate) -> DateRange {
        let month_start = today.with_day(1).unwrap_or(today);
        let next_month = month_start + Months::new(1);
        match self {
            ExportPeriod::ThisMonth => DateRange {
                start: Some(month_start),
                end: Some(next_month),
            },
            ExportPeriod::LastMonth => DateRange {
                start: Some(month_start - Months::new(1)),
                end: Some(month_start),
            },
            ExportPeriod::LastThreeMonths => DateRange {
                start: Some(month_start - Months::new(2)),
                end: Some(next_month),
            },
            ExportPeriod::All => DateRange {
                start: None,
                end: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceExportRow {
    pub date: NaiveDate,
    pub schedule_title: String,
    pub member_name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardActivityExportRow {
    pub date: NaiveDate,
    pub title: String,
    pub author_name: String,
    pub comment_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceExportRow {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: i64,
    pub title: String,
    pub description: String,
}

const UNKNOWN_MEMBER: &str = "(탈퇴한 멤버)";

pub fn attendance_rows(
    data: &GroupData,
    range: DateRange,
    offset: &FixedOffset,
) -> Vec<AttendanceExportRow> {
    let mut rows: Vec<AttendanceExportRow> = data
        .attendance
        .iter()
        .filter_map(|record| {
            let schedule = data.schedule(record.schedule_id)?;
            let date = local_date(schedule.starts_at, offset);
            if !range.contains(date) {
                return None;
            }
            Some(AttendanceExportRow {
                date,
                schedule_title: schedule.title.clone(),
                member_name: data
                    .member_name(record.user_id)
                    .unwrap_or(UNKNOWN_MEMBER)
                    .to_string(),
                status: record.status.to_string(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date));
    rows
}

pub fn board_rows(
    data: &GroupData,
    range: DateRange,
    offset: &FixedOffset,
) -> Vec<BoardActivityExportRow> {
    let mut rows: Vec<BoardActivityExportRow> = data
        .posts
        .iter()
        .filter(|post| post.is_live())
        .filter_map(|post| {
            let date = local_date(post.created_at, offset);
            if !range.contains(date) {
                return None;
            }
            Some(BoardActivityExportRow {
                date,
                title: post.title.clone(),
                author_name: data
                    .member_name(post.author_id)
                    .unwrap_or(UNKNOWN_MEMBER)
                    .to_string(),
                comment_count: data.comments.iter().filter(|c| c.post_id == post.id).count(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date));
    rows
}

pub fn finance_rows(data: &GroupData, range: DateRange) -> Vec<FinanceExportRow> {
    let mut rows: Vec<FinanceExportRow> = data
        .transactions
        .iter()
        .filter(|tx| range.contains(tx.transaction_date))
        .map(|tx| FinanceExportRow {
            date: tx.transaction_date,
            kind: tx.kind.to_string(),
            amount: tx.amount,
            title: tx.title.clone(),
            description: tx.description.clone().unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date));
    rows
}

/// Header row plus one record per row. Fields holding commas, quotes or
/// newlines are quoted per RFC 4180.
pub fn write_csv<W: Write, R: Serialize>(writer: W, rows: &[R]) -> Result<usize, AppError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(rows.len())
}

/// Writes the requested export and returns the number of data rows.
pub fn export_csv<W: Write>(
    data: &GroupData,
    kind: ExportKind,
    period: ExportPeriod,
    now: DateTime<FixedOffset>,
    writer: W,
) -> Result<usize, AppError> {
    let range = period.range(now.date_naive());
    let offset = now.offset();
    match kind {
        ExportKind::Attendance => write_csv(writer, &attendance_rows(data, range, offset)),
        ExportKind::Board => write_csv(writer, &board_rows(data, range, offset)),
        ExportKind::Finance => write_csv(writer, &finance_rows(data, range)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::*;
    use crate::models::{AttendanceStatus, FinanceTransaction, TransactionKind};
    use uuid::Uuid;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_presets_cover_calendar_months() {
        let today = day(2026, 3, 18);
        assert_eq!(
            ExportPeriod::ThisMonth.range(today),
            DateRange {
                start: Some(day(2026, 3, 1)),
                end: Some(day(2026, 4, 1))
            }
        );
        assert_eq!(
            ExportPeriod::LastMonth.range(today),
            DateRange {
                start: Some(day(2026, 2, 1)),
                end: Some(day(2026, 3, 1))
            }
        );
        assert_eq!(ExportPeriod::LastThreeMonths.range(today).start, Some(day(2026, 1, 1)));
        assert!(ExportPeriod::All.range(today).contains(day(1999, 1, 1)));
    }

    #[test]
    fn finance_export_quotes_awkward_fields() {
        let data = GroupData {
            transactions: vec![FinanceTransaction {
                id: Uuid::new_v4(),
                group_id: Uuid::nil(),
                kind: TransactionKind::Expense,
                amount: 45_000,
                title: "Studio, room B".to_string(),
                description: Some("said \"thanks\"\nsecond line".to_string()),
                transaction_date: day(2026, 3, 2),
                paid_by: None,
            }],
            ..Default::default()
        };

        let mut buffer = Vec::new();
        let count = export_csv(
            &data,
            ExportKind::Finance,
            ExportPeriod::ThisMonth,
            now_kst(2026, 3, 18, 12),
            &mut buffer,
        )
        .unwrap();
        assert_eq!(count, 1);
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "date,type,amount,title,description\n\
             2026-03-02,expense,45000,\"Studio, room B\",\"said \"\"thanks\"\"\nsecond line\"\n"
        );
    }

    #[test]
    fn attendance_export_filters_by_period_and_names_members() {
        let group_id = Uuid::new_v4();
        let a = member("Jin", at(2025, 1, 1, 9));
        let march = schedule(group_id, at(2026, 3, 3, 19));
        let february = schedule(group_id, at(2026, 2, 24, 19));
        let data = GroupData {
            attendance: vec![
                attendance(&march, &a, AttendanceStatus::Late),
                attendance(&february, &a, AttendanceStatus::Present),
            ],
            schedules: vec![march, february],
            members: vec![a],
            ..Default::default()
        };

        let rows = attendance_rows(&data, ExportPeriod::ThisMonth.range(day(2026, 3, 18)), &kst());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].member_name, "Jin");
        assert_eq!(rows[0].status, "late");
        assert_eq!(rows[0].date, day(2026, 3, 3));
    }

    #[test]
    fn board_export_counts_comments_and_skips_deleted_posts() {
        let group_id = Uuid::new_v4();
        let a = member("Mina", at(2025, 1, 1, 9));
        let live = post(group_id, &a, at(2026, 3, 5, 9));
        let mut gone = post(group_id, &a, at(2026, 3, 6, 9));
        gone.deleted_at = Some(at(2026, 3, 7, 9));
        let data = GroupData {
            comments: vec![
                comment(&live, &a, at(2026, 3, 5, 10)),
                comment(&live, &a, at(2026, 3, 5, 11)),
            ],
            posts: vec![live, gone],
            members: vec![a],
            ..Default::default()
        };

        let rows = board_rows(&data, ExportPeriod::All.range(day(2026, 3, 18)), &kst());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comment_count, 2);
        assert_eq!(rows[0].author_name, "Mina");
    }
}
