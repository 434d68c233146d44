use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceMethod {
    Admin,
    Location,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub attendance_method: AttendanceMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    EarlyLeave,
}

impl AttendanceStatus {
    /// Present and late both count as having shown up.
    pub fn attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub schedule_id: Uuid,
    pub user_id: Uuid,
    pub status: AttendanceStatus,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpResponse {
    Going,
    NotGoing,
    Maybe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rsvp {
    pub schedule_id: Uuid,
    pub user_id: Uuid,
    pub response: RsvpResponse,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: Uuid,
    pub group_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceTransaction {
    pub id: Uuid,
    pub group_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub title: String,
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
    pub paid_by: Option<Uuid>,
}

/// Everything the analytics need for one group, fetched in a single fan-out.
#[derive(Debug, Clone, Default)]
pub struct GroupData {
    pub members: Vec<Member>,
    pub schedules: Vec<Schedule>,
    pub attendance: Vec<AttendanceRecord>,
    pub rsvps: Vec<Rsvp>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub transactions: Vec<FinanceTransaction>,
}

impl GroupData {
    pub fn member_name(&self, user_id: Uuid) -> Option<&str> {
        self.members
            .iter()
            .find(|member| member.user_id == user_id)
            .map(|member| member.name.as_str())
    }

    pub fn schedule(&self, schedule_id: Uuid) -> Option<&Schedule> {
        self.schedules.iter().find(|schedule| schedule.id == schedule_id)
    }
}

/// Which group is being looked at, and what time it is on the group's clock.
#[derive(Debug, Clone)]
pub struct Session {
    pub group_id: Uuid,
    pub now: DateTime<FixedOffset>,
}

impl Session {
    pub fn new(group_id: Uuid, offset: FixedOffset) -> Self {
        Self {
            group_id,
            now: Utc::now().with_timezone(&offset),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// The session clock as a UTC timestamp for stored records.
    pub fn now_utc(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc)
    }
}

macro_rules! text_enum {
    ($ty:ty, $label:literal, { $($variant:path => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($text => Ok($variant),)+
                    other => Err(AppError::Validation(format!(
                        "unknown {}: {other}",
                        $label
                    ))),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(AttendanceMethod, "attendance method", {
    AttendanceMethod::Admin => "admin",
    AttendanceMethod::Location => "location",
    AttendanceMethod::None => "none",
});

text_enum!(AttendanceStatus, "attendance status", {
    AttendanceStatus::Present => "present",
    AttendanceStatus::Late => "late",
    AttendanceStatus::Absent => "absent",
    AttendanceStatus::EarlyLeave => "early_leave",
});

text_enum!(RsvpResponse, "rsvp response", {
    RsvpResponse::Going => "going",
    RsvpResponse::NotGoing => "not_going",
    RsvpResponse::Maybe => "maybe",
});

text_enum!(TransactionKind, "transaction type", {
    TransactionKind::Income => "income",
    TransactionKind::Expense => "expense",
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_clock_is_shared_by_today_and_utc_stamps() {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2026, 3, 18, 1, 30, 0).unwrap();
        let session = Session {
            group_id: Uuid::nil(),
            now,
        };
        assert_eq!(session.today(), NaiveDate::from_ymd_opt(2026, 3, 18).unwrap());
        assert_eq!(
            session.now_utc(),
            Utc.with_ymd_and_hms(2026, 3, 17, 16, 30, 0).unwrap()
        );
    }

    #[test]
    fn status_text_round_trips_through_from_str() {
        assert_eq!(
            "early_leave".parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::EarlyLeave
        );
        assert_eq!(AttendanceStatus::Late.to_string(), "late");
    }

    #[test]
    fn unknown_text_is_a_validation_error() {
        let err = "sometimes".parse::<RsvpResponse>().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn only_present_and_late_count_as_attended() {
        assert!(AttendanceStatus::Present.attended());
        assert!(AttendanceStatus::Late.attended());
        assert!(!AttendanceStatus::Absent.attended());
        assert!(!AttendanceStatus::EarlyLeave.attended());
    }
}
