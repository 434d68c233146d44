use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::week_start;
use crate::errors::{is_unique_violation, AppError};
use crate::models::{
    AttendanceRecord, AttendanceStatus, Comment, FinanceTransaction, GroupData, Member, Post,
    Rsvp, RsvpResponse, Schedule, TransactionKind,
};

pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_group_name(pool: &PgPool, group_id: Uuid) -> Result<String, AppError> {
    let row = sqlx::query("SELECT name FROM dancebase.groups WHERE id = $1")
        .bind(group_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::load("group"))?;

    row.map(|row| row.get("name"))
        .ok_or_else(|| AppError::NotFound(format!("group {group_id}")))
}

pub async fn fetch_members(pool: &PgPool, group_id: Uuid) -> Result<Vec<Member>, AppError> {
    let rows = sqlx::query(
        "SELECT gm.user_id, p.name, p.avatar_url, gm.joined_at \
         FROM dancebase.group_members gm \
         JOIN dancebase.profiles p ON p.id = gm.user_id \
         WHERE gm.group_id = $1 \
         ORDER BY gm.joined_at, p.name",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("members"))?;

    Ok(rows
        .into_iter()
        .map(|row| Member {
            user_id: row.get("user_id"),
            name: row.get("name"),
            avatar_url: row.get("avatar_url"),
            joined_at: row.get("joined_at"),
        })
        .collect())
}

fn schedule_from_row(row: &PgRow) -> Result<Schedule, AppError> {
    Ok(Schedule {
        id: row.get("id"),
        group_id: row.get("group_id"),
        title: row.get("title"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        attendance_method: row.get::<String, _>("attendance_method").parse()?,
    })
}

pub async fn fetch_schedules(pool: &PgPool, group_id: Uuid) -> Result<Vec<Schedule>, AppError> {
    let rows = sqlx::query(
        "SELECT id, group_id, title, starts_at, ends_at, attendance_method \
         FROM dancebase.schedules \
         WHERE group_id = $1 \
         ORDER BY starts_at",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("schedules"))?;

    rows.iter().map(schedule_from_row).collect()
}

pub async fn fetch_schedule(pool: &PgPool, schedule_id: Uuid) -> Result<Schedule, AppError> {
    let row = sqlx::query(
        "SELECT id, group_id, title, starts_at, ends_at, attendance_method \
         FROM dancebase.schedules WHERE id = $1",
    )
    .bind(schedule_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::load("schedule"))?
    .ok_or_else(|| AppError::NotFound(format!("schedule {schedule_id}")))?;

    schedule_from_row(&row)
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceRecord, AppError> {
    Ok(AttendanceRecord {
        schedule_id: row.get("schedule_id"),
        user_id: row.get("user_id"),
        status: row.get::<String, _>("status").parse()?,
        checked_at: row.get("checked_at"),
    })
}

pub async fn fetch_attendance(
    pool: &PgPool,
    group_id: Uuid,
) -> Result<Vec<AttendanceRecord>, AppError> {
    let rows = sqlx::query(
        "SELECT a.schedule_id, a.user_id, a.status, a.checked_at \
         FROM dancebase.attendance a \
         JOIN dancebase.schedules s ON s.id = a.schedule_id \
         WHERE s.group_id = $1",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("attendance"))?;

    rows.iter().map(attendance_from_row).collect()
}

/// The current roster for one schedule, in check-in order.
pub async fn fetch_schedule_attendance(
    pool: &PgPool,
    schedule_id: Uuid,
) -> Result<Vec<AttendanceRecord>, AppError> {
    let rows = sqlx::query(
        "SELECT schedule_id, user_id, status, checked_at \
         FROM dancebase.attendance \
         WHERE schedule_id = $1 \
         ORDER BY checked_at",
    )
    .bind(schedule_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("attendance"))?;

    rows.iter().map(attendance_from_row).collect()
}

pub async fn fetch_rsvps(pool: &PgPool, group_id: Uuid) -> Result<Vec<Rsvp>, AppError> {
    let rows = sqlx::query(
        "SELECT r.schedule_id, r.user_id, r.response, r.responded_at \
         FROM dancebase.schedule_rsvps r \
         JOIN dancebase.schedules s ON s.id = r.schedule_id \
         WHERE s.group_id = $1",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("rsvps"))?;

    rows.iter()
        .map(|row| -> Result<Rsvp, AppError> {
            Ok(Rsvp {
                schedule_id: row.get("schedule_id"),
                user_id: row.get("user_id"),
                response: row.get::<String, _>("response").parse::<RsvpResponse>()?,
                responded_at: row.get("responded_at"),
            })
        })
        .collect()
}

/// Soft-deleted posts are included; callers filter with [`Post::is_live`].
pub async fn fetch_posts(pool: &PgPool, group_id: Uuid) -> Result<Vec<Post>, AppError> {
    let rows = sqlx::query(
        "SELECT id, group_id, author_id, title, created_at, deleted_at \
         FROM dancebase.board_posts \
         WHERE group_id = $1 \
         ORDER BY created_at",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("board posts"))?;

    Ok(rows
        .into_iter()
        .map(|row| Post {
            id: row.get("id"),
            group_id: row.get("group_id"),
            author_id: row.get("author_id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
            deleted_at: row.get("deleted_at"),
        })
        .collect())
}

pub async fn fetch_comments(pool: &PgPool, group_id: Uuid) -> Result<Vec<Comment>, AppError> {
    let rows = sqlx::query(
        "SELECT c.id, c.post_id, c.author_id, c.created_at \
         FROM dancebase.board_comments c \
         JOIN dancebase.board_posts p ON p.id = c.post_id \
         WHERE p.group_id = $1 AND p.deleted_at IS NULL",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("board comments"))?;

    Ok(rows
        .into_iter()
        .map(|row| Comment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn fetch_transactions(
    pool: &PgPool,
    group_id: Uuid,
) -> Result<Vec<FinanceTransaction>, AppError> {
    let rows = sqlx::query(
        "SELECT id, group_id, kind, amount, title, description, transaction_date, paid_by \
         FROM dancebase.finance_transactions \
         WHERE group_id = $1 \
         ORDER BY transaction_date",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::load("finance transactions"))?;

    rows.iter()
        .map(|row| -> Result<FinanceTransaction, AppError> {
            Ok(FinanceTransaction {
                id: row.get("id"),
                group_id: row.get("group_id"),
                kind: row.get::<String, _>("kind").parse::<TransactionKind>()?,
                amount: row.get("amount"),
                title: row.get("title"),
                description: row.get("description"),
                transaction_date: row.get("transaction_date"),
                paid_by: row.get("paid_by"),
            })
        })
        .collect()
}

/// Runs every read a widget needs concurrently and joins the results. Any
/// single failure fails the whole snapshot.
pub async fn fetch_group_data(pool: &PgPool, group_id: Uuid) -> Result<GroupData, AppError> {
    let (members, schedules, attendance, rsvps, posts, comments, transactions) = tokio::try_join!(
        fetch_members(pool, group_id),
        fetch_schedules(pool, group_id),
        fetch_attendance(pool, group_id),
        fetch_rsvps(pool, group_id),
        fetch_posts(pool, group_id),
        fetch_comments(pool, group_id),
        fetch_transactions(pool, group_id),
    )?;

    debug!(
        members = members.len(),
        schedules = schedules.len(),
        attendance = attendance.len(),
        "group snapshot loaded"
    );

    Ok(GroupData {
        members,
        schedules,
        attendance,
        rsvps,
        posts,
        comments,
        transactions,
    })
}

pub async fn upsert_attendance(
    pool: &PgPool,
    schedule_id: Uuid,
    user_id: Uuid,
    status: AttendanceStatus,
    checked_at: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO dancebase.attendance (id, schedule_id, user_id, status, checked_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (schedule_id, user_id) DO UPDATE
        SET status = EXCLUDED.status, checked_at = EXCLUDED.checked_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(schedule_id)
    .bind(user_id)
    .bind(status.as_str())
    .bind(checked_at)
    .execute(pool)
    .await
    .map_err(AppError::save("attendance"))?;

    Ok(())
}

/// Files a pending join request. A second request for the same group is
/// reported as [`AppError::AlreadyRequested`].
pub async fn submit_join_request(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO dancebase.join_requests (id, group_id, user_id, status)
        VALUES ($1, $2, $3, 'pending')
        "#,
    )
    .bind(id)
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::AlreadyRequested
        } else {
            AppError::Save {
                what: "join request",
                source: err,
            }
        }
    })?;

    Ok(id)
}

pub async fn import_transactions_csv(
    pool: &PgPool,
    group_id: Uuid,
    csv_path: &Path,
) -> Result<usize, AppError> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        #[serde(rename = "type")]
        kind: String,
        amount: i64,
        title: String,
        description: Option<String>,
        transaction_date: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let kind: TransactionKind = row.kind.parse()?;
        if row.amount < 0 {
            return Err(AppError::Validation(format!(
                "row {}: amount must not be negative",
                line + 1
            )));
        }

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO dancebase.finance_transactions
            (id, group_id, kind, amount, title, description, transaction_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(kind.as_str())
        .bind(row.amount)
        .bind(&row.title)
        .bind(row.description.filter(|d| !d.is_empty()))
        .bind(row.transaction_date)
        .bind(source_key)
        .execute(pool)
        .await
        .map_err(AppError::save("finance transactions"))?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub const SEED_GROUP_ID: &str = "6f1c2b7e-9a41-4c1e-8d2a-0b5f3e7c9d11";
const SEED_WEEKS: i64 = 12;

/// Wall-clock hour on a group-local date, as UTC.
fn local_hour(date: NaiveDate, hour: u32, offset: &FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    let local = date
        .and_hms_opt(hour, 0, 0)
        .context("invalid seed hour")?
        .and_local_timezone(*offset)
        .single()
        .context("ambiguous seed time")?;
    Ok(local.with_timezone(&Utc))
}

fn seed_status(member: usize, schedule: usize) -> AttendanceStatus {
    match (member * 7 + schedule * 3) % 10 {
        0..=5 => AttendanceStatus::Present,
        6 | 7 => AttendanceStatus::Late,
        8 => AttendanceStatus::Absent,
        _ => AttendanceStatus::EarlyLeave,
    }
}

/// Loads a demo crew with twelve weeks of practice history relative to
/// `now`. Running it again only refreshes the group and profiles.
pub async fn seed(pool: &PgPool, now: DateTime<FixedOffset>) -> anyhow::Result<Uuid> {
    let offset = *now.offset();
    let today = now.date_naive();
    let group_id = Uuid::parse_str(SEED_GROUP_ID)?;

    let members = vec![
        (Uuid::parse_str("a3f1d2c4-5b6e-4f70-8a91-b2c3d4e5f601")?, "김하늘", 400, "owner"),
        (Uuid::parse_str("b4e2c3d5-6c7f-4081-9ba2-c3d4e5f60712")?, "이준호", 300, "member"),
        (Uuid::parse_str("c5d3b4e6-7d80-4192-acb3-d4e5f6071823")?, "박서연", 200, "member"),
        (Uuid::parse_str("d6c4a5f7-8e91-42a3-bdc4-e5f607182934")?, "최민재", 120, "member"),
        (Uuid::parse_str("e7b5f608-9fa2-43b4-ced5-f60718293a45")?, "정유나", 10, "member"),
        (Uuid::parse_str("f8a60719-a0b3-44c5-dfe6-0718293a4b56")?, "강도윤", 250, "member"),
    ];
    // The last member stops showing up 50 days before `now`.
    let dormant_since = now.with_timezone(&Utc) - Duration::days(50);

    sqlx::query(
        r#"
        INSERT INTO dancebase.groups (id, name, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(group_id)
    .bind("크루 하모니")
    .bind(now.with_timezone(&Utc) - Duration::days(400))
    .execute(pool)
    .await?;

    let mut joined = Vec::with_capacity(members.len());
    for (user_id, name, days_ago, role) in &members {
        let joined_at = local_hour(today - Duration::days(*days_ago), 20, &offset)?;
        joined.push(joined_at);

        sqlx::query(
            r#"
            INSERT INTO dancebase.profiles (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(user_id)
        .bind(name)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO dancebase.group_members (id, group_id, user_id, role, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .bind(joined_at)
        .execute(pool)
        .await?;
    }

    let existing: i64 =
        sqlx::query("SELECT COUNT(*) AS count FROM dancebase.schedules WHERE group_id = $1")
            .bind(group_id)
            .fetch_one(pool)
            .await?
            .get("count");
    if existing > 0 {
        info!(schedules = existing, "seed history already present, skipping");
        return Ok(group_id);
    }

    let first_week = week_start(today) - Duration::weeks(SEED_WEEKS - 1);
    let mut schedule_index = 0usize;
    for week in 0..SEED_WEEKS {
        let monday = first_week + Duration::weeks(week);
        let mut sessions = vec![
            (monday + Duration::days(1), 19, "정기 연습"),
            (monday + Duration::days(5), 14, "주말 연습"),
        ];
        if week % 3 == 0 {
            sessions.push((monday + Duration::days(6), 10, "아침 스트레칭"));
        }

        for (date, hour, title) in sessions {
            let starts_at = local_hour(date, hour, &offset)?;
            let schedule_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO dancebase.schedules
                (id, group_id, title, starts_at, ends_at, attendance_method)
                VALUES ($1, $2, $3, $4, $5, 'admin')
                "#,
            )
            .bind(schedule_id)
            .bind(group_id)
            .bind(title)
            .bind(starts_at)
            .bind(starts_at + Duration::hours(2))
            .execute(pool)
            .await?;

            if starts_at > now.with_timezone(&Utc) {
                continue;
            }

            for (index, (user_id, ..)) in members.iter().enumerate() {
                let dormant = index == members.len() - 1 && starts_at > dormant_since;
                if joined[index] > starts_at || dormant {
                    continue;
                }
                let status = seed_status(index, schedule_index);
                sqlx::query(
                    r#"
                    INSERT INTO dancebase.attendance (id, schedule_id, user_id, status, checked_at)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(schedule_id)
                .bind(user_id)
                .bind(status.as_str())
                .bind(starts_at)
                .execute(pool)
                .await?;

                if (index + schedule_index) % 3 != 0 {
                    let response = if status.attended() {
                        RsvpResponse::Going
                    } else {
                        RsvpResponse::NotGoing
                    };
                    sqlx::query(
                        r#"
                        INSERT INTO dancebase.schedule_rsvps
                        (id, schedule_id, user_id, response, responded_at)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(schedule_id)
                    .bind(user_id)
                    .bind(response.as_str())
                    .bind(starts_at - Duration::days(1))
                    .execute(pool)
                    .await?;
                }
            }
            schedule_index += 1;
        }

        for (index, (user_id, name, ..)) in members.iter().enumerate() {
            if (week as usize + index) % 3 != 0 {
                continue;
            }
            let created_at = local_hour(monday, 12 + index as u32, &offset)?;
            let dormant = index == members.len() - 1 && created_at > dormant_since;
            if joined[index] > created_at || dormant || created_at > now.with_timezone(&Utc) {
                continue;
            }
            let post_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO dancebase.board_posts (id, group_id, author_id, title, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(post_id)
            .bind(group_id)
            .bind(user_id)
            .bind(format!("{name}의 연습 노트 {}주차", week + 1))
            .bind(created_at)
            .execute(pool)
            .await?;

            let (commenter, ..) = members[(index + 1) % (members.len() - 1)];
            sqlx::query(
                r#"
                INSERT INTO dancebase.board_comments (id, post_id, author_id, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(post_id)
            .bind(commenter)
            .bind(created_at + Duration::hours(2))
            .execute(pool)
            .await?;
        }
    }

    let this_month = today.with_day(1).context("invalid month start")?;
    for back in 0..6u32 {
        let month = this_month - Months::new(back);
        let entries = [
            ("income", 300_000i64, "월 회비", month + Duration::days(4), "dues"),
            (
                "expense",
                240_000 + i64::from(back) * 15_000,
                "연습실 대관",
                month + Duration::days(9),
                "rent",
            ),
        ];
        for (kind, amount, title, date, tag) in entries {
            if date > today {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO dancebase.finance_transactions
                (id, group_id, kind, amount, title, transaction_date, paid_by, source_key)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(group_id)
            .bind(kind)
            .bind(amount)
            .bind(title)
            .bind(date)
            .bind(members[0].0)
            .bind(format!("seed-{}-{tag}", month.format("%Y-%m")))
            .execute(pool)
            .await?;
        }
    }

    info!(%group_id, schedules = schedule_index, "seed data inserted");
    Ok(group_id)
}
