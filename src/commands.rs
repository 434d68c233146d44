use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::analytics::activity::activity_distribution;
use crate::analytics::consistency::attendance_consistency;
use crate::analytics::forecast::forecast_finances;
use crate::analytics::health::health_trends;
use crate::analytics::schedule_time::{optimal_schedule_time, ScheduleTimeAnalysis, DAY_LABELS};
use crate::analytics::snapshot::performance_snapshot;
use crate::analytics::winback::winback_candidates;
use crate::config::Config;
use crate::db;
use crate::errors::AppError;
use crate::export::export_csv;
use crate::local::drafts::{clear_draft, load_draft, parse_fields, save_draft};
use crate::local::practice_queue::{
    apply_next, apply_reset, apply_skip, calc_stats, queue_key, remove_item, reorder_item,
    Direction, PracticeQueue,
};
use crate::local::role_rotation::{rotation_key, RoleRotationConfig};
use crate::local::style_vote::{vote_key, StyleVoteBoard};
use crate::local::LocalStore;
use crate::models::{AttendanceRecord, AttendanceStatus, Session};
use crate::optimistic::Optimistic;
use crate::report::{build_report, format_change, format_won, GroupReport};
use crate::{Commands, DraftAction, MoveDirection, QueueAction, RotationAction, VoteAction};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    db::create_pool(config.require_database_url()?, config.max_connections).await
}

pub async fn run(
    command: Commands,
    json: bool,
    config: &Config,
    session: &Session,
) -> anyhow::Result<()> {
    match command {
        Commands::Queue { project, action } => {
            let mut store = LocalStore::open(&config.local_store_path).await;
            run_queue(&mut store, session, &project, action, json).await
        }
        Commands::Vote { action } => {
            let mut store = LocalStore::open(&config.local_store_path).await;
            run_vote(&mut store, session, action, json).await
        }
        Commands::Rotation { action } => {
            let mut store = LocalStore::open(&config.local_store_path).await;
            run_rotation(&mut store, session, action, json).await
        }
        Commands::Draft { form, action } => {
            let mut store = LocalStore::open(&config.local_store_path).await;
            run_draft(&mut store, session, &form, action, json).await
        }
        backend => {
            let pool = connect(config).await?;
            run_backend(&pool, session, backend, json).await
        }
    }
}

async fn run_backend(
    pool: &PgPool,
    session: &Session,
    command: Commands,
    json: bool,
) -> anyhow::Result<()> {
    let group_id = session.group_id;
    let now = session.now;

    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let group_id = db::seed(pool, now).await?;
            println!("Seed data inserted for group {group_id}.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_transactions_csv(pool, group_id, &csv).await?;
            println!("Inserted {inserted} transactions from {}.", csv.display());
        }
        Commands::Activity { limit } => {
            let data = db::fetch_group_data(pool, group_id).await?;
            let distribution = activity_distribution(&data, now);
            if json {
                return print_json(&distribution);
            }
            if distribution.total_members == 0 {
                println!("No members in this group.");
                return Ok(());
            }

            println!(
                "{} members, average score {:.1}",
                distribution.total_members, distribution.avg_score
            );
            for summary in distribution.grade_summary.iter() {
                println!("  {}: {}", summary.grade.label(), summary.count);
            }
            println!("Top members by activity (last 30 days):");
            for score in distribution.scores.iter().take(limit) {
                println!(
                    "{:>3}. {} score {} [{}] attendance {} / posts {} / comments {} / rsvp {}",
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
        Commands::HealthTrend => {
            let data = db::fetch_group_data(pool, group_id).await?;
            let trends = health_trends(&data, now);
            if json {
                return print_json(&trends);
            }
            println!("week        attendance  activity  new  rsvp");
            for week in trends.weeks.iter() {
                println!(
                    "{} {:<4} {:>9}% {:>9} {:>4} {:>4}%",
                    week.week_start,
                    week.label,
                    week.attendance_rate,
                    week.activity_count,
                    week.new_member_count,
                    week.rsvp_rate
                );
            }
            println!(
                "Attendance {}% ({}), activity {} ({}), new members {} ({}), rsvp {}% ({})",
                trends.attendance_rate.current,
                format_change(trends.attendance_rate.change_rate),
                trends.activity_count.current,
                format_change(trends.activity_count.change_rate),
                trends.new_member_count.current,
                format_change(trends.new_member_count.change_rate),
                trends.rsvp_rate.current,
                format_change(trends.rsvp_rate.change_rate)
            );
        }
        Commands::Snapshot { period } => {
            let data = db::fetch_group_data(pool, group_id).await?;
            let snapshot = performance_snapshot(&data, now, period);
            if json {
                return print_json(&snapshot);
            }
            println!("Period starting {}", snapshot.period_start);
            for (name, metric) in [
                ("Schedules", &snapshot.schedule_count),
                ("Attendance rate", &snapshot.attendance_rate),
                ("Posts + comments", &snapshot.content_count),
                ("New members", &snapshot.new_member_count),
            ] {
                println!(
                    "- {name}: {} ({})",
                    metric.value,
                    format_change(metric.change_rate)
                );
            }
            match &snapshot.top_contributor {
                Some(top) => println!("Top contributor: {} ({})", top.name, top.activity_count),
                None => println!("No contributions yet this period."),
            }
        }
        Commands::FinanceForecast {
            history_months,
            forecast_months,
        } => {
            let transactions = db::fetch_transactions(pool, group_id).await?;
            let forecast = forecast_finances(
                &transactions,
                session.today(),
                history_months,
                forecast_months,
            );
            if json {
                return print_json(&forecast);
            }
            for month in forecast.months.iter() {
                println!(
                    "{} {:>14} {:>14} {:>14}{}",
                    month.month,
                    format_won(month.income),
                    format_won(month.expense),
                    format_won(month.net),
                    if month.is_forecast { "  (forecast)" } else { "" }
                );
            }
            println!(
                "Projected balance {} ({})",
                format_won(forecast.projected_balance),
                forecast.health.label()
            );
        }
        Commands::BestTime => {
            let data = db::fetch_group_data(pool, group_id).await?;
            let analysis = optimal_schedule_time(&data, now);
            if json {
                return print_json(&analysis);
            }
            match analysis {
                ScheduleTimeAnalysis::InsufficientData { schedule_count } => {
                    println!(
                        "Not enough schedules to compare ({schedule_count} in the last 3 months)."
                    );
                }
                ScheduleTimeAnalysis::Ready { best, cells, .. } => {
                    for cell in cells.iter().filter(|cell| cell.schedule_count > 0) {
                        println!(
                            "{} {} {:>3}% ({} schedules)",
                            DAY_LABELS[cell.day_index as usize],
                            cell.slot.label(),
                            (cell.rate * 100.0).round(),
                            cell.schedule_count
                        );
                    }
                    println!(
                        "Best: {}요일 {} ({}) at {}%",
                        DAY_LABELS[best.day_index as usize],
                        best.slot.label(),
                        best.slot.range(),
                        (best.rate * 100.0).round()
                    );
                }
            }
        }
        Commands::Winback => {
            let data = db::fetch_group_data(pool, group_id).await?;
            let campaign = winback_candidates(&data, now);
            if json {
                return print_json(&campaign);
            }
            if campaign.candidates.is_empty() {
                println!("Everyone has been active in the last 30 days.");
            }
            for candidate in campaign.candidates.iter() {
                println!(
                    "- {} inactive {} days",
                    candidate.name, candidate.inactive_days
                );
            }
        }
        Commands::Consistency { user } => {
            let data = db::fetch_group_data(pool, group_id).await?;
            if data.member_name(user).is_none() {
                return Err(AppError::NotFound(format!("member {user}")).into());
            }
            let consistency = attendance_consistency(&data, user, now);
            if json {
                return print_json(&consistency);
            }
            println!("     월 화 수 목 금 토 일");
            for week in consistency.weeks.iter() {
                let row: Vec<&str> = week
                    .iter()
                    .map(|cell| match (cell.has_schedule, cell.intensity) {
                        (false, _) => " .",
                        (true, 0) => " o",
                        (true, 1) => " ▂",
                        (true, 2) => " ▅",
                        (true, _) => " █",
                    })
                    .collect();
                if let Some(first) = week.first() {
                    println!("{} {}", first.date.format("%m/%d"), row.join(""));
                }
            }
            println!(
                "Overall {}%, consistency {}, current streak {}, longest streak {}",
                consistency.overall_rate,
                consistency.consistency_score,
                consistency.current_streak,
                consistency.longest_streak
            );
        }
        Commands::Export { kind, period, out } => {
            let data = db::fetch_group_data(pool, group_id).await?;
            let rows = match &out {
                Some(path) => {
                    let file = std::fs::File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    export_csv(&data, kind, period, now, file)?
                }
                None => export_csv(&data, kind, period, now, std::io::stdout().lock())?,
            };
            info!(rows, "export finished");
            if let Some(path) = out {
                println!("Exported {rows} rows to {}.", path.display());
            }
        }
        Commands::Report { out } => {
            let (name, data) = tokio::try_join!(
                db::fetch_group_name(pool, group_id),
                db::fetch_group_data(pool, group_id),
            )?;
            let report = GroupReport::build(&name, &data, now);
            if json {
                return print_json(&report);
            }
            write_report(&out, &build_report(&report)).await?;
            println!("Report written to {}.", out.display());
        }
        Commands::Join { user } => match db::submit_join_request(pool, group_id, user).await {
            Ok(id) => println!("Join request {id} submitted."),
            Err(AppError::AlreadyRequested) => println!("A join request is already pending."),
            Err(err) => return Err(err.into()),
        },
        Commands::CheckIn {
            schedule,
            user,
            status,
        } => {
            let roster = check_in(pool, session, schedule, user, status).await?;
            if json {
                return print_json(&roster);
            }
            let attended = roster.iter().filter(|r| r.status.attended()).count();
            println!(
                "Checked in as {status}. {attended} of {} recorded members attended.",
                roster.len()
            );
        }
        Commands::Queue { .. }
        | Commands::Vote { .. }
        | Commands::Rotation { .. }
        | Commands::Draft { .. } => bail!("local commands do not need the database"),
    }

    Ok(())
}

async fn write_report(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Replaces or appends `user_id`'s record in the roster.
pub fn apply_check_in(
    roster: &mut Vec<AttendanceRecord>,
    schedule_id: Uuid,
    user_id: Uuid,
    status: AttendanceStatus,
    checked_at: DateTime<Utc>,
) {
    match roster.iter_mut().find(|record| record.user_id == user_id) {
        Some(record) => {
            record.status = status;
            record.checked_at = checked_at;
        }
        None => roster.push(AttendanceRecord {
            schedule_id,
            user_id,
            status,
            checked_at,
        }),
    }
}

/// Shows the new status on the local roster straight away, writes it, then
/// reloads the roster. A failed write puts the old roster back.
async fn check_in(
    pool: &PgPool,
    session: &Session,
    schedule_id: Uuid,
    user_id: Uuid,
    status: AttendanceStatus,
) -> Result<Vec<AttendanceRecord>, AppError> {
    let schedule = db::fetch_schedule(pool, schedule_id).await?;
    let mut roster = Optimistic::new(db::fetch_schedule_attendance(pool, schedule.id).await?);
    let checked_at = session.now_utc();

    roster
        .mutate_and_refresh(
            |records| apply_check_in(records, schedule.id, user_id, status, checked_at),
            |_| db::upsert_attendance(pool, schedule.id, user_id, status, checked_at),
            || db::fetch_schedule_attendance(pool, schedule.id),
        )
        .await?;

    Ok(roster.into_inner())
}

fn find_queue(queues: &[PracticeQueue], key: &str) -> anyhow::Result<usize> {
    queues
        .iter()
        .position(|queue| queue.id == key || queue.name == key)
        .with_context(|| format!("no practice queue named '{key}'"))
}

async fn run_queue(
    store: &mut LocalStore,
    session: &Session,
    project: &str,
    action: QueueAction,
    json: bool,
) -> anyhow::Result<()> {
    let key = queue_key(&session.group_id.to_string(), project);
    let mut queues: Vec<PracticeQueue> = store.load(&key, Vec::new());

    let changed = match action {
        QueueAction::List => {
            if json {
                return print_json(&queues);
            }
            if queues.is_empty() {
                println!("No practice queues yet.");
            }
            for queue in queues.iter() {
                println!("{} ({})", queue.name, queue.id);
                for item in queue.items.iter() {
                    let marker = if Some(item) == queue.current() { ">" } else { " " };
                    println!(
                        "  {marker} {}. {} - {} x{} [{:?}] {}",
                        item.order + 1,
                        item.song_title,
                        item.artist,
                        item.repeat_count,
                        item.status,
                        item.id
                    );
                    if !item.note.is_empty() {
                        println!("       note: {}", item.note);
                    }
                }
            }
            false
        }
        QueueAction::Stats => {
            let stats = calc_stats(&queues);
            if json {
                return print_json(&stats);
            }
            println!(
                "{} queues, {} songs, {} completed",
                stats.total_queues, stats.total_songs, stats.completed_songs
            );
            false
        }
        QueueAction::Create { name } => {
            let queue = PracticeQueue::new(&name, session.now_utc());
            println!("Created queue {} ({}).", queue.name, queue.id);
            queues.push(queue);
            true
        }
        QueueAction::Add {
            queue,
            song,
            artist,
            duration,
            repeat,
            note,
        } => {
            let index = find_queue(&queues, &queue)?;
            let target = &mut queues[index];
            target.add_item(&song, &artist, &duration, repeat, &note);
            if target.items.len() == 1 {
                queues[index] = apply_reset(&queues[index]);
            }
            true
        }
        QueueAction::Remove { queue, item } => {
            let index = find_queue(&queues, &queue)?;
            queues[index] = remove_item(&queues[index], &item)
                .with_context(|| format!("no item '{item}' in this queue"))?;
            true
        }
        QueueAction::Move {
            queue,
            index: item_index,
            direction,
        } => {
            let index = find_queue(&queues, &queue)?;
            let direction = match direction {
                MoveDirection::Up => Direction::Up,
                MoveDirection::Down => Direction::Down,
            };
            match reorder_item(&queues[index], item_index, direction) {
                Some(updated) => {
                    queues[index] = updated;
                    true
                }
                None => {
                    println!("Item {item_index} cannot move that way.");
                    false
                }
            }
        }
        QueueAction::Next { queue } => {
            let index = find_queue(&queues, &queue)?;
            queues[index] = apply_next(&queues[index]);
            true
        }
        QueueAction::Skip { queue } => {
            let index = find_queue(&queues, &queue)?;
            queues[index] = apply_skip(&queues[index]);
            true
        }
        QueueAction::Reset { queue } => {
            let index = find_queue(&queues, &queue)?;
            queues[index] = apply_reset(&queues[index]);
            true
        }
    };

    if changed {
        store.save(&key, &queues).await?;
    }
    Ok(())
}

async fn run_vote(
    store: &mut LocalStore,
    session: &Session,
    action: VoteAction,
    json: bool,
) -> anyhow::Result<()> {
    let key = vote_key(&session.group_id.to_string());
    let mut board: StyleVoteBoard = store.load(&key, StyleVoteBoard::default());
    let now = session.now_utc();

    match action {
        VoteAction::List => {
            if json {
                return print_json(&board);
            }
            for vote in board.sessions.iter() {
                println!(
                    "{} [{:?}] {} candidates, {} votes ({})",
                    vote.topic,
                    vote.status,
                    vote.candidates.len(),
                    vote.total_votes(),
                    vote.id
                );
            }
            if let Some(active) = board.active_session() {
                println!("Open for voting: {}", active.topic);
            }
            return Ok(());
        }
        VoteAction::Show { session: id } => {
            let vote = board
                .session(&id)
                .with_context(|| format!("no vote session '{id}'"))?;
            if json {
                return print_json(vote);
            }
            println!("{} [{:?}]", vote.topic, vote.status);
            for candidate in vote.candidates.iter() {
                println!(
                    "- {} by {}: {} votes ({}%) {}",
                    candidate.title,
                    candidate.proposed_by,
                    candidate.votes.len(),
                    vote.vote_rate(&candidate.id),
                    candidate.id
                );
            }
            match vote.winner() {
                Some(winner) => println!("Leading: {}", winner.title),
                None => println!("No votes yet."),
            }
            return Ok(());
        }
        VoteAction::Create { topic, max_votes } => {
            let id = board.create_session(&topic, max_votes, now);
            println!("Created vote session {id}.");
        }
        VoteAction::Close { session: id } => board.close_session(&id, now),
        VoteAction::Reopen { session: id } => board.reopen_session(&id),
        VoteAction::Delete { session: id } => board.delete_session(&id),
        VoteAction::AddCandidate {
            session: id,
            title,
            description,
            by,
        } => {
            let candidate = board
                .add_candidate(&id, &title, &description, &by)
                .with_context(|| format!("no vote session '{id}'"))?;
            println!("Added candidate {candidate}.");
        }
        VoteAction::RemoveCandidate {
            session: id,
            candidate,
        } => board.remove_candidate(&id, &candidate),
        VoteAction::Cast {
            session: id,
            candidate,
            voter,
        } => {
            if !board.cast_vote(&id, &candidate, &voter) {
                println!("Vote not counted: the session is closed or the vote limit is used up.");
                return Ok(());
            }
            let voted = board
                .session(&id)
                .map(|vote| vote.has_voted(&candidate, &voter))
                .unwrap_or(false);
            println!("{}", if voted { "Vote recorded." } else { "Vote withdrawn." });
        }
    }

    store.save(&key, &board).await?;
    Ok(())
}

async fn run_rotation(
    store: &mut LocalStore,
    session: &Session,
    action: RotationAction,
    json: bool,
) -> anyhow::Result<()> {
    let key = rotation_key(&session.group_id.to_string());
    let today = session.today();
    let existing: Option<RoleRotationConfig> = store.load(&key, None);

    match action {
        RotationAction::Setup {
            roles,
            members,
            weeks,
        } => {
            let config = RoleRotationConfig::new(
                &roles,
                &members,
                weeks,
                today,
                session.now_utc(),
            )?;
            store.save(&key, &config).await?;
            println!(
                "Rotation set for {} roles across {} members over {} weeks.",
                config.roles.len(),
                config.members.len(),
                config.rotation_weeks
            );
        }
        RotationAction::Show => {
            let config = existing.context("no role rotation configured")?;
            let current = config.current(today);
            if json {
                return print_json(&current);
            }
            if current.is_empty() {
                println!("No assignments for this week.");
            }
            for assignment in current {
                println!(
                    "[{}] {}: {}",
                    if assignment.completed { "x" } else { " " },
                    assignment.role_name,
                    assignment.member_name
                );
            }
        }
        RotationAction::Complete { role, week } => {
            let mut config = existing.context("no role rotation configured")?;
            if !config.mark_completed(&role, week.unwrap_or(today)) {
                bail!("no '{role}' assignment in that week");
            }
            store.save(&key, &config).await?;
        }
    }
    Ok(())
}

async fn run_draft(
    store: &mut LocalStore,
    session: &Session,
    form: &str,
    action: DraftAction,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        DraftAction::Save { fields } => {
            let fields = parse_fields(&fields)?;
            let count = fields.len();
            save_draft(store, form, fields, session.now_utc()).await?;
            println!("Saved {count} fields for {form}.");
        }
        DraftAction::Show => match load_draft(store, form) {
            Some(draft) if json => return print_json(&draft),
            Some(draft) => {
                println!("Saved {}", draft.saved_at);
                for (name, value) in draft.fields.iter() {
                    println!("{name}={value}");
                }
            }
            None => println!("No draft for {form}."),
        },
        DraftAction::Clear => {
            if clear_draft(store, form).await? {
                println!("Draft for {form} cleared.");
            }
        }
    }
    Ok(())
}
