use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod analytics;
mod commands;
mod config;
mod db;
mod errors;
mod export;
mod local;
mod models;
mod optimistic;
mod report;

use crate::analytics::forecast::{FORECAST_MONTHS, HISTORY_MONTHS, MAX_MONTHS};
use crate::analytics::snapshot::PerformancePeriod;
use crate::config::Config;
use crate::export::{ExportKind, ExportPeriod};
use crate::models::{AttendanceStatus, Session};

#[derive(Parser)]
#[command(name = "crew-insights")]
#[command(about = "Activity, health and finance insights for dance crews", long_about = None)]
struct Cli {
    /// Group to analyse
    #[arg(long, global = true, default_value = db::SEED_GROUP_ID)]
    group: Uuid,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo crew with twelve weeks of history
    Seed,
    /// Import finance transactions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank members by activity over the last 30 days
    Activity {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Weekly health metrics for the last 8 weeks
    HealthTrend,
    /// This week or month compared with the one before
    Snapshot {
        #[arg(long, default_value = "week")]
        period: PerformancePeriod,
    },
    /// Monthly income and expense with a short projection
    FinanceForecast {
        #[arg(
            long,
            default_value_t = HISTORY_MONTHS,
            value_parser = clap::value_parser!(u32).range(1..=MAX_MONTHS as i64)
        )]
        history_months: u32,
        #[arg(
            long,
            default_value_t = FORECAST_MONTHS,
            value_parser = clap::value_parser!(u32).range(0..=MAX_MONTHS as i64)
        )]
        forecast_months: u32,
    },
    /// Weekday and time slot with the best turnout
    BestTime,
    /// Members who have gone quiet
    Winback,
    /// Twelve-week attendance heatmap for one member
    Consistency {
        #[arg(long)]
        user: Uuid,
    },
    /// Export attendance, board or finance rows as CSV
    Export {
        #[arg(long)]
        kind: ExportKind,
        #[arg(long, default_value = "this_month")]
        period: ExportPeriod,
        /// Defaults to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Ask to join the group
    Join {
        #[arg(long)]
        user: Uuid,
    },
    /// Record attendance for one member at one schedule
    CheckIn {
        #[arg(long)]
        schedule: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "present")]
        status: AttendanceStatus,
    },
    /// Practice song queues kept on this machine
    Queue {
        #[arg(long, default_value = "default")]
        project: String,
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Style and concept votes kept on this machine
    Vote {
        #[command(subcommand)]
        action: VoteAction,
    },
    /// Weekly role rotation kept on this machine
    Rotation {
        #[command(subcommand)]
        action: RotationAction,
    },
    /// Unsubmitted form drafts kept on this machine
    Draft {
        #[arg(long)]
        form: String,
        #[command(subcommand)]
        action: DraftAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

#[derive(Subcommand)]
enum QueueAction {
    List,
    Create {
        #[arg(long)]
        name: String,
    },
    Add {
        /// Queue id or name
        #[arg(long)]
        queue: String,
        #[arg(long)]
        song: String,
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long, default_value = "")]
        duration: String,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// What to focus on for this song
        #[arg(long, default_value = "")]
        note: String,
    },
    Remove {
        #[arg(long)]
        queue: String,
        #[arg(long)]
        item: String,
    },
    Move {
        #[arg(long)]
        queue: String,
        #[arg(long)]
        index: usize,
        #[arg(long, value_enum)]
        direction: MoveDirection,
    },
    Next {
        #[arg(long)]
        queue: String,
    },
    Skip {
        #[arg(long)]
        queue: String,
    },
    Reset {
        #[arg(long)]
        queue: String,
    },
    Stats,
}

#[derive(Subcommand)]
enum VoteAction {
    List,
    Create {
        #[arg(long)]
        topic: String,
        #[arg(long, default_value_t = 1)]
        max_votes: i64,
    },
    Close {
        #[arg(long)]
        session: String,
    },
    Reopen {
        #[arg(long)]
        session: String,
    },
    Delete {
        #[arg(long)]
        session: String,
    },
    AddCandidate {
        #[arg(long)]
        session: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        by: String,
    },
    RemoveCandidate {
        #[arg(long)]
        session: String,
        #[arg(long)]
        candidate: String,
    },
    Cast {
        #[arg(long)]
        session: String,
        #[arg(long)]
        candidate: String,
        #[arg(long)]
        voter: String,
    },
    Show {
        #[arg(long)]
        session: String,
    },
}

#[derive(Subcommand)]
enum RotationAction {
    Setup {
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,
        #[arg(long, value_delimiter = ',', required = true)]
        members: Vec<String>,
        /// Between 1 and 52
        #[arg(long, default_value_t = 4)]
        weeks: u32,
    },
    Show,
    Complete {
        #[arg(long)]
        role: String,
        /// Any date in the week; defaults to this week
        #[arg(long)]
        week: Option<chrono::NaiveDate>,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Store `name=value` fields
    Save { fields: Vec<String> },
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("crew_insights={}", config.rust_log))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let session = Session::new(cli.group, config.utc_offset);
    debug!(group = %session.group_id, now = %session.now, "session ready");

    commands::run(cli.command, cli.json, &config, &session).await
}
