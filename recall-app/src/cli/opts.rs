use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use recall_core::SortOrder;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[command(name = "recall", version, about = "SM-2 review scheduling (pure commands and a JSON card store)")]
pub struct Cli {
    /// Directory holding recall.json and its backups (defaults to app data dir)
    #[arg(long, env = "RECALL_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Timestamped backups to keep next to the store
    #[arg(long, default_value_t = 10, global = true)]
    pub max_backups: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compute the state and due date that follow one review
    Next(NextCmd),
    /// Add whole UTC days to an instant
    Due(DueCmd),
    /// Replay a grade sequence from a start state
    Simulate(SimulateCmd),
    /// Card schedule operations (store)
    #[command(subcommand)]
    Card(CardCmd),
    /// Grade a stored card
    Review(ReviewCmd),
    /// List cards due for review
    Queue(QueueCmd),
    /// Review statistics
    Stats,
}

#[derive(Debug, Args, Clone)]
pub struct StartState {
    #[arg(long, default_value_t = recall_core::EF_DEFAULT)]
    pub easiness: f64,
    #[arg(long, default_value_t = 0)]
    pub repetition: u32,
    #[arg(long = "interval", default_value_t = 0)]
    pub interval_days: u32,
}

#[derive(Debug, Args, Clone)]
pub struct NextCmd {
    #[command(flatten)]
    pub start: StartState,
    /// Recall quality, 0-5
    #[arg(long, allow_negative_numbers = true)]
    pub grade: i32,
    /// Reference instant (RFC 3339), defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args, Clone)]
pub struct DueCmd {
    #[arg(long, allow_negative_numbers = true)]
    pub interval: f64,
    /// Reference instant (RFC 3339), defaults to now
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateCmd {
    #[command(flatten)]
    pub start: StartState,
    /// Comma-separated grades, e.g. 4,4,5,2
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
    pub grades: Vec<i32>,
    /// Instant of the first review (RFC 3339), defaults to now
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    /// Track a new card; omitted fields take unreviewed defaults
    Add {
        #[arg(long)]
        easiness: Option<f64>,
        #[arg(long)]
        repetition: Option<u32>,
        #[arg(long = "interval")]
        interval_days: Option<u32>,
    },
    List,
    Rm { card_id: String },
    Suspend { card_id: String },
    Unsuspend { card_id: String },
}

#[derive(Debug, Args, Clone)]
pub struct ReviewCmd {
    pub card_id: String,
    #[arg(long, allow_negative_numbers = true)]
    pub grade: i32,
    /// Review instant (RFC 3339), defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(o: OrderArg) -> Self {
        match o {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct QueueCmd {
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    #[arg(long, default_value_t = recall_core::DEFAULT_PAGE_LIMIT)]
    pub limit: usize,
    #[arg(long, value_enum, default_value_t = OrderArg::Asc)]
    pub order: OrderArg,
    #[arg(long)]
    pub include_new: bool,
}
