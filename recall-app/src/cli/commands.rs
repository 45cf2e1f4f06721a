use crate::cli::opts::*;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use recall_core::{
    compute_due_date, daily_streak, due_queue, schedule, study_stats, CardId, Grade, MemoryState,
    QueueParams, ReviewOutcome, StudyStats,
};
use recall_json::{paths::data_root, JsonStore};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

pub async fn run_cli(args: Cli) -> Result<()> {
    match args.cmd.clone() {
        Command::Next(cmd) => next_cmd(cmd),
        Command::Due(cmd) => due_cmd(cmd),
        Command::Simulate(cmd) => simulate_cmd(cmd),
        cmd => {
            let store = open_store(&args).await?;
            match cmd {
                Command::Card(cmd) => card_cmd(&store, cmd).await,
                Command::Review(cmd) => review_cmd(&store, cmd).await,
                Command::Queue(cmd) => queue_cmd(&store, cmd).await,
                Command::Stats => stats_cmd(&store).await,
                Command::Next(_) | Command::Due(_) | Command::Simulate(_) => unreachable!(),
            }
        }
    }
}

pub async fn open_store(args: &Cli) -> Result<JsonStore> {
    let store = match &args.data_dir {
        Some(root) => JsonStore::open_in(root, args.max_backups)
            .await
            .with_context(|| format!("opening store in {}", root.display()))?,
        None => JsonStore::open_default(args.max_backups)
            .await
            .with_context(|| format!("opening store in {}", data_root().display()))?,
    };
    debug!(path = %store.path().display(), "store ready");
    Ok(store)
}

fn start_state(s: &StartState) -> MemoryState {
    MemoryState::new(s.easiness, s.repetition, s.interval_days)
}

fn next_cmd(cmd: NextCmd) -> Result<()> {
    let out = schedule(start_state(&cmd.start), cmd.grade, cmd.at)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn due_cmd(cmd: DueCmd) -> Result<()> {
    let due = compute_due_date(cmd.interval, cmd.from)?;
    println!("{}", due.to_rfc3339());
    Ok(())
}

const SIMULATE_HEADER: &str = "step\tgrade\teasiness\trepetition\tinterval_days\tnext_review_at";

fn simulate_cmd(cmd: SimulateCmd) -> Result<()> {
    let from = cmd.from.unwrap_or_else(Utc::now);
    for line in simulate_lines(start_state(&cmd.start), &cmd.grades, from)? {
        println!("{line}");
    }
    Ok(())
}

/// Replays `grades`, each review taking place exactly when the previous one
/// made the card due. Returns the header and one row per step.
fn simulate_lines(start: MemoryState, grades: &[i32], from: DateTime<Utc>) -> Result<Vec<String>> {
    let mut state = start;
    let mut at = from;
    let mut lines = vec![SIMULATE_HEADER.to_string()];

    for (i, g) in grades.iter().enumerate() {
        let out = schedule(state, *g, Some(at)).with_context(|| format!("step {}", i + 1))?;
        lines.push(format!(
            "{}\t{}\t{:.2}\t{}\t{}\t{}",
            i + 1,
            g,
            out.state.easiness,
            out.state.repetition,
            out.state.interval_days,
            out.next_review_at.to_rfc3339()
        ));
        state = out.state;
        at = out.next_review_at;
    }
    Ok(lines)
}

async fn card_cmd(store: &JsonStore, cmd: CardCmd) -> Result<()> {
    match cmd {
        CardCmd::Add {
            easiness,
            repetition,
            interval_days,
        } => {
            let c = store
                .add_card(MemoryState::from_stored(easiness, repetition, interval_days))
                .await?;
            println!("{}", c.id);
        }
        CardCmd::List => {
            let now = Utc::now();
            for c in store.list_cards().await? {
                let due = c
                    .next_review_at
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\tef={:.2}\treps={}\tinterval={}\tdue={}\tstatus={:?}\tsuspended={}",
                    c.id,
                    c.state.easiness,
                    c.state.repetition,
                    c.state.interval_days,
                    due,
                    c.due_status(now),
                    c.suspended
                );
            }
        }
        CardCmd::Rm { card_id } => {
            store.delete_card(parse_card_id(&card_id)?).await?;
            println!("ok");
        }
        CardCmd::Suspend { card_id } => {
            store.set_suspended(parse_card_id(&card_id)?, true).await?;
            println!("ok");
        }
        CardCmd::Unsuspend { card_id } => {
            store.set_suspended(parse_card_id(&card_id)?, false).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn review_cmd(store: &JsonStore, cmd: ReviewCmd) -> Result<()> {
    let now = cmd.at.unwrap_or_else(Utc::now);
    let out = review_card(store, &cmd.card_id, cmd.grade, now).await?;
    let c = out.updated_card;
    let due = c.next_review_at.unwrap_or(out.review.next_review_at);
    println!(
        "→ ef={:.2} reps={} next due {} (in {} day(s))",
        c.state.easiness,
        c.state.repetition,
        due.to_rfc3339(),
        c.state.interval_days
    );
    Ok(())
}

async fn review_card(store: &JsonStore, card_id: &str, grade: i32, now: DateTime<Utc>) -> Result<ReviewOutcome> {
    // Validate before touching the store.
    let grade = Grade::new(grade)?;
    let id = parse_card_id(card_id)?;
    Ok(store.record_review(id, grade, now).await?)
}

async fn queue_cmd(store: &JsonStore, cmd: QueueCmd) -> Result<()> {
    let now = Utc::now();
    let cards = store.list_cards().await?;
    let params = QueueParams {
        page: cmd.page,
        limit: cmd.limit,
        order: cmd.order.into(),
        include_new: cmd.include_new,
    };

    let page = due_queue(&cards, now, &params);
    if page.total == 0 {
        println!("no cards due");
        return Ok(());
    }
    for c in &page.items {
        let due = c
            .next_review_at
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "new".to_string());
        println!("{}\t{}\t{:?}", c.id, due, c.due_status(now));
    }
    println!("page {} ({} per page), {} due", page.page, page.limit, page.total);
    Ok(())
}

#[derive(Serialize)]
struct StatsOut {
    #[serde(flatten)]
    stats: StudyStats,
    streak_days: u32,
}

async fn stats_cmd(store: &JsonStore) -> Result<()> {
    let now = Utc::now();
    let cards = store.list_cards().await?;
    let reviews = store.list_reviews(None).await?;

    let out = StatsOut {
        stats: study_stats(&cards, &reviews, now),
        streak_days: daily_streak(&reviews, now.date_naive()),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn parse_card_id(s: &str) -> Result<CardId> {
    Uuid::parse_str(s.trim()).map_err(|_| anyhow!("invalid card id: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn simulate_worked_sequence() {
        let lines = simulate_lines(MemoryState::default(), &[4, 4, 5, 2], at(2024, 1, 10)).unwrap();
        assert_eq!(
            lines,
            vec![
                SIMULATE_HEADER.to_string(),
                "1\t4\t2.50\t1\t1\t2024-01-11T00:00:00+00:00".to_string(),
                "2\t4\t2.50\t2\t6\t2024-01-17T00:00:00+00:00".to_string(),
                "3\t5\t2.60\t3\t15\t2024-02-01T00:00:00+00:00".to_string(),
                "4\t2\t2.28\t0\t1\t2024-02-02T00:00:00+00:00".to_string(),
            ]
        );
    }

    #[test]
    fn simulate_stops_at_invalid_grade() {
        let err = simulate_lines(MemoryState::default(), &[4, 9], at(2024, 1, 10)).unwrap_err();
        assert!(format!("{err:#}").contains("step 2"));
    }

    #[tokio::test]
    async fn invalid_grade_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open_in(dir.path(), 3).await.unwrap();
        let card = store.add_card(MemoryState::default()).await.unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = review_card(&store, &card.id.to_string(), 6, at(2024, 1, 10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("grade must be between 0 and 5"));

        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(store.list_reviews(None).await.unwrap().is_empty());
        assert_eq!(store.get_card(card.id).await.unwrap(), card);
    }

    #[tokio::test]
    async fn valid_review_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open_in(dir.path(), 3).await.unwrap();
        let card = store.add_card(MemoryState::new(2.5, 1, 1)).await.unwrap();

        let out = review_card(&store, &format!(" {} ", card.id), 4, at(2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(out.updated_card.state.interval_days, 6);
        assert_eq!(out.updated_card.next_review_at, Some(at(2024, 1, 16)));
        assert_eq!(store.list_reviews(Some(card.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_card_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open_in(dir.path(), 3).await.unwrap();
        assert!(review_card(&store, "not-a-uuid", 3, at(2024, 1, 10)).await.is_err());
    }
}
