use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use recall_core::{apply_review, CardId, CardSchedule, Grade, MemoryState, ReviewLog, ReviewOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};

pub mod error;
pub mod paths;

pub use error::StoreError;

const FILE_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cards: Vec<CardSchedule>,
    reviews: Vec<ReviewLog>,
}

#[derive(Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cards: HashMap<CardId, CardSchedule>,
    reviews: HashMap<CardId, Vec<ReviewLog>>,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            cards: HashMap::new(),
            reviews: HashMap::new(),
        }
    }

    fn to_image(&self) -> FileImage {
        let mut cards: Vec<CardSchedule> = self.cards.values().cloned().collect();
        cards.sort_by_key(|c| (c.created_at, c.id));
        let mut reviews: Vec<ReviewLog> = self.reviews.values().flatten().cloned().collect();
        reviews.sort_by_key(|r| (r.reviewed_at, r.id));
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            cards,
            reviews,
        }
    }

    fn from_image(img: FileImage) -> Self {
        let cards = img.cards.into_iter().map(|c| (c.id, c)).collect();
        let mut reviews: HashMap<CardId, Vec<ReviewLog>> = HashMap::new();
        for r in img.reviews {
            reviews.entry(r.card_id).or_default().push(r);
        }
        Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            cards,
            reviews,
        }
    }
}

/// Card schedules and review logs in a single JSON file.
///
/// Every mutation is applied to a copy of the state, flushed whole, and only
/// then swapped into the cache, so a failed flush leaves the cache as it was.
/// Commits are serialized so an older snapshot never lands after a newer one.
pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: RwLock<State>,
    commit: Mutex<()>,
}

impl JsonStore {
    pub async fn open_default(max_backups: usize) -> Result<Self, StoreError> {
        let (file, backups) = paths::default_store_file();
        Self::open_with(file, backups, max_backups).await
    }

    pub async fn open_in(root: &Path, max_backups: usize) -> Result<Self, StoreError> {
        let (file, backups) = paths::store_files(root);
        Self::open_with(file, backups, max_backups).await
    }

    pub async fn open_with(path: PathBuf, backups_dir: PathBuf, max_backups: usize) -> Result<Self, StoreError> {
        ensure_parent_dirs(&path)?;
        fs::create_dir_all(&backups_dir)?;
        let max_backups = max_backups.max(1);
        let state = load_or_init(&path, &backups_dir, max_backups).await?;
        info!(path = %path.display(), cards = state.cards.len(), "opened store");
        Ok(Self {
            path,
            backups_dir,
            max_backups,
            state: RwLock::new(state),
            commit: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `change` on a copy of the state, writes it out, and publishes it.
    async fn commit<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut State) -> Result<T, StoreError>,
    {
        let _guard = self.commit.lock().await;
        let mut next = self.state.read().clone();
        let out = change(&mut next)?;
        next.updated_at = Utc::now();

        let snapshot = next.to_image();
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;
        task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &snapshot)).await??;

        *self.state.write() = next;
        debug!(path = %self.path.display(), "store flushed");
        Ok(out)
    }

    pub async fn add_card(&self, state: MemoryState) -> Result<CardSchedule, StoreError> {
        let mut card = CardSchedule::new(Utc::now());
        card.state = state;
        self.commit(|s| {
            s.cards.insert(card.id, card.clone());
            Ok(card)
        })
        .await
    }

    pub async fn get_card(&self, id: CardId) -> Result<CardSchedule, StoreError> {
        let s = self.state.read();
        s.cards.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    pub async fn list_cards(&self) -> Result<Vec<CardSchedule>, StoreError> {
        let s = self.state.read();
        let mut v: Vec<CardSchedule> = s.cards.values().cloned().collect();
        v.sort_by_key(|c| c.created_at);
        Ok(v)
    }

    pub async fn delete_card(&self, id: CardId) -> Result<(), StoreError> {
        self.commit(|s| {
            if s.cards.remove(&id).is_none() {
                return Err(StoreError::NotFound(id));
            }
            s.reviews.remove(&id);
            Ok(())
        })
        .await
    }

    pub async fn set_suspended(&self, id: CardId, suspended: bool) -> Result<(), StoreError> {
        self.commit(|s| {
            let Some(c) = s.cards.get_mut(&id) else {
                return Err(StoreError::NotFound(id));
            };
            c.suspended = suspended;
            Ok(())
        })
        .await
    }

    /// Schedules the card's next review and persists the new state together
    /// with its review log. Nothing changes, on disk or in memory, unless both
    /// scheduling and the write succeed.
    pub async fn record_review(
        &self,
        id: CardId,
        grade: Grade,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, StoreError> {
        let outcome = self
            .commit(|s| {
                let card = s.cards.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
                let out = apply_review(card, grade, now)?;
                s.cards.insert(id, out.updated_card.clone());
                s.reviews.entry(id).or_default().push(out.review.clone());
                Ok(out)
            })
            .await?;
        info!(
            card = %id,
            grade = grade.as_score(),
            interval_days = outcome.updated_card.state.interval_days,
            easiness = outcome.updated_card.state.easiness,
            "review recorded"
        );
        Ok(outcome)
    }

    /// Review logs, oldest first, optionally for one card.
    pub async fn list_reviews(&self, card_id: Option<CardId>) -> Result<Vec<ReviewLog>, StoreError> {
        let s = self.state.read();
        let mut v: Vec<ReviewLog> = match card_id {
            Some(id) => s.reviews.get(&id).cloned().unwrap_or_default(),
            None => s.reviews.values().flatten().cloned().collect(),
        };
        v.sort_by_key(|r| r.reviewed_at);
        Ok(v)
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

async fn load_or_init(path: &Path, backups_dir: &Path, keep: usize) -> Result<State, StoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let img = task::spawn_blocking(move || -> Result<FileImage, StoreError> {
            let buf = fs::read_to_string(&p)?;
            Ok(serde_json::from_str::<FileImage>(&buf)?)
        })
        .await??;
        if img.version > FILE_VERSION {
            return Err(StoreError::Version(img.version));
        }
        Ok(State::from_image(img))
    } else {
        let st = State::new_empty();
        let img = st.to_image();
        let (p, b) = (path.to_path_buf(), backups_dir.to_path_buf());
        task::spawn_blocking(move || write_with_backup(&p, &b, keep, &img)).await??;
        Ok(st)
    }
}

/// Replaces the store file atomically. The backup copy is best effort; a
/// failed backup does not fail the write.
fn write_with_backup(path: &Path, backups_dir: &Path, max_backups: usize, img: &FileImage) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(img)?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    if let Err(e) = write_backup(backups_dir, max_backups, &json) {
        warn!(dir = %backups_dir.display(), error = %e, "backup not written");
    }
    Ok(())
}

fn write_backup(backups_dir: &Path, max_backups: usize, json: &[u8]) -> Result<(), std::io::Error> {
    fs::create_dir_all(backups_dir)?;
    let ts = Utc::now().format("%Y%m%d-%H%M%S%.3f");
    let backup_path = backups_dir.join(format!("recall-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(json)?;
    btmp.flush()?;
    btmp.persist(&backup_path).map_err(|e| e.error)?;

    rotate_backups(backups_dir, max_backups)
}

fn rotate_backups(dir: &Path, keep: usize) -> Result<(), std::io::Error> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    // Names embed the timestamp, so lexical order is age order.
    entries.sort();
    if entries.len() > keep {
        let stale = entries.len() - keep;
        let mut removed = 0usize;
        for p in &entries[..stale] {
            match fs::remove_file(p) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %p.display(), error = %e, "could not remove old backup"),
            }
        }
        debug!(removed, dir = %dir.display(), "rotated backups");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn open(dir: &Path, keep: usize) -> JsonStore {
        JsonStore::open_in(dir, keep).await.unwrap()
    }

    fn backup_count(dir: &Path) -> usize {
        fs::read_dir(dir.join("backups")).unwrap().count()
    }

    #[tokio::test]
    async fn review_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();

        let id = {
            let store = open(dir.path(), 5).await;
            let card = store.add_card(MemoryState::default()).await.unwrap();
            let out = store.record_review(card.id, Grade::new(4).unwrap(), now).await.unwrap();
            assert_eq!(out.updated_card.state.repetition, 1);
            card.id
        };

        let store = open(dir.path(), 5).await;
        let card = store.get_card(id).await.unwrap();
        assert_eq!(card.state, MemoryState::new(2.5, 1, 1));
        assert_eq!(card.last_review_at, Some(now));
        assert_eq!(card.next_review_at, Some(Utc.with_ymd_and_hms(2024, 1, 11, 8, 0, 0).unwrap()));

        let logs = store.list_reviews(Some(id)).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].grade.as_score(), 4);
    }

    #[tokio::test]
    async fn missing_card_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 3).await;
        let id = uuid::Uuid::new_v4();

        let err = store.record_review(id, Grade::new(3).unwrap(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(x) if x == id));
        assert!(matches!(store.delete_card(id).await, Err(StoreError::NotFound(_))));
        assert!(store.list_reviews(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let store = open(&root, 3).await;
        let card = store.add_card(MemoryState::default()).await.unwrap();

        // the store directory turns into a plain file, so no write can land
        fs::remove_dir_all(&root).unwrap();
        fs::write(&root, b"not a directory").unwrap();

        let res = store.record_review(card.id, Grade::new(4).unwrap(), Utc::now()).await;
        assert!(res.is_err());
        assert_eq!(store.get_card(card.id).await.unwrap(), card);
        assert!(store.list_reviews(None).await.unwrap().is_empty());

        assert!(store.set_suspended(card.id, true).await.is_err());
        assert!(!store.get_card(card.id).await.unwrap().suspended);

        assert!(store.delete_card(card.id).await.is_err());
        assert!(store.add_card(MemoryState::default()).await.is_err());
        assert_eq!(store.list_cards().await.unwrap(), vec![card]);
    }

    #[test]
    fn default_paths_live_under_data_root() {
        let (file, backups) = paths::default_store_file();
        assert_eq!(file.parent(), Some(paths::data_root().as_path()));
        assert_eq!(backups.parent(), file.parent());
    }

    #[tokio::test]
    async fn delete_drops_reviews() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 3).await;
        let card = store.add_card(MemoryState::default()).await.unwrap();
        store.record_review(card.id, Grade::new(1).unwrap(), Utc::now()).await.unwrap();

        store.delete_card(card.id).await.unwrap();
        assert!(store.list_cards().await.unwrap().is_empty());
        assert!(store.list_reviews(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suspend_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 3).await;
        let card = store.add_card(MemoryState::new(1.9, 2, 6)).await.unwrap();
        store.set_suspended(card.id, true).await.unwrap();
        assert!(store.get_card(card.id).await.unwrap().suspended);
    }

    #[tokio::test]
    async fn backups_are_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 2).await;
        for _ in 0..4 {
            store.add_card(MemoryState::default()).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(backup_count(dir.path()) <= 2);
    }

    #[tokio::test]
    async fn backup_names_carry_utc_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 3).await;
        let before = Utc::now().naive_utc();
        store.add_card(MemoryState::default()).await.unwrap();
        let after = Utc::now().naive_utc();

        for entry in fs::read_dir(dir.path().join("backups")).unwrap() {
            let name = entry.unwrap().file_name().into_string().unwrap();
            let stamp = name.strip_prefix("recall-").and_then(|s| s.strip_suffix(".json")).unwrap();
            let t = chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d-%H%M%S%.3f").unwrap();
            assert!(t >= before - chrono::Duration::seconds(1) && t <= after, "{name}");
        }
    }

    #[test]
    fn rotation_skips_backups_it_cannot_remove() {
        let dir = tempfile::tempdir().unwrap();
        // oldest entry is a directory, so remove_file fails on it
        fs::create_dir(dir.path().join("recall-20240101-000000.000.json")).unwrap();
        for s in ["01", "02", "03"] {
            fs::write(dir.path().join(format!("recall-20240102-0000{s}.000.json")), b"{}").unwrap();
        }

        rotate_backups(dir.path(), 1).unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "recall-20240101-000000.000.json".to_string(),
                "recall-20240102-000003.000.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_reviews_of_one_card_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open(dir.path(), 3).await);
        let card = store.add_card(MemoryState::default()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = store.clone();
            let id = card.id;
            handles.push(tokio::spawn(async move {
                s.record_review(id, Grade::new(5).unwrap(), Utc::now()).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let c = store.get_card(card.id).await.unwrap();
        assert_eq!(c.state.repetition, 4);
        assert_eq!(store.list_reviews(Some(card.id)).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn newer_file_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (file, _) = paths::store_files(dir.path());
        let img = serde_json::json!({
            "version": FILE_VERSION + 1,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "cards": [],
            "reviews": []
        });
        fs::write(&file, img.to_string()).unwrap();

        let err = JsonStore::open_in(dir.path(), 3).await.err().unwrap();
        assert!(matches!(err, StoreError::Version(v) if v == FILE_VERSION + 1));
    }
}
