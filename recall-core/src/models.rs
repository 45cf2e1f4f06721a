use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SrsError;

pub type CardId = Uuid;
pub type ReviewId = Uuid;

pub const EF_MIN: f64 = 1.3;
pub const EF_DEFAULT: f64 = 2.5;

pub const GRADE_MAX: i32 = 5;
/// Lowest grade that counts as a successful recall.
pub const PASS_GRADE: i32 = 3;

/// Recall quality on the 0 (blackout) to 5 (perfect) scale.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "i32", into = "i32")]
pub struct Grade(u8);

impl Grade {
    pub fn new(value: i32) -> Result<Self, SrsError> {
        if (0..=GRADE_MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SrsError::InvalidGrade(value))
        }
    }

    pub fn as_score(&self) -> i32 {
        self.0 as i32
    }

    pub fn is_lapse(&self) -> bool {
        self.as_score() < PASS_GRADE
    }
}

impl TryFrom<i32> for Grade {
    type Error = SrsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Grade::new(value)
    }
}

impl From<Grade> for i32 {
    fn from(g: Grade) -> Self {
        g.as_score()
    }
}

/// A card's position in the SM-2 model. Replaced wholesale on every review.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MemoryState {
    pub easiness: f64,
    pub repetition: u32,
    pub interval_days: u32,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            easiness: EF_DEFAULT,
            repetition: 0,
            interval_days: 0,
        }
    }
}

impl MemoryState {
    pub fn new(easiness: f64, repetition: u32, interval_days: u32) -> Self {
        Self {
            easiness,
            repetition,
            interval_days,
        }
    }

    /// Builds a state from possibly missing stored columns, falling back to
    /// the values of an unreviewed card.
    pub fn from_stored(
        easiness: Option<f64>,
        repetition: Option<u32>,
        interval_days: Option<u32>,
    ) -> Self {
        let d = Self::default();
        Self {
            easiness: easiness.unwrap_or(d.easiness),
            repetition: repetition.unwrap_or(d.repetition),
            interval_days: interval_days.unwrap_or(d.interval_days),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleResult {
    pub state: MemoryState,
    pub next_review_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    New,
    DueToday,
    Overdue,
    Future,
}

/// Scheduling record the caller keeps per card. Carries no card content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CardSchedule {
    pub id: CardId,
    pub state: MemoryState,
    pub next_review_at: Option<DateTime<Utc>>,
    pub last_review_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
}

impl CardSchedule {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: MemoryState::default(),
            next_review_at: None,
            last_review_at: None,
            suspended: false,
            created_at,
        }
    }

    pub fn is_new(&self) -> bool {
        self.last_review_at.is_none()
    }

    pub fn due_status(&self, now: DateTime<Utc>) -> DueStatus {
        let Some(due) = self.next_review_at else {
            return DueStatus::New;
        };
        if self.is_new() {
            DueStatus::New
        } else if due > now {
            DueStatus::Future
        } else if (now - due).num_hours() >= 24 {
            DueStatus::Overdue
        } else {
            DueStatus::DueToday
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewLog {
    pub id: ReviewId,
    pub card_id: CardId,
    pub grade: Grade,
    pub reviewed_at: DateTime<Utc>,
    pub state_after: MemoryState,
    pub next_review_at: DateTime<Utc>,
}

impl ReviewLog {
    pub fn new(
        card_id: CardId,
        grade: Grade,
        reviewed_at: DateTime<Utc>,
        state_after: MemoryState,
        next_review_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            grade,
            reviewed_at,
            state_after,
            next_review_at,
        }
    }
}
