use crate::{CardSchedule, DueStatus, Grade, ReviewLog, GRADE_MAX, PASS_GRADE};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Totals {
    pub total: u32,
    /// Review count per grade, indexed by score.
    pub by_grade: [u32; GRADE_MAX as usize + 1],
}

impl Totals {
    pub fn record(&mut self, g: Grade) {
        self.total += 1;
        self.by_grade[g.as_score() as usize] += 1;
    }

    pub fn passed(&self) -> u32 {
        self.by_grade[PASS_GRADE as usize..].iter().sum()
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed() as f64 / self.total as f64
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatsSummary {
    pub totals: Totals,
    pub per_day: BTreeMap<NaiveDate, Totals>,
}

pub fn summarize(reviews: &[ReviewLog]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    for r in reviews {
        summary.totals.record(r.grade);
        let d = r.reviewed_at.date_naive();
        summary.per_day.entry(d).or_default().record(r.grade);
    }
    summary
}

pub fn daily_streak(reviews: &[ReviewLog], today: NaiveDate) -> u32 {
    let per_day = summarize(reviews).per_day;
    let mut streak = 0u32;
    let mut day = today;
    while per_day.get(&day).map(|t| t.total > 0).unwrap_or(false) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

/// Dashboard numbers.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyStats {
    pub total_cards: usize,
    pub pending_review: usize,
    pub studied_today: u32,
    pub accuracy_percent: u32,
}

pub fn study_stats(cards: &[CardSchedule], reviews: &[ReviewLog], now: DateTime<Utc>) -> StudyStats {
    let pending_review = cards
        .iter()
        .filter(|c| !c.suspended)
        .filter(|c| matches!(c.due_status(now), DueStatus::DueToday | DueStatus::Overdue))
        .count();

    let summary = summarize(reviews);
    let studied_today = summary
        .per_day
        .get(&now.date_naive())
        .map(|t| t.total)
        .unwrap_or(0);

    StudyStats {
        total_cards: cards.len(),
        pending_review,
        studied_today,
        accuracy_percent: (summary.totals.accuracy() * 100.0).round() as u32,
    }
}
