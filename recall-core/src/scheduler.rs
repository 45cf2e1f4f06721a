use crate::{CardSchedule, Grade, MemoryState, ReviewLog, ScheduleResult, SrsError, EF_MIN, GRADE_MAX};
use chrono::{DateTime, Days, Utc};

#[derive(Clone, Debug)]
pub struct ReviewOutcome {
    pub updated_card: CardSchedule,
    pub review: ReviewLog,
}

/// Easiness is stored with two decimals so replayed reviews stay reproducible.
fn round_ef(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Clamped but unrounded easiness; interval growth uses this exact value.
fn next_easiness(prev: f64, grade: Grade) -> f64 {
    let miss = (GRADE_MAX - grade.as_score()) as f64;
    let ef = prev + 0.1 - miss * (0.08 + miss * 0.02);
    ef.max(EF_MIN)
}

/// SM-2 transition for an already validated grade.
///
/// Lapses reset the streak but still move easiness, same as successes.
pub fn next_state(previous: MemoryState, grade: Grade) -> MemoryState {
    let ef = next_easiness(previous.easiness, grade);
    let easiness = round_ef(ef);

    if grade.is_lapse() {
        return MemoryState::new(easiness, 0, 1);
    }

    let repetition = previous.repetition.saturating_add(1);
    let interval_days = match repetition {
        1 => 1,
        2 => 6,
        _ => {
            let grown = (previous.interval_days as f64 * ef).floor();
            grown.max(1.0) as u32
        }
    };

    MemoryState::new(easiness, repetition, interval_days)
}

/// Computes the state that follows `previous` after a review graded `grade`.
///
/// Fails with [`SrsError::InvalidGrade`] when `grade` is outside `0..=5`.
pub fn compute_next_state(previous: MemoryState, grade: i32) -> Result<MemoryState, SrsError> {
    let grade = Grade::new(grade)?;
    Ok(next_state(previous, grade))
}

/// Advances `reference` (now when `None`) by whole UTC calendar days.
///
/// Fractional day counts are truncated. Negative or non-finite counts, and
/// counts that run past the representable date range, fail with
/// [`SrsError::InvalidInterval`].
pub fn compute_due_date(
    interval_days: f64,
    reference: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, SrsError> {
    if !interval_days.is_finite() || interval_days < 0.0 {
        return Err(SrsError::InvalidInterval(interval_days));
    }
    let reference = reference.unwrap_or_else(Utc::now);
    reference
        .checked_add_days(Days::new(interval_days.trunc() as u64))
        .ok_or(SrsError::InvalidInterval(interval_days))
}

pub fn schedule(
    previous: MemoryState,
    grade: i32,
    reference: Option<DateTime<Utc>>,
) -> Result<ScheduleResult, SrsError> {
    let state = compute_next_state(previous, grade)?;
    let next_review_at = compute_due_date(state.interval_days as f64, reference)?;
    Ok(ScheduleResult {
        state,
        next_review_at,
    })
}

pub fn apply_review(
    mut card: CardSchedule,
    grade: Grade,
    now: DateTime<Utc>,
) -> Result<ReviewOutcome, SrsError> {
    let state = next_state(card.state, grade);
    let due = compute_due_date(state.interval_days as f64, Some(now))?;

    card.state = state;
    card.last_review_at = Some(now);
    card.next_review_at = Some(due);

    let review = ReviewLog::new(card.id, grade, now, state, due);

    Ok(ReviewOutcome {
        updated_card: card,
        review,
    })
}
