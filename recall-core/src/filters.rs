use crate::{CardSchedule, DueStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueParams {
    /// 1-based.
    pub page: usize,
    pub limit: usize,
    pub order: SortOrder,
    pub include_new: bool,
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            order: SortOrder::Asc,
            include_new: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

pub fn filter_by_due(cards: &[CardSchedule], now: DateTime<Utc>, want: DueStatus) -> Vec<CardSchedule> {
    cards
        .iter()
        .filter(|c| c.due_status(now) == want)
        .cloned()
        .collect()
}

pub fn filter_not_suspended(cards: &[CardSchedule]) -> Vec<CardSchedule> {
    cards.iter().filter(|c| !c.suspended).cloned().collect()
}

fn is_queued(card: &CardSchedule, now: DateTime<Utc>, include_new: bool) -> bool {
    if card.suspended {
        return false;
    }
    match card.due_status(now) {
        DueStatus::New => include_new,
        DueStatus::DueToday | DueStatus::Overdue => true,
        DueStatus::Future => false,
    }
}

/// Cards eligible for review at `now`, sorted by due time and paginated.
///
/// New cards have no due time and sort by creation, ahead of everything
/// else in ascending order.
pub fn due_queue(cards: &[CardSchedule], now: DateTime<Utc>, params: &QueueParams) -> Page<CardSchedule> {
    let mut pool: Vec<CardSchedule> = cards
        .iter()
        .filter(|c| is_queued(c, now, params.include_new))
        .cloned()
        .collect();

    pool.sort_by_key(|c| (c.next_review_at, c.created_at));
    if params.order == SortOrder::Desc {
        pool.reverse();
    }

    let page = params.page.max(1);
    let limit = params.limit.max(1);
    let total = pool.len();
    let items = pool
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Page {
        items,
        page,
        limit,
        total,
    }
}
