use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::local::storage_key;

pub fn queue_key(group_id: &str, project_id: &str) -> String {
    storage_key("practice-queue", &[group_id, project_id])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Playing,
    Done,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeQueueItem {
    pub id: String,
    pub song_title: String,
    pub artist: String,
    pub duration: String,
    pub repeat_count: u32,
    pub status: QueueItemStatus,
    pub order: usize,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeQueue {
    pub id: String,
    pub name: String,
    pub items: Vec<PracticeQueueItem>,
    pub current_index: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total_queues: usize,
    pub total_songs: usize,
    pub completed_songs: usize,
}

impl PracticeQueue {
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        PracticeQueue {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            items: Vec::new(),
            current_index: 0,
            created_at: now,
        }
    }

    pub fn add_item(
        &mut self,
        song_title: &str,
        artist: &str,
        duration: &str,
        repeat_count: u32,
        note: &str,
    ) {
        self.items.push(PracticeQueueItem {
            id: Uuid::new_v4().to_string(),
            song_title: song_title.to_string(),
            artist: artist.to_string(),
            duration: duration.to_string(),
            repeat_count: repeat_count.max(1),
            status: QueueItemStatus::Pending,
            order: self.items.len(),
            note: note.trim().to_string(),
        });
    }

    pub fn current(&self) -> Option<&PracticeQueueItem> {
        self.items.get(self.current_index)
    }

    fn renumber(&mut self) {
        for (order, item) in self.items.iter_mut().enumerate() {
            item.order = order;
        }
    }

    /// Marks the current song and advances to the next one, if any.
    fn advance(&mut self, finished: QueueItemStatus) {
        let Some(current) = self.items.get_mut(self.current_index) else {
            return;
        };
        current.status = finished;
        if let Some(next) = self.items.get_mut(self.current_index + 1) {
            next.status = QueueItemStatus::Playing;
            self.current_index += 1;
        }
    }
}

/// `None` when the item does not exist.
pub fn remove_item(queue: &PracticeQueue, item_id: &str) -> Option<PracticeQueue> {
    let index = queue.items.iter().position(|item| item.id == item_id)?;
    let mut updated = queue.clone();
    updated.items.remove(index);
    updated.renumber();

    if index < updated.current_index {
        updated.current_index -= 1;
    }
    if updated.current_index >= updated.items.len() {
        updated.current_index = updated.items.len().saturating_sub(1);
    }
    Some(updated)
}

/// Swaps an item with its neighbour. `None` if the move would leave the
/// queue or the index is out of range.
pub fn reorder_item(
    queue: &PracticeQueue,
    item_index: usize,
    direction: Direction,
) -> Option<PracticeQueue> {
    if item_index >= queue.items.len() {
        return None;
    }
    let target = match direction {
        Direction::Up => item_index.checked_sub(1)?,
        Direction::Down => {
            let next = item_index + 1;
            if next >= queue.items.len() {
                return None;
            }
            next
        }
    };

    let mut updated = queue.clone();
    updated.items.swap(item_index, target);
    updated.renumber();
    if updated.current_index == item_index {
        updated.current_index = target;
    } else if updated.current_index == target {
        updated.current_index = item_index;
    }
    Some(updated)
}

pub fn apply_next(queue: &PracticeQueue) -> PracticeQueue {
    let mut updated = queue.clone();
    updated.advance(QueueItemStatus::Done);
    updated
}

pub fn apply_skip(queue: &PracticeQueue) -> PracticeQueue {
    let mut updated = queue.clone();
    updated.advance(QueueItemStatus::Skipped);
    updated
}

/// Everything back to pending with the first song playing.
pub fn apply_reset(queue: &PracticeQueue) -> PracticeQueue {
    let mut updated = queue.clone();
    for (index, item) in updated.items.iter_mut().enumerate() {
        item.status = if index == 0 {
            QueueItemStatus::Playing
        } else {
            QueueItemStatus::Pending
        };
    }
    updated.current_index = 0;
    updated
}

pub fn calc_stats(queues: &[PracticeQueue]) -> QueueStats {
    QueueStats {
        total_queues: queues.len(),
        total_songs: queues.iter().map(|q| q.items.len()).sum(),
        completed_songs: queues
            .iter()
            .flat_map(|q| q.items.iter())
            .filter(|item| item.status == QueueItemStatus::Done)
            .count(),
    }
}
