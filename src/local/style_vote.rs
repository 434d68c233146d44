use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::local::storage_key;

pub fn vote_key(group_id: &str) -> String {
    storage_key("style-vote", &[group_id])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleVoteStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleVoteCandidate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub proposed_by: String,
    pub votes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleVoteSession {
    pub id: String,
    pub topic: String,
    pub status: StyleVoteStatus,
    pub candidates: Vec<StyleVoteCandidate>,
    pub max_votes_per_person: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl StyleVoteSession {
    pub fn total_votes(&self) -> usize {
        self.candidates.iter().map(|c| c.votes.len()).sum()
    }

    pub fn votes_by(&self, voter: &str) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.votes.iter().any(|v| v == voter))
            .count()
    }

    pub fn has_voted(&self, candidate_id: &str, voter: &str) -> bool {
        self.candidates
            .iter()
            .find(|c| c.id == candidate_id)
            .map(|c| c.votes.iter().any(|v| v == voter))
            .unwrap_or(false)
    }

    /// Share of all votes, as a whole percentage.
    pub fn vote_rate(&self, candidate_id: &str) -> f64 {
        let total = self.total_votes();
        match self.candidates.iter().find(|c| c.id == candidate_id) {
            Some(candidate) if total > 0 => {
                (candidate.votes.len() as f64 / total as f64 * 100.0).round()
            }
            _ => 0.0,
        }
    }

    /// Most votes wins, earliest candidate on a tie. Nobody wins with no votes.
    pub fn winner(&self) -> Option<&StyleVoteCandidate> {
        let mut best: Option<&StyleVoteCandidate> = None;
        for candidate in self.candidates.iter() {
            let leads = match best {
                Some(top) => candidate.votes.len() > top.votes.len(),
                None => !candidate.votes.is_empty(),
            };
            if leads {
                best = Some(candidate);
            }
        }
        best
    }
}

/// All vote sessions for a group, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleVoteBoard {
    pub sessions: Vec<StyleVoteSession>,
}

impl StyleVoteBoard {
    pub fn active_session(&self) -> Option<&StyleVoteSession> {
        self.sessions.iter().find(|s| s.status == StyleVoteStatus::Open)
    }

    pub fn session(&self, session_id: &str) -> Option<&StyleVoteSession> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    fn session_mut(&mut self, session_id: &str) -> Option<&mut StyleVoteSession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    pub fn create_session(&mut self, topic: &str, max_votes: i64, now: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(
            0,
            StyleVoteSession {
                id: id.clone(),
                topic: topic.to_string(),
                status: StyleVoteStatus::Open,
                candidates: Vec::new(),
                max_votes_per_person: u32::try_from(max_votes.max(1)).unwrap_or(u32::MAX),
                created_at: now,
                closed_at: None,
            },
        );
        id
    }

    pub fn close_session(&mut self, session_id: &str, now: DateTime<Utc>) {
        if let Some(session) = self.session_mut(session_id) {
            session.status = StyleVoteStatus::Closed;
            session.closed_at = Some(now);
        }
    }

    pub fn reopen_session(&mut self, session_id: &str) {
        if let Some(session) = self.session_mut(session_id) {
            session.status = StyleVoteStatus::Open;
            session.closed_at = None;
        }
    }

    pub fn delete_session(&mut self, session_id: &str) {
        self.sessions.retain(|s| s.id != session_id);
    }

    pub fn add_candidate(
        &mut self,
        session_id: &str,
        title: &str,
        description: &str,
        proposed_by: &str,
    ) -> Option<String> {
        let session = self.session_mut(session_id)?;
        let id = Uuid::new_v4().to_string();
        session.candidates.push(StyleVoteCandidate {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            proposed_by: proposed_by.to_string(),
            votes: Vec::new(),
        });
        Some(id)
    }

    pub fn remove_candidate(&mut self, session_id: &str, candidate_id: &str) {
        if let Some(session) = self.session_mut(session_id) {
            session.candidates.retain(|c| c.id != candidate_id);
        }
    }

    /// Toggles `voter`'s vote. New votes are ignored on closed sessions and
    /// once the voter has used up their allowance; withdrawing always works
    /// while the session is open.
    pub fn cast_vote(&mut self, session_id: &str, candidate_id: &str, voter: &str) -> bool {
        let Some(session) = self.session_mut(session_id) else {
            return false;
        };
        if session.status == StyleVoteStatus::Closed {
            return false;
        }
        let used = session.votes_by(voter);
        let limit = session.max_votes_per_person as usize;

        let Some(candidate) = session.candidates.iter_mut().find(|c| c.id == candidate_id) else {
            return false;
        };
        if let Some(position) = candidate.votes.iter().position(|v| v == voter) {
            candidate.votes.remove(position);
            return true;
        }
        if used >= limit {
            return false;
        }
        candidate.votes.push(voter.to_string());
        true
    }
}
