//! Replay snapshots: the cached lines of one session plus its
//! acknowledgement point.

use chrono::{DateTime, Utc};
use lc_domain::Destination;
use serde::{Deserialize, Serialize};

/// Which side sent a cached line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Agent → visitor.
    Inbound,
    /// Visitor → agent.
    Outbound,
}

/// One cached chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub seq: u64,
    pub direction: Direction,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CachedMessage {
    /// Server line id carried by inbound payloads, if any.
    pub fn line_id(&self) -> Option<&str> {
        self.payload.get("line_id").and_then(|v| v.as_str())
    }
}

/// Cached state of one session.
///
/// Sequence numbers come from a single per-session counter shared by both
/// directions and are never reused, even after old lines are trimmed.
/// Inbound lines count as acknowledged when appended; outbound lines once
/// the server acknowledges them.  `last_acked_seq` is the highest `n` such
/// that every cached line up to `n` is acknowledged, so it never exceeds the
/// highest cached sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySnapshot {
    pub session_token: String,
    pub destination: Destination,
    pub messages: Vec<CachedMessage>,
    pub last_acked_seq: u64,
    /// Highest outbound sequence number the server has acknowledged.
    #[serde(default)]
    pub remote_acked_seq: u64,
    next_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReplaySnapshot {
    pub fn new(session_token: impl Into<String>, destination: Destination) -> Self {
        let now = Utc::now();
        Self {
            session_token: session_token.into(),
            destination,
            messages: Vec::new(),
            last_acked_seq: 0,
            remote_acked_seq: 0,
            next_seq: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a line and return its sequence number.
    pub fn append(&mut self, direction: Direction, payload: serde_json::Value) -> u64 {
        self.append_with(direction, |_| payload)
    }

    /// Append a line whose payload embeds its own sequence number.
    pub fn append_with<F>(&mut self, direction: Direction, payload: F) -> u64
    where
        F: FnOnce(u64) -> serde_json::Value,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        let now = Utc::now();
        self.messages.push(CachedMessage {
            seq,
            direction,
            payload: payload(seq),
            timestamp: now,
        });
        self.updated_at = now;
        self.recompute_acked();
        seq
    }

    /// Record a cumulative server acknowledgement of outbound lines.
    ///
    /// Acks beyond the highest cached line are clamped.
    pub fn acknowledge_remote(&mut self, seq: u64) {
        let seq = seq.min(self.max_seq());
        if seq > self.remote_acked_seq {
            self.remote_acked_seq = seq;
            self.updated_at = Utc::now();
            self.recompute_acked();
        }
    }

    /// Highest sequence number present in the cache (0 when empty).
    pub fn max_seq(&self) -> u64 {
        self.messages.last().map(|m| m.seq).unwrap_or(0)
    }

    /// Outbound lines the server has not acknowledged yet, oldest first.
    pub fn unacked_outbound(&self) -> impl Iterator<Item = &CachedMessage> {
        let acked = self.remote_acked_seq;
        self.messages
            .iter()
            .filter(move |m| m.direction == Direction::Outbound && m.seq > acked)
    }

    /// Whether an inbound line with this server id is already cached.
    pub fn contains_line(&self, line_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.direction == Direction::Inbound && m.line_id() == Some(line_id))
    }

    /// Drop the oldest lines beyond `max_messages`.
    ///
    /// Only acknowledged lines are dropped, so the cache can stay above
    /// `max_messages` while outbound lines wait for the server.  The newest
    /// line is always kept and the counter keeps advancing from where it was.
    pub fn trim_to(&mut self, max_messages: usize) {
        let excess = self.messages.len().saturating_sub(max_messages.max(1));
        let acked = self
            .messages
            .iter()
            .take_while(|m| m.seq <= self.last_acked_seq)
            .count();
        let drop = excess
            .min(acked)
            .min(self.messages.len().saturating_sub(1));
        self.messages.drain(..drop);
    }

    /// Whether `last_acked_seq <= max_seq()`.
    pub fn is_consistent(&self) -> bool {
        self.last_acked_seq <= self.max_seq()
            && self.messages.windows(2).all(|w| w[0].seq < w[1].seq)
    }

    fn recompute_acked(&mut self) {
        let mut acked = self.last_acked_seq;
        for msg in self.messages.iter().filter(|m| m.seq > self.last_acked_seq) {
            let settled =
                msg.direction == Direction::Inbound || msg.seq <= self.remote_acked_seq;
            if !settled {
                break;
            }
            acked = msg.seq;
        }
        self.last_acked_seq = acked;
    }
}
