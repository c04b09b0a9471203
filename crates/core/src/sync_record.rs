//! Board sync records and the pre-auth marker feed.
//!
//! The board item's status columns cannot express which holds are open, so
//! hold lifecycle events are also written to the item's update feed as
//! one-line markers and read back from there:
//!
//! ```text
//! PRE-AUTH COMPLETED: pi_3Nx £1,200.00
//! PRE-AUTH CAPTURED: pi_3Nx £300.00
//! PRE-AUTH RELEASED: pi_3Nx
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::{BoardItemId, HoldId, format_gbp, parse_amount};

static COMPLETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PRE-AUTH\s+COMPLETED:\s*([A-Za-z0-9_]+)\s+£?\s*([\d,]+(?:\.\d{1,2})?)")
        .expect("completed marker pattern is valid")
});
static CAPTURED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PRE-AUTH\s+CAPTURED:\s*([A-Za-z0-9_]+)(?:\s+£?\s*([\d,]+(?:\.\d{1,2})?))?")
        .expect("captured marker pattern is valid")
});
static RELEASED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PRE-AUTH\s+RELEASED:\s*([A-Za-z0-9_]+)")
        .expect("released marker pattern is valid")
});

/// A board item mirroring one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Board item ID.
    pub item_id: BoardItemId,
    /// Item name, usually the customer.
    pub name: String,
    /// Deposit status column label.
    pub deposit_status: Option<String>,
    /// Excess status column label.
    pub excess_status: Option<String>,
}

/// One entry in a board item's update feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardUpdate {
    /// Update ID.
    pub id: String,
    /// Text body; may contain HTML.
    pub body: String,
    /// When the update was posted.
    pub created_at: Option<DateTime<Utc>>,
}

/// A hold lifecycle event as written to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PreAuthEvent {
    /// Customer completed the hold.
    Completed {
        /// Hold ID.
        hold_id: HoldId,
        /// Authorized amount.
        amount: Decimal,
    },
    /// Hold captured, fully or in part.
    Captured {
        /// Hold ID.
        hold_id: HoldId,
        /// Captured amount, when recorded.
        amount: Option<Decimal>,
    },
    /// Hold released.
    Released {
        /// Hold ID.
        hold_id: HoldId,
    },
}

impl PreAuthEvent {
    /// Hold the event refers to.
    #[must_use]
    pub fn hold_id(&self) -> &HoldId {
        match self {
            Self::Completed { hold_id, .. }
            | Self::Captured { hold_id, .. }
            | Self::Released { hold_id } => hold_id,
        }
    }

    /// Renders the marker line.
    #[must_use]
    pub fn marker(&self) -> String {
        match self {
            Self::Completed { hold_id, amount } => {
                format!("PRE-AUTH COMPLETED: {hold_id} {}", format_gbp(*amount))
            }
            Self::Captured {
                hold_id,
                amount: Some(amount),
            } => format!("PRE-AUTH CAPTURED: {hold_id} {}", format_gbp(*amount)),
            Self::Captured {
                hold_id,
                amount: None,
            } => format!("PRE-AUTH CAPTURED: {hold_id}"),
            Self::Released { hold_id } => format!("PRE-AUTH RELEASED: {hold_id}"),
        }
    }

    /// Parses every marker in an update body.
    #[must_use]
    pub fn parse_all(body: &str) -> Vec<Self> {
        let mut events: Vec<(usize, Self)> = Vec::new();

        for caps in COMPLETED.captures_iter(body) {
            let Some(amount) = caps.get(2).and_then(|m| parse_amount(m.as_str()).ok()) else {
                continue;
            };
            events.push((
                caps.get(0).map_or(0, |m| m.start()),
                Self::Completed {
                    hold_id: HoldId::new(&caps[1]),
                    amount,
                },
            ));
        }
        for caps in CAPTURED.captures_iter(body) {
            events.push((
                caps.get(0).map_or(0, |m| m.start()),
                Self::Captured {
                    hold_id: HoldId::new(&caps[1]),
                    amount: caps.get(2).and_then(|m| parse_amount(m.as_str()).ok()),
                },
            ));
        }
        for caps in RELEASED.captures_iter(body) {
            events.push((
                caps.get(0).map_or(0, |m| m.start()),
                Self::Released {
                    hold_id: HoldId::new(&caps[1]),
                },
            ));
        }

        events.sort_by_key(|(offset, _)| *offset);
        events.into_iter().map(|(_, event)| event).collect()
    }
}

/// An open hold recovered from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthMarker {
    /// Hold ID.
    pub hold_id: HoldId,
    /// Authorized amount.
    pub amount: Decimal,
    /// When the completion was recorded.
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Returns holds with a completion marker and no capture or release marker.
///
/// Feed order does not matter; board feeds are usually newest first.
#[must_use]
pub fn open_holds(updates: &[BoardUpdate]) -> Vec<PreAuthMarker> {
    let mut closed: HashSet<HoldId> = HashSet::new();
    let mut completed: Vec<PreAuthMarker> = Vec::new();

    for update in updates {
        for event in PreAuthEvent::parse_all(&update.body) {
            match event {
                PreAuthEvent::Completed { hold_id, amount } => {
                    if !completed.iter().any(|m| m.hold_id == hold_id) {
                        completed.push(PreAuthMarker {
                            hold_id,
                            amount,
                            recorded_at: update.created_at,
                        });
                    }
                }
                PreAuthEvent::Captured { hold_id, .. } | PreAuthEvent::Released { hold_id } => {
                    closed.insert(hold_id);
                }
            }
        }
    }

    completed.retain(|m| !closed.contains(&m.hold_id));
    completed
}
