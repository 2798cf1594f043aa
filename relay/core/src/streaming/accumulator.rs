//! Item Accumulator
//!
//! Per-turn accumulation of text by item. Text lives in a keyed map;
//! insertion order is tracked in a separate list because the map's iteration
//! order means nothing.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::events::{ItemId, ItemKind};

// ============================================================================
// Final Text Policy
// ============================================================================

/// Which accumulated text becomes the turn's final answer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinalTextPolicy {
    /// Text of the most recently registered item
    #[default]
    LastInserted,
    /// Text of the most recently registered non-action item, falling back to
    /// `LastInserted` when every item is an action
    LastContent,
    /// Every item's text in insertion order, no separator
    Concatenate,
}

impl fmt::Display for FinalTextPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastInserted => write!(f, "last-inserted"),
            Self::LastContent => write!(f, "last-content"),
            Self::Concatenate => write!(f, "concatenate"),
        }
    }
}

impl FromStr for FinalTextPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "last-inserted" => Ok(Self::LastInserted),
            "last-content" => Ok(Self::LastContent),
            "concatenate" => Ok(Self::Concatenate),
            other => Err(format!(
                "Unknown final text policy '{other}' (expected last-inserted, last-content, or concatenate)"
            )),
        }
    }
}

// ============================================================================
// Accumulator
// ============================================================================

#[derive(Debug, Default)]
struct Slot {
    text: String,
    action: bool,
}

/// Text per item plus the order items were first seen
#[derive(Debug, Default)]
pub struct ItemAccumulator {
    slots: HashMap<ItemId, Slot>,
    order: Vec<ItemId>,
}

impl ItemAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item, keeping any text it already has
    ///
    /// Returns `true` if the item was not seen before.
    pub fn register(&mut self, item_id: &ItemId, kind: &ItemKind) -> bool {
        let is_new = self.ensure(item_id);
        if kind.is_action() {
            if let Some(slot) = self.slots.get_mut(item_id) {
                slot.action = true;
            }
        }
        is_new
    }

    /// Append a fragment, registering the item if needed
    pub fn append(&mut self, item_id: &ItemId, text: &str) {
        self.ensure(item_id);
        if let Some(slot) = self.slots.get_mut(item_id) {
            slot.text.push_str(text);
        }
    }

    fn ensure(&mut self, item_id: &ItemId) -> bool {
        if self.slots.contains_key(item_id) {
            return false;
        }
        self.slots.insert(item_id.clone(), Slot::default());
        self.order.push(item_id.clone());
        true
    }

    /// Accumulated text for one item
    #[must_use]
    pub fn text(&self, item_id: &ItemId) -> Option<&str> {
        self.slots.get(item_id).map(|s| s.text.as_str())
    }

    /// Items in the order they were first seen
    #[must_use]
    pub fn order(&self) -> &[ItemId] {
        &self.order
    }

    /// Whether no item has been seen
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The turn's final text under `policy`; empty if no item was seen
    #[must_use]
    pub fn final_text(&self, policy: FinalTextPolicy) -> String {
        match policy {
            FinalTextPolicy::LastInserted => self.last_text(|_| true),
            FinalTextPolicy::LastContent => {
                if self.slots.values().any(|s| !s.action) {
                    self.last_text(|slot| !slot.action)
                } else {
                    self.last_text(|_| true)
                }
            }
            FinalTextPolicy::Concatenate => self
                .order
                .iter()
                .filter_map(|id| self.text(id))
                .collect(),
        }
    }

    fn last_text(&self, accept: impl Fn(&Slot) -> bool) -> String {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.slots.get(id))
            .find(|&slot| accept(slot))
            .map(|slot| slot.text.clone())
            .unwrap_or_default()
    }
}
