//! Epic and wave structure: ordered checklists with a hard completion gate.
//!
//! Wave order is structural, not temporal: wave N+1 work may not begin until
//! every item of wave N is terminal. The gate is evaluated against live
//! store state, never cached, because the engine itself is memory-less.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::item::{ItemId, WorkItem};

/// An ordered checklist of work items sharing a wave number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    /// Wave number, matching the `wave:<n>` label on member items.
    pub number: u32,
    /// Member items in checklist order.
    pub items: Vec<ItemId>,
}

/// A parent item grouping ordered waves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epic {
    /// The hub item. Decisions and advisory locks live on its log.
    pub hub: ItemId,
    /// Waves in gating order (ascending wave number).
    pub waves: Vec<Wave>,
}

impl Epic {
    /// Rebuild the epic's wave structure from its members' labels.
    ///
    /// Items without a wave label are hub-adjacent notes, not checklist
    /// members; they are left out. Waves come out in ascending number,
    /// members in store listing order.
    #[must_use]
    pub fn assemble(hub: ItemId, members: &[WorkItem]) -> Self {
        let mut by_wave: BTreeMap<u32, Vec<ItemId>> = BTreeMap::new();
        for member in members {
            if let Some(number) = member.wave() {
                by_wave.entry(number).or_default().push(member.id.clone());
            }
        }
        Self {
            hub,
            waves: by_wave
                .into_iter()
                .map(|(number, items)| Wave { number, items })
                .collect(),
        }
    }

    /// The wave containing `item`, if any.
    #[must_use]
    pub fn wave_of(&self, item: &ItemId) -> Option<&Wave> {
        self.waves.iter().find(|wave| wave.items.contains(item))
    }

    /// Sibling items in the same wave as `item`, excluding `item` itself.
    #[must_use]
    pub fn wave_siblings(&self, item: &ItemId) -> Vec<ItemId> {
        self.wave_of(item).map_or_else(Vec::new, |wave| {
            wave.items
                .iter()
                .filter(|id| *id != item)
                .cloned()
                .collect()
        })
    }

    /// Members of every wave strictly before `number`, in checklist order.
    #[must_use]
    pub fn items_before_wave(&self, number: u32) -> Vec<ItemId> {
        self.waves
            .iter()
            .filter(|wave| wave.number < number)
            .flat_map(|wave| wave.items.iter().cloned())
            .collect()
    }
}

/// Result of evaluating the wave gate for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveGate {
    /// All prior waves are terminal (or the item is in the first wave).
    Open,
    /// Prior-wave items still pending, in checklist order.
    Blocked {
        /// The non-terminal items holding the gate shut.
        pending: Vec<ItemId>,
    },
}

impl WaveGate {
    /// Evaluate the gate given the live state of every prior-wave item.
    ///
    /// `prior_items` must cover every member of waves before the item's own;
    /// the caller fetches them because only the store knows their state.
    #[must_use]
    pub fn evaluate(prior_items: &[WorkItem]) -> Self {
        let pending: Vec<ItemId> = prior_items
            .iter()
            .filter(|item| !item.is_terminal())
            .map(|item| item.id.clone())
            .collect();
        if pending.is_empty() {
            Self::Open
        } else {
            Self::Blocked { pending }
        }
    }
}
