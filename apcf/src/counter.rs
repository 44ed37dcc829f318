//! Host-side mirror of the controller's filter resources.
//!
//! Slot 0 accounts for conditions that are not tied to a device. Slots `1..=max_filter`
//! are bound to device addresses on demand.

use alloc::vec::Vec;

use crate::types::{Action, BdAddr, ConditionType, COUNTER_TYPES};
use crate::{debug, error, trace};

pub const INVALID_COUNTER: u8 = 0xff;

const GENERIC_SLOT: usize = 0;

#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterSlot {
    pub in_use: bool,
    pub address: Option<BdAddr>,
    pub counters: [u8; COUNTER_TYPES],
}

impl CounterSlot {
    pub fn counter(&self, condition: ConditionType) -> Option<u8> {
        condition.counter_index().map(|i| self.counters[i])
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug)]
pub struct CounterTable {
    slots: Vec<CounterSlot>,
}

impl CounterTable {
    /// An empty table (`max_filter == 0`) has no generic slot either.
    pub fn new(max_filter: u8) -> Self {
        let len = if max_filter == 0 { 0 } else { max_filter as usize + 1 };
        let mut slots = Vec::with_capacity(len);
        slots.resize(len, CounterSlot::default());
        Self { slots }
    }

    /// Number of address-bound slots.
    pub fn capacity(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    pub fn slot(&self, index: usize) -> Option<&CounterSlot> {
        self.slots.get(index)
    }

    pub fn address_slots(&self) -> impl Iterator<Item = &CounterSlot> {
        self.slots.iter().skip(1)
    }

    pub fn in_use(&self) -> usize {
        self.address_slots().filter(|s| s.in_use).count()
    }

    /// `None` always finds the generic slot.
    pub fn find(&self, target: Option<&BdAddr>) -> Option<usize> {
        let Some(address) = target else {
            return (!self.slots.is_empty()).then_some(GENERIC_SLOT);
        };
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.in_use && s.address.as_ref() == Some(address))
            .map(|(i, _)| i)
    }

    /// Marks the generic slot as used.
    pub fn claim_generic(&mut self) -> Option<usize> {
        let slot = self.slots.get_mut(GENERIC_SLOT)?;
        slot.in_use = true;
        Some(GENERIC_SLOT)
    }

    /// Binds the first free address slot. A full table is not an error, just `None`.
    pub fn allocate(&mut self, address: BdAddr) -> Option<usize> {
        if let Some(index) = self.find(Some(&address)) {
            return Some(index);
        }
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(1)
            .find(|(_, s)| !s.in_use)?;
        slot.in_use = true;
        slot.address = Some(address);
        trace!("allocated counter slot {} for {:?}", index, address);
        Some(index)
    }

    /// Releases resources.
    ///
    /// - `None` with `All` resets the generic slot and nothing else.
    /// - `Some(address)` resets that address's slot.
    /// - `None` with any other condition resets every address-bound slot.
    ///
    /// Returns whether anything was released.
    pub fn deallocate(&mut self, target: Option<&BdAddr>, condition: ConditionType) -> bool {
        match (target, condition) {
            (None, ConditionType::All) => match self.slots.get_mut(GENERIC_SLOT) {
                Some(slot) => {
                    slot.reset();
                    true
                }
                None => false,
            },
            (Some(_), _) => match self.find(target) {
                Some(index) => {
                    self.slots[index].reset();
                    true
                }
                None => false,
            },
            (None, _) => {
                let mut found = false;
                for slot in self.slots.iter_mut().skip(1).filter(|s| s.in_use) {
                    slot.reset();
                    found = true;
                }
                found
            }
        }
    }

    /// Resets the generic slot and every address-bound slot.
    pub fn release_all(&mut self) {
        self.slots.iter_mut().for_each(CounterSlot::reset);
    }

    /// Applies a completed condition update and returns the resulting counter, or
    /// [`INVALID_COUNTER`] when no counter was updated.
    ///
    /// Counters only move when the controller reports `available > 0`. Add increments and
    /// Delete/Clear decrement, saturating at zero, so a counter is the number of live
    /// conditions of its type for the slot.
    pub fn update(
        &mut self,
        action: Action,
        condition: ConditionType,
        target: Option<&BdAddr>,
        available: u8,
    ) -> u8 {
        let requested = target;
        let target = if condition.is_always_generic() { None } else { target };

        let index = match self.find(target) {
            Some(index) => Some(index),
            None if action == Action::Add => target.and_then(|a| self.allocate(*a)),
            None => None,
        };
        let Some(index) = index else {
            error!("no matching filter counter found");
            return INVALID_COUNTER;
        };

        match (condition, action) {
            (ConditionType::All, Action::Clear) => {
                self.deallocate(target, condition);
                INVALID_COUNTER
            }
            (ConditionType::Address, Action::Delete | Action::Clear) => {
                self.deallocate(requested, condition);
                INVALID_COUNTER
            }
            (ConditionType::All, _) => INVALID_COUNTER,
            _ => {
                let Some(i) = condition.counter_index() else {
                    return INVALID_COUNTER;
                };
                let max_filter = self.capacity();
                let counter = &mut self.slots[index].counters[i];
                if available > 0 {
                    *counter = match action {
                        Action::Add => counter.saturating_add(1),
                        Action::Delete | Action::Clear => counter.saturating_sub(1),
                    };
                }
                debug!(
                    "counter = {}, maxfilt = {}, num_avbl = {}",
                    *counter, max_filter, available
                );
                *counter
            }
        }
    }

    pub fn counter(&self, target: Option<&BdAddr>, condition: ConditionType) -> Option<u8> {
        self.find(target)
            .and_then(|i| self.slots[i].counter(condition))
    }
}
