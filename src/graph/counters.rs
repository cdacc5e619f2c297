use super::DependencyType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent reachability computations sharing one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CounterSet {
    /// Full shrinking of the program
    Shrink,
    /// Classes that must be in the main dex file
    LegacyMultidex,
}

impl CounterSet {
    pub const ALL: [CounterSet; 2] = [CounterSet::Shrink, CounterSet::LegacyMultidex];

    fn slot(self) -> usize {
        match self {
            CounterSet::Shrink => 0,
            CounterSet::LegacyMultidex => 1,
        }
    }
}

impl fmt::Display for CounterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterSet::Shrink => write!(f, "shrink"),
            CounterSet::LegacyMultidex => write!(f, "legacy-multidex"),
        }
    }
}

/// Liveness counters of one node in one counter set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub required: u32,
    pub if_class_kept: u32,
    pub class_is_kept: u32,
}

impl Counter {
    pub fn is_reachable(&self) -> bool {
        self.required > 0 || (self.if_class_kept > 0 && self.class_is_kept > 0)
    }

    fn slot(&mut self, kind: DependencyType) -> &mut u32 {
        match kind {
            DependencyType::IfClassKept => &mut self.if_class_kept,
            DependencyType::ClassIsKept => &mut self.class_is_kept,
            _ => &mut self.required,
        }
    }

    pub fn increment(&mut self, kind: DependencyType) {
        let slot = self.slot(kind);
        *slot = slot.saturating_add(1);
    }

    /// Returns false if the counter was already zero
    pub fn decrement(&mut self, kind: DependencyType) -> bool {
        let slot = self.slot(kind);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }
}

/// Lock-guarded counters for every counter set of one node
#[derive(Debug, Default)]
pub struct NodeCounters {
    slots: [Mutex<Counter>; 2],
}

impl NodeCounters {
    pub fn get(&self, set: CounterSet) -> Counter {
        *self.slots[set.slot()].lock()
    }

    pub fn set(&self, set: CounterSet, counter: Counter) {
        *self.slots[set.slot()].lock() = counter;
    }

    pub fn reset(&self, set: CounterSet) {
        self.set(set, Counter::default());
    }

    /// Bump the counter for `kind`; true if reachability flipped
    pub fn increment_and_check(&self, set: CounterSet, kind: DependencyType) -> bool {
        let mut counter = self.slots[set.slot()].lock();
        let before = counter.is_reachable();
        counter.increment(kind);
        before != counter.is_reachable()
    }

    /// Lower the counter for `kind`; the flag is the reachability flip and
    /// the second value reports an underflow
    pub fn decrement_and_check(&self, set: CounterSet, kind: DependencyType) -> (bool, bool) {
        let mut counter = self.slots[set.slot()].lock();
        let before = counter.is_reachable();
        let ok = counter.decrement(kind);
        (before != counter.is_reachable(), !ok)
    }
}
