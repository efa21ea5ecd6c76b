//! Single-queue cooperative task scheduler with a virtual clock.
//!
//! Tasks run in due-time order, ties in scheduling order. Debounced tasks
//! occupy one slot per [`TriggerClass`]: scheduling into an occupied slot
//! discards the pending task and starts a new quiescence window, so a burst
//! of triggers yields exactly one execution.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerClass {
    Mutation,
    Scroll,
    Focus,
    PanelScroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Pending<T> {
    task: T,
    class: Option<TriggerClass>,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    now_ms: u64,
    next_seq: u64,
    queue: BTreeMap<(u64, u64), Pending<T>>,
    due_by_id: HashMap<TaskId, u64>,
    slots: HashMap<TriggerClass, TaskId>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            queue: BTreeMap::new(),
            due_by_id: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule(&mut self, delay_ms: u64, task: T) -> TaskId {
        self.insert(delay_ms, task, None)
    }

    /// Schedules `task` in the slot for `class`, replacing whatever was
    /// pending there.
    pub fn debounce(&mut self, class: TriggerClass, delay_ms: u64, task: T) -> TaskId {
        if let Some(previous) = self.slots.remove(&class) {
            self.cancel(previous);
        }
        let id = self.insert(delay_ms, task, Some(class));
        self.slots.insert(class, id);
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let Some(due) = self.due_by_id.remove(&id) else {
            return false;
        };
        if let Some(pending) = self.queue.remove(&(due, id.0)) {
            if let Some(class) = pending.class {
                if self.slots.get(&class) == Some(&id) {
                    self.slots.remove(&class);
                }
            }
        }
        true
    }

    pub fn cancel_class(&mut self, class: TriggerClass) -> bool {
        match self.slots.remove(&class) {
            Some(id) => self.cancel(id),
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.queue.len();
        self.queue.clear();
        self.due_by_id.clear();
        self.slots.clear();
        cancelled
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.due_by_id.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Pops the earliest task due at or before `until_ms`, moving the clock
    /// to its due time. Tasks scheduled while running a popped task are
    /// visible to the next call.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<T> {
        let (&(due, seq), _) = self.queue.iter().next()?;
        if due > until_ms {
            return None;
        }
        let pending = self.queue.remove(&(due, seq))?;
        let id = TaskId(seq);
        self.due_by_id.remove(&id);
        if let Some(class) = pending.class {
            if self.slots.get(&class) == Some(&id) {
                self.slots.remove(&class);
            }
        }
        self.now_ms = self.now_ms.max(due);
        Some(pending.task)
    }

    /// Moves the clock forward without running anything.
    pub fn advance_clock(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    fn insert(&mut self, delay_ms: u64, task: T, class: Option<TriggerClass>) -> TaskId {
        let due = self.now_ms.saturating_add(delay_ms);
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = TaskId(seq);
        self.queue.insert((due, seq), Pending { task, class });
        self.due_by_id.insert(id, due);
        id
    }
}
