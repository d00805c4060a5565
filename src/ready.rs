//! # Ready Queues
//!
//! One [`OrderedList`](crate::list::OrderedList) per priority level plus an
//! occupancy bitmap with bit `p` set while priority `p` has a ready task.
//! Selection finds the highest set bit (a single CLZ on ports that have
//! one) and rotates that level's cursor, which gives round robin among
//! equal-priority tasks.

use core::marker::PhantomData;

use crate::config::MAX_PRIORITIES;
use crate::list::{ListArena, ListId, NodeId};
use crate::port::Port;
use crate::task::{Priority, TaskHandle};

/// Per-priority ready lists. The lists themselves live in the arena at
/// `ListId(0)..ListId(MAX_PRIORITIES)`.
pub(crate) struct ReadyQueueSet<P> {
    /// Bit `p` is set iff `ready_list(p)` is non-empty.
    occupancy: u32,
    _port: PhantomData<P>,
}

impl<P: Port> ReadyQueueSet<P> {
    pub(crate) const fn new() -> Self {
        Self {
            occupancy: 0,
            _port: PhantomData,
        }
    }

    pub(crate) const fn list(priority: Priority) -> ListId {
        ListId(priority)
    }

    pub(crate) fn init<A: ListArena>(&mut self, arena: &mut A) {
        for priority in 0..MAX_PRIORITIES {
            arena.init_list(Self::list(priority));
        }
        self.occupancy = 0;
    }

    /// Append `node` to the ready list of `priority`.
    pub(crate) fn insert<A: ListArena>(&mut self, arena: &mut A, priority: Priority, node: NodeId) {
        arena.insert_end(Self::list(priority), node);
        self.occupancy |= 1 << priority;
    }

    /// Clear the occupancy bit of `priority` once its list has drained.
    /// `remaining` is the length returned by the list removal.
    pub(crate) fn note_removed(&mut self, priority: Priority, remaining: usize) {
        if remaining == 0 {
            self.occupancy &= !(1 << priority);
        }
    }

    /// Highest priority with a ready task.
    pub(crate) fn top_priority(&self) -> Option<Priority> {
        P::highest_set_bit(self.occupancy)
    }

    /// Rotate the highest occupied ready list and return the task the
    /// cursor lands on.
    pub(crate) fn select<A: ListArena<Owner = TaskHandle>>(
        &self,
        arena: &mut A,
    ) -> Option<TaskHandle> {
        let priority = self.top_priority()?;
        let (owner, _) = arena.advance_cursor(Self::list(priority));
        owner
    }

    pub(crate) fn occupancy(&self) -> u32 {
        self.occupancy
    }
}
