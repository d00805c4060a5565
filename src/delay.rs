//! # Delay Lists
//!
//! Sleeping tasks wait in one of two lists sorted by absolute wake tick.
//! Wake ticks that lie past the next tick-counter wraparound go into the
//! overflow list; when the counter wraps to zero the two lists trade
//! places, so the active list only ever holds wake ticks that are
//! comparable with the current tick count.
//!
//! ```text
//!   tick_count: ... 0xFFFF_FFFE ──► 0xFFFF_FFFF ──► 0 (wrap) ──► 1 ...
//!
//!   before wrap:  active   = [wake ≥ now]       overflow = [wake < now]
//!   after wrap:   active   = old overflow       overflow = old active (empty)
//! ```
//!
//! `next_unblock` caches the head of the active list so the tick handler
//! only walks the list when something is actually due.

use core::marker::PhantomData;

use crate::config::{TickType, MAX_DELAY, MAX_PRIORITIES};
use crate::error::{kernel_assert, InvariantViolation};
use crate::list::{ListArena, ListId, NodeId};
use crate::port::Port;
use crate::task::DelayList;

const FIRST_LIST: ListId = ListId(MAX_PRIORITIES);
const SECOND_LIST: ListId = ListId(MAX_PRIORITIES + 1);

pub(crate) struct DelayManager<P> {
    tick_count: TickType,
    active: ListId,
    overflow: ListId,
    /// Number of times the tick counter has wrapped.
    overflow_count: u32,
    /// Earliest wake tick in the active list, `MAX_DELAY` if none.
    next_unblock: TickType,
    _port: PhantomData<P>,
}

impl<P: Port> DelayManager<P> {
    pub(crate) const fn new(initial_tick: TickType) -> Self {
        Self {
            tick_count: initial_tick,
            active: FIRST_LIST,
            overflow: SECOND_LIST,
            overflow_count: 0,
            next_unblock: MAX_DELAY,
            _port: PhantomData,
        }
    }

    pub(crate) fn init<A: ListArena>(&mut self, arena: &mut A) {
        arena.init_list(FIRST_LIST);
        arena.init_list(SECOND_LIST);
        self.active = FIRST_LIST;
        self.overflow = SECOND_LIST;
    }

    /// Restart time at `tick` with nothing due.
    pub(crate) fn reset(&mut self, tick: TickType) {
        self.tick_count = tick;
        self.next_unblock = MAX_DELAY;
    }

    pub(crate) fn tick_count(&self) -> TickType {
        self.tick_count
    }

    pub(crate) fn next_unblock(&self) -> TickType {
        self.next_unblock
    }

    pub(crate) fn overflow_count(&self) -> u32 {
        self.overflow_count
    }

    /// Which delay list `list` currently is, if any.
    pub(crate) fn classify(&self, list: ListId) -> Option<DelayList> {
        if list == self.active {
            Some(DelayList::Active)
        } else if list == self.overflow {
            Some(DelayList::Overflow)
        } else {
            None
        }
    }

    /// Queue a detached `node` to wake `ticks` ticks from now.
    pub(crate) fn insert<A: ListArena>(
        &mut self,
        arena: &mut A,
        node: NodeId,
        ticks: TickType,
    ) -> DelayList {
        let now = self.tick_count;
        let wake = now.wrapping_add(ticks);
        arena.node_mut(node).set_key(wake);

        if wake < now {
            arena.insert_sorted(self.overflow, node);
            DelayList::Overflow
        } else {
            arena.insert_sorted(self.active, node);
            if wake < self.next_unblock {
                self.next_unblock = wake;
            }
            DelayList::Active
        }
    }

    /// Advance the tick counter by one, swapping the lists on wraparound.
    /// Returns `true` if the counter wrapped.
    pub(crate) fn increment<A: ListArena>(&mut self, arena: &mut A) -> bool {
        self.tick_count = self.tick_count.wrapping_add(1);
        if self.tick_count != 0 {
            return false;
        }

        kernel_assert!(
            P,
            arena.is_empty(self.active),
            InvariantViolation::ActiveDelayListNotEmptyOnWrap
        );
        core::mem::swap(&mut self.active, &mut self.overflow);
        self.overflow_count = self.overflow_count.wrapping_add(1);
        self.reset_next_unblock(arena);
        log::debug!(
            "tick counter wrapped ({} times), {} task(s) now due this epoch",
            self.overflow_count,
            arena.length(self.active)
        );
        true
    }

    /// Unlink and return the head of the active list if its wake tick has
    /// been reached. Call repeatedly until it returns `None`.
    pub(crate) fn pop_expired<A: ListArena>(&mut self, arena: &mut A) -> Option<NodeId> {
        if self.tick_count < self.next_unblock {
            return None;
        }

        let Some(head) = arena.peek_head(self.active) else {
            self.next_unblock = MAX_DELAY;
            return None;
        };

        let wake = arena.node(head).key();
        if wake > self.tick_count {
            // Sorted: nothing further down is due either.
            self.next_unblock = wake;
            return None;
        }

        arena.remove(head);
        Some(head)
    }

    fn reset_next_unblock<A: ListArena>(&mut self, arena: &A) {
        self.next_unblock = match arena.peek_head(self.active) {
            Some(head) => arena.node(head).key(),
            None => MAX_DELAY,
        };
    }
}
