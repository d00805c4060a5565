//! # Task Control Block
//!
//! Defines the per-task record and the arena that holds every task's
//! list node alongside the kernel's lists.
//!
//! A task is always in exactly one list, which also encodes its state:
//!
//! ```text
//!   ┌──────────┐   delay_current_task()   ┌───────────────────────────┐
//!   │  Ready   │ ───────────────────────► │ Delayed (active/overflow) │
//!   └──────────┘                          └───────────────────────────┘
//!        ▲            wake tick reached                │
//!        └─────────────────────────────────────────────┘
//! ```
//!
//! There is no blocked, suspended or terminated state; tasks run forever.

use core::ptr;

use crate::config::{TickType, MAX_PRIORITIES, MAX_TASKS, MAX_TASK_NAME_LEN};
use crate::list::{ListArena, ListId, ListNode, NodeId, OrderedList};

/// Task priority. `0` is the idle level; higher values are more urgent.
pub type Priority = usize;

/// One machine word of task stack.
pub type StackWord = usize;

/// Task entry point. Tasks are expected never to return; a returning
/// task lands in the port's exit trap.
pub type TaskEntry = extern "C" fn(*mut ());

/// Handle of a created task: its slot in the scheduler's task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) u16);

impl TaskHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The list node owned by this task.
    pub(crate) fn node(self) -> NodeId {
        NodeId(self.index())
    }
}

/// Which delay list a sleeping task is queued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayList {
    /// Wake tick lies before the next tick-counter wraparound.
    Active,
    /// Wake tick lies after the next wraparound.
    Overflow,
}

/// Scheduling state of a task, derived from the list it is queued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Delayed(DelayList),
}

/// Task Control Block. Supplied by the application as a static buffer
/// and filled in by [`Scheduler::create_task`](crate::scheduler::Scheduler::create_task).
///
/// `repr(C)` with `stack_pointer` at offset 0, so a debugger can find the
/// saved context of any task.
#[repr(C)]
pub struct TaskControlBlock {
    /// Saved stack pointer, written on every switch away from the task.
    pub stack_pointer: *mut StackWord,
    /// This task's node in the scheduler's list arena.
    state_node: NodeId,
    /// Lowest address of the task's stack buffer.
    stack_base: *mut StackWord,
    /// Stack buffer size in words.
    stack_depth: usize,
    name: [u8; MAX_TASK_NAME_LEN],
    priority: Priority,
    /// Length of the most recent delay request. Informational only; the
    /// wake tick lives in the node key.
    ticks_to_delay: TickType,
}

// Safety: the raw pointers refer into the task's own static stack. TCBs
// are only touched inside critical sections on a single core.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unused TCB, for placing in a `static`.
    pub const fn new() -> Self {
        Self {
            stack_pointer: ptr::null_mut(),
            state_node: NodeId(0),
            stack_base: ptr::null_mut(),
            stack_depth: 0,
            name: [0; MAX_TASK_NAME_LEN],
            priority: 0,
            ticks_to_delay: 0,
        }
    }

    /// Fill in everything except the saved stack pointer.
    pub(crate) fn init(
        &mut self,
        handle: TaskHandle,
        name: &str,
        priority: Priority,
        stack: &mut [StackWord],
    ) {
        self.state_node = handle.node();
        self.stack_base = stack.as_mut_ptr();
        self.stack_depth = stack.len();
        self.name = copy_name(name);
        self.priority = priority;
        self.ticks_to_delay = 0;
    }

    /// The task name up to its NUL terminator.
    pub fn name_str(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_TASK_NAME_LEN);

        match core::str::from_utf8(&self.name[..len]) {
            Ok(name) => name,
            // Truncation may have split a multi-byte character
            Err(e) => core::str::from_utf8(&self.name[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn stack_base(&self) -> *mut StackWord {
        self.stack_base
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    pub fn ticks_to_delay(&self) -> TickType {
        self.ticks_to_delay
    }

    pub(crate) fn set_ticks_to_delay(&mut self, ticks: TickType) {
        self.ticks_to_delay = ticks;
    }

    pub(crate) fn state_node(&self) -> NodeId {
        self.state_node
    }
}

impl Default for TaskControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `name` into a fixed buffer, truncated so the last byte is always
/// a NUL terminator. An embedded NUL ends the name early.
fn copy_name(name: &str) -> [u8; MAX_TASK_NAME_LEN] {
    let mut buf = [0u8; MAX_TASK_NAME_LEN];
    for (dst, &src) in buf[..MAX_TASK_NAME_LEN - 1].iter_mut().zip(name.as_bytes()) {
        if src == 0 {
            break;
        }
        *dst = src;
    }
    buf
}

/// Top of a stack buffer as handed to the port: the last word of the
/// buffer, rounded down to an 8-byte boundary.
pub(crate) fn stack_top(stack: &mut [StackWord]) -> *mut StackWord {
    let last = stack.as_mut_ptr().wrapping_add(stack.len().saturating_sub(1));
    ((last as usize) & !0x7) as *mut StackWord
}

/// Number of lists in the arena: one per priority plus two delay lists.
pub(crate) const LIST_COUNT: usize = MAX_PRIORITIES + 2;

/// The list arena of the scheduler: one node per task slot and every
/// list header. Node `i` belongs to the task in slot `i`.
pub(crate) struct TaskLists {
    nodes: [ListNode<TaskHandle>; MAX_TASKS],
    lists: [OrderedList; LIST_COUNT],
}

impl TaskLists {
    pub(crate) const fn new() -> Self {
        let mut lists = [OrderedList::new(ListId(0)); LIST_COUNT];
        let mut i = 0;
        while i < LIST_COUNT {
            lists[i] = OrderedList::new(ListId(i));
            i += 1;
        }
        Self {
            nodes: [ListNode::new(); MAX_TASKS],
            lists,
        }
    }
}

impl ListArena for TaskLists {
    type Owner = TaskHandle;

    fn node(&self, id: NodeId) -> &ListNode<TaskHandle> {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut ListNode<TaskHandle> {
        &mut self.nodes[id.0]
    }

    fn list(&self, id: ListId) -> &OrderedList {
        &self.lists[id.0]
    }

    fn list_mut(&mut self, id: ListId) -> &mut OrderedList {
        &mut self.lists[id.0]
    }
}
