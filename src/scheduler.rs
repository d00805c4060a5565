//! # Scheduler
//!
//! Core scheduling logic for Tickos: task creation, ready/delay list
//! transitions, selection of the next task and the tick handler.
//!
//! ## Scheduling Algorithm
//!
//! - **Priority dominance**: the next task always comes from the highest
//!   priority level that has a ready task.
//! - **Round robin**: each selection rotates that level's cursor, so all
//!   tasks of one priority take turns. A task joining a ready list is
//!   placed right behind the cursor and is therefore selected within
//!   `n` consecutive selections at that level, where `n` is the list
//!   length after it joined.
//! - **Tick**: every tick wakes the tasks whose wake tick has been
//!   reached and then always requests a context switch, which gives
//!   tick-period time slicing between equal-priority tasks.
//!
//! ## Concurrency
//!
//! A `Scheduler` is plain data. Task-context operations bracket their
//! mutations with the nestable critical section in [`CriticalNesting`];
//! interrupt-context operations ([`Scheduler::advance_tick`],
//! [`Scheduler::select_next_task`]) use the save/restore mask of
//! [`sync::from_isr`]. Independent instances don't share anything, which
//! is how the host tests isolate themselves.

use core::marker::PhantomData;

use crate::config::{TickType, IDLE_PRIORITY, INITIAL_TICK_COUNT, MAX_PRIORITIES, MAX_TASKS};
use crate::delay::DelayManager;
use crate::error::{kernel_assert, InvariantViolation, KernelError};
use crate::list::{ListArena, NodeId};
use crate::port::Port;
use crate::ready::ReadyQueueSet;
use crate::sync::{self, CriticalNesting};
use crate::task::{
    stack_top, Priority, StackWord, TaskControlBlock, TaskEntry, TaskHandle, TaskLists, TaskState,
};

/// The kernel's entire mutable state.
pub struct Scheduler<P: Port> {
    /// Node arena plus every ready and delay list.
    lists: TaskLists,
    /// Application-supplied TCBs, indexed by task handle. Slots fill up in
    /// creation order and are never released.
    tasks: [Option<&'static mut TaskControlBlock>; MAX_TASKS],
    ready: ReadyQueueSet<P>,
    delays: DelayManager<P>,
    /// The dispatched task. Before start, the one that will run first.
    current: Option<TaskHandle>,
    task_count: usize,
    initial_tick: TickType,
    critical: CriticalNesting<P>,
    running: bool,
    _port: PhantomData<P>,
}

impl<P: Port> Scheduler<P> {
    pub const fn new() -> Self {
        Self::with_initial_tick_count(INITIAL_TICK_COUNT)
    }

    /// A scheduler whose tick counter starts at `tick` instead of
    /// [`INITIAL_TICK_COUNT`]. Useful for exercising wraparound early.
    pub const fn with_initial_tick_count(tick: TickType) -> Self {
        const NO_TASK: Option<&'static mut TaskControlBlock> = None;
        Self {
            lists: TaskLists::new(),
            tasks: [NO_TASK; MAX_TASKS],
            ready: ReadyQueueSet::new(),
            delays: DelayManager::new(tick),
            current: None,
            task_count: 0,
            initial_tick: tick,
            critical: CriticalNesting::new(),
            running: false,
            _port: PhantomData,
        }
    }

    /// Create a task from statically supplied buffers and make it ready.
    ///
    /// `stack_buffer` and `tcb_buffer` model the application's static
    /// memory; passing `None` rejects the creation, and so does a stack
    /// without room for the port's initial frame
    /// ([`Port::FRAME_WORDS`] words below the aligned top).
    /// An out-of-range `priority` is clamped to `MAX_PRIORITIES - 1`.
    ///
    /// Before the scheduler starts, if no task is selected yet or the new
    /// task's priority is at least that of the selected one, the new task
    /// becomes the selected task. Once running, the current task stays the
    /// one that is actually executing; a more urgent new task requests a
    /// context switch instead.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        name: &str,
        args: *mut (),
        priority: Priority,
        stack_buffer: Option<&'static mut [StackWord]>,
        tcb_buffer: Option<&'static mut TaskControlBlock>,
    ) -> Result<TaskHandle, KernelError> {
        let stack = stack_buffer
            .filter(|stack| !stack.is_empty())
            .ok_or(KernelError::MissingStackBuffer)?;
        let tcb = tcb_buffer.ok_or(KernelError::MissingTaskBuffer)?;

        let top = stack_top(stack);
        let room = (top as usize).saturating_sub(stack.as_ptr() as usize)
            / core::mem::size_of::<StackWord>();
        if room < P::FRAME_WORDS {
            log::warn!(
                "task `{name}`: {} stack words leave no room for a {}-word frame",
                stack.len(),
                P::FRAME_WORDS
            );
            return Err(KernelError::StackTooSmall);
        }

        let priority = if priority >= MAX_PRIORITIES {
            log::warn!(
                "task `{name}`: priority {priority} out of range, clamped to {}",
                MAX_PRIORITIES - 1
            );
            MAX_PRIORITIES - 1
        } else {
            priority
        };

        self.critical.enter();

        let slot = self.task_count;
        if slot >= MAX_TASKS {
            self.critical.exit();
            return Err(KernelError::TaskTableFull);
        }
        let handle = TaskHandle(slot as u16);

        tcb.init(handle, name, priority, stack);
        // Safety: `top` points into `stack` with at least `FRAME_WORDS`
        // words of it below, all handed over for this task's exclusive use.
        tcb.stack_pointer = unsafe { P::init_stack_frame(top, entry, args) };

        let node = tcb.state_node();
        self.lists.init_node(node);
        self.lists.node_mut(node).set_owner(handle);

        self.task_count += 1;
        if self.task_count == 1 {
            self.initialise_task_lists();
        }

        // `current` must keep naming the dispatched task once running;
        // the dispatcher saves the outgoing context into it.
        let current_priority = self.current.map(|task| self.priority_of(task));
        let preempt = if self.running {
            current_priority.is_some_and(|current| current < priority)
        } else {
            if current_priority.map_or(true, |current| current <= priority) {
                self.current = Some(handle);
            }
            false
        };

        self.ready.insert(&mut self.lists, priority, node);

        log::debug!(
            "created task `{}` (slot {slot}, priority {priority}, {} stack words)",
            tcb.name_str(),
            tcb.stack_depth()
        );
        self.tasks[slot] = Some(tcb);

        self.critical.exit();

        if preempt {
            P::request_switch();
        }
        Ok(handle)
    }

    /// Create the idle task and reset the tick state, leaving the
    /// scheduler ready for the port to dispatch the selected task.
    ///
    /// The idle task runs at [`IDLE_PRIORITY`] from the given static
    /// memory and does nothing but yield.
    pub fn start_scheduler(
        &mut self,
        idle_stack: Option<&'static mut [StackWord]>,
        idle_tcb: Option<&'static mut TaskControlBlock>,
    ) -> Result<TaskHandle, KernelError> {
        let idle = self.create_task(
            idle_task::<P>,
            "IDLE",
            core::ptr::null_mut(),
            IDLE_PRIORITY,
            idle_stack,
            idle_tcb,
        )?;

        self.critical.enter();
        self.delays.reset(self.initial_tick);
        self.running = true;
        self.critical.exit();

        if let Some(first) = self.current_tcb() {
            log::debug!("scheduler started, first task `{}`", first.name_str());
        }
        Ok(idle)
    }

    /// Pick the task to run next and make it current.
    ///
    /// Scans for the highest occupied priority and rotates that ready
    /// list. Returns the new current task; the current task is kept if
    /// no task is ready at all.
    pub fn select_next_task(&mut self) -> Option<TaskHandle> {
        sync::from_isr::<P, _, _>(|| self.select_locked())
    }

    fn select_locked(&mut self) -> Option<TaskHandle> {
        match self.ready.select(&mut self.lists) {
            Some(next) => {
                if self.current != Some(next) {
                    log::trace!("switch to task slot {}", next.index());
                }
                self.current = Some(next);
            }
            None => kernel_assert!(P, false, InvariantViolation::NoReadyTask),
        }
        self.current
    }

    /// Dispatcher entry: store the outgoing task's saved stack pointer,
    /// select the next task and return its saved stack pointer.
    pub fn switch_context(&mut self, saved_sp: *mut StackWord) -> *mut StackWord {
        sync::from_isr::<P, _, _>(|| {
            if let Some(tcb) = self.current_tcb_mut() {
                tcb.stack_pointer = saved_sp;
            }
            self.select_locked();
            self.current_tcb().map_or(saved_sp, |tcb| tcb.stack_pointer)
        })
    }

    /// Move the current task from its ready list into a delay list for
    /// `ticks` ticks, then request a context switch.
    pub fn delay_current_task(&mut self, ticks: TickType) {
        self.critical.enter();
        if let Some(current) = self.current {
            self.delay_locked(current, ticks);
        }
        self.critical.exit();

        P::request_switch();
    }

    fn delay_locked(&mut self, task: TaskHandle, ticks: TickType) {
        let priority = self.priority_of(task);
        let node = task.node();
        let ready_list = ReadyQueueSet::<P>::list(priority);

        let container = self.lists.node(node).container();
        match self.lists.remove(node) {
            Some(remaining) if container == Some(ready_list) => {
                self.ready.note_removed(priority, remaining);
            }
            Some(_) => {}
            None => kernel_assert!(P, false, InvariantViolation::DetachedNodeRemoved),
        }

        let list = self.delays.insert(&mut self.lists, node, ticks);
        if let Some(tcb) = self.tcb_mut(task) {
            tcb.set_ticks_to_delay(ticks);
        }
        log::trace!(
            "task slot {} sleeps for {ticks} ticks ({list:?} list)",
            task.index()
        );
    }

    /// Tick handler. Advances time by one tick, moves every task whose
    /// wake tick has been reached back to its ready list and requests a
    /// context switch. Returns the number of tasks woken.
    pub fn advance_tick(&mut self) -> usize {
        let woken = sync::from_isr::<P, _, _>(|| self.tick_locked());
        P::request_switch();
        woken
    }

    fn tick_locked(&mut self) -> usize {
        self.delays.increment(&mut self.lists);

        let mut woken = 0;
        while let Some(node) = self.delays.pop_expired(&mut self.lists) {
            self.make_ready(node);
            woken += 1;
        }
        woken
    }

    fn make_ready(&mut self, node: NodeId) {
        let Some(task) = self.lists.node(node).owner() else {
            return;
        };
        let priority = self.priority_of(task);
        self.ready.insert(&mut self.lists, priority, node);
        log::trace!(
            "task slot {} woke at tick {}",
            task.index(),
            self.delays.tick_count()
        );
    }

    /// Voluntarily give up the CPU. The switch itself happens when the
    /// port services the request.
    pub fn yield_now(&self) {
        P::request_switch();
    }

    /// Enter a nestable task-level critical section.
    pub fn enter_critical(&mut self) {
        self.critical.enter();
    }

    /// Leave a task-level critical section.
    pub fn exit_critical(&mut self) {
        self.critical.exit();
    }

    fn initialise_task_lists(&mut self) {
        self.ready.init(&mut self.lists);
        self.delays.init(&mut self.lists);
    }

    fn priority_of(&self, task: TaskHandle) -> Priority {
        self.tcb(task).map_or(IDLE_PRIORITY, TaskControlBlock::priority)
    }

    fn tcb_mut(&mut self, task: TaskHandle) -> Option<&mut TaskControlBlock> {
        self.tasks.get_mut(task.index())?.as_deref_mut()
    }

    fn current_tcb_mut(&mut self) -> Option<&mut TaskControlBlock> {
        let current = self.current?;
        self.tcb_mut(current)
    }

    pub fn tcb(&self, task: TaskHandle) -> Option<&TaskControlBlock> {
        self.tasks.get(task.index())?.as_deref()
    }

    pub fn current_tcb(&self) -> Option<&TaskControlBlock> {
        self.tcb(self.current?)
    }

    pub fn current_task(&self) -> Option<TaskHandle> {
        self.current
    }

    /// Saved stack pointer of the current task, for the first dispatch.
    pub fn current_stack_pointer(&self) -> *mut StackWord {
        self.current_tcb()
            .map_or(core::ptr::null_mut(), |tcb| tcb.stack_pointer)
    }

    /// The list a task is currently queued in, as a state.
    pub fn task_state(&self, task: TaskHandle) -> Option<TaskState> {
        self.tcb(task)?;
        let list = self.lists.node(task.node()).container()?;
        if list.0 < MAX_PRIORITIES {
            Some(TaskState::Ready)
        } else {
            self.delays.classify(list).map(TaskState::Delayed)
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn tick_count(&self) -> TickType {
        self.delays.tick_count()
    }

    pub fn next_unblock_tick(&self) -> TickType {
        self.delays.next_unblock()
    }

    /// How many times the tick counter has wrapped around.
    pub fn overflow_count(&self) -> u32 {
        self.delays.overflow_count()
    }

    /// Highest priority that currently has a ready task.
    pub fn top_ready_priority(&self) -> Option<Priority> {
        self.ready.top_priority()
    }

    /// Bitmap of priorities with at least one ready task.
    pub fn ready_priorities(&self) -> u32 {
        self.ready.occupancy()
    }

    /// Number of ready tasks at `priority`.
    pub fn ready_len(&self, priority: Priority) -> usize {
        if priority < MAX_PRIORITIES {
            self.lists.length(ReadyQueueSet::<P>::list(priority))
        } else {
            0
        }
    }

    pub fn critical_nesting(&self) -> usize {
        self.critical.depth()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl<P: Port> Default for Scheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the idle task: keep handing the CPU to anyone who wants it.
extern "C" fn idle_task<P: Port>(_: *mut ()) {
    loop {
        P::request_switch();
    }
}
