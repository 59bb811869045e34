//! Time-ordered ready queue and the single-step dispatch loop.
//!
//! The dispatcher holds pending contexts in ascending dispatch-time
//! order (signed-difference comparison, so tick wraparound is fine) and
//! dispatches at most one due task per [`TaskDispatcher::run`] call.
//! The application drives it from its main loop:
//!
//! ```ignore
//! loop {
//!     dispatcher.run();
//!     // ... poll hardware, feed watchdog ...
//! }
//! ```
//!
//! While a task body executes, its context stays marked as owned by the
//! dispatcher even though it has been unlinked from the list. That mark
//! keeps the context pool from recycling the record mid-call and keeps
//! a nested `run()` (from a callback that blocks on `delay` or a
//! barrier `wait`) from dispatching the same context again.

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;

use crate::context::{ContextNode, Tag, TaskContext};
use crate::pool::ContextPool;
use crate::queue::{ContextIter, QueueCore, TaskQueue};
use crate::task::Task;
use crate::tick::{tick_before, Tick, TimingFn};

/// How a periodic context is re-armed after its callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Rest between runs: the period restarts when the callback
    /// returns. Never accumulates backlog.
    #[default]
    Interval,
    /// Period measured from the callback's start. A late firing shifts
    /// once, then the cadence resumes.
    Cycle,
    /// Fixed wall-clock grid. After an overrun the context re-syncs to
    /// the next grid point instead of firing a burst of catch-ups.
    Timing,
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingPolicy::Interval => write!(f, "Interval"),
            SchedulingPolicy::Cycle => write!(f, "Cycle"),
            SchedulingPolicy::Timing => write!(f, "Timing"),
        }
    }
}

/// Cooperative task dispatcher: schedules callbacks at future ticks, at
/// periodic intervals, or for immediate release by an event barrier.
pub struct TaskDispatcher {
    pub(crate) core: Rc<DispatcherCore>,
}

impl TaskDispatcher {
    /// A dispatcher reading time from `timing` and drawing pool-flavored
    /// contexts from `pool` (pool-flavored entrypoints return `None`
    /// without one).
    pub fn new(timing: TimingFn, pool: Option<Rc<dyn ContextPool>>) -> Self {
        Self {
            core: Rc::new(DispatcherCore {
                queue: QueueCore::new(),
                timing,
                pool,
                policy: Cell::new(SchedulingPolicy::default()),
            }),
        }
    }

    /// The injected tick source.
    pub fn timing_function(&self) -> TimingFn {
        self.core.timing
    }

    /// The pool backing the pool-flavored entrypoints, if any.
    pub fn context_pool(&self) -> Option<&Rc<dyn ContextPool>> {
        self.core.pool.as_ref()
    }

    pub fn scheduling_policy(&self) -> SchedulingPolicy {
        self.core.policy.get()
    }

    /// Change the periodic re-arm policy. Takes effect from the next
    /// re-arm; already computed dispatch times stay as they are.
    pub fn set_scheduling_policy(&self, policy: SchedulingPolicy) {
        self.core.policy.set(policy);
    }

    // ── Pool-flavored scheduling ───────────────────────────────

    /// One-shot: run `target` once, `interval` ticks from now.
    pub fn call_after(&self, interval: i32, target: Task, tag: Tag) -> Option<TaskContext> {
        self.schedule(interval, -1, target, tag)
    }

    /// Periodic: run `target` as soon as possible, then every
    /// `interval` ticks under the current policy.
    pub fn call_every(&self, interval: i32, target: Task, tag: Tag) -> Option<TaskContext> {
        self.schedule(0, interval, target, tag)
    }

    /// Fetch a context from the pool, cancel every pending context with
    /// the same `target` (here and on every barrier), and arm it.
    ///
    /// Returns the context as a cancellation handle, or `None` when the
    /// pool is exhausted (or absent). A negative `first_interval` skips
    /// the arming but still performs the fetch and the dedup.
    pub fn schedule(
        &self,
        first_interval: i32,
        next_interval: i32,
        target: Task,
        tag: Tag,
    ) -> Option<TaskContext> {
        let pool = self.core.pool.as_ref()?;
        let context = pool.fetch()?;
        self.cancel_all_target(target);
        self.schedule_with(&context, first_interval, next_interval, target, tag);
        Some(context)
    }

    // ── Caller-context scheduling ──────────────────────────────

    /// One-shot on caller-supplied storage. No dedup is performed.
    pub fn call_after_with(&self, context: &TaskContext, interval: i32, target: Task, tag: Tag) {
        self.schedule_with(context, interval, -1, target, tag);
    }

    /// Periodic on caller-supplied storage. No dedup is performed.
    pub fn call_every_with(&self, context: &TaskContext, interval: i32, target: Task, tag: Tag) {
        self.schedule_with(context, 0, interval, target, tag);
    }

    /// Arm a caller-supplied context. If the context is pending
    /// anywhere (even on another queue) it is cancelled there first.
    /// A negative `first_interval` is a silent no-op that leaves the
    /// context untouched.
    pub fn schedule_with(
        &self,
        context: &TaskContext,
        first_interval: i32,
        next_interval: i32,
        target: Task,
        tag: Tag,
    ) {
        if first_interval >= 0 {
            context.set_target(target);
            context.set_tag(tag);
            self.reschedule(context, first_interval, next_interval);
        }
    }

    /// Re-arm a context keeping its current target and tag.
    pub fn reschedule(&self, context: &TaskContext, first_interval: i32, next_interval: i32) {
        if first_interval < 0 {
            return;
        }
        context.cancel();
        let node = &context.node;
        node.dispatch_time
            .set((self.core.timing)().wrapping_add(first_interval as Tick));
        node.repeat_interval.set(next_interval);
        *node.signal_event.borrow_mut() = None;
        self.core.enqueue(node);
    }

    // ── Dispatch ───────────────────────────────────────────────

    /// One dispatch step: run the head context if it is due. Returns
    /// true iff a task was dispatched.
    pub fn run(&self) -> bool {
        self.core.run_step()
    }

    /// Cooperative sleep: keep calling [`TaskDispatcher::run`] until
    /// the tick source has advanced by `ticks`.
    pub fn delay(&self, ticks: i32) {
        let timing = self.core.timing;
        let end = timing().wrapping_add(ticks as Tick);
        while tick_before(timing(), end) {
            self.run();
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl Default for TaskDispatcher {
    /// A dispatcher on the host millisecond clock, without a pool.
    fn default() -> Self {
        Self::new(crate::tick::host_millis, None)
    }
}

impl TaskQueue for TaskDispatcher {
    fn cancel(&self, context: &TaskContext) {
        self.core.queue.cancel_node(&context.node);
    }

    fn cancel_all(&self) {
        self.core.queue.cancel_all();
    }

    fn cancel_all_target(&self, target: Task) {
        self.core.queue.cancel_all_target(target);
    }

    fn cancel_all_tag(&self, tag: Tag) {
        self.core.queue.cancel_all_tag(tag);
    }

    fn iter(&self) -> ContextIter {
        self.core.queue.snapshot()
    }
}

// ── Core ───────────────────────────────────────────────────────

pub(crate) struct DispatcherCore {
    pub(crate) queue: Rc<QueueCore>,
    pub(crate) timing: TimingFn,
    pub(crate) pool: Option<Rc<dyn ContextPool>>,
    policy: Cell<SchedulingPolicy>,
}

impl DispatcherCore {
    /// Splice `node` in ascending dispatch-time order: before the first
    /// strictly later context, after every equal one (FIFO among
    /// equals).
    pub(crate) fn enqueue(self: &Rc<Self>, node: &Rc<ContextNode>) {
        let mut contexts = self.queue.contexts.borrow_mut();
        let time = node.dispatch_time.get();
        let position = contexts
            .iter()
            .position(|other| tick_before(time, other.dispatch_time.get()))
            .unwrap_or(contexts.len());
        node.set_owner(Some(&self.queue));
        contexts.insert(position, node.clone());
    }

    /// Hand a signalled waiter over for immediate dispatch.
    pub(crate) fn enqueue_now(self: &Rc<Self>, node: &Rc<ContextNode>) {
        node.dispatch_time.set((self.timing)());
        node.repeat_interval.set(-1);
        self.enqueue(node);
    }

    pub(crate) fn run_step(self: &Rc<Self>) -> bool {
        let now = (self.timing)();
        let node = {
            let contexts = self.queue.contexts.borrow();
            let Some(head) = contexts.first() else {
                return false;
            };
            if tick_before(now, head.dispatch_time.get()) {
                return false;
            }
            head.clone()
        };
        let fired_at = node.dispatch_time.get();
        self.queue.contexts.borrow_mut().remove(0);

        let terminal =
            node.repeat_interval.get() < 0 && node.signal_event.borrow().is_none();
        if terminal {
            node.set_owner(None);
        }
        // Otherwise ownership stays marked: the context reads as
        // pending while its task runs, so the pool cannot hand it out
        // and a nested run() cannot dispatch it a second time.

        node.target.get().call();

        // The task body may have cancelled, re-armed, or reparked its
        // own context; only finish the dispatch if it is still ours and
        // still detached.
        if node.owner_is(&self.queue) && !self.queue.contains(&node) {
            let repeat = node.repeat_interval.get();
            if repeat >= 0 {
                node.dispatch_time
                    .set(self.next_dispatch_time(fired_at, now, repeat));
                self.enqueue(&node);
            } else {
                let barrier = node.signal_event.borrow().as_ref().and_then(|w| w.upgrade());
                match barrier {
                    Some(barrier) => barrier.push_back(node.clone()),
                    None => node.set_owner(None),
                }
            }
        }

        true
    }

    fn next_dispatch_time(&self, fired_at: Tick, entered_at: Tick, repeat: i32) -> Tick {
        let now = (self.timing)();
        let step = repeat as Tick;
        match self.policy.get() {
            SchedulingPolicy::Interval => now.wrapping_add(step),
            SchedulingPolicy::Cycle => {
                let next = entered_at.wrapping_add(step);
                if tick_before(next, now) {
                    now
                } else {
                    next
                }
            }
            SchedulingPolicy::Timing => {
                let next = fired_at.wrapping_add(step);
                if !tick_before(next, now) {
                    next
                } else if repeat > 0 {
                    // Missed the slot entirely: pick up at the next
                    // grid point at or after now.
                    let phase = now.wrapping_sub(fired_at) % step;
                    if phase == 0 {
                        now
                    } else {
                        now.wrapping_add(step - phase)
                    }
                } else {
                    now
                }
            }
        }
    }
}
