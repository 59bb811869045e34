//! Event barriers: logical events that park waiters until signalled.
//!
//! A barrier is a FIFO queue of waiters hanging off a dispatcher.
//! [`EventBarrier::signal`] releases the head waiter by handing it to
//! the dispatcher for immediate dispatch; a `whenever` waiter comes
//! back to the tail of the barrier after it fires, so repeating waiters
//! cycle fairly behind newly arrived one-shots. Registered barriers sit
//! on the dispatcher's subqueue chain, so bulk cancellation on the
//! dispatcher reaches their waiters too.

use alloc::rc::Rc;

use crate::context::{Tag, TaskContext};
use crate::dispatcher::{DispatcherCore, TaskDispatcher};
use crate::pool::ContextPool;
use crate::queue::{ContextIter, QueueCore, TaskQueue};
use crate::task::Task;
use crate::tick::{tick_before, Tick};

/// Timeout value for [`EventBarrier::wait`] meaning "no timeout".
pub const FOREVER: i32 = -1;

/// A logical event waiters can park on until it is signalled.
pub struct EventBarrier {
    queue: Rc<QueueCore>,
    dispatcher: Rc<DispatcherCore>,
}

impl EventBarrier {
    /// A barrier tied to `dispatcher` for its whole lifetime. The new
    /// barrier joins the dispatcher's subqueue chain, so bulk
    /// cancellation and pool dedup see its waiters.
    pub fn new(dispatcher: &TaskDispatcher) -> Self {
        let queue = QueueCore::new();
        dispatcher.core.queue.adopt_subqueue(&queue);
        Self {
            queue,
            dispatcher: dispatcher.core.clone(),
        }
    }

    /// Park a pool-backed one-shot waiter: `target` runs once, after
    /// the next [`EventBarrier::signal`].
    ///
    /// Like pool-flavored scheduling, this cancels every pending
    /// context with the same `target` on the dispatcher and all its
    /// barriers first. Returns `None` when the pool is exhausted (or
    /// the dispatcher has none).
    pub fn when(&self, target: Task, tag: Tag) -> Option<TaskContext> {
        self.on_signal(target, tag, false)
    }

    /// Park a pool-backed repeating waiter: `target` runs after every
    /// signal, re-parking here each time it fires.
    pub fn whenever(&self, target: Task, tag: Tag) -> Option<TaskContext> {
        self.on_signal(target, tag, true)
    }

    /// One-shot waiter on caller-supplied storage. No dedup.
    pub fn when_with(&self, context: &TaskContext, target: Task, tag: Tag) {
        context.set_target(target);
        context.set_tag(tag);
        self.park(context, false);
    }

    /// Repeating waiter on caller-supplied storage. No dedup.
    pub fn whenever_with(&self, context: &TaskContext, target: Task, tag: Tag) {
        context.set_target(target);
        context.set_tag(tag);
        self.park(context, true);
    }

    /// Release the head waiter for immediate dispatch. Returns true
    /// iff a waiter was actually released; the dispatch itself happens
    /// on the next [`TaskDispatcher::run`].
    pub fn signal(&self) -> bool {
        let node = {
            let mut contexts = self.queue.contexts.borrow_mut();
            if contexts.is_empty() {
                return false;
            }
            contexts.remove(0)
        };
        self.dispatcher.enqueue_now(&node);
        true
    }

    /// Release every currently parked waiter, in FIFO order.
    pub fn signal_all(&self) {
        while self.signal() {}
    }

    /// Park and wait synchronously, running the dispatcher all the
    /// while. Returns true once this waiter has been signalled and
    /// dispatched, false when `ticks` elapse first (the waiter is then
    /// cancelled). [`FOREVER`] waits without a timeout.
    pub fn wait(&self, ticks: i32) -> bool {
        let timing = self.dispatcher.timing;
        let end = timing().wrapping_add(ticks as Tick);
        let context = TaskContext::new();
        self.park(&context, false);

        loop {
            self.dispatcher.run_step();
            if !context.is_pending() {
                return true;
            }
            if ticks != FOREVER && !tick_before(timing(), end) {
                break;
            }
        }

        context.cancel();
        false
    }

    fn on_signal(&self, target: Task, tag: Tag, repeat: bool) -> Option<TaskContext> {
        let pool = self.dispatcher.pool.as_ref()?;
        let context = pool.fetch()?;
        self.dispatcher.queue.cancel_all_target(target);
        context.set_target(target);
        context.set_tag(tag);
        self.park(&context, repeat);
        Some(context)
    }

    fn park(&self, context: &TaskContext, repeat: bool) {
        context.cancel();
        *context.node.signal_event.borrow_mut() = if repeat {
            Some(Rc::downgrade(&self.queue))
        } else {
            None
        };
        self.queue.push_back(context.node.clone());
    }
}

impl TaskQueue for EventBarrier {
    fn cancel(&self, context: &TaskContext) {
        self.queue.cancel_node(&context.node);
    }

    fn cancel_all(&self) {
        self.queue.cancel_all();
    }

    fn cancel_all_target(&self, target: Task) {
        self.queue.cancel_all_target(target);
    }

    fn cancel_all_tag(&self, tag: Tag) {
        self.queue.cancel_all_tag(tag);
    }

    fn iter(&self) -> ContextIter {
        self.queue.snapshot()
    }
}
