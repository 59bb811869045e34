//! Per-scheduled-task records.
//!
//! A [`TaskContext`] is the unit of scheduling: which task to run, when,
//! how often, and which queue currently owns it. The handle doubles as
//! the cancellation token for everything the dispatcher and barriers
//! hand out.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::ptr;

use crate::queue::QueueCore;
use crate::task::Task;
use crate::tick::Tick;

/// Opaque identity token used for bulk cancellation. Compared by value;
/// by convention `0` means "untagged".
pub type Tag = usize;

/// Handle to one schedulable unit of work.
///
/// A context is *pending* while some queue owns it and *idle*
/// otherwise. Handles are not `Clone`: each context has its own queue
/// linkage, so aliasing one would let two owners fight over it. Build a
/// fresh context instead.
pub struct TaskContext {
    pub(crate) node: Rc<ContextNode>,
}

impl TaskContext {
    /// A fresh idle context with no target.
    pub fn new() -> Self {
        Self {
            node: ContextNode::new(Task::default(), 0),
        }
    }

    /// A fresh idle context pre-bound to `target` and `tag`.
    pub fn with_target(target: Task, tag: Tag) -> Self {
        Self {
            node: ContextNode::new(target, tag),
        }
    }

    /// The task this context dispatches.
    pub fn target(&self) -> Task {
        self.node.target.get()
    }

    pub fn set_target(&self, target: Task) {
        self.node.target.set(target);
    }

    /// The identity token for bulk cancellation.
    pub fn tag(&self) -> Tag {
        self.node.tag.get()
    }

    pub fn set_tag(&self, tag: Tag) {
        self.node.tag.set(tag);
    }

    /// True while some queue owns this context.
    pub fn is_pending(&self) -> bool {
        self.node.owner().is_some()
    }

    /// Withdraw this context from its owning queue. No-op when idle.
    ///
    /// Also effective from inside the context's own callback: the
    /// dispatcher sees the cleared ownership afterwards and will not
    /// re-arm a periodic context that cancelled itself.
    pub fn cancel(&self) {
        match self.node.owner() {
            Some(owner) => owner.cancel_node(&self.node),
            // owner queue already gone; drop the stale back-edge
            None => self.node.set_owner(None),
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared record ──────────────────────────────────────────────

/// The record behind a [`TaskContext`] handle, shared with whichever
/// queue currently links it.
pub(crate) struct ContextNode {
    pub(crate) target: Cell<Task>,
    pub(crate) tag: Cell<Tag>,
    /// Back-edge to the owning queue. `Some` while linked *and* while
    /// the task body executes (the busy marker that blocks pool reuse
    /// and nested re-dispatch).
    queue: RefCell<Option<Weak<QueueCore>>>,
    pub(crate) dispatch_time: Cell<Tick>,
    pub(crate) repeat_interval: Cell<i32>,
    /// Barrier that takes this context back after the dispatcher fires
    /// it (the repeating-waiter hand-off).
    pub(crate) signal_event: RefCell<Option<Weak<QueueCore>>>,
}

impl ContextNode {
    pub(crate) fn new(target: Task, tag: Tag) -> Rc<Self> {
        Rc::new(Self {
            target: Cell::new(target),
            tag: Cell::new(tag),
            queue: RefCell::new(None),
            dispatch_time: Cell::new(0),
            repeat_interval: Cell::new(-1),
            signal_event: RefCell::new(None),
        })
    }

    pub(crate) fn owner(&self) -> Option<Rc<QueueCore>> {
        self.queue.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_owner(&self, owner: Option<&Rc<QueueCore>>) {
        *self.queue.borrow_mut() = owner.map(Rc::downgrade);
    }

    pub(crate) fn owner_is(&self, queue: &Rc<QueueCore>) -> bool {
        self.queue
            .borrow()
            .as_ref()
            .is_some_and(|weak| ptr::eq(weak.as_ptr(), Rc::as_ptr(queue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueCore;

    fn nop() {}

    #[test]
    fn fresh_context_is_idle() {
        let context = TaskContext::new();
        assert!(!context.is_pending());
        assert!(!context.target().is_callable());
        assert_eq!(context.tag(), 0);
    }

    #[test]
    fn cancel_on_idle_context_is_a_no_op() {
        let context = TaskContext::with_target(Task::function(nop), 7);
        context.cancel();
        context.cancel();
        assert!(!context.is_pending());
        assert_eq!(context.tag(), 7);
    }

    #[test]
    fn pending_follows_queue_ownership() {
        let queue = QueueCore::new();
        let context = TaskContext::new();
        queue.push_back(context.node.clone());
        assert!(context.is_pending());
        context.cancel();
        assert!(!context.is_pending());
        assert!(!queue.contains(&context.node));
    }

    #[test]
    fn pending_clears_when_the_queue_is_dropped() {
        let context = TaskContext::new();
        {
            let queue = QueueCore::new();
            queue.push_back(context.node.clone());
            assert!(context.is_pending());
        }
        assert!(!context.is_pending());
        context.cancel(); // clears the stale back-edge
        assert!(!context.is_pending());
    }
}
