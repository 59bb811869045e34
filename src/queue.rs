// Shared pending-list core plus the public cancellation surface.
//
// The dispatcher and every event barrier are, underneath, the same
// thing: an ordered list of contexts plus a registry of subqueues that
// bulk cancellation recurses through. The dispatcher keeps its list in
// dispatch-time order; barriers keep theirs in arrival order. Only the
// insert position differs.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::context::{ContextNode, Tag, TaskContext};
use crate::task::Task;

/// Cancellation and inspection surface shared by the dispatcher and
/// event barriers.
pub trait TaskQueue {
    /// Unlink one context. No effect if this queue does not own it.
    fn cancel(&self, context: &TaskContext);

    /// Unlink every context on this queue and, recursively, on each of
    /// its subqueues.
    fn cancel_all(&self);

    /// Unlink every context whose target equals `target`, recursively
    /// through the subqueue chain.
    fn cancel_all_target(&self, target: Task);

    /// Unlink every context carrying `tag`, recursively through the
    /// subqueue chain.
    fn cancel_all_tag(&self, tag: Tag);

    /// Iterate over the currently linked contexts. The walk is taken
    /// over a snapshot: cancelling the current element (or any other)
    /// mid-walk neither skips nor repeats the rest.
    fn iter(&self) -> ContextIter;
}

/// Snapshot iterator over a queue's pending contexts.
pub struct ContextIter {
    inner: alloc::vec::IntoIter<TaskContext>,
}

impl Iterator for ContextIter {
    type Item = TaskContext;

    fn next(&mut self) -> Option<TaskContext> {
        self.inner.next()
    }
}

// ── List core ──────────────────────────────────────────────────

pub(crate) struct QueueCore {
    pub(crate) contexts: RefCell<Vec<Rc<ContextNode>>>,
    subqueues: RefCell<Vec<Weak<QueueCore>>>,
}

impl QueueCore {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            contexts: RefCell::new(Vec::new()),
            subqueues: RefCell::new(Vec::new()),
        })
    }

    /// Register `subqueue` for recursive cancellation.
    pub(crate) fn adopt_subqueue(&self, subqueue: &Rc<QueueCore>) {
        self.subqueues.borrow_mut().push(Rc::downgrade(subqueue));
    }

    /// Append at the tail and take ownership (barrier parking order).
    pub(crate) fn push_back(self: &Rc<Self>, node: Rc<ContextNode>) {
        node.set_owner(Some(self));
        self.contexts.borrow_mut().push(node);
    }

    pub(crate) fn contains(&self, node: &Rc<ContextNode>) -> bool {
        self.contexts.borrow().iter().any(|c| Rc::ptr_eq(c, node))
    }

    /// Unlink `node` if this queue owns it.
    ///
    /// The ownership mark is cleared even when the node is not in the
    /// list: that is the detached-but-running state, and clearing it
    /// is how a callback cancels itself.
    pub(crate) fn cancel_node(self: &Rc<Self>, node: &Rc<ContextNode>) {
        {
            let mut contexts = self.contexts.borrow_mut();
            if let Some(position) = contexts.iter().position(|c| Rc::ptr_eq(c, node)) {
                contexts.remove(position);
            }
        }
        if node.owner_is(self) {
            node.set_owner(None);
        }
    }

    pub(crate) fn cancel_all(&self) {
        self.unlink_matching(|_| true);
        self.for_each_subqueue(|subqueue| subqueue.cancel_all());
    }

    pub(crate) fn cancel_all_target(&self, target: Task) {
        self.unlink_matching(|node| node.target.get() == target);
        self.for_each_subqueue(|subqueue| subqueue.cancel_all_target(target));
    }

    pub(crate) fn cancel_all_tag(&self, tag: Tag) {
        self.unlink_matching(|node| node.tag.get() == tag);
        self.for_each_subqueue(|subqueue| subqueue.cancel_all_tag(tag));
    }

    pub(crate) fn snapshot(&self) -> ContextIter {
        let items: Vec<TaskContext> = self
            .contexts
            .borrow()
            .iter()
            .map(|node| TaskContext { node: node.clone() })
            .collect();
        ContextIter {
            inner: items.into_iter(),
        }
    }

    fn unlink_matching(&self, matches: impl Fn(&ContextNode) -> bool) {
        let mut contexts = self.contexts.borrow_mut();
        let mut index = 0;
        while index < contexts.len() {
            if matches(&contexts[index]) {
                let node = contexts.remove(index);
                node.set_owner(None);
            } else {
                index += 1;
            }
        }
    }

    // Dead subqueue entries (dropped barriers) are pruned as we go.
    fn for_each_subqueue(&self, visit: impl Fn(&Rc<QueueCore>)) {
        self.subqueues.borrow_mut().retain(|weak| match weak.upgrade() {
            Some(subqueue) => {
                visit(&subqueue);
                true
            }
            None => false,
        });
    }
}
