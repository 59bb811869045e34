//! Context pools: reusable supplies of task contexts.
//!
//! Pool-flavored scheduling entrypoints draw their storage from here so
//! callers that don't want to manage context lifetimes get a borrowed
//! handle back purely as a cancellation token. A pool never hands out a
//! context that some queue still owns, including the one whose task is
//! executing right now.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::context::{ContextNode, TaskContext};
use crate::task::Task;

/// Fallback allocator consulted when a pool comes up empty.
pub type EmptyPoolHandler = fn() -> Option<TaskContext>;

/// A reusable supply of task contexts.
pub trait ContextPool {
    /// The concrete pool's own fetch strategy.
    fn fetch_core(&self) -> Option<TaskContext>;

    /// Handler consulted by [`ContextPool::fetch`] after `fetch_core`
    /// comes up empty. Never consulted on internal growth paths.
    fn empty_pool_handler(&self) -> Option<EmptyPoolHandler> {
        None
    }

    /// Fetch an idle context, falling back to the empty-pool handler.
    fn fetch(&self) -> Option<TaskContext> {
        self.fetch_core()
            .or_else(|| self.empty_pool_handler().and_then(|handler| handler()))
    }
}

/// Grow-on-demand pool with round-robin reuse.
///
/// The pool keeps every context it has ever allocated and walks them
/// with a wrapping cursor, so the slot vacated by a just-fired one-shot
/// is the *last* candidate for reuse rather than the first. Growth is
/// monotonic up to `pool_limit` (`0` = unbounded); nothing is ever
/// freed piecewise.
pub struct DynamicContextPool {
    entries: RefCell<Vec<Rc<ContextNode>>>,
    cursor: Cell<usize>,
    pool_limit: usize,
    empty_pool_handler: Cell<Option<EmptyPoolHandler>>,
}

impl DynamicContextPool {
    pub fn new(pool_limit: usize) -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            pool_limit,
            empty_pool_handler: Cell::new(None),
        }
    }

    /// Maximum number of contexts this pool will allocate (`0` =
    /// unbounded).
    pub fn pool_limit(&self) -> usize {
        self.pool_limit
    }

    /// Number of contexts allocated so far.
    pub fn allocated(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn set_empty_pool_handler(&self, handler: Option<EmptyPoolHandler>) {
        self.empty_pool_handler.set(handler);
    }
}

impl Default for DynamicContextPool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ContextPool for DynamicContextPool {
    fn fetch_core(&self) -> Option<TaskContext> {
        let mut entries = self.entries.borrow_mut();
        let count = entries.len();

        // Round-robin from the cursor: skip pending contexts, and keep
        // the cursor moving so a recently recycled slot is not picked
        // again immediately.
        for step in 0..count {
            let index = (self.cursor.get() + step) % count;
            if entries[index].owner().is_none() {
                self.cursor.set((index + 1) % count);
                return Some(TaskContext {
                    node: entries[index].clone(),
                });
            }
        }

        if self.pool_limit == 0 || count < self.pool_limit {
            let node = ContextNode::new(Task::default(), 0);
            entries.push(node.clone());
            log::debug!("context pool: grew to {} contexts", entries.len());
            return Some(TaskContext { node });
        }

        log::warn!("context pool: exhausted at limit {}", self.pool_limit);
        None
    }

    fn empty_pool_handler(&self) -> Option<EmptyPoolHandler> {
        self.empty_pool_handler.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueCore;

    #[test]
    fn grows_on_demand_and_reports_allocation() {
        let pool = DynamicContextPool::new(0);
        assert_eq!(pool.allocated(), 0);
        let first = pool.fetch().unwrap();
        let second = pool.fetch().unwrap();
        assert_eq!(pool.allocated(), 2);
        assert!(!Rc::ptr_eq(&first.node, &second.node));
    }

    #[test]
    fn idle_contexts_are_reused_instead_of_allocating() {
        let pool = DynamicContextPool::new(0);
        let queue = QueueCore::new();

        let first = pool.fetch().unwrap();
        queue.push_back(first.node.clone());
        let second = pool.fetch().unwrap();
        assert_eq!(pool.allocated(), 2);

        // first goes idle; the next fetch must reuse a slot, not grow
        first.cancel();
        let third = pool.fetch().unwrap();
        assert_eq!(pool.allocated(), 2);
        assert!(Rc::ptr_eq(&third.node, &first.node));
        drop(second);
    }

    #[test]
    fn round_robin_rotates_between_idle_slots() {
        let pool = DynamicContextPool::new(0);
        let queue = QueueCore::new();

        // force two allocations, then free both slots
        let a = pool.fetch().unwrap();
        queue.push_back(a.node.clone());
        let b = pool.fetch().unwrap();
        queue.push_back(b.node.clone());
        a.cancel();
        b.cancel();

        // consecutive fetches rotate instead of handing the same idle
        // slot out twice
        let first = pool.fetch().unwrap();
        let second = pool.fetch().unwrap();
        assert!(Rc::ptr_eq(&first.node, &a.node));
        assert!(Rc::ptr_eq(&second.node, &b.node));
    }

    #[test]
    fn limit_bounds_growth() {
        let pool = DynamicContextPool::new(2);
        let queue = QueueCore::new();

        let a = pool.fetch().unwrap();
        queue.push_back(a.node.clone());
        let b = pool.fetch().unwrap();
        queue.push_back(b.node.clone());
        assert!(pool.fetch().is_none());
        assert_eq!(pool.allocated(), 2);

        // a slot opening up makes fetch work again, still without growth
        a.cancel();
        let reused = pool.fetch().unwrap();
        assert!(Rc::ptr_eq(&reused.node, &a.node));
        assert_eq!(pool.allocated(), 2);
        drop(b);
    }

    #[test]
    fn empty_pool_handler_backs_up_fetch_but_not_fetch_core() {
        fn emergency() -> Option<TaskContext> {
            Some(TaskContext::new())
        }

        let pool = DynamicContextPool::new(1);
        let queue = QueueCore::new();
        let only = pool.fetch().unwrap();
        queue.push_back(only.node.clone());

        pool.set_empty_pool_handler(Some(emergency));
        assert!(pool.fetch_core().is_none());
        let fallback = pool.fetch().unwrap();
        assert!(!Rc::ptr_eq(&fallback.node, &only.node));
        assert_eq!(pool.allocated(), 1);
    }
}
