// smol-dispatch: minimal cooperative task dispatch for single-loop firmware.
// task:       callable handles (plain functions and bound methods)
// context:    per-scheduled-task records, doubling as cancellation handles
// queue:      shared pending-list core, bulk cancellation, iteration
// pool:       grow-on-demand context pool with round-robin reuse
// dispatcher: time-ordered ready queue, run step, periodic policies
// barrier:    logical events parking waiters until signalled
// tick:       wrapping tick arithmetic and the injected clock

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod barrier;
pub mod context;
pub mod dispatcher;
pub mod pool;
pub mod queue;
pub mod task;
pub mod tick;

pub use barrier::{EventBarrier, FOREVER};
pub use context::{Tag, TaskContext};
pub use dispatcher::{SchedulingPolicy, TaskDispatcher};
pub use pool::{ContextPool, DynamicContextPool, EmptyPoolHandler};
pub use queue::{ContextIter, TaskQueue};
pub use task::Task;
pub use tick::{Tick, TimingFn};

#[cfg(any(test, feature = "std"))]
pub use tick::host_millis;
