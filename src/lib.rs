//! Single-threaded promises driven by an explicit, deterministic event loop.
//!
//! A [`Runtime`] owns the microtask queue that defers every promise reaction
//! and a virtual-clock timer queue that producers can use to settle later.
//! Nothing runs until the runtime is driven with [`Runtime::run_microtasks`],
//! [`Runtime::advance_time`], [`Runtime::flush`] and friends.
//!
//! ```
//! use gpromise::{Promise, Runtime, Value};
//!
//! let rt = Runtime::new();
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//!
//! let promise = Promise::new(&rt, |resolve, _reject| {
//!     resolve.call(41);
//!     Ok(())
//! });
//! let sink = seen.clone();
//! promise
//!     .then(|value| match value {
//!         Value::Number(n) => Ok(Value::Number(n + 1)),
//!         other => Ok(other),
//!     })
//!     .then(move |value| {
//!         sink.borrow_mut().push(value);
//!         Ok(Value::Undefined)
//!     });
//!
//! assert!(seen.borrow().is_empty());
//! rt.run_microtasks().unwrap();
//! assert_eq!(*seen.borrow(), vec![Value::Number(42)]);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

mod core_impl;
mod promise_values;
mod runtime_state;
mod runtime_values;

pub use promise_values::{Handler, Promise, PromiseState, ResolvingFunction};
pub use runtime_state::PendingTimer;
pub use runtime_values::{NativeFunction, ObjectValue, Value};

use promise_values::*;
use runtime_state::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Arbitrary value raised by an executor, handler or thenable.
    #[error("thrown value: {}", .0.as_string())]
    Thrown(Value),
    #[error("TypeError: Chaining cycle detected for promise #{promise_id}")]
    ChainCycle { promise_id: usize },
    #[error("TypeError: {0} is not a function")]
    NotCallable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(
        "event loop exceeded max task steps (possible uncleared interval or unbounded promise chain): limit={limit}, steps={steps}, now_ms={now_ms}, due_limit={due_limit}, pending_microtasks={pending_microtasks}, pending_timers={pending_timers}, next_timer={next_timer}"
    )]
    StepLimit {
        limit: usize,
        steps: usize,
        now_ms: i64,
        due_limit: String,
        pending_microtasks: usize,
        pending_timers: usize,
        next_timer: String,
    },
}

impl Error {
    pub fn thrown(value: impl Into<Value>) -> Self {
        Self::Thrown(value.into())
    }

    /// Rejection reason carried downstream when this error escapes a handler.
    pub fn reason(&self) -> Value {
        match self {
            Self::Thrown(value) => value.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Event loop shared by every promise created from it.
///
/// Cloning yields another handle to the same loop. Call
/// [`Runtime::shutdown`] at teardown to drop outstanding work.
#[derive(Clone, Default)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

#[derive(Default)]
struct RuntimeInner {
    scheduler: RefCell<SchedulerState>,
    trace_state: RefCell<TraceState>,
    promise_runtime: RefCell<PromiseRuntimeState>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards every queued microtask and timer and returns how many were
    /// dropped. A timer that is running right now is not re-queued.
    pub fn shutdown(&self) -> usize {
        let (microtasks, timers) = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            if scheduler.running_timer_id.is_some() {
                scheduler.running_timer_canceled = true;
            }
            (
                std::mem::take(&mut scheduler.microtask_queue),
                std::mem::take(&mut scheduler.task_queue),
            )
        };
        let dropped = microtasks.len() + timers.len();
        self.trace_timer_line(format!(
            "[timer] shutdown microtasks={} timers={}",
            microtasks.len(),
            timers.len()
        ));
        drop(microtasks);
        drop(timers);
        dropped
    }

    pub fn same_runtime(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheduler = self.inner.scheduler.borrow();
        f.debug_struct("Runtime")
            .field("now_ms", &scheduler.now_ms)
            .field("pending_microtasks", &scheduler.microtask_queue.len())
            .field("pending_timers", &scheduler.task_queue.len())
            .finish()
    }
}
