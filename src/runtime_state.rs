use super::*;

pub(crate) enum TimerCallback {
    Timeout(Box<dyn FnOnce(&Runtime) -> Result<()>>),
    Interval(Rc<dyn Fn(&Runtime) -> Result<()>>),
}

pub(crate) type MicrotaskCallback = Box<dyn FnOnce(&Runtime) -> Result<()>>;

pub(crate) struct ScheduledTask {
    pub(crate) id: i64,
    pub(crate) due_at: i64,
    pub(crate) order: i64,
    pub(crate) interval_ms: Option<i64>,
    pub(crate) callback: TimerCallback,
}

impl ScheduledTask {
    pub(crate) fn pending_timer(&self) -> PendingTimer {
        PendingTimer {
            id: self.id,
            due_at: self.due_at,
            order: self.order,
            interval_ms: self.interval_ms,
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("due_at", &self.due_at)
            .field("order", &self.order)
            .field("interval_ms", &self.interval_ms)
            .finish_non_exhaustive()
    }
}

pub(crate) enum ScheduledMicrotask {
    Callback(MicrotaskCallback),
    Promise {
        reaction: PromiseReactionKind,
        settled: PromiseSettledValue,
    },
}

impl fmt::Debug for ScheduledMicrotask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback"),
            Self::Promise { reaction, settled } => f
                .debug_struct("Promise")
                .field("reaction", reaction)
                .field("settled", &settled.label())
                .finish(),
        }
    }
}

/// Timer as reported by [`Runtime::pending_timers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: i64,
    pub due_at: i64,
    pub order: i64,
    pub interval_ms: Option<i64>,
}

#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) timers: bool,
    pub(crate) microtasks: bool,
    pub(crate) promises: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            timers: true,
            microtasks: true,
            promises: true,
            logs: VecDeque::new(),
            log_limit: 10_000,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PromiseRuntimeState {
    next_promise_id: usize,
}

impl Default for PromiseRuntimeState {
    fn default() -> Self {
        Self { next_promise_id: 1 }
    }
}

impl PromiseRuntimeState {
    pub(crate) fn allocate_promise_id(&mut self) -> usize {
        let id = self.next_promise_id;
        self.next_promise_id = self.next_promise_id.saturating_add(1);
        id
    }
}

#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(crate) task_queue: Vec<ScheduledTask>,
    pub(crate) microtask_queue: VecDeque<ScheduledMicrotask>,
    pub(crate) now_ms: i64,
    pub(crate) step_limit: usize,
    pub(crate) next_timer_id: i64,
    pub(crate) next_task_order: i64,
    pub(crate) task_depth: usize,
    pub(crate) draining_microtasks: bool,
    pub(crate) running_timer_id: Option<i64>,
    pub(crate) running_timer_canceled: bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            task_queue: Vec::new(),
            microtask_queue: VecDeque::new(),
            now_ms: 0,
            step_limit: 10_000,
            next_timer_id: 1,
            next_task_order: 0,
            task_depth: 0,
            draining_microtasks: false,
            running_timer_id: None,
            running_timer_canceled: false,
        }
    }
}

impl SchedulerState {
    pub(crate) fn allocate_timer_id(&mut self) -> i64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        id
    }

    pub(crate) fn allocate_task_order(&mut self) -> i64 {
        let order = self.next_task_order;
        self.next_task_order += 1;
        order
    }

    pub(crate) fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| {
                if let Some(limit) = due_limit {
                    task.due_at <= limit
                } else {
                    true
                }
            })
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    /// Microtasks are only drained outside any running task and never
    /// re-entrantly.
    pub(crate) fn can_drain_microtasks(&self) -> bool {
        self.task_depth == 0 && !self.draining_microtasks
    }
}
