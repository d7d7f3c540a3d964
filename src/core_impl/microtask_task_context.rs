use super::*;

const REACTION_RED_ZONE: usize = 64 * 1024;
const REACTION_STACK_SIZE: usize = 2 * 1024 * 1024;

impl Runtime {
    /// Queues `callback` to run on a later microtask turn, after every
    /// microtask already queued.
    pub fn queue_microtask<F>(&self, callback: F)
    where
        F: FnOnce(&Runtime) -> Result<()> + 'static,
    {
        self.inner
            .scheduler
            .borrow_mut()
            .microtask_queue
            .push_back(ScheduledMicrotask::Callback(Box::new(callback)));
        self.trace_microtask_line("[microtask] queue kind=callback".into());
    }

    pub(crate) fn queue_promise_reaction_microtask(
        &self,
        reaction: PromiseReactionKind,
        settled: PromiseSettledValue,
    ) {
        let line = format!(
            "[microtask] queue kind={} downstream={} settled={}",
            reaction.label(),
            reaction.downstream_id(),
            settled.label()
        );
        self.inner
            .scheduler
            .borrow_mut()
            .microtask_queue
            .push_back(ScheduledMicrotask::Promise { reaction, settled });
        self.trace_microtask_line(line);
    }

    pub fn pending_microtasks(&self) -> usize {
        self.inner.scheduler.borrow().microtask_queue.len()
    }

    /// Drains the microtask queue, including work queued while draining.
    ///
    /// Returns the number of turns run. Called from inside a running task
    /// this is a no-op returning `Ok(0)`; the outer driver drains later.
    pub fn run_microtasks(&self) -> Result<usize> {
        if !self.inner.scheduler.borrow().can_drain_microtasks() {
            return Ok(0);
        }
        self.with_microtask_drain(|this| {
            let mut steps = 0usize;
            loop {
                let (pending, limit) = {
                    let scheduler = this.inner.scheduler.borrow();
                    (scheduler.microtask_queue.len(), scheduler.step_limit)
                };
                if pending == 0 {
                    return Ok(steps);
                }
                if steps >= limit {
                    return Err(this.step_limit_error(limit, steps + 1, None));
                }
                let Some(task) = this.inner.scheduler.borrow_mut().microtask_queue.pop_front()
                else {
                    return Ok(steps);
                };
                steps += 1;
                this.run_microtask(task)?;
            }
        })
    }

    /// Runs exactly one microtask turn. Returns `false` when the queue is
    /// empty or a drain is already in progress.
    pub fn run_next_microtask(&self) -> Result<bool> {
        if !self.inner.scheduler.borrow().can_drain_microtasks() {
            return Ok(false);
        }
        self.with_microtask_drain(|this| {
            let Some(task) = this.inner.scheduler.borrow_mut().microtask_queue.pop_front() else {
                return Ok(false);
            };
            this.run_microtask(task)?;
            Ok(true)
        })
    }

    /// Runs `run` as one task, then performs a microtask checkpoint.
    pub fn run_task<T>(&self, run: impl FnOnce(&Runtime) -> Result<T>) -> Result<T> {
        let value = self.with_task_depth(run)?;
        if self.inner.scheduler.borrow().task_depth == 0 {
            self.run_microtasks()?;
        }
        Ok(value)
    }

    fn run_microtask(&self, task: ScheduledMicrotask) -> Result<()> {
        stacker::maybe_grow(REACTION_RED_ZONE, REACTION_STACK_SIZE, || match task {
            ScheduledMicrotask::Callback(callback) => {
                self.trace_microtask_line("[microtask] run kind=callback".into());
                callback(self)
            }
            ScheduledMicrotask::Promise { reaction, settled } => {
                self.trace_microtask_line(format!(
                    "[microtask] run kind={} downstream={} settled={}",
                    reaction.label(),
                    reaction.downstream_id(),
                    settled.label()
                ));
                self.run_promise_reaction_task(reaction, settled);
                Ok(())
            }
        })
    }

    fn with_microtask_drain<T>(&self, run: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.inner.scheduler.borrow_mut().draining_microtasks = true;
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(self)));
        self.inner.scheduler.borrow_mut().draining_microtasks = false;
        match run_result {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    pub(crate) fn with_task_depth<T>(&self, run: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.inner.scheduler.borrow_mut().task_depth += 1;
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(self)));
        {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            scheduler.task_depth = scheduler.task_depth.saturating_sub(1);
        }
        match run_result {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}
