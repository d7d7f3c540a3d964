use super::*;

const TIMER_RED_ZONE: usize = 64 * 1024;
const TIMER_STACK_SIZE: usize = 2 * 1024 * 1024;

impl Runtime {
    pub fn now_ms(&self) -> i64 {
        self.inner.scheduler.borrow().now_ms
    }

    /// Schedules `callback` once, `delay_ms` after the current virtual time.
    /// Negative delays are clamped to zero.
    pub fn set_timeout<F>(&self, delay_ms: i64, callback: F) -> i64
    where
        F: FnOnce(&Runtime) -> Result<()> + 'static,
    {
        let delay_ms = delay_ms.max(0);
        let (id, due_at) =
            self.push_timer(delay_ms, None, TimerCallback::Timeout(Box::new(callback)));
        self.trace_timer_line(format!(
            "[timer] schedule timeout id={} due_at={} delay_ms={}",
            id, due_at, delay_ms
        ));
        id
    }

    pub fn set_interval<F>(&self, interval_ms: i64, callback: F) -> i64
    where
        F: Fn(&Runtime) -> Result<()> + 'static,
    {
        let interval_ms = interval_ms.max(0);
        let (id, due_at) = self.push_timer(
            interval_ms,
            Some(interval_ms),
            TimerCallback::Interval(Rc::new(callback)),
        );
        self.trace_timer_line(format!(
            "[timer] schedule interval id={} due_at={} interval_ms={}",
            id, due_at, interval_ms
        ));
        id
    }

    fn push_timer(
        &self,
        delay_ms: i64,
        interval_ms: Option<i64>,
        callback: TimerCallback,
    ) -> (i64, i64) {
        let mut scheduler = self.inner.scheduler.borrow_mut();
        let due_at = scheduler.now_ms.saturating_add(delay_ms);
        let id = scheduler.allocate_timer_id();
        let order = scheduler.allocate_task_order();
        scheduler.task_queue.push(ScheduledTask {
            id,
            due_at,
            order,
            interval_ms,
            callback,
        });
        (id, due_at)
    }

    /// Cancels a pending timer, or stops a running interval from being
    /// re-queued. Returns whether the timer existed.
    pub fn clear_timer(&self, timer_id: i64) -> bool {
        let (removed, running_canceled) = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            let before = scheduler.task_queue.len();
            scheduler.task_queue.retain(|task| task.id != timer_id);
            let removed = before.saturating_sub(scheduler.task_queue.len());
            let running_canceled = scheduler.running_timer_id == Some(timer_id);
            if running_canceled {
                scheduler.running_timer_canceled = true;
            }
            (removed, running_canceled)
        };
        self.trace_timer_line(format!(
            "[timer] clear id={} removed={} running_canceled={}",
            timer_id, removed, running_canceled
        ));
        removed > 0 || running_canceled
    }

    pub fn clear_all_timers(&self) -> usize {
        let cleared = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            let cleared = std::mem::take(&mut scheduler.task_queue);
            if scheduler.running_timer_id.is_some() {
                scheduler.running_timer_canceled = true;
            }
            cleared
        };
        self.trace_timer_line(format!("[timer] clear_all cleared={}", cleared.len()));
        cleared.len()
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut timers = self
            .inner
            .scheduler
            .borrow()
            .task_queue
            .iter()
            .map(ScheduledTask::pending_timer)
            .collect::<Vec<_>>();
        timers.sort_by_key(|timer| (timer.due_at, timer.order));
        timers
    }

    pub fn advance_time(&self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::InvalidArgument(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let (from, to) = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            let from = scheduler.now_ms;
            scheduler.now_ms = scheduler.now_ms.saturating_add(delta_ms);
            (from, scheduler.now_ms)
        };
        let ran = self.run_due_timers_internal()?;
        self.trace_timer_line(format!(
            "[timer] advance delta_ms={} from={} to={} ran_due={}",
            delta_ms, from, to, ran
        ));
        Ok(())
    }

    pub fn advance_time_to(&self, target_ms: i64) -> Result<()> {
        let from = self.now_ms();
        if target_ms < from {
            return Err(Error::InvalidArgument(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={from})"
            )));
        }
        self.inner.scheduler.borrow_mut().now_ms = target_ms;
        let ran = self.run_due_timers_internal()?;
        self.trace_timer_line(format!(
            "[timer] advance_to from={} to={} ran_due={}",
            from, target_ms, ran
        ));
        Ok(())
    }

    /// Drains microtasks, then runs every timer in due order, moving the
    /// clock forward as it goes.
    pub fn flush(&self) -> Result<()> {
        let from = self.now_ms();
        self.run_microtasks()?;
        let ran = self.run_timer_queue(None, true)?;
        self.trace_timer_line(format!(
            "[timer] flush from={} to={} ran={}",
            from,
            self.now_ms(),
            ran
        ));
        Ok(())
    }

    pub fn run_next_timer(&self) -> Result<bool> {
        let task = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            match scheduler.next_task_index(None) {
                Some(next_idx) => {
                    let task = scheduler.task_queue.remove(next_idx);
                    if task.due_at > scheduler.now_ms {
                        scheduler.now_ms = task.due_at;
                    }
                    Some(task)
                }
                None => None,
            }
        };
        let Some(task) = task else {
            self.trace_timer_line("[timer] run_next none".into());
            return Ok(false);
        };
        self.execute_timer_task(task)?;
        Ok(true)
    }

    pub fn run_next_due_timer(&self) -> Result<bool> {
        let task = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            let now_ms = scheduler.now_ms;
            scheduler
                .next_task_index(Some(now_ms))
                .map(|next_idx| scheduler.task_queue.remove(next_idx))
        };
        let Some(task) = task else {
            self.trace_timer_line("[timer] run_next_due none".into());
            return Ok(false);
        };
        self.execute_timer_task(task)?;
        Ok(true)
    }

    pub fn run_due_timers(&self) -> Result<usize> {
        let ran = self.run_due_timers_internal()?;
        self.trace_timer_line(format!(
            "[timer] run_due now_ms={} ran={}",
            self.now_ms(),
            ran
        ));
        Ok(ran)
    }

    pub(crate) fn run_due_timers_internal(&self) -> Result<usize> {
        let now_ms = self.now_ms();
        self.run_timer_queue(Some(now_ms), false)
    }

    pub(crate) fn run_timer_queue(&self, due_limit: Option<i64>, advance_clock: bool) -> Result<usize> {
        let mut steps = 0usize;
        loop {
            let task = {
                let mut scheduler = self.inner.scheduler.borrow_mut();
                let Some(next_idx) = scheduler.next_task_index(due_limit) else {
                    return Ok(steps);
                };
                steps += 1;
                if steps > scheduler.step_limit {
                    let limit = scheduler.step_limit;
                    drop(scheduler);
                    return Err(self.step_limit_error(limit, steps, due_limit));
                }
                let task = scheduler.task_queue.remove(next_idx);
                if advance_clock && task.due_at > scheduler.now_ms {
                    scheduler.now_ms = task.due_at;
                }
                task
            };
            self.execute_timer_task(task)?;
        }
    }

    pub(crate) fn step_limit_error(
        &self,
        limit: usize,
        steps: usize,
        due_limit: Option<i64>,
    ) -> Error {
        let scheduler = self.inner.scheduler.borrow();
        let next_timer = scheduler
            .next_task_index(due_limit)
            .and_then(|idx| scheduler.task_queue.get(idx))
            .map(|task| {
                let interval_desc = task
                    .interval_ms
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "none".into());
                format!(
                    "id={},due_at={},order={},interval_ms={}",
                    task.id, task.due_at, task.order, interval_desc
                )
            })
            .unwrap_or_else(|| "none".into());

        Error::StepLimit {
            limit,
            steps,
            now_ms: scheduler.now_ms,
            due_limit: due_limit
                .map(|value| value.to_string())
                .unwrap_or_else(|| "none".into()),
            pending_microtasks: scheduler.microtask_queue.len(),
            pending_timers: scheduler.task_queue.len(),
            next_timer,
        }
    }

    fn execute_timer_task(&self, task: ScheduledTask) -> Result<()> {
        stacker::maybe_grow(TIMER_RED_ZONE, TIMER_STACK_SIZE, || {
            self.execute_timer_task_impl(task)
        })
    }

    fn execute_timer_task_impl(&self, task: ScheduledTask) -> Result<()> {
        let ScheduledTask {
            id,
            due_at,
            interval_ms,
            callback,
            ..
        } = task;
        let interval_desc = interval_ms
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        self.trace_timer_line(format!(
            "[timer] run id={} due_at={} interval_ms={} now_ms={}",
            id,
            due_at,
            interval_desc,
            self.now_ms()
        ));

        {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            scheduler.running_timer_id = Some(id);
            scheduler.running_timer_canceled = false;
        }
        let (outcome, repeat) = match callback {
            TimerCallback::Timeout(callback) => (self.run_task(|runtime| callback(runtime)), None),
            TimerCallback::Interval(callback) => {
                let outcome = self.run_task(|runtime| callback(runtime));
                (outcome, Some(callback))
            }
        };
        let canceled = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            let canceled = scheduler.running_timer_canceled;
            scheduler.running_timer_id = None;
            scheduler.running_timer_canceled = false;
            canceled
        };
        outcome?;

        if let (Some(interval_ms), Some(callback)) = (interval_ms, repeat) {
            if !canceled {
                let due_at = due_at.saturating_add(interval_ms);
                {
                    let mut scheduler = self.inner.scheduler.borrow_mut();
                    let order = scheduler.allocate_task_order();
                    scheduler.task_queue.push(ScheduledTask {
                        id,
                        due_at,
                        order,
                        interval_ms: Some(interval_ms),
                        callback: TimerCallback::Interval(callback),
                    });
                }
                self.trace_timer_line(format!(
                    "[timer] requeue id={} due_at={} interval_ms={}",
                    id, due_at, interval_ms
                ));
            }
        }

        Ok(())
    }
}
