use super::*;

impl Runtime {
    pub fn set_step_limit(&self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::InvalidArgument(
                "set_step_limit requires at least 1 step".into(),
            ));
        }
        self.inner.scheduler.borrow_mut().step_limit = max_steps;
        Ok(())
    }

    pub fn step_limit(&self) -> usize {
        self.inner.scheduler.borrow().step_limit
    }

    pub fn enable_trace(&self, enabled: bool) {
        self.inner.trace_state.borrow_mut().enabled = enabled;
    }

    pub fn set_trace_timers(&self, enabled: bool) {
        self.inner.trace_state.borrow_mut().timers = enabled;
    }

    pub fn set_trace_microtasks(&self, enabled: bool) {
        self.inner.trace_state.borrow_mut().microtasks = enabled;
    }

    pub fn set_trace_promises(&self, enabled: bool) {
        self.inner.trace_state.borrow_mut().promises = enabled;
    }

    pub fn set_trace_log_limit(&self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidArgument(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        let mut trace_state = self.inner.trace_state.borrow_mut();
        trace_state.log_limit = max_entries;
        while trace_state.logs.len() > trace_state.log_limit {
            trace_state.logs.pop_front();
        }
        Ok(())
    }

    pub fn take_trace_logs(&self) -> Vec<String> {
        self.inner.trace_state.borrow_mut().logs.drain(..).collect()
    }

    pub(crate) fn trace_timer_line(&self, line: String) {
        let trace_state = self.inner.trace_state.borrow();
        if trace_state.enabled && trace_state.timers {
            drop(trace_state);
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_microtask_line(&self, line: String) {
        let trace_state = self.inner.trace_state.borrow();
        if trace_state.enabled && trace_state.microtasks {
            drop(trace_state);
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_promise_line(&self, line: String) {
        let trace_state = self.inner.trace_state.borrow();
        if trace_state.enabled && trace_state.promises {
            drop(trace_state);
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_line(&self, line: String) {
        let mut trace_state = self.inner.trace_state.borrow_mut();
        if !trace_state.enabled {
            return;
        }
        tracing::debug!(target: "gpromise", "{line}");
        if trace_state.logs.len() >= trace_state.log_limit {
            trace_state.logs.pop_front();
        }
        trace_state.logs.push_back(line);
    }
}
