use super::*;

impl Promise {
    /// Creates a promise and runs `executor` before returning.
    ///
    /// The executor receives the resolve and reject functions bound to the new
    /// promise. An `Err` returned by the executor rejects the promise unless
    /// one of those functions was already called.
    pub fn new<F>(runtime: &Runtime, executor: F) -> Promise
    where
        F: FnOnce(ResolvingFunction, ResolvingFunction) -> Result<()>,
    {
        let promise = runtime.new_pending_promise();
        let (resolve, reject) = runtime.new_promise_capability_functions(&promise);
        if let Err(err) = executor(resolve, reject.clone()) {
            runtime.trace_promise_line(format!(
                "[promise] executor_error id={} already_called={}",
                promise.id(),
                reject.already_called()
            ));
            reject.call(err.reason());
        }
        promise
    }

    /// Returns `value` unchanged when it already is a promise, otherwise a new
    /// promise resolved with it.
    pub fn resolve(runtime: &Runtime, value: impl Into<Value>) -> Promise {
        runtime.promise_resolve_value_as_promise(value.into())
    }

    pub fn reject(runtime: &Runtime, reason: impl Into<Value>) -> Promise {
        let promise = runtime.new_pending_promise();
        runtime.promise_reject(&promise, reason.into());
        promise
    }

    pub fn with_resolvers(runtime: &Runtime) -> (Promise, ResolvingFunction, ResolvingFunction) {
        let promise = runtime.new_pending_promise();
        let (resolve, reject) = runtime.new_promise_capability_functions(&promise);
        (promise, resolve, reject)
    }

    /// Registers optional handlers and returns the downstream promise.
    ///
    /// Handlers always run on a later microtask turn, even when this promise
    /// is already settled. A missing handler passes the outcome through.
    pub fn then_with(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        self.runtime
            .promise_then_internal(self, on_fulfilled, on_rejected)
    }

    pub fn then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value> + 'static,
    {
        self.then_with(Some(Box::new(on_fulfilled)), None)
    }

    pub fn then_or_else<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Result<Value> + 'static,
        R: FnOnce(Value) -> Result<Value> + 'static,
    {
        self.then_with(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Result<Value> + 'static,
    {
        self.then_with(None, Some(Box::new(on_rejected)))
    }

    /// Runs `callback` on either outcome and passes the original outcome on,
    /// unless the callback fails or returns a promise that rejects.
    pub fn finally<F>(&self, callback: F) -> Promise
    where
        F: FnOnce() -> Result<Value> + 'static,
    {
        let result = self.runtime.new_pending_promise();
        self.runtime.promise_add_reaction(
            self,
            PromiseReactionKind::Finally {
                callback: Box::new(callback),
                result: result.clone(),
            },
        );
        result
    }

    pub fn state(&self) -> PromiseState {
        self.value.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.value.borrow().state.is_pending()
    }

    pub fn id(&self) -> usize {
        self.value.borrow().id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}
