use super::*;

// Synchronous thenable adoption recurses once per nesting level.
const ADOPTION_RED_ZONE: usize = 64 * 1024;
const ADOPTION_STACK_SIZE: usize = 2 * 1024 * 1024;

impl Runtime {
    pub(crate) fn new_pending_promise(&self) -> Promise {
        let id = self.inner.promise_runtime.borrow_mut().allocate_promise_id();
        Promise {
            value: Rc::new(RefCell::new(PromiseValue {
                id,
                state: PromiseState::Pending,
                reactions: Vec::new(),
            })),
            runtime: self.clone(),
        }
    }

    pub(crate) fn new_promise_capability_functions(
        &self,
        promise: &Promise,
    ) -> (ResolvingFunction, ResolvingFunction) {
        let already_called = Rc::new(Cell::new(false));
        let resolve = ResolvingFunction {
            capability: Rc::new(PromiseCapabilityFunction {
                promise: promise.clone(),
                reject: false,
                already_called: already_called.clone(),
            }),
        };
        let reject = ResolvingFunction {
            capability: Rc::new(PromiseCapabilityFunction {
                promise: promise.clone(),
                reject: true,
                already_called,
            }),
        };
        (resolve, reject)
    }

    pub(crate) fn promise_add_reaction(&self, promise: &Promise, kind: PromiseReactionKind) {
        let settled = {
            let mut promise_ref = promise.value.borrow_mut();
            match &promise_ref.state {
                PromiseState::Pending => {
                    promise_ref.reactions.push(PromiseReaction { kind });
                    return;
                }
                PromiseState::Fulfilled(value) => PromiseSettledValue::Fulfilled(value.clone()),
                PromiseState::Rejected(reason) => PromiseSettledValue::Rejected(reason.clone()),
            }
        };
        promise.runtime.queue_promise_reaction_microtask(kind, settled);
    }

    pub(crate) fn promise_fulfill(&self, promise: &Promise, value: Value) {
        self.promise_settle(promise, PromiseSettledValue::Fulfilled(value));
    }

    pub(crate) fn promise_reject(&self, promise: &Promise, reason: Value) {
        self.promise_settle(promise, PromiseSettledValue::Rejected(reason));
    }

    /// Transitions a pending promise once and hands its reactions to the
    /// microtask queue of the runtime that owns it, in registration order.
    pub(crate) fn promise_settle(&self, promise: &Promise, settled: PromiseSettledValue) {
        let owner = &promise.runtime;
        let (id, reactions) = {
            let mut promise_ref = promise.value.borrow_mut();
            if !matches!(promise_ref.state, PromiseState::Pending) {
                return;
            }
            promise_ref.state = match &settled {
                PromiseSettledValue::Fulfilled(value) => PromiseState::Fulfilled(value.clone()),
                PromiseSettledValue::Rejected(reason) => PromiseState::Rejected(reason.clone()),
            };
            (promise_ref.id, std::mem::take(&mut promise_ref.reactions))
        };
        tracing::trace!(
            promise = id,
            state = settled.label(),
            reactions = reactions.len(),
            "promise settled"
        );
        owner.trace_promise_line(format!(
            "[promise] settle id={} state={} reactions={}",
            id,
            settled.label(),
            reactions.len()
        ));
        for reaction in reactions {
            owner.queue_promise_reaction_microtask(reaction.kind, settled.clone());
        }
    }

    /// Resolution procedure: adopts promises and thenables, rejects cycles,
    /// fulfills with anything else.
    pub(crate) fn promise_resolve(&self, promise: &Promise, value: Value) {
        if !promise.is_pending() {
            return;
        }

        match Self::probe_thenable(value) {
            ThenableProbe::Promise(other) => {
                if other == *promise {
                    let promise_id = promise.id();
                    self.promise_reject(promise, Error::ChainCycle { promise_id }.reason());
                    return;
                }
                promise.runtime.trace_promise_line(format!(
                    "[promise] adopt id={} inner={}",
                    promise.id(),
                    other.id()
                ));
                self.promise_add_reaction(
                    &other,
                    PromiseReactionKind::ResolveTo {
                        target: promise.clone(),
                    },
                );
            }
            ThenableProbe::Thenable { then } => {
                promise
                    .runtime
                    .trace_promise_line(format!("[promise] adopt_thenable id={}", promise.id()));
                let (resolve, reject) = self.new_promise_capability_functions(promise);
                let args = [Value::from(resolve), Value::from(reject.clone())];
                let outcome =
                    stacker::maybe_grow(ADOPTION_RED_ZONE, ADOPTION_STACK_SIZE, || then.call(&args));
                if let Err(err) = outcome {
                    reject.call(err.reason());
                }
            }
            ThenableProbe::Plain(value) => self.promise_fulfill(promise, value),
        }
    }

    pub(crate) fn probe_thenable(value: Value) -> ThenableProbe {
        let then = match &value {
            Value::Promise(promise) => return ThenableProbe::Promise(promise.clone()),
            Value::Object(entries) => entries.borrow().get_entry("then"),
            _ => None,
        };
        match then {
            Some(then) if then.is_callable() => ThenableProbe::Thenable { then },
            _ => ThenableProbe::Plain(value),
        }
    }

    pub(crate) fn promise_resolve_value_as_promise(&self, value: Value) -> Promise {
        if let Value::Promise(promise) = value {
            return promise;
        }
        let promise = self.new_pending_promise();
        self.promise_resolve(&promise, value);
        promise
    }

    pub(crate) fn promise_then_internal(
        &self,
        promise: &Promise,
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
    ) -> Promise {
        let result = self.new_pending_promise();
        self.promise_add_reaction(
            promise,
            PromiseReactionKind::Then {
                on_fulfilled,
                on_rejected,
                result: result.clone(),
            },
        );
        result
    }

    pub(crate) fn run_promise_reaction_task(
        &self,
        reaction: PromiseReactionKind,
        settled: PromiseSettledValue,
    ) {
        match reaction {
            PromiseReactionKind::Then {
                on_fulfilled,
                on_rejected,
                result,
            } => match settled {
                PromiseSettledValue::Fulfilled(value) => {
                    if let Some(callback) = on_fulfilled {
                        match callback(value) {
                            Ok(next) => self.promise_resolve(&result, next),
                            Err(err) => self.promise_reject(&result, err.reason()),
                        }
                    } else {
                        self.promise_fulfill(&result, value);
                    }
                }
                PromiseSettledValue::Rejected(reason) => {
                    if let Some(callback) = on_rejected {
                        match callback(reason) {
                            Ok(next) => self.promise_resolve(&result, next),
                            Err(err) => self.promise_reject(&result, err.reason()),
                        }
                    } else {
                        self.promise_reject(&result, reason);
                    }
                }
            },
            PromiseReactionKind::Finally { callback, result } => match callback() {
                Ok(next) => {
                    let continuation = self.promise_resolve_value_as_promise(next);
                    self.promise_add_reaction(
                        &continuation,
                        PromiseReactionKind::FinallyContinuation {
                            original: settled,
                            result,
                        },
                    );
                }
                Err(err) => self.promise_reject(&result, err.reason()),
            },
            PromiseReactionKind::FinallyContinuation { original, result } => match settled {
                PromiseSettledValue::Fulfilled(_) => self.promise_settle(&result, original),
                PromiseSettledValue::Rejected(reason) => self.promise_reject(&result, reason),
            },
            PromiseReactionKind::ResolveTo { target } => match settled {
                PromiseSettledValue::Fulfilled(value) => self.promise_resolve(&target, value),
                PromiseSettledValue::Rejected(reason) => self.promise_reject(&target, reason),
            },
        }
    }
}
