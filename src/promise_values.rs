use super::*;

/// Callback fed with a settled value or reason by `then`/`catch`.
pub type Handler = Box<dyn FnOnce(Value) -> Result<Value>>;

pub(crate) type FinallyHandler = Box<dyn FnOnce() -> Result<Value>>;

/// Shared handle to a single promise.
///
/// Cloning is cheap and every clone observes the same state. The handle keeps
/// its [`Runtime`] reachable so settlement can enqueue reactions without any
/// ambient global.
#[derive(Clone)]
pub struct Promise {
    pub(crate) value: Rc<RefCell<PromiseValue>>,
    pub(crate) runtime: Runtime,
}

impl PartialEq for Promise {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let promise = self.value.borrow();
        f.debug_struct("Promise")
            .field("id", &promise.id)
            .field("state", &promise.state)
            .field("reactions", &promise.reactions.len())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct PromiseValue {
    pub(crate) id: usize,
    pub(crate) state: PromiseState,
    pub(crate) reactions: Vec<PromiseReaction>,
}

/// Snapshot of a promise's status and settled payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
        }
    }
}

#[derive(Debug)]
pub(crate) struct PromiseReaction {
    pub(crate) kind: PromiseReactionKind,
}

pub(crate) enum PromiseReactionKind {
    Then {
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
        result: Promise,
    },
    Finally {
        callback: FinallyHandler,
        result: Promise,
    },
    FinallyContinuation {
        original: PromiseSettledValue,
        result: Promise,
    },
    ResolveTo {
        target: Promise,
    },
}

impl PromiseReactionKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Then { .. } => "then",
            Self::Finally { .. } => "finally",
            Self::FinallyContinuation { .. } => "finally_continuation",
            Self::ResolveTo { .. } => "resolve_to",
        }
    }

    pub(crate) fn downstream_id(&self) -> usize {
        match self {
            Self::Then { result, .. }
            | Self::Finally { result, .. }
            | Self::FinallyContinuation { result, .. } => result.id(),
            Self::ResolveTo { target } => target.id(),
        }
    }
}

impl fmt::Debug for PromiseReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseReactionKind")
            .field("kind", &self.label())
            .field("downstream", &self.downstream_id())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PromiseSettledValue {
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseSettledValue {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Outcome of probing a resolution value for a subscription capability.
pub(crate) enum ThenableProbe {
    Plain(Value),
    Promise(Promise),
    Thenable { then: Value },
}

#[derive(Debug)]
pub(crate) struct PromiseCapabilityFunction {
    pub(crate) promise: Promise,
    pub(crate) reject: bool,
    pub(crate) already_called: Rc<Cell<bool>>,
}

/// One half of the resolve/reject pair bound to a promise.
///
/// Both halves share a flag: the first call on either wins and every later
/// call is ignored.
#[derive(Clone)]
pub struct ResolvingFunction {
    pub(crate) capability: Rc<PromiseCapabilityFunction>,
}

impl ResolvingFunction {
    pub fn call(&self, value: impl Into<Value>) {
        let capability = &self.capability;
        if capability.already_called.replace(true) {
            return;
        }
        let promise = &capability.promise;
        if capability.reject {
            promise.runtime.promise_reject(promise, value.into());
        } else {
            promise.runtime.promise_resolve(promise, value.into());
        }
    }

    pub fn is_reject(&self) -> bool {
        self.capability.reject
    }

    pub fn already_called(&self) -> bool {
        self.capability.already_called.get()
    }

    pub fn promise(&self) -> &Promise {
        &self.capability.promise
    }
}

impl PartialEq for ResolvingFunction {
    fn eq(&self, other: &Self) -> bool {
        self.capability.reject == other.capability.reject
            && self.capability.promise == other.capability.promise
            && Rc::ptr_eq(
                &self.capability.already_called,
                &other.capability.already_called,
            )
    }
}

impl fmt::Debug for ResolvingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvingFunction")
            .field("promise", &self.capability.promise.id())
            .field("reject", &self.capability.reject)
            .field("already_called", &self.capability.already_called.get())
            .finish()
    }
}
