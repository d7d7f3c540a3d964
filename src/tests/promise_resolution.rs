use super::*;

#[test]
fn executor_runs_before_constructor_returns() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    let sink = log.clone();
    let promise = Promise::new(&rt, move |resolve, _reject| {
        sink.borrow_mut().push("executor".into());
        resolve.call("done");
        Ok(())
    });
    log.borrow_mut().push("after_new".into());
    promise.then(record(&log, "then"));
    log.borrow_mut().push("after_then".into());

    assert_eq!(entries(&log), vec!["executor", "after_new", "after_then"]);
    rt.run_microtasks()?;
    assert_eq!(
        entries(&log),
        vec!["executor", "after_new", "after_then", "then:done"]
    );
    Ok(())
}

#[test]
fn then_on_settled_promise_still_waits_for_a_microtask_turn() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    let promise = Promise::resolve(&rt, 1);
    assert_eq!(promise.state(), PromiseState::Fulfilled(Value::Number(1)));

    promise.then(record(&log, "then"));
    assert!(entries(&log).is_empty());
    assert_eq!(rt.pending_microtasks(), 1);

    assert_eq!(rt.run_microtasks()?, 1);
    assert_eq!(entries(&log), vec!["then:1"]);
    Ok(())
}

#[test]
fn settlement_happens_at_most_once() -> Result<()> {
    let rt = Runtime::new();
    let (promise, resolve, reject) = Promise::with_resolvers(&rt);
    resolve.call(1);
    reject.call("ignored");
    resolve.call(2);
    assert!(resolve.already_called());
    assert!(reject.already_called());
    assert_eq!(promise.state(), PromiseState::Fulfilled(Value::Number(1)));
    Ok(())
}

#[test]
fn executor_error_after_resolve_is_ignored() -> Result<()> {
    let rt = Runtime::new();
    let promise = Promise::new(&rt, |resolve, _reject| {
        resolve.call(1);
        Err(Error::thrown("late"))
    });
    assert_eq!(promise.state(), PromiseState::Fulfilled(Value::Number(1)));

    let failed = Promise::new(&rt, |_resolve, _reject| Err(Error::thrown("boom")));
    assert_eq!(
        failed.state(),
        PromiseState::Rejected(Value::String("boom".into()))
    );
    Ok(())
}

#[test]
fn locked_in_promise_ignores_later_reject() -> Result<()> {
    let rt = Runtime::new();
    let (inner, inner_resolve, _) = Promise::with_resolvers(&rt);
    let (outer, resolve, reject) = Promise::with_resolvers(&rt);
    resolve.call(&inner);
    reject.call("ignored");
    rt.run_microtasks()?;
    assert!(outer.is_pending());

    inner_resolve.call(3);
    rt.run_microtasks()?;
    assert_eq!(outer.state(), PromiseState::Fulfilled(Value::Number(3)));
    Ok(())
}

#[test]
fn handlers_fire_in_registration_order() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    let (promise, resolve, _) = Promise::with_resolvers(&rt);
    promise.then(record(&log, "a"));
    promise.then(record(&log, "b"));
    promise.then(record(&log, "c"));
    resolve.call("x");
    assert!(entries(&log).is_empty());

    rt.run_microtasks()?;
    assert_eq!(entries(&log), vec!["a:x", "b:x", "c:x"]);
    Ok(())
}

#[test]
fn reactions_from_different_promises_interleave_fifo() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    let first = Promise::resolve(&rt, "p1");
    let second = Promise::resolve(&rt, "p2");
    first.then(record(&log, "a"));
    second.then(record(&log, "b"));
    first.then(record(&log, "c"));

    rt.run_microtasks()?;
    assert_eq!(entries(&log), vec!["a:p1", "b:p2", "c:p1"]);
    Ok(())
}

#[test]
fn adopting_a_promise_takes_extra_turns() -> Result<()> {
    let rt = Runtime::new();
    let inner = Promise::resolve(&rt, 5);
    let (outer, resolve, _) = Promise::with_resolvers(&rt);
    resolve.call(&inner);
    assert!(outer.is_pending());

    rt.run_microtasks()?;
    assert_eq!(outer.state(), PromiseState::Fulfilled(Value::Number(5)));
    Ok(())
}

#[test]
fn nested_thenables_are_flattened() -> Result<()> {
    let rt = Runtime::new();
    let mut value = Value::from(7);
    for _ in 0..256 {
        let inner = value.clone();
        value = Value::thenable(move |args| {
            args[0].call(&[inner.clone()])?;
            Ok(Value::Undefined)
        });
    }

    let promise = Promise::resolve(&rt, value);
    assert_eq!(promise.state(), PromiseState::Fulfilled(Value::Number(7)));
    Ok(())
}

#[test]
fn throwing_thenable_rejects_unless_already_resolved() -> Result<()> {
    let rt = Runtime::new();
    let throwing = Value::thenable(|_| Err(Error::thrown("bad then")));
    let rejected = Promise::resolve(&rt, throwing);
    assert_eq!(
        rejected.state(),
        PromiseState::Rejected(Value::String("bad then".into()))
    );

    let resolves_then_throws = Value::thenable(|args| {
        args[0].call(&[Value::from(1)])?;
        Err(Error::thrown("too late"))
    });
    let fulfilled = Promise::resolve(&rt, resolves_then_throws);
    assert_eq!(fulfilled.state(), PromiseState::Fulfilled(Value::Number(1)));
    Ok(())
}

#[test]
fn object_with_non_callable_then_is_a_plain_value() -> Result<()> {
    let rt = Runtime::new();
    let plain = Value::object([("then", Value::from(5))]);
    let promise = Promise::resolve(&rt, plain.clone());
    assert_eq!(promise.state(), PromiseState::Fulfilled(plain));
    Ok(())
}

#[test]
fn thenable_may_settle_from_a_timer() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    let scheduler = rt.clone();
    let delayed = Value::thenable(move |args| {
        let resolve = args[0].clone();
        scheduler.set_timeout(10, move |_| {
            resolve.call(&[Value::from(9)])?;
            Ok(())
        });
        Ok(Value::Undefined)
    });

    let promise = Promise::resolve(&rt, delayed);
    promise.then(record(&log, "later"));
    rt.run_microtasks()?;
    assert!(promise.is_pending());

    rt.advance_time(10)?;
    assert_eq!(promise.state(), PromiseState::Fulfilled(Value::Number(9)));
    assert_eq!(entries(&log), vec!["later:9"]);
    rt.shutdown();
    Ok(())
}

#[test]
fn resolving_with_itself_rejects_with_cycle_error() -> Result<()> {
    let rt = Runtime::new();
    let (promise, resolve, _) = Promise::with_resolvers(&rt);
    resolve.call(&promise);

    let expected = format!(
        "TypeError: Chaining cycle detected for promise #{}",
        promise.id()
    );
    assert_eq!(promise.state(), PromiseState::Rejected(Value::String(expected)));
    Ok(())
}

#[test]
fn thenable_resolving_with_the_adopting_promise_rejects_with_cycle_error() -> Result<()> {
    let rt = Runtime::new();
    let (promise, resolve, _) = Promise::with_resolvers(&rt);
    let adopting = promise.clone();
    resolve.call(Value::thenable(move |args| {
        args[0].call(&[Value::from(&adopting)])
    }));

    let expected = format!(
        "TypeError: Chaining cycle detected for promise #{}",
        promise.id()
    );
    assert_eq!(promise.state(), PromiseState::Rejected(Value::String(expected)));
    assert_eq!(rt.pending_microtasks(), 0);
    Ok(())
}

#[test]
fn handler_returning_its_own_downstream_rejects_with_cycle_error() -> Result<()> {
    let rt = Runtime::new();
    let slot: Rc<RefCell<Option<Promise>>> = Rc::new(RefCell::new(None));
    let handle = slot.clone();
    let downstream = Promise::resolve(&rt, 1).then(move |_| {
        Ok(handle
            .borrow()
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Undefined))
    });
    *slot.borrow_mut() = Some(downstream.clone());

    rt.run_microtasks()?;
    match downstream.state() {
        PromiseState::Rejected(Value::String(reason)) => {
            assert!(reason.contains("Chaining cycle detected"), "{reason}");
        }
        other => panic!("unexpected state: {other:?}"),
    }
    slot.borrow_mut().take();
    Ok(())
}

#[test]
fn handler_error_skips_links_without_rejection_handlers() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    Promise::resolve(&rt, 1)
        .then(|_| Err(Error::thrown("boom")))
        .then(record(&log, "skipped"))
        .then(record(&log, "skipped_again"))
        .catch(record(&log, "caught"))
        .then(record(&log, "recovered"));

    rt.run_microtasks()?;
    assert_eq!(entries(&log), vec!["caught:boom", "recovered:boom"]);
    Ok(())
}

#[test]
fn non_thrown_errors_reject_with_their_message() -> Result<()> {
    let rt = Runtime::new();
    let downstream =
        Promise::resolve(&rt, 1).then(|_| Err(Error::NotCallable("number".into())));
    rt.run_microtasks()?;
    assert_eq!(
        downstream.state(),
        PromiseState::Rejected(Value::String("TypeError: number is not a function".into()))
    );
    Ok(())
}

#[test]
fn handler_returning_pending_promise_defers_downstream() -> Result<()> {
    let rt = Runtime::new();
    let (inner, inner_resolve, _) = Promise::with_resolvers(&rt);
    let returned = inner.clone();
    let downstream = Promise::resolve(&rt, 1).then(move |_| Ok(returned.into()));

    rt.run_microtasks()?;
    assert!(downstream.is_pending());

    inner_resolve.call("inner");
    rt.run_microtasks()?;
    assert_eq!(
        downstream.state(),
        PromiseState::Fulfilled(Value::String("inner".into()))
    );
    Ok(())
}

#[test]
fn then_or_else_picks_the_matching_handler() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    Promise::reject(&rt, "nope").then_or_else(record(&log, "ok"), record(&log, "err"));
    Promise::resolve(&rt, "yes").then_or_else(record(&log, "ok"), record(&log, "err"));

    rt.run_microtasks()?;
    assert_eq!(entries(&log), vec!["err:nope", "ok:yes"]);
    Ok(())
}

#[test]
fn finally_passes_the_original_outcome_through() -> Result<()> {
    let rt = Runtime::new();
    let log = new_log();
    let sink = log.clone();
    Promise::resolve(&rt, 1)
        .finally(move || {
            sink.borrow_mut().push("finally".into());
            Ok(Value::from("ignored"))
        })
        .then(record(&log, "after"));
    Promise::reject(&rt, "e")
        .finally(|| Ok(Value::Undefined))
        .catch(record(&log, "caught"));

    rt.run_microtasks()?;
    assert_eq!(entries(&log), vec!["finally", "after:1", "caught:e"]);
    Ok(())
}

#[test]
fn finally_failure_replaces_the_outcome() -> Result<()> {
    let rt = Runtime::new();
    let thrown = Promise::resolve(&rt, 1).finally(|| Err(Error::thrown("f")));
    let producer = rt.clone();
    let rejected =
        Promise::resolve(&rt, 1).finally(move || Ok(Promise::reject(&producer, "late").into()));

    rt.run_microtasks()?;
    assert_eq!(thrown.state(), PromiseState::Rejected(Value::String("f".into())));
    assert_eq!(
        rejected.state(),
        PromiseState::Rejected(Value::String("late".into()))
    );
    Ok(())
}

#[test]
fn finally_waits_for_a_returned_promise() -> Result<()> {
    let rt = Runtime::new();
    let (gate, open, _) = Promise::with_resolvers(&rt);
    let returned = gate.clone();
    let result = Promise::resolve(&rt, 1).finally(move || Ok(returned.into()));

    rt.run_microtasks()?;
    assert!(result.is_pending());

    open.call(());
    rt.run_microtasks()?;
    assert_eq!(result.state(), PromiseState::Fulfilled(Value::Number(1)));
    Ok(())
}

#[test]
fn static_resolve_returns_promises_unchanged_and_reject_does_not_unwrap() -> Result<()> {
    let rt = Runtime::new();
    let promise = Promise::resolve(&rt, 1);
    assert_eq!(Promise::resolve(&rt, &promise), promise);

    let rejected = Promise::reject(&rt, &promise);
    assert_eq!(
        rejected.state(),
        PromiseState::Rejected(Value::Promise(promise.clone()))
    );
    Ok(())
}

#[test]
fn resolving_functions_are_callable_as_values() -> Result<()> {
    let rt = Runtime::new();
    let (promise, resolve, _) = Promise::with_resolvers(&rt);
    let as_value = Value::from(resolve);
    assert!(as_value.is_callable());
    assert_eq!(as_value.call(&[Value::from("v")])?, Value::Undefined);
    assert_eq!(promise.state(), PromiseState::Fulfilled(Value::String("v".into())));

    assert_eq!(
        Value::from(3).call(&[]),
        Err(Error::NotCallable("number".into()))
    );
    Ok(())
}

#[test]
fn promises_keep_a_handle_to_their_runtime() {
    let rt = Runtime::new();
    let other = Runtime::new();
    let promise = Promise::resolve(&rt, ());
    assert!(promise.runtime().same_runtime(&rt));
    assert!(!promise.runtime().same_runtime(&other));
    assert_eq!(promise.id(), 1);
    assert_eq!(Promise::resolve(&rt, ()).id(), 2);
}

#[test]
fn adopted_promise_from_another_runtime_settles_downstream_on_its_own_runtime() -> Result<()> {
    let rt = Runtime::new();
    let other = Runtime::new();
    let log = new_log();
    let (inner, inner_resolve, _) = Promise::with_resolvers(&other);
    let returned = inner.clone();
    let downstream = Promise::resolve(&rt, 1).then(move |_| Ok(returned.into()));
    downstream.then(record(&log, "mark"));

    assert_eq!(rt.run_microtasks()?, 1);
    assert!(downstream.is_pending());

    inner_resolve.call(5);
    assert_eq!(other.pending_microtasks(), 1);
    assert_eq!(other.run_microtasks()?, 1);
    assert_eq!(downstream.state(), PromiseState::Fulfilled(Value::Number(5)));
    assert!(entries(&log).is_empty());
    assert_eq!(rt.pending_microtasks(), 1);
    assert_eq!(other.pending_microtasks(), 0);

    rt.run_microtasks()?;
    assert_eq!(entries(&log), vec!["mark:5"]);
    Ok(())
}
