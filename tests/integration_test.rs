use std::cell::RefCell;
use std::rc::Rc;
use tsunagi::prelude::*;
use tsunagi::{ContractViolation, RollbackPolicy};

type Log = Rc<RefCell<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A unit that logs its execution and rollback, optionally failing.
#[derive(Debug, Clone)]
struct Step {
    name: &'static str,
    log: Log,
    fail: bool,
}

impl Step {
    fn ok(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: Rc::clone(log),
            fail: false,
        }
    }

    fn failing(name: &'static str, log: &Log) -> Self {
        Self {
            fail: true,
            ..Self::ok(name, log)
        }
    }
}

impl Unit for Step {
    fn name(&self) -> UnitName {
        UnitName::new(self.name)
    }

    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        self.log.borrow_mut().push(format!("call {}", self.name));
        if self.fail {
            return Err(state.fail());
        }
        Ok(())
    }

    fn rollback(&mut self, _state: &mut State) -> Result<(), UnitError> {
        self.log.borrow_mut().push(format!("rollback {}", self.name));
        Ok(())
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[test]
fn test_missing_required_input_escapes_call() {
    define_unit!(Greeter);
    impl Unit for Greeter {
        fn contract(&self) -> Contract {
            Contract::new().input(Field::new("name"))
        }
    }

    init_tracing();
    let result = Greeter::call(Attributes::new());
    assert!(matches!(
        result,
        Err(UnitError::Contract(ContractViolation::MissingInput { .. }))
    ));
}

#[test]
fn test_charge_then_failing_ship() {
    init_tracing();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let checkout = Organizer::builder("Checkout")
        .add_unit(Step::ok("Charge", &log))
        .add_unit(Step::failing("Ship", &log))
        .build();

    let outcome = checkout.invoke(Attributes::new()).unwrap();

    assert!(outcome.is_failure());
    assert!(outcome.state().is_failure());
    assert_eq!(
        entries(&log),
        vec!["call Charge", "call Ship", "rollback Charge"]
    );
}

#[test]
fn test_nested_organizer_rolls_back_in_completion_order() {
    init_tracing();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let inner = Organizer::builder("InnerOrganizer")
        .add_unit(Step::ok("A", &log))
        .add_unit(Step::failing("B", &log))
        .build();
    let outer = Organizer::builder("OuterOrganizer")
        .add_unit(Step::ok("OuterStep", &log))
        .add_unit(inner)
        .build();

    let outcome = outer.invoke(Attributes::new()).unwrap();

    assert!(outcome.is_failure());
    assert_eq!(
        entries(&log),
        vec![
            "call OuterStep",
            "call A",
            "call B",
            "rollback A",
            "rollback OuterStep",
        ]
    );
    assert_eq!(
        outcome.state().audit().rolled_back(),
        vec!["A", "OuterStep"]
    );
}

#[test]
fn test_untouched_attributes_pass_through() {
    define_unit!(Passive);
    impl Unit for Passive {}

    let outcome = Passive::call(Attributes::new().with("foo", 1i32)).unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.state().get::<i32>("foo"), Some(&1));
}

#[test]
fn test_failure_at_every_position() {
    const UNITS: usize = 5;

    for failing in 0..UNITS {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut builder = Organizer::builder("Pipeline");
        for index in 0..UNITS {
            let name: &'static str = ["u0", "u1", "u2", "u3", "u4"][index];
            let step = if index == failing {
                Step::failing(name, &log)
            } else {
                Step::ok(name, &log)
            };
            builder = builder.add_unit(step);
        }

        let outcome = builder.build().invoke(Attributes::new()).unwrap();
        assert!(outcome.is_failure());

        let log = entries(&log);
        let calls: Vec<String> = (0..=failing).map(|i| format!("call u{i}")).collect();
        let rollbacks: Vec<String> = (0..failing).rev().map(|i| format!("rollback u{i}")).collect();
        let expected: Vec<String> = calls.into_iter().chain(rollbacks).collect();
        assert_eq!(log, expected, "failure at position {failing}");
    }
}

#[test]
fn test_call_strict_raises_only_business_failure() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let state = Step::ok("Fine", &log).invoke_strict(Attributes::new()).unwrap();
    assert!(state.is_success());

    match Step::failing("Broken", &log).invoke_strict(Attributes::new()) {
        Err(CallError::Failed(failure)) => assert!(failure.state().is_failure()),
        other => panic!("Unexpected result: {other:?}"),
    }
}

#[test]
fn test_outputs_present_after_successful_call_strict() {
    define_unit!(IssueReceipt);
    impl Unit for IssueReceipt {
        fn contract(&self) -> Contract {
            Contract::new()
                .input(Field::new("amount").typed::<u64>())
                .output(Field::new("receipt").typed::<String>())
        }

        fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
            let amount = state.get::<u64>("amount").copied().unwrap_or_default();
            state.set("receipt", format!("paid {amount}"));
            Ok(())
        }
    }

    let state = IssueReceipt::call_strict(Attributes::new().with("amount", 30u64)).unwrap();
    assert_eq!(
        state.get::<String>("receipt").map(|s| s.as_str()),
        Some("paid 30")
    );

    let result = IssueReceipt::call_strict(Attributes::new().with("amount", "30".to_string()));
    assert!(matches!(
        result,
        Err(CallError::Unit(UnitError::Contract(
            ContractViolation::TypeMismatch { .. }
        )))
    ));
}

#[test]
fn test_contract_violation_midway_still_unwinds() {
    define_unit!(NeedsToken);
    impl Unit for NeedsToken {
        fn contract(&self) -> Contract {
            Contract::new().input("token")
        }
    }

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Organizer::builder("Pipeline")
        .add_unit(Step::ok("First", &log))
        .add::<NeedsToken>()
        .build();

    let result = pipeline.invoke(Attributes::new());
    assert!(matches!(
        result,
        Err(UnitError::Contract(ContractViolation::MissingInput { .. }))
    ));
    assert_eq!(entries(&log), vec!["call First", "rollback First"]);
}

#[test]
fn test_unexpected_fault_propagates_after_rollback() {
    define_unit!(Explodes);
    impl Unit for Explodes {
        fn execute(&mut self, _state: &mut State) -> Result<(), UnitError> {
            Err(UnitError::fault("connection reset"))
        }
    }

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Organizer::builder("Pipeline")
        .add_unit(Step::ok("First", &log))
        .add::<Explodes>()
        .build();

    match pipeline.invoke_strict(Attributes::new()) {
        Err(CallError::Unit(UnitError::Fault(source))) => {
            assert_eq!(source.to_string(), "connection reset");
        }
        other => panic!("Unexpected result: {other:?}"),
    }
    assert_eq!(entries(&log), vec!["call First", "rollback First"]);
}

#[test]
fn test_before_hook_failure_prevents_execution() {
    #[derive(Debug, Clone)]
    struct Guarded {
        log: Log,
    }

    impl Unit for Guarded {
        fn hooks(&self) -> HookChain {
            let after = Rc::clone(&self.log);
            HookChain::new()
                .before(|state| Err(state.fail()))
                .after(move |_| {
                    after.borrow_mut().push("after".to_string());
                    Ok(())
                })
        }

        fn execute(&mut self, _state: &mut State) -> Result<(), UnitError> {
            self.log.borrow_mut().push("execute".to_string());
            Ok(())
        }
    }

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let outcome = Guarded {
        log: Rc::clone(&log),
    }
    .invoke(Attributes::new())
    .unwrap();

    assert!(outcome.is_failure());
    assert!(entries(&log).is_empty());
}

#[test]
fn test_after_hook_failure_rolls_back_completed_units() {
    #[derive(Debug, Clone)]
    struct Notify {
        log: Log,
    }

    impl Unit for Notify {
        fn hooks(&self) -> HookChain {
            let log = Rc::clone(&self.log);
            HookChain::new()
                .after(move |_| {
                    log.borrow_mut().push("after Notify".to_string());
                    Ok(())
                })
                .after(|_| Err(UnitError::fault("mail server unavailable")))
        }

        fn execute(&mut self, _state: &mut State) -> Result<(), UnitError> {
            self.log.borrow_mut().push("call Notify".to_string());
            Ok(())
        }

        fn rollback(&mut self, _state: &mut State) -> Result<(), UnitError> {
            self.log.borrow_mut().push("rollback Notify".to_string());
            Ok(())
        }
    }

    init_tracing();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Organizer::builder("Pipeline")
        .add_unit(Step::ok("Charge", &log))
        .add_unit(Notify {
            log: Rc::clone(&log),
        })
        .add_unit(Step::ok("Ship", &log))
        .build();

    let result = pipeline.invoke_strict(Attributes::new());

    match result {
        Err(CallError::Unit(UnitError::Fault(source))) => {
            assert_eq!(source.to_string(), "mail server unavailable");
        }
        other => panic!("Unexpected result: {other:?}"),
    }
    assert_eq!(
        entries(&log),
        vec![
            "call Charge",
            "call Notify",
            "rollback Notify",
            "rollback Charge",
        ]
    );
}

#[test]
fn test_around_hook_failure_after_continuation_rolls_back() {
    #[derive(Debug, Clone)]
    struct Commit {
        log: Log,
    }

    impl Unit for Commit {
        fn hooks(&self) -> HookChain {
            HookChain::new().around(|state, next| {
                next(state)?;
                Err(state.fail())
            })
        }

        fn execute(&mut self, _state: &mut State) -> Result<(), UnitError> {
            self.log.borrow_mut().push("call Commit".to_string());
            Ok(())
        }

        fn rollback(&mut self, _state: &mut State) -> Result<(), UnitError> {
            self.log.borrow_mut().push("rollback Commit".to_string());
            Ok(())
        }
    }

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let outcome = Commit {
        log: Rc::clone(&log),
    }
    .invoke(Attributes::new())
    .unwrap();

    assert!(outcome.is_failure());
    assert!(outcome.state().is_rolled_back());
    assert_eq!(entries(&log), vec!["call Commit", "rollback Commit"]);
}

#[test]
fn test_inherited_hooks_run_before_refinements() {
    fn audited(log: &Log) -> HookChain {
        let log = Rc::clone(log);
        HookChain::new().before(move |_| {
            log.borrow_mut().push("base before".to_string());
            Ok(())
        })
    }

    #[derive(Debug, Clone)]
    struct Refined {
        log: Log,
    }

    impl Unit for Refined {
        fn hooks(&self) -> HookChain {
            let log = Rc::clone(&self.log);
            HookChain::inherit(&audited(&self.log)).before(move |_| {
                log.borrow_mut().push("refined before".to_string());
                Ok(())
            })
        }
    }

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    Refined {
        log: Rc::clone(&log),
    }
    .invoke_strict(Attributes::new())
    .unwrap();

    assert_eq!(entries(&log), vec!["base before", "refined before"]);
}

#[test]
fn test_organizer_hooks_wrap_whole_pipeline() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let around_log = Rc::clone(&log);
    let pipeline = Organizer::builder("Timed")
        .hooks(HookChain::new().around(move |state, next| {
            around_log.borrow_mut().push("enter".to_string());
            let result = next(state);
            around_log.borrow_mut().push("exit".to_string());
            result
        }))
        .add_unit(Step::ok("Only", &log))
        .build();

    pipeline.invoke_strict(Attributes::new()).unwrap();
    assert_eq!(entries(&log), vec!["enter", "call Only", "exit"]);
}

#[derive(Debug, Clone)]
struct BrokenCompensation;

impl Unit for BrokenCompensation {
    fn rollback(&mut self, _state: &mut State) -> Result<(), UnitError> {
        Err(UnitError::fault("refund rejected"))
    }
}

#[test]
fn test_failed_compensation_is_reported_after_full_unwind() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Organizer::builder("Pipeline")
        .add_unit(Step::ok("First", &log))
        .add_unit(BrokenCompensation)
        .add_unit(Step::failing("Last", &log))
        .build();

    match pipeline.invoke(Attributes::new()) {
        Err(UnitError::RollbackFailed { cause, failures }) => {
            assert!(cause.is_failure());
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].unit.as_str(), "BrokenCompensation");
        }
        other => panic!("Unexpected result: {other:?}"),
    }
    assert_eq!(
        entries(&log),
        vec!["call First", "call Last", "rollback First"]
    );
}

#[test]
fn test_ignore_policy_keeps_business_failure_quiet() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Organizer::builder("Pipeline")
        .add_unit(BrokenCompensation)
        .add_unit(Step::failing("Last", &log))
        .build();

    let state = State::new().with_rollback_policy(RollbackPolicy::Ignore);
    let outcome = pipeline.invoke(state).unwrap();

    assert!(outcome.is_failure());
    assert_eq!(
        outcome
            .state()
            .audit()
            .units_with(tsunagi::AuditEvent::RollbackFailed),
        vec!["BrokenCompensation"]
    );
}

#[test]
fn test_manual_rollback_is_idempotent() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut state = State::new();
    tsunagi::run_strict(Box::new(Step::ok("One", &log)), &mut state).unwrap();
    tsunagi::run_strict(Box::new(Step::ok("Two", &log)), &mut state).unwrap();

    state.rollback().unwrap();
    state.rollback().unwrap();

    assert_eq!(
        entries(&log),
        vec!["call One", "call Two", "rollback Two", "rollback One"]
    );
}

#[test]
fn test_audit_trail_serializes() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Organizer::builder("Pipeline")
        .add_unit(Step::ok("Charge", &log))
        .add_unit(Step::failing("Ship", &log))
        .build();

    let outcome = pipeline.invoke(Attributes::new()).unwrap();
    let json = serde_json::to_value(outcome.state().audit()).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "records": [
                { "unit": "Charge", "event": "succeeded" },
                { "unit": "Ship", "event": "failed" },
                { "unit": "Charge", "event": "rolled_back" },
                { "unit": "Pipeline", "event": "failed" },
            ]
        })
    );
    assert_eq!(
        serde_json::to_value(outcome.state().status()).unwrap(),
        serde_json::json!("failure")
    );
}
