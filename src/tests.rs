use super::*;
use futures::channel::oneshot;
use futures::executor::block_on;
use futures::{join, poll};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn form(defaults: Value) -> FormController {
    FormController::new(defaults, FormOptions::default())
}

fn path(input: &str) -> FieldPath {
    FieldPath::parse(input).expect("valid path")
}

#[derive(Default)]
struct ProbeBinding {
    focused: AtomicUsize,
    detached: AtomicUsize,
}

impl FieldBinding for ProbeBinding {
    fn focus(&self) -> bool {
        self.focused.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn detach(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, calmform_derive::FormModel)]
pub struct ProfileForm {
    pub email: String,
    pub age: u32,
}

fn watch_label(event: &WatchEvent) -> String {
    let target = match &event.target {
        WatchTarget::All => "*".to_string(),
        WatchTarget::Path(path) => path.to_string(),
    };
    match &event.value {
        Some(value) => format!("{target}={value}"),
        None => format!("{target}=<none>"),
    }
}

#[test]
fn min_rule_fails_then_passes_after_correction() {
    let form = form(json!({}));
    form.register("age", ValidationOptions::new().required().min(18))
        .expect("register age");

    assert_eq!(block_on(form.set_value_and_validate("age", json!(10))), Ok(false));
    let error = form.error("age").expect("read error").expect("age has an error");
    assert_eq!(error.kind, ErrorKind::Min);
    assert_eq!(error.error_type(), "min");

    assert_eq!(block_on(form.set_value_and_validate("age", json!(20))), Ok(true));
    assert_eq!(form.error("age"), Ok(None));
    assert_eq!(form.errors(), Ok(json!({})));
}

#[test]
fn swap_keeps_row_identity() {
    let form = form(json!({}));
    form.register("contacts", ValidationOptions::new())
        .expect("register contacts");
    let first = form
        .insert("contacts", 0, json!({ "name": "A" }))
        .expect("insert A");
    let second = form
        .insert("contacts", 1, json!({ "name": "B" }))
        .expect("insert B");

    form.swap("contacts", 0, 1).expect("swap rows");

    assert_eq!(
        form.values().map(|values| values["contacts"].clone()),
        Ok(json!([{ "name": "B" }, { "name": "A" }]))
    );
    assert_eq!(form.row_ids("contacts"), Ok(vec![second, first]));
}

#[test]
fn criteria_all_collects_every_named_failure() {
    let form = FormController::new(
        json!({ "email": "someone" }),
        FormOptions {
            criteria_mode: CriteriaMode::All,
            ..FormOptions::default()
        },
    );
    form.register(
        "email",
        ValidationOptions::new()
            .validate_named("format", ValidateRule::sync(|_| "bad format"))
            .validate_named("domain", ValidateRule::sync(|_| "bad domain")),
    )
    .expect("register email");

    assert_eq!(block_on(form.validate_field("email")), Ok(false));
    let error = form
        .error("email")
        .expect("read error")
        .expect("email has an error");
    assert_eq!(error.error_type(), "format");
    assert_eq!(
        error.types,
        BTreeMap::from([
            ("domain".to_string(), Some("bad domain".to_string())),
            ("format".to_string(), Some("bad format".to_string())),
        ])
    );
}

#[test]
fn on_submit_mode_defers_validation_until_submit() {
    let form = form(json!({ "name": "" }));
    form.register("name", ValidationOptions::new().required())
        .expect("register name");

    assert_eq!(block_on(form.handle_change("name", json!(""))), Ok(None));
    assert_eq!(block_on(form.handle_blur("name")), Ok(None));
    assert_eq!(form.errors(), Ok(json!({})));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let outcome = block_on(form.handle_submit(move |_values| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }))
    .expect("submit completes");

    assert!(!outcome.valid);
    assert_eq!(outcome.errors, json!({ "name": { "type": "required" } }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let state = form.form_state();
    assert_eq!(state.submit_count(), Ok(1));
    assert_eq!(state.is_submitted(), Ok(true));
    assert_eq!(state.is_submitting(), Ok(false));
    assert_eq!(form.submit_state(), Ok(SubmitState::Failed));

    assert_eq!(block_on(form.handle_change("name", json!("Ada"))), Ok(Some(true)));
    let counter = calls.clone();
    let outcome = block_on(form.handle_submit(move |values| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            assert_eq!(values, json!({ "name": "Ada" }));
            Ok(())
        }
    }))
    .expect("second submit completes");
    assert!(outcome.valid);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.submit_count(), Ok(2));
    assert_eq!(form.submit_state(), Ok(SubmitState::Succeeded));
}

#[test]
fn on_blur_mode_revalidates_on_change_once_a_field_has_an_error() {
    let form = FormController::new(
        json!({}),
        FormOptions {
            validate_mode: ValidationMode::OnBlur,
            ..FormOptions::default()
        },
    );
    form.register("email", ValidationOptions::new().required())
        .expect("register email");

    assert_eq!(block_on(form.handle_change("email", json!(""))), Ok(None));
    assert_eq!(block_on(form.handle_blur("email")), Ok(Some(false)));
    assert_eq!(
        form.field_meta("email").map(|meta| meta.touched),
        Ok(true)
    );
    assert_eq!(block_on(form.handle_change("email", json!("a@b.c"))), Ok(Some(true)));
    assert_eq!(block_on(form.handle_change("email", json!(""))), Ok(None));
}

#[test]
fn stale_async_round_does_not_overwrite_newer_result() {
    let gates = Arc::new(Mutex::new(VecDeque::<oneshot::Receiver<bool>>::new()));
    let queue = gates.clone();
    let form = form(json!({ "user": "ada" }));
    form.register(
        "user",
        ValidationOptions::new().validate(ValidateRule::future(move |_value| {
            let gate = queue.lock().ok().and_then(|mut queue| queue.pop_front());
            async move {
                let valid = match gate {
                    Some(gate) => gate.await.unwrap_or(false),
                    None => true,
                };
                Ok::<_, String>(valid)
            }
        })),
    )
    .expect("register user");

    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    {
        let mut queue = gates.lock().expect("gate queue");
        queue.push_back(first_rx);
        queue.push_back(second_rx);
    }

    block_on(async {
        let mut first = Box::pin(form.validate_field("user"));
        assert!(poll!(&mut first).is_pending());
        let mut second = Box::pin(form.validate_field("user"));
        assert!(poll!(&mut second).is_pending());
        assert_eq!(form.field_meta("user").map(|meta| meta.validating), Ok(true));

        second_tx.send(false).expect("release newer round");
        assert_eq!(second.await, Ok(false));

        first_tx.send(true).expect("release older round");
        assert_eq!(first.await, Ok(false));
    });

    let error = form.error("user").expect("read error").expect("newest round failed");
    assert_eq!(error.error_type(), "validate");
    assert_eq!(form.field_meta("user").map(|meta| meta.validating), Ok(false));
}

#[test]
fn debounced_async_rule_runs_only_for_latest_round() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let form = FormController::new(
        json!({ "user": "ada" }),
        FormOptions {
            async_debounce: Duration::from_millis(10),
            ..FormOptions::default()
        },
    );
    form.register(
        "user",
        ValidationOptions::new().validate(ValidateRule::future(move |value: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(value.as_str() != Some("taken")) }
        })),
    )
    .expect("register user");

    let (first, second) = block_on(async {
        join!(form.validate_field("user"), form.validate_field("user"))
    });
    assert_eq!(first, Ok(true));
    assert_eq!(second, Ok(true));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_clears_dirty_touched_errors_and_counters() {
    let form = form(json!({ "name": "a" }));
    form.register("name", ValidationOptions::new().required())
        .expect("register name");
    form.set_value("name", json!("b")).expect("set name");
    block_on(form.handle_blur("name")).expect("blur name");
    form.set_error("name", "server", Some("taken".to_string()))
        .expect("manual error");
    block_on(form.handle_submit(|_| async { Ok(()) })).expect("submit");

    let state = form.form_state();
    assert_eq!(state.dirty(), Ok(true));
    assert_eq!(state.touched(), Ok(json!({ "name": true })));

    form.reset(Some(json!({ "name": "z" }))).expect("reset");

    assert_eq!(state.dirty(), Ok(false));
    assert_eq!(state.touched(), Ok(json!({})));
    assert_eq!(state.submit_count(), Ok(0));
    assert_eq!(state.is_valid(), Ok(true));
    assert_eq!(form.errors(), Ok(json!({})));
    assert_eq!(form.values(), Ok(json!({ "name": "z" })));
    assert_eq!(form.submit_state(), Ok(SubmitState::Idle));

    form.set_value("name", json!("y")).expect("edit after reset");
    form.reset(None).expect("reset to baseline");
    assert_eq!(form.values(), Ok(json!({ "name": "z" })));
}

#[test]
fn observed_flags_recompute_eagerly_and_others_lazily() {
    let form = form(json!({ "name": "a" }));
    let state = form.form_state();

    form.set_value("name", json!("b")).expect("set b");
    form.set_value("name", json!("c")).expect("set c");
    assert_eq!(state.recomputations(), Ok(0));

    assert_eq!(state.dirty(), Ok(true));
    assert_eq!(state.recomputations(), Ok(1));

    form.set_value("name", json!("a")).expect("set a");
    assert_eq!(state.recomputations(), Ok(2));
    assert_eq!(state.dirty(), Ok(false));
    assert_eq!(state.recomputations(), Ok(2));
    assert_eq!(state.observed(), Ok(vec![FormStateFlag::Dirty]));

    state.reset_observed().expect("reset observed");
    form.set_value("name", json!("q")).expect("set q");
    assert_eq!(state.recomputations(), Ok(2));
    assert_eq!(state.dirty(), Ok(true));
    assert_eq!(state.recomputations(), Ok(3));
}

#[test]
fn field_array_operations_remap_errors_touched_and_fields() {
    let form = form(json!({ "rows": [{ "name": "a" }, { "name": "" }, { "name": "c" }] }));
    let probe = Arc::new(ProbeBinding::default());
    form.register("rows[0].name", ValidationOptions::new().required())
        .expect("register row 0")
        .attach(probe.clone())
        .expect("attach row 0");
    form.register("rows[1].name", ValidationOptions::new().required())
        .expect("register row 1");
    form.register("rows[2].name", ValidationOptions::new().required())
        .expect("register row 2");

    assert_eq!(block_on(form.validate_form()), Ok(false));
    form.mark_touched("rows[2].name").expect("touch row 2");
    let ids = form.row_ids("rows").expect("row ids");

    assert_eq!(form.remove("rows", 0), Ok(json!({ "name": "a" })));
    assert_eq!(probe.detached.load(Ordering::SeqCst), 1);
    assert!(form.error("rows[0].name").expect("read error").is_some());
    assert_eq!(form.error("rows[1].name"), Ok(None));
    assert_eq!(form.field_meta("rows[1].name").map(|meta| meta.touched), Ok(true));
    assert!(form.field("rows[2].name").expect("read field").is_none());
    assert_eq!(form.row_ids("rows"), Ok(vec![ids[1], ids[2]]));

    form.move_row("rows", 1, 0).expect("move row");
    assert_eq!(
        form.value("rows"),
        Ok(Some(json!([{ "name": "c" }, { "name": "" }])))
    );
    assert!(form.error("rows[1].name").expect("read error").is_some());
    assert_eq!(form.field_meta("rows[0].name").map(|meta| meta.touched), Ok(true));
    assert_eq!(form.row_ids("rows"), Ok(vec![ids[2], ids[1]]));

    assert_eq!(
        form.swap("rows", 0, 5),
        Err(FormError::IndexOutOfRange {
            path: "rows".to_string(),
            index: 5,
            len: 2,
        })
    );
}

type GateQueue = Arc<Mutex<VecDeque<oneshot::Receiver<bool>>>>;

fn gated_rule(gates: GateQueue) -> ValidateRule {
    ValidateRule::future(move |_value| {
        let gate = gates.lock().ok().and_then(|mut queue| queue.pop_front());
        async move {
            let valid = match gate {
                Some(gate) => gate.await.unwrap_or(false),
                None => true,
            };
            Ok::<_, String>(valid)
        }
    })
}

fn push_gate(gates: &GateQueue) -> oneshot::Sender<bool> {
    let (tx, rx) = oneshot::channel();
    gates.lock().expect("gate queue").push_back(rx);
    tx
}

#[test]
fn pending_round_survives_append_to_its_array() {
    let gates = GateQueue::default();
    let form = form(json!({ "rows": [{ "name": "a" }] }));
    form.register("rows[0].name", ValidationOptions::new().validate(gated_rule(gates.clone())))
        .expect("register row 0");
    let release = push_gate(&gates);

    block_on(async {
        let mut pending = Box::pin(form.validate_field("rows[0].name"));
        assert!(poll!(&mut pending).is_pending());
        form.append("rows", json!({ "name": "b" })).expect("append row");
        release.send(false).expect("release round");
        assert_eq!(pending.await, Ok(false));
    });

    let error = form
        .error("rows[0].name")
        .expect("read error")
        .expect("row 0 keeps its failure");
    assert_eq!(error.error_type(), "validate");
    assert_eq!(form.form_state().is_valid(), Ok(false));
    assert_eq!(form.field_meta("rows[0].name").map(|meta| meta.validating), Ok(false));
}

#[test]
fn pending_round_follows_its_row_through_swap() {
    let gates = GateQueue::default();
    let form = form(json!({ "rows": [{ "name": "a" }, { "name": "b" }] }));
    form.register("rows[0].name", ValidationOptions::new().validate(gated_rule(gates.clone())))
        .expect("register row 0");
    form.register("rows[1].name", ValidationOptions::new())
        .expect("register row 1");
    let release = push_gate(&gates);

    block_on(async {
        let mut pending = Box::pin(form.validate_field("rows[0].name"));
        assert!(poll!(&mut pending).is_pending());
        form.swap("rows", 0, 1).expect("swap rows");
        assert_eq!(form.field_meta("rows[1].name").map(|meta| meta.validating), Ok(true));
        assert_eq!(form.field_meta("rows[0].name").map(|meta| meta.validating), Ok(false));
        release.send(false).expect("release round");
        assert_eq!(pending.await, Ok(false));
    });

    assert_eq!(form.error("rows[0].name"), Ok(None));
    let error = form
        .error("rows[1].name")
        .expect("read error")
        .expect("moved row carries the failure");
    assert_eq!(error.error_type(), "validate");
    assert_eq!(form.field_meta("rows[1].name").map(|meta| meta.validating), Ok(false));
}

#[test]
fn pending_round_of_removed_row_is_discarded() {
    let gates = GateQueue::default();
    let form = form(json!({ "rows": [{ "name": "a" }, { "name": "b" }] }));
    form.register("rows[0].name", ValidationOptions::new().validate(gated_rule(gates.clone())))
        .expect("register row 0");
    let release = push_gate(&gates);

    block_on(async {
        let mut pending = Box::pin(form.validate_field("rows[0].name"));
        assert!(poll!(&mut pending).is_pending());
        form.remove("rows", 0).expect("remove row");
        release.send(false).expect("release round");
        assert_eq!(pending.await, Ok(true));
    });

    assert_eq!(form.errors(), Ok(json!({})));
    assert_eq!(form.field_meta("rows[0].name").map(|meta| meta.validating), Ok(false));
}

#[test]
fn insert_clamps_and_replace_issues_fresh_ids() {
    let form = form(json!({ "tags": ["a"] }));
    let prepended = form.prepend("tags", json!("first")).expect("prepend");
    let appended = form.insert("tags", 99, json!("last")).expect("insert clamps");
    assert_eq!(form.value("tags"), Ok(Some(json!(["first", "a", "last"]))));

    let rows = form.rows("tags").expect("rows");
    assert_eq!(rows.first().map(|(id, _)| *id), Some(prepended));
    assert_eq!(rows.last().map(|(id, value)| (*id, value.clone())), Some((appended, json!("last"))));

    let before = form.row_ids("tags").expect("row ids");
    let replaced = form
        .replace("tags", vec![json!("x"), json!("y")])
        .expect("replace rows");
    assert_eq!(replaced.len(), 2);
    assert!(replaced.iter().all(|id| !before.contains(id)));

    form.set_value("tags", json!(["only"])).expect("set array");
    let after_set = form.row_ids("tags").expect("row ids after set");
    assert_eq!(after_set.len(), 1);
    assert!(!replaced.contains(&after_set[0]));
    assert_eq!(
        form.remove_many("tags", &[0, 3]),
        Err(FormError::IndexOutOfRange {
            path: "tags".to_string(),
            index: 3,
            len: 1,
        })
    );
}

#[test]
fn watchers_fire_children_before_parents_and_star_last() {
    let form = form(json!({ "contacts": [] }));
    let log = Arc::new(Mutex::new(Vec::new()));
    let subscribe = |target: &str| {
        let log = log.clone();
        form.subscribe(target, move |event| {
            if let Ok(mut log) = log.lock() {
                log.push(watch_label(event));
            }
        })
        .expect("subscribe")
    };
    let _all = subscribe("*");
    let contacts = subscribe("contacts");
    let _name = subscribe("contacts[0].name");
    let _other = subscribe("title");

    form.set_value("contacts[0].name", json!("A")).expect("set name");
    assert_eq!(
        log.lock().map(|log| log.clone()).unwrap_or_default(),
        vec![
            "contacts[0].name=\"A\"".to_string(),
            "contacts=[{\"name\":\"A\"}]".to_string(),
            "*={\"contacts\":[{\"name\":\"A\"}]}".to_string(),
        ]
    );

    assert_eq!(contacts.unsubscribe(), Ok(true));
    if let Ok(mut log) = log.lock() {
        log.clear();
    }
    form.set_value("contacts[0].name", json!("B")).expect("set name again");
    assert_eq!(
        log.lock().map(|log| log.len()).unwrap_or_default(),
        2
    );
}

#[test]
fn watch_falls_back_to_default_value() {
    let form = form(json!({ "nick": "d" }));
    form.unset_value("nick").expect("unset nick");
    assert_eq!(form.values(), Ok(json!({})));
    assert_eq!(form.watch("nick"), Ok(Some(json!("d"))));
    assert_eq!(form.watch("missing"), Ok(None));
    assert_eq!(form.watch_all(), Ok(json!({})));
}

#[test]
fn unregister_removes_field_state_but_keeps_values() {
    let form = form(json!({ "email": "" }));
    let probe = Arc::new(ProbeBinding::default());
    let setter = form
        .register("email", ValidationOptions::new().required())
        .expect("register email");
    assert_eq!(setter.attach(probe.clone()), Ok(true));
    assert_eq!(setter.attach(probe.clone()), Ok(false));
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _subscription = form
        .subscribe("email", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("subscribe email");

    assert_eq!(block_on(form.validate_field("email")), Ok(false));
    form.mark_touched("email").expect("touch email");

    assert_eq!(form.unregister("email"), Ok(true));
    assert_eq!(form.unregister("email"), Ok(false));
    assert_eq!(probe.detached.load(Ordering::SeqCst), 1);
    assert_eq!(form.error("email"), Ok(None));
    assert_eq!(form.field_meta("email").map(|meta| meta.touched), Ok(false));
    assert_eq!(form.value("email"), Ok(Some(json!(""))));

    form.set_value("email", json!("x")).expect("set email");
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn re_registration_merges_rules_and_keeps_one_field() {
    let form = form(json!({}));
    form.register_many([
        ("age", ValidationOptions::new().required().min(18)),
        ("name", ValidationOptions::new()),
    ])
    .expect("register fields");
    form.register("age", ValidationOptions::new().max(65))
        .expect("re-register age");

    let field = form.field("age").expect("read field").expect("age registered");
    assert!(field.rules().required.is_some());
    assert_eq!(field.rules().min, Some(RuleValue::new(Bound::from(18))));
    assert_eq!(field.rules().max, Some(RuleValue::new(Bound::from(65))));
    assert_eq!(field.order(), 0);
    assert_eq!(form.unregister_many(["age", "name", "ghost"]), Ok(2));
}

#[test]
fn failed_submit_focuses_first_erroring_field_in_registration_order() {
    let form = form(json!({}));
    let first = Arc::new(ProbeBinding::default());
    let second = Arc::new(ProbeBinding::default());
    form.register("first", ValidationOptions::new().required())
        .expect("register first")
        .attach(first.clone())
        .expect("attach first");
    form.register("second", ValidationOptions::new().required())
        .expect("register second")
        .attach_option(second.clone())
        .expect("attach second");

    let outcome = block_on(form.handle_submit(|_| async { Ok(()) })).expect("submit");
    assert!(!outcome.valid);
    assert_eq!(first.focused.load(Ordering::SeqCst), 1);
    assert_eq!(second.focused.load(Ordering::SeqCst), 0);

    form.set_value("first", json!("filled")).expect("fill first");
    block_on(form.handle_submit(|_| async { Ok(()) })).expect("submit again");
    assert_eq!(second.focused.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_submit_is_rejected_while_one_is_in_flight() {
    let form = form(json!({ "name": "ok" }));
    let (release, gate) = oneshot::channel::<()>();

    block_on(async {
        let mut first = Box::pin(form.handle_submit(move |_values| async move {
            gate.await
                .map_err(|_| FormError::SubmitFailed("cancelled".to_string()))
        }));
        assert!(poll!(&mut first).is_pending());
        assert_eq!(form.submit_state(), Ok(SubmitState::Submitting));
        assert_eq!(form.form_state().is_submitting(), Ok(true));

        let second = form.handle_submit(|_| async { Ok(()) }).await;
        assert_eq!(second.map(|outcome| outcome.valid), Err(FormError::AlreadySubmitting));

        release.send(()).expect("release submit");
        let outcome = first.await.expect("first submit completes");
        assert!(outcome.valid);
    });

    assert_eq!(form.submit_state(), Ok(SubmitState::Succeeded));
    assert_eq!(form.form_state().submit_count(), Ok(1));
}

#[test]
fn failing_submit_callback_still_settles_submit_state() {
    let form = form(json!({}));
    let result = block_on(form.handle_submit(|_| async {
        Err(FormError::SubmitFailed("server down".to_string()))
    }));
    assert_eq!(
        result.map(|outcome| outcome.valid),
        Err(FormError::SubmitFailed("server down".to_string()))
    );
    let state = form.form_state();
    assert_eq!(state.is_submitting(), Ok(false));
    assert_eq!(state.is_submitted(), Ok(true));
    assert_eq!(form.submit_state(), Ok(SubmitState::Failed));
}

#[test]
fn schema_validator_replaces_local_rules() {
    let seen_context = Arc::new(Mutex::new(None));
    let recorder = seen_context.clone();
    let form = FormController::with_schema(
        json!({ "name": "" }),
        FormOptions::default(),
        move |values: Value, options: SchemaOptions| {
            if let Ok(mut seen) = recorder.lock() {
                *seen = Some(options.context.clone());
            }
            async move {
                let mut errors = SchemaErrors::new();
                if values["name"].as_str().is_none_or(str::is_empty) {
                    errors.insert(
                        FieldPath::parse("name").expect("valid path"),
                        FieldError::new(ErrorKind::Required).with_message("name please"),
                    );
                }
                Ok::<_, String>(errors)
            }
        },
        SchemaOptions {
            context: json!({ "locale": "en" }),
            ..SchemaOptions::default()
        },
    );
    form.register("name", ValidationOptions::new().min_length(50))
        .expect("register name");

    assert_eq!(block_on(form.validate_form()), Ok(false));
    assert_eq!(
        form.errors(),
        Ok(json!({ "name": { "type": "required", "message": "name please" } }))
    );
    assert_eq!(
        seen_context.lock().map(|seen| seen.clone()).unwrap_or_default(),
        Some(json!({ "locale": "en" }))
    );

    assert_eq!(block_on(form.set_value_and_validate("name", json!("Ada"))), Ok(true));
    assert_eq!(form.errors(), Ok(json!({})));
}

#[test]
fn failing_schema_validator_becomes_form_level_error() {
    let form = FormController::with_schema(
        json!({}),
        FormOptions::default(),
        |_values: Value, _options: SchemaOptions| async { Err::<SchemaErrors, _>("boom") },
        SchemaOptions::default(),
    );

    assert_eq!(block_on(form.trigger_validation(Vec::<&str>::new())), Ok(false));
    let error = form.form_error().expect("read form error").expect("form error set");
    assert_eq!(error.error_type(), "schema");
    assert_eq!(error.message.as_deref(), Some("boom"));
    assert_eq!(form.form_state().is_valid(), Ok(false));
}

#[test]
fn manual_errors_are_flagged_and_cleared_by_subtree() {
    let form = form(json!({}));
    form.set_error("rows[0].name", "server", Some("taken".to_string()))
        .expect("set row 0");
    form.set_error("rows[1].name", "server", None)
        .expect("set row 1");
    form.set_error("title", "server", None).expect("set title");

    assert_eq!(
        form.errors().map(|errors| errors["rows"][0]["name"].clone()),
        Ok(json!({ "type": "server", "message": "taken", "isManual": true }))
    );
    assert_eq!(form.clear_errors(["rows"]), Ok(2));
    assert!(form.error("title").expect("read title").is_some_and(|error| error.manual));
    form.clear_all_errors().expect("clear all");
    assert_eq!(form.form_state().is_valid(), Ok(true));
}

#[test]
fn parent_error_is_projected_without_nested_child_errors() {
    let form = form(json!({ "address": { "zip": "" } }));
    form.set_error("address", "server", Some("bad address".to_string()))
        .expect("set address");
    form.set_error("address.zip", "required", None)
        .expect("set zip");

    assert_eq!(
        form.errors(),
        Ok(json!({
            "address": { "type": "server", "message": "bad address", "isManual": true }
        }))
    );
    assert!(form.error("address.zip").expect("read zip").is_some());

    form.clear_errors(["address"]).expect("clear address subtree");
    assert_eq!(form.errors(), Ok(json!({})));
}

#[test]
fn dirty_fields_and_meta_compare_against_defaults() {
    let form = form(json!({ "a": 1, "b": 2 }));
    form.register_many([("a", ValidationOptions::new()), ("b", ValidationOptions::new())])
        .expect("register fields");

    form.set_value("a", json!(5)).expect("set a");
    assert_eq!(form.dirty_fields(), Ok(vec![path("a")]));
    assert_eq!(
        form.field_meta("a"),
        Ok(FieldMeta {
            dirty: true,
            touched: false,
            validating: false,
            error: None,
        })
    );

    form.set_value("a", json!(1.0)).expect("restore a");
    assert_eq!(form.dirty_fields(), Ok(vec![]));
}

#[test]
fn flat_values_stop_at_registered_containers() {
    let form = form(json!({ "user": { "name": "a", "tags": ["x", "y"] } }));
    form.register("user.tags", ValidationOptions::new())
        .expect("register tags");

    let flat = form.flat_values().expect("flatten");
    assert_eq!(flat.get("user.name"), Some(&json!("a")));
    assert_eq!(flat.get("user.tags"), Some(&json!(["x", "y"])));
    assert_eq!(flat.len(), 2);
}

#[test]
fn malformed_paths_are_rejected_before_any_mutation() {
    let form = form(json!({}));
    assert!(matches!(
        form.set_value("", json!(1)),
        Err(FormError::InvalidPath { .. })
    ));
    assert!(matches!(
        form.register("rows[x", ValidationOptions::new()),
        Err(FormError::InvalidPath { .. })
    ));
    assert_eq!(form.values(), Ok(json!({})));
}

#[test]
fn typed_lenses_round_trip_through_serde() {
    let form = FormController::from_model(
        &ProfileForm {
            email: "ada@calm.form".to_string(),
            age: 36,
        },
        FormOptions::default(),
    )
    .expect("form from model");
    let fields = ProfileForm::fields();
    form.register_field(fields.age(), ValidationOptions::new().min(18))
        .expect("register age");

    assert_eq!(block_on(form.set_field_and_validate(fields.age(), 12)), Ok(false));
    assert_eq!(form.field_value(fields.age()), Ok(Some(12)));
    assert_eq!(fields.email().name(), "email");

    form.set_value("email", json!(42)).expect("set wrong type");
    assert!(matches!(
        form.field_value(fields.email()),
        Err(FormError::Serialization(_))
    ));

    form.reset(None).expect("reset");
    assert_eq!(
        form.model::<ProfileForm>(),
        Ok(ProfileForm {
            email: "ada@calm.form".to_string(),
            age: 36,
        })
    );
    assert_eq!(form.default_model::<ProfileForm>().map(|model| model.age), Ok(36));
}

#[test]
fn form_ids_are_unique_per_instance() {
    let first = form(json!({}));
    let second = form(json!({}));
    assert_ne!(first.form_id(), second.form_id());
    assert_eq!(first.clone().form_id(), first.form_id());
}
