use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use script::{
    Bindings, Capability, CapabilitySet, HostCallContext, HostError, HostFunctionRegistry,
    Sandbox, SandboxConfig, SandboxError,
};
use serde_json::{Value, json};

const LIMIT: Duration = Duration::from_secs(1);

fn sandbox() -> Sandbox {
    Sandbox::new(SandboxConfig::default())
}

async fn eval(script: &str, bindings: Bindings) -> Result<Value, SandboxError> {
    sandbox()
        .evaluate(bindings, script, &CapabilitySet::read_only(), LIMIT)
        .await
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn counting_registry(counter: Arc<AtomicUsize>) -> Arc<HostFunctionRegistry> {
    let mut registry = HostFunctionRegistry::new();
    registry.register(
        "callMicroservice",
        Capability::CallMicroservice,
        3,
        move |_: &HostCallContext, args: Vec<Value>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"called": args}))
        },
    );
    Arc::new(registry)
}

#[tokio::test]
async fn output_adaptation_script_wraps_connector_result() {
    let bindings = Bindings::new()
        .with_value("output", json!({"result": "hello"}))
        .with_value("input", json!({}));
    let value = eval("out({payload:{value: output.result}})", bindings)
        .await
        .expect("script should run");
    assert_eq!(value, json!({"payload": {"value": "hello"}}));
}

#[tokio::test]
async fn json_text_bindings_are_parsed_before_running() {
    let bindings = Bindings::new().with_json_text("output", r#"{"items":[1,2,3]}"#);
    let value = eval("out(len(output.items))", bindings)
        .await
        .expect("script should run");
    assert_eq!(value, json!(3));

    let bad = Bindings::new().with_json_text("output", "{not json");
    let err = eval("out(output)", bad).await.expect_err("bad json");
    match err {
        SandboxError::Script(message) => assert!(message.contains("binding 'output'")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn result_prefers_last_out_then_return_then_null() {
    let value = eval("out(1); out(2); return 3;", Bindings::new())
        .await
        .expect("runs");
    assert_eq!(value, json!(2));

    let value = eval("let x = 40; return x + 2;", Bindings::new())
        .await
        .expect("runs");
    assert_eq!(value, json!(42));

    let value = eval("let x = 1;", Bindings::new()).await.expect("runs");
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn loops_and_mutation_build_documents() {
    let script = r#"
        let totals = {count: 0, names: []};
        for (const item of input.items) {
            if (item.skip) { continue; }
            if (item.name == "stop") { break; }
            totals.count += item.qty;
            totals.names[len(totals.names)] = item.name;
        }
        let i = 0;
        while (i < 3) { i = i + 1; }
        totals.loops = i;
        totals.label = "n=" + str(totals.count);
        out(totals);
    "#;
    let bindings = Bindings::new().with_value(
        "input",
        json!({"items": [
            {"name": "a", "qty": 2},
            {"name": "b", "qty": 5, "skip": true},
            {"name": "c", "qty": 1.5},
            {"name": "stop", "qty": 100},
            {"name": "d", "qty": 7}
        ]}),
    );
    let value = eval(script, bindings).await.expect("runs");
    assert_eq!(
        value,
        json!({"count": 3.5, "names": ["a", "c"], "loops": 3, "label": "n=3.5"})
    );
}

#[tokio::test]
async fn json_builtins_round_trip_text() {
    let script = r#"
        let doc = JSON.parse(raw);
        doc.seen = true;
        out(JSON.stringify(doc));
    "#;
    let bindings = Bindings::new().with_value("raw", json!("{\"a\":1}"));
    let value = eval(script, bindings).await.expect("runs");
    assert_eq!(value, json!("{\"a\":1,\"seen\":true}"));
}

#[tokio::test]
async fn runtime_errors_report_script_line() {
    let err = eval("let a = null;\nlet b = a.missing;", Bindings::new())
        .await
        .expect_err("null access");
    assert_eq!(
        err,
        SandboxError::Script("line 2: cannot read property 'missing' of null".to_string())
    );

    let err = eval("let a = 1;\n\nlet b = ;", Bindings::new())
        .await
        .expect_err("parse error");
    match err {
        SandboxError::Script(message) => assert!(message.starts_with("line 3:"), "{message}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn infinite_loop_times_out_and_sandbox_is_reusable() {
    let sandbox = sandbox();
    let started = Instant::now();
    let err = sandbox
        .evaluate(
            Bindings::new(),
            "while (true) {}",
            &CapabilitySet::read_only(),
            Duration::from_secs(1),
        )
        .await
        .expect_err("loop should time out");
    assert_eq!(
        err,
        SandboxError::TimedOut {
            limit: Duration::from_secs(1)
        }
    );
    assert!(started.elapsed() <= Duration::from_secs(2));

    let value = sandbox
        .evaluate(
            Bindings::new(),
            "out('still alive')",
            &CapabilitySet::read_only(),
            Duration::from_secs(1),
        )
        .await
        .expect("sandbox should be reusable");
    assert_eq!(value, json!("still alive"));
}

#[tokio::test]
async fn step_budget_stops_runaway_script() {
    let sandbox = Sandbox::new(SandboxConfig {
        max_steps: 1_000,
        ..SandboxConfig::default()
    });
    let err = sandbox
        .evaluate(
            Bindings::new(),
            "let n = 0;\nwhile (true) { n += 1; }",
            &CapabilitySet::read_only(),
            Duration::from_secs(5),
        )
        .await
        .expect_err("budget exhausted");
    match err {
        SandboxError::Script(message) => assert!(message.contains("step budget of 1000")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn denied_globals_are_rejected_before_any_statement_runs() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(counter.clone());
    for name in script::denied_globals() {
        let script = format!("callMicroservice('a', 'b', {{}});\n{name}(1);");
        let err = sandbox()
            .evaluate_with_host(
                Bindings::new(),
                &script,
                &CapabilitySet::cross_call(),
                registry.clone(),
                LIMIT,
            )
            .await
            .expect_err("denied name");
        assert_eq!(err, SandboxError::CapabilityDenied(name.to_string()));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn host_functions_require_their_capability() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(counter.clone());

    let err = sandbox()
        .evaluate_with_host(
            Bindings::new(),
            "out(callMicroservice('ms', 'op', {}))",
            &CapabilitySet::read_only(),
            registry.clone(),
            LIMIT,
        )
        .await
        .expect_err("read-only denies host calls");
    assert_eq!(
        err,
        SandboxError::CapabilityDenied("callMicroservice".to_string())
    );
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let caps = CapabilitySet::read_only().with(Capability::CallMicroservice);
    let value = sandbox()
        .evaluate_with_host(
            Bindings::new(),
            "out(callMicroservice('ms', 'op', {x: 1}))",
            &caps,
            registry,
            LIMIT,
        )
        .await
        .expect("granted host call");
    assert_eq!(value, json!({"called": ["ms", "op", {"x": 1}]}));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gated_names_without_registration_are_still_denied() {
    let err = eval("callSyncConnector({})", Bindings::new())
        .await
        .expect_err("not granted");
    assert_eq!(
        err,
        SandboxError::CapabilityDenied("callSyncConnector".to_string())
    );
}

#[tokio::test]
async fn host_call_arity_is_checked_statically() {
    let counter = Arc::new(AtomicUsize::new(0));
    let err = sandbox()
        .evaluate_with_host(
            Bindings::new(),
            "callMicroservice('ms')",
            &CapabilitySet::cross_call(),
            counting_registry(counter.clone()),
            LIMIT,
        )
        .await
        .expect_err("arity mismatch");
    assert_eq!(
        err,
        SandboxError::Script("line 1: callMicroservice expects 3 argument(s), got 1".to_string())
    );
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn host_futures_run_on_the_runtime() {
    let mut registry = HostFunctionRegistry::new();
    registry.register(
        "callSyncConnector",
        Capability::CallSyncConnector,
        1,
        |ctx: &HostCallContext, mut args: Vec<Value>| {
            let request = args.pop().unwrap_or(Value::Null);
            ctx.block_on(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                json!({"echo": request})
            })
        },
    );
    let value = sandbox()
        .evaluate_with_host(
            Bindings::new(),
            "let r = callSyncConnector({connectorId: 'cmd'});\nout(r.echo.connectorId)",
            &CapabilitySet::cross_call(),
            Arc::new(registry),
            LIMIT,
        )
        .await
        .expect("host call succeeds");
    assert_eq!(value, json!("cmd"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_host_call_becomes_script_error() {
    let mut registry = HostFunctionRegistry::new();
    registry.register(
        "callMicroservice",
        Capability::CallMicroservice,
        3,
        |_: &HostCallContext, _: Vec<Value>| Err(HostError::Failed("not started".to_string())),
    );
    let err = sandbox()
        .evaluate_with_host(
            Bindings::new(),
            "\ncallMicroservice('ms', 'op', {})",
            &CapabilitySet::cross_call(),
            Arc::new(registry),
            LIMIT,
        )
        .await
        .expect_err("host failure");
    assert_eq!(
        err,
        SandboxError::Script("line 2: callMicroservice failed: not started".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_host_future_is_dropped_on_timeout() {
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = dropped.clone();
    let mut registry = HostFunctionRegistry::new();
    registry.register(
        "callMicroservice",
        Capability::CallMicroservice,
        3,
        move |ctx: &HostCallContext, _: Vec<Value>| {
            let guard = SetOnDrop(flag.clone());
            ctx.block_on(async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(30)).await;
                Value::Null
            })
        },
    );

    let started = Instant::now();
    let err = sandbox()
        .evaluate_with_host(
            Bindings::new(),
            "out(callMicroservice('slow', 'op', {}))",
            &CapabilitySet::cross_call(),
            Arc::new(registry),
            Duration::from_millis(200),
        )
        .await
        .expect_err("should time out");
    assert!(matches!(err, SandboxError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));

    for _ in 0..100 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped.load(Ordering::SeqCst), "host future should be dropped");
}

#[tokio::test]
async fn doubling_a_string_hits_the_size_limit() {
    let sandbox = Sandbox::new(SandboxConfig {
        max_value_bytes: 1 << 20,
        ..SandboxConfig::default()
    });
    let started = Instant::now();
    let err = sandbox
        .evaluate(
            Bindings::new(),
            "let s = 'xxxxxxxx';\nlet i = 0;\nwhile (i < 27) { s = s + s; i = i + 1; }\nreturn len(s);",
            &CapabilitySet::read_only(),
            Duration::from_secs(5),
        )
        .await
        .expect_err("string outgrows the limit");
    assert_eq!(
        err,
        SandboxError::Script("line 3: value exceeds size limit of 1048576 bytes".to_string())
    );
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn appending_to_collections_counts_against_the_size_limit() {
    let sandbox = Sandbox::new(SandboxConfig {
        max_value_bytes: 64 * 1024,
        ..SandboxConfig::default()
    });
    let script = r#"
        let chunk = "x";
        let i = 0;
        while (i < 10) { chunk = chunk + chunk; i += 1; }
        let parts = [];
        while (true) { parts[len(parts)] = chunk; }
    "#;
    let err = sandbox
        .evaluate(Bindings::new(), script, &CapabilitySet::read_only(), LIMIT)
        .await
        .expect_err("array outgrows the limit");
    match err {
        SandboxError::Script(message) => {
            assert!(message.contains("exceeds size limit of 65536 bytes"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let value = sandbox
        .evaluate(
            Bindings::new(),
            "let o = {n: 0};\nlet i = 0;\nwhile (i < 20000) { o.n = o.n + 1; i += 1; }\nout(o.n);",
            &CapabilitySet::read_only(),
            Duration::from_secs(5),
        )
        .await
        .expect("overwriting in place does not accumulate");
    assert_eq!(value, json!(20000));

    let err = sandbox
        .evaluate(
            Bindings::new().with_value("raw", json!("x".repeat(70 * 1024))),
            "out(JSON.stringify(raw));",
            &CapabilitySet::read_only(),
            LIMIT,
        )
        .await
        .expect_err("stringified text outgrows the limit");
    assert!(matches!(err, SandboxError::Script(ref message) if message.contains("size limit")));
}

const RECURSIVE: &str = "return callMicroservice('ms', 'op', {});";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_host_evaluations_stop_at_call_depth_limit() {
    let sandbox = Sandbox::new(SandboxConfig {
        max_call_depth: 3,
        ..SandboxConfig::default()
    });
    let deepest = Arc::new(AtomicUsize::new(0));
    let shared: Arc<OnceLock<Arc<HostFunctionRegistry>>> = Arc::new(OnceLock::new());

    let mut registry = HostFunctionRegistry::new();
    {
        let sandbox = sandbox.clone();
        let deepest = deepest.clone();
        let shared = shared.clone();
        registry.register(
            "callMicroservice",
            Capability::CallMicroservice,
            3,
            move |ctx: &HostCallContext, _: Vec<Value>| {
                deepest.fetch_max(ctx.depth(), Ordering::SeqCst);
                let registry = shared
                    .get()
                    .cloned()
                    .ok_or_else(|| HostError::Failed("registry not ready".to_string()))?;
                ctx.block_on(sandbox.evaluate_with_host(
                    Bindings::new(),
                    RECURSIVE,
                    &CapabilitySet::cross_call(),
                    registry,
                    LIMIT,
                ))?
                .map_err(|err| HostError::Failed(err.to_string()))
            },
        );
    }
    let registry = Arc::new(registry);
    assert!(shared.set(registry.clone()).is_ok());

    let err = sandbox
        .evaluate_with_host(
            Bindings::new(),
            RECURSIVE,
            &CapabilitySet::cross_call(),
            registry,
            LIMIT,
        )
        .await
        .expect_err("recursion is cut off");
    match err {
        SandboxError::Script(message) => {
            assert!(message.contains("exceed depth limit of 3"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(deepest.load(Ordering::SeqCst), 3);
}
