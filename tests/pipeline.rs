use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use llm_chains::callback::{ChainStartInput, RecordingHandler};
use llm_chains::chain::{Sequential, SequentialOptions, Transform};
use llm_chains::events::CallbackEvent;
use llm_chains::{
    batch_call, call, run, BatchCallOptions, CallOptions, Callback, CallbackOptions, Chain,
    ChainValues, Error, ExecutionContext, Memory, Result, RunInfo, RunOptions,
};

/// Counts every invocation of the chain it wraps.
struct Counted {
    calls: AtomicUsize,
    input_keys: Vec<String>,
    output_keys: Vec<String>,
    memory: Option<Arc<dyn Memory>>,
}

impl Counted {
    fn new(input_keys: &[&str], output_keys: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            input_keys: input_keys.iter().map(|k| k.to_string()).collect(),
            output_keys: output_keys.iter().map(|k| k.to_string()).collect(),
            memory: None,
        }
    }

    fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Chain for Counted {
    async fn call(&self, _ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = self
            .input_keys
            .first()
            .map(|k| inputs.get_string(k))
            .transpose()?
            .unwrap_or_default();
        if first == "fail" {
            return Err(Error::Execution("asked to fail".into()));
        }

        Ok(self
            .output_keys
            .iter()
            .map(|k| (k.clone(), format!("{k}({first})")))
            .collect())
    }

    fn chain_type(&self) -> &str {
        "Counted"
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.memory.clone()
    }

    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        self.output_keys.clone()
    }
}

/// Memory that counts saves and clears.
#[derive(Default)]
struct CountingMemory {
    saves: AtomicUsize,
    clears: AtomicUsize,
}

#[async_trait]
impl Memory for CountingMemory {
    fn memory_keys(&self) -> Vec<String> {
        vec!["context".into()]
    }

    async fn load(&self, _inputs: &ChainValues) -> Result<HashMap<String, Value>> {
        Ok(HashMap::from([("context".to_string(), json!("remembered"))]))
    }

    async fn save(&self, _inputs: &ChainValues, _outputs: &ChainValues) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails one kind of chain event, optionally raising.
struct Vetoing {
    event: &'static str,
    raise: bool,
}

impl Vetoing {
    fn start(raise: bool) -> Self {
        Self { event: "chain_start", raise }
    }

    fn on(event: &'static str) -> Self {
        Self { event, raise: true }
    }

    fn veto(&self, event: &str) -> Result<()> {
        if event == self.event {
            return Err(Error::callback("vetoing", format!("not on {event}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Callback for Vetoing {
    fn name(&self) -> &str {
        "vetoing"
    }

    fn always_verbose(&self) -> bool {
        true
    }

    fn raise_error(&self) -> bool {
        self.raise
    }

    async fn on_chain_start(&self, _run: RunInfo, _input: &ChainStartInput) -> Result<()> {
        self.veto("chain_start")
    }

    async fn on_chain_end(&self, _run: RunInfo, _outputs: &ChainValues) -> Result<()> {
        self.veto("chain_end")
    }

    async fn on_chain_error(&self, _run: RunInfo, _error: &Error) -> Result<()> {
        self.veto("chain_error")
    }
}

fn kinds(recorder: &RecordingHandler) -> Vec<&'static str> {
    recorder.entries().iter().map(|e| e.event.kind()).collect()
}

#[tokio::test]
async fn successful_call_notifies_start_and_end_once() {
    let recorder = Arc::new(RecordingHandler::new());
    let chain = Counted::new(&["in"], &["out"]);

    call(
        &ExecutionContext::new(),
        &chain,
        ChainValues::from([("in", "a")]),
        CallOptions::new().with_callback(recorder.clone()),
    )
    .await
    .unwrap();

    assert_eq!(kinds(&recorder), vec!["chain_start", "chain_end"]);
    assert_eq!(chain.calls(), 1);
}

#[tokio::test]
async fn failing_call_notifies_error_and_never_end() {
    let recorder = Arc::new(RecordingHandler::new());
    let chain = Counted::new(&["in"], &["out"]);

    let err = call(
        &ExecutionContext::new(),
        &chain,
        ChainValues::from([("in", "fail")]),
        CallOptions::new().with_callback(recorder.clone()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Execution(_)));
    assert_eq!(kinds(&recorder), vec!["chain_start", "chain_error"]);
}

#[tokio::test]
async fn raising_observer_vetoes_the_call() {
    let recorder = Arc::new(RecordingHandler::new());
    let chain = Counted::new(&["in"], &["out"]);
    let opts = CallOptions::new()
        .with_callback(Arc::new(Vetoing::start(true)))
        .with_callback(recorder.clone());

    let err = call(
        &ExecutionContext::new(),
        &chain,
        ChainValues::from([("in", "a")]),
        opts,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Callback { ref handler, .. } if handler == "vetoing"));
    assert!(recorder.entries().is_empty());
    assert_eq!(chain.calls(), 0);
}

#[tokio::test]
async fn non_raising_observer_failure_is_ignored() {
    let recorder = Arc::new(RecordingHandler::new());
    let chain = Counted::new(&["in"], &["out"]);
    let opts = CallOptions::new()
        .with_callback(Arc::new(Vetoing::start(false)))
        .with_callback(recorder.clone());

    call(
        &ExecutionContext::new(),
        &chain,
        ChainValues::from([("in", "a")]),
        opts,
    )
    .await
    .unwrap();

    assert_eq!(kinds(&recorder), vec!["chain_start", "chain_end"]);
}

#[tokio::test]
async fn failing_error_notification_replaces_execution_error() {
    let chain = Counted::new(&["in"], &["out"]);
    let opts = CallOptions::new().with_callback(Arc::new(Vetoing::on("chain_error")));

    let err = call(
        &ExecutionContext::new(),
        &chain,
        ChainValues::from([("in", "fail")]),
        opts,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Callback { ref message, .. } if message.contains("chain_error")));
    assert_eq!(chain.calls(), 1);
}

#[tokio::test]
async fn failing_end_notification_fails_after_memory_save() {
    let memory = Arc::new(CountingMemory::default());
    let chain = Counted::new(&["in", "context"], &["out"]).with_memory(memory.clone());
    let opts = CallOptions::new().with_callback(Arc::new(Vetoing::on("chain_end")));

    let err = call(
        &ExecutionContext::new(),
        &chain,
        ChainValues::from([("in", "a")]),
        opts,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Callback { ref message, .. } if message.contains("chain_end")));
    assert_eq!(chain.calls(), 1);
    assert_eq!(memory.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn observer_on_composite_sees_inner_runs() {
    let recorder = Arc::new(RecordingHandler::new());
    let inner: Arc<dyn Chain> = Arc::new(Counted::new(&["in"], &["out"]));
    let seq = Sequential::new(
        vec![inner],
        ["in"],
        SequentialOptions::new()
            .with_callback_options(CallbackOptions::new().with_callback(recorder.clone())),
    )
    .unwrap();

    call(
        &ExecutionContext::new(),
        &seq,
        ChainValues::from([("in", "a")]),
        CallOptions::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        kinds(&recorder),
        vec!["chain_start", "chain_start", "chain_end", "chain_end"]
    );
}

#[tokio::test]
async fn memory_is_saved_only_after_success() {
    let memory = Arc::new(CountingMemory::default());
    let chain = Counted::new(&["in", "context"], &["out"]).with_memory(memory.clone());
    let ctx = ExecutionContext::new();

    let out = run(&ctx, &chain, "a", RunOptions::new()).await.unwrap();
    assert_eq!(out, "out(a)");
    assert_eq!(memory.saves.load(Ordering::SeqCst), 1);

    run(&ctx, &chain, "fail", RunOptions::new()).await.unwrap_err();
    assert_eq!(memory.saves.load(Ordering::SeqCst), 1);
    assert_eq!(memory.clears.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_call_stops_at_first_failure() {
    let chain = Counted::new(&["in"], &["out"]);
    let inputs = vec![
        ChainValues::from([("in", "a")]),
        ChainValues::from([("in", "fail")]),
        ChainValues::from([("in", "c")]),
    ];

    let err = batch_call(&ExecutionContext::new(), &chain, inputs, BatchCallOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Execution(_)));
    assert_eq!(chain.calls(), 2);
}

#[tokio::test]
async fn sequential_scenario_returns_last_outputs() {
    let s1: Arc<dyn Chain> = Arc::new(Counted::new(&["in1", "in2"], &["out1", "out2"]));
    let s2: Arc<dyn Chain> = Arc::new(Counted::new(&["out1", "out2"], &["out3", "out4"]));

    let seq = Sequential::new(vec![s1, s2], ["in1", "in2"], SequentialOptions::new()).unwrap();
    let out = call(
        &ExecutionContext::new(),
        &seq,
        ChainValues::from([("in1", "a"), ("in2", "b")]),
        CallOptions::new(),
    )
    .await
    .unwrap();

    let mut keys: Vec<&String> = out.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["out3", "out4"]);
    assert_eq!(out.get_string("out3").unwrap(), "out3(out1(a))");
}

#[tokio::test]
async fn sequential_rejects_redeclared_output() {
    let s1: Arc<dyn Chain> = Arc::new(Counted::new(&["in"], &["mid"]));
    let s2: Arc<dyn Chain> = Arc::new(Counted::new(&["mid"], &["mid"]));

    let err = Sequential::new(vec![s1, s2], ["in"], SequentialOptions::new())
        .err()
        .unwrap();
    assert!(matches!(err, Error::OverlappingOutputKeys(_)));
}

#[tokio::test]
async fn run_with_two_outputs_fails_before_execution() {
    let recorder = Arc::new(RecordingHandler::new());
    let chain = Counted::new(&["in"], &["a", "b"]);

    let err = run(
        &ExecutionContext::new(),
        &chain,
        "x",
        RunOptions::new().with_callback(recorder.clone()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::MultipleOutputsInRun(2)));
    assert_eq!(chain.calls(), 0);
    assert!(recorder.entries().is_empty());
}

#[tokio::test]
async fn nested_runs_form_a_tree() {
    let recorder = Arc::new(RecordingHandler::new());
    let inner: Arc<dyn Chain> = Arc::new(Counted::new(&["in"], &["out"]));
    let outer = Transform::new(["in"], ["out"], move |ctx: ExecutionContext, inputs| {
        let inner = inner.clone();
        async move { call(&ctx, &inner, inputs, CallOptions::new()).await }
    });

    call(
        &ExecutionContext::new(),
        &outer,
        ChainValues::from([("in", "a")]),
        CallOptions::new().with_callback(recorder.clone()),
    )
    .await
    .unwrap();

    let entries = recorder.entries();
    let events: Vec<(&str, bool)> = entries
        .iter()
        .map(|e| (e.event.kind(), e.parent_run_id.is_some()))
        .collect();
    assert_eq!(
        events,
        vec![
            ("chain_start", false),
            ("chain_start", true),
            ("chain_end", true),
            ("chain_end", false),
        ]
    );
    assert_eq!(entries[1].parent_run_id, Some(entries[0].run_id));
    assert!(matches!(
        &entries[2].event,
        CallbackEvent::ChainEnd { outputs } if outputs.get_string("out").unwrap() == "out(a)"
    ));
}

#[tokio::test]
async fn concurrent_invocations_do_not_share_runs() {
    let recorder = Arc::new(RecordingHandler::new());
    let chain = Arc::new(Counted::new(&["in"], &["out"]));

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|input| {
            let chain = chain.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move {
                call(
                    &ExecutionContext::new(),
                    &chain,
                    ChainValues::from([("in", input)]),
                    CallOptions::new().with_callback(recorder),
                )
                .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entries = recorder.entries();
    assert_eq!(entries.len(), 6);
    let mut run_ids: Vec<_> = entries.iter().map(|e| e.run_id).collect();
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 3);
    assert_eq!(chain.calls(), 3);
}
