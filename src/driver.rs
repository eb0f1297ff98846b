//! Entry points that invoke a chain under callbacks and memory.
//!
//! [`call`] is the core: it notifies `on_chain_start`, loads memory, runs
//! the chain, saves memory on success and closes the run with exactly one
//! of `on_chain_end` or `on_chain_error`. [`run`], [`batch_call`],
//! [`apply`] and [`batch_call_settled`] are built on top of it.
//!
//! When the context already carries a chain run manager (the chain is being
//! invoked from inside another chain), the new run is attributed to that
//! parent and every observer active on the parent sees it too.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::callback::{Callback, CallbackManager, ManagerOptions};
use crate::chain::Chain;
use crate::{ChainValues, Error, ExecutionContext, Result};

/// Key under which [`CallOptions::include_run_info`] stores the run identity.
pub const RUN_INFO_KEY: &str = "run_info";

/// Options for [`call`].
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Call-scoped observers, inherited by nested runs.
    pub callbacks: Vec<Arc<dyn Callback>>,
    /// Add `"run_info": {"run_id": ...}` to the outputs.
    pub include_run_info: bool,
    /// Stop words for this call and everything nested under it.
    pub stop: Option<Vec<String>>,
}

impl CallOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Vec<Arc<dyn Callback>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    #[must_use]
    pub fn with_run_info(mut self, include: bool) -> Self {
        self.include_run_info = include;
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Options for [`run`].
#[derive(Clone, Default)]
pub struct RunOptions {
    pub callbacks: Vec<Arc<dyn Callback>>,
    pub stop: Option<Vec<String>>,
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl From<RunOptions> for CallOptions {
    fn from(opts: RunOptions) -> Self {
        Self {
            callbacks: opts.callbacks,
            include_run_info: false,
            stop: opts.stop,
        }
    }
}

/// Options for [`batch_call`] and [`batch_call_settled`], applied to every item.
#[derive(Clone, Default)]
pub struct BatchCallOptions {
    pub callbacks: Vec<Arc<dyn Callback>>,
    pub include_run_info: bool,
    pub stop: Option<Vec<String>>,
}

impl BatchCallOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_run_info(mut self, include: bool) -> Self {
        self.include_run_info = include;
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl From<&BatchCallOptions> for CallOptions {
    fn from(opts: &BatchCallOptions) -> Self {
        Self {
            callbacks: opts.callbacks.clone(),
            include_run_info: opts.include_run_info,
            stop: opts.stop.clone(),
        }
    }
}

fn callback_manager<C>(ctx: &ExecutionContext, chain: &C, callbacks: Vec<Arc<dyn Callback>>) -> CallbackManager
where
    C: Chain + ?Sized,
{
    match ctx.run_manager() {
        // The parent's effective set stays visible to the nested run; only
        // its inheritable set is handed on as inheritable.
        Some(parent) => {
            let mut inheritable = parent.inheritable_callbacks().to_vec();
            inheritable.extend(callbacks);
            let mut local = parent.handlers().to_vec();
            local.extend(chain.callbacks());
            CallbackManager::new(
                inheritable,
                local,
                parent.verbose() || chain.verbose(),
                ManagerOptions::child_of(parent.run_id()),
            )
        }
        None => CallbackManager::new(
            callbacks,
            chain.callbacks(),
            chain.verbose(),
            ManagerOptions::default(),
        ),
    }
}

/// Input keys the caller must supply, i.e. those not provided by the
/// chain's own memory.
pub(crate) fn caller_input_keys<C>(chain: &C) -> Vec<String>
where
    C: Chain + ?Sized,
{
    let memory_keys = chain.memory().map(|m| m.memory_keys()).unwrap_or_default();
    chain
        .input_keys()
        .into_iter()
        .filter(|k| !memory_keys.contains(k))
        .collect()
}

/// Merge memory variables into the caller's inputs.
///
/// A memory may not replace a value the caller supplied.
fn merge_memory(
    mut inputs: ChainValues,
    vars: impl IntoIterator<Item = (String, Value)>,
) -> Result<ChainValues> {
    let mut collisions = Vec::new();
    for (key, value) in vars {
        if inputs.contains_key(&key) {
            collisions.push(key);
        } else {
            inputs.insert(key, value);
        }
    }

    if !collisions.is_empty() {
        collisions.sort();
        return Err(Error::MemoryKeyCollision(collisions));
    }
    Ok(inputs)
}

/// Memory load, execution and memory save of one run.
async fn execute<C>(ctx: &ExecutionContext, chain: &C, inputs: ChainValues) -> Result<ChainValues>
where
    C: Chain + ?Sized,
{
    let Some(memory) = chain.memory() else {
        return chain.call(ctx, inputs).await;
    };

    let vars = memory.load(&inputs).await?;
    let inputs = merge_memory(inputs, vars)?;
    let outputs = chain.call(ctx, inputs.clone()).await?;
    memory.save(&inputs, &outputs).await?;
    Ok(outputs)
}

/// Invoke `chain` with `inputs` as one observed run.
///
/// Observers see `on_chain_start` before anything else happens. A failing
/// memory load, execution or memory save is reported through
/// `on_chain_error` and returned; if that notification itself fails, its
/// failure is returned instead. Memory is saved only after a successful
/// execution, before `on_chain_end`.
///
/// # Example
///
/// ```rust
/// use llm_chains::chain::Transform;
/// use llm_chains::driver::{call, CallOptions};
/// use llm_chains::{ChainValues, ExecutionContext};
///
/// # tokio_test::block_on(async {
/// let upper = Transform::new(["text"], ["upper"], |_ctx, inputs: ChainValues| async move {
///     let text = inputs.get_string("text")?;
///     Ok(ChainValues::from([("upper", text.to_uppercase())]))
/// });
///
/// let outputs = call(
///     &ExecutionContext::new(),
///     &upper,
///     ChainValues::from([("text", "hi")]),
///     CallOptions::new(),
/// )
/// .await
/// .unwrap();
/// assert_eq!(outputs.get_string("upper").unwrap(), "HI");
/// # });
/// ```
pub async fn call<C>(
    ctx: &ExecutionContext,
    chain: &C,
    inputs: ChainValues,
    opts: CallOptions,
) -> Result<ChainValues>
where
    C: Chain + ?Sized,
{
    let manager = callback_manager(ctx, chain, opts.callbacks);
    let run_manager = manager.on_chain_start(chain.chain_type(), &inputs).await?;
    tracing::debug!(
        chain_type = chain.chain_type(),
        run_id = %run_manager.run_id(),
        parent_run_id = ?run_manager.parent_run_id(),
        "chain run started"
    );

    let mut run_ctx = ctx.for_run(run_manager.clone());
    if let Some(stop) = opts.stop {
        run_ctx = run_ctx.with_stop(stop);
    }

    match execute(&run_ctx, chain, inputs).await {
        Ok(mut outputs) => {
            run_manager.on_chain_end(&outputs).await?;
            tracing::debug!(
                chain_type = chain.chain_type(),
                run_id = %run_manager.run_id(),
                "chain run finished"
            );
            if opts.include_run_info {
                outputs.insert(RUN_INFO_KEY, json!({ "run_id": run_manager.run_id() }));
            }
            Ok(outputs)
        }
        Err(err) => {
            tracing::debug!(
                chain_type = chain.chain_type(),
                run_id = %run_manager.run_id(),
                error = %err,
                "chain run failed"
            );
            run_manager.on_chain_error(&err).await?;
            Err(err)
        }
    }
}

/// Invoke a single-input, single-output chain with one value.
///
/// Input keys supplied by the chain's memory are not counted. The arity
/// checks happen before any observer is notified, and the output must be a
/// JSON string.
pub async fn run<C>(
    ctx: &ExecutionContext,
    chain: &C,
    input: impl Into<Value>,
    opts: RunOptions,
) -> Result<String>
where
    C: Chain + ?Sized,
{
    let input_keys = caller_input_keys(chain);
    let [input_key] = input_keys.as_slice() else {
        return Err(Error::MultipleInputsInRun(input_keys.len()));
    };

    let output_keys = chain.output_keys();
    let [output_key] = output_keys.as_slice() else {
        return Err(Error::MultipleOutputsInRun(output_keys.len()));
    };

    let mut inputs = ChainValues::new();
    inputs.insert(input_key.clone(), input);

    let mut outputs = call(ctx, chain, inputs, opts.into()).await?;
    match outputs.remove(output_key) {
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(Error::WrongOutputTypeInRun(output_key.clone())),
        None => Err(Error::InvalidInputValues(format!(
            "chain output is missing key '{output_key}'"
        ))),
    }
}

/// Invoke `chain` once per input, in order, stopping at the first failure.
///
/// Cancellation is checked before each item.
pub async fn batch_call<C>(
    ctx: &ExecutionContext,
    chain: &C,
    inputs: Vec<ChainValues>,
    opts: BatchCallOptions,
) -> Result<Vec<ChainValues>>
where
    C: Chain + ?Sized,
{
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        ctx.check_cancelled()?;
        outputs.push(call(ctx, chain, input, CallOptions::from(&opts)).await?);
    }
    Ok(outputs)
}

/// [`batch_call`] with default options.
pub async fn apply<C>(
    ctx: &ExecutionContext,
    chain: &C,
    inputs: Vec<ChainValues>,
) -> Result<Vec<ChainValues>>
where
    C: Chain + ?Sized,
{
    batch_call(ctx, chain, inputs, BatchCallOptions::default()).await
}

/// Invoke `chain` once per input, in order, keeping every item's result.
///
/// A failing item does not stop the batch. Once cancellation is observed,
/// the remaining items are not started and report [`Error::Cancelled`].
pub async fn batch_call_settled<C>(
    ctx: &ExecutionContext,
    chain: &C,
    inputs: Vec<ChainValues>,
    opts: BatchCallOptions,
) -> Vec<Result<ChainValues>>
where
    C: Chain + ?Sized,
{
    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        if ctx.is_cancelled() {
            results.push(Err(Error::Cancelled));
            continue;
        }
        results.push(call(ctx, chain, input, CallOptions::from(&opts)).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::RecordingHandler;
    use crate::chain::{CallbackOptions, Transform};
    use crate::events::CallbackEvent;
    use crate::memory::{Memory, SimpleMemory};
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type EchoFn = fn(ExecutionContext, ChainValues) -> BoxFuture<'static, Result<ChainValues>>;

    fn echo() -> Transform<EchoFn> {
        fn respond(_ctx: ExecutionContext, inputs: ChainValues) -> BoxFuture<'static, Result<ChainValues>> {
            Box::pin(async move {
                let text = inputs.get_string("input")?;
                if text == "boom" {
                    return Err(Error::Execution("boom".into()));
                }
                Ok(ChainValues::from([("output", text)]))
            })
        }
        Transform::new(["input"], ["output"], respond as EchoFn)
    }

    fn kinds(recorder: &RecordingHandler) -> Vec<&'static str> {
        recorder.entries().iter().map(|e| e.event.kind()).collect()
    }

    #[test]
    fn test_merge_memory_rejects_collisions() {
        let inputs = ChainValues::from([("history", "mine"), ("q", "x")]);
        let vars = HashMap::from([("history".to_string(), json!("theirs"))]);

        let err = merge_memory(inputs, vars).unwrap_err();
        assert!(matches!(err, Error::MemoryKeyCollision(keys) if keys == ["history"]));
    }

    #[tokio::test]
    async fn test_call_success_notifies_start_then_end() {
        let recorder = Arc::new(RecordingHandler::new());
        let outputs = call(
            &ExecutionContext::new(),
            &echo(),
            ChainValues::from([("input", "hi")]),
            CallOptions::new().with_callback(recorder.clone()),
        )
        .await
        .unwrap();

        assert_eq!(outputs, ChainValues::from([("output", "hi")]));
        assert_eq!(kinds(&recorder), vec!["chain_start", "chain_end"]);
    }

    #[tokio::test]
    async fn test_call_failure_notifies_error_only() {
        let recorder = Arc::new(RecordingHandler::new());
        let err = call(
            &ExecutionContext::new(),
            &echo(),
            ChainValues::from([("input", "boom")]),
            CallOptions::new().with_callback(recorder.clone()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Execution(_)));
        assert_eq!(kinds(&recorder), vec!["chain_start", "chain_error"]);
    }

    #[tokio::test]
    async fn test_include_run_info() {
        let recorder = Arc::new(RecordingHandler::new());
        let outputs = call(
            &ExecutionContext::new(),
            &echo(),
            ChainValues::from([("input", "hi")]),
            CallOptions::new()
                .with_callback(recorder.clone())
                .with_run_info(true),
        )
        .await
        .unwrap();

        let run_id = recorder.entries()[0].run_id;
        assert_eq!(outputs.get(RUN_INFO_KEY), Some(&json!({ "run_id": run_id })));
    }

    #[tokio::test]
    async fn test_stop_words_reach_the_chain() {
        let chain = Transform::new(["input"], ["output"], |ctx: ExecutionContext, _| async move {
            Ok(ChainValues::from([("output", ctx.stop().join("|"))]))
        });
        let out = run(
            &ExecutionContext::new(),
            &chain,
            "x",
            RunOptions::new().with_stop(vec!["a".into(), "b".into()]),
        )
        .await
        .unwrap();
        assert_eq!(out, "a|b");
    }

    #[tokio::test]
    async fn test_run_rejects_non_string_output() {
        let chain = Transform::new(["input"], ["output"], |_ctx, _| async move {
            Ok(ChainValues::from([("output", 42)]))
        });
        let err = run(&ExecutionContext::new(), &chain, "x", RunOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WrongOutputTypeInRun(key) if key == "output"));
    }

    #[tokio::test]
    async fn test_run_arity_checked_before_callbacks() {
        let recorder = Arc::new(RecordingHandler::new());
        let two_inputs = Transform::new(["a", "b"], ["output"], |_ctx, inputs| async move {
            Ok(inputs)
        });

        let err = run(
            &ExecutionContext::new(),
            &two_inputs,
            "x",
            RunOptions::new().with_callback(recorder.clone()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MultipleInputsInRun(2)));
        assert!(recorder.entries().is_empty());
    }

    /// Records how often the memory was saved.
    #[derive(Default)]
    struct CountingMemory {
        saves: AtomicUsize,
    }

    #[async_trait]
    impl Memory for CountingMemory {
        fn memory_keys(&self) -> Vec<String> {
            vec!["history".into()]
        }

        async fn load(&self, _inputs: &ChainValues) -> Result<HashMap<String, Value>> {
            Ok(HashMap::from([("history".to_string(), json!("earlier"))]))
        }

        async fn save(&self, _inputs: &ChainValues, _outputs: &ChainValues) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_memory_collision_is_reported() {
        let recorder = Arc::new(RecordingHandler::new());
        let memory = Arc::new(CountingMemory::default());
        let chain = echo().with_memory(memory.clone());

        let err = call(
            &ExecutionContext::new(),
            &chain,
            ChainValues::from([("input", "hi"), ("history", "mine")]),
            CallOptions::new().with_callback(recorder.clone()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::MemoryKeyCollision(_)));
        assert_eq!(kinds(&recorder), vec!["chain_start", "chain_error"]);
        assert_eq!(memory.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_ignores_memory_keys() {
        let memory = Arc::new(SimpleMemory::new().with_variable("persona", "pirate"));
        let chain = Transform::new(["input", "persona"], ["output"], |_ctx, inputs: ChainValues| async move {
            let text = format!("{} says {}", inputs.get_string("persona")?, inputs.get_string("input")?);
            Ok(ChainValues::from([("output", text)]))
        })
        .with_memory(memory);

        let out = run(&ExecutionContext::new(), &chain, "ahoy", RunOptions::new())
            .await
            .unwrap();
        assert_eq!(out, "pirate says ahoy");
    }

    #[tokio::test]
    async fn test_batch_call_settled_isolates_failures() {
        let inputs = vec![
            ChainValues::from([("input", "a")]),
            ChainValues::from([("input", "boom")]),
            ChainValues::from([("input", "c")]),
        ];
        let results =
            batch_call_settled(&ExecutionContext::new(), &echo(), inputs, BatchCallOptions::new())
                .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(
            results[2].as_ref().unwrap().get_string("output").unwrap(),
            "c"
        );
    }

    #[tokio::test]
    async fn test_batch_stops_when_cancelled() {
        let ctx = ExecutionContext::new();
        ctx.cancellation_token().cancel();
        let inputs = vec![ChainValues::from([("input", "a")])];

        let err = batch_call(&ctx, &echo(), inputs.clone(), BatchCallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let settled = batch_call_settled(&ctx, &echo(), inputs, BatchCallOptions::new()).await;
        assert!(matches!(settled[0], Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_nested_call_is_child_run() {
        let recorder = Arc::new(RecordingHandler::new());
        let outer = Transform::new(["input"], ["output"], |ctx: ExecutionContext, inputs| async move {
            call(&ctx, &echo(), inputs, CallOptions::new()).await
        });

        call(
            &ExecutionContext::new(),
            &outer,
            ChainValues::from([("input", "hi")]),
            CallOptions::new().with_callback(recorder.clone()),
        )
        .await
        .unwrap();

        let entries = recorder.entries();
        assert_eq!(entries.len(), 4);
        let outer_run = entries[0].run_id;
        assert_eq!(entries[0].parent_run_id, None);
        assert_eq!(entries[1].parent_run_id, Some(outer_run));
        assert!(matches!(entries[3].event, CallbackEvent::ChainEnd { .. }));
        assert_eq!(entries[3].run_id, outer_run);
    }

    #[tokio::test]
    async fn test_chain_observer_sees_nested_runs() {
        let recorder = Arc::new(RecordingHandler::new());
        let outer = Transform::new(["input"], ["output"], |ctx: ExecutionContext, inputs| async move {
            call(&ctx, &echo(), inputs, CallOptions::new()).await
        })
        .with_callback_options(CallbackOptions::new().with_callback(recorder.clone()));

        call(
            &ExecutionContext::new(),
            &outer,
            ChainValues::from([("input", "hi")]),
            CallOptions::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            kinds(&recorder),
            vec!["chain_start", "chain_start", "chain_end", "chain_end"]
        );
        let entries = recorder.entries();
        assert_eq!(entries[1].parent_run_id, Some(entries[0].run_id));
    }
}
