//! Multi-key sequential composition.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CallbackOptions, Chain};
use crate::callback::Callback;
use crate::driver::{self, CallOptions};
use crate::memory::Memory;
use crate::{ChainValues, Error, ExecutionContext, Result};

/// Options for [`Sequential::new`].
#[derive(Clone, Default)]
pub struct SequentialOptions {
    pub callback_options: CallbackOptions,
    pub memory: Option<Arc<dyn Memory>>,
    /// Advertised output keys; overrides `return_all`.
    pub output_keys: Option<Vec<String>>,
    /// Advertise every key produced by the pipeline.
    pub return_all: bool,
}

impl SequentialOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_callback_options(mut self, opts: CallbackOptions) -> Self {
        self.callback_options = opts;
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn with_output_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.output_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_return_all(mut self, return_all: bool) -> Self {
        self.return_all = return_all;
        self
    }
}

/// Runs chains in order over one growing set of values.
///
/// Key flow is validated at construction: every chain's inputs must be
/// supplied by the declared inputs, the memory or an earlier chain, and no
/// chain may produce a key that is already known. A successfully built
/// sequence therefore never fails on a missing key between its chains.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use llm_chains::chain::{Chain, Sequential, SequentialOptions, Transform};
/// use llm_chains::driver::{call, CallOptions};
/// use llm_chains::{ChainValues, ExecutionContext};
///
/// # tokio_test::block_on(async {
/// let greet = Transform::new(["name"], ["greeting"], |_ctx, inputs: ChainValues| async move {
///     Ok(ChainValues::from([("greeting", format!("Hello, {}", inputs.get_string("name")?))]))
/// });
/// let shout = Transform::new(["greeting"], ["shout"], |_ctx, inputs: ChainValues| async move {
///     Ok(ChainValues::from([("shout", inputs.get_string("greeting")?.to_uppercase())]))
/// });
///
/// let chains: Vec<Arc<dyn Chain>> = vec![Arc::new(greet), Arc::new(shout)];
/// let seq = Sequential::new(chains, ["name"], SequentialOptions::new()).unwrap();
///
/// let out = call(&ExecutionContext::new(), &seq, ChainValues::from([("name", "Ferris")]), CallOptions::new())
///     .await
///     .unwrap();
/// assert_eq!(out, ChainValues::from([("shout", "HELLO, FERRIS")]));
/// # });
/// ```
pub struct Sequential {
    chains: Vec<Arc<dyn Chain>>,
    input_keys: Vec<String>,
    output_keys: Vec<String>,
    opts: SequentialOptions,
}

impl Sequential {
    pub fn new<I>(chains: Vec<Arc<dyn Chain>>, input_keys: I, opts: SequentialOptions) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let input_keys: Vec<String> = input_keys.into_iter().map(Into::into).collect();
        let Some(last) = chains.last() else {
            return Err(Error::EmptySequence);
        };

        let memory_keys = opts
            .memory
            .as_ref()
            .map(|m| m.memory_keys())
            .unwrap_or_default();
        let overlap = intersect(&input_keys, &memory_keys);
        if !overlap.is_empty() {
            return Err(Error::OverlappingMemoryKeys(overlap));
        }

        let mut known: Vec<String> = input_keys.iter().chain(&memory_keys).cloned().collect();
        for chain in &chains {
            let missing: Vec<String> = chain
                .input_keys()
                .into_iter()
                .filter(|k| !known.contains(k))
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingInputKeys(missing));
            }

            let outputs = chain.output_keys();
            let overlap = intersect(&outputs, &known);
            if !overlap.is_empty() {
                return Err(Error::OverlappingOutputKeys(overlap));
            }
            known.extend(outputs);
        }

        let output_keys = match &opts.output_keys {
            Some(keys) => keys.clone(),
            None if opts.return_all => known
                .into_iter()
                .filter(|k| !input_keys.contains(k))
                .collect(),
            None => last.output_keys(),
        };

        Ok(Self {
            chains,
            input_keys,
            output_keys,
            opts,
        })
    }
}

/// The part of `outputs` that `chain` declared. Undeclared keys are dropped.
fn declared_outputs(chain: &dyn Chain, outputs: &ChainValues) -> Result<ChainValues> {
    let declared = chain.output_keys();
    if let Some(missing) = declared.iter().find(|k| !outputs.contains_key(k.as_str())) {
        return Err(Error::InvalidInputValues(format!(
            "{} chain did not return declared output key {missing}",
            chain.chain_type()
        )));
    }
    outputs.project(&declared)
}

/// Elements of `a` that also appear in `b`, in `a`'s order.
fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|k| b.contains(k)).cloned().collect()
}

#[async_trait]
impl Chain for Sequential {
    async fn call(&self, ctx: &ExecutionContext, inputs: ChainValues) -> Result<ChainValues> {
        let mut known = inputs;
        for chain in &self.chains {
            ctx.check_cancelled()?;
            let outputs = driver::call(ctx, chain, known.clone(), CallOptions::new()).await?;
            known.merge(declared_outputs(chain.as_ref(), &outputs)?);
        }
        known.project(&self.output_keys)
    }

    fn chain_type(&self) -> &str {
        "Sequential"
    }

    fn verbose(&self) -> bool {
        self.opts.callback_options.verbose
    }

    fn callbacks(&self) -> Vec<Arc<dyn Callback>> {
        self.opts.callback_options.callbacks.clone()
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.opts.memory.clone()
    }

    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        self.output_keys.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Transform;
    use crate::memory::SimpleMemory;

    /// A chain that writes `"{key}-done"` for each output key.
    fn stub(inputs: &[&str], outputs: &'static [&'static str]) -> Arc<dyn Chain> {
        Arc::new(Transform::new(
            inputs.to_vec(),
            outputs.to_vec(),
            move |_ctx, _inputs| async move {
                Ok(outputs
                    .iter()
                    .map(|k| (*k, format!("{k}-done")))
                    .collect::<ChainValues>())
            },
        ))
    }

    #[test]
    fn test_rejects_missing_inputs() {
        let err = Sequential::new(
            vec![stub(&["a"], &["b"]), stub(&["c"], &["d"])],
            ["a"],
            SequentialOptions::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::MissingInputKeys(keys) if keys == ["c"]));
    }

    #[test]
    fn test_rejects_overlapping_outputs() {
        let err = Sequential::new(
            vec![stub(&["a"], &["b"]), stub(&["b"], &["b", "c"])],
            ["a"],
            SequentialOptions::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::OverlappingOutputKeys(keys) if keys == ["b"]));

        let err = Sequential::new(vec![stub(&["a"], &["a"])], ["a"], SequentialOptions::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::OverlappingOutputKeys(_)));
    }

    #[test]
    fn test_rejects_inputs_shadowing_memory() {
        let memory = Arc::new(SimpleMemory::new().with_variable("a", 1));
        let err = Sequential::new(
            vec![stub(&["a"], &["b"])],
            ["a"],
            SequentialOptions::new().with_memory(memory),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::OverlappingMemoryKeys(keys) if keys == ["a"]));
    }

    #[test]
    fn test_memory_keys_count_as_known() {
        let memory = Arc::new(SimpleMemory::new().with_variable("m", 1));
        let seq = Sequential::new(
            vec![stub(&["a", "m"], &["b"])],
            ["a"],
            SequentialOptions::new().with_memory(memory),
        );
        assert!(seq.is_ok());
    }

    #[test]
    fn test_rejects_empty_sequence() {
        let err = Sequential::new(vec![], ["a"], SequentialOptions::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::EmptySequence));
    }

    #[test]
    fn test_output_key_resolution() {
        let chains = || vec![stub(&["a"], &["b"]), stub(&["b"], &["c", "d"])];

        let last = Sequential::new(chains(), ["a"], SequentialOptions::new()).unwrap();
        assert_eq!(last.output_keys(), vec!["c", "d"]);

        let all = Sequential::new(chains(), ["a"], SequentialOptions::new().with_return_all(true))
            .unwrap();
        assert_eq!(all.output_keys(), vec!["b", "c", "d"]);

        let explicit = Sequential::new(
            chains(),
            ["a"],
            SequentialOptions::new()
                .with_return_all(true)
                .with_output_keys(["b"]),
        )
        .unwrap();
        assert_eq!(explicit.output_keys(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_call_projects_outputs() {
        let seq = Sequential::new(
            vec![stub(&["a"], &["b"]), stub(&["b"], &["c"])],
            ["a"],
            SequentialOptions::new().with_output_keys(["b", "c"]),
        )
        .unwrap();

        let out = seq
            .call(&ExecutionContext::new(), ChainValues::from([("a", "x")]))
            .await
            .unwrap();
        assert_eq!(
            out,
            ChainValues::from([("b", "b-done"), ("c", "c-done")])
        );
    }

    #[tokio::test]
    async fn test_undeclared_outputs_are_not_merged() {
        let clobber: Arc<dyn Chain> = Arc::new(Transform::new(["a"], ["b"], |_ctx, _inputs| async move {
            Ok(ChainValues::from([("a", "clobbered"), ("b", "fine")]))
        }));
        let echo_a: Arc<dyn Chain> = Arc::new(Transform::new(["a", "b"], ["c"], |_ctx, inputs: ChainValues| async move {
            Ok(ChainValues::from([("c", inputs.get_string("a")?)]))
        }));
        let seq = Sequential::new(vec![clobber, echo_a], ["a"], SequentialOptions::new()).unwrap();

        let out = seq
            .call(&ExecutionContext::new(), ChainValues::from([("a", "orig")]))
            .await
            .unwrap();
        assert_eq!(out, ChainValues::from([("c", "orig")]));
    }

    #[tokio::test]
    async fn test_missing_declared_output_fails() {
        let silent: Arc<dyn Chain> = Arc::new(Transform::new(["a"], ["b"], |_ctx, _inputs| async move {
            Ok(ChainValues::new())
        }));
        let seq = Sequential::new(vec![silent], ["a"], SequentialOptions::new()).unwrap();

        let err = seq
            .call(&ExecutionContext::new(), ChainValues::from([("a", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInputValues(msg) if msg.contains("output key b")));
    }

    #[tokio::test]
    async fn test_call_checks_cancellation() {
        let seq = Sequential::new(vec![stub(&["a"], &["b"])], ["a"], SequentialOptions::new())
            .unwrap();
        let ctx = ExecutionContext::new();
        ctx.cancellation_token().cancel();

        let err = seq
            .call(&ctx, ChainValues::from([("a", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
