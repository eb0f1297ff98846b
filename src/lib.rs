//! # llm-chains
//!
//! Composable LLM chains with key-validated sequential composition and
//! hierarchical lifecycle callbacks.
//!
//! Every chain consumes and produces a [`ChainValues`] bag. The run driver
//! wraps each invocation in `on_chain_start` / `on_chain_end` /
//! `on_chain_error` notifications, loads and saves the chain's memory, and
//! attributes nested invocations to their parent run.
//!
//! ## Core Concepts
//!
//! - **Chain**: The capability every unit of work implements
//! - **ChainValues**: The keyed bag of JSON values passed between chains
//! - **Callback**: An observer of lifecycle events
//! - **CallbackManager**: Fans events out to observers under verbosity and error policies
//! - **Sequential**: Composition validated against declared keys at construction
//! - **Memory**: State loaded before and saved after a successful run
//! - **driver**: `call`, `run`, `batch_call`, `apply`, `batch_call_settled`
//!
//! ## Example: Two-Step Pipeline with Recorded Events
//!
//! ```rust
//! use std::sync::Arc;
//! use llm_chains::callback::RecordingHandler;
//! use llm_chains::chain::{Chain, Sequential, SequentialOptions, Transform};
//! use llm_chains::{call, CallOptions, ChainValues, ExecutionContext};
//!
//! # tokio_test::block_on(async {
//! let double = Transform::new(["x"], ["doubled"], |_ctx, inputs: ChainValues| async move {
//!     let x: i64 = inputs.get_string("x")?.parse().map_err(|_| "not a number")?;
//!     Ok(ChainValues::from([("doubled", x * 2)]))
//! });
//! let describe = Transform::new(["doubled"], ["text"], |_ctx, inputs: ChainValues| async move {
//!     Ok(ChainValues::from([("text", format!("result: {}", inputs.get_string("doubled")?))]))
//! });
//!
//! let chains: Vec<Arc<dyn Chain>> = vec![Arc::new(double), Arc::new(describe)];
//! let pipeline = Sequential::new(chains, ["x"], SequentialOptions::new()).unwrap();
//!
//! let recorder = Arc::new(RecordingHandler::new());
//! let outputs = call(
//!     &ExecutionContext::new(),
//!     &pipeline,
//!     ChainValues::from([("x", 21)]),
//!     CallOptions::new().with_callback(recorder.clone()),
//! )
//! .await
//! .unwrap();
//!
//! assert_eq!(outputs.get_string("text").unwrap(), "result: 42");
//! // one start and one end for the pipeline and for each inner chain
//! assert_eq!(recorder.entries().len(), 6);
//! # });
//! ```

pub mod error;
pub mod values;
pub mod schema;
pub mod context;
pub mod callback;
pub mod events;
pub mod metrics;
pub mod memory;
pub mod chain;
pub mod model;
pub mod driver;

pub use error::{Error, Result};
pub use values::ChainValues;
pub use context::ExecutionContext;
pub use events::{CallbackEvent, TraceEntry};
pub use metrics::TokenUsage;

pub use callback::{Callback, CallbackManager, ChainRunManager, ManagerOptions, RunInfo};
pub use chain::{CallbackOptions, Chain};
pub use memory::Memory;
pub use driver::{
    apply, batch_call, batch_call_settled, call, run, BatchCallOptions, CallOptions, RunOptions,
};
