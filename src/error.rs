//! Error types for chain composition and execution.

use thiserror::Error;

/// The main error type for chain operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required input key is absent from the chain values.
    #[error("invalid input values: {0}")]
    InvalidInputValues(String),

    /// An input key is present but holds a value of the wrong type.
    #[error("input key is of wrong type: {0}")]
    InputValuesWrongType(String),

    /// `run` was used on a chain that expects more than one input.
    #[error("run not supported in chain with more than one expected input, got {0}")]
    MultipleInputsInRun(usize),

    /// `run` was used on a chain that returns more than one output.
    #[error("run not supported in chain with more than one expected output, got {0}")]
    MultipleOutputsInRun(usize),

    /// `run` was used on a chain whose output is not a string.
    #[error("run not supported in chain that returns value that is not string: key '{0}'")]
    WrongOutputTypeInRun(String),

    /// A chain in a sequence needs keys that nothing upstream provides.
    #[error("missing required input keys: {}", .0.join(","))]
    MissingInputKeys(Vec<String>),

    /// A chain in a sequence redeclares keys that are already known.
    #[error("overlapping output keys: {}", .0.join(","))]
    OverlappingOutputKeys(Vec<String>),

    /// The declared input keys of a sequence collide with its memory keys.
    #[error("overlapping input keys with memory: {}", .0.join(","))]
    OverlappingMemoryKeys(Vec<String>),

    /// A chain in a simple sequence is not single-input/single-output.
    #[error("chain must have exactly one input and one output, got {inputs} inputs and {outputs} outputs")]
    ChainArity {
        /// Number of declared input keys.
        inputs: usize,
        /// Number of declared output keys.
        outputs: usize,
    },

    /// A sequence was built without any chains.
    #[error("sequence requires at least one chain")]
    EmptySequence,

    /// Memory variables collide with keys the caller already supplied.
    #[error("memory keys collide with caller inputs: {}", .0.join(","))]
    MemoryKeyCollision(Vec<String>),

    /// Two memories in a combined memory share a key.
    #[error("repeated memory key found: {0}")]
    RepeatedMemoryKey(String),

    /// An observer declared as raising failed while handling an event.
    #[error("callback '{handler}' failed: {message}")]
    Callback {
        /// Name of the observer that failed.
        handler: String,
        /// Failure description.
        message: String,
    },

    /// Execution was cancelled through the context.
    #[error("execution was cancelled")]
    Cancelled,

    /// A memory collaborator failed.
    #[error("memory error: {0}")]
    Memory(String),

    /// A model collaborator failed.
    #[error("model error: {0}")]
    Model(String),

    /// An output parser rejected model text.
    #[error("parse error: {0}")]
    Parse(String),

    /// An error occurred during chain execution.
    #[error("execution error: {0}")]
    Execution(String),

    /// A JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error with a message.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Build a [`Error::Callback`] for the named observer.
    pub fn callback(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Callback {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Message(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Message(msg.to_string())
    }
}

/// A specialized `Result` type for chain operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lists_are_joined() {
        let err = Error::MissingInputKeys(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "missing required input keys: a,b");

        let err = Error::OverlappingOutputKeys(vec!["out".into()]);
        assert_eq!(err.to_string(), "overlapping output keys: out");
    }

    #[test]
    fn test_from_str() {
        let err: Error = "boom".into();
        assert!(matches!(err, Error::Message(ref m) if m == "boom"));
    }
}
