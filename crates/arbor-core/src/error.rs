use thiserror::Error;

/// Errors raised by the entry graph engine.
///
/// Everything except [`ArborError::PossibleInfiniteLoop`] is a usage or
/// contract violation and surfaces at the call site. Failures inside a batch
/// (listeners, recompute, garbage collection) are logged instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArborError {
    #[error("recursive compute of entry `{path}`")]
    RecursiveCompute { path: String },

    #[error("invalid member `{key}` of entry `{path}`")]
    InvalidMember { path: String, key: String },

    #[error("entry has been destroyed")]
    Destroyed,

    #[error("compute of entry `{path}` returned keep without a previous value")]
    KeepWithoutValue { path: String },

    #[error("{0} is not implemented for this schema")]
    NotImplemented(&'static str),

    #[error("possible infinite loop: {iterations} consecutive drains without going idle")]
    PossibleInfiniteLoop { iterations: u32 },

    #[error("circular reference at `{path}`")]
    CircularReference { path: String },

    #[error("type mismatch at `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown mutation `{0}`")]
    UnknownMutation(String),

    #[error("mutation `{mutation}` is missing argument {index}")]
    MissingArgument { mutation: &'static str, index: usize },

    #[error("entry `{path}` needs a parent to compute its value")]
    Orphan { path: String },

    #[error("write to `{path}` rejected: {reason}")]
    Rejected { path: String, reason: String },
}

pub type Result<T, E = ArborError> = std::result::Result<T, E>;
