use thiserror::Error;

/// Errors raised while driving a [`Vm`](crate::Vm).
///
/// Host-side script failures surface as [`Error::Runtime`]; the remaining
/// variants are contract violations at the API boundary. A protected call
/// converts any of these into an error message on the stack.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Runtime(String),

    #[error("attempt to call a non-function value")]
    NotCallable,

    #[error("stack overflow")]
    StackOverflow,

    #[error("table index is nil")]
    NilKey,

    #[error("table index is NaN")]
    NanKey,

    #[error("attempt to index a non-table value")]
    NotATable,

    #[error("invalid metatable value")]
    BadMetatable,

    #[error("no chunk loader installed")]
    NoLoader,
}

impl Error {
    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::Runtime(msg.into())
    }
}
