use thiserror::Error;

/// Errors an operation raises on the debugger side.
///
/// These are programmer errors and resource failures only: a path that does
/// not resolve is *absence* and reported by returning zero results, and host
/// exceptions inside `eval`/`watch` come back as `(false, message)` result
/// pairs. Neither ever surfaces here.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("frame must fit in `u16`")]
    FrameOutOfRange,

    #[error("local slot must be non-zero and fit in `u8`")]
    LocalOutOfRange,

    #[error("key must be a positive `i32`")]
    KeyOutOfRange,

    #[error("need table key")]
    NeedTableKey,

    #[error("#1 is not a table")]
    NotATable,

    #[error("need userdata")]
    NeedUserdata,

    #[error("need function")]
    NeedFunction,

    #[error("need a function ref, it's {0}")]
    NotAFunctionRef(&'static str),

    #[error("need stack level (integer) or function ref, it's {0}")]
    BadTarget(&'static str),

    #[error("invalid option")]
    InvalidOption,

    #[error("unexpected type: {0}")]
    UnexpectedType(&'static str),

    #[error("invalid value type {0}")]
    InvalidValueType(&'static str),

    #[error("bad argument #{0} ({1} expected)")]
    BadArgument(i32, &'static str),

    #[error(transparent)]
    Host(#[from] vm::Error),
}
