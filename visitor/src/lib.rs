//! Cross-VM variable visitor.
//!
//! Introspects and mutates the state of a *host* runtime from a separate
//! *debugger* runtime living in the same process. The two runtimes keep
//! independent value spaces; the debugger owns only opaque *references* —
//! path descriptors into host values — which it re-evaluates on demand.
//! Scalars cross the boundary by copy; aggregates never cross at all, and
//! host objects the debugger must keep alive are anchored in registry-rooted
//! tables on the host.
//!
//! The entry points are the operations in [`ops`], invoked with the
//! debugger-stack calling convention, and [`ops::open`], which builds the
//! library table carrying the predefined `_G` and `_REGISTRY` references.

pub mod anchor;
pub mod assign;
pub mod error;
pub mod eval;
pub mod info;
pub mod marshal;
pub mod ops;
pub mod path;
pub mod walk;

pub use error::OpError;
pub use ops::{open, OpResult};
