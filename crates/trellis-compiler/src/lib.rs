//! trellis-compiler: minimal-diff write generation for the trellis
//! object-graph mapper.
//!
//! The [`GraphCompiler`] walks the object graph reachable from one or more
//! save roots and emits an ordered [`StatementBundle`] that, when executed,
//! makes the persisted graph agree with the in-memory one. Compilation is
//! synchronous, I/O-free, and leaves the session untouched on failure; the
//! caller executes the bundle and then applies the compiled result's commit
//! journal.

pub mod bundle;
pub mod compiler;
mod emit;

pub use bundle::{Param, PendingId, Statement, StatementBundle};
pub use compiler::{CompiledDelete, CompiledSave, CompilerOptions, GraphCompiler};
