//! A small Scheme-family evaluation core: a continuation-passing,
//! trampolined interpreter with proper tail calls, first-class escape
//! continuations, mutable lexical environments and in-place macro
//! expansion caching.
//!
//! The [`runtime::Interpreter`] facade is the main entry point; it owns the
//! evaluator, the global environment and the reader, and exposes the
//! incremental compile/execute surface.

pub mod cont;
pub mod env;
pub mod error;
pub mod eval;
pub mod interner;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod repl;
pub mod runtime;
pub mod value;

pub use error::{Error, Unhandled};
pub use runtime::{Config, Interpreter, LoadError};
pub use value::Value;
