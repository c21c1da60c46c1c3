//! Driver library for the NewJ compiler
//!
//! Sequences the pipeline (lex, parse, IR build, codegen, write) and
//! collects every stage's diagnostics. The pipeline never aborts: an output
//! image is written even when the diagnostic stream is non-empty.

pub mod driver;

pub use driver::{compile_file, compile_source, CompileOptions, CompileOutcome};
