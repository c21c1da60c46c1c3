//! Intermediate representation for the NewJ compiler
//!
//! The AST is lowered to a linear three-address form split into basic
//! blocks. The IR is built once by [`IrBuilder`] and read-only afterwards.

pub mod builder;
pub mod ir;
pub mod types;

pub use builder::IrBuilder;
pub use ir::*;
pub use types::*;
