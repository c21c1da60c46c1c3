//! IR type descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// A type descriptor in the IR type table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrType {
    Unit,
    Boolean,
    Str,
    I32,
    I64,
    F32,
    F64,
    Function(Box<FunctionType>),
    Struct(StructType),
}

impl IrType {
    pub fn is_function(&self) -> bool {
        matches!(self, IrType::Function(_))
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Unit => write!(f, "unit"),
            IrType::Boolean => write!(f, "boolean"),
            IrType::Str => write!(f, "string"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Function(_) => write!(f, "func"),
            IrType::Struct(_) => write!(f, "struct"),
        }
    }
}

/// A function's signature: parameter types plus return type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    pub parameters: Vec<IrType>,
    pub return_type: IrType,
}

impl FunctionType {
    pub fn new(parameters: Vec<IrType>, return_type: IrType) -> Self {
        Self { parameters, return_type }
    }
}

/// Aggregate layout descriptor. Declarations parse but aggregate code
/// generation is not implemented, so no instance of this is built today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: IrType,
    pub offset: u64,
}
