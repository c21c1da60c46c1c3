//! Three-address IR definitions
//!
//! An operand is either a literal immediate or a symbolic name (a source
//! variable, a generated `temp_<N>`, or a block label for branches). The
//! result of an instruction, when it has one, is its first operand.

use crate::types::{FunctionType, IrType};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    ShiftLeft,
    ShiftRight,
    BitOr,
    BitAnd,
    BoolOr,
    BoolAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Halt,
    /// One operand: unconditional target label. Three operands:
    /// condition, true-label, false-label.
    Branch,
    Call,
    Ret,
    Load,
    Store,
    Phi,
}

impl Op {
    pub fn is_comparison(self) -> bool {
        matches!(self, Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge)
    }
}

/// Operand payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// The value for immediate strings; the symbolic name otherwise.
    Str(String),
}

/// A typed value reference in the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub value: Value,
    pub ty: IrType,
    pub immediate: bool,
}

impl Operand {
    pub fn int(value: i64, ty: IrType) -> Self {
        Self { value: Value::Int(value), ty, immediate: true }
    }

    pub fn string_literal(value: impl Into<String>) -> Self {
        Self { value: Value::Str(value.into()), ty: IrType::Str, immediate: true }
    }

    /// A symbolic reference to a variable or temporary.
    pub fn named(name: impl Into<String>, ty: IrType) -> Self {
        Self { value: Value::Str(name.into()), ty, immediate: false }
    }

    /// A block label used as a branch target.
    pub fn label(name: impl Into<String>) -> Self {
        Self { value: Value::Str(name.into()), ty: IrType::Str, immediate: false }
    }

    /// The symbolic name of a non-immediate operand (or of a function
    /// reference, whose payload is its name even though it is immediate).
    pub fn name(&self) -> Option<&str> {
        match &self.value {
            Value::Str(name) if !self.immediate || self.ty.is_function() => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} ", self.ty)?;
        if self.immediate && !self.ty.is_function() {
            write!(f, "imm. ")?;
        }
        match &self.value {
            Value::Unit => write!(f, "unit")?,
            Value::Bool(b) => write!(f, "{}", b)?,
            Value::Int(i) => write!(f, "{}", i)?,
            Value::Float(x) => write!(f, "{}", x)?,
            Value::Str(s) => write!(f, "{}", s)?,
        }
        write!(f, ")")
    }
}

/// A single three-address operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(op: Op, operands: Vec<Operand>) -> Self {
        Self { op, operands }
    }

    /// The operand this instruction writes, if any.
    ///
    /// A `call` has a result only when the callee returns a value, in which
    /// case the result precedes the callee reference; a result-less call
    /// leads with the callee reference, whose type is `func`.
    pub fn result(&self) -> Option<&Operand> {
        let first = self.operands.first()?;
        match self.op {
            Op::Call => {
                if first.ty.is_function() {
                    None
                } else {
                    Some(first)
                }
            }
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::ShiftLeft
            | Op::ShiftRight
            | Op::BitOr
            | Op::BitAnd
            | Op::BoolOr
            | Op::BoolAnd
            | Op::Eq
            | Op::Ne
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::Assign
            | Op::Load
            | Op::Phi => Some(first),
            _ => None,
        }
    }

    /// The operands this instruction reads. For a `call` the first input is
    /// the callee reference.
    pub fn inputs(&self) -> &[Operand] {
        let skip_result = usize::from(self.result().is_some());
        &self.operands[skip_result.min(self.operands.len())..]
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result() {
            write!(f, "{} = ", result)?;
        }

        let infix = |f: &mut fmt::Formatter<'_>, symbol: &str, ops: &[Operand]| {
            write!(f, "{} {} {}", ops[1], symbol, ops[2])
        };

        match self.op {
            Op::Add => infix(f, "+", &self.operands),
            Op::Sub => infix(f, "-", &self.operands),
            Op::Mul => infix(f, "*", &self.operands),
            Op::Div => infix(f, "/", &self.operands),
            Op::ShiftLeft => infix(f, "<<", &self.operands),
            Op::ShiftRight => infix(f, ">>", &self.operands),
            Op::BitOr => infix(f, "|", &self.operands),
            Op::BitAnd => infix(f, "&", &self.operands),
            Op::BoolOr => infix(f, "||", &self.operands),
            Op::BoolAnd => infix(f, "&&", &self.operands),
            Op::Eq => infix(f, "==", &self.operands),
            Op::Ne => infix(f, "!=", &self.operands),
            Op::Lt => infix(f, "<", &self.operands),
            Op::Le => infix(f, "<=", &self.operands),
            Op::Gt => infix(f, ">", &self.operands),
            Op::Ge => infix(f, ">=", &self.operands),
            Op::Assign => write!(f, "{}", self.operands[self.operands.len() - 1]),
            Op::Halt => {
                write!(f, "halt")?;
                if let Some(code) = self.operands.first() {
                    write!(f, " {}", code)?;
                }
                Ok(())
            }
            Op::Branch | Op::Call | Op::Ret | Op::Load | Op::Store | Op::Phi => {
                let name = match self.op {
                    Op::Branch => "branch",
                    Op::Call => "call",
                    Op::Ret => "ret",
                    Op::Load => "load",
                    Op::Store => "store",
                    _ => "phi",
                };
                write!(f, "{}", name)?;
                for operand in self.inputs() {
                    write!(f, " {}", operand)?;
                }
                Ok(())
            }
        }
    }
}

/// A basic block: a labeled straight-line run of instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), instructions: Vec::new() }
    }

    /// A block is terminated once it ends in `halt`, `branch` or `ret`.
    pub fn terminated(&self) -> bool {
        matches!(
            self.instructions.last(),
            Some(Instruction { op: Op::Halt | Op::Branch | Op::Ret, .. })
        )
    }
}

/// An IR function: an ordered list of basic blocks plus its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ty: FunctionType,
    pub param_names: Vec<String>,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>, ty: FunctionType) -> Self {
        Self { name: name.into(), ty, param_names: Vec::new(), blocks: Vec::new() }
    }

    /// Parameter operands, recovered by pairing names with the signature.
    pub fn parameters(&self) -> Vec<Operand> {
        self.param_names
            .iter()
            .zip(&self.ty.parameters)
            .map(|(name, ty)| Operand::named(name.clone(), ty.clone()))
            .collect()
    }

    /// The `pos`-th instruction counting across all blocks in walk order.
    pub fn instruction_number(&self, mut pos: usize) -> Option<&Instruction> {
        for block in &self.blocks {
            if pos < block.instructions.len() {
                return Some(&block.instructions[pos]);
            }
            pos -= block.instructions.len();
        }
        None
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.name)?;
        for (index, param) in self.parameters().iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for instruction in &block.instructions {
                writeln!(f, "\t{}", instruction)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// An IR program: uniquely-named functions, the type table, and the global
/// constant bindings produced by folding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
    pub types: HashMap<String, IrType>,
    pub globals: HashMap<String, Operand>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        types.insert("int32".to_string(), IrType::I32);
        types.insert("int64".to_string(), IrType::I64);
        types.insert("float32".to_string(), IrType::F32);
        types.insert("float64".to_string(), IrType::F64);
        types.insert("boolean".to_string(), IrType::Boolean);
        types.insert("string".to_string(), IrType::Str);
        types.insert("unit".to_string(), IrType::Unit);
        Self { functions: Vec::new(), types, globals: HashMap::new() }
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.functions.iter().any(|func| func.name == name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name == name)
    }

    pub fn lookup_function_arity(&self, name: &str, param_count: usize) -> Option<&Function> {
        self.functions
            .iter()
            .find(|func| func.name == name && func.ty.parameters.len() == param_count)
    }

    /// Register a function, returning its index into `functions`.
    pub fn register_function(&mut self, name: impl Into<String>, ty: FunctionType) -> usize {
        self.functions.push(Function::new(name, ty));
        self.functions.len() - 1
    }

    /// Look up a type name; a function name resolves to that function's type.
    pub fn lookup_type(&self, name: &str) -> Option<IrType> {
        if let Some(ty) = self.types.get(name) {
            return Some(ty.clone());
        }
        self.lookup_function(name)
            .map(|func| IrType::Function(Box::new(func.ty.clone())))
    }

    /// Human-readable dump of every function.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for func in &self.functions {
            out.push_str(&func.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_result_depends_on_leading_operand() {
        let func_ref = Operand {
            value: Value::Str("f".into()),
            ty: IrType::Function(Box::new(FunctionType::new(vec![], IrType::Unit))),
            immediate: true,
        };
        let statement_call = Instruction::new(Op::Call, vec![func_ref.clone()]);
        assert!(statement_call.result().is_none());
        assert_eq!(statement_call.inputs().len(), 1);

        let valued_call = Instruction::new(
            Op::Call,
            vec![Operand::named("temp_0", IrType::I32), func_ref],
        );
        assert!(valued_call.result().is_some());
        assert_eq!(valued_call.inputs().len(), 1, "callee is the only input");
    }

    #[test]
    fn termination_depends_on_last_instruction() {
        let mut block = BasicBlock::new("entry");
        assert!(!block.terminated());
        block.instructions.push(Instruction::new(
            Op::Assign,
            vec![Operand::named("x", IrType::I32), Operand::int(1, IrType::I32)],
        ));
        assert!(!block.terminated());
        block.instructions.push(Instruction::new(Op::Ret, vec![]));
        assert!(block.terminated());
    }

    #[test]
    fn instruction_display_renders_infix() {
        let inst = Instruction::new(
            Op::Add,
            vec![
                Operand::named("temp_0", IrType::I32),
                Operand::named("a", IrType::I32),
                Operand::int(1, IrType::I32),
            ],
        );
        assert_eq!(inst.to_string(), "(i32 temp_0) = (i32 a) + (i32 imm. 1)");
    }
}
