//! Abstract Syntax Tree definitions for the NewJ language
//!
//! Nodes are tagged sum types carrying source spans; ownership is strictly
//! tree-shaped, with no back-pointers.

use newj_common::{Span, Spanned};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A complete NewJ program: top-level items indexed by identifier.
///
/// Identifiers are unique; [`Program::add_item`] rejects duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level item, rejecting it when its identifier already exists.
    pub fn add_item(&mut self, item: Item) -> Result<(), Item> {
        if self.find(item.identifier()).is_some() {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn find(&self, identifier: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.identifier() == identifier)
    }
}

/// Top-level items in a NewJ program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

impl Item {
    pub fn identifier(&self) -> &str {
        match &self.kind {
            ItemKind::Function(func) => &func.name.name.value,
            ItemKind::Const(decl) => &decl.name.name.value,
            ItemKind::Struct(decl) => &decl.name.value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemKind {
    Function(Function),
    Const(VarDecl),
    Struct(StructDecl),
}

/// A written type annotation: `int32`, `int64` or a user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeName {
    pub name: String,
    pub span: Span,
}

/// An identifier together with an optional explicit type annotation.
///
/// At a function's name position the annotation carries the return type; in
/// a variable declaration it carries the declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptTyped {
    pub name: Spanned<String>,
    pub written_type: Option<TypeName>,
}

impl OptTyped {
    pub fn span(&self) -> Span {
        match &self.written_type {
            Some(ty) => self.name.span.combine(ty.span),
            None => self.name.span,
        }
    }
}

/// Function definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: OptTyped,
    pub params: SmallVec<[Parameter; 4]>,
    pub body: Stmt,
}

/// Function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Spanned<String>,
    pub ty: TypeName,
    pub span: Span,
}

/// Struct declaration. Parsed and carried in the tree; code generation for
/// aggregates is not implemented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: Spanned<String>,
    pub fields: Vec<(Spanned<String>, TypeName)>,
}

/// Variable declaration kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarDeclKind {
    Let,
    Const,
    GlobalConst,
}

/// Variable declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub kind: VarDeclKind,
    pub name: OptTyped,
    pub value: Expr,
}

impl VarDecl {
    pub fn in_global_scope(&self) -> bool {
        self.kind == VarDeclKind::GlobalConst
    }
}

/// Statements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_block: Box<Stmt>,
        else_block: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Decl(VarDecl),
    Assign {
        dest: Expr,
        /// `None` for plain `=`; `Some(op)` for the compound `op=` forms.
        op: Option<BinaryOp>,
        value: Expr,
    },
    Call(Expr),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Shl,
    Shr,
    BitOr,
    BitAnd,
    BoolOr,
    BoolAnd,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BinaryOp::BoolOr | BinaryOp::BoolAnd)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitOr => "|",
            BinaryOp::BitAnd => "&",
            BinaryOp::BoolOr => "||",
            BinaryOp::BoolAnd => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{}", text)
    }
}

/// Literal payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(String),
    Str(String),
}

/// Expressions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn has_children(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => false,
            ExprKind::Binary { .. } => true,
            ExprKind::Call { args, .. } => !args.is_empty(),
        }
    }
}
