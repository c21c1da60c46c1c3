//! AST to IR lowering
//!
//! The builder walks the parse tree once, maintaining a stack of scope maps
//! (innermost last) from source names to operands. Every basic block is
//! terminated before control leaves it; temporaries are minted from a
//! monotonic counter and written once.

use crate::ir::{BasicBlock, Instruction, Op, Operand, Program, Value};
use crate::types::{FunctionType, IrType};
use hashbrown::HashMap;
use log::debug;
use newj_common::{Diagnostics, Span};
use newj_parser::ast;

type Scope = HashMap<String, Operand>;

/// Lowers a parsed program to an [`ir::Program`](crate::Program).
pub struct IrBuilder {
    program: Program,
    /// Scope stack; index 0 is the global scope.
    scopes: Vec<Scope>,
    current_func: Option<usize>,
    temp_counter: u32,
    block_counter: u32,
    builtins: HashMap<String, Operand>,
    diagnostics: Diagnostics,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        builtins.insert(
            "print".to_string(),
            Operand {
                value: Value::Str("print".to_string()),
                ty: IrType::Function(Box::new(FunctionType::new(vec![], IrType::Unit))),
                immediate: true,
            },
        );

        Self {
            program: Program::new(),
            scopes: vec![Scope::new()],
            current_func: None,
            temp_counter: 0,
            block_counter: 0,
            builtins,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Lower the whole program. The returned IR is read-only from here on.
    pub fn build(mut self, tree: &ast::Program) -> (Program, Diagnostics) {
        for item in &tree.items {
            match &item.kind {
                ast::ItemKind::Function(func) => self.lower_function(func),
                ast::ItemKind::Const(decl) => self.lower_var_decl(decl, item.span),
                ast::ItemKind::Struct(decl) => {
                    self.diagnostics.warning(
                        format!(
                            "user-defined type '{}' is not supported by code generation",
                            decl.name.value
                        ),
                        item.span,
                    );
                }
            }
        }

        self.program.globals = self.scopes[0].clone();
        debug!("built IR for {} functions", self.program.functions.len());
        (self.program, self.diagnostics)
    }

    // Functions

    fn lower_function(&mut self, func: &ast::Function) {
        let name = func.name.name.value.clone();

        let mut parameters = Vec::with_capacity(func.params.len());
        for param in &func.params {
            parameters.push(self.type_from(&param.ty).unwrap_or(IrType::I32));
        }
        let return_type = match &func.name.written_type {
            Some(written) => self.type_from(written).unwrap_or(IrType::Unit),
            None => IrType::Unit,
        };

        let index = self
            .program
            .register_function(name.clone(), FunctionType::new(parameters, return_type));
        self.current_func = Some(index);
        self.open_block(format!("{}_entry", name));

        self.scopes.push(Scope::new());
        for param in &func.params {
            let param_ty = self.type_from(&param.ty).unwrap_or(IrType::I32);
            let param_name = param.name.value.clone();
            let operand = Operand::named(param_name.clone(), param_ty);
            self.program.functions[index].param_names.push(param_name.clone());
            if self
                .scopes
                .last_mut()
                .expect("scope stack is never empty")
                .insert(param_name.clone(), operand)
                .is_some()
            {
                self.diagnostics
                    .warning(format!("duplicate parameter '{}'", param_name), param.span);
            }
        }

        self.lower_stmt(&func.body);

        // main falls off its end into an exit; everything else just returns.
        if !self.current_block_terminated() {
            if name == "main" {
                self.append_instruction(Instruction::new(
                    Op::Halt,
                    vec![Operand::int(0, IrType::I32)],
                ));
            } else {
                self.append_instruction(Instruction::new(Op::Ret, vec![]));
            }
        }

        self.scopes.pop();
        self.current_func = None;
    }

    // Statements

    fn lower_stmt(&mut self, stmt: &ast::Stmt) {
        match &stmt.kind {
            ast::StmtKind::Block(stmts) => {
                self.scopes.push(Scope::new());
                for stmt in stmts {
                    self.lower_stmt(stmt);
                }
                self.scopes.pop();
            }
            ast::StmtKind::If { cond, then_block, else_block } => {
                self.lower_if(cond, then_block, else_block.as_deref());
            }
            ast::StmtKind::While { condition, body } => self.lower_while(condition, body),
            ast::StmtKind::Return(value) => {
                let (in_main, return_type) = match self.current_func {
                    Some(index) => {
                        let func = &self.program.functions[index];
                        (func.name == "main", Some(func.ty.return_type.clone()))
                    }
                    None => (false, None),
                };
                match value {
                    Some(expr) => {
                        let operand = self.eval_expr(expr);
                        match &return_type {
                            Some(expected) if *expected == IrType::Unit => {
                                self.diagnostics.warning(
                                    "returning a value from a unit function",
                                    stmt.span,
                                );
                            }
                            Some(expected) if operand.ty != *expected => {
                                self.diagnostics.warning(
                                    format!(
                                        "return type mismatch: expected {}, found {}",
                                        expected, operand.ty
                                    ),
                                    stmt.span,
                                );
                            }
                            _ => {}
                        }
                        self.append_instruction(Instruction::new(Op::Ret, vec![operand]));
                    }
                    // A bare return in main is an exit.
                    None if in_main => self.append_instruction(Instruction::new(
                        Op::Halt,
                        vec![Operand::int(0, IrType::I32)],
                    )),
                    None => {
                        if let Some(expected) = &return_type {
                            if *expected != IrType::Unit {
                                self.diagnostics.warning(
                                    format!("missing return value of type {}", expected),
                                    stmt.span,
                                );
                            }
                        }
                        self.append_instruction(Instruction::new(Op::Ret, vec![]));
                    }
                }
            }
            ast::StmtKind::Decl(decl) => self.lower_var_decl(decl, stmt.span),
            ast::StmtKind::Assign { dest, op, value } => {
                self.lower_assign(dest, *op, value, stmt.span);
            }
            ast::StmtKind::Call(expr) => {
                if let ast::ExprKind::Call { callee, args } = &expr.kind {
                    self.lower_call(callee, args, expr.span, false);
                }
            }
        }
    }

    fn lower_var_decl(&mut self, decl: &ast::VarDecl, span: Span) {
        let id = decl.name.name.value.clone();

        match decl.kind {
            ast::VarDeclKind::GlobalConst | ast::VarDeclKind::Const => {
                let Some(value) = self.fold_constant(&decl.value) else {
                    self.diagnostics.warning(
                        format!("could not evaluate the constant initializer of '{}'", id),
                        span,
                    );
                    return;
                };

                let scope_index =
                    if decl.in_global_scope() { 0 } else { self.scopes.len() - 1 };
                if self.scopes[scope_index].contains_key(&id) {
                    self.diagnostics
                        .warning(format!("redeclaring the constant '{}'", id), span);
                    return;
                }
                self.scopes[scope_index].insert(id, value);
            }
            ast::VarDeclKind::Let => {
                let init = self.eval_expr(&decl.value);
                let variable = Operand::named(id.clone(), init.ty.clone());
                self.append_instruction(Instruction::new(
                    Op::Assign,
                    vec![variable.clone(), init],
                ));

                let scope = self.scopes.last_mut().expect("scope stack is never empty");
                if scope.insert(id.clone(), variable).is_some() {
                    self.diagnostics
                        .warning(format!("redeclaring the variable '{}'", id), span);
                }
            }
        }
    }

    fn lower_assign(
        &mut self,
        dest: &ast::Expr,
        op: Option<ast::BinaryOp>,
        value: &ast::Expr,
        span: Span,
    ) {
        let dest_operand = self.eval_expr(dest);
        if dest_operand.immediate {
            self.diagnostics
                .warning("left hand side of an assignment must be a variable", span);
            return;
        }
        let source = self.eval_expr(value);

        match op {
            Some(compound) => {
                // a += b lowers as a = a + b, result and first input aliased.
                let ir_op = binary_ir_op(compound);
                self.append_instruction(Instruction::new(
                    ir_op,
                    vec![dest_operand.clone(), dest_operand, source],
                ));
            }
            None => {
                // If the source was computed by the instruction just
                // emitted, rename that result instead of copying it.
                if self.rename_last_result(&source, &dest_operand) {
                    return;
                }
                self.append_instruction(Instruction::new(
                    Op::Assign,
                    vec![dest_operand, source],
                ));
            }
        }
    }

    /// Peephole for plain assignment: when `source` is the result of the
    /// previous instruction in the current block, rewrite that result to
    /// `dest` and report success.
    fn rename_last_result(&mut self, source: &Operand, dest: &Operand) -> bool {
        // Only builder-minted temporaries may be stolen; a named variable is
        // observable from other statements.
        match source.name() {
            Some(name) if !source.immediate && name.starts_with("temp_") => {}
            _ => return false,
        }
        let Some(func) = self.current_func else { return false };
        let Some(block) = self.program.functions[func].blocks.last_mut() else {
            return false;
        };
        let Some(last) = block.instructions.last_mut() else { return false };
        let renamable = match last.result() {
            Some(result) => !result.immediate && result.value == source.value,
            None => false,
        };
        if renamable {
            last.operands[0] = dest.clone();
        }
        renamable
    }

    fn lower_if(
        &mut self,
        cond: &ast::Expr,
        then_block: &ast::Stmt,
        else_block: Option<&ast::Stmt>,
    ) {
        let then_label = self.block_name();
        let else_label = self.block_name();

        self.eval_condition(cond, &then_label, &else_label);

        self.open_block(then_label);
        self.lower_stmt(then_block);

        match else_block {
            None => {
                // else_label doubles as the merge point.
                if !self.current_block_terminated() {
                    self.append_instruction(Instruction::new(
                        Op::Branch,
                        vec![Operand::label(else_label.clone())],
                    ));
                }
                self.open_block(else_label);
            }
            Some(else_stmt) => {
                let merge_label = self.block_name();
                let mut merge_reached = false;

                if !self.current_block_terminated() {
                    self.append_instruction(Instruction::new(
                        Op::Branch,
                        vec![Operand::label(merge_label.clone())],
                    ));
                    merge_reached = true;
                }

                self.open_block(else_label);
                self.lower_stmt(else_stmt);
                if !self.current_block_terminated() {
                    self.append_instruction(Instruction::new(
                        Op::Branch,
                        vec![Operand::label(merge_label.clone())],
                    ));
                    merge_reached = true;
                }

                if merge_reached {
                    self.open_block(merge_label);
                }
            }
        }
    }

    fn lower_while(&mut self, condition: &ast::Expr, body: &ast::Stmt) {
        let cond_label = self.block_name();
        let body_label = self.block_name();
        let exit_label = self.block_name();

        if !self.current_block_terminated() {
            self.append_instruction(Instruction::new(
                Op::Branch,
                vec![Operand::label(cond_label.clone())],
            ));
        }

        self.open_block(cond_label.clone());
        self.eval_condition(condition, &body_label, &exit_label);

        self.open_block(body_label);
        self.lower_stmt(body);
        if !self.current_block_terminated() {
            self.append_instruction(Instruction::new(
                Op::Branch,
                vec![Operand::label(cond_label)],
            ));
        }

        self.open_block(exit_label);
    }

    // Conditions and expressions

    /// Lower `expr` as a branch condition with short-circuit semantics,
    /// jumping to `true_label` or `false_label` without materializing a
    /// boolean temporary for `&&`/`||`.
    fn eval_condition(&mut self, expr: &ast::Expr, true_label: &str, false_label: &str) {
        match &expr.kind {
            ast::ExprKind::Binary { op: ast::BinaryOp::BoolAnd, lhs, rhs } => {
                let short_label = self.block_name();
                let lhs_value = self.eval_expr(lhs);
                self.append_branch(lhs_value, &short_label, false_label, expr.span);
                self.open_block(short_label);
                let rhs_value = self.eval_expr(rhs);
                self.append_branch(rhs_value, true_label, false_label, expr.span);
            }
            ast::ExprKind::Binary { op: ast::BinaryOp::BoolOr, lhs, rhs } => {
                let short_label = self.block_name();
                let lhs_value = self.eval_expr(lhs);
                self.append_branch(lhs_value, true_label, &short_label, expr.span);
                self.open_block(short_label);
                let rhs_value = self.eval_expr(rhs);
                self.append_branch(rhs_value, true_label, false_label, expr.span);
            }
            _ => {
                let value = self.eval_expr(expr);
                self.append_branch(value, true_label, false_label, expr.span);
            }
        }
    }

    fn append_branch(&mut self, condition: Operand, true_label: &str, false_label: &str, span: Span) {
        if condition.ty != IrType::Boolean {
            self.diagnostics
                .warning(format!("condition has type {}, expected boolean", condition.ty), span);
        }
        self.append_instruction(Instruction::new(
            Op::Branch,
            vec![condition, Operand::label(true_label), Operand::label(false_label)],
        ));
    }

    /// Evaluate an expression to an operand, emitting instructions for
    /// anything that is not a literal. Failures are diagnosed and yield a
    /// placeholder zero so compilation continues.
    fn eval_expr(&mut self, expr: &ast::Expr) -> Operand {
        match &expr.kind {
            ast::ExprKind::Literal(ast::Literal::Int(value)) => {
                Operand::int(*value, IrType::I32)
            }
            ast::ExprKind::Literal(ast::Literal::Float(text)) => Operand {
                value: Value::Float(text.parse().unwrap_or(0.0)),
                ty: IrType::F64,
                immediate: true,
            },
            ast::ExprKind::Literal(ast::Literal::Str(text)) => {
                Operand::string_literal(text.clone())
            }
            ast::ExprKind::Variable(name) => {
                if let Some(operand) = self.read_variable(name) {
                    operand
                } else if let Some(builtin) = self.builtins.get(name) {
                    builtin.clone()
                } else {
                    self.diagnostics
                        .warning(format!("variable '{}' does not exist", name), expr.span);
                    self.placeholder()
                }
            }
            ast::ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, expr.span),
            ast::ExprKind::Call { callee, args } => self
                .lower_call(callee, args, expr.span, true)
                .unwrap_or_else(|| self.placeholder()),
        }
    }

    fn eval_binary(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> Operand {
        if op.is_boolean() {
            return self.eval_short_circuit(op, lhs, rhs, span);
        }

        let lhs_value = self.eval_expr(lhs);
        let rhs_value = self.eval_expr(rhs);
        let result_ty = if op.is_comparison() { IrType::Boolean } else { lhs_value.ty.clone() };
        let result = self.fresh_temp(result_ty);
        self.append_instruction(Instruction::new(
            binary_ir_op(op),
            vec![result.clone(), lhs_value, rhs_value],
        ));
        result
    }

    /// `||`/`&&` outside a condition context: a short-circuit diamond whose
    /// merge block selects the value with a phi.
    fn eval_short_circuit(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> Operand {
        let lhs_value = self.eval_expr(lhs);
        if lhs_value.ty != IrType::Boolean {
            self.diagnostics.warning(
                format!("operands of '{}' must be boolean, found {}", op, lhs_value.ty),
                span,
            );
            return Operand { value: Value::Bool(false), ty: IrType::Boolean, immediate: true };
        }

        let rhs_label = self.block_name();
        let merge_label = self.block_name();

        // For || the merge is the early-out when the left side is true;
        // for && it is the early-out when the left side is false.
        match op {
            ast::BinaryOp::BoolOr => {
                self.append_branch(lhs_value.clone(), &merge_label, &rhs_label, span)
            }
            _ => self.append_branch(lhs_value.clone(), &rhs_label, &merge_label, span),
        }

        self.open_block(rhs_label);
        let rhs_value = self.eval_expr(rhs);
        self.append_instruction(Instruction::new(
            Op::Branch,
            vec![Operand::label(merge_label.clone())],
        ));

        self.open_block(merge_label);
        let result = self.fresh_temp(IrType::Boolean);
        self.append_instruction(Instruction::new(
            Op::Phi,
            vec![result.clone(), lhs_value, rhs_value],
        ));
        result
    }

    /// Lower a call. In statement position (`want_result == false`) the
    /// emitted instruction leads with the callee reference and has no
    /// result; in expression position a fresh temporary receives the return
    /// value when the callee returns one.
    fn lower_call(
        &mut self,
        callee: &ast::Expr,
        args: &[ast::Expr],
        span: Span,
        want_result: bool,
    ) -> Option<Operand> {
        let ast::ExprKind::Variable(name) = &callee.kind else {
            self.diagnostics.warning("calls are resolved by name", callee.span);
            return Some(self.placeholder());
        };

        // Built-ins short-cut the function table.
        if let Some(builtin) = self.builtins.get(name).cloned() {
            let mut operands = vec![builtin];
            for arg in args {
                operands.push(self.eval_expr(arg));
            }
            self.append_instruction(Instruction::new(Op::Call, operands));
            return if want_result {
                Some(Operand { value: Value::Unit, ty: IrType::Unit, immediate: true })
            } else {
                None
            };
        }

        let Some(callee_func) = self.program.lookup_function_arity(name, args.len()) else {
            self.diagnostics.warning(
                format!("function '{}' with {} argument(s) is not defined", name, args.len()),
                span,
            );
            return Some(self.placeholder());
        };
        let callee_ty = callee_func.ty.clone();
        let callee_ref = Operand {
            value: Value::Str(name.clone()),
            ty: IrType::Function(Box::new(callee_ty.clone())),
            immediate: true,
        };

        let mut operands = Vec::with_capacity(args.len() + 2);
        let result = if want_result && callee_ty.return_type != IrType::Unit {
            let temp = self.fresh_temp(callee_ty.return_type.clone());
            operands.push(temp.clone());
            Some(temp)
        } else {
            None
        };
        operands.push(callee_ref);
        for arg in args {
            operands.push(self.eval_expr(arg));
        }

        self.append_instruction(Instruction::new(Op::Call, operands));
        match (want_result, result) {
            (true, Some(temp)) => Some(temp),
            (true, None) => {
                Some(Operand { value: Value::Unit, ty: IrType::Unit, immediate: true })
            }
            _ => None,
        }
    }

    // Constant folding

    /// Fold an integer-literal expression to an immediate operand. Only
    /// literals and `+`/`-` over foldable sides fold; folded values adopt
    /// the i64 type.
    fn fold_constant(&mut self, expr: &ast::Expr) -> Option<Operand> {
        match &expr.kind {
            ast::ExprKind::Literal(ast::Literal::Int(value)) => {
                Some(Operand::int(*value, IrType::I64))
            }
            ast::ExprKind::Binary {
                op: op @ (ast::BinaryOp::Add | ast::BinaryOp::Sub),
                lhs,
                rhs,
            } => {
                let lhs_value = self.fold_constant(lhs)?;
                let rhs_value = self.fold_constant(rhs)?;
                let (Value::Int(a), Value::Int(b)) = (&lhs_value.value, &rhs_value.value) else {
                    return None;
                };
                let folded = match op {
                    ast::BinaryOp::Add => a.checked_add(*b),
                    _ => a.checked_sub(*b),
                };
                match folded {
                    Some(value) => Some(Operand::int(value, IrType::I64)),
                    None => {
                        self.diagnostics.warning(
                            "integer overflow while folding constant expression",
                            expr.span,
                        );
                        None
                    }
                }
            }
            _ => None,
        }
    }

    // Scope and block plumbing

    fn read_variable(&self, name: &str) -> Option<Operand> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).cloned())
    }

    fn placeholder(&self) -> Operand {
        Operand::int(0, IrType::I32)
    }

    fn fresh_temp(&mut self, ty: IrType) -> Operand {
        let name = format!("temp_{}", self.temp_counter);
        self.temp_counter += 1;
        Operand::named(name, ty)
    }

    fn block_name(&mut self) -> String {
        let prefix = self
            .current_func
            .map(|index| self.program.functions[index].name.as_str())
            .unwrap_or("global");
        let name = format!("{}_{}", prefix, self.block_counter);
        self.block_counter += 1;
        name
    }

    fn open_block(&mut self, label: String) {
        let Some(index) = self.current_func else {
            self.diagnostics.warning(
                format!("cannot open block '{}' outside a function", label),
                Span::single(newj_common::Position::start(), 0),
            );
            return;
        };
        self.program.functions[index].blocks.push(BasicBlock::new(label));
    }

    fn current_block_terminated(&self) -> bool {
        self.current_func
            .and_then(|index| self.program.functions[index].blocks.last())
            .map(BasicBlock::terminated)
            .unwrap_or(true)
    }

    fn append_instruction(&mut self, instruction: Instruction) {
        let Some(index) = self.current_func else {
            self.diagnostics.warning(
                "cannot append an instruction outside a function",
                Span::single(newj_common::Position::start(), 0),
            );
            return;
        };

        // A terminated block never grows; anything after a terminator
        // starts a fresh block.
        if self
            .program
            .functions[index]
            .blocks
            .last()
            .map(BasicBlock::terminated)
            .unwrap_or(false)
        {
            let label = self.block_name();
            self.open_block(label);
        }

        let func = &mut self.program.functions[index];
        match func.blocks.last_mut() {
            Some(block) => block.instructions.push(instruction),
            None => {
                let entry = format!("{}_entry", func.name);
                func.blocks.push(BasicBlock::new(entry));
                func.blocks.last_mut().expect("just pushed").instructions.push(instruction);
            }
        }
    }

    fn type_from(&mut self, written: &ast::TypeName) -> Option<IrType> {
        let ty = self.program.lookup_type(&written.name);
        if ty.is_none() {
            self.diagnostics
                .warning(format!("unknown type name '{}'", written.name), written.span);
        }
        ty
    }
}

fn binary_ir_op(op: ast::BinaryOp) -> Op {
    match op {
        ast::BinaryOp::Add => Op::Add,
        ast::BinaryOp::Sub => Op::Sub,
        ast::BinaryOp::Mul => Op::Mul,
        ast::BinaryOp::Shl => Op::ShiftLeft,
        ast::BinaryOp::Shr => Op::ShiftRight,
        ast::BinaryOp::BitOr => Op::BitOr,
        ast::BinaryOp::BitAnd => Op::BitAnd,
        ast::BinaryOp::BoolOr => Op::BoolOr,
        ast::BinaryOp::BoolAnd => Op::BoolAnd,
        ast::BinaryOp::Eq => Op::Eq,
        ast::BinaryOp::Lt => Op::Lt,
        ast::BinaryOp::Le => Op::Le,
        ast::BinaryOp::Gt => Op::Gt,
        ast::BinaryOp::Ge => Op::Ge,
    }
}
