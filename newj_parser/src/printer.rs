//! Human-readable and JSON dumps of the parse tree

use crate::ast::*;

const INDENT_SIZE: usize = 2;

/// Render the parse tree one node per line, indented by depth.
pub fn pretty_print(program: &Program) -> String {
    let mut printer = AstPrinter::default();
    for item in &program.items {
        printer.print_item(item);
    }
    printer.out
}

/// Render the parse tree as JSON.
pub fn to_json(program: &Program) -> String {
    serde_json::to_string_pretty(program).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Default)]
struct AstPrinter {
    out: String,
    depth: usize,
}

impl AstPrinter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth * INDENT_SIZE {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn print_item(&mut self, item: &Item) {
        match &item.kind {
            ItemKind::Function(func) => {
                self.line(&format!("Function decl for {}", func.name.name.value));
                self.nested(|p| {
                    p.print_opt_typed(&func.name);
                    for param in &func.params {
                        p.line(&format!("Parameter {}: {}", param.name.value, param.ty.name));
                    }
                    p.print_stmt(&func.body);
                });
            }
            ItemKind::Const(decl) => self.print_var_decl(decl),
            ItemKind::Struct(decl) => {
                self.line(&format!("Struct decl for {}", decl.name.value));
                self.nested(|p| {
                    for (name, ty) in &decl.fields {
                        p.line(&format!("Field {}: {}", name.value, ty.name));
                    }
                });
            }
        }
    }

    fn print_opt_typed(&mut self, opt: &OptTyped) {
        self.line(&format!("Optionally typed {}", opt.name.value));
        self.nested(|p| {
            p.line(&format!("Has user type: {}", opt.written_type.is_some()));
        });
    }

    fn print_var_decl(&mut self, decl: &VarDecl) {
        let kind = match decl.kind {
            VarDeclKind::Let => "Let decl",
            VarDeclKind::Const => "Const decl",
            VarDeclKind::GlobalConst => "Global const decl",
        };
        self.line(&format!("{} for {}", kind, decl.name.name.value));
        self.nested(|p| {
            p.print_opt_typed(&decl.name);
            p.print_expr(&decl.value);
        });
    }

    fn print_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                self.line("Statement block");
                self.nested(|p| {
                    for stmt in stmts {
                        p.print_stmt(stmt);
                    }
                });
            }
            StmtKind::If { cond, then_block, else_block } => {
                self.line("If statement");
                self.nested(|p| {
                    p.print_expr(cond);
                    p.print_stmt(then_block);
                    if let Some(else_block) = else_block {
                        p.print_stmt(else_block);
                    }
                });
            }
            StmtKind::While { condition, body } => {
                self.line("While loop");
                self.nested(|p| {
                    p.print_expr(condition);
                    p.print_stmt(body);
                });
            }
            StmtKind::Return(value) => {
                self.line("Return");
                if let Some(value) = value {
                    self.nested(|p| p.print_expr(value));
                }
            }
            StmtKind::Decl(decl) => self.print_var_decl(decl),
            StmtKind::Assign { dest, op, value } => {
                match op {
                    Some(op) => self.line(&format!("Assignment ({}=)", op)),
                    None => self.line("Assignment"),
                }
                self.nested(|p| {
                    p.print_expr(dest);
                    p.print_expr(value);
                });
            }
            StmtKind::Call(expr) => {
                self.line("Call statement");
                self.nested(|p| p.print_expr(expr));
            }
        }
    }

    fn print_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(Literal::Int(value)) => self.line(&format!("Value {}", value)),
            ExprKind::Literal(Literal::Float(text)) => self.line(&format!("Value {}", text)),
            ExprKind::Literal(Literal::Str(text)) => self.line(&format!("Value \"{}\"", text)),
            ExprKind::Variable(name) => self.line(&format!("Value {}", name)),
            ExprKind::Binary { op, lhs, rhs } => {
                self.line(&format!("Binary operation {}", op));
                self.nested(|p| {
                    p.print_expr(lhs);
                    p.print_expr(rhs);
                });
            }
            ExprKind::Call { callee, args } => {
                self.line("Function call");
                self.nested(|p| {
                    p.print_expr(callee);
                    for arg in args {
                        p.print_expr(arg);
                    }
                });
            }
        }
    }
}
