//! Integration tests for AST to IR lowering

use newj_ir::{IrBuilder, IrType, Op, Operand, Program, Value};
use newj_lexer::Lexer;
use newj_parser::Parser;
use pretty_assertions::assert_eq;

fn build(source: &str) -> (Program, usize) {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let tree = parser.parse_program();
    assert_eq!(parser.diagnostics().warning_count(), 0, "parse of {:?}", source);
    let (program, diagnostics) = IrBuilder::new().build(&tree);
    (program, diagnostics.warning_count())
}

fn build_clean(source: &str) -> Program {
    let (program, warnings) = build(source);
    assert_eq!(warnings, 0, "unexpected IR diagnostics for {:?}", source);
    program
}

/// Every block is terminated and labels are unique within each function.
fn assert_well_formed(program: &Program) {
    for func in &program.functions {
        let mut labels = std::collections::HashSet::new();
        for block in &func.blocks {
            assert!(labels.insert(&block.label), "duplicate label {}", block.label);
            assert!(block.terminated(), "unterminated block {} in {}", block.label, func.name);
        }
    }
}

#[test]
fn empty_main_becomes_halt() {
    // Both a bare return and falling off the end exit main with halt 0.
    for source in ["func main() { return }", "func main() { }"] {
        let program = build_clean(source);
        assert_eq!(program.functions.len(), 1);

        let main = program.lookup_function("main").unwrap();
        assert_eq!(main.blocks.len(), 1);
        assert_eq!(main.blocks[0].label, "main_entry");
        assert_eq!(main.blocks[0].instructions.len(), 1);
        let halt = &main.blocks[0].instructions[0];
        assert_eq!(halt.op, Op::Halt);
        assert_eq!(halt.operands[0], Operand::int(0, IrType::I32));
        assert_well_formed(&program);
    }
}

#[test]
fn global_constant_folds_to_i64() {
    let program = build_clean("const K: int64 = 2 + 3");
    assert!(program.functions.is_empty());
    let k = program.globals.get("K").expect("K bound in the global scope");
    assert_eq!(*k, Operand::int(5, IrType::I64));
}

#[test]
fn unfoldable_global_is_diagnosed() {
    let (program, warnings) = build("const K: int64 = 2 << 3");
    assert!(warnings >= 1);
    assert!(program.globals.get("K").is_none());
}

#[test]
fn local_arithmetic_and_call() {
    let program = build_clean(
        "func add(a: int32, b: int32): int32 { return a + b }\nfunc main() { print(add(2, 3)) }",
    );
    assert_well_formed(&program);

    let add = program.lookup_function("add").unwrap();
    assert_eq!(add.ty.parameters, vec![IrType::I32, IrType::I32]);
    assert_eq!(add.ty.return_type, IrType::I32);
    let insts = &add.blocks[0].instructions;
    assert_eq!(insts.len(), 2);
    assert_eq!(insts[0].op, Op::Add);
    assert_eq!(insts[0].result().unwrap(), &Operand::named("temp_0", IrType::I32));
    assert_eq!(insts[1].op, Op::Ret);
    assert_eq!(insts[1].operands[0], Operand::named("temp_0", IrType::I32));

    let main = program.lookup_function("main").unwrap();
    let insts = &main.blocks[0].instructions;
    // call add, then the print call, then the implicit halt
    assert_eq!(insts[0].op, Op::Call);
    assert!(insts[0].result().is_some(), "add's value feeds print");
    assert_eq!(insts[1].op, Op::Call);
    assert!(insts[1].result().is_none(), "print is result-less");
    assert_eq!(insts[2].op, Op::Halt);
}

#[test]
fn short_circuit_condition_has_no_phi() {
    let program = build_clean(
        "func f(x: int32): int32 {\n if (x == 0 or x == 1) { return 1 }\n return 0\n}",
    );
    assert_well_formed(&program);

    let f = program.lookup_function("f").unwrap();
    assert_eq!(f.blocks.len(), 4, "entry, short-circuit, then, exit");

    let branches: Vec<_> = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|inst| inst.op == Op::Branch)
        .collect();
    assert_eq!(branches.len(), 2);
    assert!(branches.iter().all(|b| b.operands.len() == 3), "both branches are conditional");

    let phi_count = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|inst| inst.op == Op::Phi)
        .count();
    assert_eq!(phi_count, 0, "control never merges before the returns");
}

#[test]
fn boolean_or_in_value_position_materializes_phi() {
    let program = build_clean(
        "func f(x: int32): int32 {\n let both = x == 0 or x == 1\n if (both) { return 1 }\n return 0\n}",
    );
    assert_well_formed(&program);
    let f = program.lookup_function("f").unwrap();
    let phis: Vec<_> = f
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|inst| inst.op == Op::Phi)
        .collect();
    assert_eq!(phis.len(), 1);
    let phi = phis[0];
    assert_eq!(phi.result().unwrap().ty, IrType::Boolean);
    assert!(phi.inputs().iter().all(|op| op.ty == IrType::Boolean));
}

#[test]
fn while_loop_shapes_four_blocks() {
    let program = build_clean("func main() {\n let i: int32 = 0\n while (i < 10) { i += 1 }\n}");
    assert_well_formed(&program);

    let main = program.lookup_function("main").unwrap();
    assert_eq!(main.blocks.len(), 4, "entry, cond, body, exit");

    let entry = &main.blocks[0];
    assert_eq!(entry.instructions[0].op, Op::Assign);
    assert_eq!(entry.instructions[0].operands[0], Operand::named("i", IrType::I32));
    let back_to_cond = entry.instructions.last().unwrap();
    assert_eq!(back_to_cond.op, Op::Branch);
    assert_eq!(back_to_cond.operands.len(), 1, "unconditional into the condition block");

    let cond = &main.blocks[1];
    assert_eq!(cond.instructions[0].op, Op::Lt);
    let test = cond.instructions.last().unwrap();
    assert_eq!(test.op, Op::Branch);
    assert_eq!(test.operands.len(), 3);

    let body = &main.blocks[2];
    assert_eq!(body.instructions[0].op, Op::Add);
    assert_eq!(body.instructions[0].result().unwrap(), &Operand::named("i", IrType::I32));
    let back = body.instructions.last().unwrap();
    assert_eq!(back.op, Op::Branch);
    assert_eq!(back.operands[0], Operand::label(cond.label.clone()));

    let exit = &main.blocks[3];
    assert_eq!(exit.instructions.last().unwrap().op, Op::Halt);
}

#[test]
fn plain_assignment_renames_previous_result() {
    let program = build_clean("func f(a: int32, b: int32) {\n let x = 0\n x = a + b\n}");
    let f = program.lookup_function("f").unwrap();
    let insts = &f.blocks[0].instructions;
    // assign x, 0 ; then the add writes x directly (no copy emitted)
    assert_eq!(insts[0].op, Op::Assign);
    assert_eq!(insts[1].op, Op::Add);
    assert_eq!(insts[1].result().unwrap(), &Operand::named("x", IrType::I32));
    assert_eq!(insts[2].op, Op::Ret);
}

#[test]
fn assignment_of_variable_emits_copy() {
    let program = build_clean("func f(a: int32) {\n let x = 0\n let y = 1\n x = y\n}");
    let f = program.lookup_function("f").unwrap();
    let insts = &f.blocks[0].instructions;
    let copy = &insts[2];
    assert_eq!(copy.op, Op::Assign);
    assert_eq!(copy.operands[0], Operand::named("x", IrType::I32));
    assert_eq!(copy.operands[1], Operand::named("y", IrType::I32));
}

#[test]
fn undefined_variable_yields_placeholder_and_diagnostic() {
    let (program, warnings) = build("func main() { let x = missing + 1 }");
    assert!(warnings >= 1);
    let main = program.lookup_function("main").unwrap();
    let add = &main.blocks[0].instructions[0];
    assert_eq!(add.op, Op::Add);
    assert_eq!(add.operands[1], Operand::int(0, IrType::I32));
}

#[test]
fn undefined_function_yields_placeholder_and_diagnostic() {
    let (_, warnings) = build("func main() { let x = missing(1) }");
    assert!(warnings >= 1);
}

#[test]
fn temporaries_are_written_once_per_path() {
    let program = build_clean(
        "func f(a: int32, b: int32): int32 { return a + b + a + b }",
    );
    let f = program.lookup_function("f").unwrap();
    let mut written = std::collections::HashSet::new();
    for block in &f.blocks {
        for inst in &block.instructions {
            if let Some(result) = inst.result() {
                if let Value::Str(name) = &result.value {
                    if name.starts_with("temp_") {
                        assert!(written.insert(name.clone()), "temp {} written twice", name);
                    }
                }
            }
        }
    }
    assert_eq!(written.len(), 3, "three adds mint three temporaries");
}

#[test]
fn statements_after_return_open_a_fresh_block() {
    let program = build_clean("func f(): int32 {\n return 1\n let x = 2\n}");
    let f = program.lookup_function("f").unwrap();
    assert!(f.blocks.iter().all(|b| b.terminated()));
    assert!(f.blocks.len() >= 2);
}

#[test]
fn return_type_mismatch_is_diagnosed() {
    let (_, warnings) = build("func f(): int32 { return }");
    assert!(warnings >= 1, "missing return value");

    let (_, warnings) = build("func g() { return 1 }");
    assert!(warnings >= 1, "value returned from a unit function");
}

#[test]
fn struct_declaration_is_diagnosed() {
    let (program, warnings) = build("struct point { x: int32\n y: int32 }");
    assert!(warnings >= 1);
    assert!(program.functions.is_empty());
}

#[test]
fn if_else_merges_when_a_branch_falls_through() {
    let program = build_clean(
        "func f(x: int32): int32 {\n let r = 0\n if (x == 0) { r = 1 } else { return 2 }\n return r\n}",
    );
    assert_well_formed(&program);
}

#[test]
fn ir_dump_mentions_functions_and_operands() {
    let program = build_clean("func main() { let x = 5 }");
    let dump = program.dump();
    assert!(dump.contains("main "));
    assert!(dump.contains("main_entry:"));
    assert!(dump.contains("(i32 imm. 5)"));
}
