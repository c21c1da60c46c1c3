//! IR to VISA translation
//!
//! Runs per function: a planning pre-pass records every write and read of
//! each named operand and computes a register assignment, then the emission
//! pass selects instructions block by block. Label references that cannot be
//! resolved yet are queued as fixups and patched when the label is defined.

use crate::opcode::*;
use hashbrown::HashMap;
use log::debug;
use newj_common::{Diagnostics, Position, Span};
use newj_ir as ir;
use newj_ir::{IrType, Value};
use std::collections::BTreeMap;

/// Where and how a named operand lives in the register file.
#[derive(Debug, Clone)]
struct RegisterInfo {
    reg: u8,
    writes: Vec<usize>,
    reads: Vec<usize>,
}

impl RegisterInfo {
    fn new(reg: u8, first_write: usize) -> Self {
        Self { reg, writes: vec![first_write], reads: Vec::new() }
    }
}

type RegisterAlloc = HashMap<String, RegisterInfo>;

/// An assembled VISA image: data and text segments, the label table, and
/// the queue of still-unresolved label references.
#[derive(Debug, Default)]
pub struct Image {
    data: Vec<u8>,
    text: Vec<Operation>,
    labels: HashMap<String, u64>,
    /// instruction byte address -> (label, absolute?)
    fixups: BTreeMap<u64, (String, bool)>,
    text_end: u64,
    diagnostics: Diagnostics,
}

impl Image {
    fn new() -> Self {
        Self { text_end: PC_START, ..Self::default() }
    }

    /// Generate an image for the whole IR program. When `main` is absent
    /// nothing is generated and the image is empty (but still writable).
    pub fn from_ir(input: &ir::Program) -> Image {
        let mut image = Image::new();

        if input.lookup_function("main").is_none() {
            image.diagnostics.note(
                "no 'main' function; generating an empty image",
                zero_span(),
            );
            return image;
        }

        for func in &input.functions {
            image.generate_function(func);
        }

        let mut unresolved: Vec<String> =
            image.fixups.values().map(|(label, _)| label.clone()).collect();
        unresolved.sort();
        unresolved.dedup();
        for label in unresolved {
            image.warn(format!("unresolved label '{}'", label));
        }

        debug!(
            "generated {} instructions, {} data bytes",
            image.text.len(),
            image.data.len()
        );
        image
    }

    pub fn text(&self) -> &[Operation] {
        &self.text
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn label(&self, name: &str) -> Option<u64> {
        self.labels.get(name).copied()
    }

    pub fn pending_fixup_count(&self) -> usize {
        self.fixups.len()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Human-readable listing of the assembled image.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if !self.data.is_empty() {
            out.push_str(&format!(".data  {} bytes at {:#x}\n", self.data.len(), DATA_START));
        }
        out.push_str(".text\n");

        let mut by_addr: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
        for (name, &addr) in &self.labels {
            by_addr.entry(addr).or_default().push(name);
        }

        for (index, op) in self.text.iter().enumerate() {
            let addr = PC_START + 8 * index as u64;
            if let Some(names) = by_addr.get(&addr) {
                for name in names {
                    out.push_str(&format!("{}:\n", name));
                }
            }
            out.push_str(&format!("  {:#010x}  {}\n", addr, op));
        }
        out
    }

    // Per-function pipeline

    fn generate_function(&mut self, func: &ir::Function) {
        let Some(alloc) = self.plan_registers(func) else {
            return;
        };

        self.assign_label(&func.name, self.text_end);

        let mut index = 0usize;
        for block in &func.blocks {
            self.assign_label(&block.label, self.text_end);
            for inst in &block.instructions {
                self.emit_instruction(func, inst, &alloc, index);
                index += 1;
            }
        }
    }

    /// Planning pre-pass: one walk over the IR recording writes and reads
    /// per named operand, assigning temporary registers on first write.
    fn plan_registers(&mut self, func: &ir::Function) -> Option<RegisterAlloc> {
        if func.ty.parameters.len() > MAX_PARAMS {
            self.warn(format!(
                "function '{}' has {} parameters; at most {} are supported",
                func.name,
                func.ty.parameters.len(),
                MAX_PARAMS
            ));
            return None;
        }

        let mut alloc = RegisterAlloc::new();
        for (position, param) in func.parameters().iter().enumerate() {
            if let Some(name) = symbolic_name(param) {
                alloc.insert(
                    name.to_string(),
                    RegisterInfo::new(PARAM_START + position as u8, 0),
                );
            }
        }

        let mut index = 0usize;
        for block in &func.blocks {
            for inst in &block.instructions {
                if inst.op == ir::Op::Phi {
                    self.coalesce_phi(inst, &mut alloc, index);
                } else if let Some(result) = inst.result() {
                    if let Some(name) = symbolic_name(result) {
                        match alloc.get_mut(name) {
                            Some(info) => info.writes.push(index),
                            None => self.allocate_register(&mut alloc, name, index),
                        }
                    }
                }

                for input in inst.inputs() {
                    if let Some(name) = symbolic_name(input) {
                        if let Some(info) = alloc.get_mut(name) {
                            info.reads.push(index);
                        }
                    }
                }
                index += 1;
            }
        }

        Some(alloc)
    }

    /// Pick the lowest-numbered free temporary register with a sorted scan.
    fn allocate_register(&mut self, alloc: &mut RegisterAlloc, name: &str, index: usize) {
        let mut used: Vec<u8> = alloc.values().map(|info| info.reg).collect();
        used.sort_unstable();
        used.dedup();

        let mut last = TEMP_START;
        for reg in used {
            if reg == last {
                last += 1;
            } else if reg > last {
                break;
            }
        }

        if last >= TEMP_END {
            self.warn(format!("too many temporaries; no register left for '{}'", name));
        }
        alloc.insert(name.to_string(), RegisterInfo::new(last, index));
    }

    /// All operands of a phi share one register: the minimum of the
    /// registers already assigned to them.
    fn coalesce_phi(&mut self, inst: &ir::Instruction, alloc: &mut RegisterAlloc, index: usize) {
        for operand in &inst.operands {
            if let Some(name) = symbolic_name(operand) {
                if !alloc.contains_key(name) {
                    self.allocate_register(alloc, name, index);
                }
            }
        }

        let merged = inst
            .operands
            .iter()
            .filter_map(symbolic_name)
            .filter_map(|name| alloc.get(name))
            .map(|info| info.reg)
            .min();

        if let Some(reg) = merged {
            for operand in &inst.operands {
                if let Some(info) = symbolic_name(operand).and_then(|name| alloc.get_mut(name)) {
                    info.reg = reg;
                }
            }
        }
    }

    // Emission

    fn emit_instruction(
        &mut self,
        func: &ir::Function,
        inst: &ir::Instruction,
        alloc: &RegisterAlloc,
        index: usize,
    ) {
        match inst.op {
            ir::Op::Add | ir::Op::Sub => self.emit_add_sub(inst, alloc),
            ir::Op::Mul => self.emit_mul(inst, alloc),
            ir::Op::BitOr => self.emit_bit_or(inst, alloc),
            ir::Op::Assign => self.emit_assign(inst, alloc),
            ir::Op::ShiftLeft | ir::Op::ShiftRight => self.emit_shift(inst, alloc),
            ir::Op::Ret => self.emit_ret(inst, alloc),
            ir::Op::Halt => self.push(Operation::reg_imm(Opcode::Syscall, 0, 0, SYSCALL_EXIT)),
            ir::Op::Call => self.emit_call(inst, alloc, index),
            ir::Op::Branch => self.emit_branch(func, inst, alloc, index),
            // Comparisons emit nothing on their own; the dependent branch
            // consumes them. A phi is fully handled by register coalescing.
            op if op.is_comparison() => {}
            ir::Op::Phi => {}
            other => {
                self.warn(format!("instruction '{:?}' cannot be translated to bytecode", other));
            }
        }
    }

    fn emit_add_sub(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc) {
        let Some(result_reg) = self.register_of(&inst.operands[0], alloc) else { return };
        let lhs = inst.operands[1].clone();
        let rhs = inst.operands[2].clone();
        let subtract = inst.op == ir::Op::Sub;

        match (immediate_int(&lhs), immediate_int(&rhs)) {
            (Some(a), Some(b)) => {
                let folded = if subtract { a.checked_sub(b) } else { a.checked_add(b) };
                let value = match folded {
                    Some(value) => value,
                    None => {
                        self.warn(format!("integer overflow computing {} and {}", a, b));
                        if subtract { a.wrapping_sub(b) } else { a.wrapping_add(b) }
                    }
                };
                self.load_literal(result_reg, value);
            }
            (Some(a), None) => {
                let Some(rhs_reg) = self.register_of(&rhs, alloc) else { return };
                if subtract {
                    // imm - reg: stage the constant in a scratch register so
                    // the destination may alias the register operand.
                    self.load_literal(REG_SCRATCH, a);
                    self.push(Operation::three_reg(Opcode::Sub, result_reg, REG_SCRATCH, rhs_reg));
                } else {
                    self.emit_add_immediate(result_reg, rhs_reg, a);
                }
            }
            (None, Some(b)) => {
                let Some(lhs_reg) = self.register_of(&lhs, alloc) else { return };
                // a - imm is an addi of the negated value.
                let value = if subtract { b.wrapping_neg() } else { b };
                self.emit_add_immediate(result_reg, lhs_reg, value);
            }
            (None, None) => {
                let Some(lhs_reg) = self.register_of(&lhs, alloc) else { return };
                let Some(rhs_reg) = self.register_of(&rhs, alloc) else { return };
                let code = if subtract { Opcode::Sub } else { Opcode::Add };
                self.push(Operation::three_reg(code, result_reg, lhs_reg, rhs_reg));
            }
        }
    }

    /// `dest = src + imm`. An addi when the constant fits the signed field;
    /// otherwise it is staged through a scratch register, which keeps the
    /// destination free to alias `src` (compound assignments do).
    fn emit_add_immediate(&mut self, dest: u8, src: u8, value: i64) {
        if i32::try_from(value).is_ok() {
            self.push(Operation::reg_imm(Opcode::Addi, dest, src, value as i32 as u32));
        } else {
            self.load_literal(REG_SCRATCH, value);
            self.push(Operation::three_reg(Opcode::Add, dest, src, REG_SCRATCH));
        }
    }

    fn emit_mul(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc) {
        let Some(result_reg) = self.register_of(&inst.operands[0], alloc) else { return };
        let lhs = &inst.operands[1];
        let rhs = &inst.operands[2];
        if lhs.immediate || rhs.immediate {
            self.warn("multiplication with immediate operands is not supported");
            return;
        }
        let Some(lhs_reg) = self.register_of(lhs, alloc) else { return };
        let Some(rhs_reg) = self.register_of(rhs, alloc) else { return };
        self.push(Operation::three_reg(Opcode::Mul, result_reg, lhs_reg, rhs_reg));
    }

    fn emit_bit_or(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc) {
        let Some(result_reg) = self.register_of(&inst.operands[0], alloc) else { return };
        let lhs = inst.operands[1].clone();
        let rhs = inst.operands[2].clone();

        match (immediate_int(&lhs), immediate_int(&rhs)) {
            (Some(a), Some(b)) => self.load_literal(result_reg, a | b),
            (Some(imm), None) | (None, Some(imm)) => {
                let other = if immediate_int(&lhs).is_some() { &rhs } else { &lhs };
                let Some(other_reg) = self.register_of(other, alloc) else { return };
                if let Some(field) = self.immediate_field_u32(imm) {
                    self.push(Operation::reg_imm(Opcode::Ori, result_reg, other_reg, field));
                }
            }
            (None, None) => {
                let Some(lhs_reg) = self.register_of(&lhs, alloc) else { return };
                let Some(rhs_reg) = self.register_of(&rhs, alloc) else { return };
                self.push(Operation::three_reg(Opcode::Or, result_reg, lhs_reg, rhs_reg));
            }
        }
    }

    fn emit_assign(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc) {
        let Some(result_reg) = self.register_of(&inst.operands[0], alloc) else { return };
        let source = inst.operands[inst.operands.len() - 1].clone();

        if !source.immediate {
            let Some(source_reg) = self.register_of(&source, alloc) else { return };
            self.push(Operation::reg_imm(Opcode::Ori, result_reg, source_reg, 0));
            return;
        }

        match (&source.ty, &source.value) {
            (IrType::Str, Value::Str(text)) => self.load_string(result_reg, text.clone()),
            (IrType::I32, Value::Int(value)) => {
                self.push(Operation::reg_imm(Opcode::Ori, result_reg, 0, *value as u32));
            }
            (IrType::I64, Value::Int(value)) => self.load_wide(result_reg, *value as u64),
            (IrType::Boolean, Value::Bool(flag)) => {
                self.push(Operation::reg_imm(Opcode::Ori, result_reg, 0, u32::from(*flag)));
            }
            _ => self.warn(format!("cannot use {} as the source of an assignment", source)),
        }
    }

    fn emit_shift(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc) {
        let left = inst.op == ir::Op::ShiftLeft;
        let Some(result_reg) = self.register_of(&inst.operands[0], alloc) else { return };
        let lhs = inst.operands[1].clone();
        let rhs = inst.operands[2].clone();

        if lhs.immediate {
            self.warn(format!("cannot use {} as the shifted operand", lhs));
            return;
        }
        let Some(lhs_reg) = self.register_of(&lhs, alloc) else { return };

        match immediate_int(&rhs) {
            Some(amount) => {
                let code = if left { Opcode::Sli } else { Opcode::Sri };
                if let Some(field) = self.immediate_field_u32(amount) {
                    self.push(Operation::reg_imm(code, result_reg, lhs_reg, field));
                }
            }
            None => {
                let Some(rhs_reg) = self.register_of(&rhs, alloc) else { return };
                let code = if left { Opcode::Sl } else { Opcode::Sr };
                self.push(Operation::three_reg(code, result_reg, lhs_reg, rhs_reg));
            }
        }
    }

    /// Copy each return operand to consecutive return-value registers, then
    /// jump through the return address.
    fn emit_ret(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc) {
        for (position, operand) in inst.operands.iter().enumerate() {
            let ret_reg = REG_RETURN_VALUE + position as u8;
            self.move_into(ret_reg, operand, alloc);
        }
        self.push(Operation::three_reg(Opcode::Jr, REG_RA, 0, 0));
    }

    /// The caller-saved call protocol. `print` never reaches this; it is
    /// rewritten into a syscall sequence instead.
    fn emit_call(&mut self, inst: &ir::Instruction, alloc: &RegisterAlloc, index: usize) {
        let inputs = inst.inputs();
        let Some(callee) = inputs.first() else {
            self.warn("call instruction without a callee");
            return;
        };
        let Some(callee_name) = callee.name().map(str::to_string) else {
            self.warn(format!("call through {} is not supported", callee));
            return;
        };
        let args = &inputs[1..];

        if callee_name == "print" {
            self.emit_print(args, alloc);
            return;
        }

        if args.len() > MAX_PARAMS {
            self.warn(format!(
                "call to '{}' passes {} arguments; at most {} are supported",
                callee_name,
                args.len(),
                MAX_PARAMS
            ));
            return;
        }

        // sp, fp and ra are always saved; temporaries only when their value
        // is still needed after the call.
        let mut saved = vec![REG_SP, REG_FP, REG_RA];
        let mut live_temps: Vec<u8> = alloc
            .values()
            .filter(|info| (TEMP_START..TEMP_END).contains(&info.reg))
            .filter(|info| live_across_call(info, index))
            .map(|info| info.reg)
            .collect();
        live_temps.sort_unstable();
        live_temps.dedup();
        saved.extend(live_temps);

        let frame = 8 * saved.len() as i64;
        self.push(Operation::reg_imm(Opcode::Addi, REG_SP, REG_SP, (-frame) as i32 as u32));
        for (slot, &reg) in saved.iter().enumerate() {
            self.push(Operation::reg_imm(Opcode::Sqw, reg, REG_SP, 8 * slot as u32));
        }

        for (position, arg) in args.iter().enumerate() {
            let param_reg = PARAM_START + position as u8;
            if arg.immediate {
                self.load_operand(param_reg, arg);
            } else if let Some(src) = self.register_of(arg, alloc) {
                self.push(Operation::three_reg(Opcode::Or, param_reg, REG_ZERO, src));
            }
        }

        let target = self.read_label(&callee_name, true, self.text_end);
        self.push(Operation::single_imm(Opcode::Jal, target));

        if let Some(result) = inst.result() {
            if let Some(result_reg) = self.register_of(result, alloc) {
                self.push(Operation::reg_imm(Opcode::Ori, result_reg, REG_RETURN_VALUE, 0));
            }
        }

        for (slot, &reg) in saved.iter().enumerate().rev() {
            self.push(Operation::reg_imm(Opcode::Lqw, reg, REG_SP, 8 * slot as u32));
        }
        self.push(Operation::reg_imm(Opcode::Addi, REG_SP, REG_SP, frame as i32 as u32));
    }

    /// `print` bypasses the call protocol: the argument lands in scratch
    /// register 1 and a type-derived syscall follows.
    fn emit_print(&mut self, args: &[ir::Operand], alloc: &RegisterAlloc) {
        if args.len() != 1 {
            self.warn(format!("print takes one argument, got {}", args.len()));
            return;
        }
        let arg = &args[0];

        let code = match arg.ty {
            IrType::I32 => SYSCALL_PRINT_I32,
            IrType::I64 => SYSCALL_PRINT_I64,
            IrType::Str => SYSCALL_PRINT_STR,
            ref other => {
                self.warn(format!("cannot print a value of type {}", other));
                return;
            }
        };

        self.move_into(REG_SCRATCH, arg, alloc);
        self.push(Operation::reg_imm(Opcode::Syscall, REG_SCRATCH, 0, code));
    }

    /// Lower a conditional or unconditional branch. The condition's defining
    /// comparison is recovered from the instruction stream to branch on its
    /// raw comparands.
    fn emit_branch(
        &mut self,
        func: &ir::Function,
        inst: &ir::Instruction,
        alloc: &RegisterAlloc,
        index: usize,
    ) {
        if inst.operands.len() == 1 {
            let Some(target) = inst.operands[0].name().map(str::to_string) else {
                self.warn("branch without a target label");
                return;
            };
            let imm = self.read_label(&target, true, self.text_end);
            self.push(Operation::single_imm(Opcode::Jmp, imm));
            return;
        }

        let condition = &inst.operands[0];
        let Some(true_label) = inst.operands[1].name().map(str::to_string) else { return };
        let Some(false_label) = inst.operands[2].name().map(str::to_string) else { return };

        let defining = condition.name().and_then(|name| {
            (0..index).rev().find_map(|i| {
                func.instruction_number(i).filter(|candidate| {
                    candidate
                        .result()
                        .and_then(symbolic_name)
                        .map(|result| result == name)
                        .unwrap_or(false)
                })
            })
        });

        match defining {
            Some(comparison) if comparison.op.is_comparison() => {
                let lhs = comparison.operands[1].clone();
                let rhs = comparison.operands[2].clone();
                self.emit_comparison_branch(
                    comparison.op,
                    &lhs,
                    &rhs,
                    &true_label,
                    &false_label,
                    alloc,
                );
            }
            _ => {
                // A plain boolean value: branch on it being non-zero.
                let Some(cond_reg) = self.register_of(condition, alloc) else { return };
                let offset = self.read_label(&true_label, false, self.text_end);
                self.push(Operation::reg_imm(Opcode::Jne, cond_reg, REG_ZERO, offset as u32));
                let target = self.read_label(&false_label, true, self.text_end);
                self.push(Operation::single_imm(Opcode::Jmp, target));
            }
        }
    }

    fn emit_comparison_branch(
        &mut self,
        op: ir::Op,
        lhs: &ir::Operand,
        rhs: &ir::Operand,
        true_label: &str,
        false_label: &str,
        alloc: &RegisterAlloc,
    ) {
        // Both comparands constant: the comparison collapses to one jump.
        if let (Some(a), Some(b)) = (immediate_int(lhs), immediate_int(rhs)) {
            let taken = match op {
                ir::Op::Eq => a == b,
                ir::Op::Ne => a != b,
                ir::Op::Lt => a < b,
                ir::Op::Le => a <= b,
                ir::Op::Gt => a > b,
                _ => a >= b,
            };
            let label = if taken { true_label } else { false_label };
            let target = self.read_label(label, true, self.text_end);
            self.push(Operation::single_imm(Opcode::Jmp, target));
            return;
        }

        match op {
            ir::Op::Eq | ir::Op::Ne => {
                let Some(lhs_reg) = self.comparand_register(lhs, alloc, REG_SCRATCH) else {
                    return;
                };
                let Some(rhs_reg) = self.comparand_register(rhs, alloc, REG_SCRATCH + 1) else {
                    return;
                };
                let code = if op == ir::Op::Eq { Opcode::Jeq } else { Opcode::Jne };
                let offset = self.read_label(true_label, false, self.text_end);
                self.push(Operation::reg_imm(code, lhs_reg, rhs_reg, offset as u32));
                let target = self.read_label(false_label, true, self.text_end);
                self.push(Operation::single_imm(Opcode::Jmp, target));
            }
            // a < b and a > b are each other's operand swap, as are <= and >=.
            ir::Op::Lt => self.emit_less_branch(lhs, rhs, false, true_label, false_label, alloc),
            ir::Op::Gt => self.emit_less_branch(rhs, lhs, false, true_label, false_label, alloc),
            ir::Op::Le => self.emit_less_branch(lhs, rhs, true, true_label, false_label, alloc),
            ir::Op::Ge => self.emit_less_branch(rhs, lhs, true, true_label, false_label, alloc),
            _ => self.warn(format!("comparison '{:?}' cannot drive a branch", op)),
        }
    }

    /// `lhs < rhs` (or `<=` with `or_equal`) branching to `true_label`,
    /// falling through to an unconditional jump to `false_label`.
    fn emit_less_branch(
        &mut self,
        lhs: &ir::Operand,
        rhs: &ir::Operand,
        or_equal: bool,
        true_label: &str,
        false_label: &str,
        alloc: &RegisterAlloc,
    ) {
        let Some(lhs_reg) = self.comparand_register(lhs, alloc, REG_SCRATCH + 1) else { return };

        match immediate_int(rhs) {
            Some(bound) => {
                // slti covers <= by comparing against bound + 1.
                let bound = if or_equal { bound.wrapping_add(1) } else { bound };
                let Some(field) = self.immediate_field_u32(bound) else { return };
                self.push(Operation::reg_imm(Opcode::Slti, REG_SCRATCH, lhs_reg, field));
                let offset = self.read_label(true_label, false, self.text_end);
                self.push(Operation::reg_imm(Opcode::Jne, REG_SCRATCH, REG_ZERO, offset as u32));
            }
            None => {
                let Some(rhs_reg) = self.comparand_register(rhs, alloc, REG_SCRATCH + 2) else {
                    return;
                };
                self.push(Operation::three_reg(Opcode::Slt, REG_SCRATCH, lhs_reg, rhs_reg));
                let offset = self.read_label(true_label, false, self.text_end);
                self.push(Operation::reg_imm(Opcode::Jne, REG_SCRATCH, REG_ZERO, offset as u32));
                if or_equal {
                    let offset = self.read_label(true_label, false, self.text_end);
                    self.push(Operation::reg_imm(Opcode::Jeq, lhs_reg, rhs_reg, offset as u32));
                }
            }
        }

        let target = self.read_label(false_label, true, self.text_end);
        self.push(Operation::single_imm(Opcode::Jmp, target));
    }

    // Labels and fixups

    /// Define `label` at `addr` and patch every queued reference to it.
    fn assign_label(&mut self, label: &str, addr: u64) {
        if self.labels.insert(label.to_string(), addr).is_some() {
            self.warn(format!("label '{}' defined twice", label));
        }

        let pending: Vec<u64> = self
            .fixups
            .iter()
            .filter(|(_, (name, _))| name == label)
            .map(|(&inst_addr, _)| inst_addr)
            .collect();

        for inst_addr in pending {
            let (_, absolute) = self.fixups.remove(&inst_addr).expect("queued above");
            let slot = ((inst_addr - PC_START) / 8) as usize;
            match &mut self.text[slot].data {
                OpData::Immediate(imm) if absolute => *imm = addr >> 3,
                OpData::RegImm { immediate, .. } if !absolute => {
                    *immediate = relative_offset(addr, inst_addr);
                }
                _ => self.diagnostics.warning(
                    format!("fixup for '{}' does not match its instruction form", label),
                    zero_span(),
                ),
            }
        }
    }

    /// The immediate for a reference to `label` from the instruction at
    /// `inst_addr`. Unknown labels queue a fixup and yield zero for now.
    fn read_label(&mut self, label: &str, absolute: bool, inst_addr: u64) -> u64 {
        match self.labels.get(label) {
            Some(&target) => {
                if absolute {
                    target >> 3
                } else {
                    u64::from(relative_offset(target, inst_addr))
                }
            }
            None => {
                self.fixups.insert(inst_addr, (label.to_string(), absolute));
                0
            }
        }
    }

    // Emission helpers

    fn push(&mut self, op: Operation) {
        self.text.push(op);
        self.text_end += 8;
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.diagnostics.warning(message, zero_span());
    }

    pub(crate) fn oversize_section(&mut self, name: &str, length: usize) {
        self.warn(format!("section '{}' length {} exceeds the u32 maximum", name, length));
    }

    fn register_of(&mut self, operand: &ir::Operand, alloc: &RegisterAlloc) -> Option<u8> {
        let Some(name) = symbolic_name(operand) else {
            self.warn(format!("operand {} has no register", operand));
            return None;
        };
        match alloc.get(name) {
            Some(info) => Some(info.reg),
            None => {
                self.warn(format!("no register assigned to '{}'", name));
                None
            }
        }
    }

    /// A comparand as a register: materialize constants into `scratch`.
    fn comparand_register(
        &mut self,
        operand: &ir::Operand,
        alloc: &RegisterAlloc,
        scratch: u8,
    ) -> Option<u8> {
        match immediate_int(operand) {
            Some(value) => {
                self.load_literal(scratch, value);
                Some(scratch)
            }
            None => self.register_of(operand, alloc),
        }
    }

    /// Load `value` into `dest`: one ori when it fits the 32-bit field, a
    /// lui + ori pair otherwise.
    fn load_literal(&mut self, dest: u8, value: i64) {
        let wide = value as u64;
        if wide <= u64::from(u32::MAX) {
            self.push(Operation::reg_imm(Opcode::Ori, dest, 0, wide as u32));
        } else {
            self.load_wide(dest, wide);
        }
    }

    /// Unconditional lui + ori pair for a full 64-bit pattern.
    fn load_wide(&mut self, dest: u8, value: u64) {
        self.push(Operation::reg_imm(Opcode::Lui, dest, 0, (value >> 32) as u32));
        self.push(Operation::reg_imm(Opcode::Ori, dest, dest, value as u32));
    }

    /// Pool a string in the data segment (with its trailing NUL) and load
    /// its absolute address.
    fn load_string(&mut self, dest: u8, text: String) {
        let address = DATA_START + self.append_data(&text);
        self.load_wide(dest, address);
    }

    fn append_data(&mut self, text: &str) -> u64 {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        offset
    }

    /// Move any operand into a specific register: copy for names, literal
    /// or data-segment load for immediates.
    fn move_into(&mut self, dest: u8, operand: &ir::Operand, alloc: &RegisterAlloc) {
        if operand.immediate {
            self.load_operand(dest, operand);
        } else if let Some(src) = self.register_of(operand, alloc) {
            self.push(Operation::reg_imm(Opcode::Ori, dest, src, 0));
        }
    }

    fn load_operand(&mut self, dest: u8, operand: &ir::Operand) {
        match &operand.value {
            Value::Int(value) => self.load_literal(dest, *value),
            Value::Bool(flag) => self.load_literal(dest, i64::from(*flag)),
            Value::Str(text) => self.load_string(dest, text.clone()),
            other => self.warn(format!("cannot load {:?} into a register", other)),
        }
    }

    /// Range-check a value against the unsigned 32-bit immediate field.
    fn immediate_field_u32(&mut self, value: i64) -> Option<u32> {
        if (0..=i64::from(u32::MAX)).contains(&value) {
            Some(value as u32)
        } else {
            self.warn(format!("{} does not fit the 32-bit immediate field", value));
            None
        }
    }

}

/// The symbolic name of a non-immediate operand. Branch labels also match;
/// they are never written, so they never receive a register.
fn symbolic_name(operand: &ir::Operand) -> Option<&str> {
    match &operand.value {
        Value::Str(name) if !operand.immediate => Some(name),
        _ => None,
    }
}

fn immediate_int(operand: &ir::Operand) -> Option<i64> {
    match (&operand.value, operand.immediate) {
        (Value::Int(value), true) => Some(*value),
        (Value::Bool(flag), true) => Some(i64::from(*flag)),
        _ => None,
    }
}

/// A temporary holds a live value across a call when its last write is
/// before the call and its first subsequent read comes after the call.
fn live_across_call(info: &RegisterInfo, call_index: usize) -> bool {
    let written_before = info.writes.iter().max().map(|&w| w < call_index).unwrap_or(false);
    let read_after = info
        .reads
        .iter()
        .filter(|&&r| r >= call_index)
        .min()
        .map(|&r| r > call_index)
        .unwrap_or(false);
    written_before && read_after
}

/// PC-relative word offset from the instruction following `inst_addr`.
fn relative_offset(target: u64, inst_addr: u64) -> u32 {
    (((target as i64) - (inst_addr as i64 + 8)) >> 3) as u32
}

fn zero_span() -> Span {
    Span::single(Position::start(), 0)
}
