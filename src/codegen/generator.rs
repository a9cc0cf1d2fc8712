//! Code generation: walks the AST and emits NASM text via the typed
//! instruction emitters, tracking variable locations with `CodeGenEnv`.

use super::emit::*;
use super::env::{CodeGenEnv, VarLocation};
use super::writer::AssemblyWriter;
use crate::ast::{Binding, LiteralKind, Node, Program};
use crate::compiler::error::CompileError;
use crate::debug;

/// Runtime symbols this crate's own output never defines, only calls.
const RUNTIME_EXTERNS: &[&str] = &[
    "lispvalue_create_int",
    "lispvalue_create_float",
    "lispvalue_create_bool",
    "lispvalue_create_closure",
    "lispcell_create",
    "lispvalue_create_cell",
    "lisp_is_truthy",
];

/// Surface name to runtime symbol, for the five fixed builtins.
const BUILTIN_TABLE: &[(&str, &str)] = &[
    ("print-debug", "lisp_print"),
    ("+", "lisp_add"),
    ("-", "lisp_subtract"),
    ("*", "lisp_multiply"),
    ("=", "lisp_equal"),
];

const VARIADIC_BUILTINS: &[&str] = &["+", "-", "*"];

/// Closure object layout (fixed, bit-exact): tag at +0, code_ptr at +8,
/// arity at +16, num_free at +24, captured values from +32.
const CLOSURE_CODE_PTR_OFFSET: i32 = 8;
const CLOSURE_FREE_VARS_BASE: i32 = 32;

/// A generic boxed value's payload is assumed to start at +8, the same
/// offset the closure object uses for its first payload field after the
/// tag — there is no bit-exact spec for a generic (non-closure) boxed
/// value's layout, so this follows that convention for consistency.
const BOXED_VALUE_PAYLOAD_OFFSET: i32 = 8;

const ARG_REGS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

fn builtin_label(name: &str) -> Option<&'static str> {
    BUILTIN_TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, label)| *label)
}

fn is_variadic_builtin(name: &str) -> bool {
    VARIADIC_BUILTINS.contains(&name)
}

pub struct CodeGenerator {
    writer: AssemblyWriter,
    env: CodeGenEnv,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            writer: AssemblyWriter::new(),
            env: CodeGenEnv::new(),
        }
    }

    /// Generates a whole program and returns the consolidated `.asm` text
    /// for `<prefix>.asm`.
    pub fn generate(mut self, program: &Program, prefix: &str) -> Result<String, CompileError> {
        let timer = debug::PerfTimer::new("codegen");
        debug::log_codegen(&format!("generating {} top-level form(s)", program.forms.len()));

        for sym in RUNTIME_EXTERNS {
            emit_extern(&mut self.writer, sym, None);
        }
        for (_, label) in BUILTIN_TABLE {
            emit_extern(&mut self.writer, label, None);
        }
        emit_global(&mut self.writer, "main", None);
        emit_label(&mut self.writer, "main", None);
        emit_push_reg(&mut self.writer, Register::Rbp, None);
        emit_mov_reg_reg(&mut self.writer, Register::Rbp, Register::Rsp, None);

        for form in &program.forms {
            self.env.reset_stack_offset(0);
            self.generate_node(form)?;
        }

        emit_mov_reg_reg(&mut self.writer, Register::Rsp, Register::Rbp, None);
        emit_pop_reg(&mut self.writer, Register::Rbp, None);
        emit_mov_reg_imm(&mut self.writer, Register::Rax, 60, Some("exit"));
        emit_xor_reg_reg(&mut self.writer, Register::Rdi, Register::Rdi, None);
        emit_syscall(&mut self.writer, None);

        timer.finish();
        Ok(self.writer.consolidate(prefix))
    }

    fn generate_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Literal(lit) => self.generate_literal(lit),
            Node::Variable(name) => self.generate_variable(name),
            Node::Def(binding) => self.generate_def(binding),
            Node::Let { bindings, body } => self.generate_let(bindings, body),
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => self.generate_if(cond, then_branch, else_branch.as_deref()),
            Node::Call { callee, args } => self.generate_call(callee, args),
            Node::Function {
                name,
                params,
                free_vars,
                body,
            } => self.generate_function(name.as_deref(), params, free_vars, body),
            Node::Quote(_) => Err(CompileError::codegen("quoted data has no runtime representation")),
            Node::Placeholder => Err(CompileError::codegen("placeholder node reached code generation")),
        }
    }

    fn generate_literal(&mut self, lit: &LiteralKind) -> Result<(), CompileError> {
        match lit {
            LiteralKind::Int(v) => {
                emit_mov_reg_imm(&mut self.writer, Register::Rdi, *v, None);
                emit_call_label(&mut self.writer, "lispvalue_create_int", None);
            }
            LiteralKind::Float(v) => {
                let label = format!("L_float_{}", self.env.next_label_id());
                emit_data_dq_float(&mut self.writer, &label, *v);
                emit_mov_reg_global(&mut self.writer, Register::Xmm0, &label, None);
                emit_call_label(&mut self.writer, "lispvalue_create_float", None);
            }
            LiteralKind::Bool(v) => {
                emit_mov_reg_imm(&mut self.writer, Register::Rdi, if *v { 1 } else { 0 }, None);
                emit_call_label(&mut self.writer, "lispvalue_create_bool", None);
            }
            LiteralKind::String(_) => {
                return Err(CompileError::codegen(
                    "string literals have no runtime representation",
                ));
            }
        }
        Ok(())
    }

    fn generate_variable(&mut self, name: &str) -> Result<(), CompileError> {
        match self.env.lookup(name) {
            Some(VarLocation::Global(label)) => {
                emit_mov_reg_global(&mut self.writer, Register::Rax, &label, None);
            }
            Some(VarLocation::Stack(offset)) => {
                emit_mov_reg_membase(&mut self.writer, Register::Rax, Register::Rbp, offset, None);
            }
            Some(VarLocation::Env(index)) => {
                let slot = CLOSURE_FREE_VARS_BASE + (index as i32) * 8;
                emit_mov_reg_membase(&mut self.writer, Register::Rax, Register::R12, slot, Some("captured cell"));
                emit_mov_reg_membase(
                    &mut self.writer,
                    Register::Rax,
                    Register::Rax,
                    BOXED_VALUE_PAYLOAD_OFFSET,
                    Some("unwrap boxed cell"),
                );
                emit_mov_reg_membase(&mut self.writer, Register::Rax, Register::Rax, 0, Some("dereference cell"));
            }
            None => {
                return Err(CompileError::codegen(format!(
                    "variable '{}' has no codegen location",
                    name
                )));
            }
        }
        Ok(())
    }

    fn generate_def(&mut self, binding: &Binding) -> Result<(), CompileError> {
        let label = self.env.add_global_variable(&binding.name);
        emit_data_dq_imm(&mut self.writer, &label, 0);
        self.generate_node(&binding.value)?;
        emit_mov_global_reg(&mut self.writer, &label, Register::Rax, Some(&binding.name));
        Ok(())
    }

    fn generate_let(&mut self, bindings: &[Binding], body: &[Node]) -> Result<(), CompileError> {
        self.env.enter_scope();
        let saved_offset = self.env.get_stack_offset();
        let mut pushed_bytes = 0i32;

        for binding in bindings {
            self.generate_node(&binding.value)?;
            emit_push_reg(&mut self.writer, Register::Rax, Some(&binding.name));
            self.env.add_stack_variable(&binding.name);
            pushed_bytes += 8;
        }

        for (i, expr) in body.iter().enumerate() {
            self.generate_node(expr)?;
            let _ = i;
        }

        if pushed_bytes > 0 {
            emit_add_rsp(&mut self.writer, pushed_bytes, Some("discard let bindings"));
        }
        self.env.set_stack_offset(saved_offset);
        self.env.exit_scope();
        Ok(())
    }

    fn generate_if(
        &mut self,
        cond: &Node,
        then_branch: &Node,
        else_branch: Option<&Node>,
    ) -> Result<(), CompileError> {
        let n = self.env.next_label_id();
        let else_label = format!("L_else_{}", n);
        let end_label = format!("L_end_if_{}", n);

        self.generate_node(cond)?;
        emit_mov_reg_reg(&mut self.writer, Register::Rdi, Register::Rax, None);
        emit_call_label(&mut self.writer, "lisp_is_truthy", None);
        emit_cmp_reg_imm(&mut self.writer, Register::Rax, 0, None);
        emit_je(&mut self.writer, &else_label, None);

        self.generate_node(then_branch)?;
        emit_jmp(&mut self.writer, &end_label, None);

        emit_label(&mut self.writer, &else_label, None);
        match else_branch {
            Some(node) => self.generate_node(node)?,
            None => emit_xor_reg_reg(&mut self.writer, Register::Rax, Register::Rax, Some("no else branch")),
        }
        emit_label(&mut self.writer, &end_label, None);
        Ok(())
    }

    fn generate_call(&mut self, callee: &Node, args: &[Node]) -> Result<(), CompileError> {
        if let Node::Variable(name) = callee {
            if let Some(label) = builtin_label(name) {
                return self.generate_builtin_call(label, name, args);
            }
        }
        self.generate_closure_call(callee, args)
    }

    fn generate_builtin_call(&mut self, label: &str, name: &str, args: &[Node]) -> Result<(), CompileError> {
        for arg in args.iter().rev() {
            self.generate_node(arg)?;
            emit_push_reg(&mut self.writer, Register::Rax, None);
        }
        let n = args.len();

        if is_variadic_builtin(name) && n > 2 {
            emit_pop_reg(&mut self.writer, Register::Rdi, None);
            emit_pop_reg(&mut self.writer, Register::Rsi, None);
            emit_call_label(&mut self.writer, label, Some("fold: first pair"));
            for _ in 2..n {
                emit_mov_reg_reg(&mut self.writer, Register::Rdi, Register::Rax, None);
                emit_pop_reg(&mut self.writer, Register::Rsi, None);
                emit_call_label(&mut self.writer, label, Some("fold: next operand"));
            }
        } else {
            let in_regs = n.min(6);
            for reg in ARG_REGS.iter().take(in_regs) {
                emit_pop_reg(&mut self.writer, *reg, None);
            }
            emit_call_label(&mut self.writer, label, None);
            if n > 6 {
                emit_add_rsp(&mut self.writer, ((n - 6) * 8) as i32, Some("discard spilled args"));
            }
        }
        Ok(())
    }

    fn generate_closure_call(&mut self, callee: &Node, args: &[Node]) -> Result<(), CompileError> {
        for arg in args.iter().rev() {
            self.generate_node(arg)?;
            emit_push_reg(&mut self.writer, Register::Rax, None);
        }

        self.generate_node(callee)?;
        emit_mov_reg_reg(&mut self.writer, Register::R12, Register::Rax, Some("callee's closure pointer"));

        let n = args.len();
        let in_regs = n.min(6);
        for reg in ARG_REGS.iter().take(in_regs) {
            emit_pop_reg(&mut self.writer, *reg, None);
        }
        emit_mov_reg_membase(
            &mut self.writer,
            Register::Rax,
            Register::R12,
            CLOSURE_CODE_PTR_OFFSET,
            Some("code_ptr"),
        );
        emit_call_reg(&mut self.writer, Register::Rax, None);
        if n > 6 {
            emit_add_rsp(&mut self.writer, ((n - 6) * 8) as i32, Some("discard spilled args"));
        }
        Ok(())
    }

    fn generate_function(
        &mut self,
        name: Option<&str>,
        params: &[String],
        free_vars: &[String],
        body: &[Node],
    ) -> Result<(), CompileError> {
        let n = self.env.next_label_id();
        let func_label = format!("L_func_{}", n);
        let func_end_label = format!("L_func_end_{}", n);

        emit_jmp(&mut self.writer, &func_end_label, Some("skip over function body"));
        emit_label(&mut self.writer, &func_label, name);

        emit_push_reg(&mut self.writer, Register::Rbp, None);
        emit_mov_reg_reg(&mut self.writer, Register::Rbp, Register::Rsp, None);

        self.env.enter_scope();
        let saved_offset = self.env.get_stack_offset();
        self.env.reset_stack_offset(0);

        emit_push_reg(&mut self.writer, Register::R12, Some("save caller's closure pointer"));
        self.env.add_stack_space(8);

        for (i, param) in params.iter().enumerate() {
            if i < 6 {
                emit_push_reg(&mut self.writer, ARG_REGS[i], Some(param));
            } else {
                let abi_offset = 16 + ((i - 6) as i32) * 8;
                emit_mov_reg_membase(&mut self.writer, Register::Rax, Register::Rbp, abi_offset, None);
                emit_push_reg(&mut self.writer, Register::Rax, Some(param));
            }
            self.env.add_stack_variable(param);
        }

        for (i, fv) in free_vars.iter().enumerate() {
            self.env.add_free_variable(fv, i as u32);
        }

        for expr in body {
            self.generate_node(expr)?;
        }

        emit_mov_reg_membase(
            &mut self.writer,
            Register::R12,
            Register::Rbp,
            -8,
            Some("restore caller's closure pointer"),
        );
        emit_mov_reg_reg(&mut self.writer, Register::Rsp, Register::Rbp, None);
        emit_pop_reg(&mut self.writer, Register::Rbp, None);
        emit_ret(&mut self.writer, None);

        self.env.exit_scope();
        self.env.reset_stack_offset(saved_offset);

        emit_label(&mut self.writer, &func_end_label, None);

        self.generate_closure_build(name, &func_label, params.len(), free_vars)
    }

    /// Builds the closure object at the point a `Function` node is
    /// generated: boxes each free variable (or the self-reference
    /// sentinel) and calls `lispvalue_create_closure`.
    fn generate_closure_build(
        &mut self,
        name: Option<&str>,
        func_label: &str,
        arity: usize,
        free_vars: &[String],
    ) -> Result<(), CompileError> {
        let m = free_vars.len();

        for fv in free_vars.iter().rev() {
            if Some(fv.as_str()) == name {
                emit_push_imm(
                    &mut self.writer,
                    0,
                    Some("self-reference; runtime substitutes own closure pointer"),
                );
                continue;
            }
            match self.env.lookup(fv) {
                Some(VarLocation::Global(label)) => {
                    emit_push_global(&mut self.writer, &label, Some(fv));
                }
                Some(VarLocation::Stack(offset)) => {
                    emit_mov_reg_membase(&mut self.writer, Register::Rax, Register::Rbp, offset, Some(fv));
                    self.emit_box_as_cell();
                    emit_push_reg(&mut self.writer, Register::Rax, None);
                }
                Some(VarLocation::Env(index)) => {
                    let slot = CLOSURE_FREE_VARS_BASE + (index as i32) * 8;
                    emit_mov_reg_membase(&mut self.writer, Register::Rax, Register::R12, slot, Some("already-boxed cell"));
                    emit_push_reg(&mut self.writer, Register::Rax, None);
                }
                None => {
                    return Err(CompileError::codegen(format!(
                        "free variable '{}' has no codegen location",
                        fv
                    )));
                }
            }
        }

        emit_mov_reg_label(&mut self.writer, Register::Rdi, func_label, Some("code_ptr"));
        emit_mov_reg_imm(&mut self.writer, Register::Rsi, arity as i64, Some("arity"));
        emit_mov_reg_imm(&mut self.writer, Register::Rdx, m as i64, Some("num_free"));

        let leading_regs = [Register::Rcx, Register::R8, Register::R9];
        let in_regs = m.min(3);
        for reg in leading_regs.iter().take(in_regs) {
            emit_pop_reg(&mut self.writer, *reg, None);
        }
        emit_xor_reg_reg(&mut self.writer, Register::Rax, Register::Rax, Some("vector-register count for variadic call"));
        emit_call_label(&mut self.writer, "lispvalue_create_closure", None);

        if m > 3 {
            emit_add_rsp(&mut self.writer, ((m - 3) * 8) as i32, Some("discard spilled captures"));
        }
        Ok(())
    }

    /// Wraps the value currently in `rax` as a boxed `Cell`, so a mutable
    /// stack local can be captured by reference instead of by value.
    fn emit_box_as_cell(&mut self) {
        emit_mov_reg_reg(&mut self.writer, Register::Rdi, Register::Rax, None);
        emit_call_label(&mut self.writer, "lispcell_create", Some("box captured variable"));
        emit_mov_reg_reg(&mut self.writer, Register::Rdi, Register::Rax, None);
        emit_call_label(&mut self.writer, "lispvalue_create_cell", None);
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn gen(forms: Vec<Node>) -> String {
        let program = Program { forms };
        CodeGenerator::new().generate(&program, "test").unwrap()
    }

    #[test]
    fn literal_int_calls_runtime_constructor() {
        let asm = gen(vec![Node::Literal(LiteralKind::Int(42))]);
        assert!(asm.contains("mov rdi, 42"));
        assert!(asm.contains("call lispvalue_create_int"));
    }

    #[test]
    fn def_reserves_a_global_and_stores_into_it() {
        let asm = gen(vec![Node::Def(Binding {
            name: "x".to_string(),
            value: Box::new(Node::Literal(LiteralKind::Int(1))),
        })]);
        assert!(asm.contains("global_var_x: dq 0"));
        assert!(asm.contains("mov [global_var_x], rax"));
    }

    #[test]
    fn if_without_else_shares_one_label_suffix() {
        let asm = gen(vec![Node::If {
            cond: Box::new(Node::Literal(LiteralKind::Bool(true))),
            then_branch: Box::new(Node::Literal(LiteralKind::Int(1))),
            else_branch: None,
        }]);
        assert!(asm.contains("L_else_"));
        assert!(asm.contains("L_end_if_"));
        let else_pos = asm.find("L_else_0").expect("else label 0 present");
        let end_pos = asm.find("L_end_if_0").expect("matching end_if label 0 present");
        assert!(else_pos < end_pos);
    }

    #[test]
    fn quote_is_a_fatal_codegen_error() {
        let program = Program {
            forms: vec![Node::Quote(Box::new(Node::Literal(LiteralKind::Int(1))))],
        };
        let err = CodeGenerator::new().generate(&program, "test").unwrap_err();
        assert!(matches!(err, CompileError::Codegen { .. }));
    }

    #[test]
    fn string_literal_is_a_fatal_codegen_error() {
        let program = Program {
            forms: vec![Node::Literal(LiteralKind::String("hi".to_string()))],
        };
        let err = CodeGenerator::new().generate(&program, "test").unwrap_err();
        assert!(matches!(err, CompileError::Codegen { .. }));
    }

    #[test]
    fn anonymous_function_emits_jump_over_body_and_closure_build() {
        let asm = gen(vec![Node::Function {
            name: None,
            params: vec!["x".to_string()],
            free_vars: vec![],
            body: vec![Node::Variable("x".to_string())],
        }]);
        assert!(asm.contains("jmp L_func_end_0"));
        assert!(asm.contains("L_func_0:"));
        assert!(asm.contains("call lispvalue_create_closure"));
    }

    #[test]
    fn builtin_variadic_add_folds_left_for_three_or_more_args() {
        let asm = gen(vec![Node::Call {
            callee: Box::new(Node::Variable("+".to_string())),
            args: vec![
                Node::Literal(LiteralKind::Int(1)),
                Node::Literal(LiteralKind::Int(2)),
                Node::Literal(LiteralKind::Int(3)),
            ],
        }]);
        let calls = asm.matches("call lisp_add").count();
        assert_eq!(calls, 2, "three operands fold across two calls");
    }
}
