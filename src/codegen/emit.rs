//! Typed instruction emitters over `AssemblyWriter`. Each function wraps
//! exactly one NASM instruction shape and accepts an optional trailing
//! comment, matching the instruction-emitter API this compiler's code
//! generator is built against.

use super::writer::AssemblyWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm0,
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "rax",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
            Register::Rbx => "rbx",
            Register::Rsp => "rsp",
            Register::Rbp => "rbp",
            Register::Rsi => "rsi",
            Register::Rdi => "rdi",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
            Register::R11 => "r11",
            Register::R12 => "r12",
            Register::R13 => "r13",
            Register::R14 => "r14",
            Register::R15 => "r15",
            Register::Xmm0 => "xmm0",
        }
    }

    fn is_xmm(self) -> bool {
        matches!(self, Register::Xmm0)
    }
}

fn with_comment(line: String, comment: Option<&str>) -> String {
    match comment {
        Some(c) if !c.is_empty() => format!("{} ; {}", line, c),
        _ => line,
    }
}

pub fn emit_push_reg(w: &mut AssemblyWriter, reg: Register, comment: Option<&str>) {
    w.write_text(&with_comment(format!("push {}", reg.name()), comment));
}

pub fn emit_push_imm(w: &mut AssemblyWriter, imm: i64, comment: Option<&str>) {
    w.write_text(&with_comment(format!("push {}", imm), comment));
}

pub fn emit_push_global(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("push qword [{}]", label), comment));
}

pub fn emit_pop_reg(w: &mut AssemblyWriter, reg: Register, comment: Option<&str>) {
    w.write_text(&with_comment(format!("pop {}", reg.name()), comment));
}

pub fn emit_mov_reg_reg(w: &mut AssemblyWriter, dest: Register, src: Register, comment: Option<&str>) {
    if dest.is_xmm() || src.is_xmm() {
        w.write_text(&with_comment(
            format!("movsd {}, {}", dest.name(), src.name()),
            comment,
        ));
    } else {
        w.write_text(&with_comment(
            format!("mov {}, {}", dest.name(), src.name()),
            comment,
        ));
    }
}

pub fn emit_mov_reg_imm(w: &mut AssemblyWriter, dest: Register, imm: i64, comment: Option<&str>) {
    assert!(!dest.is_xmm(), "cannot move an immediate into an xmm register");
    w.write_text(&with_comment(format!("mov {}, {}", dest.name(), imm), comment));
}

pub fn emit_mov_reg_global(w: &mut AssemblyWriter, dest: Register, label: &str, comment: Option<&str>) {
    let op = if dest.is_xmm() { "movsd" } else { "mov" };
    w.write_text(&with_comment(
        format!("{} {}, [{}]", op, dest.name(), label),
        comment,
    ));
}

/// Loads a label's address (not the value it holds) into `dest` — used to
/// materialize a function's entry point as a closure's `code_ptr`.
pub fn emit_mov_reg_label(w: &mut AssemblyWriter, dest: Register, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("mov {}, {}", dest.name(), label), comment));
}

pub fn emit_mov_global_reg(w: &mut AssemblyWriter, label: &str, src: Register, comment: Option<&str>) {
    let op = if src.is_xmm() { "movsd" } else { "mov" };
    w.write_text(&with_comment(
        format!("{} [{}], {}", op, label, src.name()),
        comment,
    ));
}

pub fn emit_mov_reg_membase(
    w: &mut AssemblyWriter,
    dest: Register,
    base: Register,
    offset: i32,
    comment: Option<&str>,
) {
    let op = if dest.is_xmm() { "movsd" } else { "mov" };
    let sign = if offset >= 0 { "+" } else { "-" };
    w.write_text(&with_comment(
        format!("{} {}, [{} {} {}]", op, dest.name(), base.name(), sign, offset.abs()),
        comment,
    ));
}

pub fn emit_mov_membase_reg(
    w: &mut AssemblyWriter,
    base: Register,
    offset: i32,
    src: Register,
    comment: Option<&str>,
) {
    let op = if src.is_xmm() { "movsd" } else { "mov" };
    let sign = if offset >= 0 { "+" } else { "-" };
    w.write_text(&with_comment(
        format!("{} [{} {} {}], {}", op, base.name(), sign, offset.abs(), src.name()),
        comment,
    ));
}

pub fn emit_call_reg(w: &mut AssemblyWriter, target: Register, comment: Option<&str>) {
    w.write_text(&with_comment(format!("call {}", target.name()), comment));
}

pub fn emit_call_label(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("call {}", label), comment));
}

pub fn emit_add_rsp(w: &mut AssemblyWriter, value: i32, comment: Option<&str>) {
    w.write_text(&with_comment(format!("add rsp, {}", value), comment));
}

pub fn emit_sub_rsp(w: &mut AssemblyWriter, value: i32, comment: Option<&str>) {
    w.write_text(&with_comment(format!("sub rsp, {}", value), comment));
}

pub fn emit_global(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("global {}", label), comment));
}

pub fn emit_extern(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("extern {}", label), comment));
}

pub fn emit_label(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("{}:", label), comment));
}

pub fn emit_jmp(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("jmp {}", label), comment));
}

pub fn emit_je(w: &mut AssemblyWriter, label: &str, comment: Option<&str>) {
    w.write_text(&with_comment(format!("je {}", label), comment));
}

pub fn emit_ret(w: &mut AssemblyWriter, comment: Option<&str>) {
    w.write_text(&with_comment("ret".to_string(), comment));
}

pub fn emit_syscall(w: &mut AssemblyWriter, comment: Option<&str>) {
    w.write_text(&with_comment("syscall".to_string(), comment));
}

pub fn emit_cmp_reg_imm(w: &mut AssemblyWriter, reg: Register, imm: i32, comment: Option<&str>) {
    w.write_text(&with_comment(format!("cmp {}, {}", reg.name(), imm), comment));
}

pub fn emit_xor_reg_reg(w: &mut AssemblyWriter, dest: Register, src: Register, comment: Option<&str>) {
    w.write_text(&with_comment(
        format!("xor {}, {}", dest.name(), src.name()),
        comment,
    ));
}

pub fn emit_comment(w: &mut AssemblyWriter, comment: &str) {
    w.write_text(&format!("; {}", comment));
}

pub fn emit_data_label(w: &mut AssemblyWriter, label: &str) {
    w.write_data(&format!("{}:", label));
}

pub fn emit_data_dq_imm(w: &mut AssemblyWriter, label: &str, value: i64) {
    w.write_data(&format!("{}: dq {}", label, value));
}

pub fn emit_data_dq_float(w: &mut AssemblyWriter, label: &str, value: f64) {
    w.write_data(&format!("{}: dq {:?}", label, value));
}

pub fn emit_data_string(w: &mut AssemblyWriter, label: &str, value: &str) {
    let bytes: Vec<String> = value.bytes().map(|b| b.to_string()).collect();
    if bytes.is_empty() {
        w.write_data(&format!("{}: db 0", label));
    } else {
        w.write_data(&format!("{}: db {}, 0", label, bytes.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_with_colon_are_not_tab_indented() {
        let mut w = AssemblyWriter::new();
        emit_label(&mut w, "L_func_0", None);
        assert!(w.consolidate("p").contains("L_func_0:\n"));
        assert!(!w.consolidate("p").contains("\tL_func_0:"));
    }

    #[test]
    fn membase_formats_negative_offsets_with_minus() {
        let mut w = AssemblyWriter::new();
        emit_mov_reg_membase(&mut w, Register::Rax, Register::Rbp, -8, None);
        assert!(w.consolidate("p").contains("mov rax, [rbp - 8]"));
    }

    #[test]
    fn comment_is_appended_when_present() {
        let mut w = AssemblyWriter::new();
        emit_push_reg(&mut w, Register::R12, Some("save closure ptr"));
        assert!(w.consolidate("p").contains("push r12 ; save closure ptr"));
    }
}
