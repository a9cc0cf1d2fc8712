//! Code-generation environment: tracks where a variable lives (a global
//! label, a stack slot, or a slot in the current closure's captured-value
//! array) and the bookkeeping needed to lay out a function's frame.

use std::collections::HashMap;

/// Where a resolved variable's value can be found at code-generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarLocation {
    /// A label in `.data` holding one boxed-value pointer.
    Global(String),
    /// A byte offset from `rbp` (negative for locals below the frame
    /// pointer).
    Stack(i32),
    /// Index into the current closure's captured-variable array.
    Env(u32),
}

struct Scope {
    bindings: HashMap<String, VarLocation>,
}

/// A stack of lexical scopes plus the running stack-offset counter used
/// while emitting a function (or top-level form) body.
pub struct CodeGenEnv {
    scopes: Vec<Scope>,
    stack_offset: i32,
    label_counter: u64,
}

impl CodeGenEnv {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                bindings: HashMap::new(),
            }],
            stack_offset: 0,
            label_counter: 0,
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope {
            bindings: HashMap::new(),
        });
    }

    pub fn exit_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot exit the root scope");
        self.scopes.pop();
    }

    /// Sanitizes `name` into a safe assembly label suffix: anything that
    /// isn't alphanumeric or `_` becomes `_`.
    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }

    pub fn add_global_variable(&mut self, name: &str) -> String {
        let label = format!("global_var_{}", Self::sanitize(name));
        self.scopes[0]
            .bindings
            .insert(name.to_string(), VarLocation::Global(label.clone()));
        label
    }

    /// Reserves a new stack slot for `name` and returns its offset.
    pub fn add_stack_variable(&mut self, name: &str) -> i32 {
        self.stack_offset -= 8;
        let offset = self.stack_offset;
        self.innermost_mut()
            .bindings
            .insert(name.to_string(), VarLocation::Stack(offset));
        offset
    }

    /// Reserves `bytes` of stack space without creating a binding (used
    /// around saving caller-owned registers like the closure pointer).
    pub fn add_stack_space(&mut self, bytes: i32) {
        assert_eq!(bytes % 8, 0, "stack space must be a multiple of 8");
        self.stack_offset -= bytes;
    }

    pub fn remove_stack_space(&mut self, bytes: i32) {
        assert_eq!(bytes % 8, 0, "stack space must be a multiple of 8");
        self.stack_offset += bytes;
    }

    pub fn add_free_variable(&mut self, name: &str, index: u32) {
        self.innermost_mut()
            .bindings
            .insert(name.to_string(), VarLocation::Env(index));
    }

    pub fn lookup(&self, name: &str) -> Option<VarLocation> {
        for scope in self.scopes.iter().rev() {
            if let Some(loc) = scope.bindings.get(name) {
                return Some(loc.clone());
            }
        }
        None
    }

    pub fn get_stack_offset(&self) -> i32 {
        self.stack_offset
    }

    pub fn set_stack_offset(&mut self, offset: i32) {
        self.stack_offset = offset;
    }

    pub fn reset_stack_offset(&mut self, offset: i32) {
        self.stack_offset = offset;
    }

    fn innermost_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    /// Mints the next numeric suffix for a generated label. A single
    /// counter is shared by every label prefix (`L_func_`, `L_else_`,
    /// `L_end_if_`, `L_float_`, …) so suffixes never collide across
    /// prefixes.
    pub fn next_label_id(&mut self) -> u64 {
        let id = self.label_counter;
        self.label_counter += 1;
        id
    }

    pub fn next_label(&mut self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_label_id())
    }
}

impl Default for CodeGenEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_global_labels() {
        let mut env = CodeGenEnv::new();
        let label = env.add_global_variable("make-adder!");
        assert_eq!(label, "global_var_make_adder_");
    }

    #[test]
    fn stack_offsets_decrease_and_scopes_shadow() {
        let mut env = CodeGenEnv::new();
        assert_eq!(env.add_stack_variable("x"), -8);
        env.enter_scope();
        assert_eq!(env.add_stack_variable("x"), -16);
        assert_eq!(env.lookup("x"), Some(VarLocation::Stack(-16)));
        env.exit_scope();
        assert_eq!(env.lookup("x"), Some(VarLocation::Stack(-8)));
    }

    #[test]
    fn labels_share_one_monotonic_counter() {
        let mut env = CodeGenEnv::new();
        assert_eq!(env.next_label("L_func_"), "L_func_0");
        assert_eq!(env.next_label("L_else_"), "L_else_1");
        assert_eq!(env.next_label("L_func_"), "L_func_2");
    }
}
