//! Parser-time lexical environment: a scope stack used to resolve
//! variable references and to determine, for each function body, which
//! outer names it captures.

use crate::ast::Node;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// A `lambda` body (including the desugared body of `(def (f …) …)`).
    Function,
    /// A `let` body — shares its enclosing function's capture set.
    Let,
}

struct Scope {
    kind: ScopeKind,
    bindings: HashMap<String, Node>,
    /// Populated only for `Function` scopes: names captured from a
    /// non-global ancestor, in first-reference order.
    free_vars: Vec<String>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            bindings: HashMap::new(),
            free_vars: Vec::new(),
        }
    }
}

/// The parser's scope stack. Scope 0 is always the global scope and is
/// never popped.
pub struct ParserEnv {
    scopes: Vec<Scope>,
}

impl ParserEnv {
    /// Creates a fresh environment with an empty global scope. Callers
    /// populate it with builtin placeholders before parsing begins.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global)],
        }
    }

    pub fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    pub fn pop(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    /// Binds `name` in the innermost scope. At the top level (only one
    /// scope present) this defines a global.
    pub fn define(&mut self, name: impl Into<String>, value: Node) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .bindings
            .insert(name.into(), value);
    }

    /// True if `name` is bound in the innermost scope specifically (used
    /// to detect global redefinition, which is a warning rather than an
    /// error).
    pub fn is_bound_in_innermost(&self, name: &str) -> bool {
        self.scopes
            .last()
            .expect("scope stack is never empty")
            .bindings
            .contains_key(name)
    }

    pub fn is_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Resolves `name` against the scope chain, innermost first.
    ///
    /// If the binding is found in a non-global ancestor scope, `name` is
    /// recorded as a free variable on every `Function` scope strictly
    /// between the binding site and the point of use — this is how a
    /// capture propagates through nested lambdas that merely pass a
    /// variable through to a still-deeper closure.
    pub fn lookup(&mut self, name: &str) -> Option<Node> {
        let found_idx = (0..self.scopes.len())
            .rev()
            .find(|&i| self.scopes[i].bindings.contains_key(name))?;

        if found_idx != 0 {
            for scope in &mut self.scopes[found_idx + 1..] {
                if scope.kind == ScopeKind::Function && !scope.free_vars.iter().any(|n| n == name)
                {
                    scope.free_vars.push(name.to_string());
                }
            }
        }

        self.scopes[found_idx].bindings.get(name).cloned()
    }

    /// The free-variable list accumulated so far for the innermost
    /// `Function` scope. Must be called while that scope is still on the
    /// stack (i.e. before popping it at the end of `parse_lambda_body`).
    pub fn innermost_function_free_vars(&self) -> Vec<String> {
        self.scopes
            .iter()
            .rev()
            .find(|s| s.kind == ScopeKind::Function)
            .map(|s| s.free_vars.clone())
            .unwrap_or_default()
    }
}

impl Default for ParserEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_transits_through_an_intervening_function_scope() {
        let mut env = ParserEnv::new();
        env.push(ScopeKind::Function);
        env.define("a", Node::Placeholder);
        env.push(ScopeKind::Function); // doesn't bind "a" itself
        env.push(ScopeKind::Function); // innermost; references "a"

        assert!(env.lookup("a").is_some());
        assert_eq!(env.innermost_function_free_vars(), vec!["a".to_string()]);

        env.pop(); // back to the middle scope
        assert_eq!(
            env.innermost_function_free_vars(),
            vec!["a".to_string()],
            "the pass-through scope must also record the capture, not just the innermost one"
        );
    }

    #[test]
    fn global_reference_is_never_recorded_as_a_free_variable() {
        let mut env = ParserEnv::new();
        env.define("g", Node::Placeholder);
        env.push(ScopeKind::Function);

        assert!(env.lookup("g").is_some());
        assert!(env.innermost_function_free_vars().is_empty());
    }

    #[test]
    fn let_scope_passes_capture_through_without_binding_it() {
        let mut env = ParserEnv::new();
        env.push(ScopeKind::Function);
        env.define("x", Node::Placeholder);
        env.push(ScopeKind::Let);
        env.push(ScopeKind::Function);

        assert!(env.lookup("x").is_some());
        assert_eq!(env.innermost_function_free_vars(), vec!["x".to_string()]);
    }

    #[test]
    fn lookup_of_unbound_name_returns_none() {
        let mut env = ParserEnv::new();
        assert!(env.lookup("nope").is_none());
    }
}
