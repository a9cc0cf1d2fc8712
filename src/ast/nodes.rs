//! Abstract syntax tree for the surface language: a small Lisp of
//! s-expressions with literals, variables, conditionals, local and global
//! bindings, and first-class lexically-scoped functions.

use super::types::LiteralKind;

/// The root of a compiled program: a flat sequence of top-level forms.
#[derive(Debug, Clone)]
pub struct Program {
    pub forms: Vec<Node>,
}

/// A single variable binding, as it appears in `def` and `let`.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub value: Box<Node>,
}

/// One node of the abstract syntax tree.
///
/// `Variable` carries only the resolved name; the parser environment that
/// resolved it (scope chain, free-variable bookkeeping) does not survive
/// past parsing. Code generation re-resolves names against its own
/// stack-offset/global-label/capture-index environment (see
/// `codegen::env::CodeGenEnv`), so no back-pointer into the parser's
/// environment is carried on the node.
#[derive(Debug, Clone)]
pub enum Node {
    Literal(LiteralKind),

    Variable(String),

    /// A `lambda`, or the desugared body of a `(def (name params…) …)`.
    Function {
        /// `None` for an anonymous lambda; `Some(name)` for a named
        /// function def, so codegen can let the function capture its own
        /// closure pointer for recursive self-calls.
        name: Option<String>,
        params: Vec<String>,
        /// Names captured from an enclosing non-global scope, in the
        /// order codegen assigns them capture indices.
        free_vars: Vec<String>,
        body: Vec<Node>,
    },

    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },

    If {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },

    Def(Binding),

    Let {
        bindings: Vec<Binding>,
        body: Vec<Node>,
    },

    /// Parsed but never reachable by codegen; reaching this variant during
    /// code generation is a fatal error.
    Quote(Box<Node>),

    /// Sentinel bound in the parser environment for names that are in
    /// scope but whose value is not yet needed: function parameters
    /// pending a body, and a function's own name during its own body
    /// (so recursive references resolve without a real value).
    Placeholder,
}

impl Node {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Node::Placeholder)
    }
}
