//! Recursive-descent parser: token stream to AST, with inline scope
//! resolution and free-variable tracking (see `super::env`).

use super::env::{ParserEnv, ScopeKind};
use crate::ast::{Binding, Location, LiteralKind, Node, Program, Token, TokenKind};
use crate::compiler::error::Diagnostic;
use crate::debug;

/// Names pre-bound in the global scope so references to them resolve
/// without a preceding `def`.
const BUILTINS: &[&str] = &[
    "+",
    "-",
    "*",
    "/",
    "=",
    "<",
    ">",
    "<=",
    ">=",
    "let",
    "lambda",
    "if",
    "def",
    "quote",
    "print-debug",
];

fn populate_builtins(env: &mut ParserEnv) {
    for name in BUILTINS {
        env.define(*name, Node::Placeholder);
    }
}

/// Parses a leading integer from `lexeme` the way `strtol` does: an
/// optional sign followed by digits, stopping at the first non-digit
/// rather than rejecting the whole token. A lexeme like `1e10` (which
/// the lexer accepts as `Number` but which isn't a float literal either,
/// for lack of a `.`) truncate-parses to `1` instead of erroring.
fn parse_leading_i64(lexeme: &str) -> Option<i64> {
    let bytes = lexeme.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    lexeme[..i].parse::<i64>().ok()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    env: ParserEnv,
    diagnostics: Vec<Diagnostic>,
    panic_mode: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();
        let mut env = ParserEnv::new();
        populate_builtins(&mut env);
        Self {
            tokens,
            pos: 0,
            env,
            diagnostics: Vec::new(),
            panic_mode: false,
        }
    }

    pub fn parse_program(mut self) -> (Program, Vec<Diagnostic>) {
        let mut forms = Vec::new();
        while !self.is_at_end() {
            match self.parse_expr() {
                Some(node) if !self.panic_mode => forms.push(node),
                _ => {}
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        debug::log_parser(&format!(
            "parsed {} top-level form(s), {} diagnostic(s)",
            forms.len(),
            self.diagnostics.len()
        ));
        (Program { forms }, self.diagnostics)
    }

    // -- token-stream primitives -------------------------------------

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let tok = self.peek().clone();
            self.error(
                tok.location,
                format!("expected {:?}, found '{}'", kind, tok.lexeme),
            );
            None
        }
    }

    fn expect_symbol(&mut self) -> Option<Token> {
        if self.check(TokenKind::Symbol) {
            Some(self.advance())
        } else {
            let tok = self.peek().clone();
            self.error(
                tok.location,
                format!("expected a symbol, found '{}'", tok.lexeme),
            );
            None
        }
    }

    fn error(&mut self, location: Location, message: impl Into<String>) {
        if self.panic_mode {
            return;
        }
        let message = message.into();
        debug::log_parser(&format!("error at [{}]: {}", location.start, message));
        self.diagnostics.push(Diagnostic::error(location, message));
        self.panic_mode = true;
    }

    fn warning(&mut self, location: Location, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(location, message));
    }

    /// Skips tokens until the next `(` or `Eof`, per the panic-mode
    /// recovery strategy.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.is_at_end() && !self.check(TokenKind::LParen) {
            self.advance();
        }
    }

    // -- grammar -------------------------------------------------------

    fn parse_expr(&mut self) -> Option<Node> {
        match self.peek().kind {
            TokenKind::LParen => self.parse_list(),
            TokenKind::Quote => {
                self.advance();
                let inner = self.parse_expr()?;
                Some(Node::Quote(Box::new(inner)))
            }
            TokenKind::Number => self.parse_number(),
            TokenKind::String => self.parse_string(),
            TokenKind::Symbol => self.parse_symbol(),
            TokenKind::Eof => {
                let loc = self.peek().location;
                self.error(loc, "unexpected end of input");
                None
            }
            _ => {
                let tok = self.peek().clone();
                self.error(tok.location, format!("unexpected token '{}'", tok.lexeme));
                self.advance();
                None
            }
        }
    }

    fn parse_number(&mut self) -> Option<Node> {
        let tok = self.advance();
        if tok.lexeme.contains('.') {
            match tok.lexeme.parse::<f64>() {
                Ok(v) => Some(Node::Literal(LiteralKind::Float(v))),
                Err(_) => {
                    self.error(tok.location, format!("invalid float literal '{}'", tok.lexeme));
                    None
                }
            }
        } else {
            match parse_leading_i64(&tok.lexeme) {
                Some(v) => Some(Node::Literal(LiteralKind::Int(v))),
                None => {
                    self.error(tok.location, format!("invalid integer literal '{}'", tok.lexeme));
                    None
                }
            }
        }
    }

    fn parse_string(&mut self) -> Option<Node> {
        let tok = self.advance();
        let inner = tok
            .lexeme
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&tok.lexeme)
            .to_string();
        Some(Node::Literal(LiteralKind::String(inner)))
    }

    fn parse_symbol(&mut self) -> Option<Node> {
        let tok = self.advance();
        match tok.lexeme.as_str() {
            "#t" => Some(Node::Literal(LiteralKind::Bool(true))),
            "#f" => Some(Node::Literal(LiteralKind::Bool(false))),
            name => {
                if self.env.lookup(name).is_some() {
                    Some(Node::Variable(name.to_string()))
                } else {
                    self.error(tok.location, format!("undefined variable: '{}'", name));
                    None
                }
            }
        }
    }

    fn parse_list(&mut self) -> Option<Node> {
        self.advance(); // '('
        if self.check(TokenKind::RParen) {
            self.advance();
            return Some(Node::Literal(LiteralKind::Bool(false)));
        }

        if self.check(TokenKind::Symbol) {
            match self.peek().lexeme.as_str() {
                "if" => return self.parse_if(),
                "def" => return self.parse_def(),
                "let" => return self.parse_let(),
                "lambda" => return self.parse_lambda(),
                "quote" => return self.parse_quote(),
                _ => {}
            }
        }
        self.parse_call()
    }

    fn parse_if(&mut self) -> Option<Node> {
        self.advance(); // 'if'
        let cond = self.parse_expr()?;
        let then_branch = self.parse_expr()?;
        let else_branch = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if !self.check(TokenKind::RParen) {
            let tok = self.peek().clone();
            self.error(tok.location, "if: too many sub-expressions");
            return None;
        }
        self.advance(); // ')'
        Some(Node::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    /// Parses the parameter list and body of a `lambda`-shaped form. The
    /// opening `(` of the form (`lambda` or the sugar `def`) has already
    /// been consumed by the caller; `(` of the parameter list has not.
    fn parse_lambda_tail(&mut self, name: Option<String>, params: Vec<String>) -> Option<Node> {
        self.env.push(ScopeKind::Function);
        for p in &params {
            self.env.define(p.clone(), Node::Placeholder);
        }

        let mut body = Vec::new();
        while !self.check(TokenKind::RParen) {
            if self.is_at_end() {
                let tok = self.peek().clone();
                self.error(tok.location, "unexpected end of input in function body");
                self.env.pop();
                return None;
            }
            match self.parse_expr() {
                Some(node) => body.push(node),
                None => {
                    self.env.pop();
                    return None;
                }
            }
        }

        if body.is_empty() {
            let tok = self.peek().clone();
            self.error(tok.location, "function body must contain at least one expression");
            self.env.pop();
            return None;
        }

        let free_vars = self.env.innermost_function_free_vars();
        self.env.pop();

        Some(Node::Function {
            name,
            params,
            free_vars,
            body,
        })
    }

    fn parse_params(&mut self) -> Option<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            params.push(self.expect_symbol()?.lexeme);
        }
        self.advance(); // ')'
        Some(params)
    }

    fn parse_lambda(&mut self) -> Option<Node> {
        self.advance(); // 'lambda'
        let params = self.parse_params()?;
        let func = self.parse_lambda_tail(None, params)?;
        self.expect(TokenKind::RParen)?;
        Some(func)
    }

    fn define_global_checked(&mut self, name: String, value: Node, location: Location) {
        if self.env.is_bound_in_innermost(&name) {
            self.warning(location, format!("redefinition of global '{}'", name));
        }
        self.env.define(name, value);
    }

    fn parse_def(&mut self) -> Option<Node> {
        let def_tok = self.advance(); // 'def'
        if !self.env.is_global_scope() {
            self.error(def_tok.location, "def: only allowed at the top level");
            return None;
        }

        if self.check(TokenKind::LParen) {
            // (def (name param…) body…)
            self.advance();
            let name = self.expect_symbol()?.lexeme;
            let already_defined = self.env.is_bound_in_innermost(&name);
            let mut params = Vec::new();
            while !self.check(TokenKind::RParen) {
                params.push(self.expect_symbol()?.lexeme);
            }
            self.advance(); // ')' closing param list

            self.env.push(ScopeKind::Let);
            self.env.define(name.clone(), Node::Placeholder);
            let func = self.parse_lambda_tail(Some(name.clone()), params)?;
            self.env.pop();

            if !self.check(TokenKind::RParen) {
                let tok = self.peek().clone();
                self.error(tok.location, "def: expected ')'");
                return None;
            }
            self.advance();

            if already_defined {
                self.warning(def_tok.location, format!("redefinition of global '{}'", name));
            }
            self.env.define(name.clone(), func.clone());
            Some(Node::Def(Binding {
                name,
                value: Box::new(func),
            }))
        } else {
            let name_tok = self.expect_symbol()?;
            let name = name_tok.lexeme;
            let already_defined = self.env.is_bound_in_innermost(&name);

            self.env.push(ScopeKind::Let);
            self.env.define(name.clone(), Node::Placeholder);
            let value = self.parse_expr()?;
            self.env.pop();

            if !self.check(TokenKind::RParen) {
                let tok = self.peek().clone();
                self.error(tok.location, "def: expected ')'");
                return None;
            }
            self.advance();

            if already_defined {
                self.warning(def_tok.location, format!("redefinition of global '{}'", name));
            }
            self.env.define(name.clone(), value.clone());
            Some(Node::Def(Binding {
                name,
                value: Box::new(value),
            }))
        }
    }

    fn parse_let(&mut self) -> Option<Node> {
        self.advance(); // 'let'
        self.expect(TokenKind::LParen)?;

        self.env.push(ScopeKind::Let);
        let mut bindings = Vec::new();
        while !self.check(TokenKind::RParen) {
            if self.expect(TokenKind::LParen).is_none() {
                self.env.pop();
                return None;
            }
            let name = match self.expect_symbol() {
                Some(t) => t.lexeme,
                None => {
                    self.env.pop();
                    return None;
                }
            };
            let value = match self.parse_expr() {
                Some(v) => v,
                None => {
                    self.env.pop();
                    return None;
                }
            };
            if self.expect(TokenKind::RParen).is_none() {
                self.env.pop();
                return None;
            }
            self.env.define(name.clone(), Node::Placeholder);
            bindings.push(Binding {
                name,
                value: Box::new(value),
            });
        }
        self.advance(); // ')' closing bindings list

        let mut body = Vec::new();
        while !self.check(TokenKind::RParen) {
            if self.is_at_end() {
                let tok = self.peek().clone();
                self.error(tok.location, "unexpected end of input in let body");
                self.env.pop();
                return None;
            }
            match self.parse_expr() {
                Some(node) => body.push(node),
                None => {
                    self.env.pop();
                    return None;
                }
            }
        }

        if body.is_empty() {
            let tok = self.peek().clone();
            self.error(tok.location, "let body must contain at least one expression");
            self.env.pop();
            return None;
        }
        self.env.pop();
        self.advance(); // ')' closing let form

        Some(Node::Let { bindings, body })
    }

    fn parse_quote(&mut self) -> Option<Node> {
        self.advance(); // 'quote'
        let inner = self.parse_quoted()?;
        self.expect(TokenKind::RParen)?;
        Some(Node::Quote(Box::new(inner)))
    }

    /// Parses the content of a `quote`d form (or a `'`-prefixed
    /// expression): structurally faithful, but without resolving symbol
    /// references against the environment — quoted data is never
    /// evaluated, so an unbound symbol inside it is not an error.
    fn parse_quoted(&mut self) -> Option<Node> {
        match self.peek().kind {
            TokenKind::LParen => {
                self.advance();
                if self.check(TokenKind::RParen) {
                    self.advance();
                    return Some(Node::Literal(LiteralKind::Bool(false)));
                }
                let mut items = Vec::new();
                while !self.check(TokenKind::RParen) {
                    if self.is_at_end() {
                        let tok = self.peek().clone();
                        self.error(tok.location, "quote: unterminated list");
                        return None;
                    }
                    items.push(self.parse_quoted()?);
                }
                self.advance();
                let mut it = items.into_iter();
                let callee = it.next().expect("non-empty list checked above");
                Some(Node::Call {
                    callee: Box::new(callee),
                    args: it.collect(),
                })
            }
            TokenKind::Quote => {
                self.advance();
                let inner = self.parse_quoted()?;
                Some(Node::Quote(Box::new(inner)))
            }
            TokenKind::Number => self.parse_number(),
            TokenKind::String => self.parse_string(),
            TokenKind::Symbol => {
                let tok = self.advance();
                match tok.lexeme.as_str() {
                    "#t" => Some(Node::Literal(LiteralKind::Bool(true))),
                    "#f" => Some(Node::Literal(LiteralKind::Bool(false))),
                    name => Some(Node::Variable(name.to_string())),
                }
            }
            _ => {
                let tok = self.peek().clone();
                self.error(tok.location, format!("unexpected token '{}' inside quote", tok.lexeme));
                None
            }
        }
    }

    fn parse_call(&mut self) -> Option<Node> {
        let callee = self.parse_expr()?;
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            if self.is_at_end() {
                let tok = self.peek().clone();
                self.error(tok.location, "unexpected end of input in call");
                return None;
            }
            args.push(self.parse_expr()?);
        }
        self.advance(); // ')'
        Some(Node::Call {
            callee: Box::new(callee),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::tokenize;

    fn parse_source(src: &str) -> (Program, Vec<Diagnostic>) {
        let tokens = tokenize(src).expect("lexing should succeed for these fixtures");
        Parser::new(tokens).parse_program()
    }

    #[test]
    fn free_variable_capture_transits_through_a_nested_lambda() {
        let (program, diagnostics) =
            parse_source("(def z 1) (let ((x 10)) (lambda (y) (+ x y z)))");
        assert!(diagnostics.is_empty());
        assert_eq!(program.forms.len(), 2);

        let Node::Let { body, .. } = &program.forms[1] else {
            panic!("expected a Let node");
        };
        let Node::Function { params, free_vars, .. } = &body[0] else {
            panic!("expected a Function node in the let body");
        };
        assert_eq!(params, &vec!["y".to_string()]);
        // "z" is a global def, resolved by label rather than captured;
        // only "x" (bound in the enclosing `let`) is a free variable.
        assert_eq!(free_vars, &vec!["x".to_string()]);
    }

    #[test]
    fn redefining_a_global_is_a_warning_not_an_error() {
        let (program, diagnostics) = parse_source("(def x 1) (def x 2)");
        assert_eq!(program.forms.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error);
        assert!(diagnostics[0].message.contains("redefinition"));
    }

    #[test]
    fn panic_mode_resyncs_at_the_next_open_paren() {
        let (program, diagnostics) = parse_source(") (def x 1)");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error);
        assert_eq!(program.forms.len(), 1);
        match &program.forms[0] {
            Node::Def(binding) => assert_eq!(binding.name, "x"),
            other => panic!("expected the well-formed def to survive recovery, got {:?}", other),
        }
    }

    #[test]
    fn quote_does_not_require_quoted_symbols_to_be_bound() {
        let (program, diagnostics) = parse_source("(quote (foo bar))");
        assert!(diagnostics.is_empty());
        assert_eq!(program.forms.len(), 1);
        assert!(matches!(program.forms[0], Node::Quote(_)));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let (_program, diagnostics) = parse_source("(no-such-thing)");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error);
        assert!(diagnostics[0].message.contains("undefined variable"));
    }
}
