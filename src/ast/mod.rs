//! Abstract Syntax Tree for the compiled language.
//!
//! - [`nodes`]: the tree itself — `Program`, `Node`, `Binding`.
//! - [`types`]: source positions, tokens, and literal payload types shared
//!   with the lexer and parser.

pub mod nodes;
pub mod types;

pub use nodes::{Binding, Node, Program};
pub use types::{Location, Position, Token, TokenKind, LiteralKind};
