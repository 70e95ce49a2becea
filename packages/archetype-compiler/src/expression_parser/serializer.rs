//! Serialization back to the condition mini-language's canonical text form.
//!
//! `Expression::literal()` already produces this canonical string (it is
//! also the basis of `Expression`'s equality and ordering); this module is
//! the public, named entry point callers reach for instead of reaching
//! into `ast.rs` directly.

use super::ast::Expression;

/// Render an expression to its canonical source-level string.
pub fn serialize(expr: &Expression) -> String {
    expr.literal()
}
