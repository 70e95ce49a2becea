#![deny(clippy::all)]

//! Project-archetype compiler core.
//!
//! Ingests a scripted archetype definition — a tree of interactive input
//! declarations, conditional blocks, variable/preset assignments, and
//! output directives — and emits a pre-resolved, validated, de-duplicated
//! archetype image suitable for later interactive instantiation.

pub mod chars;
pub mod compiler;
pub mod error;
pub mod expression_parser;
pub mod external;
pub mod image;
pub mod invoker;
pub mod node;
pub mod output;
pub mod scope;
pub mod util;
pub mod validator;
pub mod value;
pub mod variations;

pub use compiler::{CompileOptions, ScriptCompiler};
pub use error::{CompileError, ErrorKind, ValidationError, ValidationException};
pub use expression_parser::{parse, EvalError, Expression, FALSE, TRUE};
pub use external::{
    ArchetypeArchive, ArchiveError, Descriptor, Filesystem, LoaderError, ScriptLoader, ScriptSource,
};
pub use image::Image;
pub use node::{guard_of, Node, NodeGroup, NodeKind};
pub use scope::{Context, Scope, ScopeValue, ValueOrigin};
pub use validator::validate;
pub use value::{CoerceError, Value, ValueKind};
pub use variations::Variation;
