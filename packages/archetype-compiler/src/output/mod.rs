//! Output renderer (C8): resolves FILE/TEMPLATE/FILES/TEMPLATES directives
//! into content-addressed blobs, folding each file's op sequence and
//! multiplying across transformation variations.

pub mod blobs;
pub mod fileops;

pub use blobs::{cartesian, resolve_file, IncludeExclude, Variant};
pub use fileops::{fold, FileObject, FileOp};
