//! The `FileOp` fold/combine algebra (§4.8).
//!
//! A file path is rewritten by an ordered sequence of regex/replacement
//! operations. Keeping that sequence minimal and deterministic matters
//! because it is replayed verbatim at later interactive instantiation
//! time, so two scripts that differ only in how many intermediate ops
//! they used to reach the same rename must still fold to the same
//! transformation list.

use crate::expression_parser::Expression;
use crate::util::{escape_interpolation, escape_regex};
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileOp {
    pub regex: String,
    pub replacement: String,
}

impl FileOp {
    pub fn new(regex: impl Into<String>, replacement: impl Into<String>) -> Self {
        FileOp {
            regex: regex.into(),
            replacement: replacement.into(),
        }
    }

    fn uses_interpolation(&self) -> bool {
        self.replacement.contains("${")
    }
}

/// `{checksum, ops, expression}`, ordered by expression then checksum then
/// ops (the field declaration order here matches that precedence so the
/// derived `Ord` is the spec's total order directly).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileObject {
    pub expression: Expression,
    pub checksum: String,
    pub ops: Vec<FileOp>,
}

impl FileObject {
    pub fn new(expression: Expression, checksum: String, ops: Vec<FileOp>) -> Self {
        FileObject {
            expression,
            checksum,
            ops,
        }
    }
}

const PASSTHROUGH_REGEX: &str = "^(.*)$";

/// Fold an ordered op sequence applied to `source`, producing either a
/// single synthetic op (when foldable) or the original sequence prefixed
/// by a `checksum -> source` conversion op (when not).
pub fn fold(ops: &[FileOp], source: &str, checksum: &str) -> Vec<FileOp> {
    let last_index = ops.len().saturating_sub(1);
    let interpolating_count = ops
        .iter()
        .enumerate()
        .filter(|(i, op)| {
            let is_exempt_passthrough = *i == last_index && op.regex == PASSTHROUGH_REGEX;
            op.uses_interpolation() && !is_exempt_passthrough
        })
        .count();

    if interpolating_count <= 1 {
        let mut current = source.to_string();
        for op in ops {
            current = apply(op, &current);
        }
        vec![FileOp::new(PASSTHROUGH_REGEX, escape_interpolation(&current))]
    } else {
        let mut result = Vec::with_capacity(ops.len() + 1);
        result.push(FileOp::new(
            format!("^{}$", escape_regex(checksum)),
            source.to_string(),
        ));
        result.extend(ops.iter().cloned());
        result
    }
}

fn apply(op: &FileOp, input: &str) -> String {
    match Regex::new(&op.regex) {
        Ok(re) => re.replace(input, op.replacement.as_str()).into_owned(),
        Err(_) => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_interpolating_op_folds_to_synthetic_passthrough() {
        let ops = vec![FileOp::new(r"^(.*)\.txt$", "${1}.md")];
        let folded = fold(&ops, "notes.txt", "abc123");
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].regex, PASSTHROUGH_REGEX);
        assert_eq!(folded[0].replacement, "notes.md");
    }

    #[test]
    fn two_interpolating_ops_are_not_foldable() {
        let ops = vec![
            FileOp::new(r"^(.*)\.txt$", "${1}.tmp"),
            FileOp::new(r"^(.*)\.tmp$", "${1}.md"),
        ];
        let folded = fold(&ops, "notes.txt", "abc123");
        assert_eq!(folded.len(), 3);
        assert_eq!(folded[0].replacement, "notes.txt");
    }

    #[test]
    fn trailing_full_match_passthrough_is_exempt_from_the_interpolation_count() {
        let ops = vec![
            FileOp::new(r"^(.*)\.txt$", "${1}.md"),
            FileOp::new(PASSTHROUGH_REGEX, "prefix-${1}"),
        ];
        // the trailing passthrough doesn't count, so only one real
        // interpolating op remains and the whole thing still folds.
        let folded = fold(&ops, "notes.txt", "abc123");
        assert_eq!(folded.len(), 1);
    }

    #[test]
    fn non_interpolating_ops_fold_to_literal_result() {
        let ops = vec![FileOp::new("notes", "README")];
        let folded = fold(&ops, "notes.txt", "abc123");
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].replacement, "README.txt");
    }
}
