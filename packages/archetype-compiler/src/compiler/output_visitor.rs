//! Output visitor (C6 + C8): resolves FILE/TEMPLATE/FILES/TEMPLATES
//! directives against the `Filesystem`/`ArchetypeArchive` collaborators,
//! folds each file's op sequence, and emits a content-addressed `<output>`
//! subtree into the image.
//!
//! TEMPLATE/TEMPLATES nodes are handled identically to FILE/FILES at this
//! layer — the distinction (raw copy vs. templated substitution) belongs
//! to the host's instantiation step, not to image rendering, which only
//! needs the resolved blob and its op sequence.

use crate::expression_parser::{Expression, TRUE};
use crate::external::{ArchetypeArchive, Filesystem};
use crate::image::Image;
use crate::node::{guard_of, Node, NodeKind};
use crate::output::blobs::{cartesian, resolve_file, IncludeExclude, Variant};
use crate::output::fileops::FileOp;
use std::path::Path;

/// The guard under which `node` itself is reached: the product of every
/// enclosing CONDITION's expression (mirrors `refs_prune`'s reachability
/// guard, without the INPUT_OPTION equality injection that only applies
/// to INPUT nodes).
fn ancestor_guard(node: &Node) -> Expression {
    node.ancestors(|a| a.kind() == NodeKind::Condition)
        .iter()
        .map(guard_of)
        .fold(TRUE.clone(), |acc, g| acc.and(&g))
}

fn ops_of(node: &Node) -> Vec<FileOp> {
    node.children_matching(|c| c.kind() == NodeKind::Replace)
        .iter()
        .map(|r| FileOp::new(r.attribute("regex").unwrap_or_default(), r.attribute("replacement").unwrap_or_default()))
        .collect()
}

/// Every `<transformation id="...">` node anywhere in the source tree,
/// as a guarded alternative carrying its own ordered REPLACE ops.
fn transformation_variants(source_root: &Node, id: &str) -> Vec<Variant<Vec<FileOp>>> {
    let matches: Vec<Variant<Vec<FileOp>>> = source_root
        .collect(|n| n.kind() == NodeKind::Transformation && n.attribute("id").as_deref() == Some(id))
        .iter()
        .map(|t| Variant {
            value: ops_of(t),
            guard: ancestor_guard(t),
        })
        .collect();
    if matches.is_empty() {
        // An id with no matching TRANSFORMATION contributes no ops rather
        // than failing the whole directive.
        vec![Variant {
            value: Vec::new(),
            guard: TRUE.clone(),
        }]
    } else {
        matches
    }
}

/// The distinct (ops, guard) combinations a file directive resolves to:
/// one combination per TRANSFORMATION variant when `transformations`
/// names one or more ids (Cartesian-multiplied across ids), or the
/// node's own direct REPLACE children under a TRUE guard otherwise.
fn op_combinations(source_root: &Node, file_node: &Node) -> Vec<(Vec<FileOp>, Expression)> {
    let ids = file_node.attribute("transformations").unwrap_or_default();
    let ids: Vec<&str> = ids.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if ids.is_empty() {
        return vec![(ops_of(file_node), TRUE.clone())];
    }
    let groups: Vec<Vec<Variant<Vec<FileOp>>>> = ids
        .iter()
        .map(|id| transformation_variants(source_root, id))
        .collect();
    cartesian(groups)
        .into_iter()
        .map(|combo| (combo.value.into_iter().flatten().collect(), combo.guard))
        .collect()
}

fn include_exclude_of(node: &Node) -> IncludeExclude {
    IncludeExclude {
        includes: node
            .children_matching(|c| c.kind() == NodeKind::Include)
            .iter()
            .filter_map(|c| c.attribute("pattern"))
            .collect(),
        excludes: node
            .children_matching(|c| c.kind() == NodeKind::Exclude)
            .iter()
            .filter_map(|c| c.attribute("pattern"))
            .collect(),
    }
}

fn join_relative(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{suffix}")
    } else {
        format!("{prefix}/{suffix}")
    }
}

/// Every `(archive path, relative target name)` pair a FILE/FILES
/// directive resolves to: a single pair for a bare `path` attribute, or
/// one per archive entry selected by `directory` + its INCLUDE/EXCLUDE
/// children for a directory scan.
fn resolve_targets(archive: &dyn ArchetypeArchive, file_node: &Node) -> Vec<(String, String)> {
    let to_prefix = file_node.attribute("to").unwrap_or_default();
    if let Some(directory) = file_node.attribute("directory") {
        let prefix = if directory.ends_with('/') {
            directory.clone()
        } else {
            format!("{directory}/")
        };
        let candidates: Vec<String> = archive
            .paths()
            .into_iter()
            .filter(|p| p.starts_with(&prefix))
            .collect();
        let rule = include_exclude_of(file_node);
        rule.select(&candidates)
            .into_iter()
            .map(|p| {
                let relative = p.strip_prefix(&prefix).unwrap_or(p);
                (p.clone(), join_relative(&to_prefix, relative))
            })
            .collect()
    } else {
        let source_path = file_node.attribute("path").unwrap_or_default();
        if source_path.is_empty() {
            Vec::new()
        } else {
            let target = if to_prefix.is_empty() { source_path.clone() } else { to_prefix };
            vec![(source_path, target)]
        }
    }
}

/// MODEL_VALUE children of a FILE/TEMPLATE directive: values containing
/// whitespace or a newline are moved into a blob and referenced by
/// `file=blobs/<md5>` rather than inlined, matching how FILE content
/// itself is blob-addressed.
fn emit_model_values(image: &mut Image, file_node: &Node, emitted: &Node) {
    for model_value in file_node.children_matching(|c| c.kind() == NodeKind::ModelValue) {
        let name = model_value.attribute("name").unwrap_or_default();
        let value = model_value.attribute("value").unwrap_or_default();
        let rendered = Node::new(NodeKind::ModelValue);
        rendered.set_attribute("name", name);
        if value.chars().any(|c| c.is_whitespace()) {
            let checksum = image.insert_blob(value.as_bytes());
            rendered.set_attribute("file", format!("blobs/{checksum}"));
        } else {
            rendered.set_attribute("value", value);
        }
        emitted.append(rendered);
    }
}

pub fn build(
    source_root: &Node,
    image: &mut Image,
    archive: &dyn ArchetypeArchive,
    fs: &dyn Filesystem,
) -> std::io::Result<()> {
    let output_node = Node::new(NodeKind::Output);
    let file_like = source_root.collect(|n| {
        matches!(
            n.kind(),
            NodeKind::File | NodeKind::Files | NodeKind::Template | NodeKind::Templates
        )
    });

    for file_node in file_like {
        let node_guard = ancestor_guard(&file_node);
        let directory_scan = file_node.attribute("directory").is_some();
        let rule = include_exclude_of(&file_node);

        for (ops, combo_guard) in op_combinations(source_root, &file_node) {
            let guard = node_guard.and(&combo_guard);
            if guard.is_false() {
                continue;
            }
            for (source_path, target) in resolve_targets(archive, &file_node) {
                let file_object =
                    resolve_file(image, fs, Path::new(&source_path), &target, &ops, guard.clone())?;

                let emitted = Node::new(file_node.kind());
                emitted.set_attribute("to", target);
                emitted.set_attribute("checksum", file_object.checksum.clone());
                if !file_object.ops.is_empty() {
                    let transformation = Node::new(NodeKind::Transformation);
                    for op in &file_object.ops {
                        let r = Node::new(NodeKind::Replace);
                        r.set_attribute("regex", op.regex.clone());
                        r.set_attribute("replacement", op.replacement.clone());
                        transformation.append(r);
                    }
                    emitted.append(transformation);
                }
                if directory_scan {
                    for pattern in &rule.includes {
                        let include = Node::new(NodeKind::Include);
                        include.set_attribute("pattern", pattern.clone());
                        emitted.append(include);
                    }
                    for pattern in &rule.excludes {
                        let exclude = Node::new(NodeKind::Exclude);
                        exclude.set_attribute("pattern", pattern.clone());
                        emitted.append(exclude);
                    }
                    // An empty INCLUDE always follows any explicit ones, so a
                    // predicate with no includes at all is never mistaken
                    // for "match everything" once rendered.
                    emitted.append(Node::new(NodeKind::Include));
                }
                emit_model_values(image, &file_node, &emitted);

                output_node.append(emitted.wrap(file_object.expression.clone()));
            }
        }
    }

    image.root.append(output_node);
    Ok(())
}
