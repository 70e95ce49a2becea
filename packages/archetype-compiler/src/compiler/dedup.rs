//! Dedup pass (C6): steps with identical `name` and identical canonical
//! content merge into one, their guards OR'd together (§4.6).

use crate::node::{guard_of, Node, NodeKind};
use crate::util::blob_id;

/// A content hash independent of node identity/ids: kind, sorted
/// attributes (excluding `name`, already part of the dedup key), value,
/// expression, and children recursively.
fn canonical_hash(node: &Node) -> String {
    blob_id(canonical_string(node).as_bytes())
}

fn canonical_string(node: &Node) -> String {
    let mut out = format!("{:?}", node.kind());
    let mut attrs: Vec<(String, String)> = node
        .attributes()
        .into_iter()
        .filter(|(k, _)| k != "name")
        .collect();
    attrs.sort();
    for (k, v) in attrs {
        out.push('|');
        out.push_str(&k);
        out.push('=');
        out.push_str(&v);
    }
    if let Some(v) = node.value() {
        out.push('|');
        out.push_str(&v);
    }
    if let Some(e) = node.expression() {
        out.push('|');
        out.push_str(&e.literal());
    }
    for child in node.children() {
        out.push('{');
        out.push_str(&canonical_string(&child));
        out.push('}');
    }
    out
}

/// Merge steps that share a `name` and a canonical content hash, OR-ing
/// their guards. Operates over `image_root`'s direct STEP children and
/// steps wrapped one level deep by a CONDITION.
pub fn dedup_steps(image_root: &Node) {
    // (name, hash, node currently carrying the merged guard — either the
    // bare STEP itself, when its guard is TRUE, or its CONDITION wrapper)
    let mut kept: Vec<(String, String, Node)> = Vec::new();

    for child in image_root.children() {
        let (step, guard_owner) = match child.kind() {
            NodeKind::Step => (child.clone(), child.clone()),
            NodeKind::Condition => match child.unwrap() {
                inner if inner.kind() == NodeKind::Step => (inner, child.clone()),
                _ => continue,
            },
            _ => continue,
        };
        let name = step.attribute("name").unwrap_or_default();
        let hash = canonical_hash(&step);

        if let Some(idx) = kept.iter().position(|(n, h, _)| *n == name && *h == hash) {
            let existing_owner = kept[idx].2.clone();
            let merged = guard_of(&existing_owner).or(&guard_of(&guard_owner));
            if existing_owner.kind() == NodeKind::Condition {
                existing_owner.set_expression(merged);
            } else if !merged.is_true() {
                let wrapped = existing_owner.wrap(merged);
                kept[idx].2 = wrapped;
            }
            guard_owner.remove();
        } else {
            kept.push((name, hash, guard_owner));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression_parser::parse;

    fn step_named(name: &str) -> Node {
        let s = Node::new(NodeKind::Step);
        s.set_attribute("name", name);
        s
    }

    #[test]
    fn identical_steps_merge_and_or_their_guards() {
        let root = Node::new(NodeKind::Script);
        let a = step_named("install");
        let cond_a = Node::new(NodeKind::Condition);
        cond_a.set_expression(parse("${x}").unwrap());
        cond_a.append(a);
        root.append(cond_a);

        let b = step_named("install");
        let cond_b = Node::new(NodeKind::Condition);
        cond_b.set_expression(parse("${y}").unwrap());
        cond_b.append(b);
        root.append(cond_b);

        dedup_steps(&root);
        let steps = root.collect(|n| n.kind() == NodeKind::Step);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn steps_with_different_content_are_not_merged() {
        let root = Node::new(NodeKind::Script);
        let a = step_named("install");
        let b = step_named("install");
        b.set_attribute("extra", "true");
        root.append(a);
        root.append(b);
        dedup_steps(&root);
        let steps = root.collect(|n| n.kind() == NodeKind::Step);
        assert_eq!(steps.len(), 2);
    }
}
