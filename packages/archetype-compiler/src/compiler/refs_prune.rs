//! Refs & prune pass (C6 pass B): assigns monotonic node ids in document
//! order, then inlines CONDITION guards against preset-fixed values before
//! relativizing and pruning them against their enclosing guard.
//!
//! The only explicit state machine in the pipeline lives here: entering a
//! CONDITION evaluates `expr.inline(presets).relativize(ancestor_guard)`; a
//! FALSE result prunes the whole subtree, a TRUE result is vacuous and the
//! condition node is unwrapped (its children splice into its former
//! position), and anything else keeps the (now-simplified) condition and
//! becomes the new ancestor guard for its own children.

use crate::expression_parser::{Expression, Op2, TRUE};
use crate::node::{guard_of, Node, NodeKind};
use crate::scope::normalize_key;
use crate::value::Value;
use std::collections::HashMap;

/// Assign ids pre-order, then prune dead CONDITION branches under the
/// always-true root guard, first inlining any preset-fixed variable, then
/// prune individual INPUTs left unreachable by a preset-fixed enum
/// selection and splice any now-empty STEP upward.
pub fn refs_and_prune(root: &Node) {
    let mut next_id = 0u64;
    assign_ids(root, &mut next_id);
    let presets = collect_presets(root);
    prune(root, &TRUE, &presets);
    prune_unreachable_inputs(root, &presets);
}

fn assign_ids(node: &Node, next: &mut u64) {
    node.set_id(*next);
    *next += 1;
    for child in node.children() {
        assign_ids(&child, next);
    }
}

/// Dotted path formed by the `name` attribute of every named ancestor plus
/// the node itself (mirrors the validator's `scope_key`, which presets and
/// inputs must agree on for preset resolution to line up at all).
fn scope_key(node: &Node) -> String {
    let mut chain = node.ancestors(|_| true);
    chain.reverse();
    chain.push(node.clone());
    chain
        .iter()
        .filter_map(|n| n.attribute("name"))
        .map(|n| normalize_key(&n))
        .collect::<Vec<_>>()
        .join(".")
}

fn preset_value(node: &Node) -> Option<Value> {
    match node.kind() {
        NodeKind::PresetBoolean => Some(Value::of_bool(node.attribute("value").as_deref() == Some("true"))),
        NodeKind::PresetText => node.attribute("value").map(Value::of_string),
        NodeKind::PresetList => node
            .attribute("value")
            .map(|v| Value::of_list(v.split(',').map(|s| s.trim().to_string()))),
        _ => None,
    }
}

/// Every preset's fixed value, keyed both by its full dotted scope key and
/// by its bare (final-segment) name, since CONDITION expressions reference
/// variables by bare name (see `variations::scope_key_of`'s matching note).
fn collect_presets(root: &Node) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    for preset in root.collect(|n| n.kind().is_preset()) {
        if let Some(value) = preset_value(&preset) {
            let key = scope_key(&preset);
            if let Some(bare) = key.rsplit('.').next() {
                map.entry(bare.to_string()).or_insert_with(|| value.clone());
            }
            map.insert(key, value);
        }
    }
    map
}

/// An INPUT nested under an INPUT_OPTION is only reachable when that
/// option's owning INPUT_ENUM actually holds the option's value; this
/// implicit guard is never materialized as a CONDITION node, so the
/// CONDITION-only `prune` pass above can't catch a nested INPUT whose
/// enum selection has been fixed away by a preset (§4.6: "after visiting
/// children of an INPUT, if its own guard... reduces to FALSE, prune it").
fn input_reachability_guard(node: &Node) -> Expression {
    let mut guard = node
        .ancestors(|a| a.kind() == NodeKind::Condition)
        .iter()
        .map(guard_of)
        .fold(TRUE.clone(), |acc, g| acc.and(&g));
    for option in node.ancestors(|a| a.kind() == NodeKind::InputOption) {
        let enum_node = match option.parent() {
            Some(p) if p.kind() == NodeKind::InputEnum => p,
            _ => continue,
        };
        let (name, value) = match (enum_node.attribute("name"), option.attribute("value")) {
            (Some(n), Some(v)) => (n, v),
            _ => continue,
        };
        if let Ok(eq) = Expression::binary(
            Op2::Eq,
            Expression::var(name),
            Expression::literal_value(Value::of_string(value)),
        ) {
            guard = guard.and(&eq);
        }
    }
    guard
}

/// Remove any INPUT whose reachability guard, inlined against preset-fixed
/// values, reduces to FALSE; splice a STEP's remaining children upward if
/// that leaves it with no INPUT at all (whether emptied here or by the
/// CONDITION-subtree removal `prune` already did above it).
fn prune_unreachable_inputs(root: &Node, presets: &HashMap<String, Value>) {
    for input in root.collect(|n| n.kind().is_input()) {
        let guard = input_reachability_guard(&input);
        let inlined = guard.inline(&|name| presets.get(name).cloned()).unwrap_or(guard);
        if inlined.is_false() {
            input.remove();
        }
    }
    for step in root.collect(|n| n.kind() == NodeKind::Step) {
        if step.collect(|n| n.kind().is_input()).is_empty() {
            step.replace(step.children());
        }
    }
}

fn prune(node: &Node, guard: &Expression, presets: &HashMap<String, Value>) {
    for child in node.children() {
        if child.kind() != NodeKind::Condition {
            prune(&child, guard, presets);
            continue;
        }
        let expr = child.expression().unwrap_or_else(|| TRUE.clone());
        let inlined = expr
            .inline(&|name| presets.get(name).cloned())
            .unwrap_or(expr);
        let relativized = inlined.relativize(guard);
        if relativized.is_false() {
            child.remove();
            continue;
        }
        if relativized.is_true() {
            let grandchildren = child.children();
            child.replace(grandchildren.clone());
            for gc in &grandchildren {
                prune(gc, guard, presets);
            }
        } else {
            child.set_expression(relativized.clone());
            prune(&child, &relativized, presets);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression_parser::parse;
    use crate::value::Value;

    #[test]
    fn ids_are_assigned_in_preorder() {
        let root = Node::new(NodeKind::Script);
        let a = Node::new(NodeKind::Step);
        let b = Node::new(NodeKind::Step);
        root.append(a.clone());
        root.append(b.clone());
        refs_and_prune(&root);
        assert_eq!(root.id(), Some(0));
        assert_eq!(a.id(), Some(1));
        assert_eq!(b.id(), Some(2));
    }

    #[test]
    fn false_condition_is_pruned() {
        let root = Node::new(NodeKind::Script);
        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(Expression::literal_value(Value::of_bool(false)));
        cond.append(Node::new(NodeKind::Step));
        root.append(cond);
        refs_and_prune(&root);
        assert_eq!(root.children().len(), 0);
    }

    #[test]
    fn true_condition_is_unwrapped_in_place() {
        let root = Node::new(NodeKind::Script);
        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(Expression::literal_value(Value::of_bool(true)));
        let step = Node::new(NodeKind::Step);
        cond.append(step.clone());
        root.append(cond);
        refs_and_prune(&root);
        let kids = root.children();
        assert_eq!(kids.len(), 1);
        assert!(kids[0].identity_eq(&step));
    }

    #[test]
    fn nested_condition_entailed_by_ancestor_collapses_to_true() {
        let root = Node::new(NodeKind::Script);
        let outer = Node::new(NodeKind::Condition);
        outer.set_expression(parse("${flavor} == 'se'").unwrap());
        let inner = Node::new(NodeKind::Condition);
        inner.set_expression(parse("${flavor} == 'se'").unwrap());
        inner.append(Node::new(NodeKind::Step));
        outer.append(inner);
        root.append(outer);
        refs_and_prune(&root);
        // outer survives (non-trivial guard), inner is entailed and vanishes
        let outer_kids = root.children()[0].children();
        assert_eq!(outer_kids.len(), 1);
        assert_eq!(outer_kids[0].kind(), NodeKind::Step);
    }

    #[test]
    fn input_nested_under_a_preset_excluded_option_is_pruned() {
        let root = Node::new(NodeKind::Script);

        let presets = Node::new(NodeKind::Presets);
        let preset = Node::new(NodeKind::PresetText);
        preset.set_attribute("name", "flavor");
        preset.set_attribute("value", "mp");
        presets.append(preset);
        root.append(presets);

        let step = Node::new(NodeKind::Step);
        step.set_attribute("name", "s");
        let flavor = Node::new(NodeKind::InputEnum);
        flavor.set_attribute("name", "flavor");
        let opt_se = Node::new(NodeKind::InputOption);
        opt_se.set_attribute("value", "se");
        let nested = Node::new(NodeKind::InputText);
        nested.set_attribute("name", "detail");
        opt_se.append(nested.clone());
        flavor.append(opt_se);
        step.append(flavor);
        root.append(step);

        refs_and_prune(&root);
        assert!(root
            .collect(|n| n.kind() == NodeKind::InputText && n.attribute("name").as_deref() == Some("detail"))
            .is_empty());
    }

    #[test]
    fn step_emptied_by_input_pruning_is_spliced_upward() {
        let root = Node::new(NodeKind::Script);

        let step = Node::new(NodeKind::Step);
        step.set_attribute("name", "s");
        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(Expression::literal_value(Value::of_bool(false)));
        cond.append(Node::new(NodeKind::InputBoolean));
        step.append(cond);
        let marker = Node::new(NodeKind::VariableText);
        marker.set_attribute("name", "leftover");
        step.append(marker.clone());
        root.append(step.clone());

        refs_and_prune(&root);
        assert!(root.children().iter().all(|c| !c.identity_eq(&step)));
        assert!(root.collect(|n| n.identity_eq(&marker)).len() == 1);
    }
}
