//! Input visitor (C6): copies the PRESETS/VARIABLES/STEP/INPUT_* subtree of
//! a pruned source script into the emitted image, preserving CONDITION
//! wrapping so the image's own guards stay in sync with the source, then
//! flattens every INPUT_OPTION-nested declaration to a STEP-level sibling
//! so its dotted scope key matches the flat key the rest of the pipeline
//! (validator, stubs, variations) already computes for it (spec.md:225's
//! `scope.key == scope.internalKey` invariant).
//!
//! This is a structural copy rather than a full source-to-image mirror
//! map: the bidirectional mirror and the max-mirror-id step grouping pass
//! described for interactive re-entry are out of scope for a one-shot
//! `compile()`. The flattening invariant itself is not, though — it is
//! load-bearing for the emitted image, not only for re-entry.

use crate::expression_parser::{Expression, Op2, TRUE};
use crate::node::{guard_of, Node, NodeKind};
use crate::value::Value;

/// Copy every top-level PRESETS/VARIABLES/STEP block of `source` into
/// `image_root`, in document order, then flatten option-nested inputs.
pub fn build(source_root: &Node, image_root: &Node) {
    for child in source_root.children() {
        match child.kind() {
            NodeKind::Presets | NodeKind::Variables | NodeKind::Step => {
                image_root.append(child.deep_copy());
            }
            NodeKind::Condition => {
                // A top-level CONDITION wraps one of the above kinds; copy
                // the wrapper along with its guarded contents.
                if matches!(
                    child.unwrap().kind(),
                    NodeKind::Presets | NodeKind::Variables | NodeKind::Step
                ) {
                    image_root.append(child.deep_copy());
                }
            }
            _ => {}
        }
    }
    flatten_option_inputs(image_root);
}

/// The guard an INPUT_OPTION contributes to its descendants: the owning
/// INPUT_ENUM's value equals the option's own value. INPUT_LIST options
/// select subsets rather than mutually exclusive alternatives, so they
/// contribute no guard — the same distinction `refs_prune`'s reachability
/// guard draws between the two option-bearing input kinds.
fn option_guard(option: &Node) -> Expression {
    let enum_node = match option.parent() {
        Some(p) if p.kind() == NodeKind::InputEnum => p,
        _ => return TRUE.clone(),
    };
    match (enum_node.attribute("name"), option.attribute("value")) {
        (Some(name), Some(value)) => Expression::binary(
            Op2::Eq,
            Expression::var(name),
            Expression::literal_value(Value::of_string(value)),
        )
        .unwrap_or_else(|_| TRUE.clone()),
        _ => TRUE.clone(),
    }
}

/// The combined guard strictly between `node` and `boundary`: every
/// enclosing CONDITION's expression ANDed with every enclosing
/// INPUT_OPTION's implicit selection guard.
fn guard_between(node: &Node, boundary: &Node) -> Expression {
    let mut guard = TRUE.clone();
    let mut cur = node.parent();
    while let Some(n) = cur {
        if n.identity_eq(boundary) {
            break;
        }
        if n.kind() == NodeKind::Condition {
            guard = guard.and(&guard_of(&n));
        } else if n.kind() == NodeKind::InputOption {
            guard = guard.and(&option_guard(&n));
        }
        cur = n.parent();
    }
    guard
}

/// Repeatedly find an INPUT nested under an INPUT_OPTION within some STEP
/// and splice it out to become a direct (guarded) child of that STEP,
/// until none remain — handling arbitrarily deep enum-under-option
/// nesting one level at a time.
fn flatten_option_inputs(image_root: &Node) {
    for step in image_root.collect(|n| n.kind() == NodeKind::Step) {
        loop {
            let nested = step
                .collect(|n| {
                    n.kind().is_input()
                        && n.nearest_ancestor(|a| a.kind() == NodeKind::InputOption).is_some()
                })
                .into_iter()
                .next();
            let Some(input) = nested else {
                break;
            };
            let guard = guard_between(&input, &step);
            input.remove();
            step.append(input.wrap(guard));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn steps_and_variables_are_copied_in_document_order() {
        let source = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        step.set_attribute("name", "s1");
        let vars = Node::new(NodeKind::Variables);
        source.append(step);
        source.append(vars);

        let image_root = Node::new(NodeKind::Script);
        build(&source, &image_root);
        let kids = image_root.children();
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0].kind(), NodeKind::Step);
        assert_eq!(kids[1].kind(), NodeKind::Variables);
    }

    #[test]
    fn guarded_step_keeps_its_condition_wrapper() {
        let source = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        let wrapped = step.wrap(Expression::literal_value(Value::of_bool(false)));
        source.append(wrapped);

        let image_root = Node::new(NodeKind::Script);
        build(&source, &image_root);
        let kids = image_root.children();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].kind(), NodeKind::Condition);
    }

    #[test]
    fn unrelated_top_level_kinds_are_skipped() {
        let source = Node::new(NodeKind::Script);
        source.append(Node::new(NodeKind::Output));
        let image_root = Node::new(NodeKind::Script);
        build(&source, &image_root);
        assert_eq!(image_root.children().len(), 0);
    }

    #[test]
    fn option_nested_input_is_flattened_to_a_step_level_sibling() {
        let source = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        step.set_attribute("name", "s");

        let flavor = Node::new(NodeKind::InputEnum);
        flavor.set_attribute("name", "flavor");
        let opt_se = Node::new(NodeKind::InputOption);
        opt_se.set_attribute("value", "se");
        let detail = Node::new(NodeKind::InputText);
        detail.set_attribute("name", "detail");
        opt_se.append(detail.clone());
        flavor.append(opt_se);
        step.append(flavor);
        source.append(step);

        let image_root = Node::new(NodeKind::Script);
        build(&source, &image_root);

        let image_step = image_root.children().into_iter().next().unwrap();
        // "detail" is no longer nested under the option — it's a sibling
        // of the enum, wrapped in its own condition.
        assert!(image_step
            .children()
            .iter()
            .any(|c| c.kind() == NodeKind::InputEnum));
        let detail_wrapper = image_step
            .children()
            .into_iter()
            .find(|c| c.kind() == NodeKind::Condition && c.unwrap().kind() == NodeKind::InputText)
            .expect("flattened input should be a direct, guarded child of the step");
        let flattened = detail_wrapper.unwrap();
        assert_eq!(flattened.attribute("name").as_deref(), Some("detail"));

        let guard = detail_wrapper.expression().unwrap();
        assert!(guard
            .eval(&|name| (name == "flavor").then(|| Value::of_string("se")))
            .unwrap());
        assert!(!guard
            .eval(&|name| (name == "flavor").then(|| Value::of_string("mp")))
            .unwrap());
    }

    #[test]
    fn option_nested_input_under_an_already_guarded_step_composes_both_guards() {
        let source = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        step.set_attribute("name", "s");
        let flavor = Node::new(NodeKind::InputEnum);
        flavor.set_attribute("name", "flavor");
        let opt_se = Node::new(NodeKind::InputOption);
        opt_se.set_attribute("value", "se");
        let guarded_detail = Node::new(NodeKind::InputText);
        guarded_detail.set_attribute("name", "detail");
        let inner_cond = guarded_detail.wrap(crate::expression_parser::parse("${enabled}").unwrap());
        opt_se.append(inner_cond);
        flavor.append(opt_se);
        step.append(flavor);
        source.append(step);

        let image_root = Node::new(NodeKind::Script);
        build(&source, &image_root);

        let image_step = image_root.children().into_iter().next().unwrap();
        let detail_wrapper = image_step
            .children()
            .into_iter()
            .find(|c| c.kind() == NodeKind::Condition && c.unwrap().kind() == NodeKind::InputText)
            .unwrap();
        let guard = detail_wrapper.expression().unwrap();
        // neither condition alone is sufficient; both must hold.
        assert!(!guard
            .eval(&|name| match name {
                "flavor" => Some(Value::of_string("se")),
                "enabled" => Some(Value::of_bool(false)),
                _ => None,
            })
            .unwrap());
        assert!(guard
            .eval(&|name| match name {
                "flavor" => Some(Value::of_string("se")),
                "enabled" => Some(Value::of_bool(true)),
                _ => None,
            })
            .unwrap());
    }
}
