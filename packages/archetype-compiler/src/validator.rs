//! Validator (C7): preset resolution, input-type consistency, CONDITION
//! operator compatibility and variable resolvability, option uniqueness,
//! and input/step well-formedness (§4.7).
//!
//! Every rule accumulates into a `ValidationException` instead of failing
//! fast, so a single `compile()` call surfaces every problem in a script
//! at once rather than one-at-a-time across repeated runs.

use crate::error::{ErrorKind, ValidationError, ValidationException};
use crate::expression_parser::ast::OpKind;
use crate::node::{Node, NodeKind};
use crate::scope::normalize_key;
use crate::value::{Value, ValueKind};
use std::collections::HashMap;

pub fn validate(root: &Node) -> ValidationException {
    let mut exc = ValidationException::new();
    let declared = collect_declared_inputs(root, &mut exc);
    validate_steps(root, &mut exc);
    validate_options(root, &mut exc);
    validate_expressions(root, &declared, &mut exc);
    validate_presets(root, &declared, &mut exc);
    exc
}

#[derive(Clone)]
struct DeclaredInput {
    kind: NodeKind,
    node: Node,
}

/// Dotted path from the root formed by the `name` attribute of every
/// ancestor (and the node itself) that carries one. Containers like
/// `<inputs>`/`<presets>` have no name and contribute nothing, so the
/// path lines up between the input tree and a parallel preset tree.
fn scope_key(node: &Node) -> String {
    full_chain(node)
        .iter()
        .filter_map(|n| n.attribute("name"))
        .map(|n| normalize_key(&n))
        .collect::<Vec<_>>()
        .join(".")
}

fn full_chain(node: &Node) -> Vec<Node> {
    let mut chain = node.ancestors(|_| true);
    chain.reverse();
    chain.push(node.clone());
    chain
}

fn lowest_common_ancestor(a: &Node, b: &Node) -> Option<Node> {
    let chain_a = full_chain(a);
    let chain_b = full_chain(b);
    let mut common = None;
    for (x, y) in chain_a.iter().zip(chain_b.iter()) {
        if x.identity_eq(y) {
            common = Some(x.clone());
        } else {
            break;
        }
    }
    common
}

fn input_kind_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::InputBoolean | NodeKind::PresetBoolean | NodeKind::VariableBoolean => "boolean",
        NodeKind::InputText | NodeKind::PresetText | NodeKind::VariableText => "text",
        NodeKind::InputEnum => "enum",
        NodeKind::InputList | NodeKind::PresetList | NodeKind::VariableList => "list",
        _ => "unknown",
    }
}

fn preset_matches_input(preset_kind: NodeKind, input_kind: NodeKind) -> bool {
    matches!(
        (preset_kind, input_kind),
        (NodeKind::PresetBoolean, NodeKind::InputBoolean)
            | (NodeKind::PresetText, NodeKind::InputText)
            | (NodeKind::PresetText, NodeKind::InputEnum)
            | (NodeKind::PresetList, NodeKind::InputList)
    )
}

fn collect_declared_inputs(root: &Node, exc: &mut ValidationException) -> HashMap<String, Vec<DeclaredInput>> {
    let mut by_key: HashMap<String, Vec<DeclaredInput>> = HashMap::new();
    for node in root.collect(|n| n.kind().is_input()) {
        let key = scope_key(&node);
        by_key.entry(key).or_default().push(DeclaredInput {
            kind: node.kind(),
            node: node.clone(),
        });
    }

    for (key, entries) in &by_key {
        for w in entries.windows(2) {
            let (first, second) = (&w[0], &w[1]);
            if first.kind != second.kind {
                exc.push(ValidationError::new(
                    ErrorKind::InputTypeMismatch {
                        path: key.clone(),
                        first: input_kind_label(first.kind).to_string(),
                        second: input_kind_label(second.kind).to_string(),
                    },
                    key.clone(),
                ));
            }
        }
        if entries.len() > 1 {
            for w in entries.windows(2) {
                let (first, second) = (&w[0], &w[1]);
                let allowed = lowest_common_ancestor(&first.node, &second.node)
                    .map(|a| a.kind() == NodeKind::InputEnum)
                    .unwrap_or(false);
                if !allowed {
                    exc.push(ValidationError::new(
                        ErrorKind::InputAlreadyDeclared(key.clone()),
                        key.clone(),
                    ));
                }
            }
        }
    }

    for node in root.collect(|n| n.kind().is_input()) {
        let is_optional = node.attribute("optional").as_deref() == Some("true");
        let has_default = node.attribute("default").is_some();
        if is_optional
            && matches!(node.kind(), NodeKind::InputEnum | NodeKind::InputText)
            && !has_default
        {
            exc.push(ValidationError::new(
                ErrorKind::InputOptionalNoDefault(scope_key(&node)),
                scope_key(&node),
            ));
        }
        if node.nearest_ancestor(|n| n.kind() == NodeKind::Step).is_none() {
            exc.push(ValidationError::new(
                ErrorKind::InputNotInStep(scope_key(&node)),
                scope_key(&node),
            ));
        }
    }

    by_key
}

fn validate_steps(root: &Node, exc: &mut ValidationException) {
    for step in root.collect(|n| n.kind() == NodeKind::Step) {
        let name = step.attribute("name").unwrap_or_default();
        let inputs = step.collect(|n| n.kind().is_input());
        if inputs.is_empty() {
            exc.push(ValidationError::new(
                ErrorKind::StepNoInput(name.clone()),
                scope_key(&step),
            ));
            continue;
        }
        let declared_optional = step.attribute("optional").as_deref() == Some("true");
        let non_optional_count = inputs
            .iter()
            .filter(|i| i.attribute("optional").as_deref() != Some("true"))
            .count();
        if declared_optional && non_optional_count > 0 {
            exc.push(ValidationError::new(
                ErrorKind::StepDeclaredOptional(name.clone()),
                scope_key(&step),
            ));
        }
        if !declared_optional && non_optional_count == 0 {
            exc.push(ValidationError::new(
                ErrorKind::StepNotDeclaredOptional(name),
                scope_key(&step),
            ));
        }
    }
}

fn validate_options(root: &Node, exc: &mut ValidationException) {
    for input in root.collect(|n| matches!(n.kind(), NodeKind::InputEnum | NodeKind::InputList)) {
        let mut seen: Vec<String> = Vec::new();
        for opt in input.children_matching(|c| c.kind() == NodeKind::InputOption) {
            let value = opt.attribute("value").unwrap_or_default();
            if seen.contains(&value) {
                exc.push(ValidationError::new(
                    ErrorKind::OptionValueAlreadyDeclared(value.clone()),
                    scope_key(&input),
                ));
            } else {
                seen.push(value);
            }
        }
    }
}

fn condition_compatible(kind: OpKind) -> bool {
    matches!(kind, OpKind::And | OpKind::Or | OpKind::Not | OpKind::Eq | OpKind::Ne | OpKind::Contains)
}

fn validate_expressions(
    root: &Node,
    declared: &HashMap<String, Vec<DeclaredInput>>,
    exc: &mut ValidationException,
) {
    for node in root.collect(|n| n.kind() == NodeKind::Condition) {
        let expr = match node.expression() {
            Some(e) => e,
            None => continue,
        };
        let location = scope_key(&node);

        for token in expr.tokens() {
            if !condition_compatible(token) {
                exc.push(ValidationError::new(
                    ErrorKind::ExprIncompatibleOperator(format!("{:?}", token)),
                    location.clone(),
                ));
            }
        }

        for var in expr.variables() {
            if !declared.contains_key(&var) {
                exc.push(ValidationError::new(
                    ErrorKind::ExprUnresolvedVariable(var),
                    location.clone(),
                ));
            }
        }

        let lookup = |name: &str| -> Option<Value> {
            declared
                .get(name)
                .and_then(|entries| entries.first())
                .map(|e| Value::TypedEmpty(input_value_kind(e.kind)))
        };
        if let Err(err) = expr.eval(&lookup) {
            use crate::expression_parser::ast::EvalError;
            if matches!(err, EvalError::TypeError(_) | EvalError::Unsupported(_)) {
                exc.push(ValidationError::new(
                    ErrorKind::ExprEvalError(err.to_string()),
                    location.clone(),
                ));
            }
        }
    }
}

fn input_value_kind(kind: NodeKind) -> ValueKind {
    match kind {
        NodeKind::InputBoolean => ValueKind::Boolean,
        NodeKind::InputList => ValueKind::List,
        _ => ValueKind::Text,
    }
}

fn validate_presets(
    root: &Node,
    declared: &HashMap<String, Vec<DeclaredInput>>,
    exc: &mut ValidationException,
) {
    for preset in root.collect(|n| n.kind().is_preset()) {
        let path = scope_key(&preset);
        match declared.get(&path).and_then(|entries| entries.first()) {
            None => {
                exc.push(ValidationError::new(
                    ErrorKind::PresetUnresolved(path.clone()),
                    path,
                ));
            }
            Some(input) => {
                if !preset_matches_input(preset.kind(), input.kind) {
                    exc.push(ValidationError::new(
                        ErrorKind::PresetTypeMismatch {
                            path: path.clone(),
                            preset_kind: input_kind_label(preset.kind()).to_string(),
                            input_kind: input_kind_label(input.kind).to_string(),
                        },
                        path,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression_parser::parse;

    fn named(kind: NodeKind, name: &str) -> Node {
        let n = Node::new(kind);
        n.set_attribute("name", name);
        n
    }

    #[test]
    fn step_without_input_is_flagged() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "empty");
        root.append(step);
        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::StepNoInput(_))));
    }

    #[test]
    fn input_not_nested_in_step_is_flagged() {
        let root = Node::new(NodeKind::Script);
        let input = named(NodeKind::InputText, "flavor");
        root.append(input);
        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::InputNotInStep(_))));
    }

    #[test]
    fn duplicate_option_values_are_flagged() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "s");
        let input = named(NodeKind::InputEnum, "flavor");
        let opt_a = Node::new(NodeKind::InputOption);
        opt_a.set_attribute("value", "se");
        let opt_b = Node::new(NodeKind::InputOption);
        opt_b.set_attribute("value", "se");
        input.append(opt_a);
        input.append(opt_b);
        step.append(input);
        root.append(step);
        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::OptionValueAlreadyDeclared(_))));
    }

    #[test]
    fn enum_alternative_branches_may_reuse_a_scope_key() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "s");
        let flavor = named(NodeKind::InputEnum, "flavor");
        let opt_se = Node::new(NodeKind::InputOption);
        opt_se.set_attribute("value", "se");
        let nested_a = named(NodeKind::InputText, "detail");
        opt_se.append(nested_a);
        let opt_fr = Node::new(NodeKind::InputOption);
        opt_fr.set_attribute("value", "fr");
        let nested_b = named(NodeKind::InputText, "detail");
        opt_fr.append(nested_b);
        flavor.append(opt_se);
        flavor.append(opt_fr);
        step.append(flavor);
        root.append(step);
        let exc = validate(&root);
        assert!(!exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::InputAlreadyDeclared(_))));
    }

    #[test]
    fn preset_referencing_unknown_input_is_unresolved() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "s");
        let input = named(NodeKind::InputText, "flavor");
        step.append(input);
        root.append(step);

        let presets = Node::new(NodeKind::Presets);
        let preset_step = named(NodeKind::Step, "s");
        let preset = named(NodeKind::PresetText, "missing");
        preset_step.append(preset);
        presets.append(preset_step);
        root.append(presets);

        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::PresetUnresolved(_))));
    }

    #[test]
    fn preset_type_mismatch_is_flagged() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "s");
        let input = named(NodeKind::InputBoolean, "flag");
        step.append(input);
        root.append(step);

        let presets = Node::new(NodeKind::Presets);
        let preset_step = named(NodeKind::Step, "s");
        let preset = named(NodeKind::PresetText, "flag");
        preset_step.append(preset);
        presets.append(preset_step);
        root.append(presets);

        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::PresetTypeMismatch { .. })));
    }

    #[test]
    fn condition_with_incompatible_operator_is_flagged() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "s");
        let input = named(NodeKind::InputText, "count");
        step.append(input.clone());
        let condition = Node::new(NodeKind::Condition);
        condition.set_expression(parse("sizeof(${count}) > 1").unwrap());
        step.append(condition);
        root.append(step);

        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::ExprIncompatibleOperator(_))));
    }

    #[test]
    fn condition_referencing_unknown_variable_is_flagged() {
        let root = Node::new(NodeKind::Script);
        let step = named(NodeKind::Step, "s");
        let input = named(NodeKind::InputText, "flavor");
        step.append(input);
        let condition = Node::new(NodeKind::Condition);
        condition.set_expression(parse("${ghost} == 'x'").unwrap());
        step.append(condition);
        root.append(step);

        let exc = validate(&root);
        assert!(exc
            .errors()
            .iter()
            .any(|e| matches!(e.kind, ErrorKind::ExprUnresolvedVariable(_))));
    }
}
