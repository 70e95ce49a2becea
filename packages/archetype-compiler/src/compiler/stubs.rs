//! Stub inserter (C9, §4.9).
//!
//! After pruning, a CONDITION may still reference a variable whose
//! declaration sits under a narrower guard than the condition itself. At
//! instantiation time that variable would read back undefined outside its
//! declaration guard, silently failing the condition. We insert a typed
//! stub — an empty value under the complement of the declaration's guard —
//! so the variable is always at least defined.

use crate::expression_parser::{Expression, TRUE};
use crate::node::{guard_of, Node, NodeKind};
use crate::value::ValueKind;

fn declared_kind(kind: NodeKind) -> Option<ValueKind> {
    match kind {
        NodeKind::VariableBoolean | NodeKind::InputBoolean => Some(ValueKind::Boolean),
        NodeKind::VariableList | NodeKind::InputList => Some(ValueKind::List),
        NodeKind::VariableText | NodeKind::InputText | NodeKind::InputEnum => Some(ValueKind::Text),
        _ => None,
    }
}

fn stub_kind(declared: ValueKind) -> NodeKind {
    match declared {
        ValueKind::Boolean => NodeKind::VariableBoolean,
        ValueKind::List => NodeKind::VariableList,
        ValueKind::Text | ValueKind::Dynamic => NodeKind::VariableText,
    }
}

/// Definition guard for a declaration node: the union (OR) of the guards of
/// every CONDITION ancestor, relativized against the block's own guard so
/// two disjoint branches declaring the same name don't spuriously narrow
/// each other.
fn definition_guard(decl: &Node) -> Expression {
    decl.ancestors(|a| a.kind() == NodeKind::Condition)
        .iter()
        .map(guard_of)
        .fold(TRUE.clone(), |acc, g| acc.and(&g))
}

fn nearest_variables_container(node: &Node) -> Option<Node> {
    node.nearest_ancestor(|a| a.kind() == NodeKind::Variables)
}

/// Insert stubs for every CONDITION in `image_root`, in document order.
pub fn insert_stubs(image_root: &Node) {
    let declarations = image_root.collect(|n| declared_kind(n.kind()).is_some());

    for condition in image_root.collect(|n| n.kind() == NodeKind::Condition) {
        let expr = match condition.expression() {
            Some(e) => e,
            None => continue,
        };
        let enclosing_guard = condition
            .nearest_ancestor(|a| a.kind() == NodeKind::Condition)
            .map(|c| guard_of(&c))
            .unwrap_or_else(|| TRUE.clone());

        for var in expr.variables() {
            let matches: Vec<&Node> = declarations
                .iter()
                .filter(|d| d.attribute("name").as_deref() == Some(var.as_str()))
                .collect();
            if matches.is_empty() {
                continue;
            }
            let union = matches
                .iter()
                .map(|d| definition_guard(*d))
                .fold(Expression::literal_value(crate::value::Value::of_bool(false)), |acc, g| {
                    acc.or(&g)
                });
            let relativized = union.relativize(&enclosing_guard);
            if relativized.is_true() {
                continue;
            }

            let container = match nearest_variables_container(&condition) {
                Some(c) => c,
                None => {
                    let c = Node::new(NodeKind::Variables);
                    image_root.append(c.clone());
                    c
                }
            };
            let already_stubbed = container
                .children_matching(|c| c.attribute("name").as_deref() == Some(var.as_str()))
                .into_iter()
                .any(|c| c.expression().map(|e| e == relativized.negate()).unwrap_or(false));
            if already_stubbed {
                continue;
            }

            let kind = matches
                .first()
                .and_then(|d| declared_kind(d.kind()))
                .map(stub_kind)
                .unwrap_or(NodeKind::VariableText);
            let stub = Node::new(kind);
            stub.set_attribute("name", var);
            stub.set_expression(relativized.negate());
            container.append(stub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression_parser::parse;

    #[test]
    fn variable_defined_everywhere_needs_no_stub() {
        let root = Node::new(NodeKind::Script);
        let vars = Node::new(NodeKind::Variables);
        let decl = Node::new(NodeKind::VariableText);
        decl.set_attribute("name", "flavor");
        vars.append(decl);
        root.append(vars);

        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(parse("${flavor} == 'se'").unwrap());
        root.append(cond);

        insert_stubs(&root);
        let vars_after = root
            .children()
            .into_iter()
            .find(|n| n.kind() == NodeKind::Variables)
            .unwrap();
        assert_eq!(vars_after.children().len(), 1);
    }

    #[test]
    fn variable_defined_only_under_a_narrower_guard_gets_a_stub() {
        let root = Node::new(NodeKind::Script);
        let narrow_guard = Node::new(NodeKind::Condition);
        narrow_guard.set_expression(parse("${enabled}").unwrap());
        let vars = Node::new(NodeKind::Variables);
        let decl = Node::new(NodeKind::VariableText);
        decl.set_attribute("name", "flavor");
        vars.append(decl);
        narrow_guard.append(vars);
        root.append(narrow_guard);

        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(parse("${flavor} == 'se'").unwrap());
        root.append(cond);

        insert_stubs(&root);
        let stub_found = root.collect(|n| {
            n.kind() == NodeKind::VariableText && n.attribute("name").as_deref() == Some("flavor")
        });
        // one original declaration plus at least one inserted stub
        assert!(stub_found.len() >= 2);
    }
}
