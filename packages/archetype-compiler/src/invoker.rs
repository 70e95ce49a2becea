//! Script invoker (C5): a depth-first interpreter over the node tree.
//!
//! Used both by the compiler's inline/refs passes (via direct tree
//! mutation rather than through this module) and by variation
//! normalization, where a `BatchResolver` supplies fixed input values from
//! a variation map instead of prompting. This module owns the traversal
//! contract honoring CONDITION/SOURCE/EXEC/CALL semantics; it does not
//! itself implement inlining (that is `compiler::inline`, which shares the
//! same descent rules but additionally splices subtrees).

use crate::expression_parser::EvalError;
use crate::node::{Node, NodeKind};
use crate::scope::Context;
use crate::util::blob_id;
use crate::value::Value;
use std::collections::HashMap;

/// Supplies a fixed value for an input during variation normalization,
/// instead of interactive prompting (§4.5, §4.10).
pub trait InputResolver {
    fn resolve(&self, scope_key: &str, node: &Node) -> Option<Value>;
}

/// Resolves every input from a precomputed variation map; unresolved
/// inputs fall back to `None` (declared default applies upstream).
pub struct BatchResolver {
    values: HashMap<String, Value>,
}

impl BatchResolver {
    pub fn new(values: HashMap<String, Value>) -> Self {
        BatchResolver { values }
    }
}

impl InputResolver for BatchResolver {
    fn resolve(&self, scope_key: &str, _node: &Node) -> Option<Value> {
        self.values.get(scope_key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokerError {
    Eval(String),
    UnresolvedCall(String),
}

impl From<EvalError> for InvokerError {
    fn from(e: EvalError) -> Self {
        InvokerError::Eval(e.to_string())
    }
}

/// A visitor over the node tree (§4.4's "Visitor" contract): `visit`
/// returns whether to descend into the node's children, `post_visit` runs
/// after children have been visited and may mutate structure.
pub trait Visitor {
    fn visit(&mut self, node: &Node, ctx: &mut Context) -> bool;
    fn post_visit(&mut self, _node: &Node, _ctx: &mut Context) {}
}

/// Depth-first walk honoring CONDITION/INPUT scope semantics: CONDITION
/// only descends if its expression evaluates true under the declared
/// values reachable from `ctx`'s current scope; INPUT_* nodes push/pop a
/// scope named after their `name` attribute around their children.
pub fn walk(
    root: &Node,
    ctx: &mut Context,
    visitor: &mut dyn Visitor,
    resolver: Option<&dyn InputResolver>,
) -> Result<(), InvokerError> {
    walk_node(root, ctx, visitor, resolver)
}

fn walk_node(
    node: &Node,
    ctx: &mut Context,
    visitor: &mut dyn Visitor,
    resolver: Option<&dyn InputResolver>,
) -> Result<(), InvokerError> {
    if node.kind() == NodeKind::Condition {
        let expr = node.expression();
        if let Some(expr) = expr {
            let scope = ctx.scope();
            let holds = expr
                .eval(&|name| scope.get(name).map(|sv| sv.value))
                .unwrap_or(false);
            if !holds {
                return Ok(());
            }
        }
    }

    if !visitor.visit(node, ctx) {
        return Ok(());
    }

    let is_input = node.kind().is_input();
    if is_input {
        let local_name = node.attribute("name").unwrap_or_else(|| "input".to_string());
        let scope = ctx.push_scope(&local_name);
        if let Some(resolver) = resolver {
            if let Some(value) = resolver.resolve(&scope.key(), node) {
                scope.declare(
                    &local_name,
                    crate::scope::ScopeValue::new(scope.key(), crate::scope::ValueOrigin::User, value),
                );
            }
        }
    }

    for child in node.children() {
        walk_node(&child, ctx, visitor, resolver)?;
    }

    if is_input {
        ctx.pop_scope();
    }

    visitor.post_visit(node, ctx);
    Ok(())
}

/// Compute a unique id for a CALL splice site, per §4.5: MD5 of the call
/// site's location string (we use the calling node's scope-relative
/// position, supplied by the caller).
pub fn call_site_id(location: &str) -> String {
    blob_id(location.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression_parser::parse;

    struct CountingVisitor {
        visited: usize,
    }

    impl Visitor for CountingVisitor {
        fn visit(&mut self, _node: &Node, _ctx: &mut Context) -> bool {
            self.visited += 1;
            true
        }
    }

    #[test]
    fn condition_false_prevents_descent() {
        let root = Node::new(NodeKind::Script);
        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(parse("false").unwrap());
        let leaf = Node::new(NodeKind::InputText);
        cond.append(leaf);
        root.append(cond);

        let mut ctx = Context::new();
        let mut v = CountingVisitor { visited: 0 };
        walk(&root, &mut ctx, &mut v, None).unwrap();
        // root + condition node visited, leaf under it is not
        assert_eq!(v.visited, 2);
    }

    #[test]
    fn input_scope_pushes_and_pops_cleanly() {
        let root = Node::new(NodeKind::Script);
        let input = Node::new(NodeKind::InputText);
        input.set_attribute("name", "flavor");
        root.append(input);

        let mut ctx = Context::new();
        let mut v = CountingVisitor { visited: 0 };
        walk(&root, &mut ctx, &mut v, None).unwrap();
        // stack must be balanced back to just the root scope
        assert_eq!(ctx.scope().key(), "");
    }

    #[test]
    fn batch_resolver_supplies_declared_value() {
        let root = Node::new(NodeKind::Script);
        let input = Node::new(NodeKind::InputText);
        input.set_attribute("name", "flavor");
        root.append(input.clone());

        let mut values = HashMap::new();
        values.insert("flavor".to_string(), Value::of_string("se"));
        let resolver = BatchResolver::new(values);

        struct CaptureVisitor {
            seen: Option<Value>,
        }
        impl Visitor for CaptureVisitor {
            fn visit(&mut self, node: &Node, ctx: &mut Context) -> bool {
                if node.kind() == NodeKind::InputText {
                    self.seen = ctx.scope().local_value("flavor").map(|v| v.value);
                }
                true
            }
        }
        let mut ctx = Context::new();
        let mut v = CaptureVisitor { seen: None };
        walk(&root, &mut ctx, &mut v, Some(&resolver)).unwrap();
        // The scope is pushed after `visit()` runs on the input node itself,
        // so the declared value lives under the child scope that remains in
        // the tree after the walk, not in the scope active during `visit`.
        let flavor_scope = ctx.root().child("flavor").expect("scope created");
        assert_eq!(flavor_scope.local_value("flavor").map(|v| v.value), Some(Value::of_string("se")));
    }
}
