//! Variation enumerator (C10, §4.10).
//!
//! Builds one table per INPUT_* node (columns = possible values, rows =
//! legal selections expressed as a bit vector over the columns), then
//! merges tables in source order against a working set of partial
//! assignments, splitting on each table's guard and cross-combining with
//! its rows. External exclusion filters drop variations after the merge.
//! Each surviving assignment is replayed through the script invoker with
//! a `BatchResolver` to compute its normalized signature.
//!
//! `declared value` below means the node's own `default` attribute: this
//! entry point enumerates a script's inputs in isolation, with no preset
//! overlay threaded in (presets are applied by the interactive host
//! before prompting, a separate call path out of scope for `enumerate`).

use crate::expression_parser::{Expression, TRUE};
use crate::invoker::{self, BatchResolver};
use crate::node::{guard_of, Node, NodeKind};
use crate::scope::Context;
use crate::value::Value;
use log::{debug, trace};
use std::collections::BTreeMap;

/// A single possible value for an input, with the bit position it
/// occupies in its table's rows.
struct Column {
    value: Value,
}

/// A selection of columns, as a bit-per-column vector.
#[derive(Clone)]
struct Row(Vec<bool>);

impl Row {
    fn singleton(len: usize, index: usize) -> Row {
        let mut bits = vec![false; len];
        bits[index] = true;
        Row(bits)
    }
}

struct Table {
    scope_key: String,
    guard: Expression,
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    /// Resolve a row's value: the single selected column for
    /// TEXT/BOOLEAN/ENUM, or the list of selected option labels (minus
    /// the trailing "none" placeholder) for LIST.
    fn row_value(&self, row: &Row, is_list: bool) -> Value {
        if is_list {
            let items: Vec<String> = self
                .columns
                .iter()
                .zip(&row.0)
                .filter(|(_, set)| **set)
                .filter_map(|(c, _)| match &c.value {
                    Value::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            Value::of_list(items)
        } else {
            self.columns
                .iter()
                .zip(&row.0)
                .find(|(_, set)| **set)
                .map(|(c, _)| c.value.clone())
                .unwrap_or(Value::Empty)
        }
    }
}

/// The dotted path of INPUT_* ancestors (inclusive of `node`), matching
/// exactly the scope nesting `invoker::walk` builds (it only pushes a
/// scope for `is_input()` nodes) — CONDITION expressions reference
/// variables by their bare name, which is the single-segment case of
/// this path.
fn scope_key_of(node: &Node) -> String {
    let mut parts = Vec::new();
    if let Some(name) = node.attribute("name") {
        parts.push(crate::scope::normalize_key(&name));
    }
    for ancestor in node.ancestors(|a| a.kind().is_input()) {
        if let Some(name) = ancestor.attribute("name") {
            parts.push(crate::scope::normalize_key(&name));
        }
    }
    parts.reverse();
    parts.join(".")
}

fn table_guard(node: &Node) -> Expression {
    node.nearest_ancestor(|a| a.kind() == NodeKind::Condition)
        .map(|c| guard_of(&c))
        .unwrap_or_else(|| TRUE.clone())
}

fn build_table(node: &Node) -> Option<Table> {
    let scope_key = scope_key_of(node);
    let guard = table_guard(node);
    let default = node.attribute("default");

    match node.kind() {
        NodeKind::InputText => {
            let value = default.unwrap_or_else(|| "<?>".to_string());
            let columns = vec![Column {
                value: Value::of_string(value),
            }];
            let rows = vec![Row::singleton(1, 0)];
            Some(Table {
                scope_key,
                guard,
                columns,
                rows,
            })
        }
        NodeKind::InputBoolean => {
            let pinned_true = default.as_deref() == Some("true");
            let columns = vec![
                Column {
                    value: Value::of_bool(true),
                },
                Column {
                    value: Value::of_bool(false),
                },
            ];
            let mut rows = vec![Row::singleton(2, 0)];
            if !pinned_true {
                rows.push(Row::singleton(2, 1));
            }
            Some(Table {
                scope_key,
                guard,
                columns,
                rows,
            })
        }
        NodeKind::InputEnum => {
            let options = node.children_matching(|c| c.kind() == NodeKind::InputOption);
            let columns: Vec<Column> = options
                .iter()
                .map(|o| Column {
                    value: Value::of_string(o.attribute("value").unwrap_or_default()),
                })
                .collect();
            let rows = match default {
                Some(d) => options
                    .iter()
                    .position(|o| o.attribute("value").as_deref() == Some(d.as_str()))
                    .map(|idx| vec![Row::singleton(columns.len(), idx)])
                    .unwrap_or_default(),
                None => (0..columns.len())
                    .map(|idx| Row::singleton(columns.len(), idx))
                    .collect(),
            };
            Some(Table {
                scope_key,
                guard,
                columns,
                rows,
            })
        }
        NodeKind::InputList => {
            let options = node.children_matching(|c| c.kind() == NodeKind::InputOption);
            let mut columns: Vec<Column> = options
                .iter()
                .map(|o| Column {
                    value: Value::of_string(o.attribute("value").unwrap_or_default()),
                })
                .collect();
            let none_index = columns.len();
            columns.push(Column {
                value: Value::of_string("none"),
            });

            let rows = match default {
                Some(d) => {
                    let picked: Vec<&str> = d.split(',').map(|s| s.trim()).collect();
                    let mut bits = vec![false; columns.len()];
                    for (idx, o) in options.iter().enumerate() {
                        if picked.contains(&o.attribute("value").unwrap_or_default().as_str()) {
                            bits[idx] = true;
                        }
                    }
                    if !bits.iter().any(|b| *b) {
                        bits[none_index] = true;
                    }
                    vec![Row(bits)]
                }
                None => {
                    let n = options.len();
                    let mut rows = Vec::new();
                    for mask in 1..(1u64 << n) {
                        let mut bits = vec![false; columns.len()];
                        for i in 0..n {
                            if mask & (1 << i) != 0 {
                                bits[i] = true;
                            }
                        }
                        rows.push(Row(bits));
                    }
                    rows.push(Row::singleton(columns.len(), none_index));
                    rows
                }
            };
            Some(Table {
                scope_key,
                guard,
                columns,
                rows,
            })
        }
        _ => None,
    }
}

/// A concrete enumerated configuration: the assignment fed to the
/// invoker, and the normalized signature used for deduplication.
#[derive(Debug, Clone)]
pub struct Variation {
    pub assignment: BTreeMap<String, Value>,
    pub signature: String,
}

fn guard_holds(guard: &Expression, assignment: &BTreeMap<String, Value>) -> bool {
    guard
        .eval(&|name| assignment.get(name).cloned())
        .unwrap_or(false)
}

/// Enumerate every legal input combination of `root` (a pruned source
/// tree), excluding any that satisfy one of `filters`.
pub fn enumerate(root: &Node, filters: &[Expression]) -> Vec<Variation> {
    let input_nodes = root.collect(|n| n.kind().is_input());
    let tables: Vec<Table> = input_nodes.iter().filter_map(build_table).collect();
    debug!("variations: {} input table(s)", tables.len());

    let mut working: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
    for (i, table) in tables.iter().enumerate() {
        let is_list = matches!(
            input_nodes
                .iter()
                .find(|n| scope_key_of(n) == table.scope_key)
                .map(|n| n.kind()),
            Some(NodeKind::InputList)
        );
        let mut next = Vec::new();
        for assignment in &working {
            if !guard_holds(&table.guard, assignment) {
                next.push(assignment.clone());
                continue;
            }
            for row in &table.rows {
                let mut a = assignment.clone();
                a.insert(table.scope_key.clone(), table.row_value(row, is_list));
                next.push(a);
            }
        }
        working = next;
        if working.len() > 1_000_000 {
            trace!("variations: table {}/{}, working set {}", i + 1, tables.len(), working.len());
        }
    }

    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for assignment in working {
        if filters.iter().any(|f| guard_holds(f, &assignment)) {
            continue;
        }
        let signature = normalize(root, &input_nodes, &assignment);
        if seen.insert(signature.clone()) {
            out.push(Variation {
                assignment,
                signature,
            });
        }
    }
    debug!("variations: {} distinct variation(s)", out.len());
    out
}

struct DescendAll;

impl invoker::Visitor for DescendAll {
    fn visit(&mut self, _node: &Node, _ctx: &mut Context) -> bool {
        true
    }
}

/// Replay `assignment` through the invoker, then read back every input's
/// declared value from the scope tree left behind by the walk (the
/// declaring scope is only reachable post-walk, since a push happens
/// after `visit()` runs on the input node itself and pops before
/// `post_visit` — see `invoker::tests::batch_resolver_supplies_declared_value`).
fn normalize(root: &Node, input_nodes: &[Node], assignment: &BTreeMap<String, Value>) -> String {
    let resolver = BatchResolver::new(assignment.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    let mut ctx = Context::new();
    let mut visitor = DescendAll;
    let _ = invoker::walk(root, &mut ctx, &mut visitor, Some(&resolver));

    let mut entries = Vec::new();
    for node in input_nodes {
        let key = scope_key_of(node);
        if key.is_empty() {
            continue;
        }
        let segments: Vec<&str> = key.split('.').collect();
        let mut scope = ctx.root();
        let mut value = None;
        for (i, seg) in segments.iter().enumerate() {
            match scope.child(seg) {
                Some(child) => {
                    if i == segments.len() - 1 {
                        value = child.local_value(seg);
                    }
                    scope = child;
                }
                None => break,
            }
        }
        if let Some(v) = value {
            entries.push(format!("{}={}", key, v.value));
        }
    }
    entries.sort();
    entries.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression_parser::parse;

    fn input_text(name: &str) -> Node {
        let n = Node::new(NodeKind::InputText);
        n.set_attribute("name", name);
        n
    }

    fn input_boolean(name: &str) -> Node {
        let n = Node::new(NodeKind::InputBoolean);
        n.set_attribute("name", name);
        n
    }

    #[test]
    fn boolean_input_without_default_has_two_rows() {
        let root = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        step.append(input_boolean("enabled"));
        root.append(step);

        let variations = enumerate(&root, &[]);
        assert_eq!(variations.len(), 2);
    }

    #[test]
    fn boolean_input_pinned_true_has_one_row() {
        let root = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        let b = input_boolean("enabled");
        b.set_attribute("default", "true");
        step.append(b);
        root.append(step);

        let variations = enumerate(&root, &[]);
        assert_eq!(variations.len(), 1);
    }

    #[test]
    fn guarded_input_only_contributes_rows_when_guard_holds() {
        let root = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        let flag = input_boolean("flag");
        step.append(flag);
        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(parse("${flag}").unwrap());
        let nested_step = Node::new(NodeKind::Step);
        nested_step.append(input_text("extra"));
        cond.append(nested_step);
        root.append(step);
        root.append(cond);

        let variations = enumerate(&root, &[]);
        // flag=true pulls in "extra"'s one text row; flag=false does not.
        assert_eq!(variations.len(), 2);
    }

    #[test]
    fn exclusion_filter_drops_matching_variations() {
        let root = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        step.append(input_boolean("enabled"));
        root.append(step);

        let filter = parse("${enabled}").unwrap();
        let variations = enumerate(&root, &[filter]);
        assert_eq!(variations.len(), 1);
    }
}
