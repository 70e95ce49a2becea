//! Tree/Node IR (C4).
//!
//! A kind-tagged, mutable n-ary tree used for both the source script tree
//! and the rendered image tree. Nodes are arena-style `Rc<RefCell<_>>`
//! handles so they can carry parent links and participate in the
//! bidirectional source/image mirror map without raw pointers or an
//! external arena index (see §3, §9).

use crate::expression_parser::{Expression, TRUE};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// The three partitions of node kinds named by the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeGroup {
    Block,
    Input,
    Variable,
    Preset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // BLOCK
    Script,
    Step,
    Inputs,
    Variables,
    Presets,
    Output,
    Model,
    Transformation,
    Include,
    Exclude,
    Condition,
    Method,
    Source,
    Exec,
    Call,
    File,
    Template,
    Files,
    Templates,
    Replace,
    ModelValue,
    // INPUT
    InputBoolean,
    InputText,
    InputEnum,
    InputList,
    InputOption,
    // VARIABLE
    VariableBoolean,
    VariableText,
    VariableList,
    // PRESET
    PresetBoolean,
    PresetText,
    PresetList,
}

impl NodeKind {
    pub fn group(self) -> NodeGroup {
        match self {
            NodeKind::InputBoolean
            | NodeKind::InputText
            | NodeKind::InputEnum
            | NodeKind::InputList
            | NodeKind::InputOption => NodeGroup::Input,
            NodeKind::VariableBoolean | NodeKind::VariableText | NodeKind::VariableList => {
                NodeGroup::Variable
            }
            NodeKind::PresetBoolean | NodeKind::PresetText | NodeKind::PresetList => {
                NodeGroup::Preset
            }
            _ => NodeGroup::Block,
        }
    }

    pub fn is_input(self) -> bool {
        self.group() == NodeGroup::Input
    }

    pub fn is_variable(self) -> bool {
        self.group() == NodeGroup::Variable
    }

    pub fn is_preset(self) -> bool {
        self.group() == NodeGroup::Preset
    }
}

struct NodeData {
    kind: NodeKind,
    id: Option<u64>,
    parent: Option<Weak<RefCell<NodeData>>>,
    children: Vec<Node>,
    attributes: HashMap<String, String>,
    value: Option<String>,
    expression: Option<Expression>,
}

/// A handle to a node in a script or image tree. Cheap to clone; clones
/// alias the same underlying node.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    pub fn new(kind: NodeKind) -> Node {
        Node(Rc::new(RefCell::new(NodeData {
            kind,
            id: None,
            parent: None,
            children: Vec::new(),
            attributes: HashMap::new(),
            value: None,
            expression: None,
        })))
    }

    pub fn kind(&self) -> NodeKind {
        self.0.borrow().kind
    }

    pub fn id(&self) -> Option<u64> {
        self.0.borrow().id
    }

    pub fn set_id(&self, id: u64) {
        self.0.borrow_mut().id = Some(id);
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.as_ref().and_then(|w| w.upgrade()).map(Node)
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.0.borrow().attributes.get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, val: impl Into<String>) {
        self.0.borrow_mut().attributes.insert(key.into(), val.into());
    }

    pub fn attributes(&self) -> HashMap<String, String> {
        self.0.borrow().attributes.clone()
    }

    pub fn value(&self) -> Option<String> {
        self.0.borrow().value.clone()
    }

    pub fn set_value(&self, val: impl Into<String>) {
        self.0.borrow_mut().value = Some(val.into());
    }

    pub fn expression(&self) -> Option<Expression> {
        self.0.borrow().expression.clone()
    }

    pub fn set_expression(&self, expr: Expression) {
        self.0.borrow_mut().expression = Some(expr);
    }

    fn set_parent(&self, parent: Option<&Node>) {
        self.0.borrow_mut().parent = parent.map(|p| Rc::downgrade(&p.0));
    }

    pub fn append(&self, child: Node) {
        child.set_parent(Some(self));
        self.0.borrow_mut().children.push(child);
    }

    pub fn insert(&self, index: usize, child: Node) {
        child.set_parent(Some(self));
        self.0.borrow_mut().children.insert(index, child);
    }

    /// Detach this node from its parent. No-op at the root.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent
                .0
                .borrow_mut()
                .children
                .retain(|c| !Rc::ptr_eq(&c.0, &self.0));
        }
        self.0.borrow_mut().parent = None;
    }

    /// Splice `children` into this node's position in its parent, removing
    /// this node. If this node has no parent, this is a no-op (there is
    /// nowhere to splice a replacement into).
    pub fn replace(&self, children: Vec<Node>) {
        let parent = match self.parent() {
            Some(p) => p,
            None => return,
        };
        let mut pd = parent.0.borrow_mut();
        if let Some(idx) = pd.children.iter().position(|c| Rc::ptr_eq(&c.0, &self.0)) {
            for child in &children {
                child.set_parent(Some(&parent));
            }
            pd.children.splice(idx..idx + 1, children);
        }
        drop(pd);
        self.0.borrow_mut().parent = None;
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn children_matching(&self, pred: impl Fn(&Node) -> bool) -> Vec<Node> {
        self.children().into_iter().filter(pred).collect()
    }

    /// Full pre-order traversal, including `self`.
    pub fn traverse(&self) -> Vec<Node> {
        let mut out = vec![self.clone()];
        for child in self.children() {
            out.extend(child.traverse());
        }
        out
    }

    /// Pre-order traversal that only descends into a node's children when
    /// `descend` returns true for it (used by the invoker so CONDITION
    /// nodes whose guard evaluates false are not visited below).
    pub fn traverse_while(&self, descend: &dyn Fn(&Node) -> bool) -> Vec<Node> {
        let mut out = vec![self.clone()];
        if descend(self) {
            for child in self.children() {
                out.extend(child.traverse_while(descend));
            }
        }
        out
    }

    /// All descendants (including self) matching `pred`, regardless of
    /// pruning — used by validation passes that must see every node.
    pub fn collect(&self, pred: impl Fn(&Node) -> bool + Copy) -> Vec<Node> {
        self.traverse().into_iter().filter(|n| pred(n)).collect()
    }

    /// Walk the parent chain (excluding self), returning ancestors
    /// matching `pred`, nearest first.
    pub fn ancestors(&self, pred: impl Fn(&Node) -> bool) -> Vec<Node> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(n) = cur {
            if pred(&n) {
                out.push(n.clone());
            }
            cur = n.parent();
        }
        out
    }

    /// The nearest ancestor for which `pred` holds, if any.
    pub fn nearest_ancestor(&self, pred: impl Fn(&Node) -> bool) -> Option<Node> {
        self.ancestors(pred).into_iter().next()
    }

    /// Deep copy with fresh node identity (new `Rc`s throughout, no ids,
    /// no parent link on the root of the copy). Used by CALL splicing.
    pub fn deep_copy(&self) -> Node {
        let d = self.0.borrow();
        let copy = Node::new(d.kind);
        {
            let mut cd = copy.0.borrow_mut();
            cd.attributes = d.attributes.clone();
            cd.value = d.value.clone();
            cd.expression = d.expression.clone();
        }
        for child in d.children.iter() {
            copy.append(child.deep_copy());
        }
        copy
    }

    /// Shallow copy: same kind/attributes/expression/value, no children,
    /// no parent.
    pub fn copy(&self) -> Node {
        let d = self.0.borrow();
        let copy = Node::new(d.kind);
        let mut cd = copy.0.borrow_mut();
        cd.attributes = d.attributes.clone();
        cd.value = d.value.clone();
        cd.expression = d.expression.clone();
        drop(cd);
        copy
    }

    /// Wrap this node in a fresh CONDITION parent carrying `expr`, splicing
    /// the condition into this node's former position. Returns the node
    /// unchanged if `expr` is TRUE (§4.4: "wraps the node into a
    /// condition-parent if expr != TRUE; otherwise returns unchanged").
    pub fn wrap(&self, expr: Expression) -> Node {
        if expr.is_true() {
            return self.clone();
        }
        let condition = Node::new(NodeKind::Condition);
        condition.set_expression(expr);
        if let Some(parent) = self.parent() {
            let mut pd = parent.0.borrow_mut();
            if let Some(idx) = pd.children.iter().position(|c| Rc::ptr_eq(&c.0, &self.0)) {
                condition.set_parent(Some(&parent));
                pd.children[idx] = condition.clone();
            }
        }
        self.set_parent(Some(&condition));
        condition.0.borrow_mut().children.push(self.clone());
        condition
    }

    /// For a CONDITION node with exactly one child, return that child;
    /// otherwise return this node unchanged. Invariant:
    /// `unwrap(x).kind() != Condition` whenever `x.kind() == Condition`
    /// and `x` was produced by `wrap`.
    pub fn unwrap(&self) -> Node {
        if self.kind() == NodeKind::Condition {
            let children = self.children();
            if children.len() == 1 {
                return children.into_iter().next().unwrap();
            }
        }
        self.clone()
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind() == kind
    }

    pub fn identity_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// The expression guarding descent into `node`'s subtree: its own
/// CONDITION expression if present, else TRUE.
pub fn guard_of(node: &Node) -> Expression {
    if node.kind() == NodeKind::Condition {
        node.expression().unwrap_or_else(|| TRUE.clone())
    } else {
        TRUE.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn append_sets_parent_link() {
        let root = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        root.append(step.clone());
        assert!(step.parent().unwrap().identity_eq(&root));
    }

    #[test]
    fn remove_detaches_from_parent() {
        let root = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        root.append(step.clone());
        step.remove();
        assert!(step.parent().is_none());
        assert_eq!(root.children().len(), 0);
    }

    #[test]
    fn replace_splices_children_into_parent_position() {
        let root = Node::new(NodeKind::Script);
        let a = Node::new(NodeKind::Step);
        let b = Node::new(NodeKind::Step);
        root.append(a.clone());
        root.append(b.clone());
        let c1 = Node::new(NodeKind::InputText);
        let c2 = Node::new(NodeKind::InputText);
        a.replace(vec![c1.clone(), c2.clone()]);
        let kids = root.children();
        assert_eq!(kids.len(), 3);
        assert!(kids[0].identity_eq(&c1));
        assert!(kids[1].identity_eq(&c2));
        assert!(kids[2].identity_eq(&b));
    }

    #[test]
    fn wrap_is_noop_for_true_and_wraps_otherwise() {
        let n = Node::new(NodeKind::InputText);
        assert!(n.wrap(TRUE.clone()).identity_eq(&n));
        let guarded = n.wrap(Expression::literal_value(Value::of_bool(false)));
        assert_eq!(guarded.kind(), NodeKind::Condition);
        assert!(guarded.unwrap().identity_eq(&n));
    }

    #[test]
    fn deep_copy_preserves_structure_with_fresh_identity() {
        let root = Node::new(NodeKind::Script);
        let child = Node::new(NodeKind::Step);
        child.set_attribute("name", "s1");
        root.append(child);
        let copy = root.deep_copy();
        assert!(!copy.identity_eq(&root));
        assert_eq!(copy.children().len(), 1);
        assert_eq!(copy.children()[0].attribute("name"), Some("s1".to_string()));
    }

    #[test]
    fn traverse_is_preorder_including_self() {
        let root = Node::new(NodeKind::Script);
        let a = Node::new(NodeKind::Step);
        let b = Node::new(NodeKind::InputText);
        a.append(b.clone());
        root.append(a.clone());
        let all = root.traverse();
        assert_eq!(all.len(), 3);
        assert!(all[0].identity_eq(&root));
        assert!(all[1].identity_eq(&a));
        assert!(all[2].identity_eq(&b));
    }
}
