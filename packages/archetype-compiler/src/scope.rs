//! Context & scope (C3).
//!
//! A `Scope` is a node in a tree that mirrors the declaration nesting of a
//! script (steps, inputs, presets, variables): each scope has a parent
//! link, a local name, and a map of declared `ScopeValue`s keyed by the
//! normalized local name of the declaration. `Context` wraps the tree root
//! with the push/pop stacks the invoker uses while walking a script.
//!
//! Scopes are arena-style `Rc<RefCell<_>>` handles rather than raw
//! back-pointers, matching the realization note in the data model: we need
//! parent links plus shared ownership from both the scope tree and the
//! node mirror map, which is awkward to express with `Box`-owned trees.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

/// Provenance of a declared scope value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOrigin {
    User,
    Default,
    Preset,
}

#[derive(Debug, Clone)]
pub struct ScopeValue {
    /// Dotted key of the scope that declared this value.
    pub origin_key: String,
    pub kind: ValueOrigin,
    pub value: Value,
    pub auto_created: bool,
}

impl ScopeValue {
    pub fn new(origin_key: impl Into<String>, kind: ValueOrigin, value: Value) -> Self {
        ScopeValue {
            origin_key: origin_key.into(),
            kind,
            value,
            auto_created: false,
        }
    }

    pub fn auto_created(mut self) -> Self {
        self.auto_created = true;
        self
    }
}

/// Normalize a single path segment: alphanumerics plus `._-`, compared
/// lower-case (§4.3).
pub fn normalize_key(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_ascii_lowercase()
}

struct ScopeData {
    parent: Option<Weak<RefCell<ScopeData>>>,
    root: Weak<RefCell<ScopeData>>,
    name: String,
    children: HashMap<String, Scope>,
    values: HashMap<String, ScopeValue>,
}

/// A handle to a node in the scope tree. Cheap to clone.
#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeData>>);

impl Scope {
    /// Create a fresh, empty root scope.
    pub fn root() -> Scope {
        let data = Rc::new(RefCell::new(ScopeData {
            parent: None,
            root: Weak::new(),
            name: String::new(),
            children: HashMap::new(),
            values: HashMap::new(),
        }));
        data.borrow_mut().root = Rc::downgrade(&data);
        Scope(data)
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn parent(&self) -> Option<Scope> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(|w| w.upgrade())
            .map(Scope)
    }

    fn root_scope(&self) -> Scope {
        self.0
            .borrow()
            .root
            .upgrade()
            .map(Scope)
            .unwrap_or_else(|| self.clone())
    }

    /// Dotted path from the root, e.g. `step.flavor`.
    pub fn key(&self) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(s) = cur {
            let name = s.name();
            if !name.is_empty() {
                parts.push(name);
            }
            cur = s.parent();
        }
        parts.reverse();
        parts.join(".")
    }

    /// Normalize `reference` against this scope: a leading `~` makes it an
    /// absolute path from the root; otherwise it is relative to this
    /// scope's own key.
    pub fn normalize_reference(&self, reference: &str) -> String {
        if let Some(rest) = reference.strip_prefix('~') {
            rest.split('.')
                .map(normalize_key)
                .collect::<Vec<_>>()
                .join(".")
        } else {
            let own = self.key();
            let norm_ref = reference
                .split('.')
                .map(normalize_key)
                .collect::<Vec<_>>()
                .join(".");
            if own.is_empty() {
                norm_ref
            } else {
                format!("{}.{}", own, norm_ref)
            }
        }
    }

    /// `getOrCreate`: find or create a child scope with the given local
    /// name (already expected normalized by the caller's declaration site).
    pub fn get_or_create_child(&self, local_name: &str) -> Scope {
        let key = normalize_key(local_name);
        if let Some(existing) = self.0.borrow().children.get(&key) {
            return existing.clone();
        }
        let child_data = Rc::new(RefCell::new(ScopeData {
            parent: Some(Rc::downgrade(&self.0)),
            root: self.0.borrow().root.clone(),
            name: key.clone(),
            children: HashMap::new(),
            values: HashMap::new(),
        }));
        let child = Scope(child_data);
        self.0.borrow_mut().children.insert(key, child.clone());
        child
    }

    pub fn child(&self, local_name: &str) -> Option<Scope> {
        self.0.borrow().children.get(&normalize_key(local_name)).cloned()
    }

    /// Declare a value under a local (single-segment, normalized) name.
    pub fn declare(&self, local_name: &str, value: ScopeValue) {
        self.0
            .borrow_mut()
            .values
            .insert(normalize_key(local_name), value);
    }

    pub fn local_value(&self, local_name: &str) -> Option<ScopeValue> {
        self.0.borrow().values.get(&normalize_key(local_name)).cloned()
    }

    /// Resolve `reference` (absolute `~x.y` or relative to this scope) by
    /// walking the scope tree from the root.
    pub fn get(&self, reference: &str) -> Option<ScopeValue> {
        let full_key = self.normalize_reference(reference);
        if full_key.is_empty() {
            return None;
        }
        let mut parts = full_key.split('.');
        let first = parts.next()?;
        let root = self.root_scope();
        let mut cursor = root.child(first)?;
        let mut last_found = cursor.local_value(first);
        for part in parts {
            if let Some(v) = cursor.local_value(part) {
                last_found = Some(v);
            }
            cursor = cursor.child(part)?;
        }
        last_found.or_else(|| cursor.local_value(full_key.rsplit('.').next().unwrap_or(&full_key)))
    }
}

/// Owns the scope tree root plus the push/pop stacks the invoker threads
/// through a depth-first script walk.
pub struct Context {
    root: Scope,
    stack: Vec<Scope>,
    cwd_stack: Vec<PathBuf>,
}

impl Context {
    pub fn new() -> Self {
        let root = Scope::root();
        Context {
            stack: vec![root.clone()],
            root,
            cwd_stack: Vec::new(),
        }
    }

    pub fn root(&self) -> Scope {
        self.root.clone()
    }

    /// The current scope (top of stack).
    pub fn scope(&self) -> Scope {
        self.stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.root.clone())
    }

    pub fn push_scope(&mut self, local_name: &str) -> Scope {
        let child = self.scope().get_or_create_child(local_name);
        self.stack.push(child.clone());
        child
    }

    pub fn pop_scope(&mut self) -> Scope {
        if self.stack.len() <= 1 {
            panic!("scope stack underflow: pop_scope without a matching push_scope");
        }
        self.stack.pop().unwrap()
    }

    pub fn push_cwd(&mut self, path: PathBuf) {
        self.cwd_stack.push(path);
    }

    pub fn pop_cwd(&mut self) -> Option<PathBuf> {
        self.cwd_stack.pop()
    }

    pub fn cwd(&self) -> Option<&PathBuf> {
        self.cwd_stack.last()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_dotted_path_from_root() {
        let ctx = Context::new();
        let step = ctx.root().get_or_create_child("step");
        let input = step.get_or_create_child("flavor");
        assert_eq!(input.key(), "step.flavor");
    }

    #[test]
    fn normalization_lowercases_and_strips_invalid_chars() {
        assert_eq!(normalize_key("My Flavor!"), "myflavor");
    }

    #[test]
    fn absolute_reference_resolves_from_root() {
        let mut ctx = Context::new();
        let step = ctx.push_scope("step");
        step.declare("flavor", ScopeValue::new("step.flavor", ValueOrigin::User, Value::of_string("se")));
        ctx.pop_scope();
        let elsewhere = ctx.push_scope("other");
        let found = elsewhere.get("~step.flavor").unwrap();
        assert_eq!(found.value, Value::of_string("se"));
    }

    #[test]
    fn relative_reference_resolves_against_current_scope() {
        let mut ctx = Context::new();
        let step = ctx.push_scope("step");
        step.declare("flavor", ScopeValue::new("step.flavor", ValueOrigin::Default, Value::of_string("se")));
        let found = step.get("flavor").unwrap();
        assert_eq!(found.value, Value::of_string("se"));
        ctx.pop_scope();
    }

    #[test]
    fn cwd_stack_is_lifo() {
        let mut ctx = Context::new();
        ctx.push_cwd(PathBuf::from("/a"));
        ctx.push_cwd(PathBuf::from("/a/b"));
        assert_eq!(ctx.pop_cwd(), Some(PathBuf::from("/a/b")));
        assert_eq!(ctx.pop_cwd(), Some(PathBuf::from("/a")));
        assert_eq!(ctx.pop_cwd(), None);
    }
}
