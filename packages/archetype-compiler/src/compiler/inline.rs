//! Inline pass (C6 pass A): resolves SOURCE/EXEC/CALL nodes by loading the
//! referenced script through the `ScriptLoader` collaborator and splicing
//! its tree into the calling node's position.
//!
//! Caching is intentionally left off (`load(.., false)`) so every call site
//! gets a distinct subtree, matching §6's "disables caching during inline"
//! requirement — two CALLs to the same method must not alias the same
//! node identities, or later id assignment and mutation in `refs_prune`
//! would corrupt both call sites at once.

use crate::error::ErrorKind;
use crate::external::{ScriptLoader, ScriptSource};
use crate::node::{Node, NodeKind};
use std::collections::HashMap;

fn source_of(node: &Node) -> Option<ScriptSource> {
    if let Some(path) = node.attribute("path") {
        return Some(ScriptSource::Path(path));
    }
    node.attribute("url").map(ScriptSource::Url)
}

/// Walk `node`'s subtree, splicing in every SOURCE/EXEC/CALL it finds.
/// `call_counts` disambiguates repeated CALLs to the same method so their
/// stub variable names (assigned later, in stub insertion) never collide.
pub fn inline_tree(node: &Node, loader: &dyn ScriptLoader, call_counts: &mut HashMap<String, u64>) -> Result<(), ErrorKind> {
    match node.kind() {
        NodeKind::Source | NodeKind::Exec => {
            let source = source_of(node)
                .ok_or_else(|| ErrorKind::InlineMethodNotFound(node.attribute("name").unwrap_or_default()))?;
            if source.is_url() {
                return Ok(());
            }
            let loaded = loader
                .load(&source, false)
                .map_err(|e| ErrorKind::InlineMethodNotFound(e.to_string()))?;
            node.replace(loaded.children());
            Ok(())
        }
        NodeKind::Call => {
            let method = node.attribute("method").unwrap_or_default();
            let source = source_of(node)
                .ok_or_else(|| ErrorKind::InlineMethodNotFound(method.clone()))?;
            let loaded = loader
                .load(&source, false)
                .map_err(|e| ErrorKind::InlineMethodNotFound(e.to_string()))?;
            let target = loaded
                .collect(|n| n.kind() == NodeKind::Method && n.attribute("name").as_deref() == Some(method.as_str()))
                .into_iter()
                .next()
                .ok_or_else(|| ErrorKind::InlineMethodNotFound(method.clone()))?;
            let count = call_counts.entry(method.clone()).or_insert(0);
            let call_id = crate::invoker::call_site_id(&format!("{}#{}", method, count));
            *count += 1;
            target.set_attribute("call_id", call_id);
            let children = target.children();
            node.replace(children.clone());
            // The spliced subtree may itself contain SOURCE/EXEC/CALL nodes
            // (a method calling another method); inline those recursively.
            for child in children {
                inline_tree(&child, loader, call_counts)?;
            }
            Ok(())
        }
        _ => {
            for child in node.children() {
                inline_tree(&child, loader, call_counts)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::InMemoryArchive;

    #[test]
    fn source_node_is_replaced_by_the_loaded_script_children() {
        let loaded = Node::new(NodeKind::Script);
        let step = Node::new(NodeKind::Step);
        step.set_attribute("name", "s");
        loaded.append(step);
        let archive = InMemoryArchive::new().with_script("lib.xml", loaded);

        let root = Node::new(NodeKind::Script);
        let source = Node::new(NodeKind::Source);
        source.set_attribute("path", "lib.xml");
        root.append(source);

        let mut counts = HashMap::new();
        inline_tree(&root, &archive, &mut counts).unwrap();
        let kids = root.children();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].kind(), NodeKind::Step);
    }

    fn method_library(name: &str) -> Node {
        let library = Node::new(NodeKind::Script);
        let method = Node::new(NodeKind::Method);
        method.set_attribute("name", name);
        method.append(Node::new(NodeKind::Step));
        library.append(method);
        library
    }

    #[test]
    fn repeated_calls_to_the_same_method_get_distinct_call_ids() {
        let archive = InMemoryArchive::new().with_script("m.xml", method_library("m"));

        let root = Node::new(NodeKind::Script);
        let call_a = Node::new(NodeKind::Call);
        call_a.set_attribute("method", "m");
        call_a.set_attribute("path", "m.xml");
        let call_b = Node::new(NodeKind::Call);
        call_b.set_attribute("method", "m");
        call_b.set_attribute("path", "m.xml");
        root.append(call_a.clone());
        root.append(call_b.clone());

        let mut counts = HashMap::new();
        inline_tree(&root, &archive, &mut counts).unwrap();
        assert_eq!(counts.get("m"), Some(&2));
        let steps = root.collect(|n| n.kind() == NodeKind::Step);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn call_splices_only_the_named_methods_body() {
        let library = Node::new(NodeKind::Script);
        let wanted = Node::new(NodeKind::Method);
        wanted.set_attribute("name", "wanted");
        wanted.append(Node::new(NodeKind::Step));
        let other = Node::new(NodeKind::Method);
        other.set_attribute("name", "other");
        other.append(Node::new(NodeKind::Step));
        other.append(Node::new(NodeKind::Step));
        library.append(wanted);
        library.append(other);
        let archive = InMemoryArchive::new().with_script("lib.xml", library);

        let root = Node::new(NodeKind::Script);
        let call = Node::new(NodeKind::Call);
        call.set_attribute("method", "wanted");
        call.set_attribute("path", "lib.xml");
        root.append(call);

        let mut counts = HashMap::new();
        inline_tree(&root, &archive, &mut counts).unwrap();
        assert_eq!(root.collect(|n| n.kind() == NodeKind::Step).len(), 1);
    }

    #[test]
    fn call_to_a_missing_method_is_an_error() {
        let archive = InMemoryArchive::new().with_script("m.xml", method_library("m"));
        let root = Node::new(NodeKind::Script);
        let call = Node::new(NodeKind::Call);
        call.set_attribute("method", "missing");
        call.set_attribute("path", "m.xml");
        root.append(call);

        let mut counts = HashMap::new();
        let err = inline_tree(&root, &archive, &mut counts).unwrap_err();
        assert!(matches!(err, ErrorKind::InlineMethodNotFound(_)));
    }

    #[test]
    fn url_sources_are_skipped_rather_than_erroring() {
        let archive = InMemoryArchive::new();
        let root = Node::new(NodeKind::Script);
        let source = Node::new(NodeKind::Source);
        source.set_attribute("url", "https://example.com/a.xml");
        root.append(source.clone());
        let mut counts = HashMap::new();
        inline_tree(&root, &archive, &mut counts).unwrap();
        assert_eq!(root.children().len(), 1);
    }
}
