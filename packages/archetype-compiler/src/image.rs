//! The emitted Image container and its XML wire format (§6, §3).
//!
//! `Image` pairs a fresh root `Node` (built by the compiler's render
//! passes) with a content-addressed blob map. `Image::write` serializes
//! the root to a pretty-printed `main.xml` and writes one file per blob
//! under `blobs/<id>`, via `quick-xml`'s `Writer` rather than hand-rolled
//! string concatenation (see §1.1's ambient-stack rationale).

use crate::external::Filesystem;
use crate::node::{Node, NodeKind};
use crate::util::{blob_id, normalize_newlines};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub struct Image {
    pub root: Node,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl Image {
    pub fn new() -> Self {
        Image {
            root: Node::new(NodeKind::Script),
            blobs: BTreeMap::new(),
        }
    }

    /// Insert newline-normalized content into the blob store, returning
    /// its content-addressed id. Idempotent: inserting identical content
    /// twice yields the same id and does not duplicate storage.
    pub fn insert_blob(&mut self, content: &[u8]) -> String {
        let id = blob_id(content);
        self.blobs
            .entry(id.clone())
            .or_insert_with(|| normalize_newlines(content));
        id
    }

    pub fn blob(&self, id: &str) -> Option<&Vec<u8>> {
        self.blobs.get(id)
    }

    pub fn blob_ids(&self) -> Vec<String> {
        self.blobs.keys().cloned().collect()
    }

    /// Render `main.xml`'s bytes without touching any filesystem.
    pub fn render_xml(&self) -> Vec<u8> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        write_node(&mut writer, &self.root);
        writer.into_inner().into_inner()
    }

    /// Write `main.xml` and every `blobs/<id>` file into `out_dir` through
    /// the `Filesystem` collaborator.
    pub fn write(&self, out_dir: &Path, fs: &dyn Filesystem) -> std::io::Result<()> {
        let mut files: Vec<(PathBuf, Vec<u8>)> = vec![(PathBuf::from("main.xml"), self.render_xml())];
        for (id, content) in &self.blobs {
            files.push((PathBuf::from("blobs").join(id), content.clone()));
        }
        fs.write_dir(out_dir, &files)
    }
}

impl Default for Image {
    fn default() -> Self {
        Image::new()
    }
}

fn tag_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Script => "script",
        NodeKind::Step => "step",
        NodeKind::Inputs => "inputs",
        NodeKind::Variables => "variables",
        NodeKind::Presets => "presets",
        NodeKind::Output => "output",
        NodeKind::Model => "model",
        NodeKind::Transformation => "transformation",
        NodeKind::Include => "include",
        NodeKind::Exclude => "exclude",
        NodeKind::Condition => "condition",
        NodeKind::Method => "method",
        NodeKind::Source => "source",
        NodeKind::Exec => "exec",
        NodeKind::Call => "call",
        NodeKind::File => "file",
        NodeKind::Template => "template",
        NodeKind::Files => "files",
        NodeKind::Templates => "templates",
        NodeKind::Replace => "replace",
        NodeKind::ModelValue => "model-value",
        NodeKind::InputBoolean => "input_boolean",
        NodeKind::InputText => "input_text",
        NodeKind::InputEnum => "input_enum",
        NodeKind::InputList => "input_list",
        NodeKind::InputOption => "input_option",
        NodeKind::VariableBoolean => "variable_boolean",
        NodeKind::VariableText => "variable_text",
        NodeKind::VariableList => "variable_list",
        NodeKind::PresetBoolean => "preset_boolean",
        NodeKind::PresetText => "preset_text",
        NodeKind::PresetList => "preset_list",
    }
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) {
    let name = tag_name(node.kind());
    let children = node.children();
    let attrs = node.attributes();

    let mut start = BytesStart::new(name);
    // Sorted for deterministic output regardless of HashMap iteration order.
    let mut sorted: Vec<(&String, &String)> = attrs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for (k, v) in sorted {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if node.kind() == NodeKind::Condition {
        if let Some(expr) = node.expression() {
            start.push_attribute(("expr", expr.literal().as_str()));
        }
    }

    let has_value = node.value().is_some();
    if children.is_empty() && !has_value {
        let _ = writer.write_event(Event::Empty(start));
        return;
    }

    let _ = writer.write_event(Event::Start(start));
    if let Some(v) = node.value() {
        let _ = writer.write_event(Event::Text(BytesText::new(&v)));
    }
    for child in children {
        write_node(writer, &child);
    }
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn blob_insertion_is_content_addressed_and_idempotent() {
        let mut img = Image::new();
        let id1 = img.insert_blob(b"hello\n");
        let id2 = img.insert_blob(b"hello\r\n");
        assert_eq!(id1, id2);
        assert_eq!(img.blob_ids().len(), 1);
    }

    #[test]
    fn render_xml_contains_root_tag() {
        let img = Image::new();
        let xml = String::from_utf8(img.render_xml()).unwrap();
        assert!(xml.contains("<script"));
    }

    #[test]
    fn condition_nodes_serialize_expr_attribute() {
        let mut img = Image::new();
        let cond = Node::new(NodeKind::Condition);
        cond.set_expression(crate::expression_parser::Expression::literal_value(Value::of_bool(
            true,
        )));
        img.root.append(cond);
        let xml = String::from_utf8(img.render_xml()).unwrap();
        assert!(xml.contains("expr=\"true\""));
    }
}
