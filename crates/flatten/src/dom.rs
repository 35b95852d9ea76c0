//! A small mutable DOM over the external XML parser.
//!
//! The pipeline owns one [`Document`] per flatten call and mutates it in
//! place: attribute rewrites, subtree clones (use expansion, markers,
//! patterns) and node removal (defs sweep). Nodes live in an arena and
//! are addressed by [`NodeId`]; detached nodes simply become unreachable
//! from the root.
//!
//! Namespace prefixes are preserved verbatim: qualified names are stored
//! as written (`inkscape:label`, `xlink:href`) and namespace declarations
//! are re-emitted on the element that introduced them.

use crate::ErrorKind;

/// Handle to a node in a [`Document`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug)]
pub enum NodeKind {
    Element {
        /// Qualified tag name, prefix included.
        tag: String,
        /// Attributes in document order; serialization follows this order.
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable SVG document tree.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Document {
    /// Parse an SVG string through the external XML parser into a mutable
    /// tree.
    pub fn parse(src: &str) -> Result<Document, ErrorKind> {
        let parsed = roxmltree::Document::parse(src)?;
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = doc.import(parsed.root_element(), None);
        doc.root = root;
        Ok(doc)
    }

    fn import(&mut self, node: roxmltree::Node<'_, '_>, parent: Option<NodeId>) -> NodeId {
        let tag = qualified_tag(&node);
        let mut attributes = Vec::new();

        // Namespace declarations new on this element come back first, the
        // way authors usually write them.
        let parent_ns: Vec<(Option<String>, String)> = node
            .parent_element()
            .map(collect_namespaces)
            .unwrap_or_default();
        for (prefix, uri) in collect_namespaces(node) {
            if parent_ns.iter().any(|(p, u)| *p == prefix && *u == uri) {
                continue;
            }
            let name = match &prefix {
                Some(p) => format!("xmlns:{}", p),
                None => "xmlns".to_string(),
            };
            attributes.push((name, uri));
        }
        for attr in node.attributes() {
            attributes.push((qualified_attr(&node, &attr), attr.value().to_string()));
        }

        let id = self.push_node(NodeData {
            kind: NodeKind::Element { tag, attributes },
            parent,
            children: Vec::new(),
        });

        for child in node.children() {
            if child.is_element() {
                let child_id = self.import(child, Some(id));
                self.nodes[id.0].children.push(child_id);
            } else if child.is_text() {
                let text = child.text().unwrap_or_default();
                if !text.trim().is_empty() {
                    let child_id = self.push_node(NodeData {
                        kind: NodeKind::Text(text.to_string()),
                        parent: Some(id),
                        children: Vec::new(),
                    });
                    self.nodes[id.0].children.push(child_id);
                }
            } else if child.is_comment() {
                let child_id = self.push_node(NodeData {
                    kind: NodeKind::Comment(child.text().unwrap_or_default().to_string()),
                    parent: Some(id),
                    children: Vec::new(),
                });
                self.nodes[id.0].children.push(child_id);
            }
        }

        id
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Qualified tag name; empty for non-elements.
    pub fn tag(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => tag,
            _ => "",
        }
    }

    /// Tag name with any namespace prefix stripped.
    pub fn local_tag(&self, id: NodeId) -> &str {
        let tag = self.tag(id);
        tag.rsplit(':').next().unwrap_or(tag)
    }

    pub fn set_tag(&mut self, id: NodeId, new_tag: &str) {
        if let NodeKind::Element { tag, .. } = &mut self.nodes[id.0].kind {
            *tag = new_tag.to_string();
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replace or append; replacement keeps the attribute's position.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            let value = value.into();
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            if let Some(pos) = attributes.iter().position(|(n, _)| n == name) {
                return Some(attributes.remove(pos).1);
            }
        }
        None
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0].children.clone()
    }

    /// All element descendants of `id` (excluded), in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// First element in document order carrying `id="target"`.
    pub fn element_by_id(&self, target: &str) -> Option<NodeId> {
        if self.attribute(self.root, "id") == Some(target) {
            return Some(self.root);
        }
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.is_element(n) && self.attribute(n, "id") == Some(target))
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData {
            kind: NodeKind::Element {
                tag: tag.to_string(),
                attributes: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `node` as the next sibling of `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        let parent = match self.nodes[sibling.0].parent {
            Some(p) => p,
            None => return,
        };
        self.detach(node);
        self.nodes[node.0].parent = Some(parent);
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == sibling)
            .map(|p| p + 1)
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.insert(pos, node);
    }

    /// Swap `replacement` into `old`'s position; `old` is detached.
    pub fn replace_node(&mut self, old: NodeId, replacement: NodeId) {
        let parent = match self.nodes[old.0].parent {
            Some(p) => p,
            None => return,
        };
        self.detach(replacement);
        if let Some(pos) = self.nodes[parent.0].children.iter().position(|&c| c == old) {
            self.nodes[parent.0].children[pos] = replacement;
            self.nodes[replacement.0].parent = Some(parent);
            self.nodes[old.0].parent = None;
        }
    }

    /// Detach a node from its parent. The node stays in the arena but is
    /// no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Deep copy of a subtree; the copy is unattached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        let children = self.nodes[id.0].children.clone();
        let copy = self.push_node(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Serialize the tree back to SVG text.
    pub fn to_svg_string(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                let children = &self.nodes[id.0].children;
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for child in children {
                        self.write_node(*child, out);
                    }
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

fn qualified_tag(node: &roxmltree::Node<'_, '_>) -> String {
    let name = node.tag_name().name();
    match node.tag_name().namespace() {
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, name),
            _ => name.to_string(),
        },
        None => name.to_string(),
    }
}

fn qualified_attr(node: &roxmltree::Node<'_, '_>, attr: &roxmltree::Attribute<'_, '_>) -> String {
    match attr.namespace() {
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
            _ => attr.name().to_string(),
        },
        None => attr.name().to_string(),
    }
}

fn collect_namespaces(node: roxmltree::Node<'_, '_>) -> Vec<(Option<String>, String)> {
    node.namespaces()
        // The xml prefix is implicitly bound and never re-declared.
        .filter(|ns| ns.uri() != "http://www.w3.org/XML/1998/namespace")
        .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
        .collect()
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip() {
        let src = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10"><g id="a"><rect x="1" y="2"/></g></svg>"#;
        let doc = Document::parse(src).unwrap();
        assert_eq!(doc.to_svg_string(), src);
    }

    #[test]
    fn vendor_namespaces_preserved() {
        let src = r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape"><g inkscape:label="Layer"/></svg>"#;
        let doc = Document::parse(src).unwrap();
        let out = doc.to_svg_string();
        assert!(out.contains("xmlns:inkscape="));
        assert!(out.contains("inkscape:label=\"Layer\""));
    }

    #[test]
    fn attribute_mutation_keeps_order() {
        let src = r#"<svg><rect x="1" y="2" width="3"/></svg>"#;
        let mut doc = Document::parse(src).unwrap();
        let rect = doc.descendants(doc.root())[0];
        doc.set_attribute(rect, "y", "20");
        doc.set_attribute(rect, "height", "4");
        assert_eq!(
            doc.to_svg_string(),
            r#"<svg><rect x="1" y="20" width="3" height="4"/></svg>"#
        );
        doc.remove_attribute(rect, "x");
        assert_eq!(
            doc.to_svg_string(),
            r#"<svg><rect y="20" width="3" height="4"/></svg>"#
        );
    }

    #[test]
    fn lookup_by_id() {
        let src = r##"<svg><defs><circle id="dot" r="1"/></defs><use href="#dot"/></svg>"##;
        let doc = Document::parse(src).unwrap();
        let dot = doc.element_by_id("dot").unwrap();
        assert_eq!(doc.local_tag(dot), "circle");
        assert!(doc.element_by_id("missing").is_none());
    }

    #[test]
    fn subtree_clone_is_deep() {
        let src = r#"<svg><g id="a"><rect width="1"/></g></svg>"#;
        let mut doc = Document::parse(src).unwrap();
        let g = doc.element_by_id("a").unwrap();
        let copy = doc.clone_subtree(g);
        doc.set_attribute(copy, "id", "b");
        let root = doc.root();
        doc.append_child(root, copy);
        let out = doc.to_svg_string();
        assert!(out.contains(r#"<g id="a"><rect width="1"/></g>"#));
        assert!(out.contains(r#"<g id="b"><rect width="1"/></g>"#));
    }

    #[test]
    fn replace_and_insert() {
        let src = r#"<svg><g id="a"/><g id="c"/></svg>"#;
        let mut doc = Document::parse(src).unwrap();
        let a = doc.element_by_id("a").unwrap();
        let b = doc.create_element("g");
        doc.set_attribute(b, "id", "b");
        doc.insert_after(a, b);
        assert_eq!(
            doc.to_svg_string(),
            r#"<svg><g id="a"/><g id="b"/><g id="c"/></svg>"#
        );
        let d = doc.create_element("path");
        doc.replace_node(a, d);
        assert_eq!(
            doc.to_svg_string(),
            r#"<svg><path/><g id="b"/><g id="c"/></svg>"#
        );
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_attribute(r#"a<b&"c""#), "a&lt;b&amp;&quot;c&quot;");
        assert_eq!(escape_text("1 < 2 & 3"), "1 &lt; 2 &amp; 3");
    }

    #[test]
    fn text_content_preserved() {
        let src = r#"<svg><title>hello &amp; goodbye</title></svg>"#;
        let doc = Document::parse(src).unwrap();
        assert_eq!(
            doc.to_svg_string(),
            r#"<svg><title>hello &amp; goodbye</title></svg>"#
        );
    }
}
