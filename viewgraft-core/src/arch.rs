//! Arch tree: the raw markup tree defining a view's structure.
//!
//! Views are stored as markup strings and materialized into an owned arena of
//! nodes referenced by index. Combination always operates on a freshly parsed
//! arena, so no alias of a pre-combination tree is ever observed after the
//! inheritance applier has mutated it. Text is an explicit sibling node
//! (rather than a property of the preceding element), which keeps text intact
//! when elements around it are inserted, removed or moved.

use std::fmt::Write as _;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, ViewError};

/// Index of a node inside one [`Arch`] arena. Ids are never reused and stay
/// valid for the lifetime of the arena, including for detached nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        tag: String,
        /// Attribute order is preserved for round-trip stability.
        attrs: Vec<(String, String)>,
        children: Vec<NodeId>,
    },
    Text(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Arch {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Arch {
    /// Parse a markup string into an arena tree. The input must contain
    /// exactly one root element.
    pub fn parse(src: &str) -> Result<Arch> {
        let mut reader = Reader::from_str(src);
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        let mut push_node = |nodes: &mut Vec<Node>, stack: &[NodeId], kind: NodeKind| {
            let id = NodeId(nodes.len());
            let parent = stack.last().copied();
            nodes.push(Node { kind, parent });
            if let Some(pid) = parent {
                if let NodeKind::Element { children, .. } = &mut nodes[pid.0].kind {
                    children.push(id);
                }
            }
            id
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let kind = element_kind(&e)?;
                    let id = push_node(&mut nodes, &stack, kind);
                    if stack.is_empty() {
                        if root.is_some() {
                            return Err(ViewError::Parse(
                                "multiple root elements in arch".into(),
                            ));
                        }
                        root = Some(id);
                    }
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    let kind = element_kind(&e)?;
                    let id = push_node(&mut nodes, &stack, kind);
                    if stack.is_empty() {
                        if root.is_some() {
                            return Err(ViewError::Parse(
                                "multiple root elements in arch".into(),
                            ));
                        }
                        root = Some(id);
                    }
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| ViewError::Parse(e.to_string()))?
                        .into_owned();
                    if !stack.is_empty() {
                        push_node(&mut nodes, &stack, NodeKind::Text(text));
                    } else if !text.trim().is_empty() {
                        return Err(ViewError::Parse("text outside of root element".into()));
                    }
                }
                Ok(Event::CData(t)) => {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    if !stack.is_empty() {
                        push_node(&mut nodes, &stack, NodeKind::Text(text));
                    }
                }
                Ok(Event::Comment(t)) => {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    if !stack.is_empty() {
                        push_node(&mut nodes, &stack, NodeKind::Comment(text));
                    }
                }
                Ok(Event::PI(pi)) => {
                    let raw = String::from_utf8_lossy(pi.as_ref()).into_owned();
                    let (target, data) = match raw.split_once(char::is_whitespace) {
                        Some((t, d)) => (t.to_string(), d.trim().to_string()),
                        None => (raw, String::new()),
                    };
                    if !stack.is_empty() {
                        push_node(
                            &mut nodes,
                            &stack,
                            NodeKind::ProcessingInstruction { target, data },
                        );
                    }
                }
                Ok(Event::Decl(_)) | Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(ViewError::Parse(e.to_string())),
            }
        }

        let root = root.ok_or_else(|| ViewError::Parse("empty arch".into()))?;
        Ok(Arch { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(slot) = attrs.iter_mut().find(|(k, _)| k == name) {
                slot.1 = value.to_string();
            } else {
                attrs.push((name.to_string(), value.to_string()));
            }
        }
    }

    /// Removing an absent attribute is a no-op.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(pos) = attrs.iter().position(|(k, _)| k == name) {
                return Some(attrs.remove(pos).1);
            }
        }
        None
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    /// Descendant elements of `id` in document order, including `id` itself
    /// when it is an element.
    pub fn descendants_or_self(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut work = vec![id];
        while let Some(n) = work.pop() {
            if self.is_element(n) {
                out.push(n);
            }
            for &c in self.children(n).iter().rev() {
                work.push(c);
            }
        }
        out
    }

    pub fn new_element(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element {
                tag: tag.to_string(),
                attrs,
                children: Vec::new(),
            },
            parent: None,
        });
        id
    }

    pub fn new_text(&mut self, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
        });
        id
    }

    pub fn new_processing_instruction(&mut self, target: &str, data: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::ProcessingInstruction {
                target: target.to_string(),
                data: data.to_string(),
            },
            parent: None,
        });
        id
    }

    /// Position of `id` within its parent's child list.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Unlink `id` from its parent. The node (and its subtree) stays in the
    /// arena and can be reinserted elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            if let NodeKind::Element { children, .. } = &mut self.nodes[parent.0].kind {
                children.retain(|&c| c != id);
            }
        }
        self.nodes[id.0].parent = None;
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(self.nodes[child.0].parent.is_none());
        if let NodeKind::Element { children, .. } = &mut self.nodes[parent.0].kind {
            let index = index.min(children.len());
            children.insert(index, child);
            self.nodes[child.0].parent = Some(parent);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child);
    }

    /// Replace the document root with a detached element node.
    pub fn set_root(&mut self, new_root: NodeId) {
        debug_assert!(self.nodes[new_root.0].parent.is_none());
        self.root = new_root;
    }

    /// Deep-copy a subtree from another arena (or this one) into this arena.
    /// The copy is returned detached.
    pub fn copy_subtree_from(&mut self, source: &Arch, id: NodeId) -> NodeId {
        match source.kind(id).clone() {
            NodeKind::Element { tag, attrs, children } => {
                let copy = self.new_element(&tag, attrs);
                for child in children {
                    let c = self.copy_subtree_from(source, child);
                    self.append_child(copy, c);
                }
                copy
            }
            NodeKind::Text(t) => self.new_text(&t),
            NodeKind::ProcessingInstruction { target, data } => {
                self.new_processing_instruction(&target, &data)
            }
            NodeKind::Comment(c) => {
                let id = NodeId(self.nodes.len());
                self.nodes.push(Node {
                    kind: NodeKind::Comment(c),
                    parent: None,
                });
                id
            }
        }
    }

    /// Deep-copy a subtree within this arena, returned detached.
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let snapshot = self.clone();
        self.copy_subtree_from(&snapshot, id)
    }

    /// Serialize the whole tree back to a markup string.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_node(&mut out, self.root);
        out
    }

    /// Serialize a single subtree.
    pub fn node_to_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(&mut out, id);
        out
    }

    fn write_node(&self, out: &mut String, id: NodeId) {
        match self.kind(id) {
            NodeKind::Element { tag, attrs, children } => {
                let _ = write!(out, "<{}", tag);
                for (k, v) in attrs {
                    let _ = write!(out, " {}=\"{}\"", k, escape_attr(v));
                }
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &c in children {
                        self.write_node(out, c);
                    }
                    let _ = write!(out, "</{}>", tag);
                }
            }
            NodeKind::Text(t) => out.push_str(&escape_text(t)),
            NodeKind::ProcessingInstruction { target, data } => {
                if data.is_empty() {
                    let _ = write!(out, "<?{}?>", target);
                } else {
                    let _ = write!(out, "<?{} {}?>", target, data);
                }
            }
            NodeKind::Comment(c) => {
                let _ = write!(out, "<!--{}-->", c);
            }
        }
    }

    /// Structural path of an element within this tree, in the style
    /// `/root/child[2]`: a positional index is only attached when the element
    /// has same-tag siblings.
    pub fn element_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let tag = match self.tag(n) {
                Some(t) => t.to_string(),
                None => break,
            };
            match self.parent(n) {
                Some(parent) => {
                    let same: Vec<NodeId> = self
                        .children(parent)
                        .iter()
                        .copied()
                        .filter(|&c| self.tag(c) == Some(tag.as_str()))
                        .collect();
                    if same.len() > 1 {
                        let pos = same.iter().position(|&c| c == n).unwrap_or(0) + 1;
                        segments.push(format!("{}[{}]", tag, pos));
                    } else {
                        segments.push(tag);
                    }
                    cur = Some(parent);
                }
                None => {
                    segments.push(tag);
                    cur = None;
                }
            }
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}

fn element_kind(e: &quick_xml::events::BytesStart<'_>) -> Result<NodeKind> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ViewError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ViewError::Parse(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(NodeKind::Element {
        tag,
        attrs,
        children: Vec::new(),
    })
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Structural equality between two trees, ignoring whitespace-only text nodes
/// and attribute order. This is the normalization referenced by the engine's
/// round-trip guarantee.
pub fn tree_equal(a: &Arch, b: &Arch) -> bool {
    node_equal(a, a.root(), b, b.root())
}

fn significant_children(arch: &Arch, id: NodeId) -> Vec<NodeId> {
    arch.children(id)
        .iter()
        .copied()
        .filter(|&c| match arch.kind(c) {
            NodeKind::Text(t) => !t.trim().is_empty(),
            _ => true,
        })
        .collect()
}

fn node_equal(a: &Arch, an: NodeId, b: &Arch, bn: NodeId) -> bool {
    match (a.kind(an), b.kind(bn)) {
        (
            NodeKind::Element { tag: ta, attrs: aa, .. },
            NodeKind::Element { tag: tb, attrs: ab, .. },
        ) => {
            if ta != tb || aa.len() != ab.len() {
                return false;
            }
            let mut sa: Vec<_> = aa.clone();
            let mut sb: Vec<_> = ab.clone();
            sa.sort();
            sb.sort();
            if sa != sb {
                return false;
            }
            let ca = significant_children(a, an);
            let cb = significant_children(b, bn);
            ca.len() == cb.len()
                && ca
                    .iter()
                    .zip(cb.iter())
                    .all(|(&x, &y)| node_equal(a, x, b, y))
        }
        (NodeKind::Text(x), NodeKind::Text(y)) => x.trim() == y.trim(),
        (
            NodeKind::ProcessingInstruction { target: ta, data: da },
            NodeKind::ProcessingInstruction { target: tb, data: db },
        ) => ta == tb && da == db,
        (NodeKind::Comment(x), NodeKind::Comment(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_and_serialize_round_trip() {
        let src = r#"<form string="F">(<div a="1"/>)</form>"#;
        let arch = Arch::parse(src).unwrap();
        assert_eq!(arch.to_xml(), src);
        let reparsed = Arch::parse(&arch.to_xml()).unwrap();
        assert!(tree_equal(&arch, &reparsed));
    }

    #[test]
    fn parse_preserves_attribute_order() {
        let arch = Arch::parse(r#"<a z="1" a="2" m="3"/>"#).unwrap();
        let keys: Vec<&str> = arch
            .attrs(arch.root())
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(matches!(Arch::parse("   "), Err(ViewError::Parse(_))));
    }

    #[test]
    fn detach_keeps_sibling_text() {
        let mut arch = Arch::parse("<t><div>aaaa<p/>bbbb</div></t>").unwrap();
        let div = arch.element_children(arch.root())[0];
        let p = arch.element_children(div)[0];
        arch.detach(p);
        assert_eq!(arch.to_xml(), "<t><div>aaaabbbb</div></t>");
    }

    #[test]
    fn copy_subtree_is_deep() {
        let mut arch = Arch::parse("<root><a><b x=\"1\"/></a></root>").unwrap();
        let a = arch.element_children(arch.root())[0];
        let copy = arch.copy_subtree(a);
        arch.append_child(arch.root(), copy);
        assert_eq!(arch.to_xml(), "<root><a><b x=\"1\"/></a><a><b x=\"1\"/></a></root>");
    }

    #[test]
    fn element_path_indexes_only_ambiguous_tags() {
        let arch = Arch::parse("<xpath><war/><world/><world/></xpath>").unwrap();
        let kids = arch.element_children(arch.root());
        assert_eq!(arch.element_path(kids[0]), "/xpath/war");
        assert_eq!(arch.element_path(kids[1]), "/xpath/world[1]");
        assert_eq!(arch.element_path(kids[2]), "/xpath/world[2]");
    }

    #[test]
    fn processing_instruction_round_trip() {
        let src = "<body><?view-removal world?></body>";
        let arch = Arch::parse(src).unwrap();
        assert_eq!(arch.to_xml(), src);
    }

    #[test]
    fn tree_equal_ignores_blank_text_and_attr_order() {
        let a = Arch::parse("<form a=\"1\" b=\"2\">\n  <div/>\n</form>").unwrap();
        let b = Arch::parse("<form b=\"2\" a=\"1\"><div/></form>").unwrap();
        assert!(tree_equal(&a, &b));
    }
}
