//! Structural path queries over an [`Arch`] tree.
//!
//! Supports the subset of path syntax view edit specs actually use:
//! absolute (`/form/div`) and descendant (`//field[@name='x']`) steps,
//! wildcard tags, positional predicates (`[2]`, `[last()]`), attribute
//! equality (`[@name='total']`) and `hasclass('...')` for matching one token
//! inside a space-separated `class` attribute.

use crate::arch::{Arch, NodeId};
use crate::error::{Result, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pred {
    Index(usize),
    Last,
    AttrEq(String, String),
    HasClass(Vec<String>),
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    /// `None` matches any element tag (`*`).
    tag: Option<String>,
    preds: Vec<Pred>,
}

#[derive(Debug, Clone)]
pub struct PathQuery {
    steps: Vec<Step>,
    /// Leading `/` or `//`: the first step is evaluated from the virtual
    /// document node above the root element, so `/form` addresses the root
    /// itself and `//t` can match it.
    absolute: bool,
}

impl PathQuery {
    pub fn parse(expr: &str) -> Result<PathQuery> {
        Parser::new(expr).parse()
    }

    /// All matches in document order, deduplicated, starting from `context`
    /// (the tree root for absolute queries).
    pub fn find_all(&self, arch: &Arch, context: NodeId) -> Vec<NodeId> {
        let mut current = vec![context];
        for (i, step) in self.steps.iter().enumerate() {
            let from_document = i == 0 && self.absolute;
            let mut next: Vec<NodeId> = Vec::new();
            for &ctx in &current {
                let candidates: Vec<NodeId> = match (step.axis, from_document) {
                    // the document's only element child is the context itself
                    (Axis::Child, true) => vec![ctx],
                    (Axis::Descendant, true) => arch.descendants_or_self(ctx),
                    (Axis::Child, false) => arch.element_children(ctx),
                    (Axis::Descendant, false) => arch
                        .descendants_or_self(ctx)
                        .into_iter()
                        .filter(|&n| n != ctx)
                        .collect(),
                };
                let mut matched: Vec<NodeId> = candidates
                    .into_iter()
                    .filter(|&n| step.matches_node(arch, n))
                    .collect();
                step.apply_positional(&mut matched);
                for n in matched {
                    if !next.contains(&n) {
                        next.push(n);
                    }
                }
            }
            current = next;
        }
        current
    }

    pub fn find_first(&self, arch: &Arch, context: NodeId) -> Option<NodeId> {
        self.find_all(arch, context).into_iter().next()
    }
}

impl Step {
    fn matches_node(&self, arch: &Arch, id: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if arch.tag(id) != Some(tag.as_str()) {
                return false;
            }
        }
        self.preds.iter().all(|p| match p {
            Pred::AttrEq(name, value) => arch.attr(id, name) == Some(value.as_str()),
            Pred::HasClass(classes) => arch
                .attr(id, "class")
                .map(|c| {
                    let tokens: Vec<&str> = c.split_whitespace().collect();
                    classes.iter().all(|class| tokens.contains(&class.as_str()))
                })
                .unwrap_or(false),
            // positional predicates are applied on the whole match set
            Pred::Index(_) | Pred::Last => true,
        })
    }

    fn apply_positional(&self, matched: &mut Vec<NodeId>) {
        for pred in &self.preds {
            match pred {
                Pred::Index(i) => {
                    *matched = if *i >= 1 && *i <= matched.len() {
                        vec![matched[*i - 1]]
                    } else {
                        Vec::new()
                    };
                }
                Pred::Last => {
                    *matched = matched.last().copied().into_iter().collect();
                }
                _ => {}
            }
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn err(&self, msg: &str) -> ViewError {
        ViewError::InvalidSpec {
            reason: format!("bad path expression {:?}: {}", self.src, msg),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse(mut self) -> Result<PathQuery> {
        let mut steps = Vec::new();
        // a relative first step is a child step from the context node
        let absolute = self.eat(b'/');
        let mut axis = if absolute && self.eat(b'/') {
            Axis::Descendant
        } else {
            Axis::Child
        };
        loop {
            steps.push(self.parse_step(axis)?);
            if self.pos >= self.bytes.len() {
                break;
            }
            if !self.eat(b'/') {
                return Err(self.err("expected '/' between steps"));
            }
            axis = if self.eat(b'/') {
                Axis::Descendant
            } else {
                Axis::Child
            };
        }
        if steps.is_empty() {
            return Err(self.err("empty expression"));
        }
        Ok(PathQuery { steps, absolute })
    }

    fn parse_step(&mut self, axis: Axis) -> Result<Step> {
        let tag = if self.eat(b'*') {
            None
        } else {
            let name = self.parse_name()?;
            Some(name)
        };
        let mut preds = Vec::new();
        while self.eat(b'[') {
            preds.push(self.parse_pred()?);
            if !self.eat(b']') {
                return Err(self.err("unterminated predicate"));
            }
        }
        Ok(Step { axis, tag, preds })
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b == b':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected element name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_pred(&mut self) -> Result<Pred> {
        self.skip_ws();
        match self.peek() {
            Some(b'@') => {
                self.pos += 1;
                let name = self.parse_name()?;
                self.skip_ws();
                if !self.eat(b'=') {
                    return Err(self.err("attribute predicate needs '='"));
                }
                self.skip_ws();
                let value = self.parse_quoted()?;
                self.skip_ws();
                Ok(Pred::AttrEq(name, value))
            }
            Some(b) if b.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let n: usize = self.src[start..self.pos]
                    .parse()
                    .map_err(|_| self.err("bad index"))?;
                self.skip_ws();
                Ok(Pred::Index(n))
            }
            _ => {
                let word = self.parse_name()?;
                self.skip_ws();
                if !self.eat(b'(') {
                    return Err(self.err("expected function call in predicate"));
                }
                self.skip_ws();
                match word.as_str() {
                    "last" => {
                        if !self.eat(b')') {
                            return Err(self.err("last() takes no arguments"));
                        }
                        self.skip_ws();
                        Ok(Pred::Last)
                    }
                    "hasclass" => {
                        // hasclass('a', 'b') requires every listed class
                        let mut classes = vec![self.parse_quoted()?];
                        self.skip_ws();
                        while self.eat(b',') {
                            self.skip_ws();
                            classes.push(self.parse_quoted()?);
                            self.skip_ws();
                        }
                        if !self.eat(b')') {
                            return Err(self.err("unterminated hasclass()"));
                        }
                        self.skip_ws();
                        Ok(Pred::HasClass(classes))
                    }
                    other => Err(self.err(&format!("unsupported predicate function {other:?}"))),
                }
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.err("expected quoted string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let s = self.src[start..self.pos].to_string();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err(self.err("unterminated string"))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn first(arch: &Arch, expr: &str) -> Option<String> {
        PathQuery::parse(expr)
            .unwrap()
            .find_first(arch, arch.root())
            .map(|n| arch.node_to_xml(n))
    }

    #[test]
    fn absolute_child_steps() {
        let arch = Arch::parse("<form><div><p a=\"1\"/></div></form>").unwrap();
        assert_eq!(first(&arch, "/form/div/p"), Some("<p a=\"1\"/>".into()));
        assert_eq!(first(&arch, "/form/p"), None);
    }

    #[test]
    fn absolute_first_step_addresses_the_root() {
        let arch = Arch::parse("<t t-name=\"x\"><p/></t>").unwrap();
        let root_xml = "<t t-name=\"x\"><p/></t>".to_string();
        assert_eq!(first(&arch, "/t"), Some(root_xml.clone()));
        // descendant-or-self from the document: the root itself qualifies
        assert_eq!(first(&arch, "//t"), Some(root_xml));
    }

    #[test]
    fn descendant_with_attribute() {
        let arch =
            Arch::parse("<form><g><field name=\"a\"/></g><field name=\"b\"/></form>").unwrap();
        assert_eq!(
            first(&arch, "//field[@name='b']"),
            Some("<field name=\"b\"/>".into())
        );
        // document order: nested field comes first
        assert_eq!(first(&arch, "//field"), Some("<field name=\"a\"/>".into()));
    }

    #[test]
    fn positional_and_last() {
        let arch = Arch::parse("<r><i n=\"1\"/><i n=\"2\"/><i n=\"3\"/></r>").unwrap();
        assert_eq!(first(&arch, "/r/i[2]"), Some("<i n=\"2\"/>".into()));
        assert_eq!(first(&arch, "/r/i[last()]"), Some("<i n=\"3\"/>".into()));
        assert_eq!(first(&arch, "/r/i[5]"), None);
    }

    #[test]
    fn hasclass_matches_token() {
        let arch =
            Arch::parse("<r><div class=\"oe_title mt8\"/><div class=\"mt8\"/></r>").unwrap();
        assert_eq!(
            first(&arch, "//div[hasclass('oe_title')]"),
            Some("<div class=\"oe_title mt8\"/>".into())
        );
        assert_eq!(first(&arch, "//div[hasclass('oe')]"), None);
        // multiple arguments require every class
        assert_eq!(
            first(&arch, "//div[hasclass('oe_title', 'mt8')]"),
            Some("<div class=\"oe_title mt8\"/>".into())
        );
        assert_eq!(first(&arch, "//div[hasclass('oe_title', 'missing')]"), None);
    }

    #[test]
    fn wildcard_tag() {
        let arch = Arch::parse("<r><a x=\"1\"/><b x=\"1\"/></r>").unwrap();
        let q = PathQuery::parse("//*[@x='1']").unwrap();
        assert_eq!(q.find_all(&arch, arch.root()).len(), 2);
    }

    #[test]
    fn reject_malformed() {
        assert!(PathQuery::parse("//field[@name=]").is_err());
        assert!(PathQuery::parse("//field[foo()]").is_err());
        assert!(PathQuery::parse("").is_err());
    }
}
