//! Target resolution for edit specs.
//!
//! Given a spec element from an extension view, find the node of the base
//! arch it applies to. Three addressing forms exist: an explicit `xpath`
//! element carrying an `expr` attribute, a `field` element matched by `name`
//! only (a field name is unique at its level of a view), and any other tag
//! matched structurally by tag plus all of its attributes.

use crate::arch::{Arch, NodeId};
use crate::error::{Result, ViewError};
use crate::path::PathQuery;

/// Spec attributes that steer the applier rather than describe the target.
const CONTROL_ATTRS: &[&str] = &["position", "version", "mode"];

/// Locate the node of `arch` addressed by `spec` (a node of `spec_arch`).
/// Returns `Ok(None)` when nothing matches; the caller decides whether that
/// is an error.
pub fn locate_node(arch: &Arch, spec_arch: &Arch, spec: NodeId) -> Result<Option<NodeId>> {
    let tag = spec_arch.tag(spec).ok_or_else(|| ViewError::InvalidSpec {
        reason: "edit spec is not an element".into(),
    })?;
    match tag {
        "xpath" => {
            let expr = spec_arch
                .attr(spec, "expr")
                .ok_or_else(|| ViewError::InvalidSpec {
                    reason: "xpath spec without expr attribute".into(),
                })?;
            let query = PathQuery::parse(expr)?;
            Ok(query.find_first(arch, arch.root()))
        }
        "field" => {
            let name = spec_arch.attr(spec, "name");
            Ok(arch
                .descendants_or_self(arch.root())
                .into_iter()
                .find(|&n| arch.tag(n) == Some("field") && arch.attr(n, "name") == name))
        }
        _ => {
            for node in arch.descendants_or_self(arch.root()) {
                if arch.tag(node) != Some(tag) {
                    continue;
                }
                let all_match = spec_arch
                    .attrs(spec)
                    .iter()
                    .filter(|(k, _)| !CONTROL_ATTRS.contains(&k.as_str()))
                    .all(|(k, v)| arch.attr(node, k) == Some(v.as_str()));
                if all_match {
                    // a version requirement is checked against the arch root
                    if let Some(version) = spec_arch.attr(spec, "version") {
                        if arch.attr(arch.root(), "version") != Some(version) {
                            return Ok(None);
                        }
                    }
                    return Ok(Some(node));
                }
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn locate(arch: &str, spec: &str) -> Option<String> {
        let arch = Arch::parse(arch).unwrap();
        let spec_arch = Arch::parse(spec).unwrap();
        locate_node(&arch, &spec_arch, spec_arch.root())
            .unwrap()
            .map(|n| arch.node_to_xml(n))
    }

    #[test]
    fn xpath_spec() {
        assert_eq!(
            locate(
                "<form><div/><div><p/></div></form>",
                "<xpath expr=\"/form/div[2]/p\" position=\"after\"/>",
            ),
            Some("<p/>".into())
        );
        assert_eq!(
            locate("<form/>", "<xpath expr=\"//p\" position=\"after\"/>"),
            None
        );
    }

    #[test]
    fn xpath_spec_requires_expr() {
        let arch = Arch::parse("<form/>").unwrap();
        let spec = Arch::parse("<xpath position=\"after\"/>").unwrap();
        assert!(locate_node(&arch, &spec, spec.root()).is_err());
    }

    #[test]
    fn field_spec_matches_name_only() {
        assert_eq!(
            locate(
                "<form><field name=\"a\" readonly=\"1\"/><field name=\"b\"/></form>",
                "<field name=\"b\" position=\"replace\"/>",
            ),
            Some("<field name=\"b\"/>".into())
        );
        assert_eq!(
            locate("<form><field name=\"a\"/></form>", "<field name=\"zz\"/>"),
            None
        );
    }

    #[test]
    fn structural_spec_matches_tag_and_attrs() {
        assert_eq!(
            locate(
                "<form><div class=\"a\"/><div class=\"b\" id=\"x\"/></form>",
                "<div class=\"b\" position=\"inside\"/>",
            ),
            Some("<div class=\"b\" id=\"x\"/>".into())
        );
        // extra spec attribute with no counterpart: no match
        assert_eq!(
            locate("<form><div class=\"a\"/></form>", "<div class=\"a\" id=\"y\"/>"),
            None
        );
    }

    #[test]
    fn version_must_match_arch_root() {
        assert_eq!(
            locate(
                "<form version=\"7.0\"><div class=\"a\"/></form>",
                "<div class=\"a\" version=\"7.0\"/>",
            ),
            Some("<div class=\"a\"/>".into())
        );
        assert_eq!(
            locate("<form><div class=\"a\"/></form>", "<div class=\"a\" version=\"7.0\"/>"),
            None
        );
    }
}
