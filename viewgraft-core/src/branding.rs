//! Provenance distribution over a combined tree.
//!
//! Combination stamps coarse branding: the root carries its view id, and
//! every fragment inserted by an extension carries its source view id plus
//! its path inside the spec document. Distribution pushes that branding down
//! to the leaves that can actually be edited: an element keeps its branding
//! only while its subtree holds nothing dynamic; otherwise the branding is
//! popped and re-stamped one level down with position-indexed paths, so a
//! rendered node maps back to exactly one view and one structural path.
//!
//! Removal placeholders left by empty `replace` specs bump the positional
//! index of their tag and are deleted here, which keeps the paths of
//! surviving siblings identical to what they were before the removal.

use std::collections::BTreeMap;

use crate::applier::{BRAND_FIELD_XPATH, BRAND_ID, BRAND_REPLACING, BRAND_XPATH, REMOVAL_PI};
use crate::arch::{Arch, NodeId, NodeKind};

/// Distribute the branding of a combined tree down to leaf positions.
pub fn distribute_branding(arch: &mut Arch) {
    let root = arch.root();
    let default_path = match arch.tag(root) {
        Some(tag) => format!("/{}[1]", tag),
        None => return,
    };
    distribute(arch, root, None, &default_path);
}

fn distribute(arch: &mut Arch, e: NodeId, branding: Option<&str>, default_path: &str) {
    if arch.attr(e, "t-ignore").is_some() || arch.tag(e) == Some("head") {
        strip_subtree_branding(arch, e);
        return;
    }

    let node_path = arch
        .attr(e, BRAND_XPATH)
        .or_else(|| arch.attr(e, BRAND_FIELD_XPATH))
        .map(str::to_string)
        .unwrap_or_else(|| default_path.to_string());

    if let Some(source) = branding {
        if arch.attr(e, "t-field").is_some() {
            arch.set_attr(e, BRAND_FIELD_XPATH, &node_path);
        } else if arch.attr(e, BRAND_ID).is_none() {
            arch.set_attr(e, BRAND_ID, source);
            arch.set_attr(e, BRAND_XPATH, &node_path);
        }
    }
    if arch.attr(e, BRAND_ID).is_none() {
        return;
    }

    if arch.attr(e, "t-esc").is_some() || arch.attr(e, "t-raw").is_some() {
        // fully generated content, nothing editable to brand
        pop_branding(arch, e);
    } else if contains_branded(arch, e) {
        let popped = pop_branding(arch, e);
        let source = popped.as_deref();
        let mut indexes: BTreeMap<String, usize> = BTreeMap::new();
        for child in arch.children(e).to_vec() {
            match arch.kind(child) {
                NodeKind::ProcessingInstruction { target, data } if target == REMOVAL_PI => {
                    *indexes.entry(data.clone()).or_insert(0) += 1;
                    arch.detach(child);
                }
                NodeKind::Element { .. } => {
                    let injected = arch.attr(child, BRAND_XPATH).is_some()
                        || arch.attr(child, BRAND_FIELD_XPATH).is_some();
                    if injected {
                        // inherited fragment: its paths live in its own
                        // spec-document frame, never re-indexed here
                        distribute(arch, child, None, "");
                        if let Some(replaced) = arch.remove_attr(child, BRAND_REPLACING) {
                            *indexes.entry(replaced).or_insert(0) += 1;
                        }
                    } else {
                        let tag = arch.tag(child).unwrap_or("").to_string();
                        let slot = indexes.entry(tag.clone()).or_insert(0);
                        *slot += 1;
                        let path = format!("{}/{}[{}]", node_path, tag, slot);
                        distribute(arch, child, source, &path);
                    }
                }
                _ => {}
            }
        }
    }
    // else: no dynamic content below, the branding stays on this element
}

/// Detach branding attributes, returning the source view id if one was set.
fn pop_branding(arch: &mut Arch, e: NodeId) -> Option<String> {
    let id = arch.remove_attr(e, BRAND_ID);
    arch.remove_attr(e, BRAND_XPATH);
    id
}

/// Whether the subtree below `e` holds anything branded or dynamic, which
/// forces `e`'s own branding to be pushed down.
fn contains_branded(arch: &Arch, e: NodeId) -> bool {
    arch.tag(e) == Some("t")
        || arch.attr(e, "t-raw").is_some()
        || arch.attr(e, "t-call").is_some()
        || subtree_has_branded(arch, e)
}

fn subtree_has_branded(arch: &Arch, e: NodeId) -> bool {
    arch.children(e).iter().any(|&child| match arch.kind(child) {
        NodeKind::Element { attrs, .. } => {
            attrs.iter().any(|(k, _)| {
                k.starts_with("t-") || k == BRAND_ID || k == BRAND_XPATH || k == BRAND_FIELD_XPATH
            }) || subtree_has_branded(arch, child)
        }
        NodeKind::ProcessingInstruction { target, .. } => target == REMOVAL_PI,
        _ => false,
    })
}

/// Inside a no-branding scope: drop injected branding and removal
/// placeholders from the whole subtree.
fn strip_subtree_branding(arch: &mut Arch, e: NodeId) {
    for node in arch.descendants_or_self(e) {
        if node != e && arch.attr(node, BRAND_ID).is_some() {
            pop_branding(arch, node);
        }
    }
    let mut work = vec![e];
    while let Some(n) = work.pop() {
        for child in arch.children(n).to_vec() {
            if let NodeKind::ProcessingInstruction { target, .. } = arch.kind(child) {
                if target == REMOVAL_PI {
                    arch.detach(child);
                    continue;
                }
            }
            work.push(child);
        }
    }
}
