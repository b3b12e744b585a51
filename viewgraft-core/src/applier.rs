//! Application of extension view edit specs onto a base arch.
//!
//! A spec document is a sequence of spec elements (optionally wrapped in a
//! `data` element). Each spec locates one target node in the base arch and
//! edits it according to its `position` attribute: `replace`, `before`,
//! `after`, `inside` (the default) or `attributes`. The base arch is mutated
//! in place, in document order of the specs.

use std::collections::VecDeque;
use std::fmt::Write as _;

use tracing::debug;

use crate::arch::{Arch, NodeId, NodeKind};
use crate::error::{Result, ViewError};
use crate::locator::locate_node;
use crate::store::ViewId;

/// Processing-instruction target marking the slot of an element deleted by
/// an empty `replace`. Consumed by branding distribution.
pub const REMOVAL_PI: &str = "view-removal";

/// Branding attribute carrying the id of the view a node originates from.
pub const BRAND_ID: &str = "data-src-id";
/// Branding attribute carrying the structural path of a node in its source.
pub const BRAND_XPATH: &str = "data-src-xpath";
/// Branding attribute for interpolation nodes (`t-field`), which carry only
/// their path.
pub const BRAND_FIELD_XPATH: &str = "data-src-field-xpath";
/// Transient marker left on the first element inserted by a `replace`,
/// recording the tag of the node it replaced. Branding distribution consumes
/// it to keep sibling indices stable.
pub const BRAND_REPLACING: &str = "meta-src-replacing";

/// Apply every spec of `spec_doc` to `arch`. When `branding_source` is set,
/// inserted elements are stamped with that view id and their path inside the
/// spec document, and deletions leave a removal placeholder.
pub fn apply_inheritance_specs(
    arch: &mut Arch,
    spec_doc: &Arch,
    branding_source: Option<ViewId>,
) -> Result<()> {
    let mut doc = spec_doc.clone();
    if let Some(source) = branding_source {
        let root = doc.root();
        stamp_spec_branding(&mut doc, root, source);
    }

    let mut queue: VecDeque<NodeId> = VecDeque::new();
    queue.push_back(doc.root());

    while let Some(spec) = queue.pop_front() {
        if !doc.is_element(spec) {
            continue;
        }
        if doc.tag(spec) == Some("data") {
            queue.extend(doc.element_children(spec));
            continue;
        }
        debug!(spec = %describe_spec(&doc, spec), "applying edit spec");
        let node = locate_node(arch, &doc, spec)?.ok_or_else(|| ViewError::TargetNotFound {
            spec: describe_spec(&doc, spec),
        })?;
        let position = doc.attr(spec, "position").unwrap_or("inside").to_string();
        match position.as_str() {
            "replace" => apply_replace(arch, &doc, spec, node, branding_source.is_some())?,
            "attributes" => apply_attributes(arch, &doc, spec, node)?,
            "inside" => {
                let content = content_nodes(arch, &doc, spec)?;
                for c in content {
                    arch.append_child(node, c);
                }
            }
            "after" => {
                let parent = parent_of(arch, node)?;
                let mut idx = arch.index_in_parent(node).unwrap_or(0) + 1;
                for c in content_nodes(arch, &doc, spec)? {
                    arch.insert_child(parent, idx, c);
                    idx += 1;
                }
            }
            "before" => {
                let parent = parent_of(arch, node)?;
                let mut idx = arch.index_in_parent(node).unwrap_or(0);
                for c in content_nodes(arch, &doc, spec)? {
                    arch.insert_child(parent, idx, c);
                    idx += 1;
                }
            }
            other => {
                return Err(ViewError::InvalidPosition {
                    position: other.to_string(),
                })
            }
        }
    }
    Ok(())
}

fn parent_of(arch: &Arch, node: NodeId) -> Result<NodeId> {
    arch.parent(node).ok_or_else(|| ViewError::InvalidSpec {
        reason: "cannot insert siblings of the arch root".into(),
    })
}

/// Opening tag of a spec, without its `position` attribute, for error
/// messages.
fn describe_spec(doc: &Arch, spec: NodeId) -> String {
    let mut s = format!("<{}", doc.tag(spec).unwrap_or("?"));
    for (k, v) in doc.attrs(spec) {
        if k != "position" {
            let _ = write!(s, " {}=\"{}\"", k, v);
        }
    }
    s.push('>');
    s
}

// ============================================================================
// Content materialization
// ============================================================================

/// Copy the content of a spec into the target arena, detached and in order.
/// Direct children marked `position="move"` relocate their own target
/// instead of being copied.
fn content_nodes(arch: &mut Arch, doc: &Arch, spec: NodeId) -> Result<Vec<NodeId>> {
    let children: Vec<NodeId> = doc.children(spec).to_vec();
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        if doc.is_element(child) && doc.attr(child, "position") == Some("move") {
            out.push(extract_move(arch, doc, child)?);
        } else {
            out.push(arch.copy_subtree_from(doc, child));
        }
    }
    Ok(out)
}

/// Detach and return the node addressed by a `position="move"` spec child.
fn extract_move(arch: &mut Arch, doc: &Arch, spec: NodeId) -> Result<NodeId> {
    let has_content = doc.children(spec).iter().any(|&c| match doc.kind(c) {
        NodeKind::Text(t) => !t.trim().is_empty(),
        _ => true,
    });
    if has_content {
        return Err(ViewError::InvalidMove {
            reason: format!("moved element must have no content: {}", describe_spec(doc, spec)),
        });
    }
    let target = locate_node(arch, doc, spec)?.ok_or_else(|| ViewError::TargetNotFound {
        spec: describe_spec(doc, spec),
    })?;
    arch.detach(target);
    Ok(target)
}

// ============================================================================
// replace
// ============================================================================

fn apply_replace(
    arch: &mut Arch,
    doc: &Arch,
    spec: NodeId,
    node: NodeId,
    branding: bool,
) -> Result<()> {
    let mode = doc.attr(spec, "mode").unwrap_or("outer").to_string();
    match mode.as_str() {
        "outer" => {
            // detached copy of the target, for `$0` wrapping
            let saved = arch.copy_subtree(node);
            let content = content_nodes(arch, doc, spec)?;
            for &c in &content {
                substitute_wrap_placeholder(arch, c, saved);
            }
            if arch.parent(node).is_none() {
                replace_root(arch, node, content)
            } else {
                let parent = parent_of(arch, node)?;
                let mut idx = arch.index_in_parent(node).unwrap_or(0);
                let has_content = content.iter().any(|&c| match arch.kind(c) {
                    NodeKind::Text(t) => !t.trim().is_empty(),
                    _ => true,
                });
                if branding {
                    let tag = arch.tag(node).unwrap_or("").to_string();
                    let injected = arch.attr(node, BRAND_ID).is_some()
                        || arch.attr(node, BRAND_XPATH).is_some()
                        || arch.attr(node, BRAND_FIELD_XPATH).is_some();
                    if has_content {
                        if let Some(&first) = content.iter().find(|&&c| arch.is_element(c)) {
                            arch.set_attr(first, BRAND_REPLACING, &tag);
                        }
                    } else if !injected {
                        // removing a node inserted by inheritance never
                        // consumed a base-frame slot, so no placeholder
                        let pi = arch.new_processing_instruction(REMOVAL_PI, &tag);
                        arch.insert_child(parent, idx, pi);
                        idx += 1;
                    }
                }
                for c in content {
                    arch.insert_child(parent, idx, c);
                    idx += 1;
                }
                arch.detach(node);
                Ok(())
            }
        }
        "inner" => {
            for child in arch.children(node).to_vec() {
                arch.detach(child);
            }
            let children: Vec<NodeId> = doc.children(spec).to_vec();
            for child in children {
                let c = arch.copy_subtree_from(doc, child);
                arch.append_child(node, c);
            }
            Ok(())
        }
        other => Err(ViewError::InvalidSpec {
            reason: format!("invalid replace mode {other:?}"),
        }),
    }
}

/// Replace `$0` text markers in the subtree rooted at `root` with copies of
/// the replaced target.
fn substitute_wrap_placeholder(arch: &mut Arch, root: NodeId, saved: NodeId) {
    for element in arch.descendants_or_self(root) {
        let marker = arch
            .children(element)
            .iter()
            .copied()
            .find(|&c| arch.text(c) == Some("$0"));
        if let Some(marker) = marker {
            arch.detach(marker);
            let copy = arch.copy_subtree(saved);
            arch.append_child(element, copy);
        }
    }
}

/// Swap the document root for the single element of the replacement content.
fn replace_root(arch: &mut Arch, node: NodeId, content: Vec<NodeId>) -> Result<()> {
    let elements: Vec<NodeId> = content.into_iter().filter(|&c| arch.is_element(c)).collect();
    let [new_root] = elements[..] else {
        return Err(ViewError::InvalidSpec {
            reason: "root replacement requires exactly one element".into(),
        });
    };
    // a template keeps its name through root replacement
    if let Some(t_name) = arch.attr(node, "t-name").map(str::to_string) {
        arch.set_attr(new_root, "t-name", &t_name);
    }
    arch.set_root(new_root);
    Ok(())
}

// ============================================================================
// attributes
// ============================================================================

fn apply_attributes(arch: &mut Arch, doc: &Arch, spec: NodeId, node: NodeId) -> Result<()> {
    let directives: Vec<NodeId> = doc
        .descendants_or_self(spec)
        .into_iter()
        .filter(|&n| n != spec && doc.tag(n) == Some("attribute"))
        .collect();
    for directive in directives {
        let name = doc
            .attr(directive, "name")
            .ok_or_else(|| ViewError::InvalidSpec {
                reason: "attribute directive without a name".into(),
            })?
            .to_string();
        let text: String = doc
            .children(directive)
            .iter()
            .filter_map(|&c| doc.text(c))
            .collect();
        let add = doc.attr(directive, "add");
        let remove = doc.attr(directive, "remove");
        let value = if add.is_some() || remove.is_some() {
            if !text.trim().is_empty() {
                return Err(ViewError::InvalidSpec {
                    reason: format!(
                        "attribute directive for {name:?} combines a value with add/remove"
                    ),
                });
            }
            splice_tokens(
                arch.attr(node, &name).unwrap_or(""),
                add.unwrap_or(""),
                remove.unwrap_or(""),
                doc.attr(directive, "separator"),
            )
        } else {
            text
        };
        if value.is_empty() {
            arch.remove_attr(node, &name);
        } else {
            arch.set_attr(node, &name, &value);
        }
    }
    Ok(())
}

/// Token-list surgery on an attribute value. The separator defaults to `,`;
/// a single space means splitting on any whitespace. Tokens already present
/// are not added twice.
fn splice_tokens(existing: &str, add: &str, remove: &str, separator: Option<&str>) -> String {
    let separator = separator.unwrap_or(",");
    let whitespace = separator == " ";
    let split = |s: &str| -> Vec<String> {
        if whitespace {
            s.split_whitespace().map(str::to_string).collect()
        } else {
            s.split(separator)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        }
    };
    let to_remove = split(remove);
    let mut tokens: Vec<String> = split(existing)
        .into_iter()
        .filter(|t| !to_remove.contains(t))
        .collect();
    for token in split(add) {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    let joiner = if whitespace { " " } else { separator };
    tokens.join(joiner)
}

// ============================================================================
// Spec-document branding
// ============================================================================

/// Stamp the content elements of a spec document with their source view id
/// and their path in the document frame. Spec-shaped elements (`data`,
/// `xpath`, anything carrying `position`) are traversed, not stamped.
fn stamp_spec_branding(doc: &mut Arch, node: NodeId, source: ViewId) {
    for child in doc.element_children(node) {
        let is_spec = matches!(doc.tag(child), Some("data" | "xpath"))
            || doc.attr(child, "position").is_some();
        if is_spec {
            stamp_spec_branding(doc, child, source);
        } else if doc.attr(child, "t-field").is_some() {
            let path = doc.element_path(child);
            doc.set_attr(child, BRAND_FIELD_XPATH, &path);
        } else {
            let path = doc.element_path(child);
            doc.set_attr(child, BRAND_ID, &source.to_string());
            doc.set_attr(child, BRAND_XPATH, &path);
        }
    }
}
