//! View combination: resolving a view's full inheritance chain into one
//! merged tree.
//!
//! A request for any view resolves to its primary root (the nearest ancestor
//! whose mode is `Primary`). The root's arch is materialized, then every
//! active, eligible extension descendant with the requested view's model is
//! applied depth-first, ordered `(priority, id)` within each parent. Primary
//! mode is an inheritance wall in both directions: a primary child never
//! leaks into its parent's combination, and a primary view with a parent
//! first combines the parent's whole chain before grafting its own specs on
//! top.

use std::collections::BTreeSet;

use tracing::debug;

use crate::applier::{self, apply_inheritance_specs};
use crate::arch::Arch;
use crate::branding::distribute_branding;
use crate::error::Result;
use crate::store::{ViewId, ViewMode, ViewStore};

/// Per-render resolvability context, always passed explicitly.
#[derive(Debug, Clone, Default)]
pub struct ResolveCtx {
    /// Closed set of view ids eligible for inclusion (draft/test isolation).
    /// `None` means every view qualifies.
    pub eligible: Option<BTreeSet<ViewId>>,
    /// Stamp provenance attributes while combining.
    pub branding: bool,
}

impl ResolveCtx {
    pub fn all() -> ResolveCtx {
        ResolveCtx::default()
    }

    pub fn restricted(ids: impl IntoIterator<Item = ViewId>) -> ResolveCtx {
        ResolveCtx {
            eligible: Some(ids.into_iter().collect()),
            branding: false,
        }
    }

    pub fn with_branding(mut self) -> ResolveCtx {
        self.branding = true;
        self
    }

    fn allows(&self, id: ViewId) -> bool {
        match &self.eligible {
            Some(set) => set.contains(&id),
            None => true,
        }
    }
}

pub struct Combiner<'a> {
    store: &'a dyn ViewStore,
}

impl<'a> Combiner<'a> {
    pub fn new(store: &'a dyn ViewStore) -> Combiner<'a> {
        Combiner { store }
    }

    /// Merge the full inheritance chain of `view_id`. Returns the combined
    /// tree and the id of the primary root actually governing it.
    pub fn combine(&self, view_id: ViewId, ctx: &ResolveCtx) -> Result<(Arch, ViewId)> {
        let view = self.store.load(view_id)?;
        let mut root = view.clone();
        while root.mode == ViewMode::Extension {
            match root.inherit_id {
                Some(parent) => root = self.store.load(parent)?,
                None => break,
            }
        }
        debug!(view = %view_id, root = %root.id, "combining view");

        let mut arch = match root.inherit_id {
            Some(parent) => {
                // a primary view with a parent grafts onto the parent's own
                // combined chain
                let (mut parent_arch, _) = self.combine(parent, ctx)?;
                let spec_doc = Arch::parse(&root.arch)?;
                apply_inheritance_specs(
                    &mut parent_arch,
                    &spec_doc,
                    ctx.branding.then_some(root.id),
                )?;
                parent_arch
            }
            None => {
                let mut arch = Arch::parse(&root.arch)?;
                if ctx.branding {
                    let root_node = arch.root();
                    arch.set_attr(root_node, applier::BRAND_ID, &root.id.to_string());
                }
                arch
            }
        };

        self.apply_descendants(&mut arch, root.id, view.model.as_deref(), ctx)?;
        Ok((arch, root.id))
    }

    /// Combine and, when branding was requested, distribute the provenance
    /// stamps down to leaf positions.
    pub fn combined_arch(&self, view_id: ViewId, ctx: &ResolveCtx) -> Result<(Arch, ViewId)> {
        let (mut arch, root) = self.combine(view_id, ctx)?;
        if ctx.branding {
            distribute_branding(&mut arch);
        }
        Ok((arch, root))
    }

    /// Depth-first application of the eligible extension descendants of
    /// `parent_id` scoped to `model`.
    fn apply_descendants(
        &self,
        arch: &mut Arch,
        parent_id: ViewId,
        model: Option<&str>,
        ctx: &ResolveCtx,
    ) -> Result<()> {
        for child in self.store.children_of(parent_id, true) {
            if child.mode != ViewMode::Extension {
                continue;
            }
            if child.model.as_deref() != model {
                continue;
            }
            if !ctx.allows(child.id) {
                continue;
            }
            debug!(child = %child.id, parent = %parent_id, "applying extension view");
            let spec_doc = Arch::parse(&child.arch)?;
            apply_inheritance_specs(arch, &spec_doc, ctx.branding.then_some(child.id))?;
            self.apply_descendants(arch, child.id, model, ctx)?;
        }
        Ok(())
    }
}
