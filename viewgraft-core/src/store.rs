//! View records and the persistence seam.
//!
//! The engine never talks to a database: it sees views through the
//! [`ViewStore`] trait. [`MemoryStore`] is the reference implementation,
//! used by the tests and by embedders that hold their view set in memory.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a view participates in combination. An `Extension` is merged into its
/// parent's resolution; a `Primary` is a combination root of its own, even
/// when it has a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Primary,
    Extension,
}

pub const DEFAULT_PRIORITY: i32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub id: ViewId,
    pub name: String,
    pub model: Option<String>,
    /// Raw markup, parsed on demand.
    pub arch: String,
    pub inherit_id: Option<ViewId>,
    pub mode: ViewMode,
    pub priority: i32,
    pub active: bool,
}

/// Creation payload. `mode` defaults to `Extension` when a parent is given,
/// `Primary` otherwise.
#[derive(Debug, Clone)]
pub struct NewView {
    pub name: String,
    pub model: Option<String>,
    pub arch: String,
    pub inherit_id: Option<ViewId>,
    pub mode: Option<ViewMode>,
    pub priority: i32,
    pub active: bool,
}

impl NewView {
    pub fn new(name: &str, arch: &str) -> NewView {
        NewView {
            name: name.to_string(),
            model: None,
            arch: arch.to_string(),
            inherit_id: None,
            mode: None,
            priority: DEFAULT_PRIORITY,
            active: true,
        }
    }

    pub fn model(mut self, model: &str) -> NewView {
        self.model = Some(model.to_string());
        self
    }

    pub fn inherit(mut self, parent: ViewId) -> NewView {
        self.inherit_id = Some(parent);
        self
    }

    pub fn mode(mut self, mode: ViewMode) -> NewView {
        self.mode = Some(mode);
        self
    }

    pub fn priority(mut self, priority: i32) -> NewView {
        self.priority = priority;
        self
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ViewPatch {
    pub arch: Option<String>,
    pub inherit_id: Option<Option<ViewId>>,
    pub mode: Option<ViewMode>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

pub trait ViewStore {
    fn load(&self, id: ViewId) -> Result<View>;

    /// Direct extension candidates of `id`, ordered by `(priority, id)`.
    fn children_of(&self, id: ViewId, active_only: bool) -> Vec<View>;

    fn create(&mut self, view: NewView) -> Result<ViewId>;

    fn update(&mut self, id: ViewId, patch: ViewPatch) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Id order is creation order, which makes ids usable as the combination
/// tie-breaker.
#[derive(Debug, Default)]
pub struct MemoryStore {
    views: BTreeMap<ViewId, View>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Walk the parent chain from `start`; error when `needle` shows up.
    fn check_no_cycle(&self, needle: ViewId, start: Option<ViewId>) -> Result<()> {
        let mut cur = start;
        while let Some(id) = cur {
            if id == needle {
                return Err(ViewError::Cycle { view: needle });
            }
            cur = self.views.get(&id).and_then(|v| v.inherit_id);
        }
        Ok(())
    }
}

fn check_mode(mode: ViewMode, inherit_id: Option<ViewId>, id: ViewId) -> Result<()> {
    match (mode, inherit_id) {
        (ViewMode::Extension, None) => Err(ViewError::Cycle { view: id }),
        _ => Ok(()),
    }
}

impl ViewStore for MemoryStore {
    fn load(&self, id: ViewId) -> Result<View> {
        self.views.get(&id).cloned().ok_or(ViewError::NotFound(id))
    }

    fn children_of(&self, id: ViewId, active_only: bool) -> Vec<View> {
        let mut out: Vec<View> = self
            .views
            .values()
            .filter(|v| v.inherit_id == Some(id) && (!active_only || v.active))
            .cloned()
            .collect();
        out.sort_by_key(|v| (v.priority, v.id));
        out
    }

    fn create(&mut self, view: NewView) -> Result<ViewId> {
        self.next_id += 1;
        let id = ViewId(self.next_id);
        let mode = view.mode.unwrap_or(match view.inherit_id {
            Some(_) => ViewMode::Extension,
            None => ViewMode::Primary,
        });
        check_mode(mode, view.inherit_id, id)?;
        if let Some(parent) = view.inherit_id {
            if !self.views.contains_key(&parent) {
                return Err(ViewError::NotFound(parent));
            }
            self.check_no_cycle(id, Some(parent))?;
        }
        self.views.insert(
            id,
            View {
                id,
                name: view.name,
                model: view.model,
                arch: view.arch,
                inherit_id: view.inherit_id,
                mode,
                priority: view.priority,
                active: view.active,
            },
        );
        Ok(id)
    }

    fn update(&mut self, id: ViewId, patch: ViewPatch) -> Result<()> {
        let current = self.views.get(&id).ok_or(ViewError::NotFound(id))?.clone();
        let inherit_id = patch.inherit_id.unwrap_or(current.inherit_id);
        let mode = patch.mode.unwrap_or(current.mode);
        check_mode(mode, inherit_id, id)?;
        if let Some(parent) = inherit_id {
            self.check_no_cycle(id, Some(parent))?;
        }
        let view = self.views.get_mut(&id).ok_or(ViewError::NotFound(id))?;
        if let Some(arch) = patch.arch {
            view.arch = arch;
        }
        view.inherit_id = inherit_id;
        view.mode = mode;
        if let Some(priority) = patch.priority {
            view.priority = priority;
        }
        if let Some(active) = patch.active {
            view.active = active;
        }
        Ok(())
    }
}
