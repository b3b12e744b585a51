//! Static validation of an arch against a schema registry.
//!
//! Validation walks the tree with a stack of scopes, one per embedded
//! subview. A scope knows its model and the set of field names declared at
//! its own level; `parent.`-prefixed identifiers climb that stack one scope
//! per hop. The first rule violation aborts with a [`ViewError::Validation`]
//! carrying the view name and the offending fragment; accessibility-style
//! findings are collected as warnings and never block.

use std::collections::BTreeSet;

use tracing::warn;

use crate::arch::{Arch, NodeId};
use crate::error::{Result, ViewError};
use crate::expr::{dict_expressions, domain_identifiers, variable_names};
use crate::schema::SchemaRegistry;

/// Tags allowed as direct children of a `tree` element.
const TREE_CHILD_TAGS: &[&str] = &["field", "button", "control", "groupby", "widget", "header"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    /// Serialized fragment the warning points at.
    pub context: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<Warning>,
}

struct Scope {
    model: String,
    /// Field names declared by `field` elements at this scope's own level,
    /// plus the implicit `id`.
    fields: BTreeSet<String>,
}

pub struct Validator<'a> {
    schema: &'a dyn SchemaRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a dyn SchemaRegistry) -> Validator<'a> {
        Validator { schema }
    }

    /// Validate a raw arch for `model`. `view_name` is only used in error
    /// reports.
    pub fn validate_arch(
        &self,
        arch: &Arch,
        model: &str,
        view_name: &str,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let mut scopes: Vec<Scope> = Vec::new();
        self.validate_scope(arch, arch.root(), model, view_name, &mut scopes, &mut report)?;
        Ok(report)
    }

    /// Validate one subview rooted at `root` over `model`, with `scopes`
    /// holding the enclosing subviews.
    fn validate_scope(
        &self,
        arch: &Arch,
        root: NodeId,
        model: &str,
        view_name: &str,
        scopes: &mut Vec<Scope>,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let mut fields = BTreeSet::new();
        fields.insert("id".to_string());
        self.collect_fields(arch, root, model, view_name, &mut fields)?;
        scopes.push(Scope {
            model: model.to_string(),
            fields,
        });
        let result = self.walk(arch, root, view_name, scopes, report);
        scopes.pop();
        result
    }

    /// Field names declared at this scope level, not crossing into embedded
    /// subviews. Field existence is checked here so that it is reported even
    /// for fields only referenced later.
    fn collect_fields(
        &self,
        arch: &Arch,
        node: NodeId,
        model: &str,
        view_name: &str,
        out: &mut BTreeSet<String>,
    ) -> Result<()> {
        for child in arch.element_children(node) {
            if arch.tag(child) == Some("field") {
                let name = arch.attr(child, "name").ok_or_else(|| {
                    self.error(arch, child, view_name, "Field tag must have a \"name\" attribute defined".to_string())
                })?;
                if name != "id" && !self.schema.field_exists(model, name) {
                    return Err(self.error(
                        arch,
                        child,
                        view_name,
                        format!("Field \"{name}\" does not exist in model \"{model}\""),
                    ));
                }
                out.insert(name.to_string());
                // children of a field are a separate scope
            } else {
                self.collect_fields(arch, child, model, view_name, out)?;
            }
        }
        Ok(())
    }

    fn walk(
        &self,
        arch: &Arch,
        node: NodeId,
        view_name: &str,
        scopes: &mut Vec<Scope>,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let tag = arch.tag(node).unwrap_or("");
        match tag {
            "tree" => self.check_tree_children(arch, node, view_name)?,
            "button" => self.check_button(arch, node, view_name, scopes, report)?,
            "img" => {
                if arch.attr(node, "alt").is_none() {
                    self.warn(arch, node, report, "img tag must contain an alt attribute");
                }
            }
            _ => {}
        }
        if let Some(groups) = arch.attr(node, "groups") {
            for group in groups.split(',').map(str::trim).filter(|g| !g.is_empty()) {
                let group = group.trim_start_matches('!');
                if !self.schema.group_exists(group) {
                    self.warn(
                        arch,
                        node,
                        report,
                        &format!("unknown group {group:?} referenced by view"),
                    );
                }
            }
        }

        if tag == "field" {
            return self.check_field(arch, node, view_name, scopes, report);
        }
        self.check_expr_attrs(arch, node, view_name, scopes)?;
        for child in arch.element_children(node) {
            self.walk(arch, child, view_name, scopes, report)?;
        }
        Ok(())
    }

    fn check_field(
        &self,
        arch: &Arch,
        node: NodeId,
        view_name: &str,
        scopes: &mut Vec<Scope>,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let Some(scope) = scopes.last() else { return Ok(()) };
        let model = scope.model.clone();
        let name = arch
            .attr(node, "name")
            .map(str::to_string)
            .ok_or_else(|| {
                self.error(arch, node, view_name, "Field tag must have a \"name\" attribute defined".to_string())
            })?;
        let info = self.schema.field_info(&model, &name);

        if let Some(domain) = arch.attr(node, "domain") {
            let comodel = match info.as_ref().and_then(|i| i.relation.clone()) {
                Some(comodel) => comodel,
                None => {
                    return Err(self.error(
                        arch,
                        node,
                        view_name,
                        format!(
                            "Domain on non-relational field \"{name}\" makes no sense (domain:{domain})"
                        ),
                    ))
                }
            };
            let (paths, vars) = domain_identifiers(domain);
            for path in paths {
                self.check_domain_path(arch, node, view_name, &comodel, &path)?;
            }
            for var in vars {
                self.resolve_in_scopes(arch, node, view_name, scopes, &var)?;
            }
        }
        self.check_expr_attrs(arch, node, view_name, scopes)?;

        let subviews = arch.element_children(node);
        if !subviews.is_empty() {
            if let Some(comodel) = info.as_ref().and_then(|i| i.relation.clone()) {
                for subview in subviews {
                    self.validate_scope(arch, subview, &comodel, view_name, scopes, report)?;
                }
            }
        }
        Ok(())
    }

    /// `attrs` values are domains over the current scope; `context` values
    /// are plain expressions. Both may only reference fields visible in the
    /// scope chain.
    fn check_expr_attrs(
        &self,
        arch: &Arch,
        node: NodeId,
        view_name: &str,
        scopes: &[Scope],
    ) -> Result<()> {
        if let Some(attrs) = arch.attr(node, "attrs") {
            let entries = dict_expressions(attrs).unwrap_or_default();
            for (_key, value) in entries {
                let (fields, vars) = domain_identifiers(&value);
                for name in fields.iter().chain(vars.iter()) {
                    self.resolve_in_scopes(arch, node, view_name, scopes, name)?;
                }
            }
        }
        if let Some(context) = arch.attr(node, "context") {
            match dict_expressions(context) {
                Some(entries) => {
                    for (_key, value) in entries {
                        for name in variable_names(&value) {
                            self.resolve_in_scopes(arch, node, view_name, scopes, &name)?;
                        }
                    }
                }
                None => {
                    for name in variable_names(context) {
                        self.resolve_in_scopes(arch, node, view_name, scopes, &name)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve an identifier against the scope stack: each `parent.` hop
    /// climbs one scope, the remainder's root segment must be a field
    /// declared in that scope.
    fn resolve_in_scopes(
        &self,
        arch: &Arch,
        node: NodeId,
        view_name: &str,
        scopes: &[Scope],
        name: &str,
    ) -> Result<()> {
        let mut depth = 0usize;
        let mut rest = name;
        while let Some(stripped) = rest.strip_prefix("parent.") {
            depth += 1;
            rest = stripped;
        }
        let root = rest.split('.').next().unwrap_or(rest);
        let scope = scopes
            .len()
            .checked_sub(1 + depth)
            .and_then(|i| scopes.get(i));
        let found = scope.is_some_and(|s| s.fields.contains(root));
        if !found {
            return Err(self.error(
                arch,
                node,
                view_name,
                format!("Field {name:?} used in expression must be present in view but is missing"),
            ));
        }
        Ok(())
    }

    /// A domain's left-hand path must stay searchable through the comodel,
    /// hop by hop.
    fn check_domain_path(
        &self,
        arch: &Arch,
        node: NodeId,
        view_name: &str,
        comodel: &str,
        path: &str,
    ) -> Result<()> {
        let mut model = comodel.to_string();
        let segments: Vec<&str> = path.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            if *segment == "id" {
                continue;
            }
            let info = self.schema.field_info(&model, segment).ok_or_else(|| {
                self.error(
                    arch,
                    node,
                    view_name,
                    format!("Unknown field \"{model}.{segment}\" in domain"),
                )
            })?;
            if !info.searchable {
                return Err(self.error(
                    arch,
                    node,
                    view_name,
                    format!("Unsearchable field \"{model}.{segment}\" in domain"),
                ));
            }
            if i + 1 < segments.len() {
                model = info.relation.ok_or_else(|| {
                    self.error(
                        arch,
                        node,
                        view_name,
                        format!("Non-relational field \"{model}.{segment}\" in domain path \"{path}\""),
                    )
                })?;
            }
        }
        Ok(())
    }

    fn check_tree_children(&self, arch: &Arch, node: NodeId, view_name: &str) -> Result<()> {
        for child in arch.element_children(node) {
            let tag = arch.tag(child).unwrap_or("");
            if !TREE_CHILD_TAGS.contains(&tag) {
                return Err(self.error(
                    arch,
                    child,
                    view_name,
                    format!("Tree child can only be one of field, button, control, groupby, widget, header, got {tag}"),
                ));
            }
        }
        Ok(())
    }

    fn check_button(
        &self,
        arch: &Arch,
        node: NodeId,
        view_name: &str,
        scopes: &[Scope],
        report: &mut ValidationReport,
    ) -> Result<()> {
        if arch.attr(node, "type") == Some("object") {
            let Some(scope) = scopes.last() else { return Ok(()) };
            let name = arch.attr(node, "name").ok_or_else(|| {
                self.error(arch, node, view_name, "Button must have a name".to_string())
            })?;
            if !self.schema.valid_action(&scope.model, name) {
                return Err(self.error(
                    arch,
                    node,
                    view_name,
                    format!("{name:?} is not a valid action on model \"{}\"", scope.model),
                ));
            }
        }
        let has_label = ["string", "title", "aria-label"]
            .iter()
            .any(|a| arch.attr(node, a).is_some());
        if !has_label && arch.attr(node, "icon").is_some() {
            self.warn(arch, node, report, "icon-only button has no accessible label");
        }
        Ok(())
    }

    fn error(&self, arch: &Arch, node: NodeId, view_name: &str, message: String) -> ViewError {
        ViewError::Validation {
            view: view_name.to_string(),
            message,
            context: arch.node_to_xml(node),
        }
    }

    fn warn(&self, arch: &Arch, node: NodeId, report: &mut ValidationReport, message: &str) {
        let context = arch.node_to_xml(node);
        warn!(%context, "{message}");
        report.warnings.push(Warning {
            message: message.to_string(),
            context,
        });
    }
}
