//! Format-preserving descriptor edits.
//!
//! Every operation re-indexes the current text, computes byte-range
//! replacements and splices them in. Bytes outside the replaced ranges are
//! never touched, so comments, attribute quoting and blank lines survive.
//! New elements copy the indentation of their siblings (or of the document).

use crate::descriptor::disabled_module;
use crate::xml::{indent_at, XmlIndex};
use crate::{Result, TreeError};
use prodex_core::{Dependency, ElementWhitespace};
use quick_xml::escape::escape;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw `(groupId, artifactId)` text of a dependency entry
pub type RawCoordinate = (String, String);

/// An open descriptor with pending edits
#[derive(Debug, Clone)]
pub struct DescriptorEditor {
    path: PathBuf,
    original: String,
    content: String,
    style: ElementWhitespace,
}

impl DescriptorEditor {
    /// Read a descriptor for editing
    pub fn open(path: &Path, style: ElementWhitespace) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TreeError::io(path, e))?;
        Ok(Self::from_content(path, content, style))
    }

    /// Edit in-memory text; `path` is where [`save`](Self::save) writes
    pub fn from_content(
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        style: ElementWhitespace,
    ) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            original: content.clone(),
            content,
            style,
        }
    }

    /// Open `path`, run `f` and write the result back if anything changed.
    ///
    /// Nothing is written when `f` fails.
    pub fn edit<T, F>(path: &Path, style: ElementWhitespace, f: F) -> Result<T>
    where
        F: FnOnce(&mut DescriptorEditor) -> Result<T>,
    {
        let mut editor = Self::open(path, style)?;
        let value = f(&mut editor)?;
        editor.save()?;
        Ok(value)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_modified(&self) -> bool {
        self.content != self.original
    }

    /// Write the descriptor if it changed; returns whether a write happened
    pub fn save(&mut self) -> Result<bool> {
        if !self.is_modified() {
            return Ok(false);
        }
        std::fs::write(&self.path, &self.content).map_err(|e| TreeError::io(&self.path, e))?;
        debug!("Updated {}", self.path.display());
        self.original = self.content.clone();
        Ok(true)
    }

    // ========================================================================
    // Child module references
    // ========================================================================

    /// Replace every enabled `<module>` whose name is in `names` with a marked comment.
    ///
    /// Applies to the descriptor body and all profiles. Returns the names commented.
    pub fn comment_modules(&mut self, names: &BTreeSet<String>, mark: &str) -> Result<Vec<String>> {
        let index = self.index()?;
        let mut edits = Vec::new();
        let mut commented = Vec::new();
        for scope in self.scopes(&index) {
            let Some(modules) = index.child(scope, "modules") else {
                continue;
            };
            for module in index.children_named(modules, "module") {
                let name = index.text(&self.content, module);
                if names.contains(name) {
                    let e = index.get(module);
                    edits.push((
                        e.start,
                        e.end,
                        format!("<!-- <module>{}</module> {} -->", name, mark),
                    ));
                    commented.push(name.to_string());
                }
            }
        }
        self.splice(edits);
        Ok(commented)
    }

    /// Re-enable every child reference commented with `mark` for which `filter` holds
    pub fn uncomment_modules<F>(&mut self, mark: &str, filter: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let index = self.index()?;
        let mut edits = Vec::new();
        let mut restored = Vec::new();
        for scope in self.scopes(&index) {
            let Some(modules) = index.child(scope, "modules") else {
                continue;
            };
            for &(start, end) in &index.get(modules).comments {
                let inner = &self.content[start + 4..end - 3];
                if let Some(name) = disabled_module(inner, mark) {
                    if filter(&name) {
                        edits.push((start, end, format!("<module>{}</module>", name)));
                        restored.push(name);
                    }
                }
            }
        }
        self.splice(edits);
        Ok(restored)
    }

    /// Replace the `<modules>` element of a profile by an empty one
    pub fn remove_all_modules(&mut self, profile: Option<&str>) -> Result<bool> {
        let index = self.index()?;
        let Some(modules) = self.locate(&index, profile, &["modules"]) else {
            return Ok(false);
        };
        let e = index.get(modules);
        let empty = self.style.empty_element("modules");
        if self.content[e.start..e.end] == empty {
            return Ok(false);
        }
        self.splice(vec![(e.start, e.end, empty)]);
        Ok(true)
    }

    /// Add `<module>name</module>` keeping the list sorted; no-op if present
    pub fn add_module_if_missing(&mut self, profile: Option<&str>, name: &str) -> Result<bool> {
        let (index, modules) = self.ensure_path(profile, &["modules"])?;
        let names: Vec<&str> = index
            .children_named(modules, "module")
            .map(|m| index.text(&self.content, m))
            .collect();
        if names.contains(&name) {
            return Ok(false);
        }
        let next = index
            .children_named(modules, "module")
            .find(|&m| index.text(&self.content, m) > name)
            .map(|m| index.get(m).start);
        let element = format!("<module>{}</module>", escape(name));
        match next {
            Some(start) => {
                let separator = indent_at(&self.content, start)
                    .map(|indent| format!("\n{}", indent))
                    .unwrap_or_default();
                self.splice(vec![(start, start, format!("{}{}", element, separator))]);
            }
            None => self.insert_child(&index, modules, |_, _| element.clone()),
        }
        Ok(true)
    }

    /// Append the given module names in order, skipping those already present
    pub fn add_modules(&mut self, profile: Option<&str>, names: &[String]) -> Result<usize> {
        let mut added = 0;
        for name in names {
            let (index, modules) = self.ensure_path(profile, &["modules"])?;
            let present = index
                .children_named(modules, "module")
                .any(|m| index.text(&self.content, m) == name);
            if !present {
                let element = format!("<module>{}</module>", escape(name.as_str()));
                self.insert_child(&index, modules, |_, _| element.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    // ========================================================================
    // Versions and properties
    // ========================================================================

    /// Set the version of every managed dependency of `profile` matching `coords`.
    ///
    /// `coords` are compared with the raw `groupId`/`artifactId` text. Returns the
    /// number of entries changed; a coordinate without an entry is an error.
    pub fn set_managed_dependency_version(
        &mut self,
        profile: Option<&str>,
        version: &str,
        coords: &BTreeSet<RawCoordinate>,
    ) -> Result<usize> {
        let index = self.index()?;
        let dependencies = self
            .locate(&index, profile, &["dependencyManagement", "dependencies"])
            .ok_or_else(|| {
                TreeError::edit(
                    self.display(),
                    format!("no managed dependencies in {}", profile_label(profile)),
                )
            })?;

        let mut edits = Vec::new();
        let mut found: BTreeSet<RawCoordinate> = BTreeSet::new();
        for dependency in index.children_named(dependencies, "dependency") {
            let group = index.child_text(&self.content, dependency, "groupId").unwrap_or("");
            let artifact = index
                .child_text(&self.content, dependency, "artifactId")
                .unwrap_or("");
            let key = (group.to_string(), artifact.to_string());
            if !coords.contains(&key) {
                continue;
            }
            found.insert(key);
            match index.child(dependency, "version") {
                Some(element) => edits.extend(self.text_edit(&index, element, version)),
                None => {
                    let anchor = index
                        .child(dependency, "artifactId")
                        .map(|a| index.get(a))
                        .ok_or_else(|| TreeError::edit(self.display(), "dependency without artifactId"))?;
                    let separator = indent_at(&self.content, anchor.start)
                        .map(|indent| format!("\n{}", indent))
                        .unwrap_or_default();
                    edits.push((
                        anchor.end,
                        anchor.end,
                        format!("{}<version>{}</version>", separator, escape(version)),
                    ));
                }
            }
        }

        if let Some((group, artifact)) = coords.iter().find(|c| !found.contains(*c)) {
            return Err(TreeError::edit(
                self.display(),
                format!(
                    "no managed dependency {}:{} in {}",
                    group,
                    artifact,
                    profile_label(profile)
                ),
            ));
        }

        let changed = edits.len();
        self.splice(edits);
        Ok(changed)
    }

    /// Set `project/parent/version`
    pub fn set_parent_version(&mut self, version: &str) -> Result<bool> {
        let index = self.index()?;
        let parent = index
            .child(index.root, "parent")
            .ok_or_else(|| TreeError::edit(self.display(), "descriptor has no <parent>"))?;
        match index.child(parent, "version") {
            Some(element) => {
                let edit = self.text_edit(&index, element, version);
                let changed = edit.is_some();
                self.splice(edit.into_iter().collect());
                Ok(changed)
            }
            None => {
                let element = format!("<version>{}</version>", escape(version));
                self.insert_child(&index, parent, |_, _| element.clone());
                Ok(true)
            }
        }
    }

    /// Set a property of `profile`, creating the element (and containers) if needed
    pub fn set_property(&mut self, profile: Option<&str>, name: &str, value: &str) -> Result<bool> {
        let index = self.index()?;
        if let Some(element) = self.locate(&index, profile, &["properties", name]) {
            let edit = self.text_edit(&index, element, value);
            let changed = edit.is_some();
            self.splice(edit.into_iter().collect());
            return Ok(changed);
        }
        let (index, properties) = self.ensure_path(profile, &["properties"])?;
        let element = format!("<{}>{}</{}>", name, escape(value), name);
        self.insert_child(&index, properties, |_, _| element.clone());
        Ok(true)
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Remove the `<dependencies>` entries of `profile` for which `filter` holds.
    ///
    /// Entries are classified from their raw text, so `filter` sees virtual
    /// markers as such. Each entry is removed together with its line.
    pub fn remove_dependencies<F>(&mut self, profile: Option<&str>, filter: F) -> Result<usize>
    where
        F: Fn(&Dependency) -> bool,
    {
        let index = self.index()?;
        let Some(dependencies) = self.locate(&index, profile, &["dependencies"]) else {
            return Ok(0);
        };
        let edits: Vec<(usize, usize, String)> = index
            .children_named(dependencies, "dependency")
            .filter(|&d| filter(&self.read_dependency(&index, d)))
            .map(|d| {
                let e = index.get(d);
                (self.line_start(e.start), e.end, String::new())
            })
            .collect();
        let removed = edits.len();
        self.splice(edits);
        Ok(removed)
    }

    /// Append `dependencies` to `profile`, skipping coordinates already declared
    pub fn add_dependencies(&mut self, profile: Option<&str>, dependencies: &[Dependency]) -> Result<usize> {
        let mut added = 0;
        for dependency in dependencies {
            let (index, container) = self.ensure_path(profile, &["dependencies"])?;
            let present = index.children_named(container, "dependency").any(|d| {
                index.child_text(&self.content, d, "groupId") == Some(dependency.group.raw())
                    && index.child_text(&self.content, d, "artifactId") == Some(dependency.artifact.raw())
            });
            if !present {
                self.insert_child(&index, container, |ci, unit| render_dependency(dependency, ci, unit));
                added += 1;
            }
        }
        Ok(added)
    }

    // ========================================================================
    // Plugin configuration
    // ========================================================================

    /// Append `<name>` text elements below the configuration of a build plugin.
    ///
    /// `plugin` is the raw `groupId`/`artifactId` of an entry of `build/plugins`;
    /// `path` leads from its `<configuration>` to the container. Values already
    /// present are skipped, the rest are appended in the given order. The plugin
    /// and the container must exist.
    pub fn add_plugin_configuration_values<'v, I>(
        &mut self,
        plugin: &RawCoordinate,
        path: &[&str],
        name: &str,
        values: I,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = &'v str>,
    {
        let mut names = vec!["configuration"];
        names.extend_from_slice(path);
        let (group, artifact) = plugin;
        let index = self.index()?;
        let entry = self.plugin_entry(&index, plugin).ok_or_else(|| {
            TreeError::edit(self.display(), format!("no build plugin {}:{}", group, artifact))
        })?;
        if index.descend(entry, &names).is_none() {
            return Err(TreeError::edit(
                self.display(),
                format!("plugin {}:{} has no <{}>", group, artifact, names.join("/")),
            ));
        }

        let mut added = 0;
        for value in values {
            let index = self.index()?;
            let container = self
                .plugin_entry(&index, plugin)
                .and_then(|p| index.descend(p, &names))
                .ok_or_else(|| TreeError::edit(self.display(), "cannot locate insertion point"))?;
            let present = index
                .children_named(container, name)
                .any(|c| index.text(&self.content, c) == value);
            if !present {
                let element = format!("<{}>{}</{}>", name, escape(value), name);
                self.insert_child(&index, container, |_, _| element.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn index(&self) -> Result<XmlIndex> {
        XmlIndex::parse(&self.display(), &self.content)
    }

    /// Apply non-overlapping replacements
    fn splice(&mut self, mut edits: Vec<(usize, usize, String)>) {
        edits.sort_by(|a, b| b.0.cmp(&a.0));
        for (start, end, text) in edits {
            self.content.replace_range(start..end, &text);
        }
    }

    /// The descriptor body followed by every profile element
    fn scopes(&self, index: &XmlIndex) -> Vec<usize> {
        let mut scopes = vec![index.root];
        if let Some(profiles) = index.child(index.root, "profiles") {
            scopes.extend(index.children_named(profiles, "profile"));
        }
        scopes
    }

    fn scope(&self, index: &XmlIndex, profile: Option<&str>) -> Option<usize> {
        match profile {
            None => Some(index.root),
            Some(id) => {
                let profiles = index.child(index.root, "profiles")?;
                index
                    .children_named(profiles, "profile")
                    .find(|&p| index.child_text(&self.content, p, "id") == Some(id))
            }
        }
    }

    fn locate(&self, index: &XmlIndex, profile: Option<&str>, names: &[&str]) -> Option<usize> {
        let scope = self.scope(index, profile)?;
        index.descend(scope, names)
    }

    /// Ensure the profile and the element path below it exist
    fn ensure_path(&mut self, profile: Option<&str>, names: &[&str]) -> Result<(XmlIndex, usize)> {
        if let Some(id) = profile {
            let index = self.index()?;
            if self.scope(&index, profile).is_none() {
                let (index, profiles) = self.ensure_path(None, &["profiles"])?;
                let id = escape(id).into_owned();
                self.insert_child(&index, profiles, |ci, unit| {
                    format!("<profile>\n{ci}{unit}<id>{id}</id>\n{ci}</profile>")
                });
            }
        }
        for depth in 0..names.len() {
            let index = self.index()?;
            if self.locate(&index, profile, &names[..=depth]).is_some() {
                continue;
            }
            let parent = self
                .locate(&index, profile, &names[..depth])
                .ok_or_else(|| TreeError::edit(self.display(), "cannot locate insertion point"))?;
            let element = self.style.empty_element(names[depth]);
            self.insert_child(&index, parent, |_, _| element.clone());
        }
        let index = self.index()?;
        let found = self.locate(&index, profile, names).ok_or_else(|| {
            TreeError::edit(
                self.display(),
                format!("cannot create <{}>", names.join("/")),
            )
        })?;
        Ok((index, found))
    }

    /// Append a child element rendered with the child indentation and indent unit
    fn insert_child<F>(&mut self, index: &XmlIndex, parent: usize, render: F)
    where
        F: Fn(&str, &str) -> String,
    {
        let unit = self.indent_unit(index);
        let e = index.get(parent);
        let parent_indent = indent_at(&self.content, e.start).unwrap_or("").to_string();
        let child_indent = format!("{}{}", parent_indent, unit);
        let child = render(&child_indent, &unit);

        let edit = if e.self_closing {
            let open = self.content[e.start..e.end]
                .trim_end_matches("/>")
                .trim_end()
                .to_string();
            (
                e.start,
                e.end,
                format!(
                    "{}>\n{}{}\n{}</{}>",
                    open, child_indent, child, parent_indent, e.name
                ),
            )
        } else if let Some(last) = index.last_child_end(parent) {
            (last, last, format!("\n{}{}", child_indent, child))
        } else {
            (
                e.content_start,
                e.content_end,
                format!("\n{}{}\n{}", child_indent, child, parent_indent),
            )
        };
        self.splice(vec![edit]);
    }

    /// Indentation step of the document, from the root's first child
    fn indent_unit(&self, index: &XmlIndex) -> String {
        let root = index.get(index.root);
        let base = indent_at(&self.content, root.start).unwrap_or("");
        root.children
            .first()
            .and_then(|&c| indent_at(&self.content, index.get(c).start))
            .and_then(|indent| indent.strip_prefix(base))
            .filter(|unit| !unit.is_empty())
            .unwrap_or("    ")
            .to_string()
    }

    /// Entry of `build/plugins` with the raw coordinate `plugin`
    fn plugin_entry(&self, index: &XmlIndex, plugin: &RawCoordinate) -> Option<usize> {
        let plugins = index.descend(index.root, &["build", "plugins"])?;
        index.children_named(plugins, "plugin").find(|&p| {
            index.child_text(&self.content, p, "groupId") == Some(plugin.0.as_str())
                && index.child_text(&self.content, p, "artifactId") == Some(plugin.1.as_str())
        })
    }

    /// Start of the blank run before `pos`, including the preceding line break
    fn line_start(&self, pos: usize) -> usize {
        let before = self.content[..pos].trim_end_matches([' ', '\t']);
        match before.strip_suffix('\n') {
            Some(line) => line.strip_suffix('\r').unwrap_or(line).len(),
            None => before.len(),
        }
    }

    fn read_dependency(&self, index: &XmlIndex, dependency: usize) -> Dependency {
        let content = self.content.as_str();
        let mut parsed = Dependency::new(
            index.child_text(content, dependency, "groupId").unwrap_or(""),
            index.child_text(content, dependency, "artifactId").unwrap_or(""),
        );
        if let Some(version) = index.child_text(content, dependency, "version") {
            parsed = parsed.version(version);
        }
        if let Some(dep_type) = index.child_text(content, dependency, "type") {
            parsed = parsed.dep_type(dep_type);
        }
        if let Some(scope) = index.child_text(content, dependency, "scope") {
            parsed = parsed.scope(scope);
        }
        if let Some(exclusions) = index.child(dependency, "exclusions") {
            for exclusion in index.children_named(exclusions, "exclusion") {
                parsed = parsed.exclude(format!(
                    "{}:{}",
                    index.child_text(content, exclusion, "groupId").unwrap_or(""),
                    index.child_text(content, exclusion, "artifactId").unwrap_or("")
                ));
            }
        }
        parsed.classify()
    }

    /// Replacement setting the text of `element` to `value`, if it differs
    fn text_edit(
        &self,
        index: &XmlIndex,
        element: usize,
        value: &str,
    ) -> Option<(usize, usize, String)> {
        let e = index.get(element);
        let escaped = escape(value);
        if e.self_closing {
            return Some((e.start, e.end, format!("<{}>{}</{}>", e.name, escaped, e.name)));
        }
        if self.content[e.content_start..e.content_end] == *escaped {
            return None;
        }
        Some((e.content_start, e.content_end, escaped.into_owned()))
    }
}

/// Multi-line `<dependency>` element for an entry at `child_indent`
fn render_dependency(dependency: &Dependency, child_indent: &str, unit: &str) -> String {
    let inner = format!("{}{}", child_indent, unit);
    let mut lines = vec!["<dependency>".to_string()];
    let mut text = |name: &str, value: &str| {
        lines.push(format!("{}<{}>{}</{}>", inner, name, escape(value), name));
    };
    text("groupId", dependency.group.raw());
    text("artifactId", dependency.artifact.raw());
    if let Some(version) = &dependency.version {
        text("version", version.raw());
    }
    if let Some(dep_type) = &dependency.dep_type {
        text("type", dep_type);
    }
    if let Some(scope) = &dependency.scope {
        text("scope", scope);
    }
    if !dependency.exclusions.is_empty() {
        let exclusion_indent = format!("{}{}", inner, unit);
        let field_indent = format!("{}{}", exclusion_indent, unit);
        lines.push(format!("{}<exclusions>", inner));
        for pattern in &dependency.exclusions {
            let (group, artifact) = pattern.split_once(':').unwrap_or((pattern.as_str(), "*"));
            lines.push(format!("{}<exclusion>", exclusion_indent));
            lines.push(format!("{}<groupId>{}</groupId>", field_indent, escape(group)));
            lines.push(format!("{}<artifactId>{}</artifactId>", field_indent, escape(artifact)));
            lines.push(format!("{}</exclusion>", exclusion_indent));
        }
        lines.push(format!("{}</exclusions>", inner));
    }
    lines.push(format!("{}</dependency>", child_indent));
    lines.join("\n")
}

fn profile_label(profile: Option<&str>) -> String {
    match profile {
        Some(id) => format!("profile '{}'", id),
        None => "the descriptor body".to_string(),
    }
}
