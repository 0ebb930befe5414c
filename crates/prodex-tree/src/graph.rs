//! The module graph of a source tree.
//!
//! [`ProjectGraph::load`] reads the root descriptor, follows the child module
//! references of active profiles breadth-first and pulls in local parents found
//! through `relativePath`. The result is an immutable snapshot; after editing
//! descriptors, load a fresh graph instead of patching this one.

use crate::descriptor::{self, Descriptor};
use crate::{Result, TreeError};
use prodex_core::{
    join_unix, parent_dir, ActiveProfiles, Dependency, Expression, Ga, Module, ROOT_DESCRIPTOR,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum nesting of `${name}` lookups before a cycle is assumed
const MAX_EVALUATION_DEPTH: usize = 32;

/// Immutable snapshot of all modules of a tree
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    root_dir: PathBuf,
    profiles: ActiveProfiles,
    /// Modules keyed by descriptor path
    modules: BTreeMap<String, Module>,
    by_ga: BTreeMap<Ga, String>,
    /// Descriptor path of the aggregator listing each module
    aggregators: BTreeMap<String, String>,
}

impl ProjectGraph {
    /// Load the tree rooted at `root_dir`
    pub fn load(root_dir: &Path, profiles: ActiveProfiles) -> Result<Self> {
        let mut descriptors: BTreeMap<String, Descriptor> = BTreeMap::new();
        let mut aggregators: BTreeMap<String, String> = BTreeMap::new();
        let mut parent_paths: BTreeMap<String, String> = BTreeMap::new();
        let mut queue: VecDeque<String> = VecDeque::from([ROOT_DESCRIPTOR.to_string()]);

        while let Some(path) = queue.pop_front() {
            if descriptors.contains_key(&path) {
                continue;
            }
            let file = root_dir.join(&path);
            let content = std::fs::read_to_string(&file).map_err(|e| TreeError::io(&file, e))?;
            let parsed = descriptor::parse(&path, &content)?;
            let dir = parent_dir(&path).to_string();

            for profile in parsed.profiles.iter().filter(|p| profiles.is_active(p)) {
                for name in &profile.modules {
                    let child = module_descriptor_path(&dir, name).ok_or_else(|| {
                        TreeError::MissingDescriptor {
                            path: name.clone(),
                            module: name.clone(),
                            referenced_by: path.clone(),
                        }
                    })?;
                    if !root_dir.join(&child).is_file() {
                        return Err(TreeError::MissingDescriptor {
                            path: child,
                            module: name.clone(),
                            referenced_by: path.clone(),
                        });
                    }
                    aggregators.entry(child.clone()).or_insert_with(|| path.clone());
                    queue.push_back(child);
                }
            }

            if let Some(parent) = &parsed.parent {
                let relative = parent.relative_path.as_deref().unwrap_or("../pom.xml");
                if !relative.is_empty() {
                    if let Some(candidate) = module_descriptor_path(&dir, relative) {
                        if root_dir.join(&candidate).is_file() {
                            parent_paths.insert(path.clone(), candidate.clone());
                            queue.push_back(candidate);
                        } else if parent.relative_path.is_some() {
                            return Err(TreeError::ParentNotFound {
                                module: path.clone(),
                                parent: format!("{}:{}", parent.group, parent.artifact),
                                relative_path: relative.to_string(),
                            });
                        }
                    }
                }
            }

            debug!("Loaded descriptor {}", path);
            descriptors.insert(path, parsed);
        }

        let modules: BTreeMap<String, Module> = descriptors
            .into_iter()
            .map(|(path, d)| {
                let module = Module {
                    ga: Ga::new("", ""),
                    declared: d.declared,
                    parent_path: parent_paths.get(&path).cloned(),
                    path: path.clone(),
                    parent: d.parent,
                    name: d.name,
                    profiles: d.profiles,
                };
                (path, module)
            })
            .collect();

        let mut graph = Self {
            root_dir: root_dir.to_path_buf(),
            profiles,
            modules,
            by_ga: BTreeMap::new(),
            aggregators,
        };
        graph.assign_coordinates()?;
        Ok(graph)
    }

    /// Evaluate every module's coordinate and check parent references
    fn assign_coordinates(&mut self) -> Result<()> {
        let mut coordinates: Vec<(String, Ga)> = Vec::new();
        {
            let evaluator = self.evaluator();
            for (path, module) in &self.modules {
                let group = match &module.declared.group {
                    Some(group) => group,
                    None => match &module.parent {
                        Some(parent) => &parent.group,
                        None => {
                            return Err(TreeError::MissingElement {
                                path: path.clone(),
                                element: "project/groupId".to_string(),
                            })
                        }
                    },
                };
                let ga = Ga::new(
                    evaluator.evaluate(group, path)?,
                    evaluator.evaluate(&module.declared.artifact, path)?,
                );
                coordinates.push((path.clone(), ga));
            }
        }

        for (path, ga) in coordinates {
            if let Some(first) = self.by_ga.get(&ga) {
                return Err(TreeError::DuplicateModule {
                    ga: ga.to_string(),
                    first: first.clone(),
                    second: path,
                });
            }
            self.by_ga.insert(ga.clone(), path.clone());
            if let Some(module) = self.modules.get_mut(&path) {
                module.ga = ga;
            }
        }

        // A default `../pom.xml` that holds some other module is not an error:
        // the parent is then looked up by coordinate.
        let mut relinked: Vec<(String, Option<String>)> = Vec::new();
        for module in self.modules.values() {
            let Some(parent) = &module.parent else {
                continue;
            };
            let evaluator = self.evaluator();
            let expected = Ga::new(
                evaluator.evaluate(&parent.group, &module.path)?,
                evaluator.evaluate(&parent.artifact, &module.path)?,
            );
            let located = module
                .parent_path
                .as_ref()
                .and_then(|path| self.modules.get(path))
                .map(|m| &m.ga);
            if located == Some(&expected) {
                continue;
            }
            let explicit = parent
                .relative_path
                .as_deref()
                .is_some_and(|relative| !relative.is_empty());
            if explicit && module.parent_path.is_some() {
                return Err(TreeError::ParentNotFound {
                    module: module.path.clone(),
                    parent: expected.to_string(),
                    relative_path: parent.relative_path.clone().unwrap_or_default(),
                });
            }
            relinked.push((module.path.clone(), self.by_ga.get(&expected).cloned()));
        }
        for (path, parent_path) in relinked {
            if let Some(module) = self.modules.get_mut(&path) {
                module.parent_path = parent_path;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn active_profiles(&self) -> &ActiveProfiles {
        &self.profiles
    }

    pub fn root(&self) -> Result<&Module> {
        self.modules
            .get(ROOT_DESCRIPTOR)
            .ok_or_else(|| TreeError::MissingDescriptor {
                path: ROOT_DESCRIPTOR.to_string(),
                module: String::new(),
                referenced_by: self.root_dir.display().to_string(),
            })
    }

    pub fn module(&self, ga: &Ga) -> Option<&Module> {
        self.by_ga.get(ga).and_then(|path| self.modules.get(path))
    }

    pub fn module_by_path(&self, path: &str) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn contains(&self, ga: &Ga) -> bool {
        self.by_ga.contains_key(ga)
    }

    /// All modules in coordinate order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.by_ga.values().filter_map(|path| self.modules.get(path))
    }

    /// All modules in descriptor path order
    pub fn modules_by_path(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// The module whose active profile lists `module` as a child
    pub fn aggregator_of(&self, module: &Module) -> Option<&Module> {
        self.aggregators
            .get(&module.path)
            .and_then(|path| self.modules.get(path))
    }

    /// The in-tree parent of `module`
    pub fn parent_of(&self, module: &Module) -> Option<&Module> {
        module
            .parent_path
            .as_ref()
            .and_then(|path| self.modules.get(path))
    }

    /// Child modules listed by the active profiles of `module`, with the
    /// reference text as written
    pub fn child_modules<'a>(&'a self, module: &'a Module) -> Vec<(&'a str, &'a Module)> {
        let dir = module.dir();
        module
            .active_profiles(&self.profiles)
            .flat_map(|p| p.modules.iter())
            .filter_map(|name| {
                let path = module_descriptor_path(dir, name)?;
                self.modules.get(&path).map(|child| (name.as_str(), child))
            })
            .collect()
    }

    /// Extension runtime modules: those with a `-deployment` sibling in the tree
    pub fn extensions(&self) -> BTreeSet<Ga> {
        self.by_ga
            .keys()
            .filter(|ga| self.contains(&ga.deployment()))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    pub fn evaluator(&self) -> ExpressionEvaluator<'_> {
        ExpressionEvaluator {
            modules: &self.modules,
            profiles: &self.profiles,
        }
    }

    /// Evaluate `expression` in the scope of `module`
    pub fn evaluate(&self, expression: &Expression, module: &Module) -> Result<String> {
        self.evaluator().evaluate(expression, &module.path)
    }

    /// Evaluated coordinate of a dependency declared in `module`
    pub fn dependency_ga(&self, dependency: &Dependency, module: &Module) -> Result<Ga> {
        let evaluator = self.evaluator();
        Ok(Ga::new(
            evaluator.evaluate(&dependency.group, &module.path)?,
            evaluator.evaluate(&dependency.artifact, &module.path)?,
        ))
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// The least set of internal modules containing `seed` and closed under
    /// parent-of, dependency-of and import-of, over active profiles.
    ///
    /// Virtual dependencies are not followed. Seeds that are not modules of the
    /// tree are kept in the result as-is.
    pub fn required_modules(&self, seed: &BTreeSet<Ga>) -> Result<BTreeSet<Ga>> {
        let mut result = BTreeSet::new();
        let mut queue: VecDeque<Ga> = seed.iter().cloned().collect();
        while let Some(ga) = queue.pop_front() {
            if !result.insert(ga.clone()) {
                continue;
            }
            let Some(module) = self.module(&ga) else {
                continue;
            };
            if let Some(parent) = self.parent_of(module) {
                queue.push_back(parent.ga.clone());
            }
            for profile in module.active_profiles(&self.profiles) {
                let edges = profile
                    .dependencies
                    .iter()
                    .filter(|d| !d.is_virtual())
                    .chain(profile.managed_dependencies.iter().filter(|d| d.is_import()));
                for dependency in edges {
                    let target = self.dependency_ga(dependency, module)?;
                    if self.contains(&target) && !result.contains(&target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        Ok(result)
    }

    /// Every coordinate `ga` depends on, directly or through internal modules.
    ///
    /// External coordinates appear in the result but are not expanded further.
    pub fn transitive_dependencies(&self, ga: &Ga) -> Result<BTreeSet<Ga>> {
        let mut result = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([ga.clone()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(module) = self.module(&current) else {
                continue;
            };
            for profile in module.active_profiles(&self.profiles) {
                for dependency in profile.dependencies.iter().filter(|d| !d.is_virtual()) {
                    let target = self.dependency_ga(dependency, module)?;
                    if result.insert(target.clone()) {
                        queue.push_back(target);
                    }
                }
            }
        }
        result.remove(ga);
        Ok(result)
    }
}

/// Descriptor path of the child module `name` of an aggregator in `dir`
pub(crate) fn module_descriptor_path(dir: &str, name: &str) -> Option<String> {
    let joined = join_unix(dir, name)?;
    if joined.ends_with(".xml") {
        Some(joined)
    } else if joined.is_empty() {
        Some(ROOT_DESCRIPTOR.to_string())
    } else {
        Some(format!("{}/{}", joined, ROOT_DESCRIPTOR))
    }
}

// ============================================================================
// Expression evaluation
// ============================================================================

/// Resolves `${name}` placeholders against module scopes
#[derive(Debug, Clone, Copy)]
pub struct ExpressionEvaluator<'g> {
    modules: &'g BTreeMap<String, Module>,
    profiles: &'g ActiveProfiles,
}

impl<'g> ExpressionEvaluator<'g> {
    /// Evaluate `expression` in the scope of the module at `module_path`
    pub fn evaluate(&self, expression: &Expression, module_path: &str) -> Result<String> {
        self.evaluate_at(expression, module_path, 0)
    }

    fn evaluate_at(&self, expression: &Expression, module_path: &str, depth: usize) -> Result<String> {
        if expression.is_constant() {
            return Ok(expression.raw().to_string());
        }
        if depth > MAX_EVALUATION_DEPTH {
            return Err(self.unresolved(expression, module_path, "evaluation cycle"));
        }
        let mut value = expression.raw().to_string();
        for name in expression.placeholders() {
            let resolved = self
                .resolve(name, module_path, depth + 1)?
                .ok_or_else(|| {
                    self.unresolved(expression, module_path, &format!("'{}' is not defined", name))
                })?;
            value = value.replace(&format!("${{{}}}", name), &resolved);
        }
        Ok(value)
    }

    fn resolve(&self, name: &str, module_path: &str, depth: usize) -> Result<Option<String>> {
        let Some(module) = self.modules.get(module_path) else {
            return Ok(None);
        };
        let builtin = match name {
            "self.version" | "project.version" => module.version_expression(),
            "self.groupId" | "project.groupId" => module
                .declared
                .group
                .as_ref()
                .or_else(|| module.parent.as_ref().map(|p| &p.group)),
            "self.artifactId" | "project.artifactId" => Some(&module.declared.artifact),
            "parent.version" | "project.parent.version" => {
                module.parent.as_ref().map(|p| &p.version)
            }
            _ => None,
        };
        if let Some(expression) = builtin {
            return self.evaluate_at(expression, module_path, depth).map(Some);
        }

        // Inherited properties are interpolated in the scope of the inheriting module
        match self.lookup_property(name, module_path) {
            Some(expression) => self.evaluate_at(expression, module_path, depth).map(Some),
            None => Ok(None),
        }
    }

    fn lookup_property(&self, name: &str, module_path: &str) -> Option<&'g Expression> {
        let mut current = self.modules.get(module_path);
        let mut hops = 0;
        while let Some(module) = current {
            let defined = module
                .active_profiles(self.profiles)
                .filter_map(|p| p.properties.get(name))
                .last();
            if defined.is_some() {
                return defined;
            }
            hops += 1;
            if hops > MAX_EVALUATION_DEPTH {
                return None;
            }
            current = module
                .parent_path
                .as_ref()
                .and_then(|path| self.modules.get(path));
        }
        None
    }

    fn unresolved(&self, expression: &Expression, module_path: &str, reason: &str) -> TreeError {
        TreeError::UnresolvedExpression {
            expression: expression.raw().to_string(),
            module: module_path.to_string(),
            reason: reason.to_string(),
        }
    }
}
