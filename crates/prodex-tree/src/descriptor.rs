//! Parsing of a single `pom.xml` descriptor into the module model.
//!
//! Only the parts of the descriptor the planner consumes are read: the
//! declared coordinates, the parent reference, properties, child module
//! references (enabled and disabled), dependencies and managed dependencies,
//! for the descriptor body and for every `<profile>`.

use crate::{Result, TreeError};
use prodex_core::{DeclaredGav, Dependency, Expression, ParentRef, Profile};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;

/// A parsed descriptor, before coordinates are evaluated
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub declared: DeclaredGav,
    pub parent: Option<ParentRef>,
    pub name: Option<String>,
    /// Profile 0 is the descriptor body
    pub profiles: Vec<Profile>,
}

impl Descriptor {
    /// Every child module reference of every profile, enabled or not
    pub fn all_module_references(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().flat_map(|p| {
            p.modules
                .iter()
                .chain(p.disabled_modules.iter())
                .map(String::as_str)
        })
    }
}

/// The module name of a comment of the form `<module>NAME</module> MARK`
pub fn disabled_module(comment: &str, mark: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^\s*<module>\s*([^<]+?)\s*</module>\s*(.*?)\s*$").ok())
        .as_ref()?;
    let captures = pattern.captures(comment)?;
    if captures.get(2).map(|m| m.as_str()) == Some(mark) {
        captures.get(1).map(|m| m.as_str().to_string())
    } else {
        None
    }
}

/// Parse descriptor text; `path` is only used in error messages
pub fn parse(path: &str, content: &str) -> Result<Descriptor> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut state = ParseState::new(path);
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| TreeError::Xml {
            path: path.to_string(),
            message: format!("at byte {}: {}", reader.buffer_position(), e),
        })?;
        match event {
            Event::Start(e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text.clear();
                state.open(&stack)?;
            }
            Event::Empty(e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text.clear();
                state.open(&stack)?;
                state.close(&stack, "")?;
                stack.pop();
            }
            Event::End(_) => {
                state.close(&stack, text.trim())?;
                stack.pop();
                text.clear();
            }
            Event::Text(t) => {
                let unescaped = t.unescape().map_err(|e| TreeError::Xml {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
                text.push_str(&unescaped);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::Comment(c) => state.comment(&stack, &String::from_utf8_lossy(&c)),
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

// ============================================================================
// Parse state
// ============================================================================

#[derive(Default)]
struct DependencyBuilder {
    group: Option<String>,
    artifact: Option<String>,
    version: Option<String>,
    scope: Option<String>,
    dep_type: Option<String>,
    exclusions: Vec<String>,
    exclusion_group: Option<String>,
    exclusion_artifact: Option<String>,
}

impl DependencyBuilder {
    fn build(self, path: &str) -> Result<Dependency> {
        let group = self.group.ok_or_else(|| missing(path, "dependency/groupId"))?;
        let artifact = self
            .artifact
            .ok_or_else(|| missing(path, "dependency/artifactId"))?;
        let mut dependency = Dependency::new(group, artifact);
        dependency.version = self.version.map(Expression::new);
        dependency.scope = self.scope;
        dependency.dep_type = self.dep_type;
        dependency.exclusions = self.exclusions;
        Ok(dependency.classify())
    }
}

#[derive(Default)]
struct ParentBuilder {
    group: Option<String>,
    artifact: Option<String>,
    version: Option<String>,
    relative_path: Option<String>,
}

/// Where an element sits: the descriptor body or a profile
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Body,
    Profile,
}

struct ParseState<'p> {
    path: &'p str,
    root_seen: bool,
    group: Option<String>,
    artifact: Option<String>,
    version: Option<String>,
    name: Option<String>,
    parent: Option<ParentBuilder>,
    profiles: Vec<Profile>,
    current: usize,
    dependency: Option<DependencyBuilder>,
}

fn missing(path: &str, element: &str) -> TreeError {
    TreeError::MissingElement {
        path: path.to_string(),
        element: element.to_string(),
    }
}

/// Split an element path into its scope and the path relative to that scope
fn scoped(stack: &[String]) -> Option<(Scope, &[String])> {
    match stack {
        [project, profiles, profile, rest @ ..]
            if project == "project" && profiles == "profiles" && profile == "profile" =>
        {
            Some((Scope::Profile, rest))
        }
        [project, rest @ ..] if project == "project" => Some((Scope::Body, rest)),
        _ => None,
    }
}

/// The dependency-relative path if `rel` is inside a dependency entry
fn dependency_context(rel: &[String]) -> Option<(bool, &[String])> {
    match rel {
        [deps, dep, rest @ ..] if deps == "dependencies" && dep == "dependency" => {
            Some((false, rest))
        }
        [mgmt, deps, dep, rest @ ..]
            if mgmt == "dependencyManagement" && deps == "dependencies" && dep == "dependency" =>
        {
            Some((true, rest))
        }
        _ => None,
    }
}

impl<'p> ParseState<'p> {
    fn new(path: &'p str) -> Self {
        Self {
            path,
            root_seen: false,
            group: None,
            artifact: None,
            version: None,
            name: None,
            parent: None,
            profiles: vec![Profile::default()],
            current: 0,
            dependency: None,
        }
    }

    fn open(&mut self, stack: &[String]) -> Result<()> {
        if stack.len() == 1 {
            if stack[0] != "project" {
                return Err(TreeError::Xml {
                    path: self.path.to_string(),
                    message: format!("root element is <{}>, expected <project>", stack[0]),
                });
            }
            self.root_seen = true;
            return Ok(());
        }
        let Some((scope, rel)) = scoped(stack) else {
            return Ok(());
        };
        if scope == Scope::Profile && rel.is_empty() {
            self.profiles.push(Profile::named(""));
            self.current = self.profiles.len() - 1;
            return Ok(());
        }
        if scope == Scope::Body && rel.len() == 1 && rel[0] == "parent" {
            self.parent = Some(ParentBuilder::default());
            return Ok(());
        }
        if let Some((_, rest)) = dependency_context(rel) {
            if rest.is_empty() {
                self.dependency = Some(DependencyBuilder::default());
            } else if rest.len() == 2 && rest[0] == "exclusions" && rest[1] == "exclusion" {
                if let Some(dep) = self.dependency.as_mut() {
                    dep.exclusion_group = None;
                    dep.exclusion_artifact = None;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, stack: &[String], text: &str) -> Result<()> {
        let Some((scope, rel)) = scoped(stack) else {
            return Ok(());
        };
        let index = match scope {
            Scope::Body => 0,
            Scope::Profile => self.current,
        };

        if scope == Scope::Profile && rel.is_empty() {
            self.current = 0;
            return Ok(());
        }

        if let Some((managed, rest)) = dependency_context(rel) {
            return self.close_dependency(index, managed, rest, text);
        }

        let value = || Some(text.to_string());
        match (scope, rel) {
            (Scope::Body, [field]) => match field.as_str() {
                "groupId" => self.group = value(),
                "artifactId" => self.artifact = value(),
                "version" => self.version = value(),
                "name" => self.name = value(),
                _ => {}
            },
            (Scope::Body, [parent, field]) if parent == "parent" => {
                if let Some(p) = self.parent.as_mut() {
                    match field.as_str() {
                        "groupId" => p.group = value(),
                        "artifactId" => p.artifact = value(),
                        "version" => p.version = value(),
                        "relativePath" => p.relative_path = value(),
                        _ => {}
                    }
                }
            }
            (Scope::Profile, [field]) if field == "id" => {
                self.profiles[index].id = value();
            }
            (_, [properties, name]) if properties == "properties" => {
                self.profiles[index]
                    .properties
                    .insert(name.clone(), Expression::new(text));
            }
            (_, [modules, module]) if modules == "modules" && module == "module" => {
                self.profiles[index].modules.push(text.to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn close_dependency(
        &mut self,
        index: usize,
        managed: bool,
        rest: &[String],
        text: &str,
    ) -> Result<()> {
        if rest.is_empty() {
            if let Some(builder) = self.dependency.take() {
                let dependency = builder.build(self.path)?;
                let profile = &mut self.profiles[index];
                if managed {
                    profile.managed_dependencies.push(dependency);
                } else {
                    profile.dependencies.push(dependency);
                }
            }
            return Ok(());
        }
        let Some(dep) = self.dependency.as_mut() else {
            return Ok(());
        };
        match rest {
            [field] => match field.as_str() {
                "groupId" => dep.group = Some(text.to_string()),
                "artifactId" => dep.artifact = Some(text.to_string()),
                "version" => dep.version = Some(text.to_string()),
                "scope" => dep.scope = Some(text.to_string()),
                "type" => dep.dep_type = Some(text.to_string()),
                _ => {}
            },
            [exclusions, exclusion] if exclusions == "exclusions" && exclusion == "exclusion" => {
                let group = dep.exclusion_group.take().unwrap_or_default();
                let artifact = dep.exclusion_artifact.take().unwrap_or_default();
                dep.exclusions.push(format!("{}:{}", group, artifact));
            }
            [exclusions, exclusion, field]
                if exclusions == "exclusions" && exclusion == "exclusion" =>
            {
                match field.as_str() {
                    "groupId" => dep.exclusion_group = Some(text.to_string()),
                    "artifactId" => dep.exclusion_artifact = Some(text.to_string()),
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn comment(&mut self, stack: &[String], comment: &str) {
        let Some((scope, rel)) = scoped(stack) else {
            return;
        };
        if rel.len() != 1 || rel[0] != "modules" {
            return;
        }
        let index = match scope {
            Scope::Body => 0,
            Scope::Profile => self.current,
        };
        if let Some(name) = disabled_module(comment, prodex_core::COMMENT_MARK) {
            self.profiles[index].disabled_modules.push(name);
        }
    }

    fn finish(self) -> Result<Descriptor> {
        if !self.root_seen {
            return Err(TreeError::Xml {
                path: self.path.to_string(),
                message: "no <project> element".to_string(),
            });
        }
        let artifact = self
            .artifact
            .ok_or_else(|| missing(self.path, "project/artifactId"))?;
        let parent = match self.parent {
            Some(p) => Some(ParentRef {
                group: Expression::new(
                    p.group.ok_or_else(|| missing(self.path, "parent/groupId"))?,
                ),
                artifact: Expression::new(
                    p.artifact
                        .ok_or_else(|| missing(self.path, "parent/artifactId"))?,
                ),
                version: Expression::new(
                    p.version.ok_or_else(|| missing(self.path, "parent/version"))?,
                ),
                relative_path: p.relative_path,
            }),
            None => None,
        };
        Ok(Descriptor {
            declared: DeclaredGav {
                group: self.group.map(Expression::new),
                artifact: Expression::new(artifact),
                version: self.version.map(Expression::new),
            },
            parent,
            name: self.name,
            profiles: self.profiles,
        })
    }
}
