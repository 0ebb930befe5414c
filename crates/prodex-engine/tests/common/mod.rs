//! Fixture trees shared by the engine integration tests
//!
//! The base tree:
//!
//! ```text
//! pom.xml                          io.acme:acme-root (parent io.found:found-parent, external)
//! bom/pom.xml                      io.acme:acme-bom
//! extensions/pom.xml               io.acme:acme-extensions (imports acme-bom)
//! extensions/ext-a[-deployment]    io.acme:ext-a, io.acme:ext-a-deployment
//! extensions/ext-b[-deployment]    io.acme:ext-b, io.acme:ext-b-deployment
//! product/pom.xml                  io.acme:acme-product
//! tests/pom.xml                    io.acme:acme-tests
//! Jenkinsfile.product              CI file with empty generated stages
//! ```
//!
//! Tests are added with [`Fixture::add_test`].

#![allow(dead_code)]

use prodex_engine::PlannerConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const MANIFEST_PATH: &str = "product/src/main/resources/product-source.json";
pub const EXT_A_METADATA: &str =
    "extensions/ext-a/src/main/resources/META-INF/extension-metadata.yaml";
pub const EXT_B_METADATA: &str =
    "extensions/ext-b/src/main/resources/META-INF/extension-metadata.yaml";

pub const JENKINSFILE: &str = "pipeline {
    agent any
    stages {
        // %generated-stages-start%
        // %generated-stages-end%
    }
}
";

const ROOT_POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project>
    <modelVersion>4.0.0</modelVersion>
    <parent>
        <groupId>io.found</groupId>
        <artifactId>found-parent</artifactId>
        <version>4.0.0</version>
        <relativePath/>
    </parent>
    <groupId>io.acme</groupId>
    <artifactId>acme-root</artifactId>
    <version>1.0.0</version>
    <packaging>pom</packaging>
    <properties>
        <product.version>${project.version}</product.version>
        <community.version>1.0.0</community.version>
        <foundation.version>4.0.0</foundation.version>
        <foundation-community.version>4.0.0</foundation-community.version>
    </properties>
    <modules>
        <module>bom</module>
        <module>extensions</module>
        <module>product</module>
        <module>tests</module>
    </modules>
</project>
"#;

pub struct Fixture {
    dir: TempDir,
    tests: Vec<String>,
}

impl Fixture {
    /// The base tree with a manifest productizing `ext-a`
    pub fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
            tests: Vec::new(),
        };
        fixture.write("pom.xml", ROOT_POM);
        fixture.write(
            "bom/pom.xml",
            &module_pom(
                "acme-bom",
                "acme-root",
                &format!(
                    "    <dependencyManagement>\n        <dependencies>\n{}{}{}{}        </dependencies>\n    </dependencyManagement>\n",
                    managed("ext-a", "${product.version}"),
                    managed("ext-a-deployment", "${product.version}"),
                    managed("ext-b", "${community.version}"),
                    managed("ext-b-deployment", "${community.version}"),
                ),
            ),
        );
        fixture.write(
            "extensions/pom.xml",
            &module_pom(
                "acme-extensions",
                "acme-root",
                r#"    <modules>
        <module>ext-a</module>
        <module>ext-a-deployment</module>
        <module>ext-b</module>
        <module>ext-b-deployment</module>
    </modules>
    <dependencyManagement>
        <dependencies>
            <dependency>
                <groupId>io.acme</groupId>
                <artifactId>acme-bom</artifactId>
                <version>${product.version}</version>
                <type>pom</type>
                <scope>import</scope>
            </dependency>
        </dependencies>
    </dependencyManagement>
"#,
            ),
        );
        for extension in ["ext-a", "ext-b"] {
            fixture.write(
                &format!("extensions/{}/pom.xml", extension),
                &module_pom(extension, "acme-extensions", ""),
            );
            fixture.write(
                &format!("extensions/{}-deployment/pom.xml", extension),
                &module_pom(
                    &format!("{}-deployment", extension),
                    "acme-extensions",
                    &dependencies(&[("io.acme", extension)]),
                ),
            );
        }
        fixture.write(
            EXT_A_METADATA,
            "name: \"Ext A\"\nmetadata:\n  guide: \"https://community.example.org/latest/user-guide/index.html\"\n",
        );
        fixture.write(
            "product/pom.xml",
            &module_pom("acme-product", "acme-root", "    <modules />\n"),
        );
        fixture.write("Jenkinsfile.product", JENKINSFILE);
        fixture.manifest(
            r#"{
  "guideUrlTemplate": "https://docs.acme.io/${majorVersion}/${artifactIdBase}.html",
  "extensions": {
    "ext-a": { "jvm": "supported", "native": "supported" }
  }
}
"#,
        );
        fixture.write_tests_aggregator();
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> PlannerConfig {
        PlannerConfig::new(self.root())
    }

    pub fn write(&self, path: &str, content: &str) {
        let file = self.root().join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, content).unwrap();
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.root().join(path)).unwrap()
    }

    pub fn manifest(&self, json: &str) {
        self.write(MANIFEST_PATH, json);
    }

    /// Add an integration test under `tests/` depending on the given `io.acme` artifacts
    pub fn add_test(&mut self, artifact: &str, depends_on: &[&str]) {
        let deps: Vec<(&str, &str)> = depends_on.iter().map(|a| ("io.acme", *a)).collect();
        self.write(
            &format!("tests/{}/pom.xml", artifact),
            &module_pom(artifact, "acme-tests", &dependencies(&deps)),
        );
        self.tests.push(artifact.to_string());
        self.tests.sort();
        self.write_tests_aggregator();
    }

    /// Append a managed dependency to the BOM
    pub fn add_managed(&self, group: &str, artifact: &str, version: &str) {
        let end = "        </dependencies>\n    </dependencyManagement>";
        self.replace(
            "bom/pom.xml",
            end,
            &format!("{}{}", managed_entry(group, artifact, version), end),
        );
    }

    /// Replace the first occurrence of `from` in `path`
    pub fn replace(&self, path: &str, from: &str, to: &str) {
        let content = self.read(path);
        assert!(content.contains(from), "{} does not contain {}", path, from);
        self.write(path, &content.replacen(from, to, 1));
    }

    /// Every file outside `target/` directories, by relative path
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        WalkDir::new(self.root())
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != "target")
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let relative = e
                    .path()
                    .strip_prefix(self.root())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                (relative, fs::read_to_string(e.path()).unwrap())
            })
            .collect()
    }

    fn write_tests_aggregator(&self) {
        let modules: String = self
            .tests
            .iter()
            .map(|t| format!("        <module>{}</module>\n", t))
            .collect();
        self.write(
            "tests/pom.xml",
            &module_pom(
                "acme-tests",
                "acme-root",
                &format!("    <modules>\n{}    </modules>\n", modules),
            ),
        );
    }
}

/// A descriptor inheriting group and version from an `io.acme` parent one directory up
pub fn module_pom(artifact: &str, parent: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project>
    <modelVersion>4.0.0</modelVersion>
    <parent>
        <groupId>io.acme</groupId>
        <artifactId>{parent}</artifactId>
        <version>1.0.0</version>
    </parent>
    <artifactId>{artifact}</artifactId>
{body}</project>
"#
    )
}

pub fn dependencies(deps: &[(&str, &str)]) -> String {
    if deps.is_empty() {
        return String::new();
    }
    let entries: String = deps
        .iter()
        .map(|(group, artifact)| {
            format!(
                "        <dependency>\n            <groupId>{}</groupId>\n            <artifactId>{}</artifactId>\n        </dependency>\n",
                group, artifact
            )
        })
        .collect();
    format!("    <dependencies>\n{}    </dependencies>\n", entries)
}

fn managed(artifact: &str, version: &str) -> String {
    managed_entry("io.acme", artifact, version)
}

fn managed_entry(group: &str, artifact: &str, version: &str) -> String {
    format!(
        "            <dependency>\n                <groupId>{}</groupId>\n                <artifactId>{}</artifactId>\n                <version>{}</version>\n            </dependency>\n",
        group, artifact, version
    )
}
