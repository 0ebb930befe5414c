//! ProjectGraph loading, evaluation and closure tests
//!
//! Each test writes a small descriptor tree into a temporary directory:
//!
//! ```text
//! pom.xml                      io.acme:acme-root (parent io.foundation:foundation-parent, external)
//! bom/pom.xml                  io.acme:acme-bom
//! extensions/pom.xml           io.acme:acme-extensions (imports acme-bom)
//! extensions/ext-a/pom.xml     io.acme:ext-a
//! extensions/ext-a-deployment  io.acme:ext-a-deployment -> ext-a
//! extensions/ext-b/pom.xml     io.acme:ext-b -> io.foundation:found-x
//! extensions/ext-b-deployment  io.acme:ext-b-deployment -> ext-b
//! tests/it-ext-a/pom.xml       io.acme:it-ext-a -> ext-a-deployment, virtual ext-b
//! ```

use pretty_assertions::assert_eq;
use prodex_core::{ActiveProfiles, Expression, Ga};
use prodex_tree::{ProjectGraph, TreeError};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let file = root.join(path);
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, content).unwrap();
}

fn module(artifact: &str, parent: &str, body: &str) -> String {
    format!(
        r#"<project>
    <parent>
        <groupId>io.acme</groupId>
        <artifactId>{parent}</artifactId>
        <version>1.0.0</version>
    </parent>
    <artifactId>{artifact}</artifactId>
{body}
</project>
"#
    )
}

fn dependency(artifact: &str) -> String {
    format!(
        "        <dependency>\n            <groupId>io.acme</groupId>\n            <artifactId>{}</artifactId>\n        </dependency>\n",
        artifact
    )
}

fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "pom.xml",
        r#"<project>
    <parent>
        <groupId>io.foundation</groupId>
        <artifactId>foundation-parent</artifactId>
        <version>4.0.0</version>
        <relativePath/>
    </parent>
    <groupId>io.acme</groupId>
    <artifactId>acme-root</artifactId>
    <version>1.0.0</version>
    <properties>
        <product.version>${project.version}</product.version>
        <foundation.version>4.0.0</foundation.version>
        <greeting>hello-${self.artifactId}</greeting>
    </properties>
    <modules>
        <module>bom</module>
        <module>extensions</module>
        <module>tests</module>
    </modules>
    <profiles>
        <profile>
            <id>native</id>
            <properties>
                <foundation.version>4.0.0-native</foundation.version>
            </properties>
        </profile>
    </profiles>
</project>
"#,
    );
    write(root, "bom/pom.xml", &module("acme-bom", "acme-root", ""));
    write(
        root,
        "extensions/pom.xml",
        &module(
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
    </dependencyManagement>"#,
        ),
    );
    write(
        root,
        "extensions/ext-a/pom.xml",
        &module("ext-a", "acme-extensions", ""),
    );
    write(
        root,
        "extensions/ext-a-deployment/pom.xml",
        &module(
            "ext-a-deployment",
            "acme-extensions",
            &format!("    <dependencies>\n{}    </dependencies>", dependency("ext-a")),
        ),
    );
    write(
        root,
        "extensions/ext-b/pom.xml",
        &module(
            "ext-b",
            "acme-extensions",
            r#"    <dependencies>
        <dependency>
            <groupId>io.foundation</groupId>
            <artifactId>found-x</artifactId>
        </dependency>
    </dependencies>"#,
        ),
    );
    write(
        root,
        "extensions/ext-b-deployment/pom.xml",
        &module(
            "ext-b-deployment",
            "acme-extensions",
            &format!("    <dependencies>\n{}    </dependencies>", dependency("ext-b")),
        ),
    );
    write(
        root,
        "tests/pom.xml",
        &module(
            "acme-tests",
            "acme-root",
            "    <modules>\n        <module>it-ext-a</module>\n    </modules>",
        ),
    );
    write(
        root,
        "tests/it-ext-a/pom.xml",
        &module(
            "it-ext-a",
            "acme-tests",
            r#"    <dependencies>
        <dependency>
            <groupId>io.acme</groupId>
            <artifactId>ext-a-deployment</artifactId>
        </dependency>
        <dependency>
            <groupId>io.acme</groupId>
            <artifactId>ext-b</artifactId>
            <type>pom</type>
            <scope>test</scope>
            <exclusions>
                <exclusion>
                    <groupId>*</groupId>
                    <artifactId>*</artifactId>
                </exclusion>
            </exclusions>
        </dependency>
    </dependencies>"#,
        ),
    );
    dir
}

fn ga(artifact: &str) -> Ga {
    Ga::new("io.acme", artifact)
}

fn gas(artifacts: &[&str]) -> BTreeSet<Ga> {
    artifacts.iter().map(|a| ga(a)).collect()
}

#[test]
fn loads_all_modules_with_inherited_group() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();

    let root = graph.root().unwrap();
    assert_eq!(root.ga, ga("acme-root"));
    assert_eq!(root.parent_path, None);

    let ext_a = graph.module(&ga("ext-a")).unwrap();
    assert_eq!(ext_a.path, "extensions/ext-a/pom.xml");
    assert_eq!(ext_a.parent_path.as_deref(), Some("extensions/pom.xml"));
    assert_eq!(graph.modules().count(), 9);

    let aggregator = graph.aggregator_of(ext_a).unwrap();
    assert_eq!(aggregator.ga, ga("acme-extensions"));
}

#[test]
fn extensions_have_deployment_siblings() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    assert_eq!(graph.extensions(), gas(&["ext-a", "ext-b"]));
}

#[test]
fn evaluates_builtins_properties_and_parents() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let ext_a = graph.module(&ga("ext-a")).unwrap();

    let eval = |raw: &str| graph.evaluate(&Expression::new(raw), ext_a).unwrap();
    assert_eq!(eval("${self.version}"), "1.0.0");
    assert_eq!(eval("${project.groupId}"), "io.acme");
    assert_eq!(eval("${parent.version}"), "1.0.0");
    assert_eq!(eval("${product.version}"), "1.0.0");
    assert_eq!(eval("${foundation.version}"), "4.0.0");
    // Inherited properties see the inheriting module
    assert_eq!(eval("${greeting}"), "hello-ext-a");
    assert_eq!(eval("constant"), "constant");
}

#[test]
fn active_profile_properties_override_the_body() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::of(["native"])).unwrap();
    let root = graph.root().unwrap();
    assert_eq!(
        graph
            .evaluate(&Expression::new("${foundation.version}"), root)
            .unwrap(),
        "4.0.0-native"
    );
}

#[test]
fn unresolved_expression_names_module() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let ext_a = graph.module(&ga("ext-a")).unwrap();
    let err = graph
        .evaluate(&Expression::new("${nowhere}"), ext_a)
        .unwrap_err();
    match err {
        TreeError::UnresolvedExpression {
            expression, module, ..
        } => {
            assert_eq!(expression, "${nowhere}");
            assert_eq!(module, "extensions/ext-a/pom.xml");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn property_cycles_are_detected() {
    let dir = fixture();
    write(
        dir.path(),
        "bom/pom.xml",
        &module(
            "acme-bom",
            "acme-root",
            "    <properties>\n        <a>${b}</a>\n        <b>${a}</b>\n    </properties>",
        ),
    );
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let bom = graph.module(&ga("acme-bom")).unwrap();
    assert!(matches!(
        graph.evaluate(&Expression::new("${a}"), bom),
        Err(TreeError::UnresolvedExpression { .. })
    ));
}

#[test]
fn required_modules_follow_parents_dependencies_and_imports() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let required = graph
        .required_modules(&gas(&["ext-a", "ext-a-deployment"]))
        .unwrap();
    assert_eq!(
        required,
        gas(&[
            "acme-bom",
            "acme-extensions",
            "acme-root",
            "ext-a",
            "ext-a-deployment"
        ])
    );
}

#[test]
fn required_modules_skip_virtual_dependencies() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let required = graph.required_modules(&gas(&["it-ext-a"])).unwrap();
    assert!(required.contains(&ga("ext-a")));
    assert!(required.contains(&ga("acme-tests")));
    assert!(!required.contains(&ga("ext-b")));
}

#[test]
fn transitive_dependencies_include_external_leaves() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let deps = graph
        .transitive_dependencies(&ga("ext-b-deployment"))
        .unwrap();
    let expected: BTreeSet<Ga> = [ga("ext-b"), Ga::new("io.foundation", "found-x")]
        .into_iter()
        .collect();
    assert_eq!(deps, expected);

    let test_deps = graph.transitive_dependencies(&ga("it-ext-a")).unwrap();
    assert_eq!(test_deps, gas(&["ext-a", "ext-a-deployment"]));
}

#[test]
fn missing_child_descriptor_is_reported() {
    let dir = fixture();
    fs::remove_file(dir.path().join("extensions/ext-b/pom.xml")).unwrap();
    let err = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap_err();
    match err {
        TreeError::MissingDescriptor {
            path,
            module,
            referenced_by,
        } => {
            assert_eq!(path, "extensions/ext-b/pom.xml");
            assert_eq!(module, "ext-b");
            assert_eq!(referenced_by, "extensions/pom.xml");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_coordinates_are_rejected() {
    let dir = fixture();
    write(
        dir.path(),
        "bom/pom.xml",
        &module("ext-a", "acme-root", ""),
    );
    let err = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap_err();
    assert!(matches!(err, TreeError::DuplicateModule { .. }));
}

#[test]
fn explicit_relative_path_must_match_parent() {
    let dir = fixture();
    write(
        dir.path(),
        "bom/pom.xml",
        r#"<project>
    <parent>
        <groupId>io.acme</groupId>
        <artifactId>acme-root</artifactId>
        <version>1.0.0</version>
        <relativePath>../extensions/pom.xml</relativePath>
    </parent>
    <artifactId>acme-bom</artifactId>
</project>
"#,
    );
    let err = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap_err();
    assert!(matches!(err, TreeError::ParentNotFound { .. }));
}

#[test]
fn default_relative_path_falls_back_to_coordinate() {
    let dir = fixture();
    // Parent is the root, but ../pom.xml is the tests aggregator
    write(
        dir.path(),
        "tests/it-ext-a/pom.xml",
        &module("it-ext-a", "acme-root", ""),
    );
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let test = graph.module(&ga("it-ext-a")).unwrap();
    assert_eq!(test.parent_path.as_deref(), Some("pom.xml"));
    assert_eq!(graph.parent_of(test).unwrap().ga, ga("acme-root"));
}

#[test]
fn child_modules_resolve_references() {
    let dir = fixture();
    let graph = ProjectGraph::load(dir.path(), ActiveProfiles::none()).unwrap();
    let root = graph.root().unwrap();
    let children: Vec<(&str, Ga)> = graph
        .child_modules(root)
        .into_iter()
        .map(|(name, m)| (name, m.ga.clone()))
        .collect();
    assert_eq!(
        children,
        vec![
            ("bom", ga("acme-bom")),
            ("extensions", ga("acme-extensions")),
            ("tests", ga("acme-tests")),
        ]
    );
}
