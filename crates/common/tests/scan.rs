//! Scanner behavior against real directory trees

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use testdeck_common::{scan, TestScanner, TestType};

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "test('x', () => {});\n").unwrap();
}

#[test]
fn classifies_e2e_and_unit_suites() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "e2e/login.spec.js");
    touch(&root, "unit/math.test.js");

    let tests = scan(&root);
    assert_eq!(tests.len(), 2);

    let login = tests.iter().find(|t| t.path == "e2e/login.spec.js").unwrap();
    assert_eq!(login.test_type, TestType::E2e);
    assert_eq!(login.category, "e2e");
    assert_eq!(login.id, "e2e-login.spec");

    let math = tests.iter().find(|t| t.path == "unit/math.test.js").unwrap();
    assert_eq!(math.test_type, TestType::Unit);
    assert_eq!(math.category, "unit");
}

#[test]
fn never_descends_into_excluded_dirs() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "node_modules/pkg/fake.test.js");
    touch(&root, ".git/hooks/pre.test.js");
    touch(&root, "coverage/lcov.spec.js");
    touch(&root, "ui/__snapshots__/button.test.js");
    touch(&root, ".next/cache.spec.ts");
    touch(&root, ".vscode/debug.test.js");

    assert!(scan(&root).is_empty());
}

#[test]
fn missing_root_is_empty() {
    let tmp = TempDir::new().unwrap();
    assert!(scan(&tmp.path().join("absent")).is_empty());
}

#[test]
fn ignores_non_test_files() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "helpers/setup.js");
    touch(&root, "README.md");
    touch(&root, "smoke/home.spec.ts");

    let tests = scan(&root);
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].test_type, TestType::Smoke);
}

#[test]
fn root_files_land_in_other_category() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "checkout.test.js");

    let tests = scan(&root);
    assert_eq!(tests[0].category, "other");
    assert_eq!(tests[0].test_type, TestType::Other);
}

#[test]
fn root_directory_name_supplies_fallback_type() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("performance");
    touch(&root, "checkout.test.js");
    touch(&root, "smoke/home.test.js");

    let tests = scan(&root);
    let checkout = tests.iter().find(|t| t.path == "checkout.test.js").unwrap();
    assert_eq!(checkout.test_type, TestType::Performance);
    let home = tests.iter().find(|t| t.path == "smoke/home.test.js").unwrap();
    assert_eq!(home.test_type, TestType::Smoke);
}

#[test]
fn rescans_are_identical() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "visual/home.spec.js");
    touch(&root, "a11y/menu.spec.js");
    touch(&root, "api/integration/orders.test.ts");

    let first = scan(&root);
    let second = scan(&root);
    let key = |t: &testdeck_common::TestDescriptor| (t.id.clone(), t.test_type, t.category.clone(), t.path.clone());
    assert_eq!(
        first.iter().map(key).collect::<Vec<_>>(),
        second.iter().map(key).collect::<Vec<_>>()
    );
}

#[test]
fn ids_are_unique_when_paths_collide() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "a-b/c.test.js");
    touch(&root, "a/b-c.test.js");

    let tests = scan(&root);
    assert_eq!(tests.len(), 2);
    assert_ne!(tests[0].id, tests[1].id);
}

#[test]
fn custom_exclusions_apply() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "fixtures/data.test.js");
    touch(&root, "unit/a.test.js");

    let tests = TestScanner::new().exclude("fixtures").scan(&root);
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].path, "unit/a.test.js");
}

#[test]
fn extra_suffixes_are_matched() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("performance");
    touch(&root, "k6/checkout.k6.js");
    touch(&root, "lighthouse.test.js");
    touch(&root, "k6/helpers.js");

    let tests = TestScanner::new().also_match(".k6.js").scan(&root);
    let paths: Vec<_> = tests.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(paths, vec!["k6/checkout.k6.js", "lighthouse.test.js"]);
    assert!(tests.iter().all(|t| t.test_type == TestType::Performance));
    assert_eq!(tests[0].name, "Checkout K6");
}

#[cfg(unix)]
#[test]
fn unreadable_subtree_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tests");
    touch(&root, "locked/secret.test.js");
    touch(&root, "unit/open.test.js");

    let locked = root.join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let tests = scan(&root);
    // Restore so TempDir can clean up.
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(tests.iter().any(|t| t.path == "unit/open.test.js"));
}
