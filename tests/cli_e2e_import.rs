//! End-to-end tests for the `import` command.
//!
//! These tests invoke the actual CLI binary against a repository laid out
//! in a temporary directory.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;

#[test]
fn test_import_file_with_explicit_name() {
    let temp = assert_fs::TempDir::new().unwrap();
    let repo = temp.child("repo");
    repo.child("import").create_dir_all().unwrap();
    let source = temp.child("doc.xml");
    source.write_str("<doc>hello</doc>").unwrap();

    cargo_bin_cmd!("cms-transform")
        .arg("--color")
        .arg("never")
        .arg("import")
        .arg("--repo")
        .arg(repo.path())
        .arg("--target")
        .arg("/import")
        .arg("--file")
        .arg(source.path())
        .arg("--pathext")
        .arg("xml")
        .arg("--pathnamebase")
        .arg("hello")
        .arg("--property")
        .arg("cms:status=In_Work")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Imported in revision 1"))
        .stdout(predicate::str::contains("/import/hello.xml"));

    repo.child("import/hello.xml").assert("<doc>hello</doc>");
    repo.child("import/.cms-properties.yaml")
        .assert(predicate::str::contains("In_Work"));
}

#[test]
fn test_import_into_generating_folder() {
    let temp = assert_fs::TempDir::new().unwrap();
    let repo = temp.child("repo");
    repo.child("shard/.cms-naming.yaml")
        .write_str("shard_parent: true\npattern: \"DOC-####\"\n")
        .unwrap();
    repo.child("shard/DOC-0041.xml").write_str("<doc/>").unwrap();
    let source = temp.child("doc.xml");
    source.write_str("<doc>next</doc>").unwrap();

    cargo_bin_cmd!("cms-transform")
        .args(["--color", "never", "import", "--target", "/shard", "--pathext", "xml"])
        .arg("--repo")
        .arg(repo.path())
        .arg("--file")
        .arg(source.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("/shard/DOC-0042.xml"));

    repo.child("shard/DOC-0042.xml").assert("<doc>next</doc>");
}

#[test]
fn test_import_refuses_existing_item() {
    let temp = assert_fs::TempDir::new().unwrap();
    let repo = temp.child("repo");
    repo.child("import/hello.xml").write_str("<old/>").unwrap();
    let source = temp.child("doc.xml");
    source.write_str("<new/>").unwrap();

    cargo_bin_cmd!("cms-transform")
        .args(["--color", "never", "import", "--target", "/import", "--pathext", "xml"])
        .args(["--pathnamebase", "hello"])
        .arg("--repo")
        .arg(repo.path())
        .arg("--file")
        .arg(source.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("[ERR] Import failed"));

    repo.child("import/hello.xml").assert("<old/>");
}

#[test]
fn test_import_requires_url_or_file() {
    let temp = assert_fs::TempDir::new().unwrap();

    cargo_bin_cmd!("cms-transform")
        .args(["import", "--target", "/import", "--pathext", "xml"])
        .arg("--repo")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_import_missing_repository_directory() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("doc.xml");
    source.write_str("<doc/>").unwrap();

    cargo_bin_cmd!("cms-transform")
        .args(["import", "--target", "/import", "--pathext", "xml", "--pathnamebase", "d"])
        .arg("--repo")
        .arg(temp.child("missing").path())
        .arg("--file")
        .arg(source.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load repository"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_import_from_url() {
    let temp = assert_fs::TempDir::new().unwrap();
    let repo = temp.child("repo");
    repo.child("import").create_dir_all().unwrap();

    cargo_bin_cmd!("cms-transform")
        .args(["--color", "never", "import", "--target", "/import", "--pathext", "html"])
        .args(["--pathnamebase", "example", "--url", "https://example.com/"])
        .arg("--repo")
        .arg(repo.path())
        .assert()
        .success();

    repo.child("import/example.html")
        .assert(predicate::str::contains("Example Domain"));
}
