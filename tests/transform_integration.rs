//! Integration tests for the transform flow.
//!
//! These run the transform orchestrator and the item change listener
//! against the in-memory repository, with the real XML classifier.

mod common;

use std::sync::Arc;

use cms_transform::classify::XmlClassifier;
use cms_transform::error::ErrorKind;
use cms_transform::event::{ChangeOutcome, ItemChangedListener, TRANSFORM_PATHS_PROPERTY};
use cms_transform::flows::{TRANSFORM_BASE_PROPERTY, TRANSFORM_NAME_PROPERTY, TransformOrchestrator};
use cms_transform::item::{ItemPath, Revision};
use cms_transform::repository::ItemLookup;
use common::prelude::*;

fn orchestrator(f: &RepoFixture, engine: WrapEngine) -> Arc<TransformOrchestrator> {
    Arc::new(TransformOrchestrator::new(
        f.repo.clone(),
        f.repo.clone(),
        Arc::new(XmlClassifier::new(f.repo.clone())),
        Arc::new(engine),
    ))
}

#[test]
fn test_folder_transform_commits_eligible_files_once() {
    let f = RepoFixture::demo();
    let engine = WrapEngine::new(f.repo.clone());
    let calls = engine.calls.clone();
    let config = xsl_config(
        "wrap",
        &[("stylesheet", "/xsl/wrap.xsl"), ("output", "/out"), ("comment", "Folder transform")],
    );

    let outcome = orchestrator(&f, engine)
        .transform(&f.id("/doc"), &config)
        .unwrap();

    assert_eq!(outcome.revision, Some(Revision(1)));
    assert_eq!(f.text("/out/a.xml"), "<out><doc>a</doc></out>");
    assert_eq!(f.text("/out/b.xml"), "<out><doc>b</doc></out>");
    assert!(!f.repo.exists("/out/notes.txt").unwrap());
    assert_eq!(calls.lock().unwrap().len(), 2);

    let history = f.repo.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "Folder transform");
    assert_eq!(history[0].paths.len(), 2);

    let props = f.repo.properties("/out/a.xml").unwrap().unwrap();
    assert_eq!(props.get(TRANSFORM_NAME_PROPERTY).map(String::as_str), Some("wrap"));
    assert_eq!(
        props.get(TRANSFORM_BASE_PROPERTY).map(String::as_str),
        Some("x-svn:///svn/demo1^/doc/a.xml")
    );
    for id in &outcome.items {
        assert_eq!(id.peg(), Some(Revision(1)));
    }
}

#[test]
fn test_secondary_documents_land_below_output_folder() {
    let f = RepoFixture::demo();
    let config = xsl_config(
        "split",
        &[
            ("stylesheet", "wrap.xsl"),
            ("output", "/out"),
            ("split", "parts/p%201.xml, parts/p2.xml"),
            ("message", "Split into parts"),
        ],
    );

    let outcome = orchestrator(&f, WrapEngine::new(f.repo.clone()))
        .transform(&f.id("/doc/a.xml"), &config)
        .unwrap();

    assert_eq!(outcome.items.len(), 3);
    assert!(f.repo.exists("/out/parts/p 1.xml").unwrap());
    assert!(f.repo.exists("/out/parts/p2.xml").unwrap());
    assert_eq!(f.repo.history().unwrap()[0].message, "Split into parts");
}

#[test]
fn test_rerun_without_overwrite_conflicts_and_leaves_no_locks() {
    let f = RepoFixture::demo();
    let config = xsl_config("wrap", &[("stylesheet", "wrap.xsl"), ("output", "/out")]);
    let orchestrator = orchestrator(&f, WrapEngine::new(f.repo.clone()));
    orchestrator.transform(&f.id("/doc"), &config).unwrap();

    let err = orchestrator.transform(&f.id("/doc"), &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(f.repo.held_locks().unwrap().is_empty());
    assert_eq!(f.repo.youngest().unwrap(), Revision(1));
}

#[test]
fn test_rerun_with_overwrite_modifies_under_lock() {
    let f = RepoFixture::demo();
    let orchestrator = orchestrator(&f, WrapEngine::new(f.repo.clone()));
    let first = xsl_config("wrap", &[("stylesheet", "wrap.xsl"), ("output", "/out")]);
    orchestrator.transform(&f.id("/doc/a.xml"), &first).unwrap();

    f.repo.add_file("/doc/a.xml", b"<doc>changed</doc>").unwrap();
    let second = xsl_config(
        "wrap",
        &[("stylesheet", "wrap.xsl"), ("output", "/out"), ("overwrite", "true")],
    );
    let outcome = orchestrator.transform(&f.id("/doc/a.xml"), &second).unwrap();

    assert_eq!(outcome.revision, Some(Revision(2)));
    assert_eq!(f.text("/out/a.xml"), "<out><doc>changed</doc></out>");
    assert!(f.repo.held_locks().unwrap().is_empty());
}

#[test]
fn test_engine_failure_commits_nothing() {
    let f = RepoFixture::demo();
    let engine = WrapEngine::new(f.repo.clone()).failing_on("b.xml");
    let config = xsl_config("wrap", &[("stylesheet", "wrap.xsl"), ("output", "/out")]);

    let err = orchestrator(&f, engine)
        .transform(&f.id("/doc"), &config)
        .unwrap_err();

    assert!(err.to_string().contains("terminated by stylesheet"));
    assert!(!f.repo.exists("/out/a.xml").unwrap());
    assert_eq!(f.repo.youngest().unwrap(), Revision(0));
}

#[test]
fn test_missing_output_folder_is_rejected_before_engine_runs() {
    let f = RepoFixture::demo();
    let engine = WrapEngine::new(f.repo.clone());
    let calls = engine.calls.clone();
    let config = xsl_config("wrap", &[("stylesheet", "wrap.xsl"), ("output", "/missing")]);

    let err = orchestrator(&f, engine)
        .transform(&f.id("/doc/a.xml"), &config)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.to_string().contains("/missing"));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_item_change_runs_configured_transform_and_skips_its_output() {
    let f = RepoFixture::demo();
    f.repo
        .set_property("/", TRANSFORM_PATHS_PROPERTY, "/doc\n/out")
        .unwrap();
    f.repo
        .set_config(
            "/",
            "cmsconfig-transform:wrap",
            r#"{"active":true,"options":{"type":"xsl","params":{"stylesheet":"wrap.xsl","output":"/out"}}}"#,
        )
        .unwrap();
    let listener = ItemChangedListener::new(
        f.repo.clone(),
        f.repo.clone(),
        orchestrator(&f, WrapEngine::new(f.repo.clone())),
    );

    let mut changed = f.repo.get_item(&f.id("/doc/a.xml")).unwrap();
    changed.id = changed.id.with_peg(Revision(0));
    let ChangeOutcome::Processed(runs) = listener.on_item_change(&changed).unwrap() else {
        panic!("expected the change to be processed");
    };
    assert_eq!(runs.len(), 1);
    let outcome = runs[0].result.as_ref().unwrap();
    assert_eq!(outcome.items.len(), 1);

    // The output is inside the transform paths but carries the transform
    // name, so its own change event is suppressed.
    let output = outcome.items[0].clone();
    assert_eq!(output.path(), &ItemPath::new("/out/a.xml").unwrap());
    let generated = f.repo.get_item(&output).unwrap();
    assert!(matches!(
        listener.on_item_change(&generated).unwrap(),
        ChangeOutcome::GeneratedOutput
    ));
}
