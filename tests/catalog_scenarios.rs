mod common;

use common::{canonical_root, recording_engine, CallLog, RecordingCommands};
use envflow::{CatalogConfig, StepError, StepKind, UpdateState, WorkflowCatalog};

#[tokio::test]
async fn test_install_runs_every_step_and_links() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_root(&dir);
    let log = CallLog::default();
    let engine = recording_engine(&root, RecordingCommands::new(log.clone()), &log);

    let install = WorkflowCatalog::new(&root, CatalogConfig::default()).install();
    engine.run(&install).await.unwrap();

    let calls = log.calls();
    let kinds: Vec<_> = calls.iter().map(|c| (c.index, c.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (0, StepKind::RunCommand),
            (1, StepKind::RunCommand),
            (2, StepKind::RunCommand),
            (3, StepKind::StartSubWorkflow),
        ]
    );
    assert!(calls[0].commands[1].starts_with("git clone "));
    assert_eq!(calls[1].cwd.as_deref(), Some(root.join("stable-audio-tools").as_path()));
    assert!(calls[..3]
        .iter()
        .all(|c| c.environment.as_deref() == Some("env")));
    assert_eq!(calls[3].uri.as_deref(), Some("torch.js"));

    // The fifth step is the real link executor.
    assert!(root.join(".links").join("env").exists());
}

#[tokio::test]
async fn test_update_failure_during_rebuild_leaves_env_purged() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_root(&dir);
    std::fs::create_dir_all(root.join("env/bin")).unwrap();
    std::fs::write(root.join("env/bin/old-tool"), "stale").unwrap();
    let log = CallLog::default();
    let engine = recording_engine(
        &root,
        RecordingCommands::failing_on(log.clone(), "pip install ."),
        &log,
    );

    let update = WorkflowCatalog::new(&root, CatalogConfig::default()).update();
    let outcome = engine.run(&update).await;

    let failure = outcome.as_ref().unwrap_err();
    assert_eq!(failure.index, 3);
    assert!(matches!(failure.source, StepError::CommandFailed { .. }));
    assert_eq!(UpdateState::from_outcome(&outcome), UpdateState::EnvPurged);

    // Steps 0, 1 and 3 reached the command executor; 4..=6 never ran.
    assert_eq!(log.indices(), vec![0, 1, 3]);
    assert!(!root.join(".links").join("env").exists());
    // The rebuild step recreates an empty environment before its command
    // fails; the old contents are gone.
    assert!(!root.join("env/bin/old-tool").exists());
}

#[tokio::test]
async fn test_update_success_reaches_linked() {
    let dir = tempfile::tempdir().unwrap();
    let root = canonical_root(&dir);
    let log = CallLog::default();
    let engine = recording_engine(&root, RecordingCommands::new(log.clone()), &log);

    let update = WorkflowCatalog::new(&root, CatalogConfig::default()).update();
    let outcome = engine.run(&update).await;

    assert!(outcome.is_ok());
    assert_eq!(UpdateState::from_outcome(&outcome), UpdateState::Linked);
    assert_eq!(log.indices(), vec![0, 1, 3, 4, 5]);
    assert!(root.join(".links").join("env").exists());
}
