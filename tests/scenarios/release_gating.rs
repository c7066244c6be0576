//! Stage chaining and gating: production release only after validation and staging

use crate::helpers::*;
use pipeforge::core::config::PipelineConfig;
use pipeforge::core::{ExecutionStatus, ExpansionError, ParameterLayer, RunState};
use pipeforge::persistence::{InMemoryPersistence, PersistenceBackend, RunSummary};

const RELEASE_STAGES: [&str; 4] = ["Validate", "ReleaseCandidate", "TestReleaseCandidate", "Release"];

#[test]
fn test_release_requires_dev_version_before_any_stage() {
    let err = load("release.yml").expand(&ParameterLayer::new()).unwrap_err();
    assert!(matches!(
        err,
        ExpansionError::UnresolvedParameter { ref name, .. } if name == "devVersion"
    ));
}

#[test]
fn test_release_stages_form_a_linear_chain() {
    let pipeline = expand("release.yml", &[("devVersion", "2.0.0.dev1")]);

    let names: Vec<&str> = pipeline.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, RELEASE_STAGES);
    assert!(pipeline.stages[0].depends_on.is_empty());
    for pair in pipeline.stages.windows(2) {
        assert_eq!(pair[1].depends_on, vec![pair[0].name.clone()]);
    }
    assert!(pipeline.stages.iter().all(|s| s.fail_fast));
    assert_eq!(pipeline.parameters.render("devVersion").as_deref(), Some("2.0.0.dev1"));
}

#[test]
fn test_fan_in_dependency_is_rejected() {
    let yaml = r#"
name: fan-in
job_templates:
  noop:
    steps:
      - { kind: script, label: noop }
stages:
  - name: A
    jobs: [{ template: noop }]
  - name: B
    jobs: [{ template: noop }]
  - name: C
    depends_on: [A]
    jobs: [{ template: noop }]
"#;
    let err = PipelineConfig::from_yaml(yaml)
        .unwrap()
        .expand(&ParameterLayer::new())
        .unwrap_err();
    assert!(matches!(err, ExpansionError::InvalidTemplate(ref msg) if msg.contains("'C'")));
}

#[tokio::test]
async fn test_release_runs_every_stage_in_order() {
    let pipeline = expand("release.yml", &[("devVersion", "2.0.0.dev1")]);
    let result = dry_run(&pipeline, &[]).await;

    assert_eq!(result.run.state, RunState::Succeeded);
    assert_eq!(result.run.completed_stages, 4);
    assert_eq!(result.run.finished_jobs, pipeline.total_jobs());
    assert_eq!(result.started_stages(), RELEASE_STAGES);
    assert!(result.skipped_stages().is_empty());
}

#[tokio::test]
async fn test_failed_candidate_never_reaches_production() {
    let pipeline = expand("release.yml", &[("devVersion", "2.0.0.dev1")]);
    let result = dry_run(&pipeline, &["PackageLinux"]).await;

    assert_eq!(
        result.run.state,
        RunState::Failed {
            stage: 1,
            job: Some("PackageLinux".to_string())
        }
    );
    assert_eq!(result.run.completed_stages, 1);
    assert_eq!(result.started_stages(), ["Validate", "ReleaseCandidate"]);
    assert_eq!(result.skipped_stages(), ["TestReleaseCandidate", "Release"]);

    // PackageLinux also names the production job; it must have started only once
    let started = result.started_jobs();
    assert_eq!(started.iter().filter(|j| **j == "PackageLinux").count(), 1);
    let validate_jobs = pipeline.stages[0].jobs.len();
    assert_eq!(started.len(), validate_jobs + 1);

    let summary = RunSummary::from_run(&pipeline.name, &RELEASE_STAGES.map(String::from), &result.run);
    assert_eq!(summary.status, ExecutionStatus::Failed);
    assert_eq!(summary.failed_stage.as_deref(), Some("ReleaseCandidate"));
    assert_eq!(summary.failed_job.as_deref(), Some("PackageLinux"));

    let store = InMemoryPersistence::new();
    store.save_run(&summary).await.unwrap();
    let history = store.list_runs(Some("release"), 10).await.unwrap();
    assert_eq!(history, vec![summary]);
}

#[tokio::test]
async fn test_validation_failure_gates_everything_after_it() {
    let pipeline = expand("release.yml", &[("devVersion", "2.0.0.dev1")]);
    let result = dry_run(&pipeline, &["TestWindowsUnit3.9"]).await;

    assert!(matches!(result.run.state, RunState::Failed { stage: 0, .. }));
    assert_eq!(result.started_stages(), ["Validate"]);
    assert_eq!(result.skipped_stages().len(), 3);
    assert!(!result.started_jobs().contains(&"PackageLinux"));
}
