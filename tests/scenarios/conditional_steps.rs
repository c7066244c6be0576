//! Conditional inclusion of steps and variables, and the test-run-type guard

use crate::helpers::*;
use pipeforge::core::config::PipelineConfig;
use pipeforge::core::{ExpansionError, ParameterLayer, RunState, StepKind};

#[test]
fn test_pr_gate_steps_for_default_installation() {
    let pipeline = expand("pr-gate.yml", &[]);
    assert_eq!(
        step_labels(&pipeline.stages[0], "TestLinuxUnit3.8"),
        vec![
            "Use Python 3.8",
            "Install requirements",
            "Unit tests",
            "Publish test results",
        ]
    );
}

#[test]
fn test_pinning_and_local_install_activate_steps() {
    let pipeline = expand("nightly.yml", &[]);
    assert_eq!(
        step_labels(pipeline.stage("Unit").unwrap(), "TestWindowsUnit3.10"),
        vec![
            "Use Python 3.10",
            "Install requirements",
            "Install package from source",
            "Unit tests",
            "Publish test results",
            "Freeze requirements",
            "Publish frozen requirements",
        ]
    );

    let notebooks = pipeline.stage("Notebooks").unwrap();
    assert_eq!(job_names(notebooks), vec!["TestLinuxNotebooks3.10"]);
    let labels = step_labels(notebooks, "TestLinuxNotebooks3.10");
    assert!(labels.contains(&"Notebook tests"));
    assert!(!labels.contains(&"Unit tests"));
    assert!(!notebooks.fail_fast);
}

#[test]
fn test_invocation_toggles_pinned_requirements() {
    let plain = expand("pr-gate.yml", &[]);
    let pinned = expand("pr-gate.yml", &[("pinRequirements", "true")]);

    let plain_steps = &plain.stages[0].jobs[0].steps;
    let pinned_steps = &pinned.stages[0].jobs[0].steps;
    assert_eq!(pinned_steps.len(), plain_steps.len() + 2);
    assert_eq!(pinned_steps[..plain_steps.len()], plain_steps[..]);
}

const SINGLE_CONDITION: &str = r#"
name: single-condition
parameters:
  runLint: true
job_templates:
  lint:
    name: Lint
    parameters:
      platform: Linux
    steps:
      - { kind: script, label: Checkout }
      - { kind: script, label: Lint, when: runLint }
      - { kind: script, label: Report }
stages:
  - name: Validate
    jobs:
      - template: lint
"#;

#[test]
fn test_false_condition_removes_exactly_that_step() {
    let config = PipelineConfig::from_yaml(SINGLE_CONDITION).unwrap();

    let enabled = config.expand(&ParameterLayer::new()).unwrap();
    let disabled = config.expand(&params(&[("runLint", "false")])).unwrap();

    assert_eq!(step_labels(&enabled.stages[0], "LintLinux"), vec!["Checkout", "Lint", "Report"]);
    assert_eq!(step_labels(&disabled.stages[0], "LintLinux"), vec!["Checkout", "Report"]);
}

#[test]
fn test_bogus_test_run_type_becomes_guard_step() {
    let pipeline = expand("pr-gate.yml", &[("testRunType", "Bogus")]);

    for job in &pipeline.stages[0].jobs {
        assert!(job.name.starts_with("Test"), "{}", job.name);
        assert!(job.name.contains("Bogus"), "{}", job.name);
        assert_eq!(job.steps[0].kind, StepKind::Fail);
        assert!(job.steps[0].args["message"].contains("Bogus"));
        assert!(job.steps.iter().all(|s| s.label != "Unit tests" && s.label != "Notebook tests"));
    }
}

#[tokio::test]
async fn test_guarded_job_fails_at_run_time() {
    let pipeline = expand("pr-gate.yml", &[("testRunType", "Bogus")]);
    let result = dry_run(&pipeline, &[]).await;

    assert!(matches!(result.run.state, RunState::Failed { stage: 0, job: Some(_) }));
}

#[test]
fn test_upload_url_follows_stage_target() {
    let pipeline = expand("release.yml", &[("devVersion", "1.4.0.dev12")]);

    let candidate = pipeline.stage("ReleaseCandidate").unwrap().job("PackageLinux").unwrap();
    let upload = candidate.steps.last().unwrap();
    assert_eq!(upload.label, "Upload to Test index");
    assert_eq!(upload.args["repositoryUrl"], "https://test.pypi.org/legacy/");
    assert_eq!(
        candidate.parameters.render("pypiUrl").as_deref(),
        Some("https://test.pypi.org/legacy/")
    );

    let release = pipeline.stage("Release").unwrap().job("PackageLinux").unwrap();
    let upload = release.steps.last().unwrap();
    assert_eq!(upload.args["repositoryUrl"], "https://upload.pypi.org/legacy/");
    assert!(release.steps.iter().all(|s| s.label != "Publish version"));
    assert_eq!(release.steps.len(), candidate.steps.len() - 1);
}

#[test]
fn test_release_candidate_tests_install_from_index() {
    let pipeline = expand("release.yml", &[("devVersion", "1.4.0.dev12")]);
    let stage = pipeline.stage("TestReleaseCandidate").unwrap();
    let labels = step_labels(stage, "TestLinuxUnit3.8");
    assert!(labels.contains(&"Download version"));
    assert!(labels.contains(&"Install package from the staging index"));
    assert!(!labels.contains(&"Install package from source"));

    let job = stage.job("TestLinuxUnit3.8").unwrap();
    let install = job.steps.iter().find(|s| s.consumes == vec!["version"]).unwrap();
    assert!(install.args["script"].ends_with("mypkg==$(cat version.txt)"));
}

#[test]
fn test_target_type_outside_domain_aborts_expansion() {
    let config = load("release.yml");
    let mut definition = config.definition().unwrap();
    definition.stages[1]
        .parameters
        .insert("targetType".to_string(), "Staging".into());

    let err = definition.expand(&params(&[("devVersion", "1")])).unwrap_err();
    assert!(matches!(
        err,
        ExpansionError::InvalidParameterValue { ref name, ref value, .. }
            if name == "targetType" && value == "Staging"
    ));
}
