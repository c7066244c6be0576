//! Matrix expansion: job naming, derived names and parallelism bounds

use crate::helpers::*;
use pipeforge::core::config::PipelineConfig;
use pipeforge::core::{ExpansionError, ParameterLayer};

#[test]
fn test_pr_gate_expands_platforms_by_versions() {
    let pipeline = expand("pr-gate.yml", &[]);
    assert_eq!(pipeline.stages.len(), 1);

    let stage = &pipeline.stages[0];
    assert_eq!(
        job_names(stage),
        vec![
            "TestLinuxUnit3.8",
            "TestLinuxUnit3.9",
            "TestLinuxUnit3.10",
            "TestWindowsUnit3.8",
            "TestWindowsUnit3.9",
            "TestWindowsUnit3.10",
            "TestMacOSUnit3.8",
            "TestMacOSUnit3.9",
            "TestMacOSUnit3.10",
        ]
    );

    let job = stage.job("TestWindowsUnit3.9").unwrap();
    assert_eq!(job.pool.as_deref(), Some("windows-latest"));
    assert_eq!(job.display_name.as_deref(), Some("Windows Unit tests"));
    assert_eq!(job.matrix_group, "TestWindowsUnit#1");
    assert_eq!(job.max_parallel, Some(2));
    assert_eq!(job.steps[0].label, "Use Python 3.9");
    assert_eq!(job.steps[1].args["script"], "pip install -r requirements-3.9.txt");
}

#[test]
fn test_axis_value_count_matches_job_count() {
    for versions in ["[3.11]", "[3.8, 3.9]", "[3.7, 3.8, 3.9, 3.10, 3.11]"] {
        let pipeline = expand("pr-gate.yml", &[("pyVersions", versions)]);
        let k = versions.split(',').count();
        assert_eq!(pipeline.total_jobs(), 3 * k, "pyVersions = {}", versions);
    }
}

#[test]
fn test_expansion_is_deterministic() {
    let first = expand("nightly.yml", &[]);
    let second = expand("nightly.yml", &[]);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_nightly_derives_freeze_names() {
    let pipeline = expand("nightly.yml", &[]);
    let job = pipeline.stage("Unit").unwrap().job("TestLinuxUnit3.8").unwrap();

    assert_eq!(job.derived.freeze_artifact.as_deref(), Some("freezeLinuxUnit3.8"));
    assert_eq!(
        job.derived.freeze_file.as_deref(),
        Some("requirements-freeze-LinuxUnit3.8.txt")
    );
    assert_eq!(job.derived.requirements_file.as_deref(), Some("requirements-3.8.txt"));

    let publish = job.steps.last().unwrap();
    assert_eq!(publish.label, "Publish frozen requirements");
    assert_eq!(publish.consumes, vec!["freezeLinuxUnit3.8"]);
    assert_eq!(publish.args["path"], "requirements-freeze-LinuxUnit3.8.txt");
}

#[test]
fn test_jobs_own_their_bindings() {
    let pipeline = expand("pr-gate.yml", &[]);
    let stage = &pipeline.stages[0];
    let linux = stage.job("TestLinuxUnit3.8").unwrap();
    let windows = stage.job("TestWindowsUnit3.8").unwrap();

    assert_eq!(linux.parameters.render("platform").as_deref(), Some("Linux"));
    assert_eq!(windows.parameters.render("platform").as_deref(), Some("Windows"));
    assert_eq!(linux.parameters.render("matrix.pyVersion").as_deref(), Some("3.8"));
    assert_eq!(linux.parameters.render("jobName").as_deref(), Some("TestLinuxUnit3.8"));
}

const SCENARIO_ONE: &str = r#"
name: scenario-one
variables:
  - { name: freezeArtifactStem, value: freeze }
  - { name: freezeFileStem, value: requirements-freeze }
job_templates:
  test:
    name: Test
    parameters:
      platform: Linux
      testRunType: Unit
      pyVersions: ["3.7"]
    matrix: { axis: pyVersion, values: pyVersions }
    steps:
      - kind: script
        label: "Freeze into {{ freezeFile }}"
        produces: ["{{ freezeArtifact }}"]
stages:
  - name: Validate
    jobs:
      - template: test
"#;

#[test]
fn test_scenario_one_single_linux_job() {
    let pipeline = PipelineConfig::from_yaml(SCENARIO_ONE)
        .unwrap()
        .expand(&ParameterLayer::new())
        .unwrap();

    let stage = &pipeline.stages[0];
    assert_eq!(job_names(stage), vec!["TestLinuxUnit3.7"]);
    let job = &stage.jobs[0];
    assert_eq!(job.derived.freeze_artifact.as_deref(), Some("freezeLinuxUnit3.7"));
    assert_eq!(job.steps[0].label, "Freeze into requirements-freeze-LinuxUnit3.7.txt");
    assert_eq!(job.steps[0].produces, vec!["freezeLinuxUnit3.7"]);
}

#[test]
fn test_repeated_reference_collides() {
    let yaml = SCENARIO_ONE.replace(
        "      - template: test\n",
        "      - template: test\n      - template: test\n",
    );
    let err = PipelineConfig::from_yaml(&yaml)
        .unwrap()
        .expand(&ParameterLayer::new())
        .unwrap_err();
    assert_eq!(
        err,
        ExpansionError::DuplicateJobName {
            job: "TestLinuxUnit3.7".to_string(),
            stage: "Validate".to_string(),
        }
    );
}

#[test]
fn test_empty_axis_contributes_no_jobs() {
    let yaml = SCENARIO_ONE.replace(r#"pyVersions: ["3.7"]"#, "pyVersions: []");
    let pipeline = PipelineConfig::from_yaml(&yaml)
        .unwrap()
        .expand(&ParameterLayer::new())
        .unwrap();
    assert_eq!(pipeline.stages.len(), 1);
    assert!(pipeline.stages[0].jobs.is_empty());
}
