//! Trigger policy of the sample pipelines

use crate::helpers::*;
use pipeforge::core::config::PipelineConfig;
use pipeforge::core::{Trigger, TriggerEvent};

fn pull_request(branch: &str) -> TriggerEvent {
    TriggerEvent::PullRequest {
        target_branch: branch.to_string(),
    }
}

#[test]
fn test_pr_gate_fires_for_protected_branches() {
    let policy = load("pr-gate.yml").definition().unwrap().trigger;

    assert!(policy.fires(&pull_request("main")));
    assert!(policy.fires(&pull_request("refs/heads/main")));
    assert!(policy.fires(&pull_request("release/1.4")));
    assert!(!policy.fires(&pull_request("feature/faster-matrix")));
    assert!(!policy.fires(&TriggerEvent::Schedule {
        branch: "main".to_string()
    }));
}

#[test]
fn test_nightly_first_satisfied_trigger_wins() {
    let policy = load("nightly.yml").definition().unwrap().trigger;

    let scheduled = policy
        .matching(&TriggerEvent::Schedule {
            branch: "main".to_string(),
        })
        .unwrap();
    assert_eq!(scheduled.kind(), "schedule");
    assert!(policy
        .matching(&TriggerEvent::Schedule {
            branch: "develop".to_string()
        })
        .is_none());

    let manual = policy.matching(&TriggerEvent::Manual).unwrap();
    assert_eq!(manual, &Trigger::Manual { required: Vec::new() });
}

#[test]
fn test_release_is_manual_only() {
    let policy = load("release.yml").definition().unwrap().trigger;

    assert!(policy.fires(&TriggerEvent::Manual));
    assert!(!policy.fires(&pull_request("main")));
    assert_eq!(policy.required_parameters(), vec!["devVersion"]);
}

#[test]
fn test_manual_invocation_always_fires() {
    let policy = load("pr-gate.yml").definition().unwrap().trigger;
    assert!(policy.matching(&TriggerEvent::Manual).is_none());
    assert!(policy.fires(&TriggerEvent::Manual));
}

#[test]
fn test_malformed_cron_rejected_at_load() {
    let yaml = r#"
name: broken-schedule
trigger:
  - schedule: { cron: "0 3 * *" }
job_templates:
  noop:
    steps:
      - { kind: script, label: noop }
stages:
  - name: Only
    jobs: [{ template: noop }]
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("cron"), "{}", err);
}
