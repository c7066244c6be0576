//! CLI output formatting

use crate::{
    core::{ExecutionStatus, Pipeline, Trigger},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over the jobs of a run
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(template) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(template.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} ({}/{} stages)",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.completed_stages,
        summary.total_stages,
    );
    if let Some(stage) = &summary.failed_stage {
        line.push_str(&format!(" - failed in {}", style(stage).red()));
        if let Some(job) = &summary.failed_job {
            line.push_str(&format!("/{}", style(job).red()));
        }
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_stages,
            total_jobs,
        } => format!(
            "{} Starting pipeline {} ({}) - {} stages, {} jobs",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim(),
            total_stages,
            total_jobs
        ),
        ExecutionEvent::StageStarted { index, stage, jobs } => format!(
            "{} Stage {} {} ({} jobs)",
            INFO,
            style(index + 1).dim(),
            style(stage).bold(),
            jobs
        ),
        ExecutionEvent::JobStarted { job, .. } => format!("{} {}", SPINNER, style(job).cyan()),
        ExecutionEvent::JobCompleted { job, .. } => format!("{} {}", CHECK, style(job).green()),
        ExecutionEvent::JobFailed { job, error, .. } => {
            format!("{} {}: {}", CROSS, style(job).red(), style(error).dim())
        }
        ExecutionEvent::JobCancelled { job, .. } => {
            format!("{} {} {}", WARN, style(job).yellow(), style("(cancelled)").dim())
        }
        ExecutionEvent::StageCompleted { stage, .. } => {
            format!("{} Stage {} {}", CHECK, style(stage).bold(), style("passed").green())
        }
        ExecutionEvent::StageFailed { stage, job, .. } => match job {
            Some(job) => format!(
                "{} Stage {} {} ({})",
                CROSS,
                style(stage).bold(),
                style("failed").red(),
                style(job).red()
            ),
            None => format!("{} Stage {} {}", CROSS, style(stage).bold(), style("failed").red()),
        },
        ExecutionEvent::StageSkipped { stage, .. } => {
            format!("{} Stage {} {}", SKIP, style(stage).dim(), style("skipped").dim())
        }
        ExecutionEvent::PipelineCompleted { run_id, status } => {
            let status_str = match status {
                ExecutionStatus::Succeeded => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => other.to_string(),
            };
            format!("{} Pipeline ({}) {}", INFO, style(short_id(run_id)).dim(), status_str)
        }
    }
}

/// Human-readable plan: stages, their jobs and the steps of each job
pub fn format_plan(pipeline: &Pipeline) -> String {
    let mut out = format!(
        "{} {} ({} stages, {} jobs)\n",
        INFO,
        style(&pipeline.name).bold(),
        pipeline.stages.len(),
        pipeline.total_jobs()
    );
    for stage in &pipeline.stages {
        let gate = match stage.depends_on.first() {
            Some(previous) => format!(" after {}", previous),
            None => String::new(),
        };
        out.push_str(&format!("  {}{}\n", style(&stage.name).bold(), style(gate).dim()));
        for job in &stage.jobs {
            out.push_str(&format!(
                "    {} {}\n",
                style(&job.name).cyan(),
                style(format!("[{}]", job.platform)).dim()
            ));
            for step in &job.steps {
                out.push_str(&format!("      - {:?}: {}\n", step.kind, step.label));
            }
        }
    }
    out
}

/// One line per trigger, marking the one that fired
pub fn format_trigger(trigger: &Trigger, fired: bool) -> String {
    if fired {
        format!("{} {}", CHECK, style(trigger).green())
    } else {
        format!("  {}", style(trigger).dim())
    }
}

/// Format step output with truncation
pub fn format_output(output: &[String], max_lines: usize) -> String {
    if output.len() <= max_lines {
        output.join("\n")
    } else {
        format!(
            "{}\n{}... ({} more lines)",
            output[..max_lines].join("\n"),
            style("[truncated]").dim(),
            output.len() - max_lines
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_output_truncates() {
        let lines: Vec<String> = (1..=8).map(|i| format!("line {}", i)).collect();
        let text = format_output(&lines, 5);
        assert!(text.contains("line 5"));
        assert!(!text.contains("line 6"));
        assert!(text.contains("3 more lines"));
        assert_eq!(format_output(&lines[..2], 5), "line 1\nline 2");
    }

    #[test]
    fn test_format_plan_lists_gates_jobs_and_steps() {
        let yaml = r#"
name: release
trigger:
  - manual: {}
job_templates:
  build:
    name: Build
    platform: Linux
    steps:
      - { kind: script, label: Build wheel }
stages:
  - name: Package
    jobs: [{ template: build }]
  - name: Publish
    jobs: [{ template: build }]
"#;
        let pipeline = crate::PipelineConfig::from_yaml(yaml)
            .unwrap()
            .expand(&Default::default())
            .unwrap();
        let text = console::strip_ansi_codes(&format_plan(&pipeline)).to_string();
        assert!(text.contains("2 stages, 2 jobs"));
        assert!(text.contains("Publish after Package"));
        assert!(text.contains("BuildLinux [Linux]"));
        assert!(text.contains("- Script: Build wheel"));
    }

    #[test]
    fn test_stage_failed_mentions_job() {
        let event = ExecutionEvent::StageFailed {
            index: 1,
            stage: "Package".to_string(),
            job: Some("BuildLinux".to_string()),
        };
        let text = format_execution_event(&event);
        assert!(text.contains("Package"));
        assert!(text.contains("BuildLinux"));
    }
}
