//! Scenario-based tests for pipeforge

mod conditional_steps;
mod matrix_expansion;
mod release_gating;
mod trigger_policy;
