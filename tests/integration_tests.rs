//! Integration tests for Conductor
//!
//! These tests drive the `conductor` binary against temporary projects.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a conductor Command with a predictable environment
fn conductor() -> Command {
    let mut cmd = cargo_bin_cmd!("conductor");
    cmd.env_remove("CONDUCTOR_PROVIDER")
        .env_remove("CONDUCTOR_CMD")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to initialize a conductor project in a temp directory
fn init_conductor_project(dir: &TempDir) {
    conductor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

fn write_config(dir: &TempDir, content: &str) {
    fs::write(dir.path().join(".conductor/conductor.toml"), content).unwrap();
}

fn run(dir: &TempDir, args: &[&str]) -> assert_cmd::assert::Assert {
    conductor().current_dir(dir.path()).args(args).assert()
}

/// Complete each agent in turn with the same score.
fn complete_all(dir: &TempDir, agents: &[&str], score: &str) {
    for agent in agents {
        run(dir, &["complete", agent, "--score", score]).success();
    }
}

const DISCOVER_SIBLINGS: [&str; 2] = ["discovery", "researcher"];

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_conductor_help() {
        conductor().arg("--help").assert().success();
    }

    #[test]
    fn test_conductor_version() {
        conductor().arg("--version").assert().success();
    }

    #[test]
    fn test_conductor_init_creates_structure() {
        let dir = create_temp_project();

        run(&dir, &["init"])
            .success()
            .stdout(predicate::str::contains("Initialized conductor project"));

        assert!(dir.path().join(".conductor").is_dir());
        assert!(dir.path().join(".conductor/conductor.toml").exists());
        assert!(dir.path().join(".conductor/pipeline.json").exists());
        assert!(dir.path().join(".conductor/logs").is_dir());
    }

    #[test]
    fn test_conductor_init_idempotent() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["init"])
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_conductor_init_existing_project() {
        let dir = create_temp_project();
        run(&dir, &["init", "--existing"]).success();

        let pipeline = fs::read_to_string(dir.path().join(".conductor/pipeline.json")).unwrap();
        assert!(pipeline.contains("codebase-analyst"));
        assert!(pipeline.contains("\"existing\""));
    }

    #[test]
    fn test_status_uninitialized() {
        let dir = create_temp_project();
        run(&dir, &["status"])
            .failure()
            .stderr(predicate::str::contains("conductor init"));
    }

    #[test]
    fn test_status_initialized() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["status"])
            .success()
            .stdout(predicate::str::contains("Pipeline Status"))
            .stdout(predicate::str::contains("Progress:     0%"))
            .stdout(predicate::str::contains("discovery"))
            .stdout(predicate::str::contains("monitor"));
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        conductor()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("init")
            .assert()
            .success();
        assert!(dir.path().join(".conductor").exists());
    }

    #[test]
    fn test_verbose_flag() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        run(&dir, &["--verbose", "status"]).success();
    }
}

// =============================================================================
// Pipeline Transitions
// =============================================================================

mod pipeline {
    use super::*;

    #[test]
    fn test_start_and_complete_agent() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["start", "discovery"])
            .success()
            .stdout(predicate::str::contains("discovery is in progress"));

        run(&dir, &["complete", "discovery", "--score", "90"])
            .success()
            .stdout(predicate::str::contains("Next action: continue"))
            .stdout(predicate::str::contains("Next agent:  researcher"));

        run(&dir, &["status"])
            .success()
            .stdout(predicate::str::contains("completed (90)"));
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["start", "wizard"])
            .failure()
            .stderr(predicate::str::contains("Unknown agent 'wizard'"));
    }

    #[test]
    fn test_agent_outside_roster_rejected() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["start", "codebase-analyst"])
            .failure()
            .stderr(predicate::str::contains("not part of this pipeline's roster"));
    }

    #[test]
    fn test_gate_agent_below_threshold_waits() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");

        run(&dir, &["complete", "requirements", "--score", "92"])
            .success()
            .stdout(predicate::str::contains("Next action: wait"))
            .stdout(predicate::str::contains("Verdict:     needs_revision"));
    }

    #[test]
    fn test_critical_blocker_blocks() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");

        run(&dir, &["complete", "requirements", "--score", "100", "--critical"])
            .success()
            .stdout(predicate::str::contains("Verdict:     blocked"));
    }

    #[test]
    fn test_gate_before_siblings_continues_in_phase() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["complete", "requirements", "--score", "99"])
            .success()
            .stdout(predicate::str::contains("Next action: continue"))
            .stdout(predicate::str::contains("Next agent:  discovery"));

        complete_all(&dir, &["discovery"], "90");
        run(&dir, &["complete", "researcher", "--score", "90"])
            .success()
            .stdout(predicate::str::contains("Next agent:  requirements"));

        let pipeline = fs::read_to_string(dir.path().join(".conductor/pipeline.json")).unwrap();
        assert!(pipeline.contains("\"phase\": \"discover\""));
    }

    #[test]
    fn test_later_phase_agent_rejected() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["complete", "qa", "--score", "97"])
            .failure()
            .stderr(predicate::str::contains("belongs to a later phase"));

        run(&dir, &["status"])
            .success()
            .stdout(predicate::str::contains("Progress:     0%"));
    }

    #[test]
    fn test_configured_threshold_applies_to_completions() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, "[gates]\nthreshold = 80\n");
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");

        run(&dir, &["complete", "requirements", "--score", "90"])
            .success()
            .stdout(predicate::str::contains("Verdict:     approved"))
            .stdout(predicate::str::contains("advance_phase"));
    }

    #[test]
    fn test_full_walk_to_preview_and_deploy() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");

        run(&dir, &["complete", "requirements", "--score", "96"])
            .success()
            .stdout(predicate::str::contains("advance_phase"))
            .stdout(predicate::str::contains("Next agent:  architect"));

        complete_all(&dir, &["architect", "ux-designer", "api-designer"], "92");
        run(&dir, &["complete", "plan-reviewer", "--score", "95"])
            .success()
            .stdout(predicate::str::contains("Next agent:  scaffolder"));

        complete_all(&dir, &["scaffolder", "implementer"], "92");
        run(&dir, &["complete", "qa", "--score", "97"])
            .success()
            .stdout(predicate::str::contains("user_preview"))
            .stdout(predicate::str::contains("QA score:    97"));

        run(&dir, &["preview", "approve-keep"])
            .success()
            .stdout(predicate::str::contains("Next agent:  deployer"))
            .stdout(predicate::str::contains("Preview server: keep"));

        complete_all(&dir, &["deployer"], "100");
        run(&dir, &["complete", "monitor", "--score", "100"])
            .success()
            .stdout(predicate::str::contains("Next action: complete"));

        run(&dir, &["status"])
            .success()
            .stdout(predicate::str::contains("Pipeline complete."));
    }

    #[test]
    fn test_preview_rethink_stops_for_replanning() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        complete_all(
            &dir,
            &[
                "discovery",
                "researcher",
                "requirements",
                "architect",
                "ux-designer",
                "api-designer",
                "plan-reviewer",
                "scaffolder",
                "implementer",
                "qa",
            ],
            "97",
        );

        run(&dir, &["preview", "rethink"])
            .success()
            .stdout(predicate::str::contains("Next action: deviation"))
            .stdout(predicate::str::contains("Next agent:").not())
            .stdout(predicate::str::contains("conductor reset <agent>"));
    }

    #[test]
    fn test_preview_when_not_awaiting() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["preview", "approve-kill"])
            .failure()
            .stderr(predicate::str::contains("not awaiting a preview decision"));
    }

    #[test]
    fn test_preview_invalid_decision() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["preview", "ship-it"])
            .failure()
            .stderr(predicate::str::contains("Invalid preview decision"));
    }

    #[test]
    fn test_reset_rewinds_phase() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        complete_all(&dir, &DISCOVER_SIBLINGS, "90");
        run(&dir, &["complete", "requirements", "--score", "96"]).success();
        run(&dir, &["reset", "researcher"])
            .success()
            .stdout(predicate::str::contains("Pipeline reset to researcher (phase discover)"));

        let pipeline = fs::read_to_string(dir.path().join(".conductor/pipeline.json")).unwrap();
        assert!(pipeline.contains("\"phase\": \"discover\""));
    }
}

// =============================================================================
// Quality Gates
// =============================================================================

mod gates {
    use super::*;

    const REQUIREMENTS_GATE: &str = r#"
[gates.criteria.requirements]
artifacts = [{ path = "docs/requirements.md", critical = true }]
"#;

    #[test]
    fn test_gate_without_criteria_fails() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["gate", "requirements"])
            .failure()
            .stderr(predicate::str::contains("No gate criteria configured"));
    }

    #[test]
    fn test_gate_missing_critical_artifact_blocks() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, REQUIREMENTS_GATE);
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");

        run(&dir, &["gate", "requirements"])
            .success()
            .stdout(predicate::str::contains("blocked"))
            .stdout(predicate::str::contains("docs/requirements.md is missing"))
            .stdout(predicate::str::contains("Next action: wait"));
    }

    #[test]
    fn test_gate_with_artifacts_advances() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, REQUIREMENTS_GATE);
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/requirements.md"), "# Requirements\n").unwrap();

        run(&dir, &["gate", "requirements"])
            .success()
            .stdout(predicate::str::contains("approved"))
            .stdout(predicate::str::contains("Score: 100/95"))
            .stdout(predicate::str::contains("advance_phase"));
    }

    #[test]
    fn test_human_gate_waits_for_approval() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, REQUIREMENTS_GATE);
        complete_all(&dir, &DISCOVER_SIBLINGS, "90");
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/requirements.md"), "# Requirements\n").unwrap();

        run(&dir, &["gate", "requirements", "--human"])
            .success()
            .stdout(predicate::str::contains("Awaiting approval"));

        let pipeline = fs::read_to_string(dir.path().join(".conductor/pipeline.json")).unwrap();
        assert!(pipeline.contains("gate_waiting"));
        assert!(pipeline.contains("\"phase\": \"discover\""));

        run(&dir, &["approve", "requirements", "--score", "100"])
            .success()
            .stdout(predicate::str::contains("advance_phase"));

        let pipeline = fs::read_to_string(dir.path().join(".conductor/pipeline.json")).unwrap();
        assert!(pipeline.contains("\"phase\": \"plan\""));
        assert!(pipeline.contains("\"trigger\": \"user\""));
    }
}

// =============================================================================
// Spawning
// =============================================================================

mod spawning {
    use super::*;

    #[test]
    fn test_spawn_dry_run_shows_command_and_env() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(
            &dir,
            &["spawn", "--agent", "architect", "--task", "T1", "--model", "fast", "--dry-run"],
        )
        .success()
        .stdout(predicate::str::contains("Terminal: architect-1"))
        .stdout(predicate::str::contains("claude-haiku-4-5"))
        .stdout(predicate::str::contains("CONDUCTOR_AGENT_ID=architect"))
        .stdout(predicate::str::contains("CONDUCTOR_TASK_ID=T1"))
        .stdout(predicate::str::contains("CONDUCTOR_WRITE_SCOPE=docs/architecture"))
        .stdout(predicate::str::contains("CONDUCTOR_CONTEXT={}"));
    }

    #[test]
    fn test_spawn_dry_run_codex_provider() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        conductor()
            .current_dir(dir.path())
            .env("CONDUCTOR_PROVIDER", "codex")
            .args(["spawn", "--agent", "qa", "--task", "T2", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Command:  codex exec"))
            .stdout(predicate::str::contains("CONDUCTOR_WRITE_SCOPE=src,tests"));
    }

    #[test]
    fn test_spawn_dry_run_does_not_print_credentials() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        conductor()
            .current_dir(dir.path())
            .env("ANTHROPIC_API_KEY", "sk-test-secret")
            .args(["spawn", "--agent", "architect", "--task", "T1", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("sk-test-secret").not());
    }

    #[test]
    fn test_spawn_unknown_provider_fails() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, "[spawn]\nprovider = \"nope\"\n");

        run(&dir, &["spawn", "--agent", "architect", "--task", "T1", "--dry-run"])
            .failure()
            .stderr(predicate::str::contains("Unknown provider 'nope'"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_runs_executor_and_marks_agent() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, "[spawn]\ncommand = \"true\"\n");

        run(&dir, &["spawn", "--agent", "researcher", "--task", "T1"])
            .success()
            .stdout(predicate::str::contains("Spawned researcher-1"))
            .stdout(predicate::str::contains("exited (exit 0)"));

        assert!(dir.path().join(".conductor/logs/researcher-1.log").exists());
        run(&dir, &["status"])
            .success()
            .stdout(predicate::str::contains("in_progress"));
    }
}

// =============================================================================
// Build Loop
// =============================================================================

mod build {
    use super::*;

    #[test]
    fn test_build_status_without_session() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["build-status"])
            .success()
            .stdout(predicate::str::contains("No build session found."));
    }

    #[test]
    fn test_build_requires_tasks() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["build"])
            .failure()
            .stderr(predicate::str::contains("Build task list is empty"));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_completes_tasks() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, "[spawn]\ncommand = \"true\"\n");

        run(&dir, &["build", "--task", "T1", "--task", "T2"])
            .success()
            .stdout(predicate::str::contains("Build completed: 2 completed, 0 failed"));

        run(&dir, &["build-status"])
            .success()
            .stdout(predicate::str::contains("2 total, 2 completed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_exhausts_failing_task() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(
            &dir,
            "[spawn]\ncommand = \"false\"\n\n[build]\nmax_attempts = 2\n",
        );

        run(&dir, &["build", "--task", "T1"])
            .success()
            .stdout(predicate::str::contains("T1 gave up after 2 attempts"))
            .stdout(predicate::str::contains("Build failed: 0 completed, 1 failed, 2 attempts"));

        run(&dir, &["build-status"])
            .success()
            .stdout(predicate::str::contains("Status:   failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_resume_finishes_failed_session() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(
            &dir,
            "[spawn]\ncommand = \"false\"\n\n[build]\nmax_attempts = 1\n",
        );
        run(&dir, &["build", "--task", "T1"]).success();

        write_config(
            &dir,
            "[spawn]\ncommand = \"true\"\n\n[build]\nmax_attempts = 1\n",
        );
        run(&dir, &["build", "--resume"])
            .success()
            .stdout(predicate::str::contains("Build failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_to_build_agent_abandons_session() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(
            &dir,
            "[spawn]\ncommand = \"false\"\n\n[build]\nmax_attempts = 1\n",
        );
        run(&dir, &["build", "--task", "T1"]).success();

        run(&dir, &["reset", "implementer"]).success();
        run(&dir, &["build-status"])
            .success()
            .stdout(predicate::str::contains("abandoned"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();

        run(&dir, &["config"])
            .success()
            .stdout(predicate::str::contains("No conductor.toml found"))
            .stdout(predicate::str::contains("threshold = 95"))
            .stdout(predicate::str::contains("provider = \"claude\""));
    }

    #[test]
    fn test_config_show_file_content() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(
            &dir,
            r#"
[project]
name = "demo"

[gates.criteria.architect]
artifacts = [{ path = "docs/architecture.md", critical = true }]
"#,
        );

        run(&dir, &["config", "show"])
            .success()
            .stdout(predicate::str::contains("name = \"demo\""))
            .stdout(predicate::str::contains("[gates.criteria.architect]"))
            .stdout(predicate::str::contains("docs/architecture.md (critical)"));
    }

    #[test]
    fn test_config_validate_no_config() {
        let dir = create_temp_project();

        run(&dir, &["config", "validate"])
            .success()
            .stdout(predicate::str::contains("Using defaults (valid)"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        init_conductor_project(&dir);
        write_config(&dir, "[gates]\nthreshold = 120\n\n[build]\nmax_attempts = 0\n");

        run(&dir, &["config", "validate"])
            .success()
            .stdout(predicate::str::contains("Configuration warnings:"));
    }

    #[test]
    fn test_config_validate_default_file_is_valid() {
        let dir = create_temp_project();
        init_conductor_project(&dir);

        run(&dir, &["config", "validate"])
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }
}
