//! External toolchain stages
//!
//! After acquisition the consuming project is built, tested, linted and
//! documented by an external program (`cargo` by default). Only exit status
//! is observed; output goes straight to the terminal.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One toolchain stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Build,
    Test,
    Lint,
    Doc,
}

impl Stage {
    /// Execution order.
    pub const ORDER: [Stage; 4] = [Stage::Build, Stage::Test, Stage::Lint, Stage::Doc];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Test => "test",
            Self::Lint => "lint",
            Self::Doc => "doc",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Program and per-stage arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    pub program: String,
    pub build: Vec<String>,
    pub test: Vec<String>,
    pub lint: Vec<String>,
    pub doc: Vec<String>,
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "cargo".into(),
            build: args(&["build", "--workspace"]),
            test: args(&["test", "--workspace"]),
            lint: args(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]),
            doc: args(&["doc", "--workspace", "--no-deps"]),
        }
    }
}

impl ToolchainConfig {
    pub fn args(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::Build => &self.build,
            Stage::Test => &self.test,
            Stage::Lint => &self.lint,
            Stage::Doc => &self.doc,
        }
    }
}

/// Runs one stage to completion. Pass/fail only.
pub trait Toolchain: Send + Sync {
    fn run(&self, stage: Stage) -> Result<()>;
}

/// Runs stages as child processes in the project root.
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    config: ToolchainConfig,
    project_root: PathBuf,
}

impl CargoToolchain {
    pub fn new(config: ToolchainConfig, project_root: &Path) -> Self {
        Self {
            config,
            project_root: project_root.to_path_buf(),
        }
    }
}

impl Toolchain for CargoToolchain {
    fn run(&self, stage: Stage) -> Result<()> {
        let program = which::which(&self.config.program).map_err(|e| Error::ToolchainSpawn {
            stage,
            reason: format!("{}: {}", self.config.program, e),
        })?;
        let args = self.config.args(stage);
        tracing::debug!(%stage, program = %program.display(), ?args, "running stage");

        let status = Command::new(&program)
            .args(args)
            .current_dir(&self.project_root)
            .status()
            .map_err(|e| Error::ToolchainSpawn {
                stage,
                reason: format!("failed to execute {}: {}", program.display(), e),
            })?;

        if !status.success() {
            return Err(Error::Toolchain {
                stage,
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<_> = Stage::ORDER.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["build", "test", "lint", "doc"]);
    }

    #[test]
    fn test_default_args() {
        let config = ToolchainConfig::default();
        assert_eq!(config.program, "cargo");
        assert_eq!(config.args(Stage::Build), ["build", "--workspace"]);
        assert_eq!(config.args(Stage::Doc), ["doc", "--workspace", "--no-deps"]);
        assert!(config.args(Stage::Lint).contains(&"warnings".to_string()));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolchainConfig {
            program: "definitely-not-a-real-toolchain-binary".into(),
            ..Default::default()
        };
        let err = CargoToolchain::new(config, dir.path())
            .run(Stage::Build)
            .unwrap_err();
        assert!(matches!(err, Error::ToolchainSpawn { stage: Stage::Build, .. }));
    }

    #[cfg(unix)]
    fn sh_toolchain(dir: &Path) -> CargoToolchain {
        let config = ToolchainConfig {
            program: "sh".into(),
            build: args(&["-c", "touch built"]),
            test: args(&["-c", "exit 3"]),
            lint: args(&["-c", "kill -9 $$"]),
            doc: args(&["-c", "exit 0"]),
        };
        CargoToolchain::new(config, dir)
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_runs_in_project_root() {
        let dir = tempfile::tempdir().unwrap();
        sh_toolchain(dir.path()).run(Stage::Build).unwrap();
        assert!(dir.path().join("built").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_stage_and_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh_toolchain(dir.path()).run(Stage::Test).unwrap_err();
        match err {
            Error::Toolchain { stage, code } => {
                assert_eq!(stage, Stage::Test);
                assert_eq!(code, Some(3));
            }
            other => panic!("expected toolchain error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_killed_stage_has_no_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh_toolchain(dir.path()).run(Stage::Lint).unwrap_err();
        assert!(matches!(err, Error::Toolchain { stage: Stage::Lint, code: None }));
    }
}
