//! Pipeline orchestration
//!
//! Drives the acquisition state machine and then the toolchain:
//!
//! ```text
//! Uninitialized → RootReady → {ArtifactPending | ArtifactDone}×N → AllReady
//!               → ToolchainRunning(build → test → lint → doc) → Success | Failed
//! ```
//!
//! Each artifact runs fetch → verify → extract → mark. A present marker skips
//! the whole chain; the first failure aborts without writing a marker, so the
//! next run retries that artifact from scratch. Terminal states are not
//! persisted.

use crate::acquire::{ArtifactFetcher, HttpTransport, Transport};
use crate::config::{ArtifactSpec, Config};
use crate::core::lock::acquire_pipeline_lock;
use crate::core::output;
use crate::error::{Error, Result};
use crate::extract;
use crate::marker::{FsMarkerStore, MarkerId, MarkerStore};
use crate::toolchain::{CargoToolchain, Stage, Toolchain};
use std::fs;

/// Pipeline states, traced at debug level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    RootReady,
    ArtifactPending(String),
    ArtifactDone(String),
    AllReady,
    ToolchainRunning(Stage),
    Success,
    Failed,
}

/// What happened to one artifact during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Marker was present; nothing fetched.
    Skipped,
    /// Fetched, verified, extracted and marked.
    Acquired { files: usize },
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Per artifact, in configuration order.
    pub artifacts: Vec<(String, ArtifactOutcome)>,
    /// Stages that ran and passed.
    pub stages: Vec<Stage>,
}

pub struct Orchestrator {
    config: Config,
    transport: Box<dyn Transport>,
    markers: Box<dyn MarkerStore>,
    toolchain: Box<dyn Toolchain>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        transport: Box<dyn Transport>,
        markers: Box<dyn MarkerStore>,
        toolchain: Box<dyn Toolchain>,
    ) -> Self {
        Self {
            config,
            transport,
            markers,
            toolchain,
        }
    }

    /// Orchestrator with the real HTTP transport, file markers in the work
    /// directory and the configured toolchain program.
    pub fn from_config(config: Config) -> Self {
        let mut transport = HttpTransport::new(config.http_timeout);
        if config.parallel {
            transport = transport.quiet();
        }
        let markers = FsMarkerStore::new(&config.work_dir);
        let toolchain = CargoToolchain::new(config.toolchain.clone(), &config.project_root);
        Self::new(
            config,
            Box::new(transport),
            Box::new(markers),
            Box::new(toolchain),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Acquire every artifact, then run all toolchain stages.
    pub fn run(&self) -> Result<RunReport> {
        let _lock = acquire_pipeline_lock(&self.config.work_dir)?;

        let result = self.acquire_all().and_then(|artifacts| {
            let stages = self.run_stages()?;
            Ok(RunReport { artifacts, stages })
        });
        self.finish(result)
    }

    /// Acquire every artifact and stop at `AllReady`.
    pub fn acquire(&self) -> Result<RunReport> {
        let _lock = acquire_pipeline_lock(&self.config.work_dir)?;

        let result = self.acquire_all().map(|artifacts| RunReport {
            artifacts,
            stages: Vec::new(),
        });
        self.finish(result)
    }

    /// Presence of the root marker and every artifact marker.
    pub fn status(&self) -> Vec<(MarkerId, bool)> {
        std::iter::once(MarkerId::Root)
            .chain(self.config.artifacts.iter().map(MarkerId::artifact))
            .map(|id| {
                let present = self.markers.exists(&id);
                (id, present)
            })
            .collect()
    }

    /// Clear the markers of the named artifacts, at any version, so the next
    /// run re-acquires them. Extracted files stay until they are overwritten.
    pub fn invalidate(&self, names: &[String]) -> Result<()> {
        for name in names {
            if self.config.artifact(name).is_none() {
                return Err(Error::Config(format!("unknown artifact '{}'", name)));
            }
        }

        let _lock = acquire_pipeline_lock(&self.config.work_dir)?;
        for name in names {
            self.markers.clear_artifact(name)?;
            output::sub_action(&format!("invalidated {}", name));
        }
        Ok(())
    }

    fn transition(&self, state: PipelineState) {
        tracing::debug!(?state, "pipeline state");
    }

    fn finish(&self, result: Result<RunReport>) -> Result<RunReport> {
        match &result {
            Ok(_) => self.transition(PipelineState::Success),
            Err(e) => {
                tracing::debug!(error = %e, "pipeline aborted");
                self.transition(PipelineState::Failed);
            }
        }
        result
    }

    fn ensure_root(&self) -> Result<()> {
        let root = &self.config.work_dir;
        // create_dir_all succeeds if another process created it first.
        fs::create_dir_all(root).map_err(|e| Error::io("cannot create work directory", root, e))?;
        if !self.markers.exists(&MarkerId::Root) {
            self.markers.mark(&MarkerId::Root)?;
        }
        self.transition(PipelineState::RootReady);
        Ok(())
    }

    fn acquire_all(&self) -> Result<Vec<(String, ArtifactOutcome)>> {
        self.transition(PipelineState::Uninitialized);
        output::action(&format!("Preparing {}", self.config.work_dir.display()));
        self.ensure_root()?;

        let total = self.config.artifacts.len();
        let mut outcomes: Vec<Option<ArtifactOutcome>> = vec![None; total];
        let mut pending = Vec::new();

        for (i, spec) in self.config.artifacts.iter().enumerate() {
            output::action_numbered(i + 1, total, &format!("{} {}", spec.name, spec.version));
            if self.markers.exists(&MarkerId::artifact(spec)) {
                tracing::debug!(artifact = %spec.name, "marker present, skipping");
                output::skip(&format!("{} already acquired", spec.name));
                self.transition(PipelineState::ArtifactDone(spec.name.clone()));
                outcomes[i] = Some(ArtifactOutcome::Skipped);
            } else {
                self.transition(PipelineState::ArtifactPending(spec.name.clone()));
                pending.push(i);
            }
        }

        if self.config.parallel && pending.len() > 1 {
            let results: Vec<(usize, Result<ArtifactOutcome>)> = std::thread::scope(|s| {
                let handles: Vec<_> = pending
                    .iter()
                    .map(|&i| {
                        let spec = &self.config.artifacts[i];
                        (i, s.spawn(move || self.acquire_one(spec)))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(i, h)| match h.join() {
                        Ok(r) => (i, r),
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            });
            // Every started artifact has finished; report the first failure in
            // configuration order.
            for (i, result) in results {
                outcomes[i] = Some(result?);
            }
        } else {
            for i in pending {
                outcomes[i] = Some(self.acquire_one(&self.config.artifacts[i])?);
            }
        }

        self.transition(PipelineState::AllReady);
        Ok(self
            .config
            .artifacts
            .iter()
            .zip(outcomes)
            .map(|(spec, outcome)| (spec.name.clone(), outcome.unwrap_or(ArtifactOutcome::Skipped)))
            .collect())
    }

    /// fetch → verify → extract → mark for one artifact.
    fn acquire_one(&self, spec: &ArtifactSpec) -> Result<ArtifactOutcome> {
        // Markers from other pins would vouch for content about to be replaced.
        let stale = self.markers.clear_artifact(&spec.name)?;
        if stale > 0 {
            output::detail(&format!("{}: pin changed, re-acquiring", spec.name));
        }

        let bytes = ArtifactFetcher::new(self.transport.as_ref()).fetch(spec)?;
        let dest = self.config.work_dir.join(&spec.destination);
        let format = extract::detect_format(&spec.name, &spec.file_name(), &bytes)?;

        let files = match spec.nested_entry() {
            None => extract::extract(&spec.name, &bytes, format, &spec.selector, &dest)?,
            Some(entry) => {
                output::detail(&format!("opening nested {}", entry));
                let inner = extract::read_entry(&spec.name, &bytes, format, &entry)?;
                drop(bytes);
                let inner_format = extract::detect_format(&spec.name, &entry, &inner)?;
                extract::extract(&spec.name, &inner, inner_format, &spec.selector, &dest)?
            }
        };

        self.markers.mark(&MarkerId::artifact(spec))?;
        self.transition(PipelineState::ArtifactDone(spec.name.clone()));
        output::sub_action(&format!(
            "{}: {} files -> {}",
            spec.name,
            files,
            dest.display()
        ));
        Ok(ArtifactOutcome::Acquired { files })
    }

    fn run_stages(&self) -> Result<Vec<Stage>> {
        let total = Stage::ORDER.len();
        let mut passed = Vec::with_capacity(total);

        for (i, stage) in Stage::ORDER.into_iter().enumerate() {
            self.transition(PipelineState::ToolchainRunning(stage));
            output::action_numbered(i + 1, total, &format!("{} {}", self.config.toolchain.program, stage));
            self.toolchain.run(stage)?;
            passed.push(stage);
        }

        output::success("all stages passed");
        Ok(passed)
    }
}
