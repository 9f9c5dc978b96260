//! Scheduling stages over a [`PipelineGraph`].
//!
//! A run selects the target stages plus their ancestors and drives each
//! through `Pending -> Running -> {Succeeded, Failed}`. A stage starts once
//! every predecessor succeeded; when a stage fails, everything downstream of
//! it is marked `Skipped` while independent branches keep going. Ready
//! stages run concurrently, bounded by a semaphore.
//!
//! Before executing a cacheable stage the orchestrator fingerprints its
//! name, parameters and consumed artifacts. A stage whose stored stamp
//! matches and whose outputs all exist is reported as succeeded without
//! running.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::fingerprint::{Fingerprint, artifact_fingerprint};
use crate::graph::{ArtifactKind, PipelineGraph, StageId};
use crate::stage::{StageState, blocking};
use crate::stamps::StampStore;
use crate::{Error, Result};

/// Stages allowed to run at once unless configured otherwise.
pub const DEFAULT_JOBS: usize = 4;

/// Outcome of one stage in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Stage name.
    pub stage: String,
    /// Final state.
    pub state: StageState,
    /// Succeeded without executing because its inputs were unchanged.
    pub up_to_date: bool,
    /// Wall time spent on the stage.
    pub duration_ms: u64,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category, see [`Error::category`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Failed stage that caused a skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
}

/// Outcome of a run, in topological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// One entry per selected stage.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Whether every selected stage succeeded.
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|s| s.state == StageState::Succeeded)
    }

    /// Stages that failed.
    pub fn failed(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| s.state == StageState::Failed)
    }

    /// Stages skipped because of an upstream failure.
    pub fn skipped(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| s.state == StageState::Skipped)
    }

    /// Report for the stage named `name`.
    pub fn get(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Append the stages of a later run.
    pub fn extend(&mut self, other: Self) {
        self.stages.extend(other.stages);
    }
}

#[derive(Debug)]
struct Outcome {
    result: Result<bool>,
    duration_ms: u64,
}

#[derive(Debug, Default)]
struct Slot {
    state: Option<StageState>,
    up_to_date: bool,
    duration_ms: u64,
    error: Option<(String, &'static str)>,
    blocked_by: Option<String>,
}

/// Runs stages of one graph.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    graph: Arc<PipelineGraph>,
    stamps: StampStore,
    jobs: usize,
}

impl Orchestrator {
    /// Create an orchestrator storing stamps in `stamps`.
    pub const fn new(graph: Arc<PipelineGraph>, stamps: StampStore) -> Self {
        Self {
            graph,
            stamps,
            jobs: DEFAULT_JOBS,
        }
    }

    /// Limit concurrently running stages.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// The graph being run.
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Run `targets` and everything they depend on.
    pub async fn run(&self, targets: &[StageId]) -> RunReport {
        let selected = self.graph.closure(targets);
        let mut slots: HashMap<StageId, Slot> = selected
            .iter()
            .map(|&id| {
                (
                    id,
                    Slot {
                        state: Some(StageState::Pending),
                        ..Slot::default()
                    },
                )
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks: JoinSet<(StageId, Outcome)> = JoinSet::new();
        let mut running: HashMap<task::Id, StageId> = HashMap::new();
        debug!(stages = selected.len(), jobs = self.jobs, "Starting run");

        loop {
            self.launch_ready(&selected, &mut slots, &semaphore, &mut tasks, &mut running);

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            self.settle(joined, &mut running, &selected, &mut slots);
        }

        self.report(&selected, slots)
    }

    fn launch_ready(
        &self,
        selected: &BTreeSet<StageId>,
        slots: &mut HashMap<StageId, Slot>,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<(StageId, Outcome)>,
        running: &mut HashMap<task::Id, StageId>,
    ) {
        for &id in self.graph.topological_order() {
            if !selected.contains(&id) || slot_state(slots, id) != Some(StageState::Pending) {
                continue;
            }
            let ready = self
                .graph
                .predecessors(id)
                .iter()
                .all(|p| slot_state(slots, *p) == Some(StageState::Succeeded));
            if !ready {
                continue;
            }

            if let Some(slot) = slots.get_mut(&id) {
                slot.state = Some(StageState::Running);
            }
            let graph = Arc::clone(&self.graph);
            let stamps = self.stamps.clone();
            let semaphore = Arc::clone(semaphore);
            let span = info_span!("stage", name = %self.graph.stage(id).name());
            let handle = tasks.spawn(
                async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => run_stage(graph, stamps, id).await,
                        Err(_) => Outcome {
                            result: Err(Error::Other("scheduler shut down".to_string())),
                            duration_ms: 0,
                        },
                    };
                    (id, outcome)
                }
                .instrument(span),
            );
            running.insert(handle.id(), id);
        }
    }

    /// Record a joined task; a task that died still fails its stage.
    fn settle(
        &self,
        joined: std::result::Result<(task::Id, (StageId, Outcome)), JoinError>,
        running: &mut HashMap<task::Id, StageId>,
        selected: &BTreeSet<StageId>,
        slots: &mut HashMap<StageId, Slot>,
    ) {
        match joined {
            Ok((task_id, (id, outcome))) => {
                running.remove(&task_id);
                self.complete(id, outcome, selected, slots);
            },
            Err(e) => {
                warn!(error = %e, "Stage task ended abnormally");
                if let Some(id) = running.remove(&e.id()) {
                    let outcome = Outcome {
                        result: Err(Error::Other(format!("stage task ended abnormally: {e}"))),
                        duration_ms: 0,
                    };
                    self.complete(id, outcome, selected, slots);
                }
            },
        }
    }

    fn complete(
        &self,
        id: StageId,
        outcome: Outcome,
        selected: &BTreeSet<StageId>,
        slots: &mut HashMap<StageId, Slot>,
    ) {
        let name = self.graph.stage(id).name().to_string();
        let Some(slot) = slots.get_mut(&id) else {
            return;
        };
        slot.duration_ms = outcome.duration_ms;

        match outcome.result {
            Ok(up_to_date) => {
                slot.state = Some(StageState::Succeeded);
                slot.up_to_date = up_to_date;
                info!(stage = %name, duration_ms = outcome.duration_ms, up_to_date, "Stage succeeded");
            },
            Err(e) => {
                warn!(stage = %name, category = e.category(), error = %e, "Stage failed");
                slot.state = Some(StageState::Failed);
                slot.error = Some((e.to_string(), e.category()));

                for downstream in self.graph.transitive_successors(id) {
                    if !selected.contains(&downstream) {
                        continue;
                    }
                    if let Some(blocked) = slots.get_mut(&downstream) {
                        if blocked.state == Some(StageState::Pending) {
                            blocked.state = Some(StageState::Skipped);
                            blocked.blocked_by = Some(name.clone());
                            debug!(
                                stage = %self.graph.stage(downstream).name(),
                                blocked_by = %name,
                                "Skipping stage"
                            );
                        }
                    }
                }
            },
        }
    }

    fn report(&self, selected: &BTreeSet<StageId>, mut slots: HashMap<StageId, Slot>) -> RunReport {
        let stages = self
            .graph
            .topological_order()
            .iter()
            .filter(|id| selected.contains(id))
            .map(|&id| {
                let slot = slots.remove(&id).unwrap_or_default();
                let (state, error) = match slot.state {
                    Some(state) if state.is_terminal() => (state, slot.error),
                    // A task that vanished without reporting back
                    _ => (
                        StageState::Failed,
                        Some(("stage task ended abnormally".to_string(), "other")),
                    ),
                };
                StageReport {
                    stage: self.graph.stage(id).name().to_string(),
                    state,
                    up_to_date: slot.up_to_date,
                    duration_ms: slot.duration_ms,
                    category: error.as_ref().map(|(_, c)| (*c).to_string()),
                    error: error.map(|(m, _)| m),
                    blocked_by: slot.blocked_by,
                }
            })
            .collect();
        RunReport { stages }
    }
}

fn slot_state(slots: &HashMap<StageId, Slot>, id: StageId) -> Option<StageState> {
    slots.get(&id).and_then(|s| s.state)
}

async fn run_stage(graph: Arc<PipelineGraph>, stamps: StampStore, id: StageId) -> Outcome {
    let started = Instant::now();
    // Stage work runs in its own task so a panic is reported as a failure.
    let result = match tokio::spawn(execute_stage(graph, stamps, id).in_current_span()).await {
        Ok(result) => result,
        Err(e) => Err(Error::Other(format!("stage panicked: {e}"))),
    };
    Outcome {
        result,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

async fn execute_stage(graph: Arc<PipelineGraph>, stamps: StampStore, id: StageId) -> Result<bool> {
    let node = graph.stage(id);
    let stage = Arc::clone(node.stage());
    let name = node.name().to_string();

    if stage.always_run() {
        info!("Running");
        stage.execute().await?;
        return Ok(false);
    }

    let fingerprint = {
        let graph = Arc::clone(&graph);
        blocking(move || input_fingerprint(&graph, id)).await?
    };
    let current = stamps.load(&name).is_some_and(|s| s.fingerprint == fingerprint);
    if current && outputs_exist(&graph, id) {
        info!("Up to date");
        return Ok(true);
    }

    stamps.invalidate(&name)?;
    info!("Running");
    stage.execute().await?;
    stamps.record(&name, &fingerprint)?;
    Ok(false)
}

/// Fingerprint of everything that determines a stage's output.
pub fn input_fingerprint(graph: &PipelineGraph, id: StageId) -> Result<String> {
    let node = graph.stage(id);
    let mut fingerprint = Fingerprint::new()
        .field("stage", node.name())
        .field("params", &node.stage().params());
    for &artifact in node.consumes() {
        let artifact = graph.artifact(artifact);
        fingerprint = fingerprint.field(artifact.name(), &artifact_fingerprint(artifact)?);
    }
    Ok(fingerprint.finish())
}

fn outputs_exist(graph: &PipelineGraph, id: StageId) -> bool {
    graph
        .stage(id)
        .produces()
        .iter()
        .map(|&a| graph.artifact(a))
        .filter(|a| a.kind() != ArtifactKind::Scratch)
        .all(|a| a.path().exists())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_macros)]
mod tests {
    use super::*;
    use crate::graph::{PipelineGraphBuilder, StageSpec};
    use crate::stage::Stage;
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counters {
        runs: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    /// Copies its input (or a constant) to its output.
    struct CopyStage {
        input: Option<PathBuf>,
        out: PathBuf,
        fail: bool,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Stage for CopyStage {
        async fn execute(&self) -> Result<()> {
            let c = &self.counters;
            c.runs.fetch_add(1, Ordering::SeqCst);
            let now = c.active.fetch_add(1, Ordering::SeqCst) + 1;
            c.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            c.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(Error::Generation("boom".to_string()));
            }
            let content = match &self.input {
                Some(input) => fs::read_to_string(input)?,
                None => "seed".to_string(),
            };
            fs::write(&self.out, content)?;
            Ok(())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        counters: Arc<Counters>,
        orchestrator: Orchestrator,
    }

    /// a -> b, and an independent c; `a` optionally fails.
    fn fixture(fail_a: bool, jobs: usize) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let counters = Arc::new(Counters::default());
        let stage = |input: Option<&str>, out: &str, fail: bool| CopyStage {
            input: input.map(|i| root.join(i)),
            out: root.join(out),
            fail,
            counters: counters.clone(),
        };

        let mut builder = PipelineGraphBuilder::new();
        let a_out = builder.artifact("a-out", root.join("a.txt"), ArtifactKind::File);
        let b_out = builder.artifact("b-out", root.join("b.txt"), ArtifactKind::File);
        let c_out = builder.artifact("c-out", root.join("c.txt"), ArtifactKind::File);
        builder
            .stage(StageSpec::new("a", stage(None, "a.txt", fail_a)).produces(&a_out))
            .stage(
                StageSpec::new("b", stage(Some("a.txt"), "b.txt", false))
                    .consumes(&a_out)
                    .produces(&b_out),
            )
            .stage(StageSpec::new("c", stage(None, "c.txt", false)).produces(&c_out));
        let graph = Arc::new(builder.build().unwrap());
        let orchestrator =
            Orchestrator::new(graph, StampStore::new(root.join(".docpipe/stamps"))).with_jobs(jobs);

        Fixture {
            _tmp: tmp,
            root,
            counters,
            orchestrator,
        }
    }

    fn all(f: &Fixture) -> Vec<StageId> {
        f.orchestrator.graph().topological_order().to_vec()
    }

    #[tokio::test]
    async fn test_failure_skips_downstream_only() {
        let f = fixture(true, 4);

        let report = f.orchestrator.run(&all(&f)).await;

        assert!(!report.is_success());
        let a = report.get("a").unwrap();
        assert_eq!(a.state, StageState::Failed);
        assert_eq!(a.category.as_deref(), Some("generation"));
        let b = report.get("b").unwrap();
        assert_eq!(b.state, StageState::Skipped);
        assert_eq!(b.blocked_by.as_deref(), Some("a"));
        assert_eq!(report.get("c").unwrap().state, StageState::Succeeded);
        assert!(f.root.join("c.txt").is_file());
        assert!(!f.root.join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_dead_task_fails_its_stage_and_skips_downstream() {
        let f = fixture(false, 4);
        let graph = f.orchestrator.graph();
        let (a, b) = (graph.find("a").unwrap(), graph.find("b").unwrap());
        let selected: BTreeSet<StageId> = [a, b].into_iter().collect();
        let mut slots: HashMap<StageId, Slot> = selected
            .iter()
            .map(|&id| {
                let state = if id == a { StageState::Running } else { StageState::Pending };
                (
                    id,
                    Slot {
                        state: Some(state),
                        ..Slot::default()
                    },
                )
            })
            .collect();

        let mut tasks: JoinSet<(StageId, Outcome)> = JoinSet::new();
        let handle = tasks.spawn(async {
            let missing: Option<(StageId, Outcome)> = None;
            missing.expect("scheduler bug")
        });
        let mut running = HashMap::from([(handle.id(), a)]);
        let joined = tasks.join_next_with_id().await.unwrap();
        assert!(joined.is_err());

        f.orchestrator.settle(joined, &mut running, &selected, &mut slots);
        let report = f.orchestrator.report(&selected, slots);

        assert!(running.is_empty());
        let a = report.get("a").unwrap();
        assert_eq!(a.state, StageState::Failed);
        assert_eq!(a.category.as_deref(), Some("other"));
        let b = report.get("b").unwrap();
        assert_eq!(b.state, StageState::Skipped);
        assert_eq!(b.blocked_by.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_second_run_is_up_to_date() {
        let f = fixture(false, 4);

        let first = f.orchestrator.run(&all(&f)).await;
        let second = f.orchestrator.run(&all(&f)).await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert!(second.stages.iter().all(|s| s.up_to_date));
        assert_eq!(f.counters.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_changed_input_reruns_consumer() {
        let f = fixture(false, 4);
        f.orchestrator.run(&all(&f)).await;

        fs::write(f.root.join("a.txt"), "edited").unwrap();
        let report = f.orchestrator.run(&all(&f)).await;

        assert!(report.get("a").unwrap().up_to_date);
        assert!(!report.get("b").unwrap().up_to_date);
        assert_eq!(fs::read_to_string(f.root.join("b.txt")).unwrap(), "edited");
    }

    #[tokio::test]
    async fn test_missing_output_reruns_producer() {
        let f = fixture(false, 4);
        f.orchestrator.run(&all(&f)).await;

        fs::remove_file(f.root.join("c.txt")).unwrap();
        let report = f.orchestrator.run(&all(&f)).await;

        assert!(!report.get("c").unwrap().up_to_date);
        assert!(f.root.join("c.txt").is_file());
    }

    #[tokio::test]
    async fn test_target_runs_only_its_closure() {
        let f = fixture(false, 4);
        let b = f.orchestrator.graph().find("b").unwrap();

        let report = f.orchestrator.run(&[b]).await;

        let names: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(!f.root.join("c.txt").exists());
    }

    #[tokio::test]
    async fn test_jobs_bound_concurrency() {
        let f = fixture(false, 1);

        let report = f.orchestrator.run(&all(&f)).await;

        assert!(report.is_success());
        assert_eq!(f.counters.peak.load(Ordering::SeqCst), 1);
    }
}
