//! Static pipeline graph with typed artifact handles.
//!
//! Stages declare the artifacts they consume and produce; happens-before
//! edges are derived from those declarations rather than listed by hand.
//! [`PipelineGraphBuilder::build`] validates ownership before anything runs:
//!
//! - stage names are unique
//! - every artifact has at most one producer, and consumed artifacts have one
//! - no two produced paths overlap (one may not contain the other)
//! - the derived graph is acyclic
//!
//! Edge direction is producer → consumer.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use serde::Serialize;

use crate::stage::Stage;
use crate::{Error, Result};

/// Handle to an artifact declared on a [`PipelineGraphBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(usize);

/// Handle to a stage in a [`PipelineGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(usize);

impl StageId {
    fn node(self) -> NodeIndex {
        NodeIndex::new(self.0)
    }
}

/// What kind of thing lives at an artifact's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// A fetched source tree; survives the default clean.
    SourceTree,
    /// A derived directory.
    Directory,
    /// A derived file.
    File,
    /// A single-use working directory, removed after its stage.
    Scratch,
}

/// A named location owned by exactly one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    id: ArtifactId,
    name: String,
    path: PathBuf,
    kind: ArtifactKind,
}

impl Artifact {
    /// Handle of this artifact.
    pub const fn id(&self) -> ArtifactId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystem location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind of artifact.
    pub const fn kind(&self) -> ArtifactKind {
        self.kind
    }
}

/// Declaration of a stage before the graph is built.
pub struct StageSpec {
    name: String,
    stage: Arc<dyn Stage>,
    consumes: Vec<ArtifactId>,
    produces: Vec<ArtifactId>,
}

impl StageSpec {
    /// Declare a stage named `name`.
    pub fn new(name: impl Into<String>, stage: impl Stage + 'static) -> Self {
        Self {
            name: name.into(),
            stage: Arc::new(stage),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// The stage reads `artifact`.
    #[must_use]
    pub fn consumes(mut self, artifact: &Artifact) -> Self {
        self.consumes.push(artifact.id());
        self
    }

    /// The stage writes `artifact` (including scratch directories).
    #[must_use]
    pub fn produces(mut self, artifact: &Artifact) -> Self {
        self.produces.push(artifact.id());
        self
    }
}

/// A validated stage within a [`PipelineGraph`].
pub struct StageNode {
    id: StageId,
    name: String,
    stage: Arc<dyn Stage>,
    consumes: Vec<ArtifactId>,
    produces: Vec<ArtifactId>,
}

impl StageNode {
    /// Handle of this stage.
    pub const fn id(&self) -> StageId {
        self.id
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stage implementation.
    pub fn stage(&self) -> &Arc<dyn Stage> {
        &self.stage
    }

    /// Consumed artifacts in declaration order.
    pub fn consumes(&self) -> &[ArtifactId] {
        &self.consumes
    }

    /// Produced artifacts in declaration order.
    pub fn produces(&self) -> &[ArtifactId] {
        &self.produces
    }
}

impl fmt::Debug for StageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageNode")
            .field("name", &self.name)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// Collects artifacts and stages, then validates them into a graph.
#[derive(Default)]
pub struct PipelineGraphBuilder {
    artifacts: Vec<Artifact>,
    stages: Vec<StageSpec>,
}

impl PipelineGraphBuilder {
    /// Start an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an artifact and get its handle.
    pub fn artifact(&mut self, name: impl Into<String>, path: impl Into<PathBuf>, kind: ArtifactKind) -> Artifact {
        let artifact = Artifact {
            id: ArtifactId(self.artifacts.len()),
            name: name.into(),
            path: path.into(),
            kind,
        };
        self.artifacts.push(artifact.clone());
        artifact
    }

    /// Add a stage.
    pub fn stage(&mut self, spec: StageSpec) -> &mut Self {
        self.stages.push(spec);
        self
    }

    /// Validate the declarations and derive the dependency edges.
    pub fn build(self) -> Result<PipelineGraph> {
        let Self { artifacts, stages } = self;

        let mut names = HashSet::new();
        for spec in &stages {
            if !names.insert(spec.name.as_str()) {
                return Err(Error::Graph(format!("duplicate stage name '{}'", spec.name)));
            }
            for id in spec.consumes.iter().chain(&spec.produces) {
                if id.0 >= artifacts.len() {
                    return Err(Error::Graph(format!(
                        "stage '{}' refers to an artifact from another graph",
                        spec.name
                    )));
                }
            }
        }

        let mut producer: HashMap<ArtifactId, StageId> = HashMap::new();
        for (index, spec) in stages.iter().enumerate() {
            for &artifact in &spec.produces {
                if let Some(existing) = producer.insert(artifact, StageId(index)) {
                    return Err(Error::Graph(format!(
                        "artifact '{}' is produced by both '{}' and '{}'",
                        artifacts[artifact.0].name, stages[existing.0].name, spec.name
                    )));
                }
            }
        }

        check_overlaps(&artifacts, &producer)?;

        let mut dag: DiGraph<StageId, ArtifactId> = DiGraph::with_capacity(stages.len(), 0);
        for index in 0..stages.len() {
            dag.add_node(StageId(index));
        }
        for (index, spec) in stages.iter().enumerate() {
            for &artifact in &spec.consumes {
                let Some(&from) = producer.get(&artifact) else {
                    return Err(Error::Graph(format!(
                        "stage '{}' consumes '{}' but no stage produces it",
                        spec.name, artifacts[artifact.0].name
                    )));
                };
                dag.add_edge(from.node(), StageId(index).node(), artifact);
            }
        }

        if toposort(&dag, None).is_err() {
            let cycle = kosaraju_scc(&dag)
                .into_iter()
                .find(|scc| scc.len() > 1 || dag.contains_edge(scc[0], scc[0]))
                .unwrap_or_default();
            let mut members: Vec<&str> = cycle.iter().map(|n| stages[n.index()].name.as_str()).collect();
            members.sort_unstable();
            return Err(Error::Graph(format!(
                "dependency cycle between stages: {}",
                members.join(", ")
            )));
        }

        let nodes: Vec<StageNode> = stages
            .into_iter()
            .enumerate()
            .map(|(index, spec)| StageNode {
                id: StageId(index),
                name: spec.name,
                stage: spec.stage,
                consumes: spec.consumes,
                produces: spec.produces,
            })
            .collect();

        let order = stable_topological_order(&dag);

        Ok(PipelineGraph {
            artifacts,
            stages: nodes,
            producer,
            dag,
            order,
        })
    }
}

fn check_overlaps(artifacts: &[Artifact], producer: &HashMap<ArtifactId, StageId>) -> Result<()> {
    let mut owned: Vec<&Artifact> = artifacts
        .iter()
        .filter(|a| producer.contains_key(&a.id))
        .collect();
    owned.sort_by_key(|a| a.id);
    for (i, a) in owned.iter().enumerate() {
        for b in &owned[i + 1..] {
            if a.path.starts_with(&b.path) || b.path.starts_with(&a.path) {
                return Err(Error::Graph(format!(
                    "outputs '{}' ({}) and '{}' ({}) overlap",
                    a.name,
                    a.path.display(),
                    b.name,
                    b.path.display()
                )));
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm, always releasing the lowest declared stage first so the
/// order follows declaration order wherever dependencies allow.
fn stable_topological_order(dag: &DiGraph<StageId, ArtifactId>) -> Vec<StageId> {
    let mut indegree: Vec<usize> = dag
        .node_indices()
        .map(|n| dag.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(indegree.len());
    while let Some(next) = ready.pop_first() {
        order.push(StageId(next));
        for succ in dag.neighbors_directed(NodeIndex::new(next), Direction::Outgoing) {
            let slot = &mut indegree[succ.index()];
            *slot -= 1;
            if *slot == 0 {
                ready.insert(succ.index());
            }
        }
    }
    order
}

/// A validated, acyclic pipeline.
pub struct PipelineGraph {
    artifacts: Vec<Artifact>,
    stages: Vec<StageNode>,
    producer: HashMap<ArtifactId, StageId>,
    dag: DiGraph<StageId, ArtifactId>,
    order: Vec<StageId>,
}

impl fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("stages", &self.stages)
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}

impl PipelineGraph {
    /// All stages in declaration order.
    pub fn stages(&self) -> &[StageNode] {
        &self.stages
    }

    /// All artifacts in declaration order.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Look up a stage.
    pub fn stage(&self, id: StageId) -> &StageNode {
        &self.stages[id.0]
    }

    /// Look up an artifact.
    pub fn artifact(&self, id: ArtifactId) -> &Artifact {
        &self.artifacts[id.0]
    }

    /// Find a stage by name.
    pub fn find(&self, name: &str) -> Option<StageId> {
        self.stages.iter().find(|s| s.name == name).map(StageNode::id)
    }

    /// The stage that produces `artifact`, if any.
    pub fn producer_of(&self, artifact: ArtifactId) -> Option<StageId> {
        self.producer.get(&artifact).copied()
    }

    /// Every stage, predecessors before successors.
    pub fn topological_order(&self) -> &[StageId] {
        &self.order
    }

    /// Direct predecessors of `id`.
    pub fn predecessors(&self, id: StageId) -> Vec<StageId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct successors of `id`.
    pub fn successors(&self, id: StageId) -> Vec<StageId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: StageId, direction: Direction) -> Vec<StageId> {
        let mut found: Vec<StageId> = self
            .dag
            .neighbors_directed(id.node(), direction)
            .map(|n| self.dag[n])
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Every stage reachable downstream of `id`, excluding `id`.
    pub fn transitive_successors(&self, id: StageId) -> BTreeSet<StageId> {
        let mut found = BTreeSet::new();
        let mut bfs = Bfs::new(&self.dag, id.node());
        while let Some(n) = bfs.next(&self.dag) {
            found.insert(self.dag[n]);
        }
        found.remove(&id);
        found
    }

    /// Every stage upstream of `id`, excluding `id`.
    pub fn ancestors(&self, id: StageId) -> BTreeSet<StageId> {
        let reversed = Reversed(&self.dag);
        let mut found = BTreeSet::new();
        let mut bfs = Bfs::new(reversed, id.node());
        while let Some(n) = bfs.next(reversed) {
            found.insert(self.dag[n]);
        }
        found.remove(&id);
        found
    }

    /// The targets plus everything they depend on.
    pub fn closure(&self, targets: &[StageId]) -> BTreeSet<StageId> {
        let mut selected = BTreeSet::new();
        for &target in targets {
            selected.insert(target);
            selected.extend(self.ancestors(target));
        }
        selected
    }
}
