//! Task graph for one run.
//!
//! Each table contributes a `stage_<table>` task followed by a
//! `load_<table>` task. In [`ChainMode::Linear`] the tables are additionally
//! chained in registry order, so a failure anywhere blocks everything after
//! it. In [`ChainMode::Independent`] each table's pair stands alone.

use crate::config::registry::DatasetDescriptor;
use crate::config::{ChainMode, RetryPolicy};
use crate::core::retry::with_retry;
use crate::utils::error::Result;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Stage,
    Load,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Stage => write!(f, "stage"),
            TaskKind::Load => write!(f, "load"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskNode {
    /// Index into the graph's table list.
    pub table: usize,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum TaskState {
    Success,
    Failed(String),
    UpstreamFailed,
    Skipped,
}

impl TaskState {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskState::Failed(_) | TaskState::UpstreamFailed)
    }
}

/// What a finished task produced, when it has something to say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub table: String,
    pub kind: TaskKind,
    pub state: TaskState,
    pub attempts: u32,
    pub duration_ms: u64,
    pub output: TaskOutput,
}

/// Executes a single task attempt.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(
        &self,
        table: &DatasetDescriptor,
        kind: TaskKind,
        attempt: u32,
    ) -> Result<TaskOutput>;
}

pub fn task_id(kind: TaskKind, table: &str) -> String {
    format!("{}_{}", kind, table)
}

pub struct TaskGraph {
    tables: Vec<DatasetDescriptor>,
    graph: DiGraph<TaskNode, ()>,
    chain_mode: ChainMode,
}

impl TaskGraph {
    pub fn build(tables: Vec<DatasetDescriptor>, chain_mode: ChainMode) -> Self {
        let mut graph = DiGraph::new();
        let mut previous_load: Option<NodeIndex> = None;

        for index in 0..tables.len() {
            let stage = graph.add_node(TaskNode {
                table: index,
                kind: TaskKind::Stage,
            });
            let load = graph.add_node(TaskNode {
                table: index,
                kind: TaskKind::Load,
            });
            graph.add_edge(stage, load, ());

            if chain_mode == ChainMode::Linear {
                if let Some(previous) = previous_load {
                    graph.add_edge(previous, stage, ());
                }
            }
            previous_load = Some(load);
        }

        Self {
            tables,
            graph,
            chain_mode,
        }
    }

    pub fn chain_mode(&self) -> ChainMode {
        self.chain_mode
    }

    pub fn tables(&self) -> &[DatasetDescriptor] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn node_id(&self, index: NodeIndex) -> String {
        let node = self.graph[index];
        task_id(node.kind, &self.tables[node.table].name)
    }

    /// Task ids in insertion order: stage then load, table by table.
    pub fn task_ids(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .map(|index| self.node_id(index))
            .collect()
    }

    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .map(|(from, to)| (self.node_id(from), self.node_id(to)))
            .collect()
    }

    pub fn upstream_of(&self, task: &str) -> Vec<String> {
        self.graph
            .node_indices()
            .find(|index| self.node_id(*index) == task)
            .map(|index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .map(|up| self.node_id(up))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn execution_order(&self) -> Vec<NodeIndex> {
        // The graph only ever gains forward edges, so it cannot be cyclic.
        toposort(&self.graph, None).unwrap_or_else(|_| self.graph.node_indices().collect())
    }

    /// Runs every task once its upstream tasks succeed, with at most
    /// `max_parallel` tasks in flight. Tasks downstream of a failure are
    /// reported as [`TaskState::UpstreamFailed`] and never started.
    pub async fn execute(
        &self,
        runner: &dyn TaskRunner,
        retry: RetryPolicy,
        max_parallel: usize,
    ) -> Vec<TaskReport> {
        let order = self.execution_order();
        let count = self.graph.node_count();
        let max_parallel = max_parallel.max(1);

        let mut started = vec![false; count];
        let mut states: Vec<Option<TaskState>> = vec![None; count];
        let mut reports: Vec<Option<TaskReport>> = vec![None; count];
        let mut in_flight = FuturesUnordered::new();

        loop {
            for &index in &order {
                let i = index.index();
                if started[i] {
                    continue;
                }

                let upstream: Vec<NodeIndex> = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .collect();

                let blocked = upstream
                    .iter()
                    .any(|up| states[up.index()].as_ref().is_some_and(|s| !s.is_success()));
                if blocked {
                    started[i] = true;
                    tracing::warn!("Skipping {}: upstream task failed", self.node_id(index));
                    states[i] = Some(TaskState::UpstreamFailed);
                    reports[i] = Some(self.report(
                        index,
                        TaskState::UpstreamFailed,
                        0,
                        Duration::ZERO,
                        TaskOutput::default(),
                    ));
                    continue;
                }

                let ready = upstream
                    .iter()
                    .all(|up| states[up.index()].as_ref().is_some_and(TaskState::is_success));
                if ready && in_flight.len() < max_parallel {
                    started[i] = true;
                    in_flight.push(self.run_node(runner, index, retry));
                }
            }

            match in_flight.next().await {
                Some((index, report)) => {
                    states[index.index()] = Some(report.state.clone());
                    reports[index.index()] = Some(report);
                }
                None => break,
            }
        }

        reports
            .into_iter()
            .zip(self.graph.node_indices())
            .map(|(report, index)| {
                report.unwrap_or_else(|| {
                    self.report(index, TaskState::Skipped, 0, Duration::ZERO, TaskOutput::default())
                })
            })
            .collect()
    }

    async fn run_node(
        &self,
        runner: &dyn TaskRunner,
        index: NodeIndex,
        retry: RetryPolicy,
    ) -> (NodeIndex, TaskReport) {
        let node = self.graph[index];
        let table = &self.tables[node.table];
        let id = self.node_id(index);
        let span = tracing::info_span!("task", task = %id, table = %table.name);

        async move {
            tracing::info!("Starting {}", id);
            let started = Instant::now();
            let (result, attempts) =
                with_retry(retry, &id, move |attempt| runner.run_task(table, node.kind, attempt)).await;
            let elapsed = started.elapsed();

            let (state, output) = match result {
                Ok(output) => {
                    tracing::info!("{} succeeded in {:?} after {} attempt(s)", id, elapsed, attempts);
                    (TaskState::Success, output)
                }
                Err(e) => {
                    tracing::error!("{} failed after {} attempt(s): {}", id, attempts, e);
                    (TaskState::Failed(e.to_string()), TaskOutput::default())
                }
            };

            (index, self.report(index, state, attempts, elapsed, output))
        }
        .instrument(span)
        .await
    }

    fn report(
        &self,
        index: NodeIndex,
        state: TaskState,
        attempts: u32,
        duration: Duration,
        output: TaskOutput,
    ) -> TaskReport {
        let node = self.graph[index];
        TaskReport {
            task_id: self.node_id(index),
            table: self.tables[node.table].name.clone(),
            kind: node.kind,
            state,
            attempts,
            duration_ms: duration.as_millis() as u64,
            output,
        }
    }
}
