//! Cluster execution logic

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::barrier::ScriptBarriers;
use crate::channel::ChannelConfig;
use crate::config::{SimulationConfig, SyncMode};
use crate::console::ConsoleAuthority;
use crate::error::{BarrierError, BarrierResult};
use crate::identity::{AgentIdentity, WorkerIdentity};
use crate::liveness::ProcessReport;
use crate::registry::{BarrierGroups, LocalGroups, ReplicaGroups};
use crate::task::{ScriptTask, ScriptTaskBuilder, TaskStats};
use crate::transport::{console_link, AgentBroadcaster};

use super::aggregator::aggregate_task_stats;

/// Cluster manages one simulated test run
///
/// Responsible for wiring the console and worker processes together,
/// spawning script tasks, coordinating shutdown, and collecting results.
pub struct Cluster {
    /// Simulation configuration
    pub(crate) config: SimulationConfig,

    /// Channel buffer sizes
    pub(crate) channel_config: ChannelConfig,

    /// Shutdown signal sender
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Cluster {
    /// Create a new cluster
    ///
    /// Use `ClusterBuilder` for a more ergonomic construction.
    pub fn new(config: SimulationConfig, channel_config: ChannelConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            channel_config,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown of all tasks and the console
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get the simulation configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the simulation
    ///
    /// Spawns the script tasks, waits for completion, and returns per-task
    /// stats. Fails if any task fails.
    pub async fn run(&self) -> BarrierResult<Vec<TaskStats>> {
        tracing::info!(
            processes = self.config.processes,
            threads_per_process = self.config.threads_per_process,
            rounds = self.config.rounds,
            mode = ?self.config.mode,
            wait_timeout = ?self.config.wait_timeout(),
            "Starting simulation"
        );

        match self.config.mode {
            SyncMode::Distributed => self.run_distributed().await,
            SyncMode::Local => self.run_local().await,
        }
    }

    /// Every process shares one registry that decides releases itself.
    async fn run_local(&self) -> BarrierResult<Vec<TaskStats>> {
        let groups: Arc<dyn BarrierGroups> = Arc::new(LocalGroups::new());

        let processes: Vec<ScriptBarriers> = (0..self.config.processes)
            .map(|p| ScriptBarriers::new(Arc::clone(&groups), worker_identity(p)))
            .collect();

        let tasks = self.build_tasks(&processes)?;
        self.run_tasks(tasks).await
    }

    /// Each process keeps replicas that report to a console authority.
    async fn run_distributed(&self) -> BarrierResult<Vec<TaskStats>> {
        let broadcaster = AgentBroadcaster::new();
        let authority = Arc::new(ConsoleAuthority::new(broadcaster.clone()));
        let (link, inbound) = console_link();
        let (status_tx, status_rx) = mpsc::channel(self.channel_config.liveness_buffer);

        let console = {
            let authority = Arc::clone(&authority);
            let shutdown_tx = self.shutdown_tx.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let result = authority.run(inbound, status_rx, shutdown_rx).await;
                // Nothing will be released any more; stop the tasks.
                if result.is_err() {
                    let _ = shutdown_tx.send(());
                }
                result
            })
        };

        // Agent-side pumps outlive the tasks and are stopped separately.
        let (pumps_tx, _) = broadcast::channel(1);
        let mut pumps: Vec<JoinHandle<BarrierResult<()>>> = Vec::new();
        let mut processes = Vec::with_capacity(self.config.processes);
        let mut workers = Vec::with_capacity(self.config.processes);

        for p in 0..self.config.processes {
            let worker = worker_identity(p);
            let replicas = Arc::new(ReplicaGroups::new(Arc::new(
                link.worker_sender(worker.clone()),
            )));

            let pump = Arc::clone(&replicas);
            let agent_rx = broadcaster.connect();
            let stop_rx = pumps_tx.subscribe();
            pumps.push(tokio::spawn(async move { pump.run(agent_rx, stop_rx).await }));

            processes.push(ScriptBarriers::new(replicas, worker.clone()));
            workers.push(worker);
        }
        drop(link);

        let running = workers.iter().cloned().map(ProcessReport::running).collect();
        if status_tx.send(running).await.is_err() {
            tracing::warn!("Console stopped before the first liveness report");
        }

        // Every barrier is joined before any task starts waiting.
        let result = match self.build_tasks(&processes) {
            Ok(tasks) => {
                drop(processes);
                self.run_tasks(tasks).await
            }
            Err(e) => {
                drop(processes);
                Err(e)
            }
        };

        // With the pumps gone no worker sender is left, so the console drains
        // the remaining frames and stops.
        let _ = pumps_tx.send(());
        for pump in pumps {
            if let Err(e) = pump.await {
                tracing::error!(error = %e, "Replica message pump panicked");
            }
        }
        drop(status_tx);

        match console.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => {
                return Err(BarrierError::simulation(format!(
                    "console authority panicked: {e}"
                )))
            }
        }

        // The processes have exited; anything they still hold is cleaned up.
        let finished: Vec<_> = workers.into_iter().map(ProcessReport::finished).collect();
        authority.process_status_update(&finished)?;

        result
    }

    fn build_tasks(&self, processes: &[ScriptBarriers]) -> BarrierResult<Vec<ScriptTask>> {
        let counter = Arc::new(AtomicUsize::new(0));
        let expected = self.config.total_tasks();
        let mut tasks = Vec::with_capacity(expected);

        for (p, barriers) in processes.iter().enumerate() {
            for t in 0..self.config.threads_per_process {
                let task = ScriptTaskBuilder::new(p * self.config.threads_per_process + t)
                    .barriers(barriers.clone())
                    .counter(Arc::clone(&counter), expected)
                    .rounds(self.config.rounds)
                    .wait_timeout(self.config.wait_timeout())
                    .build()?;
                tasks.push(task);
            }
        }

        Ok(tasks)
    }

    async fn run_tasks(&self, tasks: Vec<ScriptTask>) -> BarrierResult<Vec<TaskStats>> {
        let start = Instant::now();
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let shutdown_rx = self.shutdown_tx.subscribe();
            let task_id = task.id();
            handles.push((task_id, tokio::spawn(async move { task.run(shutdown_rx).await })));
        }

        // Wait for all tasks to complete
        let mut results = Vec::with_capacity(handles.len());
        let mut first_failure = None;
        for (task_id, handle) in handles {
            match handle.await {
                Ok(Ok(stats)) => {
                    tracing::debug!(task_id, rounds = stats.rounds, "Task completed");
                    results.push(stats);
                }
                Ok(Err(e)) => {
                    tracing::error!(task_id, error = %e, "Task returned error");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
                Err(e) => {
                    tracing::error!(task_id, error = %e, "Task panicked");
                    if first_failure.is_none() {
                        first_failure =
                            Some(BarrierError::simulation(format!("task {task_id} panicked")));
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        let aggregated = aggregate_task_stats(&results);
        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            tasks = aggregated.total_tasks,
            rounds = aggregated.total_rounds,
            waits = aggregated.total_waits,
            mean_wait_us = aggregated.mean_wait.as_micros() as u64,
            "Simulation completed"
        );

        match first_failure {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Automatically triggers graceful shutdown on Ctrl+C.
    pub async fn run_with_signal_handling(&self) -> BarrierResult<Vec<TaskStats>> {
        let shutdown_tx = self.shutdown_tx.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run().await;

        signal_handle.abort();

        result
    }
}

/// Each simulated process is the first worker of its own agent.
fn worker_identity(p: usize) -> WorkerIdentity {
    AgentIdentity::new(format!("agent{p}")).create_worker_identity()
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("config", &self.config)
            .field("channel_config", &self.channel_config)
            .finish()
    }
}
