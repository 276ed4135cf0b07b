// ABOUTME: Fan-out of one host runner per target, fan-in of all their output.
// ABOUTME: Runner errors and panics surface as host-scoped failures, never as process aborts.

use crate::grep::FilterSpec;
use crate::host::{HostError, HostJob, panic_reason, run_host};
use crate::merge::merge;
use crate::ssh::{HostTarget, PtySize, Transport};
use crate::stream::Message;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 255;

/// Tunables for one fleet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Buffer size of every per-host channel and of the merged channel.
    pub channel_capacity: usize,
    pub pty: PtySize,
    /// Upper bound on simultaneous connection attempts. None is unbounded.
    pub max_concurrent_connects: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            pty: PtySize::default(),
            max_concurrent_connects: None,
        }
    }
}

/// Everything needed to run one filter across a set of hosts.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub hosts: Vec<HostTarget>,
    pub spec: FilterSpec,
    pub options: RunOptions,
}

/// A running fleet. Both receivers close once every host has finished.
pub struct FleetRun {
    pub messages: mpsc::Receiver<Message>,
    pub failures: mpsc::UnboundedReceiver<HostError>,
}

/// Start one runner per host in `plan`.
pub fn launch(transport: Arc<dyn Transport>, plan: &RunPlan) -> FleetRun {
    let capacity = plan.options.channel_capacity.max(1);
    let script: Arc<str> = plan.spec.script().into();
    let gate = plan
        .options
        .max_concurrent_connects
        .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
    let (failure_tx, failures) = mpsc::unbounded_channel();

    let mut receivers = Vec::with_capacity(plan.hosts.len() * 2);
    for target in &plan.hosts {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (err_tx, err_rx) = mpsc::channel(capacity);
        receivers.push(out_rx);
        receivers.push(err_rx);

        let host = target.host.clone();
        let target = target.clone();
        let transport = Arc::clone(&transport);
        let script = Arc::clone(&script);
        let gate = gate.clone();
        let pty = plan.options.pty;

        let runner = tokio::spawn(async move {
            let job = HostJob {
                transport: transport.as_ref(),
                target: &target,
                script: &script,
                pty,
                connect_gate: gate.as_deref(),
            };
            run_host(job, out_tx, err_tx).await
        });

        let failure_tx = failure_tx.clone();
        tokio::spawn(async move {
            let failure = match runner.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(e) if e.is_panic() => HostError::Aborted {
                    host,
                    reason: panic_reason(e.into_panic()),
                },
                Err(e) => HostError::Aborted {
                    host,
                    reason: e.to_string(),
                },
            };
            tracing::debug!(host = failure.host(), "host failed: {failure}");
            let _ = failure_tx.send(failure);
        });
    }

    FleetRun {
        messages: merge(receivers, capacity),
        failures,
    }
}
