//! Actor shell around one evaluator instance.
//!
//! Callers post events into a bounded control channel and return; a
//! dedicated worker thread drains one message at a time, so no evaluator
//! field needs locking. Restriction-timer expirations are interleaved with
//! external events by sizing the channel wait to the next deadline, which
//! keeps firing strictly ordered against just-posted state changes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use qnet_common::QnsError;

use crate::clock::TimeSource;
use crate::evaluator::{AccessNetworkEvaluator, EvaluatorEvent};

/// Control-queue depth per instance; collaborators post at human/radio
/// event rates, so a shallow queue is plenty.
const CONTROL_QUEUE_DEPTH: usize = 256;

pub struct EvaluatorRuntime {
    /// Taken and dropped on shutdown; the worker reads the resulting
    /// disconnect as its stop signal, so stopping cannot be lost to a
    /// full queue.
    sender: Option<Sender<EvaluatorEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl EvaluatorRuntime {
    /// Move `evaluator` onto its own worker thread, named
    /// `qnet-eval-<slot>-<capability>`.
    pub fn spawn(
        slot: u8,
        evaluator: AccessNetworkEvaluator,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let capability = evaluator.capability();
        let (sender, receiver) = bounded(CONTROL_QUEUE_DEPTH);
        let name = format!(
            "qnet-eval-{slot}-{}",
            capability.to_string().to_lowercase()
        );
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(evaluator, receiver, clock))
            .with_context(|| format!("spawning worker thread {name}"))?;
        Ok(EvaluatorRuntime {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue an event for the worker. Fails only once the runtime has shut
    /// down.
    pub fn post(&self, event: EvaluatorEvent) -> Result<(), QnsError> {
        match &self.sender {
            Some(sender) => sender.send(event).map_err(|_| QnsError::RuntimeClosed),
            None => Err(QnsError::RuntimeClosed),
        }
    }

    /// Stop the worker and wait for it; queued events drain first, then
    /// the evaluator closes on the way out. Safe to call more than once.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("evaluator worker panicked during shutdown");
        }
    }
}

impl Drop for EvaluatorRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    mut evaluator: AccessNetworkEvaluator,
    receiver: Receiver<EvaluatorEvent>,
    clock: Arc<dyn TimeSource>,
) {
    evaluator.evaluate();
    loop {
        let event = match evaluator.next_timer_deadline() {
            Some(deadline) => {
                let wait = Duration::from_millis(deadline.saturating_sub(clock.now_ms()));
                match receiver.recv_timeout(wait) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => {
                        evaluator.process_timers();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => receiver.recv().ok(),
        };
        match event {
            Some(event) => evaluator.handle_event(event),
            // Every sender is gone: the runtime shut down.
            None => break,
        }
    }
    debug!("evaluator worker exiting");
    evaluator.close();
}
