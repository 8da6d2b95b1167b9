use super::checkpoint::Checkpointer;
use crate::engines::generation::{
    CancellationToken, ChannelProgressCallback, EvolutionScheduler, ProgressMessage, RunSummary,
};
use crate::error::{EvoError, Result};
use std::sync::mpsc::{channel, Receiver};
use std::thread::{self, JoinHandle};

pub type EvolutionResult = Result<RunSummary>;

/// Runs a scheduler on its own thread and reports progress over a channel.
pub struct EvolutionRunner {
    handle: Option<JoinHandle<EvolutionResult>>,
    progress_rx: Option<Receiver<ProgressMessage>>,
    cancel: CancellationToken,
}

impl EvolutionRunner {
    /// Start evolution in a background thread
    pub fn start(scheduler: EvolutionScheduler, checkpointer: Option<Checkpointer>) -> Result<Self> {
        let (progress_tx, progress_rx) = channel();
        let cancel = scheduler.cancellation_token();

        let handle = thread::Builder::new()
            .name("evolution".to_string())
            .spawn(move || Self::run_evolution(scheduler, checkpointer, progress_tx))
            .map_err(|e| EvoError::Execution(format!("Failed to spawn evolution thread: {}", e)))?;

        Ok(Self {
            handle: Some(handle),
            progress_rx: Some(progress_rx),
            cancel,
        })
    }

    /// Poll for progress updates (non-blocking)
    pub fn poll_progress(&mut self) -> Option<ProgressMessage> {
        self.progress_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    /// Results if the thread has finished, `None` while it is still running.
    pub fn try_get_results(&mut self) -> Option<EvolutionResult> {
        let handle = self.handle.take()?;
        if handle.is_finished() {
            Some(Self::join(handle))
        } else {
            self.handle = Some(handle);
            None
        }
    }

    /// Block until the run ends.
    pub fn wait(mut self) -> EvolutionResult {
        match self.handle.take() {
            Some(handle) => Self::join(handle),
            None => Err(EvoError::Execution("Evolution results already taken".to_string())),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn join(handle: JoinHandle<EvolutionResult>) -> EvolutionResult {
        handle
            .join()
            .unwrap_or_else(|_| Err(EvoError::Execution("Evolution thread panicked".to_string())))
    }

    fn run_evolution(
        mut scheduler: EvolutionScheduler,
        checkpointer: Option<Checkpointer>,
        progress_tx: std::sync::mpsc::Sender<ProgressMessage>,
    ) -> EvolutionResult {
        log::info!("Evolution thread started");
        let callback = ChannelProgressCallback::new(progress_tx);

        let summary = match &checkpointer {
            Some(checkpointer) => {
                checkpointer.restore(&mut scheduler)?;
                scheduler.run_with_checkpoint(&callback, &mut |s| checkpointer.save(s))?
            }
            None => scheduler.run(&callback)?,
        };

        log::info!(
            "Evolution finished after {} generations ({:?}), {} genomes in hall of fame",
            summary.generations_completed,
            summary.termination,
            summary.hall_of_fame.len()
        );
        Ok(summary)
    }
}

impl Drop for EvolutionRunner {
    fn drop(&mut self) {
        self.cancel();
    }
}
