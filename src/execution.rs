use crate::engines::generation::ParameterSet;
use crate::engines::risk::GateStatus;
use crate::error::{EvoError, Result};
use crate::types::GenomeId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

/// What the core hands to the execution side. It never places orders itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionSignal {
    Parameters {
        genome_id: GenomeId,
        params: ParameterSet,
        status: GateStatus,
    },
    Halt {
        genome_id: GenomeId,
        reason: String,
    },
}

impl ExecutionSignal {
    pub fn genome_id(&self) -> GenomeId {
        match self {
            ExecutionSignal::Parameters { genome_id, .. } | ExecutionSignal::Halt { genome_id, .. } => {
                *genome_id
            }
        }
    }
}

pub trait ExecutionSink: Send + Sync {
    fn publish(&self, signal: ExecutionSignal) -> Result<()>;
}

/// Sends signals to whoever holds the receiving end.
pub struct ChannelExecutionSink {
    sender: Mutex<Sender<ExecutionSignal>>,
}

impl ChannelExecutionSink {
    pub fn new(sender: Sender<ExecutionSignal>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl ExecutionSink for ChannelExecutionSink {
    fn publish(&self, signal: ExecutionSignal) -> Result<()> {
        self.sender
            .lock()
            .send(signal)
            .map_err(|e| EvoError::Execution(format!("receiver dropped: {:?}", e.0.genome_id())))
    }
}

/// Discards every signal; for dry runs.
pub struct NullExecutionSink;

impl ExecutionSink for NullExecutionSink {
    fn publish(&self, signal: ExecutionSignal) -> Result<()> {
        log::debug!("Dropping execution signal for {}", signal.genome_id());
        Ok(())
    }
}
