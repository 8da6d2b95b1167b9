use super::evolution_engine::ProgressCallback;
use parking_lot::Mutex;
use std::sync::mpsc::Sender;

/// Reports progress through the `log` facade.
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&self, generation: usize) {
        log::info!("Generation {} starting...", generation);
    }

    fn on_generation_complete(&self, generation: usize, best_fitness: f64, hof_size: usize) {
        log::info!(
            "Generation {} complete. Best fitness: {:.4}, Hall of Fame size: {}",
            generation,
            best_fitness,
            hof_size
        );
    }

    fn on_genome_evaluated(&self, done: usize, total: usize) {
        if done % 10 == 0 || done == total {
            log::debug!("  Evaluated {}/{} genomes", done, total);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete {
        generation: usize,
        best_fitness: f64,
        hof_size: usize,
    },
    GenomeEvaluated {
        done: usize,
        total: usize,
    },
}

/// Forwards progress over a channel to another thread.
pub struct ChannelProgressCallback {
    sender: Mutex<Sender<ProgressMessage>>,
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }

    fn send(&self, message: ProgressMessage) {
        let _ = self.sender.lock().send(message);
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&self, generation: usize) {
        self.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&self, generation: usize, best_fitness: f64, hof_size: usize) {
        self.send(ProgressMessage::GenerationComplete {
            generation,
            best_fitness,
            hof_size,
        });
    }

    fn on_genome_evaluated(&self, done: usize, total: usize) {
        self.send(ProgressMessage::GenomeEvaluated { done, total });
    }
}
