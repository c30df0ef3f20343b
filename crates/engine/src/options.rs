//! Execution options: scheduling mode, streaming mode, background eligibility.

use nebula_action::StreamMode;

/// How independent work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Single-threaded cooperative scheduling. Initiators run in
    /// declaration order; within a node, signalled execution outputs
    /// propagate depth-first in the order they were signalled.
    Sequential,
    /// Independent initiators and independent subgraphs may run
    /// concurrently, bounded by `max_parallelism`.
    Parallel {
        /// Upper bound on concurrently-running node bodies.
        max_parallelism: usize,
    },
}

impl ExecutionMode {
    /// `Parallel` clamped so `max_parallelism` is never zero — a zero bound
    /// would deadlock the semaphore-backed scheduler permanently.
    #[must_use]
    pub fn parallel(max_parallelism: usize) -> Self {
        Self::Parallel {
            max_parallelism: max_parallelism.max(1),
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Sequential
    }
}

/// Options governing one `execute`/`execute_group` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionOptions {
    pub mode: ExecutionMode,
    pub allow_background: bool,
    pub stream_mode: StreamMode,
}

impl ExecutionOptions {
    /// Sequential mode, foreground, sequential streaming — the engine's
    /// default posture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_stream_mode(mut self, stream_mode: StreamMode) -> Self {
        self.stream_mode = stream_mode;
        self
    }

    #[must_use]
    pub fn with_background(mut self, allow_background: bool) -> Self {
        self.allow_background = allow_background;
        self
    }

    #[must_use]
    pub fn max_parallelism(&self) -> Option<usize> {
        match self.mode {
            ExecutionMode::Parallel { max_parallelism } => Some(max_parallelism),
            ExecutionMode::Sequential => None,
        }
    }
}
