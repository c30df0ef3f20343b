//! Step-mode gate: a pausable checkpoint the engine passes through before
//! scheduling each node body.

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const PAUSED: u8 = 1;
const STEPPING_ONE: u8 = 2;

/// The gate's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Running,
    Paused,
    SteppingOne,
}

/// A pausable gate sitting at every scheduling point.
///
/// `start_paused` moves to `Paused`; `step_once` moves `Paused` ->
/// `SteppingOne`, lets exactly one node body run, then falls back to
/// `Paused`; `resume` moves to `Running` and stays there. `wait_turn` is
/// the checkpoint node scheduling calls through — it blocks while the gate
/// is `Paused` and is itself cancellable.
#[derive(Debug)]
pub struct StepGate {
    state: AtomicU8,
    notify: Notify,
}

impl StepGate {
    /// A gate that starts `Running` — the default, non-debugging posture.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            notify: Notify::new(),
        }
    }

    /// A gate that starts `Paused`, for a debugger attaching before the
    /// first node runs.
    #[must_use]
    pub fn start_paused() -> Self {
        Self {
            state: AtomicU8::new(PAUSED),
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::SeqCst) {
            PAUSED => GateState::Paused,
            STEPPING_ONE => GateState::SteppingOne,
            _ => GateState::Running,
        }
    }

    /// Let exactly one more node body through, then fall back to `Paused`.
    /// No-op if the gate isn't currently `Paused`.
    pub fn step_once(&self) {
        if self
            .state
            .compare_exchange(PAUSED, STEPPING_ONE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.notify.notify_waiters();
        }
    }

    /// Leave debugging mode entirely; every subsequent node body runs
    /// without waiting at the gate.
    pub fn resume(&self) {
        self.state.store(RUNNING, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Re-enter `Paused` from `Running` or `SteppingOne`.
    pub fn pause(&self) {
        self.state.store(PAUSED, Ordering::SeqCst);
    }

    /// Block until this scheduling point may proceed, or return `true` if
    /// `cancel` fires first.
    pub async fn wait_turn(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.state.load(Ordering::SeqCst) {
                RUNNING => return false,
                STEPPING_ONE => {
                    // Consume the single step, then fall back to Paused for
                    // the next scheduling point.
                    let _ = self.state.compare_exchange(
                        STEPPING_ONE,
                        PAUSED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return false;
                }
                _ => {
                    tokio::select! {
                        () = self.notify.notified() => continue,
                        () = cancel.cancelled() => return true,
                    }
                }
            }
        }
    }
}

impl Default for StepGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_gate_is_running() {
        let gate = StepGate::new();
        assert_eq!(gate.state(), GateState::Running);
    }

    #[test]
    fn start_paused_is_paused() {
        let gate = StepGate::start_paused();
        assert_eq!(gate.state(), GateState::Paused);
    }

    #[tokio::test]
    async fn running_gate_never_blocks() {
        let gate = StepGate::new();
        let cancel = CancellationToken::new();
        assert!(!gate.wait_turn(&cancel).await);
    }

    #[tokio::test]
    async fn step_once_admits_exactly_one_then_pauses_again() {
        let gate = StepGate::start_paused();
        gate.step_once();
        assert_eq!(gate.state(), GateState::SteppingOne);

        let cancel = CancellationToken::new();
        assert!(!gate.wait_turn(&cancel).await);
        assert_eq!(gate.state(), GateState::Paused);
    }

    #[tokio::test]
    async fn resume_unblocks_a_waiting_gate() {
        let gate = std::sync::Arc::new(StepGate::start_paused());
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait_turn(&cancel).await })
        };

        tokio::task::yield_now().await;
        gate.resume();
        let cancelled = waiter.await.unwrap();
        assert!(!cancelled);
        assert_eq!(gate.state(), GateState::Running);
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_paused_gate() {
        let gate = std::sync::Arc::new(StepGate::start_paused());
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait_turn(&cancel).await })
        };

        tokio::task::yield_now().await;
        cancel.cancel();
        let cancelled = waiter.await.unwrap();
        assert!(cancelled);
    }

    #[test]
    fn pause_moves_back_to_paused() {
        let gate = StepGate::new();
        gate.pause();
        assert_eq!(gate.state(), GateState::Paused);
    }
}
