//! Lifecycle state machine for the runtime.

use thiserror::Error;
use tracing::debug;

/// States the runtime moves through between construction and teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Components constructed; bootstrap tools not yet registered.
    Init,
    /// Bootstrap complete; not yet accepting work.
    Ready,
    /// Accepting routing, execution, and plugin requests.
    Running,
    /// Refusing new work while in-flight executions finish.
    Draining,
    /// Torn down; no further work is accepted.
    Stopped,
}

impl RuntimeState {
    /// Returns `true` when new work is accepted.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` once the runtime has stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Inputs to [`Lifecycle::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Bootstrap tools were registered.
    Boot,
    /// Begin accepting work.
    Start,
    /// Stop accepting work and wait for in-flight executions.
    Drain,
    /// Finish shutdown.
    Stop,
    /// Stop immediately from any state.
    Abort,
}

/// Rejected lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// `event` has no edge out of `from`.
    #[error("invalid lifecycle transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State the runtime was in.
        from: RuntimeState,
        /// Event that was rejected.
        event: LifecycleEvent,
    },
}

/// Result of a lifecycle transition.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Tracks the [`RuntimeState`] of one [`crate::ToolRuntime`].
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    state: RuntimeState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Starts in [`RuntimeState::Init`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RuntimeState::Init,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RuntimeState {
        self.state
    }

    /// Moves to the state `event` leads to and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<RuntimeState> {
        let next = match (self.state, event) {
            (RuntimeState::Init, LifecycleEvent::Boot) => Some(RuntimeState::Ready),
            (RuntimeState::Ready, LifecycleEvent::Start) => Some(RuntimeState::Running),
            (RuntimeState::Ready | RuntimeState::Running, LifecycleEvent::Drain) => {
                Some(RuntimeState::Draining)
            }
            (RuntimeState::Draining | RuntimeState::Stopped, LifecycleEvent::Stop)
            | (_, LifecycleEvent::Abort) => Some(RuntimeState::Stopped),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(?self.state, ?next_state, ?event, "runtime lifecycle transition");
            self.state = next_state;
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_start_drain_stop() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), RuntimeState::Init);
        lifecycle.transition(LifecycleEvent::Boot).unwrap();
        lifecycle.transition(LifecycleEvent::Start).unwrap();
        assert!(lifecycle.state().is_running());
        lifecycle.transition(LifecycleEvent::Drain).unwrap();
        assert!(!lifecycle.state().is_running());
        lifecycle.transition(LifecycleEvent::Stop).unwrap();
        assert!(lifecycle.state().is_terminal());
        // Stopping twice is harmless.
        lifecycle.transition(LifecycleEvent::Stop).unwrap();
    }

    #[test]
    fn abort_is_global() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleEvent::Abort).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn start_before_boot_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.transition(LifecycleEvent::Start).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: RuntimeState::Init,
                event: LifecycleEvent::Start,
            }
        );
        lifecycle.transition(LifecycleEvent::Boot).unwrap();
        lifecycle.transition(LifecycleEvent::Start).unwrap();
        assert!(lifecycle.transition(LifecycleEvent::Boot).is_err());
    }
}
