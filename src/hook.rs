//! Hook registry for circuit breaker events.
//!
//! Hooks run on the calling thread after the breaker has released its lock.
//! A hook may read the breaker (or even route a call through it) without
//! deadlocking.
//!
//! Transitions made by one call reach its hooks in order. Transitions made on
//! different threads are delivered independently and may interleave, so a
//! hook that needs the current state should call
//! [`CircuitBreaker::state`](crate::CircuitBreaker::state).
//!
//! A call that panics inside `execute` is still recorded as a failure, but the
//! transitions it causes are only logged: hooks and the metric sink are not
//! run while the thread is unwinding.

use crate::state::State;
use parking_lot::RwLock;
use std::sync::Arc;

type TransitionFn = Arc<dyn Fn(&str, State, State) + Send + Sync + 'static>;
type NamedFn = Arc<dyn Fn(&str) + Send + Sync + 'static>;
type RejectedFn = Arc<dyn Fn(&str, State) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
pub struct HookRegistry {
    on_state_change: RwLock<Option<TransitionFn>>,
    on_open: RwLock<Option<NamedFn>>,
    on_close: RwLock<Option<NamedFn>>,
    on_half_open: RwLock<Option<NamedFn>>,
    on_rejected: RwLock<Option<RejectedFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_state_change", &self.on_state_change.read().is_some())
            .field("on_open", &self.on_open.read().is_some())
            .field("on_close", &self.on_close.read().is_some())
            .field("on_half_open", &self.on_half_open.read().is_some())
            .field("on_rejected", &self.on_rejected.read().is_some())
            .finish()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_state_change: RwLock::new(None),
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
            on_rejected: RwLock::new(None),
        }
    }

    /// Sets the observer called with `(name, from, to)` on every transition.
    pub fn set_on_state_change<F>(&self, f: F)
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        *self.on_state_change.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a call is turned away. Receives the state
    /// that caused the rejection.
    pub fn set_on_rejected<F>(&self, f: F)
    where
        F: Fn(&str, State) + Send + Sync + 'static,
    {
        *self.on_rejected.write() = Some(Arc::new(f));
    }

    /// Executes the hooks registered for a transition.
    pub(crate) fn execute_state_transition_hook(&self, name: &str, from: State, to: State) {
        // Clone out of the lock so a hook can replace hooks without deadlocking.
        let observer = self.on_state_change.read().clone();
        if let Some(hook) = observer {
            hook(name, from, to);
        }

        let slot = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook(name);
        }
    }

    /// Executes the rejection hook.
    pub(crate) fn execute_rejected_hook(&self, name: &str, state: State) {
        let hook = self.on_rejected.read().clone();
        if let Some(hook) = hook {
            hook(name, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_transition_hooks_fire_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hooks = HookRegistry::new();

        let log = Arc::clone(&seen);
        hooks.set_on_state_change(move |name, from, to| {
            log.lock().push(format!("{name}: {from} -> {to}"));
        });
        let log = Arc::clone(&seen);
        hooks.set_on_open(move |name| log.lock().push(format!("{name} opened")));

        hooks.execute_state_transition_hook("db", State::Closed, State::Open);
        hooks.execute_state_transition_hook("db", State::Open, State::HalfOpen);

        assert_eq!(
            *seen.lock(),
            vec!["db: closed -> open", "db opened", "db: open -> half-open"]
        );
    }

    #[test]
    fn test_empty_registry_is_noop() {
        let hooks = HookRegistry::default();
        hooks.execute_state_transition_hook("db", State::Closed, State::Open);
        hooks.execute_rejected_hook("db", State::Open);
    }
}
