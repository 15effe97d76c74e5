use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Concrete breaker type guarding skip-trace batch calls.
pub type SkipTraceBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for skip-trace batch requests.
///
/// Three consecutive failed batches trip the breaker; while it is open,
/// batches short-circuit to the unenriched-passthrough path instead of
/// hitting the provider. Recovery attempts back off exponentially from 10s
/// to 60s.
pub fn create_skip_trace_circuit_breaker() -> SkipTraceBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(3, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
