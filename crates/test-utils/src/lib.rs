//! Shared harness for the bundler's integration tests: task builders,
//! canned task bodies, a channel-driven fake executor and a few helpers
//! for logging and deadlines.

pub mod bodies;
pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use bundler::logging::LOG_ENV_VAR;
use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for a single scheduler run in tests. A run that exceeds it
/// is almost always a lost completion or an admission loop that never
/// resolves.
pub const RUN_DEADLINE: Duration = Duration::from_secs(10);

static TRACING: Once = Once::new();

/// Route scheduler logs through the test writer, filtered by the same
/// `BUNDLER_LOG` variable the binary reads (default `warn`).
///
/// Output only shows for failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

/// Await `run`, failing the test if it does not finish within
/// [`RUN_DEADLINE`].
pub async fn with_timeout<F, T>(run: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(RUN_DEADLINE, run).await {
        Ok(value) => value,
        Err(_) => panic!("bundler run did not finish within {RUN_DEADLINE:?}"),
    }
}
