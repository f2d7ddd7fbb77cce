//! Provisioning suites: one dummy job per available host, done once enough
//! of them succeed

use crate::control::TestDefinition;
use crate::controller::{SuiteError, WaitStrategy};
use crate::jobqueue::JobQueue;
use crate::keyval;
use tracing::{info, warn};

/// Pool whose hosts are shared by suite jobs and never provisioned in bulk
const SUITES_POOL: &str = "pool:suites";

/// Labels the lab can install on demand, so hosts need not carry them yet
fn is_provisionable(label: &str) -> bool {
    [
        keyval::CROS_VERSION_PREFIX,
        keyval::FW_RW_VERSION_PREFIX,
        keyval::FW_RO_VERSION_PREFIX,
    ]
    .iter()
    .any(|prefix| {
        label
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// Plan a provisioning suite.
///
/// Returns one copy of `dummy_test` per available host carrying the
/// non-provisionable `suite_deps`, capped at `num_max`, and a strategy that
/// stops waiting after `min(num_required, tests)` successes.
pub fn provision_tests(
    queue: &dyn JobQueue,
    suite_deps: &[String],
    dummy_test: &TestDefinition,
    num_required: usize,
    num_max: Option<usize>,
) -> Result<(Vec<TestDefinition>, WaitStrategy), SuiteError> {
    if suite_deps.iter().any(|d| d == SUITES_POOL) {
        warn!("Provisioning is disabled for {SUITES_POOL}");
        return Ok((Vec::new(), WaitStrategy::UntilSuccesses { required: 0 }));
    }

    let labels: Vec<String> = suite_deps
        .iter()
        .filter(|d| !is_provisionable(d))
        .cloned()
        .collect();
    let available = queue
        .get_hosts(&labels)?
        .into_iter()
        .filter(|h| h.is_available())
        .count();
    let count = num_max.map_or(available, |max| available.min(max));
    info!(
        "Provisioning {count} hosts ({available} available) with labels {}",
        labels.join(", ")
    );

    let tests = vec![dummy_test.clone(); count];
    let required = num_required.min(tests.len());
    Ok((tests, WaitStrategy::UntilSuccesses { required }))
}
