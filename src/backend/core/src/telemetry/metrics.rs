//! Decision and cache metrics.
//!
//! Everything is emitted through the `metrics` facade; without an installed
//! recorder the calls are no-ops. Installing an exporter is up to the
//! embedding application.
//!
//! | Metric                                   | Type      | Labels                      |
//! |------------------------------------------|-----------|-----------------------------|
//! | `packguard_rbac_decisions_total`         | counter   | resource_type, outcome, via |
//! | `packguard_rbac_decision_errors_total`   | counter   | resource_type, kind         |
//! | `packguard_rbac_decision_duration_seconds` | histogram | resource_type             |
//! | `packguard_rbac_cache_hits_total`        | counter   | table                       |
//! | `packguard_rbac_cache_misses_total`      | counter   | table                       |
//! | `packguard_rbac_cache_invalidations_total` | counter | event                       |
//! | `packguard_errors_total`                 | counter   | code, category              |

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;
use crate::rbac::types::ResourceType;

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "packguard_rbac_decisions_total",
            "Permission checks answered, by outcome"
        );
        describe_counter!(
            "packguard_rbac_decision_errors_total",
            "Permission checks that failed with an error"
        );
        describe_histogram!(
            "packguard_rbac_decision_duration_seconds",
            "Time spent answering a permission check"
        );
        describe_counter!("packguard_rbac_cache_hits_total", "RBAC cache hits");
        describe_counter!("packguard_rbac_cache_misses_total", "RBAC cache misses");
        describe_counter!(
            "packguard_rbac_cache_invalidations_total",
            "RBAC cache invalidation events"
        );
        describe_counter!("packguard_errors_total", "Errors by code");
    });
}

/// Metrics for permission decisions.
pub struct DecisionMetrics;

impl DecisionMetrics {
    /// Record an answered check. `via` names the rule that decided it.
    pub fn record(resource_type: ResourceType, allowed: bool, via: &'static str, elapsed: Duration) {
        counter!(
            "packguard_rbac_decisions_total",
            "resource_type" => resource_type.as_str(),
            "outcome" => if allowed { "allow" } else { "deny" },
            "via" => via,
        )
        .increment(1);

        histogram!(
            "packguard_rbac_decision_duration_seconds",
            "resource_type" => resource_type.as_str(),
        )
        .record(elapsed.as_secs_f64());
    }

    /// Record a check that returned an error.
    pub fn record_error(resource_type: ResourceType, kind: ErrorKind) {
        counter!(
            "packguard_rbac_decision_errors_total",
            "resource_type" => resource_type.as_str(),
            "kind" => kind.as_str(),
        )
        .increment(1);
    }

    /// Start a timer for one check.
    pub fn start() -> DecisionTimer {
        DecisionTimer {
            start: Instant::now(),
        }
    }
}

/// Measures one decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionTimer {
    start: Instant,
}

impl DecisionTimer {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Metrics for the RBAC cache.
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn hit(table: &'static str) {
        counter!("packguard_rbac_cache_hits_total", "table" => table).increment(1);
    }

    pub fn miss(table: &'static str) {
        counter!("packguard_rbac_cache_misses_total", "table" => table).increment(1);
    }

    pub fn invalidation(event: &'static str) {
        counter!("packguard_rbac_cache_invalidations_total", "event" => event).increment(1);
    }
}
