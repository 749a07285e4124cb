//! Authorization metrics
//!
//! Thread-safe counters of guard decisions and membership outcomes, served
//! as JSON at `/metrics`.

use crate::access_control::ModulePermissionGuard;
use crate::auth::UserContext;
use crate::error::{GuardError, MembershipError};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};

/// Authorization metrics collector
pub struct AuthzMetrics {
    /// Server start time
    start_time: Instant,
    /// Server start time as SystemTime (for display)
    start_system_time: SystemTime,
    total_checks: AtomicU64,
    allowed: AtomicU64,
    forbidden: AtomicU64,
    unauthenticated: AtomicU64,
    /// Misdeclared guards; server bugs, kept apart from denials
    configuration_errors: AtomicU64,
    /// Denials caused by storage failures
    unavailable: AtomicU64,
    invariant_violations: AtomicU64,
    /// Combined per-key data (single lock for all collections)
    data: RwLock<MetricsData>,
    /// Maximum recent decisions to keep
    max_recent_decisions: usize,
}

#[derive(Default)]
struct ModuleStatsInner {
    checks: u64,
    allowed: u64,
    denied: u64,
    denied_permissions: HashMap<String, u64>,
    last_checked: Option<SystemTime>,
}

#[derive(Default)]
struct OperationStatsInner {
    count: u64,
    failures: u64,
    invariant_violations: u64,
}

#[derive(Default)]
struct MetricsData {
    module_stats: HashMap<String, ModuleStatsInner>,
    operation_stats: HashMap<String, OperationStatsInner>,
    recent_decisions: VecDeque<DecisionRecord>,
}

/// Record of a recent guard decision
#[derive(Clone, Serialize)]
pub struct DecisionRecord {
    pub module: Option<String>,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// `Allowed` or the error kind of the denial
    pub outcome: String,
    pub timestamp: u64,
}

/// Serializable per-module statistics
#[derive(Clone, Serialize)]
pub struct ModuleStats {
    pub name: String,
    pub checks: u64,
    pub allowed: u64,
    pub denied: u64,
    /// Required permission sets that were denied most often, by joined name
    pub top_denied: Vec<DeniedCount>,
    pub last_checked: Option<u64>,
}

#[derive(Clone, Serialize)]
pub struct DeniedCount {
    pub permissions: String,
    pub count: u64,
}

/// Serializable per-operation membership statistics
#[derive(Clone, Serialize)]
pub struct OperationStats {
    pub operation: String,
    pub count: u64,
    pub failures: u64,
    pub invariant_violations: u64,
}

/// Overall metrics snapshot for API
#[derive(Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub start_time: u64,
    pub total_checks: u64,
    pub allowed: u64,
    pub forbidden: u64,
    pub unauthenticated: u64,
    pub configuration_errors: u64,
    pub unavailable: u64,
    pub invariant_violations: u64,
    pub checks_per_minute: f64,
    pub modules: Vec<ModuleStats>,
    pub operations: Vec<OperationStats>,
    pub recent_decisions: Vec<DecisionRecord>,
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl AuthzMetrics {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Create a collector keeping at most `max_recent_decisions` decisions
    pub fn with_capacity(max_recent_decisions: usize) -> Self {
        Self {
            start_time: Instant::now(),
            start_system_time: SystemTime::now(),
            total_checks: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            forbidden: AtomicU64::new(0),
            unauthenticated: AtomicU64::new(0),
            configuration_errors: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            invariant_violations: AtomicU64::new(0),
            data: RwLock::new(MetricsData {
                recent_decisions: VecDeque::with_capacity(max_recent_decisions),
                ..Default::default()
            }),
            max_recent_decisions,
        }
    }

    // Helper methods for safe lock access with poison recovery

    fn write_data(&self) -> RwLockWriteGuard<'_, MetricsData> {
        self.data.write().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics data lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_data(&self) -> RwLockReadGuard<'_, MetricsData> {
        self.data.read().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics data lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record the outcome of one guard evaluation
    pub fn record_guard(
        &self,
        guard: &ModulePermissionGuard,
        user: Option<&UserContext>,
        outcome: &Result<(), GuardError>,
    ) {
        self.record_decision(guard.module(), guard.permissions(), user, outcome);
    }

    /// Record the outcome of an ad-hoc permission check
    pub fn record_decision(
        &self,
        module: Option<&str>,
        permissions: &[String],
        user: Option<&UserContext>,
        outcome: &Result<(), GuardError>,
    ) {
        let now = SystemTime::now();
        self.total_checks.fetch_add(1, Ordering::Relaxed);

        let counter = match outcome {
            Ok(()) => &self.allowed,
            Err(GuardError::Unauthenticated) => &self.unauthenticated,
            Err(GuardError::Configuration(_)) => &self.configuration_errors,
            Err(GuardError::Forbidden { .. }) => &self.forbidden,
            Err(GuardError::Unavailable(_)) => &self.unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write_data();

        if let Some(module) = module {
            let entry = data.module_stats.entry(module.to_string()).or_default();
            entry.checks += 1;
            entry.last_checked = Some(now);
            if outcome.is_ok() {
                entry.allowed += 1;
            } else {
                entry.denied += 1;
                *entry
                    .denied_permissions
                    .entry(permissions.join(" | "))
                    .or_default() += 1;
            }
        }

        if data.recent_decisions.len() >= self.max_recent_decisions {
            data.recent_decisions.pop_front();
        }
        data.recent_decisions.push_back(DecisionRecord {
            module: module.map(String::from),
            permissions: permissions.to_vec(),
            user_id: user.map(|u| u.id.to_string()),
            outcome: match outcome {
                Ok(()) => "Allowed".to_string(),
                Err(e) => e.kind().to_string(),
            },
            timestamp: unix_secs(now),
        });
    }

    /// Record the outcome of a membership operation
    pub fn record_membership<T>(&self, operation: &str, outcome: &Result<T, MembershipError>) {
        let violation = matches!(outcome, Err(MembershipError::InvariantViolation(_)));
        if violation {
            self.invariant_violations.fetch_add(1, Ordering::Relaxed);
        }

        let mut data = self.write_data();
        let entry = data.operation_stats.entry(operation.to_string()).or_default();
        entry.count += 1;
        if outcome.is_err() {
            entry.failures += 1;
        }
        if violation {
            entry.invariant_violations += 1;
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let total_checks = self.total_checks.load(Ordering::Relaxed);
        let checks_per_minute = if uptime_secs > 0 {
            (total_checks as f64 / uptime_secs as f64) * 60.0
        } else {
            0.0
        };

        let data = self.read_data();

        let mut modules: Vec<ModuleStats> = data
            .module_stats
            .iter()
            .map(|(name, s)| {
                let mut top_denied: Vec<DeniedCount> = s
                    .denied_permissions
                    .iter()
                    .map(|(permissions, count)| DeniedCount {
                        permissions: permissions.clone(),
                        count: *count,
                    })
                    .collect();
                top_denied.sort_unstable_by(|a, b| b.count.cmp(&a.count));
                top_denied.truncate(10);

                ModuleStats {
                    name: name.clone(),
                    checks: s.checks,
                    allowed: s.allowed,
                    denied: s.denied,
                    top_denied,
                    last_checked: s.last_checked.map(unix_secs),
                }
            })
            .collect();
        modules.sort_unstable_by(|a, b| b.checks.cmp(&a.checks));

        let mut operations: Vec<OperationStats> = data
            .operation_stats
            .iter()
            .map(|(operation, s)| OperationStats {
                operation: operation.clone(),
                count: s.count,
                failures: s.failures,
                invariant_violations: s.invariant_violations,
            })
            .collect();
        operations.sort_unstable_by(|a, b| b.count.cmp(&a.count));

        let recent_decisions: Vec<_> = data.recent_decisions.iter().cloned().collect();
        drop(data);

        MetricsSnapshot {
            uptime_secs,
            start_time: unix_secs(self.start_system_time),
            total_checks,
            allowed: self.allowed.load(Ordering::Relaxed),
            forbidden: self.forbidden.load(Ordering::Relaxed),
            unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
            configuration_errors: self.configuration_errors.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
            checks_per_minute,
            modules,
            operations,
            recent_decisions,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }
}

impl Default for AuthzMetrics {
    fn default() -> Self {
        Self::new()
    }
}
