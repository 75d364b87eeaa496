//! Bring a service to the declared state and wait for it to settle.
//!
//! ```text
//! Absent  ─► Creating ─┐
//!                      ├─► Stabilizing ─► Stable
//! Present ─► Updating ─┘
//!
//! Rejected / TimedOut are terminal and reachable from any in-flight phase.
//! ```

use crate::error::{BossError, Result};
use crate::platform::{Platform, PlatformError, ServiceStatus};
use crate::resolve::ResolvedDocument;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;

/// Attributes `UpdateService` accepts. Everything else in a service document
/// only applies when the service is created.
pub const UPDATABLE_ATTRIBUTES: &[&str] = &[
    "taskDefinition",
    "desiredCount",
    "deploymentConfiguration",
    "networkConfiguration",
    "placementConstraints",
    "placementStrategy",
    "platformVersion",
    "forceNewDeployment",
    "healthCheckGracePeriodSeconds",
    "capacityProviderStrategy",
    "enableExecuteCommand",
    "enableECSManagedTags",
    "loadBalancers",
    "propagateTags",
    "serviceRegistries",
];

/// Identity keys the platform call carries separately.
const IDENTITY_KEYS: &[&str] = &["cluster", "serviceName", "service"];

// ---------------------------------------------------------------------------
// ReconcilePhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePhase {
    Absent,
    Present,
    Creating,
    Updating,
    Stabilizing,
    Stable,
    Rejected,
    TimedOut,
}

impl ReconcilePhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReconcilePhase::Stable | ReconcilePhase::Rejected | ReconcilePhase::TimedOut
        )
    }

    pub fn can_transition_to(self, next: ReconcilePhase) -> bool {
        use ReconcilePhase::*;
        match (self, next) {
            (Absent, Creating) | (Present, Updating) => true,
            (Creating | Updating, Stabilizing) => true,
            (Stabilizing, Stable) => true,
            (from, Rejected | TimedOut) => !from.is_terminal(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceState / ReconcileOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub cluster: String,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<String>,
    pub desired_count: u32,
    pub running_count: u32,
    pub phase: ReconcilePhase,
    /// Whether this run created the service.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceReconciler
// ---------------------------------------------------------------------------

pub struct ServiceReconciler<'a> {
    platform: &'a dyn Platform,
    options: ReconcileOptions,
}

struct Tracker<'s> {
    cluster: &'s str,
    service: &'s str,
    phase: ReconcilePhase,
}

impl Tracker<'_> {
    fn advance(&mut self, next: ReconcilePhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        tracing::debug!(
            cluster = %self.cluster,
            service = %self.service,
            from = ?self.phase,
            to = ?next,
            "reconcile phase"
        );
        self.phase = next;
    }
}

impl<'a> ServiceReconciler<'a> {
    pub fn new(platform: &'a dyn Platform, options: ReconcileOptions) -> Self {
        Self { platform, options }
    }

    /// Create or update `service_name` in `cluster` from `document`, then
    /// wait until it is stable or the timeout elapses.
    pub async fn reconcile(
        &self,
        cluster: &str,
        service_name: &str,
        document: &ResolvedDocument,
    ) -> Result<ServiceState> {
        let rejected = |message: String| BossError::ReconcileRejected {
            cluster: cluster.to_string(),
            service: service_name.to_string(),
            message,
        };
        let map_err = |e: PlatformError| match e {
            PlatformError::Rejected(m) => rejected(m),
            PlatformError::Unavailable(m) => BossError::Platform(m),
        };

        let existing = self
            .platform
            .find_service(cluster, service_name)
            .await
            .map_err(map_err)?;
        if existing.len() > 1 {
            return Err(rejected(format!(
                "{} services match this name; expected at most one",
                existing.len()
            )));
        }

        let attributes = document
            .as_value()
            .as_object()
            .ok_or_else(|| rejected("service document is not an object".into()))?;

        let mut tracker = Tracker {
            cluster,
            service: service_name,
            phase: if existing.is_empty() {
                ReconcilePhase::Absent
            } else {
                ReconcilePhase::Present
            },
        };
        let created = existing.is_empty();

        if created {
            tracker.advance(ReconcilePhase::Creating);
            let mut request = attributes.clone();
            request.insert("serviceName".into(), Value::from(service_name));
            tracing::info!(%cluster, service = %service_name, "creating service");
            self.platform
                .create_service(cluster, &Value::Object(request))
                .await
                .map_err(map_err)?;
        } else {
            tracker.advance(ReconcilePhase::Updating);
            let request = updatable(attributes);
            tracing::info!(
                %cluster,
                service = %service_name,
                attributes = ?request.keys().collect::<Vec<_>>(),
                "updating service"
            );
            self.platform
                .update_service(cluster, service_name, &Value::Object(request))
                .await
                .map_err(map_err)?;
        }

        tracker.advance(ReconcilePhase::Stabilizing);
        let status = self.wait_stable(cluster, service_name).await?;
        tracker.advance(ReconcilePhase::Stable);

        tracing::info!(
            %cluster,
            service = %service_name,
            running = status.running_count,
            "service is stable"
        );
        Ok(ServiceState {
            cluster: cluster.to_string(),
            service_name: service_name.to_string(),
            task_definition: status.task_definition,
            desired_count: status.desired_count,
            running_count: status.running_count,
            phase: tracker.phase,
            created,
        })
    }

    async fn wait_stable(&self, cluster: &str, service_name: &str) -> Result<ServiceStatus> {
        let started = Instant::now();
        let deadline = started + self.options.timeout;
        let mut last: Option<ServiceStatus> = None;
        loop {
            // Each status call only gets what is left of the deadline.
            let remaining = deadline.saturating_duration_since(Instant::now());
            let polled = tokio::time::timeout(
                remaining,
                self.platform.service_status(cluster, service_name),
            )
            .await;
            if let Ok(reply) = polled {
                let status = reply.map_err(|e| match e {
                    PlatformError::Rejected(message) => BossError::ReconcileRejected {
                        cluster: cluster.to_string(),
                        service: service_name.to_string(),
                        message,
                    },
                    PlatformError::Unavailable(m) => BossError::Platform(m),
                })?;
                if status.is_stable() {
                    return Ok(status);
                }
                tracing::debug!(
                    desired = status.desired_count,
                    running = status.running_count,
                    in_progress = status.deployment_in_progress,
                    "waiting for service"
                );
                last = Some(status);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    %cluster,
                    service = %service_name,
                    answered = last.is_some(),
                    "gave up waiting for service to stabilize"
                );
                return Err(BossError::ReconcileTimeout {
                    cluster: cluster.to_string(),
                    service: service_name.to_string(),
                    waited_secs: now.duration_since(started).as_secs(),
                    last,
                });
            }
            tokio::time::sleep(self.options.poll_interval.min(deadline - now)).await;
        }
    }
}

/// The subset of `attributes` that `UpdateService` accepts.
fn updatable(attributes: &Map<String, Value>) -> Map<String, Value> {
    let mut request = Map::new();
    for (key, value) in attributes {
        if UPDATABLE_ATTRIBUTES.contains(&key.as_str()) {
            request.insert(key.clone(), value.clone());
        } else if !IDENTITY_KEYS.contains(&key.as_str()) {
            tracing::debug!(attribute = %key, "ignoring create-only attribute on update");
        }
    }
    request
}
