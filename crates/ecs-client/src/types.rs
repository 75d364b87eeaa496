//! Typed views of the ECS and ECR response shapes this crate reads.
//!
//! Only the fields the deploy pipeline consults are modelled; documents that
//! are passed through untouched (task definitions, service descriptions) stay
//! as `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── ECS ──────────────────────────────────────────────────────────────────

/// The identity of a registered task definition plus its full document.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub family: String,
    pub revision: u64,
    pub arn: Option<String>,
    pub document: Value,
}

impl TaskDefinition {
    pub(crate) fn from_value(document: Value) -> Option<Self> {
        let family = document.get("family")?.as_str()?.to_string();
        let revision = document.get("revision")?.as_u64()?;
        let arn = document
            .get("taskDefinitionArn")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            family,
            revision,
            arn,
            document,
        })
    }

    /// `family:revision`, the form ECS accepts wherever a task definition is referenced.
    pub fn family_revision(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeServicesOutput {
    #[serde(default)]
    pub services: Vec<Value>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// The slice of an ECS service description used for stability polling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub service_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_definition: Option<String>,
    #[serde(default)]
    pub desired_count: u32,
    #[serde(default)]
    pub running_count: u32,
    #[serde(default)]
    pub pending_count: u32,
    #[serde(default)]
    pub deployments: Vec<ServiceDeployment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeployment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rollout_state: Option<String>,
    #[serde(default)]
    pub desired_count: u32,
    #[serde(default)]
    pub running_count: u32,
}

impl ServiceSummary {
    /// More than one deployment means tasks from an older revision are still
    /// draining; a single primary deployment may also still be rolling out.
    pub fn deployment_in_progress(&self) -> bool {
        if self.deployments.len() > 1 {
            return true;
        }
        self.deployments
            .iter()
            .any(|d| d.rollout_state.as_deref() == Some("IN_PROGRESS"))
    }
}

// ─── ECR ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub repository_name: String,
    pub repository_uri: String,
    #[serde(default)]
    pub repository_arn: Option<String>,
}

/// Decoded `GetAuthorizationToken` result, ready for `docker login`.
#[derive(Clone, PartialEq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub proxy_endpoint: String,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("proxy_endpoint", &self.proxy_endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_definition_requires_family_and_revision() {
        let td = TaskDefinition::from_value(json!({
            "family": "sleep360",
            "revision": 7,
            "taskDefinitionArn": "arn:aws:ecs:us-east-1:1:task-definition/sleep360:7"
        }))
        .unwrap();
        assert_eq!(td.family_revision(), "sleep360:7");
        assert!(TaskDefinition::from_value(json!({"family": "x"})).is_none());
    }

    #[test]
    fn single_completed_deployment_is_settled() {
        let svc: ServiceSummary = serde_json::from_value(json!({
            "serviceName": "web",
            "desiredCount": 2,
            "runningCount": 2,
            "deployments": [{"status": "PRIMARY", "rolloutState": "COMPLETED"}]
        }))
        .unwrap();
        assert!(!svc.deployment_in_progress());
    }

    #[test]
    fn draining_deployment_is_in_progress() {
        let svc: ServiceSummary = serde_json::from_value(json!({
            "serviceName": "web",
            "deployments": [{"status": "PRIMARY"}, {"status": "ACTIVE"}]
        }))
        .unwrap();
        assert!(svc.deployment_in_progress());
    }
}
