use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::retry::RetryPolicy;
use crate::transport::JsonTransport;
use crate::types::{DescribeServicesOutput, TaskDefinition};
use crate::{EcsClientError, Result};

const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";

/// Client for the ECS control-plane actions used by the deploy pipeline.
#[derive(Debug, Clone)]
pub struct EcsClient {
    transport: JsonTransport,
}

impl EcsClient {
    /// Client for the public regional endpoint.
    pub fn new(region: &str, credentials: Credentials) -> Result<Self> {
        Self::with_endpoint(&format!("https://ecs.{region}.amazonaws.com"), region, credentials)
    }

    /// Client for an explicit endpoint (LocalStack, test servers, VPC endpoints).
    pub fn with_endpoint(endpoint: &str, region: &str, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            transport: JsonTransport::new(endpoint, region, "ecs", TARGET_PREFIX, credentials)?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport.set_retry(retry);
        self
    }

    /// Register `document` as a new task definition revision.
    ///
    /// ECS assigns the revision number; identical documents still produce a
    /// new revision on every call.
    pub async fn register_task_definition(&self, document: &Value) -> Result<TaskDefinition> {
        let response: Value = self
            .transport
            .call("RegisterTaskDefinition", document)
            .await?;
        response
            .get("taskDefinition")
            .cloned()
            .and_then(TaskDefinition::from_value)
            .ok_or_else(|| missing_field("RegisterTaskDefinition", "taskDefinition"))
    }

    /// Describe the latest ACTIVE revision of `family`, or `None` when the family
    /// has never been registered.
    pub async fn describe_task_definition(&self, family: &str) -> Result<Option<TaskDefinition>> {
        let result: Result<Value> = self
            .transport
            .call("DescribeTaskDefinition", &json!({ "taskDefinition": family }))
            .await;
        match result {
            Ok(response) => Ok(response
                .get("taskDefinition")
                .cloned()
                .and_then(TaskDefinition::from_value)),
            // ECS reports an unknown family as a ClientException rather than a 404.
            Err(EcsClientError::Api { code, message, .. })
                if code == "ClientException" && message.contains("Unable to describe task definition") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn describe_services(
        &self,
        cluster: &str,
        services: &[&str],
    ) -> Result<DescribeServicesOutput> {
        self.transport
            .call(
                "DescribeServices",
                &json!({ "cluster": cluster, "services": services }),
            )
            .await
    }

    /// `request` is a full `CreateService` body including `cluster` and `serviceName`.
    ///
    /// A `clientToken` is added when the request has none, so a create that
    /// is retried after the service accepted it is not rejected as a duplicate.
    pub async fn create_service(&self, request: &Value) -> Result<Value> {
        let mut request = request.clone();
        if let Some(body) = request.as_object_mut() {
            if !body.contains_key("clientToken") {
                let token = client_token(&Value::Object(body.clone()));
                body.insert("clientToken".into(), Value::from(token));
            }
        }
        let response: Value = self.transport.call("CreateService", &request).await?;
        response
            .get("service")
            .cloned()
            .ok_or_else(|| missing_field("CreateService", "service"))
    }

    /// `request` is a full `UpdateService` body including `cluster` and `service`.
    pub async fn update_service(&self, request: &Value) -> Result<Value> {
        let response: Value = self.transport.call("UpdateService", request).await?;
        response
            .get("service")
            .cloned()
            .ok_or_else(|| missing_field("UpdateService", "service"))
    }
}

/// Idempotency token for one create call: 32 hex chars (ECS allows 36).
fn client_token(request: &Value) -> String {
    let mut digest = Sha256::new();
    digest.update(request.to_string().as_bytes());
    digest.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_be_bytes(),
    );
    let mut token = hex::encode(digest.finalize());
    token.truncate(32);
    token
}

pub(crate) fn missing_field(action: &str, field: &'static str) -> EcsClientError {
    EcsClientError::MissingField {
        action: action.to_string(),
        field,
    }
}
