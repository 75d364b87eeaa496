//! Production [`Platform`] and [`ImageRegistry`] backed by `ecs-client`.

use crate::docker::Docker;
use crate::error::{BossError, Result};
use crate::platform::{
    ImageRegistry, Platform, PlatformError, PlatformResult, RegisteredTask, ServiceStatus,
    TaskRevision,
};
use crate::publisher::repository_name;
use crate::resolve::ResolvedDocument;
use async_trait::async_trait;
use ecs_client::{EcrClient, EcsClient, EcsClientError, ServiceSummary};
use serde_json::Value;
use tokio::sync::Mutex;

fn platform_error(e: EcsClientError) -> PlatformError {
    if e.is_rejection() {
        PlatformError::Rejected(e.to_string())
    } else {
        PlatformError::Unavailable(e.to_string())
    }
}

fn is_active(service: &Value) -> bool {
    service.get("status").and_then(Value::as_str) != Some("INACTIVE")
}

fn with_fields(request: &Value, fields: &[(&str, &str)]) -> Value {
    let mut request = request.clone();
    if let Some(map) = request.as_object_mut() {
        for (k, v) in fields {
            map.insert((*k).to_string(), Value::from(*v));
        }
    }
    request
}

// ---------------------------------------------------------------------------
// EcsPlatform
// ---------------------------------------------------------------------------

pub struct EcsPlatform {
    client: EcsClient,
}

impl EcsPlatform {
    pub fn new(client: EcsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Platform for EcsPlatform {
    async fn register_task_revision(
        &self,
        family: &str,
        document: &ResolvedDocument,
    ) -> PlatformResult<TaskRevision> {
        let td = self
            .client
            .register_task_definition(document.as_value())
            .await
            .map_err(platform_error)?;
        if td.family != family {
            tracing::warn!(expected = %family, registered = %td.family, "platform registered a different family");
        }
        Ok(TaskRevision {
            family: td.family,
            revision: td.revision,
            arn: td.arn,
        })
    }

    async fn latest_task_revision(&self, family: &str) -> PlatformResult<Option<RegisteredTask>> {
        let td = self
            .client
            .describe_task_definition(family)
            .await
            .map_err(platform_error)?;
        Ok(td.map(|td| RegisteredTask {
            revision: TaskRevision {
                family: td.family,
                revision: td.revision,
                arn: td.arn,
            },
            definition: td.document,
        }))
    }

    async fn find_service(&self, cluster: &str, service_name: &str) -> PlatformResult<Vec<Value>> {
        let out = self
            .client
            .describe_services(cluster, &[service_name])
            .await
            .map_err(platform_error)?;
        for failure in &out.failures {
            tracing::debug!(
                arn = ?failure.arn,
                reason = ?failure.reason,
                "describe services failure"
            );
        }
        Ok(out.services.into_iter().filter(is_active).collect())
    }

    async fn create_service(&self, cluster: &str, request: &Value) -> PlatformResult<Value> {
        self.client
            .create_service(&with_fields(request, &[("cluster", cluster)]))
            .await
            .map_err(platform_error)
    }

    async fn update_service(
        &self,
        cluster: &str,
        service_name: &str,
        request: &Value,
    ) -> PlatformResult<Value> {
        self.client
            .update_service(&with_fields(
                request,
                &[("cluster", cluster), ("service", service_name)],
            ))
            .await
            .map_err(platform_error)
    }

    async fn service_status(
        &self,
        cluster: &str,
        service_name: &str,
    ) -> PlatformResult<ServiceStatus> {
        let service = self
            .find_service(cluster, service_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PlatformError::Rejected(format!("service {service_name} not found in {cluster}"))
            })?;
        let summary: ServiceSummary = serde_json::from_value(service)
            .map_err(|e| PlatformError::Unavailable(format!("unreadable service description: {e}")))?;
        Ok(ServiceStatus {
            desired_count: summary.desired_count,
            running_count: summary.running_count,
            deployment_in_progress: summary.deployment_in_progress(),
            task_definition: summary.task_definition,
        })
    }
}

// ---------------------------------------------------------------------------
// EcrRegistry
// ---------------------------------------------------------------------------

/// ECR for tag lookups and credentials; `docker push` for the upload.
pub struct EcrRegistry {
    ecr: EcrClient,
    docker: Docker,
    logged_in: Mutex<bool>,
}

impl EcrRegistry {
    pub fn new(ecr: EcrClient, docker: Docker) -> Self {
        Self {
            ecr,
            docker,
            logged_in: Mutex::new(false),
        }
    }

    async fn login(&self) -> Result<()> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }
        let auth = self
            .ecr
            .authorization()
            .await
            .map_err(|e| BossError::PushFailure(format!("registry authorization: {e}")))?;
        self.docker
            .login(&auth.username, &auth.password, &auth.proxy_endpoint)
            .await?;
        *logged_in = true;
        Ok(())
    }
}

#[async_trait]
impl ImageRegistry for EcrRegistry {
    async fn has_tag(&self, repository: &str, tag: &str) -> Result<bool> {
        self.ecr
            .has_image_tag(repository_name(repository), tag)
            .await
            .map_err(|e| BossError::Platform(e.to_string()))
    }

    async fn push(&self, repository: &str, tag: &str) -> Result<()> {
        self.login().await?;
        self.docker.push(&format!("{repository}:{tag}")).await
    }
}

/// Make sure the ECR repository `name` exists. Returns its URI and whether it was created.
pub async fn ensure_repository(ecr: &EcrClient, name: &str) -> Result<(String, bool)> {
    let existing = ecr
        .describe_repository(name)
        .await
        .map_err(|e| BossError::Platform(e.to_string()))?;
    if let Some(repo) = existing {
        return Ok((repo.repository_uri, false));
    }
    let repo = ecr
        .create_repository(name)
        .await
        .map_err(|e| BossError::Platform(e.to_string()))?;
    tracing::info!(repository = %repo.repository_uri, "created repository");
    Ok((repo.repository_uri, true))
}
