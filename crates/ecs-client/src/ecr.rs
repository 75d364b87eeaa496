use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::credentials::Credentials;
use crate::ecs::missing_field;
use crate::retry::RetryPolicy;
use crate::transport::JsonTransport;
use crate::types::{RegistryAuth, Repository};
use crate::{EcsClientError, Result};

const TARGET_PREFIX: &str = "AmazonEC2ContainerRegistry_V20150921";

/// Client for the ECR actions used to publish images.
#[derive(Debug, Clone)]
pub struct EcrClient {
    transport: JsonTransport,
}

impl EcrClient {
    pub fn new(region: &str, credentials: Credentials) -> Result<Self> {
        Self::with_endpoint(
            &format!("https://api.ecr.{region}.amazonaws.com"),
            region,
            credentials,
        )
    }

    pub fn with_endpoint(endpoint: &str, region: &str, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            transport: JsonTransport::new(endpoint, region, "ecr", TARGET_PREFIX, credentials)?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport.set_retry(retry);
        self
    }

    /// Whether `repository_name` already holds an image tagged `tag`.
    pub async fn has_image_tag(&self, repository_name: &str, tag: &str) -> Result<bool> {
        let result: Result<Value> = self
            .transport
            .call(
                "DescribeImages",
                &json!({
                    "repositoryName": repository_name,
                    "imageIds": [{ "imageTag": tag }],
                }),
            )
            .await;
        match result {
            Ok(response) => Ok(response
                .get("imageDetails")
                .and_then(Value::as_array)
                .is_some_and(|details| !details.is_empty())),
            Err(e) if e.code() == Some("ImageNotFoundException") => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch and decode a registry login for `docker login`.
    pub async fn authorization(&self) -> Result<RegistryAuth> {
        let response: Value = self
            .transport
            .call("GetAuthorizationToken", &json!({}))
            .await?;
        let data = response
            .get("authorizationData")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .ok_or_else(|| missing_field("GetAuthorizationToken", "authorizationData"))?;
        let token = data
            .get("authorizationToken")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field("GetAuthorizationToken", "authorizationToken"))?;
        let proxy_endpoint = data
            .get("proxyEndpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field("GetAuthorizationToken", "proxyEndpoint"))?;
        decode_token(token, proxy_endpoint)
    }

    pub async fn describe_repository(&self, repository_name: &str) -> Result<Option<Repository>> {
        let result: Result<Value> = self
            .transport
            .call(
                "DescribeRepositories",
                &json!({ "repositoryNames": [repository_name] }),
            )
            .await;
        match result {
            Ok(response) => {
                let repos: Vec<Repository> = response
                    .get("repositories")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|source| EcsClientError::Decode {
                        action: "DescribeRepositories".into(),
                        source,
                    })?
                    .unwrap_or_default();
                Ok(repos.into_iter().next())
            }
            Err(e) if e.code() == Some("RepositoryNotFoundException") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_repository(&self, repository_name: &str) -> Result<Repository> {
        let response: Value = self
            .transport
            .call(
                "CreateRepository",
                &json!({ "repositoryName": repository_name }),
            )
            .await?;
        let repo = response
            .get("repository")
            .cloned()
            .ok_or_else(|| missing_field("CreateRepository", "repository"))?;
        serde_json::from_value(repo).map_err(|source| EcsClientError::Decode {
            action: "CreateRepository".into(),
            source,
        })
    }
}

/// ECR tokens are base64 of `user:password`.
fn decode_token(token: &str, proxy_endpoint: &str) -> Result<RegistryAuth> {
    let bytes = STANDARD.decode(token).map_err(|e| {
        EcsClientError::Credentials(format!("registry token is not valid base64: {e}"))
    })?;
    let text = String::from_utf8(bytes).map_err(|_| {
        EcsClientError::Credentials("registry token is not valid UTF-8".into())
    })?;
    let (username, password) = text.split_once(':').ok_or_else(|| {
        EcsClientError::Credentials("registry token has no 'user:password' separator".into())
    })?;
    Ok(RegistryAuth {
        username: username.to_string(),
        password: password.to_string(),
        proxy_endpoint: proxy_endpoint.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> EcrClient {
        EcrClient::with_endpoint(&server.url(), "us-east-1", Credentials::new("AKID", "secret"))
            .unwrap()
            .with_retry(RetryPolicy::none())
    }

    #[test]
    fn decodes_user_password_token() {
        let token = STANDARD.encode("AWS:s3cr3t:with:colons");
        let auth = decode_token(&token, "https://1.dkr.ecr.us-east-1.amazonaws.com").unwrap();
        assert_eq!(auth.username, "AWS");
        assert_eq!(auth.password, "s3cr3t:with:colons");
    }

    #[test]
    fn rejects_token_without_separator() {
        let token = STANDARD.encode("nocolon");
        assert!(decode_token(&token, "x").is_err());
    }

    #[tokio::test]
    async fn missing_tag_is_false() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_header(
                "x-amz-target",
                "AmazonEC2ContainerRegistry_V20150921.DescribeImages",
            )
            .with_status(400)
            .with_body(
                json!({"__type": "ImageNotFoundException", "message": "not found"}).to_string(),
            )
            .create_async()
            .await;

        assert!(!client(&server).has_image_tag("web", "v1").await.unwrap());
    }

    #[tokio::test]
    async fn existing_tag_is_true() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(json!({"imageDetails": [{"imageTags": ["v1"]}]}).to_string())
            .create_async()
            .await;

        assert!(client(&server).has_image_tag("web", "v1").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_repository_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(400)
            .with_body(
                json!({"__type": "RepositoryNotFoundException", "message": "missing"})
                    .to_string(),
            )
            .create_async()
            .await;

        assert!(client(&server)
            .describe_repository("web")
            .await
            .unwrap()
            .is_none());
    }
}
