use crate::cmd::args::Global;
use anyhow::Context;
use boss_core::config::Config;
use ecs_client::{region_from_env, Credentials, EcrClient, EcsClient};

pub struct Clients {
    pub ecs: EcsClient,
    pub ecr: EcrClient,
}

impl Clients {
    pub fn connect(global: &Global, config: &Config) -> anyhow::Result<Self> {
        let region = global
            .region
            .clone()
            .or_else(|| config.region.clone())
            .unwrap_or_else(region_from_env);
        let credentials = credentials(global)?;
        let retry = config.retry.policy();
        tracing::debug!(%region, "connecting to AWS");

        Ok(Self {
            ecs: EcsClient::new(&region, credentials.clone())?.with_retry(retry),
            ecr: EcrClient::new(&region, credentials)?.with_retry(retry),
        })
    }
}

fn credentials(global: &Global) -> anyhow::Result<Credentials> {
    match (&global.access_key_id, &global.secret_access_key) {
        (Some(id), Some(secret)) => {
            let creds = Credentials::new(id, secret);
            Ok(match std::env::var("AWS_SESSION_TOKEN") {
                Ok(token) if !token.is_empty() => creds.with_session_token(token),
                _ => creds,
            })
        }
        _ => Credentials::from_env().context(
            "AWS credentials not found: pass --access-key-id and --secret-access-key \
             or set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY",
        ),
    }
}
