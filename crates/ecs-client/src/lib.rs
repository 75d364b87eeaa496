//! `ecs-client`: a small async driver for the Amazon ECS and ECR JSON APIs.
//!
//! The deploy pipeline needs a handful of control-plane calls, so this crate
//! speaks the AWS JSON-1.1 protocol directly instead of pulling in a full SDK.
//!
//! # Architecture
//!
//! ```text
//! EcsClient / EcrClient   ← typed actions (RegisterTaskDefinition, DescribeImages, …)
//!     │
//!     ▼
//! JsonTransport           ← POST / with X-Amz-Target, bounded retry on transient errors
//!     │
//!     ▼
//! sigv4::sign             ← AWS Signature Version 4 over the JSON payload
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use ecs_client::{Credentials, EcsClient};
//!
//! let ecs = EcsClient::new("us-east-1", Credentials::from_env()?)?;
//! if let Some(td) = ecs.describe_task_definition("sleep360").await? {
//!     println!("latest: {}", td.family_revision());
//! }
//! ```

pub mod credentials;
pub mod ecr;
pub mod ecs;
pub mod error;
pub mod retry;
pub mod types;

pub(crate) mod sigv4;
pub(crate) mod transport;

pub use credentials::{region_from_env, Credentials};
pub use ecr::EcrClient;
pub use ecs::EcsClient;
pub use error::EcsClientError;
pub use retry::RetryPolicy;
pub use types::{
    DescribeServicesOutput, Failure, RegistryAuth, Repository, ServiceDeployment, ServiceSummary,
    TaskDefinition,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, EcsClientError>;
