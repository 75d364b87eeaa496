use crate::error::{BossError, Result};
use crate::platform::{ImageBuilder, ImageRegistry};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ReleaseTag
// ---------------------------------------------------------------------------

/// A Docker image tag identifying one release. Immutable once pushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseTag(String);

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]{0,127}$").expect("static regex")
    })
}

impl ReleaseTag {
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if !tag_re().is_match(&tag) {
            return Err(BossError::InvalidReleaseTag(tag));
        }
        Ok(Self(tag))
    }

    /// A tag from the current UTC time, e.g. `2024-05-01-13-45-09`.
    pub fn generate() -> Self {
        Self(chrono::Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ImagePublisher
// ---------------------------------------------------------------------------

/// What happened to the image during a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    Built,
    Pushed,
    /// The registry already had the tag.
    AlreadyPublished,
}

#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub context: PathBuf,
    /// Local image name; the task family.
    pub image: String,
    pub args: Vec<String>,
}

pub struct ImagePublisher<'a> {
    builder: &'a dyn ImageBuilder,
    registry: Option<&'a dyn ImageRegistry>,
}

impl<'a> ImagePublisher<'a> {
    pub fn new(builder: &'a dyn ImageBuilder, registry: &'a dyn ImageRegistry) -> Self {
        Self {
            builder,
            registry: Some(registry),
        }
    }

    /// A publisher that can only build; `publish` fails without a registry.
    pub fn local(builder: &'a dyn ImageBuilder) -> Self {
        Self {
            builder,
            registry: None,
        }
    }

    /// Build the image locally. Nothing is tagged or pushed.
    pub async fn build_only(&self, spec: &BuildSpec) -> Result<PublishOutcome> {
        self.build(spec).await?;
        Ok(PublishOutcome::Built)
    }

    /// Make `repository:tag` available in the registry.
    pub async fn publish(
        &self,
        spec: &BuildSpec,
        repository: &str,
        tag: &ReleaseTag,
    ) -> Result<PublishOutcome> {
        let registry = self
            .registry
            .ok_or(BossError::MissingConfig("image registry"))?;
        if registry.has_tag(repository, tag.as_str()).await? {
            tracing::info!(%repository, %tag, "image already in registry, skipping build and push");
            return Ok(PublishOutcome::AlreadyPublished);
        }

        self.build(spec).await?;

        let target = format!("{repository}:{tag}");
        if self.builder.has_local_image(&target).await? {
            tracing::info!(image = %target, "image already tagged locally");
        } else {
            self.builder.tag(&spec.image, &target).await?;
        }

        tracing::info!(image = %target, "pushing image");
        registry
            .push(repository, tag.as_str())
            .await
            .map_err(as_push_failure)?;
        Ok(PublishOutcome::Pushed)
    }

    async fn build(&self, spec: &BuildSpec) -> Result<()> {
        tracing::info!(image = %spec.image, context = %spec.context.display(), "building image");
        self.builder
            .build(&spec.context, &spec.image, &spec.args)
            .await
            .map_err(as_build_failure)
    }
}

fn as_build_failure(e: BossError) -> BossError {
    match e {
        e @ BossError::BuildFailure(_) => e,
        other => BossError::BuildFailure(other.to_string()),
    }
}

fn as_push_failure(e: BossError) -> BossError {
    match e {
        e @ BossError::PushFailure(_) => e,
        other => BossError::PushFailure(other.to_string()),
    }
}

/// Registry-relative name of a repository URI: `host/name` → `name`.
pub fn repository_name(repository: &str) -> &str {
    repository
        .split_once('/')
        .map_or(repository, |(_, name)| name)
}

pub fn context_exists(context: &Path) -> bool {
    context.is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBuilder, FakeRegistry};

    fn spec() -> BuildSpec {
        BuildSpec {
            context: PathBuf::from("."),
            image: "web".into(),
            args: vec!["--pull".into()],
        }
    }

    const REPO: &str = "1.dkr.ecr.us-east-1.amazonaws.com/web";

    #[test]
    fn generated_tag_is_a_valid_tag() {
        let tag = ReleaseTag::generate();
        assert_eq!(tag.as_str().len(), "2024-05-01-13-45-09".len());
        assert!(ReleaseTag::new(tag.as_str()).is_ok());
    }

    #[test]
    fn rejects_malformed_tags() {
        let long = "x".repeat(129);
        for bad in ["", "-leading", "has space", "a:b", long.as_str()] {
            assert!(ReleaseTag::new(bad).is_err(), "{bad:?}");
        }
        assert!(ReleaseTag::new("v1.2.3_rc-1").is_ok());
    }

    #[test]
    fn repository_name_strips_registry_host() {
        assert_eq!(repository_name(REPO), "web");
        assert_eq!(repository_name("team/web"), "web");
        assert_eq!(repository_name("web"), "web");
    }

    #[tokio::test]
    async fn publish_builds_tags_and_pushes() {
        let builder = FakeBuilder::default();
        let registry = FakeRegistry::default();
        let tag = ReleaseTag::new("abc123").unwrap();

        let outcome = ImagePublisher::new(&builder, &registry)
            .publish(&spec(), REPO, &tag)
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Pushed);
        assert_eq!(builder.builds(), vec!["web".to_string()]);
        assert_eq!(builder.tags(), vec![(String::from("web"), format!("{REPO}:abc123"))]);
        assert_eq!(registry.pushed(), vec![format!("{REPO}:abc123")]);
    }

    #[tokio::test]
    async fn existing_remote_tag_skips_everything() {
        let builder = FakeBuilder::default();
        let registry = FakeRegistry::with_tags(&[(REPO, "abc123")]);
        let tag = ReleaseTag::new("abc123").unwrap();

        let outcome = ImagePublisher::new(&builder, &registry)
            .publish(&spec(), REPO, &tag)
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::AlreadyPublished);
        assert!(builder.builds().is_empty());
        assert!(registry.pushed().is_empty());
    }

    #[tokio::test]
    async fn existing_local_tag_still_pushes() {
        let builder = FakeBuilder::default().with_local_image(&format!("{REPO}:abc123"));
        let registry = FakeRegistry::default();
        let tag = ReleaseTag::new("abc123").unwrap();

        ImagePublisher::new(&builder, &registry)
            .publish(&spec(), REPO, &tag)
            .await
            .unwrap();

        assert!(builder.tags().is_empty());
        assert_eq!(registry.pushed().len(), 1);
    }

    #[tokio::test]
    async fn build_failure_stops_before_push() {
        let builder = FakeBuilder::failing("exit status 1");
        let registry = FakeRegistry::default();
        let tag = ReleaseTag::new("abc123").unwrap();

        let err = ImagePublisher::new(&builder, &registry)
            .publish(&spec(), REPO, &tag)
            .await
            .unwrap_err();

        assert!(matches!(err, BossError::BuildFailure(_)));
        assert!(registry.pushed().is_empty());
    }

    #[tokio::test]
    async fn rejected_push_is_push_failure() {
        let builder = FakeBuilder::default();
        let registry = FakeRegistry::rejecting_push("denied: not authorized");
        let tag = ReleaseTag::new("abc123").unwrap();

        let err = ImagePublisher::new(&builder, &registry)
            .publish(&spec(), REPO, &tag)
            .await
            .unwrap_err();

        assert!(matches!(err, BossError::PushFailure(ref m) if m.contains("denied")));
    }

    #[tokio::test]
    async fn build_only_does_not_touch_registry() {
        let builder = FakeBuilder::default();
        let registry = FakeRegistry::default();

        let outcome = ImagePublisher::new(&builder, &registry)
            .build_only(&spec())
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Built);
        assert_eq!(registry.lookups(), 0);
        assert!(builder.tags().is_empty());
    }
}
