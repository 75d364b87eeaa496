use crate::error::{BossError, Result};
use crate::platform::{Platform, PlatformError, RegisteredTask, TaskRevision};
use crate::resolve::{Placeholder, ResolvedDocument};
use crate::template::Template;
use serde_json::Value;

/// Registers resolved task documents for a single family.
pub struct TaskRegistrar<'a> {
    platform: &'a dyn Platform,
    family: &'a str,
}

impl<'a> TaskRegistrar<'a> {
    pub fn new(platform: &'a dyn Platform, family: &'a str) -> Self {
        Self { platform, family }
    }

    /// Submit `document`; the platform assigns the revision number.
    pub async fn register(&self, document: &ResolvedDocument) -> Result<TaskRevision> {
        match document.str_field("family") {
            Some(f) if f == self.family => {}
            other => {
                return Err(BossError::TemplateInvalid {
                    template: "task".into(),
                    reason: format!(
                        "family '{}' does not match target family '{}'",
                        other.unwrap_or_default(),
                        self.family
                    ),
                })
            }
        }

        let revision = self
            .platform
            .register_task_revision(self.family, document)
            .await
            .map_err(|e| match e {
                PlatformError::Rejected(message) => BossError::RegistrationRejected {
                    family: self.family.to_string(),
                    message,
                    document: document.to_pretty_json(),
                },
                PlatformError::Unavailable(message) => BossError::Platform(message),
            })?;

        tracing::info!(family = %self.family, revision = revision.revision, "registered task definition");
        Ok(revision)
    }

    /// The newest registered revision, queried fresh.
    pub async fn latest(&self) -> Result<Option<RegisteredTask>> {
        self.platform
            .latest_task_revision(self.family)
            .await
            .map_err(|e| BossError::Platform(e.to_string()))
    }
}

/// Recover the release tag a registered revision was deployed with.
///
/// Looks at each container whose template image uses `%RELEASE_TAG%` and
/// takes the tag from the same-named container in the registered definition.
pub fn release_tag_from(template: &Template, registered: &RegisteredTask) -> Option<String> {
    let marker = Placeholder::ReleaseTag.marker();
    let remote = registered.definition.get("containerDefinitions")?.as_array()?;

    containers(template.value())
        .filter(|c| c.get("image").and_then(Value::as_str).is_some_and(|i| i.contains(marker)))
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .find_map(|name| {
            let image = remote
                .iter()
                .find(|r| r.get("name").and_then(Value::as_str) == Some(name))?
                .get("image")?
                .as_str()?;
            image_tag(image).map(str::to_string)
        })
}

fn containers(doc: &Value) -> impl Iterator<Item = &Value> {
    doc.get("containerDefinitions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// The tag part of an image reference, ignoring a registry port.
fn image_tag(image: &str) -> Option<&str> {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    let (_, tag) = last_segment.rsplit_once(':')?;
    (!tag.is_empty()).then_some(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{resolve, Bindings};
    use crate::template::TemplateKind;
    use crate::testing::FakePlatform;
    use serde_json::json;

    fn task_template() -> Template {
        Template::parse(
            TemplateKind::Task,
            "task-def.json",
            &json!({
                "family": "sleep360",
                "containerDefinitions": [
                    {"name": "sidecar", "image": "envoy:1.29"},
                    {"name": "app", "image": "%REPOSITORY%:%RELEASE_TAG%"}
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    fn resolved() -> ResolvedDocument {
        let b = Bindings::new()
            .with(Placeholder::Repository, "registry:5000/sleep")
            .with(Placeholder::ReleaseTag, "abc123");
        resolve(&task_template(), &b).unwrap()
    }

    #[tokio::test]
    async fn every_registration_gets_a_new_revision() {
        let platform = FakePlatform::default().with_revision("sleep360", 4);
        let registrar = TaskRegistrar::new(&platform, "sleep360");
        let doc = resolved();

        assert_eq!(registrar.register(&doc).await.unwrap().revision, 5);
        assert_eq!(registrar.register(&doc).await.unwrap().revision, 6);
        assert_eq!(registrar.latest().await.unwrap().unwrap().revision.revision, 6);
    }

    #[tokio::test]
    async fn family_mismatch_is_template_invalid() {
        let platform = FakePlatform::default();
        let err = TaskRegistrar::new(&platform, "other")
            .register(&resolved())
            .await
            .unwrap_err();
        assert!(matches!(err, BossError::TemplateInvalid { .. }));
        assert_eq!(platform.registrations(), 0);
    }

    #[tokio::test]
    async fn rejection_carries_message_and_document() {
        let platform = FakePlatform::default().rejecting_registration("Invalid memory value");
        let err = TaskRegistrar::new(&platform, "sleep360")
            .register(&resolved())
            .await
            .unwrap_err();
        let BossError::RegistrationRejected { message, document, .. } = err else {
            panic!("expected RegistrationRejected, got {err:?}")
        };
        assert_eq!(message, "Invalid memory value");
        assert!(document.contains("registry:5000/sleep:abc123"));
    }

    #[test]
    fn recovers_tag_from_matching_container() {
        let registered = RegisteredTask {
            revision: TaskRevision {
                family: "sleep360".into(),
                revision: 9,
                arn: None,
            },
            definition: json!({
                "containerDefinitions": [
                    {"name": "sidecar", "image": "envoy:1.29"},
                    {"name": "app", "image": "registry:5000/sleep:2024-05-01-13-45-09"}
                ]
            }),
        };
        assert_eq!(
            release_tag_from(&task_template(), &registered).as_deref(),
            Some("2024-05-01-13-45-09")
        );
    }

    #[test]
    fn untagged_remote_image_yields_none() {
        let registered = RegisteredTask {
            revision: TaskRevision {
                family: "sleep360".into(),
                revision: 1,
                arn: None,
            },
            definition: json!({"containerDefinitions": [{"name": "app", "image": "registry:5000/sleep"}]}),
        };
        assert_eq!(release_tag_from(&task_template(), &registered), None);
    }
}
