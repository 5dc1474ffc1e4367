//! Server-side apply for schema-unknown Kubernetes YAML manifests.
//!
//! [`Applier`] takes opaque YAML documents, resolves their declared
//! Group/Version/Kind against live API discovery and upserts them with
//! server-side-apply patches, without compiled-in knowledge of the resource
//! types. [`ApplyBuilder`] layers multi-file sources, Go-style templating,
//! owner references, collection and filtering on top.
//!
//! See `examples/` for an end-to-end run against a cluster.

#![forbid(unsafe_code)]

mod builder;
mod document;
mod error;
mod owner;
mod split;
mod template;

pub use builder::{ApplyBuilder, ApplyFilter, ResourceCollector};
pub use document::YamlDocument;
pub use error::{ApplyError, BoxError};
pub use owner::ResourceOwner;
pub use remora_client::{
    default_client, ClusterApi, DiscoveryLocator, DynamicApi, LocateError, LocatedResource,
    ResourceLocator,
};
pub use split::split_documents;

use std::sync::Arc;

use async_trait::async_trait;
use kube::core::GroupVersionKind;
use metrics::counter;
use tracing::debug;

use document::GenericResource;

/// A `kubectl`-like apply client operating on raw YAML resources.
///
/// Holds no per-call state and is safe to share across tasks; every apply
/// performs at most one network mutation. Discovery runs per call so that
/// CRDs installed mid-process are picked up; callers wanting their own
/// caching inject a [`ResourceLocator`] via [`Applier::with_capabilities`].
pub struct Applier {
    locator: Arc<dyn ResourceLocator>,
    api: Arc<dyn DynamicApi>,
    field_manager: String,
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl Applier {
    /// Build an applier from cluster configuration.
    ///
    /// `field_manager` names the applying actor for server-side-apply field
    /// tracking and must not be blank; a sensible value is the calling
    /// application's name.
    pub fn new(config: kube::Config, field_manager: impl Into<String>) -> Result<Self, ApplyError> {
        let field_manager = validate_field_manager(field_manager)?;
        let client =
            remora_client::client_from_config(config).map_err(ApplyError::ClientBuild)?;
        Ok(Self::assemble(client, field_manager))
    }

    /// Build an applier from an already-constructed client.
    pub fn from_client(
        client: kube::Client,
        field_manager: impl Into<String>,
    ) -> Result<Self, ApplyError> {
        let field_manager = validate_field_manager(field_manager)?;
        Ok(Self::assemble(client, field_manager))
    }

    /// Build an applier from explicit capabilities (custom discovery
    /// caching, tests).
    pub fn with_capabilities(
        locator: Arc<dyn ResourceLocator>,
        api: Arc<dyn DynamicApi>,
        field_manager: impl Into<String>,
    ) -> Result<Self, ApplyError> {
        let field_manager = validate_field_manager(field_manager)?;
        Ok(Self {
            locator,
            api,
            field_manager,
        })
    }

    fn assemble(client: kube::Client, field_manager: String) -> Self {
        Self {
            locator: Arc::new(DiscoveryLocator::new(client.clone())),
            api: Arc::new(ClusterApi::new(client)),
            field_manager,
        }
    }

    /// Start a pipeline over this applier.
    pub fn builder(&self) -> ApplyBuilder<'_> {
        ApplyBuilder::new(self)
    }

    /// Apply one YAML document to the cluster.
    pub async fn apply(&self, doc: &YamlDocument, namespace: &str) -> Result<(), ApplyError> {
        self.apply_with_owner(doc, namespace, None).await
    }

    /// Apply one YAML document, optionally owned by `owner`.
    ///
    /// Namespace-scoped resources are stamped with `namespace` (the caller
    /// namespace always wins over the document's) and, when an owner is
    /// given, with a controller-style owner reference. Cluster-scoped
    /// resources get neither; a supplied owner is ignored for them.
    pub async fn apply_with_owner(
        &self,
        doc: &YamlDocument,
        namespace: &str,
        owner: Option<&dyn ResourceOwner>,
    ) -> Result<(), ApplyError> {
        counter!("apply_attempts", 1u64);

        let mut resource = GenericResource::decode(doc)?;
        let gvk = resource.gvk().clone();
        debug!(kind = %gvk.kind, name = %resource.name(), "applying resource");

        let located =
            self.locator
                .locate(&gvk)
                .await
                .map_err(|source| ApplyError::Resolution {
                    group_kind: group_kind_label(&gvk),
                    version: gvk.version.clone(),
                    source,
                })?;

        let target_namespace = if located.namespaced {
            resource.set_namespace(namespace);
            if let Some(owner) = owner {
                owner::stamp_controller_reference(&mut resource, owner, namespace)?;
            }
            Some(namespace)
        } else {
            // Cluster-wide resources cannot carry a namespaced owner.
            None
        };

        debug!(
            kind = %resource.kind(),
            api_version = %resource.api_version(),
            name = %resource.name(),
            namespaced = located.namespaced,
            "patching resource"
        );
        match self
            .api
            .patch_apply(
                &located.resource,
                target_namespace,
                resource.name(),
                &self.field_manager,
                resource.as_value(),
            )
            .await
        {
            Ok(applied) => {
                counter!("apply_ok", 1u64);
                debug!(
                    name = %resource.name(),
                    resource_version = ?applied.metadata.resource_version,
                    "server-side apply succeeded"
                );
                Ok(())
            }
            Err(source) => {
                counter!("apply_err", 1u64);
                Err(ApplyError::Patch {
                    kind: resource.kind().to_string(),
                    api_version: resource.api_version(),
                    name: resource.name().to_string(),
                    source,
                })
            }
        }
    }
}

/// Internal seam between the builder and the applier.
#[async_trait]
pub(crate) trait DocumentApplier: Send + Sync {
    async fn apply_with_owner(
        &self,
        doc: &YamlDocument,
        namespace: &str,
        owner: Option<&dyn ResourceOwner>,
    ) -> Result<(), ApplyError>;
}

#[async_trait]
impl DocumentApplier for Applier {
    async fn apply_with_owner(
        &self,
        doc: &YamlDocument,
        namespace: &str,
        owner: Option<&dyn ResourceOwner>,
    ) -> Result<(), ApplyError> {
        Applier::apply_with_owner(self, doc, namespace, owner).await
    }
}

fn validate_field_manager(field_manager: impl Into<String>) -> Result<String, ApplyError> {
    let field_manager = field_manager.into();
    if field_manager.trim().is_empty() {
        return Err(ApplyError::EmptyFieldManager);
    }
    Ok(field_manager)
}

fn group_kind_label(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.kind.clone()
    } else {
        format!("{}.{}", gvk.kind, gvk.group)
    }
}
