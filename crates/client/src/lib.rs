//! Cluster capabilities: client construction, resource location and the
//! dynamic server-side-apply handle.
//!
//! Everything the apply pipeline needs from a live cluster is expressed as a
//! capability trait here, with kube-backed implementations next to it. The
//! traits are the substitution point for callers that bring their own
//! discovery caching and for tests.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use kube::{
    api::{Api, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client, Config,
};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

/// Build a client from the ambient environment (kubeconfig or in-cluster).
pub async fn default_client() -> Result<Client, kube::Error> {
    Client::try_default().await
}

/// Build a client from an explicit cluster configuration.
pub fn client_from_config(config: Config) -> Result<Client, kube::Error> {
    Client::try_from(config)
}

/// An API resource resolved from a declared GVK, plus its REST scope.
#[derive(Debug, Clone)]
pub struct LocatedResource {
    pub resource: ApiResource,
    pub namespaced: bool,
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("API discovery failed")]
    Discovery(#[source] kube::Error),
    #[error("no served resource matches group-kind {group_kind} in version {version}")]
    NoMatch { group_kind: String, version: String },
}

/// Maps a manifest's declared Group/Version/Kind to the resource the API
/// server actually serves for it.
///
/// The mapping can change over the lifetime of a process (CRDs get installed
/// and removed), so implementations must resolve per call; any caching is
/// theirs to manage. `NoMatch` covers unknown kinds, typos and discovery
/// staleness alike; re-running after a CRD lands is the caller's move.
#[async_trait]
pub trait ResourceLocator: Send + Sync {
    async fn locate(&self, gvk: &GroupVersionKind) -> Result<LocatedResource, LocateError>;
}

/// Discovery-backed [`ResourceLocator`] running a fresh discovery pass on
/// every call.
pub struct DiscoveryLocator {
    client: Client,
}

impl DiscoveryLocator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceLocator for DiscoveryLocator {
    async fn locate(&self, gvk: &GroupVersionKind) -> Result<LocatedResource, LocateError> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(LocateError::Discovery)?;
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                    let namespaced = matches!(caps.scope, Scope::Namespaced);
                    debug!(
                        kind = %gvk.kind,
                        version = %gvk.version,
                        group = %gvk.group,
                        plural = %ar.plural,
                        namespaced,
                        "resolved API resource"
                    );
                    return Ok(LocatedResource { resource: ar.clone(), namespaced });
                }
            }
        }
        Err(LocateError::NoMatch {
            group_kind: group_kind_of(gvk),
            version: gvk.version.clone(),
        })
    }
}

fn group_kind_of(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.kind.clone()
    } else {
        format!("{}.{}", gvk.kind, gvk.group)
    }
}

/// A patch-capable handle over a dynamically-typed resource: obtain the
/// resource- and namespace-scoped endpoint, issue one server-side-apply
/// PATCH keyed by the field manager.
///
/// The patch is an upsert: absent objects are created, present ones have the
/// manager's fields reconciled. Field conflicts held by other managers are
/// surfaced as errors, never forced.
#[async_trait]
pub trait DynamicApi: Send + Sync {
    async fn patch_apply(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        field_manager: &str,
        payload: &Json,
    ) -> Result<DynamicObject, kube::Error>;
}

/// Client-backed [`DynamicApi`].
pub struct ClusterApi {
    client: Client,
}

impl ClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DynamicApi for ClusterApi {
    async fn patch_apply(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        field_manager: &str,
        payload: &Json,
    ) -> Result<DynamicObject, kube::Error> {
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        };
        let params = PatchParams::apply(field_manager);
        api.patch(name, &params, &Patch::Apply(payload)).await
    }
}
