//! Owner references via an explicit owner capability.

use serde_json::json;

use crate::document::GenericResource;
use crate::error::ApplyError;

/// What the apply pipeline needs to know about an owning resource.
///
/// Implemented for free for every typed resource (`k8s-openapi` types and
/// `#[derive(CustomResource)]` types alike) through the blanket impl below;
/// bespoke caller types implement it directly. An owner must already be
/// persisted (carry a uid) before it can own anything.
pub trait ResourceOwner: Send + Sync {
    fn api_version(&self) -> String;
    fn kind(&self) -> String;
    fn name(&self) -> Option<String>;
    fn namespace(&self) -> Option<String>;
    fn uid(&self) -> Option<String>;
}

impl<K> ResourceOwner for K
where
    K: kube::Resource<DynamicType = ()> + Send + Sync,
{
    fn api_version(&self) -> String {
        K::api_version(&()).into_owned()
    }

    fn kind(&self) -> String {
        K::kind(&()).into_owned()
    }

    fn name(&self) -> Option<String> {
        self.meta().name.clone()
    }

    fn namespace(&self) -> Option<String> {
        self.meta().namespace.clone()
    }

    fn uid(&self) -> Option<String> {
        self.meta().uid.clone()
    }
}

/// Stamp a controller-style owner reference onto `resource`.
///
/// Only namespaced owners living in the target namespace are accepted;
/// violations fail here, before anything reaches the network.
pub(crate) fn stamp_controller_reference(
    resource: &mut GenericResource,
    owner: &dyn ResourceOwner,
    target_namespace: &str,
) -> Result<(), ApplyError> {
    let target_kind = resource.kind().to_string();
    let target_name = resource.name().to_string();
    let fail = |reason: String| ApplyError::OwnerReference {
        kind: target_kind.clone(),
        name: target_name.clone(),
        reason,
    };

    let owner_kind = owner.kind();
    let owner_name = owner
        .name()
        .ok_or_else(|| fail(format!("owner {} has no name", owner_kind)))?;
    let owner_uid = owner.uid().ok_or_else(|| {
        fail(format!(
            "owner {}/{} has no uid; it must be applied before it can own resources",
            owner_kind, owner_name
        ))
    })?;
    let owner_namespace = owner.namespace().ok_or_else(|| {
        fail(format!(
            "owner {}/{} is not namespaced; cross-scope ownership is rejected by the API server",
            owner_kind, owner_name
        ))
    })?;
    if owner_namespace != target_namespace {
        return Err(fail(format!(
            "owner namespace {} does not match target namespace {}",
            owner_namespace, target_namespace
        )));
    }

    resource.set_owner_reference(json!({
        "apiVersion": owner.api_version(),
        "kind": owner_kind,
        "name": owner_name,
        "uid": owner_uid,
        "controller": true,
        "blockOwnerDeletion": true,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ObjectMeta;

    use super::*;
    use crate::document::YamlDocument;

    fn config_map(namespace: Option<&str>, uid: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("le-config-map".to_string()),
                namespace: namespace.map(String::from),
                uid: uid.map(String::from),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    fn service_account() -> GenericResource {
        let doc = YamlDocument::from(
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: svc-a\n",
        );
        GenericResource::decode(&doc).unwrap()
    }

    #[test]
    fn typed_resources_expose_the_owner_capability() {
        let owner = config_map(Some("le-namespace"), Some("uid-1"));
        assert_eq!(ResourceOwner::api_version(&owner), "v1");
        assert_eq!(ResourceOwner::kind(&owner), "ConfigMap");
        assert_eq!(ResourceOwner::name(&owner).as_deref(), Some("le-config-map"));
        assert_eq!(ResourceOwner::namespace(&owner).as_deref(), Some("le-namespace"));
        assert_eq!(ResourceOwner::uid(&owner).as_deref(), Some("uid-1"));
    }

    #[test]
    fn stamps_a_controller_reference() {
        let owner = config_map(Some("le-namespace"), Some("uid-1"));
        let mut resource = service_account();
        stamp_controller_reference(&mut resource, &owner, "le-namespace").unwrap();

        let refs = &resource.as_value()["metadata"]["ownerReferences"];
        assert_eq!(refs.as_array().map(Vec::len), Some(1));
        assert_eq!(refs[0]["apiVersion"], "v1");
        assert_eq!(refs[0]["kind"], "ConfigMap");
        assert_eq!(refs[0]["name"], "le-config-map");
        assert_eq!(refs[0]["uid"], "uid-1");
        assert_eq!(refs[0]["controller"], true);
        assert_eq!(refs[0]["blockOwnerDeletion"], true);
    }

    #[test]
    fn rejects_cluster_scoped_owners() {
        let owner = config_map(None, Some("uid-1"));
        let mut resource = service_account();
        let err = stamp_controller_reference(&mut resource, &owner, "le-namespace").unwrap_err();
        assert!(matches!(err, ApplyError::OwnerReference { .. }));
        assert!(err.to_string().contains("cross-scope"));
    }

    #[test]
    fn rejects_owners_from_another_namespace() {
        let owner = config_map(Some("elsewhere"), Some("uid-1"));
        let mut resource = service_account();
        let err = stamp_controller_reference(&mut resource, &owner, "le-namespace").unwrap_err();
        assert!(err.to_string().contains("does not match target namespace"));
    }

    #[test]
    fn rejects_owners_that_were_never_applied() {
        let owner = config_map(Some("le-namespace"), None);
        let mut resource = service_account();
        let err = stamp_controller_reference(&mut resource, &owner, "le-namespace").unwrap_err();
        assert!(err.to_string().contains("has no uid"));
    }
}
