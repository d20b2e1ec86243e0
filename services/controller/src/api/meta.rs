//! Object metadata shared by every stored kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use staticpage_id::{IdError, ObjectKey, ObjectUid, ResourceVersion};

/// A kind the state store can hold.
///
/// Implementors are plain serde structs; the store keeps them as JSON and
/// hands back typed copies.
pub trait Resource:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Group/version, e.g. `web.my.example.com/v1`.
    const API_VERSION: &'static str;

    /// Kind name, e.g. `StaticPage`.
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Copy the status subresource from `other`. Kinds without a status
    /// keep the default no-op.
    fn copy_status_from(&mut self, _other: &Self) {}

    /// Reset the status subresource to its initial value.
    fn clear_status(&mut self) {}
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<ObjectUid>,

    /// Assigned by the store on every write; required to match on update.
    #[serde(default)]
    pub resource_version: ResourceVersion,

    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Metadata naming the object at `key`, everything else unset.
    pub fn for_key(key: &ObjectKey) -> Self {
        Self {
            name: key.name().to_string(),
            namespace: key.namespace().to_string(),
            ..Self::default()
        }
    }

    /// The validated `(namespace, name)` key of this object.
    pub fn key(&self) -> Result<ObjectKey, IdError> {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// The owner reference flagged as managing controller, if any.
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Returns true if `owner` is this object's managing controller.
    ///
    /// Kind, name and uid must all match; a reference left over from a
    /// deleted parent with the same name does not count.
    pub fn is_controlled_by(&self, owner: &OwnerReference) -> bool {
        self.controller_owner().is_some_and(|r| {
            r.kind == owner.kind && r.name == owner.name && r.uid == owner.uid
        })
    }
}

/// Back-reference from a child object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: ObjectUid,

    #[serde(default)]
    pub controller: bool,

    #[serde(default)]
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    /// Controller reference pointing at `owner`.
    ///
    /// Returns `None` if the owner has never been stored (no uid yet).
    pub fn controller_of<R: Resource>(owner: &R) -> Option<Self> {
        let meta = owner.meta();
        meta.uid.map(|uid| Self {
            api_version: R::API_VERSION.to_string(),
            kind: R::KIND.to_string(),
            name: meta.name.clone(),
            uid,
            controller: true,
            block_owner_deletion: true,
        })
    }
}

impl std::fmt::Display for OwnerReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.kind, self.name, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str, uid: ObjectUid) -> OwnerReference {
        OwnerReference {
            api_version: "web.my.example.com/v1".to_string(),
            kind: "StaticPage".to_string(),
            name: name.to_string(),
            uid,
            controller: true,
            block_owner_deletion: true,
        }
    }

    #[test]
    fn test_is_controlled_by_requires_matching_uid() {
        let uid = ObjectUid::new();
        let mut meta = ObjectMeta::default();
        meta.owner_references.push(owner("page", uid));

        assert!(meta.is_controlled_by(&owner("page", uid)));
        assert!(!meta.is_controlled_by(&owner("page", ObjectUid::new())));
        assert!(!meta.is_controlled_by(&owner("other", uid)));
    }

    #[test]
    fn test_non_controller_reference_is_ignored() {
        let uid = ObjectUid::new();
        let mut reference = owner("page", uid);
        reference.controller = false;
        let meta = ObjectMeta {
            owner_references: vec![reference.clone()],
            ..ObjectMeta::default()
        };

        assert!(meta.controller_owner().is_none());
        assert!(!meta.is_controlled_by(&owner("page", uid)));
    }

    #[test]
    fn test_meta_json_shape() {
        let key = ObjectKey::new("default", "page-html").unwrap();
        let mut meta = ObjectMeta::for_key(&key);
        meta.owner_references.push(owner("page", ObjectUid::new()));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["namespace"], "default");
        assert_eq!(json["ownerReferences"][0]["blockOwnerDeletion"], true);
        assert!(json.get("uid").is_none());
        assert_eq!(meta.key().unwrap(), key);
    }
}
