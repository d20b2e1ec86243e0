//! `web.my.example.com/v1` kinds and the core child kinds they drive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, Resource};

/// Group/version of the StaticPage API.
pub const GROUP_VERSION: &str = "web.my.example.com/v1";

// =============================================================================
// StaticPage
// =============================================================================

/// Desired state of a StaticPage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticPageSpec {
    #[serde(default)]
    pub title: String,

    /// Page body.
    #[serde(default)]
    pub content: String,

    /// Image reference. Reserved: the serving workload does not use it yet.
    #[serde(default)]
    pub image: String,
}

/// Observed state of a StaticPage. Written only by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPageStatus {
    #[serde(default)]
    pub active: bool,
}

/// A web page served from a ConfigMap-backed nginx pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPage {
    pub metadata: ObjectMeta,
    pub spec: StaticPageSpec,

    #[serde(default)]
    pub status: StaticPageStatus,
}

impl StaticPage {
    pub fn new(metadata: ObjectMeta, spec: StaticPageSpec) -> Self {
        Self {
            metadata,
            spec,
            status: StaticPageStatus::default(),
        }
    }
}

impl Resource for StaticPage {
    const API_VERSION: &'static str = GROUP_VERSION;
    const KIND: &'static str = "StaticPage";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status = other.status.clone();
    }

    fn clear_status(&mut self) {
        self.status = StaticPageStatus::default();
    }
}

// =============================================================================
// ConfigMap
// =============================================================================

/// Key/value payload store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl Resource for ConfigMap {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ConfigMap";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// =============================================================================
// Pod
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
}

/// Projects a ConfigMap's entries into a volume as files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapVolumeSource {
    pub name: String,
}

/// A serving workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

impl Resource for Pod {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Pod";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_page_manifest_parses() {
        let page: StaticPage = serde_json::from_value(serde_json::json!({
            "apiVersion": "web.my.example.com/v1",
            "kind": "StaticPage",
            "metadata": {"name": "hello", "namespace": "default"},
            "spec": {"title": "Hello", "content": "World", "image": "nginx:1.27"}
        }))
        .unwrap();

        assert_eq!(page.metadata.name, "hello");
        assert_eq!(page.spec.title, "Hello");
        assert_eq!(page.spec.content, "World");
        assert!(!page.status.active);
    }

    #[test]
    fn test_static_page_missing_fields_default_to_empty() {
        let page: StaticPage = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "bare"},
            "spec": {}
        }))
        .unwrap();

        assert_eq!(page.spec, StaticPageSpec::default());
        assert_eq!(page.metadata.namespace, "");
    }

    #[test]
    fn test_status_subresource_helpers() {
        let mut page = StaticPage::new(ObjectMeta::default(), StaticPageSpec::default());
        let mut other = page.clone();
        other.status.active = true;

        page.copy_status_from(&other);
        assert!(page.status.active);
        page.clear_status();
        assert!(!page.status.active);
    }

    #[test]
    fn test_pod_spec_json_uses_camel_case() {
        let spec = PodSpec {
            containers: vec![Container {
                name: "nginx".to_string(),
                image: "nginx:latest".to_string(),
                volume_mounts: vec![VolumeMount {
                    name: "html".to_string(),
                    mount_path: "/usr/share/nginx/html".to_string(),
                }],
            }],
            volumes: vec![Volume {
                name: "html".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: "page-html".to_string(),
                }),
            }],
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json["containers"][0]["volumeMounts"][0]["mountPath"],
            "/usr/share/nginx/html"
        );
        assert_eq!(json["volumes"][0]["configMap"]["name"], "page-html");
    }
}
