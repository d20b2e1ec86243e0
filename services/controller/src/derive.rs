//! Derivation of child specs from a StaticPage.
//!
//! Everything here is pure: same page in, same spec out, no I/O and no
//! error path. Empty fields render as empty but well-formed HTML.

use std::collections::BTreeMap;

use staticpage_id::ObjectKey;

use crate::api::{
    ConfigMapVolumeSource, Container, PodSpec, StaticPage, Volume, VolumeMount,
};

/// Suffix of the content ConfigMap name.
pub const CONTENT_SUFFIX: &str = "-html";

/// Suffix of the serving Pod name.
pub const WORKLOAD_SUFFIX: &str = "-pod";

/// File the rendered page is stored under.
pub const INDEX_FILE: &str = "index.html";

pub const SERVER_CONTAINER: &str = "nginx";
pub const SERVER_IMAGE: &str = "nginx:latest";
pub const HTML_VOLUME: &str = "html";
pub const HTML_MOUNT_PATH: &str = "/usr/share/nginx/html";

/// Label marking objects this controller manages.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "staticpage-controller";

/// Label naming the page a child belongs to.
pub const PAGE_LABEL: &str = "web.my.example.com/page";

/// Key of the content ConfigMap for the page at `parent`.
pub fn content_key(parent: &ObjectKey) -> ObjectKey {
    parent.with_suffix(CONTENT_SUFFIX)
}

/// Key of the serving Pod for the page at `parent`.
pub fn workload_key(parent: &ObjectKey) -> ObjectKey {
    parent.with_suffix(WORKLOAD_SUFFIX)
}

/// Render the page document. Title and content are inserted verbatim.
pub fn render_page(title: &str, content: &str) -> String {
    format!("<html><body><h1>{title}</h1><p>{content}</p></body></html>")
}

/// Target data of the content ConfigMap.
pub fn derive_content(page: &StaticPage) -> BTreeMap<String, String> {
    BTreeMap::from([(
        INDEX_FILE.to_string(),
        render_page(&page.spec.title, &page.spec.content),
    )])
}

/// Target spec of the serving Pod, mounting the ConfigMap named
/// `content_name`.
///
/// The page's `image` field is reserved and does not select the server
/// image.
pub fn derive_workload(_page: &StaticPage, content_name: &str) -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: SERVER_CONTAINER.to_string(),
            image: SERVER_IMAGE.to_string(),
            volume_mounts: vec![VolumeMount {
                name: HTML_VOLUME.to_string(),
                mount_path: HTML_MOUNT_PATH.to_string(),
            }],
        }],
        volumes: vec![Volume {
            name: HTML_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: content_name.to_string(),
            }),
        }],
    }
}

/// Labels stamped on children when they are created.
pub fn child_labels(page_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (PAGE_LABEL.to_string(), page_name.to_string()),
    ])
}

// =============================================================================
// Divergence
// =============================================================================

/// First ConfigMap entry that differs from the target, or `None` if the
/// data maps are identical.
pub fn content_divergence<'a>(
    existing: &'a BTreeMap<String, String>,
    target: &'a BTreeMap<String, String>,
) -> Option<&'a str> {
    target
        .iter()
        .find(|(file, payload)| existing.get(*file) != Some(*payload))
        .map(|(file, _)| file.as_str())
        .or_else(|| {
            existing
                .keys()
                .find(|file| !target.contains_key(*file))
                .map(String::as_str)
        })
}

/// First Pod spec field that differs from the target, or `None` if the
/// specs agree.
pub fn workload_divergence(existing: &PodSpec, target: &PodSpec) -> Option<&'static str> {
    if existing.containers.len() != target.containers.len() {
        return Some("containers");
    }
    for (have, want) in existing.containers.iter().zip(&target.containers) {
        if have.name != want.name {
            return Some("containers.name");
        }
        if have.image != want.image {
            return Some("containers.image");
        }
        if have.volume_mounts != want.volume_mounts {
            return Some("containers.volumeMounts");
        }
    }
    if existing.volumes != target.volumes {
        return Some("volumes");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ObjectMeta, StaticPageSpec};
    use rstest::rstest;

    fn page(title: &str, content: &str) -> StaticPage {
        StaticPage::new(
            ObjectMeta::for_key(&ObjectKey::new("default", "hello").unwrap()),
            StaticPageSpec {
                title: title.to_string(),
                content: content.to_string(),
                image: String::new(),
            },
        )
    }

    #[rstest]
    #[case("Hello", "World", "<html><body><h1>Hello</h1><p>World</p></body></html>")]
    #[case("", "", "<html><body><h1></h1><p></p></body></html>")]
    #[case("<b>x</b>", "a & b", "<html><body><h1><b>x</b></h1><p>a & b</p></body></html>")]
    fn test_derive_content(#[case] title: &str, #[case] content: &str, #[case] expected: &str) {
        let data = derive_content(&page(title, content));
        assert_eq!(data.len(), 1);
        assert_eq!(data.get(INDEX_FILE).map(String::as_str), Some(expected));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let p = page("T", "B");
        assert_eq!(derive_content(&p), derive_content(&p));
        assert_eq!(derive_workload(&p, "x-html"), derive_workload(&p, "x-html"));
    }

    #[test]
    fn test_derive_workload_mounts_content() {
        let spec = derive_workload(&page("T", "B"), "hello-html");

        assert_eq!(spec.containers.len(), 1);
        let container = &spec.containers[0];
        assert_eq!(container.name, SERVER_CONTAINER);
        assert_eq!(container.image, SERVER_IMAGE);
        assert_eq!(container.volume_mounts[0].name, HTML_VOLUME);
        assert_eq!(container.volume_mounts[0].mount_path, HTML_MOUNT_PATH);

        assert_eq!(spec.volumes.len(), 1);
        assert_eq!(spec.volumes[0].name, HTML_VOLUME);
        assert_eq!(
            spec.volumes[0].config_map.as_ref().map(|c| c.name.as_str()),
            Some("hello-html")
        );
    }

    #[test]
    fn test_image_field_does_not_change_workload() {
        let plain = page("T", "B");
        let mut with_image = plain.clone();
        with_image.spec.image = "ghcr.io/acme/site:2".to_string();
        assert_eq!(
            derive_workload(&plain, "hello-html"),
            derive_workload(&with_image, "hello-html")
        );
    }

    #[test]
    fn test_child_keys() {
        let parent = ObjectKey::new("team-a", "hello").unwrap();
        assert_eq!(content_key(&parent).to_string(), "team-a/hello-html");
        assert_eq!(workload_key(&parent).to_string(), "team-a/hello-pod");
    }

    #[test]
    fn test_content_divergence() {
        let target = derive_content(&page("T", "B"));
        assert_eq!(content_divergence(&target.clone(), &target), None);

        let mut changed = target.clone();
        changed.insert(INDEX_FILE.to_string(), "stale".to_string());
        assert_eq!(content_divergence(&changed, &target), Some(INDEX_FILE));

        let mut extra = target.clone();
        extra.insert("robots.txt".to_string(), String::new());
        assert_eq!(content_divergence(&extra, &target), Some("robots.txt"));

        assert_eq!(content_divergence(&BTreeMap::new(), &target), Some(INDEX_FILE));
    }

    #[test]
    fn test_workload_divergence() {
        let target = derive_workload(&page("T", "B"), "hello-html");
        assert_eq!(workload_divergence(&target, &target), None);

        let mut image = target.clone();
        image.containers[0].image = "httpd:2".to_string();
        assert_eq!(workload_divergence(&image, &target), Some("containers.image"));

        let mut source = target.clone();
        source.volumes[0].config_map = None;
        assert_eq!(workload_divergence(&source, &target), Some("volumes"));

        assert_eq!(
            workload_divergence(&PodSpec::default(), &target),
            Some("containers")
        );
    }
}
