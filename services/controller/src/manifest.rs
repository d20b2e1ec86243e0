//! StaticPage manifests on disk.
//!
//! A manifest directory holds one StaticPage per `*.json` file. Files are
//! read in name order; anything else in the directory is skipped.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{Resource, StaticPage};
use crate::store::StateStore;

/// Load every StaticPage manifest under `dir`.
///
/// Manifests without a namespace get `default_namespace`. A manifest that
/// declares a `kind` other than `StaticPage` or names an invalid key fails
/// the whole load.
pub fn load_dir(dir: &Path, default_namespace: &str) -> Result<Vec<StaticPage>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read manifest directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut pages = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let page = parse(&raw, default_namespace)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        debug!(path = %path.display(), name = %page.metadata.name, "Loaded manifest");
        pages.push(page);
    }
    Ok(pages)
}

/// Parse one StaticPage manifest.
pub fn parse(raw: &str, default_namespace: &str) -> Result<StaticPage> {
    let value: Value = serde_json::from_str(raw)?;
    if let Some(kind) = value.get("kind").and_then(Value::as_str) {
        if kind != StaticPage::KIND {
            bail!("expected kind {}, found {kind}", StaticPage::KIND);
        }
    }

    let mut page: StaticPage = serde_json::from_value(value)?;
    if page.metadata.namespace.is_empty() {
        page.metadata.namespace = default_namespace.to_string();
    }
    page.metadata.key()?;
    Ok(page)
}

/// Create each page, or replace the spec of one that already exists.
pub async fn apply<S: StateStore>(store: &S, pages: Vec<StaticPage>) -> Result<()> {
    for page in pages {
        let key = page.metadata.key()?;
        match store.create(page.clone()).await {
            Ok(created) => {
                info!(key = %key, uid = ?created.metadata.uid, "Created StaticPage");
            }
            Err(e) if e.is_conflict() => {
                let mut current: StaticPage = store.get(&key).await?;
                current.spec = page.spec;
                current.metadata.labels = page.metadata.labels;
                store.update(current).await?;
                info!(key = %key, "Updated StaticPage");
            }
            Err(e) => return Err(e).with_context(|| format!("failed to apply StaticPage {key}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use staticpage_id::ObjectKey;

    const HELLO: &str = r#"{
        "apiVersion": "web.my.example.com/v1",
        "kind": "StaticPage",
        "metadata": { "name": "hello" },
        "spec": { "title": "Hello", "content": "World" }
    }"#;

    #[test]
    fn test_parse_fills_namespace() {
        let page = parse(HELLO, "web").unwrap();
        assert_eq!(page.metadata.namespace, "web");
        assert_eq!(page.spec.title, "Hello");
        assert_eq!(page.spec.image, "");
        assert!(!page.status.active);
    }

    #[test]
    fn test_parse_rejects_other_kinds_and_names() {
        let pod = HELLO.replace("\"StaticPage\"", "\"Pod\"");
        assert!(parse(&pod, "web").is_err());

        let bad_name = HELLO.replace("\"hello\"", "\"Hello_World\"");
        assert!(parse(&bad_name, "web").is_err());
    }

    #[test]
    fn test_load_dir_reads_json_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), HELLO.replace("hello", "bravo")).unwrap();
        std::fs::write(dir.path().join("a.json"), HELLO.replace("hello", "alpha")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a manifest").unwrap();

        let pages = load_dir(dir.path(), "default").unwrap();
        let names: Vec<_> = pages.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(names, ["alpha", "bravo"]);
    }

    #[test]
    fn test_load_dir_fails_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        assert!(load_dir(dir.path(), "default").is_err());
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates() {
        let store = MemoryStore::new();
        apply(&store, vec![parse(HELLO, "default").unwrap()])
            .await
            .unwrap();

        let changed = HELLO.replace("World", "Again");
        apply(&store, vec![parse(&changed, "default").unwrap()])
            .await
            .unwrap();

        let key = ObjectKey::new("default", "hello").unwrap();
        let page: StaticPage = store.get(&key).await.unwrap();
        assert_eq!(page.spec.content, "Again");
        assert_eq!(store.len().await, 1);
    }
}
