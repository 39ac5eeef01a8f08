use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mime_guess::from_path;
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{ConnectorError, ConnectorResult};
use super::traits::{BaseConnector, ConnectorClass, LoadConnector};
use super::types::{parse_config, Capabilities, ConnectorSpecificConfig};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalFileConfig {
    file_locations: Vec<String>,
    #[serde(default)]
    tenant_id: Option<String>,
}

/// Reads uploaded files out of the (optionally per-tenant) file store
pub struct LocalFileConnector {
    root: PathBuf,
    file_locations: Vec<PathBuf>,
    tenant_id: Option<String>,
}

impl LocalFileConnector {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    fn collect_files(&self) -> ConnectorResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        for location in &self.file_locations {
            let path = self.root.join(location);
            if !path.exists() {
                return Err(ConnectorError::DocumentNotFound(location.display().to_string()));
            }

            if !std::fs::canonicalize(&path)?.starts_with(std::fs::canonicalize(&self.root)?) {
                warn!("Location {} resolves outside the file store", location.display());
                return Err(ConnectorError::InvalidConfiguration(format!(
                    "file location {} resolves outside the file store",
                    location.display()
                )));
            }

            // symlinks below a location are skipped, not followed
            for entry in WalkDir::new(&path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    async fn read_document(&self, path: &Path) -> ConnectorResult<Option<Document>> {
        let mime_type = from_path(path).first_or_text_plain();
        if !is_text_mime(mime_type.essence_str()) {
            debug!("Skipping non-text file {}", path.display());
            return Ok(None);
        }

        let bytes = fs::read(path).await?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!("Skipping {}: not valid UTF-8", path.display());
                return Ok(None);
            }
        };

        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(relative.as_str())
            .to_string();
        let modified = fs::metadata(path)
            .await?
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(Some(
            Document::new(
                relative,
                DocumentSource::File,
                file_name,
                vec![Section::new(None, text)],
            )
            .with_metadata("mime_type", mime_type.essence_str())
            .with_updated_at(modified),
        ))
    }
}

#[async_trait]
impl BaseConnector for LocalFileConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::File
    }

    async fn load_credentials(
        &mut self,
        _credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        Ok(None)
    }

    fn as_load_connector(&self) -> Option<&dyn LoadConnector> {
        Some(self)
    }
}

#[async_trait]
impl LoadConnector for LocalFileConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        let files = self.collect_files()?;
        let mut documents = Vec::with_capacity(files.len());

        for path in files {
            if let Some(document) = self.read_document(&path).await? {
                documents.push(document);
            }
        }

        info!(
            tenant_id = ?self.tenant_id,
            "📁 Loaded {} files from {}",
            documents.len(),
            self.root.display()
        );
        Ok(documents)
    }
}

impl ConnectorClass for LocalFileConnector {
    const NAME: &'static str = "LocalFileConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: LocalFileConfig = parse_config(Self::NAME, config)?;

        let mut root = settings.file_store_root.clone();
        if let Some(tenant) = &config.tenant_id {
            ensure_relative(tenant)?;
            root.push(tenant);
        }

        let file_locations = config
            .file_locations
            .iter()
            .map(|location| ensure_relative(location).map(|_| PathBuf::from(location)))
            .collect::<ConnectorResult<Vec<_>>>()?;

        Ok(Self {
            root,
            file_locations,
            tenant_id: config.tenant_id,
        })
    }
}

/// Rejects paths that could escape the store root
fn ensure_relative(location: &str) -> ConnectorResult<()> {
    let path = Path::new(location);
    let escapes = location.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if escapes {
        return Err(ConnectorError::InvalidConfiguration(format!(
            "file location must be relative to the file store: {}",
            location
        )));
    }
    Ok(())
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/x-yaml" | "application/toml"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(root: &Path) -> ConnectorSettings {
        ConnectorSettings {
            file_store_root: root.to_path_buf(),
            ..ConnectorSettings::default()
        }
    }

    #[test]
    fn test_rejects_paths_outside_store() {
        for location in ["/etc/passwd", "../secrets", "a/../../b", ""] {
            let config = json!({ "file_locations": [location] }).as_object().cloned().unwrap();
            let result = LocalFileConnector::from_config(config, &ConnectorSettings::default());
            assert!(
                matches!(result, Err(ConnectorError::InvalidConfiguration(_))),
                "{} should be rejected",
                location
            );
        }
    }

    #[test]
    fn test_tenant_scopes_root() {
        let config = json!({ "file_locations": ["a.txt"], "tenant_id": "acme" })
            .as_object()
            .cloned()
            .unwrap();
        let connector = LocalFileConnector::from_config(config, &settings(Path::new("/data"))).unwrap();
        assert_eq!(connector.root(), Path::new("/data/acme"));
        assert_eq!(connector.tenant_id(), Some("acme"));
    }

    #[test]
    fn test_text_mime_detection() {
        assert!(is_text_mime("text/markdown"));
        assert!(is_text_mime("application/json"));
        assert!(!is_text_mime("image/png"));
    }

    #[tokio::test]
    async fn test_missing_location_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = json!({ "file_locations": ["nope.txt"] }).as_object().cloned().unwrap();
        let connector = LocalFileConnector::from_config(config, &settings(dir.path())).unwrap();

        let err = connector.load_from_state().await.unwrap_err();
        assert!(matches!(err, ConnectorError::DocumentNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_do_not_escape_store() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        let store = dir.path().join("store");
        let notes = store.join("acme").join("notes");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::create_dir_all(&notes).unwrap();
        std::fs::write(outside.join("secret.md"), "leaked").unwrap();
        std::fs::write(notes.join("runbook.md"), "restart it").unwrap();
        symlink(outside.join("secret.md"), notes.join("secret.md")).unwrap();
        symlink(&outside, notes.join("linked")).unwrap();
        symlink(&outside, store.join("acme").join("escape")).unwrap();

        let config = json!({ "file_locations": ["notes"], "tenant_id": "acme" })
            .as_object()
            .cloned()
            .unwrap();
        let connector = LocalFileConnector::from_config(config, &settings(&store)).unwrap();
        let documents = connector.load_from_state().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "notes/runbook.md");

        let config = json!({ "file_locations": ["escape"], "tenant_id": "acme" })
            .as_object()
            .cloned()
            .unwrap();
        let connector = LocalFileConnector::from_config(config, &settings(&store)).unwrap();
        let err = connector.load_from_state().await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
    }
}
