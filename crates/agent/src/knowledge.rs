//! Knowledge ingestion with content fingerprinting.
//!
//! The agent scans the knowledge root for eligible files, fingerprints each
//! one (SHA-256 of the content plus mtime and size) and compares the result
//! with the map persisted by the previous run. Only the delta is embedded.
//!
//! The persisted metadata is a JSON object, replaced atomically through a
//! temp file and a rename:
//!
//! ```json
//! {
//!   "collection": { "backend": "sqlite", "index": "knowledge-embeddings", "dimension": 1536 },
//!   "documents": 42,
//!   "files": { "<relative path>": { "hash": "...", "mtime": 0, "size": 0 } }
//! }
//! ```
//!
//! The map only describes the collection it was written against. A different
//! backend, index or dimension, or an empty collection that should hold
//! documents, means a fresh start.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use ragweave_config::{KnowledgeConfig, VectorStoreConfig};
use ragweave_core::error::{Error, KnowledgeError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::embedding_retriever::EmbeddingRetriever;
use crate::tabular;

/// Fingerprint of one knowledge file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Path relative to the knowledge root, `/`-separated. Stored as the map key.
    #[serde(skip)]
    pub path: String,

    /// Hex SHA-256 of the file content
    #[serde(rename = "hash")]
    pub content_hash: String,

    /// Modification time, Unix milliseconds
    pub mtime: i64,

    pub size: u64,
}

/// Relative path → fingerprint.
pub type FingerprintMap = BTreeMap<String, FileFingerprint>;

/// The vector collection a fingerprint map was written against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionIdentity {
    pub backend: String,
    pub index: String,
    pub dimension: usize,
}

/// On-disk form of the fingerprint map.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnowledgeMetadata {
    collection: CollectionIdentity,
    /// Documents written since the collection was last reset
    #[serde(default)]
    documents: usize,
    files: FingerprintMap,
}

/// What changed between two scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// New files and files whose content hash differs
    pub changed: Vec<String>,
    /// Previously fingerprinted files missing from the scan
    pub removed: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Compare a scan with the persisted map. No persisted map means every
/// scanned file is new.
pub fn diff(previous: Option<&FingerprintMap>, current: &FingerprintMap) -> Delta {
    let Some(previous) = previous else {
        return Delta {
            changed: current.keys().cloned().collect(),
            removed: Vec::new(),
        };
    };
    Delta {
        changed: current
            .iter()
            .filter(|(path, fp)| {
                previous
                    .get(*path)
                    .is_none_or(|old| old.content_hash != fp.content_hash)
            })
            .map(|(path, _)| path.clone())
            .collect(),
        removed: previous
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned()
            .collect(),
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    /// Files whose documents were stored
    pub embedded_files: usize,
    /// Files skipped because reading or storing failed
    pub failed_files: usize,
    /// Fingerprints dropped for deleted files
    pub removed_files: usize,
    /// Documents written to the vector store
    pub documents: usize,
    /// Documents stored with a fallback embedding
    pub degraded_documents: usize,
}

impl EmbedReport {
    /// False only when every attempted file failed.
    pub fn succeeded(&self) -> bool {
        self.embedded_files > 0 || self.failed_files == 0
    }
}

/// Snapshot of the knowledge base.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeStats {
    pub root: String,
    /// Eligible files currently on disk
    pub files: usize,
    pub by_extension: BTreeMap<String, usize>,
    pub total_bytes: u64,
    /// Files recorded in the persisted fingerprint map
    pub tracked_files: usize,
    /// Whether the next check would find changes
    pub pending_changes: bool,
    /// Documents in the vector store
    pub documents: usize,
}

enum FileOutcome {
    Stored { documents: usize, degraded: usize },
    Failed,
}

pub struct KnowledgeAgent {
    root: PathBuf,
    extensions: Vec<String>,
    metadata_path: PathBuf,
    batch_size: usize,
    index: String,
    retriever: Arc<EmbeddingRetriever>,
}

impl KnowledgeAgent {
    pub fn new(root: impl Into<PathBuf>, retriever: Arc<EmbeddingRetriever>) -> Self {
        let root = root.into();
        let defaults = KnowledgeConfig::default();
        Self {
            metadata_path: root.join(".knowledge_metadata.json"),
            root,
            extensions: defaults.extensions,
            batch_size: defaults.batch_size,
            index: VectorStoreConfig::default().index_name,
            retriever,
        }
    }

    pub fn from_config(config: &KnowledgeConfig, retriever: Arc<EmbeddingRetriever>) -> Self {
        Self {
            root: config.dir.clone(),
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
            metadata_path: config.metadata_path(),
            batch_size: config.batch_size.max(1),
            index: VectorStoreConfig::default().index_name,
            retriever,
        }
    }

    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = path.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Name of the index the documents are written to, recorded with the
    /// fingerprints.
    pub fn with_collection_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn collection(&self) -> CollectionIdentity {
        let store = self.retriever.store();
        CollectionIdentity {
            backend: store.name().to_string(),
            index: self.index.clone(),
            dimension: store.dimension(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    // ── Scanning ──────────────────────────────────────────────────────

    /// Fingerprint every eligible file under the root.
    pub async fn scan(&self) -> Result<FingerprintMap, KnowledgeError> {
        let root = self.root.clone();
        let extensions = self.extensions.clone();
        let metadata_path = self.metadata_path.clone();
        tokio::task::spawn_blocking(move || scan_dir(&root, &extensions, &metadata_path))
            .await
            .map_err(|e| KnowledgeError::Io {
                path: self.root.display().to_string(),
                reason: format!("scan task failed: {e}"),
            })?
    }

    /// The map persisted by the last successful run against this
    /// collection, if any.
    pub async fn load_fingerprints(&self) -> Option<FingerprintMap> {
        self.load_metadata().await.map(|metadata| metadata.files)
    }

    /// An unreadable map, or one written for another collection, is treated
    /// as absent so everything is re-embedded.
    async fn load_metadata(&self) -> Option<KnowledgeMetadata> {
        let bytes = match tokio::fs::read(&self.metadata_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(
                    path = %self.metadata_path.display(),
                    error = %e,
                    "Cannot read fingerprint map"
                );
                return None;
            }
        };
        let mut metadata = match serde_json::from_slice::<KnowledgeMetadata>(&bytes) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    path = %self.metadata_path.display(),
                    error = %e,
                    "Corrupt fingerprint map, ignoring"
                );
                return None;
            }
        };

        let collection = self.collection();
        if metadata.collection != collection {
            info!(
                recorded = ?metadata.collection,
                current = ?collection,
                "Fingerprint map belongs to another collection, starting fresh"
            );
            return None;
        }
        for (path, fp) in metadata.files.iter_mut() {
            fp.path = path.clone();
        }
        Some(metadata)
    }

    /// The persisted metadata, discarded when the collection lost the
    /// documents it recorded.
    async fn baseline(&self) -> Option<KnowledgeMetadata> {
        let metadata = self.load_metadata().await?;
        if metadata.documents == 0 {
            return Some(metadata);
        }
        match self.retriever.store().count().await {
            Ok(0) => {
                info!(
                    recorded = metadata.documents,
                    "Collection is empty but fingerprints exist, starting fresh"
                );
                None
            }
            Ok(_) => Some(metadata),
            Err(e) => {
                warn!(error = %e, "Cannot count collection documents");
                Some(metadata)
            }
        }
    }

    async fn persist(&self, metadata: &KnowledgeMetadata) -> Result<(), KnowledgeError> {
        let io_err = |e: std::io::Error| KnowledgeError::Io {
            path: self.metadata_path.display().to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = self.metadata_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| KnowledgeError::Metadata(e.to_string()))?;
        let tmp = self.metadata_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.metadata_path).await.map_err(io_err)?;
        debug!(
            path = %self.metadata_path.display(),
            files = metadata.files.len(),
            "Fingerprint map persisted"
        );
        Ok(())
    }

    async fn forget(&self) -> Result<(), KnowledgeError> {
        match tokio::fs::remove_file(&self.metadata_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KnowledgeError::Io {
                path: self.metadata_path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn fresh_metadata(&self) -> KnowledgeMetadata {
        KnowledgeMetadata {
            collection: self.collection(),
            documents: 0,
            files: FingerprintMap::new(),
        }
    }

    // ── Change detection ──────────────────────────────────────────────

    /// Whether any file was added, modified or removed since the last run.
    pub async fn check_for_changes(&self) -> Result<bool, KnowledgeError> {
        let current = self.scan().await?;
        let changed = match self.baseline().await {
            None => !current.is_empty(),
            Some(previous) => !diff(Some(&previous.files), &current).is_empty(),
        };
        info!(root = %self.root.display(), files = current.len(), changed, "Knowledge check");
        Ok(changed)
    }

    // ── Ingestion ─────────────────────────────────────────────────────

    /// Embed the delta since the last run. Returns false only when every
    /// attempted file failed.
    pub async fn embed_knowledge(&self) -> Result<bool, KnowledgeError> {
        Ok(self.embed_changes().await?.succeeded())
    }

    /// Embed new and modified files; forget deleted ones.
    pub async fn embed_changes(&self) -> Result<EmbedReport, KnowledgeError> {
        let current = self.scan().await?;
        let previous = self.baseline().await;
        let delta = diff(previous.as_ref().map(|m| &m.files), &current);
        let metadata = previous.unwrap_or_else(|| self.fresh_metadata());
        self.ingest(delta, &current, metadata).await
    }

    /// Re-embed every eligible file regardless of fingerprints.
    pub async fn embed_all(&self) -> Result<EmbedReport, KnowledgeError> {
        let current = self.scan().await?;
        let previous = self.baseline().await.unwrap_or_else(|| self.fresh_metadata());
        let delta = Delta {
            changed: current.keys().cloned().collect(),
            removed: previous
                .files
                .keys()
                .filter(|p| !current.contains_key(*p))
                .cloned()
                .collect(),
        };
        self.ingest(delta, &current, previous).await
    }

    /// Clear the collection and embed everything from scratch. The old
    /// fingerprints are dropped first, so a rebuild where every file fails
    /// leaves everything pending.
    pub async fn rebuild(&self) -> Result<EmbedReport, Error> {
        self.forget().await?;
        self.retriever.store().reset().await?;
        let current = self.scan().await?;
        let delta = Delta {
            changed: current.keys().cloned().collect(),
            removed: Vec::new(),
        };
        info!(files = current.len(), "Rebuilding knowledge collection");
        Ok(self.ingest(delta, &current, self.fresh_metadata()).await?)
    }

    async fn ingest(
        &self,
        delta: Delta,
        current: &FingerprintMap,
        mut metadata: KnowledgeMetadata,
    ) -> Result<EmbedReport, KnowledgeError> {
        let mut report = EmbedReport::default();

        for removed in &delta.removed {
            warn!(
                file = %removed,
                "Knowledge file removed; its documents stay in the collection until rebuild"
            );
            metadata.files.remove(removed);
            report.removed_files += 1;
        }

        for batch in delta.changed.chunks(self.batch_size) {
            let outcomes = join_all(batch.iter().map(|path| self.embed_file(path))).await;
            for (path, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    FileOutcome::Stored { documents, degraded } => {
                        report.embedded_files += 1;
                        report.documents += documents;
                        report.degraded_documents += degraded;
                        if let Some(fp) = current.get(path) {
                            metadata.files.insert(path.clone(), fp.clone());
                        }
                    }
                    FileOutcome::Failed => report.failed_files += 1,
                }
            }
        }

        let deletions_only = delta.changed.is_empty() && !delta.removed.is_empty();
        if report.embedded_files > 0 || deletions_only {
            metadata.documents += report.documents;
            self.persist(&metadata).await?;
        }

        info!(
            embedded = report.embedded_files,
            failed = report.failed_files,
            removed = report.removed_files,
            documents = report.documents,
            degraded = report.degraded_documents,
            "Knowledge ingestion finished"
        );
        Ok(report)
    }

    async fn embed_file(&self, relative: &str) -> FileOutcome {
        let full = self.root.join(relative);
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %relative, error = %e, "Cannot read knowledge file, skipping");
                return FileOutcome::Failed;
            }
        };

        let documents = if extension_of(&full).as_deref() == Some("csv") {
            tabular::row_documents(&content)
        } else {
            let name = full
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| relative.to_string());
            vec![format!("# {name}\n{content}")]
        };

        let total = documents.len();
        let mut stored = 0;
        let mut degraded = 0;
        for document in documents {
            let embedding = self.retriever.embed_detailed(&document).await;
            match self.retriever.store().add_embedding(embedding.vector, document).await {
                Ok(()) => {
                    stored += 1;
                    degraded += usize::from(embedding.degraded);
                }
                Err(e) => warn!(file = %relative, error = %e, "Failed to store document"),
            }
        }

        if total > 0 && stored == 0 {
            return FileOutcome::Failed;
        }
        debug!(file = %relative, documents = stored, "Embedded knowledge file");
        FileOutcome::Stored {
            documents: stored,
            degraded,
        }
    }

    // ── Reporting ─────────────────────────────────────────────────────

    pub async fn stats(&self) -> Result<KnowledgeStats, Error> {
        let current = self.scan().await?;
        let previous = self.baseline().await;
        let pending_changes = match &previous {
            None => !current.is_empty(),
            Some(previous) => !diff(Some(&previous.files), &current).is_empty(),
        };

        let mut by_extension = BTreeMap::new();
        for path in current.keys() {
            let ext = extension_of(Path::new(path)).unwrap_or_default();
            *by_extension.entry(ext).or_insert(0) += 1;
        }

        Ok(KnowledgeStats {
            root: self.root.display().to_string(),
            files: current.len(),
            by_extension,
            total_bytes: current.values().map(|fp| fp.size).sum(),
            tracked_files: previous.map(|p| p.files.len()).unwrap_or(0),
            pending_changes,
            documents: self.retriever.store().count().await?,
        })
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Absolute form of `path` with symlinks and `..` resolved. A file that does
/// not exist yet is resolved through its parent directory.
fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            std::fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

fn scan_dir(
    root: &Path,
    extensions: &[String],
    metadata_path: &Path,
) -> Result<FingerprintMap, KnowledgeError> {
    if !root.is_dir() {
        return Err(KnowledgeError::MissingRoot(root.display().to_string()));
    }
    let metadata_name = metadata_path.file_name();
    let metadata_path = canonical(metadata_path);
    let allowed: BTreeSet<&str> = extensions.iter().map(String::as_str).collect();
    let mut map = FingerprintMap::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| match e {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(error = %err, "Skipping unreadable knowledge entry");
            None
        }
    }) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.file_name() == metadata_name && canonical(path) == metadata_path {
            continue;
        }
        let Some(ext) = extension_of(path) else { continue };
        if !allowed.contains(ext.as_str()) {
            continue;
        }

        let (bytes, meta) = match (std::fs::read(path), entry.metadata()) {
            (Ok(bytes), Ok(meta)) => (bytes, meta),
            (Err(e), _) => {
                warn!(file = %path.display(), error = %e, "Cannot fingerprint file, skipping");
                continue;
            }
            (_, Err(e)) => {
                warn!(file = %path.display(), error = %e, "Cannot stat file, skipping");
                continue;
            }
        };

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        map.insert(
            relative.clone(),
            FileFingerprint {
                path: relative,
                content_hash: format!("{:x}", Sha256::digest(&bytes)),
                mtime,
                size: meta.len(),
            },
        );
    }
    Ok(map)
}
