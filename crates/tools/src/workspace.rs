//! Path confinement for file tools.
//!
//! Paths are resolved lexically against a root directory: relative paths
//! are joined to the root, `.` and `..` are folded, and the result must
//! stay inside the root. The root itself does not need to exist yet.

use std::path::{Component, Path, PathBuf};

use ragweave_core::error::ToolError;

/// A directory that file tools are confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// Fold `.` and `..` without touching the filesystem. Returns `None` when
/// `..` would climb above the first component.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = normalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` (already normalized) lies inside the root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Resolve a tool-supplied path inside the workspace.
    pub fn resolve(&self, tool_name: &str, requested: &str) -> Result<PathBuf, ToolError> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(ToolError::InvalidArguments("Path must not be empty".into()));
        }

        let candidate = Path::new(requested);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        match normalize(&joined) {
            Some(resolved) if self.contains(&resolved) => Ok(resolved),
            _ => Err(ToolError::PermissionDenied {
                tool_name: tool_name.into(),
                reason: format!(
                    "'{requested}' is outside the working directory {}",
                    self.root.display()
                ),
            }),
        }
    }
}

/// Resolve `requested` in the first workspace that accepts it.
pub fn resolve_in_any(
    workspaces: &[Workspace],
    tool_name: &str,
    requested: &str,
) -> Result<PathBuf, ToolError> {
    let mut last_err = ToolError::PermissionDenied {
        tool_name: tool_name.into(),
        reason: "no readable directories configured".into(),
    };
    for workspace in workspaces {
        match workspace.resolve(tool_name, requested) {
            Ok(path) => return Ok(path),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}
