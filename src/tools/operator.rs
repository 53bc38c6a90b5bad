use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

const MAX_LIST_ENTRIES: usize = 2_000;

/// Workspace-rooted filesystem collaborator for the built-in tools. Every
/// path is resolved relative to the working directory and may not escape it,
/// via traversal or symlink.
#[derive(Clone)]
pub struct ToolOperator {
    working_dir: PathBuf,
    canonical_working_dir: PathBuf,
}

impl ToolOperator {
    pub fn new(working_dir: PathBuf) -> Self {
        let canonical_working_dir =
            fs::canonicalize(&working_dir).unwrap_or_else(|_| working_dir.clone());
        Self {
            working_dir,
            canonical_working_dir,
        }
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            bail!("A non-empty relative path is required");
        }
        if path.starts_with('/') || path.contains('\\') {
            bail!("Security error: absolute or platform-specific path not allowed: {path}");
        }

        let relative_path = Path::new(path);
        for component in relative_path.components() {
            if matches!(component, Component::ParentDir) {
                bail!("Security error: path traversal detected: {path}");
            }
        }

        let requested = self.working_dir.join(relative_path);
        self.ensure_path_is_within_workspace(&requested)?;

        Ok(requested)
    }

    fn ensure_path_is_within_workspace(&self, path: &Path) -> Result<()> {
        let guard_path = if path.exists() {
            path.to_path_buf()
        } else {
            nearest_existing_ancestor(path)
                .context("Security error: could not find an existing parent path")?
                .to_path_buf()
        };

        let canonical_guard = fs::canonicalize(&guard_path)
            .with_context(|| format!("Failed to canonicalize {}", guard_path.display()))?;
        if !canonical_guard.starts_with(&self.canonical_working_dir) {
            bail!(
                "Security error: path escapes working directory via symlink or traversal: {}",
                path.display()
            );
        }
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve_path(path)?;
        fs::read_to_string(resolved).with_context(|| format!("Failed to read file {path}"))
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(resolved, content).with_context(|| format!("Failed to write file {path}"))
    }

    /// Replace the first exact occurrence of `old` with `new`. Fails when
    /// `old` is absent.
    pub fn edit_file(&self, path: &str, old: &str, new: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        let content =
            fs::read_to_string(&resolved).with_context(|| format!("Failed to read file {path}"))?;

        if old.is_empty() {
            bail!("edit_file requires a non-empty snippet to replace");
        }
        if !content.contains(old) {
            bail!("Snippet not found in {path}");
        }

        let new_content = content.replacen(old, new, 1);
        fs::write(resolved, new_content).with_context(|| format!("Failed to edit file {path}"))
    }

    pub fn create_directory(&self, path: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        fs::create_dir_all(resolved)
            .with_context(|| format!("Failed to create directory {path}"))
    }

    /// List entries under `path` (the workspace root when absent), sorted,
    /// optionally filtered by a substring pattern. Directories get a trailing
    /// slash. Dotfiles are skipped.
    pub fn list_files(&self, path: Option<&str>, pattern: Option<&str>) -> Result<Vec<String>> {
        let root = match path {
            Some(p) if !p.trim().is_empty() => self.resolve_path(p)?,
            _ => self.working_dir.clone(),
        };

        if root.is_file() {
            return Ok(vec![self.to_workspace_relative_display(&root)]);
        }

        let mut children: Vec<_> = fs::read_dir(&root)
            .with_context(|| format!("Failed to read directory {}", root.display()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to list entries in {}", root.display()))?;
        children.sort_by_key(|entry| entry.path());

        let mut entries = Vec::new();
        for child in children {
            let name = child.file_name();
            let name = name.to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(pattern) = pattern {
                if !pattern.trim().is_empty() && !name.contains(pattern.trim()) {
                    continue;
                }
            }

            let child_path = child.path();
            let is_dir = child
                .file_type()
                .with_context(|| format!("Failed to inspect {}", child_path.display()))?
                .is_dir();
            let mut display = self.to_workspace_relative_display(&child_path);
            if is_dir {
                display.push('/');
            }
            entries.push(display);
            if entries.len() >= MAX_LIST_ENTRIES {
                break;
            }
        }

        Ok(entries)
    }

    fn to_workspace_relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.working_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}
