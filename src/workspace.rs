use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_SCANNED_FILES: usize = 1_000;
const MAX_FILE_LINES: usize = 500;
const TRUNCATE_HEAD: usize = 200;
const TRUNCATE_TAIL: usize = 100;
const MAX_CONTEXT_FILES: usize = 20;
const CONTEXT_BYTE_BUDGET: usize = 48_000;

/// Directory segments never included in workspace context.
const EXCLUDED_SEGMENTS: [&str; 12] = [
    "/node_modules/",
    "/.git/",
    "/target/",
    "/dist/",
    "/build/",
    "/out/",
    "/.next/",
    "/coverage/",
    "/__pycache__/",
    "/.venv/",
    "/venv/",
    "/vendor/",
];

const EXCLUDED_EXTENSIONS: [&str; 16] = [
    "png", "jpg", "jpeg", "gif", "ico", "woff", "woff2", "ttf", "eot", "pdf", "zip", "gz", "exe",
    "so", "bin", "lock",
];

#[derive(Debug, Clone)]
pub struct ContextFile {
    pub path: String,
    pub language: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    pub root_name: String,
    pub file_tree: String,
    pub total_files: usize,
    pub included_files: usize,
    pub files: Vec<ContextFile>,
}

impl WorkspaceContext {
    /// Shape sent to the relay as `codebase_context`.
    pub fn to_request_json(&self) -> serde_json::Value {
        json!({
            "rootName": self.root_name,
            "fileTree": self.file_tree,
            "files": self.files.iter().map(|f| json!({
                "path": f.path,
                "language": f.language,
                "content": f.content,
            })).collect::<Vec<_>>(),
        })
    }
}

/// Collects workspace context for the request payload: a file tree of the
/// project plus the contents of as many small files as fit the byte budget.
pub struct WorkspaceScanner {
    root: PathBuf,
    excluded_segments: AhoCorasick,
}

impl WorkspaceScanner {
    pub fn new(root: PathBuf) -> Result<Self> {
        let excluded_segments = AhoCorasick::new(EXCLUDED_SEGMENTS)
            .context("Failed to build workspace exclusion matcher")?;
        Ok(Self {
            root,
            excluded_segments,
        })
    }

    pub fn scan(&self) -> Result<WorkspaceContext> {
        let root_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.display().to_string());

        let mut paths = Vec::new();
        self.collect_paths(&self.root, &mut paths)?;
        paths.sort();
        paths.truncate(MAX_SCANNED_FILES);

        let file_tree = build_file_tree(&paths);

        let mut files = Vec::new();
        let mut budget = CONTEXT_BYTE_BUDGET;
        for rel_path in &paths {
            if files.len() >= MAX_CONTEXT_FILES || budget == 0 {
                break;
            }
            let Some(content) = self.read_truncated(rel_path) else {
                continue;
            };
            if content.len() > budget {
                continue;
            }
            budget -= content.len();
            files.push(ContextFile {
                path: rel_path.clone(),
                language: detect_language(rel_path).to_string(),
                content,
            });
        }

        Ok(WorkspaceContext {
            root_name,
            file_tree,
            total_files: paths.len(),
            included_files: files.len(),
            files,
        })
    }

    fn collect_paths(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        if out.len() >= MAX_SCANNED_FILES {
            return Ok(());
        }
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            // Unreadable directories are skipped, not fatal.
            Err(_) => return Ok(()),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            let rel = match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            // Sentinel slashes let segment patterns match at both ends.
            let probe = format!("/{rel}/");
            if self.excluded_segments.is_match(&probe) {
                continue;
            }

            if path.is_dir() {
                self.collect_paths(&path, out)?;
            } else {
                if has_excluded_extension(&rel) {
                    continue;
                }
                out.push(rel);
                if out.len() >= MAX_SCANNED_FILES {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// File content with head/tail truncation beyond the line cap. Returns
    /// `None` for unreadable or binary-looking files.
    fn read_truncated(&self, rel_path: &str) -> Option<String> {
        let content = fs::read_to_string(self.root.join(rel_path)).ok()?;
        if content.contains('\u{0}') {
            return None;
        }

        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= MAX_FILE_LINES {
            return Some(content);
        }

        let head = lines[..TRUNCATE_HEAD].join("\n");
        let tail = lines[lines.len() - TRUNCATE_TAIL..].join("\n");
        let omitted = lines.len() - TRUNCATE_HEAD - TRUNCATE_TAIL;
        Some(format!("{head}\n\n[... {omitted} lines truncated ...]\n\n{tail}"))
    }
}

fn has_excluded_extension(rel_path: &str) -> bool {
    match rel_path.rsplit_once('.') {
        Some((_, ext)) => EXCLUDED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

fn detect_language(rel_path: &str) -> &'static str {
    let extension = rel_path
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or_default();
    match extension {
        "rs" => "rust",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" => "c",
        "cpp" | "cc" => "cpp",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "sh" | "bash" => "shell",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => "plaintext",
    }
}

/// Render sorted relative paths as an indented tree.
fn build_file_tree(paths: &[String]) -> String {
    let mut lines = Vec::new();
    for path in paths {
        let segments: Vec<&str> = path.split('/').collect();
        let depth = segments.len() - 1;
        let name = segments.last().copied().unwrap_or_default();
        lines.push(format!("{}{}", "  ".repeat(depth), name));
    }
    lines.join("\n")
}
