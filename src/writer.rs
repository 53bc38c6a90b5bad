use crate::events::{emit, UiEvent, UiEventSender};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Bursts of appends within this window coalesce into a single flush.
const FLUSH_INTERVAL: Duration = Duration::from_millis(30);

/// Writes one file progressively as its content streams in. Content always
/// lands in an in-memory pending buffer first; a throttled flush appends it
/// to the target and reports progress so the UI can reveal the write
/// position. At most one streaming session is active at a time — opening a
/// new one finalizes the previous one first.
///
/// Flush, save, and delete failures are swallowed: the preview is advisory
/// and must never fail the surrounding turn.
pub struct FileStreamWriter {
    root: PathBuf,
    inner: Arc<Mutex<Inner>>,
    events: UiEventSender,
}

#[derive(Default)]
struct Inner {
    /// Buffered content not yet applied. Survives until a session is ready
    /// to receive it; never applied against a nonexistent target.
    pending: String,
    session: Option<StreamSession>,
    flush_task: Option<JoinHandle<()>>,
}

struct StreamSession {
    rel_path: String,
    abs_path: PathBuf,
    ready: bool,
    written: u64,
}

impl FileStreamWriter {
    pub fn new(root: PathBuf, events: UiEventSender) -> Self {
        Self {
            root,
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    /// Create the target (and parent directories) and begin a streaming
    /// session for it. Any previous session is finalized first — never
    /// silently dropped. Content buffered before this call flushes
    /// immediately once the session is ready. Returns false on failure, in
    /// which case no session is left active.
    pub async fn open_for_streaming(&self, rel_path: &str) -> bool {
        self.finalize().await;

        let Some(abs_path) = resolve_relative(&self.root, rel_path) else {
            self.reset_after_open_failure().await;
            return false;
        };

        if let Some(parent) = abs_path.parent() {
            if tokio::fs::create_dir_all(parent).await.is_err() {
                self.reset_after_open_failure().await;
                return false;
            }
        }
        if tokio::fs::write(&abs_path, b"").await.is_err() {
            self.reset_after_open_failure().await;
            return false;
        }

        let mut inner = self.inner.lock().await;
        inner.session = Some(StreamSession {
            rel_path: rel_path.to_string(),
            abs_path,
            ready: true,
            written: 0,
        });
        if !inner.pending.is_empty() {
            flush_locked(&mut inner, &self.events).await;
        }
        true
    }

    /// Buffer a chunk and schedule at most one delayed flush. Safe to call
    /// before the session is ready; the chunk waits in the buffer.
    pub async fn append_content(&self, chunk: &str) {
        let mut inner = self.inner.lock().await;
        inner.pending.push_str(chunk);

        let ready = inner.session.as_ref().is_some_and(|s| s.ready);
        if ready && inner.flush_task.is_none() {
            let shared = Arc::clone(&self.inner);
            let events = self.events.clone();
            inner.flush_task = Some(tokio::spawn(async move {
                tokio::time::sleep(FLUSH_INTERVAL).await;
                let mut inner = shared.lock().await;
                inner.flush_task = None;
                flush_locked(&mut inner, &events).await;
            }));
        }
    }

    /// Flush whatever remains and close the session. Idempotent: calling
    /// with no active session, or twice, is a no-op.
    pub async fn finalize(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.flush_task.take() {
            task.abort();
        }
        if inner.session.is_none() {
            return;
        }

        flush_locked(&mut inner, &self.events).await;
        if let Some(session) = inner.session.take() {
            // Best-effort persistence; the content is already on disk.
            if let Ok(file) = tokio::fs::File::open(&session.abs_path).await {
                let _ = file.sync_all().await;
            }
        }
    }

    /// Abandon the stream and delete the target. Takes the path explicitly
    /// so a denial arriving after the session already finalized can still
    /// remove the file.
    pub async fn revert(&self, rel_path: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.flush_task.take() {
            task.abort();
        }
        inner.pending.clear();
        inner.session = None;
        drop(inner);

        if let Some(abs_path) = resolve_relative(&self.root, rel_path) {
            // The target may never have been created.
            let _ = tokio::fs::remove_file(abs_path).await;
        }
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.session.is_some()
    }

    pub async fn current_path(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.rel_path.clone())
    }

    async fn reset_after_open_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.session = None;
        inner.pending.clear();
    }
}

/// Apply the entire pending buffer as one append at the end of the target.
/// Holding the session lock for the duration means appends cannot interleave
/// with an in-flight flush; they land in the buffer and the next flush takes
/// them all.
async fn flush_locked(inner: &mut Inner, events: &UiEventSender) {
    let Some(session) = inner.session.as_mut() else {
        return;
    };
    if !session.ready || inner.pending.is_empty() {
        return;
    }

    let text = std::mem::take(&mut inner.pending);
    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&session.abs_path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    match result {
        Ok(()) => {
            session.written += text.len() as u64;
            emit(
                events,
                UiEvent::FileStreamProgress {
                    path: session.rel_path.clone(),
                    written: session.written,
                },
            );
        }
        Err(error) => {
            // The target may have been removed underneath us.
            debug!(%error, path = %session.rel_path, "stream flush failed");
        }
    }
}

fn resolve_relative(root: &Path, rel_path: &str) -> Option<PathBuf> {
    if rel_path.is_empty() || rel_path.starts_with('/') || rel_path.contains('\\') {
        return None;
    }
    let relative = Path::new(rel_path);
    for component in relative.components() {
        if matches!(component, Component::ParentDir) {
            return None;
        }
    }
    Some(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_rejects_escapes() {
        let root = Path::new("/workspace");
        assert!(resolve_relative(root, "../etc/passwd").is_none());
        assert!(resolve_relative(root, "/etc/passwd").is_none());
        assert!(resolve_relative(root, "a\\b.txt").is_none());
        assert!(resolve_relative(root, "").is_none());
        assert_eq!(
            resolve_relative(root, "src/main.rs"),
            Some(PathBuf::from("/workspace/src/main.rs"))
        );
    }
}
