use crate::events::{emit, UiEvent, UiEventSender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Correlates a suspended tool execution with a user decision arriving
/// asynchronously from the UI. One outstanding entry per tool id; an
/// unanswered request resolves to denied after the timeout.
#[derive(Clone)]
pub struct ConfirmationGate {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<bool>>>>,
    events: UiEventSender,
    timeout: Duration,
}

impl ConfirmationGate {
    pub fn new(events: UiEventSender) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
            timeout: CONFIRMATION_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(events: UiEventSender, timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
            timeout,
        }
    }

    /// Suspend until the UI answers for `tool_id` or the timeout elapses.
    /// Requesting again for an id that is already pending replaces the old
    /// entry, which resolves the earlier request as denied.
    pub async fn request(&self, tool_id: &str, description: &str) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(tool_id.to_string(), response_tx);
        emit(
            &self.events,
            UiEvent::ToolConfirmationRequest {
                tool_id: tool_id.to_string(),
                description: description.to_string(),
            },
        );

        match tokio::time::timeout(self.timeout, response_rx).await {
            Ok(Ok(approved)) => approved,
            // The sender was dropped: replaced by a newer request for the
            // same id, or the gate was torn down.
            Ok(Err(_)) => false,
            Err(_) => {
                self.pending.lock().await.remove(tool_id);
                emit(
                    &self.events,
                    UiEvent::ToolConfirmationExpired {
                        tool_id: tool_id.to_string(),
                    },
                );
                false
            }
        }
    }

    /// Deliver the UI's answer. Unknown or already-expired ids are a no-op.
    pub async fn resolve(&self, tool_id: &str, approved: bool) {
        if let Some(response_tx) = self.pending.lock().await.remove(tool_id) {
            let _ = response_tx.send(approved);
        }
    }

    pub async fn is_pending(&self, tool_id: &str) -> bool {
        self.pending.lock().await.contains_key(tool_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn gate() -> (ConfirmationGate, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConfirmationGate::new(tx), rx)
    }

    #[tokio::test]
    async fn test_request_resolves_true_when_approved() {
        let (gate, _rx) = gate();
        let answering = gate.clone();
        let request = tokio::spawn(async move { answering.request("tool-1", "Write: a.ts").await });

        // Wait for the entry to appear before answering.
        while !gate.is_pending("tool-1").await {
            tokio::task::yield_now().await;
        }
        gate.resolve("tool-1", true).await;
        assert!(request.await.expect("request task"));
        assert!(!gate.is_pending("tool-1").await);
    }

    #[tokio::test]
    async fn test_request_resolves_false_when_denied() {
        let (gate, _rx) = gate();
        let answering = gate.clone();
        let request = tokio::spawn(async move { answering.request("tool-2", "action").await });
        while !gate.is_pending("tool-2").await {
            tokio::task::yield_now().await;
        }
        gate.resolve("tool-2", false).await;
        assert!(!request.await.expect("request task"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_denies_after_timeout() {
        let (gate, mut rx) = gate();
        let approved = gate.request("tool-3", "action").await;
        assert!(!approved);
        assert!(!gate.is_pending("tool-3").await);

        let mut saw_expired = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, UiEvent::ToolConfirmationExpired { ref tool_id } if tool_id == "tool-3")
            {
                saw_expired = true;
            }
        }
        assert!(saw_expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_after_timeout_is_noop() {
        let (gate, _rx) = gate();
        let approved = gate.request("tool-4", "action").await;
        assert!(!approved);
        // Must not panic or resurrect the entry.
        gate.resolve("tool-4", true).await;
        assert!(!gate.is_pending("tool-4").await);
    }
}
