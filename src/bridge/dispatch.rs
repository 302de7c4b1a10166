use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::ChatBackend;
use crate::mapping::MappingTable;
use crate::matrix::MatrixTransport;

use super::echo::EchoGuard;

/// A local message-created notification as delivered by the webhook.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MessageCreated {
    pub message_id: i64,
    pub channel_id: i64,
    pub username: String,
}

/// Unit of work handed to the outbound worker. Carries ids only; the worker
/// re-fetches the message so deletions between enqueue and send are noticed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundJob {
    pub matrix_room_id: String,
    pub message_id: i64,
}

/// Why a notification did or did not produce a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    Enqueued,
    Disabled,
    Unmapped,
    EchoSuppressed,
    QueueClosed,
}

/// Resolves mapping and echo policy synchronously and enqueues the job; the
/// network call happens in the worker so the notification handler returns
/// promptly.
#[derive(Clone)]
pub struct OutboundDispatcher {
    enabled: bool,
    channel_mappings: String,
    echo: EchoGuard,
    tx: mpsc::UnboundedSender<OutboundJob>,
}

impl OutboundDispatcher {
    pub fn new(
        enabled: bool,
        channel_mappings: String,
        echo: EchoGuard,
        tx: mpsc::UnboundedSender<OutboundJob>,
    ) -> Self {
        Self {
            enabled,
            channel_mappings,
            echo,
            tx,
        }
    }

    pub fn handle_message_created(&self, notification: &MessageCreated) -> DispatchDecision {
        if !self.enabled {
            return DispatchDecision::Disabled;
        }

        let mappings = MappingTable::parse(&self.channel_mappings);
        let Some(mapping) = mappings.find_by_local_channel(notification.channel_id) else {
            debug!(
                "no mapping for channel {}, dropping message {}",
                notification.channel_id, notification.message_id
            );
            return DispatchDecision::Unmapped;
        };

        if self.echo.suppress_outbound(&notification.username) {
            debug!(
                "suppressing echo of bridge message {} in channel {}",
                notification.message_id, notification.channel_id
            );
            return DispatchDecision::EchoSuppressed;
        }

        let job = OutboundJob {
            matrix_room_id: mapping.matrix_room_id.clone(),
            message_id: notification.message_id,
        };
        if self.tx.send(job).is_err() {
            warn!("outbound queue is closed, dropping message {}", notification.message_id);
            return DispatchDecision::QueueClosed;
        }
        DispatchDecision::Enqueued
    }
}

/// Single FIFO worker consuming outbound jobs until the queue closes.
pub async fn run_outbound_worker(
    mut rx: mpsc::UnboundedReceiver<OutboundJob>,
    chat: Arc<dyn ChatBackend>,
    matrix: Arc<dyn MatrixTransport>,
) {
    info!("outbound worker started");
    while let Some(job) = rx.recv().await {
        deliver_job(&job, chat.as_ref(), matrix.as_ref()).await;
    }
    info!("outbound worker stopped");
}

async fn deliver_job(job: &OutboundJob, chat: &dyn ChatBackend, matrix: &dyn MatrixTransport) {
    let message = match chat.message(job.message_id).await {
        Ok(Some(message)) => message,
        Ok(None) => {
            // Deleted between enqueue and execution.
            debug!("message {} no longer exists, dropping job", job.message_id);
            return;
        }
        Err(e) => {
            warn!("failed to fetch message {}: {}", job.message_id, e);
            return;
        }
    };

    let body = format!("[{}]: {}", message.username, message.text);
    let outcome = matrix.send_text(&job.matrix_room_id, &body, None).await;
    if outcome.is_accepted() {
        debug!(
            "delivered message {} to {}",
            job.message_id, job.matrix_room_id
        );
    } else {
        warn!(
            "failed to deliver message {} to {}: {:?}",
            job.message_id, job.matrix_room_id, outcome
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use crate::bridge::echo::EchoGuard;
    use crate::chat::{ChatMessage, MemoryChatBackend};
    use crate::matrix::{MatrixTransport, SendOutcome, SyncOutcome};

    use super::{
        DispatchDecision, MessageCreated, OutboundDispatcher, OutboundJob, run_outbound_worker,
    };

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MatrixTransport for RecordingTransport {
        async fn sync(&self, _since: Option<&str>, _timeout_ms: u64) -> SyncOutcome {
            SyncOutcome::Unavailable
        }

        async fn send_text(
            &self,
            room_id: &str,
            body: &str,
            _txn_id: Option<&str>,
        ) -> SendOutcome {
            self.sent
                .lock()
                .push((room_id.to_string(), body.to_string()));
            SendOutcome::Accepted { event_id: None }
        }
    }

    const MAPPINGS: &str = r#"[{"chat_channel_id": 7, "matrix_room_id": "!abc:example.org"}]"#;

    fn dispatcher(
        enabled: bool,
        mappings: &str,
    ) -> (OutboundDispatcher, mpsc::UnboundedReceiver<OutboundJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = OutboundDispatcher::new(
            enabled,
            mappings.to_string(),
            EchoGuard::new("@bridge:example.org", "matrix_bridge"),
            tx,
        );
        (dispatcher, rx)
    }

    fn notification(channel_id: i64, username: &str) -> MessageCreated {
        MessageCreated {
            message_id: 11,
            channel_id,
            username: username.to_string(),
        }
    }

    #[test]
    fn enqueues_a_job_for_a_mapped_channel() {
        let (dispatcher, mut rx) = dispatcher(true, MAPPINGS);

        let decision = dispatcher.handle_message_created(&notification(7, "alice"));

        assert_eq!(decision, DispatchDecision::Enqueued);
        let job = rx.try_recv().unwrap();
        assert_eq!(job.matrix_room_id, "!abc:example.org");
        assert_eq!(job.message_id, 11);
    }

    #[test]
    fn aborts_when_bridging_is_disabled() {
        let (dispatcher, mut rx) = dispatcher(false, MAPPINGS);
        let decision = dispatcher.handle_message_created(&notification(7, "alice"));
        assert_eq!(decision, DispatchDecision::Disabled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn aborts_for_unmapped_channels() {
        let (dispatcher, mut rx) = dispatcher(true, MAPPINGS);
        let decision = dispatcher.handle_message_created(&notification(8, "alice"));
        assert_eq!(decision, DispatchDecision::Unmapped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn suppresses_messages_authored_by_the_bridge_identity() {
        let (dispatcher, mut rx) = dispatcher(true, MAPPINGS);
        let decision = dispatcher.handle_message_created(&notification(7, "matrix_bridge"));
        assert_eq!(decision, DispatchDecision::EchoSuppressed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_mapping_json_degrades_to_unmapped() {
        let (dispatcher, mut rx) = dispatcher(true, "{broken");
        let decision = dispatcher.handle_message_created(&notification(7, "alice"));
        assert_eq!(decision, DispatchDecision::Unmapped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_refetches_and_delivers_the_message() {
        let chat = Arc::new(MemoryChatBackend::new());
        chat.add_message(ChatMessage {
            id: 11,
            channel_id: 7,
            username: "alice".to_string(),
            text: "hello matrix".to_string(),
        });
        let transport = Arc::new(RecordingTransport::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutboundJob {
            matrix_room_id: "!abc:example.org".to_string(),
            message_id: 11,
        })
        .unwrap();
        drop(tx);

        run_outbound_worker(rx, chat, transport.clone()).await;

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "!abc:example.org");
        assert_eq!(sent[0].1, "[alice]: hello matrix");
    }

    #[tokio::test]
    async fn worker_drops_jobs_for_deleted_messages() {
        let chat = Arc::new(MemoryChatBackend::new());
        let transport = Arc::new(RecordingTransport::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutboundJob {
            matrix_room_id: "!abc:example.org".to_string(),
            message_id: 404,
        })
        .unwrap();
        drop(tx);

        run_outbound_worker(rx, chat, transport.clone()).await;

        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn worker_preserves_enqueue_order() {
        let chat = Arc::new(MemoryChatBackend::new());
        for id in [1, 2, 3] {
            chat.add_message(ChatMessage {
                id,
                channel_id: 7,
                username: "alice".to_string(),
                text: format!("msg {id}"),
            });
        }
        let transport = Arc::new(RecordingTransport::default());

        let (tx, rx) = mpsc::unbounded_channel();
        for id in [1, 2, 3] {
            tx.send(OutboundJob {
                matrix_room_id: "!abc:example.org".to_string(),
                message_id: id,
            })
            .unwrap();
        }
        drop(tx);

        run_outbound_worker(rx, chat, transport.clone()).await;

        let bodies: Vec<String> = transport.sent.lock().iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(bodies, vec!["[alice]: msg 1", "[alice]: msg 2", "[alice]: msg 3"]);
    }
}
