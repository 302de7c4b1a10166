use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatBackend, ChatUser};
use crate::mapping::MappingTable;
use crate::matrix::{MatrixTransport, RemoteEvent, SyncOutcome, SyncResponse};
use crate::state::CursorStore;
use crate::translate;

use super::echo::EchoGuard;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Raw JSON mapping list; re-parsed every cycle.
    pub channel_mappings: String,
    pub poll_timeout_ms: u64,
    /// Pause between successful cycles.
    pub idle_pause: Duration,
    /// Longer pause after an unavailable or empty poll.
    pub error_backoff: Duration,
}

/// What one poll/process cycle did; used for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// A batch with a usable cursor was fetched.
    pub fetched: bool,
    /// The batch was an initial baseline and its events were not replayed.
    pub baseline: bool,
    /// The cursor was persisted.
    pub advanced: bool,
    pub bridged: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum EventDisposition {
    Bridged,
    Skipped(&'static str),
}

/// Cursor-driven inbound engine. One instance at a time; the cursor has no
/// concurrent writers.
pub struct SyncEngine {
    matrix: Arc<dyn MatrixTransport>,
    chat: Arc<dyn ChatBackend>,
    cursor: Arc<dyn CursorStore>,
    echo: EchoGuard,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        matrix: Arc<dyn MatrixTransport>,
        chat: Arc<dyn ChatBackend>,
        cursor: Arc<dyn CursorStore>,
        echo: EchoGuard,
        settings: SyncSettings,
    ) -> Self {
        Self {
            matrix,
            chat,
            cursor,
            echo,
            settings,
        }
    }

    /// Runs poll/process cycles until shutdown is signalled. Explicit timed
    /// delays between cycles; a long-poll in flight is left to run out its
    /// bounded timeout before the loop notices shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "inbound sync engine started, poll timeout {}ms",
            self.settings.poll_timeout_ms
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = tokio::select! {
                report = self.run_cycle() => report,
                _ = shutdown.changed() => break,
            };

            let pause = if report.advanced {
                self.settings.idle_pause
            } else {
                self.settings.error_backoff
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("inbound sync engine stopped");
    }

    /// One Idle -> Polling -> Processing -> Idle pass. Never raises; every
    /// failure path ends in a logged skip.
    pub async fn run_cycle(&self) -> CycleReport {
        let since = match self.cursor.load().await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("failed to load sync cursor: {:#}", e);
                return CycleReport::default();
            }
        };

        let outcome = self
            .matrix
            .sync(since.as_deref(), self.settings.poll_timeout_ms)
            .await;

        let response = match outcome {
            SyncOutcome::Batch(response) => response,
            SyncOutcome::Empty => {
                debug!("sync returned no usable batch");
                return CycleReport::default();
            }
            SyncOutcome::Unavailable => {
                debug!("sync unavailable, keeping cursor {:?}", since);
                return CycleReport::default();
            }
        };

        let mut report = CycleReport {
            fetched: true,
            ..CycleReport::default()
        };

        // First sync without a cursor establishes a baseline; its timeline
        // snapshot is not replayed (no historical backfill).
        if since.is_none() {
            report.baseline = true;
            info!(
                "established sync baseline at {}, skipping snapshot events",
                response.next_batch
            );
        } else if !self.process_batch(&response, &mut report).await {
            // Aborted before any event was attempted; leave the cursor so
            // the batch is retried.
            return report;
        }

        match self.cursor.save(&response.next_batch).await {
            Ok(()) => report.advanced = true,
            Err(e) => error!("failed to persist sync cursor: {:#}", e),
        }

        report
    }

    /// Returns false when the batch was aborted before any event was
    /// attempted (the cursor must not advance in that case).
    async fn process_batch(&self, response: &SyncResponse, report: &mut CycleReport) -> bool {
        let total_events: usize = response
            .rooms
            .join
            .values()
            .map(|room| room.timeline.events.len())
            .sum();
        if total_events == 0 {
            return true;
        }

        let Some(bridge_user) = self.resolve_bridge_user().await else {
            return false;
        };

        let mappings = MappingTable::parse(&self.settings.channel_mappings);

        for (room_id, room) in &response.rooms.join {
            for event in &room.timeline.events {
                match self
                    .handle_event(room_id, event, &bridge_user, &mappings)
                    .await
                {
                    Ok(EventDisposition::Bridged) => report.bridged += 1,
                    Ok(EventDisposition::Skipped(reason)) => {
                        debug!(
                            "skipping event {} in {}: {}",
                            event.event_id, room_id, reason
                        );
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(
                            "failed to bridge event {} in {}: {:#}",
                            event.event_id, room_id, e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        true
    }

    async fn resolve_bridge_user(&self) -> Option<ChatUser> {
        let username = self.echo.local_bridge_username();
        match self.chat.user(username).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                warn!("local bridge account '{}' is not provisioned", username);
                None
            }
            Err(e) => {
                warn!("failed to resolve local bridge account: {}", e);
                None
            }
        }
    }

    async fn handle_event(
        &self,
        room_id: &str,
        event: &RemoteEvent,
        bridge_user: &ChatUser,
        mappings: &MappingTable,
    ) -> Result<EventDisposition> {
        let Some(body) = translate::translate(event) else {
            return Ok(EventDisposition::Skipped("not a bridgeable message"));
        };

        if self.echo.suppress_inbound(&event.sender) {
            return Ok(EventDisposition::Skipped("own bridge echo"));
        }

        let Some(mapping) = mappings.find_by_remote_room(room_id) else {
            return Ok(EventDisposition::Skipped("room has no channel mapping"));
        };

        let channel = self
            .chat
            .channel(mapping.chat_channel_id)
            .await
            .context("channel lookup")?
            .with_context(|| format!("mapped channel {} not found", mapping.chat_channel_id))?;

        if channel.is_followable() {
            self.chat
                .follow_channel(channel.id, &bridge_user.username)
                .await
                .context("follow channel")?;
        } else {
            self.chat
                .add_member(channel.id, &bridge_user.username)
                .await
                .context("add channel member")?;
        }

        self.chat
            .create_message(channel.id, &bridge_user.username, &body)
            .await
            .context("create message")?;

        debug!(
            "bridged event {} from {} into channel {}",
            event.event_id, room_id, channel.id
        );
        Ok(EventDisposition::Bridged)
    }
}

/// Parks until the shutdown flag flips (or the sender is dropped). Used in
/// place of the sync loop when bridging is disabled so the process stays
/// resident for the webhook server and worker.
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}
