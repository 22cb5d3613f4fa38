use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::AppConfig;
use crate::identity::session::SessionManager;
use crate::identity::CredentialVerifier;
use crate::notifications::push::PushTransport;
use crate::shared::models::{Ticket, TicketComment};
use crate::shared::utils::DbPool;

/// Emitted after a comment row is committed; consumed by the notification
/// fan-out task. The primary write is durable before this is sent, so a
/// dropped event costs at most a notification, never a comment.
#[derive(Debug, Clone)]
pub struct CommentEvent {
    pub comment: TicketComment,
    pub ticket: Ticket,
    /// Identity that caused the comment: the author, or the viewer behind a
    /// system comment. Used to suppress self-notification.
    pub actor_id: String,
}

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub sessions: Arc<Mutex<SessionManager>>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub push: Arc<dyn PushTransport>,
    pub events: mpsc::UnboundedSender<CommentEvent>,
    pub changes: broadcast::Sender<String>,
}

impl AppState {
    /// Wakes every live ticket-feed subscriber. Nobody listening is fine.
    pub fn publish_change(&self, ticket_id: &str) {
        let _ = self.changes.send(ticket_id.to_string());
    }

    pub fn emit_comment_event(&self, event: CommentEvent) {
        if self.events.send(event).is_err() {
            log::warn!("notification fan-out channel closed; dropping event");
        }
    }
}
