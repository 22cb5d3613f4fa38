pub mod push;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::identity::{self, Viewer};
use crate::shared::error::ServiceError;
use crate::shared::models::{
    Notification, NotificationKind, Ticket, TicketComment, UserAccount, UserRole,
};
use crate::shared::schema::notifications;
use crate::shared::state::{AppState, CommentEvent};
use crate::shared::utils::DbPool;

use self::push::PushMessage;

#[derive(Debug, Deserialize)]
pub struct DeviceTokenRequest {
    pub token: String,
}

/// Background consumer of comment events. Best-effort by contract: failures
/// are logged, never surfaced to the action that emitted the event.
pub fn spawn_fanout_worker(state: Arc<AppState>, mut rx: mpsc::UnboundedReceiver<CommentEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = handle_event(&state, event).await {
                log::warn!("notification fan-out failed: {e}");
            }
        }
    });
}

fn authored_by_client(comment: &TicketComment) -> bool {
    !comment.is_system && comment.author_role == UserRole::ClientUser.as_str()
}

/// Derivation rules. Client comments broadcast to every staff identity;
/// staff and system comments go to the ticket's creator, unless the acting
/// identity *is* the creator (covers ticket creation and a client closing
/// their own ticket).
pub fn derive_notifications(
    comment: &TicketComment,
    ticket: &Ticket,
    actor_id: &str,
    staff: &[UserAccount],
    now: DateTime<Utc>,
) -> Vec<Notification> {
    if authored_by_client(comment) {
        return staff
            .iter()
            .map(|member| Notification {
                id: Uuid::new_v4(),
                recipient_id: member.id,
                ticket_id: ticket.id.clone(),
                body: format!("{}: {}", comment.author_name, comment.body),
                kind: NotificationKind::Comment.as_str().to_string(),
                is_read: false,
                created_at: now,
            })
            .collect();
    }

    if actor_id == ticket.creator_id.to_string() {
        return Vec::new();
    }

    let (body, kind) = if comment.is_system {
        (comment.body.clone(), NotificationKind::Status)
    } else {
        (
            format!("{}: {}", comment.author_name, comment.body),
            NotificationKind::Comment,
        )
    };
    vec![Notification {
        id: Uuid::new_v4(),
        recipient_id: ticket.creator_id,
        ticket_id: ticket.id.clone(),
        body,
        kind: kind.as_str().to_string(),
        is_read: false,
        created_at: now,
    }]
}

/// Persists the derived notifications, then dispatches push delivery for
/// each. Persistence happens first; a transport failure can never roll it
/// back.
pub async fn handle_event(
    state: &AppState,
    event: CommentEvent,
) -> Result<Vec<Notification>, ServiceError> {
    let staff = if authored_by_client(&event.comment) {
        identity::list_staff(&state.conn)?
    } else {
        Vec::new()
    };

    let batch = derive_notifications(
        &event.comment,
        &event.ticket,
        &event.actor_id,
        &staff,
        Utc::now(),
    );
    if batch.is_empty() {
        return Ok(batch);
    }

    {
        let mut conn = state.conn.get()?;
        diesel::insert_into(notifications::table)
            .values(&batch)
            .execute(&mut conn)?;
    }

    for notification in &batch {
        dispatch(state, notification, event.comment.is_system).await;
    }
    Ok(batch)
}

/// Push delivery for one persisted notification, with dead-token pruning.
async fn dispatch(state: &AppState, notification: &Notification, is_system: bool) {
    let recipient = match identity::find_user(&state.conn, notification.recipient_id) {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(e) => {
            log::warn!(
                "push recipient lookup failed for {}: {e}",
                notification.recipient_id
            );
            return;
        }
    };
    if recipient.device_tokens.is_empty() {
        return;
    }

    let title = if is_system {
        format!("Ticket #{} Update", notification.ticket_id)
    } else {
        format!("New Reply on Ticket #{}", notification.ticket_id)
    };
    let message = PushMessage {
        title: &title,
        body: &notification.body,
        ticket_id: &notification.ticket_id,
        notification_id: notification.id,
    };

    match state.push.send(&recipient.device_tokens, &message).await {
        Ok(report) => {
            let dead = push::invalid_endpoints(&report);
            if !dead.is_empty() {
                match remove_device_tokens(&state.conn, recipient.id, &dead) {
                    Ok(()) => log::info!(
                        "pruned {} dead device token(s) for user {}",
                        dead.len(),
                        recipient.id
                    ),
                    Err(e) => {
                        log::warn!("device token cleanup failed for {}: {e}", recipient.id)
                    }
                }
            }
        }
        Err(e) => log::warn!(
            "push delivery failed for notification {}: {e}",
            notification.id
        ),
    }
}

/// Set-subtraction in SQL, so concurrent cleanups against the same user
/// cannot resurrect a removed token.
pub fn remove_device_tokens(
    pool: &DbPool,
    user_id: Uuid,
    tokens: &[String],
) -> Result<(), ServiceError> {
    let mut conn = pool.get()?;
    for token in tokens {
        diesel::sql_query("UPDATE users SET device_tokens = array_remove(device_tokens, $1) WHERE id = $2")
            .bind::<diesel::sql_types::Text, _>(token)
            .bind::<diesel::sql_types::Uuid, _>(user_id)
            .execute(&mut conn)?;
    }
    Ok(())
}

/// Append-if-absent registration; re-registering a known token is a no-op.
pub fn register_device_token(
    pool: &DbPool,
    user_id: Uuid,
    token: &str,
) -> Result<(), ServiceError> {
    let mut conn = pool.get()?;
    diesel::sql_query(
        "UPDATE users SET device_tokens = array_append(device_tokens, $1) \
         WHERE id = $2 AND NOT (device_tokens @> ARRAY[$1])",
    )
    .bind::<diesel::sql_types::Text, _>(token)
    .bind::<diesel::sql_types::Uuid, _>(user_id)
    .execute(&mut conn)?;
    Ok(())
}

pub fn list_notifications(
    state: &AppState,
    viewer: &Viewer,
) -> Result<Vec<Notification>, ServiceError> {
    let mut conn = state.conn.get()?;
    notifications::table
        .filter(notifications::recipient_id.eq(viewer.user.id))
        .order(notifications::created_at.desc())
        .load::<Notification>(&mut conn)
        .map_err(Into::into)
}

/// Marks every unread notification owned by the viewer; safe with zero
/// unread.
pub fn mark_all_read(state: &AppState, viewer: &Viewer) -> Result<usize, ServiceError> {
    let mut conn = state.conn.get()?;
    diesel::update(
        notifications::table
            .filter(notifications::recipient_id.eq(viewer.user.id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)
    .map_err(Into::into)
}

/// Recipient-scoped delete. Unknown or not-owned ids are a silent no-op so
/// the UI stays idempotent under double-clicks.
pub fn delete_notification(
    state: &AppState,
    viewer: &Viewer,
    id: Uuid,
) -> Result<(), ServiceError> {
    let mut conn = state.conn.get()?;
    diesel::delete(
        notifications::table
            .filter(notifications::id.eq(id))
            .filter(notifications::recipient_id.eq(viewer.user.id)),
    )
    .execute(&mut conn)?;
    Ok(())
}

async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
) -> Result<Json<Vec<Notification>>, ServiceError> {
    Ok(Json(list_notifications(&state, &viewer)?))
}

async fn mark_all_read_handler(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
) -> Result<StatusCode, ServiceError> {
    mark_all_read(&state, &viewer)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_notification_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    viewer: Viewer,
) -> Result<StatusCode, ServiceError> {
    delete_notification(&state, &viewer, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_token_handler(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Json(req): Json<DeviceTokenRequest>,
) -> Result<StatusCode, ServiceError> {
    register_device_token(&state.conn, viewer.user.id, &req.token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unregister_token_handler(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Json(req): Json<DeviceTokenRequest>,
) -> Result<StatusCode, ServiceError> {
    remove_device_tokens(&state.conn, viewer.user.id, &[req.token])?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_notifications_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications_handler))
        .route("/api/notifications/read", put(mark_all_read_handler))
        .route("/api/notifications/:id", delete(delete_notification_handler))
        .route(
            "/api/push/tokens",
            post(register_token_handler).delete(unregister_token_handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{NotificationKind, UserRole};
    use crate::tests::test_util;

    #[test]
    fn client_comment_broadcasts_to_every_staff_identity() {
        let owner = test_util::client_user("acme");
        let ticket = test_util::ticket_for(&owner);
        let comment = test_util::user_comment_on(&ticket, &owner, "Please advise");
        let staff = [
            test_util::staff_user("Jane Support", UserRole::SupportAgent),
            test_util::staff_user("Sam Supervisor", UserRole::Supervisor),
            test_util::staff_user("Ada Admin", UserRole::Admin),
        ];

        let batch = derive_notifications(
            &comment,
            &ticket,
            &owner.id.to_string(),
            &staff,
            Utc::now(),
        );

        assert_eq!(batch.len(), 3);
        for (notification, member) in batch.iter().zip(&staff) {
            assert_eq!(notification.recipient_id, member.id);
            assert_eq!(notification.kind, NotificationKind::Comment.as_str());
            assert_eq!(
                notification.body,
                format!("{}: Please advise", owner.display_name)
            );
            assert!(!notification.is_read);
        }
    }

    #[test]
    fn staff_comment_notifies_the_ticket_creator() {
        let owner = test_util::client_user("acme");
        let agent = test_util::staff_user("Jane Support", UserRole::SupportAgent);
        let ticket = test_util::ticket_for(&owner);
        let comment = test_util::user_comment_on(&ticket, &agent, "Looking into it");

        let batch =
            derive_notifications(&comment, &ticket, &agent.id.to_string(), &[], Utc::now());

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].recipient_id, owner.id);
        assert_eq!(batch[0].kind, NotificationKind::Comment.as_str());
        assert_eq!(batch[0].body, "Jane Support: Looking into it");
    }

    #[test]
    fn system_comment_notifies_creator_with_verbatim_text() {
        let owner = test_util::client_user("acme");
        let agent = test_util::staff_user("Jane Support", UserRole::SupportAgent);
        let ticket = test_util::ticket_for(&owner);
        let comment = test_util::system_comment_on(&ticket, "Status updated to Resolved");

        let batch =
            derive_notifications(&comment, &ticket, &agent.id.to_string(), &[], Utc::now());

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].recipient_id, owner.id);
        assert_eq!(batch[0].kind, NotificationKind::Status.as_str());
        assert_eq!(batch[0].body, "Status updated to Resolved");
    }

    #[test]
    fn actor_matching_creator_suppresses_the_notification() {
        let owner = test_util::client_user("acme");
        let ticket = test_util::ticket_for(&owner);

        // Ticket creation: system comment, actor is the creator.
        let created = test_util::system_comment_on(&ticket, "Ticket created.");
        let batch =
            derive_notifications(&created, &ticket, &owner.id.to_string(), &[], Utc::now());
        assert!(batch.is_empty());

        // Client closing their own ticket.
        let closed = test_util::system_comment_on(&ticket, "Status updated to Closed");
        let batch =
            derive_notifications(&closed, &ticket, &owner.id.to_string(), &[], Utc::now());
        assert!(batch.is_empty());
    }

    #[test]
    fn staff_creator_is_not_self_notified_by_their_own_reply() {
        // Staff member opened the ticket on a client's behalf and is also the
        // one replying: creator == actor, so no notification.
        let agent = test_util::staff_user("Jane Support", UserRole::SupportAgent);
        let mut ticket = test_util::ticket_for(&agent);
        ticket.organization_id = "acme".to_string();
        let comment = test_util::user_comment_on(&ticket, &agent, "Filed on your behalf");

        let batch =
            derive_notifications(&comment, &ticket, &agent.id.to_string(), &[], Utc::now());
        assert!(batch.is_empty());
    }
}
