use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::identity::Viewer;
use crate::shared::error::ServiceError;
use crate::shared::models::{
    NewTicketComment, Ticket, TicketComment, TicketStatus, UserRole, ViewerClass,
    SYSTEM_AUTHOR_ID, SYSTEM_AUTHOR_NAME,
};
use crate::shared::schema::{ticket_comments, tickets as tickets_schema};
use crate::shared::state::{AppState, CommentEvent};
use crate::tickets;

#[derive(Debug, Deserialize)]
pub struct PostCommentRequest {
    pub body: String,
}

/// Write gate for user comments. System comments bypass this entirely.
pub fn user_post_allowed(class: ViewerClass, status: TicketStatus) -> Result<(), ServiceError> {
    match status {
        TicketStatus::Closed => Err(ServiceError::Denied(
            "Closed tickets do not accept new comments.".to_string(),
        )),
        TicketStatus::Resolved if class == ViewerClass::Organization => Err(ServiceError::Denied(
            "Communication is locked once a ticket is resolved.".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Timeline listing, ascending with insertion-order tie-break. Organization
/// viewers are filtered again on the denormalized organization id: comments
/// are stored outside their parent ticket's access rule, so the scope check
/// on the ticket alone is not trusted.
pub fn list_comments(
    state: &AppState,
    viewer: &Viewer,
    ticket_id: &str,
) -> Result<Vec<TicketComment>, ServiceError> {
    tickets::get_ticket(state, viewer, ticket_id)?;
    let mut conn = state.conn.get()?;
    let mut query = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .into_boxed();
    if viewer.class == ViewerClass::Organization {
        query = query.filter(ticket_comments::organization_id.eq(&viewer.user.organization_id));
    }
    query
        .order((
            ticket_comments::created_at.asc(),
            ticket_comments::seq.asc(),
        ))
        .load::<TicketComment>(&mut conn)
        .map_err(Into::into)
}

pub fn post_comment(
    state: &AppState,
    viewer: &Viewer,
    ticket_id: &str,
    req: PostCommentRequest,
) -> Result<TicketComment, ServiceError> {
    let body = req.body.trim();
    if body.is_empty() {
        return Err(ServiceError::Validation(
            "Comment text is required".to_string(),
        ));
    }

    let ticket = tickets::get_ticket(state, viewer, ticket_id)?;
    let status = ticket
        .status_enum()
        .ok_or_else(|| ServiceError::Store(format!("unknown ticket status: {}", ticket.status)))?;
    user_post_allowed(viewer.class, status)?;

    let now = Utc::now();
    let record = NewTicketComment {
        id: Uuid::new_v4(),
        ticket_id: ticket.id.clone(),
        author_id: viewer.user.id.to_string(),
        author_name: viewer.user.display_name.clone(),
        author_role: viewer.user.role.clone(),
        organization_id: ticket.organization_id.clone(),
        body: body.to_string(),
        is_system: false,
        created_at: now,
    };

    let comment: TicketComment = {
        let mut conn = state.conn.get()?;
        let comment = diesel::insert_into(ticket_comments::table)
            .values(&record)
            .get_result(&mut conn)?;
        diesel::update(tickets_schema::table.find(&ticket.id))
            .set(tickets_schema::updated_at.eq(now))
            .execute(&mut conn)?;
        comment
    };

    state.emit_comment_event(CommentEvent {
        comment: comment.clone(),
        ticket,
        actor_id: viewer.user.id.to_string(),
    });
    state.publish_change(ticket_id);
    Ok(comment)
}

/// Lifecycle entries ("Ticket created.", "Status updated to ..."). Recorded
/// under the fixed system author; the acting viewer only travels on the
/// event, for self-notification suppression.
pub fn post_system_comment(
    state: &AppState,
    ticket: &Ticket,
    text: &str,
    actor: &Viewer,
) -> Result<TicketComment, ServiceError> {
    let record = NewTicketComment {
        id: Uuid::new_v4(),
        ticket_id: ticket.id.clone(),
        author_id: SYSTEM_AUTHOR_ID.to_string(),
        author_name: SYSTEM_AUTHOR_NAME.to_string(),
        author_role: UserRole::Admin.as_str().to_string(),
        organization_id: ticket.organization_id.clone(),
        body: text.to_string(),
        is_system: true,
        created_at: Utc::now(),
    };

    let comment: TicketComment = {
        let mut conn = state.conn.get()?;
        diesel::insert_into(ticket_comments::table)
            .values(&record)
            .get_result(&mut conn)?
    };

    state.emit_comment_event(CommentEvent {
        comment: comment.clone(),
        ticket: ticket.clone(),
        actor_id: actor.user.id.to_string(),
    });
    Ok(comment)
}

async fn list_comments_handler(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
    viewer: Viewer,
) -> Result<Json<Vec<TicketComment>>, ServiceError> {
    Ok(Json(list_comments(&state, &viewer, &ticket_id)?))
}

async fn post_comment_handler(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
    viewer: Viewer,
    Json(req): Json<PostCommentRequest>,
) -> Result<Json<TicketComment>, ServiceError> {
    Ok(Json(post_comment(&state, &viewer, &ticket_id, req)?))
}

pub fn configure_comments_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/tickets/:id/comments",
        get(list_comments_handler).post(post_comment_handler),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_tickets_lock_everyone_out() {
        for class in [ViewerClass::Organization, ViewerClass::Staff] {
            let err = user_post_allowed(class, TicketStatus::Closed).unwrap_err();
            assert!(matches!(err, ServiceError::Denied(_)));
        }
    }

    #[test]
    fn resolved_tickets_lock_clients_out_only() {
        let err = user_post_allowed(ViewerClass::Organization, TicketStatus::Resolved).unwrap_err();
        assert!(matches!(err, ServiceError::Denied(_)));

        user_post_allowed(ViewerClass::Staff, TicketStatus::Resolved).unwrap();
    }

    #[test]
    fn open_states_accept_both_classes() {
        for status in [
            TicketStatus::New,
            TicketStatus::Acknowledged,
            TicketStatus::InProgress,
            TicketStatus::HoldForInfo,
        ] {
            user_post_allowed(ViewerClass::Organization, status).unwrap();
            user_post_allowed(ViewerClass::Staff, status).unwrap();
        }
    }
}
