pub mod lifecycle;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::comments;
use crate::identity::Viewer;
use crate::shared::error::ServiceError;
use crate::shared::models::{Ticket, TicketCategory, TicketStatus, ViewerClass};
use crate::shared::schema::tickets;
use crate::shared::state::AppState;

/// Attempts before an id-collision insert gives up.
const ID_ATTEMPTS: u32 = 5;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub category: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

/// Listing scope: each viewer class has its own soft-delete switch, and
/// organization viewers only ever see their own organization's tickets.
pub fn list_tickets(state: &AppState, viewer: &Viewer) -> Result<Vec<Ticket>, ServiceError> {
    let mut conn = state.conn.get()?;
    let mut query = tickets::table.into_boxed();
    match viewer.class {
        ViewerClass::Organization => {
            query = query
                .filter(tickets::organization_id.eq(&viewer.user.organization_id))
                .filter(tickets::deleted_by_client.eq(false));
        }
        ViewerClass::Staff => {
            query = query.filter(tickets::deleted_by_staff.eq(false));
        }
    }
    query
        .order(tickets::updated_at.desc())
        .load::<Ticket>(&mut conn)
        .map_err(Into::into)
}

/// Single-item fetch. Soft-delete flags are not consulted here, but the
/// organization scope is: a client can never reach another organization's
/// ticket by guessing its id.
pub fn get_ticket(state: &AppState, viewer: &Viewer, id: &str) -> Result<Ticket, ServiceError> {
    let mut conn = state.conn.get()?;
    let ticket = tickets::table
        .find(id)
        .first::<Ticket>(&mut conn)
        .optional()?;
    match ticket {
        Some(t) if t.in_scope(viewer.class, &viewer.user.organization_id) => Ok(t),
        _ => Err(ServiceError::NotFound),
    }
}

/// 8-digit random suffix; unique-violation inserts retry with a fresh id.
fn generate_ticket_id() -> String {
    format!("T-{:08}", rand::thread_rng().gen_range(0..100_000_000u32))
}

pub fn create_ticket(
    state: &AppState,
    viewer: &Viewer,
    req: CreateTicketRequest,
) -> Result<Ticket, ServiceError> {
    let subject = req.subject.trim();
    if subject.is_empty() {
        return Err(ServiceError::Validation("Subject is required".to_string()));
    }
    let category = TicketCategory::parse(&req.category)
        .ok_or_else(|| ServiceError::Validation(format!("Unknown category: {}", req.category)))?;

    let now = Utc::now();
    let mut ticket = Ticket {
        id: generate_ticket_id(),
        organization_id: viewer.user.organization_id.clone(),
        organization_name: viewer
            .user
            .organization_name
            .clone()
            .unwrap_or_else(|| "Unknown Client".to_string()),
        creator_id: viewer.user.id,
        creator_name: viewer.user.display_name.clone(),
        category: category.as_str().to_string(),
        status: TicketStatus::New.as_str().to_string(),
        subject: subject.to_string(),
        description: req.description,
        attachments: req.attachments,
        created_at: now,
        updated_at: now,
        resolved_at: None,
        closed_at: None,
        deleted_by_client: false,
        deleted_by_staff: false,
    };

    {
        let mut conn = state.conn.get()?;
        let mut attempt = 0;
        loop {
            match diesel::insert_into(tickets::table)
                .values(&ticket)
                .execute(&mut conn)
            {
                Ok(_) => break,
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) if attempt + 1 < ID_ATTEMPTS => {
                    attempt += 1;
                    ticket.id = generate_ticket_id();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    comments::post_system_comment(state, &ticket, "Ticket created.", viewer)?;
    state.publish_change(&ticket.id);
    log::info!(
        "ticket {} created for organization {}",
        ticket.id,
        ticket.organization_id
    );
    Ok(ticket)
}

pub fn set_status(
    state: &AppState,
    viewer: &Viewer,
    id: &str,
    req: ChangeStatusRequest,
) -> Result<Ticket, ServiceError> {
    let target = TicketStatus::parse(&req.status)
        .ok_or_else(|| ServiceError::Validation(format!("Unknown status: {}", req.status)))?;

    // Gate checks run before any write; a rejected transition leaves the
    // ticket record untouched.
    get_ticket(state, viewer, id)?;
    lifecycle::transition_allowed(viewer.class, target)?;

    let stamp = lifecycle::transition_stamp(target, Utc::now());
    let updated = {
        let mut conn = state.conn.get()?;
        match target {
            TicketStatus::Resolved => diesel::update(tickets::table.find(id))
                .set((
                    tickets::status.eq(target.as_str()),
                    tickets::updated_at.eq(stamp.updated_at),
                    tickets::resolved_at.eq(stamp.resolved_at),
                ))
                .execute(&mut conn)?,
            TicketStatus::Closed => diesel::update(tickets::table.find(id))
                .set((
                    tickets::status.eq(target.as_str()),
                    tickets::updated_at.eq(stamp.updated_at),
                    tickets::closed_at.eq(stamp.closed_at),
                ))
                .execute(&mut conn)?,
            _ => diesel::update(tickets::table.find(id))
                .set((
                    tickets::status.eq(target.as_str()),
                    tickets::updated_at.eq(stamp.updated_at),
                ))
                .execute(&mut conn)?,
        };
        tickets::table.find(id).first::<Ticket>(&mut conn)?
    };

    comments::post_system_comment(
        state,
        &updated,
        &lifecycle::status_comment_text(target),
        viewer,
    )?;
    state.publish_change(id);
    log::info!("ticket {} moved to {}", id, target.as_str());
    Ok(updated)
}

/// Per-class soft delete. Re-deleting an already-deleted ticket is a no-op
/// success; the other class's flag is never touched.
pub fn soft_delete(state: &AppState, viewer: &Viewer, id: &str) -> Result<(), ServiceError> {
    get_ticket(state, viewer, id)?;
    let mut conn = state.conn.get()?;
    match viewer.class {
        ViewerClass::Organization => {
            diesel::update(tickets::table.find(id))
                .set(tickets::deleted_by_client.eq(true))
                .execute(&mut conn)?;
        }
        ViewerClass::Staff => {
            diesel::update(tickets::table.find(id))
                .set(tickets::deleted_by_staff.eq(true))
                .execute(&mut conn)?;
        }
    }
    state.publish_change(id);
    Ok(())
}

async fn list_tickets_handler(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
) -> Result<Json<Vec<Ticket>>, ServiceError> {
    Ok(Json(list_tickets(&state, &viewer)?))
}

async fn get_ticket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    viewer: Viewer,
) -> Result<Json<Ticket>, ServiceError> {
    Ok(Json(get_ticket(&state, &viewer, &id)?))
}

async fn create_ticket_handler(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    Ok(Json(create_ticket(&state, &viewer, req)?))
}

async fn change_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    viewer: Viewer,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    Ok(Json(set_status(&state, &viewer, &id, req)?))
}

async fn delete_ticket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    viewer: Viewer,
) -> Result<StatusCode, ServiceError> {
    soft_delete(&state, &viewer, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Live listing: the full filtered set is re-sent on every underlying
/// change. Subscribers that lag simply get a fresh snapshot.
async fn tickets_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
) -> Response {
    ws.on_upgrade(move |socket| stream_tickets(socket, state, viewer))
}

async fn stream_tickets(mut socket: WebSocket, state: Arc<AppState>, viewer: Viewer) {
    let mut changes = state.changes.subscribe();
    if send_snapshot(&mut socket, &state, &viewer).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            changed = changes.recv() => match changed {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if send_snapshot(&mut socket, &state, &viewer).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_snapshot(
    socket: &mut WebSocket,
    state: &AppState,
    viewer: &Viewer,
) -> Result<(), ()> {
    let snapshot = match list_tickets(state, viewer) {
        Ok(tickets) => tickets,
        Err(e) => {
            log::error!("live ticket feed query failed: {e}");
            return Err(());
        }
    };
    let payload = serde_json::to_string(&snapshot).map_err(|_| ())?;
    socket.send(Message::Text(payload)).await.map_err(|_| ())
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/tickets",
            get(list_tickets_handler).post(create_ticket_handler),
        )
        .route("/api/tickets/ws", get(tickets_ws_handler))
        .route(
            "/api/tickets/:id",
            get(get_ticket_handler).delete(delete_ticket_handler),
        )
        .route("/api/tickets/:id/status", put(change_status_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_ids_use_an_eight_digit_suffix() {
        for _ in 0..100 {
            let id = generate_ticket_id();
            let suffix = id.strip_prefix("T-").expect("T- prefix");
            assert_eq!(suffix.len(), 8);
            let n: u32 = suffix.parse().expect("numeric suffix");
            assert!(n < 100_000_000);
        }
    }
}
