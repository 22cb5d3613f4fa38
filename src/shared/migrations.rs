use diesel::connection::SimpleConnection;

use crate::shared::error::ServiceError;
use crate::shared::utils::DbPool;

pub fn create_directory_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        role TEXT NOT NULL,
        organization_id TEXT NOT NULL,
        organization_name TEXT,
        device_tokens TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
    CREATE INDEX IF NOT EXISTS idx_users_org ON users(organization_id);
    "#
}

pub fn create_ticket_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL,
        organization_name TEXT NOT NULL,
        creator_id UUID NOT NULL,
        creator_name TEXT NOT NULL,
        category TEXT NOT NULL,
        status TEXT NOT NULL,
        subject TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        attachments TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        resolved_at TIMESTAMPTZ,
        closed_at TIMESTAMPTZ,
        deleted_by_client BOOLEAN NOT NULL DEFAULT FALSE,
        deleted_by_staff BOOLEAN NOT NULL DEFAULT FALSE
    );

    CREATE INDEX IF NOT EXISTS idx_tickets_org ON tickets(organization_id);
    CREATE INDEX IF NOT EXISTS idx_tickets_updated ON tickets(updated_at);

    CREATE TABLE IF NOT EXISTS ticket_comments (
        id UUID PRIMARY KEY,
        seq BIGSERIAL,
        ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_role TEXT NOT NULL,
        organization_id TEXT NOT NULL,
        body TEXT NOT NULL,
        is_system BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ticket_comments_ticket
        ON ticket_comments(ticket_id, created_at, seq);
    "#
}

pub fn create_notification_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        recipient_id UUID NOT NULL,
        ticket_id TEXT NOT NULL,
        body TEXT NOT NULL,
        kind TEXT NOT NULL,
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_notifications_recipient
        ON notifications(recipient_id, is_read);
    "#
}

/// Applies the idempotent startup migrations.
pub fn ensure_schema(pool: &DbPool) -> Result<(), ServiceError> {
    let mut conn = pool.get()?;
    for sql in [
        create_directory_tables_migration(),
        create_ticket_tables_migration(),
        create_notification_tables_migration(),
    ] {
        conn.batch_execute(sql)
            .map_err(|e| ServiceError::Store(e.to_string()))?;
    }
    Ok(())
}
