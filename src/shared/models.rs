use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{notifications, ticket_comments, tickets, users};

/// Sentinel organization id carried by every staff identity.
pub const MANUFACTURER_ORG: &str = "manufacturer";

/// Fixed display identity for platform-authored comments.
pub const SYSTEM_AUTHOR_ID: &str = "system";
pub const SYSTEM_AUTHOR_NAME: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    ClientUser,
    SupportAgent,
    Supervisor,
    Admin,
}

impl UserRole {
    pub const STAFF_ROLES: [&'static str; 3] = ["support_agent", "supervisor", "admin"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientUser => "client_user",
            Self::SupportAgent => "support_agent",
            Self::Supervisor => "supervisor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_user" => Some(Self::ClientUser),
            "support_agent" => Some(Self::SupportAgent),
            "supervisor" => Some(Self::Supervisor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn viewer_class(&self) -> ViewerClass {
        match self {
            Self::ClientUser => ViewerClass::Organization,
            _ => ViewerClass::Staff,
        }
    }
}

/// The two-way split every authorization and scoping rule branches on.
/// The three staff roles are never distinguished past this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerClass {
    Organization,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    New,
    Acknowledged,
    InProgress,
    HoldForInfo,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Acknowledged => "Acknowledged",
            Self::InProgress => "In Progress",
            Self::HoldForInfo => "Hold for Info",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "New" => Some(Self::New),
            "Acknowledged" => Some(Self::Acknowledged),
            "In Progress" => Some(Self::InProgress),
            "Hold for Info" => Some(Self::HoldForInfo),
            "Resolved" => Some(Self::Resolved),
            "Closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketCategory {
    ProductQuality,
    Logistics,
    TechnicalSupport,
    Commercial,
    General,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductQuality => "Product Quality Issues",
            Self::Logistics => "Delivery / Logistics Issues",
            Self::TechnicalSupport => "Technical Support",
            Self::Commercial => "Commercial / Documentation Requests",
            Self::General => "General Queries",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Product Quality Issues" => Some(Self::ProductQuality),
            "Delivery / Logistics Issues" => Some(Self::Logistics),
            "Technical Support" => Some(Self::TechnicalSupport),
            "Commercial / Documentation Requests" => Some(Self::Commercial),
            "General Queries" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Comment,
    Status,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "COMMENT",
            Self::Status => "STATUS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = users)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub organization_id: String,
    pub organization_name: Option<String>,
    pub device_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn role_enum(&self) -> Option<UserRole> {
        UserRole::parse(&self.role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: String,
    pub organization_id: String,
    pub organization_name: String,
    pub creator_id: Uuid,
    pub creator_name: String,
    pub category: String,
    pub status: String,
    pub subject: String,
    pub description: String,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub deleted_by_client: bool,
    pub deleted_by_staff: bool,
}

impl Ticket {
    pub fn status_enum(&self) -> Option<TicketStatus> {
        TicketStatus::parse(&self.status)
    }

    /// The soft-delete switch that hides this ticket from the given viewer
    /// class. The two flags are fully independent.
    pub fn hidden_from(&self, class: ViewerClass) -> bool {
        match class {
            ViewerClass::Organization => self.deleted_by_client,
            ViewerClass::Staff => self.deleted_by_staff,
        }
    }

    /// Tenancy scope: organization viewers only ever reach tickets owned by
    /// their own organization; staff reach every organization's tickets.
    pub fn in_scope(&self, class: ViewerClass, viewer_org: &str) -> bool {
        match class {
            ViewerClass::Organization => self.organization_id == viewer_org,
            ViewerClass::Staff => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable)]
pub struct TicketComment {
    pub id: Uuid,
    pub seq: i64,
    pub ticket_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_role: String,
    pub organization_id: String,
    pub body: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct NewTicketComment {
    pub id: Uuid,
    pub ticket_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_role: String,
    pub organization_id: String,
    pub body: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub ticket_id: String,
    pub body: String,
    pub kind: String,
    #[serde(rename = "read")]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
