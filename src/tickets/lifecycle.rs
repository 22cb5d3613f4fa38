use chrono::{DateTime, Utc};

use crate::shared::error::ServiceError;
use crate::shared::models::{TicketStatus, ViewerClass};

/// Permission gate applied to every transition attempt, independent of the
/// origin state. There is no adjacency graph: only RESOLVED and CLOSED are
/// role-gated, and NEW is initial-only.
pub fn transition_allowed(class: ViewerClass, target: TicketStatus) -> Result<(), ServiceError> {
    match target {
        TicketStatus::New => Err(ServiceError::Validation(
            "Tickets cannot transition back to New".to_string(),
        )),
        TicketStatus::Resolved if class != ViewerClass::Staff => Err(ServiceError::Denied(
            "Only manufacturer support can resolve tickets.".to_string(),
        )),
        TicketStatus::Closed if class != ViewerClass::Organization => Err(ServiceError::Denied(
            "Only clients can close tickets.".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Timestamp side effects written atomically with the status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionStamp {
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

pub fn transition_stamp(target: TicketStatus, now: DateTime<Utc>) -> TransitionStamp {
    TransitionStamp {
        updated_at: now,
        resolved_at: (target == TicketStatus::Resolved).then_some(now),
        closed_at: (target == TicketStatus::Closed).then_some(now),
    }
}

/// Text of the system comment recorded for every successful transition.
pub fn status_comment_text(target: TicketStatus) -> String {
    format!("Status updated to {}", target.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_is_staff_only() {
        let err = transition_allowed(ViewerClass::Organization, TicketStatus::Resolved)
            .expect_err("client must not resolve");
        assert!(matches!(err, ServiceError::Denied(_)));

        transition_allowed(ViewerClass::Staff, TicketStatus::Resolved)
            .expect("staff must resolve");
    }

    #[test]
    fn closed_is_client_only() {
        let err = transition_allowed(ViewerClass::Staff, TicketStatus::Closed)
            .expect_err("staff must not close");
        assert!(matches!(err, ServiceError::Denied(_)));

        transition_allowed(ViewerClass::Organization, TicketStatus::Closed)
            .expect("client must close");
    }

    #[test]
    fn intermediate_states_carry_no_role_gate() {
        for target in [
            TicketStatus::Acknowledged,
            TicketStatus::InProgress,
            TicketStatus::HoldForInfo,
        ] {
            transition_allowed(ViewerClass::Organization, target).unwrap();
            transition_allowed(ViewerClass::Staff, target).unwrap();
        }
    }

    #[test]
    fn new_is_initial_only() {
        for class in [ViewerClass::Organization, ViewerClass::Staff] {
            let err = transition_allowed(class, TicketStatus::New).unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
    }

    #[test]
    fn stamps_only_the_matching_timestamp() {
        let now = Utc::now();

        let stamp = transition_stamp(TicketStatus::Resolved, now);
        assert_eq!(stamp.updated_at, now);
        assert_eq!(stamp.resolved_at, Some(now));
        assert_eq!(stamp.closed_at, None);

        let stamp = transition_stamp(TicketStatus::Closed, now);
        assert_eq!(stamp.resolved_at, None);
        assert_eq!(stamp.closed_at, Some(now));

        let stamp = transition_stamp(TicketStatus::InProgress, now);
        assert_eq!(stamp.resolved_at, None);
        assert_eq!(stamp.closed_at, None);
    }

    #[test]
    fn transition_comment_uses_display_names() {
        assert_eq!(
            status_comment_text(TicketStatus::Resolved),
            "Status updated to Resolved"
        );
        assert_eq!(
            status_comment_text(TicketStatus::InProgress),
            "Status updated to In Progress"
        );
    }
}
