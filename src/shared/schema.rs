diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        display_name -> Varchar,
        role -> Varchar,
        organization_id -> Varchar,
        organization_name -> Nullable<Varchar>,
        device_tokens -> Array<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Varchar,
        organization_id -> Varchar,
        organization_name -> Varchar,
        creator_id -> Uuid,
        creator_name -> Varchar,
        category -> Varchar,
        status -> Varchar,
        subject -> Varchar,
        description -> Text,
        attachments -> Array<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
        deleted_by_client -> Bool,
        deleted_by_staff -> Bool,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        seq -> Int8,
        ticket_id -> Varchar,
        author_id -> Varchar,
        author_name -> Varchar,
        author_role -> Varchar,
        organization_id -> Varchar,
        body -> Text,
        is_system -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        recipient_id -> Uuid,
        ticket_id -> Varchar,
        body -> Text,
        kind -> Varchar,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(users, tickets, ticket_comments, notifications);
