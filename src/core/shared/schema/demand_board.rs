diesel::table! {
    demand_boards (id) {
        id -> Uuid,
        organization_id -> Uuid,
        name -> Varchar,
        default_column_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    demand_columns (id) {
        id -> Uuid,
        board_id -> Uuid,
        name -> Varchar,
        position -> Int4,
        is_final -> Bool,
    }
}

diesel::table! {
    demands (id) {
        id -> Uuid,
        organization_id -> Uuid,
        board_id -> Uuid,
        column_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        assignee_ids -> Array<Uuid>,
        urgency -> Varchar,
        labels -> Array<Text>,
        sla_config -> Nullable<Jsonb>,
        created_by -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    demand_history (id) {
        id -> Uuid,
        demand_id -> Uuid,
        from_column_id -> Uuid,
        to_column_id -> Uuid,
        moved_by -> Uuid,
        reason -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    demand_comments (id) {
        id -> Uuid,
        demand_id -> Uuid,
        author_id -> Uuid,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    demand_notifications (id) {
        id -> Uuid,
        organization_id -> Uuid,
        demand_id -> Uuid,
        recipient_id -> Uuid,
        kind -> Varchar,
        message -> Text,
        created_at -> Timestamptz,
        read_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(demand_columns -> demand_boards (board_id));
diesel::joinable!(demands -> demand_boards (board_id));
diesel::joinable!(demands -> demand_columns (column_id));
diesel::joinable!(demand_history -> demands (demand_id));
diesel::joinable!(demand_comments -> demands (demand_id));
diesel::joinable!(demand_notifications -> demands (demand_id));

diesel::allow_tables_to_appear_in_same_query!(
    demand_boards,
    demand_columns,
    demands,
    demand_history,
    demand_comments,
    demand_notifications,
);
