diesel::table! {
    funnel_stages_custom (id) {
        id -> Uuid,
        organization_id -> Uuid,
        position -> Int4,
        enum_value -> Varchar,
        name -> Varchar,
        is_active -> Bool,
    }
}

diesel::table! {
    leads (id) {
        id -> Uuid,
        organization_id -> Uuid,
        name -> Varchar,
        stage -> Varchar,
        whatsapp -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        source -> Nullable<Varchar>,
        assigned_to -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(funnel_stages_custom, leads,);
