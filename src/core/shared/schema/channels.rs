diesel::table! {
    inbound_events (provider, external_id) {
        provider -> Varchar,
        external_id -> Varchar,
        organization_id -> Nullable<Uuid>,
        payload -> Jsonb,
        received_at -> Timestamptz,
    }
}

diesel::table! {
    whatsapp_channels (phone_number_id) {
        phone_number_id -> Varchar,
        organization_id -> Uuid,
    }
}

diesel::table! {
    whatsapp_messages (id) {
        id -> Uuid,
        organization_id -> Uuid,
        lead_id -> Uuid,
        provider -> Varchar,
        external_id -> Varchar,
        direction -> Varchar,
        body -> Nullable<Text>,
        message_type -> Varchar,
        media_id -> Nullable<Varchar>,
        status -> Varchar,
        sent_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(inbound_events, whatsapp_channels, whatsapp_messages,);
