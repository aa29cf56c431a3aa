diesel::table! {
    organizations (id) {
        id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    organization_members (id) {
        id -> Uuid,
        organization_id -> Uuid,
        user_id -> Uuid,
        role -> Varchar,
        team_id -> Nullable<Uuid>,
        is_sales_manager -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (user_id) {
        user_id -> Uuid,
        display_name -> Nullable<Varchar>,
        whatsapp -> Nullable<Varchar>,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(organization_members -> organizations (organization_id));

diesel::allow_tables_to_appear_in_same_query!(organizations, organization_members, profiles,);
