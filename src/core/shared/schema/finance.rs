diesel::table! {
    sales (id) {
        id -> Uuid,
        organization_id -> Uuid,
        lead_id -> Nullable<Uuid>,
        total_cents -> Int8,
        status -> Varchar,
        payment_charge_id -> Nullable<Varchar>,
        tracking_code -> Nullable<Varchar>,
        shipping_status -> Nullable<Varchar>,
        paid_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    virtual_accounts (id) {
        id -> Uuid,
        organization_id -> Uuid,
        balance_cents -> Int8,
        pending_balance_cents -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    virtual_transactions (id) {
        id -> Uuid,
        account_id -> Uuid,
        organization_id -> Uuid,
        sale_id -> Nullable<Uuid>,
        status -> Varchar,
        net_amount_cents -> Int8,
        release_at -> Timestamptz,
        released_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    carrier_tracking_status_configs (id) {
        id -> Uuid,
        organization_id -> Uuid,
        carrier -> Varchar,
        carrier_status -> Varchar,
        shipping_status -> Varchar,
        notify_customer -> Bool,
    }
}

diesel::table! {
    pos_transactions (id) {
        id -> Uuid,
        organization_id -> Uuid,
        nsu -> Varchar,
        amount_cents -> Int8,
        captured_at -> Timestamptz,
        match_status -> Varchar,
        sale_id -> Nullable<Uuid>,
    }
}

diesel::joinable!(virtual_transactions -> virtual_accounts (account_id));
diesel::joinable!(virtual_transactions -> sales (sale_id));
diesel::joinable!(pos_transactions -> sales (sale_id));

diesel::allow_tables_to_appear_in_same_query!(
    sales,
    virtual_accounts,
    virtual_transactions,
    carrier_tracking_status_configs,
    pos_transactions,
);
