//! Diesel table definitions for the connection store.

diesel::table! {
    nango_connections (id) {
        id -> Text,
        integration -> Text,
        user_id -> Text,
        access_token -> Text,
        additional_config -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}
