// Diesel schema for the per-cluster SQLite state file.
// Tabla: resource_records (kind, record_key) -> body JSON
diesel::table! {
    resource_records (kind, record_key) {
        kind -> Text,
        record_key -> Text,
        body -> Text,
        updated_at_ts -> BigInt,
    }
}
