/// Job ids are SQLite `INTEGER PRIMARY KEY AUTOINCREMENT` values.
pub type DbId = i64;

/// Status ID type matching the `job_statuses` lookup table.
pub type StatusId = i16;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Parameter mapping submitted with a run request.
pub type Params = serde_json::Map<String, serde_json::Value>;
