use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(primary_key(user_id))]
pub struct User {
    pub user_id: i64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub is_approved: bool,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub user_id: i64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub is_approved: bool,
    pub joined_at: NaiveDateTime,
}

/// A catalog row. One row per fully written file in the content store;
/// `storage_key` names the physical entry, `display_name` is metadata only.
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = files)]
#[diesel(primary_key(file_id))]
pub struct FileRecord {
    pub file_id: String,
    pub display_name: String,
    pub original_name: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub uploaded_at: NaiveDateTime,
    pub uploaded_by: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFileRecord {
    pub file_id: String,
    pub display_name: String,
    pub original_name: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub uploaded_at: NaiveDateTime,
    pub uploaded_by: i64,
}
