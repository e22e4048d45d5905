use diesel::sqlite::SqliteConnection;

use crate::catalog;
use crate::error::{AppError, AppResult};

/// Capability level of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    Approved,
    Admin,
}

/// The admin check is identity-based, never flag-based.
pub fn is_admin(admin_id: i64, actor_id: i64) -> bool {
    actor_id == admin_id
}

/// The admin is always approved regardless of the stored flag; everyone
/// else defaults to not-approved until the catalog says otherwise.
pub fn is_approved_user(
    conn: &mut SqliteConnection,
    admin_id: i64,
    actor_id: i64,
) -> AppResult<bool> {
    if is_admin(admin_id, actor_id) {
        return Ok(true);
    }
    catalog::is_approved(conn, actor_id)
}

pub fn role_of(conn: &mut SqliteConnection, admin_id: i64, actor_id: i64) -> AppResult<Role> {
    if is_admin(admin_id, actor_id) {
        Ok(Role::Admin)
    } else if catalog::is_approved(conn, actor_id)? {
        Ok(Role::Approved)
    } else {
        Ok(Role::Guest)
    }
}

pub fn require_admin(admin_id: i64, actor_id: i64) -> AppResult<()> {
    if is_admin(admin_id, actor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn require_approved(
    conn: &mut SqliteConnection,
    admin_id: i64,
    actor_id: i64,
) -> AppResult<()> {
    if is_approved_user(conn, admin_id, actor_id)? {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
