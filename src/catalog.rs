use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rand::Rng;

use crate::error::{AppError, AppResult};
use crate::models::{FileRecord, NewFileRecord, NewUser, User};
use crate::schema::{files, users};

pub const FILE_ID_PREFIX: &str = "file_";
const FILE_ID_SUFFIX_LEN: usize = 6;
const FILE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const FILE_ID_MAX_ATTEMPTS: usize = 16;

/// Inserts the actor on first contact or refreshes the profile fields.
/// The approval flag is only written when an explicit override is supplied;
/// a plain profile refresh never regresses an approved user to pending.
pub fn upsert_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    display_name: Option<&str>,
    handle: Option<&str>,
    approval_override: Option<bool>,
) -> AppResult<()> {
    conn.transaction(|conn| {
        let existing: Option<User> = users::table.find(user_id).first(conn).optional()?;
        match existing {
            Some(_) => {
                if let Some(flag) = approval_override {
                    diesel::update(users::table.find(user_id))
                        .set((
                            users::display_name.eq(display_name),
                            users::handle.eq(handle),
                            users::is_approved.eq(flag),
                        ))
                        .execute(conn)?;
                } else {
                    diesel::update(users::table.find(user_id))
                        .set((
                            users::display_name.eq(display_name),
                            users::handle.eq(handle),
                        ))
                        .execute(conn)?;
                }
            }
            None => {
                let row = NewUser {
                    user_id,
                    handle: handle.map(str::to_string),
                    display_name: display_name.map(str::to_string),
                    is_approved: approval_override.unwrap_or(false),
                    joined_at: Utc::now().naive_utc(),
                };
                diesel::insert_into(users::table).values(&row).execute(conn)?;
            }
        }
        Ok(())
    })
}

/// Seeds the admin row at startup, forced approved.
pub fn seed_admin(conn: &mut SqliteConnection, admin_id: i64) -> AppResult<()> {
    upsert_user(conn, admin_id, Some("Admin"), None, Some(true))
}

pub fn is_approved(conn: &mut SqliteConnection, user_id: i64) -> AppResult<bool> {
    let flag: Option<bool> = users::table
        .find(user_id)
        .select(users::is_approved)
        .first(conn)
        .optional()?;
    Ok(flag.unwrap_or(false))
}

/// Flips the approval flag; reports whether a matching row existed.
pub fn approve_user(conn: &mut SqliteConnection, user_id: i64) -> AppResult<bool> {
    let updated = diesel::update(users::table.find(user_id))
        .set(users::is_approved.eq(true))
        .execute(conn)?;
    Ok(updated > 0)
}

pub fn list_pending_users(conn: &mut SqliteConnection) -> AppResult<Vec<User>> {
    let rows = users::table
        .filter(users::is_approved.eq(false))
        .order(users::joined_at.asc())
        .load(conn)?;
    Ok(rows)
}

pub fn list_all_users(conn: &mut SqliteConnection) -> AppResult<Vec<User>> {
    let rows = users::table.order(users::joined_at.desc()).load(conn)?;
    Ok(rows)
}

pub fn insert_file(conn: &mut SqliteConnection, record: &NewFileRecord) -> AppResult<()> {
    diesel::insert_into(files::table)
        .values(record)
        .execute(conn)?;
    Ok(())
}

pub fn list_files(conn: &mut SqliteConnection) -> AppResult<Vec<FileRecord>> {
    let rows = files::table.order(files::uploaded_at.desc()).load(conn)?;
    Ok(rows)
}

pub fn get_file(conn: &mut SqliteConnection, file_id: &str) -> AppResult<Option<FileRecord>> {
    let row = files::table.find(file_id).first(conn).optional()?;
    Ok(row)
}

/// Removes the catalog row; reports whether one existed. The backing bytes
/// are the caller's responsibility.
pub fn delete_file(conn: &mut SqliteConnection, file_id: &str) -> AppResult<bool> {
    let deleted = diesel::delete(files::table.find(file_id)).execute(conn)?;
    Ok(deleted > 0)
}

pub fn rename_file(
    conn: &mut SqliteConnection,
    file_id: &str,
    new_display_name: &str,
) -> AppResult<bool> {
    let updated = diesel::update(files::table.find(file_id))
        .set(files::display_name.eq(new_display_name))
        .execute(conn)?;
    Ok(updated > 0)
}

/// Case-insensitive substring match over display and original names,
/// newest first. SQLite `LIKE` is ASCII-case-insensitive, so the match
/// happens in the query instead of loading the whole table.
pub fn search_files(conn: &mut SqliteConnection, keyword: &str) -> AppResult<Vec<FileRecord>> {
    let pattern = like_pattern(keyword);
    let rows = files::table
        .filter(
            files::display_name
                .like(pattern.clone())
                .escape('\\')
                .or(files::original_name.like(pattern).escape('\\')),
        )
        .order(files::uploaded_at.desc())
        .load(conn)?;
    Ok(rows)
}

/// Wildcards in the keyword are escaped so the match stays a plain
/// substring test.
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for ch in keyword.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("%{escaped}%")
}

/// Generates a short file id and retries until the catalog confirms it is
/// unused. The random space is small enough that collisions are possible,
/// so uniqueness is checked rather than assumed.
pub fn generate_file_id(conn: &mut SqliteConnection) -> AppResult<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..FILE_ID_MAX_ATTEMPTS {
        let candidate = file_id_candidate(&mut rng);
        let taken: i64 = files::table
            .filter(files::file_id.eq(&candidate))
            .count()
            .get_result(conn)?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
    Err(AppError::internal(anyhow::anyhow!(
        "exhausted {FILE_ID_MAX_ATTEMPTS} file id generation attempts"
    )))
}

fn file_id_candidate(rng: &mut impl Rng) -> String {
    let suffix: String = (0..FILE_ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..FILE_ID_ALPHABET.len());
            FILE_ID_ALPHABET[idx] as char
        })
        .collect();
    format!("{FILE_ID_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("music"), "%music%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn candidate_has_expected_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = file_id_candidate(&mut rng);
            let suffix = id.strip_prefix(FILE_ID_PREFIX).expect("prefix");
            assert_eq!(suffix.len(), FILE_ID_SUFFIX_LEN);
            assert!(suffix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }
}
