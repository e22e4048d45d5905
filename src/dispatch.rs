use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::access::{self, Role};
use crate::catalog;
use crate::error::{AppError, AppResult};
use crate::events::{Actor, InboundEvent, InboundFileRef, MediaKind, Reply};
use crate::models::{FileRecord, NewFileRecord, User};
use crate::session::UploadSession;
use crate::state::AppState;

pub const MAX_DISPLAY_NAME_LEN: usize = 100;
const LISTING_PAGE_SIZE: usize = 10;
const ERROR_SUMMARY_LEN: usize = 100;

/// Entry point for every inbound event. Never fails: per-event errors are
/// rendered into a reply and logged; `None` means the event warranted no
/// reply at all (e.g. free text with no pending upload).
pub async fn handle_event(state: &AppState, event: InboundEvent) -> Option<Reply> {
    let actor_id = event.actor_id();
    let result = match event {
        InboundEvent::TextCommand {
            name,
            args,
            actor,
            attachment,
        } => dispatch_command(state, &name, &args, &actor, attachment).await,
        InboundEvent::ButtonClick { action, actor } => {
            dispatch_button(state, &action, &actor).await
        }
        InboundEvent::FreeText { text, actor } => free_text(state, &actor, &text).await,
    };

    match result {
        Ok(reply) => reply,
        Err(err) => {
            error!(actor_id, error = %err, "event handling failed");
            Some(Reply::Text(render_error(&err)))
        }
    }
}

async fn dispatch_command(
    state: &AppState,
    name: &str,
    args: &[String],
    actor: &Actor,
    attachment: Option<InboundFileRef>,
) -> AppResult<Option<Reply>> {
    match name {
        "start" => start(state, actor).await,
        "get" => get(state, actor, args).await,
        "add" => add(state, actor, attachment).await,
        "approve" => approve(state, actor, args).await,
        "delete" => delete(state, actor, args).await,
        "rename" => rename(state, actor, args).await,
        "search" => search(state, actor, args).await,
        other => {
            warn!(actor_id = actor.id, command = other, "unknown command");
            Ok(None)
        }
    }
}

async fn dispatch_button(
    state: &AppState,
    action: &str,
    actor: &Actor,
) -> AppResult<Option<Reply>> {
    match action {
        "keep_original" => resolve_keep_original(state, actor.id).await,
        "cancel_upload" => cancel_upload(state, actor.id).await,
        "rename_file" => prompt_rename(state, actor.id).await,
        "browse_files" => browse_files(state, actor.id).await,
        "pending_users" => pending_users(state, actor.id).await,
        "all_users" => all_users(state, actor.id).await,
        _ => Ok(None),
    }
}

/// Registers or refreshes the actor and greets them by role.
async fn start(state: &AppState, actor: &Actor) -> AppResult<Option<Reply>> {
    let mut conn = state.db()?;
    catalog::upsert_user(
        &mut conn,
        actor.id,
        actor.display_name.as_deref(),
        actor.handle.as_deref(),
        None,
    )?;

    let text = match access::role_of(&mut conn, state.admin_id(), actor.id)? {
        Role::Admin => "Welcome, admin. You have full access.".to_string(),
        Role::Approved => "Welcome back. Browse with /search or /get <file_id>.".to_string(),
        Role::Guest => format!(
            "You need approval to use this bot.\nYour id: {}\nSend it to the admin, then /start again.",
            actor.id
        ),
    };
    Ok(Some(Reply::Text(text)))
}

async fn get(state: &AppState, actor: &Actor, args: &[String]) -> AppResult<Option<Reply>> {
    let mut conn = state.db()?;
    access::require_approved(&mut conn, state.admin_id(), actor.id)?;

    let file_id = args
        .first()
        .ok_or_else(|| AppError::invalid("usage: /get <file_id>"))?;
    let record = catalog::get_file(&mut conn, file_id)?.ok_or(AppError::NotFound)?;
    drop(conn);

    let bytes = match state.store.get(&record.storage_key).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Err(match err.downcast_ref::<std::io::Error>() {
                Some(io) if io.kind() == ErrorKind::NotFound => {
                    warn!(file_id = %file_id, storage_key = %record.storage_key, "backing bytes missing");
                    AppError::NotFound
                }
                _ => AppError::Storage(err),
            });
        }
    };

    info!(actor_id = actor.id, file_id = %file_id, "file served");
    Ok(Some(Reply::File {
        media: MediaKind::from_name(&record.display_name),
        display_name: record.display_name,
        bytes,
    }))
}

/// Opens an upload session for the attached file. A session already pending
/// for the admin is silently replaced.
async fn add(
    state: &AppState,
    actor: &Actor,
    attachment: Option<InboundFileRef>,
) -> AppResult<Option<Reply>> {
    access::require_admin(state.admin_id(), actor.id)?;

    let file = attachment
        .ok_or_else(|| AppError::invalid("reply to a file with /add to upload it"))?;
    let original_name = file.resolved_name();

    let replaced = state
        .sessions
        .begin(
            actor.id,
            UploadSession {
                file,
                original_name: original_name.clone(),
                origin_message: None,
            },
        )
        .await;
    if replaced {
        info!(actor_id = actor.id, "previous upload session replaced");
    }

    Ok(Some(Reply::Text(format!(
        "File received: {original_name}\nSend a new name, or choose keep original / cancel."
    ))))
}

async fn approve(state: &AppState, actor: &Actor, args: &[String]) -> AppResult<Option<Reply>> {
    access::require_admin(state.admin_id(), actor.id)?;

    let raw = args
        .first()
        .ok_or_else(|| AppError::invalid("usage: /approve <user_id>"))?;
    let user_id: i64 = raw
        .parse()
        .map_err(|_| AppError::invalid("user id must be a number"))?;

    let mut conn = state.db()?;
    let text = if catalog::approve_user(&mut conn, user_id)? {
        info!(user_id, "user approved");
        format!("User {user_id} approved.")
    } else {
        format!("User {user_id} not found. They need to /start first.")
    };
    Ok(Some(Reply::Text(text)))
}

async fn delete(state: &AppState, actor: &Actor, args: &[String]) -> AppResult<Option<Reply>> {
    access::require_admin(state.admin_id(), actor.id)?;

    let file_id = args
        .first()
        .ok_or_else(|| AppError::invalid("usage: /delete <file_id>"))?;
    let mut conn = state.db()?;
    let record = catalog::get_file(&mut conn, file_id)?.ok_or(AppError::NotFound)?;

    state
        .store
        .delete(&record.storage_key)
        .await
        .map_err(AppError::Storage)?;
    catalog::delete_file(&mut conn, file_id)?;

    info!(file_id = %file_id, display_name = %record.display_name, "file deleted");
    Ok(Some(Reply::Text(format!(
        "Deleted {} ({file_id}).",
        record.display_name
    ))))
}

async fn rename(state: &AppState, actor: &Actor, args: &[String]) -> AppResult<Option<Reply>> {
    access::require_admin(state.admin_id(), actor.id)?;

    let (file_id, rest) = match args.split_first() {
        Some((file_id, rest)) if !rest.is_empty() => (file_id, rest),
        _ => return Err(AppError::invalid("usage: /rename <file_id> <new name>")),
    };
    let new_name = rest.join(" ");
    validate_display_name(&new_name)?;

    let mut conn = state.db()?;
    if !catalog::rename_file(&mut conn, file_id, &new_name)? {
        return Err(AppError::NotFound);
    }
    info!(file_id = %file_id, new_name = %new_name, "file renamed");
    Ok(Some(Reply::Text(format!("Renamed {file_id} to {new_name}."))))
}

async fn search(state: &AppState, actor: &Actor, args: &[String]) -> AppResult<Option<Reply>> {
    let mut conn = state.db()?;
    access::require_approved(&mut conn, state.admin_id(), actor.id)?;

    let keyword = args.join(" ");
    if keyword.trim().is_empty() {
        return Err(AppError::invalid("usage: /search <keyword>"));
    }

    let matches = catalog::search_files(&mut conn, keyword.trim())?;
    if matches.is_empty() {
        return Ok(Some(Reply::Text(format!("No results for '{}'.", keyword.trim()))));
    }
    Ok(Some(Reply::Text(format_file_listing(
        &format!("Results for '{}':", keyword.trim()),
        &matches,
    ))))
}

/// Free text only means something while an upload session is pending for
/// the actor; otherwise it is silently discarded.
async fn free_text(state: &AppState, actor: &Actor, text: &str) -> AppResult<Option<Reply>> {
    if !state.sessions.is_pending(actor.id).await {
        return Ok(None);
    }
    resolve_with_name(state, actor.id, text).await
}

/// Resolves the pending session with a supplied name. Validation happens
/// while the session is still pending so a rejected name leaves it intact;
/// the original extension is appended when the name lacks it.
async fn resolve_with_name(
    state: &AppState,
    actor_id: i64,
    raw_name: &str,
) -> AppResult<Option<Reply>> {
    let Some(original_name) = state.sessions.original_name(actor_id).await else {
        return Ok(None);
    };
    let name = raw_name.trim();
    validate_display_name(name)?;
    let display_name = ensure_extension(name, &original_name);
    finalize_upload(state, actor_id, display_name).await
}

/// Resolves the pending session keeping the original name verbatim.
async fn resolve_keep_original(state: &AppState, actor_id: i64) -> AppResult<Option<Reply>> {
    let Some(original_name) = state.sessions.original_name(actor_id).await else {
        return Ok(None);
    };
    finalize_upload(state, actor_id, original_name).await
}

async fn cancel_upload(state: &AppState, actor_id: i64) -> AppResult<Option<Reply>> {
    if state.sessions.cancel(actor_id).await {
        info!(actor_id, "upload cancelled");
        Ok(Some(Reply::Text("Upload cancelled.".to_string())))
    } else {
        Ok(None)
    }
}

async fn prompt_rename(state: &AppState, actor_id: i64) -> AppResult<Option<Reply>> {
    let Some(original_name) = state.sessions.original_name(actor_id).await else {
        return Ok(None);
    };
    Ok(Some(Reply::Text(format!(
        "Send the new name for {original_name} (1-{MAX_DISPLAY_NAME_LEN} characters)."
    ))))
}

/// Consumes the session, writes the bytes, then records the catalog row,
/// in that order. A failed write leaves no row behind and the session
/// already cleared; the admin restarts the upload from scratch.
async fn finalize_upload(
    state: &AppState,
    actor_id: i64,
    display_name: String,
) -> AppResult<Option<Reply>> {
    let Some(session) = state.sessions.take(actor_id).await else {
        return Ok(None);
    };

    let bytes = session.file.source.fetch().await.map_err(AppError::Storage)?;

    let mut conn = state.db()?;
    let file_id = catalog::generate_file_id(&mut conn)?;
    let storage_key = storage_key_for(&file_id, &display_name);
    let size_bytes = state
        .store
        .put(&storage_key, bytes)
        .await
        .map_err(AppError::Storage)?;

    let record = NewFileRecord {
        file_id: file_id.clone(),
        display_name: display_name.clone(),
        original_name: session.original_name,
        storage_key: storage_key.clone(),
        size_bytes: size_bytes as i64,
        uploaded_at: Utc::now().naive_utc(),
        uploaded_by: actor_id,
    };
    if let Err(err) = catalog::insert_file(&mut conn, &record) {
        // Bytes without a row are unreachable; remove them so a failed
        // insert leaves no artifact behind.
        if let Err(cleanup_err) = state.store.delete(&storage_key).await {
            warn!(storage_key = %storage_key, error = %cleanup_err, "failed to remove orphaned content entry");
        }
        return Err(err);
    }

    info!(actor_id, file_id = %file_id, display_name = %display_name, size_bytes, "file uploaded");
    Ok(Some(Reply::Text(format!(
        "Uploaded {display_name}\nid: {file_id}\nsize: {size_bytes} bytes\nfetch with /get {file_id}"
    ))))
}

async fn browse_files(state: &AppState, actor_id: i64) -> AppResult<Option<Reply>> {
    let mut conn = state.db()?;
    access::require_approved(&mut conn, state.admin_id(), actor_id)?;

    let files = catalog::list_files(&mut conn)?;
    if files.is_empty() {
        return Ok(Some(Reply::Text("No files yet.".to_string())));
    }
    Ok(Some(Reply::Text(format_file_listing(
        "Available files:",
        &files,
    ))))
}

async fn pending_users(state: &AppState, actor_id: i64) -> AppResult<Option<Reply>> {
    access::require_admin(state.admin_id(), actor_id)?;

    let mut conn = state.db()?;
    let pending = catalog::list_pending_users(&mut conn)?;
    if pending.is_empty() {
        return Ok(Some(Reply::Text("All users are approved.".to_string())));
    }
    let mut text = "Pending users:\n".to_string();
    for user in &pending {
        text.push_str(&format_user_line(user));
    }
    Ok(Some(Reply::Text(text)))
}

async fn all_users(state: &AppState, actor_id: i64) -> AppResult<Option<Reply>> {
    access::require_admin(state.admin_id(), actor_id)?;

    let mut conn = state.db()?;
    let users = catalog::list_all_users(&mut conn)?;
    if users.is_empty() {
        return Ok(Some(Reply::Text("No users yet.".to_string())));
    }
    let mut text = "All users:\n".to_string();
    for user in &users {
        text.push_str(&format_user_line(user));
    }
    Ok(Some(Reply::Text(text)))
}

fn format_user_line(user: &User) -> String {
    let name = user.display_name.as_deref().unwrap_or("User");
    let status = if user.is_approved { "approved" } else { "pending" };
    format!("{name} (id {}, {status})\n", user.user_id)
}

fn format_file_listing(header: &str, files: &[FileRecord]) -> String {
    let mut text = format!("{header}\n");
    for file in files.iter().take(LISTING_PAGE_SIZE) {
        text.push_str(&format!(
            "{} - {} ({} bytes) /get {}\n",
            file.file_id, file.display_name, file.size_bytes, file.file_id
        ));
    }
    if files.len() > LISTING_PAGE_SIZE {
        text.push_str(&format!("... and {} more\n", files.len() - LISTING_PAGE_SIZE));
    }
    text
}

fn validate_display_name(name: &str) -> AppResult<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_LEN {
        return Err(AppError::invalid(format!(
            "name must be 1-{MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Appends the original file's extension when the chosen name lacks it.
fn ensure_extension(name: &str, original_name: &str) -> String {
    match Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) => {
            let suffix = format!(".{}", ext.to_lowercase());
            if name.to_lowercase().ends_with(&suffix) {
                name.to_string()
            } else {
                format!("{name}.{ext}")
            }
        }
        None => name.to_string(),
    }
}

/// The physical storage key comes from the file id, never from the
/// display name, so unsafe or colliding display names cannot reach the
/// content directory.
fn storage_key_for(file_id: &str, display_name: &str) -> String {
    match Path::new(display_name)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) => format!("{file_id}.{}", ext.to_lowercase()),
        None => file_id.to_string(),
    }
}

fn render_error(err: &AppError) -> String {
    match err {
        AppError::Forbidden => {
            "You are not allowed to do that. Ask the admin for approval.".to_string()
        }
        AppError::NotFound => "Nothing matched that request.".to_string(),
        AppError::InvalidArgument(message) => format!("Invalid input: {message}"),
        AppError::Storage(err) => format!(
            "Storage error: {}",
            truncate(&err.to_string(), ERROR_SUMMARY_LEN)
        ),
        AppError::Internal(_) => "Something went wrong, try again later.".to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
