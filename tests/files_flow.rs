mod common;

use anyhow::Result;

use common::{button, command, reply_text, TestApp, ADMIN_ID, USER_ID};
use filegate::catalog;
use filegate::events::{MediaKind, Reply};

#[tokio::test]
async fn delete_of_unknown_id_changes_nothing() -> Result<()> {
    let app = TestApp::new().await?;
    app.upload("keep-me.txt", b"payload").await?;
    let entries_before = app.stored_entries();

    let reply = app
        .dispatch(command("delete", &["file_zzzzzz"], ADMIN_ID))
        .await;
    assert!(reply_text(&reply).contains("Nothing matched"));

    let mut conn = app.state.db().unwrap();
    assert_eq!(catalog::list_files(&mut conn)?.len(), 1);
    assert_eq!(app.stored_entries(), entries_before);
    Ok(())
}

#[tokio::test]
async fn delete_removes_row_and_backing_bytes() -> Result<()> {
    let app = TestApp::new().await?;
    let file_id = app.upload("victim.txt", b"payload").await?;
    assert_eq!(app.stored_entries(), 1);

    let reply = app.dispatch(command("delete", &[&file_id], ADMIN_ID)).await;
    assert!(reply_text(&reply).contains("Deleted"));

    let mut conn = app.state.db().unwrap();
    assert!(catalog::get_file(&mut conn, &file_id)?.is_none());
    assert_eq!(app.stored_entries(), 0);
    Ok(())
}

#[tokio::test]
async fn delete_is_admin_only() -> Result<()> {
    let app = TestApp::new().await?;
    let file_id = app.upload("guarded.txt", b"payload").await?;
    app.start_as(USER_ID).await;
    app.approve(USER_ID).await;

    let reply = app.dispatch(command("delete", &[&file_id], USER_ID)).await;
    assert!(reply_text(&reply).contains("not allowed"));

    let mut conn = app.state.db().unwrap();
    assert!(catalog::get_file(&mut conn, &file_id)?.is_some());
    Ok(())
}

#[tokio::test]
async fn get_requires_approval() -> Result<()> {
    let app = TestApp::new().await?;
    let file_id = app.upload("private.txt", b"secret").await?;

    app.start_as(USER_ID).await;
    let reply = app.dispatch(command("get", &[&file_id], USER_ID)).await;
    assert!(reply_text(&reply).contains("not allowed"));
    Ok(())
}

#[tokio::test]
async fn get_reports_missing_backing_bytes_as_not_found() -> Result<()> {
    let app = TestApp::new().await?;
    let file_id = app.upload("vanishing.txt", b"bytes").await?;

    // Remove the physical entry behind the catalog's back.
    let mut conn = app.state.db().unwrap();
    let record = catalog::get_file(&mut conn, &file_id)?.expect("row");
    drop(conn);
    std::fs::remove_file(app.storage_dir.join(&record.storage_key))?;

    let reply = app.dispatch(command("get", &[&file_id], ADMIN_ID)).await;
    assert!(reply_text(&reply).contains("Nothing matched"));
    Ok(())
}

#[tokio::test]
async fn get_maps_media_kind_from_extension() -> Result<()> {
    let app = TestApp::new().await?;
    let file_id = app.upload("mixtape.mp3", b"id3").await?;

    let reply = app.dispatch(command("get", &[&file_id], ADMIN_ID)).await;
    match reply {
        Some(Reply::File { media, .. }) => assert_eq!(media, MediaKind::Audio),
        other => panic!("expected file reply, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn search_matches_either_name_case_insensitively() -> Result<()> {
    let app = TestApp::new().await?;
    // Display name renamed away from the original so both fields differ.
    let hit_id = app.upload("My Music Mix.mp3", b"tracks").await?;
    app.upload("holiday.jpg", b"jpeg").await?;

    let mut conn = app.state.db().unwrap();
    catalog::rename_file(&mut conn, &hit_id, "mixtape.mp3")?;
    drop(conn);

    app.start_as(USER_ID).await;
    app.approve(USER_ID).await;
    let reply = app.dispatch(command("search", &["music"], USER_ID)).await;
    let text = reply_text(&reply);
    assert!(text.contains(&hit_id), "match on original name: {text}");
    assert!(!text.contains("holiday.jpg"), "non-match excluded: {text}");
    Ok(())
}

#[tokio::test]
async fn search_treats_like_wildcards_literally() -> Result<()> {
    let app = TestApp::new().await?;
    let hit_id = app.upload("a_b.txt", b"1").await?;
    app.upload("axb.txt", b"2").await?;
    app.upload("percent.txt", b"3").await?;

    let reply = app.dispatch(command("search", &["a_b"], ADMIN_ID)).await;
    let text = reply_text(&reply);
    assert!(text.contains(&hit_id), "literal underscore match: {text}");
    assert!(!text.contains("axb.txt"), "underscore is not a wildcard: {text}");

    let reply = app.dispatch(command("search", &["%"], ADMIN_ID)).await;
    assert!(reply_text(&reply).contains("No results"));
    Ok(())
}

#[tokio::test]
async fn search_without_matches_says_so() -> Result<()> {
    let app = TestApp::new().await?;
    app.upload("report.pdf", b"pdf").await?;

    let reply = app.dispatch(command("search", &["nothing"], ADMIN_ID)).await;
    assert!(reply_text(&reply).contains("No results"));
    Ok(())
}

#[tokio::test]
async fn search_truncates_to_ten_with_remainder_count() -> Result<()> {
    let app = TestApp::new().await?;
    for i in 0..12 {
        app.upload(&format!("log-{i:02}.txt"), b"line").await?;
    }

    let reply = app.dispatch(command("search", &["log-"], ADMIN_ID)).await;
    let text = reply_text(&reply);
    assert_eq!(text.matches("/get file_").count(), 10);
    assert!(text.contains("and 2 more"), "remainder count: {text}");
    Ok(())
}

#[tokio::test]
async fn search_requires_approval() -> Result<()> {
    let app = TestApp::new().await?;
    app.start_as(USER_ID).await;

    let reply = app.dispatch(command("search", &["x"], USER_ID)).await;
    assert!(reply_text(&reply).contains("not allowed"));
    Ok(())
}

#[tokio::test]
async fn rename_command_updates_display_name_only() -> Result<()> {
    let app = TestApp::new().await?;
    let file_id = app.upload("old name.txt", b"data").await?;

    let reply = app
        .dispatch(command("rename", &[&file_id, "new", "name.txt"], ADMIN_ID))
        .await;
    assert!(reply_text(&reply).contains("Renamed"));

    let mut conn = app.state.db().unwrap();
    let record = catalog::get_file(&mut conn, &file_id)?.expect("row");
    assert_eq!(record.display_name, "new name.txt");
    assert_eq!(record.original_name, "old name.txt");
    Ok(())
}

#[tokio::test]
async fn rename_of_unknown_file_is_not_found() -> Result<()> {
    let app = TestApp::new().await?;
    let reply = app
        .dispatch(command("rename", &["file_zzzzzz", "name"], ADMIN_ID))
        .await;
    assert!(reply_text(&reply).contains("Nothing matched"));
    Ok(())
}

#[tokio::test]
async fn browse_lists_newest_first_for_approved_users() -> Result<()> {
    let app = TestApp::new().await?;
    app.upload("first.txt", b"1").await?;
    app.upload("second.txt", b"22").await?;

    app.start_as(USER_ID).await;
    app.approve(USER_ID).await;
    let reply = app.dispatch(button("browse_files", USER_ID)).await;
    let text = reply_text(&reply);
    assert!(text.contains("first.txt"));
    assert!(text.contains("second.txt"));

    let reply = app.dispatch(button("browse_files", USER_ID + 1)).await;
    assert!(reply_text(&reply).contains("not allowed"));
    Ok(())
}
