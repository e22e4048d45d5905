//! Console transport: feeds stdin lines to the dispatcher as inbound
//! events and prints replies. Lines starting with `/` are commands
//! (`/add <path>` attaches a local file), lines starting with `!` are
//! button clicks (`!keep_original`, `!cancel_upload`, ...), everything
//! else is free text.

use std::sync::Arc;

use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use filegate::config::AppConfig;
use filegate::dispatch;
use filegate::events::{
    Actor, InboundEvent, InboundFileKind, InboundFileRef, InMemorySource, Reply,
};
use filegate::state::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let state = state::init(config).await?;
    let actor = Actor {
        id: state.admin_id(),
        display_name: Some("Console".to_string()),
        handle: None,
    };

    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let Some(event) = parse_line(&line, &actor)? else {
            continue;
        };
        if let Some(reply) = dispatch::handle_event(&state, event).await {
            print_reply(&state, reply).await?;
        }
    }

    Ok(())
}

fn parse_line(line: &str, actor: &Actor) -> anyhow::Result<Option<InboundEvent>> {
    if let Some(action) = line.strip_prefix('!') {
        return Ok(Some(InboundEvent::ButtonClick {
            action: action.to_string(),
            actor: actor.clone(),
        }));
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(None);
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        // /add takes a local path and turns it into an attachment.
        let attachment = if name == "add" {
            let Some(path) = args.first() else {
                println!("usage: /add <path>");
                return Ok(None);
            };
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    println!("cannot read {path}: {err}");
                    return Ok(None);
                }
            };
            let suggested_name = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            Some(InboundFileRef {
                kind: InboundFileKind::Document,
                suggested_name,
                source: Arc::new(InMemorySource(bytes)),
            })
        } else {
            None
        };

        let args = if name == "add" { Vec::new() } else { args };
        return Ok(Some(InboundEvent::TextCommand {
            name: name.to_string(),
            args,
            actor: actor.clone(),
            attachment,
        }));
    }

    Ok(Some(InboundEvent::FreeText {
        text: line.to_string(),
        actor: actor.clone(),
    }))
}

async fn print_reply(state: &AppState, reply: Reply) -> anyhow::Result<()> {
    match reply {
        Reply::Text(text) => println!("{text}"),
        Reply::File {
            display_name,
            media,
            bytes,
        } => {
            let out = state.config.storage_dir.join("downloads");
            tokio::fs::create_dir_all(&out).await?;
            let path = out.join(&display_name);
            tokio::fs::write(&path, bytes).await?;
            println!("saved {display_name} ({media:?}) to {}", path.display());
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
