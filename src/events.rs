use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

/// Source of the raw bytes behind a pending inbound file. The transport
/// hands the dispatcher a handle, not the bytes; they are only fetched when
/// an upload session resolves.
#[async_trait]
pub trait ByteSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// Byte source backed by an in-memory buffer. Used by the console transport
/// and by tests.
pub struct InMemorySource(pub Vec<u8>);

#[async_trait]
impl ByteSource for InMemorySource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundFileKind {
    Document,
    Photo,
    Video,
    Audio,
    Voice,
}

/// An inbound file attachment as the transport describes it.
#[derive(Clone)]
pub struct InboundFileRef {
    pub kind: InboundFileKind,
    pub suggested_name: Option<String>,
    pub source: Arc<dyn ByteSource>,
}

impl InboundFileRef {
    /// The name the upload starts from: the transport's suggestion when it
    /// carries one, otherwise a synthesized per-kind default.
    pub fn resolved_name(&self) -> String {
        if let Some(name) = self.suggested_name.as_deref() {
            if !name.trim().is_empty() {
                return name.to_string();
            }
        }
        match self.kind {
            InboundFileKind::Document => "file.bin".to_string(),
            InboundFileKind::Photo => {
                format!("photo_{}.jpg", Utc::now().format("%Y%m%d_%H%M%S"))
            }
            InboundFileKind::Video => "video.mp4".to_string(),
            InboundFileKind::Audio => "Unknown - Unknown.mp3".to_string(),
            InboundFileKind::Voice => "voice.ogg".to_string(),
        }
    }
}

impl fmt::Debug for InboundFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundFileRef")
            .field("kind", &self.kind)
            .field("suggested_name", &self.suggested_name)
            .finish_non_exhaustive()
    }
}

/// The actor behind an inbound event, as identified by the transport.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: i64,
    pub display_name: Option<String>,
    pub handle: Option<String>,
}

impl Actor {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            display_name: None,
            handle: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    TextCommand {
        name: String,
        args: Vec<String>,
        actor: Actor,
        attachment: Option<InboundFileRef>,
    },
    ButtonClick {
        action: String,
        actor: Actor,
    },
    FreeText {
        text: String,
        actor: Actor,
    },
}

impl InboundEvent {
    pub fn actor_id(&self) -> i64 {
        match self {
            Self::TextCommand { actor, .. }
            | Self::ButtonClick { actor, .. }
            | Self::FreeText { actor, .. } => actor.id,
        }
    }
}

/// Media category hint for the presentation layer, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Audio,
    Video,
    Document,
}

impl MediaKind {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif") => Self::Photo,
            Some("mp3" | "m4a" | "wav" | "flac") => Self::Audio,
            Some("mp4" | "avi" | "mov" | "mkv") => Self::Video,
            _ => Self::Document,
        }
    }
}

/// What the dispatcher hands back to the transport for delivery.
#[derive(Debug)]
pub enum Reply {
    Text(String),
    File {
        display_name: String,
        media: MediaKind,
        bytes: Vec<u8>,
    },
}
