pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Who a message came from, as far as the platform could tell.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    User {
        first_name: String,
        last_name: Option<String>,
        username: Option<String>,
    },
    /// Group or channel, when there is no individual sender.
    Chat { title: String },
}

/// Media a message can carry. Order of `PRIORITY` decides which kind wins
/// when a platform reports more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
    Video,
    Voice,
    Audio,
}

impl MediaKind {
    pub const PRIORITY: [MediaKind; 5] = [
        MediaKind::Photo,
        MediaKind::Document,
        MediaKind::Video,
        MediaKind::Voice,
        MediaKind::Audio,
    ];

    pub fn subject(self) -> &'static str {
        match self {
            MediaKind::Photo => "【Telegram】新图片信息",
            MediaKind::Document => "【Telegram】新附件信息",
            MediaKind::Video => "【Telegram】新视频信息",
            MediaKind::Voice => "【Telegram】新语音信息",
            MediaKind::Audio => "【Telegram】新音频信息",
        }
    }

    /// Attachment filename. Photos and voice notes never carry a usable
    /// declared name, so theirs is always synthesized.
    pub fn filename(self, message_id: i32, declared: Option<&str>) -> String {
        let declared = declared.filter(|name| !name.is_empty());
        match (self, declared) {
            (MediaKind::Document | MediaKind::Video | MediaKind::Audio, Some(name)) => {
                name.to_string()
            }
            (MediaKind::Photo, _) => format!("image_{}.jpg", message_id),
            (MediaKind::Document, None) => format!("file_{}", message_id),
            (MediaKind::Video, None) => format!("video_{}.mp4", message_id),
            (MediaKind::Voice, _) => format!("voice_{}.ogg", message_id),
            (MediaKind::Audio, None) => format!("audio_{}.mp3", message_id),
        }
    }
}

/// Handle on a media payload found while probing a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaRef {
    pub file_name: Option<String>,
}

/// A new message as seen by the relay, independent of the client library.
/// Only valid for the duration of one handler call.
#[async_trait]
pub trait IncomingMessage: Send + Sync {
    fn id(&self) -> i32;

    /// Message text; `None` when the message has none.
    fn text(&self) -> Option<&str>;

    async fn source(&self) -> Result<Option<Source>>;

    fn probe(&self, kind: MediaKind) -> Option<MediaRef>;

    async fn download(&self, kind: MediaKind) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filenames() {
        assert_eq!(MediaKind::Photo.filename(7, None), "image_7.jpg");
        assert_eq!(MediaKind::Document.filename(42, None), "file_42");
        assert_eq!(MediaKind::Video.filename(3, None), "video_3.mp4");
        assert_eq!(MediaKind::Voice.filename(5, None), "voice_5.ogg");
        assert_eq!(MediaKind::Audio.filename(9, None), "audio_9.mp3");
    }

    #[test]
    fn test_declared_filenames() {
        assert_eq!(MediaKind::Document.filename(1, Some("a.pdf")), "a.pdf");
        assert_eq!(MediaKind::Video.filename(1, Some("clip.mov")), "clip.mov");
        assert_eq!(MediaKind::Audio.filename(1, Some("song.flac")), "song.flac");
        assert_eq!(MediaKind::Photo.filename(1, Some("x.png")), "image_1.jpg");
        assert_eq!(MediaKind::Voice.filename(1, Some("x.oga")), "voice_1.ogg");
        assert_eq!(MediaKind::Document.filename(42, Some("")), "file_42");
    }
}
