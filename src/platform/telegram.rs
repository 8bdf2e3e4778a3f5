use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use grammers_client::types::media::Document;
use grammers_client::types::{Chat, Downloadable, Media, Message};
use grammers_client::{Client, Config as ClientConfig, SignInError, Update};
use grammers_session::Session;
use grammers_tl_types as tl;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::platform::{IncomingMessage, MediaKind, MediaRef, Source};
use crate::relay::Relay;

/// Offset Telegram clients add to channel and supergroup ids ("-100…").
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Connect with the stored session and relay new messages from the target
/// chats until the session drops or the process is interrupted.
pub async fn run(config: &TelegramConfig, relay: Relay) -> Result<()> {
    let session_path = config.session_path();
    let session = Session::load_file_or_create(&session_path)
        .with_context(|| format!("Failed to open session file {}", session_path.display()))?;

    info!("Connecting to Telegram...");
    let client = Client::connect(ClientConfig {
        session,
        api_id: config.api_id,
        api_hash: config.api_hash.clone(),
        params: Default::default(),
    })
    .await
    .context("Failed to connect to Telegram")?;

    if !client
        .is_authorized()
        .await
        .context("Failed to check authorization")?
    {
        sign_in(&client, config.phone_number.as_deref()).await?;
        save_session(&client, &session_path)?;
    }

    let filter = ChatFilter::new(config.target_chat_ids.clone());
    info!("Listening for new messages in chats: {:?}", filter.targets);

    let outcome = loop {
        let update = tokio::select! {
            update = client.next_update() => match update {
                Ok(update) => update,
                Err(e) => break Err(e).context("Telegram session disconnected"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break Ok(());
            }
        };

        let Update::NewMessage(message) = update else {
            continue;
        };

        let chat = message.chat();
        if !filter.matches(&chat) {
            debug!("Ignoring message from chat {} ({})", chat.name(), chat.id());
            continue;
        }

        let incoming = TelegramMessage {
            client: &client,
            message,
        };
        relay.handle(&incoming).await;
    };

    finish(outcome, || save_session(&client, &session_path))
}

/// Persist the session however the loop ended. The loop's own error wins
/// over a failed save.
fn finish<F>(outcome: Result<()>, save: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match (outcome, save()) {
        (Err(e), Err(save_err)) => {
            warn!("{:#}", save_err);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), saved) => saved,
    }
}

fn save_session(client: &Client, path: &Path) -> Result<()> {
    client
        .session()
        .save_to_file(path)
        .with_context(|| format!("Failed to save session file {}", path.display()))
}

/// Interactive first-run login: phone, code, and the 2FA password if set.
async fn sign_in(client: &Client, phone_number: Option<&str>) -> Result<()> {
    let phone = match phone_number {
        Some(phone) => phone.to_string(),
        None => prompt("Phone number (international format): ").await?,
    };

    let token = client
        .request_login_code(&phone)
        .await
        .context("Failed to request login code")?;
    let code = prompt("Login code: ").await?;

    let user = match client.sign_in(&token, &code).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt(&format!("Two-step verification password (hint: {}): ", hint)).await?;
            client
                .check_password(password_token, password.trim())
                .await
                .context("Failed to check two-step verification password")?
        }
        Err(e) => return Err(e).context("Failed to sign in"),
    };

    info!("Signed in as {}", user.full_name());
    Ok(())
}

async fn prompt(message: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(message.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;

    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("No input given for: {}", message.trim());
    }
    Ok(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatKind {
    User,
    Group,
    Channel,
}

/// Matches chats against the configured ids, written the way Telegram
/// clients display them: users positive, basic groups negated, channels
/// and supergroups with the -100 prefix.
struct ChatFilter {
    targets: Vec<i64>,
}

impl ChatFilter {
    fn new(targets: Vec<i64>) -> Self {
        Self { targets }
    }

    fn matches(&self, chat: &Chat) -> bool {
        let kind = match chat {
            Chat::User(_) => ChatKind::User,
            Chat::Group(_) => ChatKind::Group,
            Chat::Channel(_) => ChatKind::Channel,
        };
        self.matches_id(kind, chat.id())
    }

    fn matches_id(&self, kind: ChatKind, id: i64) -> bool {
        let channel = -CHANNEL_ID_OFFSET - id;
        match kind {
            ChatKind::User => self.targets.contains(&id),
            // Supergroups present as groups but carry channel ids.
            ChatKind::Group => self.targets.contains(&-id) || self.targets.contains(&channel),
            ChatKind::Channel => self.targets.contains(&channel),
        }
    }
}

/// What a document's attributes say about it.
#[derive(Debug, Clone, Copy, Default)]
struct DocumentTraits<'a> {
    mime_type: Option<&'a str>,
    /// `Some(voice)` when the document carries an audio attribute.
    audio: Option<bool>,
    video: bool,
}

impl<'a> DocumentTraits<'a> {
    fn of(document: &'a Document) -> Self {
        let mut traits = DocumentTraits {
            mime_type: document.mime_type(),
            ..Default::default()
        };
        if let Some(tl::enums::Document::Document(raw)) = &document.raw.document {
            for attribute in &raw.attributes {
                match attribute {
                    tl::enums::DocumentAttribute::Audio(audio) => traits.audio = Some(audio.voice),
                    tl::enums::DocumentAttribute::Video(_) => traits.video = true,
                    _ => {}
                }
            }
        }
        traits
    }
}

/// Videos, voice notes and music all arrive as documents. Attributes decide;
/// the MIME type is only consulted when they are missing.
fn classify_document(traits: DocumentTraits<'_>) -> MediaKind {
    let mime = traits.mime_type.unwrap_or_default();
    match traits.audio {
        _ if traits.video => MediaKind::Video,
        Some(true) => MediaKind::Voice,
        Some(false) => MediaKind::Audio,
        None if mime.starts_with("video/") => MediaKind::Video,
        None if mime.starts_with("audio/") => MediaKind::Audio,
        None => MediaKind::Document,
    }
}

struct TelegramMessage<'a> {
    client: &'a Client,
    message: Message,
}

#[async_trait]
impl IncomingMessage for TelegramMessage<'_> {
    fn id(&self) -> i32 {
        self.message.id()
    }

    fn text(&self) -> Option<&str> {
        Some(self.message.text()).filter(|text| !text.is_empty())
    }

    async fn source(&self) -> Result<Option<Source>> {
        let source = match self.message.sender() {
            Some(Chat::User(user)) => Source::User {
                first_name: user.first_name().to_string(),
                last_name: user.last_name().map(str::to_string),
                username: user.username().map(str::to_string),
            },
            Some(chat) => Source::Chat {
                title: chat.name().to_string(),
            },
            None => Source::Chat {
                title: self.message.chat().name().to_string(),
            },
        };
        Ok(Some(source))
    }

    fn probe(&self, kind: MediaKind) -> Option<MediaRef> {
        match self.message.media()? {
            Media::Photo(_) if kind == MediaKind::Photo => Some(MediaRef::default()),
            Media::Document(document) if classify_document(DocumentTraits::of(&document)) == kind => {
                Some(MediaRef {
                    file_name: Some(document.name().to_string()).filter(|name| !name.is_empty()),
                })
            }
            // Stickers go out as plain files.
            Media::Sticker(_) if kind == MediaKind::Document => Some(MediaRef::default()),
            _ => None,
        }
    }

    async fn download(&self, kind: MediaKind) -> Result<Vec<u8>> {
        let media = self
            .message
            .media()
            .with_context(|| format!("Message {} has no {:?} to download", self.id(), kind))?;

        let mut download = self.client.iter_download(&Downloadable::Media(media));
        let mut bytes = Vec::new();
        while let Some(chunk) = download
            .next()
            .await
            .context("Failed to download media")?
        {
            bytes.extend(chunk);
        }

        if bytes.is_empty() {
            warn!("Media of message {} downloaded with zero bytes", self.id());
        }
        Ok(bytes)
    }
}
