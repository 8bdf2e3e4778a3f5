use std::sync::Arc;

use tracing::{error, info, warn};

use crate::mail::{Delivery, EmailAttachment, Mailer, OutboundEmail};
use crate::platform::{IncomingMessage, MediaKind, Source};

const UNKNOWN_SOURCE: &str = "未知来源";
const NO_TEXT: &str = "[无文本内容]";
const TEXT_SUBJECT: &str = "【Telegram】新文字信息";
const OTHER_SUBJECT: &str = "【Telegram】新消息 (其他类型)";

/// Turns incoming messages into emails and hands them to the mailer.
/// Platform-agnostic, and holds no state across messages.
pub struct Relay {
    mailer: Arc<dyn Mailer>,
}

impl Relay {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Relay one message. Every failure is logged here; nothing propagates.
    pub async fn handle(&self, msg: &dyn IncomingMessage) {
        info!("Received message {}", msg.id());

        let email = self.compose(msg).await;

        match self.mailer.send(&email).await {
            Ok(Delivery::Sent) => info!("Forwarded message {} (subject: {})", msg.id(), email.subject),
            Ok(Delivery::Rejected { status, stderr }) => error!(
                "Mail delivery failed for message {} (status {:?}): {}",
                msg.id(),
                status,
                stderr
            ),
            Err(e) => error!("Mail delivery failed for message {}: {:#}", msg.id(), e),
        }
    }

    pub async fn compose(&self, msg: &dyn IncomingMessage) -> OutboundEmail {
        let label = match msg.source().await {
            Ok(source) => source_label(source.as_ref()),
            Err(e) => {
                warn!("Failed to resolve sender of message {}: {:#}", msg.id(), e);
                UNKNOWN_SOURCE.to_string()
            }
        };

        let body = format!("From: {}\n\n{}", label, msg.text().unwrap_or(NO_TEXT));

        let media = MediaKind::PRIORITY
            .iter()
            .find_map(|&kind| msg.probe(kind).map(|media| (kind, media)));

        let Some((kind, media)) = media else {
            let subject = if msg.text().is_some() {
                TEXT_SUBJECT
            } else {
                OTHER_SUBJECT
            };
            return OutboundEmail {
                subject: subject.to_string(),
                body,
                attachment: None,
            };
        };

        let attachment = match msg.download(kind).await {
            Ok(data) if !data.is_empty() => Some(EmailAttachment {
                filename: kind.filename(msg.id(), media.file_name.as_deref()),
                data,
            }),
            Ok(_) => {
                warn!("Downloaded {:?} of message {} is empty", kind, msg.id());
                None
            }
            Err(e) => {
                warn!(
                    "Failed to download {:?} of message {}, sending text only: {:#}",
                    kind,
                    msg.id(),
                    e
                );
                None
            }
        };

        OutboundEmail {
            subject: kind.subject().to_string(),
            body,
            attachment,
        }
    }
}

/// "用户: First Last (@username)" for people, the chat title otherwise.
pub fn source_label(source: Option<&Source>) -> String {
    match source {
        Some(Source::User {
            first_name,
            last_name,
            username,
        }) => {
            let mut label = format!("用户: {}", first_name);
            if let Some(last) = last_name.as_deref().filter(|l| !l.is_empty()) {
                label.push(' ');
                label.push_str(last);
            }
            if let Some(username) = username.as_deref().filter(|u| !u.is_empty()) {
                label.push_str(&format!(" (@{})", username));
            }
            label
        }
        Some(Source::Chat { title }) => format!("来自群组/频道: {}", title),
        None => UNKNOWN_SOURCE.to_string(),
    }
}
