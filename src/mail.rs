use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// One email per relayed message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub subject: String,
    pub body: String,
    pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

impl EmailAttachment {
    fn is_usable(&self) -> bool {
        !self.filename.is_empty() && !self.data.is_empty()
    }
}

/// Result of handing a message to the mail transfer agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Sent,
    Rejected { status: Option<i32>, stderr: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<Delivery>;
}

/// Build the multipart message. The text part is always present; the
/// attachment only when it has both a filename and bytes.
pub fn build_message(address: &Mailbox, email: &OutboundEmail) -> Result<Message> {
    let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));

    if let Some(attachment) = email.attachment.as_ref().filter(|a| a.is_usable()) {
        let content_type = ContentType::parse("application/octet-stream")
            .context("Invalid attachment content type")?;
        // Always base64, so text-like payloads keep their exact bytes.
        let body = Body::new_with_encoding(attachment.data.clone(), ContentTransferEncoding::Base64)
            .map_err(|_| anyhow::anyhow!("Failed to base64-encode attachment"))?;
        multipart = multipart
            .singlepart(Attachment::new(attachment.filename.clone()).body(body, content_type));
    }

    Message::builder()
        .from(address.clone())
        .to(address.clone())
        .subject(email.subject.clone())
        .multipart(multipart)
        .context("Failed to build email message")
}

/// Pipes messages into a sendmail-compatible program run with `-t`, so
/// recipients are taken from the message headers.
pub struct Sendmail {
    program: String,
    address: Mailbox,
}

impl Sendmail {
    pub fn new(program: impl Into<String>, address: Mailbox) -> Self {
        Self {
            program: program.into(),
            address,
        }
    }
}

#[async_trait]
impl Mailer for Sendmail {
    async fn send(&self, email: &OutboundEmail) -> Result<Delivery> {
        let raw = build_message(&self.address, email)?.formatted();

        let mut child = Command::new(&self.program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start mail command: {}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Mail command stdin was not captured")?;

        // Feed stdin while draining stdout/stderr so a chatty MTA can't stall on a full pipe.
        let write = async move {
            let result = stdin.write_all(&raw).await;
            drop(stdin);
            result
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output
            .with_context(|| format!("Failed to wait for mail command: {}", self.program))?;

        if let Err(e) = written {
            // The exit status decides; a program that quits early closes its stdin.
            warn!("Writing message to {} failed: {}", self.program, e);
        }

        if output.status.success() {
            debug!("{} exited successfully", self.program);
            Ok(Delivery::Sent)
        } else {
            Ok(Delivery::Rejected {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
