use mailparse::{MailHeaderMap, ParsedMail};
use native_tls::TlsStream;
use std::net::TcpStream;

use crate::config::MailboxConfig;
use crate::error::{MetamodelError, Result};

/// One unseen message, identified by its IMAP UID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub uid: u32,
    pub body: String,
}

/// Source of raw text for ingestion.
///
/// Fetching leaves the message unseen; callers mark it once they are done
/// with it, so a failed ingest is retried on the next pull.
#[async_trait::async_trait]
pub trait Mailbox: Send + Sync {
    /// Oldest unseen message, or `None` when the folder has none
    async fn fetch_next_unseen(&self, config: &MailboxConfig) -> Result<Option<MailMessage>>;
    async fn mark_seen(&self, config: &MailboxConfig, uid: u32) -> Result<()>;
}

/// IMAP over TLS. The blocking client runs on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapMailbox;

#[async_trait::async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_next_unseen(&self, config: &MailboxConfig) -> Result<Option<MailMessage>> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&config))
            .await
            .map_err(|e| MetamodelError::Upstream(format!("mailbox task failed: {}", e)))?
    }

    async fn mark_seen(&self, config: &MailboxConfig, uid: u32) -> Result<()> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || mark_seen_blocking(&config, uid))
            .await
            .map_err(|e| MetamodelError::Upstream(format!("mailbox task failed: {}", e)))?
    }
}

type ImapSession = imap::Session<TlsStream<TcpStream>>;

fn upstream(context: &str, err: impl std::fmt::Display) -> MetamodelError {
    MetamodelError::Upstream(format!("{}: {}", context, err))
}

fn open_folder(config: &MailboxConfig) -> Result<ImapSession> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(|e| upstream("TLS setup failed", e))?;
    let client = imap::connect((config.host.as_str(), config.port), &config.host, &tls)
        .map_err(|e| upstream("IMAP connect failed", e))?;
    let mut session = client
        .login(&config.user, &config.password)
        .map_err(|(e, _)| upstream("IMAP login failed", e))?;

    session
        .select(&config.folder)
        .map_err(|e| upstream("IMAP select failed", e))?;
    Ok(session)
}

fn fetch_blocking(config: &MailboxConfig) -> Result<Option<MailMessage>> {
    let mut session = open_folder(config)?;
    let unseen = session
        .uid_search("UNSEEN")
        .map_err(|e| upstream("IMAP search failed", e))?;

    let Some(uid) = unseen.into_iter().min() else {
        log::info!("No unseen emails.");
        session.logout().map_err(|e| upstream("IMAP logout failed", e))?;
        return Ok(None);
    };

    // BODY.PEEK leaves the \Seen flag alone
    let messages = session
        .uid_fetch(uid.to_string(), "BODY.PEEK[]")
        .map_err(|e| upstream("IMAP fetch failed", e))?;
    let raw = messages
        .iter()
        .find_map(|message| message.body())
        .map(<[u8]>::to_vec)
        .ok_or_else(|| MetamodelError::Upstream(format!("message {} has no body", uid)))?;
    session.logout().map_err(|e| upstream("IMAP logout failed", e))?;

    let body = extract_text_body(&raw)?;
    Ok(Some(MailMessage { uid, body }))
}

fn mark_seen_blocking(config: &MailboxConfig, uid: u32) -> Result<()> {
    let mut session = open_folder(config)?;
    session
        .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
        .map_err(|e| upstream("IMAP store failed", e))?;
    log::info!("marked message {} read", uid);
    session.logout().map_err(|e| upstream("IMAP logout failed", e))?;
    Ok(())
}

/// Plain-text body of an RFC 822 message; multipart messages yield their
/// first `text/plain` part, anything else the top-level body.
pub fn extract_text_body(raw: &[u8]) -> Result<String> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| upstream("unparseable message", e))?;
    if let Some(subject) = parsed.headers.get_first_value("Subject") {
        log::info!("processing message: {}", subject);
    }

    let part = find_text_part(&parsed).unwrap_or(&parsed);
    part.get_body()
        .map(|body| body.trim().to_string())
        .map_err(|e| upstream("undecodable message body", e))
}

fn find_text_part<'m, 'a>(mail: &'m ParsedMail<'a>) -> Option<&'m ParsedMail<'a>> {
    if mail.subparts.is_empty() {
        return (mail.ctype.mimetype == "text/plain").then_some(mail);
    }
    mail.subparts.iter().find_map(|part| find_text_part(part))
}
