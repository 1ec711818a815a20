//! Directory-backed mail store
//!
//! Every mailbox is a sub-directory of the root and every message a
//! `<uid>.eml` file holding the raw RFC 822 content. Moving a message
//! renames its file into the target mailbox under the next free uid there.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use mailparse::MailHeaderMap;
use tokio::fs;
use tracing::{debug, warn};

use crate::mail::{MailClient, MailConnector, RawMessages};
use crate::types::{MailError, MessageId, RawMessage};

const EXTENSION: &str = "eml";

/// Opens [`DirMailClient`]s over one root directory
#[derive(Debug, Clone)]
pub struct DirMailConnector {
    root: PathBuf,
}

impl DirMailConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MailConnector for DirMailConnector {
    async fn connect(&self) -> Result<Box<dyn MailClient>, MailError> {
        if !fs::try_exists(&self.root).await.map_err(MailError::client)? {
            return Err(MailError::client(format!(
                "mail directory '{}' does not exist",
                self.root.display()
            )));
        }

        Ok(Box::new(DirMailClient {
            root: self.root.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct DirMailClient {
    root: PathBuf,
}

impl DirMailClient {
    fn mailbox(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn message_path(&self, mailbox: &str, id: MessageId) -> PathBuf {
        self.mailbox(mailbox).join(format!("{id}.{EXTENSION}"))
    }
}

/// Uids of the messages stored in `dir`, ascending
async fn uids(dir: &Path) -> Result<Vec<MessageId>, MailError> {
    let mut entries = fs::read_dir(dir).await.map_err(MailError::client)?;
    let mut ids = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(MailError::client)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<MessageId>().ok())
        {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

fn header_date(data: &[u8]) -> Option<DateTime<Utc>> {
    let (headers, _) = mailparse::parse_headers(data).ok()?;
    let value = headers.get_first_value("Date")?;
    let timestamp = mailparse::dateparse(&value).ok()?;
    DateTime::from_timestamp(timestamp, 0)
}

#[async_trait]
impl MailClient for DirMailClient {
    async fn list_mailboxes(&mut self) -> Result<Vec<String>, MailError> {
        let mut entries = fs::read_dir(&self.root).await.map_err(MailError::client)?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(MailError::client)? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Like an IMAP `SEARCH SINCE`, compares calendar days and ignores the time
    async fn search_since(
        &mut self,
        mailbox: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MailError> {
        let mut found = Vec::new();

        for id in uids(&self.mailbox(mailbox)).await? {
            let data = fs::read(self.message_path(mailbox, id))
                .await
                .map_err(MailError::client)?;

            match header_date(&data) {
                Some(date) if date.date_naive() >= since.date_naive() => found.push(id),
                Some(_) => {}
                None => warn!(mailbox, id, "message has no readable date, skipping"),
            }
        }

        Ok(found)
    }

    async fn fetch(&mut self, mailbox: &str, ids: &[MessageId]) -> Result<RawMessages, MailError> {
        let mut raws = Vec::with_capacity(ids.len());

        for &id in ids {
            let raw = fs::read(self.message_path(mailbox, id))
                .await
                .map(|data| RawMessage { id, data })
                .map_err(|e| MailError::client(format!("message {id}: {e}")));
            raws.push(raw);
        }

        Ok(Box::pin(stream::iter(raws)))
    }

    async fn move_messages(
        &mut self,
        from: &str,
        to: &str,
        ids: &[MessageId],
    ) -> Result<(), MailError> {
        let target = self.mailbox(to);
        let mut next = uids(&target).await?.last().map_or(1, |last| last + 1);

        for &id in ids {
            let destination = target.join(format!("{next}.{EXTENSION}"));
            fs::rename(self.message_path(from, id), &destination)
                .await
                .map_err(|e| MailError::client(format!("message {id}: {e}")))?;
            debug!(from, to, id, new_id = next, "moved message");
            next += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn eml(date: &str) -> String {
        format!(
            "From: alertasynotificaciones@bancolombia.com.co\r\nTo: jane@example.com\r\nDate: {date}\r\nContent-Type: text/plain\r\n\r\nhello\r\n"
        )
    }

    async fn mail_root() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        for mailbox in ["INBOX", "processed"] {
            fs::create_dir(root.path().join(mailbox)).await.unwrap();
        }
        fs::write(root.path().join("INBOX/1.eml"), eml("Mon, 01 Jan 2024 10:00:00 +0000"))
            .await
            .unwrap();
        fs::write(root.path().join("INBOX/2.eml"), eml("Fri, 05 Jan 2024 23:00:00 +0000"))
            .await
            .unwrap();
        fs::write(root.path().join("INBOX/notes.txt"), "ignored").await.unwrap();
        root
    }

    async fn client(root: &TempDir) -> Box<dyn MailClient> {
        DirMailConnector::new(root.path()).connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_list_mailboxes() {
        let root = mail_root().await;
        let mut client = client(&root).await;

        assert_eq!(client.list_mailboxes().await.unwrap(), vec!["INBOX", "processed"]);
    }

    #[tokio::test]
    async fn test_search_since_compares_days() {
        let root = mail_root().await;
        let mut client = client(&root).await;

        let since = Utc.with_ymd_and_hms(2024, 1, 5, 23, 30, 0).unwrap();
        assert_eq!(client.search_since("INBOX", since).await.unwrap(), vec![2]);

        let since = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(client.search_since("INBOX", since).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fetch_reports_missing_messages() {
        let root = mail_root().await;
        let mut client = client(&root).await;

        let raws: Vec<_> = client.fetch("INBOX", &[1, 7]).await.unwrap().collect().await;

        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].as_ref().unwrap().id, 1);
        assert!(raws[1].is_err());
    }

    #[tokio::test]
    async fn test_move_messages_renumbers_in_target() {
        let root = mail_root().await;
        fs::write(root.path().join("processed/4.eml"), eml("Mon, 01 Jan 2024 10:00:00 +0000"))
            .await
            .unwrap();
        let mut client = client(&root).await;

        client.move_messages("INBOX", "processed", &[2]).await.unwrap();

        assert!(!root.path().join("INBOX/2.eml").exists());
        assert!(root.path().join("processed/5.eml").exists());
        assert_eq!(uids(&root.path().join("INBOX")).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_connect_requires_root() {
        let connector = DirMailConnector::new("/definitely/not/here");
        assert!(connector.connect().await.is_err());
    }
}
