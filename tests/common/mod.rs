//! In-memory collaborators shared by the integration tests
//!
//! Every fake records the calls that have side effects so tests can assert
//! on what a run did, not only on what it reported.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bank_mail_sync::accounting::{
    Account, AccountingClient, AccountingService, Category, Entry,
};
use bank_mail_sync::bank::banks;
use bank_mail_sync::mail::{MailClient, MailClientPool, MailConnector, MailService, RawMessages};
use bank_mail_sync::notify::SmsSender;
use bank_mail_sync::repository::{DateStore, UserConfigStore};
use bank_mail_sync::sync::{Dependencies, DependencyFactory, Mailboxes, SyncOptions};
use bank_mail_sync::{
    AccountingError, MailError, MessageId, NotifyError, StoreError, SyncError, TransactionKind,
    UserConfig,
};
use bank_mail_sync::types::{AccountingConfig, RawMessage};
use chrono::{DateTime, TimeZone, Utc};
use futures::{stream, StreamExt};
use mailparse::MailHeaderMap;

pub const BANK_SENDER: &str = "alertasynotificaciones@bancolombia.com.co";
pub const JANE: &str = "jane@example.com";

pub fn eml(from: &str, to: &str, date: DateTime<Utc>, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\nTo: {to}\r\nSubject: Alertas y Notificaciones\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n",
        date.to_rfc2822()
    )
    .into_bytes()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub from: String,
    pub to: String,
    pub ids: Vec<MessageId>,
}

/// Mail server with named mailboxes holding raw messages
#[derive(Default)]
pub struct MemoryMail {
    pub mailboxes: Mutex<BTreeMap<String, BTreeMap<MessageId, Vec<u8>>>>,
    pub moves: Mutex<Vec<Move>>,

    /// Ids whose fetch fails
    pub broken: Mutex<HashSet<MessageId>>,

    /// Searches never answer
    pub hang_search: AtomicBool,

    /// Fetch streams stay open after their last message
    pub stall_fetch: AtomicBool,
}

impl MemoryMail {
    pub fn with_mailboxes(names: &[&str]) -> Arc<Self> {
        let mail = Self::default();
        {
            let mut mailboxes = mail.mailboxes.lock().unwrap();
            for name in names {
                mailboxes.insert(name.to_string(), BTreeMap::new());
            }
        }
        Arc::new(mail)
    }

    pub fn deliver(&self, mailbox: &str, id: MessageId, data: Vec<u8>) {
        self.mailboxes
            .lock()
            .unwrap()
            .entry(mailbox.to_string())
            .or_default()
            .insert(id, data);
    }

    pub fn ids(&self, mailbox: &str) -> Vec<MessageId> {
        self.mailboxes.lock().unwrap()[mailbox].keys().copied().collect()
    }

    pub fn hang_search(&self) {
        self.hang_search.store(true, Ordering::SeqCst);
    }

    pub fn stall_fetch(&self) {
        self.stall_fetch.store(true, Ordering::SeqCst);
    }

    pub fn moves(&self) -> Vec<Move> {
        let mut moves = self.moves.lock().unwrap().clone();
        for m in &mut moves {
            m.ids.sort_unstable();
        }
        moves.sort_by(|a, b| a.to.cmp(&b.to));
        moves
    }
}

struct MemoryClient(Arc<MemoryMail>);

fn sent_at(data: &[u8]) -> Option<DateTime<Utc>> {
    let (headers, _) = mailparse::parse_headers(data).ok()?;
    let timestamp = mailparse::dateparse(&headers.get_first_value("Date")?).ok()?;
    DateTime::from_timestamp(timestamp, 0)
}

#[async_trait]
impl MailClient for MemoryClient {
    async fn list_mailboxes(&mut self) -> Result<Vec<String>, MailError> {
        Ok(self.0.mailboxes.lock().unwrap().keys().cloned().collect())
    }

    async fn search_since(
        &mut self,
        mailbox: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MailError> {
        if self.0.hang_search.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let mailboxes = self.0.mailboxes.lock().unwrap();
        let messages = mailboxes
            .get(mailbox)
            .ok_or_else(|| MailError::client(format!("no mailbox {mailbox}")))?;

        Ok(messages
            .iter()
            .filter(|(_, data)| {
                sent_at(data).is_some_and(|date| date.date_naive() >= since.date_naive())
            })
            .map(|(id, _)| *id)
            .collect())
    }

    async fn fetch(&mut self, mailbox: &str, ids: &[MessageId]) -> Result<RawMessages, MailError> {
        let mailboxes = self.0.mailboxes.lock().unwrap();
        let broken = self.0.broken.lock().unwrap();
        let messages = &mailboxes[mailbox];

        let raws: Vec<_> = ids
            .iter()
            .map(|&id| match messages.get(&id) {
                Some(data) if !broken.contains(&id) => Ok(RawMessage {
                    id,
                    data: data.clone(),
                }),
                _ => Err(MailError::client(format!("could not fetch {id}"))),
            })
            .collect();

        if self.0.stall_fetch.load(Ordering::SeqCst) {
            return Ok(Box::pin(stream::iter(raws).chain(stream::pending())));
        }
        Ok(Box::pin(stream::iter(raws)))
    }

    async fn move_messages(
        &mut self,
        from: &str,
        to: &str,
        ids: &[MessageId],
    ) -> Result<(), MailError> {
        let mut mailboxes = self.0.mailboxes.lock().unwrap();
        for id in ids {
            let data = mailboxes
                .get_mut(from)
                .and_then(|messages| messages.remove(id))
                .ok_or_else(|| MailError::client(format!("no message {id}")))?;
            mailboxes.entry(to.to_string()).or_default().insert(*id, data);
        }

        self.0.moves.lock().unwrap().push(Move {
            from: from.to_string(),
            to: to.to_string(),
            ids: ids.to_vec(),
        });
        Ok(())
    }
}

struct MemoryConnector(Arc<MemoryMail>);

#[async_trait]
impl MailConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn MailClient>, MailError> {
        Ok(Box::new(MemoryClient(Arc::clone(&self.0))))
    }
}

#[derive(Default)]
pub struct MemoryDates {
    pub date: Mutex<Option<DateTime<Utc>>>,
    pub saves: Mutex<usize>,
}

impl MemoryDates {
    pub fn starting_at(date: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            date: Mutex::new(Some(date)),
            saves: Mutex::new(0),
        })
    }

    pub fn current(&self) -> Option<DateTime<Utc>> {
        *self.date.lock().unwrap()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl DateStore for MemoryDates {
    async fn last_processed_date(&self) -> Result<DateTime<Utc>, StoreError> {
        self.current().ok_or_else(|| StoreError::NotFound {
            key: "1".to_string(),
        })
    }

    async fn save_processed_date(&self, date: DateTime<Utc>) -> Result<(), StoreError> {
        *self.date.lock().unwrap() = Some(date);
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct MemoryUsers(pub Vec<UserConfig>);

#[async_trait]
impl UserConfigStore for MemoryUsers {
    async fn user_config(&self, email: &str) -> Result<UserConfig, StoreError> {
        self.0
            .iter()
            .find(|user| user.email == email)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: email.to_string(),
            })
    }

    async fn all_user_configs(&self) -> Result<Vec<UserConfig>, StoreError> {
        Ok(self.0.clone())
    }
}

pub fn jane() -> UserConfig {
    UserConfig {
        email: JANE.to_string(),
        sms_delivery_number: "+573000000000".to_string(),
        accounting: AccountingConfig {
            token: "t-jane".to_string(),
        },
        ..Default::default()
    }
}

/// One ledger shared by every token
pub struct MemoryLedger {
    pub accounts: Vec<Account>,
    pub categories: Mutex<Vec<Category>>,
    pub entries: Mutex<Vec<Entry>>,
}

impl MemoryLedger {
    pub fn with_accounts(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            accounts: names
                .iter()
                .enumerate()
                .map(|(i, name)| Account {
                    id: format!("acc-{}", i + 1),
                    name: name.to_string(),
                })
                .collect(),
            categories: Mutex::new(vec![]),
            entries: Mutex::new(vec![]),
        })
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.categories.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountingClient for MemoryLedger {
    async fn accounts(&self) -> Result<Vec<Account>, AccountingError> {
        Ok(self.accounts.clone())
    }

    async fn categories(&self) -> Result<Vec<Category>, AccountingError> {
        Ok(self.categories())
    }

    async fn create_category(
        &self,
        name: &str,
        kind: TransactionKind,
    ) -> Result<Category, AccountingError> {
        let mut categories = self.categories.lock().unwrap();
        let category = Category {
            id: format!("cat-{}", categories.len() + 1),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        categories.push(category.clone());
        Ok(category)
    }

    async fn create_entry(&self, entry: &Entry) -> Result<(), AccountingError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send_sms(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(())
    }
}

/// Every fake of one scenario, handed to the synchronizer as its factory
pub struct Fakes {
    pub mail: Arc<MemoryMail>,
    pub dates: Arc<MemoryDates>,
    pub users: Arc<MemoryUsers>,
    pub ledger: Arc<MemoryLedger>,
    pub sms: Arc<RecordingSms>,
}

impl Fakes {
    pub fn new(mail: Arc<MemoryMail>, dates: Arc<MemoryDates>, ledger: Arc<MemoryLedger>) -> Arc<Self> {
        Arc::new(Self {
            mail,
            dates,
            users: Arc::new(MemoryUsers(vec![jane()])),
            ledger,
            sms: Arc::new(RecordingSms::default()),
        })
    }
}

#[async_trait]
impl DependencyFactory for Fakes {
    async fn build(&self) -> Result<Dependencies, SyncError> {
        let ledger = Arc::clone(&self.ledger);

        Ok(Dependencies {
            mail: MailService::new(MailClientPool::new(Arc::new(MemoryConnector(Arc::clone(
                &self.mail,
            ))))),
            accounting: Arc::new(AccountingService::new(Arc::new(move |_token: &str| {
                Arc::clone(&ledger) as Arc<dyn AccountingClient>
            }))),
            dates: Arc::clone(&self.dates) as Arc<dyn DateStore>,
            users: Arc::clone(&self.users) as Arc<dyn UserConfigStore>,
            sms: Arc::clone(&self.sms) as Arc<dyn SmsSender>,
            banks: banks(),
        })
    }
}

pub const INBOX: &str = "INBOX";
pub const PARSE_ERRORS: &str = "parse-errors";
pub const ARCHIVE: &str = "processed";

pub fn options(dry_run: bool) -> SyncOptions {
    SyncOptions {
        dry_run,
        since: None,
        mailboxes: Mailboxes {
            inbox: INBOX.to_string(),
            parse_error: PARSE_ERRORS.to_string(),
            archive: ARCHIVE.to_string(),
        },
        timezone: "America/Bogota".to_string(),
        version: "test".to_string(),
    }
}
