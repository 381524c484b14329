//! The household assistant: runs each duty against the chat channel.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use mucklan_bills::{ExtractedAmount, RentBreakdown, extract, rent_announcement, split, unreadable_notice};
use mucklan_chores::{Rotation, RotationState, StateStore, assign};
use mucklan_core::config::{BillsConfig, ChoresConfig, MucklanConfig};
use mucklan_core::error::{MucklanError, Result};
use mucklan_core::traits::{ChatChannel, DocumentReader};
use mucklan_core::types::{Attachment, IncomingMessage, Money};
use mucklan_scheduler::JobKind;

use crate::command::{Command, parse_command};

/// Result of a rotation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationOutcome {
    pub rotation: Rotation,
    /// Direct messages delivered.
    pub delivered: usize,
    /// Direct messages that failed.
    pub failed: usize,
    /// Whether the channel announcement went out.
    pub announced: bool,
}

impl fmt::Display for RotationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rotation sent to {}/{} residents, next counter {}",
            self.delivered,
            self.rotation.assignments.len(),
            self.rotation.next.counter
        )?;
        if !self.announced {
            f.write_str(" (announcement failed)")?;
        }
        Ok(())
    }
}

/// Result of a bill check.
#[derive(Debug, Clone, PartialEq)]
pub enum BillCheckOutcome {
    /// Rent posted in the announcement channel.
    Announced(RentBreakdown),
    /// No bill documents this month; nothing posted.
    NoBills,
    /// Some documents had no recognizable amount; the manager was told instead.
    Unreadable(Vec<String>),
}

impl fmt::Display for BillCheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announced(b) => write!(f, "announced rent {} from {} bill(s)", b.total, b.bills.len()),
            Self::NoBills => f.write_str("no bills posted, nothing announced"),
            Self::Unreadable(files) => write!(f, "unreadable bills: {}", files.join(", ")),
        }
    }
}

/// Result of a reminder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    Sent,
    NotNeeded { bills: usize },
}

impl fmt::Display for ReminderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("reminder sent to the bill manager"),
            Self::NotNeeded { bills } => write!(f, "{bills} bill(s) already posted, no reminder"),
        }
    }
}

/// Household assistant.
pub struct Household {
    config: MucklanConfig,
    channel: Arc<dyn ChatChannel>,
    reader: Arc<dyn DocumentReader>,
    store: Box<dyn StateStore>,
}

impl Household {
    pub fn new(
        config: MucklanConfig,
        channel: Arc<dyn ChatChannel>,
        reader: Arc<dyn DocumentReader>,
        store: Box<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            channel,
            reader,
            store,
        }
    }

    pub fn config(&self) -> &MucklanConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    fn chores(&self) -> Result<&ChoresConfig> {
        self.config
            .chores
            .as_ref()
            .ok_or_else(|| MucklanError::config("no [chores] section configured"))
    }

    fn bills(&self) -> Result<&BillsConfig> {
        self.config
            .bills
            .as_ref()
            .ok_or_else(|| MucklanError::config("no [bills] section configured"))
    }

    /// Saved rotation state, or the configured start counter before the first run.
    pub fn current_state(&self) -> Result<RotationState> {
        let chores = self.chores()?;
        Ok(self
            .store
            .load()?
            .unwrap_or(RotationState::new(chores.start_counter)))
    }

    /// This cycle's assignments, without advancing anything.
    pub fn preview_rotation(&self) -> Result<Rotation> {
        let chores = self.chores()?;
        assign(&chores.residents, &chores.tasks, self.current_state()?)
    }

    /// Advance the rotation and tell everyone their area.
    ///
    /// The next counter is saved before any message goes out. Delivery
    /// failures are logged and counted, never retried.
    pub async fn run_rotation(&self) -> Result<RotationOutcome> {
        let chores = self.chores()?;
        let rotation = self.preview_rotation()?;
        self.store.save(&rotation.next)?;
        tracing::info!("🧹 Rotation advanced, next counter {}", rotation.next.counter);

        let mut delivered = 0;
        let mut failed = 0;
        for assignment in &rotation.assignments {
            let text = chores.assignment_message.replace("{task}", &assignment.task);
            match self.channel.send_direct(&assignment.resident, &text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!("⚠️ Could not DM {} their task: {e}", assignment.resident);
                }
            }
        }

        let announced = match self
            .channel
            .send_to_channel(&chores.channel_id, &chores.announcement)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Rotation announcement failed: {e}");
                false
            }
        };

        Ok(RotationOutcome {
            rotation,
            delivered,
            failed,
            announced,
        })
    }

    /// Bill check over the current month.
    pub async fn run_bill_check(&self) -> Result<BillCheckOutcome> {
        self.bill_check_since(month_start(Local::now())).await
    }

    /// Read every bill posted since `since`, split the rent and announce it.
    pub async fn bill_check_since(&self, since: DateTime<Utc>) -> Result<BillCheckOutcome> {
        let bills = self.bills()?;
        let documents = self.bill_documents(since).await?;
        if documents.is_empty() {
            tracing::info!("📭 No bills posted since {since}, skipping announcement");
            return Ok(BillCheckOutcome::NoBills);
        }

        // All downloads resolve before any of them is judged.
        let downloads = join_all(documents.iter().map(|a| self.channel.download(a))).await;
        let files = documents
            .iter()
            .zip(downloads)
            .map(|(a, bytes)| bytes.map(|b| (a, b)))
            .collect::<Result<Vec<_>>>()?;

        let readings = join_all(
            files
                .into_iter()
                .map(|(a, bytes)| async move { (a, self.read_amount(bytes).await) }),
        )
        .await;

        let mut amounts = Vec::new();
        let mut unreadable = Vec::new();
        for (attachment, reading) in readings {
            match reading {
                Ok(found) => {
                    tracing::debug!(
                        "🧾 {}: {} (rule {}, page {})",
                        attachment.filename,
                        found.amount,
                        found.rule,
                        found.page + 1
                    );
                    amounts.push(found.amount);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {}: {e}", attachment.filename);
                    unreadable.push(attachment.filename.clone());
                }
            }
        }

        if !unreadable.is_empty() {
            self.channel
                .send_direct(&bills.manager_id, &unreadable_notice(&unreadable))
                .await?;
            return Ok(BillCheckOutcome::Unreadable(unreadable));
        }

        let breakdown = split(&amounts, &bills.policy)?;
        if breakdown.residual != Money::ZERO {
            tracing::debug!("Rounding residual {}", breakdown.residual);
        }
        self.channel
            .send_to_channel(
                &bills.announce_channel_id,
                &rent_announcement(&breakdown, &bills.currency),
            )
            .await?;
        tracing::info!("💰 Rent announced: total {} {}", breakdown.total, bills.currency);
        Ok(BillCheckOutcome::Announced(breakdown))
    }

    /// Reminder over the current month.
    pub async fn run_reminder(&self) -> Result<ReminderOutcome> {
        self.reminder_since(month_start(Local::now())).await
    }

    /// Nudge the bill manager when no bill has been posted since `since`.
    pub async fn reminder_since(&self, since: DateTime<Utc>) -> Result<ReminderOutcome> {
        let bills = self.bills()?;
        let documents = self.bill_documents(since).await?;
        if !documents.is_empty() {
            return Ok(ReminderOutcome::NotNeeded {
                bills: documents.len(),
            });
        }
        self.channel
            .send_direct(&bills.manager_id, &bills.reminder_message)
            .await?;
        tracing::info!("🔔 Reminded {} about the bills", bills.manager_id);
        Ok(ReminderOutcome::Sent)
    }

    /// React to a chat message. Returns `None` when it is not for us.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<Option<BillCheckOutcome>> {
        if msg.from_bot {
            return Ok(None);
        }
        match parse_command(&self.config.discord.command_prefix, &msg.content) {
            Some(Command::Bills) => {
                tracing::info!(
                    "💬 {} asked for the rent",
                    msg.author_name.as_deref().unwrap_or(&msg.author_id)
                );
                self.run_bill_check().await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Run a scheduled duty and log the outcome to the store.
    pub async fn run_job(&self, kind: JobKind) -> Result<String> {
        let result = match kind {
            JobKind::Rotation => self.run_rotation().await.map(|o| o.to_string()),
            JobKind::BillCheck => self.run_bill_check().await.map(|o| o.to_string()),
            JobKind::BillReminder => self.run_reminder().await.map(|o| o.to_string()),
        };

        let outcome = match &result {
            Ok(summary) => summary.clone(),
            Err(e) => format!("error: {e}"),
        };
        if let Err(e) = self.store.record_run(kind.as_str(), &outcome) {
            tracing::warn!("⚠️ Could not record {kind} run: {e}");
        }
        result
    }

    async fn bill_documents(&self, since: DateTime<Utc>) -> Result<Vec<Attachment>> {
        let bills = self.bills()?;
        let attachments = self
            .channel
            .attachments_since(&bills.channel_id, since)
            .await?;
        let total = attachments.len();
        let documents: Vec<Attachment> = attachments.into_iter().filter(|a| a.is_pdf()).collect();
        tracing::debug!("📎 {} of {} attachment(s) are bills", documents.len(), total);
        Ok(documents)
    }

    async fn read_amount(&self, bytes: Vec<u8>) -> Result<ExtractedAmount> {
        let reader = Arc::clone(&self.reader);
        let pages = tokio::task::spawn_blocking(move || reader.pages(&bytes))
            .await
            .map_err(|e| MucklanError::document(format!("reader task failed: {e}")))??;
        extract(&pages)
    }
}

/// Midnight on the first day of `now`'s month, in `now`'s time zone.
pub fn month_start<Tz: TimeZone>(now: DateTime<Tz>) -> DateTime<Utc> {
    let today = now.date_naive();
    let first = today.with_day(1).unwrap_or(today).and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&first)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| first.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::FixedOffset;
    use mucklan_core::types::{Money, ResidentId};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const CONFIG: &str = r#"
        [chores]
        channel_id = "clean"
        announcement = "Time to clean!"
        assignment_message = "This week: {task}"
        start_counter = 1
        residents = ["r0", "r1", "r2"]
        tasks = ["Kitchen", "Bathroom", "Hallway"]

        [bills]
        channel_id = "bills"
        announce_channel_id = "rent"
        manager_id = "manager"
        reminder_message = "Post the bills!"

        [[bills.policy.groups]]
        name = "Sam and Frida"
        heads = 2
        share = { flat = 3000 }

        [[bills.policy.groups]]
        name = "Madeleine, Ludvig and Elias"
        heads = 3
        share = { formula = { deduction = 6000 } }
    "#;

    #[derive(Default)]
    struct FakeChannel {
        attachments: Vec<Attachment>,
        /// url → bytes; a missing url fails the download.
        files: HashMap<String, Vec<u8>>,
        fail_dm_to: Option<String>,
        /// (target, content); DMs are "dm:<id>".
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeChannel {
        fn with_bill(mut self, filename: &str, text: &str) -> Self {
            let url = format!("https://cdn.test/{filename}");
            self.attachments.push(Attachment {
                id: filename.into(),
                filename: filename.into(),
                url: url.clone(),
                content_type: None,
                size: text.len() as u64,
            });
            self.files.insert(url, text.as_bytes().to_vec());
            self
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatChannel for FakeChannel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send_direct(&self, user: &ResidentId, content: &str) -> Result<()> {
            if self.fail_dm_to.as_deref() == Some(user.as_str()) {
                return Err(MucklanError::channel("DMs closed"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((format!("dm:{user}"), content.to_string()));
            Ok(())
        }

        async fn send_to_channel(&self, channel_id: &str, content: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_string(), content.to_string()));
            Ok(())
        }

        async fn attachments_since(&self, _channel_id: &str, _since: DateTime<Utc>) -> Result<Vec<Attachment>> {
            Ok(self.attachments.clone())
        }

        async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
            self.files
                .get(&attachment.url)
                .cloned()
                .ok_or_else(|| MucklanError::Http(format!("404 {}", attachment.url)))
        }
    }

    /// Treats bytes as UTF-8 text with form feeds between pages.
    struct TextReader;

    impl DocumentReader for TextReader {
        fn pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
            let text = std::str::from_utf8(bytes).map_err(|e| MucklanError::document(e.to_string()))?;
            Ok(text.split('\x0c').map(String::from).collect())
        }
    }

    #[derive(Default, Clone)]
    struct MemoryStore {
        state: Arc<Mutex<Option<RotationState>>>,
        runs: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<Option<RotationState>> {
            Ok(*self.state.lock().unwrap())
        }

        fn save(&self, state: &RotationState) -> Result<()> {
            *self.state.lock().unwrap() = Some(*state);
            Ok(())
        }

        fn record_run(&self, job: &str, outcome: &str) -> Result<()> {
            self.runs
                .lock()
                .unwrap()
                .push((job.to_string(), outcome.to_string()));
            Ok(())
        }
    }

    fn household(channel: FakeChannel) -> (Household, Arc<FakeChannel>, MemoryStore) {
        let config = MucklanConfig::from_toml_str(CONFIG).unwrap();
        let channel = Arc::new(channel);
        let store = MemoryStore::default();
        let household = Household::new(
            config,
            channel.clone(),
            Arc::new(TextReader),
            Box::new(store.clone()),
        );
        (household, channel, store)
    }

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_rotation_uses_start_counter_then_advances() {
        let (household, channel, store) = household(FakeChannel::default());

        let outcome = household.run_rotation().await.unwrap();
        assert_eq!(outcome.delivered, 3);
        assert!(outcome.announced);
        assert_eq!(outcome.rotation.next, RotationState::new(2));
        assert_eq!(*store.state.lock().unwrap(), Some(RotationState::new(2)));

        let sent = channel.sent();
        assert_eq!(sent[0], ("dm:r0".into(), "This week: Bathroom".into()));
        assert_eq!(sent[1], ("dm:r1".into(), "This week: Hallway".into()));
        assert_eq!(sent[2], ("dm:r2".into(), "This week: Kitchen".into()));
        assert_eq!(sent[3], ("clean".into(), "Time to clean!".into()));

        let second = household.run_rotation().await.unwrap();
        assert_eq!(second.rotation.task_for(&"r0".into()), Some("Hallway"));
        assert_eq!(second.rotation.next, RotationState::new(0));
    }

    #[tokio::test]
    async fn test_rotation_saves_before_delivery_failures() {
        let channel = FakeChannel {
            fail_dm_to: Some("r1".into()),
            ..Default::default()
        };
        let (household, channel, store) = household(channel);

        let outcome = household.run_rotation().await.unwrap();
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(*store.state.lock().unwrap(), Some(RotationState::new(2)));
        assert_eq!(channel.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_preview_does_not_advance() {
        let (household, channel, store) = household(FakeChannel::default());
        let rotation = household.preview_rotation().unwrap();
        assert_eq!(rotation.task_for(&"r0".into()), Some("Bathroom"));
        assert!(store.state.lock().unwrap().is_none());
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stale_counter_is_a_config_error() {
        let (household, channel, store) = household(FakeChannel::default());
        *store.state.lock().unwrap() = Some(RotationState::new(7));
        let err = household.run_rotation().await.unwrap_err();
        assert!(err.is_config());
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_bill_check_announces_rent() {
        let channel = FakeChannel::default()
            .with_bill("el.pdf", "Faktura\x0cSumma att betala   1000.00\n")
            .with_bill("hyra.pdf", "TOTALSUMMA 8000,00 kr");
        let (household, channel, _) = household(channel);

        let outcome = household.bill_check_since(since()).await.unwrap();
        let BillCheckOutcome::Announced(breakdown) = outcome else {
            panic!("expected an announcement");
        };
        assert_eq!(breakdown.total, Money::from_major(9000));
        assert_eq!(breakdown.share("Sam and Frida").unwrap().per_head, Money::from_major(3000));
        assert_eq!(
            breakdown.share("Madeleine, Ludvig and Elias").unwrap().per_head,
            Money::from_major(1000)
        );

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "rent");
        assert!(sent[0].1.contains("```9000.00 Kr```"));
    }

    #[tokio::test]
    async fn test_non_pdf_attachments_are_ignored() {
        let mut channel = FakeChannel::default().with_bill("el.pdf", "Summa att betala 100.00");
        channel.attachments.push(Attachment {
            id: "img".into(),
            filename: "kitchen.jpg".into(),
            url: "https://cdn.test/kitchen.jpg".into(),
            content_type: Some("image/jpeg".into()),
            size: 10,
        });
        let (household, _, _) = household(channel);

        let outcome = household.bill_check_since(since()).await.unwrap();
        assert!(matches!(outcome, BillCheckOutcome::Announced(ref b) if b.bills.len() == 1));
    }

    #[tokio::test]
    async fn test_unreadable_bill_alerts_manager() {
        let channel = FakeChannel::default()
            .with_bill("el.pdf", "Summa att betala 100.00")
            .with_bill("scan.pdf", "no numbers here");
        let (household, channel, _) = household(channel);

        let outcome = household.bill_check_since(since()).await.unwrap();
        assert_eq!(outcome, BillCheckOutcome::Unreadable(vec!["scan.pdf".into()]));

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "dm:manager");
        assert!(sent[0].1.contains("scan.pdf"));
    }

    #[tokio::test]
    async fn test_download_failure_aborts() {
        let mut channel = FakeChannel::default().with_bill("el.pdf", "Summa att betala 100.00");
        channel.files.clear();
        let (household, channel, _) = household(channel);

        let err = household.bill_check_since(since()).await.unwrap_err();
        assert!(matches!(err, MucklanError::Http(_)));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_no_bills_skips_announcement() {
        let (household, channel, _) = household(FakeChannel::default());
        let outcome = household.bill_check_since(since()).await.unwrap();
        assert_eq!(outcome, BillCheckOutcome::NoBills);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reminder_only_without_bills() {
        let (household, channel, _) = household(FakeChannel::default());
        assert_eq!(household.reminder_since(since()).await.unwrap(), ReminderOutcome::Sent);
        assert_eq!(channel.sent(), vec![("dm:manager".to_string(), "Post the bills!".to_string())]);

        let (household, channel, _) = household_with_bill();
        assert_eq!(
            household.reminder_since(since()).await.unwrap(),
            ReminderOutcome::NotNeeded { bills: 1 }
        );
        assert!(channel.sent().is_empty());
    }

    fn household_with_bill() -> (Household, Arc<FakeChannel>, MemoryStore) {
        household(FakeChannel::default().with_bill("el.pdf", "Summa att betala 100.00"))
    }

    #[tokio::test]
    async fn test_handle_message() {
        let (household, channel, _) = household_with_bill();
        let mut msg = IncomingMessage {
            channel_id: "general".into(),
            author_id: "r0".into(),
            author_name: Some("madde".into()),
            content: "/hus räkningar".into(),
            from_bot: true,
            timestamp: Utc::now(),
        };
        assert_eq!(household.handle_message(&msg).await.unwrap(), None);

        msg.from_bot = false;
        msg.content = "hej".into();
        assert_eq!(household.handle_message(&msg).await.unwrap(), None);

        msg.content = "/hus räkningar".into();
        let outcome = household.handle_message(&msg).await.unwrap();
        assert!(matches!(outcome, Some(BillCheckOutcome::Announced(_))));
        assert_eq!(channel.sent()[0].0, "rent");
    }

    #[tokio::test]
    async fn test_run_job_records_outcome() {
        let (household, _, store) = household(FakeChannel::default());
        let summary = household.run_job(JobKind::Rotation).await.unwrap();
        assert!(summary.contains("3/3"));

        let runs = store.runs.lock().unwrap().clone();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "rotation");
    }

    #[tokio::test]
    async fn test_missing_section_is_config_error() {
        let config = MucklanConfig::from_toml_str(
            r#"
            [chores]
            channel_id = "clean"
            residents = ["r0"]
            tasks = ["Kitchen"]
        "#,
        )
        .unwrap();
        let household = Household::new(
            config,
            Arc::new(FakeChannel::default()),
            Arc::new(TextReader),
            Box::new(MemoryStore::default()),
        );
        let err = household.run_reminder().await.unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2026, 3, 21, 10, 30, 0).unwrap();
        assert_eq!(month_start(now), since());

        let cet = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = cet.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2026, 2, 28, 22, 0, 0).unwrap());
    }
}
