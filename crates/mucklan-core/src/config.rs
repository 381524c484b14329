//! Mucklan configuration system.
//!
//! Every recognized option is a typed field; unknown keys are rejected when
//! the file is parsed. Semantic checks (parallel rotation lists, policy
//! table) run in [`MucklanConfig::validate`], which every loader calls.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{MucklanError, Result};
use crate::types::{Money, ResidentId};

/// Environment variable that overrides `discord.token`.
pub const TOKEN_ENV: &str = "MUCKLAN_DISCORD_TOKEN";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MucklanConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub chores: Option<ChoresConfig>,
    #[serde(default)]
    pub bills: Option<BillsConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl MucklanConfig {
    /// Load config from the default path (~/.mucklan/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Err(MucklanError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MucklanError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MucklanError::config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the household logic relies on.
    pub fn validate(&self) -> Result<()> {
        if self.chores.is_none() && self.bills.is_none() {
            return Err(MucklanError::config(
                "nothing to do: configure [chores], [bills] or both",
            ));
        }
        if let Some(chores) = &self.chores {
            chores.validate()?;
        }
        if let Some(bills) = &self.bills {
            bills.validate()?;
        }
        if self.scheduler.check_interval_secs == 0 {
            return Err(MucklanError::config(
                "scheduler.check_interval_secs must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Bot token, with the environment taking precedence over the file.
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.discord.token.clone()).filter(|t| !t.trim().is_empty()))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Mucklan home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mucklan")
    }
}

/// Chat platform connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    /// Messages starting with this prefix are treated as commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

fn default_command_prefix() -> String { "/hus".into() }

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            command_prefix: default_command_prefix(),
        }
    }
}

/// Weekly cleaning rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChoresConfig {
    /// Channel that gets the "rotation happened" announcement.
    pub channel_id: String,
    #[serde(default = "default_clean_announcement")]
    pub announcement: String,
    /// Direct message template; `{task}` is replaced with the task label.
    #[serde(default = "default_assignment_message")]
    pub assignment_message: String,
    #[serde(default = "default_rotation_schedule")]
    pub schedule: String,
    /// Counter used when no persisted state exists yet.
    #[serde(default)]
    pub start_counter: usize,
    pub residents: Vec<ResidentId>,
    pub tasks: Vec<String>,
}

fn default_clean_announcement() -> String {
    "New week, new chores! Check your DMs for this week's area.".into()
}
fn default_assignment_message() -> String { "{task}".into() }
fn default_rotation_schedule() -> String { "0 10 * * 0".into() }

impl ChoresConfig {
    pub fn validate(&self) -> Result<()> {
        if self.residents.is_empty() || self.tasks.is_empty() {
            return Err(MucklanError::EmptyRotation);
        }
        if self.residents.len() != self.tasks.len() {
            return Err(MucklanError::RotationMismatch {
                residents: self.residents.len(),
                tasks: self.tasks.len(),
            });
        }
        if self.start_counter >= self.tasks.len() {
            return Err(MucklanError::CounterOutOfRange {
                counter: self.start_counter,
                tasks: self.tasks.len(),
            });
        }
        let unique: HashSet<&ResidentId> = self.residents.iter().collect();
        if unique.len() != self.residents.len() {
            return Err(MucklanError::config("chores.residents contains duplicates"));
        }
        if self.channel_id.trim().is_empty() {
            return Err(MucklanError::config("chores.channel_id is empty"));
        }
        Ok(())
    }
}

/// Monthly bill check and rent announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillsConfig {
    /// Channel where invoices are posted as attachments.
    pub channel_id: String,
    /// Channel that receives the rent announcement.
    pub announce_channel_id: String,
    /// Resident responsible for posting the bills.
    pub manager_id: ResidentId,
    #[serde(default = "default_reminder_message")]
    pub reminder_message: String,
    #[serde(default = "default_announce_schedule")]
    pub announce_schedule: String,
    #[serde(default = "default_reminder_schedule")]
    pub reminder_schedule: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub policy: RentPolicy,
}

fn default_reminder_message() -> String {
    "Reminder: this month's bills have not been posted yet.".into()
}
fn default_announce_schedule() -> String { "0 15 25 * *".into() }
fn default_reminder_schedule() -> String { "0 13 20-25 * *".into() }
fn default_currency() -> String { "Kr".into() }

impl BillsConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("bills.channel_id", &self.channel_id),
            ("bills.announce_channel_id", &self.announce_channel_id),
            ("bills.manager_id", &self.manager_id.0),
        ] {
            if value.trim().is_empty() {
                return Err(MucklanError::config(format!("{key} is empty")));
            }
        }
        self.policy.validate()?;
        let flat = self.policy.flat_total()?;
        for (group, deduction) in self.policy.deduction_mismatches()? {
            tracing::warn!(
                "⚠️ Payer group '{}' deducts {} but flat groups cover {}",
                group,
                deduction,
                flat
            );
        }
        Ok(())
    }
}

/// Cost-sharing table: who pays what out of the monthly total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RentPolicy {
    pub groups: Vec<PayerGroup>,
}

/// A named set of payers sharing one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayerGroup {
    pub name: String,
    /// Number of people in the group; formula shares are divided by it.
    pub heads: u32,
    pub share: ShareRule,
}

/// How a payer group's per-head amount is computed. Amounts are whole currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ShareRule {
    /// Fixed fee per head.
    Flat(i64),
    /// `ceil((total - deduction) / heads)` per head.
    Formula {
        #[serde(default)]
        deduction: i64,
    },
}

impl RentPolicy {
    /// Look up a payer group by name.
    pub fn group(&self, name: &str) -> Result<&PayerGroup> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| MucklanError::UnknownPayerGroup(name.to_string()))
    }

    /// Sum of everything flat groups pay.
    pub fn flat_total(&self) -> Result<Money> {
        let mut total = Money::ZERO;
        for group in &self.groups {
            if let ShareRule::Flat(fee) = group.share {
                total = Money::checked_from_major(fee)
                    .and_then(|f| f.checked_mul(i64::from(group.heads)))
                    .and_then(|t| total.checked_add(t))
                    .ok_or_else(|| {
                        MucklanError::config(format!(
                            "flat fees overflow at payer group '{}'",
                            group.name
                        ))
                    })?;
            }
        }
        Ok(total)
    }

    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(MucklanError::config("bills.policy.groups is empty"));
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(MucklanError::config("payer group with empty name"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(MucklanError::config(format!(
                    "duplicate payer group '{}'",
                    group.name
                )));
            }
            if group.heads == 0 {
                return Err(MucklanError::config(format!(
                    "payer group '{}' has zero heads",
                    group.name
                )));
            }
            if let ShareRule::Formula { deduction } = group.share {
                Money::checked_from_major(deduction).ok_or_else(|| {
                    MucklanError::config(format!(
                        "payer group '{}' deduction {deduction} is out of range",
                        group.name
                    ))
                })?;
            }
        }
        self.flat_total()?;
        Ok(())
    }

    /// Formula groups whose deduction differs from what the flat groups cover.
    /// Legal, but usually a leftover from an old policy.
    pub fn deduction_mismatches(&self) -> Result<Vec<(&str, Money)>> {
        let flat = self.flat_total()?;
        Ok(self
            .groups
            .iter()
            .filter_map(|g| match g.share {
                ShareRule::Formula { deduction } if deduction != 0 => {
                    Money::checked_from_major(deduction)
                        .filter(|d| *d != flat)
                        .map(|d| (g.name.as_str(), d))
                }
                _ => None,
            })
            .collect())
    }
}

/// Where the rotation counter (and job log) lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    #[serde(default = "default_state_path")]
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Json,
    Sqlite,
}

fn default_state_path() -> String { "~/.mucklan/state.json".into() }

impl StateConfig {
    /// State path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            path: default_state_path(),
        }
    }
}

/// Scheduler loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// A run that starts later than this after its slot is skipped.
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_secs: u64,
}

fn default_check_interval() -> u64 { 20 }
fn default_misfire_grace() -> u64 { 300 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            misfire_grace_secs: default_misfire_grace(),
        }
    }
}
