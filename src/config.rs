//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default so a partial (or empty) file is valid. Secrets (the
//! webhook URL) are referenced by env-var name in the config and resolved at
//! runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use tracing::warn;

use crate::humanize::delay::DelayStrategy;
use crate::types::{ItemId, ItemPolicy};

/// Marker in the enabled-seller set meaning "every seller is disabled".
pub const ALL_DISABLED_SENTINEL: &str = "__ALL_DISABLED__";

/// Headroom kept between the market timeout and the step time budget.
pub const BUDGET_MARGIN_MS: u64 = 1_000;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pricing: PricingConfig,
    pub delays: DelayConfig,
    pub humanization: HumanizationConfig,
    pub scheduler: SchedulerConfig,
    pub sellers: SellerConfig,
    pub safety: SafetyConfig,
    pub notifications: NotificationConfig,
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// How the candidate price is shaped.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    #[default]
    Standard,
    /// Round the candidate down to a tidy figure.
    CleanNumbers,
    /// Match the lowest listing instead of undercutting.
    PoliteMatch,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UndercutMode {
    #[default]
    Fixed,
    Percentage,
}

/// Per-item override as written in the config file.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ItemRule {
    pub id: u32,
    #[serde(flatten)]
    pub policy: ItemPolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PricingConfig {
    pub mode: PricingMode,
    pub undercut_mode: UndercutMode,
    /// Gil for `Fixed`, percent for `Percentage`.
    pub undercut_amount: u32,
    /// Largest allowed drop from the current price, in percent.
    pub max_cut_pct: Decimal,
    pub undercut_self: bool,
    pub outlier_protection: bool,
    pub match_stack_size: bool,
    pub max_stack_size: u32,
    /// Only compare HQ items against HQ listings.
    pub hq_only: bool,
    pub items: Vec<ItemRule>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            mode: PricingMode::Standard,
            undercut_mode: UndercutMode::Fixed,
            undercut_amount: 1,
            max_cut_pct: dec!(100),
            undercut_self: false,
            outlier_protection: true,
            match_stack_size: true,
            max_stack_size: 99,
            hq_only: true,
            items: Vec::new(),
        }
    }
}

impl PricingConfig {
    /// Policy for an item, if one is configured.
    pub fn policy_for(&self, item: ItemId) -> Option<&ItemPolicy> {
        self.items.iter().find(|r| r.id == item.0).map(|r| &r.policy)
    }

    /// All configured policies keyed by item.
    pub fn policies(&self) -> BTreeMap<ItemId, ItemPolicy> {
        self.items.iter().map(|r| (ItemId(r.id), r.policy.clone())).collect()
    }

    /// Insert or replace the policy for an item.
    pub fn set_policy(&mut self, item: ItemId, policy: ItemPolicy) {
        match self.items.iter_mut().find(|r| r.id == item.0) {
            Some(rule) => rule.policy = policy,
            None => self.items.push(ItemRule { id: item.0, policy }),
        }
    }

    fn validate(&mut self) {
        let clamped = match self.undercut_mode {
            UndercutMode::Fixed => self.undercut_amount.max(1),
            UndercutMode::Percentage => self.undercut_amount.clamp(1, 99),
        };
        if clamped != self.undercut_amount {
            warn!(
                configured = self.undercut_amount,
                clamped,
                mode = ?self.undercut_mode,
                "Undercut amount out of range, clamped"
            );
            self.undercut_amount = clamped;
        }
        self.max_cut_pct = self.max_cut_pct.clamp(Decimal::ZERO, dec!(100));
        self.max_stack_size = self.max_stack_size.max(1);
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DelayConfig {
    pub strategy: DelayStrategy,
    /// How long the comparison window stays open before pricing.
    pub keep_open_min_ms: u64,
    pub keep_open_max_ms: u64,
    /// Extra wait before querying an item with no cached price.
    pub settle_ms: u64,
    /// Give up on a market result after this long.
    pub price_timeout_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            strategy: DelayStrategy::Uniform,
            keep_open_min_ms: 1000,
            keep_open_max_ms: 2000,
            settle_ms: 500,
            price_timeout_ms: 4000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HumanizationConfig {
    /// Reaction/typing delays, micro-breaks, cognitive state.
    pub advanced: bool,
    /// Slow down as the session goes on.
    pub fatigue: bool,
    pub misclicks: bool,
    /// Open suspected bait listings before pricing.
    pub inspect_bait: bool,
    /// Per item processed this session.
    pub fatigue_step_ms: u64,
}

impl Default for HumanizationConfig {
    fn default() -> Self {
        Self {
            advanced: false,
            fatigue: true,
            misclicks: false,
            inspect_bait: false,
            fatigue_step_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long a single step may keep answering "not yet".
    pub time_budget_ms: u64,
    pub abort_on_timeout: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { time_budget_ms: 10_000, abort_on_timeout: true }
    }
}

// ---------------------------------------------------------------------------
// Sellers, safety, notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SellerConfig {
    /// Empty means every seller is enabled.
    pub enabled: HashSet<String>,
}

impl SellerConfig {
    pub fn all_disabled(&self) -> bool {
        self.enabled.contains(ALL_DISABLED_SENTINEL)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        if self.all_disabled() {
            return false;
        }
        self.enabled.is_empty() || self.enabled.contains(name)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SafetyConfig {
    /// Abort when a direct message arrives mid-sweep.
    pub stop_on_message: bool,
    /// Abort when the pointer moves while automation runs.
    pub pointer_guard: bool,
    pub pointer_threshold: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self { stop_on_message: true, pointer_guard: true, pointer_threshold: 50.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Name of the env var holding the webhook URL.
    pub webhook_url_env: String,
    pub username: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url_env: "PINCH_WEBHOOK_URL".to_string(),
            username: "Pinch".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(contents)?;
        config.validate();
        Ok(config)
    }

    /// Clamp values into the ranges the engine supports.
    pub fn validate(&mut self) {
        self.pricing.validate();
        if self.delays.keep_open_min_ms > self.delays.keep_open_max_ms {
            std::mem::swap(&mut self.delays.keep_open_min_ms, &mut self.delays.keep_open_max_ms);
        }
        if self.scheduler.time_budget_ms == 0 {
            self.scheduler.time_budget_ms = SchedulerConfig::default().time_budget_ms;
        }
        // The market wait must time out as a skip before the step budget
        // aborts the whole chain.
        let floor = self.delays.price_timeout_ms + BUDGET_MARGIN_MS;
        if self.scheduler.time_budget_ms < floor {
            warn!(
                configured = self.scheduler.time_budget_ms,
                price_timeout_ms = self.delays.price_timeout_ms,
                raised_to = floor,
                "Step time budget below market timeout, raised"
            );
            self.scheduler.time_budget_ms = floor;
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
