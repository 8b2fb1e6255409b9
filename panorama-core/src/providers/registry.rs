//! Process-wide provider health registry.
//!
//! One record per configured provider, shared by every concurrent session.
//! Each record sits behind its own mutex so health updates are atomic
//! per provider and sessions never contend on unrelated entries. Entries
//! are fixed once the registry is shared; only counters and disable state
//! change afterwards.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PanoramaConfig;
use crate::types::ProviderCategory;

/// Health state of one provider.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    pub name: String,
    pub category: ProviderCategory,
    pub consecutive_failures: u32,
    pub disabled_until: Option<Instant>,
    pub last_error: Option<String>,
}

impl ProviderRecord {
    fn new(name: String, category: ProviderCategory) -> Self {
        Self {
            name,
            category,
            consecutive_failures: 0,
            disabled_until: None,
            last_error: None,
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        match self.disabled_until {
            Some(until) => now >= until,
            None => true,
        }
    }
}

struct RegistryEntry {
    name: String,
    category: ProviderCategory,
    record: Mutex<ProviderRecord>,
}

impl RegistryEntry {
    fn lock(&self) -> MutexGuard<'_, ProviderRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializable view of one provider's health, for operator inspection.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub category: ProviderCategory,
    pub consecutive_failures: u32,
    /// Seconds until the provider is eligible again, if disabled.
    pub disabled_for_secs: Option<u64>,
    pub last_error: Option<String>,
}

/// Registry of provider health records.
pub struct ProviderRegistry {
    failure_threshold: u32,
    cooldown: Duration,
    entries: Vec<RegistryEntry>,
}

impl ProviderRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            entries: Vec::new(),
        }
    }

    /// Build a registry covering every configured provider.
    pub fn from_config(config: &PanoramaConfig) -> Self {
        let mut registry = Self::new(
            config.fallback.failure_threshold,
            Duration::from_secs(config.fallback.cooldown_secs),
        );
        for entry in &config.providers.research {
            registry.register(&entry.name, ProviderCategory::Research);
        }
        for entry in &config.providers.ai {
            registry.register(&entry.name, ProviderCategory::Ai);
        }
        registry
    }

    /// Register a provider. Takes `&mut self`, so registration is only
    /// possible before the registry is shared.
    pub fn register(&mut self, name: &str, category: ProviderCategory) {
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            category,
            record: Mutex::new(ProviderRecord::new(name.to_string(), category)),
        });
    }

    fn entry(&self, category: ProviderCategory, name: &str) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.category == category && e.name == name)
    }

    /// Whether a provider is currently eligible for selection.
    /// Unknown providers are never eligible.
    pub fn is_available(&self, category: ProviderCategory, name: &str) -> bool {
        match self.entry(category, name) {
            Some(entry) => entry.lock().is_available(Instant::now()),
            None => false,
        }
    }

    /// Reset the failure counter after a successful call.
    pub fn record_success(&self, category: ProviderCategory, name: &str) {
        if let Some(entry) = self.entry(category, name) {
            let mut record = entry.lock();
            if record.consecutive_failures > 0 {
                debug!(provider = name, %category, "Provider recovered");
            }
            record.consecutive_failures = 0;
            record.disabled_until = None;
            record.last_error = None;
        }
    }

    /// Count a failure; crossing the threshold disables the provider for
    /// the cooldown period.
    pub fn record_failure(&self, category: ProviderCategory, name: &str, error: &str) {
        if let Some(entry) = self.entry(category, name) {
            let mut record = entry.lock();
            record.consecutive_failures += 1;
            record.last_error = Some(error.to_string());
            if record.consecutive_failures >= self.failure_threshold {
                warn!(
                    provider = name,
                    %category,
                    failures = record.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Provider disabled after consecutive failures"
                );
                record.disabled_until = Some(Instant::now() + self.cooldown);
            }
        }
    }

    /// Clear failure counters and disabled state for one provider, or for
    /// every provider in the category when `name` is `None`.
    ///
    /// Only the per-entry lock is taken; an in-flight call is unaffected
    /// and its own record update lands after the reset.
    pub fn reset(&self, category: ProviderCategory, name: Option<&str>) {
        for entry in &self.entries {
            if entry.category != category {
                continue;
            }
            if let Some(wanted) = name {
                if entry.name != wanted {
                    continue;
                }
            }
            let mut record = entry.lock();
            record.consecutive_failures = 0;
            record.disabled_until = None;
            record.last_error = None;
            info!(provider = %entry.name, %category, "Provider health reset");
        }
    }

    /// Current consecutive failure count, 0 for unknown providers.
    pub fn consecutive_failures(&self, category: ProviderCategory, name: &str) -> u32 {
        self.entry(category, name)
            .map(|e| e.lock().consecutive_failures)
            .unwrap_or(0)
    }

    /// Snapshot of every record for operator inspection.
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let now = Instant::now();
        self.entries
            .iter()
            .map(|entry| {
                let record = entry.lock();
                let disabled_for_secs = record.disabled_until.and_then(|until| {
                    if until > now {
                        Some(until.duration_since(now).as_secs())
                    } else {
                        None
                    }
                });
                ProviderHealth {
                    name: record.name.clone(),
                    category: record.category,
                    consecutive_failures: record.consecutive_failures,
                    disabled_for_secs,
                    last_error: record.last_error.clone(),
                }
            })
            .collect()
    }
}
