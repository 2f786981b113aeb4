// SPDX-License-Identifier: MIT

//! File-backed request counter
//!
//! Tracks how many questions have been run against the configured limit.
//! The counter lives in a small JSON file so it survives restarts; every
//! read-modify-write holds an async mutex so concurrent server requests
//! cannot lose increments.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::adk::error::UsageError;
use crate::multihop::config::{LimitPeriod, UsageSettings};

const HISTORY_LIMIT: usize = 100;
const QUESTION_PREVIEW: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub request_number: u64,
    pub question: String,
}

/// On-disk counter document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterData {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default = "default_max")]
    pub max_requests: u64,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub period: LimitPeriod,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

fn default_max() -> u64 {
    UsageSettings::default().max_requests
}

impl CounterData {
    fn new(max_requests: u64, period: LimitPeriod, now: DateTime<Local>) -> Self {
        Self {
            total_requests: 0,
            max_requests,
            last_updated: now.to_rfc3339(),
            period,
            bucket: bucket_for(period, now),
            history: Vec::new(),
        }
    }

    fn remaining(&self) -> u64 {
        self.max_requests.saturating_sub(self.total_requests)
    }

    /// Start a fresh count when a monthly bucket has rolled over
    fn roll(&mut self, now: DateTime<Local>) -> bool {
        let current = bucket_for(self.period, now);
        if self.bucket == current {
            return false;
        }
        if self.period == LimitPeriod::Monthly {
            log::info!(
                "Usage bucket rolled from {:?} to {:?}, resetting count",
                self.bucket,
                current
            );
            self.total_requests = 0;
        }
        self.bucket = current;
        true
    }
}

/// `global:YYYY-MM` for monthly limits
pub fn bucket_for(period: LimitPeriod, now: DateTime<Local>) -> Option<String> {
    match period {
        LimitPeriod::Lifetime => None,
        LimitPeriod::Monthly => Some(format!("global:{}", now.format("%Y-%m"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Active,
    Exhausted,
    NotInitialized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub status: UsageStatus,
    pub total_requests: u64,
    pub max_requests: u64,
    pub remaining: u64,
    pub percentage_used: f64,
    pub last_updated: Option<String>,
    pub bucket: Option<String>,
    pub history_count: usize,
}

/// Outcome of [`RequestCounter::increment`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Increment {
    pub accepted: bool,
    pub count: u64,
    pub message: String,
}

pub struct RequestCounter {
    path: PathBuf,
    default_max: u64,
    period: LimitPeriod,
    lock: Mutex<()>,
}

impl RequestCounter {
    pub fn new(path: impl Into<PathBuf>, default_max: u64, period: LimitPeriod) -> Self {
        Self {
            path: path.into(),
            default_max,
            period,
            lock: Mutex::new(()),
        }
    }

    pub fn from_settings(settings: &UsageSettings) -> Self {
        Self::new(
            settings.counter_file.clone(),
            settings.max_requests,
            settings.period,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the counter file if missing; returns whether it was created
    pub async fn initialize(&self, max_requests: u64) -> Result<bool, UsageError> {
        let _guard = self.lock.lock().await;
        self.init_locked(max_requests).await
    }

    /// `(current, max, remaining)`
    pub async fn count(&self) -> Result<(u64, u64, u64), UsageError> {
        let _guard = self.lock.lock().await;
        let data = self.load_current().await?;
        Ok((data.total_requests, data.max_requests, data.remaining()))
    }

    /// Whether another request may run, with a user-facing message
    pub async fn check(&self) -> Result<(bool, String), UsageError> {
        let (current, max, remaining) = self.count().await?;
        if current >= max {
            Ok((false, exhausted_message(current, max)))
        } else {
            Ok((true, format!("{} requests remaining", remaining)))
        }
    }

    /// Count one request, refusing once the limit is reached
    pub async fn increment(&self, question: &str) -> Result<Increment, UsageError> {
        let _guard = self.lock.lock().await;
        let now = Local::now();
        let mut data = self.load_current().await?;

        if data.total_requests >= data.max_requests {
            log::warn!("Request limit reached: {}", data.max_requests);
            return Ok(Increment {
                accepted: false,
                count: data.total_requests,
                message: exhausted_message(data.total_requests, data.max_requests),
            });
        }

        data.total_requests += 1;
        data.last_updated = now.to_rfc3339();
        data.history.push(HistoryEntry {
            timestamp: now.to_rfc3339(),
            request_number: data.total_requests,
            question: preview(question),
        });
        if data.history.len() > HISTORY_LIMIT {
            let excess = data.history.len() - HISTORY_LIMIT;
            data.history.drain(..excess);
        }
        self.save(&data).await?;

        let message = format!(
            "Request logged: {}/{} ({} remaining)",
            data.total_requests,
            data.max_requests,
            data.remaining()
        );
        log::info!("{}", message);
        Ok(Increment {
            accepted: true,
            count: data.total_requests,
            message,
        })
    }

    /// Zero the count and clear history
    pub async fn reset(&self) -> Result<(), UsageError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load_current().await?;
        data.total_requests = 0;
        data.history.clear();
        data.last_updated = Local::now().to_rfc3339();
        self.save(&data).await?;
        log::info!("Request counter has been reset to 0");
        Ok(())
    }

    pub async fn set_max(&self, max_requests: u64) -> Result<(), UsageError> {
        let _guard = self.lock.lock().await;
        if self.init_locked(max_requests).await? {
            return Ok(());
        }
        let mut data = self.load_current().await?;
        data.max_requests = max_requests;
        data.last_updated = Local::now().to_rfc3339();
        self.save(&data).await?;
        log::info!("Maximum requests updated to: {}", max_requests);
        Ok(())
    }

    pub async fn stats(&self) -> Result<UsageStats, UsageError> {
        let _guard = self.lock.lock().await;
        if !self.path.exists() {
            return Ok(UsageStats {
                status: UsageStatus::NotInitialized,
                total_requests: 0,
                max_requests: 0,
                remaining: 0,
                percentage_used: 0.0,
                last_updated: None,
                bucket: None,
                history_count: 0,
            });
        }

        let mut data = self.load().await?;
        data.period = self.period;
        data.roll(Local::now());
        let percentage = if data.max_requests > 0 {
            let raw = data.total_requests as f64 / data.max_requests as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(UsageStats {
            status: if data.total_requests >= data.max_requests {
                UsageStatus::Exhausted
            } else {
                UsageStatus::Active
            },
            total_requests: data.total_requests,
            max_requests: data.max_requests,
            remaining: data.remaining(),
            percentage_used: percentage,
            last_updated: Some(data.last_updated),
            bucket: data.bucket,
            history_count: data.history.len(),
        })
    }

    async fn init_locked(&self, max_requests: u64) -> Result<bool, UsageError> {
        if self.path.exists() {
            return Ok(false);
        }
        let data = CounterData::new(max_requests, self.period, Local::now());
        self.save(&data).await?;
        log::info!(
            "Request counter initialized at {} (max {})",
            self.path.display(),
            max_requests
        );
        Ok(true)
    }

    /// Load, creating the file if needed, with the bucket brought up to date
    async fn load_current(&self) -> Result<CounterData, UsageError> {
        self.init_locked(self.default_max).await?;
        let mut data = self.load().await?;
        data.period = self.period;
        if data.roll(Local::now()) {
            self.save(&data).await?;
        }
        Ok(data)
    }

    async fn load(&self) -> Result<CounterData, UsageError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&raw).map_err(|e| UsageError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn save(&self, data: &CounterData) -> Result<(), UsageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(data).map_err(|e| UsageError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn exhausted_message(current: u64, max: u64) -> String {
    format!("API Exhausted: {}/{} requests used", current, max)
}

fn preview(question: &str) -> String {
    if question.is_empty() {
        "N/A".to_string()
    } else {
        question.chars().take(QUESTION_PREVIEW).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn counter(dir: &TempDir, max: u64) -> RequestCounter {
        RequestCounter::new(dir.path().join("counter.json"), max, LimitPeriod::Lifetime)
    }

    #[tokio::test]
    async fn test_initialize_creates_file_once() {
        let dir = TempDir::new().unwrap();
        let counter = counter(&dir, 10);

        assert!(counter.initialize(5).await.unwrap());
        assert!(!counter.initialize(7).await.unwrap());
        assert_eq!(counter.count().await.unwrap(), (0, 5, 5));
    }

    #[tokio::test]
    async fn test_increment_until_exhausted() {
        let dir = TempDir::new().unwrap();
        let counter = counter(&dir, 2);

        let first = counter.increment("Who wrote Dune?").await.unwrap();
        assert!(first.accepted);
        assert_eq!(first.message, "Request logged: 1/2 (1 remaining)");

        counter.increment("").await.unwrap();
        let refused = counter.increment("third").await.unwrap();
        assert!(!refused.accepted);
        assert_eq!(refused.message, "API Exhausted: 2/2 requests used");

        let (ok, message) = counter.check().await.unwrap();
        assert!(!ok);
        assert_eq!(message, "API Exhausted: 2/2 requests used");
    }

    #[tokio::test]
    async fn test_history_is_truncated_and_capped() {
        let dir = TempDir::new().unwrap();
        let counter = counter(&dir, 1000);
        let long = "x".repeat(250);

        for _ in 0..105 {
            counter.increment(&long).await.unwrap();
        }
        counter.increment("").await.unwrap();

        let raw = std::fs::read_to_string(counter.path()).unwrap();
        let data: CounterData = serde_json::from_str(&raw).unwrap();
        assert_eq!(data.total_requests, 106);
        assert_eq!(data.history.len(), 100);
        assert_eq!(data.history[0].request_number, 7);
        assert_eq!(data.history[0].question.len(), 100);
        assert_eq!(data.history.last().unwrap().question, "N/A");
    }

    #[tokio::test]
    async fn test_reset_and_set_max() {
        let dir = TempDir::new().unwrap();
        let counter = counter(&dir, 3);
        counter.increment("q").await.unwrap();

        counter.reset().await.unwrap();
        counter.set_max(50).await.unwrap();

        assert_eq!(counter.count().await.unwrap(), (0, 50, 50));
        assert_eq!(counter.stats().await.unwrap().history_count, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = TempDir::new().unwrap();
        let counter = counter(&dir, 3);
        assert_eq!(
            counter.stats().await.unwrap().status,
            UsageStatus::NotInitialized
        );

        counter.increment("q").await.unwrap();
        let stats = counter.stats().await.unwrap();
        assert_eq!(stats.status, UsageStatus::Active);
        assert_eq!(stats.percentage_used, 33.33);
        assert_eq!(stats.remaining, 2);
        assert_eq!(stats.history_count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let counter = counter(&dir, 3);
        std::fs::write(counter.path(), "not json").unwrap();

        let err = counter.count().await.unwrap_err();
        assert!(matches!(err, UsageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(counter(&dir, 100));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.increment(&format!("q{}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(counter.count().await.unwrap().0, 20);
    }

    #[test]
    fn test_monthly_bucket_rolls_over() {
        let march = Local.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
        let april = Local.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();

        assert_eq!(bucket_for(LimitPeriod::Monthly, march).as_deref(), Some("global:2026-03"));
        assert_eq!(bucket_for(LimitPeriod::Lifetime, march), None);

        let mut data = CounterData::new(10, LimitPeriod::Monthly, march);
        data.total_requests = 7;
        assert!(!data.roll(march));
        assert_eq!(data.total_requests, 7);

        assert!(data.roll(april));
        assert_eq!(data.total_requests, 0);
        assert_eq!(data.bucket.as_deref(), Some("global:2026-04"));
    }

    #[test]
    fn test_lifetime_never_rolls() {
        let now = Local.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
        let mut data = CounterData::new(10, LimitPeriod::Lifetime, now);
        data.total_requests = 4;
        assert!(!data.roll(now + chrono::Duration::days(60)));
        assert_eq!(data.total_requests, 4);
    }
}
