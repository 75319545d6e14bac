use crate::action::RewriteAction;
use crate::error::Result;
use crate::storage::{load_json_or_default, save_json, update_json};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Number of response times kept for the running average
pub const RESPONSE_SAMPLES: usize = 100;

/// Usage counters across all rewrites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub grammar_checks: u64,
    pub rephrases: u64,
    pub summarizations: u64,
    pub translations: u64,
    pub total_words: u64,
    pub response_times_ms: Vec<u64>,
}

impl UsageStats {
    pub fn record(&mut self, action: RewriteAction, original: &str, elapsed: Duration) {
        match action {
            RewriteAction::Grammar => self.grammar_checks += 1,
            RewriteAction::Rephrase => self.rephrases += 1,
            RewriteAction::Summarize => self.summarizations += 1,
            RewriteAction::Translate => self.translations += 1,
        }
        self.total_words += count_words(original) as u64;

        self.response_times_ms.push(elapsed.as_millis() as u64);
        if self.response_times_ms.len() > RESPONSE_SAMPLES {
            let excess = self.response_times_ms.len() - RESPONSE_SAMPLES;
            self.response_times_ms.drain(..excess);
        }
    }

    pub fn count(&self, action: RewriteAction) -> u64 {
        match action {
            RewriteAction::Grammar => self.grammar_checks,
            RewriteAction::Rephrase => self.rephrases,
            RewriteAction::Summarize => self.summarizations,
            RewriteAction::Translate => self.translations,
        }
    }

    pub fn total_rewrites(&self) -> u64 {
        RewriteAction::ALL.iter().map(|a| self.count(*a)).sum()
    }

    /// Mean of the retained response times, `None` before the first rewrite
    pub fn average_response_ms(&self) -> Option<u64> {
        if self.response_times_ms.is_empty() {
            return None;
        }
        let sum: u64 = self.response_times_ms.iter().sum();
        Some(sum / self.response_times_ms.len() as u64)
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

enum Backing {
    File(PathBuf),
    Memory(Mutex<UsageStats>),
}

pub struct StatsStore {
    backing: Backing,
}

impl StatsStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(UsageStats::default())),
        }
    }

    pub fn load(&self) -> Result<UsageStats> {
        match &self.backing {
            Backing::File(path) => load_json_or_default(path),
            Backing::Memory(stats) => Ok(lock(stats).clone()),
        }
    }

    pub fn record(&self, action: RewriteAction, original: &str, elapsed: Duration) -> Result<()> {
        self.update(|stats| stats.record(action, original, elapsed))
    }

    pub fn clear(&self) -> Result<()> {
        self.update(|stats| *stats = UsageStats::default())
    }

    pub fn export(&self, path: &Path) -> Result<UsageStats> {
        let stats = self.load()?;
        save_json(path, &stats)?;
        Ok(stats)
    }

    fn update(&self, change: impl FnOnce(&mut UsageStats)) -> Result<()> {
        match &self.backing {
            Backing::File(path) => update_json(path, change),
            Backing::Memory(stats) => {
                change(&mut lock(stats));
                Ok(())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
