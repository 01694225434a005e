//! Reconstruction settings.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::threading::ParentResolver;

/// Default number of pages fetched at the same time.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Options for one thread reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Maximum number of page fetches in flight
    pub fetch_concurrency: usize,
    /// Link replies whose only citation is a mid-text mention
    pub attach_weak_mentions: bool,
    /// Flag replies that are new since the last visit and update the watermark
    pub mark_new_replies: bool,
    /// Query parameter carrying the page number in thread URLs
    pub page_query_param: String,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            attach_weak_mentions: false,
            mark_new_replies: true,
            page_query_param: "p".to_string(),
        }
    }
}

impl ThreadConfig {
    /// Denser trees: weak mentions are attached too.
    pub fn linked() -> Self {
        Self {
            attach_weak_mentions: true,
            ..Self::default()
        }
    }

    /// One page fetch at a time.
    pub fn sequential() -> Self {
        Self {
            fetch_concurrency: 1,
            ..Self::default()
        }
    }

    /// Read settings from `FLOORTREE_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fetch_concurrency: env_usize(
                "FLOORTREE_FETCH_CONCURRENCY",
                defaults.fetch_concurrency,
            )
            .max(1),
            attach_weak_mentions: env_bool(
                "FLOORTREE_ATTACH_WEAK_MENTIONS",
                defaults.attach_weak_mentions,
            ),
            mark_new_replies: env_bool("FLOORTREE_MARK_NEW_REPLIES", defaults.mark_new_replies),
            page_query_param: env_string("FLOORTREE_PAGE_PARAM", &defaults.page_query_param),
        }
    }

    /// Parse and validate settings from JSON. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.page_query_param.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "page_query_param must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the fetch concurrency.
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    /// Enable or disable weak mention linking.
    pub fn with_weak_mentions(mut self, attach: bool) -> Self {
        self.attach_weak_mentions = attach;
        self
    }

    /// Enable or disable unseen marking.
    pub fn with_new_reply_marking(mut self, mark: bool) -> Self {
        self.mark_new_replies = mark;
        self
    }

    /// Resolver matching these settings.
    pub fn resolver(&self) -> ParentResolver {
        ParentResolver::new(self.attach_weak_mentions)
    }
}
