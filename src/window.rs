use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::info;

use crate::article::Article;
use crate::config::MAX_WINDOW_DAYS;
use crate::TARGET_RUNNER;

/// Half-open time range `[end - days, end)` an article batch is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleWindow {
    pub end: DateTime<Utc>,
    pub days: u32,
    start: DateTime<Utc>,
}

impl ArticleWindow {
    /// Window of `days` days ending (exclusively) at `end`.
    ///
    /// # Returns
    /// * `Err` - If `days` is 0, above `MAX_WINDOW_DAYS`, or reaches before the
    ///   earliest representable timestamp
    pub fn new(end: DateTime<Utc>, days: u32) -> Result<Self> {
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err(anyhow!(
                "Window length must be between 1 and {} days, got {}",
                MAX_WINDOW_DAYS,
                days
            ));
        }
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| anyhow!("Window of {} days before {} is out of range", days, end))?;
        Ok(Self { end, days, start })
    }

    /// Window covering `days` days up to and including the `period` date.
    ///
    /// # Arguments
    /// * `period` - A `YYYY-MM-DD` date; the window ends at the following midnight UTC
    /// * `days` - Window length, at least 1
    pub fn from_period(period: &str, days: u32) -> Result<Self> {
        let date = NaiveDate::parse_from_str(period.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid period date '{}', expected YYYY-MM-DD", period))?;
        let next_midnight = date
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| anyhow!("Period date '{}' is out of range", period))?;
        Self::new(Utc.from_utc_datetime(&next_midnight), days)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn contains(&self, published_at: DateTime<Utc>) -> bool {
        self.start() <= published_at && published_at < self.end
    }

    /// Keeps the articles published inside the window, in their original order.
    pub fn select(&self, articles: Vec<Article>) -> Vec<Article> {
        let total = articles.len();
        let selected: Vec<Article> = articles
            .into_iter()
            .filter(|a| self.contains(a.published_at))
            .collect();
        info!(
            target: TARGET_RUNNER,
            "Window {} .. {}: {} of {} articles selected",
            self.start(),
            self.end,
            selected.len(),
            total
        );
        selected
    }
}
