use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::{ArticleDiagnostic, TARGET_RUNNER};

/// An input record that could not be decoded into an `Article`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedArticle {
    /// The record's `article_id`, when it carried a string one
    pub article_id: Option<String>,
    /// `line N` for JSON Lines, `record N` for a JSON array (1-based)
    pub origin: String,
    pub reason: String,
}

impl RejectedArticle {
    pub fn to_diagnostic(&self) -> ArticleDiagnostic {
        ArticleDiagnostic {
            article_id: self
                .article_id
                .clone()
                .unwrap_or_else(|| self.origin.clone()),
            reason: format!("{}: {}", self.origin, self.reason),
        }
    }
}

/// Decoded articles plus the records that were skipped.
#[derive(Debug, Clone, Default)]
pub struct ArticleBatch {
    pub articles: Vec<Article>,
    pub rejected: Vec<RejectedArticle>,
}

/// Reads an article batch from a JSON array or a JSON Lines file.
///
/// The format is chosen from the first non-whitespace character; blank lines
/// in JSON Lines input are skipped. A record that is not a valid article is
/// kept out of `articles` and reported in `rejected`; only unreadable files
/// and malformed JSON arrays fail the whole batch.
pub fn read_articles(path: &Path) -> Result<ArticleBatch> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read articles from {}", path.display()))?;

    let batch = if content.trim_start().starts_with('[') {
        let records: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON array in {}", path.display()))?;
        decode_records(
            records
                .into_iter()
                .enumerate()
                .map(|(i, record)| (format!("record {}", i + 1), Ok(record))),
        )
    } else {
        decode_records(
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| (format!("line {}", i + 1), serde_json::from_str(line))),
        )
    };

    info!(
        target: TARGET_RUNNER,
        "Loaded {} articles from {} ({} records rejected)",
        batch.articles.len(),
        path.display(),
        batch.rejected.len()
    );
    Ok(batch)
}

fn decode_records<I>(records: I) -> ArticleBatch
where
    I: Iterator<Item = (String, serde_json::Result<Value>)>,
{
    let mut batch = ArticleBatch::default();
    for (origin, record) in records {
        let (article_id, decoded) = match record {
            Ok(value) => {
                let article_id = value
                    .get("article_id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (article_id, serde_json::from_value::<Article>(value))
            }
            Err(err) => (None, Err(err)),
        };
        match decoded {
            Ok(article) => batch.articles.push(article),
            Err(err) => {
                warn!(
                    target: TARGET_RUNNER,
                    "Skipping {} ({}): {}",
                    origin,
                    article_id.as_deref().unwrap_or("no article_id"),
                    err
                );
                batch.rejected.push(RejectedArticle {
                    article_id,
                    origin,
                    reason: err.to_string(),
                });
            }
        }
    }
    batch
}

/// Writes one JSON object per line, creating parent directories as needed.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    debug!(
        target: TARGET_RUNNER,
        "Wrote {} records to {}",
        records.len(),
        path.display()
    );
    Ok(())
}
