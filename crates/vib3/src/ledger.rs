//! # Deployment ledger
//!
//! Successful deployments are appended to a JSON document that maps
//! provider names onto their deployment records, oldest first.
//!
//! Only the most recent records are retained for each provider: once the
//! limit is exceeded, the oldest records are evicted.

use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::PathBuf,
};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    document::{self, DocumentError},
    providers::{Environment, Provider},
};

/// Format used to render deployment timestamps in the local time zone.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single successful deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DeploymentRecord {
    /// Provider the deployment was made to.
    pub provider: Provider,

    /// Deployed environment.
    #[serde(rename = "env")]
    pub environment: Environment,

    /// Public URL of the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bucket that holds the deployed assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Region of the provisioned resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Deployment time, in seconds since the Unix epoch.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

/// Deserialize a timestamp, accepting fractional seconds written by older tools.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(f64::deserialize(deserializer)? as i64)
}

/// Deployment records grouped by provider.
pub(crate) type LedgerDocument = BTreeMap<Provider, Vec<DeploymentRecord>>;

/// Ledger document as stored on disk, before the records are validated.
type StoredDocument = BTreeMap<Provider, Vec<Map<String, Value>>>;

/// Capped deployment history persisted as a single JSON document.
///
/// Appends are read-modify-write cycles which assume a single writer.
pub(crate) struct Ledger {
    /// Document path.
    path: PathBuf,

    /// Max count of records retained per provider.
    limit: usize,
}

impl Ledger {
    /// Create new [`Ledger`] backed by the file at `path`.
    pub(crate) fn new(path: PathBuf, limit: usize) -> Self {
        Self { path, limit }
    }

    /// Load all deployment records.
    ///
    /// Records without a `provider` field belong to the provider they are listed under.
    pub(crate) fn load(&self) -> Result<LedgerDocument, DocumentError> {
        let stored: StoredDocument = document::load(&self.path)?;

        stored
            .into_iter()
            .map(|(provider, records)| -> Result<_, DocumentError> {
                let records = records
                    .into_iter()
                    .map(|mut record| {
                        record
                            .entry("provider")
                            .or_insert_with(|| Value::from(provider.as_str()));

                        serde_json::from_value(Value::Object(record))
                    })
                    .collect::<Result<Vec<DeploymentRecord>, _>>()?;

                Ok((provider, records))
            })
            .collect()
    }

    /// Append a new record, evicting the oldest records of the same provider
    /// above the retention limit.
    pub(crate) fn append(&self, record: DeploymentRecord) -> Result<(), DocumentError> {
        let mut ledger = self.load()?;

        let records = ledger.entry(record.provider).or_default();
        records.push(record);

        let evicted = records.len().saturating_sub(self.limit);
        records.drain(..evicted);

        debug!(evicted, "deployment appended");

        document::store(&self.path, &ledger)
    }

    /// Render recorded deployments, either of a single `provider` or of all of them.
    pub(crate) fn report(
        &self,
        provider: Option<Provider>,
        out: &mut impl Write,
    ) -> Result<(), DocumentError> {
        if !self.path.exists() {
            writeln!(out, "No deployments found.")?;
            return Ok(());
        }

        let ledger = self.load()?;

        match provider {
            Some(provider) => match ledger.get(&provider).filter(|records| !records.is_empty()) {
                None => writeln!(out, "No {provider} deployments found.")?,
                Some(records) => {
                    writeln!(out, "\n{} Deployments:", provider.as_str().to_uppercase())?;

                    for record in records {
                        write_record(out, record)?;

                        if provider == Provider::Aws {
                            writeln!(
                                out,
                                "  Bucket: {}",
                                record.bucket.as_deref().unwrap_or("N/A")
                            )?;
                        }

                        writeln!(out)?;
                    }
                }
            },
            None => {
                writeln!(out, "All Deployments:")?;

                for (provider, records) in &ledger {
                    writeln!(out, "\n{}:", provider.as_str().to_uppercase())?;

                    for record in records {
                        write_record(out, record)?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Write the lines shared by every rendered deployment record.
fn write_record(out: &mut impl Write, record: &DeploymentRecord) -> io::Result<()> {
    writeln!(out, "- Environment: {}", record.environment)?;
    writeln!(out, "  URL: {}", record.url.as_deref().unwrap_or("N/A"))?;
    writeln!(out, "  Deployed: {}", format_timestamp(record.timestamp))
}

/// Render a Unix timestamp in the local time zone.
fn format_timestamp(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|time| time.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
