//! Docket import.
//!
//! Cases are authored outside the server as a JSON docket and loaded with
//! `aios-tribunal import-docket <file>`. Importing the same docket twice
//! leaves the database unchanged.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::stats::StatsSeed;
use crate::storage::{Case, CaseArgument, CaseStore, CouncilState, ReactionLedger, SeedStore};

/// Top-level docket file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Docket {
    /// Season applied to cases that don't name one.
    #[serde(default = "default_season")]
    pub season: i64,
    pub cases: Vec<DocketCase>,
    /// Optional council ticker state.
    #[serde(default)]
    pub council: Option<CouncilState>,
}

fn default_season() -> i64 {
    1
}

fn default_status() -> String {
    "active".to_string()
}

/// One authored case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocketCase {
    /// Explicit id; derived from season and case number when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub case_no: String,
    pub title: String,
    pub prompt: String,
    pub option_a_label: String,
    pub option_b_label: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub season: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seed: Option<StatsSeed>,
    #[serde(default)]
    pub arguments: Vec<DocketArgument>,
}

/// One authored counter-argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocketArgument {
    pub key: String,
    pub text: String,
}

/// Counts of what an import wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub cases: usize,
    pub seeds: usize,
    pub arguments: usize,
    pub council: bool,
}

impl Docket {
    /// Parse a docket from JSON text.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(|e| AppError::Docket {
            message: format!("Invalid docket JSON: {}", e),
        })
    }

    /// Read and parse a docket file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Docket {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json(&raw)
    }

    /// Check every case before anything is written.
    pub fn validate(&self) -> AppResult<()> {
        for case in &self.cases {
            let fail = |reason: &str| AppError::Docket {
                message: format!("case {}: {}", case.case_no, reason),
            };

            if case.case_no.trim().is_empty() {
                return Err(AppError::Docket {
                    message: "case with empty case_no".to_string(),
                });
            }
            if case.title.trim().is_empty() {
                return Err(fail("empty title"));
            }
            if case.option_a_label.trim().is_empty() || case.option_b_label.trim().is_empty() {
                return Err(fail("both option labels are required"));
            }
            if let Some(seed) = &case.seed {
                if seed.base_participants < 0 {
                    return Err(fail("base_participants must be >= 0"));
                }
                if !(0..=100).contains(&seed.base_split_a) {
                    return Err(fail("base_split_a must be within 0-100"));
                }
                if !seed.drift_per_min.is_finite() {
                    return Err(fail("drift_per_min must be finite"));
                }
            }
            if case.arguments.iter().any(|a| a.key.trim().is_empty()) {
                return Err(fail("argument with empty key"));
            }
        }
        Ok(())
    }

    /// Build the stored case for a docket entry.
    ///
    /// `position` staggers default creation times so the last listed active
    /// case becomes the current one.
    pub fn to_case(&self, entry: &DocketCase, position: usize, base: DateTime<Utc>) -> Case {
        let season = entry.season.unwrap_or(self.season);
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| format!("s{}-case-{}", season, entry.case_no));

        Case {
            id,
            case_no: entry.case_no.clone(),
            title: entry.title.clone(),
            prompt: entry.prompt.clone(),
            option_a_label: entry.option_a_label.clone(),
            option_b_label: entry.option_b_label.clone(),
            status: entry.status.clone(),
            season,
            created_at: entry
                .created_at
                .unwrap_or_else(|| base + Duration::seconds(position as i64)),
        }
    }
}

/// Write a validated docket into storage.
pub async fn import_docket<S>(storage: &S, docket: &Docket, now: DateTime<Utc>) -> AppResult<ImportSummary>
where
    S: CaseStore + SeedStore + ReactionLedger,
{
    docket.validate()?;

    let mut summary = ImportSummary::default();

    for (position, entry) in docket.cases.iter().enumerate() {
        let case = docket.to_case(entry, position, now);
        storage.upsert_case(&case).await?;
        summary.cases += 1;

        if let Some(seed) = &entry.seed {
            storage.upsert_seed(&case.id, seed).await?;
            summary.seeds += 1;
        }

        for argument in &entry.arguments {
            storage
                .upsert_argument(&CaseArgument::new(&case.id, &argument.key, &argument.text))
                .await?;
            summary.arguments += 1;
        }
    }

    if let Some(council) = &docket.council {
        storage.save_council(council).await?;
        summary.council = true;
    }

    info!(
        cases = summary.cases,
        seeds = summary.seeds,
        arguments = summary.arguments,
        council = summary.council,
        "Docket imported"
    );

    Ok(summary)
}
