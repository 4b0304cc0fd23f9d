use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::scoring::QualityAssessment;
use crate::util::{ensure_directory, now_utc_string};

const CACHE_SCHEMA_VERSION: &str = "1";

pub struct AssessmentCache {
    connection: Mutex<Connection>,
}

impl AssessmentCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_directory(parent)?;
            }
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open cache database: {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("failed to open in-memory cache")?;
        ensure_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn get(
        &self,
        fingerprint: &str,
        backend: &str,
        policy_checksum: &str,
    ) -> Result<Option<QualityAssessment>> {
        let connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let payload = connection
            .query_row(
                "SELECT assessment_json FROM assessments
                 WHERE fingerprint = ?1 AND backend = ?2 AND policy_checksum = ?3",
                params![fingerprint, backend, policy_checksum],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("failed to query assessment cache")?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let assessment = serde_json::from_str::<QualityAssessment>(&payload)
            .with_context(|| format!("failed to decode cached assessment {fingerprint}"))?;
        debug!(fingerprint = %fingerprint, backend = %backend, "assessment cache hit");
        Ok(Some(assessment))
    }

    pub fn put(&self, policy_checksum: &str, assessment: &QualityAssessment) -> Result<bool> {
        if !assessment.is_scored() {
            return Ok(false);
        }
        let payload =
            serde_json::to_string(assessment).context("failed to serialize assessment")?;
        let connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        connection
            .execute(
                "INSERT INTO assessments(fingerprint, backend, policy_checksum, assessment_json, stored_at)
                 VALUES(?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(fingerprint, backend, policy_checksum) DO UPDATE SET
                   assessment_json=excluded.assessment_json,
                   stored_at=excluded.stored_at",
                params![
                    assessment.fingerprint,
                    assessment.backend,
                    policy_checksum,
                    payload,
                    now_utc_string()
                ],
            )
            .context("failed to store assessment")?;
        Ok(true)
    }

    pub fn entry_count(&self) -> Result<usize> {
        let connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let count = connection
            .query_row("SELECT COUNT(*) FROM assessments", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("failed to count cached assessments")?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assessments (
              fingerprint TEXT NOT NULL,
              backend TEXT NOT NULL,
              policy_checksum TEXT NOT NULL,
              assessment_json TEXT NOT NULL,
              stored_at TEXT NOT NULL,
              PRIMARY KEY (fingerprint, backend, policy_checksum)
            );
            ",
        )
        .context("failed to create cache schema")?;
    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES('cache_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [CACHE_SCHEMA_VERSION],
        )
        .context("failed to record cache schema version")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::scoring::grading::GradingPolicy;
    use crate::scoring::heuristic::HeuristicBackend;
    use crate::scoring::{QualityScorer, ScorerLimits};

    const TEXT: &str = "Timeline: detected at 10:02 by an alert. Root cause: a bad deploy. \
        Action items: add a canary stage, owner SRE, due next sprint.";

    fn scored() -> QualityAssessment {
        let grading = GradingPolicy::default();
        QualityScorer::new(&HeuristicBackend, &grading, ScorerLimits::default()).assess(TEXT)
    }

    #[test]
    fn scored_assessments_round_trip_by_key() {
        let cache = AssessmentCache::in_memory().expect("cache");
        let assessment = scored();
        assert!(assessment.is_scored());

        assert!(cache.put("policy-a", &assessment).expect("put"));
        let hit = cache
            .get(&assessment.fingerprint, &assessment.backend, "policy-a")
            .expect("get")
            .expect("cached assessment");
        assert_eq!(hit, assessment);

        assert!(
            cache
                .get(&assessment.fingerprint, &assessment.backend, "policy-b")
                .expect("get")
                .is_none()
        );
        assert!(
            cache
                .get(&assessment.fingerprint, "remote:gpt", "policy-a")
                .expect("get")
                .is_none()
        );
    }

    #[test]
    fn failed_assessments_are_not_stored() {
        let cache = AssessmentCache::in_memory().expect("cache");
        let failed = QualityAssessment::failed("heuristic", "abc".to_string(), "timed out");
        assert!(!cache.put("policy", &failed).expect("put"));
        assert_eq!(cache.entry_count().expect("count"), 0);
    }

    #[test]
    fn file_cache_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache").join("assessments.sqlite");
        let assessment = scored();

        {
            let cache = AssessmentCache::open(&path).expect("open cache");
            cache.put("policy", &assessment).expect("put");
            cache.put("policy", &assessment).expect("upsert");
            assert_eq!(cache.entry_count().expect("count"), 1);
        }

        let reopened = AssessmentCache::open(&path).expect("reopen cache");
        assert!(
            reopened
                .get(&assessment.fingerprint, &assessment.backend, "policy")
                .expect("get")
                .is_some()
        );
    }
}
