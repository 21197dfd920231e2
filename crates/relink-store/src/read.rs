//! Replay read path.

use log::debug;
use relink_trace::PackageFile;
use rusqlite::{OptionalExtension, Transaction};
use serde::Serialize;

use crate::argument::Argument;
use crate::error::{OpContext, StoreResult};
use crate::fingerprint::Fingerprint;
use crate::store::CacheStore;

/// Everything needed to rebuild one linker call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedInvocation {
    pub invocation_id: i64,
    pub captured_at: String,
    /// Arguments in position order
    pub arguments: Vec<Argument>,
    pub entry_artifact: Option<Artifact>,
    /// Associated archives, sorted by package then file
    pub artifacts: Vec<Artifact>,
    /// Non-`packagefile` manifest lines, sorted
    pub manifest_lines: Vec<String>,
}

/// A package archive linked by an invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub package: String,
    pub file: String,
}

impl CachedInvocation {
    /// Manifest content: one `packagefile` line per artifact, then the
    /// stored free-form lines.
    pub fn manifest(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .map(|a| PackageFile::new(a.package.as_str(), a.file.as_str()).to_line())
            .chain(self.manifest_lines.iter().cloned())
            .collect()
    }
}

impl CacheStore {
    /// Look up the invocation cached for `fingerprint`.
    ///
    /// All queries run inside one transaction so the pieces come from the
    /// same snapshot. `Ok(None)` is a cache miss.
    pub fn lookup(&mut self, fingerprint: &Fingerprint) -> StoreResult<Option<CachedInvocation>> {
        let canonical = fingerprint.tags().canonical()?;
        let tx = self.conn.transaction().op("begin lookup transaction")?;

        let found = find_invocation(&tx, fingerprint.program(), &canonical)?;
        let Some((invocation_id, captured_at, entry_artifact)) = found else {
            debug!("no cached invocation for {}", fingerprint);
            return Ok(None);
        };

        let invocation = CachedInvocation {
            invocation_id,
            captured_at,
            arguments: load_arguments(&tx, invocation_id)?,
            entry_artifact,
            artifacts: load_artifacts(&tx, invocation_id)?,
            manifest_lines: load_manifest_lines(&tx, invocation_id)?,
        };
        tx.commit().op("end lookup transaction")?;

        debug!(
            "loaded invocation {} for {}: {} arguments, {} artifacts, {} manifest lines",
            invocation_id,
            fingerprint,
            invocation.arguments.len(),
            invocation.artifacts.len(),
            invocation.manifest_lines.len()
        );
        Ok(Some(invocation))
    }
}

fn find_invocation(
    tx: &Transaction<'_>,
    program: &str,
    canonical_tags: &str,
) -> StoreResult<Option<(i64, String, Option<Artifact>)>> {
    tx.query_row(
        "SELECT li.invocation_id, li.captured_at, a.package, a.file
         FROM link_invocation li
         JOIN tag_set USING (tag_set_id)
         LEFT JOIN artifact a ON a.artifact_id = li.entry_artifact_id
         WHERE li.program = ?1 AND tag_set.tags = ?2",
        [program, canonical_tags],
        |row| {
            let package: Option<String> = row.get(2)?;
            let file: Option<String> = row.get(3)?;
            let entry = match (package, file) {
                (Some(package), Some(file)) => Some(Artifact { package, file }),
                _ => None,
            };
            Ok((row.get(0)?, row.get(1)?, entry))
        },
    )
    .optional()
    .op("query link invocation")
}

fn load_arguments(tx: &Transaction<'_>, invocation_id: i64) -> StoreResult<Vec<Argument>> {
    let mut stmt = tx
        .prepare("SELECT position, kind, token FROM argument WHERE invocation_id = ?1 ORDER BY position")
        .op("prepare argument query")?;
    let rows = stmt
        .query_map([invocation_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })
        .op("query arguments")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .op("read arguments")?;

    rows.into_iter()
        .map(|(position, kind, token)| Argument::from_row(kind, token, position))
        .collect()
}

fn load_artifacts(tx: &Transaction<'_>, invocation_id: i64) -> StoreResult<Vec<Artifact>> {
    let mut stmt = tx
        .prepare(
            "SELECT a.package, a.file
             FROM artifact a
             JOIN invocation_artifact ia USING (artifact_id)
             WHERE ia.invocation_id = ?1
             ORDER BY a.package, a.file",
        )
        .op("prepare artifact query")?;
    let artifacts = stmt
        .query_map([invocation_id], |row| {
            Ok(Artifact {
                package: row.get(0)?,
                file: row.get(1)?,
            })
        })
        .op("query artifacts")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .op("read artifacts")?;
    Ok(artifacts)
}

fn load_manifest_lines(tx: &Transaction<'_>, invocation_id: i64) -> StoreResult<Vec<String>> {
    let mut stmt = tx
        .prepare("SELECT line FROM manifest_line WHERE invocation_id = ?1 ORDER BY line")
        .op("prepare manifest query")?;
    let lines = stmt
        .query_map([invocation_id], |row| row.get(0))
        .op("query manifest lines")?
        .collect::<rusqlite::Result<Vec<String>>>()
        .op("read manifest lines")?;
    Ok(lines)
}
