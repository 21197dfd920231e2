//! Capture write path: one transaction per captured build.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use log::{debug, info, warn};
use relink_trace::{classify_line, LinkCommand, ManifestEntry, ParsedTrace};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::argument::Argument;
use crate::error::{OpContext, StoreError, StoreResult};
use crate::fingerprint::Fingerprint;
use crate::store::CacheStore;
use crate::upsert::{ARTIFACT, LINK_INVOCATION, TAG_SET};

/// What to do with the children of an invocation that is captured again.
///
/// The invocation row itself is always reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecapturePolicy {
    /// Keep existing rows and add the new ones: artifact links and manifest
    /// lines accumulate. The link command itself must match the stored one,
    /// otherwise the capture fails with [`StoreError::CaptureConflict`].
    #[default]
    Append,
    /// Delete the invocation's arguments, artifact links and manifest lines
    /// before inserting the new capture.
    Replace,
}

impl FromStr for RecapturePolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(RecapturePolicy::Append),
            "replace" => Ok(RecapturePolicy::Replace),
            other => Err(StoreError::InvalidPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for RecapturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecapturePolicy::Append => write!(f, "append"),
            RecapturePolicy::Replace => write!(f, "replace"),
        }
    }
}

/// What one link command contributed to the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationSummary {
    pub invocation_id: i64,
    /// Whether the invocation row was created by this capture
    pub created: bool,
    pub arguments: usize,
    pub artifacts: usize,
    pub manifest_lines: usize,
    /// File of the entry artifact, when the last operand matched one
    pub entry_artifact: Option<String>,
}

/// Result of [`CacheStore::record_capture`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub fingerprint: Fingerprint,
    pub tag_set_id: i64,
    pub invocations: Vec<InvocationSummary>,
}

impl CacheStore {
    /// Persist every link command of `trace` under `fingerprint`.
    ///
    /// Runs in a single immediate transaction: either every row of the
    /// capture becomes visible, or none does.
    pub fn record_capture(
        &mut self,
        fingerprint: &Fingerprint,
        trace: &ParsedTrace,
        policy: RecapturePolicy,
    ) -> StoreResult<CaptureSummary> {
        let canonical = fingerprint.tags().canonical()?;
        let captured_at = Utc::now().to_rfc3339();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .op("begin capture transaction")?;

        let (tag_set_id, _) = TAG_SET.upsert(&tx, &[&canonical], &[])?;

        let mut cleared: HashSet<i64> = HashSet::new();
        let mut invocations = Vec::with_capacity(trace.link_commands.len());
        for line in &trace.link_commands {
            let (invocation_id, created) = LINK_INVOCATION.upsert(
                &tx,
                &[&fingerprint.program(), &tag_set_id],
                &[&captured_at],
            )?;
            if !created {
                tx.execute(
                    "UPDATE link_invocation SET captured_at = ?1 WHERE invocation_id = ?2",
                    params![captured_at, invocation_id],
                )
                .op("update capture time")?;
                if policy == RecapturePolicy::Replace && cleared.insert(invocation_id) {
                    clear_children(&tx, invocation_id)?;
                }
            }

            let command = LinkCommand::parse(line);
            if !created {
                check_same_command(&tx, invocation_id, fingerprint, &command)?;
            }
            let summary = record_invocation(&tx, invocation_id, created, &command, trace)?;
            info!(
                "cached link invocation {} for {}: {} arguments, {} artifacts, {} manifest lines",
                invocation_id, fingerprint, summary.arguments, summary.artifacts, summary.manifest_lines
            );
            invocations.push(summary);
        }

        tx.commit().op("commit capture transaction")?;

        Ok(CaptureSummary {
            fingerprint: fingerprint.clone(),
            tag_set_id,
            invocations,
        })
    }
}

fn record_invocation(
    tx: &Transaction<'_>,
    invocation_id: i64,
    created: bool,
    command: &LinkCommand,
    trace: &ParsedTrace,
) -> StoreResult<InvocationSummary> {
    let arguments = insert_arguments(tx, invocation_id, command)?;

    let manifest: &[String] = match command.importcfg() {
        Some(key) => match trace.staged_file(key) {
            Some(content) => content,
            None => {
                warn!("manifest {} was not staged in the trace", key);
                &[]
            }
        },
        None => {
            warn!("link command has no -importcfg argument");
            &[]
        }
    };

    let mut artifacts = 0;
    let mut manifest_lines = 0;
    for manifest_line in manifest {
        match classify_line(manifest_line)? {
            ManifestEntry::PackageFile(pf) => {
                let (artifact_id, _) = ARTIFACT.upsert(tx, &[&pf.file], &[&pf.package])?;
                tx.execute(
                    "INSERT INTO invocation_artifact (invocation_id, artifact_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                    params![invocation_id, artifact_id],
                )
                .op("link artifact to invocation")?;
                artifacts += 1;
            }
            ManifestEntry::Other(text) => {
                tx.execute(
                    "INSERT INTO manifest_line (invocation_id, line) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                    params![invocation_id, text],
                )
                .op("insert manifest line")?;
                manifest_lines += 1;
            }
        }
    }

    let entry_artifact = tag_entry_artifact(tx, invocation_id, command)?;

    Ok(InvocationSummary {
        invocation_id,
        created,
        arguments,
        artifacts,
        manifest_lines,
        entry_artifact,
    })
}

/// Fail unless the stored argument vector of `invocation_id` is empty or
/// equal to `command` (the main package compared by its file path).
fn check_same_command(
    tx: &Transaction<'_>,
    invocation_id: i64,
    fingerprint: &Fingerprint,
    command: &LinkCommand,
) -> StoreResult<()> {
    let entry_file: Option<String> = tx
        .query_row(
            "SELECT a.file FROM link_invocation li JOIN artifact a ON a.artifact_id = li.entry_artifact_id WHERE li.invocation_id = ?1",
            [invocation_id],
            |row| row.get(0),
        )
        .optional()
        .op("load stored entry artifact")?;

    let mut stmt = tx
        .prepare("SELECT kind, token, position FROM argument WHERE invocation_id = ?1 ORDER BY position")
        .op("prepare stored argument query")?;
    let rows = stmt
        .query_map([invocation_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .op("query stored arguments")?;

    let mut stored = Vec::new();
    for row in rows {
        let (kind, token, position) = row.op("read stored argument")?;
        let arg = match Argument::from_row(kind, token, position)? {
            Argument::MainPackage => match &entry_file {
                Some(file) => Argument::Literal(file.clone()),
                None => Argument::MainPackage,
            },
            arg => arg,
        };
        stored.push(arg);
    }
    if stored.is_empty() {
        return Ok(());
    }

    let observed: Vec<Argument> = command.tokens.iter().map(Argument::from).collect();
    if stored != observed {
        return Err(StoreError::CaptureConflict {
            program: fingerprint.program().to_string(),
            invocation_id,
        });
    }
    debug!("invocation {} already holds this link command", invocation_id);
    Ok(())
}

/// Insert one row per token; a position that already has a row keeps it.
fn insert_arguments(
    tx: &Transaction<'_>,
    invocation_id: i64,
    command: &LinkCommand,
) -> StoreResult<usize> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO argument (invocation_id, position, kind, token) VALUES (?1, ?2, ?3, ?4) ON CONFLICT DO NOTHING",
        )
        .op("prepare argument insert")?;

    for (position, token) in command.tokens.iter().enumerate() {
        let arg = Argument::from(token);
        let inserted = stmt
            .execute(params![invocation_id, position as i64, arg.kind(), arg.token()])
            .op("insert argument")?;
        if inserted == 0 {
            debug!("argument {} of invocation {} already stored", position, invocation_id);
        }
    }

    Ok(command.len())
}

/// Mark the artifact named by the last operand as the entry artifact and
/// turn the literal argument rows holding its path into `MainPackage`.
fn tag_entry_artifact(
    tx: &Transaction<'_>,
    invocation_id: i64,
    command: &LinkCommand,
) -> StoreResult<Option<String>> {
    let Some(last) = command.last_literal() else {
        return Ok(None);
    };

    let artifact_id: Option<i64> = tx
        .query_row(
            "SELECT artifact_id FROM artifact WHERE file = ?1",
            [last],
            |row| row.get(0),
        )
        .optional()
        .op("find entry artifact")?;
    let Some(artifact_id) = artifact_id else {
        debug!("last operand {} is not a manifest artifact", last);
        return Ok(None);
    };

    tx.execute(
        "UPDATE link_invocation SET entry_artifact_id = ?1 WHERE invocation_id = ?2",
        params![artifact_id, invocation_id],
    )
    .op("set entry artifact")?;
    tx.execute(
        "UPDATE argument SET kind = ?1, token = '' WHERE invocation_id = ?2 AND kind = ?3 AND token = ?4",
        params![Argument::MAIN_PACKAGE, invocation_id, Argument::LITERAL, last],
    )
    .op("mark main package argument")?;

    Ok(Some(last.to_string()))
}

fn clear_children(tx: &Transaction<'_>, invocation_id: i64) -> StoreResult<()> {
    debug!("clearing previous capture of invocation {}", invocation_id);
    tx.execute(
        "UPDATE link_invocation SET entry_artifact_id = NULL WHERE invocation_id = ?1",
        [invocation_id],
    )
    .op("clear entry artifact")?;
    for (sql, op) in [
        ("DELETE FROM argument WHERE invocation_id = ?1", "clear arguments"),
        ("DELETE FROM invocation_artifact WHERE invocation_id = ?1", "clear artifact links"),
        ("DELETE FROM manifest_line WHERE invocation_id = ?1", "clear manifest lines"),
    ] {
        tx.execute(sql, [invocation_id]).op(op)?;
    }
    Ok(())
}
