//! Workspace backups.
//!
//! A bundle is a zip holding a `VACUUM INTO` snapshot of the planner database plus a manifest
//! with its SHA-256. Restores never write over the live database until the incoming file has been
//! staged next to it and opened as a planner database; a rejected file leaves the workspace as it
//! was.

use anyhow::{anyhow, bail, Context};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE: &str = "guidance.sqlite3";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/guidance.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
pub const BUNDLE_FORMAT_V1: &str = "guidance-workspace-v1";
pub const PLAIN_SQLITE_FORMAT: &str = "sqlite3";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// Tables a file must carry before it may replace a workspace database. Later tables
/// (`plan_commits`, `settings`) are created on open.
const PLANNER_TABLES: [&str; 4] = ["subjects", "topics", "weekly_slots", "topic_progress"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCounts {
    pub subjects: i64,
    pub topics: i64,
    pub slots: i64,
    pub progress_rows: i64,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
    pub counts: WorkspaceCounts,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub counts: WorkspaceCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Bundle,
    SqliteFile,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn sniff(path: &Path) -> anyhow::Result<SourceKind> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut head = Vec::with_capacity(SQLITE_MAGIC.len());
    (&mut f)
        .take(SQLITE_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .context("failed to read file signature")?;
    if head.starts_with(ZIP_MAGIC) {
        Ok(SourceKind::Bundle)
    } else if head == SQLITE_MAGIC {
        Ok(SourceKind::SqliteFile)
    } else {
        bail!(
            "{} is neither a workspace bundle nor a SQLite database",
            path.to_string_lossy()
        )
    }
}

fn count_planner_rows(conn: &Connection) -> anyhow::Result<WorkspaceCounts> {
    let mut counts = [0i64; PLANNER_TABLES.len()];
    for (slot, table) in counts.iter_mut().zip(PLANNER_TABLES) {
        let present: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |r| r.get(0),
            )
            .optional()
            .context("failed to read database schema")?;
        if present.is_none() {
            bail!("not a planner database: table {} is missing", table);
        }
        *slot = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .with_context(|| format!("failed to count {}", table))?;
    }
    Ok(WorkspaceCounts {
        subjects: counts[0],
        topics: counts[1],
        slots: counts[2],
        progress_rows: counts[3],
    })
}

/// Opens `path` read-only and checks it is an intact planner database.
fn inspect_database(path: &Path) -> anyhow::Result<WorkspaceCounts> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let check: String = conn
        .query_row("PRAGMA quick_check", [], |r| r.get(0))
        .context("database integrity check failed")?;
    if check != "ok" {
        bail!("database integrity check failed: {}", check);
    }
    count_planner_rows(&conn)
}

fn snapshot_database(db_path: &Path, snapshot: &Path) -> anyhow::Result<WorkspaceCounts> {
    if snapshot.exists() {
        std::fs::remove_file(snapshot).with_context(|| {
            format!("failed to remove stale snapshot {}", snapshot.to_string_lossy())
        })?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    let counts = count_planner_rows(&conn)?;
    conn.execute("VACUUM INTO ?", [snapshot.to_string_lossy().into_owned()])
        .context("failed to snapshot database")?;
    Ok(counts)
}

fn write_bundle(
    out_path: &Path,
    db_bytes: &[u8],
    manifest: &serde_json::Value,
    meta: &serde_json::Value,
) -> anyhow::Result<()> {
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, value) in [(MANIFEST_ENTRY, manifest), (META_WORKSPACE_ENTRY, meta)] {
        zip.start_file(name, opts)
            .with_context(|| format!("failed to start {}", name))?;
        zip.write_all(serde_json::to_string_pretty(value)?.as_bytes())
            .with_context(|| format!("failed to write {}", name))?;
    }
    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;
    Ok(())
}

/// Writes a bundle of the workspace at `out_path`. The bundle is assembled under a `.partial`
/// name and renamed into place.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.to_string_lossy());
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let snapshot = workspace_path.join(format!("{}.snapshot", DB_FILE));
    let counts = snapshot_database(&db_path, &snapshot)?;
    let db_bytes = std::fs::read(&snapshot);
    let _ = std::fs::remove_file(&snapshot);
    let db_bytes = db_bytes.context("failed to read database snapshot")?;
    let db_sha256 = sha256_hex(&db_bytes);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
    });
    let meta = json!({
        "sourceWorkspace": workspace_path.to_string_lossy(),
        "counts": counts,
    });

    let partial = PathBuf::from(format!("{}.partial", out_path.to_string_lossy()));
    if let Err(e) = write_bundle(&partial, &db_bytes, &manifest, &meta) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, out_path)
        .with_context(|| format!("failed to move bundle to {}", out_path.to_string_lossy()))?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        db_sha256,
        counts,
    })
}

fn read_bundle_database(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", format);
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json has no dbSha256"))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/guidance.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        bail!(
            "database checksum mismatch: manifest {} actual {}",
            expected,
            actual
        );
    }
    Ok(db_bytes)
}

/// An incoming database that passed every check and waits next to the live one.
/// Dropping it without [`StagedImport::commit`] discards the staged file.
#[derive(Debug)]
pub struct StagedImport {
    staged: PathBuf,
    target: PathBuf,
    pub bundle_format_detected: String,
    pub counts: WorkspaceCounts,
}

impl StagedImport {
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    /// Replaces the workspace database. Close any open connection to it first.
    pub fn commit(self) -> anyhow::Result<ImportSummary> {
        std::fs::rename(&self.staged, &self.target).with_context(|| {
            format!(
                "failed to move restored database to {}",
                self.target.to_string_lossy()
            )
        })?;
        Ok(ImportSummary {
            bundle_format_detected: self.bundle_format_detected.clone(),
            counts: self.counts,
        })
    }
}

impl Drop for StagedImport {
    fn drop(&mut self) {
        if self.staged.exists() {
            let _ = std::fs::remove_file(&self.staged);
        }
    }
}

/// Reads a bundle (or a plain SQLite copy of a workspace database), verifies it and stages it
/// inside `workspace_path`. The live database is not touched.
pub fn stage_workspace_import(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<StagedImport> {
    let kind = sniff(in_path)?;
    let db_bytes = match kind {
        SourceKind::Bundle => read_bundle_database(in_path)?,
        SourceKind::SqliteFile => std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?,
    };

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let mut staged = StagedImport {
        staged: workspace_path.join(format!("{}.importing", DB_FILE)),
        target: workspace_path.join(DB_FILE),
        bundle_format_detected: match kind {
            SourceKind::Bundle => BUNDLE_FORMAT_V1,
            SourceKind::SqliteFile => PLAIN_SQLITE_FORMAT,
        }
        .to_string(),
        counts: WorkspaceCounts::default(),
    };

    let mut out = File::create(&staged.staged).with_context(|| {
        format!(
            "failed to create staging file {}",
            staged.staged.to_string_lossy()
        )
    })?;
    out.write_all(&db_bytes)
        .context("failed to write staged database")?;
    out.sync_all().context("failed to flush staged database")?;
    drop(out);

    // On failure `staged` is dropped here and the staging file goes with it.
    staged.counts = inspect_database(&staged.staged)?;
    Ok(staged)
}
