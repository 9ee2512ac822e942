//! SQLite writer.
//!
//! Persists each observation with its satellite records (headers, network
//! log, cookies, technologies, console entries) in a relational layout.
//! The schema is created on connect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::models::Observation;
use crate::writers::Writer;

pub struct DbWriter {
    pool: SqlitePool,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        final_url TEXT NOT NULL,
        response_code INTEGER NOT NULL,
        response_reason TEXT NOT NULL,
        protocol TEXT NOT NULL,
        content_length INTEGER NOT NULL,
        probed_at TEXT NOT NULL,
        title TEXT NOT NULL,
        html TEXT NOT NULL,
        failed INTEGER NOT NULL,
        failed_reason TEXT NOT NULL,
        filename TEXT NOT NULL,
        screenshot TEXT NOT NULL,
        perception_hash TEXT NOT NULL,
        tls_protocol TEXT,
        tls_cipher TEXT,
        tls_subject_name TEXT,
        tls_issuer TEXT,
        tls_valid_from TEXT,
        tls_valid_to TEXT
    )",
    "CREATE TABLE IF NOT EXISTS result_headers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_id INTEGER NOT NULL REFERENCES results(id),
        key TEXT NOT NULL,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS result_network (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_id INTEGER NOT NULL REFERENCES results(id),
        time TEXT NOT NULL,
        request_type TEXT NOT NULL,
        url TEXT NOT NULL,
        status_code INTEGER NOT NULL,
        remote_ip TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        error TEXT NOT NULL,
        content BLOB
    )",
    "CREATE TABLE IF NOT EXISTS result_cookies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_id INTEGER NOT NULL REFERENCES results(id),
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        domain TEXT NOT NULL,
        path TEXT NOT NULL,
        expires TEXT NOT NULL,
        size INTEGER NOT NULL,
        http_only INTEGER NOT NULL,
        secure INTEGER NOT NULL,
        session INTEGER NOT NULL,
        priority TEXT NOT NULL,
        source_scheme TEXT NOT NULL,
        source_port INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS result_technologies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_id INTEGER NOT NULL REFERENCES results(id),
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS result_console (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_id INTEGER NOT NULL REFERENCES results(id),
        type TEXT NOT NULL,
        value TEXT NOT NULL
    )",
];

impl DbWriter {
    /// Connects to `uri` (e.g. `sqlite://webwitness.sqlite3`), creating the
    /// database file and schema when missing.
    pub async fn connect(uri: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(uri)
            .with_context(|| format!("invalid database uri: {uri}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open results database")?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Connects to an existing pool; used by tests.
    #[cfg(test)]
    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

#[async_trait]
impl Writer for DbWriter {
    async fn write(&self, observation: &Observation) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result_id: i64 = sqlx::query(
            "INSERT INTO results (
                url, final_url, response_code, response_reason, protocol,
                content_length, probed_at, title, html, failed, failed_reason,
                filename, screenshot, perception_hash, tls_protocol, tls_cipher,
                tls_subject_name, tls_issuer, tls_valid_from, tls_valid_to
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&observation.url)
        .bind(&observation.final_url)
        .bind(observation.response_code)
        .bind(&observation.response_reason)
        .bind(&observation.protocol)
        .bind(observation.content_length)
        .bind(observation.probed_at.to_rfc3339())
        .bind(&observation.title)
        .bind(&observation.html)
        .bind(observation.failed)
        .bind(&observation.failed_reason)
        .bind(&observation.filename)
        .bind(&observation.screenshot)
        .bind(&observation.perception_hash)
        .bind(observation.tls.as_ref().map(|t| t.protocol.clone()))
        .bind(observation.tls.as_ref().map(|t| t.cipher.clone()))
        .bind(observation.tls.as_ref().map(|t| t.subject_name.clone()))
        .bind(observation.tls.as_ref().map(|t| t.issuer.clone()))
        .bind(observation.tls.as_ref().map(|t| t.valid_from.to_rfc3339()))
        .bind(observation.tls.as_ref().map(|t| t.valid_to.to_rfc3339()))
        .fetch_one(&mut *tx)
        .await?
        .get(0);

        for header in &observation.headers {
            sqlx::query("INSERT INTO result_headers (result_id, key, value) VALUES (?, ?, ?)")
                .bind(result_id)
                .bind(&header.key)
                .bind(&header.value)
                .execute(&mut *tx)
                .await?;
        }

        for entry in &observation.network {
            sqlx::query(
                "INSERT INTO result_network (
                    result_id, time, request_type, url, status_code,
                    remote_ip, mime_type, error, content
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(result_id)
            .bind(entry.time.to_rfc3339())
            .bind(entry.request_type.as_str())
            .bind(&entry.url)
            .bind(entry.status_code)
            .bind(&entry.remote_ip)
            .bind(&entry.mime_type)
            .bind(&entry.error)
            .bind(entry.content.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        for cookie in &observation.cookies {
            sqlx::query(
                "INSERT INTO result_cookies (
                    result_id, name, value, domain, path, expires, size,
                    http_only, secure, session, priority, source_scheme, source_port
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(result_id)
            .bind(&cookie.name)
            .bind(&cookie.value)
            .bind(&cookie.domain)
            .bind(&cookie.path)
            .bind(cookie.expires.to_rfc3339())
            .bind(cookie.size)
            .bind(cookie.http_only)
            .bind(cookie.secure)
            .bind(cookie.session)
            .bind(&cookie.priority)
            .bind(&cookie.source_scheme)
            .bind(cookie.source_port)
            .execute(&mut *tx)
            .await?;
        }

        for technology in &observation.technologies {
            sqlx::query("INSERT INTO result_technologies (result_id, value) VALUES (?, ?)")
                .bind(result_id)
                .bind(&technology.value)
                .execute(&mut *tx)
                .await?;
        }

        for entry in &observation.console {
            sqlx::query("INSERT INTO result_console (result_id, type, value) VALUES (?, ?, ?)")
                .bind(result_id)
                .bind(&entry.kind)
                .bind(&entry.value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
