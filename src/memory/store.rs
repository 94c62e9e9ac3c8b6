// src/memory/store.rs — SQLite operations

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::str::FromStr;

use crate::core::types::{
    AttemptCompletion, AttemptRecord, AttemptStatus, FailureClassification, ParsedModule,
    ParsedTask,
};

const ATTEMPT_COLUMNS: &str = "id, plan_id, user_id, attempt_number, status, classification,
     duration_ms, modules_count, tasks_count, timed_out, extended_timeout,
     input_json, metadata_json, created_at, completed_at";

/// Low-level SQLite operations for attempts and plan content.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // -- Attempts --

    /// Attempts that hold a number. Capped rows are not counted.
    pub fn count_attempts(&self, plan_id: &str) -> anyhow::Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM generation_attempts
             WHERE plan_id = ?1 AND attempt_number IS NOT NULL",
            params![plan_id],
            |r| r.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn insert_attempt(&self, record: &AttemptRecord) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO generation_attempts
             (id, plan_id, user_id, attempt_number, status, classification,
              duration_ms, modules_count, tasks_count, timed_out, extended_timeout,
              input_json, metadata_json, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id,
                record.plan_id,
                record.user_id,
                record.attempt_number.map(i64::from),
                record.status.as_str(),
                record.classification.map(|c| c.as_str()),
                record.duration_ms as i64,
                i64::from(record.modules_count),
                i64::from(record.tasks_count),
                record.timed_out,
                record.extended_timeout,
                serde_json::to_string(&record.input)?,
                record
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                record.created_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Move an `in_progress` attempt to its terminal state. On success the plan's
    /// modules and tasks are replaced in the same transaction.
    pub fn complete_attempt(&self, completion: &AttemptCompletion) -> anyhow::Result<AttemptRecord> {
        let tx = self.conn.unchecked_transaction()?;

        let changed = tx.execute(
            "UPDATE generation_attempts SET status = ?1, classification = ?2,
             duration_ms = ?3, modules_count = ?4, tasks_count = ?5, timed_out = ?6,
             extended_timeout = ?7, metadata_json = ?8, completed_at = ?9
             WHERE id = ?10 AND status = 'in_progress'",
            params![
                completion.status.as_str(),
                completion.classification.map(|c| c.as_str()),
                completion.duration_ms as i64,
                i64::from(completion.modules_count),
                i64::from(completion.tasks_count),
                completion.timed_out,
                completion.extended_timeout,
                completion
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                completion.completed_at.to_rfc3339(),
                completion.attempt_id,
            ],
        )?;
        if changed == 0 {
            anyhow::bail!(
                "attempt '{}' is not in progress and cannot be finalized",
                completion.attempt_id
            );
        }

        if let Some(modules) = &completion.modules {
            tx.execute(
                "DELETE FROM plan_tasks WHERE module_id IN
                 (SELECT id FROM plan_modules WHERE plan_id = ?1)",
                params![completion.plan_id],
            )?;
            tx.execute(
                "DELETE FROM plan_modules WHERE plan_id = ?1",
                params![completion.plan_id],
            )?;
            for (m_pos, module) in modules.iter().enumerate() {
                let module_id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO plan_modules
                     (id, plan_id, attempt_id, position, title, description, estimated_minutes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        module_id,
                        completion.plan_id,
                        completion.attempt_id,
                        m_pos as i64,
                        module.title,
                        module.description,
                        i64::from(module.estimated_minutes),
                    ],
                )?;
                for (t_pos, task) in module.tasks.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO plan_tasks
                         (id, module_id, position, title, description, estimated_minutes)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            uuid::Uuid::new_v4().to_string(),
                            module_id,
                            t_pos as i64,
                            task.title,
                            task.description,
                            i64::from(task.estimated_minutes),
                        ],
                    )?;
                }
            }
        }

        let record = tx.query_row(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM generation_attempts WHERE id = ?1"),
            params![completion.attempt_id],
            attempt_from_row,
        )?;
        tx.commit()?;
        Ok(record)
    }

    /// All attempts for a plan, oldest first.
    pub fn list_attempts(&self, plan_id: &str) -> anyhow::Result<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM generation_attempts
             WHERE plan_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![plan_id], attempt_from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -- Plan content --

    pub fn plan_modules(&self, plan_id: &str) -> anyhow::Result<Vec<ParsedModule>> {
        let mut module_stmt = self.conn.prepare(
            "SELECT id, title, description, estimated_minutes
             FROM plan_modules WHERE plan_id = ?1 ORDER BY position",
        )?;
        let mut task_stmt = self.conn.prepare(
            "SELECT title, description, estimated_minutes
             FROM plan_tasks WHERE module_id = ?1 ORDER BY position",
        )?;

        let rows = module_stmt.query_map(params![plan_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut modules = Vec::new();
        for row in rows {
            let (module_id, title, description, minutes) = row?;
            let tasks = task_stmt
                .query_map(params![module_id], |r| {
                    Ok(ParsedTask {
                        title: r.get(0)?,
                        description: r.get(1)?,
                        estimated_minutes: r.get::<_, i64>(2)? as u32,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            modules.push(ParsedModule {
                title,
                description,
                estimated_minutes: minutes as u32,
                tasks,
            });
        }
        Ok(modules)
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn parse_json(idx: usize, raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<AttemptRecord> {
    let status: String = row.get(4)?;
    let classification: Option<String> = row.get(5)?;
    let input_json: String = row.get(11)?;
    let metadata_json: Option<String> = row.get(12)?;
    let created_at: String = row.get(13)?;
    let completed_at: Option<String> = row.get(14)?;

    Ok(AttemptRecord {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        user_id: row.get(2)?,
        attempt_number: row.get::<_, Option<i64>>(3)?.map(|n| n as u32),
        status: parse_column::<AttemptStatus>(4, &status)?,
        classification: classification
            .map(|c| parse_column::<FailureClassification>(5, &c))
            .transpose()?,
        duration_ms: row.get::<_, i64>(6)? as u64,
        modules_count: row.get::<_, i64>(7)? as u32,
        tasks_count: row.get::<_, i64>(8)? as u32,
        timed_out: row.get(9)?,
        extended_timeout: row.get(10)?,
        input: parse_json(11, &input_json)?,
        metadata: metadata_json.map(|m| parse_json(12, &m)).transpose()?,
        created_at: parse_time(13, &created_at)?,
        completed_at: completed_at.map(|t| parse_time(14, &t)).transpose()?,
    })
}
