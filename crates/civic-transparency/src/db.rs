//! Append-only SQLite-backed store of Transparency Entries. Every write
//! is a plain insert — entries are never updated or deleted outside
//! configured retention sweeps elsewhere in the process.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use civic_types::TransparencyEntry;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{SearchFilter, SearchHit, TransparencyError, TransparencyResult};

pub struct TransparencyDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl TransparencyDatabase {
    pub async fn open(db_path: &Path) -> TransparencyResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;

        let db = TransparencyDatabase {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn open_in_memory() -> TransparencyResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = TransparencyDatabase {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> TransparencyResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transparency_entries (
                log_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                node_name TEXT NOT NULL,
                decision TEXT NOT NULL,
                context TEXT NOT NULL,
                rationale TEXT NOT NULL,
                confidence REAL NOT NULL,
                cost_impact REAL,
                affected_citizens INTEGER,
                policy_references TEXT NOT NULL,
                searchable_text TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transparency_agent ON transparency_entries(agent_type)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transparency_timestamp ON transparency_entries(timestamp)",
            [],
        )?;
        Ok(())
    }

    pub async fn append(&self, entry: &TransparencyEntry) -> TransparencyResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO transparency_entries
                (log_id, timestamp, agent_type, node_name, decision, context, rationale,
                 confidence, cost_impact, affected_citizens, policy_references, searchable_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.log_id.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.agent_type,
                entry.node_name,
                entry.decision,
                serde_json::to_string(&entry.context)?,
                entry.rationale,
                entry.confidence,
                entry.cost_impact,
                entry.affected_citizens,
                serde_json::to_string(&entry.policy_references)?,
                entry.searchable_text,
            ],
        )?;
        Ok(())
    }

    /// Keyword match over `searchable_text`, falling back to plain
    /// recency ordering when the query is empty — there is no embedding
    /// engine behind this store, so "similarity" degrades gracefully to
    /// "most recent first" rather than failing.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: &SearchFilter,
    ) -> TransparencyResult<Vec<SearchHit>> {
        let conn = self.conn.lock().await;
        let mut sql = String::from(
            "SELECT log_id, searchable_text, agent_type, node_name, decision, confidence, cost_impact
             FROM transparency_entries WHERE 1=1",
        );
        let mut bind_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !query.trim().is_empty() {
            sql.push_str(" AND searchable_text LIKE ?");
            bind_values.push(Box::new(format!("%{query}%")));
        }
        if let Some(agent) = &filter.filter_agent {
            sql.push_str(" AND agent_type = ?");
            bind_values.push(Box::new(agent.clone()));
        }
        if let Some(node) = &filter.filter_node {
            sql.push_str(" AND node_name = ?");
            bind_values.push(Box::new(node.clone()));
        }
        if let Some(min_confidence) = filter.min_confidence {
            sql.push_str(" AND confidence >= ?");
            bind_values.push(Box::new(min_confidence));
        }
        if let Some(max_cost) = filter.max_cost {
            sql.push_str(" AND (cost_impact IS NULL OR cost_impact <= ?)");
            bind_values.push(Box::new(max_cost));
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        bind_values.push(Box::new(n_results as i64));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = bind_values.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let log_id: String = row.get(0)?;
            Ok(SearchHit {
                log_id: Uuid::parse_str(&log_id).unwrap_or_else(|_| Uuid::nil()),
                text: row.get(1)?,
                agent_type: row.get(2)?,
                node_name: row.get(3)?,
                decision: row.get(4)?,
                confidence: row.get(5)?,
                distance: 0.0,
            })
        })?;

        let mut hits = Vec::new();
        for (rank, row) in rows.enumerate() {
            let mut hit = row?;
            hit.distance = rank as f64;
            hits.push(hit);
        }
        Ok(hits)
    }

    /// Highest-`cost_impact` entries regardless of confidence — used for
    /// the transparency report's `top_decisions`, which surfaces the
    /// costliest decisions even when a low-confidence one triggered an
    /// escalation.
    pub async fn top_by_cost_impact(&self, limit: usize, agent: Option<&str>) -> TransparencyResult<Vec<SearchHit>> {
        let conn = self.conn.lock().await;
        let mut sql = String::from(
            "SELECT log_id, searchable_text, agent_type, node_name, decision, confidence, cost_impact
             FROM transparency_entries WHERE 1=1",
        );
        let mut bind_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(agent) = agent {
            sql.push_str(" AND agent_type = ?");
            bind_values.push(Box::new(agent.to_string()));
        }
        sql.push_str(" ORDER BY COALESCE(cost_impact, 0) DESC LIMIT ?");
        bind_values.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = bind_values.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let log_id: String = row.get(0)?;
            Ok(SearchHit {
                log_id: Uuid::parse_str(&log_id).unwrap_or_else(|_| Uuid::nil()),
                text: row.get(1)?,
                agent_type: row.get(2)?,
                node_name: row.get(3)?,
                decision: row.get(4)?,
                confidence: row.get(5)?,
                distance: 0.0,
            })
        })?;

        let mut hits = Vec::new();
        for (rank, row) in rows.enumerate() {
            let mut hit = row?;
            hit.distance = rank as f64;
            hits.push(hit);
        }
        Ok(hits)
    }

    pub async fn count_by_agent(&self) -> TransparencyResult<std::collections::HashMap<String, i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT agent_type, COUNT(*) FROM transparency_entries GROUP BY agent_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut counts = std::collections::HashMap::new();
        for row in rows {
            let (agent, count) = row?;
            counts.insert(agent, count);
        }
        Ok(counts)
    }

    pub async fn statistics_since(&self, since: DateTime<Utc>) -> TransparencyResult<(i64, f64, f64, f64)> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(AVG(CASE WHEN decision = 'escalate' THEN 1.0 ELSE 0.0 END), 0.0),
                    COALESCE(AVG(confidence), 0.0),
                    COALESCE(SUM(cost_impact), 0.0)
             FROM transparency_entries WHERE timestamp >= ?1",
            params![since.to_rfc3339()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            },
        )
        .optional()
        .map(|row| row.unwrap_or((0, 0.0, 0.0, 0.0)))
        .map_err(TransparencyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::TransparencyEntry;

    fn entry(agent: &str, decision: &str, confidence: f64) -> TransparencyEntry {
        TransparencyEntry::new(agent, "output_generator", decision, "because reasons", confidence)
    }

    #[tokio::test]
    async fn append_then_search_finds_by_keyword() {
        let db = TransparencyDatabase::open_in_memory().await.unwrap();
        db.append(&entry("water", "recommend", 0.9)).await.unwrap();
        db.append(&entry("fire", "escalate", 0.4)).await.unwrap();

        let hits = db.search("escalate", 10, &SearchFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].agent_type, "fire");
    }

    #[tokio::test]
    async fn empty_query_falls_back_to_recency() {
        let db = TransparencyDatabase::open_in_memory().await.unwrap();
        db.append(&entry("water", "recommend", 0.9)).await.unwrap();
        db.append(&entry("fire", "escalate", 0.4)).await.unwrap();

        let hits = db.search("", 10, &SearchFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].agent_type, "fire");
    }

    #[tokio::test]
    async fn top_by_cost_impact_ignores_confidence() {
        let db = TransparencyDatabase::open_in_memory().await.unwrap();
        let mut cheap = entry("water", "recommend", 0.95);
        cheap.cost_impact = Some(1_000.0);
        let mut expensive = entry("fire", "escalate", 0.2);
        expensive.cost_impact = Some(9_000_000.0);
        db.append(&cheap).await.unwrap();
        db.append(&expensive).await.unwrap();

        let hits = db.top_by_cost_impact(10, None).await.unwrap();
        assert_eq!(hits[0].agent_type, "fire");
    }

    #[tokio::test]
    async fn min_confidence_filter_excludes_low_confidence_entries() {
        let db = TransparencyDatabase::open_in_memory().await.unwrap();
        db.append(&entry("water", "recommend", 0.9)).await.unwrap();
        db.append(&entry("fire", "escalate", 0.4)).await.unwrap();

        let filter = SearchFilter {
            min_confidence: Some(0.7),
            ..Default::default()
        };
        let hits = db.search("", 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].agent_type, "water");
    }
}
