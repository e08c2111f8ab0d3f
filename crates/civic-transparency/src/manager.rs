//! Public facade: `TransparencyLog`. Wraps `TransparencyDatabase` with
//! the two operations callers actually need — append one entry, or read
//! back a report/search over everything written so far.

use std::path::Path;

use chrono::{Duration as ChronoDuration, Utc};
use civic_types::TransparencyEntry;

use crate::db::TransparencyDatabase;
use crate::types::{DecisionReport, ReportStatistics, SearchFilter, SearchHit, TransparencyResult};

pub struct TransparencyLog {
    db: TransparencyDatabase,
}

impl TransparencyLog {
    pub async fn open(db_path: &Path) -> TransparencyResult<Self> {
        Ok(TransparencyLog {
            db: TransparencyDatabase::open(db_path).await?,
        })
    }

    pub async fn open_in_memory() -> TransparencyResult<Self> {
        Ok(TransparencyLog {
            db: TransparencyDatabase::open_in_memory().await?,
        })
    }

    /// Best-effort append: failures are logged and swallowed by callers
    /// (the memory logger node never wants a logging failure to turn
    /// into a pipeline escalation).
    pub async fn record(&self, entry: TransparencyEntry) -> TransparencyResult<()> {
        self.db.append(&entry).await
    }

    pub async fn search_decisions(
        &self,
        query: &str,
        n_results: usize,
        filter: SearchFilter,
    ) -> TransparencyResult<Vec<SearchHit>> {
        self.db.search(query, n_results, &filter).await
    }

    /// `{statistics, decisions_by_agent, top_decisions, recent_decisions}`
    /// over the trailing `period_days` days, optionally scoped to one
    /// agent.
    pub async fn generate_report(&self, period_days: i64, agent: Option<&str>) -> TransparencyResult<DecisionReport> {
        let since = Utc::now() - ChronoDuration::days(period_days);
        let (total_decisions, escalation_rate, average_confidence, total_cost_impact) =
            self.db.statistics_since(since).await?;

        let decisions_by_agent = self.db.count_by_agent().await?;

        let top_decisions = self.db.top_by_cost_impact(10, agent).await?;

        let recent_filter = SearchFilter {
            filter_agent: agent.map(str::to_string),
            ..Default::default()
        };
        let recent_decisions = self.db.search("", 20, &recent_filter).await?;

        Ok(DecisionReport {
            statistics: ReportStatistics {
                total_decisions,
                escalation_rate,
                average_confidence,
                total_cost_impact,
            },
            decisions_by_agent,
            top_decisions,
            recent_decisions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::TransparencyEntry;

    #[tokio::test]
    async fn generate_report_summarises_recorded_decisions() {
        let log = TransparencyLog::open_in_memory().await.unwrap();
        log.record(TransparencyEntry::new("water", "output_generator", "recommend", "sufficient workers", 0.9))
            .await
            .unwrap();
        log.record(TransparencyEntry::new("fire", "output_generator", "escalate", "critical risk", 0.3))
            .await
            .unwrap();

        let report = log.generate_report(30, None).await.unwrap();
        assert_eq!(report.statistics.total_decisions, 2);
        assert_eq!(report.decisions_by_agent.get("water"), Some(&1));
        assert_eq!(report.decisions_by_agent.get("fire"), Some(&1));
    }

    #[tokio::test]
    async fn generate_report_top_decisions_surfaces_high_cost_low_confidence() {
        let log = TransparencyLog::open_in_memory().await.unwrap();
        let mut cheap = TransparencyEntry::new("water", "output_generator", "recommend", "routine", 0.95);
        cheap.cost_impact = Some(500.0);
        let mut costly = TransparencyEntry::new("fire", "output_generator", "escalate", "uncertain", 0.2);
        costly.cost_impact = Some(8_000_000.0);
        log.record(cheap).await.unwrap();
        log.record(costly).await.unwrap();

        let report = log.generate_report(30, None).await.unwrap();
        assert_eq!(report.top_decisions[0].agent_type, "fire");
    }

    #[tokio::test]
    async fn generate_report_can_scope_to_one_agent() {
        let log = TransparencyLog::open_in_memory().await.unwrap();
        log.record(TransparencyEntry::new("water", "output_generator", "recommend", "ok", 0.9))
            .await
            .unwrap();
        log.record(TransparencyEntry::new("fire", "output_generator", "deny", "not feasible", 0.6))
            .await
            .unwrap();

        let report = log.generate_report(30, Some("water")).await.unwrap();
        assert_eq!(report.recent_decisions.len(), 1);
        assert_eq!(report.recent_decisions[0].agent_type, "water");
    }
}
