//! Comparison report over a batch of [`BacktestResult`]s: a table sorted
//! by Sharpe ratio, serialisable to CSV (grounded on the teacher's use of
//! the `csv` crate for portfolio reporting) or a minimal HTML table.

use backtest_engine::BacktestResult;
use serde::Serialize;

use crate::descriptor::TaskDescriptor;

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub task_id: String,
    pub strategy_type: String,
    pub success: bool,
    pub total_return: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub trade_count: Option<usize>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

pub struct ComparisonReport {
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonReport {
    /// Builds the report and sorts it by Sharpe ratio descending;
    /// failed runs (no Sharpe to rank by) sort after every successful
    /// one, in their original task order.
    pub fn build(tasks: &[TaskDescriptor], results: &[BacktestResult]) -> Self {
        let mut rows: Vec<ComparisonRow> = tasks
            .iter()
            .zip(results.iter())
            .map(|(task, result)| ComparisonRow {
                task_id: task.task_id.clone(),
                strategy_type: task.strategy_type.clone(),
                success: result.success,
                total_return: result.result.as_ref().map(|s| s.total_return),
                sharpe_ratio: result.result.as_ref().and_then(|s| s.sharpe_ratio),
                max_drawdown: result.result.as_ref().map(|s| s.max_drawdown),
                trade_count: result.result.as_ref().map(|s| s.trade_count),
                execution_time_ms: result.execution_time_ms,
                error: result.error.clone(),
            })
            .collect();

        rows.sort_by(|a, b| match (a.sharpe_ratio, b.sharpe_ratio) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Self { rows }
    }

    pub fn to_csv(&self) -> Result<String, String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &self.rows {
            writer.serialize(row).map_err(|e| e.to_string())?;
        }
        let bytes = writer.into_inner().map_err(|e| e.to_string())?;
        String::from_utf8(bytes).map_err(|e| e.to_string())
    }

    /// A minimal, dependency-free HTML table — not styled, intended as
    /// an embeddable fragment rather than a full document.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<table>\n<thead><tr>");
        for header in [
            "task_id",
            "strategy_type",
            "success",
            "total_return",
            "sharpe_ratio",
            "max_drawdown",
            "trade_count",
            "execution_time_ms",
            "error",
        ] {
            out.push_str(&format!("<th>{header}</th>"));
        }
        out.push_str("</tr></thead>\n<tbody>\n");
        for row in &self.rows {
            out.push_str("<tr>");
            out.push_str(&format!("<td>{}</td>", html_escape(&row.task_id)));
            out.push_str(&format!("<td>{}</td>", html_escape(&row.strategy_type)));
            out.push_str(&format!("<td>{}</td>", row.success));
            out.push_str(&format!("<td>{}</td>", opt_f64(row.total_return)));
            out.push_str(&format!("<td>{}</td>", opt_f64(row.sharpe_ratio)));
            out.push_str(&format!("<td>{}</td>", opt_f64(row.max_drawdown)));
            out.push_str(&format!(
                "<td>{}</td>",
                row.trade_count.map(|n| n.to_string()).unwrap_or_default()
            ));
            out.push_str(&format!("<td>{}</td>", row.execution_time_ms));
            out.push_str(&format!(
                "<td>{}</td>",
                row.error.as_deref().map(html_escape).unwrap_or_default()
            ));
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n");
        out
    }
}

fn opt_f64(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SerializableEngineConfig;
    use backtest_engine::{BacktestConfig, BacktestSummary};
    use rust_decimal::Decimal;
    use serde_json::Value;

    fn task(id: &str) -> TaskDescriptor {
        TaskDescriptor {
            task_id: id.to_string(),
            strategy_type: "momentum".to_string(),
            config: Value::Null,
            engine_config: SerializableEngineConfig::from(&BacktestConfig::default()),
        }
    }

    fn ok_result(sharpe: f64) -> BacktestResult {
        BacktestResult {
            success: true,
            result: Some(BacktestSummary {
                final_equity: Decimal::new(1_100_000, 0),
                total_return: 0.1,
                sharpe_ratio: Some(sharpe),
                max_drawdown: 0.05,
                trade_count: 10,
            }),
            error: None,
            execution_time_ms: 5,
        }
    }

    fn failed_result() -> BacktestResult {
        BacktestResult {
            success: false,
            result: None,
            error: Some("boom".to_string()),
            execution_time_ms: 1,
        }
    }

    #[test]
    fn sorts_by_sharpe_descending_with_failures_last() {
        let tasks = vec![task("low"), task("high"), task("failed")];
        let results = vec![ok_result(0.5), ok_result(2.0), failed_result()];
        let report = ComparisonReport::build(&tasks, &results);
        let ids: Vec<&str> = report.rows.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "failed"]);
    }

    #[test]
    fn csv_round_trips_header_and_rows() {
        let tasks = vec![task("t1")];
        let results = vec![ok_result(1.0)];
        let report = ComparisonReport::build(&tasks, &results);
        let csv = report.to_csv().unwrap();
        assert!(csv.contains("task_id"));
        assert!(csv.contains("t1"));
    }

    #[test]
    fn html_escapes_error_messages() {
        let tasks = vec![task("t1")];
        let results = vec![BacktestResult {
            success: false,
            result: None,
            error: Some("<script>".to_string()),
            execution_time_ms: 1,
        }];
        let report = ComparisonReport::build(&tasks, &results);
        let html = report.to_html();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
