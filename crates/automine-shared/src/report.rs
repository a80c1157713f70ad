//! Daily operation summaries built from the ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::operation::{OperationStatus, SwitchOperation};

/// A failed operation, as listed in the daily report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub operation_id: String,
    pub at: chrono::DateTime<chrono::Utc>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    /// Operations that were retries of an earlier attempt
    pub retried_operations: usize,
    pub average_duration_ms: f64,
    /// 1.0 when nothing ran that day
    pub success_rate: f64,
    pub errors: Vec<OperationError>,
}

impl DailySummary {
    /// Summarize the operations that started on `date` (UTC)
    pub fn from_operations<'a, I>(ops: I, date: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a SwitchOperation>,
    {
        let todays: Vec<&SwitchOperation> = ops
            .into_iter()
            .filter(|op| op.started_at.date_naive() == date)
            .collect();

        let successful: Vec<&&SwitchOperation> = todays
            .iter()
            .filter(|op| op.status == OperationStatus::Completed)
            .collect();
        let failed = todays
            .iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .count();

        let durations: Vec<i64> = successful
            .iter()
            .filter_map(|op| op.duration_ms())
            .filter(|d| *d > 0)
            .collect();
        let average_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let success_rate = if todays.is_empty() {
            1.0
        } else {
            successful.len() as f64 / todays.len() as f64
        };

        let errors = todays
            .iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .map(|op| OperationError {
                operation_id: op.id.clone(),
                at: op.started_at,
                error: op.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();

        Self {
            date,
            total_operations: todays.len(),
            successful_operations: successful.len(),
            failed_operations: failed,
            retried_operations: todays.iter().filter(|op| op.retry_count > 0).count(),
            average_duration_ms,
            success_rate,
            errors,
        }
    }

    /// Plain-text rendering for logs and report files
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "AutoMine daily report - {}", self.date);
        let _ = writeln!(out);
        let _ = writeln!(out, "Operations:    {}", self.total_operations);
        let _ = writeln!(out, "Successful:    {}", self.successful_operations);
        let _ = writeln!(out, "Failed:        {}", self.failed_operations);
        let _ = writeln!(out, "Retries:       {}", self.retried_operations);
        let _ = writeln!(out, "Success rate:  {:.1}%", self.success_rate * 100.0);
        let _ = writeln!(out, "Avg duration:  {:.0}ms", self.average_duration_ms);
        let _ = writeln!(out);
        if self.errors.is_empty() {
            let _ = writeln!(out, "No errors reported.");
        } else {
            let _ = writeln!(out, "Errors:");
            for err in &self.errors {
                let _ = writeln!(
                    out,
                    "  - {} {}: {}",
                    err.at.to_rfc3339(),
                    err.operation_id,
                    err.error
                );
            }
        }
        out
    }
}
