use crate::error::{CashflowError, Result};
use crate::schema::{CashflowRow, RowOrigin};
use serde::Serialize;
use std::collections::HashSet;

/// Findings of a reconciliation pass; empty lists mean everything checked out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationResult {
    /// Rows whose flow differs from interest + amortization.
    pub flow_violations: Vec<String>,
    /// Universe tickers that produced no cashflow row.
    pub uncovered_tickers: Vec<String>,
}

impl VerificationResult {
    pub fn is_clean(&self) -> bool {
        self.flow_violations.is_empty() && self.uncovered_tickers.is_empty()
    }
}

/// Letter maturity rows pay the amount at maturity, not interest + amortization.
fn flow_must_balance(row: &CashflowRow) -> bool {
    row.origin != RowOrigin::LetterMaturity
}

/// Checks `flow == interest + amortization` on every row that carries it.
pub fn verify_flow_invariant(rows: &[CashflowRow], tolerance: f64) -> Vec<String> {
    rows.iter()
        .filter(|row| flow_must_balance(row))
        .filter(|row| (row.flow - row.component_sum()).abs() > tolerance)
        .map(|row| {
            format!(
                "{} {} ({}): flow {} != interest + amortization {}",
                row.ticker,
                row.date,
                row.source,
                row.flow,
                row.component_sum()
            )
        })
        .collect()
}

/// Universe tickers, in universe order, with no row in `rows`.
pub fn verify_universe_coverage(universe: &[String], rows: &[CashflowRow]) -> Vec<String> {
    let covered: HashSet<&str> = rows.iter().map(|row| row.ticker.trim()).collect();
    universe
        .iter()
        .filter(|ticker| !covered.contains(ticker.trim()))
        .cloned()
        .collect()
}

/// Runs both checks over a finished cashflow table.
pub fn reconcile(universe: &[String], rows: &[CashflowRow], tolerance: f64) -> VerificationResult {
    VerificationResult {
        flow_violations: verify_flow_invariant(rows, tolerance),
        uncovered_tickers: verify_universe_coverage(universe, rows),
    }
}

/// Turns flow violations into a hard error.
pub fn enforce_flow_invariant(result: &VerificationResult) -> Result<()> {
    match result.flow_violations.first() {
        None => Ok(()),
        Some(first) => Err(CashflowError::FlowInvariant {
            count: result.flow_violations.len(),
            first: first.clone(),
        }),
    }
}
