use crate::core::params::RunParameters;
use crate::core::quality::classify;
use crate::core::scoring::{rank, score_row};
use crate::core::snapshot::SnapshotBuilder;
use crate::core::valuation::value_row;
use crate::domain::model::{
    FeedBatch, Quality, RowFailure, RunReport, SnapshotRow, Stage, ValuationSnapshot,
};
use crate::utils::error::Result;
use crate::utils::validation::Validate;

/// Valuation, classification and scoring of one row. Pure: the same row and
/// parameters always give the same snapshot, so rows may be evaluated in any
/// order or concurrently.
pub fn evaluate(row: SnapshotRow, params: &RunParameters) -> ValuationSnapshot {
    let valuation = value_row(&row, &params.valuation);
    let assessment = classify(&row, &valuation, &params.quality);
    let outcome = score_row(&valuation.derived, assessment, &params.weights);

    ValuationSnapshot {
        row,
        required_return: params.valuation.required_return,
        derived: valuation.derived,
        quality: outcome.assessment.quality,
        reasons: outcome.assessment.reasons,
        components: outcome.components,
        score: outcome.score,
    }
}

/// Full run: build the snapshot from feeds, then evaluate every row.
pub fn run_full(batch: &FeedBatch, params: &RunParameters) -> Result<RunReport> {
    params.validate()?;

    let builder = SnapshotBuilder::new(
        params.snapshot_id,
        params.as_of_date,
        &batch.fundamentals,
        &batch.quotes,
    );
    let outcome = builder.build(&batch.tickers);

    let rows = outcome
        .rows
        .into_iter()
        .map(|row| evaluate(row, params))
        .collect();

    Ok(assemble_report(Stage::Full, params, rows, outcome.failures))
}

/// Ranks the evaluated rows. This is the only step that needs every row.
pub fn assemble_report(
    stage: Stage,
    params: &RunParameters,
    rows: Vec<ValuationSnapshot>,
    failures: Vec<RowFailure>,
) -> RunReport {
    let ranked = rank(
        &rows,
        params.rank_order,
        params.weights.exclude_policy,
        params.top_n,
    );

    let report = RunReport {
        snapshot_id: params.snapshot_id,
        as_of_date: params.as_of_date,
        stage,
        required_return: params.valuation.required_return,
        rows,
        ranked,
        failures,
    };

    tracing::info!(
        "Snapshot {} ({}): {} OK, {} WARN, {} EXCLUDE, {} failed",
        report.snapshot_id,
        report.stage,
        report.count(Quality::Ok),
        report.count(Quality::Warn),
        report.count(Quality::Exclude),
        report.failures.len()
    );
    report
}
