//! Component normalization, composite score and ranking.

use std::cmp::Ordering;

use crate::core::params::{ExcludePolicy, PenaltyMode, RankOrder, ScoreWeights};
use crate::core::quality::Assessment;
use crate::domain::model::{
    DerivedFields, Quality, RankedRow, ReasonCode, ScoreComponents, ValuationSnapshot,
};

/// Score given to excluded rows under [`ExcludePolicy::Sentinel`].
pub const EXCLUDED_SCORE: f64 = f64::MIN;

fn clip(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

/// Undervaluation only helps: a zero or negative gap scores 0.
pub fn gap_score(gap_pct: f64) -> f64 {
    clip(gap_pct, 0.0, 200.0) / 200.0
}

pub fn roe_score(roe: f64) -> f64 {
    (clip(roe, -0.10, 0.30) + 0.10) / 0.40
}

pub fn pbr_score(pbr: f64) -> f64 {
    1.0 - clip(pbr, 0.0, 5.0) / 5.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub components: ScoreComponents,
    pub score: Option<f64>,
    /// The input assessment, escalated to EXCLUDE when nothing was scorable.
    pub assessment: Assessment,
}

pub fn penalty(assessment: &Assessment, weights: &ScoreWeights) -> f64 {
    match assessment.quality {
        Quality::Ok | Quality::Exclude => 0.0,
        Quality::Warn => match weights.warn_penalty_mode {
            PenaltyMode::PerReason => weights.warn_penalty * assessment.reasons.len() as f64,
            PenaltyMode::Single => weights.warn_penalty,
        },
    }
}

/// Effective weights for the available components. Weight of omitted
/// components is redistributed in proportion to the remaining weights; if
/// every remaining weight is zero it is split evenly instead.
fn effective_weights(weights: &[(f64, bool)]) -> Vec<f64> {
    let total: f64 = weights.iter().map(|(w, _)| w).sum();
    let available: f64 = weights.iter().filter(|(_, ok)| *ok).map(|(w, _)| w).sum();
    let available_count = weights.iter().filter(|(_, ok)| *ok).count();

    if available_count == weights.len() {
        return weights.iter().map(|(w, _)| *w).collect();
    }

    weights
        .iter()
        .map(|(w, ok)| {
            if !ok {
                0.0
            } else if available > 0.0 {
                w * total / available
            } else {
                total / available_count as f64
            }
        })
        .collect()
}

pub fn score_row(derived: &DerivedFields, assessment: Assessment, weights: &ScoreWeights) -> ScoreOutcome {
    let mut components = ScoreComponents {
        gap_score: derived.gap_pct.map(gap_score),
        roe_score: derived.roe_derived.map(roe_score),
        pbr_score: derived.pbr_derived.map(pbr_score),
        penalty: 0.0,
    };

    if assessment.quality == Quality::Exclude {
        return ScoreOutcome {
            components,
            score: excluded_score(weights),
            assessment,
        };
    }

    let parts = [
        (weights.gap, components.gap_score),
        (weights.roe, components.roe_score),
        (weights.pbr, components.pbr_score),
    ];
    if parts.iter().all(|(_, s)| s.is_none()) {
        let mut reasons = assessment.reasons;
        reasons.push(ReasonCode::NoScorableComponents);
        return ScoreOutcome {
            components,
            score: None,
            assessment: Assessment {
                quality: Quality::Exclude,
                reasons,
            },
        };
    }

    let effective = effective_weights(
        &parts
            .iter()
            .map(|(w, s)| (*w, s.is_some()))
            .collect::<Vec<_>>(),
    );
    let weighted: f64 = parts
        .iter()
        .zip(effective)
        .filter_map(|((_, s), w)| s.map(|s| w * s))
        .sum();

    components.penalty = penalty(&assessment, weights);
    ScoreOutcome {
        score: Some(weighted - components.penalty),
        components,
        assessment,
    }
}

fn excluded_score(weights: &ScoreWeights) -> Option<f64> {
    match weights.exclude_policy {
        ExcludePolicy::Sentinel => Some(EXCLUDED_SCORE),
        ExcludePolicy::Omit => None,
    }
}

/// Larger first, `None` last.
fn desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Smaller first, `None` last.
fn asc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Total order over rows: excluded rows last, then the requested key, then
/// score desc, gap desc, ticker asc.
pub fn compare(a: &ValuationSnapshot, b: &ValuationSnapshot, order: RankOrder) -> Ordering {
    let primary = match order {
        RankOrder::Score => Ordering::Equal,
        RankOrder::GapDesc => desc(a.derived.gap_pct, b.derived.gap_pct),
        RankOrder::GapAsc => asc(a.derived.gap_pct, b.derived.gap_pct),
        RankOrder::IntrinsicDesc => desc(a.derived.intrinsic_value, b.derived.intrinsic_value),
        RankOrder::IntrinsicAsc => asc(a.derived.intrinsic_value, b.derived.intrinsic_value),
    };

    a.is_excluded()
        .cmp(&b.is_excluded())
        .then(primary)
        .then_with(|| desc(a.score, b.score))
        .then_with(|| desc(a.derived.gap_pct, b.derived.gap_pct))
        .then_with(|| a.ticker_code().cmp(b.ticker_code()))
}

pub fn rank(
    rows: &[ValuationSnapshot],
    order: RankOrder,
    exclude_policy: ExcludePolicy,
    top_n: Option<usize>,
) -> Vec<RankedRow> {
    let mut candidates: Vec<&ValuationSnapshot> = rows
        .iter()
        .filter(|row| !(row.is_excluded() && exclude_policy == ExcludePolicy::Omit))
        .collect();
    candidates.sort_by(|a, b| compare(a, b, order));

    candidates
        .into_iter()
        .take(top_n.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, row)| ranked_row(i + 1, row))
        .collect()
}

fn ranked_row(rank: usize, row: &ValuationSnapshot) -> RankedRow {
    RankedRow {
        rank,
        ticker: row.row.ticker.code.clone(),
        market: row.row.ticker.market.clone(),
        name: row.row.ticker.name.clone(),
        revision: row.revision(),
        score: row.score,
        gap_pct: row.derived.gap_pct,
        intrinsic_value: row.derived.intrinsic_value,
        market_price: row.row.quote.as_ref().map(|q| q.price),
        roe_derived: row.derived.roe_derived,
        pbr_derived: row.derived.pbr_derived,
        quality: row.quality,
        reasons: row
            .reasons
            .iter()
            .map(ReasonCode::as_str)
            .collect::<Vec<_>>()
            .join(";"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Assessment {
        Assessment {
            quality: Quality::Ok,
            reasons: Vec::new(),
        }
    }

    fn derived(gap: Option<f64>, roe: Option<f64>, pbr: Option<f64>) -> DerivedFields {
        DerivedFields {
            book_value_per_share: Some(10.0),
            roe_derived: roe,
            intrinsic_value: Some(15.0),
            gap_pct: gap,
            pbr_derived: pbr,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_component_scores_stay_in_unit_interval() {
        for x in [
            f64::NEG_INFINITY,
            -1e12,
            -250.0,
            -0.5,
            0.0,
            0.15,
            3.0,
            199.0,
            1e12,
            f64::INFINITY,
            f64::NAN,
        ] {
            for s in [gap_score(x), roe_score(x), pbr_score(x)] {
                assert!((0.0..=1.0).contains(&s), "{} -> {}", x, s);
            }
        }
    }

    #[test]
    fn test_component_reference_values() {
        assert!(approx(gap_score(400.0 / 11.0), 400.0 / 11.0 / 200.0));
        assert_eq!(gap_score(-20.0), 0.0);
        assert!(approx(roe_score(0.15), 0.625));
        assert!(approx(pbr_score(1.0), 0.8));
        assert_eq!(pbr_score(7.0), 0.0);
    }

    #[test]
    fn test_composite_with_all_components() {
        let weights = ScoreWeights::default();
        let out = score_row(&derived(Some(100.0), Some(0.10), Some(2.5)), ok(), &weights);
        // 0.5 * 0.5 + 0.3 * 0.5 + 0.2 * 0.5
        assert!(approx(out.score.unwrap(), 0.5));
        assert_eq!(out.components.penalty, 0.0);
    }

    #[test]
    fn test_missing_pbr_weight_is_redistributed() {
        let weights = ScoreWeights::default();
        let out = score_row(&derived(Some(200.0), Some(-0.10), None), ok(), &weights);
        // gap 1.0, roe 0.0; weights 0.5/0.3 scaled by 1.0/0.8.
        assert!(approx(out.score.unwrap(), 0.625));
        assert!(out.components.pbr_score.is_none());
    }

    #[test]
    fn test_zero_remaining_weights_split_evenly() {
        let weights = ScoreWeights {
            gap: 0.0,
            roe: 0.0,
            pbr: 1.0,
            ..ScoreWeights::default()
        };
        let out = score_row(&derived(Some(200.0), Some(0.30), None), ok(), &weights);
        assert!(approx(out.score.unwrap(), 1.0));
    }

    #[test]
    fn test_no_components_escalates_to_exclude() {
        let out = score_row(&derived(None, None, None), ok(), &ScoreWeights::default());
        assert_eq!(out.assessment.quality, Quality::Exclude);
        assert_eq!(out.assessment.reasons, vec![ReasonCode::NoScorableComponents]);
        assert!(out.score.is_none());
    }

    #[test]
    fn test_warn_penalty_modes() {
        let warn = Assessment {
            quality: Quality::Warn,
            reasons: vec![ReasonCode::RoeOutlier, ReasonCode::StaleFundamentals],
        };
        let summed = ScoreWeights::default();
        assert!(approx(penalty(&warn, &summed), 0.1));

        let single = ScoreWeights {
            warn_penalty_mode: PenaltyMode::Single,
            ..ScoreWeights::default()
        };
        assert!(approx(penalty(&warn, &single), 0.05));
    }

    #[test]
    fn test_excluded_score_policy() {
        let excluded = Assessment {
            quality: Quality::Exclude,
            reasons: vec![ReasonCode::NegativeEarnings],
        };
        let d = derived(Some(150.0), Some(-0.05), Some(0.5));

        let sentinel = score_row(&d, excluded.clone(), &ScoreWeights::default());
        assert_eq!(sentinel.score, Some(EXCLUDED_SCORE));

        let omit = ScoreWeights {
            exclude_policy: ExcludePolicy::Omit,
            ..ScoreWeights::default()
        };
        assert_eq!(score_row(&d, excluded, &omit).score, None);
    }

    fn snapshot(
        code: &str,
        d: DerivedFields,
        assessment: Assessment,
        weights: &ScoreWeights,
    ) -> ValuationSnapshot {
        use crate::domain::model::{FundamentalRecord, ReportingPeriod, SnapshotRow, Ticker};

        let out = score_row(&d, assessment, weights);
        ValuationSnapshot {
            row: SnapshotRow {
                snapshot_id: "2026Q1".parse().unwrap(),
                ticker: Ticker::new(code, "KOSPI"),
                revision: 0,
                as_of_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 4).unwrap(),
                fundamental: FundamentalRecord {
                    ticker: code.to_string(),
                    period: ReportingPeriod::new(2025, 4).unwrap(),
                    book_value_of_equity: 100.0,
                    net_income: 15.0,
                    shares_outstanding: 10.0,
                    total_debt: None,
                    operating_cash_flow: None,
                },
                quote: None,
            },
            required_return: 0.10,
            derived: d,
            quality: out.assessment.quality,
            reasons: out.assessment.reasons,
            components: out.components,
            score: out.score,
        }
    }

    fn codes(ranked: &[RankedRow]) -> Vec<&str> {
        ranked.iter().map(|r| r.ticker.as_str()).collect()
    }

    #[test]
    fn test_score_tie_falls_through_to_gap() {
        let weights = ScoreWeights {
            gap: 0.0,
            ..ScoreWeights::default()
        };
        let low_gap = snapshot("000010", derived(Some(10.0), Some(0.10), Some(2.5)), ok(), &weights);
        let high_gap = snapshot("000020", derived(Some(80.0), Some(0.10), Some(2.5)), ok(), &weights);
        assert_eq!(low_gap.score, high_gap.score);

        assert_eq!(compare(&high_gap, &low_gap, RankOrder::Score), Ordering::Less);
        let ranked = rank(&[low_gap, high_gap], RankOrder::Score, ExcludePolicy::Sentinel, None);
        assert_eq!(codes(&ranked), vec!["000020", "000010"]);
    }

    #[test]
    fn test_excluded_rows_order_by_gap_then_ticker() {
        let weights = ScoreWeights::default();
        let excluded = || Assessment {
            quality: Quality::Exclude,
            reasons: vec![ReasonCode::NegativeEarnings],
        };
        let rows = vec![
            snapshot("000030", derived(Some(5.0), Some(-0.05), Some(0.5)), excluded(), &weights),
            snapshot("000020", derived(Some(50.0), Some(-0.05), Some(0.5)), excluded(), &weights),
            snapshot("000010", derived(Some(5.0), Some(-0.05), Some(0.5)), excluded(), &weights),
            snapshot("000040", derived(Some(1.0), Some(0.10), Some(2.5)), ok(), &weights),
        ];
        assert!(rows[..3].iter().all(|r| r.score == Some(EXCLUDED_SCORE)));

        let ranked = rank(&rows, RankOrder::Score, ExcludePolicy::Sentinel, None);
        assert_eq!(codes(&ranked), vec!["000040", "000020", "000010", "000030"]);
    }

    #[test]
    fn test_desc_and_asc_put_none_last() {
        assert_eq!(desc(Some(1.0), None), Ordering::Less);
        assert_eq!(asc(Some(1.0), None), Ordering::Less);
        assert_eq!(desc(Some(2.0), Some(1.0)), Ordering::Less);
        assert_eq!(asc(Some(2.0), Some(1.0)), Ordering::Greater);
    }
}
