//! Data-quality classification.
//!
//! Rules are evaluated in the order of [`RULES`]. The first EXCLUDE rule that
//! matches is terminal; WARN rules accumulate their reasons. Reordering the
//! table changes results and is a breaking change.

use crate::core::params::QualityPolicy;
use crate::core::valuation::Valuation;
use crate::domain::model::{Quality, ReasonCode, ReportingPeriod, SnapshotRow};

pub struct RuleContext<'a> {
    pub row: &'a SnapshotRow,
    pub valuation: &'a Valuation,
    pub policy: &'a QualityPolicy,
}

pub struct QualityRule {
    pub name: &'static str,
    pub flag: Quality,
    /// Reasons raised by the rule; empty when it does not match.
    pub check: fn(&RuleContext<'_>) -> Vec<ReasonCode>,
}

pub const RULES: &[QualityRule] = &[
    QualityRule {
        name: "hard_data_fault",
        flag: Quality::Exclude,
        check: hard_data_fault,
    },
    QualityRule {
        name: "negative_earnings",
        flag: Quality::Exclude,
        check: negative_earnings,
    },
    QualityRule {
        name: "roe_outlier",
        flag: Quality::Warn,
        check: roe_outlier,
    },
    QualityRule {
        name: "stale_fundamentals",
        flag: Quality::Warn,
        check: stale_fundamentals,
    },
    QualityRule {
        name: "finance_or_holding",
        flag: Quality::Warn,
        check: finance_or_holding,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub quality: Quality,
    pub reasons: Vec<ReasonCode>,
}

pub fn classify(row: &SnapshotRow, valuation: &Valuation, policy: &QualityPolicy) -> Assessment {
    classify_with(
        RULES,
        &RuleContext {
            row,
            valuation,
            policy,
        },
    )
}

pub fn classify_with(rules: &[QualityRule], ctx: &RuleContext<'_>) -> Assessment {
    let mut warnings: Vec<ReasonCode> = Vec::new();

    for rule in rules {
        let reasons = (rule.check)(ctx);
        if reasons.is_empty() {
            continue;
        }

        match rule.flag {
            Quality::Exclude => {
                tracing::debug!(
                    "{} excluded by {}: {:?}",
                    ctx.row.ticker.code,
                    rule.name,
                    reasons
                );
                return Assessment {
                    quality: Quality::Exclude,
                    reasons,
                };
            }
            Quality::Warn => {
                for reason in reasons {
                    if !warnings.contains(&reason) {
                        warnings.push(reason);
                    }
                }
            }
            Quality::Ok => {}
        }
    }

    Assessment {
        quality: if warnings.is_empty() {
            Quality::Ok
        } else {
            Quality::Warn
        },
        reasons: warnings,
    }
}

fn hard_data_fault(ctx: &RuleContext<'_>) -> Vec<ReasonCode> {
    ctx.valuation.faults.clone()
}

fn negative_earnings(ctx: &RuleContext<'_>) -> Vec<ReasonCode> {
    if ctx.row.fundamental.net_income < 0.0 {
        vec![ReasonCode::NegativeEarnings]
    } else {
        Vec::new()
    }
}

fn roe_outlier(ctx: &RuleContext<'_>) -> Vec<ReasonCode> {
    match ctx.valuation.derived.roe_derived {
        Some(roe) if roe < ctx.policy.roe_min || roe > ctx.policy.roe_max => {
            vec![ReasonCode::RoeOutlier]
        }
        _ => Vec::new(),
    }
}

fn stale_fundamentals(ctx: &RuleContext<'_>) -> Vec<ReasonCode> {
    let as_of_period = ReportingPeriod::containing(ctx.row.as_of_date);
    let lag = as_of_period.periods_since(&ctx.row.fundamental.period);
    if lag > i64::from(ctx.policy.stale_after_periods) {
        vec![ReasonCode::StaleFundamentals]
    } else {
        Vec::new()
    }
}

fn finance_or_holding(ctx: &RuleContext<'_>) -> Vec<ReasonCode> {
    let Some(sector) = ctx.row.ticker.sector.as_deref() else {
        return Vec::new();
    };
    if ctx
        .policy
        .finance_keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && sector.contains(keyword.as_str()))
    {
        vec![ReasonCode::FinanceOrHolding]
    } else {
        Vec::new()
    }
}
