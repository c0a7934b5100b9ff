//! S-RIM valuation of a single snapshot row.
//!
//! `intrinsic = bvps + persistence * (roe - r) * bvps / r`
//!
//! With the default parameters (`persistence = 1`, no clamping) this is the
//! plain residual-income perpetuity. Undefined inputs never raise: they
//! leave the affected derived fields empty and record a fault code for the
//! quality classifier.

use crate::core::params::ValuationParams;
use crate::domain::model::{DerivedFields, ReasonCode, SnapshotRow};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    pub derived: DerivedFields,
    /// Hard data faults found while valuing the row, in detection order.
    pub faults: Vec<ReasonCode>,
}

impl Valuation {
    fn fault(&mut self, code: ReasonCode) {
        if !self.faults.contains(&code) {
            self.faults.push(code);
        }
    }

    /// Keeps finite values, turns NaN/inf into `None` plus a fault.
    fn finite(&mut self, value: f64) -> Option<f64> {
        if value.is_finite() {
            Some(value)
        } else {
            self.fault(ReasonCode::NonFiniteValue);
            None
        }
    }

    /// `Some(value)` when strictly positive; otherwise records `code`.
    fn positive(&mut self, value: f64, code: ReasonCode) -> Option<f64> {
        if !value.is_finite() {
            self.fault(ReasonCode::NonFiniteValue);
            None
        } else if value <= 0.0 {
            self.fault(code);
            None
        } else {
            Some(value)
        }
    }
}

/// Residual-income value per share.
pub fn srim_value(book_value_per_share: f64, roe: f64, params: &ValuationParams) -> f64 {
    let r = params.required_return;
    let mut residual = (roe - r) * book_value_per_share;
    if params.clamp_negative_residual && residual < 0.0 {
        residual = 0.0;
    }
    book_value_per_share + params.persistence * residual / r
}

/// Percent undervaluation: positive when the price is below intrinsic value.
pub fn gap_pct(intrinsic_value: f64, market_price: f64) -> f64 {
    (intrinsic_value - market_price) / market_price * 100.0
}

/// Values one row. `params` must already be validated (`r > 0`).
pub fn value_row(row: &SnapshotRow, params: &ValuationParams) -> Valuation {
    let mut valuation = Valuation::default();
    let fundamental = &row.fundamental;

    let equity = valuation.positive(fundamental.book_value_of_equity, ReasonCode::NonPositiveEquity);
    let shares = valuation.positive(fundamental.shares_outstanding, ReasonCode::NonPositiveShares);

    let roe = match equity {
        Some(equity) => valuation.finite(fundamental.net_income / equity),
        None => None,
    };
    let bvps = match (equity, shares) {
        (Some(equity), Some(shares)) => valuation.finite(equity / shares),
        _ => None,
    };
    let intrinsic = match (bvps, roe) {
        (Some(bvps), Some(roe)) => valuation.finite(srim_value(bvps, roe, params)),
        _ => None,
    };
    if intrinsic.is_none() {
        valuation.fault(ReasonCode::IntrinsicValueUndefined);
    }

    let price = match &row.quote {
        Some(quote) => valuation.positive(quote.price, ReasonCode::NonPositivePrice),
        None => {
            valuation.fault(ReasonCode::MissingMarketQuote);
            None
        }
    };
    let gap = match (intrinsic, price) {
        (Some(intrinsic), Some(price)) => valuation.finite(gap_pct(intrinsic, price)),
        _ => None,
    };

    // PBR is optional: a missing or non-positive market cap is not a fault.
    let pbr = match (
        equity,
        row.quote.as_ref().and_then(|q| q.market_cap),
    ) {
        (Some(equity), Some(cap)) if cap.is_finite() && cap > 0.0 => valuation.finite(cap / equity),
        _ => None,
    };

    valuation.derived = DerivedFields {
        book_value_per_share: bvps,
        roe_derived: roe,
        intrinsic_value: intrinsic,
        gap_pct: gap,
        pbr_derived: pbr,
    };
    valuation
}
