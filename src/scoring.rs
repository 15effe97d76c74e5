use crate::models::{Homeowner, Priority, ScoreBreakdown};
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

// Factor weights; they sum to 100.
pub const WEIGHT_LOT_SIZE: f64 = 25.0;
pub const WEIGHT_HOME_VALUE: f64 = 25.0;
pub const WEIGHT_HOME_AGE: f64 = 20.0;
pub const WEIGHT_RECENT_PURCHASE: f64 = 15.0;
pub const WEIGHT_LOCATION: f64 = 10.0;
pub const WEIGHT_PHONE_QUALITY: f64 = 5.0;

const ACRE_SQFT: f64 = 43_560.0;

/// Neighborhood names that mark a premium area in the target market.
const PREMIUM_AREA_KEYWORDS: [&str; 6] = [
    "paradise valley",
    "camelback",
    "troon",
    "biltmore",
    "arcadia",
    "pinnacle peak",
];

fn main_road_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(blvd|boulevard|hwy|highway|rd|road|dr|drive)\b")
            .expect("main road regex is valid")
    })
}

/// Result of scoring one record.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub total: u32,
    pub breakdown: ScoreBreakdown,
    pub priority: Priority,
}

/// Score a record as of today. Deterministic for a fixed date: the same
/// record always yields the same total and breakdown.
pub fn score(h: &Homeowner) -> ScoreResult {
    score_at(h, Utc::now().date_naive())
}

/// Score a record as of an explicit date (tests pin this).
pub fn score_at(h: &Homeowner, today: NaiveDate) -> ScoreResult {
    let breakdown = ScoreBreakdown {
        lot_size: score_lot_size(h.lot_sqft),
        home_value: score_home_value(h.estimated_value),
        home_age: score_home_age(h.year_built, today.year()),
        recent_purchase: score_recent_purchase(h.last_sale_date, today),
        location: score_location(h),
        phone_quality: score_phone_quality(h),
    };
    let total = breakdown.total().round() as u32;
    ScoreResult {
        total,
        priority: Priority::from_score(total),
        breakdown,
    }
}

/// Score a record in place, attaching total, breakdown, and priority tier.
pub fn apply(h: &mut Homeowner) {
    let result = score(h);
    h.score = Some(result.total);
    h.priority = Some(result.priority);
    h.score_breakdown = Some(result.breakdown);
}

/// Lot size ladder: 1 acre, half acre, quarter acre. A missing lot size
/// scores 0, not the below-fair 20%: unknown is a true penalty here,
/// distinct from "small but known".
fn score_lot_size(lot_sqft: Option<f64>) -> f64 {
    let Some(sqft) = lot_sqft else { return 0.0 };
    let fraction = if sqft >= ACRE_SQFT {
        1.0
    } else if sqft >= 20_000.0 {
        0.7
    } else if sqft >= 10_000.0 {
        0.4
    } else {
        0.2
    };
    WEIGHT_LOT_SIZE * fraction
}

/// Value ladder: $3M / $1.5M / $750K. Missing value scores 0.
fn score_home_value(value: Option<f64>) -> f64 {
    let Some(value) = value else { return 0.0 };
    let fraction = if value >= 3_000_000.0 {
        1.0
    } else if value >= 1_500_000.0 {
        0.7
    } else if value >= 750_000.0 {
        0.4
    } else {
        0.2
    };
    WEIGHT_HOME_VALUE * fraction
}

/// Age ladder: 20 / 10 / 5 years. An unknown year built scores 50% of the
/// weight: newer construction is a genuine negative signal, but "don't know
/// the age" is not. Deliberately unlike the lot/value factors.
fn score_home_age(year_built: Option<i32>, current_year: i32) -> f64 {
    let Some(year) = year_built else {
        return WEIGHT_HOME_AGE * 0.5;
    };
    let age = current_year - year;
    let fraction = if age >= 20 {
        1.0
    } else if age >= 10 {
        0.6
    } else if age >= 5 {
        0.3
    } else {
        0.0
    };
    WEIGHT_HOME_AGE * fraction
}

/// Recency ladder: sold within 1 / 2 / 3 years. No sale date scores 0.
fn score_recent_purchase(last_sale: Option<NaiveDate>, today: NaiveDate) -> f64 {
    let Some(sale_date) = last_sale else { return 0.0 };
    let years = (today - sale_date).num_days() as f64 / 365.25;
    let fraction = if years <= 1.0 {
        1.0
    } else if years <= 2.0 {
        0.7
    } else if years <= 3.0 {
        0.4
    } else {
        0.0
    };
    WEIGHT_RECENT_PURCHASE * fraction
}

/// Additive location bonuses, capped at the factor weight: corner lot 50%,
/// main-road keyword 30%, premium-area keyword 20%.
fn score_location(h: &Homeowner) -> f64 {
    let address = h.full_address.to_lowercase();
    let mut fraction: f64 = 0.0;

    if h.corner_lot || address.contains("corner") {
        fraction += 0.5;
    }
    if main_road_regex().is_match(&h.full_address) {
        fraction += 0.3;
    }
    if PREMIUM_AREA_KEYWORDS.iter().any(|kw| address.contains(kw)) {
        fraction += 0.2;
    }

    WEIGHT_LOCATION * fraction.min(1.0)
}

/// Phone quality: a typed mobile candidate is full points, any phone at all
/// is 60%, nothing is 0.
fn score_phone_quality(h: &Homeowner) -> f64 {
    if h.phones.iter().any(|c| c.is_mobile()) {
        WEIGHT_PHONE_QUALITY
    } else if h.has_phone() {
        WEIGHT_PHONE_QUALITY * 0.6
    } else {
        0.0
    }
}

/// Human-readable reasons: one templated sentence per factor whose
/// sub-score clears the "strong" bar (70% of its weight; 60% for home age).
pub fn explain(h: &Homeowner) -> Vec<String> {
    explain_at(h, Utc::now().date_naive())
}

pub fn explain_at(h: &Homeowner, today: NaiveDate) -> Vec<String> {
    let b = score_at(h, today).breakdown;
    let mut reasons = Vec::new();

    if b.lot_size >= WEIGHT_LOT_SIZE * 0.7 {
        let acres = h.lot_acres.or(h.lot_sqft.map(|s| s / ACRE_SQFT)).unwrap_or(0.0);
        reasons.push(format!("Large lot ({acres:.2} acres) with room to build"));
    }
    if b.home_value >= WEIGHT_HOME_VALUE * 0.7 {
        let value = h.estimated_value.unwrap_or(0.0);
        reasons.push(format!("High-value home (est. ${:.0}K)", value / 1_000.0));
    }
    if b.home_age >= WEIGHT_HOME_AGE * 0.6 {
        // The 60% bar is only reachable with a known year built.
        if let Some(year) = h.year_built {
            reasons.push(format!("Older home (built {year}) likely due for a rebuild"));
        }
    }
    if b.recent_purchase >= WEIGHT_RECENT_PURCHASE * 0.7 {
        reasons.push("Purchased recently; owner is actively investing".to_string());
    }
    if b.location >= WEIGHT_LOCATION * 0.7 {
        reasons.push("Desirable location signals (corner/main road/premium area)".to_string());
    }
    if b.phone_quality >= WEIGHT_PHONE_QUALITY * 0.7 {
        reasons.push("Direct mobile number on file".to_string());
    }

    reasons
}

/// Drop records scoring under `min_score`. Pure except for a count log.
pub fn filter_by_score(homeowners: Vec<Homeowner>, min_score: u32) -> Vec<Homeowner> {
    let before = homeowners.len();
    let kept: Vec<Homeowner> = homeowners
        .into_iter()
        .filter(|h| h.score.unwrap_or(0) >= min_score)
        .collect();
    tracing::info!(
        "Score filter (min {}): kept {}/{}",
        min_score,
        kept.len(),
        before
    );
    kept
}

/// Sort best-first. Pure except for a count log.
pub fn sort_by_score_desc(homeowners: &mut [Homeowner]) {
    homeowners.sort_by(|a, b| b.score.unwrap_or(0).cmp(&a.score.unwrap_or(0)));
    tracing::debug!("Sorted {} records by score descending", homeowners.len());
}

/// Reporting buckets. These use 75/50 boundaries, intentionally different
/// from the 75/60 priority tiers; both bandings are exposed, never unified.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreDistribution {
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
}

pub fn score_distribution(homeowners: &[Homeowner]) -> ScoreDistribution {
    let mut dist = ScoreDistribution::default();
    for h in homeowners {
        match h.score.unwrap_or(0) {
            s if s >= 75 => dist.hot += 1,
            s if s >= 50 => dist.warm += 1,
            _ => dist.cold += 1,
        }
    }
    dist
}
