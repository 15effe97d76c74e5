use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A candidate contact number attached to a homeowner by skip tracing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhoneCandidate {
    pub number: String,
    /// Provider-reported line type ("mobile", "landline", "voip", ...).
    pub phone_type: Option<String>,
    /// Provider believes the number is currently reachable.
    #[serde(default)]
    pub reachable: bool,
    /// Do-not-call flag; excluded from automatic selection.
    #[serde(default)]
    pub dnc: bool,
    /// Provider-assigned quality score for the number, when given.
    pub score: Option<i64>,
}

impl PhoneCandidate {
    /// True when the provider typed this number as a mobile line.
    pub fn is_mobile(&self) -> bool {
        self.phone_type
            .as_deref()
            .map(|t| {
                let t = t.to_ascii_lowercase();
                t.contains("mobile") || t.contains("cell") || t.contains("wireless")
            })
            .unwrap_or(false)
    }
}

/// Priority tier derived from the Thirsty Buyer score.
///
/// Boundaries (75/60) are intentionally different from the 75/50 reporting
/// buckets in `scoring::score_distribution`; both bandings are part of the
/// external contract and stay independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn from_score(total: u32) -> Self {
        if total >= 75 {
            Priority::High
        } else if total >= 60 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

/// Per-factor point allocation behind a total score. Each value is already
/// in absolute points, not a percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub lot_size: f64,
    pub home_value: f64,
    pub home_age: f64,
    pub recent_purchase: f64,
    pub location: f64,
    pub phone_quality: f64,
}

impl ScoreBreakdown {
    /// Factor name / points pairs, in weight order.
    pub fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("lot_size", self.lot_size),
            ("home_value", self.home_value),
            ("home_age", self.home_age),
            ("recent_purchase", self.recent_purchase),
            ("location", self.location),
            ("phone_quality", self.phone_quality),
        ]
    }

    pub fn total(&self) -> f64 {
        self.entries().iter().map(|(_, v)| v).sum()
    }
}

/// The unit flowing through every pipeline stage. Created by the search
/// client; later stages only add fields, they never clear earlier ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Homeowner {
    // Identity
    pub property_id: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub full_address: String,

    // Owner
    pub owner_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Corporate entity (LLC / Inc / Trust); name is kept whole, never split.
    #[serde(default)]
    pub is_business: bool,

    // Contact
    pub phone: Option<String>,
    #[serde(default)]
    pub phones: Vec<PhoneCandidate>,
    pub email: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,

    // Property attributes
    pub lot_sqft: Option<f64>,
    pub lot_acres: Option<f64>,
    pub building_sqft: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub year_built: Option<i32>,
    pub stories: Option<u32>,
    #[serde(default)]
    pub corner_lot: bool,

    // Valuation
    pub estimated_value: Option<f64>,
    pub estimated_equity: Option<f64>,
    pub last_sale_date: Option<NaiveDate>,
    pub last_sale_price: Option<f64>,

    // Derived
    pub score: Option<u32>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub is_region_phone: bool,
    pub area_code: Option<String>,
    #[serde(default)]
    pub phone_verified: bool,
    pub phone_line_type: Option<String>,
    pub phone_confidence: Option<f64>,
}

impl Homeowner {
    /// True when the record carries any phone information at all.
    pub fn has_phone(&self) -> bool {
        self.phone.is_some() || !self.phones.is_empty()
    }

    /// True when any attached number is typed as a mobile line, or carrier
    /// lookup resolved the selected phone to mobile.
    pub fn has_mobile(&self) -> bool {
        self.phones.iter().any(PhoneCandidate::is_mobile)
            || self
                .phone_line_type
                .as_deref()
                .map(|t| t.eq_ignore_ascii_case("mobile"))
                .unwrap_or(false)
    }
}

/// Parse an owner name into (first, last, is_business).
///
/// Corporate entities are detected by LLC / Inc / Trust markers and kept
/// whole: the organizational name goes in neither first nor last. Personal
/// names split on the first whitespace token vs. the remainder.
pub fn parse_owner_name(name: &str) -> (Option<String>, Option<String>, bool) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return (None, None, false);
    }

    let upper = trimmed.to_uppercase();
    let is_business = ["LLC", "INC", "TRUST"]
        .iter()
        .any(|marker| upper.split(|c: char| !c.is_alphanumeric()).any(|w| w == *marker));
    if is_business {
        return (None, None, true);
    }

    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (
            Some(first.to_string()),
            Some(rest.trim().to_string()),
            false,
        ),
        None => (Some(trimmed.to_string()), None, false),
    }
}

/// Compose the canonical single-line address used for de-duplication and
/// display: "street, city, ST zip".
pub fn compose_full_address(street: &str, city: &str, state: &str, zip: &str) -> String {
    let mut out = street.trim().to_string();
    if !city.trim().is_empty() {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(city.trim());
    }
    let tail = format!("{} {}", state.trim(), zip.trim());
    let tail = tail.trim();
    if !tail.is_empty() {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(tail);
    }
    out
}
