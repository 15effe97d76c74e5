use crate::models::Homeowner;
use serde::Serialize;
use std::collections::HashMap;

/// Extract a 3-digit area code from a raw phone string.
///
/// Accepts 10-digit numbers (first three digits) and 11-digit numbers with
/// a leading country code 1 (digits 2-4). Any other digit count yields no
/// area code.
pub fn extract_area_code(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(digits[..3].to_string()),
        11 if digits.starts_with('1') => Some(digits[1..4].to_string()),
        _ => None,
    }
}

/// One row of the pre/post-filter area-code histogram.
#[derive(Debug, Clone, Serialize)]
pub struct AreaCodeCount {
    pub area_code: String,
    pub count: usize,
    pub allowed: bool,
}

/// Running tallies for the run report.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FilterStats {
    pub kept: usize,
    pub dropped: usize,
    pub no_phone: usize,
}

/// Hard pass/fail gate on the phone-number region allow-list.
///
/// Region mismatch removes the record entirely regardless of any other
/// quality signal; this is deliberately not a scoring factor.
pub struct RegionPhoneFilter {
    allowed: Vec<String>,
    stats: FilterStats,
}

impl RegionPhoneFilter {
    pub fn new(allowed_area_codes: Vec<String>) -> Self {
        Self {
            allowed: allowed_area_codes,
            stats: FilterStats::default(),
        }
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    fn is_allowed(&self, area_code: &str) -> bool {
        self.allowed.iter().any(|c| c == area_code)
    }

    /// Best dialable number for a record: the already-selected phone wins;
    /// otherwise prefer an allow-listed mobile candidate, then any
    /// allow-listed candidate, then the first candidate regardless of
    /// region.
    pub fn best_phone(&self, h: &Homeowner) -> Option<String> {
        if let Some(phone) = &h.phone {
            return Some(phone.clone());
        }

        let in_region = |number: &str| {
            extract_area_code(number)
                .map(|code| self.is_allowed(&code))
                .unwrap_or(false)
        };

        h.phones
            .iter()
            .find(|c| c.is_mobile() && in_region(&c.number))
            .or_else(|| h.phones.iter().find(|c| in_region(&c.number)))
            .or_else(|| h.phones.first())
            .map(|c| c.number.clone())
    }

    /// Keep the record only if its best phone resolves to an allow-listed
    /// area code; promote that phone and annotate the region fields.
    pub fn filter(&mut self, mut h: Homeowner) -> Option<Homeowner> {
        let Some(phone) = self.best_phone(&h) else {
            self.stats.no_phone += 1;
            tracing::debug!("Dropping {}: no phone", h.full_address);
            return None;
        };

        match extract_area_code(&phone) {
            Some(code) if self.is_allowed(&code) => {
                self.stats.kept += 1;
                h.phone = Some(phone);
                h.is_region_phone = true;
                h.area_code = Some(code);
                Some(h)
            }
            code => {
                self.stats.dropped += 1;
                tracing::debug!(
                    "Dropping {}: area code {:?} outside region",
                    h.full_address,
                    code
                );
                None
            }
        }
    }

    /// Filter a whole record set, logging the tallies once.
    pub fn filter_all(&mut self, homeowners: Vec<Homeowner>) -> Vec<Homeowner> {
        let before = homeowners.len();
        let kept: Vec<Homeowner> = homeowners.into_iter().filter_map(|h| self.filter(h)).collect();
        tracing::info!(
            "Region filter: kept {}/{} (dropped {}, no phone {})",
            kept.len(),
            before,
            self.stats.dropped,
            self.stats.no_phone
        );
        kept
    }

    /// Area-code histogram over a record set, sorted by count descending
    /// (ties by code), annotated with allow-list membership. Used for
    /// pre/post-filter visibility in the report.
    pub fn area_code_distribution(&self, homeowners: &[Homeowner]) -> Vec<AreaCodeCount> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for h in homeowners {
            if let Some(code) = self
                .best_phone(h)
                .as_deref()
                .and_then(extract_area_code)
            {
                *counts.entry(code).or_insert(0) += 1;
            }
        }

        let mut rows: Vec<AreaCodeCount> = counts
            .into_iter()
            .map(|(area_code, count)| AreaCodeCount {
                allowed: self.is_allowed(&area_code),
                area_code,
                count,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.area_code.cmp(&b.area_code))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhoneCandidate;

    fn phoenix_filter() -> RegionPhoneFilter {
        RegionPhoneFilter::new(vec!["480".into(), "602".into(), "623".into()])
    }

    fn with_candidates(numbers: &[(&str, &str)]) -> Homeowner {
        Homeowner {
            phones: numbers
                .iter()
                .map(|(number, phone_type)| PhoneCandidate {
                    number: number.to_string(),
                    phone_type: Some(phone_type.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn area_code_from_ten_digits() {
        assert_eq!(extract_area_code("(480) 555-0100").as_deref(), Some("480"));
        assert_eq!(extract_area_code("4805550100").as_deref(), Some("480"));
    }

    #[test]
    fn area_code_from_eleven_digits_with_country_code() {
        assert_eq!(extract_area_code("1-602-555-0100").as_deref(), Some("602"));
        assert_eq!(extract_area_code("+16025550100").as_deref(), Some("602"));
    }

    #[test]
    fn bad_lengths_yield_none() {
        assert_eq!(extract_area_code("555-0100"), None); // 7 digits
        assert_eq!(extract_area_code(""), None);
        assert_eq!(extract_area_code("25550100123"), None); // 11, no leading 1
        assert_eq!(extract_area_code("123456789012"), None); // 12
    }

    #[test]
    fn selected_phone_takes_precedence() {
        let filter = phoenix_filter();
        let mut h = with_candidates(&[("4805550111", "mobile")]);
        h.phone = Some("9285550100".to_string());
        assert_eq!(filter.best_phone(&h).as_deref(), Some("9285550100"));
    }

    #[test]
    fn region_mobile_preferred_over_region_landline() {
        let filter = phoenix_filter();
        let h = with_candidates(&[("6025550100", "landline"), ("4805550200", "mobile")]);
        assert_eq!(filter.best_phone(&h).as_deref(), Some("4805550200"));
    }

    #[test]
    fn out_of_region_first_candidate_is_last_resort() {
        let filter = phoenix_filter();
        let h = with_candidates(&[("2125550100", "landline"), ("3105550200", "mobile")]);
        assert_eq!(filter.best_phone(&h).as_deref(), Some("2125550100"));
    }

    #[test]
    fn filter_keeps_region_phone_and_annotates() {
        let mut filter = phoenix_filter();
        let h = with_candidates(&[("4805550100", "mobile")]);
        let kept = filter.filter(h).expect("in-region record kept");
        assert_eq!(kept.phone.as_deref(), Some("4805550100"));
        assert!(kept.is_region_phone);
        assert_eq!(kept.area_code.as_deref(), Some("480"));
        assert_eq!(filter.stats().kept, 1);
    }

    #[test]
    fn filter_drops_out_of_region_and_no_phone() {
        let mut filter = phoenix_filter();
        assert!(filter.filter(with_candidates(&[("2125550100", "mobile")])).is_none());
        assert!(filter.filter(Homeowner::default()).is_none());
        let stats = filter.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.no_phone, 1);
        assert_eq!(stats.kept, 0);
    }

    #[test]
    fn distribution_sorted_by_count_desc() {
        let filter = phoenix_filter();
        let records = vec![
            with_candidates(&[("4805550001", "mobile")]),
            with_candidates(&[("4805550002", "mobile")]),
            with_candidates(&[("2125550003", "mobile")]),
        ];
        let rows = filter.area_code_distribution(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].area_code, "480");
        assert_eq!(rows[0].count, 2);
        assert!(rows[0].allowed);
        assert_eq!(rows[1].area_code, "212");
        assert!(!rows[1].allowed);
    }
}
