/// Property-based tests using proptest.
/// Invariants that must hold for all inputs: area-code extraction shape,
/// E.164 normalization shape, score bounds and determinism, dedup-key
/// stability.
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_leadgen_pipeline::models::{Homeowner, PhoneCandidate};
use rust_leadgen_pipeline::phone_verify::normalize_e164;
use rust_leadgen_pipeline::progress::address_dedup_key;
use rust_leadgen_pipeline::region_filter::extract_area_code;
use rust_leadgen_pipeline::scoring::score_at;

// Property: area-code extraction never panics and only ever returns a
// 3-digit code.
proptest! {
    #[test]
    fn area_code_extraction_never_panics(phone in "\\PC*") {
        let _ = extract_area_code(&phone);
    }

    #[test]
    fn extracted_area_codes_are_three_digits(phone in "\\PC*") {
        if let Some(code) = extract_area_code(&phone) {
            prop_assert_eq!(code.len(), 3);
            prop_assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn ten_digit_numbers_yield_their_prefix(digits in "[0-9]{10}") {
        let code = extract_area_code(&digits);
        prop_assert_eq!(code.as_deref(), Some(&digits[..3]));
    }

    #[test]
    fn eleven_digits_with_leading_one_skip_country_code(rest in "[0-9]{10}") {
        let phone = format!("1{rest}");
        let code = extract_area_code(&phone);
        prop_assert_eq!(code.as_deref(), Some(&rest[..3]));
    }

    #[test]
    fn formatting_noise_does_not_change_the_code(area in "[2-9][0-9]{2}", rest in "[0-9]{7}") {
        let bare = format!("{area}{rest}");
        let formatted = format!("({}) {}-{}", area, &rest[..3], &rest[3..]);
        prop_assert_eq!(extract_area_code(&bare), extract_area_code(&formatted));
    }

    #[test]
    fn wrong_lengths_never_yield_a_code(digits in "[0-9]{0,9}|[0-9]{12,20}") {
        prop_assert_eq!(extract_area_code(&digits), None);
    }
}

// Property: E.164 normalization shape.
proptest! {
    #[test]
    fn normalize_never_panics(raw in "\\PC*") {
        let _ = normalize_e164(&raw);
    }

    #[test]
    fn normalized_numbers_are_plus_then_digits(raw in "\\PC*") {
        if let Some(e164) = normalize_e164(&raw) {
            prop_assert!(e164.starts_with('+'));
            prop_assert!(e164[1..].chars().all(|c| c.is_ascii_digit()));
            let len = e164.len() - 1;
            prop_assert!((10..=15).contains(&len));
        }
    }

    #[test]
    fn ten_digit_input_gains_country_code(digits in "[0-9]{10}") {
        let e164 = normalize_e164(&digits).unwrap();
        prop_assert_eq!(e164, format!("+1{digits}"));
    }

    #[test]
    fn short_numbers_rejected(digits in "[0-9]{0,9}") {
        prop_assert_eq!(normalize_e164(&digits), None);
    }
}

// Property: the score is pure and bounded for arbitrary records.
proptest! {
    #[test]
    fn score_is_bounded_and_deterministic(
        lot in proptest::option::of(0.0f64..200_000.0),
        value in proptest::option::of(0.0f64..10_000_000.0),
        year in proptest::option::of(1900i32..2026),
        sale_days_ago in proptest::option::of(0i64..4000),
        has_mobile in proptest::bool::ANY,
        corner in proptest::bool::ANY,
        street_word in "[a-zA-Z]{1,12}",
    ) {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let h = Homeowner {
            full_address: format!("12 {street_word} Way, Scottsdale, AZ 85251"),
            lot_sqft: lot,
            estimated_value: value,
            year_built: year,
            last_sale_date: sale_days_ago.map(|d| today - chrono::Duration::days(d)),
            corner_lot: corner,
            phones: if has_mobile {
                vec![PhoneCandidate {
                    number: "4805550100".to_string(),
                    phone_type: Some("mobile".to_string()),
                    ..Default::default()
                }]
            } else {
                vec![]
            },
            ..Default::default()
        };

        let first = score_at(&h, today);
        let second = score_at(&h, today);

        prop_assert!(first.total <= 100);
        prop_assert_eq!(first.total, second.total);
        prop_assert_eq!(&first.breakdown, &second.breakdown);
        // The breakdown always accounts for the total.
        prop_assert_eq!(first.breakdown.total().round() as u32, first.total);
    }
}

// Property: the address dedup key is stable under case and padding.
proptest! {
    #[test]
    fn dedup_key_ignores_case_and_padding(addr in "[a-zA-Z0-9 ]{1,40}") {
        let a = address_dedup_key(&addr);
        let b = address_dedup_key(&format!("  {}  ", addr.to_uppercase()));
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
    }

    #[test]
    fn distinct_addresses_get_distinct_keys(a in "[a-z]{5,20}", b in "[a-z]{5,20}") {
        prop_assume!(a != b);
        prop_assert_ne!(address_dedup_key(&a), address_dedup_key(&b));
    }
}
