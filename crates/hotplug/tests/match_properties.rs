//! Property-based tests for filter matching
//!
//! Run with: `cargo test -p hotplug --test match_properties`

use hotplug::{DeviceDescriptor, Filter, MATCH_ANY, MatchValue, matches};
use proptest::prelude::*;

/// Ids biased towards the boundaries of the 16-bit range
fn id_value() -> impl Strategy<Value = u16> {
    prop_oneof![Just(0x0000u16), Just(0xFFFFu16), Just(0x0001u16), Just(0xFFFEu16), any::<u16>()]
}

fn class_value() -> impl Strategy<Value = u8> {
    prop_oneof![Just(0x00u8), Just(0xFFu8), any::<u8>()]
}

fn id_field() -> impl Strategy<Value = MatchValue> {
    prop_oneof![
        Just(MatchValue::Any),
        id_value().prop_map(MatchValue::from),
    ]
}

fn class_field() -> impl Strategy<Value = MatchValue> {
    prop_oneof![
        Just(MatchValue::Any),
        class_value().prop_map(MatchValue::from),
    ]
}

fn descriptor() -> impl Strategy<Value = DeviceDescriptor> {
    (id_value(), id_value(), class_value())
        .prop_map(|(vendor, product, class)| DeviceDescriptor::new(vendor, product, class))
}

fn field_passes(field: MatchValue, value: u32) -> bool {
    match field {
        MatchValue::Any => true,
        MatchValue::Exact(expected) => expected == value,
    }
}

proptest! {
    #[test]
    fn prop_matches_iff_every_field_passes(
        vendor in id_field(),
        product in id_field(),
        class in class_field(),
        desc in descriptor(),
    ) {
        let filter = Filter {
            vendor_id: vendor,
            product_id: product,
            class_code: class,
            ..Filter::default()
        };

        let expected = field_passes(vendor, u32::from(desc.vendor_id))
            && field_passes(product, u32::from(desc.product_id))
            && field_passes(class, u32::from(desc.class_code));

        prop_assert_eq!(matches(&filter, &desc), expected);
    }

    #[test]
    fn prop_exact_filter_matches_only_itself(desc in descriptor(), other in descriptor()) {
        let filter = Filter {
            vendor_id: desc.vendor_id.into(),
            product_id: desc.product_id.into(),
            class_code: desc.class_code.into(),
            ..Filter::default()
        };

        prop_assert!(matches(&filter, &desc));
        prop_assert_eq!(matches(&filter, &other), other == desc);
    }

    #[test]
    fn prop_legal_values_never_decode_as_wildcard(value in 0u32..=0xFFFF) {
        prop_assert_eq!(MatchValue::from_raw(value), MatchValue::Exact(value));
        prop_assert!(MatchValue::from_raw(value).to_raw() != MATCH_ANY);
    }

    #[test]
    fn prop_filter_validation_accepts_legal_ranges(
        vendor in id_field(),
        product in id_field(),
        class in class_field(),
    ) {
        let filter = Filter {
            vendor_id: vendor,
            product_id: product,
            class_code: class,
            ..Filter::default()
        };
        prop_assert!(filter.validate().is_ok());
    }

    #[test]
    fn prop_filter_validation_rejects_wide_ids(raw in 0x1_0000u32..MATCH_ANY) {
        let filter = Filter {
            vendor_id: MatchValue::from_raw(raw),
            ..Filter::default()
        };
        prop_assert!(filter.validate().is_err());
    }
}
