//! Property-based tests for the transform pipeline
//!
//! These check the behavior that has to hold for any record and any config:
//! instructions that miss are reported rather than silently ignored, strict
//! mode stops at the first miss, the caller's value is never modified, and
//! config merging behaves like a union.

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use shipment_archive::{
    ArchiveError,
    transform::{Operation, ROOT, TransformConfig},
};

/// Field names drawn from a small alphabet so removals sometimes hit
fn field_name() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

/// A flat record of scalar fields
fn record() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(field_name(), scalar(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// A record with a nested object at `driver` and a nested list at `items`
fn nested_record() -> impl Strategy<Value = Value> {
    (record(), record(), prop::collection::vec(record(), 0..4)).prop_map(|(top, driver, items)| {
        let mut top = top;
        top.insert("driver".into(), Value::Object(driver));
        top.insert(
            "items".into(),
            Value::Array(items.into_iter().map(Value::Object).collect()),
        );
        Value::Object(top)
    })
}

fn config() -> impl Strategy<Value = TransformConfig> {
    (
        prop::collection::vec(field_name(), 0..4),
        prop::collection::vec(field_name(), 0..3),
        prop::collection::vec(field_name(), 0..3),
        prop::collection::vec((field_name(), field_name()), 0..3),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(root, driver, items, moves, strict)| {
            let mut config = TransformConfig::new()
                .remove(ROOT, root)
                .remove("driver", driver)
                .remove("items", items);
            for (from, to) in moves {
                config = config.relocate(&from, &to);
            }
            match strict {
                Some(strict) => config.strict(strict),
                None => config,
            }
        })
}

proptest! {
    /// Removing keys that do not exist leaves the record unchanged and
    /// reports one warning per missing key.
    #[test]
    fn absent_paths_warn_without_changing_data(data in record()) {
        let absent: Vec<String> = vec!["zz_missing".into(), "zz_other".into()];
        let config = TransformConfig::new()
            .remove(ROOT, absent.clone())
            .remove("zz_parent", ["x"])
            .relocate("zz_from", "zz_to");
        let input = Value::Object(data);

        let out = config.transform(&input).unwrap();

        prop_assert_eq!(&out.value, &input);
        prop_assert_eq!(out.warnings.len(), 4);
        prop_assert_eq!(out.warnings[0].key.as_str(), "zz_missing");
        prop_assert_eq!(out.warnings[2].operation, Operation::DeleteParent);
        prop_assert_eq!(out.warnings[3].operation, Operation::Move);
    }

    /// Under strict mode the same config raises instead.
    #[test]
    fn absent_paths_raise_in_strict_mode(data in record()) {
        let config = TransformConfig::new()
            .remove(ROOT, ["zz_missing"])
            .strict(true);

        let result = config.transform(&Value::Object(data));

        prop_assert!(matches!(result, Err(ArchiveError::StrictTransform(_))));
    }

    /// Strict mode stops before later instructions: a miss in the first
    /// removal aborts even though the second would have succeeded.
    #[test]
    fn strict_mode_stops_at_first_miss(mut data in record(), present in field_name()) {
        data.insert(present.clone(), json!(1));
        data.remove("zz_missing");
        let config = TransformConfig::new()
            .remove(ROOT, vec!["zz_missing".to_string(), present])
            .strict(true);

        let err = config.transform(&Value::Object(data)).unwrap_err();

        prop_assert!(err.to_string().contains("'zz_missing'"));
    }

    /// Transforming never mutates the caller's value.
    #[test]
    fn input_is_never_mutated(data in nested_record(), config in config()) {
        let before = data.clone();

        let _ = config.transform(&data);

        prop_assert_eq!(data, before);
    }

    /// Every configured root removal is absent from the output.
    #[test]
    fn removed_root_fields_are_gone(data in nested_record(), config in config()) {
        let config = config.strict(false);
        let out = config.transform(&data).unwrap();

        // relocations run after removals and may reintroduce a key
        if config.moves().is_empty() {
            let obj = out.value.as_object().unwrap();
            for field in config.fields_at(ROOT).unwrap_or_default() {
                prop_assert!(!obj.contains_key(field));
            }
        }
    }

    /// A list is transformed element by element, in order.
    #[test]
    fn lists_match_element_wise(items in prop::collection::vec(nested_record(), 0..5), config in config()) {
        let config = config.strict(false);
        let list = Value::Array(items.clone());

        let out = config.transform(&list).unwrap();

        let expected: Vec<Value> = items
            .iter()
            .map(|item| config.transform(item).unwrap().value)
            .collect();
        prop_assert_eq!(out.value, Value::Array(expected));
    }

    /// Merging unions removal fields per path.
    #[test]
    fn merge_is_a_union(a in config(), b in config()) {
        let merged = a.merge(&b);

        for source in [&a, &b] {
            for removal in source.removals() {
                let fields = merged.fields_at(&removal.path).unwrap();
                for field in &removal.fields {
                    prop_assert!(fields.contains(field));
                }
            }
            for mv in source.moves() {
                prop_assert!(merged.moves().contains(mv));
            }
        }
    }

    /// Merging never duplicates fields or relocations.
    #[test]
    fn merge_deduplicates(a in config(), b in config()) {
        let merged = a.merge(&b).merge(&b);

        for removal in merged.removals() {
            let mut fields = removal.fields.clone();
            fields.sort();
            fields.dedup();
            prop_assert_eq!(fields.len(), removal.fields.len());
        }
        let moves: HashSet<_> = merged.moves().iter().collect();
        prop_assert_eq!(moves.len(), merged.moves().len());
        prop_assert_eq!(&a.merge(&b), &merged);
    }

    /// The last config that sets the strict flag wins.
    #[test]
    fn merge_strict_flag_last_wins(a in any::<bool>(), b in prop::option::of(any::<bool>())) {
        let first = TransformConfig::new().strict(a);
        let second = match b {
            Some(b) => TransformConfig::new().strict(b),
            None => TransformConfig::new(),
        };

        let merged = TransformConfig::merge_all([&first, &second]);

        prop_assert_eq!(merged.is_strict(), b.unwrap_or(a));
    }
}
