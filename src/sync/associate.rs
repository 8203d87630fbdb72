//! Joining venues with their time records.

use std::collections::HashMap;

use crate::api::{CityBundle, TimeRecord, Venue, VenueId};

/// Attach to each venue the time record whose key matches its id.
///
/// Ids are compared in canonical [`VenueId`] form. Venues without a record
/// get `times: None`; the output has one entry per input venue, in order.
/// If several records share a key the first one wins.
pub fn associate(venues: Vec<Venue>, records: Vec<(VenueId, TimeRecord)>) -> Vec<Venue> {
    let mut index: HashMap<VenueId, TimeRecord> = HashMap::with_capacity(records.len());
    for (id, record) in records {
        index.entry(id).or_insert(record);
    }

    venues
        .into_iter()
        .map(|mut venue| {
            venue.times = index.get(&venue.id).cloned();
            venue
        })
        .collect()
}

/// False when no venue has a single real time, i.e. the data is
/// indistinguishable from "not scraped yet". An empty bundle is unusable.
pub fn is_bundle_usable(bundle: &CityBundle) -> bool {
    bundle
        .venues
        .iter()
        .any(|v| v.times.as_ref().is_some_and(TimeRecord::is_valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn venue(id: serde_json::Value) -> Venue {
        Venue {
            id: VenueId::from_json(&id).unwrap(),
            name: format!("Mosque {}", id),
            address: String::new(),
            coordinates: None,
            times: None,
        }
    }

    fn record(fajr: &str) -> TimeRecord {
        TimeRecord::new().with("fajr", Some(fajr)).with("isha", Some("20:10"))
    }

    fn bundle(venues: Vec<Venue>) -> CityBundle {
        CityBundle {
            city: "Birmingham".into(),
            date: "2024-03-15".into(),
            venues,
        }
    }

    #[test]
    fn test_joins_numbers_with_numeric_strings() {
        let venues = vec![venue(json!(1)), venue(json!("2")), venue(json!(3))];
        let records = vec![
            (VenueId::from_json(&json!("1")).unwrap(), record("05:01")),
            (VenueId::from_json(&json!(2)).unwrap(), record("05:02")),
            (VenueId::new("99"), record("05:99")),
        ];

        let merged = associate(venues, records);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].times.as_ref().unwrap().time("fajr"), Some("05:01"));
        assert_eq!(merged[1].times.as_ref().unwrap().time("fajr"), Some("05:02"));
        assert!(merged[2].times.is_none());
    }

    #[test]
    fn test_output_length_matches_venues() {
        assert!(associate(Vec::new(), vec![(VenueId::new("1"), record("05:00"))]).is_empty());
        let merged = associate(vec![venue(json!(1)), venue(json!(1))], Vec::new());
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|v| v.times.is_none()));
    }

    #[test]
    fn test_duplicate_records_first_wins() {
        let merged = associate(
            vec![venue(json!(1))],
            vec![
                (VenueId::new("1"), record("05:01")),
                (VenueId::new("1"), record("06:01")),
            ],
        );
        assert_eq!(merged[0].times.as_ref().unwrap().time("fajr"), Some("05:01"));
    }

    #[test]
    fn test_usability() {
        assert!(!is_bundle_usable(&bundle(Vec::new())));
        assert!(!is_bundle_usable(&bundle(vec![venue(json!(1))])));

        let zeros = TimeRecord::new()
            .with("fajr", Some("00:00:00"))
            .with("dhuhr", Some("00:00:00"))
            .with("asr", None);
        let all_zero = associate(
            vec![venue(json!(1)), venue(json!(2))],
            vec![(VenueId::new("1"), zeros.clone()), (VenueId::new("2"), zeros)],
        );
        assert!(!is_bundle_usable(&bundle(all_zero)));

        let one_real = associate(
            vec![venue(json!(1)), venue(json!(2))],
            vec![(VenueId::new("2"), record("05:10"))],
        );
        assert!(is_bundle_usable(&bundle(one_real)));
    }
}
