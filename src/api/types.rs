//! Mosque-times API types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Venue identifier in canonical form.
///
/// Endpoints disagree on whether ids are numbers or numeric strings; `7`,
/// `7.0`, `"7"`, `"7.0"` and `" 007 "` all canonicalise to `"7"`.
/// Non-numeric ids are only trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self(n.to_string());
        }
        if let Ok(n) = trimmed.parse::<u64>() {
            return Self(n.to_string());
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Self(canonical_float(f)),
            _ => Self(trimmed.to_string()),
        }
    }

    /// Canonicalise a JSON id. Fractional numbers keep their decimal form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self::new(s)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else if let Some(u) = n.as_u64() {
                    Some(Self(u.to_string()))
                } else {
                    n.as_f64().map(|f| Self(canonical_float(f)))
                }
            }
            _ => None,
        }
    }
}

/// Whole floats print without a fractional part so `7.0` and `7` agree.
fn canonical_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VenueId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        VenueId::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid venue id: {}", value)))
    }
}

/// Geographic position of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The five daily prayers, in order. Other columns (sunrise, jummah,
/// jamaat times) stay plain events on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prayer {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const FIVE: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Prayer::Fajr => "fajr",
            Prayer::Dhuhr => "dhuhr",
            Prayer::Asr => "asr",
            Prayer::Maghrib => "maghrib",
            Prayer::Isha => "isha",
        }
    }
}

/// Columns of a prayer-times row that are not event times.
const METADATA_COLUMNS: &[&str] = &[
    "mosque_id",
    "id",
    "date",
    "city",
    "created_at",
    "updated_at",
    "scraped_at",
];

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*[AaPp][Mm])?$")
            .expect("time pattern is valid")
    })
}

/// Whether a time string is a placeholder rather than a real reading.
///
/// Anything that is not clock-shaped (`""`, `"--:--"`, `"N/A"`) and any
/// all-zero clock (`"00:00"`, `"0:00:00"`) is a placeholder.
pub fn time_is_placeholder(value: &str) -> bool {
    let Some(caps) = time_pattern().captures(value.trim()) else {
        return true;
    };

    caps.iter()
        .skip(1)
        .flatten()
        .all(|m| m.as_str().chars().all(|c| c == '0'))
}

/// Named event times for one venue on one date.
///
/// `None` is the "unset" sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeRecord {
    pub events: BTreeMap<String, Option<String>>,
}

impl TimeRecord {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(mut self, event: &str, time: Option<&str>) -> Self {
        self.events
            .insert(event.to_string(), time.map(|t| t.to_string()));
        self
    }

    /// The real time for `event`, if any. Placeholders read as `None`.
    pub fn time(&self, event: &str) -> Option<&str> {
        self.events
            .get(event)?
            .as_deref()
            .filter(|t| !time_is_placeholder(t))
    }

    pub fn prayer(&self, prayer: Prayer) -> Option<&str> {
        self.time(prayer.key())
    }

    /// At least one event carries a real, non-placeholder time.
    pub fn is_valid(&self) -> bool {
        self.events
            .values()
            .flatten()
            .any(|t| !time_is_placeholder(t))
    }

    /// Split a raw prayer-times row into its venue key and event times.
    ///
    /// Returns `None` when the row has no usable `mosque_id`. String and
    /// null columns become events; metadata and other value types are
    /// ignored.
    pub fn from_row(row: &serde_json::Map<String, serde_json::Value>) -> Option<(VenueId, Self)> {
        let id = VenueId::from_json(row.get("mosque_id")?)?;

        let events = row
            .iter()
            .filter(|(k, _)| !METADATA_COLUMNS.contains(&k.as_str()))
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k.to_lowercase(), Some(s.clone()))),
                serde_json::Value::Null => Some((k.to_lowercase(), None)),
                _ => None,
            })
            .collect();

        Some((id, Self { events }))
    }
}

/// A prayer location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub times: Option<TimeRecord>,
}

/// Venues of one city with their times for one date. This is what the city
/// cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityBundle {
    pub city: String,
    pub date: String,
    pub venues: Vec<Venue>,
}

impl CityBundle {
    pub fn venues_with_times(&self) -> usize {
        self.venues.iter().filter(|v| v.times.is_some()).count()
    }
}

/// `GET /mosque-times/cities/{city}/mosques` row.
#[derive(Debug, Deserialize)]
pub(crate) struct MosqueRow {
    pub id: VenueId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl From<MosqueRow> for Venue {
    fn from(row: MosqueRow) -> Self {
        let coordinates = match (row.latitude, row.longitude) {
            // 0,0 is the backend's "unknown location" sentinel
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => Some(Coordinates {
                latitude: lat,
                longitude: lon,
            }),
            _ => None,
        };

        Venue {
            id: row.id,
            name: row.name,
            address: row.address.unwrap_or_default(),
            coordinates,
            times: None,
        }
    }
}

/// `GET /mosque-times/exists/{date}` body.
#[derive(Debug, Deserialize)]
pub(crate) struct ExistsResponse {
    pub exists: bool,
}

/// `GET .../prayer-times` body. Rows are parsed leniently one by one.
#[derive(Debug, Deserialize)]
pub(crate) struct PrayerTimesResponse {
    #[serde(rename = "prayerTimes", default)]
    pub prayer_times: Vec<serde_json::Value>,
}

/// `GET /mosque-times/wait-scraping-completion/{date}` body.
#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data_exists: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// What the long-poll reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReport {
    Completed { data_exists: bool },
    Timeout,
    Failed(String),
}

impl From<CompletionResponse> for CompletionReport {
    fn from(r: CompletionResponse) -> Self {
        match r.status.as_str() {
            "completed" if r.success => CompletionReport::Completed {
                data_exists: r.data_exists.unwrap_or(false),
            },
            "timeout" => CompletionReport::Timeout,
            other => CompletionReport::Failed(
                r.message
                    .unwrap_or_else(|| format!("unexpected status '{}'", other)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_venue_id_normalisation() {
        assert_eq!(VenueId::new(" 007 "), VenueId::new("7"));
        assert_eq!(VenueId::from_json(&json!(7)), Some(VenueId::new("7")));
        assert_eq!(VenueId::from_json(&json!(7.0)), Some(VenueId::new("7")));
        assert_eq!(VenueId::from_json(&json!("abc ")).unwrap().to_string(), "abc");
        assert_eq!(VenueId::from_json(&json!(null)), None);
        assert_eq!(VenueId::from_json(&json!("  ")), None);

        // Whole floats join with integers whichever side sends them.
        assert_eq!(VenueId::new("7.0"), VenueId::from_json(&json!(7)).unwrap());
        assert_eq!(VenueId::new(" 7.0 "), VenueId::from_json(&json!(7.0)).unwrap());
        assert_eq!(VenueId::new("7.5"), VenueId::from_json(&json!(7.5)).unwrap());
        assert_eq!(VenueId::new("inf").to_string(), "inf");
        assert_eq!(VenueId::new("A12").to_string(), "A12");

        let id: VenueId = serde_json::from_value(json!("12")).unwrap();
        assert_eq!(id, VenueId::from_json(&json!(12)).unwrap());
    }

    #[test]
    fn test_placeholder_times() {
        for p in ["", "00:00", "00:00:00", "0:00", " 00:00:00 ", "--:--", "N/A", "TBC"] {
            assert!(time_is_placeholder(p), "{p:?} should be a placeholder");
        }
        for t in ["05:12", "5:12:00", "13:45:30", "00:30", "6:05 PM"] {
            assert!(!time_is_placeholder(t), "{t:?} should be a real time");
        }
    }

    #[test]
    fn test_time_record_validity() {
        assert!(!TimeRecord::new().is_valid());
        assert!(!TimeRecord::new()
            .with("fajr", Some("00:00:00"))
            .with("isha", None)
            .is_valid());
        let rec = TimeRecord::new()
            .with("fajr", Some("00:00:00"))
            .with("jummah", Some("13:30"));
        assert!(rec.is_valid());
        assert_eq!(rec.prayer(Prayer::Fajr), None);
        assert_eq!(rec.time("jummah"), Some("13:30"));
    }

    #[test]
    fn test_from_row() {
        let row = json!({
            "id": 99,
            "mosque_id": "3",
            "date": "2024-03-15",
            "Fajr": "05:01:00",
            "isha": null,
            "jummah_count": 2
        });
        let (id, rec) = TimeRecord::from_row(row.as_object().unwrap()).unwrap();
        assert_eq!(id, VenueId::new("3"));
        assert_eq!(rec.prayer(Prayer::Fajr), Some("05:01:00"));
        assert_eq!(rec.events.get("isha"), Some(&None));
        assert_eq!(rec.events.len(), 2);

        let orphan = json!({ "fajr": "05:00" });
        assert!(TimeRecord::from_row(orphan.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_completion_report() {
        let parse = |v: serde_json::Value| {
            CompletionReport::from(serde_json::from_value::<CompletionResponse>(v).unwrap())
        };
        assert_eq!(
            parse(json!({"success": true, "status": "completed", "data_exists": true})),
            CompletionReport::Completed { data_exists: true }
        );
        assert_eq!(
            parse(json!({"success": false, "status": "timeout"})),
            CompletionReport::Timeout
        );
        assert!(matches!(
            parse(json!({"success": false, "status": "error", "message": "boom"})),
            CompletionReport::Failed(m) if m == "boom"
        ));
    }

    #[test]
    fn test_mosque_row_zero_coordinates() {
        let row: MosqueRow =
            serde_json::from_value(json!({"id": 1, "name": "Central", "latitude": 0.0, "longitude": 0.0}))
                .unwrap();
        let venue = Venue::from(row);
        assert!(venue.coordinates.is_none());
        assert_eq!(venue.address, "");
    }
}
