//! Typed views of the Komoot JSON documents.
//!
//! Required tour metadata is enforced by the field types; anything the service
//! may omit is an `Option`. A response missing a required field fails to
//! decode and is reported as [`Error::DataValidation`].

use geo_types::Point;
use serde::{de, Deserialize, Deserializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{Error, Result};

/// Kind of a tour as reported in its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TourType {
    #[serde(rename = "tour_recorded")]
    Recorded,
    #[serde(rename = "tour_planned")]
    Planned,
    #[serde(other)]
    Other,
}

/// Tour type selection applied while listing tours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TypeFilter {
    #[default]
    All,
    Planned,
    Recorded,
}

impl TypeFilter {
    pub fn accepts(self, kind: TourType) -> bool {
        match self {
            Self::All => true,
            Self::Planned => kind == TourType::Planned,
            Self::Recorded => kind == TourType::Recorded,
        }
    }
}

/// Entry of the paginated tour list.
#[derive(Debug, Clone, Deserialize)]
pub struct TourSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TourType,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default, deserialize_with = "optional_rfc3339")]
    pub date: Option<OffsetDateTime>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub elevation_up: Option<f64>,
    #[serde(default)]
    pub elevation_down: Option<f64>,
}

impl TourSummary {
    /// One line of the tour listing.
    pub fn listing(&self) -> String {
        let date = self
            .date
            .map(|date| date.date().to_string())
            .unwrap_or_default();
        let mut line = format!(
            "{:>12} {date:>10}  {} ({})",
            self.id,
            self.name,
            self.sport.as_deref().unwrap_or("unknown")
        );
        if let Some(distance) = self.distance {
            line.push_str(&format!(", {:.1}km", distance / 1000.0));
        }
        if let Some(duration) = self.duration {
            line.push_str(&format!(", {:.2}h", duration / 3600.0));
        }
        if let (Some(up), Some(down)) = (self.elevation_up, self.elevation_down) {
            line.push_str(&format!(", +{up:.0}m/-{down:.0}m"));
        }
        line
    }
}

/// A single tour with its embedded route and timeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Tour {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(rename = "type")]
    pub kind: TourType,
    pub distance: f64,
    pub duration: f64,
    /// Kept as the JSON number so `210` and `210.0` print as sent.
    pub elevation_up: serde_json::Number,
    pub elevation_down: serde_json::Number,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(deserialize_with = "rfc3339")]
    pub date: OffsetDateTime,
    #[serde(rename = "_embedded")]
    pub embedded: TourEmbedded,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Difficulty {
    pub grade: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TourEmbedded {
    pub creator: Creator,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub timeline: Option<Timeline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Creator {
    pub display_name: String,
    #[serde(deserialize_with = "id_string")]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coordinates {
    pub items: Vec<Coordinate>,
}

/// A route coordinate or a POI location.
///
/// `t` is in whole milliseconds, either relative to the tour start or since the
/// Unix epoch; which one is decided per tour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Coordinate {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default, deserialize_with = "optional_millis")]
    pub t: Option<i64>,
}

impl Coordinate {
    pub fn is_empty(&self) -> bool {
        self.lat.is_none() && self.lng.is_none()
    }

    /// Position as an `x = longitude, y = latitude` point, if both are known.
    pub fn position(&self) -> Option<Point<f64>> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Point::new(lng, lat)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<TimelineEmbedded>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineEmbedded {
    #[serde(default)]
    pub items: Vec<TimelineItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineItem {
    Poi {
        #[serde(rename = "_embedded")]
        embedded: Reference<PoiReference>,
    },
    Highlight {
        #[serde(rename = "_embedded")]
        embedded: Reference<HighlightReference>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference<T> {
    pub reference: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoiReference {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinate>,
    #[serde(default)]
    pub details: Vec<PoiDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoiDetail {
    pub formatted: serde_json::Value,
}

impl PoiDetail {
    pub fn text(&self) -> String {
        match &self.formatted {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HighlightReference {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mid_point: Option<Coordinate>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<HighlightEmbedded>,
}

impl HighlightReference {
    /// Front image location without its query string.
    pub fn image_url(&self) -> Option<&str> {
        let src = self
            .embedded
            .as_ref()?
            .front_image
            .as_ref()?
            .src
            .as_deref()?;
        Some(src.split_once('?').map_or(src, |(base, _)| base))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HighlightEmbedded {
    #[serde(default)]
    pub front_image: Option<Image>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub src: Option<String>,
}

/// Community comment attached to a highlight.
#[derive(Debug, Clone, Deserialize)]
pub struct Tip {
    pub text: String,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<TipEmbedded>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TipEmbedded {
    #[serde(default)]
    pub creator: Option<TipCreator>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TipCreator {
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Tip {
    pub fn contributor(&self) -> Option<&str> {
        self.embedded
            .as_ref()?
            .creator
            .as_ref()?
            .display_name
            .as_deref()
    }

    /// Tip text prefixed with `"<contributor>: "` when the contributor is known.
    pub fn attributed_text(&self) -> String {
        match self.contributor() {
            Some(name) => format!("{name}: {}", self.text),
            None => self.text.clone(),
        }
    }
}

impl Tour {
    /// Decodes and validates a tour detail document.
    pub fn from_json(body: &str) -> Result<Self> {
        let tour: Tour =
            serde_json::from_str(body).map_err(|e| Error::DataValidation(e.to_string()))?;
        tour.validate()?;
        Ok(tour)
    }

    pub fn validate(&self) -> Result<()> {
        for (index, coordinate) in self.coordinates().iter().enumerate() {
            if coordinate.position().is_none() {
                return Err(Error::DataValidation(format!(
                    "route coordinate {index} of tour {} has no latitude/longitude",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.embedded.coordinates.items
    }

    pub fn creator(&self) -> &Creator {
        &self.embedded.creator
    }

    pub fn timeline_items(&self) -> &[TimelineItem] {
        self.embedded
            .timeline
            .as_ref()
            .and_then(|timeline| timeline.embedded.as_ref())
            .map(|embedded| embedded.items.as_slice())
            .unwrap_or_default()
    }

    pub fn is_recorded(&self) -> bool {
        self.kind == TourType::Recorded
    }
}

fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(id) => id.to_string(),
        RawId::Text(id) => id,
    })
}

/// Millisecond timestamps; integral floats such as `5000.0` are accepted.
fn optional_millis<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    // Largest magnitude at which every integer is exactly representable as f64.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMillis {
        Integer(i64),
        Float(f64),
    }

    match Option::<RawMillis>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawMillis::Integer(millis)) => Ok(Some(millis)),
        Some(RawMillis::Float(millis))
            if millis.fract() == 0.0 && millis.abs() <= MAX_EXACT =>
        {
            Ok(Some(millis as i64))
        }
        Some(RawMillis::Float(millis)) => Err(de::Error::custom(format!(
            "timestamp {millis} is not a whole number of milliseconds"
        ))),
    }
}

fn parse_date<E: de::Error>(raw: &str) -> std::result::Result<OffsetDateTime, E> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| E::custom(format!("invalid date '{raw}': {e}")))
}

fn rfc3339<'de, D>(deserializer: D) -> std::result::Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw)
}

fn optional_rfc3339<'de, D>(deserializer: D) -> std::result::Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_date(&raw))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn tour_json() -> serde_json::Value {
        json!({
            "id": 12345,
            "name": "Evening Loop",
            "type": "tour_planned",
            "sport": "hike",
            "distance": 4321.9,
            "duration": 5400,
            "elevation_up": 120.5,
            "elevation_down": 119,
            "date": "2022-01-02T12:26:41.795+01:00",
            "_embedded": {
                "creator": { "display_name": "Jo", "username": 998877 },
                "coordinates": { "items": [ { "lat": 1.0, "lng": 2.0 } ] }
            }
        })
    }

    #[test]
    fn test_tour_from_json() {
        let tour = Tour::from_json(&tour_json().to_string()).unwrap();
        assert_eq!(tour.id, "12345");
        assert_eq!(tour.kind, TourType::Planned);
        assert_eq!(tour.date, datetime!(2022-01-02 12:26:41.795 +01:00));
        assert_eq!(tour.creator().username, "998877");
        assert!(tour.timeline_items().is_empty());
        assert!(tour.difficulty.is_none());
    }

    #[test]
    fn test_tour_missing_required_field() {
        let mut value = tour_json();
        value.as_object_mut().unwrap().remove("elevation_up");
        let err = Tour::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::DataValidation(msg) if msg.contains("elevation_up")));
    }

    #[test]
    fn test_tour_malformed_date() {
        let mut value = tour_json();
        value["date"] = json!("yesterday");
        let err = Tour::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::DataValidation(msg) if msg.contains("yesterday")));
    }

    #[test]
    fn test_tour_rejects_empty_route_coordinate() {
        let mut value = tour_json();
        value["_embedded"]["coordinates"]["items"] = json!([{ "lat": 1.0, "lng": 2.0 }, { "alt": 3.0 }]);
        let err = Tour::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::DataValidation(msg) if msg.contains("coordinate 1")));
    }

    #[test]
    fn test_unknown_tour_type() {
        let mut value = tour_json();
        value["type"] = json!("tour_shared");
        let tour = Tour::from_json(&value.to_string()).unwrap();
        assert_eq!(tour.kind, TourType::Other);
        assert!(!TypeFilter::Planned.accepts(tour.kind));
        assert!(TypeFilter::All.accepts(tour.kind));
    }

    #[test]
    fn test_coordinate_position() {
        let full = Coordinate {
            lat: Some(48.1),
            lng: Some(11.5),
            ..Default::default()
        };
        assert_eq!(full.position(), Some(Point::new(11.5, 48.1)));
        assert!(!full.is_empty());

        let empty = Coordinate::default();
        assert!(empty.is_empty());
        assert!(empty.position().is_none());

        let partial = Coordinate {
            lat: Some(48.1),
            ..Default::default()
        };
        assert!(!partial.is_empty());
        assert!(partial.position().is_none());
    }

    #[test]
    fn test_timeline_items() {
        let items: Vec<TimelineItem> = serde_json::from_value(json!([
            { "type": "poi", "_embedded": { "reference": { "name": "Hut", "details": [{ "formatted": "Open" }, { "formatted": 3 }] } } },
            { "type": "highlight", "_embedded": { "reference": { "id": "77", "_embedded": { "front_image": { "src": "https://img/x.jpg?w=100" } } } } },
            { "type": "direction", "_embedded": { "whatever": true } }
        ]))
        .unwrap();

        match &items[0] {
            TimelineItem::Poi { embedded } => {
                let texts: Vec<String> = embedded.reference.details.iter().map(PoiDetail::text).collect();
                assert_eq!(texts, ["Open", "3"]);
            }
            other => panic!("Expected poi, got {other:?}"),
        }
        match &items[1] {
            TimelineItem::Highlight { embedded } => {
                assert_eq!(embedded.reference.id, "77");
                assert_eq!(embedded.reference.image_url(), Some("https://img/x.jpg"));
            }
            other => panic!("Expected highlight, got {other:?}"),
        }
        assert!(matches!(items[2], TimelineItem::Other));
    }

    #[test]
    fn test_tip_attribution() {
        let tips: Vec<Tip> = serde_json::from_value(json!([
            { "text": "Great view", "_embedded": { "creator": { "display_name": "Ana" } } },
            { "text": "Steep" }
        ]))
        .unwrap();
        assert_eq!(tips[0].attributed_text(), "Ana: Great view");
        assert_eq!(tips[1].attributed_text(), "Steep");
    }

    #[test]
    fn test_coordinate_millis() {
        let coordinates: Vec<Coordinate> = serde_json::from_value(json!([
            { "lat": 1.0, "lng": 1.0, "t": 1641124800123_i64 },
            { "lat": 1.0, "lng": 1.0, "t": 5000.0 },
            { "lat": 1.0, "lng": 1.0 }
        ]))
        .unwrap();
        let times: Vec<Option<i64>> = coordinates.iter().map(|c| c.t).collect();
        assert_eq!(times, [Some(1_641_124_800_123), Some(5000), None]);

        for bad in [json!(1.5), json!(1e18)] {
            let err = serde_json::from_value::<Coordinate>(json!({ "lat": 1.0, "lng": 1.0, "t": bad }))
                .unwrap_err();
            assert!(err.to_string().contains("whole number of milliseconds"));
        }
    }

    #[test]
    fn test_summary_listing() {
        let summary: TourSummary = serde_json::from_value(json!({
            "id": 8, "name": "Hills", "type": "tour_planned", "sport": "hike",
            "date": "2023-05-01T08:00:00.000+02:00",
            "distance": 12345.0, "duration": 5400, "elevation_up": 310.4, "elevation_down": 299.6
        }))
        .unwrap();
        assert_eq!(
            summary.listing(),
            "           8 2023-05-01  Hills (hike), 12.3km, 1.50h, +310m/-300m"
        );
    }

    #[test]
    fn test_summary_without_date() {
        let summary: TourSummary = serde_json::from_value(json!({
            "id": 1, "name": "A", "type": "tour_recorded"
        }))
        .unwrap();
        assert!(summary.date.is_none());
        assert_eq!(summary.kind, TourType::Recorded);
        assert_eq!(summary.listing(), "           1             A (unknown)");
    }
}
