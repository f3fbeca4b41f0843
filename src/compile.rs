//! Tour to GPX rendering.

use gpx::{Gpx, GpxVersion, Link, Metadata, Person, Time, Track, TrackSegment, Waypoint};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{
    Coordinate, HighlightReference, PoiDetail, PoiReference, Tip, TimelineItem, Tour,
};

const WEB_BASE: &str = "https://www.komoot.de";
const SOURCE: &str = "Komoot";
const TIP_SEPARATOR: &str = "\n――――――――――\n";
const ELLIPSIS: &str = "...";

/// Supplies the tips of a highlight. Lookups are best effort and never fail.
pub trait TipSource {
    fn highlight_tips(&self, highlight_id: &str) -> Vec<Tip>;
}

impl<F> TipSource for F
where
    F: Fn(&str) -> Vec<Tip>,
{
    fn highlight_tips(&self, highlight_id: &str) -> Vec<Tip> {
        self(highlight_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub include_pois: bool,
    /// `0` clears descriptions, a negative value disables truncation.
    pub max_description_length: i64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_pois: true,
            max_description_length: -1,
        }
    }
}

/// How raw `t` values of a tour map to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    /// Milliseconds since the tour start.
    Relative(OffsetDateTime),
    /// Milliseconds since the Unix epoch.
    Absolute,
}

impl TimestampMode {
    /// Decided once per tour from its first route point.
    pub fn detect(tour: &Tour) -> Self {
        match tour.coordinates().first().and_then(|coordinate| coordinate.t) {
            Some(0) => Self::Relative(tour.date),
            _ => Self::Absolute,
        }
    }

    /// UTC time of a raw `t` value, or `None` when it falls outside the
    /// representable date range.
    pub fn resolve(self, millis: i64) -> Option<OffsetDateTime> {
        let base = match self {
            Self::Relative(start) => start.unix_timestamp_nanos(),
            Self::Absolute => 0,
        };
        let nanos = base.checked_add(i128::from(millis) * 1_000_000)?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiKind {
    Poi,
    Highlight,
}

impl PoiKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poi => "POI",
            Self::Highlight => "Highlight",
        }
    }
}

/// A timeline POI or highlight, ready to become a waypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub name: String,
    pub location: Coordinate,
    pub image_url: String,
    pub url: String,
    pub description: String,
    pub kind: PoiKind,
}

impl Poi {
    fn from_poi(reference: &PoiReference) -> Self {
        let description = reference
            .details
            .iter()
            .map(PoiDetail::text)
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            name: reference.name.clone().unwrap_or_else(|| "Unknown POI".to_string()),
            location: reference.location.unwrap_or_default(),
            image_url: String::new(),
            url: String::new(),
            description,
            kind: PoiKind::Poi,
        }
    }

    fn from_highlight<S: TipSource + ?Sized>(reference: &HighlightReference, tips: &S) -> Self {
        let description = tips
            .highlight_tips(&reference.id)
            .iter()
            .map(Tip::attributed_text)
            .collect::<Vec<_>>()
            .join(TIP_SEPARATOR);

        Self {
            name: reference
                .name
                .clone()
                .unwrap_or_else(|| "Unknown Highlight".to_string()),
            location: reference.mid_point.unwrap_or_default(),
            image_url: reference.image_url().unwrap_or_default().to_string(),
            url: format!("{WEB_BASE}/highlight/{}", reference.id),
            description,
            kind: PoiKind::Highlight,
        }
    }
}

/// Cuts `text` to at most `max_length` characters, marking the cut with an ellipsis.
pub fn truncate_description(text: String, max_length: i64) -> String {
    let Ok(max_length) = usize::try_from(max_length) else {
        return text;
    };
    if text.chars().count() <= max_length {
        return text;
    }

    let kept = max_length.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(kept).collect();
    truncated.extend(ELLIPSIS.chars().take(max_length - kept));
    truncated
}

/// Collects the POIs and highlights of the tour timeline, in timeline order.
pub fn collect_pois<S: TipSource + ?Sized>(
    tour: &Tour,
    tips: &S,
    max_description_length: i64,
) -> Vec<Poi> {
    tour.timeline_items()
        .iter()
        .filter_map(|item| match item {
            TimelineItem::Poi { embedded } => Some(Poi::from_poi(&embedded.reference)),
            TimelineItem::Highlight { embedded } => {
                Some(Poi::from_highlight(&embedded.reference, tips))
            }
            TimelineItem::Other => None,
        })
        .map(|mut poi| {
            poi.description = truncate_description(poi.description, max_description_length);
            poi
        })
        .collect()
}

/// Summary line used as document and track description.
pub fn describe(tour: &Tour) -> String {
    let hours = (tour.duration / 3600.0 * 100.0).round() / 100.0;
    let mut description = format!(
        "Distance: {}km, Estimated duration: {}h, Elevation up: {}m, Elevation down: {}m",
        format_decimal(tour.distance.trunc() / 1000.0),
        format_decimal(hours),
        tour.elevation_up,
        tour.elevation_down,
    );
    if let Some(difficulty) = &tour.difficulty {
        description.push_str(&format!(", Grade: {}", difficulty.grade));
    }
    description
}

/// Like `{}` but always with a fractional part, `12` prints as `12.0`.
fn format_decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn link(href: String, text: impl Into<String>) -> Link {
    Link {
        href,
        text: Some(text.into()),
        type_: None,
    }
}

fn waypoint(coordinate: &Coordinate, mode: TimestampMode) -> Result<Option<Waypoint>> {
    let Some(position) = coordinate.position() else {
        return Ok(None);
    };
    let mut point = Waypoint::new(position);
    point.elevation = coordinate.alt;
    if let Some(t) = coordinate.t {
        let time = mode.resolve(t).ok_or_else(|| {
            Error::DataValidation(format!("timestamp {t} is out of range"))
        })?;
        point.time = Some(Time::from(time));
    }
    Ok(Some(point))
}

/// Builds the GPX document of a tour.
pub fn build<S: TipSource + ?Sized>(tour: &Tour, tips: &S, options: &CompileOptions) -> Result<Gpx> {
    let mode = TimestampMode::detect(tour);

    let mut segment = TrackSegment::new();
    for (index, coordinate) in tour.coordinates().iter().enumerate() {
        let point = waypoint(coordinate, mode)?.ok_or_else(|| {
            Error::DataValidation(format!(
                "route coordinate {index} of tour {} has no latitude/longitude",
                tour.id
            ))
        })?;
        segment.points.push(point);
    }

    let name = if tour.is_recorded() {
        format!("{} (Completed)", tour.name)
    } else {
        tour.name.clone()
    };
    let description = describe(tour);
    let creator = tour.creator();
    let tour_link = link(format!("{WEB_BASE}/tour/{}", tour.id), "View tour on Komoot");

    let mut track = Track::new();
    track.name = Some(name.clone());
    track.description = Some(description.clone());
    track.links.push(tour_link.clone());
    track.segments.push(segment);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(creator.display_name.clone());
    gpx.metadata = Some(Metadata {
        name: Some(name),
        description: Some(description),
        author: Some(Person {
            name: Some(creator.display_name.clone()),
            email: None,
            link: Some(link(
                format!("{WEB_BASE}/user/{}", creator.username),
                format!("View {}'s Profile on Komoot", creator.display_name),
            )),
        }),
        links: vec![tour_link],
        ..Default::default()
    });
    gpx.tracks.push(track);

    if options.include_pois {
        for poi in collect_pois(tour, tips, options.max_description_length) {
            let Some(mut wp) = waypoint(&poi.location, mode)? else {
                let problem = if poi.location.is_empty() {
                    "without a location"
                } else {
                    "with an incomplete location"
                };
                warn!("Skipping {} '{}' {problem}", poi.kind.as_str(), poi.name);
                continue;
            };
            wp.name = Some(poi.name);
            wp.description = Some(poi.description);
            wp.source = Some(SOURCE.to_string());
            if !poi.url.is_empty() {
                wp.links.push(link(poi.url, "View POI on Komoot"));
            }
            wp.type_ = Some(poi.kind.as_str().to_string());
            if !poi.image_url.is_empty() {
                wp.comment = Some(poi.image_url);
            }
            gpx.waypoints.push(wp);
        }
    }

    debug!(
        tour = %tour.id,
        points = tour.coordinates().len(),
        waypoints = gpx.waypoints.len(),
        "Built GPX document"
    );
    Ok(gpx)
}

/// Renders a tour as GPX 1.1 text.
pub fn compile<S: TipSource + ?Sized>(tour: &Tour, tips: &S, options: &CompileOptions) -> Result<String> {
    let gpx = build(tour, tips, options)?;

    let mut buffer = Vec::new();
    gpx::write(&gpx, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
