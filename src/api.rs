//! Komoot REST client.
//!
//! Authentication is a one-off exchange of email and password for an account
//! id and token, which are then sent as HTTP Basic credentials with every
//! request. There is no refresh; an expired token shows up as a failed request.

use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::compile::TipSource;
use crate::error::{reason_from_body, Error, Result};
use crate::model::{Tip, Tour, TourSummary, TypeFilter};
use crate::transport::{Credentials, HttpTransport, Response, Transport};

pub const DEFAULT_API_BASE: &str = "https://api.komoot.de";

const TOUR_DETAIL_QUERY: &str = "_embedded=coordinates,way_types,surfaces,directions,participants,timeline\
&directions=v2&fields=timeline&format=coordinate_array&timeline_highlights_fields=tips,recommenders";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Directory receiving a copy of every response body, for troubleshooting.
    pub debug_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            debug_dir: None,
        }
    }
}

/// Authenticated account.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub display_name: Option<String>,
    credentials: Credentials,
}

impl Session {
    /// Session for an account id and token obtained earlier.
    pub fn from_token(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            credentials: Credentials::new(user_id.clone(), token),
            user_id,
            display_name: None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn token(&self) -> &str {
        &self.credentials.password
    }
}

/// Tours keyed by id, in the order the service listed them.
#[derive(Debug, Clone, Default)]
pub struct TourList {
    tours: Vec<TourSummary>,
    positions: HashMap<String, usize>,
}

impl TourList {
    /// Adds a tour unless one with the same id is already present.
    pub fn insert(&mut self, tour: TourSummary) -> bool {
        if self.positions.contains_key(&tour.id) {
            return false;
        }
        self.positions.insert(tour.id.clone(), self.tours.len());
        self.tours.push(tour);
        true
    }

    pub fn get(&self, id: &str) -> Option<&TourSummary> {
        self.positions.get(id).map(|&position| &self.tours[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TourSummary> {
        self.tours.iter()
    }

    pub fn len(&self) -> usize {
        self.tours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tours.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    username: String,
    password: String,
    user: LoginUser,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    displayname: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TourListPage {
    #[serde(rename = "_links", default)]
    links: Links,
    #[serde(rename = "_embedded", default)]
    embedded: Option<TourListEmbedded>,
}

#[derive(Debug, Deserialize)]
struct TourListEmbedded {
    #[serde(default)]
    tours: Vec<TourSummary>,
}

#[derive(Debug, Deserialize)]
struct TipsPage {
    #[serde(rename = "_embedded", default)]
    embedded: Option<TipsEmbedded>,
}

#[derive(Debug, Deserialize)]
struct TipsEmbedded {
    #[serde(default)]
    items: Vec<Tip>,
}

pub struct KomootClient<T = HttpTransport> {
    transport: T,
    config: ClientConfig,
    session: Option<Session>,
    request_count: Cell<usize>,
}

impl KomootClient<HttpTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new()?, config))
    }
}

impl<T: Transport> KomootClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
            request_count: Cell::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.get()
    }

    /// Exchanges email and password for a durable account id and token.
    pub fn login(&mut self, email: &str, password: &str) -> Result<&Session> {
        info!("Logging in...");

        let url = format!("{}/v006/account/email/{email}/", self.base_url());
        let response = self.send(&url, Some(&Credentials::new(email, password)))?;
        if !response.is_success() {
            return Err(Error::Authentication {
                status: response.status,
                reason: reason_from_body(&response.body),
            });
        }

        let login: LoginResponse =
            serde_json::from_str(&response.body).map_err(|source| Error::Decode {
                operation: "log in",
                source,
            })?;

        info!("Logged in as '{}'", login.user.displayname);
        let mut session = Session::from_token(login.username, login.password);
        session.display_name = Some(login.user.displayname);
        Ok(&*self.session.insert(session))
    }

    /// Lists the tours of a user, following the pagination links to the end.
    pub fn fetch_tour_list(&self, user_id: &str, filter: TypeFilter) -> Result<TourList> {
        info!("Fetching tours of user '{user_id}'...");

        let mut tours = TourList::default();
        let mut next = Some(format!("{}/v007/users/{user_id}/tours/", self.base_url()));
        while let Some(url) = next.take() {
            let response = self.send(&url, self.credentials())?;
            check_status(&response, "fetch tour list")?;

            let page: TourListPage =
                serde_json::from_str(&response.body).map_err(|source| Error::Decode {
                    operation: "fetch tour list",
                    source,
                })?;

            for tour in page.embedded.map(|embedded| embedded.tours).unwrap_or_default() {
                if !filter.accepts(tour.kind) {
                    continue;
                }
                let id = tour.id.clone();
                if !tours.insert(tour) {
                    debug!(%id, "Duplicate tour in listing, keeping the first one");
                }
            }

            next = page.links.next.and_then(|link| link.href);
        }

        info!("Found {} tours", tours.len());
        Ok(tours)
    }

    /// Fetches one tour with its coordinates and timeline.
    pub fn fetch_tour_detail(&self, tour_id: &str) -> Result<Tour> {
        info!("Fetching tour '{tour_id}'...");

        let url = format!("{}/v007/tours/{tour_id}?{TOUR_DETAIL_QUERY}", self.base_url());
        let response = self.send(&url, self.credentials())?;
        check_status(&response, "fetch tour")?;

        Tour::from_json(&response.body)
    }

    /// Fetches the tips of a highlight. Failures are logged and yield no tips.
    pub fn fetch_highlight_tips(&self, highlight_id: &str) -> Vec<Tip> {
        match self.try_fetch_highlight_tips(highlight_id) {
            Ok(tips) => tips,
            Err(e) => {
                warn!("{e}");
                Vec::new()
            }
        }
    }

    fn try_fetch_highlight_tips(&self, highlight_id: &str) -> Result<Vec<Tip>> {
        info!("Fetching highlight '{highlight_id}'...");

        let lookup_error = |reason: String| Error::HighlightLookup {
            highlight_id: highlight_id.to_string(),
            reason,
        };

        let url = format!("{}/v007/highlights/{highlight_id}/tips/", self.base_url());
        let response = self
            .send(&url, self.credentials())
            .map_err(|e| lookup_error(e.to_string()))?;
        if !response.is_success() {
            return Err(lookup_error(format!(
                "status {}: {}",
                response.status,
                reason_from_body(&response.body)
            )));
        }

        let page: TipsPage =
            serde_json::from_str(&response.body).map_err(|e| lookup_error(e.to_string()))?;
        Ok(page.embedded.map(|embedded| embedded.items).unwrap_or_default())
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn credentials(&self) -> Option<&Credentials> {
        self.session.as_ref().map(Session::credentials)
    }

    fn send(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response> {
        let count = self.request_count.get() + 1;
        self.request_count.set(count);

        let response = self.transport.get(url, credentials)?;
        if let Some(dir) = &self.config.debug_dir {
            let path = dir.join(format!("komootgpx-debug-{count}.txt"));
            if let Err(e) = fs::write(&path, &response.body) {
                warn!("Failed to write debug dump '{}': {e}", path.display());
            }
        }
        Ok(response)
    }
}

impl<T: Transport> TipSource for KomootClient<T> {
    fn highlight_tips(&self, highlight_id: &str) -> Vec<Tip> {
        self.fetch_highlight_tips(highlight_id)
    }
}

fn check_status(response: &Response, operation: &'static str) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(Error::RemoteService {
        operation,
        status: response.status,
        reason: reason_from_body(&response.body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TourType;

    fn summary(id: &str, name: &str) -> TourSummary {
        TourSummary {
            id: id.to_string(),
            name: name.to_string(),
            kind: TourType::Planned,
            sport: None,
            date: None,
            distance: None,
            duration: None,
            elevation_up: None,
            elevation_down: None,
        }
    }

    #[test]
    fn test_tour_list_first_seen_wins() {
        let mut list = TourList::default();
        assert!(list.insert(summary("2", "first")));
        assert!(list.insert(summary("1", "other")));
        assert!(!list.insert(summary("2", "second")));

        assert_eq!(list.len(), 2);
        assert_eq!(list.get("2").unwrap().name, "first");
        let ids: Vec<&str> = list.iter().map(|tour| tour.id.as_str()).collect();
        assert_eq!(ids, ["2", "1"]);
    }

    #[test]
    fn test_session_from_token() {
        let session = Session::from_token("42", "token");
        assert_eq!(session.user_id, "42");
        assert_eq!(session.token(), "token");
        assert_eq!(session.credentials(), &Credentials::new("42", "token"));
        assert!(session.display_name.is_none());
    }
}
