//! Ergast-compatible F1 API client
//!
//! Fetches the season schedule and championship standings from the Jolpica
//! mirror of the Ergast API and reduces them to the values a snapshot holds.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DataProvider, EventInfo, ProviderError, StandingEntry, StandingsInfo};

/// Base URL for the Jolpica Ergast-compatible API
/// Public Jolpica mirror of the Ergast F1 API
pub const ERGAST_BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";

/// Number of standings rows kept per championship
const STANDINGS_DEPTH: usize = 3;

/// Session slots of a race weekend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    FirstPractice,
    SecondPractice,
    ThirdPractice,
    SprintQualifying,
    Sprint,
    Qualifying,
    Race,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            SessionKind::FirstPractice => "Practice 1",
            SessionKind::SecondPractice => "Practice 2",
            SessionKind::ThirdPractice => "Practice 3",
            SessionKind::SprintQualifying => "Sprint Qualifying",
            SessionKind::Sprint => "Sprint",
            SessionKind::Qualifying => "Qualifying",
            SessionKind::Race => "Race",
        }
    }

    /// Practice sessions are never advertised as the next event
    pub fn is_competitive(self) -> bool {
        !matches!(
            self,
            SessionKind::FirstPractice | SessionKind::SecondPractice | SessionKind::ThirdPractice
        )
    }
}

/// A race weekend from the season schedule, with parsed session times
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub name: String,
    pub location: String,
    pub round: u32,
    /// Race date as published, used when the race start time is unknown
    pub race_date: String,
    pub sessions: Vec<(SessionKind, DateTime<Utc>)>,
}

impl ScheduledEvent {
    fn has_session_after(&self, now: DateTime<Utc>) -> bool {
        self.sessions.iter().any(|(_, at)| *at > now)
    }

    /// Earliest competitive session still ahead of `now`
    fn next_competitive_session(&self, now: DateTime<Utc>) -> Option<(SessionKind, DateTime<Utc>)> {
        self.sessions
            .iter()
            .filter(|(kind, at)| kind.is_competitive() && *at > now)
            .min_by_key(|(_, at)| *at)
            .copied()
    }

    fn race_start(&self) -> Option<DateTime<Utc>> {
        self.sessions
            .iter()
            .find(|(kind, _)| *kind == SessionKind::Race)
            .map(|(_, at)| *at)
    }
}

/// Client for the Ergast-compatible F1 API
#[derive(Debug, Clone)]
pub struct ErgastClient {
    client: Client,
    base_url: String,
}

impl Default for ErgastClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ErgastClient {
    /// Create a new ErgastClient with default settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: ERGAST_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different Ergast-compatible server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "requesting");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fetch the full schedule for a season
    pub async fn fetch_schedule(&self, season: i32) -> Result<Vec<ScheduledEvent>, ProviderError> {
        let response: ScheduleResponse = self.get_json(&format!("{season}.json")).await?;
        parse_schedule(response)
    }

    /// Events with a session after `now`, reaching into next season when
    /// fewer than `wanted` remain in the current one
    async fn upcoming_events(
        &self,
        now: DateTime<Utc>,
        wanted: usize,
    ) -> Result<Vec<ScheduledEvent>, ProviderError> {
        let season = now.year();
        let mut events = upcoming(self.fetch_schedule(season).await?, now);

        if events.len() < wanted {
            match self.fetch_schedule(season + 1).await {
                Ok(next_season) => events.extend(upcoming(next_season, now)),
                Err(e) => warn!(season = season + 1, "Next season schedule unavailable: {}", e),
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl DataProvider for ErgastClient {
    async fn next_event(&self, now: DateTime<Utc>) -> Result<Option<EventInfo>, ProviderError> {
        let events = self.upcoming_events(now, 1).await?;
        Ok(select_next_event(&events, now))
    }

    async fn current_standings(&self, now: DateTime<Utc>) -> Result<StandingsInfo, ProviderError> {
        let season = now.year();

        let drivers: StandingsResponse = self
            .get_json(&format!("{season}/driverStandings.json"))
            .await?;
        let constructors: StandingsResponse = self
            .get_json(&format!("{season}/constructorStandings.json"))
            .await?;

        Ok(StandingsInfo {
            drivers: driver_standings(drivers)?,
            constructors: constructor_standings(constructors)?,
        })
    }

    async fn event_after_next(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<EventInfo>, ProviderError> {
        let events = self.upcoming_events(now, 2).await?;
        Ok(select_event_after_next(&events))
    }
}

/// Keep events that still have at least one session ahead, in schedule order
pub fn upcoming(events: Vec<ScheduledEvent>, now: DateTime<Utc>) -> Vec<ScheduledEvent> {
    events
        .into_iter()
        .filter(|event| event.has_session_after(now))
        .collect()
}

/// Pick the event whose next competitive session starts soonest
pub fn select_next_event(events: &[ScheduledEvent], now: DateTime<Utc>) -> Option<EventInfo> {
    let (event, (kind, at)) = events
        .iter()
        .filter_map(|event| event.next_competitive_session(now).map(|s| (event, s)))
        .min_by_key(|(_, (_, at))| *at)?;

    let local = at.with_timezone(&Local);
    Some(EventInfo {
        name: event.name.clone(),
        location: event.location.clone(),
        date: local.format("%Y-%m-%d").to_string(),
        time: Some(local.format("%I:%M %p %Z").to_string()),
        session_type: Some(kind.label().to_string()),
        round: event.round,
    })
}

/// The second upcoming event, dated by its race day in local time
pub fn select_event_after_next(events: &[ScheduledEvent]) -> Option<EventInfo> {
    let event = events.get(1)?;

    let date = event
        .race_start()
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| event.race_date.clone());

    Some(EventInfo {
        name: event.name.clone(),
        location: event.location.clone(),
        date,
        time: None,
        session_type: None,
        round: event.round,
    })
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(rename = "MRData")]
    mr_data: ScheduleData,
}

#[derive(Debug, Deserialize)]
struct ScheduleData {
    #[serde(rename = "RaceTable")]
    race_table: RaceTable,
}

#[derive(Debug, Deserialize)]
struct RaceTable {
    #[serde(rename = "Races", default)]
    races: Vec<RaceRecord>,
}

#[derive(Debug, Deserialize)]
struct RaceRecord {
    round: String,
    #[serde(rename = "raceName")]
    race_name: String,
    #[serde(rename = "Circuit")]
    circuit: CircuitRecord,
    date: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(rename = "FirstPractice", default)]
    first_practice: Option<SessionRecord>,
    #[serde(rename = "SecondPractice", default)]
    second_practice: Option<SessionRecord>,
    #[serde(rename = "ThirdPractice", default)]
    third_practice: Option<SessionRecord>,
    #[serde(rename = "SprintQualifying", alias = "SprintShootout", default)]
    sprint_qualifying: Option<SessionRecord>,
    #[serde(rename = "Sprint", default)]
    sprint: Option<SessionRecord>,
    #[serde(rename = "Qualifying", default)]
    qualifying: Option<SessionRecord>,
}

#[derive(Debug, Deserialize)]
struct CircuitRecord {
    #[serde(rename = "Location")]
    location: LocationRecord,
}

#[derive(Debug, Deserialize)]
struct LocationRecord {
    locality: String,
    country: String,
}

#[derive(Debug, Deserialize)]
struct SessionRecord {
    date: String,
    #[serde(default)]
    time: Option<String>,
}

/// Combine Ergast's separate date and time fields into a UTC instant
///
/// Sessions without a published time are skipped.
fn session_instant(date: &str, time: Option<&str>) -> Result<Option<DateTime<Utc>>, ProviderError> {
    let Some(time) = time else {
        return Ok(None);
    };
    let time = if time.ends_with('Z') || time.contains('+') {
        time.to_string()
    } else {
        format!("{time}Z")
    };

    DateTime::parse_from_rfc3339(&format!("{date}T{time}"))
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|_| ProviderError::InvalidTimeFormat(format!("{date} {time}")))
}

fn parse_schedule(response: ScheduleResponse) -> Result<Vec<ScheduledEvent>, ProviderError> {
    response
        .mr_data
        .race_table
        .races
        .into_iter()
        .map(|race| {
            let round = race
                .round
                .parse()
                .map_err(|_| ProviderError::InvalidValue(format!("round: {}", race.round)))?;

            let slots = [
                (SessionKind::FirstPractice, race.first_practice.as_ref()),
                (SessionKind::SecondPractice, race.second_practice.as_ref()),
                (SessionKind::ThirdPractice, race.third_practice.as_ref()),
                (SessionKind::SprintQualifying, race.sprint_qualifying.as_ref()),
                (SessionKind::Sprint, race.sprint.as_ref()),
                (SessionKind::Qualifying, race.qualifying.as_ref()),
            ];

            let mut sessions = Vec::new();
            for (kind, record) in slots {
                if let Some(record) = record {
                    if let Some(at) = session_instant(&record.date, record.time.as_deref())? {
                        sessions.push((kind, at));
                    }
                }
            }
            if let Some(at) = session_instant(&race.date, race.time.as_deref())? {
                sessions.push((SessionKind::Race, at));
            }

            Ok(ScheduledEvent {
                name: race.race_name,
                location: format!(
                    "{}, {}",
                    race.circuit.location.locality, race.circuit.location.country
                ),
                round,
                race_date: race.date,
                sessions,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct StandingsResponse {
    #[serde(rename = "MRData")]
    mr_data: StandingsData,
}

#[derive(Debug, Deserialize)]
struct StandingsData {
    #[serde(rename = "StandingsTable")]
    standings_table: StandingsTable,
}

#[derive(Debug, Deserialize)]
struct StandingsTable {
    #[serde(rename = "StandingsLists", default)]
    lists: Vec<StandingsList>,
}

#[derive(Debug, Deserialize)]
struct StandingsList {
    #[serde(rename = "DriverStandings", default)]
    drivers: Vec<DriverStanding>,
    #[serde(rename = "ConstructorStandings", default)]
    constructors: Vec<ConstructorStanding>,
}

#[derive(Debug, Deserialize)]
struct DriverStanding {
    points: String,
    #[serde(rename = "Driver")]
    driver: DriverRecord,
}

#[derive(Debug, Deserialize)]
struct DriverRecord {
    #[serde(rename = "givenName")]
    given_name: String,
    #[serde(rename = "familyName")]
    family_name: String,
}

#[derive(Debug, Deserialize)]
struct ConstructorStanding {
    points: String,
    #[serde(rename = "Constructor")]
    constructor: ConstructorRecord,
}

#[derive(Debug, Deserialize)]
struct ConstructorRecord {
    name: String,
}

/// Ergast reports points as decimal strings; half points are truncated
fn parse_points(raw: &str) -> Result<i64, ProviderError> {
    raw.trim()
        .parse::<f64>()
        .map(|p| p.trunc() as i64)
        .map_err(|_| ProviderError::InvalidValue(format!("points: {raw}")))
}

fn driver_standings(response: StandingsResponse) -> Result<Vec<StandingEntry>, ProviderError> {
    // An empty table means no race has finished yet this season.
    let Some(list) = response.mr_data.standings_table.lists.into_iter().next() else {
        return Ok(Vec::new());
    };

    list.drivers
        .into_iter()
        .take(STANDINGS_DEPTH)
        .map(|row| {
            let name = format!("{} {}", row.driver.given_name, row.driver.family_name);
            Ok(StandingEntry::new(name, parse_points(&row.points)?))
        })
        .collect()
}

fn constructor_standings(response: StandingsResponse) -> Result<Vec<StandingEntry>, ProviderError> {
    let Some(list) = response.mr_data.standings_table.lists.into_iter().next() else {
        return Ok(Vec::new());
    };

    list.constructors
        .into_iter()
        .take(STANDINGS_DEPTH)
        .map(|row| Ok(StandingEntry::new(row.constructor.name, parse_points(&row.points)?)))
        .collect()
}
