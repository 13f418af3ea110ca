use {
    async_trait::async_trait,
    chrono::prelude::*,
    graphql_client::{
        QueryBody,
        Response,
    },
    reqwest::StatusCode,
    serde::de::DeserializeOwned,
    url::Url,
    crate::{
        bracket::{
            Entrant,
            Match,
            Phase,
            SeedTable,
            Slot,
            Standing,
        },
        prelude::*,
        seed_rank::Seed,
    },
};

pub(crate) const DEFAULT_ENDPOINT: &str = "https://api.start.gg/gql/alpha";
pub(crate) const DEFAULT_PER_PAGE: i64 = 50;

/// From https://dev.start.gg/docs/rate-limits:
///
/// > You may not average more than 80 requests per 60 seconds.
const RATE_LIMIT: Duration = Duration::from_millis(60_000 / 80);

const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(10 * 60);

const EVENT_BY_SLUG_QUERY: &str = r#"
query EventBySlug($slug: String!) {
  event(slug: $slug) {
    id
    name
  }
}
"#;

const EVENT_PHASES_QUERY: &str = r#"
query EventPhases($eventId: ID!) {
  event(id: $eventId) {
    phases {
      id
      name
      phaseOrder
    }
  }
}
"#;

const PHASE_SEEDS_QUERY: &str = r#"
query PhaseSeeds($phaseId: ID!, $page: Int!, $perPage: Int!) {
  phase(id: $phaseId) {
    seeds(query: {page: $page, perPage: $perPage}) {
      nodes {
        seedNum
        entrant {
          id
          name
        }
      }
    }
  }
}
"#;

const PHASE_SETS_QUERY: &str = r#"
query PhaseSets($phaseId: ID!, $page: Int!, $perPage: Int!) {
  phase(id: $phaseId) {
    sets(page: $page, perPage: $perPage, sortType: STANDARD) {
      nodes {
        id
        round
        completedAt
        slots {
          entrant {
            id
            name
          }
          standing {
            placement
            stats {
              score {
                value
              }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("{} GraphQL errors", .0.len())]
    GraphQL(Vec<graphql_client::Error>),
    #[error("GraphQL response returned neither `data` nor `errors`")]
    NoDataNoErrors,
    #[error("start.gg responded with {status}: {body}")]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("no such start.gg event: {0}")]
    UnknownEvent(String),
}

impl Error {
    /// Errors which are expected to go away on their own and are retried with backoff.
    pub(crate) fn is_network_error(&self) -> bool {
        match self {
            Self::Reqwest(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::GraphQL(errors) => !errors.is_empty() && errors.iter().all(|graphql_client::Error { message, .. }| message == "An unknown error has occurred"),
            Self::Json(_) | Self::NoDataNoErrors | Self::Status { .. } | Self::UnknownEvent(_) => false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdInner {
    Number(serde_json::Number),
    String(String),
}

impl From<IdInner> for ID {
    fn from(inner: IdInner) -> Self {
        Self(match inner {
            IdInner::Number(n) => n.to_string(),
            IdInner::String(s) => s,
        })
    }
}

/// start.gg IDs, which the API serves as numbers in some places and as strings in others.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(from = "IdInner", into = "String")]
pub(crate) struct ID(String);

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ID> for String {
    fn from(ID(s): ID) -> Self {
        s
    }
}

impl From<&str> for ID {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// How the tracked event is identified in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventRef {
    Id(ID),
    /// For example `tournament/genesis-9/event/melee-singles`.
    Slug(String),
}

impl From<&str> for EventRef {
    fn from(event: &str) -> Self {
        let event = event.trim().trim_matches('/');
        if !event.is_empty() && event.bytes().all(|b| b.is_ascii_digit()) {
            Self::Id(ID::from(event))
        } else {
            Self::Slug(event.to_owned())
        }
    }
}

/// Accepts a numeric event ID as either a JSON number or string, or a slug.
impl<'de> Deserialize<'de> for EventRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ID::deserialize(deserializer).map(|id| Self::from(&*String::from(id)))
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "event {id}"),
            Self::Slug(slug) => slug.fmt(f),
        }
    }
}

/// Exponential backoff for rate limits and transient network errors.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, current: base }
    }

    /// Returns the delay before the next retry. Each call doubles the following delay until [`Backoff::reset`] is called.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_MAX)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub(crate) status: StatusCode,
    pub(crate) body: String,
}

/// Sends a serialized GraphQL request to start.gg.
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    async fn post(&self, body: &serde_json::Value) -> Result<Reply, Error>;
}

pub(crate) struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: Url,
    auth_token: String,
}

impl HttpTransport {
    pub(crate) fn new(http_client: reqwest::Client, endpoint: Url, auth_token: String) -> Self {
        Self { http_client, endpoint, auth_token }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, body: &serde_json::Value) -> Result<Reply, Error> {
        let response = self.http_client.post(self.endpoint.clone())
            .bearer_auth(&self.auth_token)
            .json(body)
            .send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(Reply { status, body })
    }
}

#[derive(Serialize)]
struct SlugVariables<'a> {
    slug: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventIdVariables<'a> {
    event_id: &'a ID,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageVariables<'a> {
    phase_id: &'a ID,
    page: i64,
    per_page: i64,
}

#[derive(Deserialize)]
struct EventBySlugData {
    event: Option<EventNode>,
}

#[derive(Deserialize)]
struct EventNode {
    id: Option<ID>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct EventPhasesData {
    event: Option<EventPhasesNode>,
}

#[derive(Deserialize)]
struct EventPhasesNode {
    phases: Option<Vec<Option<PhaseNode>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhaseNode {
    id: Option<ID>,
    name: Option<String>,
    phase_order: Option<i64>,
}

#[derive(Deserialize)]
struct Connection<T> {
    nodes: Option<Vec<Option<T>>>,
}

#[derive(Deserialize)]
struct PhaseSeedsData {
    phase: Option<PhaseSeedsNode>,
}

#[derive(Deserialize)]
struct PhaseSeedsNode {
    seeds: Option<Connection<SeedNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedNode {
    seed_num: Option<i64>,
    entrant: Option<EntrantNode>,
}

#[derive(Deserialize)]
struct PhaseSetsData {
    phase: Option<PhaseSetsNode>,
}

#[derive(Deserialize)]
struct PhaseSetsNode {
    sets: Option<Connection<SetNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetNode {
    id: Option<ID>,
    round: Option<i64>,
    /// Unix timestamp in seconds.
    completed_at: Option<i64>,
    slots: Option<Vec<Option<SlotNode>>>,
}

#[derive(Deserialize)]
struct SlotNode {
    entrant: Option<EntrantNode>,
    standing: Option<StandingNode>,
}

#[derive(Deserialize)]
struct EntrantNode {
    id: Option<ID>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct StandingNode {
    placement: Option<i64>,
    stats: Option<StatsNode>,
}

#[derive(Deserialize)]
struct StatsNode {
    score: Option<ScoreNode>,
}

#[derive(Deserialize)]
struct ScoreNode {
    value: Option<f64>,
}

impl EntrantNode {
    fn into_entrant(self) -> Option<Entrant> {
        let Self { id: Some(id), name } = self else { return None };
        Some(Entrant { id, name: name.unwrap_or_default() })
    }
}

impl From<SlotNode> for Slot {
    fn from(SlotNode { entrant, standing }: SlotNode) -> Self {
        Self {
            entrant: entrant.and_then(EntrantNode::into_entrant),
            standing: standing.map(|StandingNode { placement, stats }| Standing {
                placement,
                // scores are floats in the schema but always whole game counts
                score: stats.and_then(|stats| stats.score).and_then(|score| score.value).map(|value| value.round() as i64),
            }),
        }
    }
}

impl SetNode {
    fn into_match(self) -> Option<Match> {
        let Self { id: Some(id), round, completed_at, slots } = self else { return None };
        Some(Match {
            id,
            round: round.unwrap_or_default(),
            completed_at: completed_at.and_then(|timestamp| DateTime::from_timestamp(timestamp, 0)),
            slots: slots.into_iter().flatten().flatten().map(Slot::from).collect(),
        })
    }
}

fn parse_response<D: DeserializeOwned>(body: &str) -> Result<D, Error> {
    let Response { data, errors, extensions: _ } = serde_json::from_str::<Response<D>>(body)?;
    match (data, errors) {
        (Some(_), Some(errors)) if !errors.is_empty() => Err(Error::GraphQL(errors)),
        (Some(data), _) => Ok(data),
        (None, Some(errors)) => Err(Error::GraphQL(errors)),
        (None, None) => Err(Error::NoDataNoErrors),
    }
}

/// The records of a paginated listing.
#[derive(Debug)]
pub(crate) struct Listing<T> {
    pub(crate) items: T,
    /// `false` if a page failed, so `items` only holds the pages before it.
    pub(crate) complete: bool,
}

/// A start.gg API client which never gives up on rate limits.
pub(crate) struct Client<T = HttpTransport> {
    transport: T,
    per_page: i64,
    next_request: Instant,
    backoff: Backoff,
}

impl<T: Transport> Client<T> {
    pub(crate) fn new(transport: T, per_page: i64) -> Self {
        Self {
            transport,
            per_page,
            next_request: Instant::now(),
            backoff: Backoff::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a query, retrying the same request until it gets a response that isn't a rate limit or a transient error.
    async fn query<V: Serialize, D: DeserializeOwned>(&mut self, query: &'static str, operation_name: &'static str, variables: V) -> Result<D, Error> {
        let body = serde_json::to_value(QueryBody { variables, query, operation_name })?;
        loop {
            sleep_until(self.next_request).await;
            let result = self.transport.post(&body).await;
            self.next_request = Instant::now() + RATE_LIMIT;
            let retry_reason = match result {
                Ok(Reply { status, .. }) if status == StatusCode::TOO_MANY_REQUESTS => "rate limited".to_owned(),
                Ok(Reply { status, body }) if !status.is_success() => {
                    self.backoff.reset();
                    return Err(Error::Status { status, body })
                }
                Ok(Reply { body, .. }) => match parse_response(&body) {
                    Err(e) if e.is_network_error() => e.to_string(),
                    result => {
                        self.backoff.reset();
                        return result
                    }
                },
                Err(e) if e.is_network_error() => e.to_string(),
                Err(e) => {
                    self.backoff.reset();
                    return Err(e)
                }
            };
            let delay = self.backoff.next_delay();
            log::warn!("start.gg {operation_name} query failed ({retry_reason}), retrying in {delay:?}");
            sleep(delay).await;
        }
    }

    /// Fetches pages until one comes back empty. A failed page ends the fetch early with whatever was already fetched.
    async fn paginate<D: DeserializeOwned, N>(&mut self, query: &'static str, operation_name: &'static str, phase_id: &ID, nodes: impl Fn(D) -> Option<Vec<Option<N>>>) -> Listing<Vec<N>> {
        let mut all = Vec::default();
        for page in 1.. {
            let variables = PageVariables { phase_id, page, per_page: self.per_page };
            match self.query::<_, D>(query, operation_name, variables).await {
                Ok(data) => {
                    let page_nodes = nodes(data).into_iter().flatten().flatten().collect::<Vec<_>>();
                    if page_nodes.is_empty() { return Listing { items: all, complete: true } }
                    log::debug!("{operation_name}: {} records on page {page} of phase {phase_id}", page_nodes.len());
                    all.extend(page_nodes);
                }
                Err(e) => {
                    log::error!("failed to fetch page {page} of {operation_name} for phase {phase_id}: {e} ({e:?})");
                    break
                }
            }
        }
        Listing { items: all, complete: false }
    }

    pub(crate) async fn event_id(&mut self, event: &EventRef) -> Result<ID, Error> {
        match event {
            EventRef::Id(id) => Ok(id.clone()),
            EventRef::Slug(slug) => {
                let EventBySlugData { event } = self.query(EVENT_BY_SLUG_QUERY, "EventBySlug", SlugVariables { slug }).await?;
                let Some(EventNode { id: Some(id), name }) = event else { return Err(Error::UnknownEvent(slug.clone())) };
                log::info!("resolved start.gg event {} to ID {id}", name.as_deref().unwrap_or(slug));
                Ok(id)
            }
        }
    }

    /// The event's phases in bracket order, so the first phase is the one entrants are seeded into.
    pub(crate) async fn phases(&mut self, event_id: &ID) -> Result<Vec<Phase>, Error> {
        let EventPhasesData { event } = self.query(EVENT_PHASES_QUERY, "EventPhases", EventIdVariables { event_id }).await?;
        let Some(EventPhasesNode { phases }) = event else { return Err(Error::UnknownEvent(event_id.to_string())) };
        let mut phases = phases.into_iter().flatten().flatten()
            .filter_map(|PhaseNode { id, name, phase_order }| Some(Phase {
                id: id?,
                name: name.unwrap_or_default(),
                phase_order: phase_order.unwrap_or(i64::MAX),
            }))
            .collect::<Vec<_>>();
        phases.sort_by_key(|phase| phase.phase_order);
        Ok(phases)
    }

    pub(crate) async fn phase_seeds(&mut self, phase_id: &ID) -> Listing<SeedTable> {
        let Listing { items, complete } = self.paginate(PHASE_SEEDS_QUERY, "PhaseSeeds", phase_id, |PhaseSeedsData { phase }| phase?.seeds?.nodes).await;
        Listing {
            items: items.into_iter()
                .filter_map(|SeedNode { seed_num, entrant }| Some((entrant?.id?, Seed::new(seed_num?)?)))
                .collect(),
            complete,
        }
    }

    pub(crate) async fn phase_matches(&mut self, phase_id: &ID) -> Vec<Match> {
        self.paginate(PHASE_SETS_QUERY, "PhaseSets", phase_id, |PhaseSetsData { phase }| phase?.sets?.nodes).await
            .items
            .into_iter()
            .filter_map(SetNode::into_match)
            .collect()
    }
}
