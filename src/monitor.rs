//! The polling loop which turns start.gg results into notifications.

use {
    itertools::Itertools as _,
    tokio::time::{
        MissedTickBehavior,
        interval,
    },
    tokio_util::sync::CancellationToken,
    crate::{
        bracket::{
            self,
            Match,
            Phase,
            SeedTable,
        },
        notify::NotificationSink,
        outcome::{
            self,
            Outcome,
        },
        prelude::*,
        startgg::{
            self,
            Client,
            EventRef,
            ID,
            Listing,
            Transport,
        },
        upset::{
            DqEvent,
            Notification,
            UpsetEvent,
        },
    },
};

/// Everything one monitor remembers between polls. Separate monitors must not share sessions.
pub(crate) struct MonitorSession {
    pub(crate) event: EventRef,
    phases: Option<Vec<Phase>>,
    /// Seeding is locked once a phase starts, so a phase's seeds are fetched at most once.
    seed_cache: HashMap<ID, SeedTable>,
    sent_upsets: HashSet<ID>,
    sent_dqs: HashSet<ID>,
}

impl MonitorSession {
    pub(crate) fn new(event: EventRef) -> Self {
        Self {
            event,
            phases: None,
            seed_cache: HashMap::default(),
            sent_upsets: HashSet::default(),
            sent_dqs: HashSet::default(),
        }
    }

    async fn phases<T: Transport>(&mut self, client: &mut Client<T>) -> Result<Vec<Phase>, startgg::Error> {
        if let Some(ref phases) = self.phases {
            return Ok(phases.clone())
        }
        let event_id = client.event_id(&self.event).await?;
        let phases = client.phases(&event_id).await?;
        if !phases.is_empty() {
            log::info!("monitoring {} phases of {}: {}", phases.len(), self.event, phases.iter().map(|phase| &phase.name).join(", "));
            self.phases = Some(phases.clone());
        }
        Ok(phases)
    }

    /// Runs one poll cycle, returning at most one notification which hasn't been sent before.
    pub(crate) async fn poll<T: Transport>(&mut self, client: &mut Client<T>) -> Result<Option<Notification>, startgg::Error> {
        let phases = self.phases(client).await?;
        let Some(initial_phase) = phases.first() else {
            log::warn!("{} has no phases yet", self.event);
            return Ok(None)
        };
        let seeds = if let Some(seeds) = self.seed_cache.get(&initial_phase.id) {
            seeds.clone()
        } else {
            let Listing { items: seeds, complete } = client.phase_seeds(&initial_phase.id).await;
            if !complete {
                log::warn!("seed listing for phase {} ({}) is incomplete, fetching it again next cycle", initial_phase.name, initial_phase.id);
            } else if seeds.is_empty() {
                log::warn!("no seeds found for phase {} ({}), upsets can't be scored until it is seeded", initial_phase.name, initial_phase.id);
            } else {
                self.seed_cache.insert(initial_phase.id.clone(), seeds.clone());
            }
            seeds
        };
        let mut matches = Vec::default();
        for phase in &phases {
            matches.extend(client.phase_matches(&phase.id).await);
        }
        Ok(select(matches, &seeds).into_iter().find_map(|notification| self.emit(notification)))
    }

    /// Records the notification as sent. Returns it only the first time it's seen.
    pub(crate) fn emit(&mut self, notification: Notification) -> Option<Notification> {
        let first_time = match notification {
            Notification::Upset(ref upset) => self.sent_upsets.insert(upset.match_id.clone()),
            Notification::Dq(ref dq) => self.sent_dqs.insert(dq.entrant.id.clone()),
        };
        first_time.then_some(notification)
    }
}

/// The candidates of a cycle in priority order: the most recent DQ, then the most recent upset.
/// Older events are never considered, even if the most recent one was already announced.
fn select(mut matches: Vec<Match>, seeds: &SeedTable) -> Vec<Notification> {
    bracket::sort_by_recency(&mut matches);
    let mut dq = None;
    let mut upset = None;
    for set in &matches {
        match outcome::classify(set, seeds) {
            Outcome::Disqualification(competitor) => if dq.is_none() {
                dq = Some(DqEvent { entrant: competitor.entrant, seed: competitor.seed });
            },
            Outcome::Decisive { winner, loser } => if upset.is_none() {
                upset = UpsetEvent::detect(set, &winner, &loser);
            },
            Outcome::Incomplete => {}
        }
        if dq.is_some() && upset.is_some() { break }
    }
    dq.map(Notification::Dq).into_iter().chain(upset.map(Notification::Upset)).collect()
}

/// Polls until `shutdown` is cancelled. Failed cycles are logged and skipped.
pub(crate) async fn run<T: Transport>(mut session: MonitorSession, mut client: Client<T>, sink: &dyn NotificationSink, poll_interval: Duration, shutdown: CancellationToken) {
    let mut interval = interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let result = tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    result = session.poll(&mut client) => result,
                };
                match result {
                    Ok(Some(notification)) => {
                        log::info!("sending notification: {notification}");
                        if let Err(e) = sink.send(&notification.to_string()).await {
                            log::error!("failed to send notification: {e} ({e:?})");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("upset monitor cycle failed: {e} ({e:?})"),
                }
                // wait a full interval after the cycle, however long it took
                interval.reset();
            }
        }
    }
    log::info!("upset monitor for {} stopped", session.event);
}
