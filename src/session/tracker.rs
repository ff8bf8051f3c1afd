use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::task::JoinHandle;

use crate::session::{InactivityPolicy, SessionState};

#[derive(Debug, Clone, Copy)]
struct Session {
    last_activity: Instant,
    /// The bearer token stops verifying here; the entry is kept until then.
    token_expires: Instant,
    /// Signed out or idled out. The same token stays rejected.
    ended: bool,
}

/// Last-activity instant per signed-in session.
#[derive(Clone)]
pub struct SessionTracker {
    policy: InactivityPolicy,
    sessions: Arc<DashMap<String, Session>>,
}

impl SessionTracker {
    pub fn new(policy: InactivityPolicy) -> Self {
        Self {
            policy,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Records activity. An idle session is ended instead and reported as
    /// `Expired`, as is every later request with the same token.
    pub fn touch(&self, key: &str, token_expires: Instant, now: Instant) -> SessionState {
        let mut session = self.sessions.entry(key.to_string()).or_insert(Session {
            last_activity: now,
            token_expires,
            ended: false,
        });

        let state = self.state_of(&mut session, now);
        if state != SessionState::Expired {
            session.last_activity = now;
            return SessionState::Active {
                remaining: self.policy.timeout(),
            };
        }
        state
    }

    /// Reports the state without counting as activity. Unknown sessions
    /// start now.
    pub fn peek(&self, key: &str, token_expires: Instant, now: Instant) -> SessionState {
        let mut session = self.sessions.entry(key.to_string()).or_insert(Session {
            last_activity: now,
            token_expires,
            ended: false,
        });

        self.state_of(&mut session, now)
    }

    /// Signs the session out. Returns whether it was still live.
    pub fn end(&self, key: &str, token_expires: Instant) -> bool {
        match self.sessions.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let session = occupied.get_mut();
                let was_live = !session.ended;
                session.ended = true;
                was_live
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Session {
                    last_activity: Instant::now(),
                    token_expires,
                    ended: true,
                });
                false
            }
        }
    }

    /// Ends idle sessions and forgets those whose token has expired.
    /// Returns how many sessions were ended.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut ended = 0;
        self.sessions.retain(|_, session| {
            if session.token_expires <= now {
                return false;
            }
            if !session.ended
                && self.policy.evaluate(now.saturating_duration_since(session.last_activity))
                    == SessionState::Expired
            {
                session.ended = true;
                ended += 1;
            }
            true
        });
        ended
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.iter().filter(|entry| !entry.ended).count()
    }

    fn state_of(&self, session: &mut Session, now: Instant) -> SessionState {
        if session.ended {
            return SessionState::Expired;
        }

        let state = self
            .policy
            .evaluate(now.saturating_duration_since(session.last_activity));
        if state == SessionState::Expired {
            session.ended = true;
        }
        state
    }
}

pub fn spawn_sweeper(tracker: SessionTracker, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let removed = tracker.sweep(Instant::now());
            if removed > 0 {
                tracing::debug!(
                    "Expired {} idle sessions, {} remain",
                    removed,
                    tracker.active_sessions()
                );
            }
        }
    })
}
