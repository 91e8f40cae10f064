//! Session queries
//!
//! Read-only views over the sessions an engine runs. Results are snapshots:
//! they don't change when the sessions do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Session, SessionKind, SessionState, TurnSettings};
use crate::handlers::SessionCommandHandler;
use crate::value_objects::SessionTermination;

/// Query types for sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionQuery {
    /// A session by id, ended ones included while they are in the history
    GetSession { session_id: String },

    /// The active session of a site
    GetActiveSession { site_id: String },

    /// Sessions waiting on a site, in promotion order
    GetQueuedSessions { site_id: String },

    /// Every known session in a state
    GetSessionsByState { state: SessionState },

    GetStatistics,
}

/// Query result for session queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionQueryResult {
    Session(Option<SessionSnapshot>),
    Sessions(Vec<SessionSnapshot>),
    Statistics(SessionStatistics),
}

/// Immutable copy of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub site_id: String,
    pub custom_data: Option<String>,
    pub kind: SessionKind,
    pub state: SessionState,
    /// Settings of the next turn
    pub turn: TurnSettings,
    pub reactivated_from_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub termination: Option<SessionTermination>,
    pub version: u64,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id().to_string(),
            site_id: session.site_id().to_string(),
            custom_data: session.custom_data().map(str::to_string),
            kind: session.kind(),
            state: session.state(),
            turn: session.turn().clone(),
            reactivated_from_session_id: session.reactivated_from_session_id().map(str::to_string),
            created_at: session.created_at(),
            ended_at: session.ended_at(),
            termination: session.termination().cloned(),
            version: session.version(),
        }
    }
}

/// Session counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub active_sessions: usize,
    pub queued_sessions: usize,
    /// Ended sessions still in the history
    pub ended_sessions: usize,
    /// Sites with an active session
    pub busy_sites: usize,
}

/// Session query handler
pub struct SessionQueryHandler<'a> {
    sessions: &'a SessionCommandHandler,
}

impl<'a> SessionQueryHandler<'a> {
    pub fn new(sessions: &'a SessionCommandHandler) -> Self {
        Self { sessions }
    }

    /// Execute a query
    pub fn execute(&self, query: SessionQuery) -> SessionQueryResult {
        match query {
            SessionQuery::GetSession { session_id } => SessionQueryResult::Session(
                self.sessions.session(&session_id).map(SessionSnapshot::from),
            ),
            SessionQuery::GetActiveSession { site_id } => SessionQueryResult::Session(
                self.sessions
                    .active_session(&site_id)
                    .map(SessionSnapshot::from),
            ),
            SessionQuery::GetQueuedSessions { site_id } => SessionQueryResult::Sessions(
                self.sessions
                    .queued_sessions(&site_id)
                    .into_iter()
                    .map(SessionSnapshot::from)
                    .collect(),
            ),
            SessionQuery::GetSessionsByState { state } => {
                let mut sessions: Vec<SessionSnapshot> = self
                    .sessions
                    .sessions()
                    .filter(|s| s.state() == state)
                    .map(SessionSnapshot::from)
                    .collect();
                sessions.sort_by_key(|s| s.created_at);
                SessionQueryResult::Sessions(sessions)
            }
            SessionQuery::GetStatistics => SessionQueryResult::Statistics(self.statistics()),
        }
    }

    fn statistics(&self) -> SessionStatistics {
        let mut stats = SessionStatistics::default();
        for session in self.sessions.sessions() {
            match session.state() {
                SessionState::Active => {
                    stats.active_sessions += 1;
                    stats.busy_sites += 1;
                }
                SessionState::Queued => stats.queued_sessions += 1,
                SessionState::Ended => stats.ended_sessions += 1,
                SessionState::Idle => {}
            }
        }
        stats
    }
}
