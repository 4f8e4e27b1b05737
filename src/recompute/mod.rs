//! Recompute Coordinator - last-token-wins sequencing of anomaly requests
//!
//! Every change to the anomaly inputs (window, selection, dimensions) or a
//! manual nonce bump produces a new [`RecomputeToken`]. Requests are never
//! cancelled on the wire; a response is applied only when its token is still
//! the latest one issued, so an older response arriving late can never
//! overwrite a newer result.
//!
//! ```text
//!   Idle ──input change──▶ Requesting(t1) ──input change──▶ Requesting(t2)
//!    ▲                          │                                │
//!    └────── response(t2) ──────┴── response(t1): Stale, ignored ┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};

use crate::cache::{DataCache, DatasetKey};
use crate::selection::SelectionState;
use crate::types::{AnomalySnapshot, EntityId, TimeWindow};

// ============================================================================
// Key / Token
// ============================================================================

/// The complete input of one anomaly computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecomputeKey {
    pub entities: BTreeSet<EntityId>,
    pub window: TimeWindow,
    pub dimensions: BTreeSet<String>,
    pub nonce: u64,
}

impl RecomputeKey {
    /// Inputs for the current state, `None` when a computation would be
    /// invalid (no window yet, nothing selected, or no dimensions).
    pub fn from_state(state: &SelectionState, nonce: u64) -> Option<Self> {
        let window = state.window?;
        if state.selection.is_empty() || state.dimensions.is_empty() {
            return None;
        }
        Some(Self {
            entities: state.selection.clone(),
            window,
            dimensions: state.dimensions.clone(),
            nonce,
        })
    }

    /// In-process hash of the inputs.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Identifies one issued request. Ordering is by `seq` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecomputeToken {
    pub seq: u64,
    pub fingerprint: u64,
}

impl std::fmt::Display for RecomputeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}/{:016x}", self.seq, self.fingerprint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RecomputePhase {
    #[default]
    Idle,
    Requesting { token: RecomputeToken },
}

/// A request the caller must send to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputeRequest {
    pub token: RecomputeToken,
    pub key: RecomputeKey,
}

/// What happened to an arriving response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Latest token; snapshot committed to the cache under `stamp`
    Committed { stamp: u64 },
    /// Superseded token; discarded
    Stale,
    /// Latest token failed; cache keeps its last committed snapshot
    Failed { message: String },
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RecomputeCoordinator {
    nonce: u64,
    seq: u64,
    latest: Option<RecomputeToken>,
    phase: RecomputePhase,
    last_error: Option<String>,
}

impl RecomputeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn phase(&self) -> RecomputePhase {
        self.phase
    }

    pub fn latest(&self) -> Option<RecomputeToken> {
        self.latest
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_requesting(&self) -> bool {
        matches!(self.phase, RecomputePhase::Requesting { .. })
    }

    /// React to the current anomaly inputs.
    ///
    /// Returns a request when the inputs differ from the latest issued ones.
    /// Invalid inputs supersede any in-flight request and go back to Idle
    /// without issuing anything.
    pub fn observe(
        &mut self,
        state: &SelectionState,
        cache: &mut DataCache,
    ) -> Option<RecomputeRequest> {
        let Some(key) = RecomputeKey::from_state(state, self.nonce) else {
            if let Some(token) = self.latest.take() {
                debug!(token = %token, "Anomaly inputs invalid, superseding latest request");
            }
            self.phase = RecomputePhase::Idle;
            cache.settle(DatasetKey::Anomaly);
            return None;
        };

        let fingerprint = key.fingerprint();
        if self.latest.is_some_and(|t| t.fingerprint == fingerprint) {
            return None;
        }

        self.seq += 1;
        let token = RecomputeToken {
            seq: self.seq,
            fingerprint,
        };
        if let RecomputePhase::Requesting { token: previous } = self.phase {
            debug!(previous = %previous, token = %token, "Superseding in-flight recompute");
        }
        self.latest = Some(token);
        self.phase = RecomputePhase::Requesting { token };
        cache.mark_pending(DatasetKey::Anomaly);
        info!(
            token = %token,
            entities = key.entities.len(),
            dimensions = key.dimensions.len(),
            window = %key.window,
            nonce = key.nonce,
            "Issuing anomaly recompute"
        );
        Some(RecomputeRequest { token, key })
    }

    /// Retire the in-flight request because its inputs have changed while
    /// the next observation is still pending (debounce quiet period).
    ///
    /// The phase stays `Requesting` and the anomaly slot stays pending; any
    /// response for the retired token now resolves as [`ResponseOutcome::Stale`].
    pub fn supersede(&mut self) {
        let RecomputePhase::Requesting { token } = self.phase else {
            return;
        };
        if self.latest == Some(token) {
            debug!(token = %token, "Anomaly inputs changed, retiring in-flight request");
            self.latest = None;
        }
    }

    /// Manual recompute: bump the nonce so identical inputs still produce a
    /// fresh request.
    pub fn force(
        &mut self,
        state: &SelectionState,
        cache: &mut DataCache,
    ) -> Option<RecomputeRequest> {
        self.nonce += 1;
        self.observe(state, cache)
    }

    /// Apply a response for `token`.
    pub fn resolve<E: std::fmt::Display>(
        &mut self,
        token: RecomputeToken,
        result: Result<AnomalySnapshot, E>,
        cache: &mut DataCache,
    ) -> ResponseOutcome {
        if self.latest.map(|t| t.seq) != Some(token.seq) {
            debug!(token = %token, latest = ?self.latest.map(|t| t.seq), "Discarding stale anomaly response");
            return ResponseOutcome::Stale;
        }

        self.phase = RecomputePhase::Idle;
        match result {
            Ok(snapshot) => {
                self.last_error = None;
                let stamp = cache.commit_anomaly(snapshot);
                ResponseOutcome::Committed { stamp }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(token = %token, error = %message, "Anomaly recompute failed");
                cache.mark_failed(DatasetKey::Anomaly, message.clone());
                self.last_error = Some(message.clone());
                ResponseOutcome::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoreSample;

    fn state(entities: &[&str], dims: &[&str]) -> SelectionState {
        SelectionState {
            window: Some(TimeWindow::new(0, 100).unwrap()),
            selection: entities.iter().map(|e| EntityId::new(*e)).collect(),
            dimensions: dims.iter().map(|d| (*d).to_string()).collect(),
            ..SelectionState::default()
        }
    }

    fn snapshot(tag: f64) -> AnomalySnapshot {
        let mut s = AnomalySnapshot::default();
        s.zscores.insert(
            EntityId::new("n1"),
            vec![ScoreSample {
                bucket: 0,
                value: Some(tag),
            }],
        );
        s
    }

    #[test]
    fn test_latest_token_wins_out_of_order() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let t1 = c.observe(&state(&["n1"], &["cpu"]), &mut cache).unwrap().token;
        let t2 = c.observe(&state(&["n1", "n2"], &["cpu"]), &mut cache).unwrap().token;

        assert!(matches!(
            c.resolve(t2, Ok::<_, String>(snapshot(2.0)), &mut cache),
            ResponseOutcome::Committed { .. }
        ));
        assert_eq!(c.resolve(t1, Ok::<_, String>(snapshot(1.0)), &mut cache), ResponseOutcome::Stale);

        let committed = cache.anomaly().data().unwrap();
        assert_eq!(committed.zscores_for(&EntityId::new("n1"))[0].value, Some(2.0));
        assert_eq!(c.phase(), RecomputePhase::Idle);
    }

    #[test]
    fn test_stale_response_keeps_requesting() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let t1 = c.observe(&state(&["n1"], &["cpu"]), &mut cache).unwrap().token;
        let t2 = c.observe(&state(&["n2"], &["cpu"]), &mut cache).unwrap().token;
        assert_eq!(c.resolve(t1, Ok::<_, String>(snapshot(1.0)), &mut cache), ResponseOutcome::Stale);
        assert_eq!(c.phase(), RecomputePhase::Requesting { token: t2 });
        assert!(cache.anomaly().data().is_none());
    }

    #[test]
    fn test_invalid_inputs_issue_nothing() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        assert!(c.observe(&state(&[], &["cpu"]), &mut cache).is_none());
        assert!(c.observe(&state(&["n1"], &[]), &mut cache).is_none());
        let mut no_window = state(&["n1"], &["cpu"]);
        no_window.window = None;
        assert!(c.observe(&no_window, &mut cache).is_none());
    }

    #[test]
    fn test_emptying_dimensions_supersedes_in_flight() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let t1 = c.observe(&state(&["n1"], &["cpu"]), &mut cache).unwrap().token;
        assert!(c.observe(&state(&["n1"], &[]), &mut cache).is_none());
        assert_eq!(c.resolve(t1, Ok::<_, String>(snapshot(1.0)), &mut cache), ResponseOutcome::Stale);
        assert!(!c.is_requesting());
    }

    #[test]
    fn test_unchanged_inputs_not_reissued() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let s = state(&["n1"], &["cpu"]);
        assert!(c.observe(&s, &mut cache).is_some());
        assert!(c.observe(&s, &mut cache).is_none());
    }

    #[test]
    fn test_supersede_retires_in_flight_token() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let t1 = c.observe(&state(&["n1"], &["cpu"]), &mut cache).unwrap().token;

        // Inputs moved on; the next observation is not due yet.
        c.supersede();
        assert_eq!(c.phase(), RecomputePhase::Requesting { token: t1 });
        assert_eq!(c.resolve(t1, Ok::<_, String>(snapshot(1.0)), &mut cache), ResponseOutcome::Stale);
        assert!(cache.anomaly().data().is_none());
        assert_eq!(cache.status(DatasetKey::Anomaly), &crate::cache::DatasetStatus::Pending);

        // Returning to the retired inputs still issues a fresh request.
        let t2 = c.observe(&state(&["n1"], &["cpu"]), &mut cache).unwrap().token;
        assert!(t2.seq > t1.seq);
        assert_eq!(t2.fingerprint, t1.fingerprint);
    }

    #[test]
    fn test_supersede_when_idle_keeps_dedup() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let s = state(&["n1"], &["cpu"]);
        let t1 = c.observe(&s, &mut cache).unwrap().token;
        c.resolve(t1, Ok::<_, String>(snapshot(1.0)), &mut cache);

        c.supersede();
        assert_eq!(c.latest(), Some(t1));
        assert!(c.observe(&s, &mut cache).is_none());
    }

    #[test]
    fn test_force_bumps_nonce() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let s = state(&["n1"], &["cpu"]);
        let first = c.observe(&s, &mut cache).unwrap();
        let forced = c.force(&s, &mut cache).unwrap();
        assert_eq!(forced.key.nonce, first.key.nonce + 1);
        assert_ne!(forced.token, first.token);
    }

    #[test]
    fn test_failure_keeps_last_result_without_retry() {
        let mut cache = DataCache::new();
        let mut c = RecomputeCoordinator::new();
        let s1 = state(&["n1"], &["cpu"]);
        let t1 = c.observe(&s1, &mut cache).unwrap().token;
        c.resolve(t1, Ok::<_, String>(snapshot(1.0)), &mut cache);

        let s2 = state(&["n2"], &["cpu"]);
        let t2 = c.observe(&s2, &mut cache).unwrap().token;
        let outcome = c.resolve(t2, Err("HTTP 502"), &mut cache);
        assert_eq!(
            outcome,
            ResponseOutcome::Failed {
                message: "HTTP 502".to_string()
            }
        );
        assert_eq!(c.phase(), RecomputePhase::Idle);
        assert_eq!(c.last_error(), Some("HTTP 502"));
        let kept = cache.anomaly().data().unwrap();
        assert_eq!(kept.zscores_for(&EntityId::new("n1"))[0].value, Some(1.0));
        // Same inputs observed again: no automatic retry.
        assert!(c.observe(&s2, &mut cache).is_none());
    }
}
