//! Selection Store - the single source of truth for shared interaction state
//!
//! Holds the active time window, selected entities, hovered entity, selected
//! metric dimensions and the baseline-edit flag. Every panel reads from it and
//! writes to it through [`Mutation`]s only.
//!
//! ## Notification contract
//!
//! Each mutation is one atomic transition. All live subscribers are notified
//! exactly once per transition, synchronously, before the mutating call
//! returns. Subscribers cannot mutate the store directly from a handler; they
//! push follow-up mutations onto the [`Deferred`] queue, which the store
//! applies after the current notification round completes. History stays
//! linear: no subscriber ever observes a half-applied transition.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::trace;

use crate::types::{EntityId, TimeWindow};

// ============================================================================
// State
// ============================================================================

/// Snapshot of the shared interaction state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionState {
    /// Active time window (`None` until the timeline data arrives)
    pub window: Option<TimeWindow>,
    /// Selected entities
    pub selection: BTreeSet<EntityId>,
    /// Entity under the pointer; need not be selected
    pub hovered: Option<EntityId>,
    /// Metric dimensions to visualise and feed to anomaly computation
    pub dimensions: BTreeSet<String>,
    /// Whether anomaly baselines are being edited
    pub baseline_edit_mode: bool,
    /// Number of transitions applied so far
    pub version: u64,
}

// ============================================================================
// Mutations
// ============================================================================

/// The fixed set of state transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    SetWindow { window: TimeWindow },
    ToggleEntity { entity: EntityId },
    SetHovered { entity: Option<EntityId> },
    ToggleDimension { name: String },
    ReplaceSelection { entities: BTreeSet<EntityId> },
    ReplaceDimensions { names: BTreeSet<String> },
    SetBaselineEditMode { enabled: bool },
}

/// Which parts of the state a transition actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub window: bool,
    pub selection: bool,
    pub hovered: bool,
    pub dimensions: bool,
    pub baseline_edit_mode: bool,
}

impl ChangeSet {
    /// True when the anomaly inputs (window, selection, dimensions) moved.
    pub fn affects_anomaly_inputs(&self) -> bool {
        self.window || self.selection || self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        !(self.window || self.selection || self.hovered || self.dimensions || self.baseline_edit_mode)
    }
}

/// One applied transition, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub version: u64,
    pub mutation: Mutation,
    pub changes: ChangeSet,
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Handle returned by [`SelectionStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Follow-up mutations requested from inside a notification handler.
#[derive(Debug, Default)]
pub struct Deferred {
    queued: Vec<Mutation>,
}

impl Deferred {
    pub fn push(&mut self, mutation: Mutation) {
        self.queued.push(mutation);
    }
}

type Handler = Box<dyn FnMut(&Transition, &SelectionState, &mut Deferred) + Send>;

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

// ============================================================================
// Store
// ============================================================================

/// Session-lifetime interaction state with synchronous pub/sub.
pub struct SelectionStore {
    state: SelectionState,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl SelectionStore {
    pub fn new() -> Self {
        Self {
            state: SelectionState::default(),
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Latest committed state.
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&Transition, &SelectionState, &mut Deferred) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.wrapping_add(1);
        self.subscribers.push(Subscriber {
            id,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscriber. Returns false when the id was not live.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn set_window(&mut self, window: TimeWindow) -> Vec<Transition> {
        self.apply(Mutation::SetWindow { window })
    }

    pub fn toggle_entity(&mut self, entity: EntityId) -> Vec<Transition> {
        self.apply(Mutation::ToggleEntity { entity })
    }

    pub fn set_hovered(&mut self, entity: Option<EntityId>) -> Vec<Transition> {
        self.apply(Mutation::SetHovered { entity })
    }

    pub fn toggle_dimension(&mut self, name: impl Into<String>) -> Vec<Transition> {
        self.apply(Mutation::ToggleDimension { name: name.into() })
    }

    pub fn replace_selection(&mut self, entities: BTreeSet<EntityId>) -> Vec<Transition> {
        self.apply(Mutation::ReplaceSelection { entities })
    }

    pub fn replace_dimensions(&mut self, names: BTreeSet<String>) -> Vec<Transition> {
        self.apply(Mutation::ReplaceDimensions { names })
    }

    pub fn set_baseline_edit_mode(&mut self, enabled: bool) -> Vec<Transition> {
        self.apply(Mutation::SetBaselineEditMode { enabled })
    }

    /// Apply a mutation plus any follow-ups queued by subscribers, in order.
    ///
    /// Returns every transition applied, the requested one first.
    pub fn apply(&mut self, mutation: Mutation) -> Vec<Transition> {
        let mut pending = VecDeque::from([mutation]);
        let mut applied = Vec::new();

        while let Some(next) = pending.pop_front() {
            let transition = self.transition(next);
            let mut deferred = Deferred::default();

            let mut subscribers = std::mem::take(&mut self.subscribers);
            for sub in &mut subscribers {
                (sub.handler)(&transition, &self.state, &mut deferred);
            }
            self.subscribers = subscribers;

            pending.extend(deferred.queued);
            applied.push(transition);
        }

        applied
    }

    fn transition(&mut self, mutation: Mutation) -> Transition {
        let mut changes = ChangeSet::default();
        let state = &mut self.state;

        match &mutation {
            Mutation::SetWindow { window } => {
                changes.window = state.window != Some(*window);
                state.window = Some(*window);
            }
            Mutation::ToggleEntity { entity } => {
                if !state.selection.remove(entity) {
                    state.selection.insert(entity.clone());
                }
                changes.selection = true;
            }
            Mutation::SetHovered { entity } => {
                changes.hovered = state.hovered != *entity;
                state.hovered.clone_from(entity);
            }
            Mutation::ToggleDimension { name } => {
                if !state.dimensions.remove(name) {
                    state.dimensions.insert(name.clone());
                }
                changes.dimensions = true;
            }
            Mutation::ReplaceSelection { entities } => {
                changes.selection = state.selection != *entities;
                state.selection.clone_from(entities);
            }
            Mutation::ReplaceDimensions { names } => {
                changes.dimensions = state.dimensions != *names;
                state.dimensions.clone_from(names);
            }
            Mutation::SetBaselineEditMode { enabled } => {
                changes.baseline_edit_mode = state.baseline_edit_mode != *enabled;
                state.baseline_edit_mode = *enabled;
            }
        }

        state.version += 1;
        trace!(version = state.version, ?mutation, "selection transition");

        Transition {
            version: state.version,
            mutation,
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ids(names: &[&str]) -> BTreeSet<EntityId> {
        names.iter().map(|n| EntityId::new(*n)).collect()
    }

    #[test]
    fn test_toggle_twice_restores_membership() {
        let mut store = SelectionStore::new();
        store.toggle_entity(EntityId::new("a"));
        assert!(store.state().selection.contains(&EntityId::new("a")));
        store.toggle_entity(EntityId::new("a"));
        assert!(store.state().selection.is_empty());
    }

    #[test]
    fn test_replace_selection_discards_prior() {
        let mut store = SelectionStore::new();
        store.replace_selection(ids(&["a", "b"]));
        store.replace_selection(ids(&["c"]));
        assert_eq!(store.state().selection, ids(&["c"]));
    }

    #[test]
    fn test_every_subscriber_notified_once_per_transition() {
        let mut store = SelectionStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            store.subscribe(move |t, _, _| seen.lock().unwrap().push((tag, t.version)));
        }
        store.set_hovered(Some(EntityId::new("a")));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, v)| *v == 1));
    }

    #[test]
    fn test_handler_sees_committed_state() {
        let mut store = SelectionStore::new();
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        store.subscribe(move |_, state, _| *sink.lock().unwrap() = Some(state.selection.clone()));
        store.toggle_entity(EntityId::new("x"));
        assert_eq!(*observed.lock().unwrap(), Some(ids(&["x"])));
    }

    #[test]
    fn test_deferred_mutations_run_after_notification() {
        let mut store = SelectionStore::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        // Hovering an entity also selects it, via a queued follow-up.
        let log_a = Arc::clone(&log);
        store.subscribe(move |t, _, deferred| {
            log_a.lock().unwrap().push(format!("a:{}", t.version));
            if let Mutation::SetHovered { entity: Some(e) } = &t.mutation {
                deferred.push(Mutation::ReplaceSelection {
                    entities: [e.clone()].into_iter().collect(),
                });
            }
        });
        let log_b = Arc::clone(&log);
        store.subscribe(move |t, _, _| log_b.lock().unwrap().push(format!("b:{}", t.version)));

        let applied = store.set_hovered(Some(EntityId::new("n1")));
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].version, 2);
        assert_eq!(store.state().selection, ids(&["n1"]));
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut store = SelectionStore::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = store.subscribe(move |_, _, _| *c.lock().unwrap() += 1);
        store.toggle_dimension("cpu_speed");
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.toggle_dimension("cpu_speed");
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_change_set_flags() {
        let mut store = SelectionStore::new();
        let t = store.set_hovered(None).remove(0);
        assert!(t.changes.is_empty());
        let t = store.set_window(TimeWindow::new(0, 10).unwrap()).remove(0);
        assert!(t.changes.window && t.changes.affects_anomaly_inputs());
        let t = store.set_baseline_edit_mode(true).remove(0);
        assert!(t.changes.baseline_edit_mode && !t.changes.affects_anomaly_inputs());
    }

    #[test]
    fn test_mutation_json_shape() {
        let m: Mutation = serde_json::from_str(r#"{"op":"toggle_entity","entity":"n7"}"#).unwrap();
        assert_eq!(
            m,
            Mutation::ToggleEntity {
                entity: EntityId::new("n7")
            }
        );
    }
}
