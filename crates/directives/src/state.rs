//! Queue and claim bookkeeping for the directive processor.
//!
//! Everything here runs under the processor's coarse lock and never calls
//! out to routers or listeners. A tracked directive lives in at most one of
//! the pre-handling slot, the handling queue, the claim table, or the
//! cancellation queue; every transition moves it. A scrub that hits the
//! pre-handling slot only marks it, since the router has not yet decided
//! whether the directive exists at all.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{BlockingPolicy, Directive, Medium};

/// A submitted directive plus the flag recording that its terminal
/// lifecycle event has been emitted.
#[derive(Debug, Clone)]
pub(crate) struct Tracked {
    pub directive: Arc<Directive>,
    settled: Arc<AtomicBool>,
}

impl Tracked {
    pub fn new(directive: Arc<Directive>) -> Self {
        Self {
            directive,
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Identity comparison: two submissions of equal directives are distinct.
    pub fn is(&self, other: &Tracked) -> bool {
        Arc::ptr_eq(&self.settled, &other.settled)
    }

    /// Claim the right to emit the terminal event. Returns `true` exactly once.
    pub fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    pub fn turn(&self) -> &str {
        &self.directive.dialog_request_id
    }
}

/// A directive waiting in the handling queue.
#[derive(Debug, Clone)]
pub(crate) struct Queued {
    pub tracked: Tracked,
    pub policy: BlockingPolicy,
}

/// Which dialog turns a scrub applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScrubScope {
    Turn(String),
    All,
}

impl ScrubScope {
    /// An empty dialog request id means every turn.
    pub fn for_turn(dialog_request_id: &str) -> Self {
        if dialog_request_id.is_empty() {
            Self::All
        } else {
            Self::Turn(dialog_request_id.to_string())
        }
    }

    fn matches(&self, turn: &str) -> bool {
        match self {
            Self::Turn(id) => id == turn,
            Self::All => true,
        }
    }
}

/// What became of a directive's pre-handling slot while the router held it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreHandleSlot {
    /// Untouched.
    Present,
    /// A scrub covered its turn.
    Scrubbed,
    /// Completed or failed from inside pre-handle.
    Gone,
}

#[derive(Debug)]
struct PreHandling {
    tracked: Tracked,
    scrubbed: bool,
}

#[derive(Debug)]
pub(crate) struct DispatchState {
    pre_handling: Option<PreHandling>,
    handling: VecDeque<Queued>,
    /// dialog turn → medium → directive currently occupying it.
    claims: HashMap<String, HashMap<Medium, Tracked>>,
    canceling: Vec<Tracked>,
    enabled: bool,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self {
            pre_handling: None,
            handling: VecDeque::new(),
            claims: HashMap::new(),
            canceling: Vec::new(),
            enabled: true,
        }
    }
}

impl DispatchState {
    pub fn begin_pre_handle(&mut self, tracked: Tracked) {
        self.pre_handling = Some(PreHandling {
            tracked,
            scrubbed: false,
        });
    }

    /// Clear the pre-handling slot and report what happened to it.
    pub fn finish_pre_handle(&mut self, tracked: &Tracked) -> PreHandleSlot {
        match self
            .pre_handling
            .take_if(|slot| slot.tracked.is(tracked))
        {
            Some(PreHandling { scrubbed: true, .. }) => PreHandleSlot::Scrubbed,
            Some(_) => PreHandleSlot::Present,
            None => PreHandleSlot::Gone,
        }
    }

    /// Queue an accepted directive straight for cancellation.
    pub fn cancel(&mut self, tracked: Tracked) {
        self.canceling.push(tracked);
    }

    pub fn enqueue(&mut self, tracked: Tracked, policy: BlockingPolicy) {
        self.handling.push_back(Queued { tracked, policy });
    }

    /// Index of the earliest queued directive whose mediums are free within
    /// its dialog turn.
    ///
    /// Blocks start out as the claim table. A skipped directive with a
    /// blocking policy adds its own mediums to its turn's blocks, so nothing
    /// queued after it in the same turn can overtake it on those mediums.
    /// Turns never block each other.
    pub fn next_unblocked(&self) -> Option<usize> {
        let mut blocked: HashMap<&str, HashSet<&Medium>> = self
            .claims
            .iter()
            .map(|(turn, mediums)| (turn.as_str(), mediums.keys().collect()))
            .collect();

        for (index, queued) in self.handling.iter().enumerate() {
            let Some(turn_blocks) = blocked.get_mut(queued.tracked.turn()) else {
                return Some(index);
            };
            if !turn_blocks.iter().any(|m| queued.policy.uses(m)) {
                return Some(index);
            }
            if queued.policy.is_blocking() {
                turn_blocks.extend(queued.policy.mediums());
            }
        }
        None
    }

    /// Take the next unblocked directive off the queue and record its claims.
    pub fn take_next(&mut self) -> Option<Queued> {
        let index = self.next_unblocked()?;
        let queued = self.handling.remove(index)?;
        if queued.policy.mediums().next().is_some() {
            let turn_claims = self
                .claims
                .entry(queued.tracked.turn().to_string())
                .or_default();
            for medium in queued.policy.mediums() {
                turn_claims.insert(medium.clone(), queued.tracked.clone());
            }
        }
        Some(queued)
    }

    /// Drop every medium claim held by `tracked`.
    pub fn release_claims(&mut self, tracked: &Tracked) -> bool {
        let Some(turn_claims) = self.claims.get_mut(tracked.turn()) else {
            return false;
        };
        let before = turn_claims.len();
        turn_claims.retain(|_, holder| !holder.is(tracked));
        let released = turn_claims.len() != before;
        if turn_claims.is_empty() {
            self.claims.remove(tracked.turn());
        }
        released
    }

    /// Remove `tracked` from every structure it may still occupy.
    pub fn remove(&mut self, tracked: &Tracked) -> bool {
        let mut removed = false;

        let before = self.canceling.len();
        self.canceling.retain(|t| !t.is(tracked));
        removed |= self.canceling.len() != before;

        removed |= self.finish_pre_handle(tracked) != PreHandleSlot::Gone;

        let before = self.handling.len();
        self.handling.retain(|q| !q.tracked.is(tracked));
        removed |= self.handling.len() != before;

        removed |= self.release_claims(tracked);
        removed
    }

    /// Move every directive of the scoped turns from the claim table and
    /// the handling queue to the cancellation queue, and mark a matching
    /// pre-handling slot. Returns whether anything changed.
    pub fn scrub(&mut self, scope: &ScrubScope) -> bool {
        let before = self.canceling.len();

        let mut marked = false;
        if let Some(slot) = &mut self.pre_handling
            && !slot.scrubbed
            && scope.matches(slot.tracked.turn())
        {
            slot.scrubbed = true;
            marked = true;
        }

        let turns: Vec<String> = self
            .claims
            .keys()
            .filter(|turn| scope.matches(turn))
            .cloned()
            .collect();
        for turn in turns {
            let Some(turn_claims) = self.claims.remove(&turn) else {
                continue;
            };
            for holder in turn_claims.into_values() {
                // A directive holding several mediums appears once per medium.
                if !self.canceling.iter().any(|t| t.is(&holder)) {
                    self.canceling.push(holder);
                }
            }
        }

        let (scrubbed, kept): (VecDeque<Queued>, VecDeque<Queued>) = self
            .handling
            .drain(..)
            .partition(|q| scope.matches(q.tracked.turn()));
        self.handling = kept;
        self.canceling
            .extend(scrubbed.into_iter().map(|q| q.tracked));

        marked || self.canceling.len() != before
    }

    pub fn take_canceling(&mut self) -> Vec<Tracked> {
        std::mem::take(&mut self.canceling)
    }

    /// Whether the worker has anything left to look at.
    pub fn has_pending(&self) -> bool {
        !self.handling.is_empty() || !self.canceling.is_empty()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn queued_len(&self) -> usize {
        self.handling.len()
    }

    pub fn pre_handling(&self) -> Option<&Tracked> {
        self.pre_handling.as_ref().map(|slot| &slot.tracked)
    }

    pub fn canceling_len(&self) -> usize {
        self.canceling.len()
    }

    /// Message ids of directives holding at least one medium, sorted.
    pub fn claim_holders(&self) -> Vec<String> {
        let mut holders: Vec<String> = self
            .claims
            .values()
            .flat_map(|mediums| mediums.values())
            .map(|t| t.directive.message_id.clone())
            .collect();
        holders.sort();
        holders.dedup();
        holders
    }
}
