//! The capture loop.
//!
//! An explicit state machine over the page's lifetime:
//!
//! ```text
//! Idle → Scanning(initial) → Observing ⇄ Scanning(incremental)
//!                                   ↘ Stopped (terminal)
//! ```
//!
//! The loop runs as one cooperative task per page context. It reacts to
//! [`PageEvent`]s from the bridge and owns at most one pending debounce
//! deadline; timers are cancel-and-reset, never queued. Two layers gate
//! incremental scans: a throttle rejects mutation batches arriving within a
//! fixed interval of the last completed scan, and a debounce waits for the
//! mutation stream to quiesce before actually scanning. Records are marked
//! in the known-set before they are dispatched, so a re-entered scan can
//! never submit the same turn twice.

use crate::adapters::PlatformAdapter;
use crate::channel::ArchiveChannel;
use crate::config::TimingConfig;
use crate::dom::{DomElement, DomNode, MutationRecord, ReadyState, SharedDom};
use crate::types::{ChannelError, LoopState, PageEvent};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Shallow-descendant depth checked by the mutation relevance predicate.
const HINT_SCAN_DEPTH: u32 = 2;

pub struct CaptureLoop<C: ArchiveChannel> {
    adapter: Box<dyn PlatformAdapter>,
    channel: C,
    dom: SharedDom,
    timing: TimingConfig,
    state: LoopState,
    /// Ids already captured this session or confirmed pre-existing.
    known_ids: HashSet<String>,
    hidden: bool,
    /// Reentrancy flag: a scan already in flight drops new triggers.
    is_processing: bool,
    last_scan: Option<Instant>,
    /// The single pending debounce deadline, if any.
    debounce_deadline: Option<Instant>,
}

impl<C: ArchiveChannel> CaptureLoop<C> {
    pub fn new(
        adapter: Box<dyn PlatformAdapter>,
        channel: C,
        dom: SharedDom,
        timing: TimingConfig,
    ) -> Self {
        Self {
            adapter,
            channel,
            dom,
            timing,
            state: LoopState::Idle,
            known_ids: HashSet::new(),
            hidden: false,
            is_processing: false,
            last_scan: None,
            debounce_deadline: None,
        }
    }

    /// Current state, for status reporting.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive the loop until the page goes away or the archive channel is
    /// severed. Returns the terminal state.
    pub async fn run(mut self, mut events: mpsc::Receiver<PageEvent>) -> LoopState {
        // A still-loading document defers the initial scan to the load
        // signal rather than polling.
        if self.dom.snapshot().ready_state == ReadyState::Loading {
            loop {
                match events.recv().await {
                    Some(PageEvent::Loaded) => break,
                    Some(PageEvent::Visibility { hidden }) => self.hidden = hidden,
                    Some(PageEvent::Mutations(_)) => {}
                    None => return self.stop("page bridge disconnected before load"),
                }
            }
        }

        if let Err(ChannelError::Severed(msg)) = self.initial_scan().await {
            return self.stop(&msg);
        }

        loop {
            let deadline = self
                .debounce_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));
            tokio::select! {
                event = events.recv() => match event {
                    None => return self.stop("page bridge disconnected"),
                    Some(PageEvent::Mutations(batch)) => self.on_mutation_batch(&batch),
                    Some(PageEvent::Visibility { hidden }) => self.on_visibility(hidden),
                    Some(PageEvent::Loaded) => {}
                },
                _ = sleep_until(deadline), if self.debounce_deadline.is_some() => {
                    self.debounce_deadline = None;
                    if let Err(ChannelError::Severed(msg)) = self.incremental_scan().await {
                        return self.stop(&msg);
                    }
                }
            }
        }
    }

    /// One full scan after the settle delay, reconciled against the archive
    /// with a single batched existence query. Completes (into Observing)
    /// even when nothing was extracted; it does not retry.
    async fn initial_scan(&mut self) -> Result<(), ChannelError> {
        self.state = LoopState::ScanningInitial;
        sleep(self.timing.settle_delay()).await;

        let page = self.dom.snapshot();
        let records = self.adapter.extract_conversations(&page);
        debug!("initial scan extracted {} records", records.len());

        if !records.is_empty() {
            let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
            match self.channel.check_existing_ids(&ids).await {
                Ok(existing) => {
                    for id in existing {
                        self.known_ids.insert(id);
                    }
                }
                Err(e @ ChannelError::Severed(_)) => return Err(e),
                Err(e) => warn!("existence check failed, treating all as new: {}", e),
            }

            for record in records {
                if self.known_ids.contains(&record.id) {
                    continue;
                }
                // Mark before dispatch: at-most-once even if scanning
                // re-enters.
                self.known_ids.insert(record.id.clone());
                self.submit(&record).await?;
            }
        }

        self.last_scan = Some(Instant::now());
        self.state = LoopState::Observing;
        Ok(())
    }

    /// Mutation batch handling while observing: hidden tabs and irrelevant
    /// batches cost nothing beyond the predicate; batches inside the
    /// throttle window are rejected outright; anything else (re)arms the
    /// debounce deadline.
    fn on_mutation_batch(&mut self, batch: &[MutationRecord]) {
        if self.hidden {
            return;
        }
        if !self.is_relevant(batch) {
            return;
        }
        if let Some(last) = self.last_scan {
            if last.elapsed() < self.timing.throttle_interval() {
                trace!("mutation batch inside throttle window, dropped");
                return;
            }
        }
        self.debounce_deadline = Some(Instant::now() + self.timing.debounce_delay());
    }

    fn on_visibility(&mut self, hidden: bool) {
        self.hidden = hidden;
        // A hidden tab cancels the pending timer outright; capture resumes
        // only on the next organic mutation.
        if hidden && self.debounce_deadline.take().is_some() {
            debug!("tab hidden, pending incremental scan cancelled");
        }
    }

    /// Does any added/changed node, or a shallow descendant, carry a
    /// platform keyword in its class or id?
    fn is_relevant(&self, batch: &[MutationRecord]) -> bool {
        let hints = self.adapter.mutation_hints();
        batch.iter().any(|record| {
            let added_matches = record
                .added
                .iter()
                .filter_map(DomNode::as_element)
                .any(|el| element_matches_hints(el, hints, 0));
            let target_matches = record
                .target
                .as_ref()
                .map(|t| element_matches_hints(t, hints, 0))
                .unwrap_or(false);
            added_matches || target_matches
        })
    }

    async fn incremental_scan(&mut self) -> Result<(), ChannelError> {
        if self.is_processing {
            debug!("scan already in flight, trigger dropped");
            return Ok(());
        }
        if self.hidden {
            return Ok(());
        }

        self.is_processing = true;
        self.state = LoopState::ScanningIncremental;
        let result = self.scan_and_send().await;
        self.is_processing = false;
        self.last_scan = Some(Instant::now());
        if !matches!(result, Err(ChannelError::Severed(_))) {
            self.state = LoopState::Observing;
        }
        result
    }

    async fn scan_and_send(&mut self) -> Result<(), ChannelError> {
        let page = self.dom.snapshot();
        let records = self.adapter.extract_conversations(&page);
        let fresh: Vec<_> = records
            .into_iter()
            .filter(|r| !self.known_ids.contains(&r.id))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        info!("incremental scan found {} new records", fresh.len());
        let spaced = fresh.len() > 1;
        for record in fresh {
            self.known_ids.insert(record.id.clone());
            self.submit(&record).await?;
            // Spacing keeps a burst from flooding the archive channel.
            if spaced {
                sleep(self.timing.send_spacing()).await;
            }
        }
        Ok(())
    }

    /// Submit one record. Only a severed channel propagates; duplicates,
    /// capacity refusals and remote failures are absorbed here so the batch
    /// keeps going.
    async fn submit(
        &mut self,
        record: &crate::types::ConversationRecord,
    ) -> Result<(), ChannelError> {
        match self.channel.submit_record(record).await {
            Ok(outcome) => {
                if outcome.is_duplicate {
                    debug!("record {} already archived", record.id);
                } else if !outcome.accepted {
                    // Capacity refusal: structured rejection, never retried.
                    warn!("archive refused record {}", record.id);
                }
                if let Some(warning) = outcome.capacity_warning {
                    warn!("storage capacity {:?}: {}", warning.category, warning.message);
                }
                Ok(())
            }
            Err(e @ ChannelError::Severed(_)) => Err(e),
            Err(e) => {
                warn!("submit failed for {}: {}", record.id, e);
                Ok(())
            }
        }
    }

    /// Terminal teardown: pending timer cleared, state pinned to Stopped.
    /// Logged once as a warning; the page must reload to resume capture.
    fn stop(&mut self, reason: &str) -> LoopState {
        self.debounce_deadline = None;
        self.state = LoopState::Stopped;
        warn!("capture stopped: {}", reason);
        LoopState::Stopped
    }
}

fn element_matches_hints(el: &DomElement, hints: &[&str], depth: u32) -> bool {
    let haystack = format!("{} {}", el.class_name, el.id).to_lowercase();
    if hints.iter().any(|hint| haystack.contains(hint)) {
        return true;
    }
    if depth >= HINT_SCAN_DEPTH {
        return false;
    }
    el.child_elements()
        .any(|child| element_matches_hints(child, hints, depth + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_matching_checks_shallow_descendants_only() {
        let hints = &["ds-message"];

        let direct = DomElement::new("div").with_class("ds-message abc");
        assert!(element_matches_hints(&direct, hints, 0));

        let by_id = DomElement::new("div").with_id("ds-message-42");
        assert!(element_matches_hints(&by_id, hints, 0));

        // Depth 2 descendant: matched.
        let two_deep = DomElement::new("div").with_child(
            DomElement::new("div").with_child(DomElement::new("div").with_class("ds-message")),
        );
        assert!(element_matches_hints(&two_deep, hints, 0));

        // Depth 3 descendant: beyond the shallow scan.
        let three_deep = DomElement::new("div").with_child(DomElement::new("div").with_child(
            DomElement::new("div").with_child(DomElement::new("div").with_class("ds-message")),
        ));
        assert!(!element_matches_hints(&three_deep, hints, 0));

        let unrelated = DomElement::new("div").with_class("hover-highlight");
        assert!(!element_matches_hints(&unrelated, hints, 0));
    }

    #[test]
    fn hint_matching_is_case_insensitive_on_the_node_side() {
        let hints = &["conversation-container"];
        let el = DomElement::new("div").with_class("Conversation-Container extra");
        assert!(element_matches_hints(&el, hints, 0));
    }
}
