//! Capture loop behavior against a stubbed archive channel.
//!
//! All tests run under a paused tokio clock, so settle/throttle/debounce
//! timing is exact and the tests finish instantly.

use capture_router::adapters::GeminiAdapter;
use capture_router::dom::{DomElement, MutationRecord, Page, ReadyState, SharedDom};
use capture_router::{
    ArchiveChannel, CaptureLoop, ChannelError, ConversationRecord, LoopState, PageEvent,
    SubmitOutcome, TimingConfig,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

#[derive(Clone, Default)]
struct StubArchive {
    existing: Vec<String>,
    refuse_all: bool,
    sever_on_submit: bool,
    submissions: Arc<Mutex<Vec<(String, Instant)>>>,
    existence_queries: Arc<Mutex<Vec<Vec<String>>>>,
}

impl StubArchive {
    fn submitted_ids(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn submission_times(&self) -> Vec<Instant> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait::async_trait]
impl ArchiveChannel for StubArchive {
    async fn submit_record(
        &mut self,
        record: &ConversationRecord,
    ) -> Result<SubmitOutcome, ChannelError> {
        if self.sever_on_submit {
            return Err(ChannelError::Severed("stub severed".to_string()));
        }
        self.submissions
            .lock()
            .unwrap()
            .push((record.id.clone(), Instant::now()));
        Ok(SubmitOutcome {
            accepted: !self.refuse_all,
            is_duplicate: false,
            capacity_warning: None,
        })
    }

    async fn check_existing_ids(&mut self, ids: &[String]) -> Result<Vec<String>, ChannelError> {
        self.existence_queries.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .filter(|id| self.existing.contains(id))
            .cloned()
            .collect())
    }

    async fn is_domain_enabled(&mut self, _domain: &str) -> Result<bool, ChannelError> {
        Ok(true)
    }
}

const PAGE_URL: &str = "https://gemini.google.com/app/test";

fn turn(question: &str, answer: &str) -> DomElement {
    DomElement::new("div")
        .with_class("conversation-container")
        .with_child(
            DomElement::new("div")
                .with_class("user-query-container")
                .with_text(question),
        )
        .with_child(
            DomElement::new("div")
                .with_class("response-container-content")
                .with_text(answer),
        )
}

fn gemini_page(turns: Vec<DomElement>, ready_state: ReadyState) -> Page {
    let mut history = DomElement::new("div").with_id("chat-history");
    for t in turns {
        history = history.with_child(t);
    }
    Page {
        url: PAGE_URL.to_string(),
        title: "Gemini".to_string(),
        ready_state,
        body: DomElement::new("body").with_child(history),
    }
}

fn relevant_mutation() -> PageEvent {
    PageEvent::Mutations(vec![MutationRecord {
        added: vec![capture_router::DomNode::Element(
            DomElement::new("div").with_class("conversation-container"),
        )],
        target: None,
    }])
}

fn irrelevant_mutation() -> PageEvent {
    PageEvent::Mutations(vec![MutationRecord {
        added: vec![capture_router::DomNode::Element(
            DomElement::new("div").with_class("hover-highlight"),
        )],
        target: None,
    }])
}

fn id_for(question: &str, answer: &str) -> String {
    capture_router::record_id("Gemini", PAGE_URL, question, answer)
}

fn start_loop(
    stub: StubArchive,
    dom: SharedDom,
) -> (mpsc::Sender<PageEvent>, tokio::task::JoinHandle<LoopState>) {
    let (tx, rx) = mpsc::channel(100);
    let capture = CaptureLoop::new(
        Box::new(GeminiAdapter),
        stub,
        dom,
        TimingConfig::default(),
    );
    (tx, tokio::spawn(capture.run(rx)))
}

const Q1: &str = "how do I sort a vec";
const A1: &str = "Call sort on a mutable slice of the vec.";
const Q2: &str = "is that sort stable";
const A2: &str = "Yes, slice::sort is a stable sort in Rust.";

#[tokio::test(start_paused = true)]
async fn initial_scan_reconciles_with_one_batched_query() {
    let stub = StubArchive {
        existing: vec![id_for(Q1, A1)],
        ..Default::default()
    };
    let dom = SharedDom::new(gemini_page(vec![turn(Q1, A1), turn(Q2, A2)], ReadyState::Complete));
    let (_tx, _handle) = start_loop(stub.clone(), dom);

    sleep(Duration::from_secs(2)).await;

    // One batched existence query covering both candidates.
    let queries = stub.existence_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].len(), 2);

    // Only the record the archive did not already hold was submitted.
    assert_eq!(stub.submitted_ids(), vec![id_for(Q2, A2)]);
}

#[tokio::test(start_paused = true)]
async fn rescan_of_unchanged_page_submits_nothing() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));
    let (tx, _handle) = start_loop(stub.clone(), dom);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(stub.submitted_ids(), vec![id_for(Q1, A1)]);

    // Relevant mutation, but the page content is unchanged: the scan runs
    // and finds nothing new.
    tx.send(relevant_mutation()).await.unwrap();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(stub.submitted_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn irrelevant_mutations_never_schedule_a_scan() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![], ReadyState::Complete));
    let (tx, _handle) = start_loop(stub.clone(), dom.clone());

    sleep(Duration::from_secs(5)).await;
    dom.replace(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));

    tx.send(irrelevant_mutation()).await.unwrap();
    sleep(Duration::from_secs(10)).await;
    assert!(stub.submitted_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mutation_burst_collapses_to_one_debounced_scan() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));
    let (tx, _handle) = start_loop(stub.clone(), dom.clone());

    // Let the initial scan complete (settle delay 1s).
    sleep(Duration::from_secs(2)).await;
    let initial_times = stub.submission_times();
    assert_eq!(initial_times.len(), 1);
    let initial_scan_time = initial_times[0];

    // New turn appears; burst starts once the throttle window is open.
    dom.replace(gemini_page(vec![turn(Q1, A1), turn(Q2, A2)], ReadyState::Complete));
    sleep(Duration::from_millis(2500)).await;

    // 20 mutation events within 1.9 seconds.
    let mut last_event_time = Instant::now();
    for _ in 0..20 {
        tx.send(relevant_mutation()).await.unwrap();
        last_event_time = Instant::now();
        sleep(Duration::from_millis(100)).await;
    }

    sleep(Duration::from_secs(5)).await;

    let times = stub.submission_times();
    assert_eq!(times.len(), 2, "burst must collapse into exactly one scan");
    let incremental = times[1];
    assert!(
        incremental >= last_event_time + Duration::from_secs(2),
        "scan fired before the burst quiesced"
    );
    assert!(
        incremental <= last_event_time + Duration::from_secs(2) + Duration::from_millis(200),
        "scan fired long after the debounce deadline"
    );
    assert!(
        incremental >= initial_scan_time + Duration::from_secs(3),
        "scan fired inside the throttle window"
    );
    assert_eq!(stub.submitted_ids()[1], id_for(Q2, A2));
}

#[tokio::test(start_paused = true)]
async fn mutations_inside_throttle_window_are_rejected_outright() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![], ReadyState::Complete));
    let (tx, _handle) = start_loop(stub.clone(), dom.clone());

    sleep(Duration::from_millis(1500)).await;
    dom.replace(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));

    // Initial scan completed at ~1s; this arrives well inside the 3s
    // throttle window, so no timer is armed and nothing ever fires.
    tx.send(relevant_mutation()).await.unwrap();
    sleep(Duration::from_secs(20)).await;
    assert!(stub.submitted_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hiding_the_tab_cancels_the_pending_scan() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![], ReadyState::Complete));
    let (tx, _handle) = start_loop(stub.clone(), dom.clone());

    sleep(Duration::from_secs(5)).await;
    dom.replace(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));

    // Arm the debounce, then hide the tab before it fires.
    tx.send(relevant_mutation()).await.unwrap();
    sleep(Duration::from_millis(500)).await;
    tx.send(PageEvent::Visibility { hidden: true }).await.unwrap();
    sleep(Duration::from_secs(10)).await;
    assert!(stub.submitted_ids().is_empty(), "cancelled timer still fired");

    // Back to visible: capture resumes only on the next organic mutation.
    tx.send(PageEvent::Visibility { hidden: false }).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert!(stub.submitted_ids().is_empty());

    tx.send(relevant_mutation()).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(stub.submitted_ids(), vec![id_for(Q1, A1)]);
}

#[tokio::test(start_paused = true)]
async fn severed_channel_is_terminal() {
    let stub = StubArchive {
        sever_on_submit: true,
        ..Default::default()
    };
    let dom = SharedDom::new(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));
    let (_tx, handle) = start_loop(stub.clone(), dom);

    let state = handle.await.unwrap();
    assert_eq!(state, LoopState::Stopped);
    assert!(stub.submitted_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refused_submission_is_not_retried() {
    let stub = StubArchive {
        refuse_all: true,
        ..Default::default()
    };
    let dom = SharedDom::new(gemini_page(vec![turn(Q1, A1)], ReadyState::Complete));
    let (tx, _handle) = start_loop(stub.clone(), dom);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(stub.submitted_ids().len(), 1);

    // The refused record stays in the known-set; later scans skip it.
    tx.send(relevant_mutation()).await.unwrap();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(stub.submitted_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn still_loading_page_defers_the_initial_scan() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![turn(Q1, A1)], ReadyState::Loading));
    let (tx, _handle) = start_loop(stub.clone(), dom);

    sleep(Duration::from_secs(10)).await;
    assert!(stub.submitted_ids().is_empty(), "scanned before load completed");

    tx.send(PageEvent::Loaded).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(stub.submitted_ids(), vec![id_for(Q1, A1)]);
}

#[tokio::test(start_paused = true)]
async fn bridge_disconnect_ends_the_loop() {
    let stub = StubArchive::default();
    let dom = SharedDom::new(gemini_page(vec![], ReadyState::Complete));
    let (tx, handle) = start_loop(stub, dom);

    sleep(Duration::from_secs(2)).await;
    drop(tx);
    let state = handle.await.unwrap();
    assert_eq!(state, LoopState::Stopped);
}
