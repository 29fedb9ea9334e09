use crate::errors::{FetchError, Result};
use crate::metrics::{FETCHES_ISSUED_TOTAL, FETCH_LATENCY_SECONDS, SUPERSEDED_SCHEDULES_TOTAL};
use crate::model::TrackPage;
use crate::query::RequestDescriptor;
use crate::validate::validate_page;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Where track pages come from
#[async_trait]
pub trait TrackSource: Send + Sync + 'static {
    async fn fetch(&self, request: &RequestDescriptor) -> std::result::Result<TrackPage, FetchError>;
}

/// Fetches track pages over HTTP and validates them at the boundary
#[derive(Debug, Clone)]
pub struct HttpTrackSource {
    http: reqwest::Client,
}

impl HttpTrackSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TrackSource for HttpTrackSource {
    async fn fetch(&self, request: &RequestDescriptor) -> std::result::Result<TrackPage, FetchError> {
        let response = self
            .http
            .get(request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let page: TrackPage =
            serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        validate_page(&page)?;

        Ok(page)
    }
}

#[derive(Debug)]
enum DebounceState {
    Idle,
    Armed {
        deadline: Instant,
        pending: RequestDescriptor,
    },
}

/// Quiet-period timer with a single pending slot.
///
/// `Idle --schedule--> Armed --schedule--> Armed (deadline pushed back)`,
/// `Armed --fire--> Idle` once the deadline has passed, `Armed --cancel--> Idle`.
#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            state: DebounceState::Idle,
        }
    }

    /// Returns true when a pending request was superseded
    pub fn schedule(&mut self, request: RequestDescriptor, now: Instant) -> bool {
        let superseded = matches!(self.state, DebounceState::Armed { .. });
        self.state = DebounceState::Armed {
            deadline: now + self.quiet_period,
            pending: request,
        };
        superseded
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Idle => None,
            DebounceState::Armed { deadline, .. } => Some(*deadline),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }

    /// Takes the pending request if its quiet period has elapsed
    pub fn fire(&mut self, now: Instant) -> Option<RequestDescriptor> {
        match std::mem::replace(&mut self.state, DebounceState::Idle) {
            DebounceState::Armed { deadline, pending } if now >= deadline => Some(pending),
            armed => {
                self.state = armed;
                None
            }
        }
    }

    pub fn cancel(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = DebounceState::Idle;
        was_armed
    }
}

/// Outcome of one issued fetch, tagged with the sequence it was issued under
#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub result: std::result::Result<TrackPage, FetchError>,
}

#[derive(Debug)]
pub enum FetchEvent {
    Issued { seq: u64, url: Url },
    Completed(Completion),
}

/// Debounces fetch requests and tags every issued request with a sequence
/// number so late responses from superseded fetches can be recognised.
pub struct DebouncedFetcher {
    debouncer: Debouncer,
    source: Arc<dyn TrackSource>,
    latest_seq: u64,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl DebouncedFetcher {
    pub fn new(source: Arc<dyn TrackSource>, quiet_period: Duration) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            debouncer: Debouncer::new(quiet_period),
            source,
            latest_seq: 0,
            in_flight: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn schedule(&mut self, request: RequestDescriptor) {
        debug!("Scheduling fetch of {}", request.url);
        if self.debouncer.schedule(request, Instant::now()) {
            SUPERSEDED_SCHEDULES_TOTAL.inc();
            debug!("Superseded pending fetch");
        }
    }

    /// Drops the pending request, if any. In-flight requests are unaffected.
    pub fn cancel(&mut self) {
        if self.debouncer.cancel() {
            debug!("Cancelled pending fetch");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.debouncer.is_armed()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    /// Staleness guard: only the most recently issued fetch may be applied
    pub fn is_latest(&self, seq: u64) -> bool {
        seq == self.latest_seq
    }

    /// Waits for the debounce deadline or a fetch completion, whichever comes
    /// first. Pends forever when idle with nothing in flight.
    pub async fn next_event(&mut self) -> FetchEvent {
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(request) = self.debouncer.fire(Instant::now()) {
                        let url = request.url.clone();
                        let seq = self.issue(request);
                        return FetchEvent::Issued { seq, url };
                    }
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    return FetchEvent::Completed(completion);
                }
            }
        }
    }

    fn issue(&mut self, request: RequestDescriptor) -> u64 {
        self.latest_seq += 1;
        self.in_flight += 1;
        let seq = self.latest_seq;
        FETCHES_ISSUED_TOTAL.inc();
        debug!("Issuing fetch #{}: {}", seq, request.url);

        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = source.fetch(&request).await;
            FETCH_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
            if tx.send(Completion { seq, result }).is_err() {
                warn!("Fetch #{} finished after its fetcher was dropped", seq);
            }
        });

        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Payload, RawRecord};
    use reqwest::header::HeaderMap;
    use std::sync::Mutex;

    fn request(limit: u32) -> RequestDescriptor {
        RequestDescriptor {
            url: Url::parse(&format!("http://track.test/v1/gps-data?imsi=dev-1&sort=desc&limit={}", limit))
                .unwrap(),
            headers: HeaderMap::new(),
        }
    }

    fn limit_of(request: &RequestDescriptor) -> u64 {
        request
            .url
            .query_pairs()
            .find(|(key, _)| key == "limit")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap()
    }

    /// Answers with `limit` records after `limit * 100ms`
    #[derive(Default)]
    struct SlowSource {
        seen: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl TrackSource for SlowSource {
        async fn fetch(&self, request: &RequestDescriptor) -> std::result::Result<TrackPage, FetchError> {
            let limit = limit_of(request);
            self.seen.lock().unwrap().push(limit);
            tokio::time::sleep(Duration::from_millis(limit * 100)).await;
            let items = (0..limit)
                .map(|i| RawRecord {
                    timestamp: 1_000_000 - i as i64,
                    payloads: Payload::default(),
                })
                .collect();
            Ok(TrackPage { items, count: None })
        }
    }

    #[test]
    fn test_debouncer_state_machine() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(1000));
        assert!(!debouncer.is_armed());
        assert!(debouncer.fire(start).is_none());

        assert!(!debouncer.schedule(request(1), start));
        assert!(debouncer.schedule(request(10), start + Duration::from_millis(500)));
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(1500)));

        // Still inside the quiet period of the second schedule
        assert!(debouncer.fire(start + Duration::from_millis(1200)).is_none());
        assert!(debouncer.is_armed());

        let fired = debouncer.fire(start + Duration::from_millis(1500)).unwrap();
        assert_eq!(limit_of(&fired), 10);
        assert!(!debouncer.is_armed());
    }

    #[test]
    fn test_debouncer_cancel() {
        let mut debouncer = Debouncer::new(Duration::from_millis(1000));
        assert!(!debouncer.cancel());
        debouncer.schedule(request(1), Instant::now());
        assert!(debouncer.cancel());
        assert!(debouncer.fire(Instant::now() + Duration::from_secs(5)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_request() {
        let source = Arc::new(SlowSource::default());
        let mut fetcher = DebouncedFetcher::new(source.clone(), Duration::from_millis(1000));

        for limit in [1, 10, 100, 1, 10] {
            fetcher.schedule(request(limit));
            tokio::time::advance(Duration::from_millis(300)).await;
        }

        let issued_at = Instant::now();
        match fetcher.next_event().await {
            FetchEvent::Issued { seq, .. } => assert_eq!(seq, 1),
            other => panic!("expected issue, got {:?}", other),
        }
        // Quiet period counted from the last schedule
        assert_eq!(issued_at + Duration::from_millis(700), Instant::now());

        match fetcher.next_event().await {
            FetchEvent::Completed(completion) => {
                assert_eq!(completion.seq, 1);
                assert_eq!(completion.result.unwrap().items.len(), 10);
            }
            other => panic!("expected completion, got {:?}", other),
        }

        assert_eq!(*source.seen.lock().unwrap(), vec![10]);
        assert_eq!(fetcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_not_latest() {
        let source = Arc::new(SlowSource::default());
        let mut fetcher = DebouncedFetcher::new(source, Duration::from_millis(1000));

        // Slow fetch first (10s), then a fast one (100ms)
        fetcher.schedule(request(100));
        assert!(matches!(fetcher.next_event().await, FetchEvent::Issued { seq: 1, .. }));
        fetcher.schedule(request(1));
        assert!(matches!(fetcher.next_event().await, FetchEvent::Issued { seq: 2, .. }));
        assert_eq!(fetcher.in_flight(), 2);

        let FetchEvent::Completed(fast) = fetcher.next_event().await else {
            panic!("expected completion");
        };
        assert_eq!(fast.seq, 2);
        assert!(fetcher.is_latest(fast.seq));

        let FetchEvent::Completed(slow) = fetcher.next_event().await else {
            panic!("expected completion");
        };
        assert_eq!(slow.seq, 1);
        assert!(!fetcher.is_latest(slow.seq));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_is_never_issued() {
        let source = Arc::new(SlowSource::default());
        let mut fetcher = DebouncedFetcher::new(source.clone(), Duration::from_millis(1000));

        fetcher.schedule(request(10));
        fetcher.cancel();

        let outcome =
            tokio::time::timeout(Duration::from_secs(30), fetcher.next_event()).await;
        assert!(outcome.is_err());
        assert!(source.seen.lock().unwrap().is_empty());
        assert_eq!(fetcher.latest_seq(), 0);
    }
}
