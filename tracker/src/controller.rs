use crate::auth::{AuthProvider, AuthSession};
use crate::config::SyncConfig;
use crate::errors::{AuthError, FetchError, QueryError};
use crate::fetcher::{Completion, DebouncedFetcher, FetchEvent, TrackSource};
use crate::metrics::{FETCH_FAILURES_TOTAL, GATED_EVENTS_TOTAL, STALE_RESPONSES_TOTAL};
use crate::query::{QueryBuilder, QueryParameters};
use crate::view::{DisplayRecord, MapSurface, ReconcileSummary, ViewReconciler};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    LoggedOut,
    Syncing,
    Idle { records: usize },
}

/// Something the operator should be told about
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    LoggedIn { username: String },
    LoginFailed(AuthError),
    Loaded { records: usize, markers: usize },
    FetchFailed(FetchError),
    QueryRejected(QueryError),
}

/// Operator intents fed into [`SyncController::run`]
#[derive(Debug)]
pub enum Command {
    Login { username: String, password: String },
    SetResultLimit(NonZeroU32),
    SetUpperBound(u64),
    Show,
}

/// What handling one fetcher event amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Issued { seq: u64 },
    Applied { seq: u64, summary: ReconcileSummary },
    Discarded { seq: u64 },
    Failed { seq: u64, error: FetchError },
}

/// Drives authentication, debounced fetching and view reconciliation.
///
/// All state lives here and is only touched from the task that owns the
/// controller; fetches run elsewhere and report back through the fetcher.
pub struct SyncController<M> {
    session: AuthSession,
    provider: Arc<dyn AuthProvider>,
    builder: QueryBuilder,
    fetcher: DebouncedFetcher,
    view: ViewReconciler<M>,
    params: QueryParameters,
    state: SyncState,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<M: MapSurface> SyncController<M> {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        source: Arc<dyn TrackSource>,
        builder: QueryBuilder,
        params: QueryParameters,
        map: M,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notice>), QueryError> {
        if params.device_id.is_empty() {
            return Err(QueryError::EmptyDeviceId);
        }

        let (notices, notices_rx) = mpsc::unbounded_channel();
        let controller = Self {
            session: AuthSession::new(),
            provider,
            builder,
            fetcher: DebouncedFetcher::new(source, config.quiet_period),
            view: ViewReconciler::new(map, config),
            params,
            state: SyncState::LoggedOut,
            notices,
        };
        Ok((controller, notices_rx))
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn params(&self) -> &QueryParameters {
        &self.params
    }

    pub fn records(&self) -> &[DisplayRecord] {
        self.view.records()
    }

    pub fn view(&self) -> &ViewReconciler<M> {
        &self.view
    }

    pub fn fetcher(&self) -> &DebouncedFetcher {
        &self.fetcher
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        let provider = Arc::clone(&self.provider);
        match self
            .session
            .authenticate(provider.as_ref(), username, password)
            .await
        {
            Ok(_) => {
                self.state = SyncState::Syncing;
                self.notify(Notice::LoggedIn {
                    username: username.to_string(),
                });
                self.request_sync();
                Ok(())
            }
            Err(e) => {
                self.fetcher.cancel();
                self.state = SyncState::LoggedOut;
                self.notify(Notice::LoginFailed(e.clone()));
                Err(e)
            }
        }
    }

    pub fn set_result_limit(&mut self, limit: NonZeroU32) {
        debug!("Result limit set to {}", limit);
        self.params.result_limit = limit;
        self.request_sync();
    }

    /// `0` removes the upper bound
    pub fn set_upper_bound(&mut self, upper_bound: u64) {
        debug!("Upper bound set to {}", upper_bound);
        self.params.upper_bound = upper_bound;
        self.request_sync();
    }

    /// Schedules a debounced sync cycle. Nothing happens while logged out.
    fn request_sync(&mut self) -> bool {
        let token = match (self.state, self.session.current_token()) {
            (SyncState::LoggedOut, _) | (_, None) => {
                GATED_EVENTS_TOTAL.inc();
                debug!("Not authenticated, ignoring sync request");
                return false;
            }
            (_, Some(token)) => token,
        };

        match self.builder.build(&self.params, token) {
            Ok(request) => {
                self.fetcher.schedule(request);
                true
            }
            Err(e) => {
                error!("Cannot build track request: {}", e);
                self.log_out();
                self.notify(Notice::QueryRejected(e));
                false
            }
        }
    }

    /// Waits for the next fetcher event and applies it
    pub async fn process_next(&mut self) -> Progress {
        match self.fetcher.next_event().await {
            FetchEvent::Issued { seq, url } => {
                info!("Fetching track #{}: {}", seq, url);
                Progress::Issued { seq }
            }
            FetchEvent::Completed(completion) => self.handle_completion(completion),
        }
    }

    fn handle_completion(&mut self, completion: Completion) -> Progress {
        let Completion { seq, result } = completion;

        if !self.fetcher.is_latest(seq) {
            STALE_RESPONSES_TOTAL.inc();
            debug!(
                "Discarding response #{}, #{} is newer",
                seq,
                self.fetcher.latest_seq()
            );
            return Progress::Discarded { seq };
        }
        if self.state == SyncState::LoggedOut {
            debug!("Discarding response #{} received while logged out", seq);
            return Progress::Discarded { seq };
        }

        match result {
            Ok(page) => {
                let summary = self.view.replace_all(page.items);
                self.state = SyncState::Idle {
                    records: summary.records,
                };
                self.notify(Notice::Loaded {
                    records: summary.records,
                    markers: summary.markers,
                });
                Progress::Applied { seq, summary }
            }
            Err(error) => {
                FETCH_FAILURES_TOTAL.inc();
                error!("Track fetch #{} failed: {}", seq, error);
                self.log_out();
                self.notify(Notice::FetchFailed(error.clone()));
                Progress::Failed { seq, error }
            }
        }
    }

    fn log_out(&mut self) {
        self.session.invalidate();
        self.fetcher.cancel();
        self.state = SyncState::LoggedOut;
    }

    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Login { username, password } => {
                // Failure is reported through the notice channel
                let _ = self.login(&username, &password).await;
            }
            Command::SetResultLimit(limit) => self.set_result_limit(limit),
            Command::SetUpperBound(upper_bound) => self.set_upper_bound(upper_bound),
            Command::Show => self.log_track(),
        }
    }

    fn log_track(&self) {
        info!(
            "State {:?}, device {}, limit {}, upper bound {}",
            self.state, self.params.device_id, self.params.result_limit, self.params.upper_bound
        );
        for record in self.view.records() {
            let position = record
                .position
                .map(|p| p.to_string())
                .unwrap_or_else(|| "no fix".to_string());
            info!(
                "{} | {} | bat={} temp={} humi={} type={}",
                record.display_time,
                position,
                show(&record.battery),
                show(&record.temperature),
                show(&record.humidity),
                show(&record.kind),
            );
        }
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            warn!("Notice receiver dropped");
        }
    }

    /// Event loop: operator commands, debounce deadlines and fetch
    /// completions, one at a time. Returns when the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Self {
        info!("Sync controller started for device {}", self.params.device_id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                progress = self.process_next() => {
                    debug!("{:?}", progress);
                }
            }
        }

        info!("Sync controller stopped");
        self
    }
}

fn show<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}
