//! Worker session: the state machine that sequences load → ready → search.
//!
//! ```text
//! Idle --load--> Loading --index built--> Ready (serves searches until exit)
//!                        \--load error--> Failed
//! ```
//!
//! [`Session`] holds all state and turns each request or load completion into
//! responses. [`run`] drives it from a request channel. The load itself runs on
//! the blocking pool and its outcome is fed back into the same loop, so only
//! the loop ever touches session state.

use crate::config::{PrematureSearchPolicy, StoreConfig, WorkerConfig};
use crate::data::read_features;
use crate::error::LoadError;
use crate::index::AdminLookup;
use crate::protocol::{
    read_requests, write_responses, LoadRequest, Request, Response, SearchRequest,
};
use crate::store::{ingest, write_side_table};
use crate::title::set_process_title;
use crate::types::Properties;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const REQUEST_BUFFER: usize = 256;
const RESPONSE_BUFFER: usize = 256;

/// Coarse view of where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Ready,
    Failed,
}

enum State {
    Idle,
    Loading { layer: String, started: Instant },
    Ready { layer: String, lookup: AdminLookup },
    Failed { layer: String },
}

/// Everything a finished load hands back to the session.
pub struct LoadedLayer {
    pub layer: String,
    pub lookup: AdminLookup,
    pub side_table: PathBuf,
}

/// A pending layer load, detached from the session so it can run off the loop.
#[derive(Debug, Clone)]
pub struct LoadJob {
    pub layer: String,
    pub datapath: PathBuf,
    pub localized_names: Option<Properties>,
    pub store: StoreConfig,
}

impl LoadJob {
    pub fn new(request: LoadRequest, store: StoreConfig) -> Self {
        let localized_names = match request.localized_admin_names {
            Some(serde_json::Value::Object(names)) => Some(names),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                warn!(
                    layer = %request.layer,
                    value = %other,
                    "ignoring non-object localizedAdminNames"
                );
                None
            }
        };

        Self {
            layer: request.layer,
            datapath: request.datapath,
            localized_names,
            store,
        }
    }

    /// Streams the dataset, partitions it, persists the side table and builds the index.
    ///
    /// The side table is on disk and synced before this returns `Ok`.
    pub fn run(self) -> Result<LoadedLayer, LoadError> {
        let features = read_features(
            &self.datapath,
            &self.layer,
            self.localized_names.as_ref(),
            &self.store.id_property,
        )?;

        let (side_table, reduced) = ingest(&self.layer, features, &self.store)?;
        let side_table = write_side_table(&self.store.side_table_dir, &self.layer, &side_table)?;
        let lookup = AdminLookup::build(reduced);

        Ok(LoadedLayer {
            layer: self.layer,
            lookup,
            side_table,
        })
    }
}

/// Result of handling one request.
#[derive(Default)]
pub struct Step {
    pub responses: Vec<Response>,
    /// Set when the request started a load the caller must execute.
    pub load: Option<LoadJob>,
}

pub struct Session {
    config: WorkerConfig,
    state: State,
    pending: VecDeque<SearchRequest>,
}

impl Session {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            pending: VecDeque::new(),
        }
    }

    pub fn status(&self) -> Status {
        match self.state {
            State::Idle => Status::Idle,
            State::Loading { .. } => Status::Loading,
            State::Ready { .. } => Status::Ready,
            State::Failed { .. } => Status::Failed,
        }
    }

    /// Layer name, empty until a load has been accepted.
    pub fn layer(&self) -> &str {
        match &self.state {
            State::Idle => "",
            State::Loading { layer, .. }
            | State::Ready { layer, .. }
            | State::Failed { layer } => layer,
        }
    }

    /// Number of searches waiting for the layer to become ready.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    pub fn handle_request(&mut self, request: Request) -> Step {
        match request {
            Request::Load(load) => self.handle_load(load),
            Request::Search(search) => Step {
                responses: self.handle_search(search).into_iter().collect(),
                load: None,
            },
            Request::Unknown(message) => {
                warn!(%message, "Unknown message");
                Step::default()
            }
        }
    }

    fn handle_load(&mut self, load: LoadRequest) -> Step {
        if !matches!(self.state, State::Idle) {
            warn!(
                current = %self.layer(),
                requested = %load.layer,
                "ignoring load: worker already holds a layer"
            );
            return Step::default();
        }

        info!(layer = %load.layer, datapath = %load.datapath.display(), "loading layer");
        set_process_title(&load.layer);

        self.state = State::Loading {
            layer: load.layer.clone(),
            started: Instant::now(),
        };

        Step {
            responses: Vec::new(),
            load: Some(LoadJob::new(load, self.config.store.clone())),
        }
    }

    fn handle_search(&mut self, search: SearchRequest) -> Option<Response> {
        match &self.state {
            State::Ready { layer, lookup } => Some(Response::Results {
                layer: layer.clone(),
                id: search.id,
                results: lookup.search(search.coords.longitude, search.coords.latitude),
            }),
            State::Failed { layer } => Some(empty_results(layer, search)),
            State::Idle | State::Loading { .. } => match self.config.session.premature_search {
                PrematureSearchPolicy::Queue => {
                    debug!(request_id = %search.id, "queueing search until layer is ready");
                    self.pending.push_back(search);
                    None
                }
                PrematureSearchPolicy::Reject => {
                    debug!(request_id = %search.id, "rejecting search before layer is ready");
                    Some(empty_results(self.layer(), search))
                }
            },
        }
    }

    /// Installs the outcome of a load and answers any queued searches.
    pub fn finish_load(&mut self, outcome: Result<LoadedLayer, LoadError>) -> Vec<Response> {
        let (layer, started) = match &self.state {
            State::Loading { layer, started } => (layer.clone(), *started),
            _ => {
                warn!("ignoring load completion outside of Loading");
                return Vec::new();
            }
        };

        let mut responses = Vec::new();
        match outcome {
            Ok(loaded) => {
                let seconds = started.elapsed().as_secs_f64();
                info!(
                    layer = %layer,
                    features = loaded.lookup.len(),
                    side_table = %loaded.side_table.display(),
                    seconds,
                    "layer loaded"
                );
                self.state = State::Ready {
                    layer: layer.clone(),
                    lookup: loaded.lookup,
                };
                responses.push(Response::Loaded { layer, seconds });
            }
            Err(e) => {
                error!(layer = %layer, error = %e, "layer load failed");
                if self.config.session.report_load_failure {
                    responses.push(Response::LoadFailed {
                        layer: layer.clone(),
                        error: e.to_string(),
                    });
                }
                self.state = State::Failed { layer };
            }
        }

        while let Some(search) = self.pending.pop_front() {
            responses.extend(self.handle_search(search));
        }
        responses
    }
}

fn empty_results(layer: &str, search: SearchRequest) -> Response {
    Response::Results {
        layer: layer.to_string(),
        id: search.id,
        results: Properties::new(),
    }
}

/// Runs a session until the request channel closes or the response side goes away.
pub async fn run(
    config: WorkerConfig,
    mut requests: mpsc::Receiver<Request>,
    responses: mpsc::Sender<Response>,
) {
    let mut session = Session::new(config);
    let (done_tx, mut done_rx) = mpsc::channel::<Result<LoadedLayer, LoadError>>(1);

    loop {
        let outgoing = tokio::select! {
            request = requests.recv() => match request {
                Some(request) => {
                    let step = session.handle_request(request);
                    if let Some(job) = step.load {
                        spawn_load(job, done_tx.clone());
                    }
                    step.responses
                }
                None => break,
            },
            Some(outcome) = done_rx.recv() => session.finish_load(outcome),
        };

        for response in outgoing {
            if responses.send(response).await.is_err() {
                debug!("response channel closed");
                return;
            }
        }
    }

    debug!(layer = %session.layer(), "request channel closed, session ending");
}

/// Serves the protocol over a byte stream pair, typically stdin/stdout.
///
/// Returns once the input reaches EOF and every response has been written.
pub async fn serve<R, W>(config: WorkerConfig, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
    let (response_tx, response_rx) = mpsc::channel(RESPONSE_BUFFER);

    let reader_task = tokio::spawn(async move {
        if let Err(e) = read_requests(reader, request_tx).await {
            error!(error = %e, "failed to read from parent");
        }
    });
    let writer_task = tokio::spawn(write_responses(writer, response_rx));

    run(config, request_rx, response_tx).await;

    // The reader can still be parked on input if the writer went away first.
    reader_task.abort();
    writer_task.await.map_err(std::io::Error::other)?
}

fn spawn_load(job: LoadJob, done: mpsc::Sender<Result<LoadedLayer, LoadError>>) {
    tokio::spawn(async move {
        let layer = job.layer.clone();
        let outcome = match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(LoadError::Aborted {
                layer,
                reason: e.to_string(),
            }),
        };
        let _ = done.send(outcome).await;
    });
}
