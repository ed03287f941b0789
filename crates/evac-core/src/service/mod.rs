// ── Persisted reactive services ──
//
// A `Service` owns one named value (usually a keyed collection), keeps it
// in a namespaced store, and replaces it whenever one of its sources
// derives a new value from the inbound frame stream. Consumers read it
// with `get()`, write it with `set()`, follow it with `subscribe()` and
// talk to the server through its typed actions.
//
// Lifecycle: awaiting-start → running → stopped → running → …
// Every `start()` opens a new generation; the previous generation's loop
// is cancelled before the new one is installed.

pub mod action;
pub mod source;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use bytes::Bytes;
use evac_api::stream::{Boxed, Lagged, abortable, from_events, merge};
use evac_api::{Connection, Frame, FrameStream};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{StreamExt, future};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ServiceOptions;
use crate::error::CoreError;
use crate::model::Identity;
use crate::storage::{SharedStorage, prefix_storage};

pub use action::{
    ActionContext, ActionSet, ActivityAction, ActivityActions, BackupAction, BackupActions,
    CollectionAction, CollectionActions, EditAction, EditActions, NoActions,
};
pub use source::{
    Source, backup_added_source, backup_list_source, backup_removed_source, config_source,
    detail_source, list_source, location_removed_source, removed_source, upsert_source,
};

/// Key of the persisted value inside a service's namespace.
pub const STATE_KEY: &str = "state";

/// Produces the frame stream a service consumes from a connection.
pub type MessageParser = Arc<dyn Fn(&Connection) -> FrameStream + Send + Sync>;

/// Derives a service's storage view from a shared store and the service name.
pub type StorageFactory = Arc<dyn Fn(SharedStorage, &str) -> SharedStorage + Send + Sync>;

// ── Seed ─────────────────────────────────────────────────────────────

/// Base value that [`Service::set`] merges its partial over.
pub enum Seed<T> {
    /// Merge over an empty object.
    None,
    Value(T),
    /// Resolved under the action timeout. `None` merges over `{}`.
    Future(BoxFuture<'static, Option<T>>),
    /// The first item is used. Ending without one is an error.
    Stream(Boxed<T>),
}

impl<T> fmt::Debug for Seed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "Seed::None",
            Self::Value(_) => "Seed::Value",
            Self::Future(_) => "Seed::Future",
            Self::Stream(_) => "Seed::Stream",
        })
    }
}

// ── Start options / running handle ───────────────────────────────────

/// Everything a service needs for one run.
pub struct StartOptions {
    pub connection: Connection,
    /// Frames to consume. Defaults to the connection's own message stream.
    pub frames: Option<FrameStream>,
    /// Shared store to (re)bind. The service keeps its previous binding
    /// when `None`.
    pub storage: Option<SharedStorage>,
    /// Caller signal. Cancelling it stops this run.
    pub signal: Option<CancellationToken>,
}

impl StartOptions {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            frames: None,
            storage: None,
            signal: None,
        }
    }

    pub fn frames(mut self, frames: FrameStream) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("connection", &self.connection)
            .field("frames", &self.frames.is_some())
            .field("storage", &self.storage)
            .field("signal", &self.signal.is_some())
            .finish()
    }
}

/// Handle to one run of a service. Stopping it never affects a later run.
pub struct RunningService {
    name: String,
    generation: u64,
    stop: Box<dyn Fn() + Send + Sync>,
}

impl RunningService {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stop(&self) {
        (self.stop)();
    }
}

impl fmt::Debug for RunningService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningService")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

// ── Shared state ─────────────────────────────────────────────────────

struct Run {
    generation: u64,
    token: CancellationToken,
}

struct ServiceState<T> {
    name: String,
    options: ServiceOptions,
    storage: ArcSwap<Option<SharedStorage>>,
    /// Last accepted value, used when the store is missing or failing.
    latest: ArcSwapOption<T>,
    started: watch::Sender<bool>,
    data: broadcast::Sender<Arc<T>>,
    run: Mutex<Run>,
    connection: ArcSwapOption<Connection>,
    generation: AtomicU64,
}

impl<T: Identity> ServiceState<T> {
    fn new(name: String, options: ServiceOptions, storage: Option<SharedStorage>) -> Self {
        let (started, _) = watch::channel(false);
        let (data, _) = broadcast::channel(options.channel_capacity.max(1));
        Self {
            name,
            options,
            storage: ArcSwap::from_pointee(storage),
            latest: ArcSwapOption::empty(),
            started,
            data,
            run: Mutex::new(Run {
                generation: 0,
                token: CancellationToken::new(),
            }),
            connection: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    async fn wait_started(&self) {
        let mut started = self.started.subscribe();
        // The sender lives as long as `self`, so this only returns once started.
        let _ = started.wait_for(|started| *started).await;
    }

    fn current_token(&self) -> CancellationToken {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    fn latest(&self) -> Option<T> {
        self.latest.load_full().map(|value| T::clone(&value))
    }

    /// Read and validate the persisted value without waiting for start.
    async fn read(&self) -> Option<T> {
        let storage = self.storage.load_full();
        let Some(storage) = storage.as_ref() else {
            return self.latest();
        };

        match storage.get_item_raw(STATE_KEY).await {
            Ok(Some(raw)) => match decode::<T>(&raw) {
                Ok(value) => Some(value),
                Err(message) => {
                    warn!(service = %self.name, error = %message, "discarding invalid persisted state");
                    None
                }
            },
            Ok(None) => self.latest(),
            Err(e) => {
                warn!(service = %self.name, error = %e, "storage read failed, using in-memory state");
                self.latest()
            }
        }
    }

    async fn persist(&self, value: &T) -> Result<(), CoreError> {
        let storage = self.storage.load_full();
        if let Some(storage) = storage.as_ref() {
            let raw = serde_json::to_vec(value)?;
            storage.set_item_raw(STATE_KEY, Bytes::from(raw)).await?;
        }
        Ok(())
    }

    /// Seed an empty in-memory shadow from the store before a run folds over it.
    async fn prime(&self) {
        if self.latest.load().is_some() {
            return;
        }
        if let Some(value) = self.read().await {
            self.latest.store(Some(Arc::new(value)));
        }
    }

    /// Store and persist without broadcasting.
    async fn remember(&self, value: Arc<T>) {
        self.latest.store(Some(Arc::clone(&value)));
        if let Err(e) = self.persist(&value).await {
            warn!(service = %self.name, error = %e, "failed to persist state, keeping it in memory");
        }
    }

    /// Accept one merged value: remember it, then notify subscribers.
    async fn accept(&self, value: T) {
        let value = Arc::new(value);
        self.remember(Arc::clone(&value)).await;
        let receivers = self.data.send(value).unwrap_or(0);
        debug!(service = %self.name, receivers, "received data");
    }

    async fn resolve(&self, seed: Seed<T>) -> Result<Option<T>, CoreError> {
        let pending: BoxFuture<'static, Result<Option<T>, CoreError>> = match seed {
            Seed::None => return Ok(None),
            Seed::Value(value) => return Ok(Some(value)),
            Seed::Future(fut) => fut.map(Ok).boxed(),
            Seed::Stream(mut values) => {
                let name = self.name.clone();
                async move {
                    match values.next().await {
                        Some(value) => Ok(Some(value)),
                        None => Err(CoreError::EmptySeed {
                            message: format!("seed stream for {name} ended without a value"),
                        }),
                    }
                }
                .boxed()
            }
        };

        let token = self.current_token();
        let timeout = self.options.action_timeout;
        tokio::select! {
            biased;
            () = token.cancelled() => Err(CoreError::Aborted),
            resolved = tokio::time::timeout(timeout, pending) => {
                resolved.map_err(|_| CoreError::Timeout { timeout_ms: millis(timeout) })?
            }
        }
    }

    async fn set(&self, partial: Value, seed: Seed<T>) -> Result<T, CoreError> {
        let base = match self.resolve(seed).await? {
            Some(value) => Some(serde_json::to_value(&value)?),
            None => None,
        };

        let merged = merge_shallow(base, partial);
        let value: T = serde_json::from_value(merged)
            .map_err(|e| CoreError::validation(format!("{}: {e}", self.name)))?;
        value
            .validate()
            .map_err(|message| CoreError::validation(format!("{}: {message}", self.name)))?;

        self.remember(Arc::new(value.clone())).await;
        trace!(service = %self.name, "state set");
        Ok(value)
    }

    /// Tear down `generation` if it is still the current run.
    fn dispose(&self, generation: Option<u64>) {
        let run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if generation.is_some_and(|generation| generation != run.generation) {
            return;
        }
        let was_running = !run.token.is_cancelled();
        run.token.cancel();
        self.started.send_replace(false);
        self.connection.store(None);
        if was_running {
            info!(service = %self.name, generation = run.generation, "service stopped");
        }
    }
}

fn decode<T: Identity>(raw: &[u8]) -> Result<T, String> {
    let value: T = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
    value.validate()?;
    Ok(value)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Overlay the top-level fields of `partial` on `base`. A non-object
/// partial replaces the base outright.
fn merge_shallow(base: Option<Value>, partial: Value) -> Value {
    match (base, partial) {
        (Some(Value::Object(mut base)), Value::Object(partial)) => {
            base.extend(partial);
            Value::Object(base)
        }
        (None, Value::Null) => Value::Object(Map::new()),
        (Some(base), Value::Null) => base,
        (_, partial) => partial,
    }
}

// ── StateHandle ──────────────────────────────────────────────────────

/// Read/write access to a service's value, handed to sources and actions.
pub struct StateHandle<T> {
    state: Arc<ServiceState<T>>,
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Identity> StateHandle<T> {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Current value once the service has started.
    pub async fn get(&self) -> Option<T> {
        self.state.wait_started().await;
        self.state.read().await
    }

    /// Last accepted value, read without suspending.
    ///
    /// Sources fold over this so that every fold starts from the value the
    /// previous merged yield left behind.
    pub fn current(&self) -> Option<T> {
        self.state.latest()
    }

    pub async fn set(&self, partial: impl Serialize, seed: Seed<T>) -> Result<T, CoreError> {
        let partial = serde_json::to_value(partial)?;
        self.state.set(partial, seed).await
    }
}

impl<T> fmt::Debug for StateHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("service", &self.state.name)
            .finish()
    }
}

// ── ServiceDefinition ────────────────────────────────────────────────

/// Immutable description of a service, resolved once by [`build`](Self::build).
pub struct ServiceDefinition<T, A = NoActions> {
    name: String,
    sources: Vec<Source<T>>,
    actions: A,
    storage: Option<SharedStorage>,
    storage_factory: StorageFactory,
    parser: Option<MessageParser>,
    options: ServiceOptions,
}

impl<T: Identity> ServiceDefinition<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            actions: NoActions,
            storage: None,
            storage_factory: Arc::new(prefix_storage),
            parser: None,
            options: ServiceOptions::default(),
        }
    }
}

impl<T: Identity, A: ActionSet<T>> ServiceDefinition<T, A> {
    pub fn source(mut self, source: Source<T>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn actions<B: ActionSet<T>>(self, actions: B) -> ServiceDefinition<T, B> {
        ServiceDefinition {
            name: self.name,
            sources: self.sources,
            actions,
            storage: self.storage,
            storage_factory: self.storage_factory,
            parser: self.parser,
            options: self.options,
        }
    }

    /// Bind a shared store at construction so the persisted value is
    /// readable before the first start.
    pub fn storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Override how the shared store is narrowed for this service.
    pub fn storage_factory(
        mut self,
        factory: impl Fn(SharedStorage, &str) -> SharedStorage + Send + Sync + 'static,
    ) -> Self {
        self.storage_factory = Arc::new(factory);
        self
    }

    pub fn parser(mut self, parser: MessageParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Service<T, A> {
        let storage = self
            .storage
            .map(|storage| (self.storage_factory)(storage, &self.name));
        let state = Arc::new(ServiceState::new(self.name, self.options, storage));
        Service {
            state,
            definition: Arc::new(Definition {
                sources: self.sources,
                actions: self.actions,
                storage_factory: self.storage_factory,
                parser: self.parser,
            }),
        }
    }
}

struct Definition<T, A> {
    sources: Vec<Source<T>>,
    actions: A,
    storage_factory: StorageFactory,
    parser: Option<MessageParser>,
}

// ── Service ──────────────────────────────────────────────────────────

/// A named, persisted, reactive value with typed actions.
///
/// Cheaply cloneable; clones share state.
pub struct Service<T, A = NoActions> {
    state: Arc<ServiceState<T>>,
    definition: Arc<Definition<T, A>>,
}

impl<T, A> Clone for Service<T, A> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            definition: Arc::clone(&self.definition),
        }
    }
}

impl<T, A> fmt::Debug for Service<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.state.name)
            .field("sources", &self.definition.sources.len())
            .field("started", &*self.state.started.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: Identity, A: ActionSet<T>> Service<T, A> {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn is_started(&self) -> bool {
        *self.state.started.borrow()
    }

    /// Watch the started flag.
    pub fn started(&self) -> watch::Receiver<bool> {
        self.state.started.subscribe()
    }

    /// The connection of the current run, if any.
    pub fn connection(&self) -> Option<Connection> {
        self.state.connection.load_full().map(|c| Connection::clone(&c))
    }

    fn handle(&self) -> StateHandle<T> {
        StateHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Frames this service consumes from `connection`.
    pub fn frames(&self, connection: &Connection) -> FrameStream {
        match &self.definition.parser {
            Some(parser) => parser(connection),
            None => connection.messages(),
        }
    }

    // ── Read / write ─────────────────────────────────────────────────

    /// Current value. Waits until the service has been started; absent or
    /// invalid persisted data reads as `None`.
    pub async fn get(&self) -> Option<T> {
        self.handle().get().await
    }

    /// Current value without waiting for start.
    pub async fn peek(&self) -> Option<T> {
        self.state.read().await
    }

    /// Shallow-merge `partial` over the resolved `seed`, validate, persist.
    ///
    /// Never sends anything on the wire and does not notify subscribers.
    pub async fn set(&self, partial: impl Serialize, seed: Seed<T>) -> Result<T, CoreError> {
        self.handle().set(partial, seed).await
    }

    /// Current value followed by every future replacement.
    ///
    /// Survives restarts. A subscriber that falls behind resynchronises
    /// from the current snapshot instead of ending.
    pub fn subscribe(&self) -> Boxed<Arc<T>> {
        let state = Arc::clone(&self.state);
        Box::pin(async_stream::stream! {
            loop {
                let mut live = from_events(state.data.subscribe(), None);
                state.wait_started().await;
                if let Some(snapshot) = state.read().await {
                    yield Arc::new(snapshot);
                }
                loop {
                    match live.next().await {
                        Some(Ok(value)) => yield value,
                        Some(Err(Lagged(skipped))) => {
                            warn!(service = %state.name, skipped, "subscriber lagged, resubscribing");
                            break;
                        }
                        None => return,
                    }
                }
            }
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Begin consuming sources for a new run.
    ///
    /// Any previous run is cancelled first, so at most one consumption
    /// loop is live. Must be called from within a Tokio runtime.
    pub fn start(&self, options: StartOptions) -> RunningService {
        let state = &self.state;
        let StartOptions {
            connection,
            frames,
            storage,
            signal,
        } = options;

        let token = signal
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let generation = state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut run = state.run.lock().unwrap_or_else(PoisonError::into_inner);
            run.token.cancel();
            *run = Run {
                generation,
                token: token.clone(),
            };
        }

        if let Some(storage) = storage {
            let bound = (self.definition.storage_factory)(storage, &state.name);
            state.storage.store(Arc::new(Some(bound)));
        }
        let frames = frames.unwrap_or_else(|| connection.messages());
        state.connection.store(Some(Arc::new(connection)));

        // One unbounded inlet per source.
        let handle = self.handle();
        let mut inlets = Vec::with_capacity(self.definition.sources.len());
        let mut streams: Vec<Boxed<T>> = Vec::with_capacity(self.definition.sources.len());
        for source in &self.definition.sources {
            trace!(service = %state.name, source = source.name(), "binding source");
            let (inlet, outlet) = mpsc::unbounded_channel::<Frame>();
            inlets.push(inlet);
            streams.push(source.bind(handle.clone(), UnboundedReceiverStream::new(outlet).boxed()));
        }
        let values = abortable(merge(streams), [token.clone()]);

        tokio::spawn(pump(state.name.clone(), frames, inlets, token.clone()));

        state.started.send_replace(true);
        info!(
            service = %state.name,
            generation,
            sources = self.definition.sources.len(),
            "service started"
        );

        let consumer = Arc::clone(state);
        tokio::spawn(async move {
            consumer.prime().await;
            let mut values = values;
            while let Some(value) = values.next().await {
                consumer.accept(value).await;
            }
            if !token.is_cancelled() {
                warn!(service = %consumer.name, generation, "observation ended, waiting for stop");
                token.cancelled().await;
            }
            consumer.dispose(Some(generation));
        });

        let stopper = Arc::clone(state);
        RunningService {
            name: state.name.clone(),
            generation,
            stop: Box::new(move || stopper.dispose(Some(generation))),
        }
    }

    /// Stop whatever run is current.
    pub fn stop(&self) {
        self.state.dispose(None);
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Perform `action` on the active connection.
    ///
    /// Waits for the service to start when no connection is active yet.
    pub async fn invoke(&self, action: A::Action) -> Result<A::Output, CoreError> {
        let connection = match self.connection() {
            Some(connection) => connection,
            None => {
                self.state.wait_started().await;
                self.connection().ok_or_else(|| CoreError::NotStarted {
                    service: self.state.name.clone(),
                    action: A::name(&action).to_owned(),
                })?
            }
        };

        debug!(service = %self.state.name, action = A::name(&action), "invoking action");
        let context = ActionContext {
            state: self.handle(),
            connection,
        };
        self.definition.actions.perform(context, action).await
    }
}

/// Copy every frame from the connection into each source's inlet.
/// Dropping the inlets on exit ends the sources.
async fn pump(
    service: String,
    mut frames: FrameStream,
    inlets: Vec<mpsc::UnboundedSender<Frame>>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                for inlet in &inlets {
                    let _ = inlet.send(frame.clone());
                }
            }
            Some(Err(e)) => {
                warn!(service = %service, error = %e, "frame stream failed");
                break;
            }
            None => break,
        }
    }
    trace!(service = %service, "frame pump finished");
}

// ── Type-erased surface ──────────────────────────────────────────────

/// Object-safe view used by the orchestrator and the CLI.
pub trait ManagedService: Send + Sync {
    fn name(&self) -> &str;

    /// Frames this service consumes from `connection`.
    fn frames(&self, connection: &Connection) -> FrameStream;

    fn start(&self, options: StartOptions) -> RunningService;

    fn stop(&self);

    /// Current value as JSON, without waiting for start.
    fn snapshot(&self) -> BoxFuture<'_, Option<Value>>;

    /// Current and future values as JSON.
    fn watch(&self) -> Boxed<Value>;
}

impl<T: Identity, A: ActionSet<T>> ManagedService for Service<T, A> {
    fn name(&self) -> &str {
        Self::name(self)
    }

    fn frames(&self, connection: &Connection) -> FrameStream {
        Self::frames(self, connection)
    }

    fn start(&self, options: StartOptions) -> RunningService {
        Self::start(self, options)
    }

    fn stop(&self) {
        Self::stop(self);
    }

    fn snapshot(&self) -> BoxFuture<'_, Option<Value>> {
        async move {
            let value = self.peek().await?;
            serde_json::to_value(value).ok()
        }
        .boxed()
    }

    fn watch(&self) -> Boxed<Value> {
        self.subscribe()
            .filter_map(|value| future::ready(serde_json::to_value(&*value).ok()))
            .boxed()
    }
}
