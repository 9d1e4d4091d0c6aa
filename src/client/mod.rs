//! NNTP protocol engine: connection state machine and command pipeline

mod auth;
mod connection;
mod io;
mod pipeline;
mod state;

pub use pipeline::PendingCommand;
pub use state::{Event, Status};

use crate::buffered::{BufferedInput, BufferedOutput};
use crate::commands::{self, Command};
use crate::config::{BufferLimits, ServerConfig};
use crate::error::{ErrorKind, NntpError, Result};
use crate::runloop::EventLoop;
use pipeline::{Pipeline, Role};
use state::AuthState;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::debug;

/// Byte stream the engine runs over: plain TCP, TLS, or anything in memory
pub trait Transport: AsyncRead + AsyncWrite + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + 'static> Transport for T {}

/// Type-erased transport
pub type BoxedTransport = Box<dyn Transport>;

/// Identifies one connection of an engine in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id
    pub fn from_raw(id: u64) -> Self {
        ConnectionId(id)
    }

    /// The raw id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Receiver of lifecycle [`Event`]s
///
/// Called synchronously on the loop thread, in transition order, never
/// re-entrantly. The engine is free to use from the callback; events raised
/// by calls made inside it are delivered after it returns.
///
/// Closures taking `(&Nntp, Event)` implement this trait. A delegate should
/// use the `&Nntp` it is handed rather than capture a clone of the engine,
/// which would keep the engine alive through a reference cycle.
pub trait Delegate {
    /// Handle one event
    fn handle_event(&self, nntp: &Nntp, event: Event);
}

impl<F: Fn(&Nntp, Event)> Delegate for F {
    fn handle_event(&self, nntp: &Nntp, event: Event) {
        self(nntp, event)
    }
}

/// Asynchronous NNTP client engine
///
/// Runs on an [`EventLoop`]: calls return immediately and progress happens
/// while the loop is driven, either by tasks awaiting [`PendingCommand`]s or
/// by a caller blocking in [`EventLoop::run_until`]. Cloning yields another
/// handle to the same engine.
///
/// # Example
///
/// ```no_run
/// use nntp_engine::{EventLoop, Nntp, Status};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_loop = EventLoop::new()?;
/// let nntp = Nntp::new(&event_loop);
///
/// nntp.connect("news.example.com", 563, true)?;
/// event_loop.run_until_timeout(Duration::from_secs(30), || nntp.status() != Status::Connecting);
///
/// if nntp.status() == Status::NeedAuth {
///     nntp.authenticate("user", "pass")?;
///     event_loop.run_until_timeout(Duration::from_secs(30), || nntp.status() != Status::NeedAuth);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Nntp {
    shared: Rc<Shared>,
}

struct Shared {
    engine: RefCell<Engine>,
    delegate: RefCell<Option<Rc<dyn Delegate>>>,
    dispatching: Cell<bool>,
    event_loop: EventLoop,
}

/// Connection state owned by one [`Nntp`]
struct Engine {
    id: ConnectionId,
    status: Status,
    limits: BufferLimits,
    input: Option<BufferedInput<ReadHalf<BoxedTransport>>>,
    output: Option<BufferedOutput<WriteHalf<BoxedTransport>>>,
    pipeline: Pipeline,
    /// Multi-line reply whose body is being received
    body: Option<crate::response::Reply>,
    greeting: Option<u16>,
    auth: AuthState,
    events: VecDeque<Event>,
    last_error: Option<NntpError>,
    /// Waker of the task driving the current transport
    driver: Option<Waker>,
    /// Bumped whenever a transport is attached or released; stale drivers stop
    generation: u64,
}

impl Nntp {
    /// Create a disconnected engine on `event_loop` with default buffer limits
    pub fn new(event_loop: &EventLoop) -> Self {
        Self::build(event_loop, BufferLimits::default())
    }

    /// Create a disconnected engine with custom buffer limits
    ///
    /// # Errors
    ///
    /// [`NntpError::InvalidData`] if the limits are unusable.
    pub fn with_limits(event_loop: &EventLoop, limits: BufferLimits) -> Result<Self> {
        limits.validate()?;
        Ok(Self::build(event_loop, limits))
    }

    fn build(event_loop: &EventLoop, limits: BufferLimits) -> Self {
        Self {
            shared: Rc::new(Shared {
                engine: RefCell::new(Engine::new(limits)),
                delegate: RefCell::new(None),
                dispatching: Cell::new(false),
                event_loop: event_loop.clone(),
            }),
        }
    }

    /// Install the event receiver, replacing any previous one
    pub fn set_delegate(&self, delegate: impl Delegate + 'static) {
        *self.shared.delegate.borrow_mut() = Some(Rc::new(delegate));
    }

    /// Remove the event receiver
    pub fn clear_delegate(&self) {
        self.shared.delegate.borrow_mut().take();
    }

    /// The loop this engine runs on
    pub fn event_loop(&self) -> &EventLoop {
        &self.shared.event_loop
    }

    /// Current connection status
    pub fn status(&self) -> Status {
        self.shared.engine.borrow().status
    }

    /// Error behind the latest `Error` or `AuthenticationFailed` event (or server disconnect)
    pub fn last_error(&self) -> Option<NntpError> {
        self.shared.engine.borrow().last_error.clone()
    }

    /// Whether AUTHINFO succeeded on the current connection
    pub fn is_authenticated(&self) -> bool {
        self.shared.engine.borrow().auth == AuthState::Authenticated
    }

    /// Id of the current (or latest) connection
    pub fn connection_id(&self) -> ConnectionId {
        self.shared.engine.borrow().id
    }

    /// Commands sent or queued and not yet completed
    pub fn pending_count(&self) -> usize {
        let engine = self.shared.engine.borrow();
        engine.pipeline.in_flight() + engine.pipeline.backlogged()
    }

    /// Start connecting to `host:port`, over TLS when `tls` is set
    ///
    /// Returns immediately; completion is signaled by the `Connected` or
    /// `Error` event.
    ///
    /// # Errors
    ///
    /// [`NntpError::Protocol`] if a connection is already open or opening.
    pub fn connect(&self, host: &str, port: u16, tls: bool) -> Result<()> {
        let limits = self.shared.engine.borrow().limits;
        self.connect_with_config(ServerConfig::new(host, port, tls).with_limits(limits))
    }

    /// Start connecting with host, port, TLS mode and buffer limits from `config`
    ///
    /// # Errors
    ///
    /// [`NntpError::InvalidData`] for unusable limits, [`NntpError::Protocol`]
    /// if a connection is already open or opening.
    pub fn connect_with_config(&self, config: ServerConfig) -> Result<()> {
        config.limits.validate()?;
        let generation = {
            let mut engine = self.shared.engine.borrow_mut();
            engine.limits = config.limits;
            engine.begin_connect()?
        };
        debug!(
            "Connecting to NNTP server {}:{} (tls: {})",
            config.host, config.port, config.tls
        );

        let shared = Rc::downgrade(&self.shared);
        self.shared.event_loop.spawn(async move {
            let opened = connection::open(&config).await;
            let Some(strong) = shared.upgrade() else {
                return;
            };
            let nntp = Nntp { shared: strong };
            let attached = {
                let mut engine = nntp.shared.engine.borrow_mut();
                if engine.generation != generation {
                    debug!("Connection to {}:{} superseded, dropping it", config.host, config.port);
                    false
                } else {
                    match opened {
                        Ok(transport) => {
                            engine.attach(transport);
                            true
                        }
                        Err(err) => {
                            engine.fail(err, Status::Error, Event::Error);
                            false
                        }
                    }
                }
            };
            nntp.dispatch_events();
            nntp.shared.event_loop.notify_progress();
            drop(nntp);

            if attached {
                io::drive(shared, generation).await;
            }
        });
        Ok(())
    }

    /// Attach an already established transport and wait for the greeting
    ///
    /// TLS, proxies and test doubles are set up by the caller; the engine only
    /// needs a full-duplex byte stream.
    ///
    /// # Errors
    ///
    /// [`NntpError::Protocol`] if a connection is already open or opening.
    pub fn connect_transport(&self, transport: impl Transport) -> Result<()> {
        let generation = {
            let mut engine = self.shared.engine.borrow_mut();
            let generation = engine.begin_connect()?;
            engine.attach(Box::new(transport));
            generation
        };
        self.shared
            .event_loop
            .spawn(io::drive(Rc::downgrade(&self.shared), generation));
        Ok(())
    }

    /// Send a command through the pipeline
    ///
    /// The line is written as soon as the connection allows it and the output
    /// buffer has room; until the greeting arrives it waits in the backlog.
    ///
    /// # Errors
    ///
    /// [`NntpError::Temporary`] when not connected, [`NntpError::InvalidData`]
    /// when the command can never fit the output buffer.
    pub fn send(&self, command: Command) -> Result<PendingCommand> {
        self.shared.engine.borrow_mut().submit(command, Role::Plain)
    }

    /// Send QUIT; a 205 reply closes the connection and emits `Disconnected`
    pub fn quit(&self) -> Result<PendingCommand> {
        self.shared
            .engine
            .borrow_mut()
            .submit(commands::quit(), Role::Quit)
    }

    /// Close the connection now
    ///
    /// Pending writes are flushed best-effort, the transport is released,
    /// every unfinished command fails with `Aborted`, and `Disconnected` is
    /// emitted. Does nothing when already disconnected.
    pub fn close(&self) {
        self.shared.engine.borrow_mut().close();
        self.dispatch_events();
        self.shared.event_loop.notify_progress();
    }

    /// Deliver queued events to the delegate
    ///
    /// Events raised while a callback runs are appended to the queue and
    /// delivered by the outer call, so the delegate never nests.
    fn dispatch_events(&self) {
        if self.shared.dispatching.replace(true) {
            return;
        }
        loop {
            let event = self.shared.engine.borrow_mut().events.pop_front();
            let Some(event) = event else {
                break;
            };
            let delegate = self.shared.delegate.borrow().clone();
            if let Some(delegate) = delegate {
                delegate.handle_event(self, event);
            }
        }
        self.shared.dispatching.set(false);
    }
}

impl fmt::Debug for Nntp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = self.shared.engine.borrow();
        f.debug_struct("Nntp")
            .field("connection", &engine.id)
            .field("status", &engine.status)
            .field("in_flight", &engine.pipeline.in_flight())
            .field("backlogged", &engine.pipeline.backlogged())
            .finish_non_exhaustive()
    }
}

impl Engine {
    fn new(limits: BufferLimits) -> Self {
        Self {
            id: ConnectionId::next(),
            status: Status::Disconnected,
            limits,
            input: None,
            output: None,
            pipeline: Pipeline::new(),
            body: None,
            greeting: None,
            auth: AuthState::Idle,
            events: VecDeque::new(),
            last_error: None,
            driver: None,
            generation: 0,
        }
    }

    /// Enter `Connecting` for a fresh connection; returns its generation
    fn begin_connect(&mut self) -> Result<u64> {
        if !self.status.can_connect() {
            return Err(NntpError::protocol(format!(
                "cannot connect while {}",
                self.status
            ))
            .with_connection(self.id));
        }
        self.release();
        self.id = ConnectionId::next();
        self.status = Status::Connecting;
        self.greeting = None;
        self.auth = AuthState::Idle;
        self.last_error = None;
        Ok(self.generation)
    }

    fn attach(&mut self, transport: BoxedTransport) {
        let (reader, writer) = tokio::io::split(transport);
        self.input = Some(BufferedInput::wrap(reader, self.limits.input));
        self.output = Some(BufferedOutput::wrap(writer, self.limits.output));
        debug!("[{}] Transport attached, waiting for greeting", self.id);
    }

    /// Drop the transport and stop its driver
    fn release(&mut self) {
        self.input = None;
        self.output = None;
        self.body = None;
        self.generation += 1;
        if let Some(driver) = self.driver.take() {
            driver.wake();
        }
    }

    fn wake_driver(&self) {
        if let Some(driver) = &self.driver {
            driver.wake_by_ref();
        }
    }

    /// Check a command may be queued on this connection
    fn check_submit(&self, command: &Command) -> Result<()> {
        if !self.status.accepts_commands() {
            return Err(NntpError::temporary(format!("not connected ({})", self.status))
                .with_connection(self.id)
                .with_command(command.masked()));
        }
        if command.wire_len() > self.limits.output {
            return Err(NntpError::invalid_data(format!(
                "command of {} bytes exceeds the {} byte output buffer",
                command.wire_len(),
                self.limits.output
            ))
            .with_connection(self.id)
            .with_command(command.masked()));
        }
        Ok(())
    }

    fn submit(&mut self, command: Command, role: Role) -> Result<PendingCommand> {
        self.check_submit(&command)?;
        let pending = self.pipeline.enqueue(command, role);
        self.wake_driver();
        Ok(pending)
    }

    /// Tear the connection down after a failure
    ///
    /// Framing and authentication failures abort the queued commands; transport
    /// failures hand them the transport error itself.
    fn fail(&mut self, err: NntpError, status: Status, event: Event) {
        let err = err.with_connection(self.id);
        debug!("[{}] Connection failed ({:?}): {}", self.id, event, err);

        self.release();
        let for_commands = match err.kind() {
            ErrorKind::Temporary | ErrorKind::Permanent => err.clone(),
            _ => NntpError::aborted(format!("connection failed: {err}")).with_connection(self.id),
        };
        self.pipeline.abort_all(&for_commands);
        if self.auth == AuthState::InProgress {
            self.auth = AuthState::Idle;
        }

        self.status = status;
        self.last_error = Some(err);
        self.events.push_back(event);
    }

    /// Close on request (caller or QUIT)
    fn close(&mut self) {
        if self.status == Status::Disconnected && self.pipeline.is_empty() {
            return;
        }
        debug!("[{}] Closing connection", self.id);

        if let Some(output) = self.output.as_mut() {
            let mut cx = Context::from_waker(Waker::noop());
            if !output.is_empty() {
                let _ = output.poll_flush_ready(&mut cx);
            }
            let _ = output.poll_shutdown(&mut cx);
        }
        self.release();

        let aborted = NntpError::aborted("connection closed").with_connection(self.id);
        self.pipeline.abort_all(&aborted);
        if self.auth == AuthState::InProgress {
            self.auth = AuthState::Idle;
        }
        self.status = Status::Disconnected;
        self.events.push_back(Event::Disconnected);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let aborted = NntpError::aborted("engine dropped").with_connection(self.id);
        let count = self.pipeline.abort_all(&aborted);
        if count > 0 {
            debug!("[{}] Engine dropped with {} unfinished commands", self.id, count);
        }
    }
}
