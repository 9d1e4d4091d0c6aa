//! Scripted in-memory NNTP server driven on the engine's own event loop

#![allow(dead_code)]

use nntp_engine::{BufferLimits, Event, EventLoop, Nntp, Status};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

/// How long a test waits for the engine before giving up
pub const TIMEOUT: Duration = Duration::from_secs(5);

enum Action {
    Write(Vec<u8>),
    /// Deliver in pieces of the given size, pausing between them
    Trickle(Vec<u8>, usize),
    HangUp,
}

/// Server side of one connection
pub struct Server {
    received: Rc<RefCell<Vec<u8>>>,
    actions: mpsc::UnboundedSender<Action>,
}

impl Server {
    /// Spawn the server tasks for `stream` on `event_loop`
    pub fn spawn(event_loop: &EventLoop, stream: DuplexStream) -> Self {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let received = Rc::new(RefCell::new(Vec::new()));
        let (actions, mut queue) = mpsc::unbounded_channel();

        let sink = received.clone();
        event_loop.spawn(async move {
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                sink.borrow_mut().extend_from_slice(&buf[..n]);
            }
        });

        event_loop.spawn(async move {
            while let Some(action) = queue.recv().await {
                let result = match action {
                    Action::Write(bytes) => writer.write_all(&bytes).await,
                    Action::Trickle(bytes, size) => {
                        let mut result = Ok(());
                        for piece in bytes.chunks(size.max(1)) {
                            result = writer.write_all(piece).await;
                            if result.is_err() {
                                break;
                            }
                            tokio::time::sleep(Duration::from_millis(1)).await;
                        }
                        result
                    }
                    Action::HangUp => {
                        let _ = writer.shutdown().await;
                        break;
                    }
                };
                if result.is_err() {
                    break;
                }
            }
        });

        Self { received, actions }
    }

    /// Send bytes to the client in one write
    pub fn write(&self, bytes: &str) {
        let _ = self.actions.send(Action::Write(bytes.as_bytes().to_vec()));
    }

    /// Send bytes to the client `size` bytes at a time
    pub fn trickle(&self, bytes: &str, size: usize) {
        let _ = self
            .actions
            .send(Action::Trickle(bytes.as_bytes().to_vec(), size));
    }

    /// Close the server's write direction
    pub fn hang_up(&self) {
        let _ = self.actions.send(Action::HangUp);
    }

    /// Everything the client wrote so far
    pub fn received(&self) -> String {
        String::from_utf8_lossy(&self.received.borrow()).into_owned()
    }

    /// Lines the client wrote so far, without CRLF
    pub fn received_lines(&self) -> Vec<String> {
        self.received()
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }
}

/// Engine plus scripted server plus recorded events
pub struct Harness {
    pub event_loop: EventLoop,
    pub nntp: Nntp,
    pub server: Server,
    events: Rc<RefCell<Vec<Event>>>,
}

impl Harness {
    /// Engine with default limits attached to a fresh server (no greeting yet)
    pub fn new() -> Self {
        Self::with_limits(BufferLimits::default())
    }

    pub fn with_limits(limits: BufferLimits) -> Self {
        init_tracing();
        let event_loop = EventLoop::new().expect("event loop");
        let nntp = Nntp::with_limits(&event_loop, limits).expect("limits");

        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();
        nntp.set_delegate(move |_: &Nntp, event: Event| log.borrow_mut().push(event));

        let server = attach(&event_loop, &nntp);
        Self {
            event_loop,
            nntp,
            server,
            events,
        }
    }

    /// Engine that already received `greeting` and settled on `status`
    pub fn greeted(greeting: &str, status: Status) -> Self {
        let harness = Self::new();
        harness.server.write(greeting);
        assert!(
            harness.wait(|| harness.nntp.status() == status),
            "expected {status:?} after greeting, got {:?}",
            harness.nntp.status()
        );
        harness
    }

    /// Attach a fresh server (the engine must be able to connect)
    pub fn reconnect(&mut self) {
        self.server = attach(&self.event_loop, &self.nntp);
    }

    /// Pump the loop until `predicate` holds, up to [`TIMEOUT`]
    pub fn wait(&self, predicate: impl FnMut() -> bool) -> bool {
        self.event_loop.run_until_timeout(TIMEOUT, predicate)
    }

    /// Pump the loop for `duration` regardless of progress
    pub fn settle(&self, duration: Duration) {
        self.event_loop.run_until_timeout(duration, || false);
    }

    /// Events delivered to the delegate so far
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Wait for the client to have written `count` lines
    pub fn wait_lines(&self, count: usize) -> Vec<String> {
        self.wait(|| self.server.received_lines().len() >= count);
        self.server.received_lines()
    }
}

fn attach(event_loop: &EventLoop, nntp: &Nntp) -> Server {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let server = Server::spawn(event_loop, server);
    nntp.connect_transport(client).expect("connect_transport");
    server
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
