//! Live integration tests against a real NNTP server
//!
//! These tests are disabled by default. Enable with:
//! ```
//! cargo test --features live-tests --test live_integration_test
//! ```
//!
//! Required environment variables:
//! - NNTP_HOST: NNTP server hostname
//! - NNTP_PORT: NNTP server port (default: 563)
//! - NNTP_USER: Username
//! - NNTP_PASS: Password

#![cfg(feature = "live-tests")]

use nntp_engine::{commands, Event, EventLoop, Nntp, ServerConfig, Status};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(30);

fn get_test_config() -> ServerConfig {
    let host = std::env::var("NNTP_HOST").expect("NNTP_HOST not set");
    let port = std::env::var("NNTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(563);
    ServerConfig::new(host, port, port == 563)
}

fn credentials() -> (String, String) {
    (
        std::env::var("NNTP_USER").expect("NNTP_USER not set"),
        std::env::var("NNTP_PASS").expect("NNTP_PASS not set"),
    )
}

/// Connect and log in, pumping the loop in blocking style
fn connect(event_loop: &EventLoop) -> Nntp {
    let nntp = Nntp::new(event_loop);
    nntp.connect_with_config(get_test_config()).unwrap();
    assert!(event_loop.run_until_timeout(TIMEOUT, || nntp.status() != Status::Connecting));

    // Providers often greet with 200 and still require credentials
    let (user, pass) = credentials();
    nntp.authenticate(&user, &pass).unwrap();
    assert!(event_loop.run_until_timeout(TIMEOUT, || {
        nntp.is_authenticated() || nntp.status() == Status::Error
    }));
    assert!(
        matches!(nntp.status(), Status::Ready | Status::ReadOnly),
        "status {:?}, error {:?}",
        nntp.status(),
        nntp.last_error()
    );
    nntp
}

#[test]
fn test_live_connect_and_authenticate() {
    let event_loop = EventLoop::new().unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));

    let start = Instant::now();
    let nntp = connect(&event_loop);
    println!("Connected and authenticated in {:?}", start.elapsed());

    let log = events.clone();
    nntp.set_delegate(move |_: &Nntp, event: Event| log.borrow_mut().push(event));

    let quit = nntp.quit().unwrap();
    assert!(event_loop.run_until_timeout(TIMEOUT, || quit.is_done()));
    assert_eq!(nntp.status(), Status::Disconnected);
    assert_eq!(*events.borrow(), vec![Event::Disconnected]);
}

#[test]
fn test_live_pipelined_commands() {
    let event_loop = EventLoop::new().unwrap();
    let nntp = connect(&event_loop);

    let date = nntp.send(commands::date()).unwrap();
    let help = nntp.send(commands::help()).unwrap();
    let caps = nntp.send(commands::capabilities()).unwrap();
    assert!(event_loop.run_until_timeout(TIMEOUT, || caps.is_done()));

    // Replies complete in order, so the earlier commands are done too
    assert!(date.is_done() && help.is_done());
    let date = date.take_result().unwrap().unwrap();
    println!("Server date: {}", date.message);

    let help = help.take_result().unwrap().unwrap();
    assert!(!help.lines.is_empty());

    let caps = caps.take_result().unwrap().unwrap();
    println!("Capabilities: {:?}", caps.lines);
    assert!(caps.lines.iter().any(|line| line.starts_with("VERSION")));

    nntp.close();
}

#[test]
fn test_live_async_style() {
    let event_loop = EventLoop::new().unwrap();
    let nntp = connect(&event_loop);

    let reply = event_loop
        .block_on(async { nntp.send(commands::date())?.await })
        .unwrap()
        .unwrap();
    assert_eq!(reply.code, 111);
    assert_eq!(reply.message.len(), 14, "yyyymmddhhmmss: {}", reply.message);

    let reply = event_loop
        .block_on(async { nntp.quit()?.await })
        .unwrap()
        .unwrap();
    assert_eq!(reply.code, 205);
}

#[test]
fn test_live_bad_password() {
    let event_loop = EventLoop::new().unwrap();
    let nntp = Nntp::new(&event_loop);
    nntp.connect_with_config(get_test_config()).unwrap();
    assert!(event_loop.run_until_timeout(TIMEOUT, || nntp.status() != Status::Connecting));

    let (user, _) = credentials();
    nntp.authenticate(&user, "definitely-not-the-password").unwrap();
    assert!(event_loop.run_until_timeout(TIMEOUT, || nntp.status() == Status::Error));
    assert_eq!(
        nntp.last_error().unwrap().kind(),
        nntp_engine::ErrorKind::AuthFailed
    );
}
