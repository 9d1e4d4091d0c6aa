//! Basic NNTP engine example: delegate events and awaited replies
//!
//! Run with: cargo run --example basic

use nntp_engine::{commands, Command, Event, EventLoop, Nntp, NntpError, ServerConfig, Status};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let host = std::env::var("NNTP_HOST").unwrap_or_else(|_| "news.example.com".to_string());
    let port = std::env::var("NNTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(563);
    let username = std::env::var("NNTP_USER").unwrap_or_else(|_| "user".to_string());
    let password = std::env::var("NNTP_PASS").unwrap_or_else(|_| "pass".to_string());

    let event_loop = EventLoop::new()?;
    let nntp = Nntp::new(&event_loop);

    // The delegate runs on the loop; it may call back into the engine
    nntp.set_delegate(move |nntp: &Nntp, event: Event| {
        println!("event: {event:?} (status {})", nntp.status());
        if event == Event::Connected && nntp.status() == Status::NeedAuth {
            if let Err(err) = nntp.authenticate(&username, &password) {
                eprintln!("cannot authenticate: {err}");
            }
        }
    });

    println!("Connecting to {host}:{port}...");
    nntp.connect_with_config(ServerConfig::new(host, port, port == 563))?;

    // Commands sent before the login would be answered with 480
    event_loop.run_until_timeout(Duration::from_secs(30), || {
        matches!(nntp.status(), Status::Ready | Status::ReadOnly | Status::Error)
    });

    let outcome = event_loop.block_on(async {
        let date = nntp.send(commands::date())?;
        let help = nntp.send(commands::help())?;
        let group = nntp.send(Command::new("GROUP alt.test")?.expecting(&[211]))?;

        println!("Server date: {}", date.await?.message);
        println!("HELP: {} lines", help.await?.lines.len());
        match group.await {
            Ok(reply) => println!("GROUP: {}", reply.message),
            Err(err) => println!("GROUP failed ({:?}): {err}", err.kind()),
        }

        nntp.quit()?.await?;
        Ok::<_, NntpError>(())
    })?;

    if let Err(err) = outcome {
        eprintln!("session failed: {err}");
        if let Some(last) = nntp.last_error() {
            eprintln!("connection error: {last}");
        }
    }

    // Let the last events reach the delegate
    event_loop.run_until_timeout(Duration::from_millis(100), || {
        nntp.status() == Status::Disconnected
    });
    Ok(())
}
