//! Blocking-style session: pump the loop until each step completes
//!
//! Run with: cargo run --example blocking

use nntp_engine::{commands, EventLoop, Nntp, Status};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("NNTP_HOST").unwrap_or_else(|_| "news.example.com".to_string());
    let port = std::env::var("NNTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(119);

    let event_loop = EventLoop::new()?;
    let nntp = Nntp::new(&event_loop);

    nntp.connect(&host, port, port == 563)?;
    if !event_loop.run_until_timeout(TIMEOUT, || nntp.status() != Status::Connecting) {
        return Err("no greeting within 30 seconds".into());
    }
    println!("Greeted: {}", nntp.status());

    if nntp.status() == Status::NeedAuth {
        let username = std::env::var("NNTP_USER")?;
        let password = std::env::var("NNTP_PASS")?;
        nntp.authenticate(&username, &password)?;
        event_loop.run_until_timeout(TIMEOUT, || nntp.status() != Status::NeedAuth);
        println!("After login: {}", nntp.status());
    }
    if let Some(err) = nntp.last_error() {
        return Err(err.into());
    }

    // Pipeline three commands, then wait for the last one
    let date = nntp.send(commands::date())?;
    let mode = nntp.send(commands::mode_reader())?;
    let caps = nntp.send(commands::capabilities())?;
    event_loop.run_until_timeout(TIMEOUT, || caps.is_done());

    for (name, pending) in [("DATE", &date), ("MODE READER", &mode), ("CAPABILITIES", &caps)] {
        match pending.take_result() {
            Some(Ok(reply)) => {
                println!("{name}: {}", reply.status_line());
                for line in &reply.lines {
                    println!("    {line}");
                }
            }
            Some(Err(err)) => println!("{name} failed: {err}"),
            None => println!("{name}: no reply yet"),
        }
    }

    let quit = nntp.quit()?;
    event_loop.run_until_timeout(TIMEOUT, || quit.is_done());
    nntp.close();
    println!("Final status: {}", nntp.status());
    Ok(())
}
