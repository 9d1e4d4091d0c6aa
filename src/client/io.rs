//! Reading replies, writing commands, and the task that drives them
//!
//! The driver task owns no state: each time it is woken it borrows the engine,
//! lets it move backlog into the output buffer, flush, read, and process every
//! complete line, then releases the borrow before dispatching events.

use super::pipeline::{Entry, Role};
use super::state::{greeting_status, Event, Status};
use super::{Engine, Nntp, Shared};
use crate::error::{ErrorKind, NntpError, Result};
use crate::response::{codes, failure_kind, unescape_body_line, Reply};
use std::future::poll_fn;
use std::rc::Weak;
use std::task::{Context, Poll};
use tracing::{debug, trace};

/// Outcome of one driver poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Step {
    /// State changed; dispatch events and poll again
    Progress,
    /// The transport is gone; the driver stops
    Finished,
}

/// Drive the transport attached at `generation` until it is released
pub(super) async fn drive(shared: Weak<Shared>, generation: u64) {
    loop {
        let step = poll_fn(|cx| match shared.upgrade() {
            Some(strong) => match strong.engine.try_borrow_mut() {
                Ok(mut engine) => engine.poll_io(cx, generation),
                Err(_) => {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            },
            None => Poll::Ready(Step::Finished),
        })
        .await;

        let Some(strong) = shared.upgrade() else {
            return;
        };
        let nntp = Nntp { shared: strong };
        nntp.dispatch_events();
        nntp.shared.event_loop.notify_progress();
        drop(nntp);

        if step == Step::Finished {
            return;
        }
    }
}

impl Engine {
    /// Make as much progress as the transport allows without blocking
    pub(super) fn poll_io(&mut self, cx: &mut Context<'_>, generation: u64) -> Poll<Step> {
        if generation != self.generation || self.input.is_none() {
            return Poll::Ready(Step::Finished);
        }
        if !self
            .driver
            .as_ref()
            .is_some_and(|driver| driver.will_wake(cx.waker()))
        {
            self.driver = Some(cx.waker().clone());
        }

        let mut progressed = self.pump_backlog();

        if let Some(output) = self.output.as_mut() {
            if !output.is_empty() {
                if let Poll::Ready(Err(err)) = output.poll_flush_ready(cx) {
                    self.fail_connection(NntpError::from_io(err));
                    return Poll::Ready(Step::Finished);
                }
                // A drained buffer makes room for the backlog
                progressed |= output.is_empty() && self.pipeline.backlogged() > 0;
            }
        }

        let filled = match self.input.as_mut().map(|input| input.poll_fill(cx)) {
            Some(Poll::Ready(Ok(n))) => Some(n),
            Some(Poll::Ready(Err(err))) => {
                // Complete lines ahead of the failure still count
                if let Err(line_err) = self.process_lines() {
                    self.fail_connection(line_err);
                } else if generation == self.generation {
                    self.fail_connection(err);
                }
                return Poll::Ready(Step::Finished);
            }
            Some(Poll::Pending) | None => None,
        };

        if let Err(err) = self.process_lines() {
            self.fail_connection(err);
            return Poll::Ready(Step::Finished);
        }
        if generation != self.generation {
            return Poll::Ready(Step::Finished);
        }

        match filled {
            Some(0) => {
                self.handle_eof();
                Poll::Ready(Step::Finished)
            }
            Some(_) => Poll::Ready(Step::Progress),
            None if progressed => Poll::Ready(Step::Progress),
            None => Poll::Pending,
        }
    }

    /// Move backlogged commands into the output buffer while there is room
    fn pump_backlog(&mut self) -> bool {
        if !self.status.can_send() {
            return false;
        }
        let Some(output) = self.output.as_mut() else {
            return false;
        };

        let mut written = false;
        while let Some((id, command)) = self.pipeline.next_unsent() {
            if !output.has_capacity_available(command.wire_len()) {
                trace!("[{}] Output buffer full, deferring {}", self.id, command);
                break;
            }
            trace!("Sending command: {}", command);
            if output.write(&command.wire()).is_err() {
                break;
            }
            self.pipeline.mark_sent(id);
            written = true;
        }
        written
    }

    /// Handle every complete line in the input buffer
    fn process_lines(&mut self) -> Result<()> {
        let generation = self.generation;
        while generation == self.generation {
            let max_line = self.limits.max_line;
            let Some(input) = self.input.as_mut() else {
                break;
            };
            let Some(line) = input.read_line(max_line)? else {
                break;
            };
            self.handle_line(line)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: String) -> Result<()> {
        trace!("Received: {}", line);

        if let Some(reply) = self.body.as_mut() {
            if line == "." {
                if let Some(reply) = self.body.take() {
                    self.complete(reply)?;
                }
            } else {
                reply.lines.push(unescape_body_line(&line).to_string());
            }
            return Ok(());
        }

        let reply = Reply::parse_status_line(&line)?;

        if self.status == Status::Connecting {
            self.handle_greeting(reply);
            return Ok(());
        }

        let has_body = match self.pipeline.head() {
            Some(entry) => entry.command.has_body(reply.code),
            None => return Err(NntpError::protocol("unsolicited reply").with_reply(&reply)),
        };

        if has_body {
            self.body = Some(reply);
            return Ok(());
        }
        self.complete(reply)
    }

    fn handle_greeting(&mut self, reply: Reply) {
        debug!("[{}] Server greeting: {}", self.id, reply.status_line());
        self.greeting = Some(reply.code);
        self.status = Status::Connected;

        match greeting_status(reply.code) {
            Status::Error => {
                let kind = match failure_kind(reply.code) {
                    ErrorKind::UnsupportedCommand => ErrorKind::Permanent,
                    kind => kind,
                };
                self.fail(NntpError::from_reply(kind, &reply), Status::Error, Event::Error);
            }
            next => {
                self.status = next;
                self.events.push_back(Event::Connected);
            }
        }
    }

    /// Resolve the pipeline head with a complete reply
    fn complete(&mut self, reply: Reply) -> Result<()> {
        let Some(entry) = self.pipeline.pop_head() else {
            return Err(NntpError::protocol("unsolicited reply").with_reply(&reply));
        };

        match entry.role {
            Role::Plain => self.settle(entry, reply),
            Role::AuthUser | Role::AuthPass => self.on_auth_reply(entry, reply),
            Role::Quit => {
                let closing = reply.code == codes::CLOSING_CONNECTION;
                self.settle(entry, reply);
                if closing {
                    debug!("[{}] Server closed the session", self.id);
                    self.close();
                }
            }
        }
        Ok(())
    }

    /// Complete a command with its reply, or with the error the reply maps to
    pub(super) fn settle(&mut self, entry: Entry, reply: Reply) {
        if entry.command.accepts(reply.code) {
            entry.resolve(Ok(reply));
            return;
        }
        let err = NntpError::from_reply(failure_kind(reply.code), &reply)
            .with_connection(self.id)
            .with_command(entry.command.masked());
        trace!("[{}] {} failed: {}", self.id, entry.command, err);
        entry.resolve(Err(err));
    }

    fn handle_eof(&mut self) {
        if self.status == Status::Connecting {
            self.fail(
                NntpError::temporary("connection closed before greeting"),
                Status::Error,
                Event::Error,
            );
            return;
        }
        let err = if self.body.is_some() {
            NntpError::temporary("connection closed by server in the middle of a reply")
        } else {
            NntpError::temporary("connection closed by server")
        };
        self.fail(err, Status::Disconnected, Event::Disconnected);
    }

    /// Transport or framing failure: status `Error`, `Error` event
    fn fail_connection(&mut self, err: NntpError) {
        self.fail(err, Status::Error, Event::Error);
    }
}
