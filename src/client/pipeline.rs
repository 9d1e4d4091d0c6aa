//! Command pipeline: commands waiting for buffer room and commands awaiting replies
//!
//! Both queues live in one arena. A command starts in the backlog, moves to
//! the pending queue once its line is in the output buffer, and leaves the
//! pending queue when the reply at its position arrives. Neither queue is
//! ever reordered.

use crate::commands::Command;
use crate::error::{NntpError, Result};
use crate::list::{Arena, DList, NodeId};
use crate::response::Reply;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// How the engine reacts to the reply of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Role {
    /// Caller command, settled against its accepted codes
    Plain,
    /// AUTHINFO USER of an authenticate() exchange
    AuthUser,
    /// AUTHINFO PASS of an authenticate() exchange
    AuthPass,
    /// QUIT; a 205 reply closes the connection
    Quit,
}

/// Shared completion slot between the pipeline and a [`PendingCommand`]
struct Completion {
    command: String,
    done: Cell<bool>,
    outcome: RefCell<Option<Result<Reply>>>,
    waker: RefCell<Option<Waker>>,
}

impl Completion {
    fn resolve(&self, outcome: Result<Reply>) {
        if self.done.replace(true) {
            return;
        }
        *self.outcome.borrow_mut() = Some(outcome);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

/// Handle to a command sent through [`Nntp::send`](super::Nntp::send)
///
/// The outcome is available once [`is_done`](Self::is_done) returns `true`,
/// either by polling with [`take_result`](Self::take_result) (blocking
/// callers pumping the loop) or by awaiting the handle (tasks on the loop).
/// Every command completes: with its reply, with the error its reply maps
/// to, or with [`ErrorKind::Aborted`](crate::ErrorKind::Aborted) when the
/// connection goes away first.
#[must_use = "the reply is only available through the handle"]
pub struct PendingCommand {
    slot: Rc<Completion>,
}

impl PendingCommand {
    /// Whether the command has completed
    pub fn is_done(&self) -> bool {
        self.slot.done.get()
    }

    /// Take the outcome, if the command has completed and it was not taken yet
    pub fn take_result(&self) -> Option<Result<Reply>> {
        self.slot.outcome.borrow_mut().take()
    }

    /// The command line, with passwords masked
    pub fn command(&self) -> &str {
        &self.slot.command
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.slot.command)
            .field("done", &self.slot.done.get())
            .finish()
    }
}

impl Future for PendingCommand {
    type Output = Result<Reply>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.slot.outcome.borrow_mut().take() {
            return Poll::Ready(outcome);
        }
        if self.slot.done.get() {
            return Poll::Ready(Err(NntpError::aborted("result already taken")
                .with_command(self.slot.command.clone())));
        }
        *self.slot.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// A command owned by the pipeline
pub(super) struct Entry {
    pub(super) command: Command,
    pub(super) role: Role,
    slot: Rc<Completion>,
}

impl Entry {
    /// Deliver the outcome to the caller's handle
    pub(super) fn resolve(self, outcome: Result<Reply>) {
        self.slot.resolve(outcome);
    }
}

/// Ordered queues of unsent and in-flight commands
pub(super) struct Pipeline {
    arena: Arena<Entry>,
    backlog: DList,
    pending: DList,
}

impl Pipeline {
    pub(super) fn new() -> Self {
        let mut arena = Arena::new();
        let backlog = arena.new_list();
        let pending = arena.new_list();
        Self {
            arena,
            backlog,
            pending,
        }
    }

    /// Append a command to the backlog
    pub(super) fn enqueue(&mut self, command: Command, role: Role) -> PendingCommand {
        let slot = Rc::new(Completion {
            command: command.masked(),
            done: Cell::new(false),
            outcome: RefCell::new(None),
            waker: RefCell::new(None),
        });
        let id = self.arena.insert(Entry {
            command,
            role,
            slot: slot.clone(),
        });
        self.backlog.push_back(&mut self.arena, id);
        PendingCommand { slot }
    }

    /// Oldest command not yet written
    pub(super) fn next_unsent(&self) -> Option<(NodeId, &Command)> {
        let id = self.backlog.front()?;
        self.arena.get(id).map(|entry| (id, &entry.command))
    }

    /// Move a written command from the backlog to the tail of the pending queue
    pub(super) fn mark_sent(&mut self, id: NodeId) -> bool {
        self.backlog.remove(&mut self.arena, id).is_some()
            && self.pending.push_back(&mut self.arena, id)
    }

    /// The command the next reply belongs to
    pub(super) fn head(&self) -> Option<&Entry> {
        self.pending.front().and_then(|id| self.arena.get(id))
    }

    /// Remove the command the next reply belongs to
    pub(super) fn pop_head(&mut self) -> Option<Entry> {
        let id = self.pending.pop_front(&mut self.arena)?;
        self.arena.remove(id)
    }

    /// Fail every queued command, in send order, with `err`
    pub(super) fn abort_all(&mut self, err: &NntpError) -> usize {
        let mut count = 0;
        for list in [&mut self.pending, &mut self.backlog] {
            while let Some(id) = list.pop_front(&mut self.arena) {
                if let Some(entry) = self.arena.remove(id) {
                    let err = err.clone().with_command(entry.command.masked());
                    entry.resolve(Err(err));
                    count += 1;
                }
            }
        }
        count
    }

    /// Commands awaiting a reply
    pub(super) fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Commands waiting for output buffer room
    pub(super) fn backlogged(&self) -> usize {
        self.backlog.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.backlog.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cmd(line: &str) -> Command {
        Command::new(line).unwrap()
    }

    fn reply(line: &str) -> Reply {
        Reply::parse_status_line(line).unwrap()
    }

    #[test]
    fn test_commands_flow_in_order() {
        let mut pipeline = Pipeline::new();
        let first = pipeline.enqueue(cmd("DATE"), Role::Plain);
        let second = pipeline.enqueue(cmd("HELP"), Role::Plain);
        assert_eq!(pipeline.backlogged(), 2);

        while let Some((id, _)) = pipeline.next_unsent() {
            assert!(pipeline.mark_sent(id));
        }
        assert_eq!(pipeline.backlogged(), 0);
        assert_eq!(pipeline.in_flight(), 2);

        let head = pipeline.pop_head().unwrap();
        assert_eq!(head.command.line(), "DATE");
        head.resolve(Ok(reply("111 20240101000000")));

        assert!(first.is_done());
        assert!(!second.is_done());
        assert_eq!(first.take_result().unwrap().unwrap().code, 111);
        assert!(first.take_result().is_none());
    }

    #[test]
    fn test_unsent_commands_are_not_replied_to() {
        let mut pipeline = Pipeline::new();
        let _pending = pipeline.enqueue(cmd("DATE"), Role::Plain);
        assert!(pipeline.head().is_none());
        assert!(pipeline.pop_head().is_none());
        assert!(!pipeline.is_empty());
    }

    #[test]
    fn test_abort_all() {
        let mut pipeline = Pipeline::new();
        let sent = pipeline.enqueue(cmd("GROUP misc.test"), Role::Plain);
        if let Some((id, _)) = pipeline.next_unsent() {
            pipeline.mark_sent(id);
        }
        let queued = pipeline.enqueue(crate::commands::authinfo_pass("pw").unwrap(), Role::AuthPass);

        let count = pipeline.abort_all(&NntpError::aborted("connection closed"));
        assert_eq!(count, 2);
        assert!(pipeline.is_empty());

        let err = sent.take_result().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Aborted);
        assert_eq!(err.context().command.as_deref(), Some("GROUP misc.test"));

        let err = queued.take_result().unwrap().unwrap_err();
        assert_eq!(err.context().command.as_deref(), Some("AUTHINFO PASS ****"));
        assert_eq!(queued.command(), "AUTHINFO PASS ****");
    }

    #[tokio::test]
    async fn test_await_pending_command() {
        let mut pipeline = Pipeline::new();
        let handle = pipeline.enqueue(cmd("DATE"), Role::Plain);
        if let Some((id, _)) = pipeline.next_unsent() {
            pipeline.mark_sent(id);
        }

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let waiter = tokio::task::spawn_local(handle);
                tokio::task::yield_now().await;
                pipeline.pop_head().unwrap().resolve(Ok(reply("111 20240101000000")));

                let reply = waiter.await.unwrap().unwrap();
                assert_eq!(reply.code, 111);
            })
            .await;
    }
}
