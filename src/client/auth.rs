//! NNTP authentication support (AUTHINFO USER/PASS)

use super::pipeline::{Entry, Role};
use super::state::{authenticated_status, AuthState, Event, Status};
use super::{Engine, Nntp};
use crate::commands;
use crate::error::{ErrorKind, NntpError, Result};
use crate::response::{codes, Reply};
use tracing::debug;

impl Nntp {
    /// Authenticate with username and password (AUTHINFO USER/PASS)
    ///
    /// Pipelines AUTHINFO USER and AUTHINFO PASS and returns immediately. The
    /// outcome arrives as an event: `Authenticated` (status becomes `Ready`, or
    /// `ReadOnly` after a 201 greeting) or `AuthenticationFailed` (status
    /// becomes `Error`). May be called while the greeting is still pending.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use nntp_engine::{Event, EventLoop, Nntp};
    /// # use std::time::Duration;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let event_loop = EventLoop::new()?;
    /// let nntp = Nntp::new(&event_loop);
    /// nntp.set_delegate(|_: &Nntp, event: Event| println!("{event:?}"));
    ///
    /// nntp.connect("news.example.com", 563, true)?;
    /// nntp.authenticate("user", "pass")?;
    /// event_loop.run_until_timeout(Duration::from_secs(30), || nntp.is_authenticated());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error without sending anything if:
    /// - [`NntpError::Temporary`] - Not connected
    /// - [`NntpError::Protocol`] - Already authenticated, or an exchange is running
    /// - [`NntpError::InvalidData`] - The login or password contains CR or LF
    pub fn authenticate(&self, login: &str, password: &str) -> Result<()> {
        let user = commands::authinfo_user(login)?;
        let pass = commands::authinfo_pass(password)?;

        let mut engine = self.shared.engine.borrow_mut();
        match engine.auth {
            AuthState::Authenticated => {
                return Err(NntpError::protocol("already authenticated").with_connection(engine.id));
            }
            AuthState::InProgress => {
                return Err(
                    NntpError::protocol("authentication already in progress")
                        .with_connection(engine.id),
                );
            }
            AuthState::Idle => {}
        }
        engine.check_submit(&user)?;
        engine.check_submit(&pass)?;

        debug!("[{}] Authenticating as {}", engine.id, login);
        let _user = engine.submit(user, Role::AuthUser)?;
        let _pass = engine.submit(pass, Role::AuthPass)?;
        engine.auth = AuthState::InProgress;
        Ok(())
    }
}

impl Engine {
    /// Handle the reply to AUTHINFO USER or AUTHINFO PASS
    ///
    /// 281 to either step concludes the exchange; 381 to USER waits for the
    /// PASS reply; anything else fails it. A reply arriving after the exchange
    /// concluded (PASS after USER got 281) only settles its command.
    pub(super) fn on_auth_reply(&mut self, entry: Entry, reply: Reply) {
        if self.auth != AuthState::InProgress {
            self.settle(entry, reply);
            return;
        }

        match (entry.role, reply.code) {
            (_, codes::AUTH_ACCEPTED) => {
                entry.resolve(Ok(reply));
                self.auth = AuthState::Authenticated;
                self.status = authenticated_status(self.greeting);
                debug!("[{}] Authentication successful ({})", self.id, self.status);
                self.events.push_back(Event::Authenticated);
            }
            (Role::AuthUser, codes::AUTH_CONTINUE) => {
                entry.resolve(Ok(reply));
            }
            _ => {
                let err = NntpError::from_reply(ErrorKind::AuthFailed, &reply)
                    .with_connection(self.id)
                    .with_command(entry.command.masked());
                debug!("[{}] Authentication failed: {}", self.id, reply.status_line());
                entry.resolve(Err(err.clone()));
                self.fail(err, Status::Error, Event::AuthenticationFailed);
            }
        }
    }
}
