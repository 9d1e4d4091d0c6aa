//! RFC 4643 AUTHINFO USER/PASS against a scripted server

mod common;

use common::Harness;
use nntp_engine::{commands, ErrorKind, Event, Status};

#[test]
fn test_auth_accepted() {
    let h = Harness::greeted("480 auth required\r\n", Status::NeedAuth);

    h.nntp.authenticate("bob", "secret").unwrap();
    // Both steps are pipelined before any reply
    assert_eq!(
        h.wait_lines(2),
        vec!["AUTHINFO USER bob", "AUTHINFO PASS secret"]
    );
    assert_eq!(h.nntp.status(), Status::NeedAuth);

    h.server.write("381 password required\r\n281 auth accepted\r\n");
    assert!(h.wait(|| h.nntp.status() == Status::Ready));

    assert!(h.nntp.is_authenticated());
    assert_eq!(h.events(), vec![Event::Connected, Event::Authenticated]);
    assert_eq!(h.nntp.pending_count(), 0);
}

#[test]
fn test_auth_rejected() {
    let h = Harness::greeted("480 auth required\r\n", Status::NeedAuth);

    h.nntp.authenticate("bob", "secret").unwrap();
    h.wait_lines(2);
    h.server.write("381 password required\r\n481 auth rejected\r\n");
    assert!(h.wait(|| h.nntp.status() == Status::Error));

    assert!(!h.nntp.is_authenticated());
    assert_eq!(h.events(), vec![Event::Connected, Event::AuthenticationFailed]);

    let err = h.nntp.last_error().unwrap();
    assert_eq!(err.kind(), ErrorKind::AuthFailed);
    assert_eq!(err.context().reply_code, Some(481));
    assert_eq!(err.context().reply_message.as_deref(), Some("auth rejected"));
    assert_eq!(err.context().command.as_deref(), Some("AUTHINFO PASS ****"));
}

#[test]
fn test_user_rejected_aborts_pass() {
    let h = Harness::greeted("480 auth required\r\n", Status::NeedAuth);
    let after = {
        h.nntp.authenticate("bob", "secret").unwrap();
        h.nntp.send(commands::date()).unwrap()
    };
    h.wait_lines(3);

    h.server.write("481 unknown user\r\n");
    assert!(h.wait(|| h.nntp.status() == Status::Error));

    assert_eq!(h.events(), vec![Event::Connected, Event::AuthenticationFailed]);
    let err = h.nntp.last_error().unwrap();
    assert_eq!(err.kind(), ErrorKind::AuthFailed);
    assert_eq!(err.context().command.as_deref(), Some("AUTHINFO USER bob"));

    // Commands queued behind the exchange never see a reply
    let err = after.take_result().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Aborted);
}

#[test]
fn test_user_accepted_without_password() {
    let h = Harness::greeted("480 auth required\r\n", Status::NeedAuth);

    h.nntp.authenticate("bob", "secret").unwrap();
    h.wait_lines(2);
    h.server.write("281 no password needed\r\n");
    assert!(h.wait(|| h.nntp.status() == Status::Ready));
    assert_eq!(h.events(), vec![Event::Connected, Event::Authenticated]);

    // The pipelined PASS still gets its own reply, without touching the state
    h.server.write("482 authentication commands issued out of sequence\r\n");
    assert!(h.wait(|| h.nntp.pending_count() == 0));
    assert_eq!(h.nntp.status(), Status::Ready);
    assert_eq!(h.events(), vec![Event::Connected, Event::Authenticated]);
}

#[test]
fn test_auth_after_read_only_greeting() {
    let h = Harness::greeted("201 no posting\r\n", Status::ReadOnly);

    h.nntp.authenticate("bob", "secret").unwrap();
    h.wait_lines(2);
    h.server.write("381 more\r\n281 ok\r\n");
    assert!(h.wait(|| h.nntp.is_authenticated()));
    assert_eq!(h.nntp.status(), Status::ReadOnly);
}

#[test]
fn test_auth_queued_before_greeting() {
    let h = Harness::new();
    h.nntp.authenticate("bob", "secret").unwrap();

    h.server.write("480 auth required\r\n");
    assert_eq!(
        h.wait_lines(2),
        vec!["AUTHINFO USER bob", "AUTHINFO PASS secret"]
    );
    h.server.write("381 more\r\n281 ok\r\n");
    assert!(h.wait(|| h.nntp.status() == Status::Ready));
    assert_eq!(h.events(), vec![Event::Connected, Event::Authenticated]);
}

#[test]
fn test_auth_twice_is_refused() {
    let h = Harness::greeted("480 auth required\r\n", Status::NeedAuth);

    h.nntp.authenticate("bob", "secret").unwrap();
    let err = h.nntp.authenticate("bob", "secret").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);

    h.wait_lines(2);
    h.server.write("381 more\r\n281 ok\r\n");
    assert!(h.wait(|| h.nntp.is_authenticated()));

    let err = h.nntp.authenticate("bob", "secret").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn test_credentials_with_line_breaks_are_refused() {
    let h = Harness::greeted("480 auth required\r\n", Status::NeedAuth);

    let err = h.nntp.authenticate("bob", "sec\r\nQUIT").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert_eq!(h.nntp.pending_count(), 0);
    assert_eq!(h.nntp.status(), Status::NeedAuth);
}
