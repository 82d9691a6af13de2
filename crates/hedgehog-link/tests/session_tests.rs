//! Session tests against a fake device.
//!
//! Every test runs on real loopback TCP with port 0. The "device" is a plain
//! `TcpListener`; tests read the bytes the session writes and close or write
//! to the socket to simulate the robot going away.

use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::broadcast,
    time::timeout,
};

use hedgehog_link::{Command, Session, SessionConfig, SessionError, SessionEvent, SessionState};

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn bind_device() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Connect a fresh session and return it with the device's end of the socket.
async fn connected() -> (Session, TcpStream, broadcast::Receiver<SessionEvent>) {
    let (listener, addr) = bind_device().await;
    let session = Session::new(addr, SessionConfig::default());
    let events = session.subscribe_events();
    let (res, accepted) = tokio::join!(session.connect(), listener.accept());
    res.unwrap();
    let (peer, _) = accepted.unwrap();
    (session, peer, events)
}

/// An address nothing listens on.
async fn dead_addr() -> SocketAddr {
    let (listener, addr) = bind_device().await;
    drop(listener);
    addr
}

async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    matcher: F,
    label: &str,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(ev) if matcher(&ev) => return ev,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("{label}: channel error: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timeout waiting for: {label}"))
}

/// Drain whatever is left in the channel and count disconnect notifications.
async fn count_disconnects(rx: &mut broadcast::Receiver<SessionEvent>) -> usize {
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut n = 0;
    while let Ok(ev) = rx.try_recv() {
        if ev.is_disconnect() {
            n += 1;
        }
    }
    n
}

async fn wait_for_state(session: &Session, want: SessionState) {
    let mut rx = session.subscribe_state();
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timeout waiting for state {want}"))
        .unwrap();
}

// ── Connect ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_reaches_connected_and_notifies() {
    let (session, _peer, mut events) = connected().await;
    assert_eq!(session.state(), SessionState::Connected);

    let first = events.recv().await.unwrap();
    assert!(matches!(first, SessionEvent::Connecting { .. }));
    let second = events.recv().await.unwrap();
    assert_eq!(second, SessionEvent::Connected { addr: session.peer_addr() });
}

#[tokio::test]
async fn connect_to_unreachable_address_fails_and_stays_disconnected() {
    let session = Session::new(dead_addr().await, SessionConfig::default());
    let mut events = session.subscribe_events();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectFailure(_)));
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Disconnected);

    wait_for_event(
        &mut events,
        |e| matches!(e, SessionEvent::ConnectFailed { .. }),
        "connect failed",
    )
    .await;
    // No listener was armed, so nothing ever reports a disconnect.
    assert_eq!(count_disconnects(&mut events).await, 0);
}

#[tokio::test]
async fn session_cannot_be_reconnected() {
    let session = Session::new(dead_addr().await, SessionConfig::default());
    assert!(session.connect().await.is_err());
    assert_eq!(session.connect().await.unwrap_err(), SessionError::AlreadyUsed);

    let (session, _peer, _events) = connected().await;
    session.disconnect(true, "done").await;
    assert_eq!(session.connect().await.unwrap_err(), SessionError::AlreadyUsed);
}

#[tokio::test]
async fn connect_timeout_lets_a_prompt_device_through() {
    let (listener, addr) = bind_device().await;
    let config = SessionConfig::default().with_connect_timeout(Some(Duration::from_secs(2)));
    let session = Session::new(addr, config);

    let (res, accepted) = tokio::join!(session.connect(), listener.accept());
    res.unwrap();
    accepted.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
}

// ── Send ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_before_connect_is_not_connected() {
    let (listener, addr) = bind_device().await;
    let session = Session::new(addr, SessionConfig::default());

    assert_eq!(
        session.send_command(Command::Forward).await.unwrap_err(),
        SessionError::NotConnected
    );
    assert_eq!(session.pending_command(), None);

    // Nothing connected, so nothing can have been written.
    let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
    assert!(accepted.is_err());
}

#[tokio::test]
async fn every_command_is_exactly_one_byte_on_the_wire() {
    let (session, mut peer, _events) = connected().await;

    for cmd in Command::ALL {
        session.send_command(cmd).await.unwrap();
        assert_eq!(session.pending_command(), Some(cmd));
    }
    session.disconnect(true, "done").await;

    let mut wire = Vec::new();
    timeout(Duration::from_secs(5), peer.read_to_end(&mut wire))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wire, vec![0, 1, 2, 3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn overlapping_sends_go_out_in_issue_order() {
    let (session, mut peer, _events) = connected().await;

    let started = std::time::Instant::now();
    let (a, b) = tokio::join!(
        session.send_command(Command::Forward),
        session.send_command(Command::Stop),
    );
    a.unwrap();
    b.unwrap();
    assert!(started.elapsed() < Duration::from_millis(3000));
    assert_eq!(session.state(), SessionState::Connected);

    let mut buf = [0u8; 2];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [Command::Forward.code(), Command::Stop.code()]);
}

#[tokio::test]
async fn concurrent_senders_never_overlap() {
    let (session, mut peer, _events) = connected().await;

    let mut tasks = Vec::new();
    for i in 0..16u8 {
        let s = session.clone();
        tasks.push(tokio::spawn(async move {
            s.send_command(Command::try_from(i % 8).unwrap()).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let mut wire = [0u8; 16];
    peer.read_exact(&mut wire).await.unwrap();
    let mut counts = [0usize; 8];
    for b in wire {
        counts[b as usize] += 1;
    }
    assert_eq!(counts, [2; 8]);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn steer_sends_stop_then_movement() {
    let (session, mut peer, _events) = connected().await;

    session.steer(Command::ForwardLeft).await.unwrap();
    session.steer(Command::Stop).await.unwrap();

    let mut buf = [0u8; 3];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0, Command::ForwardLeft.code(), 0]);
}

#[tokio::test]
async fn sent_commands_are_reported() {
    let (session, _peer, mut events) = connected().await;
    session.send_command(Command::Spin).await.unwrap();
    let ev = wait_for_event(
        &mut events,
        |e| matches!(e, SessionEvent::CommandSent { .. }),
        "command sent",
    )
    .await;
    assert_eq!(ev, SessionEvent::CommandSent { command: Command::Spin });
}

// ── Disconnect ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn user_disconnect_closes_socket_and_notifies_once() {
    let (session, mut peer, mut events) = connected().await;

    session.disconnect(true, "Disconnected by user.").await;
    assert_eq!(session.state(), SessionState::Disconnected);

    let ev = wait_for_event(&mut events, SessionEvent::is_disconnect, "disconnect").await;
    assert_eq!(
        ev,
        SessionEvent::Disconnected {
            by_user: true,
            reason: "Disconnected by user.".into()
        }
    );

    // The device sees EOF.
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), peer.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    // A second disconnect is a no-op.
    session.disconnect(true, "again").await;
    assert_eq!(count_disconnects(&mut events).await, 0);
}

#[tokio::test]
async fn peer_close_disconnects_exactly_once() {
    let (session, peer, mut events) = connected().await;
    drop(peer);

    let ev = wait_for_event(&mut events, SessionEvent::is_disconnect, "peer close").await;
    match ev {
        SessionEvent::Disconnected { by_user, .. } => assert!(!by_user),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(count_disconnects(&mut events).await, 0);

    assert_eq!(
        session.send_command(Command::Forward).await.unwrap_err(),
        SessionError::NotConnected
    );
}

#[tokio::test]
async fn inbound_byte_is_treated_as_peer_disconnect() {
    let (session, mut peer, mut events) = connected().await;
    peer.write_all(&[0x42]).await.unwrap();

    let ev = wait_for_event(&mut events, SessionEvent::is_disconnect, "inbound data").await;
    assert!(matches!(ev, SessionEvent::Disconnected { by_user: false, .. }));
    wait_for_state(&session, SessionState::Disconnected).await;
    assert_eq!(count_disconnects(&mut events).await, 0);
}

#[tokio::test]
async fn peer_close_racing_with_sends_yields_one_notification() {
    let (session, peer, mut events) = connected().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let s = session.clone();
        tasks.push(tokio::spawn(async move { s.send_command(Command::Forward).await }));
    }
    drop(peer);

    for t in tasks {
        match t.await.unwrap() {
            Ok(()) | Err(SessionError::NotConnected) | Err(SessionError::LinkFailure(_)) => {}
            Err(e) => panic!("unexpected send result: {e}"),
        }
    }

    wait_for_state(&session, SessionState::Disconnected).await;
    assert_eq!(count_disconnects(&mut events).await, 1);
}

#[tokio::test]
async fn dropping_a_send_future_releases_busy() {
    let (session, _peer, _events) = connected().await;

    // Poll the send once so it claims Busy, then drop it.
    {
        let fut = session.send_command(Command::Forward);
        tokio::pin!(fut);
        let _ = poll_once(fut.as_mut()).await;
    }
    wait_for_state(&session, SessionState::Connected).await;
    session.send_command(Command::Stop).await.unwrap();
}

async fn poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        out = fut => Some(out),
        _ = std::future::ready(()) => None,
    }
}
