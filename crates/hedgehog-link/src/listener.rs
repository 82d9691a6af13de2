//! Background peer listener.
//!
//! The device never talks back. Any inbound byte, an orderly close, or a
//! read error therefore all mean the same thing: the remote end has ended
//! the session. The listener waits for exactly one of those, then drives
//! the session down the normal disconnect path with `by_user = false`.

use std::sync::Weak;

use tokio::{io::AsyncReadExt, net::tcp::OwnedReadHalf, sync::watch};

use crate::{
    error::SessionError,
    session::{Inner, Session, SessionState},
};

pub(crate) async fn watch_peer(
    mut read_half: OwnedReadHalf,
    session: Weak<Inner>,
    mut state_rx: watch::Receiver<SessionState>,
) {
    let mut buf = [0u8; 1];
    let detail = tokio::select! {
        res = read_half.read(&mut buf) => match res {
            Ok(0) => "Server shut down connection!".to_string(),
            Ok(_) => format!("Server sent unexpected data (0x{:02x})", buf[0]),
            Err(e) => format!("Connection lost: {e}"),
        },
        // The session was closed from our side; nothing left to watch.
        () = closed_locally(&mut state_rx) => return,
    };

    tracing::debug!("peer listener fired: {detail}");
    drop(read_half);

    let reason = SessionError::PeerClosed(detail).to_string();
    if let Some(inner) = session.upgrade() {
        Session::from_inner(inner).close(false, reason).await;
    }
}

async fn closed_locally(state_rx: &mut watch::Receiver<SessionState>) {
    // An error means the session itself is gone, which counts too.
    let _ = state_rx
        .wait_for(|s| *s == SessionState::Disconnected)
        .await;
}
