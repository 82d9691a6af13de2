//! The live socket of a connected session.
//!
//! The TCP stream is split once on connect. The write half moves into a
//! writer task fed through an mpsc queue; each queued byte carries its own
//! oneshot completion so the sender that issued it, and only that sender,
//! learns whether it made it onto the wire. The read half moves into the
//! peer listener (see [`crate::listener`]).

use std::io;

use tokio::{
    io::AsyncWriteExt,
    net::tcp::OwnedWriteHalf,
    sync::{mpsc, oneshot},
};

/// Queue depth between senders and the writer task. Sends are serialized by
/// the `Busy` state so at most one request is normally queued.
const WRITE_QUEUE_DEPTH: usize = 4;

pub(crate) struct WriteRequest {
    pub code: u8,
    pub done: oneshot::Sender<io::Result<()>>,
}

/// Owning handle to the writer task. Dropping it closes the queue, which
/// ends the task and drops (and thereby shuts down) the write half.
pub(crate) struct Link {
    write_tx: mpsc::Sender<WriteRequest>,
}

impl Link {
    pub fn spawn(write_half: OwnedWriteHalf) -> Self {
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        tokio::spawn(run_writer(write_half, write_rx));
        Self { write_tx }
    }

    pub fn sender(&self) -> mpsc::Sender<WriteRequest> {
        self.write_tx.clone()
    }
}

#[cfg(test)]
impl Link {
    /// A link whose writer task is already gone.
    pub fn detached() -> Self {
        let (write_tx, _) = mpsc::channel(WRITE_QUEUE_DEPTH);
        Self { write_tx }
    }
}

/// Write one byte and wait for its completion.
pub(crate) async fn write_byte(tx: &mpsc::Sender<WriteRequest>, code: u8) -> io::Result<()> {
    let (done, completion) = oneshot::channel();
    tx.send(WriteRequest { code, done })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "writer task has stopped"))?;
    completion.await.unwrap_or_else(|_| {
        Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "writer task dropped the request",
        ))
    })
}

async fn run_writer(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some(req) = rx.recv().await {
        let res = write_half.write(&[req.code]).await.and_then(|n| match n {
            1 => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "command byte was not written",
            )),
        });
        let failed = res.is_err();
        let _ = req.done.send(res);
        if failed {
            break;
        }
    }
    if let Err(e) = write_half.shutdown().await {
        tracing::trace!("write half shutdown: {e}");
    }
}
