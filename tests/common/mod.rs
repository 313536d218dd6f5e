//! An in-memory duplex byte pipe, so a full handshake can be exercised
//! without a real socket.

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    io::{AsyncRead, AsyncWrite},
    Stream,
};

/// One direction of an in-memory duplex pipe.
pub struct DuplexHalf {
    tx: Option<UnboundedSender<Vec<u8>>>,
    rx: UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

/// Build a pair of connected, in-process duplex pipes.
pub fn duplex() -> (DuplexHalf, DuplexHalf) {
    let (a_tx, a_rx) = mpsc::unbounded();
    let (b_tx, b_rx) = mpsc::unbounded();

    (
        DuplexHalf {
            tx: Some(a_tx),
            rx: b_rx,
            pending: VecDeque::new(),
        },
        DuplexHalf {
            tx: Some(b_tx),
            rx: a_rx,
            pending: VecDeque::new(),
        },
    )
}

impl AsyncRead for DuplexHalf {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        loop {
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.len());
                for (slot, byte) in buf[..n].iter_mut().zip(self.pending.drain(..n)) {
                    *slot = byte;
                }

                return Poll::Ready(Ok(n));
            }

            match Pin::new(&mut self.rx).poll_next(cx) {
                Poll::Ready(Some(chunk)) => self.pending.extend(chunk),
                Poll::Ready(None) => return Poll::Ready(Ok(0)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for DuplexHalf {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.tx.as_ref() {
            Some(tx) => match tx.unbounded_send(buf.to_vec()) {
                Ok(()) => Poll::Ready(Ok(buf.len())),
                Err(_) => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))),
            },
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.take();
        Poll::Ready(Ok(()))
    }
}

/// Wraps a pipe so its writes can be made to hang on demand, for exercising
/// the `disconnect` grace period without a real stalled peer.
pub struct BlockableWrite<IO> {
    inner: IO,
    blocked: Arc<AtomicBool>,
}

impl<IO> BlockableWrite<IO> {
    /// Wrap `inner`; the returned flag starts clear (writes pass through)
    /// and can be set at any point to make every later write hang.
    pub fn new(inner: IO) -> (Self, Arc<AtomicBool>) {
        let blocked = Arc::new(AtomicBool::new(false));
        (Self { inner, blocked: blocked.clone() }, blocked)
    }
}

impl<IO: AsyncRead + Unpin> AsyncRead for BlockableWrite<IO> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<IO: AsyncWrite + Unpin> AsyncWrite for BlockableWrite<IO> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.blocked.load(Ordering::Relaxed) {
            return Poll::Pending;
        }

        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

/// A server-[`ssh_session::Side`] with a freshly generated Ed25519 host key.
pub fn test_server() -> ssh_session::Server {
    ssh_session::Server {
        keys: vec![ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)
            .expect("key generation")],
        ..Default::default()
    }
}
