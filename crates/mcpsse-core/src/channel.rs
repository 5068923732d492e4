//! Zero-capacity message channels and the stream pair handed to callers.
//!
//! A send completes only after the receiving side has taken the envelope.
//! Tokio has no zero-capacity `mpsc`, so each envelope travels with a
//! `oneshot` acknowledgement that the receiver fires on take. All halves of a
//! session share one `CancellationToken`; cancelling it closes both channels
//! at once and wakes anything suspended on them.

use crate::cancel::CancellationToken;
use crate::error::TransportError;
use crate::message::JsonRpcMessage;
use tokio::sync::{mpsc, oneshot};

type Handoff = (JsonRpcMessage, oneshot::Sender<()>);

/// Error returned by `EnvelopeSender::send` once the channel is closed.
///
/// The envelope is dropped and never reaches the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

impl std::fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Channel closed")
    }
}

impl std::error::Error for ChannelClosed {}

impl From<ChannelClosed> for TransportError {
    fn from(_: ChannelClosed) -> Self {
        TransportError::ChannelClosed
    }
}

/// Create a zero-capacity channel whose lifetime is bound to `closed`.
pub fn rendezvous(closed: &CancellationToken) -> (EnvelopeSender, EnvelopeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (
        EnvelopeSender {
            tx,
            closed: closed.clone(),
        },
        EnvelopeReceiver {
            rx,
            closed: closed.clone(),
        },
    )
}

/// Producing half of a rendezvous channel.
#[derive(Debug)]
pub struct EnvelopeSender {
    tx: mpsc::Sender<Handoff>,
    closed: CancellationToken,
}

impl EnvelopeSender {
    /// Hand an envelope to the receiver, waiting until it has been taken.
    pub async fn send(&self, message: JsonRpcMessage) -> Result<(), ChannelClosed> {
        if self.is_closed() {
            return Err(ChannelClosed);
        }

        let handoff = async {
            let permit = self.tx.reserve().await.map_err(|_| ChannelClosed)?;
            let (ack_tx, ack_rx) = oneshot::channel();
            permit.send((message, ack_tx));
            ack_rx.await.map_err(|_| ChannelClosed)
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ChannelClosed),
            result = handoff => result,
        }
    }

    /// Whether the session closed the channel or the receiver was dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

/// Consuming half of a rendezvous channel.
#[derive(Debug)]
pub struct EnvelopeReceiver {
    rx: mpsc::Receiver<Handoff>,
    closed: CancellationToken,
}

impl EnvelopeReceiver {
    /// Take the next envelope. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<JsonRpcMessage> {
        if self.closed.is_cancelled() {
            return None;
        }

        loop {
            let (message, ack) = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return None,
                handoff = self.rx.recv() => handoff?,
            };
            // A dropped ack means the send was abandoned; that envelope was never sent.
            if ack.send(()).is_ok() {
                return Some(message);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// The caller's view of a session: envelopes from the server arrive on
/// `inbound`, envelopes pushed into `outbound` are POSTed to the server.
#[derive(Debug)]
pub struct StreamPair {
    pub inbound: EnvelopeReceiver,
    pub outbound: EnvelopeSender,
}

impl StreamPair {
    pub fn into_parts(self) -> (EnvelopeReceiver, EnvelopeSender) {
        (self.inbound, self.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ping(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::request(id, "ping", None)
    }

    #[tokio::test]
    async fn test_send_waits_for_receiver() {
        let token = CancellationToken::new();
        let (tx, mut rx) = rendezvous(&token);

        let send = tokio::spawn(async move { tx.send(ping(1)).await });

        // Nothing has taken the envelope yet, so the send must still be pending.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send.is_finished());

        assert_eq!(rx.recv().await, Some(ping(1)));
        assert_eq!(send.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_preserves_order() {
        let token = CancellationToken::new();
        let (tx, mut rx) = rendezvous(&token);

        let producer = tokio::spawn(async move {
            for id in 0..5 {
                tx.send(ping(id)).await.unwrap();
            }
        });

        for id in 0..5 {
            assert_eq!(rx.recv().await, Some(ping(id)));
        }
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_send_is_never_delivered() {
        let token = CancellationToken::new();
        let (tx, mut rx) = rendezvous(&token);

        let abandoned = tokio::time::timeout(Duration::from_millis(10), tx.send(ping(1))).await;
        assert!(abandoned.is_err());

        let producer = tokio::spawn(async move { tx.send(ping(2)).await });
        assert_eq!(rx.recv().await, Some(ping(2)));
        assert_eq!(producer.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_recv() {
        let token = CancellationToken::new();
        let (_tx, mut rx) = rendezvous(&token);

        let recv = tokio::spawn(async move {
            let first = rx.recv().await;
            let second = rx.recv().await;
            (first, second)
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let (first, second) = tokio::time::timeout(Duration::from_secs(1), recv)
            .await
            .expect("recv should unblock")
            .unwrap();
        assert_eq!(first, None);
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_send() {
        let token = CancellationToken::new();
        let (tx, _rx) = rendezvous(&token);

        let send = tokio::spawn(async move {
            let first = tx.send(ping(1)).await;
            let second = tx.send(ping(2)).await;
            (first, second)
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let (first, second) = tokio::time::timeout(Duration::from_secs(1), send)
            .await
            .expect("send should unblock")
            .unwrap();
        assert_eq!(first, Err(ChannelClosed));
        assert_eq!(second, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_send() {
        let token = CancellationToken::new();
        let (tx, rx) = rendezvous(&token);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.send(ping(1)).await, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_recv() {
        let token = CancellationToken::new();
        let (tx, mut rx) = rendezvous(&token);
        drop(tx);

        assert_eq!(rx.recv().await, None);
        assert!(!rx.is_closed());
    }
}
