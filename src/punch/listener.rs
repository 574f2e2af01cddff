use super::message::{read_peer_reply, PeerInfo, PeerReply};
use crate::error::{Error, Result};
use async_shutdown::ShutdownManager;
use tokio::{
    io::AsyncRead,
    sync::mpsc::{channel, Receiver, Sender},
    task::JoinHandle,
};

/// Receives "peer wants to connect" records pushed by the punch server.
///
/// The background task owns the read half of the session. It ends on EOF,
/// on a malformed record, when every receiver is gone, or on shutdown.
pub struct NotificationListener {
    rx: Receiver<PeerInfo>,
    handle: JoinHandle<Result<()>>,
}

impl NotificationListener {
    pub fn spawn<R>(reader: R, shutdown: ShutdownManager<()>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = channel(16);
        let fut = shutdown.wrap_cancel(Self::listen(reader, tx));
        let handle = tokio::spawn(async move {
            match fut.await {
                Ok(r) => r,
                Err(()) => Err(Error::Shutdown),
            }
        });

        Self { rx, handle }
    }

    /// Next notification, `None` once the listener task has ended.
    pub async fn recv(&mut self) -> Option<PeerInfo> {
        self.rx.recv().await
    }

    /// Waits for the task and returns why it stopped.
    pub async fn join(self) -> Result<()> {
        drop(self.rx);
        match self.handle.await {
            Ok(r) => r,
            Err(e) => Err(Error::protocol(format!("listener task failed: {}", e))),
        }
    }

    async fn listen<R: AsyncRead + Unpin>(mut reader: R, tx: Sender<PeerInfo>) -> Result<()> {
        log::debug!("waiting for notification...");
        loop {
            match read_peer_reply(&mut reader).await {
                Ok(PeerReply::Peer(info)) => {
                    log::debug!(
                        "received connect request from {} at {}:{}",
                        info.id,
                        info.ip,
                        info.port
                    );
                    if tx.send(info).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(PeerReply::Offline) => {
                    log::debug!("skipping offline notice");
                }
                Err(e) => {
                    log::debug!("notification listener stopped: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nat::NatType;
    use crate::punch::message::OFFLINE_SENTINEL;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt};

    fn peer(id: u32) -> PeerInfo {
        let port = 7000 + id as u16;
        let mut p = PeerInfo::new("192.0.2.1", port, NatType::RestrictedNat, b"p".to_vec());
        p.id = id;
        p
    }

    #[tokio::test]
    async fn test_forwards_records() {
        let (mut server, client) = duplex(1024);
        let mut l = NotificationListener::spawn(client, ShutdownManager::new());

        server.write_all(&peer(1).to_bytes().unwrap()).await.unwrap();
        assert_eq!(l.recv().await.unwrap(), peer(1));

        server.write_all(&[OFFLINE_SENTINEL]).await.unwrap();
        // let the sentinel arrive on its own
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.write_all(&peer(2).to_bytes().unwrap()).await.unwrap();
        assert_eq!(l.recv().await.unwrap(), peer(2));

        drop(server);
        assert!(l.recv().await.is_none());
        assert!(matches!(l.join().await, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_malformed_record() {
        let (mut server, client) = duplex(1024);
        let mut l = NotificationListener::spawn(client, ShutdownManager::new());

        let mut bytes = peer(1).to_bytes().unwrap();
        bytes.pop();
        server.write_all(&bytes).await.unwrap();
        drop(server);

        assert!(l.recv().await.is_none());
        assert!(matches!(l.join().await, Err(Error::IncompleteMessage)));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (_server, client) = duplex(1024);
        let shutdown = ShutdownManager::new();
        let l = NotificationListener::spawn(client, shutdown.clone());

        let _ = shutdown.trigger_shutdown(());
        assert!(matches!(l.join().await, Err(Error::Shutdown)));
    }
}
