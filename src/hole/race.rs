use crate::error::{Error, Result};
use async_shutdown::ShutdownManager;
use std::future::poll_fn;
use std::task::Poll;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Index of the first socket with a datagram queued, or `None` once
/// `deadline` passes.
pub async fn wait_readable(sockets: &[UdpSocket], deadline: Instant) -> Option<usize> {
    let ready = poll_fn(|cx| {
        for (i, s) in sockets.iter().enumerate() {
            if let Poll::Ready(Ok(())) = s.poll_recv_ready(cx) {
                return Poll::Ready(i);
            }
        }
        Poll::Pending
    });
    timeout_at(deadline, ready).await.ok()
}

/// Races `sockets` and returns the first one a peer answered on.
///
/// All other sockets are closed before the winner is returned.
pub async fn first_responder(
    mut sockets: Vec<UdpSocket>,
    deadline: Instant,
    shutdown: &ShutdownManager<()>,
) -> Result<UdpSocket> {
    log::debug!("waiting on {} sockets", sockets.len());
    let winner = shutdown
        .wrap_cancel(wait_readable(&sockets, deadline))
        .await;

    match winner {
        Ok(Some(i)) => {
            let s = sockets.swap_remove(i);
            drop(sockets);
            Ok(s)
        }
        Ok(None) => Err(Error::PunchTimeout),
        Err(()) => Err(Error::Shutdown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::udp_socket;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::Duration;

    fn sockets(n: usize) -> Vec<UdpSocket> {
        (0..n)
            .map(|_| udp_socket(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), false, None).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_first_responder_wins() {
        let socks = sockets(8);
        let addrs: Vec<_> = socks.iter().map(|s| s.local_addr().unwrap()).collect();
        let winner_addr = addrs[5];

        let peer = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"x", winner_addr).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let s = first_responder(socks, deadline, &ShutdownManager::new())
            .await
            .unwrap();
        assert_eq!(s.local_addr().unwrap(), winner_addr);

        // losers are closed, their ports can be bound again
        for addr in addrs.iter().filter(|a| **a != winner_addr) {
            std::net::UdpSocket::bind(addr).unwrap();
        }
        assert!(std::net::UdpSocket::bind(winner_addr).is_err());
    }

    #[tokio::test]
    async fn test_timeout() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let r = first_responder(sockets(3), deadline, &ShutdownManager::new()).await;
        assert!(matches!(r, Err(Error::PunchTimeout)));

        let r = first_responder(Vec::new(), deadline, &ShutdownManager::new()).await;
        assert!(matches!(r, Err(Error::PunchTimeout)));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let shutdown = ShutdownManager::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = trigger.trigger_shutdown(());
        });

        let deadline = Instant::now() + Duration::from_secs(30);
        let r = first_responder(sockets(2), deadline, &shutdown).await;
        assert!(matches!(r, Err(Error::Shutdown)));
    }
}
