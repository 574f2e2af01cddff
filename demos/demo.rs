use async_shutdown::ShutdownManager;
use punchr::nat::NatType;
use punchr::punch::{NotificationListener, PeerInfo, PunchSession, SessionConfig};
use punchr::server::PunchServer;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let server = PunchServer::new("127.0.0.1:0").await?;
    let server_addr = server.local_addr()?.to_string();
    tokio::spawn(server.run());

    let mut alice = PunchSession::connect(&server_addr, SessionConfig::default()).await?;
    let me = PeerInfo::new("198.51.100.1", 40000, NatType::FullCone, b"alice".to_vec());
    alice.enroll(&me, 10).await?;

    let mut bob = PunchSession::connect(&server_addr, SessionConfig::default()).await?;
    let me = PeerInfo::new("203.0.113.7", 51000, NatType::SymmetricNat, b"bob".to_vec());
    bob.enroll(&me, 10).await?;
    let mut notices = NotificationListener::spawn(bob.take_reader()?, ShutdownManager::new());

    let peer = alice.lookup_by_meta(b"bob").await?;
    println!("alice found bob: {:?}", peer);

    alice.notify_peer(peer.id).await?;
    if let Some(caller) = notices.recv().await {
        println!("bob was asked to connect to {}:{}", caller.ip, caller.port);
    }

    Ok(())
}
