use async_shutdown::ShutdownManager;
use env_logger::Env;
use punchr::client::{lookup, Client, ClientConfig, PeerKey};
use punchr::hole::PunchConfig;
use punchr::punch::SessionConfig;
use punchr::server::PunchServer;
use punchr::Result;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "punchr")]
enum Opt {
    Client(ClientOpt),
    Server(ServerOpt),
}

#[derive(StructOpt, Debug)]
struct ClientOpt {
    /// STUN server used to classify the local NAT, a random public one by default
    #[structopt(long = "stun-host")]
    stun_host: Option<String>,

    #[structopt(long = "stun-port", default_value = "3478")]
    stun_port: u16,

    #[structopt(long = "local-ip", default_value = "0.0.0.0")]
    local_ip: Ipv4Addr,

    #[structopt(long = "local-port", default_value = "34780")]
    local_port: u16,

    #[structopt(long = "server-addr")]
    server_addr: String,

    /// TTL of the holes punched towards a symmetric NAT
    #[structopt(long = "ttl", default_value = "10")]
    ttl: u32,

    #[structopt(long = "meta")]
    meta: Option<String>,

    #[structopt(long = "peer-id")]
    peer_id: Option<u32>,

    #[structopt(long = "peer-meta")]
    peer_meta: Option<String>,

    /// Print the record of this peer id and exit
    #[structopt(long = "lookup")]
    lookup: Option<u32>,

    /// Print the record of the peer with this meta and exit
    #[structopt(long = "lookup-meta")]
    lookup_meta: Option<String>,

    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

#[derive(StructOpt, Debug)]
struct ServerOpt {
    #[structopt(long = "listen-addr", default_value = "0.0.0.0:9988")]
    listen_addr: SocketAddr,

    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opt: Opt = StructOpt::from_args();

    let verbose = match &opt {
        Opt::Client(opt) => opt.verbose,
        Opt::Server(opt) => opt.verbose,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(if verbose {
        "debug"
    } else {
        "info"
    }))
    .init();

    let r = match opt {
        Opt::Server(opt) => run_server(opt).await,
        Opt::Client(opt) => run_client(opt).await,
    };

    match r {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_server(opt: ServerOpt) -> Result<()> {
    let s = PunchServer::new(opt.listen_addr).await?;
    s.run().await
}

async fn run_client(opt: ClientOpt) -> Result<()> {
    if let Some(key) = peer_key(opt.lookup, opt.lookup_meta) {
        let peer = lookup(&opt.server_addr, SessionConfig::default(), &key).await?;
        println!(
            "id: {}, ip: {}, port: {}, nat type: {}, meta: {}",
            peer.id,
            peer.ip,
            peer.port,
            peer.nat_type,
            peer.meta_str()
        );
        return Ok(());
    }

    let config = ClientConfig {
        stun_host: opt.stun_host,
        stun_port: opt.stun_port,
        local_ip: opt.local_ip,
        local_port: opt.local_port,
        server_addr: opt.server_addr,
        meta: opt.meta,
        peer: peer_key(opt.peer_id, opt.peer_meta),
        punch: PunchConfig {
            ttl: opt.ttl,
            ..Default::default()
        },
        ..Default::default()
    };

    let shutdown = ShutdownManager::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("shutting down");
                let _ = shutdown.trigger_shutdown(());
            }
        });
    }

    let client = Client::start(config, shutdown).await?;
    println!("id: {}, meta: {}", client.info().id, client.info().meta_str());

    client
        .run(|path| {
            log::info!(
                "connected with peer {} on {}, got {:?}",
                path.peer_addr,
                path.socket
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                String::from_utf8_lossy(&path.greeting)
            );
        })
        .await
}

fn peer_key(id: Option<u32>, meta: Option<String>) -> Option<PeerKey> {
    match (id, meta) {
        (Some(id), _) => Some(PeerKey::Id(id)),
        (None, Some(meta)) => Some(PeerKey::Meta(meta.into_bytes())),
        (None, None) => None,
    }
}
