use log::{error, info, LevelFilter};
use mio::Events;
use session_engine::eventloop::Engine;
use session_engine::GlobalConfig;
use simple_logger::SimpleLogger;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::exit;
use std::time::{Duration, Instant};

const BGP_PORT: u16 = 179;

fn main() -> anyhow::Result<()> {
    if let Err(error) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
        println!("Unable to initialize logging => {error}");
        exit(1);
    }

    info!("starting session engine");

    let global = GlobalConfig {
        local_as: 65000,
        router_id: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        hold_cloned: Duration::from_secs(60),
    };
    let mut engine = Engine::new(global);
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), BGP_PORT);
    if let Err(err) = engine.add_listener(bind_addr) {
        error!("failed to bind listener on {bind_addr}: {err}");
        exit(1);
    }

    let mut events = Events::with_capacity(1024);
    while !engine.quit {
        let now = Instant::now();
        let timeout = engine.poll_timeout(now);
        match engine.poll.poll(&mut events, Some(timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!("poll failed: {err}");
                continue;
            }
        }
        let ready = Engine::readiness_from(&events);
        engine.tick(Instant::now(), &ready);
    }

    error!("session engine exiting");
    Ok(())
}
