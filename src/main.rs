// Copyright 2025 Cedric Hammes
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bgp_daemon::{
    CancelToken,
    Config,
    Peer,
};
use bgp_route::RouteTable;
use colorful::{
    Color,
    Colorful,
};
use log::{
    error,
    info,
    LevelFilter,
};
use simple_logger::SimpleLogger;
use std::{
    env,
    process::exit,
    sync::Arc,
};

#[cfg(target_os = "linux")]
fn open_route_table() -> anyhow::Result<Arc<dyn RouteTable>> {
    Ok(Arc::new(bgp_route::linux::LinuxRouteTable::new()?))
}

#[cfg(target_os = "windows")]
fn open_route_table() -> anyhow::Result<Arc<dyn RouteTable>> {
    Ok(Arc::new(bgp_route::windows_sys::WindowsRouteTable::new()?))
}

#[tokio::main]
async fn main() {
    if let Err(error) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
        println!("Unable to initialize logging => {}", error);
        exit(-1);
    }

    let header = r#"   ____       __              _
  / __ \_____/ /_____ __   __(_)_  _______
 / / / / ___/ __/ __ `/ | / / / / / / ___/
/ /_/ / /__/ /_/ /_/ /| |/ / / /_/ (__  )
\____/\___/\__/\__,_/ |___/_/\__,_/____/
   bgp-speaker: minimal BGP-4 speaker"#;
    println!("{}\n", header.gradient(Color::Green).bold());

    let raw_config = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let config = match Config::parse_line(&raw_config) {
        Ok(config) => config,
        Err(error) => {
            error!("Invalid configuration => {error}");
            println!("usage: bgp-speaker <localAS> <localIP> <remoteAS> <remoteIP> <active|passive> [network ...]");
            exit(-1);
        }
    };

    let routes = match open_route_table() {
        Ok(routes) => routes,
        Err(error) => {
            error!("Unable to access the kernel routing table => {error}");
            exit(-1);
        }
    };

    let cancel = CancelToken::new();
    let mut peer = match Peer::new(config, routes, cancel.clone()).await {
        Ok(peer) => peer,
        Err(error) => {
            error!("Unable to construct peer => {error}");
            exit(-1);
        }
    };

    peer.start();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling peer session");
            signal_cancel.cancel();
        }
    });

    while !cancel.is_cancelled() {
        if let Err(error) = peer.next().await {
            error!("Peer session terminated => {error}");
            exit(-1);
        }
    }
}
