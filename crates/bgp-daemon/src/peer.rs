//! C5: the peer finite-state machine (§4.5): `Idle -> Connect -> OpenSent ->
//! OpenConfirm -> Established`, driven by a single event queue and a single
//! inbound-message queue, both single-consumer.

use crate::{
    cancel::CancelToken,
    config::Config,
    connection::{
        self,
        Connection,
    },
    error::PeerError,
    rib,
    rib::Rib,
};
use bgp_wire::message::{
    BgpMessage,
    OpenMessage,
    UpdateMessage,
};
use bgp_route::RouteTable;
use log::{
    debug,
    error,
    info,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum State {
    Idle,
    Connect,
    OpenSent,
    OpenConfirm,
    Established,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Event {
    ManualStart,
    TcpConnectionConfirmed,
    BgpOpen,
    KeepAliveMsg,
    UpdateMsg,
    Established,
    LocRibChanged,
    AdjRibOutChanged,
    AdjRibInChanged,
}

/// One BGP session. Owns its RIBs, its event/message queues, and (once
/// Connect is reached) the TCP connection and its I/O tasks.
pub struct Peer {
    config: Config,
    state: State,
    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    message_tx: mpsc::UnboundedSender<UpdateMessage>,
    message_rx: mpsc::UnboundedReceiver<UpdateMessage>,
    error_tx: mpsc::UnboundedSender<PeerError>,
    error_rx: mpsc::UnboundedReceiver<PeerError>,
    connection: Option<Connection>,
    loc_rib: Rib,
    adj_rib_in: Rib,
    adj_rib_out: Rib,
    routes: Arc<dyn RouteTable>,
    cancel: CancelToken,
}

impl Peer {
    /// Builds a peer and its Loc-RIB (§4.4: configured networks matched
    /// against the kernel routing table). Does not open any connection;
    /// that happens on the Idle -> Connect transition once `start()` enqueues
    /// `ManualStart` and the caller drives `next()`.
    pub async fn new(config: Config, routes: Arc<dyn RouteTable>, cancel: CancelToken) -> Result<Self, PeerError> {
        let loc_rib = rib::build_loc_rib(config.local_ip, &config.networks, routes.as_ref()).await?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            state: State::Idle,
            event_tx,
            event_rx,
            message_tx,
            message_rx,
            error_tx,
            error_rx,
            connection: None,
            loc_rib,
            adj_rib_in: Rib::new(),
            adj_rib_out: Rib::new(),
            routes,
            cancel,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Cheap and non-blocking (§4.5): sets state to Idle and enqueues
    /// `ManualStart`. The caller must then drive the peer with repeated
    /// `next()` calls.
    pub fn start(&mut self) {
        self.state = State::Idle;
        let _ = self.event_tx.send(Event::ManualStart);
    }

    /// Advances the FSM by exactly one step: waits for the next event,
    /// inbound-side error, or cancellation, and applies the corresponding
    /// transition. Returns `Ok(())` after cancellation (the peer is left in
    /// Idle) or after processing one event; returns `Err` only for a fatal
    /// codec/kernel-route error or a closed event channel.
    pub async fn next(&mut self) -> Result<(), PeerError> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.close_connection().await;
                self.state = State::Idle;
                Ok(())
            }
            Some(error) = self.error_rx.recv() => {
                error!("peer {}: connection error: {error}", self.config.remote_ip);
                Ok(())
            }
            event = self.event_rx.recv() => {
                match event {
                    Some(event) => self.handle_event(event).await,
                    None => Err(PeerError::EventChannelClosed),
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) -> Result<(), PeerError> {
        let state = self.state;
        debug!("peer {}: state={state:?} event={event:?}", self.config.remote_ip);

        match (state, event) {
            (State::Idle, Event::ManualStart) => {
                let result = connection::establish(&self.config, &self.cancel).await;
                match result {
                    Ok(stream) => {
                        info!("peer {}: TCP connection established", self.config.remote_ip);
                        self.connection = Some(Connection::spawn(stream, self.event_tx.clone(), self.message_tx.clone(), self.error_tx.clone()));
                        self.state = State::Connect;
                        let _ = self.event_tx.send(Event::TcpConnectionConfirmed);
                    }
                    Err(PeerError::Cancelled) => {
                        self.state = State::Idle;
                    }
                    Err(other) => return Err(other),
                }
            }

            (State::Connect, Event::TcpConnectionConfirmed) => {
                let open = OpenMessage::new(self.config.local_as, self.config.local_ip);
                self.send(BgpMessage::Open(open));
                self.state = State::OpenSent;
            }

            (State::OpenSent, Event::BgpOpen) => {
                self.send(BgpMessage::KeepAlive);
                self.state = State::OpenConfirm;
            }

            (State::OpenConfirm, Event::KeepAliveMsg) => {
                self.state = State::Established;
                let _ = self.event_tx.send(Event::Established);
            }

            (State::Established, Event::Established) | (State::Established, Event::LocRibChanged) => {
                rib::update_adj_out_from_loc_rib(&mut self.adj_rib_out, &self.loc_rib, self.config.remote_as);
                if self.adj_rib_out.contains_new() {
                    self.adj_rib_out.mark_all_unchanged();
                    let _ = self.event_tx.send(Event::AdjRibOutChanged);
                }
            }

            (State::Established, Event::AdjRibOutChanged) => {
                for update in rib::generate_updates(&self.adj_rib_out, self.config.local_as, self.config.local_ip) {
                    self.send(BgpMessage::Update(update));
                }
            }

            (State::Established, Event::UpdateMsg) => {
                if let Some(update) = self.message_rx.recv().await {
                    rib::update_adj_in_from_update(&mut self.adj_rib_in, &update);
                    if self.adj_rib_in.contains_new() {
                        self.adj_rib_in.mark_all_unchanged();
                        let _ = self.event_tx.send(Event::AdjRibInChanged);
                    }
                }
            }

            (State::Established, Event::AdjRibInChanged) => {
                rib::update_loc_rib_from_adj_in(&mut self.loc_rib, &self.adj_rib_in, self.config.local_as);
                if self.loc_rib.contains_new() {
                    rib::install_loc_rib(&self.loc_rib, self.routes.as_ref()).await?;
                    self.loc_rib.mark_all_unchanged();
                    let _ = self.event_tx.send(Event::LocRibChanged);
                }
            }

            (state, event) => {
                debug!("peer {}: ignoring {event:?} in state {state:?}", self.config.remote_ip);
            }
        }
        Ok(())
    }

    fn send(&self, message: BgpMessage) {
        if let Some(connection) = &self.connection {
            connection.send(message);
        }
    }

    async fn close_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use async_trait::async_trait;
    use bgp_common::Ipv4Prefix;
    use bgp_route::{
        Route,
        RouteError,
    };
    use std::net::Ipv4Addr;

    struct EmptyRouteTable;

    #[async_trait]
    impl RouteTable for EmptyRouteTable {
        async fn list(&self) -> Result<Vec<Route>, RouteError> {
            Ok(Vec::new())
        }

        async fn add(&self, _destination: Ipv4Prefix, _gateway: Ipv4Addr) -> Result<(), RouteError> {
            Ok(())
        }
    }

    fn test_config(mode: Mode) -> Config {
        Config {
            local_as: bgp_common::AsNumber(64512),
            local_ip: Ipv4Addr::new(127, 0, 0, 1),
            remote_as: bgp_common::AsNumber(64513),
            remote_ip: Ipv4Addr::new(127, 0, 0, 2),
            mode,
            networks: Vec::new(),
            bgp_port: 0,
        }
    }

    #[tokio::test]
    async fn start_enqueues_manual_start_and_sets_idle() {
        let mut peer = Peer::new(test_config(Mode::Passive), Arc::new(EmptyRouteTable), CancelToken::new()).await.unwrap();
        peer.state = State::Established;
        peer.start();
        assert_eq!(peer.state(), State::Idle);
    }

    #[tokio::test]
    async fn cancellation_returns_peer_to_idle() {
        let cancel = CancelToken::new();
        let mut peer = Peer::new(test_config(Mode::Passive), Arc::new(EmptyRouteTable), cancel.clone()).await.unwrap();
        peer.state = State::Established;
        cancel.cancel();
        peer.next().await.unwrap();
        assert_eq!(peer.state(), State::Idle);
    }

    #[tokio::test]
    async fn established_loc_rib_changed_with_no_routes_produces_no_update_event() {
        let mut peer = Peer::new(test_config(Mode::Passive), Arc::new(EmptyRouteTable), CancelToken::new()).await.unwrap();
        peer.state = State::Established;
        peer.handle_event(Event::LocRibChanged).await.unwrap();
        assert!(peer.event_rx.try_recv().is_err());
    }

    /// §8 scenario 4: an Active peer dialing a Passive peer over loopback must
    /// converge both sides to `Established` well within 30 seconds. Uses a
    /// non-privileged port so the test does not need root (port 179 does).
    #[tokio::test]
    async fn two_configured_peers_converge_to_established() {
        use tokio::time::{
            timeout,
            Duration,
        };

        let port = 17900;
        let active_config = Config {
            local_as: bgp_common::AsNumber(64512),
            local_ip: Ipv4Addr::new(127, 0, 0, 1),
            remote_as: bgp_common::AsNumber(64513),
            remote_ip: Ipv4Addr::new(127, 0, 0, 2),
            mode: Mode::Active,
            networks: Vec::new(),
            bgp_port: port,
        };
        let passive_config = Config {
            local_as: bgp_common::AsNumber(64513),
            local_ip: Ipv4Addr::new(127, 0, 0, 2),
            remote_as: bgp_common::AsNumber(64512),
            remote_ip: Ipv4Addr::new(127, 0, 0, 1),
            mode: Mode::Passive,
            networks: Vec::new(),
            bgp_port: port,
        };

        let mut active = Peer::new(active_config, Arc::new(EmptyRouteTable), CancelToken::new()).await.unwrap();
        let mut passive = Peer::new(passive_config, Arc::new(EmptyRouteTable), CancelToken::new()).await.unwrap();
        active.start();
        passive.start();

        async fn drive_to_established(peer: &mut Peer) {
            while peer.state() != State::Established {
                peer.next().await.unwrap();
            }
        }

        let active_task = tokio::spawn(async move {
            drive_to_established(&mut active).await;
            active
        });
        let passive_task = tokio::spawn(async move {
            drive_to_established(&mut passive).await;
            passive
        });

        let active = timeout(Duration::from_secs(30), active_task).await.expect("active peer did not converge in time").unwrap();
        let passive = timeout(Duration::from_secs(30), passive_task).await.expect("passive peer did not converge in time").unwrap();

        assert_eq!(active.state(), State::Established);
        assert_eq!(passive.state(), State::Established);
    }
}
