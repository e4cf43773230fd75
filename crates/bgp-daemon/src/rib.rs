//! C4: the three-stage RIB pipeline (§4.4): Adj-RIB-In, Loc-RIB, Adj-RIB-Out,
//! plus the operations that move routes between them.

use bgp_common::{
    AsNumber,
    Ipv4Prefix,
};
use bgp_route::RouteTable;
use bgp_wire::{
    message::UpdateMessage,
    path_attribute::{
        self,
        AsPathSegment,
        Origin,
        PathAttribute,
    },
};
use std::net::Ipv4Addr;

/// Whether a `RibEntry` has changed since the last `mark_all_unchanged()`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RibStatus {
    New,
    Unchanged,
}

/// A single route: an NLRI prefix paired with its path-attribute list. Two
/// entries are "the same route" when both the prefix and the full attribute
/// list match structurally (`insert` is a no-op for anything already equal to
/// an existing entry).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RibEntry {
    pub nlri: Ipv4Prefix,
    pub attributes: Vec<PathAttribute>,
}

impl RibEntry {
    pub fn next_hop(&self) -> Option<Ipv4Addr> {
        self.attributes.iter().find_map(|attr| if let PathAttribute::NextHop(addr) = attr { Some(*addr) } else { None })
    }
}

/// `contains_as(entry, as)` from §4.4: scans the entry's attributes and
/// returns true iff the first AS_PATH attribute found contains `target`.
pub fn contains_as(entry: &RibEntry, target: AsNumber) -> bool {
    entry
        .attributes
        .iter()
        .find_map(|attr| match attr {
            PathAttribute::AsPath(segment) => Some(segment.contains(target)),
            _ => None,
        })
        .unwrap_or(false)
}

/// A set of `RibEntry` with per-entry change status. Backed by a `Vec` rather
/// than a hash map: RIBs in this core hold at most a handful of entries (one
/// neighbor, a short configured-network list), so linear lookup costs nothing
/// and sidesteps needing `Hash` to line up with `PartialEq` for attribute
/// lists that carry `Unknown` variants.
#[derive(Debug, Default, Clone)]
pub struct Rib {
    entries: Vec<(RibEntry, RibStatus)>,
}

impl Rib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry` with status `New` unless an identical entry is already
    /// present, in which case this is a no-op.
    pub fn insert(&mut self, entry: RibEntry) {
        if self.entries.iter().any(|(existing, _)| existing == &entry) {
            return;
        }
        self.entries.push((entry, RibStatus::New));
    }

    pub fn routes(&self) -> Vec<RibEntry> {
        self.entries.iter().map(|(entry, _)| entry.clone()).collect()
    }

    /// Entries currently marked `New`. Used by `next()` to decide what to
    /// install into the kernel without reinstalling unchanged routes.
    pub fn new_entries(&self) -> Vec<RibEntry> {
        self.entries.iter().filter(|(_, status)| *status == RibStatus::New).map(|(entry, _)| entry.clone()).collect()
    }

    pub fn mark_all_unchanged(&mut self) {
        for (_, status) in &mut self.entries {
            *status = RibStatus::Unchanged;
        }
    }

    pub fn contains_new(&self) -> bool {
        self.entries.iter().any(|(_, status)| *status == RibStatus::New)
    }
}

/// Builds the default path-attribute list `P0 = [ORIGIN=IGP, AS_PATH=empty
/// AS_SEQUENCE, NEXT_HOP=local_ip]` used for locally originated routes.
fn default_attributes(local_ip: Ipv4Addr) -> Vec<PathAttribute> {
    vec![PathAttribute::Origin(Origin::Igp), PathAttribute::AsPath(AsPathSegment::Sequence(Vec::new())), PathAttribute::NextHop(local_ip)]
}

/// Loc-RIB construction from configuration (§4.4): for each configured
/// network, the kernel routing table is queried for an exact destination
/// match, and each match becomes a Loc-RIB entry carrying `P0`. These entries
/// are marked `Unchanged` before being returned: they were found in the
/// kernel table in the first place, so they are already installed there, and
/// must not trip `install_loc_rib` on the first `AdjRibInChanged` cycle.
pub async fn build_loc_rib(
    local_ip: Ipv4Addr,
    networks: &[Ipv4Prefix],
    routes: &dyn RouteTable,
) -> Result<Rib, bgp_route::RouteError> {
    let mut loc_rib = Rib::new();
    if networks.is_empty() {
        return Ok(loc_rib);
    }

    let kernel_routes = routes.list().await?;
    let attributes = default_attributes(local_ip);
    for network in networks {
        if kernel_routes.iter().any(|route| route.destination == *network) {
            loc_rib.insert(RibEntry { nlri: *network, attributes: attributes.clone() });
        }
    }
    loc_rib.mark_all_unchanged();
    Ok(loc_rib)
}

/// Loc-RIB <- Adj-RIB-In (§4.4): entries whose AS_PATH contains `local_as` are
/// dropped (inbound loop avoidance); everything else is inserted.
pub fn update_loc_rib_from_adj_in(loc_rib: &mut Rib, adj_rib_in: &Rib, local_as: AsNumber) {
    for entry in adj_rib_in.routes() {
        if contains_as(&entry, local_as) {
            continue;
        }
        loc_rib.insert(entry);
    }
}

/// Loc-RIB -> kernel (§4.4): installs every `New` Loc-RIB entry's NEXT_HOP as
/// the gateway for its prefix. A route with no NEXT_HOP attribute is skipped
/// rather than treated as an error: it cannot happen for entries this core
/// ever produces, since every path that inserts into Loc-RIB carries one.
pub async fn install_loc_rib(loc_rib: &Rib, routes: &dyn RouteTable) -> Result<(), bgp_route::RouteError> {
    for entry in loc_rib.new_entries() {
        if let Some(gateway) = entry.next_hop() {
            routes.add(entry.nlri, gateway).await?;
        }
    }
    Ok(())
}

/// Adj-RIB-Out <- Loc-RIB (§4.4): entries whose AS_PATH contains `remote_as`
/// are dropped (outbound loop avoidance); everything else is inserted.
pub fn update_adj_out_from_loc_rib(adj_rib_out: &mut Rib, loc_rib: &Rib, remote_as: AsNumber) {
    for entry in loc_rib.routes() {
        if contains_as(&entry, remote_as) {
            continue;
        }
        adj_rib_out.insert(entry);
    }
}

/// Adj-RIB-Out -> UPDATE messages (§4.4). Entries are grouped by the
/// canonical marshalled bytes of their attribute list, so two structurally
/// identical attribute lists always group together regardless of which
/// `RibEntry` produced them. Each group's attributes are cloned before
/// rewriting NEXT_HOP (to the local address) and AS_PATH (prepending the
/// local AS), so the rewrite never mutates a shared template in place.
pub fn generate_updates(adj_rib_out: &Rib, local_as: AsNumber, local_ip: Ipv4Addr) -> Vec<UpdateMessage> {
    let mut groups: Vec<(Vec<u8>, Vec<PathAttribute>, Vec<Ipv4Prefix>)> = Vec::new();
    for entry in adj_rib_out.routes() {
        let key = path_attribute::marshal_all(&entry.attributes);
        match groups.iter_mut().find(|(existing_key, _, _)| existing_key == &key) {
            Some((_, _, prefixes)) => prefixes.push(entry.nlri),
            None => groups.push((key, entry.attributes, vec![entry.nlri])),
        }
    }

    groups
        .into_iter()
        .map(|(_, attributes, nlri)| {
            let path_attributes = attributes
                .iter()
                .map(|attr| match attr {
                    PathAttribute::NextHop(_) => PathAttribute::NextHop(local_ip),
                    PathAttribute::AsPath(_) => path_attribute::append_to_as_path(attr, local_as),
                    other => other.clone(),
                })
                .collect();
            UpdateMessage { withdrawn_routes: Vec::new(), path_attributes, nlri }
        })
        .collect()
}

/// Adj-RIB-In <- UPDATE (§4.4): every NLRI prefix in the UPDATE becomes a
/// fresh Adj-RIB-In entry carrying the UPDATE's attributes. Withdrawals are
/// ignored, per the Non-goals.
pub fn update_adj_in_from_update(adj_rib_in: &mut Rib, update: &UpdateMessage) {
    for prefix in &update.nlri {
        adj_rib_in.insert(RibEntry { nlri: *prefix, attributes: update.path_attributes.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_as_path(nlri: Ipv4Prefix, path: Vec<AsNumber>) -> RibEntry {
        RibEntry {
            nlri,
            attributes: vec![
                PathAttribute::Origin(Origin::Igp),
                PathAttribute::AsPath(AsPathSegment::Sequence(path)),
                PathAttribute::NextHop(Ipv4Addr::new(10, 0, 0, 1)),
            ],
        }
    }

    struct StaticRouteTable(Vec<bgp_route::Route>);

    #[async_trait::async_trait]
    impl RouteTable for StaticRouteTable {
        async fn list(&self) -> Result<Vec<bgp_route::Route>, bgp_route::RouteError> {
            Ok(self.0.clone())
        }

        async fn add(&self, _destination: Ipv4Prefix, _gateway: Ipv4Addr) -> Result<(), bgp_route::RouteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn build_loc_rib_marks_config_seeded_entries_unchanged() {
        let network = Ipv4Prefix::new(Ipv4Addr::new(10, 8, 0, 0), 24).unwrap();
        let kernel_routes = vec![bgp_route::Route { protocol: bgp_route::RouteProtocol::Kernel, destination: network, next_hop: None }];
        let loc_rib = build_loc_rib(Ipv4Addr::new(127, 0, 0, 1), &[network], &StaticRouteTable(kernel_routes)).await.unwrap();
        assert_eq!(loc_rib.routes().len(), 1);
        assert!(!loc_rib.contains_new(), "config-seeded entries are already installed and must not appear New");
    }

    #[test]
    fn insert_is_idempotent_for_identical_entries() {
        let mut rib = Rib::new();
        let entry = entry_with_as_path(Ipv4Prefix::new(Ipv4Addr::new(10, 1, 0, 0), 24).unwrap(), vec![]);
        rib.insert(entry.clone());
        rib.insert(entry);
        assert_eq!(rib.routes().len(), 1);
    }

    #[test]
    fn mark_all_unchanged_clears_new() {
        let mut rib = Rib::new();
        rib.insert(entry_with_as_path(Ipv4Prefix::new(Ipv4Addr::new(10, 1, 0, 0), 24).unwrap(), vec![]));
        assert!(rib.contains_new());
        rib.mark_all_unchanged();
        assert!(!rib.contains_new());
    }

    #[test]
    fn inbound_loop_avoidance_drops_local_as() {
        let local_as = AsNumber(64512);
        let mut adj_in = Rib::new();
        adj_in.insert(entry_with_as_path(Ipv4Prefix::new(Ipv4Addr::new(10, 2, 0, 0), 24).unwrap(), vec![local_as]));

        let mut loc_rib = Rib::new();
        update_loc_rib_from_adj_in(&mut loc_rib, &adj_in, local_as);
        assert!(loc_rib.routes().is_empty());
    }

    #[test]
    fn outbound_loop_avoidance_drops_remote_as() {
        let remote_as = AsNumber(64513);
        let mut loc_rib = Rib::new();
        loc_rib.insert(entry_with_as_path(Ipv4Prefix::new(Ipv4Addr::new(10, 3, 0, 0), 24).unwrap(), vec![remote_as]));

        let mut adj_out = Rib::new();
        update_adj_out_from_loc_rib(&mut adj_out, &loc_rib, remote_as);
        assert!(adj_out.routes().is_empty());
    }

    #[test]
    fn generate_updates_rewrites_next_hop_and_as_path() {
        let mut adj_out = Rib::new();
        adj_out.insert(RibEntry {
            nlri: Ipv4Prefix::new(Ipv4Addr::new(10, 4, 0, 0), 24).unwrap(),
            attributes: vec![
                PathAttribute::Origin(Origin::Igp),
                PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64513)])),
                PathAttribute::NextHop(Ipv4Addr::new(10, 0, 0, 9)),
            ],
        });

        let local_ip = Ipv4Addr::new(127, 0, 0, 1);
        let updates = generate_updates(&adj_out, AsNumber(64512), local_ip);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].path_attributes.contains(&PathAttribute::NextHop(local_ip)));
        assert!(updates[0]
            .path_attributes
            .contains(&PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64512), AsNumber(64513)]))));
    }

    #[test]
    fn generate_updates_groups_entries_sharing_attributes() {
        let attributes = vec![
            PathAttribute::Origin(Origin::Igp),
            PathAttribute::AsPath(AsPathSegment::Sequence(Vec::new())),
            PathAttribute::NextHop(Ipv4Addr::new(10, 0, 0, 9)),
        ];
        let mut adj_out = Rib::new();
        adj_out.insert(RibEntry { nlri: Ipv4Prefix::new(Ipv4Addr::new(10, 5, 0, 0), 24).unwrap(), attributes: attributes.clone() });
        adj_out.insert(RibEntry { nlri: Ipv4Prefix::new(Ipv4Addr::new(10, 6, 0, 0), 24).unwrap(), attributes });

        let updates = generate_updates(&adj_out, AsNumber(64512), Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].nlri.len(), 2);
    }

    #[test]
    fn adj_rib_in_ignores_withdrawals() {
        let mut adj_in = Rib::new();
        let update = UpdateMessage {
            withdrawn_routes: vec![Ipv4Prefix::new(Ipv4Addr::new(10, 7, 0, 0), 24).unwrap()],
            path_attributes: vec![PathAttribute::Origin(Origin::Igp)],
            nlri: Vec::new(),
        };
        update_adj_in_from_update(&mut adj_in, &update);
        assert!(adj_in.routes().is_empty());
    }
}
