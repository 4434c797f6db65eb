//! Distance-vector routing table.
//!
//! [`RoutingTable`] is a plain data structure: it takes no locks of its own.
//! Callers (the peer service, the router-manager gossip loop) are expected
//! to hold it behind a single `tokio::sync::RwLock`, per the one-lock-per-
//! registry discipline.

use std::collections::HashMap;

use fabric_wire::{read_len_prefixed_string, write_len_prefixed, WireError};

/// Default ceiling past which a destination is considered unreachable.
pub const DEFAULT_UNREACHABLE_DISTANCE: u8 = 16;

/// One row of the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEntry {
    pub dst: String,
    pub next_hop: String,
    pub distance: u8,
}

impl RouterEntry {
    /// `dstNode · nextHop · distance(1B)`, matching the header's own
    /// len-prefixed string convention.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_len_prefixed(out, self.dst.as_bytes())?;
        write_len_prefixed(out, self.next_hop.as_bytes())?;
        out.push(self.distance);
        Ok(())
    }

    pub fn decode(buf: &[u8], idx: &mut usize) -> Result<Self, WireError> {
        let dst = read_len_prefixed_string(buf, idx)?;
        let next_hop = read_len_prefixed_string(buf, idx)?;
        if buf.len() < *idx + 1 {
            return Err(WireError::MalformedMessage("truncated distance field"));
        }
        let distance = buf[*idx];
        *idx += 1;
        Ok(Self { dst, next_hop, distance })
    }
}

/// Encode the `RouterTableResponse` payload : a 2-byte count followed by
/// that many [`RouterEntry`] records.
pub fn encode_table(entries: &[RouterEntry]) -> Result<Vec<u8>, WireError> {
    let count = u16::try_from(entries.len())
    .map_err(|_| WireError::MalformedMessage("routing table too large to serialize"))?;
    let mut out = Vec::new();
    out.extend_from_slice(&count.to_be_bytes());
    for entry in entries {
        entry.encode(&mut out)?;
    }
    Ok(out)
}

/// Decode a `RouterTableResponse` payload into its entries.
pub fn decode_table(buf: &[u8]) -> Result<Vec<RouterEntry>, WireError> {
    let mut idx = 0;
    let count = fabric_wire::read_u16(buf, &mut idx)? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(RouterEntry::decode(buf, &mut idx)?);
    }
    Ok(entries)
}

/// Outcome of folding one peer's full advertised table into ours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Whether any entry (or the direct-peer link) actually changed.
    pub changed: bool,
    /// Destinations that just crossed into unreachable.
    pub unreachable: Vec<String>,
}

#[derive(Debug, Default)]
struct MergeOutcome {
    changed: bool,
    became_unreachable: bool,
}

pub struct RoutingTable {
    self_id: String,
    unreachable_distance: u8,
    status_seq: u32,
    entries: HashMap<String, RouterEntry>,
}

impl RoutingTable {
    pub fn new(self_id: impl Into<String>, unreachable_distance: u8) -> Self {
        let self_id = self_id.into();
        let mut entries = HashMap::new();
        entries.insert(
            self_id.clone(),
            RouterEntry { dst: self_id.clone(), next_hop: self_id.clone(), distance: 0 },
        );
        Self { self_id, unreachable_distance, status_seq: 0, entries }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn unreachable_distance(&self) -> u8 {
        self.unreachable_distance
    }

    pub fn status_seq(&self) -> u32 {
        self.status_seq
    }

    pub fn entry(&self, dst: &str) -> Option<&RouterEntry> {
        self.entries.get(dst)
    }

    pub fn next_hop(&self, dst: &str) -> Option<&str> {
        self.entries.get(dst).map(|e| e.next_hop.as_str())
    }

    pub fn is_reachable(&self, dst: &str) -> bool {
        self.entries.get(dst).map(|e| e.distance < self.unreachable_distance).unwrap_or(false)
    }

    /// Every destination we currently believe is reachable, excluding
    /// ourselves — used by broadcast fan-out.
    pub fn reachable_entries(&self) -> impl Iterator<Item = &RouterEntry> {
        self.entries
        .values()
        .filter(|e| e.dst != self.self_id && e.distance < self.unreachable_distance)
    }

    /// Full table snapshot for a `RouterTableResponse`.
    pub fn snapshot(&self) -> Vec<RouterEntry> {
        self.entries.values().cloned().collect()
    }

    fn merge_entry(&mut self, origin: &str, dst: &str, advertised_distance: u8) -> MergeOutcome {
        if dst == self.self_id {
            // Never let a peer override our own self-entry.
            return MergeOutcome::default();
        }

        if advertised_distance >= self.unreachable_distance {
            let was_reachable = self.is_reachable(dst);
            self.entries.insert(
                dst.to_string(),
                RouterEntry {
                    dst: dst.to_string(),
                    next_hop: origin.to_string(),
                    distance: self.unreachable_distance,
                },
            );
            return MergeOutcome { changed: was_reachable, became_unreachable: true };
        }

        let candidate = RouterEntry {
            dst: dst.to_string(),
            next_hop: origin.to_string(),
            distance: advertised_distance.saturating_add(1).min(self.unreachable_distance),
        };

        match self.entries.get(dst) {
            None => {
                self.entries.insert(dst.to_string(), candidate);
                MergeOutcome { changed: true, became_unreachable: false }
            }
            Some(existing) if existing.next_hop == origin => {
                let changed = *existing != candidate;
                if changed {
                    self.entries.insert(dst.to_string(), candidate);
                }
                MergeOutcome { changed, became_unreachable: false }
            }
            Some(existing) if candidate.distance < existing.distance => {
                self.entries.insert(dst.to_string(), candidate);
                MergeOutcome { changed: true, became_unreachable: false }
            }
            Some(_) => MergeOutcome::default(),
        }
    }

    /// Insert or refresh the one-hop link to a peer we just gossiped with,
    /// After merging, also insert a direct entry (dst=P, nextHop=self,
    /// distance=1). Kept as its own step so the direct link never depends
    /// on whether P happened to include its own self-entry in the response.
    fn set_direct_peer(&mut self, peer: &str) -> bool {
        if peer == self.self_id {
            return false;
        }
        let candidate =
        RouterEntry { dst: peer.to_string(), next_hop: self.self_id.clone(), distance: 1 };
        match self.entries.get(peer) {
            Some(existing) if *existing == candidate => false,
            _ => {
                self.entries.insert(peer.to_string(), candidate);
                true
            }
        }
    }

    /// Fold a peer's complete advertised table into ours. Bumps
    /// `status_seq` exactly once if anything changed (the "increment seq
    /// only if changed" optimization).
    pub fn apply_advertised_table(
        &mut self,
        origin: &str,
        advertised: &[RouterEntry],
    ) -> MergeSummary {
        let mut changed = false;
        let mut unreachable = Vec::new();

        for entry in advertised {
            let outcome = self.merge_entry(origin, &entry.dst, entry.distance);
            changed |= outcome.changed;
            if outcome.became_unreachable {
                unreachable.push(entry.dst.clone());
            }
        }

        if self.set_direct_peer(origin) {
            changed = true;
        }

        if changed {
            self.status_seq = self.status_seq.wrapping_add(1);
            log::debug!(
                "routing table for {}: statusSeq -> {} after merge from {}",
                self.self_id,
                self.status_seq,
                origin
            );
        }

        MergeSummary { changed, unreachable }
    }

    /// Drop every entry whose next hop is `peer` (peer gone), per
    /// `RouterEntry`'s lifecycle ("pruned when peer gone"). Returns the
    /// destinations removed so the caller can notify unreachable-handlers.
    pub fn remove_peer(&mut self, peer: &str) -> Vec<String> {
        let stale: Vec<String> = self
        .entries
        .iter()
        .filter(|(dst, entry)| entry.next_hop == peer && dst.as_str() != self.self_id)
        .map(|(dst, _)| dst.clone())
        .collect();
        for dst in &stale {
            self.entries.remove(dst);
        }
        if !stale.is_empty() {
            self.status_seq = self.status_seq.wrapping_add(1);
        }
        stale
    }

    /// Accept a restarted peer's lower seq number ("statusSeq
    /// wraparound"): any observed decrease in a peer's advertised seq means
    /// the peer restarted; the caller should treat it as new information and
    /// resync fully rather than ignore it as stale.
    pub fn peer_restarted(stored_seq: u32, advertised_seq: u32) -> bool {
        advertised_seq < stored_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_has_self_entry_at_distance_zero() {
        let table = RoutingTable::new("gw-a", 16);
        let self_entry = table.entry("gw-a").unwrap();
        assert_eq!(self_entry.distance, 0);
        assert_eq!(self_entry.next_hop, "gw-a");
    }

    #[test]
    fn merge_adds_new_entry_and_direct_peer_link() {
        let mut table = RoutingTable::new("gw-a", 16);
        let summary = table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-c".into(), next_hop: "gw-b".into(), distance: 2 }],
        );
        assert!(summary.changed);
        assert_eq!(table.entry("gw-c").unwrap().distance, 3);
        assert_eq!(table.entry("gw-b").unwrap().distance, 1);
    }

    #[test]
    fn merge_is_a_no_op_when_nothing_changes() {
        let mut table = RoutingTable::new("gw-a", 16);
        table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-c".into(), next_hop: "gw-b".into(), distance: 2 }],
        );
        let seq_after_first = table.status_seq();
        let summary = table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-c".into(), next_hop: "gw-b".into(), distance: 2 }],
        );
        assert!(!summary.changed);
        assert_eq!(table.status_seq(), seq_after_first);
    }

    #[test]
    fn merge_prefers_strictly_shorter_routes_over_refresh_from_other_peers() {
        let mut table = RoutingTable::new("gw-a", 16);
        table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-z".into(), next_hop: "gw-b".into(), distance: 5 }],
        );
        assert_eq!(table.entry("gw-z").unwrap().distance, 6);

        // Same distance via a different peer must not replace the existing route.
        table.apply_advertised_table(
            "gw-c",
            &[RouterEntry { dst: "gw-z".into(), next_hop: "gw-c".into(), distance: 5 }],
        );
        assert_eq!(table.entry("gw-z").unwrap().next_hop, "gw-b");

        // A strictly shorter route wins.
        table.apply_advertised_table(
            "gw-c",
            &[RouterEntry { dst: "gw-z".into(), next_hop: "gw-c".into(), distance: 1 }],
        );
        assert_eq!(table.entry("gw-z").unwrap().next_hop, "gw-c");
        assert_eq!(table.entry("gw-z").unwrap().distance, 2);
    }

    #[test]
    fn advertised_distance_at_or_above_ceiling_marks_unreachable() {
        let mut table = RoutingTable::new("gw-a", 4);
        table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-z".into(), next_hop: "gw-b".into(), distance: 1 }],
        );
        assert!(table.is_reachable("gw-z"));

        let summary = table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-z".into(), next_hop: "gw-b".into(), distance: 4 }],
        );
        assert!(summary.unreachable.contains(&"gw-z".to_string()));
        assert!(!table.is_reachable("gw-z"));
    }

    #[test]
    fn no_entry_has_distance_zero_except_self() {
        let mut table = RoutingTable::new("gw-a", 16);
        table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-c".into(), next_hop: "gw-b".into(), distance: 0 }],
        );
        for entry in table.snapshot() {
            if entry.dst != "gw-a" {
                assert_ne!(entry.distance, 0);
            }
        }
    }

    #[test]
    fn remove_peer_prunes_entries_routed_through_it() {
        let mut table = RoutingTable::new("gw-a", 16);
        table.apply_advertised_table(
            "gw-b",
            &[RouterEntry { dst: "gw-c".into(), next_hop: "gw-b".into(), distance: 1 }],
        );
        let removed = table.remove_peer("gw-b");
        assert!(removed.contains(&"gw-b".to_string()));
        assert!(removed.contains(&"gw-c".to_string()));
        assert!(table.entry("gw-b").is_none());
        assert!(table.entry("gw-c").is_none());
    }

    #[test]
    fn peer_restart_detection() {
        assert!(RoutingTable::peer_restarted(42, 3));
        assert!(!RoutingTable::peer_restarted(42, 43));
    }

    #[test]
    fn table_codec_roundtrips() {
        let entries = vec![
            RouterEntry { dst: "gw-a".into(), next_hop: "gw-a".into(), distance: 0 },
            RouterEntry { dst: "gw-b".into(), next_hop: "gw-a".into(), distance: 1 },
        ];
        let bytes = encode_table(&entries).unwrap();
        let decoded = decode_table(&bytes).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn table_codec_rejects_truncated_input() {
        let entries = vec![RouterEntry { dst: "gw-a".into(), next_hop: "gw-a".into(), distance: 0 }];
        let mut bytes = encode_table(&entries).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(decode_table(&bytes).is_err());
    }
}
