use anyhow::{bail, Context};
use log::debug;
use rayon::prelude::*;

use super::bitset::{DynamicBitset, LazyBitset};
use super::messages::{
    decode_inspection, encode_inspection, IncomingMirrors, InspectionMsg, OutgoingCounts,
};
use super::policy::Partition;
use super::reader::{BufferedGraph, EdgeValue};
use super::transport::Transport;

/// Classify every edge this host read and exchange the results.
///
/// Returns the per-host outgoing-count table (entry `h` holds, for each id
/// host `h` read, how many of its edges this host will own; empty when `h`
/// sent nothing) and the OR-merged bitset of global ids that need an incoming
/// mirror on this host. Increments the transport phase on the way out.
pub(crate) fn edge_inspection<W, P, T>(
    buf_graph: &BufferedGraph<W>,
    policy: &P,
    net: &T,
    gid2host: &[(u64, u64)],
    num_global_nodes: u64,
) -> anyhow::Result<(Vec<Vec<u64>>, DynamicBitset)>
where
    W: EdgeValue,
    P: Partition,
    T: Transport,
{
    let my_id = net.id() as usize;
    let num_hosts = net.num_hosts() as usize;
    let (first_read, last_read) = gid2host[my_id];
    let num_read = (last_read - first_read) as usize;

    let host_has_outgoing = DynamicBitset::new(num_hosts);
    let mut per_peer_incoming: Vec<LazyBitset> =
        (0..num_hosts).map(|_| LazyBitset::new()).collect();

    // Per-source classification; each row is owned by exactly one task, and
    // the shared structures take only atomic bit sets.
    let mut counts_by_src: Vec<Vec<u64>> = vec![vec![0u64; num_hosts]; num_read];
    counts_by_src
        .par_iter_mut()
        .enumerate()
        .for_each(|(offset, row)| {
            let src = first_read + offset as u64;
            let degree = buf_graph.degree(src);
            for edge in buf_graph.edge_begin(src)..buf_graph.edge_end(src) {
                let dst = buf_graph.edge_destination(edge);
                let (owner, owner_is_dst_master) = policy.edge(src, dst, degree);
                row[owner as usize] += 1;
                host_has_outgoing.set(owner as usize);
                // the owner must create a mirror for dst unless it masters it
                if !owner_is_dst_master {
                    per_peer_incoming[owner as usize].set(dst as usize, num_global_nodes as usize);
                }
            }
        });

    // flip to one row per peer, the shape both the exchange and the
    // node-mapping passes consume
    let mut out_counts: Vec<Vec<u64>> = vec![Vec::new(); num_hosts];
    out_counts.par_iter_mut().enumerate().for_each(|(h, row)| {
        row.resize(num_read, 0);
        for (offset, by_src) in counts_by_src.iter().enumerate() {
            row[offset] = by_src[h];
        }
    });
    drop(counts_by_src);

    debug!(
        "[{my_id}] inspected {num_read} read ids, {} peers with outgoing edges",
        host_has_outgoing.count()
    );

    send_inspection(net, &mut out_counts, &mut per_peer_incoming, &host_has_outgoing)?;

    let mut incoming = per_peer_incoming[my_id]
        .take()
        .unwrap_or_else(|| DynamicBitset::new(num_global_nodes as usize));

    recv_inspection(net, gid2host, &mut out_counts, &mut incoming)?;
    net.increment_phase();

    Ok((out_counts, incoming))
}

/// One message per peer: the outgoing-count section and the incoming-mirror
/// section travel together, and each peer buffer is released as soon as it is
/// handed to the transport.
fn send_inspection<T: Transport>(
    net: &T,
    out_counts: &mut [Vec<u64>],
    per_peer_incoming: &mut [LazyBitset],
    host_has_outgoing: &DynamicBitset,
) -> anyhow::Result<()> {
    let my_id = net.id() as usize;
    let phase = net.phase();

    for peer in 0..net.num_hosts() as usize {
        if peer == my_id {
            continue;
        }

        let outgoing = if host_has_outgoing.test(peer) {
            OutgoingCounts::Counts(std::mem::take(&mut out_counts[peer]))
        } else {
            out_counts[peer] = Vec::new();
            OutgoingCounts::None
        };

        let incoming = match per_peer_incoming[peer].take() {
            Some(bits) => IncomingMirrors::from_bitset(&bits),
            None => IncomingMirrors::None,
        };

        let buf = encode_inspection(&InspectionMsg { outgoing, incoming })?;
        net.send_tagged(peer as u32, phase, buf);
    }

    Ok(())
}

/// Take one message from every peer, install its outgoing counts, and
/// OR-merge its incoming section into this host's bitset.
fn recv_inspection<T: Transport>(
    net: &T,
    gid2host: &[(u64, u64)],
    out_counts: &mut [Vec<u64>],
    incoming: &mut DynamicBitset,
) -> anyhow::Result<()> {
    let my_id = net.id();
    let phase = net.phase();

    for _ in 1..net.num_hosts() {
        let (sender, buf) = loop {
            match net.recv_tagged(phase) {
                Some(message) => break message,
                None => std::thread::yield_now(),
            }
        };

        let msg = decode_inspection(&buf)
            .with_context(|| format!("host {my_id}: inspection message from host {sender}"))?;

        match msg.outgoing {
            OutgoingCounts::Counts(counts) => {
                let expected = (gid2host[sender as usize].1 - gid2host[sender as usize].0) as usize;
                if counts.len() != expected {
                    bail!(
                        "host {my_id}: host {sender} sent {} outgoing counts, expected {expected}",
                        counts.len()
                    );
                }
                out_counts[sender as usize] = counts;
            }
            OutgoingCounts::None => out_counts[sender as usize] = Vec::new(),
        }

        msg.incoming
            .merge_into(incoming)
            .with_context(|| format!("host {my_id}: incoming section from host {sender}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::reader::write_graph_file;
    use crate::partition::transport::LocalTransport;
    use crate::partition::reader_assignment;

    /// master(g) = g % 2; edges belong to the source's master.
    struct ParityPolicy;

    impl Partition for ParityPolicy {
        fn init(&mut self, _num_hosts: u32, _num_global_nodes: u64, _num_global_edges: u64) {}

        fn master(&self, gid: u64) -> u32 {
            (gid % 2) as u32
        }

        fn edge(&self, src: u64, dst: u64, _src_degree: u64) -> (u32, bool) {
            ((src % 2) as u32, src % 2 == dst % 2)
        }
    }

    #[test]
    fn test_two_host_inspection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.dgr");
        write_graph_file(&path, 3, &[(0u64, 1u64, 5u32), (0, 2, 7), (1, 2, 3), (2, 0, 2)])
            .unwrap();

        let gid2host = reader_assignment(2, 3);
        assert_eq!(gid2host, vec![(0, 2), (2, 3)]);

        let mut universe = LocalTransport::universe(2);
        let net1 = universe.pop().unwrap();
        let net0 = universe.pop().unwrap();

        let results = std::thread::scope(|s| {
            let path0 = path.clone();
            let blocks0 = gid2host.clone();
            let host0 = s.spawn(move || {
                let bufg =
                    BufferedGraph::<u32>::load_partial(&path0, 0, 2, 0, 3, 3, 4).unwrap();
                edge_inspection(&bufg, &ParityPolicy, &net0, &blocks0, 3).unwrap()
            });
            let path1 = path.clone();
            let blocks1 = gid2host.clone();
            let host1 = s.spawn(move || {
                let bufg =
                    BufferedGraph::<u32>::load_partial(&path1, 2, 3, 3, 4, 3, 4).unwrap();
                edge_inspection(&bufg, &ParityPolicy, &net1, &blocks1, 3).unwrap()
            });
            (host0.join().unwrap(), host1.join().unwrap())
        });

        let (out0, incoming0) = results.0;
        let (out1, incoming1) = results.1;

        // host 0 keeps both of source 0's edges; host 1 ships it one edge of
        // source 2
        assert_eq!(out0[0], vec![2, 0]);
        assert_eq!(out0[1], vec![1]);
        // only gid 1 needs an incoming mirror on host 0
        assert_eq!(incoming0.offsets(), vec![1]);

        // host 1 owns source 1's edge, read by host 0; nothing it read stays
        assert_eq!(out1[0], vec![0, 1]);
        assert_eq!(out1[1], vec![0]);
        assert_eq!(incoming1.offsets(), vec![2]);
    }
}
