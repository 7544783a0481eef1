use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use anyhow::Context;
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::bitset::DynamicBitset;
use super::inspector;
use super::messages::{append_edge_record, EdgeRecords};
use super::policy::Partition;
use super::reader::{BufferedGraph, EdgeValue, OfflineGraph};
use super::transport::Transport;
use super::{reader_assignment, thread_range};

/// Which side of a bulk-synchronous exchange the runtime is about to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncType {
    Reduce,
    Broadcast,
}

/// Build-time options for [`DistGraph::load`].
#[derive(Clone, Debug)]
pub struct PartitionConfig {
    /// Path to the global graph file.
    pub filename: PathBuf,
    /// Replace the local graph with its transpose after loading.
    pub transpose: bool,
    /// Flush threshold for a per-peer edge staging buffer, in bytes.
    pub edge_send_buf_size: usize,
    /// Emit per-pass timing lines.
    pub more_stats: bool,
}

impl PartitionConfig {
    pub fn new<P: Into<PathBuf>>(filename: P) -> Self {
        Self {
            filename: filename.into(),
            transpose: false,
            edge_send_buf_size: 8 << 20,
            more_stats: false,
        }
    }
}

/// Raw pointer that may be shared across worker threads so they can fill
/// disjoint slots of one array in parallel.
struct SharedMut<T>(*mut T);
unsafe impl<T: Send> Send for SharedMut<T> {}
unsafe impl<T: Sync> Sync for SharedMut<T> {}

impl<T> SharedMut<T> {
    fn new(ptr: *mut T) -> Self {
        SharedMut(ptr)
    }

    /// # Safety
    ///
    /// `index` must be in bounds and no two threads may write the same index.
    unsafe fn write(&self, index: usize, value: T) {
        self.0.add(index).write(value);
    }
}

/// One host's share of a vertex-cut partitioned graph.
///
/// Local ids are dense and laid out masters first, then mirrors with outgoing
/// edges, then mirrors that only ever appear as edge destinations. The layout
/// is what `reset_bitset` and `mirror_ranges` trade on, and it is a pure
/// function of the reader assignment, the policy, and the merged incoming
/// bitset, so every host can predict every other host's local ids.
pub struct DistGraph<W, P> {
    policy: P,
    id: u32,
    num_hosts: u32,
    num_global_nodes: u64,
    num_global_edges: u64,
    gid2host: Vec<(u64, u64)>,

    num_owned: u32,
    num_nodes_with_edges: u32,
    num_nodes: u32,
    num_edges: u64,
    /// Remote sources whose edges arrive during the edge-load exchange.
    nodes_to_receive: u32,

    local_to_global: Vec<u64>,
    global_to_local: FxHashMap<u64, u32>,
    /// Running out-degree sum per local id; the compressed row index.
    prefix_sum: Vec<u64>,
    edge_dst: Vec<u32>,
    edge_data: Vec<W>,
    /// For each peer, the global ids this host mirrors from it.
    mirror_nodes: Vec<Vec<u64>>,
    transposed: bool,
}

impl<W: EdgeValue, P: Partition> DistGraph<W, P> {
    /// Read this host's block of the graph file, agree with all peers on the
    /// partition, and build the local graph.
    pub fn load<T: Transport>(
        config: &PartitionConfig,
        mut policy: P,
        net: &T,
    ) -> anyhow::Result<Self> {
        let build_timer = Instant::now();
        let my_id = net.id();
        let num_hosts = net.num_hosts();

        let offline = OfflineGraph::open(&config.filename)?;
        let num_global_nodes = offline.size();
        let num_global_edges = offline.size_edges();
        let gid2host = reader_assignment(num_hosts as usize, num_global_nodes);
        policy.init(num_hosts, num_global_nodes, num_global_edges);

        let (first_read, last_read) = gid2host[my_id as usize];
        let first_edge = offline.edge_begin(first_read);
        let last_edge = offline.edge_begin(last_read);
        drop(offline);

        let buf_graph = BufferedGraph::<W>::load_partial(
            &config.filename,
            first_read,
            last_read,
            first_edge,
            last_edge,
            num_global_nodes,
            num_global_edges,
        )
        .with_context(|| format!("host {my_id}: loading read block"))?;

        let (mut out_counts, incoming) =
            inspector::edge_inspection(&buf_graph, &policy, net, &gid2host, num_global_nodes)?;

        let mut graph = Self {
            policy,
            id: my_id,
            num_hosts,
            num_global_nodes,
            num_global_edges,
            gid2host,
            num_owned: 0,
            num_nodes_with_edges: 0,
            num_nodes: 0,
            num_edges: 0,
            nodes_to_receive: 0,
            local_to_global: Vec::new(),
            global_to_local: FxHashMap::default(),
            prefix_sum: Vec::new(),
            edge_dst: Vec::new(),
            edge_data: Vec::new(),
            mirror_nodes: vec![Vec::new(); num_hosts as usize],
            transposed: false,
        };

        graph.node_mapping(&mut out_counts, &incoming, config.more_stats);
        drop(out_counts);

        graph.edge_dst = vec![0u32; graph.num_edges as usize];
        graph.edge_data = vec![W::default(); graph.num_edges as usize];
        graph.fill_mirrors();

        graph.load_edges(&buf_graph, net, config)?;
        drop(buf_graph);

        if config.transpose && graph.num_nodes > 0 {
            graph.transpose_in_place();
            graph.transposed = true;
        }

        info!(
            "[{my_id}] partition built in {:.3}s: {} owned, {} with edges, {} local nodes, {} local edges",
            build_timer.elapsed().as_secs_f64(),
            graph.num_owned,
            graph.num_nodes_with_edges,
            graph.num_nodes,
            graph.num_edges
        );

        Ok(graph)
    }

    // ------------------------------------------------------------------
    // node mapping

    /// Assign local ids in the fixed layout and build the edge prefix sum.
    ///
    /// The four sub-passes are strictly ordered; each is internally parallel
    /// but places its output at precomputed per-thread offsets, so the
    /// resulting layout never depends on scheduling.
    fn node_mapping(
        &mut self,
        out_counts: &mut [Vec<u64>],
        incoming: &DynamicBitset,
        more_stats: bool,
    ) {
        let estimate =
            (self.num_global_nodes / self.num_hosts as u64) as usize * 115 / 100;
        let mut prefix = Vec::with_capacity(estimate);
        let mut l2g = Vec::with_capacity(estimate);

        let timer = Instant::now();
        self.map_masters(out_counts, &mut prefix, &mut l2g);
        self.num_owned = self.num_nodes;

        self.map_outgoing_mirrors(out_counts, &mut prefix, &mut l2g);
        self.num_nodes_with_edges = self.num_nodes;

        self.build_intermediate(&mut prefix, &l2g, incoming.count());
        self.map_incoming_mirrors(incoming, &mut prefix, &mut l2g);
        self.finalize_mapping(&mut prefix, &l2g);

        if more_stats {
            info!(
                "[{}] node mapping took {:.3}s",
                self.id,
                timer.elapsed().as_secs_f64()
            );
        }
        debug!(
            "[{}] mapped {} masters, {} outgoing mirrors, {} incoming-only mirrors, expecting {} remote sources",
            self.id,
            self.num_owned,
            self.num_nodes_with_edges - self.num_owned,
            self.num_nodes - self.num_nodes_with_edges,
            self.nodes_to_receive
        );

        self.local_to_global = l2g;
        self.prefix_sum = prefix;
    }

    /// Sub-pass 1: walk every host's read block in order and append the ids
    /// this host masters. Claims (zeroes) their outgoing counts so the mirror
    /// pass cannot append them again.
    fn map_masters(
        &mut self,
        out_counts: &mut [Vec<u64>],
        prefix: &mut Vec<u64>,
        l2g: &mut Vec<u64>,
    ) {
        let my_id = self.id;
        let to_receive = AtomicU32::new(0);

        for h in 0..self.num_hosts as usize {
            let (start_gid, last_gid) = self.gid2host[h];
            let host_size = (last_gid - start_gid) as usize;
            if !out_counts[h].is_empty() {
                assert_eq!(out_counts[h].len(), host_size);
            }

            let nthreads = rayon::current_num_threads();
            let mut thread_counts = vec![0u64; nthreads];
            let policy = &self.policy;
            thread_counts
                .par_iter_mut()
                .enumerate()
                .for_each(|(tid, slot)| {
                    let (begin, end) = thread_range(host_size, tid, nthreads);
                    *slot = (begin..end)
                        .filter(|&i| policy.master(start_gid + i as u64) == my_id)
                        .count() as u64;
                });
            for tid in 1..nthreads {
                thread_counts[tid] += thread_counts[tid - 1];
            }

            let new_nodes = thread_counts[nthreads - 1] as usize;
            if new_nodes == 0 {
                continue;
            }

            debug_assert_eq!(prefix.len(), self.num_nodes as usize);
            let base = self.num_nodes as usize;
            prefix.resize(base + new_nodes, 0);
            l2g.resize(base + new_nodes, 0);

            // carve the appended tail (and the counts row) into the disjoint
            // per-thread stripes the counting pass promised
            let mut stripes = Vec::with_capacity(nthreads);
            let mut prefix_tail = &mut prefix[base..];
            let mut l2g_tail = &mut l2g[base..];
            let mut counts_tail = &mut out_counts[h][..];
            for tid in 0..nthreads {
                let (begin, end) = thread_range(host_size, tid, nthreads);
                let take =
                    (thread_counts[tid] - if tid == 0 { 0 } else { thread_counts[tid - 1] }) as usize;
                let (my_prefix, rest) = std::mem::take(&mut prefix_tail).split_at_mut(take);
                prefix_tail = rest;
                let (my_l2g, rest) = std::mem::take(&mut l2g_tail).split_at_mut(take);
                l2g_tail = rest;
                let my_counts = if counts_tail.is_empty() {
                    None
                } else {
                    let (stripe, rest) =
                        std::mem::take(&mut counts_tail).split_at_mut(end - begin);
                    counts_tail = rest;
                    Some(stripe)
                };
                stripes.push((begin, end, my_prefix, my_l2g, my_counts));
            }

            let to_receive = &to_receive;
            rayon::scope(|scope| {
                for (begin, end, my_prefix, my_l2g, my_counts) in stripes {
                    scope.spawn(move |_| {
                        let mut counts = my_counts;
                        let mut handled = 0;
                        for i in begin..end {
                            let gid = start_gid + i as u64;
                            if policy.master(gid) != my_id {
                                continue;
                            }
                            let owned_edges = match counts.as_mut() {
                                Some(stripe) => {
                                    let edges = stripe[i - begin];
                                    stripe[i - begin] = 0;
                                    edges
                                }
                                None => 0,
                            };
                            my_prefix[handled] = owned_edges;
                            my_l2g[handled] = gid;
                            if owned_edges > 0 && h as u32 != my_id {
                                to_receive.fetch_add(1, Ordering::Relaxed);
                            }
                            handled += 1;
                        }
                        debug_assert_eq!(handled, my_prefix.len());
                    });
                }
            });

            self.num_nodes += new_nodes as u32;
        }

        self.nodes_to_receive += to_receive.load(Ordering::Relaxed);
    }

    /// Sub-pass 2: append ids with surviving outgoing counts. Masters were
    /// zeroed in sub-pass 1, so everything left is a remote-mastered id this
    /// host stores edges for.
    fn map_outgoing_mirrors(
        &mut self,
        out_counts: &mut [Vec<u64>],
        prefix: &mut Vec<u64>,
        l2g: &mut Vec<u64>,
    ) {
        let my_id = self.id;
        let to_receive = AtomicU32::new(0);

        for h in 0..self.num_hosts as usize {
            let host_size = out_counts[h].len();
            if host_size == 0 {
                continue;
            }
            let (start_gid, _) = self.gid2host[h];

            let nthreads = rayon::current_num_threads();
            let mut thread_counts = vec![0u64; nthreads];
            {
                let counts_row = &out_counts[h];
                thread_counts
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(tid, slot)| {
                        let (begin, end) = thread_range(host_size, tid, nthreads);
                        *slot = counts_row[begin..end].iter().filter(|&&c| c > 0).count() as u64;
                    });
            }
            for tid in 1..nthreads {
                thread_counts[tid] += thread_counts[tid - 1];
            }

            let new_nodes = thread_counts[nthreads - 1] as usize;
            if new_nodes > 0 {
                debug_assert_eq!(prefix.len(), self.num_nodes as usize);
                let base = self.num_nodes as usize;
                prefix.resize(base + new_nodes, 0);
                l2g.resize(base + new_nodes, 0);

                let mut stripes = Vec::with_capacity(nthreads);
                let mut prefix_tail = &mut prefix[base..];
                let mut l2g_tail = &mut l2g[base..];
                for tid in 0..nthreads {
                    let (begin, end) = thread_range(host_size, tid, nthreads);
                    let take = (thread_counts[tid]
                        - if tid == 0 { 0 } else { thread_counts[tid - 1] })
                        as usize;
                    let (my_prefix, rest) = std::mem::take(&mut prefix_tail).split_at_mut(take);
                    prefix_tail = rest;
                    let (my_l2g, rest) = std::mem::take(&mut l2g_tail).split_at_mut(take);
                    l2g_tail = rest;
                    stripes.push((begin, end, my_prefix, my_l2g));
                }

                let counts_row = &out_counts[h];
                let to_receive = &to_receive;
                rayon::scope(|scope| {
                    for (begin, end, my_prefix, my_l2g) in stripes {
                        scope.spawn(move |_| {
                            let mut handled = 0;
                            for i in begin..end {
                                let edges = counts_row[i];
                                if edges == 0 {
                                    continue;
                                }
                                my_prefix[handled] = edges;
                                my_l2g[handled] = start_gid + i as u64;
                                if h as u32 != my_id {
                                    to_receive.fetch_add(1, Ordering::Relaxed);
                                }
                                handled += 1;
                            }
                            debug_assert_eq!(handled, my_prefix.len());
                        });
                    }
                });

                self.num_nodes += new_nodes as u32;
            }

            out_counts[h] = Vec::new();
        }

        self.nodes_to_receive += to_receive.load(Ordering::Relaxed);
    }

    /// Turn per-id degrees into a running prefix sum over the ids mapped so
    /// far and build their global-to-local entries. Must run before the
    /// incoming pass, which probes the map to avoid double-appending.
    fn build_intermediate(&mut self, prefix: &mut [u64], l2g: &[u64], incoming_estimate: usize) {
        if self.num_nodes == 0 {
            return;
        }
        self.global_to_local
            .reserve(self.num_nodes_with_edges as usize + incoming_estimate);
        self.global_to_local.insert(l2g[0], 0);
        for i in 1..self.num_nodes_with_edges as usize {
            prefix[i] += prefix[i - 1];
            self.global_to_local.insert(l2g[i], i as u32);
        }
    }

    /// Sub-pass 3: append every id that some owned edge points at but that no
    /// earlier pass mapped. These carry no local edges.
    fn map_incoming_mirrors(
        &mut self,
        incoming: &DynamicBitset,
        prefix: &mut Vec<u64>,
        l2g: &mut Vec<u64>,
    ) {
        let total = self.num_global_nodes as usize;
        let nthreads = rayon::current_num_threads();
        let mut thread_counts = vec![0u64; nthreads];
        let resident = &self.global_to_local;
        thread_counts
            .par_iter_mut()
            .enumerate()
            .for_each(|(tid, slot)| {
                let (begin, end) = thread_range(total, tid, nthreads);
                *slot = (begin..end)
                    .filter(|&g| incoming.test(g) && !resident.contains_key(&(g as u64)))
                    .count() as u64;
            });
        for tid in 1..nthreads {
            thread_counts[tid] += thread_counts[tid - 1];
        }

        let new_nodes = thread_counts[nthreads - 1] as usize;
        if new_nodes == 0 {
            return;
        }

        debug_assert_eq!(prefix.len(), self.num_nodes as usize);
        let base = self.num_nodes as usize;
        prefix.resize(base + new_nodes, 0);
        l2g.resize(base + new_nodes, 0);

        let mut stripes = Vec::with_capacity(nthreads);
        let mut l2g_tail = &mut l2g[base..];
        for tid in 0..nthreads {
            let (begin, end) = thread_range(total, tid, nthreads);
            let take =
                (thread_counts[tid] - if tid == 0 { 0 } else { thread_counts[tid - 1] }) as usize;
            let (my_l2g, rest) = std::mem::take(&mut l2g_tail).split_at_mut(take);
            l2g_tail = rest;
            stripes.push((begin, end, my_l2g));
        }

        rayon::scope(|scope| {
            for (begin, end, my_l2g) in stripes {
                scope.spawn(move |_| {
                    let mut handled = 0;
                    for g in begin..end {
                        if incoming.test(g) && !resident.contains_key(&(g as u64)) {
                            my_l2g[handled] = g as u64;
                            handled += 1;
                        }
                    }
                    debug_assert_eq!(handled, my_l2g.len());
                });
            }
        });

        self.num_nodes += new_nodes as u32;
    }

    /// Extend the prefix sum over the zero-degree tail and finish the map.
    fn finalize_mapping(&mut self, prefix: &mut Vec<u64>, l2g: &[u64]) {
        self.global_to_local
            .reserve(self.num_nodes as usize - self.num_nodes_with_edges as usize);
        for i in self.num_nodes_with_edges as usize..self.num_nodes as usize {
            if i > 0 {
                prefix[i] += prefix[i - 1];
            }
            self.global_to_local.insert(l2g[i], i as u32);
        }
        self.num_edges = prefix.last().copied().unwrap_or(0);
    }

    /// Record, per peer, which of its masters this host mirrors.
    fn fill_mirrors(&mut self) {
        for i in self.num_owned..self.num_nodes {
            let gid = self.local_to_global[i as usize];
            self.mirror_nodes[self.policy.master(gid) as usize].push(gid);
        }
    }

    // ------------------------------------------------------------------
    // edge loading

    fn load_edges<T: Transport>(
        &mut self,
        buf_graph: &BufferedGraph<W>,
        net: &T,
        config: &PartitionConfig,
    ) -> anyhow::Result<()> {
        if self.id == 0 {
            if W::WIDTH == 0 {
                info!("loading edges without payloads");
            } else {
                info!("loading edges with {}-byte payloads", W::WIDTH);
            }
        }
        buf_graph.reset_read_counters();
        let timer = Instant::now();

        self.send_edges(buf_graph, net, config);
        let received = self.receive_edges(net)?;
        net.increment_phase();

        let seconds = timer.elapsed().as_secs_f64();
        let bytes = buf_graph.bytes_read();
        info!(
            "[{}] edge loading took {seconds:.3}s for {bytes} bytes ({:.3} MB/s), {received} sources received",
            self.id,
            bytes as f64 / (seconds * 1e6)
        );
        Ok(())
    }

    /// Walk the read block once more: owned edges go straight into the local
    /// arrays, everything else is staged per peer and flushed whenever a
    /// buffer crosses the threshold. Leftovers flush after the sweep.
    fn send_edges<T: Transport>(
        &mut self,
        buf_graph: &BufferedGraph<W>,
        net: &T,
        config: &PartitionConfig,
    ) {
        let (first_read, last_read) = self.gid2host[self.id as usize];
        let num_read = (last_read - first_read) as usize;
        let num_hosts = self.num_hosts as usize;
        let my_id = self.id;
        let threshold = config.edge_send_buf_size;
        let phase = net.phase();

        let mut edge_dst = std::mem::take(&mut self.edge_dst);
        let mut edge_data = std::mem::take(&mut self.edge_data);
        let dst_slots = SharedMut::new(edge_dst.as_mut_ptr());
        let data_slots = SharedMut::new(edge_data.as_mut_ptr());
        let graph = &*self;

        // Per-task staging: (per-peer wire buffers, per-peer destination and
        // payload scratch). Tasks flush independently; whatever is left over
        // is flushed serially below, as one record per (source, peer).
        let leftovers: Vec<Vec<Vec<u8>>> = (0..num_read)
            .into_par_iter()
            .fold(
                || {
                    (
                        vec![Vec::new(); num_hosts],
                        vec![Vec::new(); num_hosts],
                        vec![Vec::<W>::new(); num_hosts],
                    )
                },
                |(mut bufs, mut dsts, mut payloads), offset| {
                    let src = first_read + offset as u64;
                    let degree = buf_graph.degree(src);

                    let local_src = graph.global_to_local.get(&src).copied();
                    let mut cursor = local_src
                        .map(|lsrc| graph.edge_begin(lsrc))
                        .unwrap_or(0);

                    for stage in dsts.iter_mut() {
                        stage.clear();
                    }
                    for stage in payloads.iter_mut() {
                        stage.clear();
                    }

                    for edge in buf_graph.edge_begin(src)..buf_graph.edge_end(src) {
                        let dst = buf_graph.edge_destination(edge);
                        let payload = buf_graph.edge_data(edge);
                        let owner = graph.policy.edge(src, dst, degree).0 as usize;
                        if owner as u32 == my_id {
                            // the edge lives here; the inspection pass already
                            // reserved its slot
                            let ldst = graph.g2l(dst);
                            // SAFETY: slots [edge_begin(lsrc), edge_end(lsrc))
                            // belong to this task alone, and `cursor` stays
                            // inside them
                            unsafe {
                                dst_slots.write(cursor as usize, ldst);
                                data_slots.write(cursor as usize, payload);
                            }
                            cursor += 1;
                        } else {
                            dsts[owner].push(dst);
                            payloads[owner].push(payload);
                        }
                    }

                    if let Some(lsrc) = local_src {
                        assert_eq!(
                            cursor,
                            graph.edge_end(lsrc),
                            "host {my_id}: source {src} did not fill its slots"
                        );
                    }

                    for peer in 0..num_hosts {
                        if peer == my_id as usize || dsts[peer].is_empty() {
                            continue;
                        }
                        append_edge_record(&mut bufs[peer], src, &dsts[peer], &payloads[peer]);
                        if bufs[peer].len() > threshold {
                            net.send_tagged(peer as u32, phase, std::mem::take(&mut bufs[peer]));
                            bufs[peer].reserve(threshold + threshold / 4);
                        }
                    }

                    (bufs, dsts, payloads)
                },
            )
            .map(|(bufs, _, _)| bufs)
            .collect();

        self.edge_dst = edge_dst;
        self.edge_data = edge_data;

        for bufs in leftovers {
            for (peer, buf) in bufs.into_iter().enumerate() {
                if peer != self.id as usize && !buf.is_empty() {
                    net.send_tagged(peer as u32, phase, buf);
                }
            }
        }
        net.flush();
    }

    /// Accept edge records until every expected remote source has reported.
    /// Termination counts source records, not buffers; a buffer usually packs
    /// several records.
    fn receive_edges<T: Transport>(&mut self, net: &T) -> anyhow::Result<u32> {
        let phase = net.phase();
        let mut received = 0u32;

        while received < self.nodes_to_receive {
            let (sender, buf) = match net.recv_tagged(phase) {
                Some(message) => message,
                None => {
                    std::thread::yield_now();
                    continue;
                }
            };

            let mut records = EdgeRecords::new(&buf);
            while let Some((src, dsts, payloads)) = records
                .next::<W>()
                .with_context(|| format!("host {}: edge records from host {sender}", self.id))?
            {
                assert!(
                    self.is_local(src),
                    "host {}: received edges for non-resident source {src}",
                    self.id
                );
                let lsrc = self.global_to_local[&src];
                let begin = self.edge_begin(lsrc);
                let end = self.edge_end(lsrc);
                assert_eq!(
                    end - begin,
                    dsts.len() as u64,
                    "host {}: source {src} record does not match its slot width",
                    self.id
                );
                assert_eq!(payloads.len(), dsts.len());

                for (k, dst) in dsts.into_iter().enumerate() {
                    let ldst = self.g2l(dst);
                    self.edge_dst[begin as usize + k] = ldst;
                    self.edge_data[begin as usize + k] = payloads[k];
                }
                received += 1;
            }
        }

        Ok(received)
    }

    /// Swap the local graph for its transpose: every stored edge keeps its
    /// payload but flips direction. Edge count is unchanged.
    fn transpose_in_place(&mut self) {
        let num_nodes = self.num_nodes as usize;
        let num_edges = self.num_edges as usize;

        let mut prefix = vec![0u64; num_nodes];
        for &dst in &self.edge_dst {
            prefix[dst as usize] += 1;
        }
        let mut running = 0u64;
        let mut cursors = vec![0u64; num_nodes];
        for lid in 0..num_nodes {
            cursors[lid] = running;
            running += prefix[lid];
            prefix[lid] = running;
        }

        let mut new_dst = vec![0u32; num_edges];
        let mut new_data = vec![W::default(); num_edges];
        // scanning sources in id order keeps each in-list sorted by source
        for lid in 0..num_nodes {
            let begin = if lid == 0 { 0 } else { self.prefix_sum[lid - 1] };
            for edge in begin..self.prefix_sum[lid] {
                let dst = self.edge_dst[edge as usize] as usize;
                let slot = cursors[dst] as usize;
                cursors[dst] += 1;
                new_dst[slot] = lid as u32;
                new_data[slot] = self.edge_data[edge as usize];
            }
        }

        self.prefix_sum = prefix;
        self.edge_dst = new_dst;
        self.edge_data = new_data;
    }

    // ------------------------------------------------------------------
    // exposed surface

    /// Masters occupy local ids `[0, num_owned)`.
    pub fn num_owned(&self) -> u32 {
        self.num_owned
    }

    /// Masters and outgoing mirrors occupy `[0, num_nodes_with_edges)`.
    pub fn num_nodes_with_edges(&self) -> u32 {
        self.num_nodes_with_edges
    }

    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn num_edges(&self) -> u64 {
        self.num_edges
    }

    pub fn num_global_nodes(&self) -> u64 {
        self.num_global_nodes
    }

    pub fn num_global_edges(&self) -> u64 {
        self.num_global_edges
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn l2g(&self, lid: u32) -> u64 {
        self.local_to_global[lid as usize]
    }

    /// Local id of a resident global id. Callers must check
    /// [`is_local`](Self::is_local) first when residency is not guaranteed.
    pub fn g2l(&self, gid: u64) -> u32 {
        match self.global_to_local.get(&gid) {
            Some(&lid) => lid,
            None => panic!("host {}: gid {gid} is not resident", self.id),
        }
    }

    pub fn is_local(&self, gid: u64) -> bool {
        debug_assert!(gid < self.num_global_nodes);
        self.global_to_local.contains_key(&gid)
    }

    pub fn is_owned(&self, gid: u64) -> bool {
        debug_assert!(gid < self.num_global_nodes);
        self.policy.master(gid) == self.id
    }

    /// Master host of a global id.
    pub fn host_of(&self, gid: u64) -> u32 {
        debug_assert!(gid < self.num_global_nodes);
        self.policy.master(gid)
    }

    /// Global ids this host mirrors, grouped by master host.
    pub fn mirror_nodes(&self) -> &[Vec<u64>] {
        &self.mirror_nodes
    }

    /// Mirrors sit in one contiguous local-id run after the masters.
    pub fn mirror_ranges(&self) -> Vec<(u32, u32)> {
        vec![(self.num_owned, self.num_nodes)]
    }

    /// Clear the sync runtime's dirty bits for whichever class of nodes the
    /// coming exchange consumes. `reset` takes inclusive bounds.
    pub fn reset_bitset<F: FnMut(u32, u32)>(&self, sync: SyncType, mut reset: F) {
        // layout: masters, outgoing mirrors, incoming mirrors
        if self.num_owned > 0 {
            match sync {
                SyncType::Broadcast => reset(0, self.num_owned - 1),
                SyncType::Reduce => {
                    if self.num_owned < self.num_nodes {
                        reset(self.num_owned, self.num_nodes - 1);
                    }
                }
            }
        } else if sync == SyncType::Reduce && self.num_nodes > 0 {
            // nothing is owned, so every node is a mirror
            reset(0, self.num_nodes - 1);
        }
    }

    pub fn is_vertex_cut(&self) -> bool {
        true
    }

    /// First edge index of a local id.
    pub fn edge_begin(&self, lid: u32) -> u64 {
        if lid == 0 {
            0
        } else {
            self.prefix_sum[lid as usize - 1]
        }
    }

    pub fn edge_end(&self, lid: u32) -> u64 {
        self.prefix_sum[lid as usize]
    }

    /// Edge index range of a local id.
    pub fn edges(&self, lid: u32) -> std::ops::Range<u64> {
        self.edge_begin(lid)..self.edge_end(lid)
    }

    pub fn degree(&self, lid: u32) -> u64 {
        self.edge_end(lid) - self.edge_begin(lid)
    }

    pub fn edge_dst(&self, edge: u64) -> u32 {
        self.edge_dst[edge as usize]
    }

    pub fn edge_data(&self, edge: u64) -> W {
        self.edge_data[edge as usize]
    }
}
