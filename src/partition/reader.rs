use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;

const MAGIC: u64 = 0x6472_6772; // "rgrd"
const VERSION: u64 = 1;
const HEADER_LEN: u64 = 40;

/// Edge payload stored in the graph file and shipped between hosts.
///
/// `()` means the graph carries no per-edge data; its on-disk width is zero
/// and the payload section of the file is absent.
pub trait EdgeValue:
    Copy + Default + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// On-disk width in bytes.
    const WIDTH: u64;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(&self, out: &mut Vec<u8>);
}

impl EdgeValue for () {
    const WIDTH: u64 = 0;

    fn read_le(_bytes: &[u8]) -> Self {}
    fn write_le(&self, _out: &mut Vec<u8>) {}
}

impl EdgeValue for u32 {
    const WIDTH: u64 = 4;

    fn read_le(bytes: &[u8]) -> Self {
        u32::from_le_bytes(bytes[..4].try_into().expect("4-byte payload"))
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl EdgeValue for u64 {
    const WIDTH: u64 = 8;

    fn read_le(bytes: &[u8]) -> Self {
        u64::from_le_bytes(bytes[..8].try_into().expect("8-byte payload"))
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

fn read_u64<R: Read>(reader: &mut R) -> anyhow::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Header plus out-index of a graph file; edges stay on disk.
///
/// The file is a little-endian compressed sparse row image:
/// magic, version, payload width, node count, edge count, one exclusive end
/// offset per node, one destination id per edge, then the raw payload words
/// when the payload width is non-zero.
pub struct OfflineGraph {
    num_nodes: u64,
    num_edges: u64,
    payload_width: u64,
    /// Exclusive end offset of every node's edge range.
    out_idx: Vec<u64>,
}

impl OfflineGraph {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening graph file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let magic = read_u64(&mut reader)?;
        if magic != MAGIC {
            bail!("{} is not a graph file (bad magic {magic:#x})", path.display());
        }
        let version = read_u64(&mut reader)?;
        if version != VERSION {
            bail!("unsupported graph file version {version}");
        }
        let payload_width = read_u64(&mut reader)?;
        let num_nodes = read_u64(&mut reader)?;
        let num_edges = read_u64(&mut reader)?;

        let mut out_idx = vec![0u64; num_nodes as usize];
        let mut raw = vec![0u8; num_nodes as usize * 8];
        reader.read_exact(&mut raw)?;
        for (slot, chunk) in out_idx.iter_mut().zip(raw.chunks_exact(8)) {
            *slot = u64::from_le_bytes(chunk.try_into().expect("8-byte offset"));
        }
        if let Some(&last) = out_idx.last() {
            if last != num_edges {
                bail!("graph file out-index ends at {last}, expected {num_edges}");
            }
        }

        Ok(Self {
            num_nodes,
            num_edges,
            payload_width,
            out_idx,
        })
    }

    pub fn size(&self) -> u64 {
        self.num_nodes
    }

    pub fn size_edges(&self) -> u64 {
        self.num_edges
    }

    pub fn payload_width(&self) -> u64 {
        self.payload_width
    }

    /// First edge id of `gid`. `gid == size()` yields the total edge count,
    /// so `edge_begin` of a block's past-the-end node closes its edge window.
    pub fn edge_begin(&self, gid: u64) -> u64 {
        assert!(gid <= self.num_nodes);
        if gid == 0 {
            0
        } else {
            self.out_idx[gid as usize - 1]
        }
    }

    pub fn edge_end(&self, gid: u64) -> u64 {
        assert!(gid < self.num_nodes);
        self.out_idx[gid as usize]
    }
}

/// In-memory window of a graph file covering one host's read block.
///
/// Holds the out-index slice for `[first_gid, last_gid)` and the destination
/// and payload arrays for `[first_edge, last_edge)`. All accessors take
/// global ids; byte counters feed the edge-loading throughput log line.
pub struct BufferedGraph<W> {
    first_gid: u64,
    last_gid: u64,
    first_edge: u64,
    /// Global exclusive end offsets for the nodes in the window.
    out_idx: Vec<u64>,
    dsts: Vec<u64>,
    payload: Vec<W>,
    bytes_read: AtomicU64,
}

impl<W: EdgeValue> BufferedGraph<W> {
    /// Read exactly the slice of the file this host needs.
    #[allow(clippy::too_many_arguments)]
    pub fn load_partial<P: AsRef<Path>>(
        path: P,
        first_gid: u64,
        last_gid: u64,
        first_edge: u64,
        last_edge: u64,
        num_global_nodes: u64,
        num_global_edges: u64,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening graph file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let payload_width = {
            reader.seek(SeekFrom::Start(16))?;
            read_u64(&mut reader)?
        };
        if payload_width != W::WIDTH {
            bail!(
                "graph file carries {payload_width}-byte edge payloads, loader expects {}",
                W::WIDTH
            );
        }

        let num_read = (last_gid - first_gid) as usize;
        let mut out_idx = vec![0u64; num_read];
        reader.seek(SeekFrom::Start(HEADER_LEN + first_gid * 8))?;
        let mut raw = vec![0u8; num_read * 8];
        reader.read_exact(&mut raw)?;
        for (slot, chunk) in out_idx.iter_mut().zip(raw.chunks_exact(8)) {
            *slot = u64::from_le_bytes(chunk.try_into().expect("8-byte offset"));
        }

        let num_window = (last_edge - first_edge) as usize;
        let dst_base = HEADER_LEN + num_global_nodes * 8;
        reader.seek(SeekFrom::Start(dst_base + first_edge * 8))?;
        let mut raw = vec![0u8; num_window * 8];
        reader.read_exact(&mut raw)?;
        let mut dsts = vec![0u64; num_window];
        for (slot, chunk) in dsts.iter_mut().zip(raw.chunks_exact(8)) {
            *slot = u64::from_le_bytes(chunk.try_into().expect("8-byte destination"));
        }

        let mut payload = vec![W::default(); num_window];
        if W::WIDTH > 0 {
            let payload_base = dst_base + num_global_edges * 8;
            reader.seek(SeekFrom::Start(payload_base + first_edge * W::WIDTH))?;
            let mut raw = vec![0u8; num_window * W::WIDTH as usize];
            reader.read_exact(&mut raw)?;
            for (slot, chunk) in payload
                .iter_mut()
                .zip(raw.chunks_exact(W::WIDTH as usize))
            {
                *slot = W::read_le(chunk);
            }
        }

        Ok(Self {
            first_gid,
            last_gid,
            first_edge,
            out_idx,
            dsts,
            payload,
            bytes_read: AtomicU64::new(0),
        })
    }

    /// First global edge id of `gid`; must lie inside the loaded window.
    pub fn edge_begin(&self, gid: u64) -> u64 {
        assert!(gid >= self.first_gid && gid < self.last_gid);
        if gid == self.first_gid {
            self.first_edge
        } else {
            self.out_idx[(gid - self.first_gid) as usize - 1]
        }
    }

    pub fn edge_end(&self, gid: u64) -> u64 {
        assert!(gid >= self.first_gid && gid < self.last_gid);
        self.out_idx[(gid - self.first_gid) as usize]
    }

    pub fn degree(&self, gid: u64) -> u64 {
        self.edge_end(gid) - self.edge_begin(gid)
    }

    /// Destination of global edge id `edge`.
    pub fn edge_destination(&self, edge: u64) -> u64 {
        self.bytes_read.fetch_add(8, Ordering::Relaxed);
        self.dsts[(edge - self.first_edge) as usize]
    }

    pub fn edge_data(&self, edge: u64) -> W {
        self.bytes_read.fetch_add(W::WIDTH, Ordering::Relaxed);
        self.payload[(edge - self.first_edge) as usize]
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn reset_read_counters(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
    }
}

/// Write a graph file from a global edge list. Sources may repeat but must be
/// grouped in ascending order; this is the same image [`OfflineGraph`] and
/// [`BufferedGraph`] read back.
pub fn write_graph_file<P: AsRef<Path>, W: EdgeValue>(
    path: P,
    num_nodes: u64,
    edges: &[(u64, u64, W)],
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("creating graph file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for window in edges.windows(2) {
        assert!(window[0].0 <= window[1].0, "edge list not grouped by source");
    }

    writer.write_all(&MAGIC.to_le_bytes())?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&W::WIDTH.to_le_bytes())?;
    writer.write_all(&num_nodes.to_le_bytes())?;
    writer.write_all(&(edges.len() as u64).to_le_bytes())?;

    let mut degrees = vec![0u64; num_nodes as usize];
    for &(src, _, _) in edges {
        degrees[src as usize] += 1;
    }
    let mut end = 0u64;
    for &degree in &degrees {
        end += degree;
        writer.write_all(&end.to_le_bytes())?;
    }

    for &(_, dst, _) in edges {
        writer.write_all(&dst.to_le_bytes())?;
    }
    if W::WIDTH > 0 {
        let mut raw = Vec::with_capacity(edges.len() * W::WIDTH as usize);
        for (_, _, value) in edges {
            value.write_le(&mut raw);
        }
        writer.write_all(&raw)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_edges() -> Vec<(u64, u64, u32)> {
        vec![(0, 1, 5), (0, 2, 7), (1, 2, 3), (2, 0, 2)]
    }

    #[test]
    fn test_offline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.dgr");
        write_graph_file(&path, 3, &toy_edges()).unwrap();

        let graph = OfflineGraph::open(&path).unwrap();
        assert_eq!(graph.size(), 3);
        assert_eq!(graph.size_edges(), 4);
        assert_eq!(graph.payload_width(), 4);
        assert_eq!(graph.edge_begin(0), 0);
        assert_eq!(graph.edge_end(0), 2);
        assert_eq!(graph.edge_begin(1), 2);
        assert_eq!(graph.edge_end(2), 4);
        assert_eq!(graph.edge_begin(3), 4);
    }

    #[test]
    fn test_partial_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.dgr");
        write_graph_file(&path, 3, &toy_edges()).unwrap();

        // window covering only node 2's edges
        let graph = BufferedGraph::<u32>::load_partial(&path, 2, 3, 3, 4, 3, 4).unwrap();
        assert_eq!(graph.edge_begin(2), 3);
        assert_eq!(graph.edge_end(2), 4);
        assert_eq!(graph.degree(2), 1);
        assert_eq!(graph.edge_destination(3), 0);
        assert_eq!(graph.edge_data(3), 2);
        assert_eq!(graph.bytes_read(), 12);
    }

    #[test]
    fn test_full_window_no_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.dgr");
        let edges: Vec<(u64, u64, ())> = vec![(0, 1, ()), (1, 0, ())];
        write_graph_file(&path, 2, &edges).unwrap();

        let graph = BufferedGraph::<()>::load_partial(&path, 0, 2, 0, 2, 2, 2).unwrap();
        assert_eq!(graph.edge_destination(0), 1);
        assert_eq!(graph.edge_destination(1), 0);
    }

    #[test]
    fn test_payload_width_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weighted.dgr");
        write_graph_file(&path, 3, &toy_edges()).unwrap();
        assert!(BufferedGraph::<u64>::load_partial(&path, 0, 3, 0, 4, 3, 4).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, b"definitely not a graph file").unwrap();
        assert!(OfflineGraph::open(&path).is_err());
    }

    #[test]
    fn test_empty_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dgr");
        let edges: Vec<(u64, u64, ())> = Vec::new();
        write_graph_file(&path, 0, &edges).unwrap();

        let graph = OfflineGraph::open(&path).unwrap();
        assert_eq!(graph.size(), 0);
        assert_eq!(graph.size_edges(), 0);
        assert_eq!(graph.edge_begin(0), 0);
    }
}
