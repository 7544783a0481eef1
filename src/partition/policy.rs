use super::reader_assignment;

/// Partitioning policy: the one plug-in point of the loader.
///
/// `master` must be total, deterministic, and identical on every host; the
/// node-mapping passes on different hosts evaluate it independently and must
/// arrive at the same answer. `edge` decides which host owns an edge and also
/// reports whether that host is the destination's master, so the inspector
/// never pays a second `master` lookup per edge and an owner that masters the
/// destination contributes no incoming-mirror bit.
pub trait Partition: Send + Sync {
    /// One-time setup before any `master`/`edge` query.
    fn init(&mut self, num_hosts: u32, num_global_nodes: u64, num_global_edges: u64);

    /// Host holding the authoritative copy of `gid`.
    fn master(&self, gid: u64) -> u32;

    /// `(owning host, owning host == master(dst))` for edge `src -> dst`.
    fn edge(&self, src: u64, dst: u64, src_degree: u64) -> (u32, bool);
}

/// Masters assigned round-robin by id; every edge lives with its source's
/// master. The simplest total policy, mostly useful for drivers and tests.
#[derive(Debug, Default)]
pub struct ModuloPolicy {
    num_hosts: u32,
}

impl Partition for ModuloPolicy {
    fn init(&mut self, num_hosts: u32, _num_global_nodes: u64, _num_global_edges: u64) {
        self.num_hosts = num_hosts;
    }

    fn master(&self, gid: u64) -> u32 {
        (gid % self.num_hosts as u64) as u32
    }

    fn edge(&self, src: u64, dst: u64, _src_degree: u64) -> (u32, bool) {
        let owner = self.master(src);
        (owner, owner == self.master(dst))
    }
}

/// Masters follow the reader assignment: the host that reads a block of ids
/// also masters it, and every edge lives with its source's master. Keeps all
/// of a host's masters contiguous in id space.
#[derive(Debug, Default)]
pub struct BlockSourcePolicy {
    blocks: Vec<(u64, u64)>,
}

impl Partition for BlockSourcePolicy {
    fn init(&mut self, num_hosts: u32, num_global_nodes: u64, _num_global_edges: u64) {
        self.blocks = reader_assignment(num_hosts as usize, num_global_nodes);
    }

    fn master(&self, gid: u64) -> u32 {
        debug_assert!(!self.blocks.is_empty());
        // blocks are sorted and disjoint; find the one containing gid
        self.blocks.partition_point(|&(_, last)| last <= gid) as u32
    }

    fn edge(&self, src: u64, dst: u64, _src_degree: u64) -> (u32, bool) {
        let owner = self.master(src);
        (owner, owner == self.master(dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulo_masters() {
        let mut policy = ModuloPolicy::default();
        policy.init(3, 10, 0);
        assert_eq!(policy.master(0), 0);
        assert_eq!(policy.master(4), 1);
        assert_eq!(policy.master(5), 2);
    }

    #[test]
    fn test_modulo_edge_flag() {
        let mut policy = ModuloPolicy::default();
        policy.init(2, 10, 0);
        // 0 -> 2: both masters are host 0
        assert_eq!(policy.edge(0, 2, 1), (0, true));
        // 0 -> 1: owner 0, but host 1 masters the destination
        assert_eq!(policy.edge(0, 1, 1), (0, false));
    }

    #[test]
    fn test_block_masters_follow_reader_blocks() {
        let mut policy = BlockSourcePolicy::default();
        policy.init(3, 10, 0);
        // blocks: [0,4) [4,7) [7,10)
        assert_eq!(policy.master(0), 0);
        assert_eq!(policy.master(3), 0);
        assert_eq!(policy.master(4), 1);
        assert_eq!(policy.master(6), 1);
        assert_eq!(policy.master(7), 2);
        assert_eq!(policy.master(9), 2);
    }

    #[test]
    fn test_block_edge_owner_is_source_master() {
        let mut policy = BlockSourcePolicy::default();
        policy.init(2, 10, 0);
        let (owner, is_master) = policy.edge(1, 9, 4);
        assert_eq!(owner, 0);
        assert!(!is_master);
        let (owner, is_master) = policy.edge(1, 3, 4);
        assert_eq!(owner, 0);
        assert!(is_master);
    }
}
