mod bitset;
mod graph;
mod inspector;
mod messages;
mod policy;
mod reader;
mod transport;

pub use bitset::{DynamicBitset, LazyBitset};
pub use graph::{DistGraph, PartitionConfig, SyncType};
pub use policy::{BlockSourcePolicy, ModuloPolicy, Partition};
pub use reader::{write_graph_file, BufferedGraph, EdgeValue, OfflineGraph};
#[cfg(feature = "mpi")]
pub use transport::MpiTransport;
pub use transport::{LocalTransport, Transport};

// Helper functions

/// Given the number of hosts and the global node count, compute the half-open
/// block of global ids every host is responsible for reading from disk.
pub fn reader_assignment(num_hosts: usize, num_items: u64) -> Vec<(u64, u64)> {
    let mut blocks = Vec::with_capacity(num_hosts);
    blocks.resize(num_hosts, (0, 0));

    let per_host = num_items / num_hosts as u64;
    let leftover = num_items % num_hosts as u64;

    for (host, block) in blocks.iter_mut().enumerate() {
        let host = host as u64;
        let extra = if host < leftover { 1 } else { 0 };
        block.0 = host * per_host + std::cmp::min(host, leftover);
        block.1 = block.0 + per_host + extra;
    }

    blocks
}

/// Half-open subrange of `0..len` worked by thread `tid` out of `nthreads`.
/// Same quotient-plus-spread-remainder split as [`reader_assignment`], so a
/// counting pass and a placement pass over the same range always agree.
pub(crate) fn thread_range(len: usize, tid: usize, nthreads: usize) -> (usize, usize) {
    let per_thread = len / nthreads;
    let leftover = len % nthreads;
    let extra = if tid < leftover { 1 } else { 0 };
    let begin = tid * per_thread + std::cmp::min(tid, leftover);
    (begin, begin + per_thread + extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_assignment() {
        let blocks = reader_assignment(4, 100);
        assert_eq!(blocks, vec![(0, 25), (25, 50), (50, 75), (75, 100)]);
    }

    #[test]
    fn test_uneven_assignment() {
        let blocks = reader_assignment(3, 10);
        assert_eq!(blocks, vec![(0, 4), (4, 7), (7, 10)]);
    }

    #[test]
    fn test_zero_items() {
        let blocks = reader_assignment(5, 0);
        assert_eq!(blocks, vec![(0, 0), (0, 0), (0, 0), (0, 0), (0, 0)]);
    }

    #[test]
    fn test_thread_ranges_cover() {
        let nthreads = 7;
        let mut next = 0;
        for tid in 0..nthreads {
            let (begin, end) = thread_range(23, tid, nthreads);
            assert_eq!(begin, next);
            next = end;
        }
        assert_eq!(next, 23);
    }
}
