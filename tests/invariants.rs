use std::collections::BTreeSet;
use std::path::Path;

use distributed_partition::{
    write_graph_file, DistGraph, LocalTransport, ModuloPolicy, Partition, PartitionConfig,
    SyncType,
};

const NUM_NODES: u64 = 10;

fn sample_edges() -> Vec<(u64, u64, u32)> {
    vec![
        (0, 3, 1),
        (0, 7, 2),
        (1, 1, 3), // self-loop
        (1, 4, 4),
        (2, 0, 5),
        (2, 9, 6),
        (3, 5, 7),
        (4, 2, 8),
        (4, 8, 9),
        (5, 0, 10),
        (6, 6, 11),
        (7, 2, 12),
        (8, 1, 13),
        (9, 4, 14),
    ]
}

fn load_all(path: &Path, num_hosts: u32) -> Vec<DistGraph<u32, ModuloPolicy>> {
    let universe = LocalTransport::universe(num_hosts);
    let config = PartitionConfig::new(path);

    std::thread::scope(|scope| {
        let handles: Vec<_> = universe
            .into_iter()
            .map(|net| {
                let config = config.clone();
                scope.spawn(move || {
                    DistGraph::load(&config, ModuloPolicy::default(), &net).unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
}

fn modulo(num_hosts: u32) -> ModuloPolicy {
    let mut policy = ModuloPolicy::default();
    policy.init(num_hosts, NUM_NODES, 0);
    policy
}

#[test]
fn test_quantified_invariants_three_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.dgr");
    write_graph_file(&path, NUM_NODES, &sample_edges()).unwrap();

    let num_hosts = 3;
    let graphs = load_all(&path, num_hosts);
    let policy = modulo(num_hosts);

    for (host, graph) in graphs.iter().enumerate() {
        let host = host as u32;

        // local and global ids round-trip
        for lid in 0..graph.num_nodes() {
            assert_eq!(graph.g2l(graph.l2g(lid)), lid);
        }

        // the prefix sum is a non-decreasing cover of all local edges
        let mut previous = 0;
        for lid in 0..graph.num_nodes() {
            assert_eq!(graph.edge_begin(lid), previous);
            assert!(graph.edge_end(lid) >= previous);
            previous = graph.edge_end(lid);
        }
        assert_eq!(previous, graph.num_edges());

        // masters occupy exactly the owned range
        for lid in 0..graph.num_owned() {
            assert_eq!(policy.master(graph.l2g(lid)), host);
        }
        for lid in graph.num_owned()..graph.num_nodes() {
            assert_ne!(policy.master(graph.l2g(lid)), host);
        }

        // incoming-only mirrors carry no edges
        for lid in graph.num_nodes_with_edges()..graph.num_nodes() {
            assert_eq!(graph.degree(lid), 0);
        }

        // mirrors are grouped under their actual master
        for (peer, mirrors) in graph.mirror_nodes().iter().enumerate() {
            for &gid in mirrors {
                assert_eq!(policy.master(gid), peer as u32);
                assert!(graph.is_local(gid));
                assert!(!graph.is_owned(gid));
            }
        }
    }

    // ownership and edges tile the global graph exactly
    let owned_total: u32 = graphs.iter().map(|g| g.num_owned()).sum();
    assert_eq!(owned_total as u64, NUM_NODES);
    let edge_total: u64 = graphs.iter().map(|g| g.num_edges()).sum();
    assert_eq!(edge_total, sample_edges().len() as u64);

    let mut seen = Vec::new();
    for (host, graph) in graphs.iter().enumerate() {
        for lid in 0..graph.num_nodes() {
            let src = graph.l2g(lid);
            for edge in graph.edges(lid) {
                let dst = graph.l2g(graph.edge_dst(edge));
                assert_eq!(policy.edge(src, dst, 0).0, host as u32);
                seen.push((src, dst, graph.edge_data(edge)));
            }
        }
    }
    seen.sort_unstable();
    let mut expected = sample_edges();
    expected.sort_unstable();
    assert_eq!(seen, expected);

    // a gid is resident exactly on its master plus the owners of its edges
    for gid in 0..NUM_NODES {
        let mut expected: BTreeSet<u32> = BTreeSet::new();
        expected.insert(policy.master(gid));
        for &(src, dst, _) in &sample_edges() {
            if src == gid || dst == gid {
                expected.insert(policy.edge(src, dst, 0).0);
            }
        }
        let resident: BTreeSet<u32> = graphs
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_local(gid))
            .map(|(host, _)| host as u32)
            .collect();
        assert_eq!(resident, expected, "residency of gid {gid}");
    }
}

#[test]
fn test_deterministic_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.dgr");
    write_graph_file(&path, NUM_NODES, &sample_edges()).unwrap();

    let first = load_all(&path, 3);
    let second = load_all(&path, 3);

    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.num_nodes(), b.num_nodes());
        assert_eq!(a.num_edges(), b.num_edges());
        for lid in 0..a.num_nodes() {
            assert_eq!(a.l2g(lid), b.l2g(lid));
            assert_eq!(a.edges(lid), b.edges(lid));
        }
        for edge in 0..a.num_edges() {
            assert_eq!(a.edge_dst(edge), b.edge_dst(edge));
            assert_eq!(a.edge_data(edge), b.edge_data(edge));
        }
        assert_eq!(a.mirror_nodes(), b.mirror_nodes());
    }
}

#[test]
fn test_empty_reader_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.dgr");
    // two nodes over three hosts leaves host 2 with nothing to read
    write_graph_file(&path, 2, &[(0u64, 1u64, 1u32)]).unwrap();

    let universe = LocalTransport::universe(3);
    let config = PartitionConfig::new(&path);
    let graphs: Vec<DistGraph<u32, ModuloPolicy>> = std::thread::scope(|scope| {
        let handles: Vec<_> = universe
            .into_iter()
            .map(|net| {
                let config = config.clone();
                scope.spawn(move || {
                    DistGraph::load(&config, ModuloPolicy::default(), &net).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let host2 = &graphs[2];
    assert_eq!(host2.num_nodes(), 0);
    assert_eq!(host2.num_owned(), 0);
    assert_eq!(host2.num_edges(), 0);

    let mut calls = Vec::new();
    host2.reset_bitset(SyncType::Reduce, |a, b| calls.push((a, b)));
    assert!(calls.is_empty());

    // the edge still ends up where the policy says
    assert_eq!(graphs[0].num_edges(), 1);
    assert_eq!(graphs[0].edge_dst(0), graphs[0].g2l(1));
}

#[test]
fn test_empty_global_graph_multi_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.dgr");
    let edges: Vec<(u64, u64, u32)> = Vec::new();
    write_graph_file(&path, 0, &edges).unwrap();

    for graph in load_all(&path, 3) {
        assert_eq!(graph.num_nodes(), 0);
        assert_eq!(graph.num_edges(), 0);
        assert!(graph.mirror_nodes().iter().all(|m| m.is_empty()));
    }
}
