use distributed_partition::{
    init_local, BlockSourcePolicy, DistGraph, OfflineGraph, PartitionConfig,
};

use anyhow::bail;

fn run<W: distributed_partition::EdgeValue>(config: &PartitionConfig) -> anyhow::Result<()> {
    let net = init_local(1)
        .pop()
        .expect("universe of one host");
    let graph: DistGraph<W, BlockSourcePolicy> =
        DistGraph::load(config, BlockSourcePolicy::default(), &net)?;

    println!(
        "{} nodes ({} owned, {} with edges), {} edges, transposed: {}",
        graph.num_nodes(),
        graph.num_owned(),
        graph.num_nodes_with_edges(),
        graph.num_edges(),
        graph.is_transposed()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(filename) = args.next() else {
        bail!("usage: distributed-partition <graph file> [--transpose]");
    };
    let mut config = PartitionConfig::new(&filename);
    for flag in args {
        match flag.as_str() {
            "--transpose" => config.transpose = true,
            "--more-stats" => config.more_stats = true,
            other => bail!("unrecognized flag {other}"),
        }
    }

    match OfflineGraph::open(&filename)?.payload_width() {
        0 => run::<()>(&config),
        4 => run::<u32>(&config),
        8 => run::<u64>(&config),
        width => bail!("no loader for {width}-byte edge payloads"),
    }
}
