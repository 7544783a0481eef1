mod partition;
pub use partition::*;

mod logger;
pub use logger::set_log_level;

/// Initializes logging plus an in-process universe of `num_hosts` connected
/// transports. Hosts built on these endpoints run as threads of one process.
pub fn init_local(num_hosts: u32) -> Vec<LocalTransport> {
    logger::init(0);
    LocalTransport::universe(num_hosts)
}

/// Initializes MPI and logging; one host per rank. The universe must stay
/// alive for as long as the transport is in use.
#[cfg(feature = "mpi")]
pub fn init() -> anyhow::Result<(mpi::environment::Universe, MpiTransport)> {
    use mpi::traits::Communicator;

    let universe = mpi::initialize().ok_or(anyhow::anyhow!("MPI Not Initialized"))?;
    let world = universe.world();

    logger::init(world.rank() as u32);

    Ok((universe, MpiTransport::new(world)))
}
