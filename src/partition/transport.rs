use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Tagged, per-peer, in-order delivery of opaque byte buffers.
///
/// The partitioner runs two back-to-back all-to-all exchanges whose messages
/// would be indistinguishable on a stateless transport, so every message is
/// tagged with the current phase and each host bumps its phase counter at the
/// same protocol points. `recv_tagged` must only surface messages whose phase
/// matches; traffic from a later phase stays queued. Delivery is FIFO per
/// `(sender, receiver, phase)`.
pub trait Transport: Send + Sync {
    /// This host's id.
    fn id(&self) -> u32;

    /// Number of hosts in the job.
    fn num_hosts(&self) -> u32;

    fn send_tagged(&self, peer: u32, phase: u32, buf: Vec<u8>);

    /// Non-blocking receive of any message tagged `phase`.
    fn recv_tagged(&self, phase: u32) -> Option<(u32, Vec<u8>)>;

    /// Push out any locally buffered sends.
    fn flush(&self);

    fn phase(&self) -> u32;

    fn increment_phase(&self);
}

#[derive(Default)]
struct Mailbox {
    // (sender, phase, payload)
    queue: Mutex<VecDeque<(u32, u32, Vec<u8>)>>,
}

/// In-process transport: every host is a thread, mailboxes are shared memory.
///
/// Backs the test suite and the single-host driver. Sends are immediate, so
/// `flush` has nothing to do.
pub struct LocalTransport {
    id: u32,
    mailboxes: Arc<Vec<Mailbox>>,
    phase: AtomicU32,
}

impl LocalTransport {
    /// Create `num_hosts` connected endpoints, one per simulated host.
    pub fn universe(num_hosts: u32) -> Vec<LocalTransport> {
        let mailboxes = Arc::new(
            (0..num_hosts)
                .map(|_| Mailbox::default())
                .collect::<Vec<_>>(),
        );
        (0..num_hosts)
            .map(|id| LocalTransport {
                id,
                mailboxes: Arc::clone(&mailboxes),
                phase: AtomicU32::new(0),
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn id(&self) -> u32 {
        self.id
    }

    fn num_hosts(&self) -> u32 {
        self.mailboxes.len() as u32
    }

    fn send_tagged(&self, peer: u32, phase: u32, buf: Vec<u8>) {
        self.mailboxes[peer as usize]
            .queue
            .lock()
            .push_back((self.id, phase, buf));
    }

    fn recv_tagged(&self, phase: u32) -> Option<(u32, Vec<u8>)> {
        let mut queue = self.mailboxes[self.id as usize].queue.lock();
        // first match keeps per-sender FIFO within the phase
        let at = queue.iter().position(|&(_, p, _)| p == phase)?;
        let (sender, _, buf) = queue.remove(at)?;
        Some((sender, buf))
    }

    fn flush(&self) {}

    fn phase(&self) -> u32 {
        self.phase.load(Ordering::Relaxed)
    }

    fn increment_phase(&self) {
        self.phase.fetch_add(1, Ordering::Relaxed);
    }
}

/// MPI-backed transport; each host is one rank and the phase rides in the
/// message tag. Requires a system MPI, hence the `mpi` cargo feature.
#[cfg(feature = "mpi")]
pub struct MpiTransport {
    world: mpi::topology::SimpleCommunicator,
    phase: AtomicU32,
}

#[cfg(feature = "mpi")]
impl MpiTransport {
    pub fn new(world: mpi::topology::SimpleCommunicator) -> Self {
        Self {
            world,
            phase: AtomicU32::new(0),
        }
    }
}

#[cfg(feature = "mpi")]
impl Transport for MpiTransport {
    fn id(&self) -> u32 {
        use mpi::traits::Communicator;
        self.world.rank() as u32
    }

    fn num_hosts(&self) -> u32 {
        use mpi::traits::Communicator;
        self.world.size() as u32
    }

    fn send_tagged(&self, peer: u32, phase: u32, buf: Vec<u8>) {
        use mpi::traits::{Communicator, Destination};
        // buffered send: completes locally against the attached buffer, so an
        // all-to-all burst cannot rendezvous-deadlock
        self.world
            .process_at_rank(peer as i32)
            .buffered_send_with_tag(&buf[..], phase as i32);
    }

    fn recv_tagged(&self, phase: u32) -> Option<(u32, Vec<u8>)> {
        use mpi::point_to_point::Message;
        use mpi::traits::{Communicator, Source};
        let (message, status): (Message, _) = self
            .world
            .any_process()
            .immediate_matched_probe_with_tag(phase as i32)?;
        let (buf, _) = message.matched_receive_vec::<u8>();
        Some((status.source_rank() as u32, buf))
    }

    fn flush(&self) {
        // buffered sends already completed locally
    }

    fn phase(&self) -> u32 {
        self.phase.load(Ordering::Relaxed)
    }

    fn increment_phase(&self) {
        self.phase.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_delivery() {
        let universe = LocalTransport::universe(2);
        universe[0].send_tagged(1, 0, vec![1, 2, 3]);
        assert_eq!(universe[1].recv_tagged(0), Some((0, vec![1, 2, 3])));
        assert_eq!(universe[1].recv_tagged(0), None);
    }

    #[test]
    fn test_phase_isolation() {
        let universe = LocalTransport::universe(2);
        universe[0].send_tagged(1, 1, vec![9]);
        universe[0].send_tagged(1, 0, vec![7]);

        // phase 0 only sees the phase-0 message even though phase-1 traffic
        // arrived first
        assert_eq!(universe[1].recv_tagged(0), Some((0, vec![7])));
        assert_eq!(universe[1].recv_tagged(0), None);
        assert_eq!(universe[1].recv_tagged(1), Some((0, vec![9])));
    }

    #[test]
    fn test_fifo_per_sender_within_phase() {
        let universe = LocalTransport::universe(2);
        universe[0].send_tagged(1, 0, vec![1]);
        universe[0].send_tagged(1, 0, vec![2]);
        assert_eq!(universe[1].recv_tagged(0), Some((0, vec![1])));
        assert_eq!(universe[1].recv_tagged(0), Some((0, vec![2])));
    }

    #[test]
    fn test_self_send() {
        let universe = LocalTransport::universe(1);
        universe[0].send_tagged(0, 0, vec![42]);
        assert_eq!(universe[0].recv_tagged(0), Some((0, vec![42])));
    }

    #[test]
    fn test_phase_counter() {
        let universe = LocalTransport::universe(1);
        assert_eq!(universe[0].phase(), 0);
        universe[0].increment_phase();
        universe[0].increment_phase();
        assert_eq!(universe[0].phase(), 2);
    }
}
