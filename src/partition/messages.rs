use std::io::Cursor;

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::bitset::DynamicBitset;

/// Inspection exchange payload; exactly one of these goes to every peer.
///
/// Both sections ride in the same buffer so the receive loop can count one
/// message per peer and be done.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InspectionMsg {
    pub outgoing: OutgoingCounts,
    pub incoming: IncomingMirrors,
}

/// Outgoing-edge counts section. The variant index is the on-wire tag:
/// 0 = this sender has no edges for the peer, 1 = one count per id the
/// sender read.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum OutgoingCounts {
    None,
    Counts(Vec<u64>),
}

/// Incoming-mirror section, encoded by density. Tag 0 = nothing to say,
/// 1 = raw bitset words, 2 = list of set-bit offsets.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum IncomingMirrors {
    None,
    Dense { num_bits: u64, words: Vec<u64> },
    Sparse(Vec<u32>),
}

impl IncomingMirrors {
    /// Pick the smaller encoding: a 32-bit offset per set bit, unless the
    /// offsets would outweigh the raw words.
    pub fn from_bitset(bits: &DynamicBitset) -> Self {
        let num_bits = bits.len() as u64;
        if num_bits == 0 {
            return IncomingMirrors::None;
        }
        let count = bits.count() as u64;
        if count * 4 > num_bits {
            IncomingMirrors::Dense {
                num_bits,
                words: bits.words(),
            }
        } else {
            IncomingMirrors::Sparse(bits.offsets())
        }
    }

    /// OR-merge this section into the receiver's accumulated bitset.
    pub fn merge_into(self, acc: &mut DynamicBitset) -> anyhow::Result<()> {
        match self {
            IncomingMirrors::None => {}
            IncomingMirrors::Dense { num_bits, words } => {
                if num_bits as usize != acc.len() {
                    bail!(
                        "incoming bitset sized {num_bits}, expected {}",
                        acc.len()
                    );
                }
                acc.union_words(&words);
            }
            IncomingMirrors::Sparse(offsets) => {
                for offset in offsets {
                    acc.set(offset as usize);
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn encode_inspection(msg: &InspectionMsg) -> anyhow::Result<Vec<u8>> {
    bincode::serialize(msg).context("encoding inspection message")
}

pub(crate) fn decode_inspection(buf: &[u8]) -> anyhow::Result<InspectionMsg> {
    let mut cursor = Cursor::new(buf);
    let msg = bincode::deserialize_from(&mut cursor)
        .context("malformed inspection message")?;
    if cursor.position() != buf.len() as u64 {
        bail!("trailing bytes after inspection message");
    }
    Ok(msg)
}

/// Append one `(src, destinations, payloads)` record to an edge-load buffer.
/// Several records may share a buffer; writing into memory cannot fail.
pub(crate) fn append_edge_record<W: Serialize>(
    buf: &mut Vec<u8>,
    src: u64,
    dsts: &[u64],
    payloads: &[W],
) {
    bincode::serialize_into(&mut *buf, &(src, dsts, payloads))
        .expect("edge record encoding into memory");
}

/// Decoder over a received edge-load buffer; yields records until the bytes
/// run out.
pub(crate) struct EdgeRecords<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> EdgeRecords<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn next<W: DeserializeOwned>(
        &mut self,
    ) -> anyhow::Result<Option<(u64, Vec<u64>, Vec<W>)>> {
        if self.cursor.position() == self.cursor.get_ref().len() as u64 {
            return Ok(None);
        }
        let record = bincode::deserialize_from(&mut self.cursor)
            .context("malformed edge record")?;
        Ok(Some(record))
    }
}
