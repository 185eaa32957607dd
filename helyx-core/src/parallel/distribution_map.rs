use super::comm::Communicator;
use super::util::{decode, encode};
use crate::error::{HelyxCoreError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Moves entity-indexed data between ranks after a repartitioning decision.
///
/// `sub_map[p]` lists the local entries sent to rank `p`; `construct_map[p]`
/// lists the slots of the new local field filled with what rank `p` sends.
/// `construct_size` is the local size after distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionMap {
    construct_size: usize,
    sub_map: Vec<Vec<usize>>,
    construct_map: Vec<Vec<usize>>,
}

impl DistributionMap {
    pub fn new(
        construct_size: usize,
        sub_map: Vec<Vec<usize>>,
        construct_map: Vec<Vec<usize>>,
    ) -> Result<Self> {
        if sub_map.len() != construct_map.len() {
            return Err(HelyxCoreError::InvalidAddressing(format!(
                "sub map covers {} ranks, construct map {}",
                sub_map.len(),
                construct_map.len()
            )));
        }
        let mut filled = vec![false; construct_size];
        for slots in &construct_map {
            for &slot in slots {
                match filled.get_mut(slot) {
                    Some(seen) if !*seen => *seen = true,
                    Some(_) => {
                        return Err(HelyxCoreError::InvalidAddressing(format!(
                            "construct slot {} filled twice",
                            slot
                        )))
                    }
                    None => {
                        return Err(HelyxCoreError::InvalidAddressing(format!(
                            "construct slot {} outside 0..{}",
                            slot, construct_size
                        )))
                    }
                }
            }
        }
        Ok(Self {
            construct_size,
            sub_map,
            construct_map,
        })
    }

    /// Every entry stays where it is.
    pub fn identity(n: usize, rank: usize, n_ranks: usize) -> Self {
        let mut sub_map = vec![Vec::new(); n_ranks];
        let mut construct_map = vec![Vec::new(); n_ranks];
        sub_map[rank] = (0..n).collect();
        construct_map[rank] = (0..n).collect();
        Self {
            construct_size: n,
            sub_map,
            construct_map,
        }
    }

    /// Builds the map from the destination rank of every local entry.
    /// Received entries are placed in source-rank order, and in local order
    /// within one source. Collective.
    pub fn from_destinations<C: Communicator>(destinations: &[usize], comm: &C) -> Result<Self> {
        let n_ranks = comm.size();
        let mut sub_map = vec![Vec::new(); n_ranks];
        for (i, &dest) in destinations.iter().enumerate() {
            if dest >= n_ranks {
                return Err(HelyxCoreError::InvalidAddressing(format!(
                    "entry {} sent to rank {} of {}",
                    i, dest, n_ranks
                )));
            }
            sub_map[dest].push(i);
        }

        let counts: Vec<usize> = sub_map.iter().map(Vec::len).collect();
        let all_counts: Vec<Vec<usize>> = comm.all_gather_list(&counts)?;

        let mut construct_map = Vec::with_capacity(n_ranks);
        let mut construct_size = 0;
        for source_counts in &all_counts {
            let n = source_counts[comm.rank()];
            construct_map.push((construct_size..construct_size + n).collect());
            construct_size += n;
        }
        Self::new(construct_size, sub_map, construct_map)
    }

    pub fn construct_size(&self) -> usize {
        self.construct_size
    }

    pub fn sub_map(&self) -> &[Vec<usize>] {
        &self.sub_map
    }

    pub fn construct_map(&self) -> &[Vec<usize>] {
        &self.construct_map
    }

    /// Replaces `field` with its redistributed content. Collective.
    pub fn distribute<T, C>(&self, comm: &C, field: &mut Vec<T>) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Clone,
        C: Communicator,
    {
        let rank = comm.rank();
        if self.sub_map.len() != comm.size() {
            return Err(HelyxCoreError::Communication(format!(
                "distribution map built for {} ranks used on {}",
                self.sub_map.len(),
                comm.size()
            )));
        }

        // every index is checked before the first send
        if let Some(&i) = self.sub_map.iter().flatten().find(|&&i| i >= field.len()) {
            return Err(HelyxCoreError::InvalidAddressing(format!(
                "sub map entry {} outside field of size {}",
                i,
                field.len()
            )));
        }
        if self.sub_map[rank].len() != self.construct_map[rank].len() {
            return Err(HelyxCoreError::InvalidAddressing(format!(
                "rank {} keeps {} entries but has {} slots for them",
                rank,
                self.sub_map[rank].len(),
                self.construct_map[rank].len()
            )));
        }

        for (proc, indices) in self.sub_map.iter().enumerate() {
            if proc == rank {
                continue;
            }
            let outgoing: Vec<&T> = indices.iter().map(|&i| &field[i]).collect();
            comm.send(proc, encode(&outgoing)?);
        }

        let mut constructed: Vec<Option<T>> = vec![None; self.construct_size];
        for (&i, &slot) in self.sub_map[rank].iter().zip(&self.construct_map[rank]) {
            constructed[slot] = Some(field[i].clone());
        }

        for (proc, slots) in self.construct_map.iter().enumerate() {
            if proc == rank {
                continue;
            }
            let incoming: Vec<T> = decode(&comm.recv_from(proc))?;
            if incoming.len() != slots.len() {
                return Err(HelyxCoreError::Communication(format!(
                    "rank {} sent {} entries, expected {}",
                    proc,
                    incoming.len(),
                    slots.len()
                )));
            }
            for (&slot, value) in slots.iter().zip(incoming) {
                constructed[slot] = Some(value);
            }
        }

        *field = constructed
            .into_iter()
            .enumerate()
            .map(|(slot, value)| {
                value.ok_or_else(|| {
                    HelyxCoreError::InvalidAddressing(format!("slot {} never filled", slot))
                })
            })
            .collect::<Result<_>>()?;
        Ok(())
    }
}
