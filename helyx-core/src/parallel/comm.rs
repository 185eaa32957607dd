use super::util::{self, decode, encode};
use crate::error::{HelyxCoreError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Interface for a group of ranks that exchange messages. The transport can
/// be in-process channels (see `ThreadCommunicator`) or a network layer.
///
/// Every provided collective is blocking: all ranks of the group must enter
/// the same collectives in the same order.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of ranks in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Must be implemented to receive the next message sent by `rank`,
    /// blocking until one is available. Messages from one sender arrive in
    /// the order they were sent.
    fn recv_from(&self, rank: usize) -> Vec<u8>;

    fn is_master(&self) -> bool {
        self.rank() == 0
    }

    /// Implements a binomial tree broadcast from rank 0. The message buffer
    /// must be `Some` on the root; it is ignored elsewhere.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let r = self.rank();
        let p = self.size();

        let value = if r == 0 {
            value.ok_or_else(|| {
                HelyxCoreError::Communication("broadcast root has no value".to_string())
            })?
        } else {
            self.recv_from(r & (r - 1))
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send(r + one, value.clone())
            }
        }
        Ok(value)
    }

    /// Implements a binomial tree reduce towards rank 0. All ranks return
    /// `None` except for the root. The combination order is fixed by the tree,
    /// with the lower rank as left operand, so the result does not depend on
    /// message timing.
    ///
    fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Result<Option<Vec<u8>>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>>,
        Self: Sized,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv_from(r + one))?
                }
            } else {
                self.send(r - one, value);
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    /// Implements an all-reduce (symmetric fold) operation.
    ///
    fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Result<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>>,
        Self: Sized,
    {
        let reduced = self.reduce(f, value)?;
        self.broadcast(reduced)
    }

    /// Tree-combines typed values towards rank 0 with `op(lower, higher)`.
    /// Only the master's return value is meaningful; other ranks get their
    /// own contribution back.
    fn combine_gather<T, F>(&self, value: T, op: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(T, T) -> T,
        Self: Sized,
    {
        let combined = self.reduce(
            |a, b| {
                let a: T = decode(&a)?;
                let b: T = decode(&b)?;
                encode(&op(a, b))
            },
            encode(&value)?,
        )?;
        match combined {
            Some(bytes) => decode(&bytes),
            None => Ok(value),
        }
    }

    /// Sends the master's value to every rank.
    fn combine_scatter<T>(&self, value: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        Self: Sized,
    {
        let bytes = if self.is_master() {
            Some(encode(&value)?)
        } else {
            None
        };
        decode(&self.broadcast(bytes)?)
    }

    /// Collects one value per rank on the master, in rank order. Other ranks
    /// receive an empty list.
    fn gather_list<T>(&self, value: &T) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
        Self: Sized,
    {
        if self.is_master() {
            let mut values = Vec::with_capacity(self.size());
            values.push(value.clone());
            for rank in 1..self.size() {
                values.push(decode(&self.recv_from(rank))?);
            }
            Ok(values)
        } else {
            self.send(0, encode(value)?);
            Ok(Vec::new())
        }
    }

    /// Gathers one value per rank and gives every rank the full list.
    fn all_gather_list<T>(&self, value: &T) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
        Self: Sized,
    {
        let values = self.gather_list(value)?;
        self.combine_scatter(values)
    }

    /// The master hands `values[rank]` to every rank.
    fn scatter_list<T>(&self, values: &[T]) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        Self: Sized,
    {
        if self.is_master() {
            if values.len() != self.size() {
                return Err(HelyxCoreError::Communication(format!(
                    "scatter list has {} entries for {} ranks",
                    values.len(),
                    self.size()
                )));
            }
            for (rank, value) in values.iter().enumerate().skip(1) {
                self.send(rank, encode(value)?);
            }
            Ok(values[0].clone())
        } else {
            decode(&self.recv_from(0))
        }
    }

    /// Global sum, identical on every rank.
    fn reduce_sum(&self, value: f64) -> Result<f64>
    where
        Self: Sized,
    {
        let total = self.all_reduce(
            |a, b| encode(&(decode::<f64>(&a)? + decode::<f64>(&b)?)),
            encode(&value)?,
        )?;
        decode(&total)
    }

    /// Global maximum, identical on every rank.
    fn reduce_max(&self, value: f64) -> Result<f64>
    where
        Self: Sized,
    {
        let total = self.all_reduce(
            |a, b| encode(&decode::<f64>(&a)?.max(decode::<f64>(&b)?)),
            encode(&value)?,
        )?;
        decode(&total)
    }
}

/// Object-safe global reductions used by solvers, which must not be generic
/// over the transport.
pub trait GlobalReduce {
    fn global_sum(&self, value: f64) -> Result<f64>;

    fn global_max(&self, value: f64) -> Result<f64>;
}

impl<C: Communicator> GlobalReduce for C {
    fn global_sum(&self, value: f64) -> Result<f64> {
        if self.size() == 1 {
            return Ok(value);
        }
        self.reduce_sum(value)
    }

    fn global_max(&self, value: f64) -> Result<f64> {
        if self.size() == 1 {
            return Ok(value);
        }
        self.reduce_max(value)
    }
}

/// `ListUniqueEqOp`: appends the entries of `b` not already in `a`,
/// preserving first-seen order.
pub fn list_unique_union<T: PartialEq>(mut a: Vec<T>, b: Vec<T>) -> Vec<T> {
    for item in b {
        if !a.contains(&item) {
            a.push(item);
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_unique_union_is_stable() {
        let a = vec!["U", "d"];
        let b = vec!["T", "d", "age"];
        assert_eq!(list_unique_union(a, b), vec!["U", "d", "T", "age"]);
    }
}
