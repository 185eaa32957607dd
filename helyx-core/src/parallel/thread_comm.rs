use super::comm::Communicator;
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::Mutex;

type Envelope = (usize, Vec<u8>);

/// A communicator whose ranks are threads of one process, connected by
/// unbounded crossbeam channels. Used to run the collective protocols in
/// tests and in single-process multi-rank runs.
///
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    senders: Vec<Sender<Envelope>>,
    receiver: Receiver<Envelope>,
    // Messages that arrived from a rank other than the one being waited on.
    pending: Mutex<Vec<VecDeque<Vec<u8>>>>,
}

impl ThreadCommunicator {
    /// Creates `size` connected endpoints; endpoint `i` has rank `i`.
    pub fn create_group(size: usize) -> Vec<ThreadCommunicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadCommunicator {
                rank,
                senders: senders.clone(),
                receiver,
                pending: Mutex::new(vec![VecDeque::new(); size]),
            })
            .collect()
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        if self.senders[rank].send((self.rank, message)).is_err() {
            crate::fatal_error!(
                "ThreadCommunicator::send",
                format!("rank {}", self.rank),
                "rank {} has hung up",
                rank
            );
        }
    }

    fn recv_from(&self, rank: usize) -> Vec<u8> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(message) = pending[rank].pop_front() {
            return message;
        }
        loop {
            match self.receiver.recv() {
                Ok((source, message)) if source == rank => return message,
                Ok((source, message)) => pending[source].push_back(message),
                Err(_) => crate::fatal_error!(
                    "ThreadCommunicator::recv_from",
                    format!("rank {}", self.rank),
                    "all peers have hung up while waiting on rank {}",
                    rank
                ),
            }
        }
    }
}

/// The single-rank communicator of a serial run. Messages sent to self are
/// queued and can be received back.
///
#[derive(Debug, Default)]
pub struct SerialCommunicator {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl SerialCommunicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, _rank: usize, message: Vec<u8>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(message);
    }

    fn recv_from(&self, _rank: usize) -> Vec<u8> {
        match self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
            Some(message) => message,
            None => crate::fatal_error!(
                "SerialCommunicator::recv_from",
                "rank 0",
                "no message queued; a serial receive would block forever"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::util::{decode, encode};

    fn run_group<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(&ThreadCommunicator) -> R + Sync,
        R: Send,
    {
        let comms = ThreadCommunicator::create_group(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms.iter().map(|c| scope.spawn(|| f(c))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_broadcast_reaches_every_rank() {
        for size in 1..=7 {
            let results = run_group(size, |comm| {
                let value = if comm.is_master() {
                    Some(encode(&42u32).unwrap())
                } else {
                    None
                };
                decode::<u32>(&comm.broadcast(value).unwrap()).unwrap()
            });
            assert_eq!(results, vec![42; size]);
        }
    }

    #[test]
    fn test_reduce_sum_is_identical_on_all_ranks() {
        for size in 1..=6 {
            let results = run_group(size, |comm| comm.reduce_sum(0.1 * (comm.rank() + 1) as f64).unwrap());
            let first = results[0].to_bits();
            assert!(results.iter().all(|r| r.to_bits() == first));
            let expected: f64 = (1..=size).map(|r| 0.1 * r as f64).sum();
            assert!((results[0] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_all_gather_list_in_rank_order() {
        let results = run_group(4, |comm| comm.all_gather_list(&(comm.rank() * 10)).unwrap());
        for list in results {
            assert_eq!(list, vec![0, 10, 20, 30]);
        }
    }

    #[test]
    fn test_scatter_list() {
        let results = run_group(3, |comm| {
            let values = if comm.is_master() {
                vec!["a".to_string(), "b".to_string(), "c".to_string()]
            } else {
                Vec::new()
            };
            comm.scatter_list(&values).unwrap()
        });
        assert_eq!(results, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_out_of_order_messages_are_buffered() {
        let results = run_group(3, |comm| match comm.rank() {
            0 => {
                let from_two: u8 = decode(&comm.recv_from(2)).unwrap();
                let from_one: u8 = decode(&comm.recv_from(1)).unwrap();
                vec![from_two, from_one]
            }
            r => {
                comm.send(0, encode(&(r as u8)).unwrap());
                Vec::new()
            }
        });
        assert_eq!(results[0], vec![2, 1]);
    }

    #[test]
    fn test_serial_communicator_collectives() {
        let comm = SerialCommunicator::new();
        assert_eq!(comm.reduce_sum(3.5).unwrap(), 3.5);
        assert_eq!(comm.all_gather_list(&7).unwrap(), vec![7]);
    }
}
