//! Double-buffer exchange over two bounded queues
//!
//! A fixed pool of buffers recirculates between two loops. Each buffer is at
//! every moment either owned by exactly one [`Endpoint`] or sitting in
//! exactly one of the two queues. Producing a buffer moves it into the
//! peer's inbound queue; consuming pops the next buffer from one's own.
//!
//! Queues are sized to the pool so `produce` never blocks. Only `consume`
//! suspends, which is what bounds how far one side can run ahead of the
//! other.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::Duration;

use crate::error::ExchangeError;

/// Which end of a channel an [`Endpoint`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The simulation end
    Upstream,
    /// The presentation or audio end
    Downstream,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Upstream => 0,
            Side::Downstream => 1,
        }
    }

    fn peer(self) -> Side {
        match self {
            Side::Upstream => Side::Downstream,
            Side::Downstream => Side::Upstream,
        }
    }
}

/// Ownership counters for one channel's buffer pool.
///
/// `owned[side]` counts buffers held by that side, `inbound[side]` counts
/// buffers queued for it. Their sum equals the pool size whenever no
/// handoff is mid-flight.
#[derive(Debug)]
pub struct PoolGauge {
    pool: usize,
    owned: [AtomicUsize; 2],
    inbound: [AtomicUsize; 2],
}

/// Point-in-time copy of a [`PoolGauge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeSnapshot {
    pub pool: usize,
    pub owned_upstream: usize,
    pub owned_downstream: usize,
    pub queued_upstream: usize,
    pub queued_downstream: usize,
}

impl GaugeSnapshot {
    /// Buffers accounted for, owned plus in flight.
    pub fn total(&self) -> usize {
        self.owned_upstream + self.owned_downstream + self.queued_upstream + self.queued_downstream
    }
}

impl PoolGauge {
    pub fn pool(&self) -> usize {
        self.pool
    }

    pub fn snapshot(&self) -> GaugeSnapshot {
        GaugeSnapshot {
            pool: self.pool,
            owned_upstream: self.owned[0].load(Ordering::Acquire),
            owned_downstream: self.owned[1].load(Ordering::Acquire),
            queued_upstream: self.inbound[0].load(Ordering::Acquire),
            queued_downstream: self.inbound[1].load(Ordering::Acquire),
        }
    }
}

/// One end of a double-buffer exchange.
pub struct Endpoint<B> {
    channel: &'static str,
    side: Side,
    /// Sender into the peer's inbound queue
    tx: SyncSender<B>,
    /// Our own inbound queue
    rx: Receiver<B>,
    gauge: Arc<PoolGauge>,
}

/// Build a channel around `pool`.
///
/// The first `upstream_share` buffers are primed into the upstream side's
/// inbound queue; the rest go to the downstream side. Returns
/// `(upstream, downstream)`.
pub fn exchange<B>(
    channel: &'static str,
    pool: Vec<B>,
    upstream_share: usize,
) -> (Endpoint<B>, Endpoint<B>) {
    let size = pool.len();
    assert!(size > 0, "{channel} exchange needs at least one buffer");
    assert!(upstream_share <= size, "{channel} split exceeds pool");

    let (to_upstream, upstream_rx) = mpsc::sync_channel::<B>(size);
    let (to_downstream, downstream_rx) = mpsc::sync_channel::<B>(size);

    let gauge = Arc::new(PoolGauge {
        pool: size,
        owned: [AtomicUsize::new(0), AtomicUsize::new(0)],
        inbound: [
            AtomicUsize::new(upstream_share),
            AtomicUsize::new(size - upstream_share),
        ],
    });

    for (i, buffer) in pool.into_iter().enumerate() {
        let queue = if i < upstream_share {
            &to_upstream
        } else {
            &to_downstream
        };
        // Both receivers are alive and the queues hold the full pool
        if queue.try_send(buffer).is_err() {
            unreachable!("priming a fresh {channel} queue cannot fail");
        }
    }

    tracing::debug!(
        "{} exchange: pool {}, {} upstream / {} downstream",
        channel,
        size,
        upstream_share,
        size - upstream_share
    );

    (
        Endpoint {
            channel,
            side: Side::Upstream,
            tx: to_downstream,
            rx: upstream_rx,
            gauge: gauge.clone(),
        },
        Endpoint {
            channel,
            side: Side::Downstream,
            tx: to_upstream,
            rx: downstream_rx,
            gauge,
        },
    )
}

impl<B> Endpoint<B> {
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn gauge(&self) -> &PoolGauge {
        &self.gauge
    }

    /// Hand a buffer to the peer. After this call the buffer is theirs.
    pub fn produce(&self, buffer: B) -> Result<(), ExchangeError> {
        let peer = self.side.peer().index();
        self.gauge.inbound[peer].fetch_add(1, Ordering::AcqRel);
        self.gauge.owned[self.side.index()].fetch_sub(1, Ordering::AcqRel);

        self.tx.send(buffer).map_err(|_| {
            // Peer is gone; the buffer is dropped with the error
            self.gauge.inbound[peer].fetch_sub(1, Ordering::AcqRel);
            ExchangeError::Disconnected {
                channel: self.channel,
            }
        })
    }

    /// Block until the peer hands us a buffer.
    pub fn consume(&self) -> Result<B, ExchangeError> {
        let buffer = self.rx.recv().map_err(|_| self.disconnected())?;
        self.took_ownership();
        Ok(buffer)
    }

    /// Take a buffer if one is queued, without blocking.
    pub fn try_consume(&self) -> Result<Option<B>, ExchangeError> {
        match self.rx.try_recv() {
            Ok(buffer) => {
                self.took_ownership();
                Ok(Some(buffer))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Block for at most `timeout` waiting for a buffer.
    pub fn consume_timeout(&self, timeout: Duration) -> Result<Option<B>, ExchangeError> {
        match self.rx.recv_timeout(timeout) {
            Ok(buffer) => {
                self.took_ownership();
                Ok(Some(buffer))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(self.disconnected()),
        }
    }

    fn took_ownership(&self) {
        let side = self.side.index();
        self.gauge.owned[side].fetch_add(1, Ordering::AcqRel);
        self.gauge.inbound[side].fetch_sub(1, Ordering::AcqRel);
    }

    fn disconnected(&self) -> ExchangeError {
        ExchangeError::Disconnected {
            channel: self.channel,
        }
    }
}
