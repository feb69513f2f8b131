use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSendError {
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRecvError {
    Disconnected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub peak_depth: usize,
}

#[derive(Debug, Default)]
struct DepthGauge {
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
}

impl DepthGauge {
    // Counted before the value is handed over so a fast receiver never sees depth 0.
    fn enter(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
    }

    fn leave(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1));
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            depth: self.depth.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct BoundedQueueTx<T> {
    inner: SyncSender<T>,
    gauge: Arc<DepthGauge>,
}

impl<T> Clone for BoundedQueueTx<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gauge: Arc::clone(&self.gauge),
        }
    }
}

#[derive(Debug)]
pub struct BoundedQueueRx<T> {
    inner: Receiver<T>,
    gauge: Arc<DepthGauge>,
}

impl<T> BoundedQueueTx<T> {
    pub fn send(&self, value: T) -> Result<(), QueueSendError> {
        self.gauge.enter();
        self.inner.send(value).map_err(|_| {
            self.gauge.leave();
            QueueSendError::Disconnected
        })
    }
}

impl<T> BoundedQueueRx<T> {
    pub fn recv(&self) -> Result<T, QueueRecvError> {
        let item = self
            .inner
            .recv()
            .map_err(|_| QueueRecvError::Disconnected)?;
        self.gauge.leave();
        Ok(item)
    }

    pub fn stats(&self) -> QueueStats {
        self.gauge.snapshot()
    }
}

pub fn bounded_queue<T>(capacity: usize) -> (BoundedQueueTx<T>, BoundedQueueRx<T>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let gauge = Arc::new(DepthGauge::default());
    (
        BoundedQueueTx {
            inner: tx,
            gauge: Arc::clone(&gauge),
        },
        BoundedQueueRx { inner: rx, gauge },
    )
}
