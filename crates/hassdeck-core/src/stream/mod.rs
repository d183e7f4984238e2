// ── Reactive device streams ──
//
// Subscription type for consuming device-list changes from the DataStore.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Device, DeviceId};

/// A subscription to the dashboard device list.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via [`changed()`](Self::changed) or by converting to a `Stream`.
#[derive(Debug, Clone)]
pub struct DeviceStream {
    current: Arc<Vec<Arc<Device>>>,
    receiver: watch::Receiver<Arc<Vec<Arc<Device>>>>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Arc<Device>>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot seen most recently through this subscription.
    pub fn current(&self) -> &Arc<Vec<Arc<Device>>> {
        &self.current
    }

    /// The latest snapshot (may have changed since the last `changed()`).
    pub fn latest(&self) -> Arc<Vec<Arc<Device>>> {
        self.receiver.borrow().clone()
    }

    /// One device out of the current snapshot.
    pub fn device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.current.iter().find(|d| d.id == id).cloned()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the DataStore has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<Device>>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current list first, then a new snapshot each time the
/// device list is mutated.
pub struct DeviceWatchStream {
    inner: WatchStream<Arc<Vec<Arc<Device>>>>,
}

impl Stream for DeviceWatchStream {
    type Item = Arc<Vec<Arc<Device>>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
