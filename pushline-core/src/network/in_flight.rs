// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-flight call registry and cooperative cancellation.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CallState {
    canceled: AtomicBool,
    hooks: Mutex<Vec<CancelHook>>,
}

/// Cancellation state of a single dispatched call.
///
/// Transports register hooks with [`CallHandle::on_cancel`] to be woken the
/// moment the call is canceled.
#[derive(Clone, Default)]
pub struct CallHandle {
    state: Arc<CallState>,
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl CallHandle {
    pub fn new() -> Self {
        CallHandle::default()
    }

    /// Flags the call and runs every registered hook once.
    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::SeqCst);
        let hooks = std::mem::take(&mut *self.state.hooks.lock().expect("mutex poisoned"));
        for hook in hooks {
            hook();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    /// Runs `hook` when the call is canceled, or right away if it already is.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.state.hooks.lock().expect("mutex poisoned");
        if self.is_canceled() {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }
}

/// Set of calls currently on the wire.
///
/// The lock is held only for insert, remove and the cancellation snapshot,
/// never across I/O.
#[derive(Debug, Default)]
pub struct InFlightCalls {
    calls: Mutex<HashMap<u64, CallHandle>>,
    next_id: AtomicU64,
}

impl InFlightCalls {
    pub fn new() -> Self {
        InFlightCalls::default()
    }

    /// Registers a new call. It stays registered until the guard drops.
    pub fn register(&self) -> CallGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = CallHandle::new();
        self.calls
            .lock()
            .expect("mutex poisoned")
            .insert(id, handle.clone());
        CallGuard {
            registry: self,
            id,
            handle,
        }
    }

    /// Cancels every call registered at the time of the call.
    ///
    /// Returns the number of calls canceled.
    pub fn cancel_all(&self) -> usize {
        let snapshot: Vec<CallHandle> = self
            .calls
            .lock()
            .expect("mutex poisoned")
            .values()
            .cloned()
            .collect();
        for handle in &snapshot {
            handle.cancel();
        }
        if !snapshot.is_empty() {
            warn!(count = snapshot.len(), "canceling in-flight calls");
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().expect("mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.calls.lock().expect("mutex poisoned").remove(&id);
    }
}

/// Deregisters its call on drop, whatever the outcome of the call.
pub struct CallGuard<'a> {
    registry: &'a InFlightCalls,
    id: u64,
    handle: CallHandle,
}

impl CallGuard<'_> {
    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Marker carried inside the `io::Error` of an aborted body stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCanceled;

impl fmt::Display for UploadCanceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("upload canceled")
    }
}

impl std::error::Error for UploadCanceled {}

impl UploadCanceled {
    pub fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::Other, self)
    }

    /// True if `err` or anything in its source chain is an aborted stream.
    pub fn is_in_chain(err: &(dyn std::error::Error + 'static)) -> bool {
        let mut current = Some(err);
        while let Some(e) = current {
            if e.downcast_ref::<UploadCanceled>().is_some() {
                return true;
            }
            if let Some(inner) = e
                .downcast_ref::<io::Error>()
                .and_then(|io| io.get_ref())
            {
                if inner.downcast_ref::<UploadCanceled>().is_some() {
                    return true;
                }
            }
            current = e.source();
        }
        false
    }
}

/// Body reader that stops producing bytes once its call is canceled.
pub struct CancelableReader<R> {
    inner: R,
    call: CallHandle,
}

impl<R: Read> CancelableReader<R> {
    pub fn new(inner: R, call: CallHandle) -> Self {
        CancelableReader { inner, call }
    }
}

impl<R: Read> Read for CancelableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.call.is_canceled() {
            return Err(UploadCanceled.into_io());
        }
        self.inner.read(buf)
    }
}
