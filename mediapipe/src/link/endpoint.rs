// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! One open channel on the link.

use std::{
    ops::Deref,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    error::{LinkStatus, OpenError, ReadError, TransportError, WriteError},
    link::{EndpointConfig, Lease, LinkDriver},
};

/// Cooperative cancellation for [`Endpoint::open`].
///
/// Clones share the same flag, so a token handed to an opening thread can be
/// cancelled from anywhere else. Cancelling also interrupts a pending retry
/// delay.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.state;
        *flag.lock().unwrap_or_else(|p| p.into_inner()) = true;
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleeps for `delay` or until cancelled. Returns `true` if cancelled.
    fn sleep(&self, delay: Duration) -> bool {
        let (flag, wake) = &*self.state;
        let guard = flag.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = wake
            .wait_timeout_while(guard, delay, |cancelled| !*cancelled)
            .unwrap_or_else(|p| p.into_inner());
        *guard
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Retry policy for [`Endpoint::open`].
///
/// The default retries forever without pausing, logging every failed attempt.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Give up after this many attempts. `None` retries until cancelled.
    pub max_attempts: Option<u32>,
    /// Pause between attempts.
    pub retry_delay: Duration,
    pub cancel: CancelToken,
}

impl OpenOptions {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// State shared between an [`Endpoint`] and its reader thread.
struct EndpointInner {
    driver: Arc<dyn LinkDriver>,
    config: EndpointConfig,
    closed: AtomicBool,
    write_serial: Mutex<()>,
    last_error: Mutex<Option<TransportError>>,
}

impl EndpointInner {
    fn record(&self, error: impl Into<TransportError>) {
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = Some(error.into());
    }

    fn read(&self) -> Result<ReadGuard<'_>, ReadError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReadError::Closed);
        }
        let lease = self
            .driver
            .read_data(&self.config.handle, self.config.channel)
            .map_err(ReadError::Transport)?;
        Ok(ReadGuard {
            inner: self,
            lease: Some(lease),
        })
    }

    fn release(&self, lease: Lease) -> Result<(), ReadError> {
        self.driver
            .release_data(&self.config.handle, self.config.channel, lease)
            .map_err(ReadError::Release)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = &self.config.handle;
        let channel = self.config.channel;
        if let Err(status) = self.driver.close_channel(handle, channel) {
            error!(channel, %status, "Failed to close channel");
        }
        if let Err(status) = self.driver.disconnect(handle) {
            error!(channel, %status, "Failed to disconnect link");
        }
        debug!(channel, "Channel closed");
    }
}

/// An open channel endpoint.
///
/// Writes are split into fragments of at most
/// [`EndpointConfig::fragment_size`] bytes. Reads lease one driver message at
/// a time through a [`ReadGuard`]. A reader thread started with
/// [`Endpoint::spawn_reader`] records its terminal failure in
/// [`Endpoint::last_error`] and is never restarted.
///
/// Dropping the endpoint closes the channel.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mediapipe::link::{Endpoint, EndpointConfig, LinkHandle, LoopbackDriver, OpenOptions};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = Arc::new(LoopbackDriver::new());
/// let config = EndpointConfig::new(LinkHandle::new(0), 1025);
/// let endpoint = Endpoint::open(driver, config, &OpenOptions::default())?;
///
/// endpoint.write(b"hello")?;
/// let message = endpoint.read()?;
/// assert_eq!(&*message, b"hello");
/// message.release()?;
/// # Ok(())
/// # }
/// ```
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Brings the channel up: initialize, boot (if a firmware image is
    /// configured), connect, open.
    ///
    /// A failure in any step restarts the sequence according to `options`.
    ///
    /// # Errors
    ///
    /// - [`OpenError::InvalidConfig`] if the fragment size is zero or does not fit the driver
    /// - [`OpenError::Exhausted`] once `options.max_attempts` attempts failed
    /// - [`OpenError::Cancelled`] if `options.cancel` fires before the channel opened
    pub fn open(
        driver: Arc<dyn LinkDriver>,
        config: EndpointConfig,
        options: &OpenOptions,
    ) -> Result<Self, OpenError> {
        if config.fragment_size == 0 {
            return Err(OpenError::InvalidConfig(
                "fragment size must be non-zero".to_string(),
            ));
        }
        let data_size = u32::try_from(config.fragment_size).map_err(|_| {
            OpenError::InvalidConfig(format!(
                "fragment size {} exceeds the driver limit",
                config.fragment_size
            ))
        })?;

        let channel = config.channel;
        let mut attempts: u32 = 0;
        loop {
            if options.cancel.is_cancelled() {
                warn!(channel, attempts, "Channel open cancelled");
                return Err(OpenError::Cancelled);
            }
            attempts = attempts.saturating_add(1);
            match bring_up(driver.as_ref(), &config, data_size) {
                Ok(()) => {
                    info!(channel, attempts, mode = ?config.mode, "Channel opened");
                    return Ok(Self {
                        inner: Arc::new(EndpointInner {
                            driver,
                            config,
                            closed: AtomicBool::new(false),
                            write_serial: Mutex::new(()),
                            last_error: Mutex::new(None),
                        }),
                    });
                }
                Err(status) => {
                    error!(channel, attempt = attempts, %status, "Failed to open channel");
                    if let Some(max) = options.max_attempts
                        && attempts >= max
                    {
                        return Err(OpenError::Exhausted {
                            attempts,
                            last: status,
                        });
                    }
                    if !options.retry_delay.is_zero() && options.cancel.sleep(options.retry_delay)
                    {
                        warn!(channel, attempts, "Channel open cancelled");
                        return Err(OpenError::Cancelled);
                    }
                }
            }
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    pub fn channel(&self) -> u16 {
        self.inner.config.channel
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Writes `data` as a sequence of fragments.
    ///
    /// Concurrent writers are serialized so their fragments never interleave.
    /// Empty input writes nothing.
    ///
    /// # Errors
    ///
    /// The first failing fragment stops the write and is returned as
    /// [`WriteError::Transport`]; it is also stored as the endpoint's last
    /// error. Fragments before it have already been handed to the driver.
    pub fn write(&self, data: &[u8]) -> Result<(), WriteError> {
        if self.is_closed() {
            return Err(WriteError::Closed);
        }
        let inner = &*self.inner;
        let _serial = inner.write_serial.lock().unwrap_or_else(|p| p.into_inner());
        for (index, fragment) in data.chunks(inner.config.fragment_size).enumerate() {
            if let Err(status) =
                inner
                    .driver
                    .write_data(&inner.config.handle, inner.config.channel, fragment)
            {
                error!(
                    channel = inner.config.channel,
                    fragment = index,
                    %status,
                    "Channel write failed"
                );
                let error = WriteError::Transport(status);
                inner.record(error.clone());
                return Err(error);
            }
        }
        Ok(())
    }

    /// Blocks until one message is available.
    ///
    /// # Errors
    ///
    /// [`ReadError::Transport`] on driver failure, [`ReadError::Closed`] after
    /// [`Endpoint::close`].
    pub fn read(&self) -> Result<ReadGuard<'_>, ReadError> {
        self.inner.read()
    }

    /// Starts a dedicated reader thread feeding every message to `sink`.
    ///
    /// The thread leases a message, passes it to `sink`, releases it, and
    /// repeats. A read or release failure is stored as the endpoint's last
    /// error and ends the thread. Closing the endpoint ends it without an
    /// error.
    pub fn spawn_reader<F>(&self, mut sink: F) -> ReaderHandle
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let inner = self.inner.clone();
        let channel = inner.config.channel;
        let handle = std::thread::spawn(move || {
            debug!(channel, "Reader thread started");
            loop {
                let message = match inner.read() {
                    Ok(message) => message,
                    Err(_) if inner.closed.load(Ordering::Acquire) => {
                        debug!(channel, "Reader thread stopped, channel closed");
                        return None;
                    }
                    Err(error) => {
                        error!(channel, %error, "Reader thread stopping");
                        inner.record(error.clone());
                        return Some(error);
                    }
                };
                sink(&message);
                if let Err(error) = message.release() {
                    error!(channel, %error, "Reader thread stopping");
                    inner.record(error.clone());
                    return Some(error);
                }
            }
        });
        ReaderHandle { handle }
    }

    /// The most recent terminal transport failure, if any.
    pub fn last_error(&self) -> Option<TransportError> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Closes the channel and disconnects. Later calls do nothing.
    ///
    /// Failures are logged; the endpoint counts as closed either way.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.inner.close();
    }
}

fn bring_up(
    driver: &dyn LinkDriver,
    config: &EndpointConfig,
    data_size: u32,
) -> Result<(), LinkStatus> {
    driver.initialize()?;
    if let Some(firmware) = &config.firmware {
        driver.boot_device(&config.handle, firmware)?;
    }
    driver.connect(&config.handle)?;
    driver.open_channel(
        &config.handle,
        config.channel,
        config.mode,
        data_size,
        config.timeout,
    )
}

/// One leased message.
///
/// Dereferences to the message bytes. Call [`ReadGuard::release`] to hand
/// the buffer back and observe release failures; dropping the guard releases
/// it too and only logs a failure.
pub struct ReadGuard<'a> {
    inner: &'a EndpointInner,
    lease: Option<Lease>,
}

impl ReadGuard<'_> {
    /// Hands the message buffer back to the driver.
    pub fn release(mut self) -> Result<(), ReadError> {
        match self.lease.take() {
            Some(lease) => self.inner.release(lease),
            None => Ok(()),
        }
    }
}

impl Deref for ReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.lease.as_ref().map(Lease::as_slice).unwrap_or_default()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take()
            && let Err(error) = self.inner.release(lease)
        {
            error!(channel = self.inner.config.channel, %error, "Failed to release channel data");
        }
    }
}

/// Handle to a reader thread started by [`Endpoint::spawn_reader`].
#[derive(Debug)]
pub struct ReaderHandle {
    handle: JoinHandle<Option<ReadError>>,
}

impl ReaderHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the thread to stop and returns the error that stopped it.
    ///
    /// `None` means the thread stopped because the endpoint was closed. A
    /// panicking sink is reported as [`ReadError::ReaderPanicked`].
    pub fn join(self) -> Option<ReadError> {
        self.handle.join().unwrap_or(Some(ReadError::ReaderPanicked))
    }
}
