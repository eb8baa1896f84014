// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-process link driver.
//!
//! Every message written on a channel becomes readable on the same channel,
//! so a sender and a receiver module configured for one channel talk to each
//! other without hardware. Messages can also be injected directly, driver
//! calls can be made to fail, and the driver keeps a log of every write and
//! a count of leases that were handed out but not yet released.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    ptr::NonNull,
    sync::{Condvar, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    error::LinkStatus,
    link::{ChannelMode, Lease, LinkDriver, LinkHandle},
};

/// Driver operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackOp {
    Connect,
    OpenChannel,
    Write,
    Read,
    Release,
}

#[derive(Default)]
struct State {
    connected: HashSet<u32>,
    open: HashMap<u16, ChannelMode>,
    queues: HashMap<u16, VecDeque<Vec<u8>>>,
    writes: Vec<(u16, Vec<u8>)>,
    faults: HashMap<LoopbackOp, VecDeque<LinkStatus>>,
    outstanding: usize,
    echo: bool,
}

impl State {
    fn take_fault(&mut self, op: LoopbackOp) -> Result<(), LinkStatus> {
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

/// In-memory [`LinkDriver`].
pub struct LoopbackDriver {
    state: Mutex<State>,
    readable: Condvar,
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDriver {
    /// A driver that echoes writes back to readers of the same channel.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                echo: true,
                ..State::default()
            }),
            readable: Condvar::new(),
        }
    }

    /// A driver that only records writes; reads see injected messages only.
    pub fn without_echo() -> Self {
        let driver = Self::new();
        driver.lock().echo = false;
        driver
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other user of the driver.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues an inbound message on `channel`.
    pub fn inject(&self, channel: u16, message: impl Into<Vec<u8>>) {
        self.lock()
            .queues
            .entry(channel)
            .or_default()
            .push_back(message.into());
        self.readable.notify_all();
    }

    /// Makes the next `count` calls of `op` fail with `status`.
    pub fn fail_next(&self, op: LoopbackOp, status: LinkStatus, count: usize) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .extend(std::iter::repeat_n(status, count));
    }

    /// Every successful write so far, in order, as `(channel, bytes)`.
    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.lock().writes.clone()
    }

    /// Leases handed out and not yet released.
    pub fn outstanding_leases(&self) -> usize {
        self.lock().outstanding
    }

    pub fn is_open(&self, channel: u16) -> bool {
        self.lock().open.contains_key(&channel)
    }

    /// Mode an open channel was opened with.
    pub fn mode(&self, channel: u16) -> Option<ChannelMode> {
        self.lock().open.get(&channel).copied()
    }
}

impl LinkDriver for LoopbackDriver {
    fn initialize(&self) -> Result<(), LinkStatus> {
        Ok(())
    }

    fn boot_device(&self, _handle: &LinkHandle, _firmware: &str) -> Result<(), LinkStatus> {
        Ok(())
    }

    fn connect(&self, handle: &LinkHandle) -> Result<(), LinkStatus> {
        let mut state = self.lock();
        state.take_fault(LoopbackOp::Connect)?;
        state.connected.insert(handle.device_id);
        Ok(())
    }

    fn open_channel(
        &self,
        handle: &LinkHandle,
        channel: u16,
        mode: ChannelMode,
        _data_size: u32,
        _timeout: Duration,
    ) -> Result<(), LinkStatus> {
        let mut state = self.lock();
        state.take_fault(LoopbackOp::OpenChannel)?;
        if !state.connected.contains(&handle.device_id) {
            return Err(LinkStatus(xlink_sys::X_LINK_COMMUNICATION_NOT_OPEN));
        }
        state.open.insert(channel, mode);
        Ok(())
    }

    fn write_data(&self, _handle: &LinkHandle, channel: u16, data: &[u8]) -> Result<(), LinkStatus> {
        let mut state = self.lock();
        state.take_fault(LoopbackOp::Write)?;
        if !state.open.contains_key(&channel) {
            return Err(LinkStatus(xlink_sys::X_LINK_COMMUNICATION_NOT_OPEN));
        }
        state.writes.push((channel, data.to_vec()));
        if state.echo {
            state
                .queues
                .entry(channel)
                .or_default()
                .push_back(data.to_vec());
            self.readable.notify_all();
        }
        Ok(())
    }

    fn read_data(&self, _handle: &LinkHandle, channel: u16) -> Result<Lease, LinkStatus> {
        let mut state = self.lock();
        state.take_fault(LoopbackOp::Read)?;
        loop {
            if !state.open.contains_key(&channel) {
                return Err(LinkStatus(xlink_sys::X_LINK_COMMUNICATION_NOT_OPEN));
            }
            if let Some(message) = state.queues.get_mut(&channel).and_then(VecDeque::pop_front) {
                state.outstanding += 1;
                let len = message.len();
                let raw = Box::into_raw(message.into_boxed_slice()) as *mut u8;
                let ptr = NonNull::new(raw).unwrap_or(NonNull::dangling());
                // SAFETY
                // The boxed slice is only reclaimed in `release_data`.
                return Ok(unsafe { Lease::from_raw_parts(ptr, len) });
            }
            state = self
                .readable
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn release_data(
        &self,
        _handle: &LinkHandle,
        _channel: u16,
        lease: Lease,
    ) -> Result<(), LinkStatus> {
        let mut state = self.lock();
        state.take_fault(LoopbackOp::Release)?;
        state.outstanding = state.outstanding.saturating_sub(1);
        let slice = std::ptr::slice_from_raw_parts_mut(lease.as_ptr(), lease.len());
        // SAFETY
        // Every lease handed out by `read_data` is a leaked boxed slice of
        // exactly `len` bytes, and it is released exactly once.
        drop(unsafe { Box::from_raw(slice) });
        Ok(())
    }

    fn close_channel(&self, _handle: &LinkHandle, channel: u16) -> Result<(), LinkStatus> {
        let mut state = self.lock();
        state.open.remove(&channel);
        self.readable.notify_all();
        Ok(())
    }

    fn disconnect(&self, handle: &LinkHandle) -> Result<(), LinkStatus> {
        self.lock().connected.remove(&handle.device_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(driver: &LoopbackDriver, channel: u16) -> LinkHandle {
        let handle = LinkHandle::new(0);
        driver.connect(&handle).unwrap();
        driver
            .open_channel(&handle, channel, ChannelMode::Bidirectional, 1024, Duration::ZERO)
            .unwrap();
        handle
    }

    #[test]
    fn writes_are_echoed_in_order() {
        let driver = LoopbackDriver::new();
        let handle = open(&driver, 7);
        driver.write_data(&handle, 7, b"one").unwrap();
        driver.write_data(&handle, 7, b"two").unwrap();

        let first = driver.read_data(&handle, 7).unwrap();
        assert_eq!(first.as_slice(), b"one");
        assert_eq!(driver.outstanding_leases(), 1);
        driver.release_data(&handle, 7, first).unwrap();

        let second = driver.read_data(&handle, 7).unwrap();
        assert_eq!(second.as_slice(), b"two");
        driver.release_data(&handle, 7, second).unwrap();
        assert_eq!(driver.outstanding_leases(), 0);
    }

    #[test]
    fn writing_to_a_closed_channel_fails() {
        let driver = LoopbackDriver::new();
        let handle = LinkHandle::new(0);
        assert_eq!(
            driver.write_data(&handle, 1, b"x"),
            Err(LinkStatus(xlink_sys::X_LINK_COMMUNICATION_NOT_OPEN))
        );
    }

    #[test]
    fn injected_faults_are_consumed() {
        let driver = LoopbackDriver::new();
        driver.fail_next(LoopbackOp::Connect, LinkStatus(xlink_sys::X_LINK_TIMEOUT), 1);
        let handle = LinkHandle::new(3);
        assert!(driver.connect(&handle).is_err());
        assert!(driver.connect(&handle).is_ok());
    }

    #[test]
    fn closing_wakes_a_blocked_reader() {
        let driver = std::sync::Arc::new(LoopbackDriver::new());
        let handle = open(&driver, 2);
        let reader = {
            let driver = driver.clone();
            std::thread::spawn(move || driver.read_data(&handle, 2).map(|lease| lease.len()))
        };
        std::thread::sleep(Duration::from_millis(20));
        driver.close_channel(&handle, 2).unwrap();
        assert!(reader.join().unwrap().is_err());
    }
}
