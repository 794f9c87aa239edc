//! Fakes for driving the sensor and acquisition loop without hardware

use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll, Waker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::Wake;
use std::thread::{self, Thread};
use std::vec::Vec;

use embassy_time::{Duration, Timer};
use embedded_hal::{digital, spi};
use embedded_hal_async::digital::Wait;
use embedded_hal_async::spi::{Operation, SpiDevice};

struct ThreadWaker {
    thread: Thread,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.thread.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.thread.unpark();
    }
}

/// Run `future` to completion on the current thread, parking between polls.
///
/// The thread only polls again once the future's waker fires, so a future
/// that never registers its waker hangs instead of spinning to completion.
/// Returns the output and how many times the future was polled.
pub fn block_on_counting<F: Future>(future: F) -> (F::Output, usize) {
    let mut future = pin!(future);
    let waker = Waker::from(Arc::new(ThreadWaker {
        thread: thread::current(),
    }));
    let mut cx = Context::from_waker(&waker);

    let mut polls = 0;
    loop {
        polls += 1;
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return (output, polls);
        }
        thread::park();
    }
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    block_on_counting(future).0
}

#[derive(Default)]
struct FakeSpiState {
    frames: Vec<Vec<u8>>,
    responses: HashMap<u8, Vec<u8>>,
    transactions: usize,
    fail_after: Option<usize>,
}

/// SPI device that records every outgoing frame and answers transfers with
/// canned bytes keyed by the frame's address byte.
///
/// Clones share state, so a test can keep a handle after moving the device
/// into a driver.
#[derive(Clone, Default)]
pub struct FakeSpi {
    state: Arc<Mutex<FakeSpiState>>,
}

impl FakeSpi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes clocked back for transfers whose first byte is `address`.
    pub fn respond(&mut self, address: u8, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(address, bytes.to_vec());
    }

    /// Let the first `n` transactions succeed and fail every one after.
    pub fn fail_after(&mut self, n: usize) {
        self.state.lock().unwrap().fail_after = Some(n);
    }

    /// Outgoing bytes of every successful transaction, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().frames.clone()
    }

    /// Successful transactions whose first byte is `address`.
    pub fn count(&self, address: u8) -> usize {
        self.state
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter(|frame| frame.first() == Some(&address))
            .count()
    }
}

impl spi::ErrorType for FakeSpi {
    type Error = spi::ErrorKind;
}

impl SpiDevice<u8> for FakeSpi {
    async fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        let index = state.transactions;
        state.transactions += 1;
        if state.fail_after.is_some_and(|n| index >= n) {
            return Err(spi::ErrorKind::Other);
        }

        let mut frame = Vec::new();
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => frame.extend_from_slice(bytes),
                Operation::Transfer(read, write) => {
                    frame.extend_from_slice(write);
                    let response = state.responses.get(&write.first().copied().unwrap_or(0));
                    fill(read, response);
                }
                Operation::TransferInPlace(bytes) => {
                    frame.extend_from_slice(bytes);
                    let response = state.responses.get(&bytes.first().copied().unwrap_or(0));
                    fill(bytes, response);
                }
                Operation::Read(bytes) => fill(bytes, None),
                Operation::DelayNs(_) => {}
            }
        }
        state.frames.push(frame);
        Ok(())
    }
}

fn fill(buffer: &mut [u8], response: Option<&Vec<u8>>) {
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = response.and_then(|r| r.get(i).copied()).unwrap_or(0);
    }
}

#[derive(Clone, Copy)]
enum EdgeMode {
    Every(Duration),
    Never,
    Fail,
}

/// Data-ready pin stand-in.
pub struct FakeDataReady {
    mode: EdgeMode,
}

impl FakeDataReady {
    /// Raises an edge every `period`.
    pub fn every(period: Duration) -> Self {
        Self {
            mode: EdgeMode::Every(period),
        }
    }

    /// Never raises an edge.
    pub fn never() -> Self {
        Self {
            mode: EdgeMode::Never,
        }
    }

    /// Every wait returns an error.
    pub fn failing() -> Self {
        Self {
            mode: EdgeMode::Fail,
        }
    }

    async fn edge(&mut self) -> Result<(), digital::ErrorKind> {
        match self.mode {
            EdgeMode::Every(period) => {
                Timer::after(period).await;
                Ok(())
            }
            EdgeMode::Never => core::future::pending().await,
            EdgeMode::Fail => Err(digital::ErrorKind::Other),
        }
    }
}

impl digital::ErrorType for FakeDataReady {
    type Error = digital::ErrorKind;
}

impl Wait for FakeDataReady {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.edge().await
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.edge().await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.edge().await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.edge().await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.edge().await
    }
}
