// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared test driver: a tiny line-based request/reply exchange over one
//! end of a `UnixStream` pair.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use sockwatch::{
    Context, Dispatcher, DispatcherConfig, Driver, NativeSocket, Phase, Step, Transaction, TxnRef,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Eof,
    TimedOut,
    Failed(String),
}

pub struct Exchange {
    stream: UnixStream,
    request: &'static [u8],
    phase: Phase,
}

impl Exchange {
    /// Driver starting in `phase` over `stream` (switched to non-blocking).
    pub fn new(stream: UnixStream, request: &'static [u8], phase: Phase) -> Self {
        stream.set_nonblocking(true).unwrap();
        Self {
            stream,
            request,
            phase,
        }
    }

    pub fn socket(&self) -> NativeSocket {
        NativeSocket::of(&self.stream)
    }

    fn finish(&mut self, cx: &mut Context<'_, Self>, outcome: Outcome) -> Step<Outcome> {
        cx.socket_lost(self.socket());
        self.phase = Phase::Finished;
        Step::Finished(outcome)
    }
}

impl Driver for Exchange {
    type Outcome = Outcome;

    fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, cx: &mut Context<'_, Self>) -> Step<Outcome> {
        match self.phase {
            Phase::Idle => {
                if let Err(e) = cx.socket_acquired(self.socket()) {
                    return Step::Finished(Outcome::Failed(e.to_string()));
                }
                self.phase = Phase::Send;
                Step::Pending
            }
            Phase::Send => match self.stream.write(self.request) {
                Ok(_) => {
                    self.phase = Phase::ReceiveHeaders;
                    Step::Pending
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => Step::Pending,
                Err(e) => self.finish(cx, Outcome::Failed(e.to_string())),
            },
            Phase::ReceiveHeaders | Phase::ReceiveBody => {
                let mut buf = [0u8; 256];
                match self.stream.read(&mut buf) {
                    Ok(0) => self.finish(cx, Outcome::Eof),
                    Ok(n) => {
                        let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
                        self.finish(cx, Outcome::Reply(reply))
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => Step::Pending,
                    Err(e) => self.finish(cx, Outcome::Failed(e.to_string())),
                }
            }
            _ => Step::Pending,
        }
    }

    fn timed_out(&mut self, cx: &mut Context<'_, Self>) -> Outcome {
        cx.socket_lost(self.socket());
        self.phase = Phase::Finished;
        Outcome::TimedOut
    }
}

/// Fast-polling configuration so tests do not wait on the default 100 ms.
pub fn test_config() -> DispatcherConfig {
    DispatcherConfig::default()
        .with_poll_timeout(Duration::from_millis(10))
        .with_thread_name("sockwatch-test")
}

pub fn started(config: DispatcherConfig) -> Dispatcher<Exchange> {
    Dispatcher::initialize(config).unwrap()
}

/// Transaction over a fresh socket pair; returns it with the peer end and a
/// receiver of every outcome it reports.
pub fn exchange(
    request: &'static [u8],
    phase: Phase,
    timeout: Duration,
) -> (TxnRef<Exchange>, UnixStream, Receiver<Outcome>) {
    let (ours, peer) = UnixStream::pair().unwrap();
    let txn = Transaction::with_timeout(Exchange::new(ours, request, phase), timeout);
    let (tx, rx) = mpsc::channel();
    txn.on_complete(move |_, outcome| {
        let _ = tx.send(outcome);
    });
    (txn, peer, rx)
}

/// Spin until `cond` holds or `limit` elapses.
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
