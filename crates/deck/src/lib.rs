// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! the host-side RPC dispatcher ("deck").
//!
//! a single-threaded state machine driven by I/O readiness: the
//! caller feeds received frame payloads in, gets frames to transmit
//! back, and ticks the watchdog with `poll`. time is always passed in
//! so nothing here sleeps or reads the clock.

pub mod dispatcher;

pub use dispatcher::{Deck, DeckHandler, DEFAULT_REQUEST_TIMEOUT};
