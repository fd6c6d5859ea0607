// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// request lifecycle
//
// - request ids are monotonically generated u16 values, wrapping on
//   overflow; ids still pending are skipped.
// - at most one request is in flight per (machine, function) key.
//   newer calls for a busy key coalesce: only the latest parameters
//   are retained and go out when the slot frees.
// - every pending request is watched; when the watchdog fires the
//   request is abandoned (nothing is sent to the device) and the
//   slot is released for the next coalesced call.
//
// the UI state blob transfer: block 0 is requested first, the reply's
// total_size is authoritative, blocks are requested in order until
// the accumulated length reaches it. an out-of-order block number
// aborts the transfer; a zero total ends it immediately.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, warn};

use fluxvm_types::StackWord;
use fluxvm_wire::{encode_frame, Message, WireError};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(200);

/// synthesized locally when the watchdog abandons a request
pub const ERROR_CODE_TIMEOUT: u16 = 0xfffe;
/// synthesized locally when a blob transfer is aborted
pub const ERROR_CODE_TRANSFER_ABORTED: u16 = 0xfffd;

/// the delivery capability: everything the device sends upstream
/// lands in one of these five operations.
pub trait DeckHandler {
    fn on_return(&mut self, request_id: u16, values: &[StackWord]);
    fn on_notification(&mut self, machine_index: u16, function_index: u16, values: &[StackWord]);
    fn on_error(&mut self, request_id: Option<u16>, error_code: u16, message: &str);
    fn on_ui_state_block(
        &mut self,
        request_id: u16,
        total_size: u32,
        block_number: u16,
        block: &[u8],
    );
    fn on_i2c_devices(&mut self, request_id: u16, total_count: u16, devices: &[u16]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CallKey {
    Machine(u16, u16),
    Shared(u16),
}

#[derive(Default)]
struct CallSlot {
    in_flight: Option<u16>,
    /// the latest coalesced parameters, replacing older ones
    queued: Option<Vec<StackWord>>,
}

struct Pending {
    key: Option<CallKey>,
    deadline: Instant,
}

struct BlobTransfer {
    expected_block: u16,
    received: usize,
}

#[derive(Default)]
pub struct Deck {
    next_request_id: u16,
    timeout: Option<Duration>,
    pending: HashMap<u16, Pending>,
    slots: HashMap<CallKey, CallSlot>,
    blob: Option<BlobTransfer>,
}

impl Deck {
    pub fn new() -> Deck {
        Deck {
            next_request_id: 0,
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            pending: HashMap::new(),
            slots: HashMap::new(),
            blob: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Deck {
        self.timeout = Some(timeout);
        self
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn allocate_request_id(&mut self) -> u16 {
        loop {
            let request_id = self.next_request_id;
            self.next_request_id = self.next_request_id.wrapping_add(1);
            if !self.pending.contains_key(&request_id) {
                return request_id;
            }
        }
    }

    fn track(&mut self, request_id: u16, key: Option<CallKey>, now: Instant) {
        let deadline = now + self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        self.pending.insert(request_id, Pending { key, deadline });
    }

    /// a machine function call; returns the frame to transmit, or
    /// None when the call was coalesced behind an in-flight request
    pub fn call(
        &mut self,
        machine_index: u16,
        function_index: u16,
        args: Vec<StackWord>,
        now: Instant,
    ) -> Option<Vec<u8>> {
        self.submit(CallKey::Machine(machine_index, function_index), args, now)
    }

    pub fn call_shared(
        &mut self,
        function_index: u16,
        args: Vec<StackWord>,
        now: Instant,
    ) -> Option<Vec<u8>> {
        self.submit(CallKey::Shared(function_index), args, now)
    }

    fn submit(
        &mut self,
        key: CallKey,
        args: Vec<StackWord>,
        now: Instant,
    ) -> Option<Vec<u8>> {
        {
            let slot = self.slots.entry(key).or_default();
            if slot.in_flight.is_some() {
                debug!("coalescing call on busy slot {:?}", key);
                slot.queued = Some(args);
                return None;
            }
        }

        let request_id = self.allocate_request_id();
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.in_flight = Some(request_id);
        }
        self.track(request_id, Some(key), now);

        let message = match key {
            CallKey::Machine(machine_index, function_index) => Message::CallRequest {
                request_id,
                machine_index,
                function_index,
                args,
            },
            CallKey::Shared(function_index) => Message::CallSharedRequest {
                request_id,
                function_index,
                args,
            },
        };
        Some(encode_frame(&message.encode()))
    }

    /// starts (or restarts) the UI state blob transfer with a request
    /// for block 0
    pub fn read_ui_state(&mut self, now: Instant) -> Vec<u8> {
        self.blob = Some(BlobTransfer {
            expected_block: 0,
            received: 0,
        });
        self.request_block(0, now)
    }

    fn request_block(&mut self, block_number: u16, now: Instant) -> Vec<u8> {
        let request_id = self.allocate_request_id();
        self.track(request_id, None, now);
        encode_frame(
            &Message::ReadUiStateBlock {
                request_id,
                block_number,
            }
            .encode(),
        )
    }

    pub fn read_i2c_devices(&mut self, offset: u16, now: Instant) -> Vec<u8> {
        let request_id = self.allocate_request_id();
        self.track(request_id, None, now);
        encode_frame(&Message::ReadI2cDevices { request_id, offset }.encode())
    }

    /// routes one received frame payload.
    ///
    /// returns the follow-up frames to transmit: released coalesced
    /// calls and the next blob block request.
    pub fn handle_frame(
        &mut self,
        payload: &[u8],
        handler: &mut dyn DeckHandler,
        now: Instant,
    ) -> Result<Vec<Vec<u8>>, WireError> {
        let message = Message::decode(payload)?;
        let mut transmit: Vec<Vec<u8>> = Vec::new();

        match message {
            Message::CallReturn { request_id, values } => {
                match self.pending.remove(&request_id) {
                    Some(pending) => {
                        handler.on_return(request_id, &values);
                        if let Some(key) = pending.key {
                            if let Some(frame) = self.release_slot(key, now) {
                                transmit.push(frame);
                            }
                        }
                    }
                    None => warn!("return for unknown request {}", request_id),
                }
            }
            Message::Notification {
                machine_index,
                function_index,
                values,
            } => {
                handler.on_notification(machine_index, function_index, &values);
            }
            Message::Error {
                request_id,
                error_code,
                message,
            } => {
                if let Some(request_id) = request_id {
                    if let Some(pending) = self.pending.remove(&request_id) {
                        if let Some(key) = pending.key {
                            if let Some(frame) = self.release_slot(key, now) {
                                transmit.push(frame);
                            }
                        }
                    }
                    // an error reply aborts a running blob transfer
                    if self.blob.is_some() {
                        self.blob = None;
                    }
                }
                handler.on_error(request_id, error_code, &message);
            }
            Message::UiStateBlockReply {
                request_id,
                total_size,
                block_number,
                block,
            } => {
                self.pending.remove(&request_id);

                let Some(transfer) = self.blob.as_mut() else {
                    warn!("unsolicited ui state block {}", block_number);
                    return Ok(transmit);
                };

                if block_number != transfer.expected_block {
                    warn!(
                        "ui state block {} out of order, expected {}",
                        block_number, transfer.expected_block
                    );
                    self.blob = None;
                    handler.on_error(
                        Some(request_id),
                        ERROR_CODE_TRANSFER_ABORTED,
                        "out-of-order ui state block",
                    );
                    return Ok(transmit);
                }

                handler.on_ui_state_block(request_id, total_size, block_number, &block);
                transfer.received += block.len();
                transfer.expected_block += 1;
                let next_block = transfer.expected_block;

                let complete = transfer.received >= total_size as usize;
                if complete {
                    self.blob = None;
                } else if block.is_empty() {
                    // the device cannot make progress, stop rather
                    // than requesting the same nothing forever
                    warn!("short ui state block before total_size was reached");
                    self.blob = None;
                    handler.on_error(
                        Some(request_id),
                        ERROR_CODE_TRANSFER_ABORTED,
                        "empty ui state block",
                    );
                } else {
                    transmit.push(self.request_block(next_block, now));
                }
            }
            Message::I2cDevicesReply {
                request_id,
                total_count,
                devices,
            } => {
                self.pending.remove(&request_id);
                handler.on_i2c_devices(request_id, total_count, &devices);
            }
            other => {
                warn!("device-bound message received by the deck: {:?}", other);
            }
        }

        Ok(transmit)
    }

    /// fires the watchdog: expired requests are abandoned and their
    /// slots released. returns frames for released coalesced calls.
    pub fn poll(&mut self, handler: &mut dyn DeckHandler, now: Instant) -> Vec<Vec<u8>> {
        let expired: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(request_id, _)| *request_id)
            .collect();

        let mut transmit = Vec::new();
        for request_id in expired {
            let Some(pending) = self.pending.remove(&request_id) else {
                continue;
            };
            warn!("request {} timed out", request_id);
            handler.on_error(Some(request_id), ERROR_CODE_TIMEOUT, "request timed out");

            match pending.key {
                Some(key) => {
                    if let Some(frame) = self.release_slot(key, now) {
                        transmit.push(frame);
                    }
                }
                None => {
                    // a blob or device-listing request; a transfer
                    // cannot continue without its reply
                    self.blob = None;
                }
            }
        }
        transmit
    }

    fn release_slot(&mut self, key: CallKey, now: Instant) -> Option<Vec<u8>> {
        let queued = match self.slots.get_mut(&key) {
            Some(slot) => {
                slot.in_flight = None;
                slot.queued.take()
            }
            None => None,
        };
        queued.and_then(|args| self.submit(key, args, now))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use fluxvm_types::StackWord;
    use fluxvm_wire::{FrameAccumulator, Message};
    use pretty_assertions::assert_eq;

    use super::{Deck, DeckHandler, ERROR_CODE_TIMEOUT, ERROR_CODE_TRANSFER_ABORTED};

    #[derive(Default)]
    struct RecordingHandler {
        returns: Vec<(u16, Vec<StackWord>)>,
        notifications: Vec<(u16, u16, Vec<StackWord>)>,
        errors: Vec<(Option<u16>, u16, String)>,
        blocks: Vec<(u16, u32, u16, Vec<u8>)>,
        devices: Vec<(u16, u16, Vec<u16>)>,
    }

    impl DeckHandler for RecordingHandler {
        fn on_return(&mut self, request_id: u16, values: &[StackWord]) {
            self.returns.push((request_id, values.to_vec()));
        }
        fn on_notification(
            &mut self,
            machine_index: u16,
            function_index: u16,
            values: &[StackWord],
        ) {
            self.notifications
                .push((machine_index, function_index, values.to_vec()));
        }
        fn on_error(&mut self, request_id: Option<u16>, error_code: u16, message: &str) {
            self.errors
                .push((request_id, error_code, message.to_string()));
        }
        fn on_ui_state_block(
            &mut self,
            request_id: u16,
            total_size: u32,
            block_number: u16,
            block: &[u8],
        ) {
            self.blocks
                .push((request_id, total_size, block_number, block.to_vec()));
        }
        fn on_i2c_devices(&mut self, request_id: u16, total_count: u16, devices: &[u16]) {
            self.devices
                .push((request_id, total_count, devices.to_vec()));
        }
    }

    fn decode_frame(frame: &[u8]) -> Message {
        let mut accumulator = FrameAccumulator::new();
        let payloads = accumulator.feed(frame);
        assert_eq!(payloads.len(), 1);
        Message::decode(&payloads[0].clone().unwrap()).unwrap()
    }

    #[test]
    fn test_calls_on_the_same_key_coalesce() {
        let mut deck = Deck::new();
        let mut handler = RecordingHandler::default();
        let start = Instant::now();

        let first = deck.call(0, 5, vec![1], start);
        assert!(first.is_some());
        let Message::CallRequest { request_id, .. } = decode_frame(&first.unwrap()) else {
            panic!("expected a call request");
        };

        // two more calls while the first is in flight: only the
        // latest parameters survive
        assert_eq!(deck.call(0, 5, vec![2], start), None);
        assert_eq!(deck.call(0, 5, vec![3], start), None);

        // a different key is not affected
        assert!(deck.call(1, 5, vec![9], start).is_some());

        let reply = Message::CallReturn {
            request_id,
            values: vec![],
        };
        let transmit = deck
            .handle_frame(&reply.encode(), &mut handler, start)
            .unwrap();

        assert_eq!(transmit.len(), 1);
        let Message::CallRequest { args, .. } = decode_frame(&transmit[0]) else {
            panic!("expected the coalesced call");
        };
        assert_eq!(args, vec![3]);
        assert_eq!(handler.returns.len(), 1);
    }

    #[test]
    fn test_watchdog_releases_the_slot() {
        let mut deck = Deck::new().with_timeout(Duration::from_millis(200));
        let mut handler = RecordingHandler::default();
        let start = Instant::now();

        deck.call(2, 1, vec![7], start).unwrap();
        assert_eq!(deck.call(2, 1, vec![8], start), None);

        // nothing expires before the deadline
        assert_eq!(
            deck.poll(&mut handler, start + Duration::from_millis(100))
                .len(),
            0
        );

        let transmit = deck.poll(&mut handler, start + Duration::from_millis(250));
        assert_eq!(handler.errors.len(), 1);
        assert_eq!(handler.errors[0].1, ERROR_CODE_TIMEOUT);

        // the coalesced call goes out after the timeout
        assert_eq!(transmit.len(), 1);
        let Message::CallRequest { args, .. } = decode_frame(&transmit[0]) else {
            panic!("expected the coalesced call");
        };
        assert_eq!(args, vec![8]);
    }

    #[test]
    fn test_request_ids_wrap() {
        let mut deck = Deck::new();
        deck.next_request_id = u16::MAX;
        let start = Instant::now();

        let frame = deck.call(0, 0, vec![], start).unwrap();
        let Message::CallRequest { request_id, .. } = decode_frame(&frame) else {
            panic!("expected a call request");
        };
        assert_eq!(request_id, u16::MAX);

        let frame = deck.call(0, 1, vec![], start).unwrap();
        let Message::CallRequest { request_id, .. } = decode_frame(&frame) else {
            panic!("expected a call request");
        };
        assert_eq!(request_id, 0);
    }

    fn block_reply(deck_frame: &[u8], blob: &[u8]) -> Message {
        // simulates the device side for one ReadUiStateBlock frame
        let Message::ReadUiStateBlock {
            request_id,
            block_number,
        } = decode_frame(deck_frame)
        else {
            panic!("expected a block request");
        };
        let start = (block_number as usize) * 256;
        let end = (start + 256).min(blob.len());
        Message::UiStateBlockReply {
            request_id,
            total_size: blob.len() as u32,
            block_number,
            block: blob[start.min(blob.len())..end].to_vec(),
        }
    }

    #[test]
    fn test_ui_blob_transfer_runs_to_completion() {
        let mut deck = Deck::new();
        let mut handler = RecordingHandler::default();
        let start = Instant::now();
        let blob: Vec<u8> = (0..600u32).map(|value| value as u8).collect();

        let mut outgoing = deck.read_ui_state(start);
        let mut hops = 0;
        loop {
            let reply = block_reply(&outgoing, &blob);
            let transmit = deck
                .handle_frame(&reply.encode(), &mut handler, start)
                .unwrap();
            match transmit.into_iter().next() {
                Some(next) => outgoing = next,
                None => break,
            }
            hops += 1;
            assert!(hops < 10, "transfer did not terminate");
        }

        let collected: Vec<u8> = handler
            .blocks
            .iter()
            .flat_map(|(_, _, _, block)| block.iter().copied())
            .collect();
        assert_eq!(collected, blob);
        assert_eq!(
            handler
                .blocks
                .iter()
                .map(|(_, _, number, _)| *number)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(handler.errors.is_empty());
    }

    #[test]
    fn test_out_of_order_block_aborts_the_transfer() {
        let mut deck = Deck::new();
        let mut handler = RecordingHandler::default();
        let start = Instant::now();
        let blob = vec![7u8; 600];

        let first = deck.read_ui_state(start);
        let Message::ReadUiStateBlock { request_id, .. } = decode_frame(&first) else {
            panic!("expected a block request");
        };

        // block 2 arrives instead of block 0
        let wrong = Message::UiStateBlockReply {
            request_id,
            total_size: 600,
            block_number: 2,
            block: vec![7u8; 256],
        };
        let transmit = deck
            .handle_frame(&wrong.encode(), &mut handler, start)
            .unwrap();

        assert_eq!(transmit.len(), 0);
        assert!(handler.blocks.is_empty());
        assert_eq!(handler.errors.len(), 1);
        assert_eq!(handler.errors[0].1, ERROR_CODE_TRANSFER_ABORTED);

        // no restore attempt: a fresh reply is now unsolicited
        let late = block_reply(&first, &blob);
        let transmit = deck
            .handle_frame(&late.encode(), &mut handler, start)
            .unwrap();
        assert_eq!(transmit.len(), 0);
        assert!(handler.blocks.is_empty());
    }

    #[test]
    fn test_zero_total_ends_immediately() {
        let mut deck = Deck::new();
        let mut handler = RecordingHandler::default();
        let start = Instant::now();

        let first = deck.read_ui_state(start);
        let reply = block_reply(&first, &[]);
        let transmit = deck
            .handle_frame(&reply.encode(), &mut handler, start)
            .unwrap();

        assert_eq!(transmit.len(), 0);
        assert_eq!(handler.blocks.len(), 1);
        assert_eq!(handler.blocks[0].1, 0);
        assert!(handler.errors.is_empty());
    }

    #[test]
    fn test_end_to_end_against_the_device_service() {
        use fluxvm_image::{bytecode_writer::BytecodeWriter, image_builder::ImageBuilder};
        use fluxvm_runtime::service::{DeckService, NullStore};
        use fluxvm_types::opcode::Opcode;

        // function 0 is init, function 1 adds one to its argument
        let init = BytecodeWriter::new().write_opcode(Opcode::exit).to_words();
        let add_one = BytecodeWriter::new()
            .write_opcode_with(Opcode::sload, 0)
            .write_opcode_with(Opcode::push, 1)
            .write_opcode(Opcode::add)
            .write_opcode(Opcode::exit)
            .to_words();
        let words = ImageBuilder {
            globals_size: 1,
            instances: vec![(0, 0)],
            type_function_bodies: vec![vec![init, add_one]],
            shared_function_bodies: vec![],
            static_blocks: vec![],
        }
        .build();

        let mut service = DeckService::new(NullStore, 512);
        let blob: Vec<u8> = (0..600u32).map(|value| value as u8).collect();
        service.restore(words, blob.clone()).unwrap();

        let mut deck = Deck::new();
        let mut handler = RecordingHandler::default();
        let mut accumulator = FrameAccumulator::new();
        let now = Instant::now();

        // a call round trip through real frames on both sides
        let frame = deck.call(0, 1, vec![41], now).unwrap();
        let payloads = accumulator.feed(&frame);
        let request = Message::decode(&payloads[0].clone().unwrap()).unwrap();
        for reply in service.handle_message(request) {
            deck.handle_frame(&reply.encode(), &mut handler, now).unwrap();
        }
        assert_eq!(handler.returns, vec![(0, vec![42])]);

        // the blob transfer against the real device pager
        let mut outgoing = deck.read_ui_state(now);
        loop {
            let payloads = accumulator.feed(&outgoing);
            let request = Message::decode(&payloads[0].clone().unwrap()).unwrap();
            let mut next = None;
            for reply in service.handle_message(request) {
                let transmit = deck
                    .handle_frame(&reply.encode(), &mut handler, now)
                    .unwrap();
                next = transmit.into_iter().next();
            }
            match next {
                Some(frame) => outgoing = frame,
                None => break,
            }
        }

        let collected: Vec<u8> = handler
            .blocks
            .iter()
            .flat_map(|(_, _, _, block)| block.iter().copied())
            .collect();
        assert_eq!(collected, blob);
        assert!(handler.errors.is_empty());
    }

    #[test]
    fn test_notifications_and_device_pages_are_delivered() {
        let mut deck = Deck::new();
        let mut handler = RecordingHandler::default();
        let start = Instant::now();

        deck.handle_frame(
            &Message::Notification {
                machine_index: 1,
                function_index: 3,
                values: vec![5, 6],
            }
            .encode(),
            &mut handler,
            start,
        )
        .unwrap();
        assert_eq!(handler.notifications, vec![(1, 3, vec![5, 6])]);

        let frame = deck.read_i2c_devices(0, start);
        let Message::ReadI2cDevices { request_id, .. } = decode_frame(&frame) else {
            panic!("expected a device listing request");
        };
        deck.handle_frame(
            &Message::I2cDevicesReply {
                request_id,
                total_count: 2,
                devices: vec![0x20, 0x48],
            }
            .encode(),
            &mut handler,
            start,
        )
        .unwrap();
        assert_eq!(handler.devices, vec![(request_id, 2, vec![0x20, 0x48])]);
    }
}
