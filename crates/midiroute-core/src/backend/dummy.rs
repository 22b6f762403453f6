use std::collections::VecDeque;

use super::{Backend, BackendBatch};
use crate::Result;

/// Owned raw packet, for queuing input and recording output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub frame: u32,
    pub port: u16,
    pub bytes: Vec<u8>,
}

impl RawPacket {
    pub fn new(frame: u32, port: u16, bytes: &[u8]) -> Self {
        Self {
            frame,
            port,
            bytes: bytes.to_vec(),
        }
    }
}

/// In-memory backend: replays queued input cycles and records every output
/// cycle. Used for tests and offline processing.
#[derive(Debug, Default)]
pub struct DummyBackend {
    in_ports: u16,
    out_ports: u16,
    input: VecDeque<Vec<RawPacket>>,
    output: Vec<Vec<RawPacket>>,
}

impl DummyBackend {
    pub fn new(in_ports: u16, out_ports: u16) -> Self {
        Self {
            in_ports,
            out_ports,
            ..Default::default()
        }
    }

    /// Queues one input cycle.
    pub fn queue_cycle(&mut self, packets: impl IntoIterator<Item = RawPacket>) {
        self.input.push_back(packets.into_iter().collect());
    }

    /// Queues one input cycle holding a single packet at frame 0.
    pub fn queue_bytes(&mut self, port: u16, bytes: &[u8]) {
        self.queue_cycle([RawPacket::new(0, port, bytes)]);
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    /// Output per cycle, in the order the cycles ran.
    pub fn sent(&self) -> &[Vec<RawPacket>] {
        &self.output
    }

    /// All output packets, flattened.
    pub fn sent_packets(&self) -> impl Iterator<Item = &RawPacket> + '_ {
        self.output.iter().flatten()
    }

    pub fn take_sent(&mut self) -> Vec<Vec<RawPacket>> {
        std::mem::take(&mut self.output)
    }
}

impl Backend for DummyBackend {
    fn in_ports(&self) -> u16 {
        self.in_ports
    }

    fn out_ports(&self) -> u16 {
        self.out_ports
    }

    fn next_cycle(&mut self, input: &mut BackendBatch) -> Result<bool> {
        let Some(packets) = self.input.pop_front() else {
            return Ok(false);
        };
        for packet in &packets {
            // Refused packets are counted by the batch.
            let _ = input.push(packet.frame, packet.port, &packet.bytes);
        }
        Ok(true)
    }

    fn send(&mut self, output: &BackendBatch) -> Result<()> {
        self.output.push(
            output
                .iter()
                .map(|p| RawPacket::new(p.frame, p.port, p.bytes))
                .collect(),
        );
        Ok(())
    }
}
