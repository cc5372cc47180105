//! Block-aligned FEC repair.
//!
//! Merges the source and repair packet streams, groups symbols by
//! source block number, and hands source packets downstream in order.
//! When a source packet is missing and enough symbols of its block have
//! arrived, the codec reconstructs it; when the stream has moved past
//! the block, the symbol is given up and concealment happens further
//! down the chain.

use log::{debug, warn};

use crate::packet::{seqnum_diff, Packet, PacketFlags, PacketReader};
use crate::rtp::Parser;

use super::BlockCodec;

/// FEC reader limits.
#[derive(Debug, Clone)]
pub struct FecReaderConfig {
    /// Maximum allowed block number jump; packets further ahead are
    /// treated as garbage and dropped.
    pub max_sbn_jump: u16,
    /// Bound on buffered repair data, in blocks.
    pub max_pending_blocks: usize,
}

impl Default for FecReaderConfig {
    fn default() -> Self {
        Self {
            max_sbn_jump: 100,
            max_pending_blocks: 32,
        }
    }
}

/// Statistics for monitoring repair behavior.
#[derive(Debug, Default, Clone)]
pub struct FecStats {
    pub symbols_recovered: u64,
    pub symbols_lost: u64,
    pub packets_dropped_stale: u64,
    pub blocks_processed: u64,
}

/// Packet-domain stage joining a source and a repair stream through a
/// block codec. Both upstreams must be sorted by sequence number.
pub struct FecReader {
    source: Box<dyn PacketReader>,
    repair: Box<dyn PacketReader>,
    codec: Box<dyn BlockCodec>,
    parser: Parser,
    k: usize,
    m: usize,
    max_sbn_jump: u16,
    started: bool,
    cur_sbn: u16,
    next_esi: usize,
    source_slots: Vec<Option<Packet>>,
    repair_slots: Vec<Option<Packet>>,
    /// First packet seen past the current block on each stream. A
    /// present source lookahead means the current block's source side
    /// is final (the upstream is sorted).
    source_ahead: Option<Packet>,
    repair_ahead: Option<Packet>,
    /// Symbol count at the last repair attempt; retry only when more
    /// symbols have arrived since.
    last_repair_count: usize,
    stats: FecStats,
}

impl FecReader {
    pub fn new(
        source: Box<dyn PacketReader>,
        repair: Box<dyn PacketReader>,
        codec: Box<dyn BlockCodec>,
        config: &FecReaderConfig,
        k: usize,
        m: usize,
    ) -> Self {
        Self {
            source,
            repair,
            codec,
            parser: Parser::new_source(true),
            k,
            m,
            max_sbn_jump: config.max_sbn_jump,
            started: false,
            cur_sbn: 0,
            next_esi: 0,
            source_slots: (0..k).map(|_| None).collect(),
            repair_slots: (0..m).map(|_| None).collect(),
            source_ahead: None,
            repair_ahead: None,
            last_repair_count: 0,
            stats: FecStats::default(),
        }
    }

    pub fn stats(&self) -> &FecStats {
        &self.stats
    }

    fn block_coords(packet: &Packet) -> Option<(u16, usize)> {
        packet
            .fec
            .as_ref()
            .map(|f| (f.source_block_number, f.encoding_symbol_id as usize))
    }

    /// Place a packet into the current block. Returns `false` when the
    /// packet belongs to a later block (stored as lookahead, stop
    /// fetching this stream).
    fn place(&mut self, packet: Packet, is_repair: bool) -> bool {
        let (sbn, esi) = match Self::block_coords(&packet) {
            Some(coords) => coords,
            None => {
                warn!("fec reader: packet without block coordinates");
                return true;
            }
        };

        let diff = seqnum_diff(sbn, self.cur_sbn);
        if diff < 0 {
            self.stats.packets_dropped_stale += 1;
            return true;
        }
        if diff > 0 {
            if diff > self.max_sbn_jump as i32 {
                warn!("fec reader: block number jump of {} exceeds limit", diff);
                return true;
            }
            if is_repair {
                self.repair_ahead = Some(packet);
            } else {
                self.source_ahead = Some(packet);
            }
            return false;
        }

        let slot = if is_repair {
            if esi < self.k || esi >= self.k + self.m {
                warn!("fec reader: repair symbol id {} out of range", esi);
                return true;
            }
            &mut self.repair_slots[esi - self.k]
        } else {
            if esi >= self.k {
                warn!("fec reader: source symbol id {} out of range", esi);
                return true;
            }
            &mut self.source_slots[esi]
        };

        if slot.is_none() {
            *slot = Some(packet);
        }
        true
    }

    fn fetch_source(&mut self) {
        if let Some(p) = self.source_ahead.take() {
            if !self.place(p, false) {
                return;
            }
        }
        while let Some(p) = self.source.read() {
            if !self.place(p, false) {
                return;
            }
        }
    }

    fn fetch_repair(&mut self) {
        if let Some(p) = self.repair_ahead.take() {
            if !self.place(p, true) {
                return;
            }
        }
        while let Some(p) = self.repair.read() {
            if !self.place(p, true) {
                return;
            }
        }
    }

    fn symbols_available(&self) -> usize {
        self.source_slots.iter().flatten().count() + self.repair_slots.iter().flatten().count()
    }

    /// Run the codec over the block if enough symbols arrived since the
    /// last attempt. Codec failures leave symbols missing; they are not
    /// stage failures.
    fn try_repair(&mut self) {
        let available = self.symbols_available();
        if available < self.k || available <= self.last_repair_count {
            return;
        }
        self.last_repair_count = available;

        let symbol_size = match self.source_slots.iter().flatten().next() {
            Some(p) => p.raw.len(),
            None => match self.repair_slots.iter().flatten().next() {
                Some(p) => p.fec.as_ref().unwrap().repair_payload.len(),
                None => return,
            },
        };

        if let Err(err) = self.codec.begin_block(self.k, self.m, symbol_size) {
            warn!("fec reader: codec rejected block: {}", err);
            return;
        }

        for (esi, slot) in self.source_slots.iter().enumerate() {
            if let Some(p) = slot {
                if let Err(err) = self.codec.add_symbol(esi, &p.raw) {
                    warn!("fec reader: codec rejected source symbol {}: {}", esi, err);
                    return;
                }
            }
        }
        for (idx, slot) in self.repair_slots.iter().enumerate() {
            if let Some(p) = slot {
                let payload = &p.fec.as_ref().unwrap().repair_payload;
                if let Err(err) = self.codec.add_symbol(self.k + idx, payload) {
                    warn!("fec reader: codec rejected repair symbol {}: {}", idx, err);
                    return;
                }
            }
        }

        let recovered = match self.codec.repair() {
            Ok(recovered) => recovered,
            Err(err) => {
                warn!("fec reader: repair failed for block {}: {}", self.cur_sbn, err);
                return;
            }
        };

        let template = match self.source_slots.iter().flatten().next() {
            Some(p) => (p.src_addr, p.dst_addr),
            None => match self.repair_slots.iter().flatten().next() {
                Some(p) => (p.src_addr, p.dst_addr),
                None => return,
            },
        };

        for (esi, bytes) in recovered {
            if esi >= self.k || self.source_slots[esi].is_some() {
                continue;
            }
            match self.parser.parse(template.0, template.1, &bytes) {
                Some(mut packet) => {
                    packet.flags |= PacketFlags::RESTORED;
                    debug!(
                        "fec reader: recovered symbol {} of block {}",
                        esi, self.cur_sbn
                    );
                    self.stats.symbols_recovered += 1;
                    self.source_slots[esi] = Some(packet);
                }
                None => {
                    warn!(
                        "fec reader: recovered symbol {} of block {} does not parse",
                        esi, self.cur_sbn
                    );
                }
            }
        }
    }

    fn advance_block(&mut self) {
        self.cur_sbn = self.cur_sbn.wrapping_add(1);
        self.next_esi = 0;
        self.last_repair_count = 0;
        self.source_slots.iter_mut().for_each(|s| *s = None);
        self.repair_slots.iter_mut().for_each(|s| *s = None);
        self.stats.blocks_processed += 1;
    }
}

impl PacketReader for FecReader {
    fn read(&mut self) -> Option<Packet> {
        loop {
            if !self.started {
                // Wait for the beginning of a block before repairing;
                // packets from a partial first block pass straight
                // through.
                let packet = self.source.read()?;
                match Self::block_coords(&packet) {
                    Some((sbn, 0)) => {
                        debug!("fec reader: aligned at block {}", sbn);
                        self.cur_sbn = sbn;
                        self.started = true;
                        self.place(packet, false);
                    }
                    _ => return Some(packet),
                }
            }

            self.fetch_source();
            self.fetch_repair();

            if self.next_esi == self.k {
                self.advance_block();
                continue;
            }

            // Emitted packets stay in their slots until the block is
            // released; the codec may still need them as symbols.
            if let Some(packet) = self.source_slots[self.next_esi].clone() {
                self.next_esi += 1;
                return Some(packet);
            }

            self.try_repair();
            if self.source_slots[self.next_esi].is_some() {
                continue;
            }

            if self.source_ahead.is_some() {
                // The sorted source stream has moved past this block;
                // the symbol is not coming back.
                self.stats.symbols_lost += 1;
                self.next_esi += 1;
                continue;
            }

            return None;
        }
    }
}
