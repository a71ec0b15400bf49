// SPDX-License-Identifier: GPL-3.0-or-later

//! Sound bank metadata and the event reverse index.
//!
//! A bank is a sequence of chunks (`tag: [u8; 4]`, `size: u32 LE`, payload).
//! Only two matter here:
//!
//! - `BKHD`: bank header, starting with the format version and bank id
//! - `HIRC`: the object hierarchy. Events (type 4) list action ids and
//!   actions (type 3) point at the sound object they play
//!
//! Walking event -> actions -> targets gives the sound objects an event
//! plays, which is what the playlist descriptors generated from the bank are
//! named after.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{AudioError, BankError};
use crate::hash::hash_event_name;

const HIRC_EVENT: u8 = 4;
const HIRC_ACTION: u8 = 3;
/// Banks up to this version store an event's action count as a `u32`.
const LEGACY_EVENT_COUNT_VERSION: u32 = 122;

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], BankError> {
        if self.remaining() < needed {
            return Err(BankError::Truncated {
                offset: self.offset,
                needed,
            });
        }
        let slice = &self.data[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, BankError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, BankError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, BankError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Variable-length count: 7 bits per byte, high bit set on continuation.
    fn var_u32(&mut self) -> Result<u32, BankError> {
        let mut value = 0u32;
        for _ in 0..5 {
            let byte = self.u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }
}

/// Parsed metadata of one bank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankInfo {
    pub version: u32,
    pub bank_id: u32,
    /// Event id -> action ids, in declaration order.
    pub events: HashMap<u32, Vec<u32>>,
    /// Action id -> target object id.
    pub actions: HashMap<u32, u32>,
}

impl BankInfo {
    /// Sound object ids played by `event_id`.
    pub fn targets_for(&self, event_id: u32) -> Vec<u32> {
        let mut targets = Vec::new();
        for action in self.events.get(&event_id).into_iter().flatten() {
            if let Some(&target) = self.actions.get(action) {
                if target != 0 && !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }
}

pub fn parse_bank(data: &[u8]) -> Result<BankInfo, BankError> {
    let mut reader = Reader::new(data);
    let mut info = BankInfo::default();
    let mut saw_header = false;
    let mut saw_hierarchy = false;

    while reader.remaining() >= 8 {
        let tag = reader.take(4)?;
        let size = reader.u32()? as usize;
        let payload = reader.take(size)?;

        match tag {
            b"BKHD" => {
                let mut header = Reader::new(payload);
                info.version = header.u32()?;
                info.bank_id = header.u32()?;
                saw_header = true;
            }
            b"HIRC" => {
                if !saw_header {
                    return Err(BankError::MissingChunk("BKHD"));
                }
                parse_hierarchy(payload, &mut info)?;
                saw_hierarchy = true;
            }
            _ => {}
        }
    }

    if !saw_header {
        return Err(BankError::MissingChunk("BKHD"));
    }
    if !saw_hierarchy {
        debug!(target: "audio", bank_id = info.bank_id, "bank has no HIRC chunk");
    }
    Ok(info)
}

fn parse_hierarchy(payload: &[u8], info: &mut BankInfo) -> Result<(), BankError> {
    let mut reader = Reader::new(payload);
    let count = reader.u32()?;

    for _ in 0..count {
        let kind = reader.u8()?;
        let size = reader.u32()? as usize;
        let body = reader.take(size)?;
        let mut object = Reader::new(body);
        let id = object.u32()?;

        match kind {
            HIRC_EVENT => {
                let actions = if info.version <= LEGACY_EVENT_COUNT_VERSION {
                    object.u32()?
                } else {
                    object.var_u32()?
                };
                let mut ids = Vec::with_capacity(actions as usize);
                for _ in 0..actions {
                    ids.push(object.u32()?);
                }
                info.events.insert(id, ids);
            }
            HIRC_ACTION => {
                let _action_type = object.u16()?;
                let target = object.u32()?;
                info.actions.insert(id, target);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Where an event id can be decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankHit {
    pub bank: PathBuf,
    /// Target sound objects; empty when the bank was matched by name.
    pub sound_ids: Vec<u32>,
}

/// Event id -> banks that declare it.
#[derive(Debug, Clone, Default)]
pub struct BankIndex {
    hits: HashMap<u32, Vec<BankHit>>,
    banks: usize,
}

impl BankIndex {
    /// Scan `root` recursively for `*.bnk` files.
    ///
    /// Unreadable or malformed banks are still indexed by file name.
    pub fn build(root: &Path) -> Result<Self, AudioError> {
        let mut index = Self::default();
        let mut stack = vec![root.to_path_buf()];

        while let Some(directory) = stack.pop() {
            let entries = std::fs::read_dir(&directory).map_err(|e| AudioError::io(&directory, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| AudioError::io(&directory, e))?;
                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| AudioError::io(&path, e))?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                let is_bank = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("bnk"));
                if is_bank {
                    index.add_bank(&path);
                }
            }
        }

        info!(
            target: "audio",
            root = %root.display(),
            banks = index.banks,
            events = index.hits.len(),
            "bank index built"
        );
        Ok(index)
    }

    fn add_bank(&mut self, path: &Path) {
        self.banks += 1;

        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty()) {
            self.insert(
                hash_event_name(stem),
                BankHit {
                    bank: path.to_path_buf(),
                    sound_ids: Vec::new(),
                },
            );
        }

        let parsed = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| parse_bank(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(info) => {
                for event_id in info.events.keys() {
                    self.insert(
                        *event_id,
                        BankHit {
                            bank: path.to_path_buf(),
                            sound_ids: info.targets_for(*event_id),
                        },
                    );
                }
            }
            Err(error) => {
                warn!(target: "audio", bank = %path.display(), %error, "bank metadata unreadable, indexed by name only");
            }
        }
    }

    fn insert(&mut self, event_id: u32, hit: BankHit) {
        let hits = self.hits.entry(event_id).or_default();
        match hits.iter_mut().find(|existing| existing.bank == hit.bank) {
            Some(existing) => {
                for id in hit.sound_ids {
                    if !existing.sound_ids.contains(&id) {
                        existing.sound_ids.push(id);
                    }
                }
            }
            None => hits.push(hit),
        }
    }

    pub fn lookup(&self, event_id: u32) -> &[BankHit] {
        self.hits.get(&event_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bank_count(&self) -> usize {
        self.banks
    }
}
