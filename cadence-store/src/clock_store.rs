//! Clock store - finalized and candidate frame persistence
//!
//! Tables:
//! - finalized: (filter, frame_number) → ClockFrame bytes
//! - finalized_proofs: (filter, frame_number) → opaque finalization proof
//! - candidate: (filter, frame_number, parent_selector, distance, selector) → ClockFrame bytes
//!
//! Big-integer key components are left-padded to 32 bytes so lexicographic
//! key order equals numeric order; within a `(filter, parent_selector)`
//! bucket candidates therefore iterate in ascending distance.

use prost::Message;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;

use cadence_model::ClockFrame;

use crate::error::StoreError;

const FINALIZED_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("clock_finalized");
const FINALIZED_PROOF_TABLE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("clock_finalized_proofs");
const CANDIDATE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("clock_candidate");

/// Width every big-integer key component is padded to.
const COMPONENT_WIDTH: usize = 32;

/// Persistent store for finalized and candidate clock frames.
pub struct ClockStore {
    db: Database,
}

/// Atomicity unit for clock-store writes. One candidate insert per
/// transaction; dropping without [`commit`](Self::commit) aborts.
pub struct ClockTransaction {
    txn: WriteTransaction,
}

impl ClockTransaction {
    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn abort(self) -> Result<(), StoreError> {
        self.txn.abort()?;
        Ok(())
    }
}

fn pad_component(bytes: &[u8]) -> Result<[u8; COMPONENT_WIDTH], StoreError> {
    // Strip leading zeros first: big-endian big-integer encodings are not
    // required to be normalized.
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => &[],
    };
    if significant.len() > COMPONENT_WIDTH {
        return Err(StoreError::OversizedKeyComponent {
            len: significant.len(),
            max: COMPONENT_WIDTH,
        });
    }
    let mut out = [0u8; COMPONENT_WIDTH];
    out[COMPONENT_WIDTH - significant.len()..].copy_from_slice(significant);
    Ok(out)
}

fn finalized_key(filter: &[u8], frame_number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + filter.len() + 8);
    key.extend_from_slice(&(filter.len() as u16).to_be_bytes());
    key.extend_from_slice(filter);
    key.extend_from_slice(&frame_number.to_be_bytes());
    key
}

fn candidate_bucket(filter: &[u8], frame_number: u64, parent: &[u8; COMPONENT_WIDTH]) -> Vec<u8> {
    let mut key = finalized_key(filter, frame_number);
    key.extend_from_slice(parent);
    key
}

fn candidate_key(
    filter: &[u8],
    frame_number: u64,
    parent: &[u8; COMPONENT_WIDTH],
    distance: &[u8; COMPONENT_WIDTH],
    selector: &[u8; COMPONENT_WIDTH],
) -> Vec<u8> {
    let mut key = candidate_bucket(filter, frame_number, parent);
    key.extend_from_slice(distance);
    key.extend_from_slice(selector);
    key
}

impl ClockStore {
    /// Open or create a clock store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FINALIZED_TABLE)?;
            let _ = write_txn.open_table(FINALIZED_PROOF_TABLE)?;
            let _ = write_txn.open_table(CANDIDATE_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub fn new_transaction(&self) -> Result<ClockTransaction, StoreError> {
        Ok(ClockTransaction {
            txn: self.db.begin_write()?,
        })
    }

    /// Finalized frame at `(filter, frame_number)`, with its opaque
    /// finalization proof when one was recorded.
    pub fn get_data_clock_frame(
        &self,
        filter: &[u8],
        frame_number: u64,
    ) -> Result<(ClockFrame, Option<Vec<u8>>), StoreError> {
        let key = finalized_key(filter, frame_number);
        let read_txn = self.db.begin_read()?;

        let table = read_txn.open_table(FINALIZED_TABLE)?;
        let frame_bytes = table.get(key.as_slice())?.ok_or(StoreError::NotFound)?;
        let frame = ClockFrame::decode(frame_bytes.value())?;

        let proof_table = read_txn.open_table(FINALIZED_PROOF_TABLE)?;
        let proof = proof_table
            .get(key.as_slice())?
            .map(|guard| guard.value().to_vec());

        Ok((frame, proof))
    }

    /// Persist a finalized frame, unique per `(filter, frame_number)`.
    pub fn put_data_clock_frame(
        &self,
        frame: &ClockFrame,
        proof: Option<&[u8]>,
        txn: &ClockTransaction,
    ) -> Result<(), StoreError> {
        let key = finalized_key(&frame.filter, frame.frame_number);
        let mut table = txn.txn.open_table(FINALIZED_TABLE)?;
        table.insert(key.as_slice(), frame.encode_to_vec().as_slice())?;
        if let Some(proof) = proof {
            let mut proof_table = txn.txn.open_table(FINALIZED_PROOF_TABLE)?;
            proof_table.insert(key.as_slice(), proof)?;
        }
        Ok(())
    }

    /// Persist a candidate frame under
    /// `(filter, parent_selector, distance, selector)`.
    pub fn put_candidate_data_clock_frame(
        &self,
        parent_selector: &[u8],
        distance: &[u8],
        selector: &[u8],
        frame: &ClockFrame,
        txn: &ClockTransaction,
    ) -> Result<(), StoreError> {
        let key = candidate_key(
            &frame.filter,
            frame.frame_number,
            &pad_component(parent_selector)?,
            &pad_component(distance)?,
            &pad_component(selector)?,
        );
        let mut table = txn.txn.open_table(CANDIDATE_TABLE)?;
        table.insert(key.as_slice(), frame.encode_to_vec().as_slice())?;
        Ok(())
    }

    /// Candidates at `frame_number` whose parent is `parent_selector`, in
    /// ascending distance order. The iterator snapshots at `first()`.
    pub fn range_candidate_data_clock_frames(
        &self,
        filter: &[u8],
        parent_selector: &[u8],
        frame_number: u64,
    ) -> Result<CandidateFrameIter<'_>, StoreError> {
        Ok(CandidateFrameIter {
            store: self,
            filter: filter.to_vec(),
            parent_selector: parent_selector.to_vec(),
            frame_number,
            rows: None,
            pos: 0,
        })
    }

    fn load_candidates(
        &self,
        filter: &[u8],
        parent_selector: &[u8],
        frame_number: u64,
    ) -> Result<Vec<ClockFrame>, StoreError> {
        let bucket = candidate_bucket(filter, frame_number, &pad_component(parent_selector)?);
        let mut upper = bucket.clone();
        upper.extend_from_slice(&[0xFF; COMPONENT_WIDTH * 2]);
        let mut lower = bucket;
        lower.extend_from_slice(&[0x00; COMPONENT_WIDTH * 2]);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CANDIDATE_TABLE)?;

        let mut rows = Vec::new();
        for entry in table.range(lower.as_slice()..=upper.as_slice())? {
            let (_, value) = entry?;
            rows.push(ClockFrame::decode(value.value())?);
        }
        Ok(rows)
    }
}

/// Cursor over a candidate bucket. `first` materializes the snapshot;
/// `close` releases it, and dropping the iterator is the backstop for any
/// exit path that skips `close`.
pub struct CandidateFrameIter<'a> {
    store: &'a ClockStore,
    filter: Vec<u8>,
    parent_selector: Vec<u8>,
    frame_number: u64,
    rows: Option<Vec<ClockFrame>>,
    pos: usize,
}

impl CandidateFrameIter<'_> {
    /// Position on the first candidate; returns whether one exists.
    pub fn first(&mut self) -> Result<bool, StoreError> {
        if self.rows.is_none() {
            self.rows = Some(self.store.load_candidates(
                &self.filter,
                &self.parent_selector,
                self.frame_number,
            )?);
        }
        self.pos = 0;
        Ok(self.valid())
    }

    pub fn valid(&self) -> bool {
        self.rows
            .as_ref()
            .is_some_and(|rows| self.pos < rows.len())
    }

    pub fn next(&mut self) {
        if self.valid() {
            self.pos += 1;
        }
    }

    /// The frame under the cursor; `NotFound` when the cursor is exhausted
    /// or `first` has not been called.
    pub fn value(&self) -> Result<&ClockFrame, StoreError> {
        self.rows
            .as_ref()
            .and_then(|rows| rows.get(self.pos))
            .ok_or(StoreError::NotFound)
    }

    /// Release the snapshot.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.rows = None;
        Ok(())
    }
}
