//! Key store - proving keys and key bundles
//!
//! Announced keys land in the staged tables until the consensus layer sees
//! them committed in a frame; handlers look in the main tables first and fall
//! back to staged. All values are prost-encoded announcements.

use prost::Message;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

use cadence_model::{KeyBundleAnnouncement, ProvingKeyAnnouncement};

use crate::error::StoreError;

const PROVING_KEY_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("proving_keys");
const STAGED_PROVING_KEY_TABLE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("staged_proving_keys");
const KEY_BUNDLE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("key_bundles");
const STAGED_KEY_BUNDLE_TABLE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("staged_key_bundles");

/// Persistent store for proving keys and key bundles.
pub struct KeyStore {
    db: Database,
}

impl KeyStore {
    /// Open or create a key store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PROVING_KEY_TABLE)?;
            let _ = write_txn.open_table(STAGED_PROVING_KEY_TABLE)?;
            let _ = write_txn.open_table(KEY_BUNDLE_TABLE)?;
            let _ = write_txn.open_table(STAGED_KEY_BUNDLE_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn get_raw(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<Vec<u8>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let value = table.get(key)?.ok_or(StoreError::NotFound)?;
        Ok(value.value().to_vec())
    }

    fn put_raw(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_proving_key(&self, key: &[u8]) -> Result<ProvingKeyAnnouncement, StoreError> {
        let bytes = self.get_raw(PROVING_KEY_TABLE, key)?;
        Ok(ProvingKeyAnnouncement::decode(bytes.as_slice())?)
    }

    pub fn put_proving_key(
        &self,
        announcement: &ProvingKeyAnnouncement,
    ) -> Result<(), StoreError> {
        self.put_raw(
            PROVING_KEY_TABLE,
            &announcement.proving_key_bytes,
            &announcement.encode_to_vec(),
        )
    }

    pub fn get_staged_proving_key(
        &self,
        key: &[u8],
    ) -> Result<ProvingKeyAnnouncement, StoreError> {
        let bytes = self.get_raw(STAGED_PROVING_KEY_TABLE, key)?;
        Ok(ProvingKeyAnnouncement::decode(bytes.as_slice())?)
    }

    pub fn put_staged_proving_key(
        &self,
        announcement: &ProvingKeyAnnouncement,
    ) -> Result<(), StoreError> {
        self.put_raw(
            STAGED_PROVING_KEY_TABLE,
            &announcement.proving_key_bytes,
            &announcement.encode_to_vec(),
        )
    }

    pub fn get_key_bundle(&self, proving_key: &[u8]) -> Result<KeyBundleAnnouncement, StoreError> {
        let bytes = self.get_raw(KEY_BUNDLE_TABLE, proving_key)?;
        Ok(KeyBundleAnnouncement::decode(bytes.as_slice())?)
    }

    pub fn put_key_bundle(
        &self,
        announcement: &KeyBundleAnnouncement,
    ) -> Result<(), StoreError> {
        self.put_raw(
            KEY_BUNDLE_TABLE,
            &announcement.proving_key_bytes,
            &announcement.encode_to_vec(),
        )
    }

    pub fn get_staged_key_bundle(
        &self,
        proving_key: &[u8],
    ) -> Result<KeyBundleAnnouncement, StoreError> {
        let bytes = self.get_raw(STAGED_KEY_BUNDLE_TABLE, proving_key)?;
        Ok(KeyBundleAnnouncement::decode(bytes.as_slice())?)
    }

    pub fn put_staged_key_bundle(
        &self,
        announcement: &KeyBundleAnnouncement,
    ) -> Result<(), StoreError> {
        self.put_raw(
            STAGED_KEY_BUNDLE_TABLE,
            &announcement.proving_key_bytes,
            &announcement.encode_to_vec(),
        )
    }
}
