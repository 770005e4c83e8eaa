//! Archived (invalidated) shipments and the trees that hold them
use super::error::ArchiveError;
use super::shipment::{Shipment, TxResult, abort};
use super::transform::{ROOT, TransformConfig};
use super::types::TimeStamp;
use super::utils;
use serde::Serialize;
use serde_json::Value;
use sled::transaction::TransactionalTree;

pub const ARCHIVE_TREE: &str = "archived_shipments";
pub const ARCHIVE_CODES_TREE: &str = "archived_codes";
pub const ARCHIVE_BY_CLIENT_TREE: &str = "archived_by_client";

/// Weak reference to the client a shipment belonged to when it was archived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, minicbor::Encode, minicbor::Decode)]
#[serde(rename_all = "camelCase")]
pub struct ClientRef {
    #[n(0)]
    pub ingenio_code: String,
    #[n(1)]
    pub name: String,
}

// Persisted form, keyed by `id`. The snapshot is kept as the JSON text it
// was captured as, alongside its sha256.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ArchiveEntry {
    #[n(0)]
    pub id: String, // uuid7, sorts by creation time
    #[n(1)]
    pub code_gen: String,
    #[n(2)]
    pub reason: String,
    #[n(3)]
    pub client: Option<ClientRef>,
    #[n(4)]
    pub snapshot_json: String,
    #[n(5)]
    pub snapshot_digest: String,
    #[n(6)]
    pub created_at: TimeStamp,
}

impl ArchiveEntry {
    /// Captures a removed live shipment
    pub fn capture(id: String, shipment: &Shipment, reason: &str) -> Result<Self, ArchiveError> {
        let snapshot_json = serde_json::to_string(shipment)?;
        let snapshot_digest = sha256::digest(&snapshot_json);

        Ok(Self {
            id,
            code_gen: shipment.code_gen.clone(),
            reason: reason.to_string(),
            client: shipment.ingenio.as_ref().map(|c| ClientRef {
                ingenio_code: c.ingenio_code.clone(),
                name: c.name.clone(),
            }),
            snapshot_json,
            snapshot_digest,
            created_at: TimeStamp::new(),
        })
    }

    pub fn client_code(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.ingenio_code.as_str())
    }

    pub fn snapshot(&self) -> Result<Value, ArchiveError> {
        Ok(serde_json::from_str(&self.snapshot_json)?)
    }

    /// Parses the snapshot after checking it against the digest taken at capture
    pub fn verified_snapshot(&self) -> Result<Value, ArchiveError> {
        if sha256::digest(&self.snapshot_json) != self.snapshot_digest {
            return Err(ArchiveError::CorruptSnapshot {
                code_gen: self.code_gen.clone(),
            });
        }
        self.snapshot()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        Ok(minicbor::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        Ok(minicbor::decode(bytes)?)
    }

    pub fn parsed(&self) -> Result<ArchivedShipment, ArchiveError> {
        Ok(ArchivedShipment {
            id: self.id.clone(),
            code_gen: self.code_gen.clone(),
            reason: self.reason.clone(),
            client: self.client.clone(),
            snapshot: self.snapshot()?,
            created_at: self.created_at,
        })
    }
}

/// An archive entry with its snapshot parsed, as returned to internal callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedShipment {
    pub id: String,
    pub code_gen: String,
    pub reason: String,
    pub client: Option<ClientRef>,
    pub snapshot: Value,
    pub created_at: TimeStamp,
}

/// What a client-role caller is allowed to see of an archive entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientArchivedShipment {
    pub reason: String,
    pub created_at: TimeStamp,
    pub snapshot: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArchiveView {
    Internal(ArchivedShipment),
    Client(ClientArchivedShipment),
}

impl ArchiveView {
    pub fn snapshot(&self) -> &Value {
        match self {
            ArchiveView::Internal(entry) => &entry.snapshot,
            ArchiveView::Client(entry) => &entry.snapshot,
        }
    }
}

/// Redaction applied to every snapshot listed per client
pub fn client_redaction() -> TransformConfig {
    TransformConfig::new()
        .remove(ROOT, ["statuses"])
        .remove("shipmentAttachments", ["id", "updatedAt"])
}

/// Internal fields hidden from client-role callers, on top of the redaction
pub fn client_baseline() -> TransformConfig {
    TransformConfig::new()
        .remove(ROOT, ["id", "product", "currentStatus"])
        .remove("shipmentSeals", ["id", "sealDescription"])
}

/// The three archive trees as seen from inside a transaction
pub(crate) struct ArchiveTx<'a> {
    pub entries: &'a TransactionalTree,
    pub codes: &'a TransactionalTree,
    pub by_client: &'a TransactionalTree,
}

impl ArchiveTx<'_> {
    pub fn insert(&self, entry: &ArchiveEntry) -> TxResult<()> {
        if self.codes.get(entry.code_gen.as_bytes())?.is_some() {
            return abort(ArchiveError::Conflict(format!(
                "Shipment {} is already invalidated.",
                entry.code_gen
            )));
        }
        let bytes = entry.to_bytes().or_else(abort)?;
        self.entries.insert(entry.id.as_bytes(), bytes)?;
        self.codes
            .insert(entry.code_gen.as_bytes(), entry.id.as_bytes())?;
        if let Some(client) = entry.client_code() {
            self.by_client
                .insert(utils::scoped_key(client, &entry.id), entry.code_gen.as_bytes())?;
        }
        Ok(())
    }

    pub fn find_by_code(&self, code_gen: &str) -> TxResult<Option<ArchiveEntry>> {
        let Some(id) = self.codes.get(code_gen.as_bytes())? else {
            return Ok(None);
        };
        match self.entries.get(&id)? {
            Some(bytes) => ArchiveEntry::from_bytes(&bytes).map(Some).or_else(abort),
            None => Ok(None),
        }
    }

    pub fn delete(&self, entry: &ArchiveEntry) -> TxResult<()> {
        self.entries.remove(entry.id.as_bytes())?;
        self.codes.remove(entry.code_gen.as_bytes())?;
        if let Some(client) = entry.client_code() {
            self.by_client.remove(utils::scoped_key(client, &entry.id))?;
        }
        Ok(())
    }
}

/// Read side of the archive
#[derive(Clone)]
pub struct ArchiveStore {
    pub(crate) entries: sled::Tree,
    pub(crate) codes: sled::Tree,
    pub(crate) by_client: sled::Tree,
}

impl ArchiveStore {
    pub fn open(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            entries: db.open_tree(ARCHIVE_TREE)?,
            codes: db.open_tree(ARCHIVE_CODES_TREE)?,
            by_client: db.open_tree(ARCHIVE_BY_CLIENT_TREE)?,
        })
    }

    pub fn new_entry_id() -> String {
        utils::new_ordered_id()
    }

    pub fn find_by_code(&self, code_gen: &str) -> anyhow::Result<Option<ArchiveEntry>> {
        let Some(id) = self.codes.get(code_gen.as_bytes())? else {
            return Ok(None);
        };
        match self.entries.get(&id)? {
            Some(bytes) => Ok(Some(ArchiveEntry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists_by_code(&self, code_gen: &str) -> anyhow::Result<bool> {
        Ok(self.codes.contains_key(code_gen.as_bytes())?)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// One page of entries in creation order, with the total count
    pub fn page(&self, offset: usize, limit: usize) -> anyhow::Result<(Vec<ArchiveEntry>, usize)> {
        let mut entries = Vec::with_capacity(limit);
        for item in self.entries.iter().skip(offset).take(limit) {
            let (_, bytes) = item?;
            entries.push(ArchiveEntry::from_bytes(&bytes)?);
        }
        Ok((entries, self.count()))
    }

    /// One page of a client's entries in creation order, with the client's total
    pub fn page_by_client(
        &self,
        client_code: &str,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<(Vec<ArchiveEntry>, usize)> {
        let prefix = utils::scope_prefix(client_code);
        let mut total = 0;
        let mut entries = Vec::with_capacity(limit);
        for item in self.by_client.scan_prefix(&prefix) {
            let (key, _) = item?;
            if total >= offset && entries.len() < limit {
                let id = &key[prefix.len()..];
                if let Some(bytes) = self.entries.get(id)? {
                    entries.push(ArchiveEntry::from_bytes(&bytes)?);
                }
            }
            total += 1;
        }
        Ok((entries, total))
    }
}
