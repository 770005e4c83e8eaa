//! Live shipment records and the sled-backed live store
use super::error::ArchiveError;
use super::types::TimeStamp;
use super::utils;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};

pub const SHIPMENTS_TREE: &str = "shipments";

/// Client (mill) a shipment belongs to, keyed by `ingenio_code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub ingenio_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub license: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub plate: String,
    pub trailer_plate: Option<String>,
    pub truck_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub id: String,
    pub status: String,
    pub observation: Option<String>,
    pub created_at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub id: String,
    pub file_url: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub attachment_type: String,
    pub created_at: TimeStamp,
    pub updated_at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seal {
    #[serde(default)]
    pub id: String,
    pub seal_code: String,
    pub seal_description: Option<String>,
}

/// A live shipment. Associations are carried by business key so a snapshot
/// can be re-materialized after surrogate ids have gone stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    #[serde(default)]
    pub id: String,
    pub code_gen: String,
    pub product: String,
    pub operation_type: String,
    pub load_type: String,
    pub transporter: String,
    pub product_quantity: f64,
    pub product_quantity_kg: f64,
    pub unit_measure: String,
    pub current_status: Option<u32>,
    pub ingenio: Option<Client>,
    pub driver: Option<Driver>,
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub shipment_attachments: Vec<Attachment>,
    #[serde(default)]
    pub shipment_seals: Vec<Seal>,
    pub created_at: TimeStamp,
    pub updated_at: TimeStamp,
}

impl Shipment {
    pub fn client_code(&self) -> Option<&str> {
        self.ingenio.as_ref().map(|c| c.ingenio_code.as_str())
    }

    /// Issues fresh surrogate ids for the shipment and every child row
    fn assign_surrogate_ids(&mut self) -> anyhow::Result<()> {
        self.id = utils::new_uuid_to_bech32("shp")?;
        for status in &mut self.statuses {
            status.id = utils::new_uuid_to_bech32("sts")?;
        }
        for attachment in &mut self.shipment_attachments {
            attachment.id = utils::new_uuid_to_bech32("att")?;
        }
        for seal in &mut self.shipment_seals {
            seal.id = utils::new_uuid_to_bech32("sel")?;
        }
        Ok(())
    }

    /// Fields that identify the shipment in business terms, with every
    /// surrogate id blanked out
    pub fn business_view(&self) -> Shipment {
        let mut view = self.clone();
        view.id.clear();
        view.updated_at = view.created_at;
        view.statuses.iter_mut().for_each(|s| s.id.clear());
        view.shipment_attachments.iter_mut().for_each(|a| a.id.clear());
        view.shipment_seals.iter_mut().for_each(|s| s.id.clear());
        view
    }
}

/// Persistence for active shipments, keyed by business code
#[derive(Clone)]
pub struct ShipmentStore {
    tree: sled::Tree,
}

impl ShipmentStore {
    pub fn open(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree(SHIPMENTS_TREE)?,
        })
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    /// Registers a new live shipment, assigning surrogate ids
    pub fn create(&self, mut shipment: Shipment) -> anyhow::Result<Shipment> {
        shipment.assign_surrogate_ids()?;
        let bytes = serde_json::to_vec(&shipment)?;

        let swapped = self.tree.compare_and_swap(
            shipment.code_gen.as_bytes(),
            None as Option<&[u8]>,
            Some(bytes),
        )?;
        if swapped.is_err() {
            return Err(ArchiveError::Conflict(format!(
                "Shipment with codeGen {} already exists.",
                shipment.code_gen
            ))
            .into());
        }
        Ok(shipment)
    }

    pub fn find_by_code(&self, code_gen: &str) -> anyhow::Result<Option<Shipment>> {
        match self.tree.get(code_gen.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists_by_code(&self, code_gen: &str) -> anyhow::Result<bool> {
        Ok(self.tree.contains_key(code_gen.as_bytes())?)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<ArchiveError>>;

pub(crate) fn abort<T>(err: ArchiveError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Removes the live record for `code_gen` and returns it in full
pub(crate) fn remove_and_return(tx: &TransactionalTree, code_gen: &str) -> TxResult<Shipment> {
    let Some(bytes) = tx.remove(code_gen.as_bytes())? else {
        return abort(ArchiveError::NotFound(format!(
            "Shipment with codeGen {code_gen} was not found."
        )));
    };
    serde_json::from_slice(&bytes).or_else(|e| abort(e.into()))
}

pub(crate) fn exists_by_code(tx: &TransactionalTree, code_gen: &str) -> TxResult<bool> {
    Ok(tx.get(code_gen.as_bytes())?.is_some())
}

/// Writes a materialized record. The business code is unique among live
/// shipments, so a concurrent writer that got there first wins.
pub(crate) fn insert_live(tx: &TransactionalTree, shipment: &Shipment) -> TxResult<()> {
    if exists_by_code(tx, &shipment.code_gen)? {
        return abort(ArchiveError::Conflict(format!(
            "Cannot restore shipment {}: a live shipment with this code already exists.",
            shipment.code_gen
        )));
    }
    let bytes = serde_json::to_vec(shipment).or_else(|e| abort(e.into()))?;
    tx.insert(shipment.code_gen.as_bytes(), bytes)?;
    Ok(())
}

/// Builds a full live record from a snapshot, with fresh surrogate ids for
/// the shipment and all of its child rows.
pub fn materialize_from_snapshot(snapshot: &Value) -> anyhow::Result<Shipment> {
    let mut shipment: Shipment = serde_json::from_value(snapshot.clone())?;
    shipment.assign_surrogate_ids()?;
    shipment.updated_at = TimeStamp::new();
    Ok(shipment)
}
