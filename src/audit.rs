//! Audit trail for invalidation and restoration.
//!
//! Callers treat every sink as best-effort: a failing sink is logged and
//! ignored, it never changes the outcome of the operation being audited.
use super::types::TimeStamp;
use super::utils;
use serde_json::{Value, json};

pub const AUDIT_TREE: &str = "audit_log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    InvalidateStart,
    InvalidateSuccess,
    RestoreStart,
    RestoreSuccess,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::InvalidateStart => "INVALIDATE_SHIPMENT_START",
            AuditEvent::InvalidateSuccess => "INVALIDATE_SHIPMENT_SUCCESS",
            AuditEvent::RestoreStart => "REVALIDATE_SHIPMENT_START",
            AuditEvent::RestoreSuccess => "REVALIDATE_SHIPMENT_SUCCESS",
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record_success(
        &self,
        code_gen: &str,
        actor: &str,
        status: &str,
        event: AuditEvent,
        context: &Value,
        extra: Option<&Value>,
    ) -> anyhow::Result<()>;

    fn record_failure(
        &self,
        code_gen: &str,
        actor: &str,
        status: &str,
        message: &str,
        context: &Value,
    ) -> anyhow::Result<()>;
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record_success(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: AuditEvent,
        _: &Value,
        _: Option<&Value>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn record_failure(&self, _: &str, _: &str, _: &str, _: &str, _: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AuditRecord {
    #[n(0)]
    pub code_gen: String,
    #[n(1)]
    pub actor: String,
    #[n(2)]
    pub status: String,
    #[n(3)]
    pub sent_json: String,
    #[n(4)]
    pub modification_json: Option<String>, // set on success
    #[n(5)]
    pub failure_reason: Option<String>, // set on failure
    #[n(6)]
    pub created_at: TimeStamp,
}

impl AuditRecord {
    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none()
    }

    /// The event name carried in the modification payload of a success record
    pub fn action(&self) -> Option<String> {
        let modification: Value = serde_json::from_str(self.modification_json.as_deref()?).ok()?;
        modification
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Audit sink persisted in its own sled tree
#[derive(Clone)]
pub struct AuditLog {
    tree: sled::Tree,
}

impl AuditLog {
    pub fn open(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree(AUDIT_TREE)?,
        })
    }

    // keyed `code_gen 0x00 uuid7` so one shipment's records are a prefix scan
    fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let key = utils::scoped_key(&record.code_gen, &utils::new_ordered_id());
        self.tree.insert(key, minicbor::to_vec(record)?)?;
        Ok(())
    }

    /// Records for a shipment, newest first
    pub fn by_code(&self, code_gen: &str) -> anyhow::Result<Vec<AuditRecord>> {
        let mut records = Vec::new();
        for item in self.tree.scan_prefix(utils::scope_prefix(code_gen)).rev() {
            let (_, bytes) = item?;
            records.push(minicbor::decode(&bytes)?);
        }
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl AuditSink for AuditLog {
    fn record_success(
        &self,
        code_gen: &str,
        actor: &str,
        status: &str,
        event: AuditEvent,
        context: &Value,
        extra: Option<&Value>,
    ) -> anyhow::Result<()> {
        let created_at = TimeStamp::new();
        let modification = json!({
            "action": event.as_str(),
            "success": true,
            "timestamp": created_at.to_rfc3339(),
            "responseData": extra.cloned().unwrap_or(Value::Null),
        });

        self.append(&AuditRecord {
            code_gen: code_gen.to_string(),
            actor: actor.to_string(),
            status: status.to_string(),
            sent_json: context.to_string(),
            modification_json: Some(modification.to_string()),
            failure_reason: None,
            created_at,
        })
    }

    fn record_failure(
        &self,
        code_gen: &str,
        actor: &str,
        status: &str,
        message: &str,
        context: &Value,
    ) -> anyhow::Result<()> {
        self.append(&AuditRecord {
            code_gen: code_gen.to_string(),
            actor: actor.to_string(),
            status: status.to_string(),
            sent_json: context.to_string(),
            modification_json: None,
            failure_reason: Some(message.to_string()),
            created_at: TimeStamp::new(),
        })
    }
}
