//! Service layer API for invalidating and restoring shipments
use super::archive::{
    self, ArchiveEntry, ArchiveStore, ArchiveTx, ArchiveView, ArchivedShipment,
    ClientArchivedShipment,
};
use super::audit::{AuditEvent, AuditLog, AuditSink};
use super::config::ArchivalConfig;
use super::error::{self, ArchiveError};
use super::shipment::{self, Shipment, ShipmentStore, abort};
use super::transform::{TransformConfig, Transformed};
use super::types::{Actor, Page, Pagination, TimeStamp};
use serde_json::{Value, json};
use sled::Transactional;
use sled::transaction::TransactionError;
use std::sync::Arc;

pub struct ArchivalService {
    instance: Arc<sled::Db>,
    shipments: ShipmentStore,
    archive: ArchiveStore,
    audit: Arc<dyn AuditSink>,
    config: ArchivalConfig,
    redaction: TransformConfig,
    client_view: TransformConfig,
}

/// Audit events for one operation. Sink failures are logged and dropped.
struct AuditScope<'a> {
    sink: Option<&'a dyn AuditSink>,
    actor: String,
    code_gen: &'a str,
    context: Value,
}

impl AuditScope<'_> {
    fn success(&self, event: AuditEvent, extra: Option<Value>) {
        let Some(sink) = self.sink else { return };
        if let Err(err) = sink.record_success(
            self.code_gen,
            &self.actor,
            "200",
            event,
            &self.context,
            extra.as_ref(),
        ) {
            tracing::warn!(code_gen = self.code_gen, event = event.as_str(), error = %err, "failed to record audit success");
        }
    }

    fn failure(&self, err: &anyhow::Error) {
        let Some(sink) = self.sink else { return };
        let status = error::status_label(err);
        if let Err(log_err) =
            sink.record_failure(self.code_gen, &self.actor, status, &err.to_string(), &self.context)
        {
            tracing::warn!(code_gen = self.code_gen, error = %log_err, "failed to record audit failure");
        }
    }
}

fn never_invalidated(code_gen: &str) -> ArchiveError {
    ArchiveError::NotFound(format!(
        "Cannot validate shipment {code_gen}: it was never invalidated."
    ))
}

fn already_live(code_gen: &str) -> ArchiveError {
    ArchiveError::Conflict(format!(
        "Cannot restore shipment {code_gen}: a live shipment with this code already exists."
    ))
}

fn into_error(err: TransactionError<ArchiveError>) -> anyhow::Error {
    match err {
        TransactionError::Abort(err) => err.into(),
        TransactionError::Storage(err) => ArchiveError::Storage(err).into(),
    }
}

impl ArchivalService {
    pub fn new(
        instance: Arc<sled::Db>,
        audit: Arc<dyn AuditSink>,
        config: ArchivalConfig,
    ) -> anyhow::Result<Self> {
        let redaction = match &config.client_redaction {
            Some(extra) => archive::client_redaction().merge(extra),
            None => archive::client_redaction(),
        };
        let client_view = archive::client_baseline().merge(&redaction);

        Ok(Self {
            shipments: ShipmentStore::open(&instance)?,
            archive: ArchiveStore::open(&instance)?,
            instance,
            audit,
            config,
            redaction,
            client_view,
        })
    }

    /// Service with default config, auditing into the same database
    pub fn with_audit_log(instance: Arc<sled::Db>) -> anyhow::Result<Self> {
        let audit = Arc::new(AuditLog::open(&instance)?);
        Self::new(instance, audit, ArchivalConfig::default())
    }

    pub fn shipments(&self) -> &ShipmentStore {
        &self.shipments
    }

    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    pub fn config(&self) -> &ArchivalConfig {
        &self.config
    }

    fn audit_scope<'a>(&'a self, code_gen: &'a str, actor: &Actor, context: Value) -> AuditScope<'a> {
        let sink = actor
            .has_role(self.config.audit_role)
            .then_some(self.audit.as_ref());
        AuditScope {
            sink,
            actor: actor.display_name(),
            code_gen,
            context,
        }
    }

    /// Moves a live shipment into the archive
    pub fn invalidate(
        &self,
        code_gen: &str,
        reason: &str,
        actor: &Actor,
    ) -> anyhow::Result<ArchiveEntry> {
        let audit = self.audit_scope(
            code_gen,
            actor,
            json!({ "codeGen": code_gen, "invalidationReason": reason }),
        );
        audit.success(AuditEvent::InvalidateStart, None);

        match self.archive_live(code_gen, reason) {
            Ok(entry) => {
                audit.success(
                    AuditEvent::InvalidateSuccess,
                    Some(json!({
                        "invalidatedId": entry.id,
                        "client": entry.client_code(),
                        "completedAt": TimeStamp::new().to_rfc3339(),
                    })),
                );
                tracing::info!(code_gen, entry_id = %entry.id, "shipment invalidated");
                Ok(entry)
            }
            Err(err) => {
                audit.failure(&err);
                Err(err)
            }
        }
    }

    // remove-from-live and write-to-archive commit together or not at all
    fn archive_live(&self, code_gen: &str, reason: &str) -> anyhow::Result<ArchiveEntry> {
        if reason.trim().is_empty() {
            return Err(ArchiveError::Validation("an invalidation reason is required".into()).into());
        }
        let id = ArchiveStore::new_entry_id();

        (
            self.shipments.tree(),
            &self.archive.entries,
            &self.archive.codes,
            &self.archive.by_client,
        )
            .transaction(|(live, entries, codes, by_client)| {
                let removed = shipment::remove_and_return(live, code_gen)?;
                let entry = ArchiveEntry::capture(id.clone(), &removed, reason).or_else(abort)?;
                ArchiveTx {
                    entries,
                    codes,
                    by_client,
                }
                .insert(&entry)?;
                Ok(entry)
            })
            .map_err(into_error)
    }

    /// Brings an archived shipment back to life from its snapshot
    pub fn restore(&self, code_gen: &str, actor: &Actor) -> anyhow::Result<Shipment> {
        let audit = self.audit_scope(code_gen, actor, json!({ "codeGen": code_gen }));
        audit.success(AuditEvent::RestoreStart, None);

        match self.restore_archived(code_gen) {
            Ok(restored) => {
                audit.success(
                    AuditEvent::RestoreSuccess,
                    Some(json!({
                        "shipmentId": restored.id,
                        "client": restored.client_code(),
                        "completedAt": TimeStamp::new().to_rfc3339(),
                    })),
                );
                tracing::info!(code_gen, shipment_id = %restored.id, "shipment restored");
                Ok(restored)
            }
            Err(err) => {
                audit.failure(&err);
                Err(err)
            }
        }
    }

    fn restore_archived(&self, code_gen: &str) -> anyhow::Result<Shipment> {
        let entry = self
            .archive
            .find_by_code(code_gen)?
            .ok_or_else(|| never_invalidated(code_gen))?;
        if self.shipments.exists_by_code(code_gen)? {
            return Err(already_live(code_gen).into());
        }

        let snapshot = entry.verified_snapshot()?;
        let restored = shipment::materialize_from_snapshot(&snapshot)?;
        if restored.code_gen != code_gen {
            return Err(ArchiveError::CorruptSnapshot {
                code_gen: code_gen.to_string(),
            }
            .into());
        }

        self.commit_restore(&entry, &restored)?;
        Ok(restored)
    }

    // Live and archive state are re-checked under the transaction. A restore
    // that committed first leaves the code live, and an entry captured since
    // `entry` was read carries a different id; both conflict.
    fn commit_restore(&self, entry: &ArchiveEntry, restored: &Shipment) -> anyhow::Result<()> {
        let code_gen = entry.code_gen.as_str();
        (
            self.shipments.tree(),
            &self.archive.entries,
            &self.archive.codes,
            &self.archive.by_client,
        )
            .transaction(|(live, entries, codes, by_client)| {
                if shipment::exists_by_code(live, code_gen)? {
                    return abort(already_live(code_gen));
                }
                let archive = ArchiveTx {
                    entries,
                    codes,
                    by_client,
                };
                let Some(current) = archive.find_by_code(code_gen)? else {
                    return abort(never_invalidated(code_gen));
                };
                if current.id != entry.id {
                    return abort(ArchiveError::Conflict(format!(
                        "Cannot restore shipment {code_gen}: it was invalidated again while restoring."
                    )));
                }
                archive.delete(&current)?;
                shipment::insert_live(live, restored)?;
                Ok(())
            })
            .map_err(into_error)
    }

    fn pagination(&self, page: usize, size: usize) -> anyhow::Result<Pagination> {
        Ok(Pagination::for_page(page, size, self.config.max_page_size)?)
    }

    /// Every archive entry, oldest first, with snapshots parsed
    pub fn list_all(&self, page: usize, size: usize) -> anyhow::Result<Page<ArchivedShipment>> {
        let mut pagination = self.pagination(page, size)?;
        let (entries, count) = self.archive.page(pagination.offset, pagination.limit)?;
        pagination.count = count;

        let data = entries
            .iter()
            .map(ArchiveEntry::parsed)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count, returned = data.len(), "listed archived shipments");

        Ok(Page { data, pagination })
    }

    pub fn list_all_default(&self) -> anyhow::Result<Page<ArchivedShipment>> {
        self.list_all(1, self.config.default_page_size)
    }

    pub fn get_by_code(&self, code_gen: &str) -> anyhow::Result<ArchivedShipment> {
        let entry = self.archive.find_by_code(code_gen)?.ok_or_else(|| {
            ArchiveError::NotFound(format!("No invalidated shipment found with code {code_gen}."))
        })?;
        Ok(entry.parsed()?)
    }

    /// Applies the client redaction to a snapshot. Client-role audiences
    /// also lose the shipment's internal ids and tracking fields.
    pub fn normalize(
        &self,
        snapshot: &Value,
        for_client_audience: bool,
    ) -> Result<Transformed, ArchiveError> {
        if for_client_audience {
            self.client_view.transform(snapshot)
        } else {
            self.redaction.transform(snapshot)
        }
    }

    /// A client's archive entries with redacted snapshots. Client-audience
    /// items carry only the reason, capture time and snapshot.
    pub fn list_by_client(
        &self,
        client_code: &str,
        for_client_audience: bool,
        page: usize,
        size: usize,
    ) -> anyhow::Result<Page<ArchiveView>> {
        let mut pagination = self.pagination(page, size)?;
        let (entries, count) =
            self.archive
                .page_by_client(client_code, pagination.offset, pagination.limit)?;
        pagination.count = count;

        let mut data = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed = entry.parsed()?;
            let Transformed { value, warnings } =
                self.normalize(&parsed.snapshot, for_client_audience)?;
            for warning in &warnings {
                tracing::debug!(code_gen = %entry.code_gen, %warning, "redaction warning");
            }

            data.push(if for_client_audience {
                ArchiveView::Client(ClientArchivedShipment {
                    reason: parsed.reason,
                    created_at: parsed.created_at,
                    snapshot: value,
                })
            } else {
                ArchiveView::Internal(ArchivedShipment {
                    snapshot: value,
                    ..parsed
                })
            });
        }

        Ok(Page { data, pagination })
    }
}
