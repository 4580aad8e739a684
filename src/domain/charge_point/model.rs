//! Charge Point domain entity

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult, Measurement, Transaction, TransactionId};

/// OCPP 1.6 ChargePointStatus, used both for a whole charge point
/// (connector 0) and for individual connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargePointStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEVSE,
    SuspendedEV,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl std::fmt::Display for ChargePointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::SuspendedEV => "SuspendedEV",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

/// Progress of a diagnostics upload requested from the charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticsStatus {
    Idle,
    Uploaded,
    UploadFailed,
    Uploading,
}

impl std::fmt::Display for DiagnosticsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Uploaded => "Uploaded",
            Self::UploadFailed => "UploadFailed",
            Self::Uploading => "Uploading",
        };
        f.write_str(s)
    }
}

/// Progress of a firmware update on the charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmwareStatus {
    Downloaded,
    DownloadFailed,
    Downloading,
    Idle,
    InstallationFailed,
    Installing,
    Installed,
}

impl std::fmt::Display for FirmwareStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Downloaded => "Downloaded",
            Self::DownloadFailed => "DownloadFailed",
            Self::Downloading => "Downloading",
            Self::Idle => "Idle",
            Self::InstallationFailed => "InstallationFailed",
            Self::Installing => "Installing",
            Self::Installed => "Installed",
        };
        f.write_str(s)
    }
}

/// Identification data reported in BootNotification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootInfo {
    pub vendor: String,
    pub model: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub charge_box_serial_number: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub iccid: Option<String>,
    #[serde(default)]
    pub imsi: Option<String>,
    #[serde(default)]
    pub meter_type: Option<String>,
    #[serde(default)]
    pub meter_serial_number: Option<String>,
}

/// A configuration key/value pair as returned by GetConfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationKey {
    pub key: String,
    pub readonly: bool,
    #[serde(default)]
    pub value: Option<String>,
}

/// Connector on a charge point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    /// Last reported status, if any
    #[serde(default)]
    pub status: Option<ChargePointStatus>,
    /// Transaction currently occupying this connector
    #[serde(default)]
    pub active_transaction: Option<TransactionId>,
    /// Latest meter values received for this connector
    #[serde(default)]
    pub last_measurement: Option<Measurement>,
}

impl Connector {
    pub fn has_transaction_in_progress(&self) -> bool {
        self.active_transaction.is_some()
    }
}

/// State kept for one charge point.
///
/// Connectors are created lazily on first reference; transactions are never
/// removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargePointState {
    #[serde(default)]
    pub boot: Option<BootInfo>,
    #[serde(default)]
    pub status: Option<ChargePointStatus>,
    #[serde(default)]
    pub diagnostics_status: Option<DiagnosticsStatus>,
    #[serde(default)]
    pub firmware_status: Option<FirmwareStatus>,
    /// Last ChargePointErrorCode reported in a StatusNotification
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub connectors: BTreeMap<u32, Connector>,
    #[serde(default)]
    pub transactions: BTreeMap<TransactionId, Transaction>,
    #[serde(default)]
    pub configuration: Vec<ConfigurationKey>,
}

impl ChargePointState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create accessor for a connector.
    pub fn connector_mut(&mut self, connector_id: u32) -> &mut Connector {
        self.connectors.entry(connector_id).or_default()
    }

    pub fn connector(&self, connector_id: u32) -> Option<&Connector> {
        self.connectors.get(&connector_id)
    }

    pub fn transaction(&self, transaction_id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&transaction_id)
    }

    /// Occupy a connector with a freshly allocated transaction.
    ///
    /// `allocate_id` is only invoked once the connector is known to be free,
    /// so a rejected start never consumes an ID.
    pub fn start_transaction(
        &mut self,
        connector_id: u32,
        allocate_id: impl FnOnce() -> DomainResult<TransactionId>,
        build: impl FnOnce(TransactionId) -> Transaction,
    ) -> DomainResult<TransactionId> {
        let connector = self.connectors.entry(connector_id).or_default();
        if let Some(active) = connector.active_transaction {
            return Err(DomainError::Conflict(format!(
                "connector {} is busy with transaction {}",
                connector_id, active
            )));
        }
        let transaction_id = allocate_id()?;
        connector.active_transaction = Some(transaction_id);
        self.transactions.insert(transaction_id, build(transaction_id));
        Ok(transaction_id)
    }

    /// Free the connector held by `transaction_id`, if it still holds it.
    pub fn release_connector(&mut self, connector_id: u32, transaction_id: TransactionId) -> bool {
        match self.connectors.get_mut(&connector_id) {
            Some(connector) if connector.active_transaction == Some(transaction_id) => {
                connector.active_transaction = None;
                true
            }
            _ => false,
        }
    }

    /// Highest transaction ID held by this charge point.
    pub fn max_transaction_id(&self) -> Option<TransactionId> {
        self.transactions.keys().next_back().copied()
    }

    /// Every connector's active transaction must exist and be open.
    pub fn check_invariants(&self) -> DomainResult<()> {
        for (connector_id, connector) in &self.connectors {
            if let Some(tx_id) = connector.active_transaction {
                match self.transactions.get(&tx_id) {
                    Some(tx) if !tx.is_ended() && tx.connector_id == *connector_id => {}
                    _ => {
                        return Err(DomainError::Conflict(format!(
                            "connector {} references invalid transaction {}",
                            connector_id, tx_id
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn start(cp: &mut ChargePointState, connector_id: u32, id: TransactionId) -> DomainResult<TransactionId> {
        cp.start_transaction(
            connector_id,
            || Ok(id),
            |tx_id| Transaction::new(tx_id, connector_id, "TAG1", 100, Utc::now()),
        )
    }

    #[test]
    fn connector_is_created_lazily() {
        let mut cp = ChargePointState::new();
        assert!(cp.connector(1).is_none());
        cp.connector_mut(1).status = Some(ChargePointStatus::Available);
        assert_eq!(cp.connector(1).unwrap().status, Some(ChargePointStatus::Available));
        assert!(!cp.connector(1).unwrap().has_transaction_in_progress());
    }

    #[test]
    fn second_start_on_busy_connector_conflicts() {
        let mut cp = ChargePointState::new();
        assert_eq!(start(&mut cp, 1, 0), Ok(0));

        let mut allocated = false;
        let err = cp
            .start_transaction(
                1,
                || {
                    allocated = true;
                    Ok(1)
                },
                |tx_id| Transaction::new(tx_id, 1, "TAG2", 0, Utc::now()),
            )
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(!allocated);
        assert_eq!(cp.transactions.len(), 1);
        assert_eq!(cp.connector(1).unwrap().active_transaction, Some(0));
        cp.check_invariants().unwrap();
    }

    #[test]
    fn failed_allocation_leaves_connector_free() {
        let mut cp = ChargePointState::new();
        let err = cp
            .start_transaction(
                1,
                || Err(DomainError::Exhausted("transaction IDs")),
                |tx_id| Transaction::new(tx_id, 1, "TAG", 0, Utc::now()),
            )
            .unwrap_err();
        assert_eq!(err, DomainError::Exhausted("transaction IDs"));
        assert!(cp.transactions.is_empty());
        assert!(cp.connector(1).unwrap().active_transaction.is_none());
    }

    #[test]
    fn release_only_frees_matching_transaction() {
        let mut cp = ChargePointState::new();
        start(&mut cp, 1, 3).unwrap();
        assert!(!cp.release_connector(1, 2));
        assert_eq!(cp.connector(1).unwrap().active_transaction, Some(3));
        assert!(cp.release_connector(1, 3));
        assert!(cp.connector(1).unwrap().active_transaction.is_none());
    }

    #[test]
    fn max_transaction_id_over_history() {
        let mut cp = ChargePointState::new();
        assert_eq!(cp.max_transaction_id(), None);
        start(&mut cp, 1, 4).unwrap();
        start(&mut cp, 2, 9).unwrap();
        assert_eq!(cp.max_transaction_id(), Some(9));
    }

    #[test]
    fn statuses_use_ocpp_wire_names() {
        let json = serde_json::to_value(ChargePointStatus::SuspendedEVSE).unwrap();
        assert_eq!(json, "SuspendedEVSE");
        let parsed: FirmwareStatus = serde_json::from_value("InstallationFailed".into()).unwrap();
        assert_eq!(parsed, FirmwareStatus::InstallationFailed);
        assert_eq!(DiagnosticsStatus::UploadFailed.to_string(), "UploadFailed");
    }
}
