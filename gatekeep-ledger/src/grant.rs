//! Access grants and their one-way status machine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Request status of a grant, with the ledger's numeric codes.
///
/// `GrantPending -> Granted` and `RevokePending -> Revoked` are the only
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantStatus {
    GrantPending,
    Granted,
    RevokePending,
    Revoked,
}

impl GrantStatus {
    pub fn code(self) -> i64 {
        match self {
            GrantStatus::GrantPending => 1,
            GrantStatus::Granted => 2,
            GrantStatus::RevokePending => 3,
            GrantStatus::Revoked => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(GrantStatus::GrantPending),
            2 => Some(GrantStatus::Granted),
            3 => Some(GrantStatus::RevokePending),
            4 => Some(GrantStatus::Revoked),
            _ => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, GrantStatus::GrantPending | GrantStatus::RevokePending)
    }

    /// The terminal status a pending grant moves to, or `None` when the
    /// grant is already terminal.
    pub fn finalized(self) -> Option<Self> {
        match self {
            GrantStatus::GrantPending => Some(GrantStatus::Granted),
            GrantStatus::RevokePending => Some(GrantStatus::Revoked),
            GrantStatus::Granted | GrantStatus::Revoked => None,
        }
    }
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GrantStatus::GrantPending => "grant-pending",
            GrantStatus::Granted => "granted",
            GrantStatus::RevokePending => "revoke-pending",
            GrantStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// One row of the ledger: a request to add or remove `login` on a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub access_id: i64,
    pub site_id: i64,
    pub status: GrantStatus,
    pub first_name: String,
    /// Display name, used alongside the address in the `To` header.
    pub lookup_name: String,
    pub login: String,
    /// Empty when the person has no primary address on record.
    pub email: String,
    /// Name of the club, society or project that owns the site.
    pub classification: String,
}

impl Grant {
    /// Grant with no contact details; see [`Grant::with_contact`].
    pub fn new(access_id: i64, site_id: i64, status: GrantStatus, login: impl Into<String>) -> Self {
        Self {
            access_id,
            site_id,
            status,
            first_name: String::new(),
            lookup_name: String::new(),
            login: login.into(),
            email: String::new(),
            classification: String::new(),
        }
    }

    pub fn with_contact(
        mut self,
        first_name: impl Into<String>,
        lookup_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.first_name = first_name.into();
        self.lookup_name = lookup_name.into();
        self.email = email.into();
        self
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = classification.into();
        self
    }

    /// The status this grant moves to when finalized.
    pub fn next_status(&self) -> Result<GrantStatus, LedgerError> {
        self.status
            .finalized()
            .ok_or(LedgerError::AlreadyFinalized {
                access_id: self.access_id,
                status: self.status,
            })
    }
}

/// Grants keyed by target site id, each list in ledger order.
pub type GrantsBySite = BTreeMap<i64, Vec<Grant>>;

/// Which rows a fetch returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Also return already-finalized rows of the same kind.
    pub include_non_pending: bool,
}

impl FetchOptions {
    /// Status codes matched for a fetch of `pending` grants.
    pub(crate) fn statuses(self, pending: GrantStatus) -> (GrantStatus, GrantStatus) {
        match (self.include_non_pending, pending.finalized()) {
            (true, Some(done)) => (pending, done),
            _ => (pending, pending),
        }
    }
}
