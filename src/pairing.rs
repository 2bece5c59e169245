//! Pairing-code registry shared by the relay server.
//!
//! Maps 8-digit codes to pending pairings. Records expire ten minutes
//! after creation, checked both lazily on lookup and by the relay's
//! periodic sweep. Time is passed in explicitly on the `*_at` variants so
//! expiry is testable with a simulated clock.

use std::{collections::HashMap, sync::RwLock};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::auth::{format_pairing_code, sanitize_phone_number};

/// How long a pairing code stays valid.
pub const CODE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("please provide a valid phone number with country code")]
    InvalidPhoneNumber,
    #[error("pairing code not found or expired")]
    NotFound,
    #[error("pairing code expired")]
    Expired,
    #[error("phone number does not match pairing code")]
    PhoneMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingStatus {
    Pending,
    Completed,
}

/// State tracked for one issued pairing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
    pub status: PairingStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory registry of active pairing codes.
pub struct PairingRegistry {
    codes: RwLock<HashMap<String, PairingRecord>>,
}

impl PairingRegistry {
    pub fn new() -> Self {
        Self {
            codes: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a fresh code for a phone number and return it hyphen-grouped
    /// (e.g. `1234-5678`). Old records are purged opportunistically.
    pub fn generate(&self, phone_number: &str) -> Result<String, PairingError> {
        self.generate_at(phone_number, Utc::now())
    }

    pub fn generate_at(
        &self,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> Result<String, PairingError> {
        if sanitize_phone_number(phone_number).is_err() {
            return Err(PairingError::InvalidPhoneNumber);
        }

        let code = rand::thread_rng()
            .gen_range(10_000_000u32..100_000_000)
            .to_string();
        self.write_codes().insert(
            code.clone(),
            PairingRecord {
                phone_number: phone_number.to_string(),
                created_at: now,
                status: PairingStatus::Pending,
                completed_at: None,
            },
        );
        self.purge_expired_at(now);

        Ok(format_pairing_code(&code))
    }

    /// Look up a code's status and phone number. Expired records are
    /// deleted on the way out.
    pub fn check_status(&self, code: &str) -> Result<(PairingStatus, String), PairingError> {
        self.check_status_at(code, Utc::now())
    }

    pub fn check_status_at(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(PairingStatus, String), PairingError> {
        let key = code.replace('-', "");
        {
            let codes = self.read_codes();
            let record = codes.get(&key).ok_or(PairingError::NotFound)?;
            if !is_expired(record, now) {
                return Ok((record.status, record.phone_number.clone()));
            }
        }
        self.write_codes().remove(&key);
        Err(PairingError::Expired)
    }

    /// Transition a pending record to completed once the phone confirms.
    pub fn complete(&self, code: &str, phone_number: &str) -> Result<(), PairingError> {
        self.complete_at(code, phone_number, Utc::now())
    }

    pub fn complete_at(
        &self,
        code: &str,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PairingError> {
        let key = code.replace('-', "");
        let mut codes = self.write_codes();
        let record = codes.get_mut(&key).ok_or(PairingError::NotFound)?;
        if record.phone_number != phone_number {
            return Err(PairingError::PhoneMismatch);
        }
        record.status = PairingStatus::Completed;
        record.completed_at = Some(now);
        Ok(())
    }

    /// Delete records older than the TTL; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.write_codes();
        let before = codes.len();
        codes.retain(|_, record| !is_expired(record, now));
        before - codes.len()
    }

    /// Number of live pairing records.
    pub fn active_count(&self) -> usize {
        self.read_codes().len()
    }

    fn read_codes(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PairingRecord>> {
        self.codes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_codes(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PairingRecord>> {
        self.codes.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PairingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(record: &PairingRecord, now: DateTime<Utc>) -> bool {
    now - record.created_at > Duration::minutes(CODE_TTL_MINUTES)
}
