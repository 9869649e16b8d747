// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 fingerprints of stored snapshots, for detecting files that changed
// after they were journaled.

use marksense_core::{OmrError, Result};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check `data` against a stored fingerprint.
pub fn verify_fingerprint(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = fingerprint(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(OmrError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}
