use crate::error::AnalysisError;

/// Tag values from the account record wire schema (§6.2).
mod tag {
    pub const NONCE: u8 = 1;
    pub const BALANCE: u8 = 2;
    pub const CODE_HASH: u8 = 3;
    pub const STORAGE_ROOT: u8 = 4;
    pub const SQL_RECOVERY_POINT: u8 = 5;
}

/// A decoded account record. Any field absent from the wire record is `None`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub nonce: Option<u64>,
    pub balance: Option<Vec<u8>>,
    pub code_hash: Option<[u8; 32]>,
    pub storage_root: Option<[u8; 32]>,
    pub sql_recovery_point: Option<u64>,
}

/// Decodes the tagged, length-delimited account record wire format:
/// repeated `(tag: u8, len: u32 LE, value: [u8; len])` until the buffer is
/// exhausted. Unrecognised tags are skipped using their length prefix.
pub fn decode_account(raw: &[u8]) -> Result<AccountRecord, AnalysisError> {
    let mut record = AccountRecord::default();
    let mut cursor = 0usize;
    while cursor < raw.len() {
        if cursor + 5 > raw.len() {
            return Err(AnalysisError::DecodeFailure(
                "truncated account record field header".into(),
            ));
        }
        let field_tag = raw[cursor];
        let len = u32::from_le_bytes(raw[cursor + 1..cursor + 5].try_into().expect("4 bytes"))
            as usize;
        cursor += 5;
        if cursor + len > raw.len() {
            return Err(AnalysisError::DecodeFailure(format!(
                "account record field {field_tag} overruns buffer"
            )));
        }
        let value = &raw[cursor..cursor + len];
        match field_tag {
            tag::NONCE => record.nonce = Some(decode_u64(value)?),
            tag::BALANCE => record.balance = Some(value.to_vec()),
            tag::CODE_HASH => record.code_hash = Some(decode_hash(value)?),
            tag::STORAGE_ROOT => record.storage_root = Some(decode_hash(value)?),
            tag::SQL_RECOVERY_POINT => record.sql_recovery_point = Some(decode_u64(value)?),
            _ => {} // unknown field, skip via the length prefix already consumed
        }
        cursor += len;
    }
    Ok(record)
}

/// Encodes an account record back to the wire format. Only used by this
/// crate's own tests to build fixture leaf payloads.
#[cfg(test)]
pub fn encode_account(record: &AccountRecord) -> Vec<u8> {
    let mut out = Vec::new();
    let mut push_field = |t: u8, value: &[u8]| {
        out.push(t);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
    };
    if let Some(nonce) = record.nonce {
        push_field(tag::NONCE, &nonce.to_le_bytes());
    }
    if let Some(balance) = &record.balance {
        push_field(tag::BALANCE, balance);
    }
    if let Some(code_hash) = &record.code_hash {
        push_field(tag::CODE_HASH, code_hash);
    }
    if let Some(storage_root) = &record.storage_root {
        push_field(tag::STORAGE_ROOT, storage_root);
    }
    if let Some(point) = record.sql_recovery_point {
        push_field(tag::SQL_RECOVERY_POINT, &point.to_le_bytes());
    }
    out
}

fn decode_u64(value: &[u8]) -> Result<u64, AnalysisError> {
    let arr: [u8; 8] = value
        .try_into()
        .map_err(|_| AnalysisError::DecodeFailure("expected an 8-byte integer field".into()))?;
    Ok(u64::from_le_bytes(arr))
}

fn decode_hash(value: &[u8]) -> Result<[u8; 32], AnalysisError> {
    value
        .try_into()
        .map_err(|_| AnalysisError::DecodeFailure("expected a 32-byte hash field".into()))
}

/// Outcome of parsing and classifying one leaf's account payload (§4.5).
pub struct AccountOutcome {
    pub storage_root: Option<[u8; 32]>,
    pub code_hash: Option<[u8; 32]>,
}

/// Classification used when deciding whether a leaf is a contract. The
/// source aergoio/state-tools codebase has two variants in its history
/// (classify-by-codeHash vs classify-by-storageRoot); this crate follows
/// classify-by-codeHash (see DESIGN.md for the resolution).
pub fn classify_account(
    raw: &[u8],
    counters: &crate::counters::Counters,
) -> Result<Option<AccountOutcome>, AnalysisError> {
    if raw.is_empty() {
        counters.record_nil_object();
        return Ok(None);
    }
    let record = decode_account(raw)?;
    if record.code_hash.is_some() {
        counters.record_contract();
    } else if record.balance.is_some() {
        counters.record_user_account();
    } else {
        counters.record_user_account_zero();
    }
    counters.add_balance(record.balance.as_deref().unwrap_or(&[]))?;
    Ok(Some(AccountOutcome {
        storage_root: record.storage_root,
        code_hash: record.code_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::Counters;

    #[test]
    fn round_trips_every_field() {
        let record = AccountRecord {
            nonce: Some(7),
            balance: Some(vec![0x01, 0x00]),
            code_hash: Some([9u8; 32]),
            storage_root: Some([3u8; 32]),
            sql_recovery_point: Some(42),
        };
        let encoded = encode_account(&record);
        let decoded = decode_account(&encoded).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let mut raw = Vec::new();
        raw.push(200u8); // unrecognised tag
        raw.extend_from_slice(&3u32.to_le_bytes());
        raw.extend_from_slice(b"xyz");
        raw.push(tag::NONCE);
        raw.extend_from_slice(&8u32.to_le_bytes());
        raw.extend_from_slice(&99u64.to_le_bytes());

        let decoded = decode_account(&raw).unwrap();
        assert_eq!(decoded.nonce, Some(99));
    }

    #[test]
    fn nil_payload_increments_nil_objects() {
        let counters = Counters::new();
        let outcome = classify_account(&[], &counters).unwrap();
        assert!(outcome.is_none());
        assert_eq!(counters.snapshot().unwrap().nb_nil_objects, 1);
    }

    #[test]
    fn classification_order_prefers_code_hash_over_balance() {
        let counters = Counters::new();
        let record = AccountRecord {
            code_hash: Some([1u8; 32]),
            balance: Some(vec![1]),
            ..Default::default()
        };
        let raw = encode_account(&record);
        classify_account(&raw, &counters).unwrap();
        let snap = counters.snapshot().unwrap();
        assert_eq!(snap.nb_contracts, 1);
        assert_eq!(snap.nb_user_accounts, 0);
    }

    #[test]
    fn zero_balance_account_is_counted_separately() {
        let counters = Counters::new();
        let raw = encode_account(&AccountRecord::default());
        classify_account(&raw, &counters).unwrap();
        assert_eq!(counters.snapshot().unwrap().nb_user_accounts0, 1);
    }
}
