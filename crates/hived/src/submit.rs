//! Building signed specification messages for submission.

use anyhow::Context;

use hive_core::crypto::signing_key_from_hex;
use hive_core::types::{AppSpecification, MessageType, SpecificationMessage};

/// Sign the JSON specification `spec_json` with the hex secret `key_hex`.
pub fn signed_message(
    key_hex: &str,
    spec_json: &str,
    kind: MessageType,
    timestamp: u64,
) -> anyhow::Result<SpecificationMessage> {
    let key = signing_key_from_hex(key_hex).context("invalid signing key")?;
    let spec: AppSpecification =
        serde_json::from_str(spec_json).context("specification is not valid JSON")?;
    Ok(SpecificationMessage::signed(kind, spec, timestamp, &key)?)
}
