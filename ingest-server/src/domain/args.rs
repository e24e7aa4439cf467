//! Interpreting event arguments.
//!
//! Arguments arrive either as 32-byte ABI words (`0x` + 64 hex digits) or,
//! from producers that already decoded them, as plain strings.

use ledger_ingest_core::handlers::{DomainError, HandlerInput};
use uuid::Uuid;

/// First present argument among `names`.
pub fn first_arg<'a>(input: &HandlerInput<'a>, names: &[&str]) -> Result<&'a str, DomainError> {
    names
        .iter()
        .find_map(|name| input.arg(name).ok())
        .ok_or_else(|| {
            DomainError::InvalidPayload(format!(
                "{} event without any of {}",
                input.event_type,
                names.join(", ")
            ))
        })
}

fn abi_word(value: &str) -> Option<&str> {
    let digits = value.strip_prefix("0x")?;
    (digits.len() == 64 && digits.chars().all(|c| c.is_ascii_hexdigit())).then_some(digits)
}

/// A batch id: a UUID string, or a word whose low 16 bytes hold the UUID.
pub fn parse_batch_id(value: &str) -> Result<Uuid, DomainError> {
    let candidate = abi_word(value).map_or(value, |digits| &digits[32..]);
    Uuid::try_parse(candidate)
        .map_err(|e| DomainError::InvalidPayload(format!("malformed batch id {value}: {e}")))
}

/// A lowercase `0x` address: a plain address, or a word whose low 20 bytes
/// hold it.
pub fn parse_address(value: &str) -> Result<String, DomainError> {
    let digits = match abi_word(value) {
        Some(word) => &word[24..],
        None => value.strip_prefix("0x").unwrap_or(value),
    };
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DomainError::InvalidPayload(format!("malformed address {value}")));
    }
    Ok(format!("0x{}", digits.to_lowercase()))
}
