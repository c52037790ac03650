//! Subscriber number normalization.
//!
//! The gateway only accepts `2547XXXXXXXX`-style numbers. Local (`07..`),
//! trunk-prefixed and international (`+254..`, `254..`) inputs all map to
//! the same canonical form.

use pay_core::{PaymentError, PaymentResult};

/// Kenya country calling code
pub const COUNTRY_CODE: &str = "254";

const TRUNK_PREFIX: char = '0';

/// Digits after the country code
const SUBSCRIBER_DIGITS: usize = 9;

/// Normalize a user-entered phone number to `254XXXXXXXXX`.
pub fn normalize_phone(raw: &str) -> PaymentResult<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();

    let without_plus = compact.strip_prefix('+').unwrap_or(&compact);
    let local = without_plus
        .strip_prefix(COUNTRY_CODE)
        .unwrap_or(without_plus);
    let subscriber = local.strip_prefix(TRUNK_PREFIX).unwrap_or(local);

    if subscriber.len() != SUBSCRIBER_DIGITS || !subscriber.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::Validation(format!(
            "Invalid phone number: {}",
            raw
        )));
    }

    Ok(format!("{}{}", COUNTRY_CODE, subscriber))
}
