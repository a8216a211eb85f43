//! Recipient and identifier helpers

const MAX_DEVICE_ID_LEN: usize = 64;

/// Device ids double as directory names: ASCII alphanumerics, `-` and `_`
pub fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_DEVICE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Normalize a phone number to international digits
///
/// Non-digits are stripped; a 10-digit local number that does not already
/// start with `country_code` gets it prefixed.
pub fn format_phone_number(phone: &str, country_code: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 && !digits.starts_with(country_code) {
        format!("{}{}", country_code, digits)
    } else {
        digits
    }
}

/// `<digits>@s.whatsapp.net`, the form reported back to API callers
pub fn to_jid(digits: &str) -> String {
    format!("{}@s.whatsapp.net", digits)
}

/// Chat id understood by the protocol client
///
/// Accepts bare numbers as well as `@s.whatsapp.net` and `@c.us` forms.
pub fn to_chat_id(recipient: &str) -> String {
    let bare = recipient
        .trim()
        .trim_end_matches("@s.whatsapp.net")
        .trim_end_matches("@c.us");
    format!("{}@c.us", bare)
}
