/// Input validators for member sign-up and password change
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Format rules for username, member name and phone number
/// 3. Password strength rules
/// 4. Email validation with phishing pattern checks

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MIN_USERNAME_LENGTH: usize = 4;
const MAX_USERNAME_LENGTH: usize = 20;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 20;
const MIN_MEMBER_NAME_LENGTH: usize = 2;
const MAX_MEMBER_NAME_LENGTH: usize = 50;
const MAX_EMAIL_LENGTH: usize = 100;

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();

    // Hangul syllables, Latin letters and spaces
    static ref MEMBER_NAME_REGEX: Regex = Regex::new(r"^[가-힣A-Za-z ]+$").unwrap();

    static ref PHONE_REGEX: Regex = Regex::new(r"^010-\d{4}-\d{4}$").unwrap();

    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let length = value.chars().count();
    if length == 0 {
        return Err(ValidationError::EmptyField(field.to_string()));
    }
    if length < min {
        return Err(ValidationError::TooShort(field.to_string(), min));
    }
    if length > max {
        return Err(ValidationError::TooLong(field.to_string(), max));
    }
    Ok(())
}

/// Validates a login name: 4-20 characters of letters, digits and underscore
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();
    check_length("username", trimmed, MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH)?;

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a new password
/// - 8-20 characters
/// - at least one letter, one digit and one special character
///
/// Passwords are not trimmed.
pub fn is_valid_password(field: &str, password: &str) -> Result<(), ValidationError> {
    check_length(field, password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH)?;

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace());

    if !(has_letter && has_digit && has_special) {
        return Err(ValidationError::InvalidFormat(field.to_string()));
    }

    if password.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(())
}

/// Validates a display name: 2-50 characters of Hangul, Latin letters and spaces
pub fn is_valid_member_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    check_length("memberName", trimmed, MIN_MEMBER_NAME_LENGTH, MAX_MEMBER_NAME_LENGTH)?;

    if !MEMBER_NAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("memberName".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a mobile number in `010-XXXX-XXXX` form
pub fn is_valid_phone_number(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("phoneNumber".to_string()));
    }

    if !PHONE_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("phoneNumber".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates an email address
/// - Checks format using RFC 5322 simplified regex
/// - Verifies length constraints
/// - Detects potential phishing patterns
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("emailAddress".to_string()));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong(
            "emailAddress".to_string(),
            MAX_EMAIL_LENGTH,
        ));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("emailAddress".to_string()));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("emailAddress".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Optional email: absent or blank means "no email"
pub fn is_valid_optional_email(email: Option<&str>) -> Result<Option<String>, ValidationError> {
    match email.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => is_valid_email(value).map(Some),
    }
}

/// Detects suspicious patterns in email addresses that might indicate phishing
fn has_suspicious_email_patterns(email: &str) -> bool {
    // Check for extremely long local part (before @)
    if let Some(at_pos) = email.find('@') {
        if email[..at_pos].len() > 64 {
            return true;
        }
    }

    if email.matches('@').count() != 1 {
        return true;
    }

    email.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_username() {
        assert_eq!(is_valid_username("stud01").unwrap(), "stud01");
        assert!(is_valid_username("user_name_20_chars__").is_ok());
    }

    #[test]
    fn test_invalid_username() {
        assert!(matches!(
            is_valid_username("abc"),
            Err(ValidationError::TooShort(_, 4))
        ));
        assert!(matches!(
            is_valid_username(&"a".repeat(21)),
            Err(ValidationError::TooLong(_, 20))
        ));
        assert!(matches!(
            is_valid_username("stud-01"),
            Err(ValidationError::InvalidFormat(_))
        ));
        assert!(matches!(is_valid_username("  "), Err(ValidationError::EmptyField(_))));
    }

    #[test]
    fn test_valid_password() {
        assert!(is_valid_password("password", "Passw0rd!").is_ok());
        assert!(is_valid_password("password", "a1!aaaaa").is_ok());
    }

    #[test]
    fn test_weak_passwords() {
        // Missing special character
        assert!(is_valid_password("password", "Passw0rd").is_err());
        // Missing digit
        assert!(is_valid_password("password", "Password!").is_err());
        // Missing letter
        assert!(is_valid_password("password", "1234567!").is_err());
        assert!(matches!(
            is_valid_password("password", "Pa0!"),
            Err(ValidationError::TooShort(_, 8))
        ));
        assert!(matches!(
            is_valid_password("password", "Passw0rd!Passw0rd!abc"),
            Err(ValidationError::TooLong(_, 20))
        ));
    }

    #[test]
    fn test_member_name() {
        assert_eq!(is_valid_member_name("Kim").unwrap(), "Kim");
        assert!(is_valid_member_name("김철수").is_ok());
        assert!(is_valid_member_name("Kim Minsu").is_ok());
        assert!(is_valid_member_name("K").is_err());
        assert!(is_valid_member_name("Kim3").is_err());
        assert!(is_valid_member_name(&"가".repeat(51)).is_err());
    }

    #[test]
    fn test_phone_number() {
        assert!(is_valid_phone_number("010-1111-2222").is_ok());
        assert!(is_valid_phone_number("011-1111-2222").is_err());
        assert!(is_valid_phone_number("01011112222").is_err());
        assert!(is_valid_phone_number("").is_err());
    }

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
    }

    #[test]
    fn test_email_length_limit() {
        let too_long = format!("{}@example.com", "a".repeat(90));
        assert!(matches!(
            is_valid_email(&too_long),
            Err(ValidationError::TooLong(_, 100))
        ));
    }

    #[test]
    fn test_optional_email() {
        assert_eq!(is_valid_optional_email(None).unwrap(), None);
        assert_eq!(is_valid_optional_email(Some("  ")).unwrap(), None);
        assert_eq!(
            is_valid_optional_email(Some("kim@example.com")).unwrap(),
            Some("kim@example.com".to_string())
        );
        assert!(is_valid_optional_email(Some("nope")).is_err());
    }
}
