//! Field validation shared by signup, login and profile edits.

use crate::error::FieldError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Loose `local@domain.tld` check: no whitespace, a non-empty local part,
/// and a domain with an inner dot.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

pub fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if email.trim().is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !is_valid_email(email.trim()) {
        errors.push(FieldError::new("email", "Please enter a valid email address"));
    }
}

pub fn check_password(password: &str, errors: &mut Vec<FieldError>) {
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    } else if password.len() > MAX_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at most {MAX_PASSWORD_LEN} characters"),
        ));
    }
}

pub fn check_username(username: &str, errors: &mut Vec<FieldError>) {
    if username.len() < 2 || username.len() > 32 {
        errors.push(FieldError::new(
            "username",
            "Username must be between 2 and 32 characters",
        ));
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        errors.push(FieldError::new(
            "username",
            "Username may only contain letters, numbers, '_', '.' and '-'",
        ));
    }
}

/// Check `value` against an allowed set, naming the field in the message.
pub fn check_one_of(field: &str, value: &str, allowed: &[&str], errors: &mut Vec<FieldError>) {
    if !allowed.contains(&value) {
        errors.push(FieldError::new(
            field,
            format!("{field} must be one of: {}", allowed.join(", ")),
        ));
    }
}

/// Default username for a signup that did not choose one: the email's
/// local part, reduced to allowed characters.
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .take(32)
        .collect();
    if cleaned.len() < 2 {
        format!("user{cleaned}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@.com"));
        assert!(!is_valid_email("alice@example."));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn password_rules() {
        let mut errors = Vec::new();
        check_password("", &mut errors);
        check_password("12345", &mut errors);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Password is required");
        assert_eq!(errors[1].message, "Password must be at least 6 characters");

        let mut ok = Vec::new();
        check_password("123456", &mut ok);
        assert!(ok.is_empty());
    }

    #[test]
    fn username_rules() {
        let mut errors = Vec::new();
        check_username("a", &mut errors);
        check_username("bad name", &mut errors);
        check_username("good_name-1.x", &mut errors);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn one_of_lists_allowed_values() {
        let mut errors = Vec::new();
        check_one_of("role", "root", &["admin", "customer"], &mut errors);
        assert_eq!(errors[0].message, "role must be one of: admin, customer");
    }

    #[test]
    fn derived_usernames() {
        assert_eq!(username_from_email("jo.smith+tag@x.io"), "jo.smithtag");
        assert_eq!(username_from_email("a@x.io"), "usera");
    }
}
