use crate::schema::FieldError;

/// Rough shape check, not RFC 5322. The mail round-trip is the real test.
pub fn is_email(input: &str) -> bool {
    match input.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !input.contains(char::is_whitespace)
        }
        None => false,
    }
}

pub fn validate_email(email: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_email(email) {
        errors.push(FieldError::new("email", "invalid email"));
    }
    errors
}

pub fn validate_username(username: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if username.chars().count() < 2 {
        errors.push(FieldError::new(
            "username",
            "length must be at least 2 characters",
        ));
    }
    if username.contains('@') {
        errors.push(FieldError::new("username", "cannot contain '@'"));
    }
    errors
}

pub fn validate_password(field: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if password.chars().count() < 2 {
        errors.push(FieldError::new(
            field,
            "length must be at least 2 characters",
        ));
    }
    errors
}

/// All registration field errors at once so the client can mark every
/// offending form input in a single round trip.
pub fn validate_register(username: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = validate_email(email);
    errors.extend(validate_username(username));
    errors.extend(validate_password("password", password));
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_email("user@example.com"));
        assert!(is_email("first.last@sub.example.org"));
        assert!(!is_email("userexample.com"));
        assert!(!is_email("user@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("user@nodot"));
        assert!(!is_email("user name@example.com"));
    }

    #[test]
    fn register_accepts_good_input() {
        assert!(validate_register("alice", "alice@example.com", "hunter2").is_empty());
    }

    #[test]
    fn register_flags_every_bad_field() {
        let errors = validate_register("a", "not-an-email", "x");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "username", "password"]);
    }

    #[test]
    fn username_cannot_look_like_an_email() {
        let errors = validate_username("alice@example.com");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "username");
        assert_eq!(errors[0].message, "cannot contain '@'");
    }

    #[test]
    fn change_password_reuses_the_length_rule() {
        let errors = validate_password("newPassword", "x");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "newPassword");
    }
}
