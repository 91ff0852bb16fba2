pub mod health;
pub use self::health::health;

pub mod auth;
pub mod consultations;
pub mod diagnostics;
pub mod medical_history;
pub mod patients;
pub mod treatments;

// common functions for the handlers
use regex::Regex;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("medico@clinica.co"));
        assert!(valid_email("ana.perez+test@example.org"));

        assert!(!valid_email(""));
        assert!(!valid_email("medico"));
        assert!(!valid_email("medico@clinica"));
        assert!(!valid_email("medico @clinica.co"));
        assert!(!valid_email("@clinica.co"));
    }
}
