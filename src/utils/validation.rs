use lazy_static::lazy_static;
use mongodb::bson::oid::ObjectId;
use regex::Regex;

use crate::utils::error::AppError;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid");
    static ref CURRENCY_RE: Regex = Regex::new(r"^[A-Za-z]{3}$").expect("currency regex is valid");
}

pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 64;
pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 50;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_currency_code(code: &str) -> bool {
    CURRENCY_RE.is_match(code)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Collects validation messages so a request can report all of them at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.0.push(message.into());
        }
    }

    pub fn email(&mut self, email: &str) {
        self.check(is_valid_email(email), "Email is invalid");
    }

    pub fn password(&mut self, field: &str, password: &str) {
        let len = password.chars().count();
        self.check(
            (PASSWORD_MIN..=PASSWORD_MAX).contains(&len),
            format!("{} must be {}-{} characters long", field, PASSWORD_MIN, PASSWORD_MAX),
        );
    }

    pub fn name(&mut self, name: &str) {
        let len = name.trim().chars().count();
        self.check(
            (NAME_MIN..=NAME_MAX).contains(&len),
            format!("Name must be {}-{} characters long", NAME_MIN, NAME_MAX),
        );
    }

    pub fn text(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        self.check(
            (min..=max).contains(&len),
            format!("{} must be {}-{} characters long", field, min, max),
        );
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::BadRequest(self.0))
        }
    }
}

pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw).map_err(|_| AppError::bad_request(format!("Invalid {} id", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_valid_email("cook@example.com"));
        assert!(!is_valid_email("cook@example"));
        assert!(!is_valid_email("cook example.com"));
        assert_eq!(normalize_email("  Cook@Example.COM "), "cook@example.com");
    }

    #[test]
    fn test_currency_code() {
        assert!(is_valid_currency_code("eur"));
        assert!(!is_valid_currency_code("EURO"));
        assert!(!is_valid_currency_code("E1R"));
    }

    #[test]
    fn test_violations_collects_all_messages() {
        let mut v = Violations::new();
        v.email("nope");
        v.password("Password", "short");
        v.name("Al");
        match v.into_result() {
            Err(AppError::BadRequest(msgs)) => {
                assert_eq!(msgs.len(), 2);
                assert_eq!(msgs[0], "Email is invalid");
                assert!(msgs[1].starts_with("Password must be"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_object_id() {
        let id = ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex(), "recipe").unwrap(), id);
        assert!(matches!(parse_object_id("xyz", "recipe"), Err(AppError::BadRequest(_))));
    }
}
