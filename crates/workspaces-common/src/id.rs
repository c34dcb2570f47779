use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of the correlation salt regenerated on every session reset.
pub const SALT_LENGTH: usize = 10;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Random alphanumeric salt used to tag state-changing requests.
///
/// This is a correlation aid, not a security token: it is never consumed
/// and only rotates when the session resets.
pub fn new_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_valid_uuid() {
        let id = new_id();
        let parsed = uuid::Uuid::parse_str(&id);
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn new_id_is_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn salt_length() {
        assert_eq!(new_salt().len(), SALT_LENGTH);
    }

    #[test]
    fn salt_is_alphanumeric() {
        let salt = new_salt();
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn salt_is_unique() {
        let a = new_salt();
        let b = new_salt();
        assert_ne!(a, b);
    }
}
