//! Legacy crypt authentication.
use super::AuthError;

/// Fixed salt of the legacy scheme.
const SALT: &str = "9z";

/// Hash `password` with unix crypt, the salt prefix stripped.
pub fn crypt(password: &str) -> Result<Vec<u8>, AuthError> {
    let hash = pwhash::unix_crypt::hash_with(SALT, password)
        .map_err(|_| AuthError::Malformed("legacy password hash"))?;
    Ok(hash.as_bytes()[SALT.len()..].to_vec())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn salt_is_stripped() {
        assert_eq!(crypt("masterkey").unwrap(), b"QP3LMZ/MJh.");
    }

    #[test]
    fn only_eight_bytes_count() {
        assert_eq!(crypt("masterkey").unwrap(), crypt("masterkex").unwrap());
        assert_ne!(crypt("masterke").unwrap(), crypt("masterka").unwrap());
    }
}
