use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = netcafe_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Marker trait for row types keyed by a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const SESSION: &str = "ses";
    pub const WORKSTATION: &str = "wks";
    pub const FILE: &str = "fil";
    pub const FILE_LOG: &str = "flg";
    pub const BACKUP: &str = "bak";
    pub const CONNECTION: &str = "rtc";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid("usr");
        assert!(id.starts_with("usr_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid("ses");
        let b = prefixed_ulid("ses");
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefixed_id_trait_uses_prefix() {
        struct Backup;
        impl PrefixedId for Backup {
            const PREFIX: &'static str = prefix::BACKUP;
        }
        assert!(Backup::generate().starts_with("bak_"));
    }
}
