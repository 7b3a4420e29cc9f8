//! Who is speaking. The sender is resolved once per command and passed
//! down explicitly; nothing below this module reads the environment for it.

use crate::address::Address;
use crate::error::Result;

/// Exported into every agent session by `gt session start`.
pub const ADDRESS_ENV: &str = "GT_ADDRESS";

/// Sender for this invocation: `--from` if given, else `$GT_ADDRESS`, else
/// the mayor (an operator at a plain shell).
pub fn resolve_sender(flag: Option<&str>) -> Result<Address> {
    resolve(flag, std::env::var(ADDRESS_ENV).ok().as_deref())
}

fn resolve(flag: Option<&str>, env: Option<&str>) -> Result<Address> {
    match flag.or(env.filter(|s| !s.trim().is_empty())) {
        Some(raw) => Address::parse(raw.trim()),
        None => Ok(Address::Mayor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GtError;

    #[test]
    fn flag_wins_over_env() {
        let a = resolve(Some("wyvern/Toast"), Some("deacon")).unwrap();
        assert_eq!(a.identity(), "wyvern/Toast");
    }

    #[test]
    fn env_used_without_flag() {
        assert_eq!(resolve(None, Some("deacon")).unwrap(), Address::Deacon);
    }

    #[test]
    fn defaults_to_mayor() {
        assert_eq!(resolve(None, None).unwrap(), Address::Mayor);
        assert_eq!(resolve(None, Some("  ")).unwrap(), Address::Mayor);
    }

    #[test]
    fn malformed_sender_is_rejected() {
        assert!(matches!(
            resolve(Some("rig/"), None),
            Err(GtError::InvalidFormat { .. })
        ));
    }
}
