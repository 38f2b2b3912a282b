// Copyright (c) 2024 Mike Tsao

//! Stable identities for pipeline stages, and the factory that mints them.

use core::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};
use synonym::Synonym;

/// Identifies one transformer stage. It stays the same when the stage is
/// reordered, reconfigured, or sent across a thread boundary. Zero means
/// "not yet assigned."
#[derive(Synonym, Serialize, Deserialize, Eq, PartialEq)]
// See
// https://doc.rust-lang.org/stable/std/marker/trait.StructuralPartialEq.html
// for explanation why we derive PartialEq rather than letting Synonym do it.
#[synonym(skip(PartialEq))]
#[serde(rename_all = "kebab-case")]
pub struct Uid(pub usize);
impl Uid {
    /// Whether this uid has been assigned by someone.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

/// Generates unique [Uid]s.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UidFactory {
    next_uid_value: AtomicUsize,
}
impl Default for UidFactory {
    fn default() -> Self {
        Self::new(Self::FIRST_UID)
    }
}
impl UidFactory {
    /// The first value handed out by a default factory.
    pub const FIRST_UID: usize = 1;

    /// Creates a new [UidFactory] starting with the given value.
    pub fn new(first_uid: usize) -> Self {
        Self {
            next_uid_value: AtomicUsize::new(first_uid.max(Self::FIRST_UID)),
        }
    }

    /// Generates the next unique uid.
    pub fn mint_next(&self) -> Uid {
        Uid(self.next_uid_value.fetch_add(1, Ordering::Relaxed))
    }

    /// Notifies the factory that a uid exists that might have been created
    /// elsewhere (for example, in a wire record). This keeps the factory from
    /// minting that value again.
    pub fn notify_externally_minted_uid(&self, uid: Uid) {
        if uid.0 >= self.next_uid_value.load(Ordering::Relaxed) {
            self.next_uid_value.store(uid.0 + 1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_factory() {
        let f = UidFactory::default();

        let uid_1 = f.mint_next();
        let uid_2 = f.mint_next();
        assert_ne!(uid_1, uid_2, "Minted Uids should not repeat");
        assert!(uid_1.is_assigned());
        assert!(!Uid::default().is_assigned());

        let mut ids: std::collections::HashSet<Uid> = Default::default();
        for _ in 0..64 {
            let uid = f.mint_next();
            assert!(!ids.contains(&uid), "minted uids should be unique");
            ids.insert(uid);
        }
    }

    #[test]
    fn uid_factory_with_notify_works() {
        let f = UidFactory::default();

        let uid_1 = f.mint_next();
        let uid_2 = Uid(uid_1.0 + 1);
        f.notify_externally_minted_uid(uid_2);
        let uid_3 = f.mint_next();
        assert_ne!(uid_2, uid_3, "Notifying factory should cause it to skip past.");

        f.notify_externally_minted_uid(uid_2);
        let uid_4 = f.mint_next();
        assert_eq!(
            uid_4.0,
            uid_3.0 + 1,
            "Notifying factory about value below next should be no-op."
        );
    }
}
