//! Property-based tests for role derivation and record ordering.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::clock::{Clock, ManualClock};
    use crate::model::{derive_role, AuthorizationRecord, Role, StampSource};

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::None),
            Just(Role::ElevatedMember),
            Just(Role::Administrator),
            Just(Role::SuperAdministrator),
        ]
    }

    proptest! {
        #[test]
        fn test_explicit_level_always_wins(flag in any::<bool>(), level in role_strategy()) {
            prop_assert_eq!(derive_role(flag, Some(level)), level);
        }

        #[test]
        fn test_absent_level_follows_flag(flag in any::<bool>()) {
            let expected = if flag { Role::Administrator } else { Role::None };
            prop_assert_eq!(derive_role(flag, None), expected);
        }

        #[test]
        fn test_newest_record_wins_regardless_of_arrival_order(
            roles in prop::collection::vec(role_strategy(), 1..12),
            order in any::<u64>(),
        ) {
            let clock = Arc::new(ManualClock::starting_now());
            let source = StampSource::new(clock.clone());
            let now = clock.now();

            let records: Vec<AuthorizationRecord> = roles
                .iter()
                .map(|role| AuthorizationRecord::resolved("a@b.c", None, *role, source.next(), now))
                .collect();
            let newest = records.last().cloned().unwrap();

            // Deterministic shuffle from the generated seed.
            let mut arrival = records.clone();
            let mut seed = order;
            for i in (1..arrival.len()).rev() {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (seed % (i as u64 + 1)) as usize;
                arrival.swap(i, j);
            }

            let mut applied: Option<AuthorizationRecord> = None;
            for record in arrival {
                let replace = match &applied {
                    Some(current) => record.supersedes(current),
                    None => true,
                };
                if replace {
                    applied = Some(record);
                }
            }

            prop_assert_eq!(applied, Some(newest));
        }
    }
}
