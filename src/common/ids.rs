// SPDX-License-Identifier: MIT

use uuid::Uuid;

/// Collision-resistant proposal identifier. Timestamp-derived ids collide
/// under rapid creation within one millisecond, so ids are random.
pub fn new_proposal_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_under_rapid_creation() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_proposal_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }
}
