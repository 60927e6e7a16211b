//! The transition table.

use mmla_state::NodeState;

/// Targets reachable from `from` in one step, excluding the always-legal
/// self transition and reset to `Locked`.
pub fn allowed_targets(from: NodeState) -> &'static [NodeState] {
    use NodeState::*;
    match from {
        Locked => &[Idle],
        Idle => &[Planning],
        Planning => &[Coding],
        Coding => &[Validating],
        Validating => &[Implemented, Coding, Planning],
        Implemented => &[Refactor],
        Refactor => &[Planning, Coding],
    }
}

/// Whether the table permits `from -> to`. Dependency gating on
/// `Locked -> Idle` is not part of this check.
pub fn is_legal_transition(from: NodeState, to: NodeState) -> bool {
    from == to || to == NodeState::Locked || allowed_targets(from).contains(&to)
}

/// `Locked -> Idle` is the only transition that consults dependencies.
pub fn is_gated(from: NodeState, to: NodeState) -> bool {
    from == NodeState::Locked && to == NodeState::Idle
}

#[cfg(test)]
mod tests {
    use super::*;
    use NodeState::*;

    #[test]
    fn self_and_reset_are_always_legal() {
        for s in NodeState::ALL {
            assert!(is_legal_transition(s, s), "{s} -> {s}");
            assert!(is_legal_transition(s, Locked), "{s} -> LOCKED");
        }
    }

    #[test]
    fn forward_path_is_legal() {
        let path = [Locked, Idle, Planning, Coding, Validating, Implemented, Refactor, Coding];
        for pair in path.windows(2) {
            assert!(is_legal_transition(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(is_legal_transition(Validating, Planning));
        assert!(is_legal_transition(Refactor, Planning));
    }

    #[test]
    fn shortcuts_are_illegal() {
        assert!(!is_legal_transition(Idle, Coding));
        assert!(!is_legal_transition(Coding, Implemented));
        assert!(!is_legal_transition(Locked, Planning));
        assert!(!is_legal_transition(Implemented, Coding));
        assert!(!is_legal_transition(Planning, Validating));
    }

    #[test]
    fn table_size() {
        let legal = NodeState::ALL
            .iter()
            .flat_map(|&a| NodeState::ALL.iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| is_legal_transition(a, b))
            .count();
        // 7 self, 6 resets (LOCKED->LOCKED counted once), 10 table entries
        assert_eq!(legal, 7 + 6 + 10);
    }
}
