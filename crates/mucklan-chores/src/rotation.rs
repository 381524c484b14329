//! Round-robin cleaning rotation.
//!
//! Resident `i` (list order, not alphabetical) gets task `(counter + i) mod N`.
//! The whole assignment is reproducible from the counter alone, which is why
//! the counter is the only persisted state.

use mucklan_core::error::{MucklanError, Result};
use mucklan_core::types::ResidentId;
use serde::{Deserialize, Serialize};

/// Persisted rotation offset. `0 <= counter < tasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationState {
    pub counter: usize,
}

impl RotationState {
    pub fn new(counter: usize) -> Self {
        Self { counter }
    }
}

/// One resident's task for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub resident: ResidentId,
    pub task: String,
}

/// Result of one rotation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// In resident order.
    pub assignments: Vec<Assignment>,
    pub next: RotationState,
}

impl Rotation {
    /// Task assigned to a resident in this cycle.
    pub fn task_for(&self, resident: &ResidentId) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| &a.resident == resident)
            .map(|a| a.task.as_str())
    }
}

/// Check the rotation preconditions without computing anything.
pub fn check(residents: &[ResidentId], tasks: &[String], state: RotationState) -> Result<()> {
    if residents.is_empty() || tasks.is_empty() {
        return Err(MucklanError::EmptyRotation);
    }
    if residents.len() != tasks.len() {
        return Err(MucklanError::RotationMismatch {
            residents: residents.len(),
            tasks: tasks.len(),
        });
    }
    if state.counter >= tasks.len() {
        return Err(MucklanError::CounterOutOfRange {
            counter: state.counter,
            tasks: tasks.len(),
        });
    }
    Ok(())
}

/// Compute this cycle's assignments and the counter for the next cycle.
pub fn assign(residents: &[ResidentId], tasks: &[String], state: RotationState) -> Result<Rotation> {
    check(residents, tasks, state)?;
    let n = tasks.len();

    let assignments = residents
        .iter()
        .enumerate()
        .map(|(i, resident)| Assignment {
            resident: resident.clone(),
            task: tasks[(state.counter + i) % n].clone(),
        })
        .collect();

    Ok(Rotation {
        assignments,
        next: RotationState::new((state.counter + 1) % n),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn residents(n: usize) -> Vec<ResidentId> {
        (0..n).map(|i| ResidentId::new(format!("R{i}"))).collect()
    }

    fn tasks(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{i}")).collect()
    }

    fn pairs(rotation: &Rotation) -> Vec<(&str, &str)> {
        rotation
            .assignments
            .iter()
            .map(|a| (a.resident.as_str(), a.task.as_str()))
            .collect()
    }

    #[test]
    fn test_counter_zero() {
        let rotation = assign(&residents(3), &tasks(3), RotationState::new(0)).unwrap();
        assert_eq!(pairs(&rotation), vec![("R0", "T0"), ("R1", "T1"), ("R2", "T2")]);
        assert_eq!(rotation.next, RotationState::new(1));
    }

    #[test]
    fn test_counter_one() {
        let rotation = assign(&residents(3), &tasks(3), RotationState::new(1)).unwrap();
        assert_eq!(pairs(&rotation), vec![("R0", "T1"), ("R1", "T2"), ("R2", "T0")]);
        assert_eq!(rotation.next, RotationState::new(2));
    }

    #[test]
    fn test_counter_wraps() {
        let rotation = assign(&residents(3), &tasks(3), RotationState::new(2)).unwrap();
        assert_eq!(rotation.next, RotationState::new(0));
        assert_eq!(rotation.task_for(&ResidentId::new("R0")), Some("T2"));
    }

    #[test]
    fn test_full_cycle_covers_every_task() {
        for n in 1..=6 {
            let rs = residents(n);
            let ts = tasks(n);
            let mut seen: HashMap<ResidentId, HashSet<String>> = HashMap::new();
            let mut state = RotationState::new(n / 2);

            for _ in 0..n {
                let rotation = assign(&rs, &ts, state).unwrap();
                // Each cycle is a permutation.
                let distinct: HashSet<&str> =
                    rotation.assignments.iter().map(|a| a.task.as_str()).collect();
                assert_eq!(distinct.len(), n);

                for a in rotation.assignments {
                    assert!(seen.entry(a.resident).or_default().insert(a.task));
                }
                state = rotation.next;
            }

            assert_eq!(state, RotationState::new(n / 2));
            for r in &rs {
                assert_eq!(seen[r].len(), n);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let a = assign(&residents(4), &tasks(4), RotationState::new(3)).unwrap();
        let b = assign(&residents(4), &tasks(4), RotationState::new(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mismatch_is_rejected() {
        let err = assign(&residents(3), &tasks(2), RotationState::new(0)).unwrap_err();
        assert!(matches!(err, MucklanError::RotationMismatch { residents: 3, tasks: 2 }));
    }

    #[test]
    fn test_empty_is_rejected() {
        let err = assign(&[], &[], RotationState::new(0)).unwrap_err();
        assert!(matches!(err, MucklanError::EmptyRotation));
    }

    #[test]
    fn test_counter_out_of_range() {
        let err = assign(&residents(2), &tasks(2), RotationState::new(2)).unwrap_err();
        assert!(matches!(err, MucklanError::CounterOutOfRange { counter: 2, tasks: 2 }));
    }
}
