use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};

use crate::error::DqnError;
use crate::target::{argmax_first, build_targets};

#[test]
fn test_tie_at_two_and_five_uses_two() {
    let qs = Array2::<f32>::zeros((1, 6));
    let qs_next = array![[0.0, 1.0, 9.0, 3.0, 4.0, 9.0]];
    let qs_next_target = array![[0.0, 0.0, 10.0, 0.0, 0.0, -10.0]];
    let y = build_targets(qs.view(), qs_next.view(), qs_next_target.view(), &[0], &[0.5], &[false], 0.5).unwrap();
    assert_eq!(argmax_first(qs_next.row(0)), Some(2));
    assert_abs_diff_eq!(y[[0, 0]], 5.5, epsilon = 1e-6);
}

#[test]
fn test_only_taken_action_column_changes() {
    let qs = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
    let qs_next = array![[0.0, 1.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
    let qs_next_target = array![[1.0, 2.0, 3.0], [10.0, 20.0, 30.0], [-1.0, -2.0, -3.0]];
    let actions = [2, 0, 1];
    let rewards = [1.0, -1.0, 0.5];
    let terminals = [false, true, false];
    let gamma = 0.99;

    let y = build_targets(qs.view(), qs_next.view(), qs_next_target.view(), &actions, &rewards, &terminals, gamma).unwrap();

    for i in 0..3 {
        for j in 0..3 {
            if j != actions[i] {
                assert_eq!(y[[i, j]], qs[[i, j]]);
            }
        }
    }
    // Online picks action 1, the target values it at 2.0
    assert_abs_diff_eq!(y[[0, 2]], 1.0 + 0.99 * 2.0, epsilon = 1e-6);
    // Terminal: reward only, whatever the next-state estimates say
    assert_eq!(y[[1, 0]], -1.0);
    assert_abs_diff_eq!(y[[2, 1]], 0.5 + 0.99 * -3.0, epsilon = 1e-6);
}

#[test]
fn test_online_network_selects_target_network_values() {
    // Target network prefers action 0, online prefers action 1
    let qs = array![[0.0, 0.0]];
    let qs_next = array![[0.0, 1.0]];
    let qs_next_target = array![[100.0, 2.0]];
    let y = build_targets(qs.view(), qs_next.view(), qs_next_target.view(), &[0], &[0.0], &[false], 1.0).unwrap();
    assert_eq!(y[[0, 0]], 2.0);
}

#[test]
fn test_rejects_out_of_range_action() {
    let q = array![[1.0, 2.0]];
    let err = build_targets(q.view(), q.view(), q.view(), &[2], &[0.0], &[false], 0.9).unwrap_err();
    assert_eq!(err, DqnError::InvalidAction { action: 2, max_actions: 2 });
}

#[test]
fn test_rejects_mismatched_lengths() {
    let q = array![[1.0, 2.0], [3.0, 4.0]];
    let err = build_targets(q.view(), q.view(), q.view(), &[0, 1], &[0.0], &[false, true], 0.9).unwrap_err();
    assert!(matches!(err, DqnError::BatchArity { rewards: 1, .. }));
}

#[test]
fn test_rejects_mismatched_matrices() {
    let q = array![[1.0, 2.0]];
    let wide = array![[1.0, 2.0, 3.0]];
    let err = build_targets(q.view(), wide.view(), q.view(), &[0], &[0.0], &[false], 0.9).unwrap_err();
    assert!(matches!(err, DqnError::Shape(_)));
}
