//! Temporal-difference regression targets.
//!
//! The online network chooses the next action and the target network values
//! it. Only the column of the action actually taken differs from the online
//! estimates, so the loss on every other column is zero.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{DqnError, Result};

/// Index of the first maximal entry; `None` for an empty row.
///
/// NaN entries are never chosen over a number.
pub fn argmax_first(values: ArrayView1<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            None => best = Some((i, v)),
            Some((_, b)) if v > b || (b.is_nan() && !v.is_nan()) => best = Some((i, v)),
            _ => {}
        }
    }
    best.map(|(i, _)| i)
}

/// Build the regression targets `y` for one batch.
///
/// * `qs` - online estimates for the states, `[batch, actions]`
/// * `qs_next` - online estimates for the next states, used to pick the
///   bootstrap action
/// * `qs_next_target` - target-network estimates for the next states, used
///   to value that action
///
/// For row `i`, `y[i][actions[i]]` is `rewards[i]` when `terminals[i]` and
/// `rewards[i] + gamma * qs_next_target[i][argmax_first(qs_next[i])]`
/// otherwise. Every other entry is copied from `qs`.
pub fn build_targets(
    qs: ArrayView2<f32>,
    qs_next: ArrayView2<f32>,
    qs_next_target: ArrayView2<f32>,
    actions: &[usize],
    rewards: &[f32],
    terminals: &[bool],
    gamma: f32,
) -> Result<Array2<f32>> {
    if qs.dim() != qs_next.dim() || qs.dim() != qs_next_target.dim() {
        return Err(DqnError::shape(format!(
            "action-value matrices differ in shape: qs {:?}, qs_next {:?}, qs_next_target {:?}",
            qs.dim(),
            qs_next.dim(),
            qs_next_target.dim()
        )));
    }
    let (batch, action_count) = qs.dim();
    if batch == 0 || actions.len() != batch || rewards.len() != batch || terminals.len() != batch {
        return Err(DqnError::batch_arity(batch, actions.len(), batch, rewards.len(), terminals.len()));
    }
    if let Some(&action) = actions.iter().find(|&&a| a >= action_count) {
        return Err(DqnError::InvalidAction {
            action,
            max_actions: action_count,
        });
    }

    let mut targets = qs.to_owned();
    for i in 0..batch {
        let value = if terminals[i] {
            rewards[i]
        } else {
            let best_next = argmax_first(qs_next.row(i))
                .ok_or_else(|| DqnError::shape("action-value rows are empty"))?;
            rewards[i] + gamma * qs_next_target[[i, best_next]]
        };
        targets[[i, actions[i]]] = value;
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_first_prefers_lowest_index() {
        let row = array![0.0, 1.0, 7.0, 3.0, 2.0, 7.0];
        assert_eq!(argmax_first(row.view()), Some(2));
        assert_eq!(argmax_first(array![0.5, 0.5].view()), Some(0));
        assert_eq!(argmax_first(ndarray::Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn test_argmax_first_skips_nan() {
        assert_eq!(argmax_first(array![f32::NAN, 1.0, 0.5].view()), Some(1));
    }

    #[test]
    fn test_bootstrap_uses_online_choice_and_target_value() {
        let y = build_targets(
            array![[1.0, 2.0]].view(),
            array![[0.5, 0.5]].view(),
            array![[3.0, 4.0]].view(),
            &[1],
            &[1.0],
            &[false],
            0.9,
        )
        .unwrap();
        assert_eq!(y[[0, 0]], 1.0);
        assert!((y[[0, 1]] - 3.7).abs() < 1e-6);
    }

    #[test]
    fn test_terminal_drops_bootstrap() {
        let y = build_targets(
            array![[1.0, 2.0]].view(),
            array![[0.5, 0.5]].view(),
            array![[3.0, 4.0]].view(),
            &[1],
            &[1.0],
            &[true],
            0.9,
        )
        .unwrap();
        assert_eq!(y, array![[1.0, 1.0]]);
    }
}
