//! Training batches of replayed transitions.

use ndarray::{Array3, Array4, ArrayView3, Axis};
use serde::{Serialize, Deserialize};

use crate::config::InputShape;
use crate::error::{DqnError, Result};

/// One preprocessed, stacked observation: `(frames, height, width)`, values
/// in `[0, 1]`
pub type Observation = Array3<f32>;

/// A single replayed step of experience
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Observation,
    pub action: usize,
    pub next_state: Observation,
    pub reward: f32,
    pub terminal: bool,
}

/// Five parallel sequences describing `len()` transitions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub states: Vec<Observation>,
    pub actions: Vec<usize>,
    pub next_states: Vec<Observation>,
    pub rewards: Vec<f32>,
    pub terminals: Vec<bool>,
}

impl Batch {
    pub fn new(
        states: Vec<Observation>,
        actions: Vec<usize>,
        next_states: Vec<Observation>,
        rewards: Vec<f32>,
        terminals: Vec<bool>,
    ) -> Self {
        Batch {
            states,
            actions,
            next_states,
            rewards,
            terminals,
        }
    }

    /// Gather transitions into column form, cloning their observations
    pub fn from_transitions(transitions: &[Transition]) -> Self {
        let mut batch = Batch::default();
        for t in transitions {
            batch.states.push(t.state.clone());
            batch.actions.push(t.action);
            batch.next_states.push(t.next_state.clone());
            batch.rewards.push(t.reward);
            batch.terminals.push(t.terminal);
        }
        batch
    }

    /// Number of transitions, taken from `states`
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All five sequences must be non-empty and of equal length
    pub fn validate(&self) -> Result<()> {
        let n = self.states.len();
        if n == 0
            || self.actions.len() != n
            || self.next_states.len() != n
            || self.rewards.len() != n
            || self.terminals.len() != n
        {
            return Err(DqnError::batch_arity(
                n,
                self.actions.len(),
                self.next_states.len(),
                self.rewards.len(),
                self.terminals.len(),
            ));
        }
        Ok(())
    }

    /// `[batch, frames, height, width]` tensor of the states
    pub fn stack_states(&self, shape: InputShape) -> Result<Array4<f32>> {
        stack(&self.states, shape, "states")
    }

    /// `[batch, frames, height, width]` tensor of the next states
    pub fn stack_next_states(&self, shape: InputShape) -> Result<Array4<f32>> {
        stack(&self.next_states, shape, "next_states")
    }
}

fn stack(observations: &[Observation], shape: InputShape, field: &str) -> Result<Array4<f32>> {
    if observations.is_empty() {
        return Err(DqnError::shape(format!("{} is empty", field)));
    }
    let expected = shape.dims();
    if let Some((i, obs)) = observations.iter().enumerate().find(|(_, o)| o.dim() != expected) {
        return Err(DqnError::shape(format!(
            "{}[{}] has shape {:?}, expected {:?}",
            field,
            i,
            obs.dim(),
            expected
        )));
    }
    let views: Vec<ArrayView3<f32>> = observations.iter().map(|o| o.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(value: f32) -> Observation {
        Array3::from_elem((2, 3, 3), value)
    }

    #[test]
    fn test_from_transitions_keeps_order() {
        let transitions: Vec<Transition> = (0..3)
            .map(|i| Transition {
                state: obs(i as f32),
                action: i,
                next_state: obs(i as f32 + 0.5),
                reward: i as f32 * 2.0,
                terminal: i == 2,
            })
            .collect();
        let batch = Batch::from_transitions(&transitions);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.actions, vec![0, 1, 2]);
        assert_eq!(batch.terminals, vec![false, false, true]);

        let stacked = batch.stack_next_states(InputShape::new(2, 3, 3)).unwrap();
        assert_eq!(stacked.dim(), (3, 2, 3, 3));
        assert_eq!(stacked[[1, 0, 0, 0]], 1.5);
    }

    #[test]
    fn test_validate_reports_every_length() {
        let batch = Batch::new(vec![obs(0.0); 2], vec![0], vec![obs(0.0); 2], vec![0.0; 2], vec![false; 3]);
        assert_eq!(batch.validate(), Err(DqnError::batch_arity(2, 1, 2, 2, 3)));
        assert!(matches!(Batch::default().validate(), Err(DqnError::BatchArity { states: 0, .. })));
    }

    #[test]
    fn test_stack_rejects_mismatched_observation() {
        let batch = Batch::new(
            vec![obs(0.0), Array3::zeros((2, 3, 4))],
            vec![0, 0],
            vec![obs(0.0), obs(0.0)],
            vec![0.0, 0.0],
            vec![false, false],
        );
        let err = batch.stack_states(InputShape::new(2, 3, 3)).unwrap_err();
        assert!(matches!(err, DqnError::Shape(msg) if msg.contains("states[1]")));
    }
}
