//! Once finalized, every mutating call on a model is rejected.

use proptest::prelude::*;
use rmpc_core::Bounds;
use rmpc_model::{Expr, Model, ModelError};

fn build(n_states: usize, n_inputs: usize, n_params: usize) -> Model {
    let mut m = Model::continuous();
    let inputs: Vec<_> = (0..n_inputs)
        .map(|i| m.add_input(&format!("u{i}")).unwrap())
        .collect();
    for i in 0..n_params {
        m.add_parameter(&format!("p{i}")).unwrap();
    }
    for i in 0..n_states {
        let x = m.add_state(&format!("x{i}")).unwrap();
        let u = inputs.first().copied();
        m.set_dynamics(
            x,
            Expr::new(move |pt| -pt.x(x) + u.map_or(0.0, |u| pt.u(u))),
        )
        .unwrap();
    }
    m
}

fn is_frozen<T: std::fmt::Debug>(r: Result<T, ModelError>) -> bool {
    matches!(r, Err(ModelError::FrozenModel { .. }))
}

proptest! {
    #[test]
    fn finalize_then_mutate_fails(
        n_states in 1usize..5,
        n_inputs in 1usize..4,
        n_params in 0usize..3,
        which in 0usize..8,
    ) {
        let mut m = build(n_states, n_inputs, n_params);
        m.finalize().unwrap();

        let x = m.state_handle("x0").unwrap();
        let u = m.input_handle("u0").unwrap();
        let frozen = match which {
            0 => is_frozen(m.add_state("late_state")),
            1 => is_frozen(m.add_input("late_input")),
            2 => is_frozen(m.add_parameter("late_param")),
            3 => is_frozen(m.set_dynamics(x, Expr::constant(0.0))),
            4 => is_frozen(m.set_state_bounds(x, Bounds::new(0.0, 1.0))),
            5 => is_frozen(m.set_input_bounds(u, Bounds::new(0.0, 1.0))),
            6 => is_frozen(m.add_state_bounded("late_bounded", Bounds::FREE)),
            _ => is_frozen(m.finalize()),
        };
        prop_assert!(frozen);
        prop_assert_eq!(m.n_x(), n_states);
        prop_assert_eq!(m.n_u(), n_inputs);
        prop_assert_eq!(m.n_p(), n_params);
    }
}
