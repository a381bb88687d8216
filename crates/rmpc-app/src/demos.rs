//! Built-in demo plants selectable from a run config.

use rmpc_core::{Bounds, Real};
use rmpc_model::{Expr, InputHandle, Model, ModelResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Demo plant selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoModel {
    /// `dx/dt = u`, `0 <= u <= 1`, terminal cost `-x`.
    Integrator,
    /// Unit mass on a spring and damper with uncertain stiffness and damping,
    /// regulated to the origin.
    MassSpringDamper,
}

impl DemoModel {
    pub fn label(self) -> &'static str {
        match self {
            DemoModel::Integrator => "integrator",
            DemoModel::MassSpringDamper => "mass_spring_damper",
        }
    }

    pub fn state_names(self) -> &'static [&'static str] {
        match self {
            DemoModel::Integrator => &["x"],
            DemoModel::MassSpringDamper => &["position", "velocity"],
        }
    }

    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            DemoModel::Integrator => &[],
            DemoModel::MassSpringDamper => &["stiffness", "damping"],
        }
    }

    /// Suggested realizations per parameter, nominal first.
    pub fn default_realizations(self) -> Vec<(&'static str, Vec<Real>)> {
        match self {
            DemoModel::Integrator => Vec::new(),
            DemoModel::MassSpringDamper => vec![
                ("stiffness", vec![1.0, 0.8, 1.2]),
                ("damping", vec![0.5, 0.3, 0.7]),
            ],
        }
    }

    pub fn build(self) -> ModelResult<DemoProblem> {
        match self {
            DemoModel::Integrator => integrator(),
            DemoModel::MassSpringDamper => mass_spring_damper(),
        }
    }
}

/// Finalized model plus the control problem posed on it.
#[derive(Clone, Debug)]
pub struct DemoProblem {
    pub model: Arc<Model>,
    pub lterm: Option<Expr>,
    pub mterm: Option<Expr>,
    pub rterm: Vec<(InputHandle, Real)>,
    /// `(name, expr, upper)` path constraints.
    pub constraints: Vec<(String, Expr, Real)>,
}

fn integrator() -> ModelResult<DemoProblem> {
    let mut m = Model::continuous();
    let x = m.add_state("x")?;
    let u = m.add_input_bounded("u", Bounds::new(0.0, 1.0))?;
    m.set_dynamics(x, Expr::new(move |pt| pt.u(u)))?;
    m.finalize()?;

    Ok(DemoProblem {
        model: Arc::new(m),
        lterm: None,
        mterm: Some(Expr::new(move |pt| -pt.x(x))),
        rterm: Vec::new(),
        constraints: Vec::new(),
    })
}

fn mass_spring_damper() -> ModelResult<DemoProblem> {
    let mut m = Model::continuous();
    let pos = m.add_state_bounded("position", Bounds::new(-5.0, 5.0))?;
    let vel = m.add_state("velocity")?;
    let force = m.add_input_bounded("force", Bounds::new(-2.0, 2.0))?;
    let k = m.add_parameter("stiffness")?;
    let c = m.add_parameter("damping")?;

    m.set_dynamics(pos, Expr::new(move |pt| pt.x(vel)))?;
    m.set_dynamics(
        vel,
        Expr::new(move |pt| pt.u(force) - pt.p(k) * pt.x(pos) - pt.p(c) * pt.x(vel)),
    )?;
    m.finalize()?;

    Ok(DemoProblem {
        model: Arc::new(m),
        lterm: Some(Expr::new(move |pt| {
            pt.x(pos).powi(2) + 0.1 * pt.x(vel).powi(2)
        })),
        mterm: Some(Expr::new(move |pt| pt.x(pos).powi(2) + pt.x(vel).powi(2))),
        rterm: vec![(force, 0.01)],
        constraints: vec![(
            "speed_limit".to_string(),
            Expr::new(move |pt| pt.x(vel).powi(2)),
            1.0,
        )],
    })
}
