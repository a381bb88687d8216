//! Model declaration and evaluation.

use crate::error::{ModelError, ModelResult};
use crate::expr::{Expr, Point};
use rmpc_core::{Bounds, CoreError, Id, Real};
use tracing::debug;

/// Whether the dynamics expressions give a derivative or a successor state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModelKind {
    /// `dx/dt = f(x, u, p)`, discretized by collocation.
    #[default]
    Continuous,
    /// `x[k+1] = f(x[k], u[k], p)`.
    Discrete,
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Id);

        impl $name {
            /// Position in the model's ordered vector.
            pub fn index(self) -> usize {
                self.0.index()
            }
        }
    };
}

handle!(
    /// Handle to a declared state.
    StateHandle
);
handle!(
    /// Handle to a declared control input.
    InputHandle
);
handle!(
    /// Handle to a declared uncertain parameter.
    ParamHandle
);

/// A named scalar decision variable with its box bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub bounds: Bounds,
}

/// Dynamics model: ordered states, inputs and uncertain parameters plus one
/// right-hand side per state.
#[derive(Clone, Debug)]
pub struct Model {
    kind: ModelKind,
    states: Vec<Variable>,
    inputs: Vec<Variable>,
    params: Vec<String>,
    rhs: Vec<Option<Expr>>,
    finalized: bool,
}

impl Model {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            states: Vec::new(),
            inputs: Vec::new(),
            params: Vec::new(),
            rhs: Vec::new(),
            finalized: false,
        }
    }

    pub fn continuous() -> Self {
        Self::new(ModelKind::Continuous)
    }

    pub fn discrete() -> Self {
        Self::new(ModelKind::Discrete)
    }

    fn ensure_mutable(&self, operation: &'static str) -> ModelResult<()> {
        if self.finalized {
            return Err(ModelError::FrozenModel { operation });
        }
        Ok(())
    }

    fn ensure_unique(&self, name: &str) -> ModelResult<()> {
        let taken = self.states.iter().any(|v| v.name == name)
            || self.inputs.iter().any(|v| v.name == name)
            || self.params.iter().any(|p| p == name);
        if taken {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_state(&mut self, name: &str) -> ModelResult<StateHandle> {
        self.add_state_bounded(name, Bounds::FREE)
    }

    /// Declare a state together with its box bounds.
    pub fn add_state_bounded(&mut self, name: &str, bounds: Bounds) -> ModelResult<StateHandle> {
        self.ensure_mutable("add a state")?;
        self.ensure_unique(name)?;
        self.states.push(Variable {
            name: name.to_string(),
            bounds,
        });
        self.rhs.push(None);
        Ok(StateHandle(Id::from_index(self.states.len() - 1)))
    }

    pub fn add_input(&mut self, name: &str) -> ModelResult<InputHandle> {
        self.add_input_bounded(name, Bounds::FREE)
    }

    pub fn add_input_bounded(&mut self, name: &str, bounds: Bounds) -> ModelResult<InputHandle> {
        self.ensure_mutable("add an input")?;
        self.ensure_unique(name)?;
        self.inputs.push(Variable {
            name: name.to_string(),
            bounds,
        });
        Ok(InputHandle(Id::from_index(self.inputs.len() - 1)))
    }

    pub fn add_parameter(&mut self, name: &str) -> ModelResult<ParamHandle> {
        self.ensure_mutable("add a parameter")?;
        self.ensure_unique(name)?;
        self.params.push(name.to_string());
        Ok(ParamHandle(Id::from_index(self.params.len() - 1)))
    }

    pub fn set_state_bounds(&mut self, state: StateHandle, bounds: Bounds) -> ModelResult<()> {
        self.ensure_mutable("set state bounds")?;
        let len = self.states.len();
        let var = self
            .states
            .get_mut(state.index())
            .ok_or(ModelError::UnknownHandle {
                what: "state",
                index: state.index(),
                len,
            })?;
        var.bounds = bounds;
        Ok(())
    }

    pub fn set_input_bounds(&mut self, input: InputHandle, bounds: Bounds) -> ModelResult<()> {
        self.ensure_mutable("set input bounds")?;
        let len = self.inputs.len();
        let var = self
            .inputs
            .get_mut(input.index())
            .ok_or(ModelError::UnknownHandle {
                what: "input",
                index: input.index(),
                len,
            })?;
        var.bounds = bounds;
        Ok(())
    }

    /// Assign the right-hand side of one state. Each state takes exactly one.
    pub fn set_dynamics(&mut self, state: StateHandle, expr: Expr) -> ModelResult<()> {
        self.ensure_mutable("set dynamics")?;
        let idx = state.index();
        let len = self.states.len();
        let slot = self.rhs.get_mut(idx).ok_or(ModelError::UnknownHandle {
            what: "state",
            index: idx,
            len,
        })?;
        if slot.is_some() {
            return Err(ModelError::DuplicateDynamics {
                state: self.states[idx].name.clone(),
            });
        }
        *slot = Some(expr);
        Ok(())
    }

    /// Validate and freeze the model.
    pub fn finalize(&mut self) -> ModelResult<()> {
        self.ensure_mutable("finalize")?;

        if self.states.is_empty() {
            return Err(ModelError::IncompleteModel {
                what: "model declares no states".to_string(),
            });
        }

        let missing: Vec<&str> = self
            .states
            .iter()
            .zip(&self.rhs)
            .filter(|(_, rhs)| rhs.is_none())
            .map(|(v, _)| v.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ModelError::IncompleteModel {
                what: format!("no dynamics for states: {}", missing.join(", ")),
            });
        }

        for var in self.states.iter().chain(&self.inputs) {
            var.bounds.validate(&var.name)?;
        }

        self.finalized = true;
        debug!(
            n_x = self.n_x(),
            n_u = self.n_u(),
            n_p = self.n_p(),
            kind = ?self.kind,
            "model finalized"
        );
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn n_x(&self) -> usize {
        self.states.len()
    }

    pub fn n_u(&self) -> usize {
        self.inputs.len()
    }

    pub fn n_p(&self) -> usize {
        self.params.len()
    }

    pub fn states(&self) -> &[Variable] {
        &self.states
    }

    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.params
    }

    pub fn state_bounds(&self) -> Vec<Bounds> {
        self.states.iter().map(|v| v.bounds).collect()
    }

    pub fn input_bounds(&self) -> Vec<Bounds> {
        self.inputs.iter().map(|v| v.bounds).collect()
    }

    pub fn state_handle(&self, name: &str) -> Option<StateHandle> {
        self.states
            .iter()
            .position(|v| v.name == name)
            .map(|i| StateHandle(Id::from_index(i)))
    }

    pub fn input_handle(&self, name: &str) -> Option<InputHandle> {
        self.inputs
            .iter()
            .position(|v| v.name == name)
            .map(|i| InputHandle(Id::from_index(i)))
    }

    pub fn parameter_handle(&self, name: &str) -> Option<ParamHandle> {
        self.params
            .iter()
            .position(|p| p == name)
            .map(|i| ParamHandle(Id::from_index(i)))
    }

    /// Evaluate all right-hand sides into `out`.
    ///
    /// Continuous models yield `dx/dt`, discrete models the successor state.
    pub fn eval_rhs(&self, x: &[Real], u: &[Real], p: &[Real], out: &mut [Real]) -> ModelResult<()> {
        if !self.finalized {
            return Err(ModelError::NotFinalized);
        }
        check_len("state", self.n_x(), x.len())?;
        check_len("input", self.n_u(), u.len())?;
        check_len("parameter", self.n_p(), p.len())?;
        check_len("rhs output", self.n_x(), out.len())?;

        let pt = Point::new(x, u, p);
        for (slot, rhs) in out.iter_mut().zip(&self.rhs) {
            // finalize guarantees every slot is filled
            *slot = rhs.as_ref().map_or(Real::NAN, |e| e.eval(&pt));
        }
        Ok(())
    }

    pub fn rhs(&self, x: &[Real], u: &[Real], p: &[Real]) -> ModelResult<Vec<Real>> {
        let mut out = vec![0.0; self.n_x()];
        self.eval_rhs(x, u, p, &mut out)?;
        Ok(out)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> ModelResult<()> {
    if expected != actual {
        return Err(CoreError::DimensionMismatch {
            what,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrator() -> (Model, StateHandle, InputHandle) {
        let mut m = Model::continuous();
        let x = m.add_state("x").unwrap();
        let u = m.add_input_bounded("u", Bounds::new(0.0, 1.0)).unwrap();
        m.set_dynamics(x, Expr::new(move |pt| pt.u(u))).unwrap();
        (m, x, u)
    }

    #[test]
    fn finalize_requires_all_dynamics() {
        let mut m = Model::continuous();
        let x = m.add_state("x").unwrap();
        m.add_state("y").unwrap();
        m.set_dynamics(x, Expr::constant(0.0)).unwrap();

        let err = m.finalize().unwrap_err();
        match err {
            ModelError::IncompleteModel { what } => assert!(what.contains('y')),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!m.is_finalized());
    }

    #[test]
    fn empty_model_is_incomplete() {
        let mut m = Model::continuous();
        assert!(matches!(
            m.finalize(),
            Err(ModelError::IncompleteModel { .. })
        ));
    }

    #[test]
    fn dynamics_assigned_once() {
        let (mut m, x, _) = integrator();
        assert!(matches!(
            m.set_dynamics(x, Expr::constant(1.0)),
            Err(ModelError::DuplicateDynamics { .. })
        ));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut m = Model::continuous();
        m.add_state("a").unwrap();
        assert!(matches!(
            m.add_input("a"),
            Err(ModelError::DuplicateName { .. })
        ));
    }

    #[test]
    fn inverted_bounds_fail_finalize() {
        let mut m = Model::continuous();
        let x = m.add_state_bounded("x", Bounds::new(2.0, 1.0)).unwrap();
        m.set_dynamics(x, Expr::constant(0.0)).unwrap();
        assert!(matches!(m.finalize(), Err(ModelError::Core(_))));
    }

    #[test]
    fn rhs_requires_finalize() {
        let (m, _, _) = integrator();
        assert_eq!(m.rhs(&[0.0], &[1.0], &[]), Err(ModelError::NotFinalized));
    }

    #[test]
    fn rhs_evaluates_in_state_order() {
        let (mut m, _, _) = integrator();
        m.finalize().unwrap();
        assert_eq!(m.rhs(&[5.0], &[0.25], &[]).unwrap(), vec![0.25]);
        assert!(m.rhs(&[5.0, 1.0], &[0.25], &[]).is_err());
    }

    #[test]
    fn lookup_by_name() {
        let (m, x, u) = integrator();
        assert_eq!(m.state_handle("x"), Some(x));
        assert_eq!(m.input_handle("u"), Some(u));
        assert_eq!(m.parameter_handle("u"), None);
    }
}
