//! Scenario-tree NLP assembly.
//!
//! [`NlpStructure::assemble`] fixes the variable layout, bounds and
//! derivative sparsity once per setup. Each control step then builds a cheap
//! [`NlpInstance`] carrying the measured state and the previously applied
//! input, which the solver sees through the [`Nlp`] trait.
//!
//! Every constraint row and every objective term belongs to exactly one tree
//! node and reads only that node's variables plus its parent's state and
//! input, so derivatives are taken by finite differences over those few
//! variables and scattered into the dense matrices.

use crate::collocation::{Collocation, CollocationSettings};
use crate::error::{NlpError, NlpResult};
use crate::layout::{LayoutDims, LayoutSignature, NodeLayout, build_layout};
use crate::objective::{NlConstraint, Objective};
use nalgebra::{DMatrix, DVector};
use rmpc_core::{Bounds, NodeId, Real};
use rmpc_model::{Model, ModelError, ModelKind, Point};
use rmpc_solver::jacobian::{
    GRADIENT_EPS, HESSIAN_EPS, JACOBIAN_EPS, central_difference_gradient,
    finite_difference_hessian, finite_difference_jacobian,
};
use rmpc_solver::{Nlp, SolverResult};
use rmpc_tree::ScenarioTree;
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug;

/// Everything needed to lay out the NLP.
#[derive(Clone, Debug)]
pub struct NlpSpec {
    pub model: Arc<Model>,
    pub tree: Arc<ScenarioTree>,
    pub collocation: CollocationSettings,
    pub t_step: Real,
    pub objective: Objective,
    pub constraints: Vec<NlConstraint>,
    pub state_bounds: Vec<Bounds>,
    pub input_bounds: Vec<Bounds>,
}

/// Fixed NLP structure for one controller setup.
#[derive(Debug)]
pub struct NlpStructure {
    model: Arc<Model>,
    tree: Arc<ScenarioTree>,
    collocation: Option<Collocation>,
    t_step: Real,
    objective: Objective,
    rterm: Vec<Real>,
    constraints: Vec<NlConstraint>,
    nodes: Vec<NodeLayout>,
    n_vars: usize,
    n_cons: usize,
    lower: DVector<Real>,
    upper: DVector<Real>,
    cost_vars: Vec<Vec<usize>>,
    con_vars: Vec<Vec<usize>>,
}

impl NlpStructure {
    pub fn assemble(spec: NlpSpec) -> NlpResult<Self> {
        let NlpSpec {
            model,
            tree,
            collocation,
            t_step,
            objective,
            constraints,
            state_bounds,
            input_bounds,
        } = spec;

        if !model.is_finalized() {
            return Err(ModelError::NotFinalized.into());
        }
        if !(t_step.is_finite() && t_step > 0.0) {
            return Err(NlpError::Configuration {
                what: format!("t_step must be positive and finite, got {t_step}"),
            });
        }
        collocation.validate()?;

        let (n_x, n_u, n_p) = (model.n_x(), model.n_u(), model.n_p());
        check_len("state bounds", n_x, state_bounds.len())?;
        check_len("input bounds", n_u, input_bounds.len())?;
        for (b, var) in state_bounds.iter().zip(model.states()) {
            validate_bounds(b, &var.name)?;
        }
        for (b, var) in input_bounds.iter().zip(model.inputs()) {
            validate_bounds(b, &var.name)?;
        }

        let rterm = if objective.rterm.is_empty() {
            vec![0.0; n_u]
        } else {
            check_len("rterm weights", n_u, objective.rterm.len())?;
            objective.rterm.clone()
        };
        if rterm.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(NlpError::Configuration {
                what: "rterm weights must be finite and non-negative".to_string(),
            });
        }
        if let Some(c) = constraints.iter().find(|c| c.upper.is_nan()) {
            return Err(NlpError::Configuration {
                what: format!("constraint '{}' has a NaN upper bound", c.name),
            });
        }
        if let Some(values) = tree.combinations().first().map(|_| tree.combination_values(0)) {
            check_len("uncertain parameter values", n_p, values.len())?;
        }

        let collocation = match model.kind() {
            ModelKind::Continuous => Some(Collocation::new(collocation)?),
            ModelKind::Discrete => None,
        };

        let parents: Vec<Option<usize>> = tree
            .nodes()
            .iter()
            .map(|n| n.parent.map(NodeId::index))
            .collect();
        let depths: Vec<usize> = tree.nodes().iter().map(|n| n.depth).collect();
        let dims = LayoutDims {
            n_x,
            n_u,
            n_nl: constraints.len(),
            collocation: collocation
                .as_ref()
                .map(|c| (c.degree(), c.finite_elements())),
        };
        let (nodes, n_vars, n_cons) = build_layout(&parents, &depths, tree.n_horizon(), &dims);

        let mut lower = DVector::from_element(n_vars, Real::NEG_INFINITY);
        let mut upper = DVector::from_element(n_vars, Real::INFINITY);
        let mut set_block = |offset: usize, bounds: &[Bounds]| {
            for (i, b) in bounds.iter().enumerate() {
                lower[offset + i] = b.lower;
                upper[offset + i] = b.upper;
            }
        };
        let degree = collocation.as_ref().map_or(0, Collocation::degree);
        for node in &nodes {
            for el in &node.elements {
                if let Some(start) = el.start {
                    set_block(start, &state_bounds);
                }
                for j in 0..degree {
                    set_block(el.colloc + j * n_x, &state_bounds);
                }
            }
            if node.parent.is_some() {
                set_block(node.state, &state_bounds);
            }
            if let Some(input) = node.input {
                set_block(input, &input_bounds);
            }
            if let Some(slack) = node.slack {
                let slack_bounds: Vec<Bounds> =
                    constraints.iter().map(|c| Bounds::at_most(c.upper)).collect();
                set_block(slack, &slack_bounds);
            }
        }

        let cost_vars = nodes
            .iter()
            .map(|node| {
                let mut vars: Vec<usize> = (node.state..node.state + n_x).collect();
                if let Some(input) = node.input {
                    vars.extend(input..input + n_u);
                }
                if let Some(pi) = node.parent.and_then(|p| nodes[p].input) {
                    vars.extend(pi..pi + n_u);
                }
                vars
            })
            .collect();
        let con_vars = nodes
            .iter()
            .map(|node| {
                let Some(parent) = node.parent else {
                    return Vec::new();
                };
                let mut vars = Vec::new();
                for el in &node.elements {
                    if let Some(start) = el.start {
                        vars.extend(start..start + n_x);
                    }
                    vars.extend(el.colloc..el.colloc + degree * n_x);
                }
                vars.extend(node.state..node.state + n_x);
                if let Some(slack) = node.slack {
                    vars.extend(slack..slack + dims.n_nl);
                }
                let p = &nodes[parent];
                vars.extend(p.state..p.state + n_x);
                if let Some(pi) = p.input {
                    vars.extend(pi..pi + n_u);
                }
                vars
            })
            .collect();

        debug!(
            n_vars,
            n_cons,
            nodes = nodes.len(),
            scenarios = tree.n_scenarios(),
            kind = ?model.kind(),
            "NLP assembled"
        );

        Ok(Self {
            model,
            tree,
            collocation,
            t_step,
            objective,
            rterm,
            constraints,
            nodes,
            n_vars,
            n_cons,
            lower,
            upper,
            cost_vars,
            con_vars,
        })
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn n_cons(&self) -> usize {
        self.n_cons
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn tree(&self) -> &ScenarioTree {
        &self.tree
    }

    pub fn layout(&self) -> &[NodeLayout] {
        &self.nodes
    }

    pub fn signature(&self) -> LayoutSignature {
        LayoutSignature {
            n_vars: self.n_vars,
            n_cons: self.n_cons,
            nodes: self.nodes.clone(),
        }
    }

    pub fn base_lower_bounds(&self) -> &DVector<Real> {
        &self.lower
    }

    pub fn base_upper_bounds(&self) -> &DVector<Real> {
        &self.upper
    }

    /// Problem instance for one control step.
    pub fn instance(&self, x0: &[Real], u_prev: &[Real]) -> NlpResult<NlpInstance<'_>> {
        let n_x = self.model.n_x();
        check_len("initial state", n_x, x0.len())?;
        check_len("previous input", self.model.n_u(), u_prev.len())?;
        if let Some(bad) = x0.iter().chain(u_prev).find(|v| !v.is_finite()) {
            return Err(NlpError::Configuration {
                what: format!("non-finite initial value {bad}"),
            });
        }

        let mut lower = self.lower.clone();
        let mut upper = self.upper.clone();
        let root = &self.nodes[0];
        for (i, &v) in x0.iter().enumerate() {
            lower[root.state + i] = v;
            upper[root.state + i] = v;
        }
        Ok(NlpInstance {
            structure: self,
            lower,
            upper,
            u_prev: u_prev.to_vec(),
        })
    }

    /// Cold-start primal vector: every state at `x0`, every input at
    /// `u_guess`, projected onto the bounds.
    pub fn initial_guess(&self, x0: &[Real], u_guess: &[Real]) -> NlpResult<DVector<Real>> {
        let (n_x, n_u) = (self.model.n_x(), self.model.n_u());
        check_len("initial state", n_x, x0.len())?;
        check_len("input guess", n_u, u_guess.len())?;
        let degree = self.degree();

        let mut z = DVector::zeros(self.n_vars);
        let mut fill = |offset: usize, values: &[Real]| {
            for (i, &v) in values.iter().enumerate() {
                z[offset + i] = v;
            }
        };
        for node in &self.nodes {
            for el in &node.elements {
                if let Some(start) = el.start {
                    fill(start, x0);
                }
                for j in 0..degree {
                    fill(el.colloc + j * n_x, x0);
                }
            }
            fill(node.state, x0);
            if let Some(input) = node.input {
                fill(input, u_guess);
            }
        }
        for i in 0..self.n_vars {
            z[i] = z[i].clamp(self.lower[i], self.upper[i]);
        }
        let root = &self.nodes[0];
        fill_slice(&mut z, root.state, x0);
        Ok(z)
    }

    /// Shift a previous solution one stage forward.
    ///
    /// Every node above the leaves takes the blocks of its successor (the
    /// child continuing its realization); leaves keep their own states and
    /// repeat their parent's input. Inputs of nodes whose successor is a leaf
    /// duplicate the last stage input.
    pub fn shift(&self, previous: &DVector<Real>) -> NlpResult<DVector<Real>> {
        check_len("warm start", self.n_vars, previous.len())?;
        let (n_x, n_u) = (self.model.n_x(), self.model.n_u());
        let n_nl = self.constraints.len();
        let degree = self.degree();
        let mut z = previous.clone();

        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(succ) = self.tree.successor(NodeId::from_index(idx)) else {
                continue;
            };
            let s = &self.nodes[succ.index()];
            if node.parent.is_some() {
                for (el, sel) in node.elements.iter().zip(&s.elements) {
                    if let (Some(dst), Some(src)) = (el.start, sel.start) {
                        copy_block(&mut z, previous, dst, src, n_x);
                    }
                    copy_block(&mut z, previous, el.colloc, sel.colloc, degree * n_x);
                }
                copy_block(&mut z, previous, node.state, s.state, n_x);
                if let (Some(dst), Some(src)) = (node.slack, s.slack) {
                    copy_block(&mut z, previous, dst, src, n_nl);
                }
            }
            let src_input = s.input.or(node.input);
            if let (Some(dst), Some(src)) = (node.input, src_input) {
                copy_block(&mut z, previous, dst, src, n_u);
            }
        }
        Ok(z)
    }

    pub fn node_state<'z>(&self, z: &'z DVector<Real>, node: usize) -> &'z [Real] {
        let off = self.nodes[node].state;
        &z.as_slice()[off..off + self.model.n_x()]
    }

    pub fn node_input<'z>(&self, z: &'z DVector<Real>, node: usize) -> Option<&'z [Real]> {
        let n_u = self.model.n_u();
        self.nodes[node]
            .input
            .map(|off| &z.as_slice()[off..off + n_u])
    }

    /// Input applied at the root.
    pub fn first_input(&self, z: &DVector<Real>) -> Vec<Real> {
        self.node_input(z, 0).map(<[Real]>::to_vec).unwrap_or_default()
    }

    fn degree(&self) -> usize {
        self.collocation.as_ref().map_or(0, Collocation::degree)
    }

    /// Weighted objective contribution of one node.
    fn node_cost(&self, idx: usize, z: &[Real], u_prev: &[Real]) -> Real {
        let node = &self.nodes[idx];
        let (n_x, n_u) = (self.model.n_x(), self.model.n_u());
        let id = NodeId::from_index(idx);
        let p = self.tree.realization(id);
        let x = &z[node.state..node.state + n_x];
        let parent_input = node
            .parent
            .and_then(|pi| self.nodes[pi].input)
            .map(|off| &z[off..off + n_u]);

        let mut cost = 0.0;
        if let Some(off) = node.input {
            let u = &z[off..off + n_u];
            if let Some(l) = &self.objective.lterm {
                cost += l.eval(&Point::new(x, u, p));
            }
            let reference = parent_input.unwrap_or(u_prev);
            cost += self
                .rterm
                .iter()
                .zip(u.iter().zip(reference))
                .map(|(w, (a, b))| w * (a - b) * (a - b))
                .sum::<Real>();
        }
        if node.depth == self.tree.n_horizon() {
            if let (Some(m), Some(u)) = (&self.objective.mterm, parent_input) {
                cost += m.eval(&Point::new(x, u, p));
            }
        }
        self.tree.node(id).weight * cost
    }

    /// Constraint rows of one non-root node.
    fn node_constraints(&self, idx: usize, z: &[Real], out: &mut [Real]) -> NlpResult<()> {
        let node = &self.nodes[idx];
        let Some(parent_idx) = node.parent else {
            return Ok(());
        };
        let parent = &self.nodes[parent_idx];
        let n_x = self.model.n_x();
        let n_u = self.model.n_u();
        let p = self.tree.realization(NodeId::from_index(idx));
        let u = match parent.input {
            Some(off) => &z[off..off + n_u],
            None => &[][..],
        };
        let x_parent = &z[parent.state..parent.state + n_x];
        let x_node = &z[node.state..node.state + n_x];

        let mut row = 0;
        match &self.collocation {
            Some(colloc) => {
                let d = colloc.degree();
                let h = self.t_step / colloc.finite_elements() as Real;
                let mut prev_end = x_parent.to_vec();
                for el in &node.elements {
                    let start = match el.start {
                        Some(off) => {
                            let s = &z[off..off + n_x];
                            for i in 0..n_x {
                                out[row + i] = s[i] - prev_end[i];
                            }
                            row += n_x;
                            s
                        }
                        None => x_parent,
                    };
                    let states = &z[el.colloc..el.colloc + d * n_x];
                    colloc.element_residuals(
                        start,
                        states,
                        h,
                        |xj| Ok(self.model.rhs(xj, u, p)?),
                        &mut out[row..row + d * n_x],
                    )?;
                    row += d * n_x;
                    prev_end = colloc.element_end(start, states);
                }
                for i in 0..n_x {
                    out[row + i] = x_node[i] - prev_end[i];
                }
                row += n_x;
            }
            None => {
                let next = self.model.rhs(x_parent, u, p)?;
                for i in 0..n_x {
                    out[row + i] = x_node[i] - next[i];
                }
                row += n_x;
            }
        }

        if let Some(off) = node.slack {
            let pt = Point::new(x_node, u, p);
            for (k, c) in self.constraints.iter().enumerate() {
                out[row + k] = c.expr.eval(&pt) - z[off + k];
            }
        }
        Ok(())
    }
}

/// One control step's NLP: the structure plus the measured state (fixed
/// through the root-state bounds) and the previously applied input.
pub struct NlpInstance<'a> {
    structure: &'a NlpStructure,
    lower: DVector<Real>,
    upper: DVector<Real>,
    u_prev: Vec<Real>,
}

impl NlpInstance<'_> {
    pub fn structure(&self) -> &NlpStructure {
        self.structure
    }

    fn check_primal(&self, z: &DVector<Real>) -> NlpResult<()> {
        check_len("primal vector", self.structure.n_vars, z.len())
    }
}

impl Nlp for NlpInstance<'_> {
    fn n_vars(&self) -> usize {
        self.structure.n_vars
    }

    fn n_cons(&self) -> usize {
        self.structure.n_cons
    }

    fn lower_bounds(&self) -> &DVector<f64> {
        &self.lower
    }

    fn upper_bounds(&self) -> &DVector<f64> {
        &self.upper
    }

    fn objective(&self, z: &DVector<f64>) -> SolverResult<f64> {
        self.check_primal(z)?;
        let s = self.structure;
        Ok((0..s.nodes.len())
            .map(|n| s.node_cost(n, z.as_slice(), &self.u_prev))
            .sum())
    }

    fn constraints(&self, z: &DVector<f64>) -> SolverResult<DVector<f64>> {
        self.check_primal(z)?;
        let s = self.structure;
        let mut out = DVector::zeros(s.n_cons);
        for (n, node) in s.nodes.iter().enumerate() {
            let rows = node.rows.clone();
            s.node_constraints(n, z.as_slice(), &mut out.as_mut_slice()[rows])?;
        }
        Ok(out)
    }

    fn gradient(&self, z: &DVector<f64>) -> SolverResult<DVector<f64>> {
        self.check_primal(z)?;
        let s = self.structure;
        let scratch = RefCell::new(z.clone());
        let mut grad = DVector::zeros(z.len());
        for (n, vars) in s.cost_vars.iter().enumerate() {
            let local = gather(z, vars);
            let g = central_difference_gradient(
                &local,
                |v| {
                    let mut w = scratch.borrow_mut();
                    scatter(&mut w, vars, v);
                    Ok(s.node_cost(n, w.as_slice(), &self.u_prev))
                },
                GRADIENT_EPS,
            )?;
            scatter(&mut scratch.borrow_mut(), vars, &local);
            for (a, &i) in vars.iter().enumerate() {
                grad[i] += g[a];
            }
        }
        Ok(grad)
    }

    fn hessian(&self, z: &DVector<f64>) -> SolverResult<DMatrix<f64>> {
        self.check_primal(z)?;
        let s = self.structure;
        let scratch = RefCell::new(z.clone());
        let mut hess = DMatrix::zeros(z.len(), z.len());
        for (n, vars) in s.cost_vars.iter().enumerate() {
            let local = gather(z, vars);
            let h = finite_difference_hessian(
                &local,
                |v| {
                    let mut w = scratch.borrow_mut();
                    scatter(&mut w, vars, v);
                    Ok(s.node_cost(n, w.as_slice(), &self.u_prev))
                },
                HESSIAN_EPS,
            )?;
            scatter(&mut scratch.borrow_mut(), vars, &local);
            for (a, &i) in vars.iter().enumerate() {
                for (b, &j) in vars.iter().enumerate() {
                    hess[(i, j)] += h[(a, b)];
                }
            }
        }
        Ok(hess)
    }

    fn jacobian(&self, z: &DVector<f64>) -> SolverResult<DMatrix<f64>> {
        self.check_primal(z)?;
        let s = self.structure;
        let scratch = RefCell::new(z.clone());
        let mut jac = DMatrix::zeros(s.n_cons, z.len());
        for (n, vars) in s.con_vars.iter().enumerate() {
            let rows = s.nodes[n].rows.clone();
            if rows.is_empty() {
                continue;
            }
            let local = gather(z, vars);
            let block = finite_difference_jacobian(
                &local,
                |v| {
                    let mut w = scratch.borrow_mut();
                    scatter(&mut w, vars, v);
                    let mut out = DVector::zeros(rows.len());
                    s.node_constraints(n, w.as_slice(), out.as_mut_slice())?;
                    Ok(out)
                },
                JACOBIAN_EPS,
            )?;
            scatter(&mut scratch.borrow_mut(), vars, &local);
            for (r, row) in rows.clone().enumerate() {
                for (a, &i) in vars.iter().enumerate() {
                    jac[(row, i)] = block[(r, a)];
                }
            }
        }
        Ok(jac)
    }
}

fn gather(z: &DVector<Real>, vars: &[usize]) -> DVector<Real> {
    DVector::from_iterator(vars.len(), vars.iter().map(|&i| z[i]))
}

fn scatter(z: &mut DVector<Real>, vars: &[usize], local: &DVector<Real>) {
    for (a, &i) in vars.iter().enumerate() {
        z[i] = local[a];
    }
}

fn copy_block(dst: &mut DVector<Real>, src: &DVector<Real>, to: usize, from: usize, len: usize) {
    for i in 0..len {
        dst[to + i] = src[from + i];
    }
}

fn fill_slice(z: &mut DVector<Real>, offset: usize, values: &[Real]) {
    for (i, &v) in values.iter().enumerate() {
        z[offset + i] = v;
    }
}

fn validate_bounds(b: &Bounds, name: &str) -> NlpResult<()> {
    b.validate(name).map_err(|e| NlpError::Configuration {
        what: e.to_string(),
    })
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> NlpResult<()> {
    if expected != actual {
        return Err(NlpError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
