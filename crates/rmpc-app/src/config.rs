//! Run configuration file format and validation.
//!
//! A run file names a demo plant, the controller and solver settings, the
//! uncertainty set the controller plans against, and the realization
//! schedule the simulated plant actually follows.

use crate::demos::DemoModel;
use crate::error::{AppError, AppResult};
use rmpc_control::MpcSettings;
use rmpc_core::Real;
use rmpc_sim::SimulatorSettings;
use rmpc_solver::AugLagConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Realizations of one uncertain parameter, nominal first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyDef {
    pub name: String,
    pub values: Vec<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<Real>>,
}

/// Plant parameter values in force from `from_time` on. Parameters not
/// listed keep their nominal value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantSegment {
    pub from_time: Real,
    pub values: BTreeMap<String, Real>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub model: DemoModel,
    #[serde(default)]
    pub controller: MpcSettings,
    #[serde(default)]
    pub solver: AugLagConfig,
    #[serde(default)]
    pub uncertainty: Vec<UncertaintyDef>,
    pub initial_state: Vec<Real>,
    #[serde(default)]
    pub simulator: SimulatorSettings,
    #[serde(default)]
    pub plant: Vec<PlantSegment>,
    pub n_steps: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Store the full scenario solution with every log entry.
    #[serde(default)]
    pub record_snapshots: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

impl RunConfig {
    /// Runnable config for a demo plant with its suggested realizations,
    /// the plant held at nominal and everything else at defaults.
    pub fn demo(model: DemoModel) -> Self {
        let uncertainty = model
            .default_realizations()
            .into_iter()
            .map(|(name, values)| UncertaintyDef {
                name: name.to_string(),
                values,
                probabilities: None,
            })
            .collect();
        let (initial_state, controller) = match model {
            DemoModel::Integrator => (
                vec![0.0],
                MpcSettings {
                    n_horizon: 5,
                    n_robust: 0,
                    ..MpcSettings::default()
                },
            ),
            DemoModel::MassSpringDamper => (
                vec![1.0, 0.0],
                MpcSettings {
                    n_horizon: 8,
                    n_robust: 1,
                    t_step: 0.5,
                    ..MpcSettings::default()
                },
            ),
        };
        let simulator = SimulatorSettings {
            t_step: controller.t_step,
            ..SimulatorSettings::default()
        };
        Self {
            name: model.label().to_string(),
            model,
            controller,
            solver: AugLagConfig::default(),
            uncertainty,
            initial_state,
            simulator,
            plant: Vec::new(),
            n_steps: 10,
            output_dir: default_output_dir(),
            record_snapshots: false,
        }
    }

    /// Realizations of `name`, if listed.
    pub fn uncertainty_for(&self, name: &str) -> Option<&UncertaintyDef> {
        self.uncertainty.iter().find(|u| u.name == name)
    }
}

pub fn load_yaml(path: &Path) -> AppResult<RunConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RunConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn save_yaml(path: &Path, config: &RunConfig) -> AppResult<()> {
    validate_config(config)?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content).map_err(|source| AppError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn validate_config(config: &RunConfig) -> Result<(), ValidationError> {
    if config.name.trim().is_empty() {
        return Err(invalid("name", "", "must not be empty"));
    }
    if config.n_steps == 0 {
        return Err(invalid("n_steps", 0, "must be positive"));
    }

    validate_controller(&config.controller)?;
    validate_solver(&config.solver)?;

    config
        .simulator
        .validate()
        .map_err(|e| invalid("simulator", "", &e.to_string()))?;
    if config.simulator.t_step != config.controller.t_step {
        return Err(invalid(
            "simulator.t_step",
            config.simulator.t_step,
            "must equal controller.t_step",
        ));
    }

    let states = config.model.state_names();
    if config.initial_state.len() != states.len() {
        return Err(invalid(
            "initial_state",
            format!("{:?}", config.initial_state),
            &format!("expected {} entries ({})", states.len(), states.join(", ")),
        ));
    }
    if config.initial_state.iter().any(|v| !v.is_finite()) {
        return Err(invalid(
            "initial_state",
            format!("{:?}", config.initial_state),
            "entries must be finite",
        ));
    }

    let params = config.model.parameter_names();
    validate_uncertainty(&config.uncertainty, params)?;
    validate_plant(&config.plant, params)?;
    Ok(())
}

fn validate_controller(s: &MpcSettings) -> Result<(), ValidationError> {
    if s.n_horizon == 0 {
        return Err(invalid("controller.n_horizon", 0, "must be positive"));
    }
    if s.n_robust > s.n_horizon {
        return Err(invalid(
            "controller.n_robust",
            s.n_robust,
            "must not exceed n_horizon",
        ));
    }
    if !(s.t_step.is_finite() && s.t_step > 0.0) {
        return Err(invalid("controller.t_step", s.t_step, "must be positive"));
    }
    s.collocation
        .validate()
        .map_err(|e| invalid("controller.collocation", "", &e.to_string()))?;
    Ok(())
}

fn validate_solver(s: &AugLagConfig) -> Result<(), ValidationError> {
    if s.max_outer_iterations == 0 || s.max_inner_iterations == 0 {
        return Err(invalid("solver", "", "iteration limits must be positive"));
    }
    if !(s.optimality_tol > 0.0 && s.constraint_tol > 0.0) {
        return Err(invalid("solver", "", "tolerances must be positive"));
    }
    if !(s.initial_penalty > 0.0 && s.penalty_growth > 1.0 && s.max_penalty >= s.initial_penalty)
    {
        return Err(invalid(
            "solver.initial_penalty",
            s.initial_penalty,
            "penalty schedule must start positive and grow",
        ));
    }
    if let Some(t) = s.max_wall_time_s {
        if !(t.is_finite() && t > 0.0) {
            return Err(invalid(
                "solver.max_wall_time_s",
                t,
                "wall-clock budget must be positive and finite",
            ));
        }
    }
    Ok(())
}

fn validate_uncertainty(defs: &[UncertaintyDef], params: &[&str]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for def in defs {
        if !seen.insert(def.name.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: def.name.clone(),
                context: "uncertainty".to_string(),
            });
        }
        if !params.contains(&def.name.as_str()) {
            return Err(ValidationError::MissingReference {
                id: def.name.clone(),
                context: "uncertainty (not a model parameter)".to_string(),
            });
        }
        let field = format!("uncertainty.{}", def.name);
        if def.values.is_empty() {
            return Err(invalid(&field, "[]", "needs at least one realization"));
        }
        if def.values.iter().any(|v| !v.is_finite()) {
            return Err(invalid(
                &field,
                format!("{:?}", def.values),
                "realizations must be finite",
            ));
        }
        if let Some(probs) = &def.probabilities {
            if probs.len() != def.values.len() {
                return Err(invalid(
                    &format!("{field}.probabilities"),
                    format!("{probs:?}"),
                    "needs one probability per realization",
                ));
            }
        }
    }
    for name in params {
        if !seen.contains(name) {
            return Err(ValidationError::MissingReference {
                id: name.to_string(),
                context: "uncertainty (model parameter without realizations)".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_plant(segments: &[PlantSegment], params: &[&str]) -> Result<(), ValidationError> {
    let mut last: Option<Real> = None;
    for seg in segments {
        if !(seg.from_time.is_finite() && seg.from_time >= 0.0) {
            return Err(invalid(
                "plant.from_time",
                seg.from_time,
                "must be finite and non-negative",
            ));
        }
        if last.is_some_and(|t| seg.from_time <= t) {
            return Err(invalid(
                "plant.from_time",
                seg.from_time,
                "segments must be strictly increasing in time",
            ));
        }
        last = Some(seg.from_time);
        for (name, value) in &seg.values {
            if !params.contains(&name.as_str()) {
                return Err(ValidationError::MissingReference {
                    id: name.clone(),
                    context: "plant (not a model parameter)".to_string(),
                });
            }
            if !value.is_finite() {
                return Err(invalid(&format!("plant.{name}"), value, "must be finite"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_configs_are_valid() {
        validate_config(&RunConfig::demo(DemoModel::Integrator)).unwrap();
        validate_config(&RunConfig::demo(DemoModel::MassSpringDamper)).unwrap();
    }

    #[test]
    fn yaml_roundtrip_with_defaults() {
        let yaml = r#"
name: msd
model: mass_spring_damper
controller:
  n_horizon: 6
  n_robust: 1
  t_step: 0.5
simulator:
  t_step: 0.5
  integrator: rk4
uncertainty:
  - name: stiffness
    values: [1.0, 0.8, 1.2]
  - name: damping
    values: [0.5, 0.3]
    probabilities: [0.75, 0.25]
plant:
  - from_time: 2.0
    values:
      stiffness: 1.2
initial_state: [1.0, 0.0]
n_steps: 4
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.controller.collocation.degree, 2);
        assert_eq!(config.output_dir, PathBuf::from("runs"));
        assert_eq!(
            config.uncertainty_for("damping").unwrap().probabilities,
            Some(vec![0.75, 0.25])
        );

        let text = serde_yaml::to_string(&config).unwrap();
        let back: RunConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_parameter_realizations_rejected() {
        let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
        config.uncertainty.retain(|u| u.name != "damping");
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::MissingReference {
                id: "damping".to_string(),
                context: "uncertainty (model parameter without realizations)".to_string(),
            })
        );
    }

    #[test]
    fn unknown_and_duplicate_parameters_rejected() {
        let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
        config.uncertainty.push(UncertaintyDef {
            name: "mass".to_string(),
            values: vec![1.0],
            probabilities: None,
        });
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::MissingReference { .. })
        ));

        let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
        let dup = config.uncertainty[0].clone();
        config.uncertainty.push(dup);
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::DuplicateId { .. })
        ));
    }

    #[test]
    fn mismatched_sampling_periods_rejected() {
        let mut config = RunConfig::demo(DemoModel::Integrator);
        config.simulator.t_step = 0.25;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidValue { field, .. }) if field == "simulator.t_step"
        ));
    }

    #[test]
    fn bad_initial_state_and_schedule_rejected() {
        let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
        config.initial_state = vec![1.0];
        assert!(validate_config(&config).is_err());

        let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
        config.plant = vec![
            PlantSegment {
                from_time: 1.0,
                values: BTreeMap::from([("stiffness".to_string(), 0.9)]),
            },
            PlantSegment {
                from_time: 1.0,
                values: BTreeMap::new(),
            },
        ];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn degree_zero_collocation_rejected() {
        let mut config = RunConfig::demo(DemoModel::Integrator);
        config.controller.collocation.degree = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidValue { field, .. }) if field == "controller.collocation"
        ));
    }

    #[test]
    fn wall_time_budget_in_seconds() {
        let mut config = RunConfig::demo(DemoModel::Integrator);
        config.solver.max_wall_time_s = Some(2.5);
        validate_config(&config).unwrap();
        let text = serde_yaml::to_string(&config).unwrap();
        assert!(text.contains("max_wall_time_s: 2.5"));
        let back: RunConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.solver.max_wall_time_s, Some(2.5));

        for bad in [0.0, -1.0, f64::INFINITY, f64::NAN] {
            let mut config = RunConfig::demo(DemoModel::Integrator);
            config.solver.max_wall_time_s = Some(bad);
            assert!(matches!(
                validate_config(&config),
                Err(ValidationError::InvalidValue { field, .. }) if field == "solver.max_wall_time_s"
            ));
        }
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("rmpc_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run.yaml");
        let config = RunConfig::demo(DemoModel::MassSpringDamper);
        save_yaml(&path, &config).unwrap();
        assert_eq!(load_yaml(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).ok();
    }
}
