//! Parameter realization the simulated plant follows over time.

use crate::config::RunConfig;
use rmpc_core::Real;

/// Piecewise-constant parameter schedule in model parameter order.
#[derive(Clone, Debug, PartialEq)]
pub struct PlantSchedule {
    nominal: Vec<Real>,
    /// `(from_time, values)`, increasing in time.
    segments: Vec<(Real, Vec<Real>)>,
}

impl PlantSchedule {
    /// Resolve a validated config: nominal is the first realization of each
    /// parameter, every segment overrides the parameters it names.
    pub fn from_config(config: &RunConfig) -> Self {
        let names = config.model.parameter_names();
        let nominal: Vec<Real> = names
            .iter()
            .map(|name| {
                config
                    .uncertainty_for(name)
                    .and_then(|u| u.values.first().copied())
                    .unwrap_or(Real::NAN)
            })
            .collect();
        let segments = config
            .plant
            .iter()
            .map(|seg| {
                let values = names
                    .iter()
                    .zip(&nominal)
                    .map(|(name, nom)| seg.values.get(*name).copied().unwrap_or(*nom))
                    .collect();
                (seg.from_time, values)
            })
            .collect();
        Self { nominal, segments }
    }

    pub fn nominal(&self) -> &[Real] {
        &self.nominal
    }

    /// Values in force at time `t`.
    pub fn values_at(&self, t: Real) -> Vec<Real> {
        self.segments
            .iter()
            .rev()
            .find(|(from, _)| *from <= t)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.nominal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlantSegment;
    use crate::demos::DemoModel;
    use std::collections::BTreeMap;

    #[test]
    fn schedule_switches_at_segment_starts() {
        let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
        config.plant = vec![
            PlantSegment {
                from_time: 1.0,
                values: BTreeMap::from([("stiffness".to_string(), 1.2)]),
            },
            PlantSegment {
                from_time: 3.0,
                values: BTreeMap::from([
                    ("stiffness".to_string(), 0.8),
                    ("damping".to_string(), 0.7),
                ]),
            },
        ];
        let schedule = PlantSchedule::from_config(&config);
        assert_eq!(schedule.nominal(), &[1.0, 0.5]);
        assert_eq!(schedule.values_at(0.0), vec![1.0, 0.5]);
        assert_eq!(schedule.values_at(1.0), vec![1.2, 0.5]);
        assert_eq!(schedule.values_at(2.9), vec![1.2, 0.5]);
        assert_eq!(schedule.values_at(10.0), vec![0.8, 0.7]);
    }

    #[test]
    fn parameter_free_plant() {
        let schedule = PlantSchedule::from_config(&RunConfig::demo(DemoModel::Integrator));
        assert!(schedule.values_at(5.0).is_empty());
    }
}
