//! Type-tag dispatch for controller construction.

use std::collections::BTreeMap;
use std::fmt;

use cosim_circuit::PowerFlowSolver;
use cosim_core::ElementId;
use tracing::debug;

use crate::controller::Controller;
use crate::error::{ControlError, ControlResult};
use crate::settings::SettingsRecord;
use crate::{fault, motor_stall, ride_through, storage, volt_var};

/// Builds a controller bound to `element` from its settings record.
pub type ControllerConstructor = fn(
    ElementId,
    &SettingsRecord,
    &mut dyn PowerFlowSolver,
) -> ControlResult<Box<dyn Controller>>;

/// Registry of constructors keyed by controller type tag.
#[derive(Clone)]
pub struct ControllerFactory {
    constructors: BTreeMap<String, ControllerConstructor>,
}

impl fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl Default for ControllerFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ControllerFactory {
    /// Factory with no constructors.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Factory knowing every controller shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut factory = Self::empty();
        factory.register(storage::TAG, storage::StorageController::from_record);
        factory.register(motor_stall::TAG, motor_stall::MotorStallController::from_record);
        factory.register(
            ride_through::TAG,
            ride_through::RideThroughController::from_record,
        );
        factory.register(volt_var::TAG, volt_var::VoltVarController::from_record);
        factory.register(fault::TAG, fault::FaultController::from_record);
        factory
    }

    /// Add or replace the constructor for `tag`.
    pub fn register(&mut self, tag: &str, constructor: ControllerConstructor) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build a controller. Fails before the run on unknown tags, missing
    /// elements and invalid settings.
    pub fn create(
        &self,
        element: ElementId,
        tag: &str,
        settings: &SettingsRecord,
        solver: &mut dyn PowerFlowSolver,
    ) -> ControlResult<Box<dyn Controller>> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| ControlError::UnknownType {
                tag: tag.to_string(),
            })?;
        let controller = constructor(element, settings, solver)?;
        debug!(controller = controller.name(), "controller created");
        Ok(controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags_are_registered() {
        let f = ControllerFactory::with_builtin();
        let tags: Vec<&str> = f.tags().collect();
        assert_eq!(
            tags,
            vec![
                "FaultController",
                "MotorStall",
                "PvController",
                "PvVoltageRideThru",
                "StorageController"
            ]
        );
        assert!(!ControllerFactory::empty().contains("MotorStall"));
    }
}
