//! Ownership and lookup of the controller population.

use std::collections::BTreeMap;

use cosim_controls::Controller;
use cosim_core::{ControllerId, ElementId, Id};
use tracing::debug;

use crate::error::{SimError, SimResult};

/// Highest number of priority passes a controller may take part in.
pub const MAX_PRIORITY_COUNT: usize = 3;

/// Controllers in registration order, indexed by the element they drive.
///
/// Registration order is the update order inside a priority class.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: Vec<Box<dyn Controller>>,
    by_element: BTreeMap<ElementId, Vec<ControllerId>>,
}

impl std::fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.controllers.iter().map(|c| c.name()))
            .finish()
    }
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a controller.
    ///
    /// Names must be unique; an element may carry several controllers.
    pub fn add(&mut self, controller: Box<dyn Controller>) -> SimResult<ControllerId> {
        let name = controller.name();
        if self.controllers.iter().any(|c| c.name() == name) {
            return Err(SimError::DuplicateController {
                name: name.to_string(),
            });
        }
        let count = controller.priority_count();
        if count == 0 || count > MAX_PRIORITY_COUNT {
            return Err(SimError::InvalidPriorityCount {
                name: name.to_string(),
                count,
                max: MAX_PRIORITY_COUNT,
            });
        }
        let id = Id::from_index(self.controllers.len() as u32);
        debug!(controller = name, priorities = count, "controller registered");
        self.by_element
            .entry(controller.controlled_element().clone())
            .or_default()
            .push(id);
        self.controllers.push(controller);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn get(&self, id: ControllerId) -> Option<&dyn Controller> {
        self.controllers.get(id.slot()).map(|c| c.as_ref())
    }

    pub fn get_mut(&mut self, id: ControllerId) -> Option<&mut (dyn Controller + 'static)> {
        self.controllers.get_mut(id.slot()).map(|c| c.as_mut())
    }

    /// Controllers bound to `element`, in registration order.
    pub fn for_element<'a>(
        &'a self,
        element: &ElementId,
    ) -> impl Iterator<Item = &'a dyn Controller> + 'a {
        self.by_element
            .get(element)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(*id))
    }

    /// Find a controller by its name.
    pub fn find(&self, name: &str) -> Option<ControllerId> {
        self.controllers
            .iter()
            .position(|c| c.name() == name)
            .map(|i| Id::from_index(i as u32))
    }

    /// Number of priority classes present (`0..classes`).
    pub fn priority_classes(&self) -> usize {
        self.controllers
            .iter()
            .map(|c| c.priority_count())
            .max()
            .unwrap_or(0)
    }

    /// Controllers taking part in pass `priority`, in registration order.
    pub fn at_priority_mut(
        &mut self,
        priority: usize,
    ) -> impl Iterator<Item = &mut Box<dyn Controller>> {
        self.controllers
            .iter_mut()
            .filter(move |c| c.priority_count() > priority)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Controller> {
        self.controllers.iter().map(|c| c.as_ref())
    }

    /// Elements with at least one controller, sorted.
    pub fn elements(&self) -> impl Iterator<Item = &ElementId> {
        self.by_element.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_circuit::PowerFlowSolver;
    use cosim_controls::ControlResult;

    struct Probe {
        name: String,
        element: ElementId,
        priorities: usize,
    }

    impl Probe {
        fn boxed(name: &str, element: &str, priorities: usize) -> Box<dyn Controller> {
            Box::new(Self {
                name: name.to_string(),
                element: element.parse().unwrap(),
                priorities,
            })
        }
    }

    impl Controller for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn controlled_element(&self) -> &ElementId {
            &self.element
        }

        fn priority_count(&self) -> usize {
            self.priorities
        }

        fn update(
            &mut self,
            _solver: &mut dyn PowerFlowSolver,
            _priority: usize,
            _time: f64,
            _update_results: bool,
        ) -> ControlResult<f64> {
            Ok(0.0)
        }
    }

    #[test]
    fn lookup_by_element_and_name() {
        let mut reg = ControllerRegistry::new();
        let a = reg.add(Probe::boxed("a", "PVSystem.pv1", 1)).unwrap();
        reg.add(Probe::boxed("b", "Load.l1", 1)).unwrap();
        let c = reg.add(Probe::boxed("c", "PVSystem.pv1", 2)).unwrap();

        let on_pv: Vec<&str> = reg
            .for_element(&"pvsystem.PV1".parse().unwrap())
            .map(|c| c.name())
            .collect();
        assert_eq!(on_pv, vec!["a", "c"]);
        assert_eq!(reg.find("a"), Some(a));
        assert_eq!(reg.find("c"), Some(c));
        assert!(reg.find("zzz").is_none());
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.elements().count(), 2);
    }

    #[test]
    fn priority_classes_follow_the_widest_controller() {
        let mut reg = ControllerRegistry::new();
        assert_eq!(reg.priority_classes(), 0);
        reg.add(Probe::boxed("a", "Load.a", 1)).unwrap();
        reg.add(Probe::boxed("b", "Load.b", 3)).unwrap();
        reg.add(Probe::boxed("c", "Load.c", 2)).unwrap();
        assert_eq!(reg.priority_classes(), 3);

        let names = |reg: &mut ControllerRegistry, p| {
            reg.at_priority_mut(p)
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&mut reg, 0), vec!["a", "b", "c"]);
        assert_eq!(names(&mut reg, 1), vec!["b", "c"]);
        assert_eq!(names(&mut reg, 2), vec!["b"]);
    }

    #[test]
    fn rejects_duplicates_and_bad_priority_counts() {
        let mut reg = ControllerRegistry::new();
        reg.add(Probe::boxed("a", "Load.a", 1)).unwrap();
        assert!(matches!(
            reg.add(Probe::boxed("a", "Load.b", 1)),
            Err(SimError::DuplicateController { .. })
        ));
        assert!(matches!(
            reg.add(Probe::boxed("z", "Load.z", 0)),
            Err(SimError::InvalidPriorityCount { count: 0, .. })
        ));
        assert!(matches!(
            reg.add(Probe::boxed("y", "Load.y", 4)),
            Err(SimError::InvalidPriorityCount { count: 4, .. })
        ));
        assert_eq!(reg.len(), 1);
    }
}
