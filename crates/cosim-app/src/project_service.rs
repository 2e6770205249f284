//! Project loading, saving, validation, and introspection.

use std::path::Path;

use cosim_project::{ControllerDef, Project};

use crate::error::{AppError, AppResult};

/// Summary of a controller attachment for listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSummary {
    pub element: String,
    pub kind: String,
    pub setting_count: usize,
}

/// Load a scenario file, picking the format from its extension.
pub fn load_project(path: &Path) -> AppResult<Project> {
    if !path.exists() {
        return Err(AppError::ProjectFileRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    Ok(cosim_project::load(path)?)
}

/// Save a scenario file, picking the format from its extension.
pub fn save_project(path: &Path, project: &Project) -> AppResult<()> {
    Ok(cosim_project::save(path, project)?)
}

/// Structural validation, plus a check that every controller type is known
/// to `known_tags`.
pub fn validate_project<'a>(
    project: &Project,
    known_tags: impl IntoIterator<Item = &'a str>,
) -> AppResult<()> {
    cosim_project::validate_project(project)?;
    let known: Vec<&str> = known_tags.into_iter().collect();
    for controller in &project.controllers {
        if !known.contains(&controller.kind.as_str()) {
            return Err(AppError::Controller {
                element: controller.element.clone(),
                message: format!("Unknown controller type '{}'", controller.kind),
            });
        }
    }
    Ok(())
}

pub fn list_controllers(project: &Project) -> Vec<ControllerSummary> {
    project
        .controllers
        .iter()
        .map(|ControllerDef { element, kind, settings }| ControllerSummary {
            element: element.clone(),
            kind: kind.clone(),
            setting_count: settings.len(),
        })
        .collect()
}
