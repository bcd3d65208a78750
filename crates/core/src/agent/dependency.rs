//! Checks applied to a component before the pipeline uses it.

use semver::{Version, VersionReq};

use crate::agent::error::AgentError;

/// Fail unless `version` satisfies the constraint `requirement`.
pub fn check_version(component: &str, version: &str, requirement: &str) -> Result<(), AgentError> {
    let req = VersionReq::parse(requirement).map_err(|e| AgentError::InvalidVersion {
        component: component.to_string(),
        value: requirement.to_string(),
        reason: e.to_string(),
    })?;
    let actual = Version::parse(version).map_err(|e| AgentError::InvalidVersion {
        component: component.to_string(),
        value: version.to_string(),
        reason: e.to_string(),
    })?;

    if req.matches(&actual) {
        Ok(())
    } else {
        Err(AgentError::UnmetDependency {
            component: component.to_string(),
            version: version.to_string(),
            requirement: requirement.to_string(),
        })
    }
}
