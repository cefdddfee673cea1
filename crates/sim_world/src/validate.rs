//! Structural validation of a loaded description.

use crate::description::{EntityDescription, PluginDescription, WorldDescription, WorldSpec};
use crate::error::DescriptionError;
use std::collections::HashSet;
use std::time::Duration;

/// Check every world, returning all problems in document order.
#[must_use]
pub fn validate(desc: &WorldDescription) -> Vec<DescriptionError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, world) in desc.worlds.iter().enumerate() {
        if world.name.is_empty() {
            errors.push(DescriptionError::MissingWorldName { index });
        } else if !seen.insert(world.name.as_str()) {
            errors.push(DescriptionError::DuplicateWorld(world.name.clone()));
        }
        validate_world(world, &mut errors);
    }

    errors
}

fn validate_world(world: &WorldSpec, errors: &mut Vec<DescriptionError>) {
    let physics = &world.physics;
    let step = physics.max_step_size;
    let rtf = physics.real_time_factor;
    let step_ok = step.is_finite() && step > 0.0;
    if !step_ok {
        errors.push(DescriptionError::InvalidPhysics {
            world: world.name.clone(),
            message: format!("max_step_size must be positive, got {step}"),
        });
    } else if Duration::try_from_secs_f64(step).is_err() {
        errors.push(DescriptionError::InvalidPhysics {
            world: world.name.clone(),
            message: format!("max_step_size {step} is too large"),
        });
    }
    if !rtf.is_finite() || rtf < 0.0 {
        errors.push(DescriptionError::InvalidPhysics {
            world: world.name.clone(),
            message: format!("real_time_factor must be zero or positive, got {rtf}"),
        });
    } else if step_ok && rtf > 0.0 && Duration::try_from_secs_f64(step / rtf).is_err() {
        errors.push(DescriptionError::InvalidPhysics {
            world: world.name.clone(),
            message: format!("real_time_factor {rtf} is too small for max_step_size {step}"),
        });
    }

    validate_plugins(&world.name, &world.plugins, errors);
    validate_siblings(&world.name, &world.name, &world.entities, errors);
}

fn validate_siblings(
    world: &str,
    parent: &str,
    entities: &[EntityDescription],
    errors: &mut Vec<DescriptionError>,
) {
    let mut names = HashSet::new();
    for entity in entities {
        if entity.name.is_empty() {
            errors.push(DescriptionError::MissingEntityName {
                world: world.to_string(),
            });
        } else if !names.insert(entity.name.as_str()) {
            errors.push(DescriptionError::DuplicateEntity {
                parent: parent.to_string(),
                name: entity.name.clone(),
            });
        }
        validate_plugins(&entity.name, &entity.plugins, errors);
        validate_siblings(world, &entity.name, &entity.children, errors);
    }
}

fn validate_plugins(owner: &str, plugins: &[PluginDescription], errors: &mut Vec<DescriptionError>) {
    for plugin in plugins {
        if plugin.name.trim().is_empty() {
            errors.push(DescriptionError::MissingPluginName {
                owner: owner.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::PhysicsDescription;

    #[test]
    fn test_valid_description() {
        let desc = WorldDescription {
            worlds: vec![
                WorldSpec::new("a").with_entity(EntityDescription::new("box")),
                WorldSpec::new("b").with_entity(EntityDescription::new("box")),
            ],
        };
        assert!(validate(&desc).is_empty());
    }

    #[test]
    fn test_errors_are_reported_in_order() {
        let desc = WorldDescription {
            worlds: vec![
                WorldSpec::new(""),
                WorldSpec::new("dup"),
                WorldSpec::new("dup")
                    .with_entity(EntityDescription::new("x"))
                    .with_entity(EntityDescription::new("x"))
                    .with_plugin(PluginDescription::new(" ")),
            ],
        };
        let errors = validate(&desc);
        assert_eq!(
            errors,
            vec![
                DescriptionError::MissingWorldName { index: 0 },
                DescriptionError::DuplicateWorld("dup".into()),
                DescriptionError::MissingPluginName { owner: "dup".into() },
                DescriptionError::DuplicateEntity {
                    parent: "dup".into(),
                    name: "x".into()
                },
            ]
        );
    }

    #[test]
    fn test_same_name_under_different_parents() {
        let world = WorldSpec::new("w")
            .with_entity(EntityDescription::new("a").with_child(EntityDescription::new("link")))
            .with_entity(EntityDescription::new("b").with_child(EntityDescription::new("link")));
        assert!(validate(&WorldDescription { worlds: vec![world] }).is_empty());
    }

    #[test]
    fn test_invalid_physics() {
        let world = WorldSpec::new("w").with_physics(PhysicsDescription {
            max_step_size: 0.0,
            real_time_factor: -1.0,
        });
        let errors = validate(&WorldDescription { worlds: vec![world] });
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], DescriptionError::InvalidPhysics { .. }));
    }

    #[test]
    fn test_physics_that_overflows_a_duration() {
        let physics = |max_step_size, real_time_factor| {
            let world = WorldSpec::new("w").with_physics(PhysicsDescription {
                max_step_size,
                real_time_factor,
            });
            validate(&WorldDescription { worlds: vec![world] })
        };
        assert_eq!(physics(1e300, 1.0).len(), 2);
        assert_eq!(physics(0.001, 1e-300).len(), 1);
        assert_eq!(physics(f64::NAN, 1.0).len(), 1);
        assert!(physics(0.001, 0.0).is_empty());
        assert!(physics(3600.0, 0.5).is_empty());
    }
}
