use sim_ecs::{Component, EntityComponentManager, LinearVelocity, Pose};

use crate::builtin::VELOCITY_INTEGRATOR;
use crate::system::{System, UpdateInfo};

/// Moves every entity with a `pose` and a `linear_velocity` by `velocity * dt`.
#[derive(Debug, Default)]
pub struct VelocityIntegrator;

impl System for VelocityIntegrator {
    fn name(&self) -> &str {
        VELOCITY_INTEGRATOR
    }

    fn update(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) {
        let dt = info.dt_secs();
        if dt == 0.0 {
            return;
        }
        for entity in ecm.entities_with(&[Pose::NAME, LinearVelocity::NAME]) {
            let (pose, velocity) = match (ecm.get::<Pose>(entity), ecm.get::<LinearVelocity>(entity)) {
                (Ok(Some(p)), Ok(Some(v))) => (p, v),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(%entity, error = %e, "skipping entity with malformed motion components");
                    continue;
                }
                _ => continue,
            };
            let moved = pose.translated(velocity.0 * dt);
            if let Err(e) = ecm.set(entity, &moved) {
                tracing::warn!(%entity, error = %e, "failed to write pose");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_integrates_pose() {
        let mut ecm = EntityComponentManager::new();
        let ball = ecm.create_entity("ball", None).unwrap();
        let wall = ecm.create_entity("wall", None).unwrap();
        ecm.set(ball, &Pose::IDENTITY).unwrap();
        ecm.set(ball, &LinearVelocity(Vec3::new(2.0, 0.0, 0.0))).unwrap();
        ecm.set(wall, &Pose::IDENTITY).unwrap();

        let info = UpdateInfo {
            dt: Duration::from_millis(500),
            ..UpdateInfo::default()
        };
        let mut system = VelocityIntegrator;
        system.update(&info, &mut ecm);
        system.update(&info, &mut ecm);

        let pose: Pose = ecm.get(ball).unwrap().unwrap();
        assert!((pose.position.x - 2.0).abs() < 1e-6);
        assert_eq!(ecm.get::<Pose>(wall).unwrap(), Some(Pose::IDENTITY));
    }

    #[test]
    fn test_malformed_components_are_skipped() {
        let mut ecm = EntityComponentManager::new();
        let e = ecm.create_entity("bad", None).unwrap();
        ecm.set_component(e, "pose", json!("nope")).unwrap();
        ecm.set(e, &LinearVelocity(Vec3::X)).unwrap();
        let info = UpdateInfo {
            dt: Duration::from_millis(1),
            ..UpdateInfo::default()
        };
        VelocityIntegrator.update(&info, &mut ecm);
        assert_eq!(ecm.component(e, "pose"), Some(&json!("nope")));
    }
}
