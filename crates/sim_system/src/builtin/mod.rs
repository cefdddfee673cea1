//! Systems available to every world by name.

mod log_record;
mod model_state;
mod velocity_integrator;

pub use log_record::LogRecord;
pub use model_state::ModelState;
pub use velocity_integrator::VelocityIntegrator;

use crate::registry::SystemRegistry;

pub const LOG_RECORD: &str = "log_record";
pub const MODEL_STATE: &str = "model_state";
pub const VELOCITY_INTEGRATOR: &str = "velocity_integrator";

pub(crate) fn register_all(registry: &mut SystemRegistry) {
    registry.register(LOG_RECORD, || Box::new(LogRecord::default()));
    registry.register(MODEL_STATE, || Box::new(ModelState::default()));
    registry.register(VELOCITY_INTEGRATOR, || Box::new(VelocityIntegrator));
}
