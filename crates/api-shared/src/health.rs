use crate::dto::HealthRes;

/// Health check shared by the REST server and the CLI's `health` command.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Clinic API is alive".into(),
        }
    }
}
