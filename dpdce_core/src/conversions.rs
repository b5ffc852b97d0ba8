//! Mapping from the TOML config to engine parameters.
use crate::engine::EngineParams;
use crate::schedule::LinearSchedule;

impl From<&dpdce_config::Config> for EngineParams {
    fn from(c: &dpdce_config::Config) -> Self {
        Self {
            plot_directory: c.paths.plot_directory.clone(),
            median_to_peak: c.engine.median_to_peak,
            max_capture_rounds: c.engine.max_capture_rounds,
            progress_step: c.engine.progress_step,
        }
    }
}

impl From<&dpdce_config::ScheduleCfg> for LinearSchedule {
    fn from(c: &dpdce_config::ScheduleCfg) -> Self {
        LinearSchedule::new(*c)
    }
}
