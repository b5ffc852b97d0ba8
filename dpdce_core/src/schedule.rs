//! Default annealing schedule for capture targets and learning rates.
use dpdce_config::ScheduleCfg;
use dpdce_traits::Heuristics;

/// Early runs train on few measurements with a large step; later runs use
/// more measurements and a smaller step. Both saturate at `run_max`.
#[derive(Debug, Clone, Copy)]
pub struct LinearSchedule {
    cfg: ScheduleCfg,
}

impl LinearSchedule {
    pub fn new(cfg: ScheduleCfg) -> Self {
        Self { cfg }
    }

    #[inline]
    fn ratio(&self, run: u32) -> f64 {
        let max = self.cfg.run_max.max(1);
        f64::from(run.min(max)) / f64::from(max)
    }
}

impl Default for LinearSchedule {
    fn default() -> Self {
        Self::new(ScheduleCfg::default())
    }
}

impl Heuristics for LinearSchedule {
    fn get_n_meas(&self, run: u32) -> usize {
        let span = self.cfg.n_meas_max.saturating_sub(self.cfg.n_meas_min) as f64;
        self.cfg.n_meas_min + (self.ratio(run) * span).round() as usize
    }

    fn get_learning_rate(&self, run: u32) -> f64 {
        let span = self.cfg.lr_max - self.cfg.lr_min;
        self.cfg.lr_max - self.ratio(run) * span
    }
}
