use std::f64::consts::PI;

use burn::lr_scheduler::LrScheduler;
use burn::tensor::backend::Backend;
use burn::LearningRate;

const DEFAULT_PCT_START: f64 = 0.3;
const DEFAULT_DIV_FACTOR: f64 = 25.0;
const DEFAULT_FINAL_DIV_FACTOR: f64 = 1e4;

/// One-cycle learning-rate policy with cosine annealing.
///
/// Warms up from `max_lr / div_factor` to `max_lr` over the first `pct_start` of the
/// steps, then anneals to `max_lr / div_factor / final_div_factor` on the last step.
#[derive(Debug, Clone)]
pub struct OneCycleLr {
    max_lr: f64,
    total_steps: usize,
    pct_start: f64,
    div_factor: f64,
    final_div_factor: f64,
    step: usize,
}

impl OneCycleLr {
    pub fn new(max_lr: f64, total_steps: usize) -> Self {
        Self {
            max_lr,
            total_steps: total_steps.max(1),
            pct_start: DEFAULT_PCT_START,
            div_factor: DEFAULT_DIV_FACTOR,
            final_div_factor: DEFAULT_FINAL_DIV_FACTOR,
            step: 0,
        }
    }

    pub fn with_pct_start(mut self, pct_start: f64) -> Self {
        self.pct_start = pct_start.clamp(0.0, 1.0);
        self
    }

    pub fn initial_lr(&self) -> f64 {
        self.max_lr / self.div_factor
    }

    pub fn min_lr(&self) -> f64 {
        self.initial_lr() / self.final_div_factor
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Optimiser steps taken so far.
    pub fn current_step(&self) -> usize {
        self.step
    }

    /// Learning rate at `step`; steps past the end stay at the minimum.
    pub fn lr_at(&self, step: usize) -> LearningRate {
        let last = (self.total_steps - 1) as f64;
        let warmup_end = self.pct_start * self.total_steps as f64 - 1.0;
        let t = (step as f64).min(last);
        if t <= warmup_end {
            let pct = if warmup_end > 0.0 { t / warmup_end } else { 1.0 };
            cosine(self.initial_lr(), self.max_lr, pct)
        } else {
            let span = last - warmup_end;
            let pct = if span > 0.0 { (t - warmup_end) / span } else { 1.0 };
            cosine(self.max_lr, self.min_lr(), pct)
        }
    }

}

/// The record is the step count; the curve itself is rebuilt from the run config.
impl LrScheduler for OneCycleLr {
    type Record<B: Backend> = usize;

    fn step(&mut self) -> LearningRate {
        let lr = self.lr_at(self.step);
        self.step += 1;
        lr
    }

    fn to_record<B: Backend>(&self) -> Self::Record<B> {
        self.step
    }

    fn load_record<B: Backend>(mut self, record: Self::Record<B>) -> Self {
        self.step = record;
        self
    }
}

fn cosine(start: f64, end: f64, pct: f64) -> f64 {
    end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12_f64.max(b.abs() * 1e-9)
    }

    #[test]
    fn warms_up_then_anneals() {
        let mut sched = OneCycleLr::new(1e-2, 100);
        let lrs: Vec<f64> = (0..100).map(|_| sched.step()).collect();
        assert!(close(lrs[0], 1e-2 / 25.0));
        assert!(close(lrs[29], 1e-2));
        assert!(close(lrs[99], 1e-2 / 25.0 / 1e4));
        assert!(lrs[..30].windows(2).all(|w| w[1] >= w[0]));
        assert!(lrs[29..].windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn record_resumes_at_the_saved_step() {
        let mut sched = OneCycleLr::new(5e-3, 40);
        let mut truth = sched.clone();
        for _ in 0..17 {
            sched.step();
            truth.step();
        }
        let record = sched.to_record::<NdArray>();
        assert_eq!(record, 17);

        let mut resumed = OneCycleLr::new(5e-3, 40).load_record::<NdArray>(record);
        assert_eq!(resumed.current_step(), 17);
        for _ in 0..23 {
            assert!(close(resumed.step(), truth.step()));
        }
    }

    #[test]
    fn single_step_schedule_is_finite() {
        let sched = OneCycleLr::new(1e-3, 1);
        assert!(sched.lr_at(0).is_finite());
        assert!(sched.lr_at(5).is_finite());
    }
}
