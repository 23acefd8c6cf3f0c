use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait Progress {
    /// announces the number of work units that will be reported
    fn start(&mut self, total: u64);

    /// marks `n` more units as done
    fn inc(&mut self, n: u64);

    /// called once after the last unit, also on early exit
    fn finish(&mut self);
}

#[derive(Default, Copy, Clone)]
pub struct NoOpSnoop;

impl Progress for NoOpSnoop {
    fn start(&mut self, _total: u64) {}

    fn inc(&mut self, _n: u64) {}

    fn finish(&mut self) {}
}

/// Draws progress on stderr with an `indicatif` bar.
pub struct BarSnoop {
    label: String,
    bar: Option<ProgressBar>,
}

impl BarSnoop {
    pub fn new(label: impl Into<String>) -> Self {
        BarSnoop {
            label: label.into(),
            bar: None,
        }
    }
}

impl Progress for BarSnoop {
    fn start(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        let template = format!("{} [{{bar:40}}] {{pos}}/{{len}} [{{elapsed_precise}}<{{eta_precise}}]", self.label);
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            bar.set_style(style.progress_chars("=> "));
        }
        self.bar = Some(bar);
    }

    fn inc(&mut self, n: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(n);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

#[derive(Debug, Default)]
pub struct AtomicState {
    total: AtomicU64,
    done: AtomicU64,
    finished: AtomicU64,
}

impl AtomicState {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// number of times `finish` was called
    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Records reported progress into a shared `AtomicState`, so callers can inspect it after handing
/// the snoop to a computation.
#[derive(Debug, Clone)]
pub struct AtomicSnoop {
    state: Arc<AtomicState>,
}

pub fn atomic() -> (Arc<AtomicState>, AtomicSnoop) {
    let state: Arc<AtomicState> = Default::default();
    (state.clone(), AtomicSnoop { state })
}

impl Progress for AtomicSnoop {
    fn start(&mut self, total: u64) {
        self.state.total.store(total, Ordering::Relaxed);
        self.state.done.store(0, Ordering::Relaxed);
    }

    fn inc(&mut self, n: u64) {
        self.state.done.fetch_add(n, Ordering::Relaxed);
    }

    fn finish(&mut self) {
        self.state.finished.fetch_add(1, Ordering::Relaxed);
    }
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn start(&mut self, total: u64) {
        (**self).start(total)
    }

    fn inc(&mut self, n: u64) {
        (**self).inc(n)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}
