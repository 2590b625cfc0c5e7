//! Rolling-window aggregation: parameters, validation and dispatch.
//!
//! One output is produced per (sequence, window) pair, stored sequence-major.
//! The fast algorithm runs pairs in parallel; the exact algorithm runs pairs
//! one after another and parallelizes over positions within each pair.

use std::time::Instant;

use log::debug;
use rayon::prelude::*;

use dtframe_types::{Column, FrameError, Result};

use crate::algorithms::roll_answer::RollAnswer;
use crate::algorithms::roll_kernels::{align_shift, ExactKernel, FastKernel, KernelParams, RollKernel};
use crate::config::RollOptions;

/// Built-in aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollFun {
    Sum,
    Mean,
}

impl std::fmt::Display for RollFun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollFun::Sum => write!(f, "sum"),
            RollFun::Mean => write!(f, "mean"),
        }
    }
}

/// Where the window sits relative to the output position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// Window ends at the position.
    Right,
    /// Window is centred; for even widths it extends one further forward.
    Center,
    /// Window starts at the position.
    Left,
}

impl Align {
    /// Places a right-aligned result moves toward the start.
    pub fn shift(self, k: usize) -> usize {
        match self {
            Align::Right => 0,
            Align::Center => k / 2,
            Align::Left => k.saturating_sub(1),
        }
    }
}

/// What the caller knows about NA values in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaPolicy {
    Unknown,
    MayHaveNa,
    /// Asserted absent; contradicted data produces a warning.
    NoNa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algo {
    /// Running total, O(1) per position.
    Fast,
    /// Every window recomputed, O(k) per position.
    Exact,
}

/// Window widths: several fixed widths, or several per-position width arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Windows {
    Fixed(Vec<i64>),
    Adaptive(Vec<Vec<i64>>),
}

impl Windows {
    pub fn len(&self) -> usize {
        match self {
            Windows::Fixed(k) => k.len(),
            Windows::Adaptive(k) => k.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters of a rolling sum or mean.
#[derive(Debug, Clone)]
pub struct RollSpec {
    pub fun: RollFun,
    pub windows: Windows,
    pub align: Align,
    pub fill: f64,
    pub na_rm: bool,
    pub has_na: NaPolicy,
    pub algo: Algo,
}

impl RollSpec {
    /// Right-aligned, NA fill, NAs kept, fast algorithm.
    pub fn new(fun: RollFun, windows: Windows) -> Self {
        RollSpec {
            fun,
            windows,
            align: Align::Right,
            fill: f64::NAN,
            na_rm: false,
            has_na: NaPolicy::Unknown,
            algo: Algo::Fast,
        }
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn fill(mut self, fill: f64) -> Self {
        self.fill = fill;
        self
    }

    pub fn na_rm(mut self, na_rm: bool) -> Self {
        self.na_rm = na_rm;
        self
    }

    pub fn has_na(mut self, has_na: NaPolicy) -> Self {
        self.has_na = has_na;
        self
    }

    pub fn algo(mut self, algo: Algo) -> Self {
        self.algo = algo;
        self
    }

    /// Check the parameters against the input sequences.
    pub fn validate(&self, x: &[&[f64]]) -> Result<()> {
        if self.windows.is_empty() {
            return Err(FrameError::Roll("n must be non 0 length".into()));
        }
        match &self.windows {
            Windows::Fixed(ks) => check_widths(ks)?,
            Windows::Adaptive(ks) => {
                for k in ks {
                    check_widths(k)?;
                }
            }
        }
        if self.has_na == NaPolicy::NoNa && self.na_rm {
            return Err(FrameError::Roll(
                "using has_na = No and na_rm = true does not make sense; use the default has_na"
                    .into(),
            ));
        }
        if let Windows::Adaptive(ks) = &self.windows {
            if self.align != Align::Right {
                return Err(FrameError::Roll(
                    "adaptive windows support only right alignment".into(),
                ));
            }
            let nx = x[0].len();
            if let Some(i) = x.iter().position(|s| s.len() != nx) {
                return Err(FrameError::Roll(format!(
                    "adaptive rolling requires all sequences to have equal length; \
                     sequence 1 has {} values but sequence {} has {}",
                    nx,
                    i + 1,
                    x[i].len()
                )));
            }
            if let Some(j) = ks.iter().position(|k| k.len() != nx) {
                return Err(FrameError::Roll(format!(
                    "length of adaptive width array {} ({}) must match the length of the \
                     sequences ({})",
                    j + 1,
                    ks[j].len(),
                    nx
                )));
            }
        }
        Ok(())
    }
}

fn check_widths(ks: &[i64]) -> Result<()> {
    match ks.iter().find(|&&k| k <= 0) {
        Some(k) => Err(FrameError::Roll(format!(
            "n must be positive integer values (> 0), got {}",
            k
        ))),
        None => Ok(()),
    }
}

/// Outputs of a rolling call, one per (sequence, window) pair.
#[derive(Debug, Clone, Default)]
pub struct RollResult {
    values: Vec<Vec<f64>>,
    num_windows: usize,
    pub warnings: Vec<String>,
}

impl RollResult {
    pub(crate) fn new(values: Vec<Vec<f64>>, num_windows: usize, warnings: Vec<String>) -> Self {
        RollResult {
            values,
            num_windows,
            warnings,
        }
    }

    /// Output for sequence `seq` under window `win`.
    pub fn get(&self, seq: usize, win: usize) -> &[f64] {
        &self.values[seq * self.num_windows + win]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    /// All outputs, sequence-major.
    pub fn into_values(self) -> Vec<Vec<f64>> {
        self.values
    }
}

pub(crate) fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| FrameError::ThreadPool(e.to_string()))
}

fn kernel(algo: Algo) -> &'static dyn RollKernel {
    match algo {
        Algo::Fast => &FastKernel,
        Algo::Exact => &ExactKernel,
    }
}

fn run_pair(spec: &RollSpec, p: &KernelParams, x: &[f64], win: usize, ans: &mut RollAnswer) {
    let kern = kernel(spec.algo);
    match &spec.windows {
        Windows::Fixed(ks) => {
            let k = ks[win] as usize;
            kern.fixed(x, k, p, ans);
            if k <= x.len() {
                align_shift(&mut ans.values, spec.align.shift(k), p.fill);
            }
        }
        Windows::Adaptive(ks) => {
            let k: Vec<usize> = ks[win].iter().map(|&w| w as usize).collect();
            kern.adaptive(x, &k, p, ans);
        }
    }
}

/// Rolling sum or mean of every sequence in `x` under every window of `spec`.
pub fn roll_fun(x: &[&[f64]], spec: &RollSpec, opts: &RollOptions) -> Result<RollResult> {
    if x.is_empty() {
        return Ok(RollResult::default());
    }
    spec.validate(x)?;

    let nk = spec.windows.len();
    let pairs = x.len() * nk;
    let params = KernelParams {
        fun: spec.fun,
        fill: spec.fill,
        na_rm: spec.na_rm,
        has_na: spec.has_na,
    };

    let t = opts.verbose.then(Instant::now);
    let mut answers: Vec<RollAnswer> = (0..pairs).map(|i| RollAnswer::new(x[i / nk].len())).collect();
    if let Some(t) = t {
        debug!(
            "roll {}: allocated {} outputs in {:.3}s",
            spec.fun,
            pairs,
            t.elapsed().as_secs_f64()
        );
    }

    let t = opts.verbose.then(Instant::now);
    match spec.algo {
        Algo::Fast => {
            let pool = build_pool(opts.threads_for(pairs))?;
            pool.install(|| {
                answers.par_iter_mut().enumerate().for_each(|(i, ans)| {
                    run_pair(spec, &params, x[i / nk], i % nk, ans);
                });
            });
        }
        Algo::Exact => {
            let pool = build_pool(opts.num_threads.max(1))?;
            pool.install(|| {
                for (i, ans) in answers.iter_mut().enumerate() {
                    run_pair(spec, &params, x[i / nk], i % nk, ans);
                }
            });
        }
    }
    if let Some(t) = t {
        debug!(
            "roll {}: processing {} pair(s) took {:.3}s",
            spec.fun,
            pairs,
            t.elapsed().as_secs_f64()
        );
    }

    let mut warnings = Vec::new();
    for (i, ans) in answers.iter().enumerate() {
        let label = format!("roll {} of sequence {}, window {}", spec.fun, i / nk + 1, i % nk + 1);
        ans.replay(&label, opts.verbose, &mut warnings)?;
    }
    Ok(RollResult::new(
        answers.into_iter().map(|a| a.values).collect(),
        nk,
        warnings,
    ))
}

/// [`roll_fun`] over numeric or boolean columns.
pub fn roll_fun_columns(cols: &[Column], spec: &RollSpec, opts: &RollOptions) -> Result<RollResult> {
    let data = cols
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if !c.dtype().is_numeric() {
                return Err(FrameError::Type(format!(
                    "x[{}] must be of type numeric or boolean, got {}",
                    i + 1,
                    c.dtype()
                )));
            }
            c.data().to_f64_vec()
        })
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<&[f64]> = data.iter().map(|v| v.as_slice()).collect();
    roll_fun(&views, spec, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RollOptions {
        RollOptions {
            verbose: false,
            num_threads: 2,
        }
    }

    #[test]
    fn test_empty_input() {
        let spec = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![]));
        let res = roll_fun(&[], &spec, &opts()).unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let x: &[f64] = &[1.0, 2.0, 3.0];
        let check = |spec: RollSpec| roll_fun(&[x], &spec, &opts()).unwrap_err();

        assert!(matches!(
            check(RollSpec::new(RollFun::Sum, Windows::Fixed(vec![]))),
            FrameError::Roll(_)
        ));
        assert!(matches!(
            check(RollSpec::new(RollFun::Sum, Windows::Fixed(vec![2, 0]))),
            FrameError::Roll(_)
        ));
        assert!(matches!(
            check(
                RollSpec::new(RollFun::Sum, Windows::Fixed(vec![2]))
                    .has_na(NaPolicy::NoNa)
                    .na_rm(true)
            ),
            FrameError::Roll(_)
        ));
        assert!(matches!(
            check(
                RollSpec::new(RollFun::Sum, Windows::Adaptive(vec![vec![1, 1, 1]]))
                    .align(Align::Left)
            ),
            FrameError::Roll(_)
        ));
        assert!(matches!(
            check(RollSpec::new(RollFun::Sum, Windows::Adaptive(vec![vec![1, 1]]))),
            FrameError::Roll(_)
        ));

        let y: &[f64] = &[1.0];
        let spec = RollSpec::new(RollFun::Sum, Windows::Adaptive(vec![vec![1, 1, 1]]));
        assert!(roll_fun(&[x, y], &spec, &opts()).is_err());
    }

    #[test]
    fn test_pairs_are_sequence_major() {
        let a: &[f64] = &[1.0, 2.0, 3.0];
        let b: &[f64] = &[10.0, 20.0, 30.0];
        let spec = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![1, 2])).fill(0.0);
        let res = roll_fun(&[a, b], &spec, &opts()).unwrap();
        assert_eq!(res.len(), 4);
        assert_eq!(res.get(0, 1), &[0.0, 3.0, 5.0]);
        assert_eq!(res.get(1, 0), &[10.0, 20.0, 30.0]);
        assert_eq!(res.get(1, 1), &[0.0, 30.0, 50.0]);
    }

    #[test]
    fn test_alignment() {
        let x: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0];
        let centre = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![3]))
            .align(Align::Center)
            .fill(0.0);
        let res = roll_fun(&[x], &centre, &opts()).unwrap();
        assert_eq!(res.get(0, 0), &[0.0, 6.0, 9.0, 12.0, 0.0]);

        let left = centre.clone().align(Align::Left);
        let res = roll_fun(&[x], &left, &opts()).unwrap();
        assert_eq!(res.get(0, 0), &[6.0, 9.0, 12.0, 0.0, 0.0]);

        let even = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![2]))
            .align(Align::Center)
            .fill(0.0);
        let res = roll_fun(&[x], &even, &opts()).unwrap();
        assert_eq!(res.get(0, 0), &[3.0, 5.0, 7.0, 9.0, 0.0]);
    }

    #[test]
    fn test_columns_are_coerced() {
        let cols = vec![Column::from_i64(vec![1, 2, 3]), Column::from_bool(vec![true, false, true])];
        let spec = RollSpec::new(RollFun::Mean, Windows::Fixed(vec![3]));
        let res = roll_fun_columns(&cols, &spec, &opts()).unwrap();
        assert_eq!(res.get(0, 0)[2], 2.0);
        assert!((res.get(1, 0)[2] - 2.0 / 3.0).abs() < 1e-12);

        let strings = vec![Column::from_strings(&["a"])];
        assert!(matches!(
            roll_fun_columns(&strings, &spec, &opts()),
            Err(FrameError::Type(_))
        ));
    }

    #[test]
    fn test_no_na_warning_is_returned() {
        let x: &[f64] = &[1.0, f64::NAN, 3.0];
        let spec = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![2])).has_na(NaPolicy::NoNa);
        let res = roll_fun(&[x], &spec, &opts()).unwrap();
        assert_eq!(res.warnings.len(), 1);
    }
}
