//! Rolling application of an arbitrary callback.
//!
//! Sequential by construction: the callback is caller code with no thread
//! safety guarantees. One window buffer is allocated per width and refilled
//! for every position.

use std::time::Instant;

use log::debug;

use dtframe_types::{Column, ColumnType, FrameError, Result};

use crate::algorithms::roll_answer::{Notice, RollAnswer};
use crate::algorithms::roll_kernels::align_shift;
use crate::algorithms::rolling::{Align, RollResult};
use crate::config::RollOptions;

/// Called once per window position with the window's values.
pub trait WindowCallback {
    fn call(&mut self, window: &[f64]) -> Result<Column>;
}

impl<F> WindowCallback for F
where
    F: FnMut(&[f64]) -> Result<Column>,
{
    fn call(&mut self, window: &[f64]) -> Result<Column> {
        self(window)
    }
}

/// Adapts an infallible `&[f64] -> f64` function.
pub struct ScalarFn<F>(pub F);

impl<F> WindowCallback for ScalarFn<F>
where
    F: FnMut(&[f64]) -> f64,
{
    fn call(&mut self, window: &[f64]) -> Result<Column> {
        Ok(Column::from_f64(vec![(self.0)(window)]))
    }
}

/// Single numeric value of a callback result, if it is one.
fn scalar_value(col: &Column) -> Option<f64> {
    if col.len() != 1
        || !matches!(
            col.dtype(),
            ColumnType::Boolean | ColumnType::Integer | ColumnType::Float
        )
    {
        return None;
    }
    col.get(0).as_f64()
}

/// Apply `cb` over every window of every sequence in `x`.
pub fn roll_apply<C: WindowCallback>(
    x: &[&[f64]],
    windows: &[i64],
    align: Align,
    fill: f64,
    mut cb: C,
    opts: &RollOptions,
) -> Result<RollResult> {
    if x.is_empty() {
        return Ok(RollResult::default());
    }
    if windows.is_empty() {
        return Err(FrameError::Roll("n must be non 0 length".into()));
    }
    let mut widths = Vec::with_capacity(windows.len());
    for &k in windows {
        if k <= 0 {
            return Err(FrameError::Roll(format!(
                "n must be positive integer values (> 0), got {}",
                k
            )));
        }
        let k = usize::try_from(k).map_err(|_| {
            FrameError::Roll(format!("window width {} is not representable as a size", k))
        })?;
        widths.push(k);
    }

    let nk = widths.len();
    let mut answers: Vec<RollAnswer> = (0..x.len() * nk)
        .map(|i| RollAnswer::new(x[i / nk].len()))
        .collect();

    let t = opts.verbose.then(Instant::now);
    'windows: for (w, &k) in widths.iter().enumerate() {
        let mut buf = vec![0.0; k];
        for (s, seq) in x.iter().enumerate() {
            let ans = &mut answers[s * nk + w];
            let n = seq.len();
            if k > n {
                ans.values.fill(fill);
                ans.note(Notice::WindowExceedsInput { window: k, len: n });
                continue;
            }
            ans.values[..k - 1].fill(fill);
            for i in k - 1..n {
                buf.copy_from_slice(&seq[i + 1 - k..=i]);
                let out = cb.call(&buf)?;
                match scalar_value(&out) {
                    Some(v) => ans.values[i] = v,
                    None => {
                        ans.note(Notice::BadCallbackResult {
                            window: k,
                            position: i,
                            len: out.len(),
                            dtype: out.dtype(),
                        });
                        break 'windows;
                    }
                }
            }
            align_shift(&mut ans.values, align.shift(k), fill);
        }
    }
    if let Some(t) = t {
        debug!(
            "roll apply: {} callback pair(s) took {:.3}s",
            answers.len(),
            t.elapsed().as_secs_f64()
        );
    }

    let mut warnings = Vec::new();
    for (i, ans) in answers.iter().enumerate() {
        let label = format!("roll apply of sequence {}, window {}", i / nk + 1, i % nk + 1);
        ans.replay(&label, opts.verbose, &mut warnings)?;
    }
    Ok(RollResult::new(
        answers.into_iter().map(|a| a.values).collect(),
        nk,
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RollOptions {
        RollOptions {
            verbose: false,
            num_threads: 1,
        }
    }

    #[test]
    fn test_max_of_window() {
        let x: &[f64] = &[3.0, 1.0, 4.0, 1.0, 5.0];
        let max = ScalarFn(|w: &[f64]| w.iter().cloned().fold(f64::MIN, f64::max));
        let res = roll_apply(&[x], &[2], Align::Right, -1.0, max, &opts()).unwrap();
        assert_eq!(res.get(0, 0), &[-1.0, 3.0, 4.0, 4.0, 5.0]);
    }

    #[test]
    fn test_buffer_is_reused_and_aligned() {
        let x: &[f64] = &[1.0, 2.0, 3.0, 4.0];
        let mut ptrs = Vec::new();
        let res = roll_apply(
            &[x],
            &[3],
            Align::Left,
            0.0,
            |w: &[f64]| {
                ptrs.push(w.as_ptr() as usize);
                Ok(Column::from_f64(vec![w.iter().sum()]))
            },
            &opts(),
        )
        .unwrap();
        assert_eq!(res.get(0, 0), &[6.0, 9.0, 0.0, 0.0]);
        assert!(ptrs.windows(2).all(|p| p[0] == p[1]));
    }

    #[test]
    fn test_boolean_and_integer_results() {
        let x: &[f64] = &[1.0, 2.0, 3.0];
        let res = roll_apply(
            &[x],
            &[1],
            Align::Right,
            0.0,
            |w: &[f64]| Ok(Column::from_bool(vec![w[0] > 1.5])),
            &opts(),
        )
        .unwrap();
        assert_eq!(res.get(0, 0), &[0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_bad_results_are_errors() {
        let x: &[f64] = &[1.0, 2.0, 3.0];
        let err = roll_apply(
            &[x],
            &[2],
            Align::Right,
            0.0,
            |w: &[f64]| Ok(Column::from_f64(w.to_vec())),
            &opts(),
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::Callback(_)));

        let err = roll_apply(
            &[x],
            &[1],
            Align::Right,
            0.0,
            |_: &[f64]| Ok(Column::from_strings(&["a"])),
            &opts(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("type string"));

        let err = roll_apply(
            &[x],
            &[1],
            Align::Right,
            0.0,
            |_: &[f64]| -> Result<Column> { Err(FrameError::Eval("host failure".into())) },
            &opts(),
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::Eval(_)));
    }

    #[test]
    fn test_validation() {
        let x: &[f64] = &[1.0];
        let cb = ScalarFn(|w: &[f64]| w[0]);
        assert!(roll_apply(&[x], &[], Align::Right, 0.0, cb, &opts()).is_err());
        let cb = ScalarFn(|w: &[f64]| w[0]);
        assert!(roll_apply(&[x], &[-2], Align::Right, 0.0, cb, &opts()).is_err());
        let cb = ScalarFn(|w: &[f64]| w[0]);
        let res = roll_apply(&[x], &[3], Align::Right, 9.0, cb, &opts()).unwrap();
        assert_eq!(res.get(0, 0), &[9.0]);
    }
}
