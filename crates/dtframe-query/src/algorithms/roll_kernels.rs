//! Rolling sum/mean kernels.
//!
//! Results are computed right-aligned; the dispatcher shifts them for other
//! alignments. NA is `NaN`.

use rayon::prelude::*;

use crate::algorithms::roll_answer::{Notice, RollAnswer};
use crate::algorithms::rolling::{NaPolicy, RollFun};

/// Parameters shared by every pair of one call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KernelParams {
    pub fun: RollFun,
    pub fill: f64,
    pub na_rm: bool,
    pub has_na: NaPolicy,
}

/// One algorithm for fixed and adaptive windows.
pub(crate) trait RollKernel: Sync {
    fn fixed(&self, x: &[f64], k: usize, p: &KernelParams, ans: &mut RollAnswer);
    fn adaptive(&self, x: &[f64], k: &[usize], p: &KernelParams, ans: &mut RollAnswer);
}

/// Running total, with an exact rescan of windows holding non-finite values.
pub(crate) struct FastKernel;

/// Every window summed from scratch, in parallel over positions.
pub(crate) struct ExactKernel;

/// Value for a window of `k` slots holding `nc` NAs whose non-NA values sum
/// to `sum`.
fn finish(sum: f64, nc: usize, k: usize, p: &KernelParams) -> f64 {
    if nc == 0 {
        return match p.fun {
            RollFun::Sum => sum,
            RollFun::Mean => sum / k as f64,
        };
    }
    if !p.na_rm {
        return f64::NAN;
    }
    match p.fun {
        RollFun::Sum if nc == k => 0.0,
        RollFun::Sum => sum,
        RollFun::Mean if nc == k => f64::NAN,
        RollFun::Mean => sum / (k - nc) as f64,
    }
}

/// Plain sum over a window, NAs counted apart.
fn rescan(win: &[f64], p: &KernelParams) -> f64 {
    let mut sum = 0.0;
    let mut nc = 0;
    for &v in win {
        if v.is_nan() {
            nc += 1;
        } else {
            sum += v;
        }
    }
    finish(sum, nc, win.len(), p)
}

/// Compensated (Neumaier) sum of the non-NA values and the NA count.
fn neumaier(win: &[f64]) -> (f64, usize) {
    let mut sum = 0.0f64;
    let mut comp = 0.0f64;
    let mut nc = 0;
    for &v in win {
        if v.is_nan() {
            nc += 1;
            continue;
        }
        let t = sum + v;
        if !t.is_finite() {
            // Compensation is meaningless once the total is infinite.
            sum = t;
            comp = 0.0;
            continue;
        }
        if sum.abs() >= v.abs() {
            comp += (sum - t) + v;
        } else {
            comp += (v - t) + sum;
        }
        sum = t;
    }
    let total = sum + comp;
    (if total.is_finite() { total } else { sum }, nc)
}

fn exact_window(win: &[f64], p: &KernelParams) -> f64 {
    let (sum, nc) = neumaier(win);
    let k = win.len();
    match p.fun {
        RollFun::Sum => finish(sum, nc, k, p),
        RollFun::Mean => {
            let mean = finish(sum, nc, k, p);
            if !mean.is_finite() {
                return mean;
            }
            // Second pass over the same values removes most rounding error.
            let cnt = (k - nc) as f64;
            let resid: f64 = win.iter().filter(|v| !v.is_nan()).map(|v| v - mean).sum();
            mean + resid / cnt
        }
    }
}

fn note_na(x: &[f64], p: &KernelParams, ans: &mut RollAnswer) {
    if p.has_na == NaPolicy::NoNa && x.iter().any(|v| v.is_nan()) {
        ans.note(Notice::NaDespiteNoNa);
    }
}

/// Shift right-aligned results `shift` places toward the start and fill the
/// vacated tail.
pub(crate) fn align_shift(values: &mut [f64], shift: usize, fill: f64) {
    let n = values.len();
    if shift == 0 {
        return;
    }
    if shift >= n {
        values.fill(fill);
        return;
    }
    values.copy_within(shift.., 0);
    values[n - shift..].fill(fill);
}

impl RollKernel for FastKernel {
    fn fixed(&self, x: &[f64], k: usize, p: &KernelParams, ans: &mut RollAnswer) {
        let n = x.len();
        if k > n {
            ans.values.fill(p.fill);
            ans.note(Notice::WindowExceedsInput { window: k, len: n });
            return;
        }
        let mut sum = 0.0;
        // Non-finite values currently inside the window.
        let mut bad = 0usize;
        let mut rescanned = false;
        for i in 0..n {
            let v = x[i];
            if v.is_finite() {
                sum += v;
            } else {
                bad += 1;
            }
            if i >= k {
                let old = x[i - k];
                if old.is_finite() {
                    sum -= old;
                } else {
                    bad -= 1;
                }
            }
            ans.values[i] = if i + 1 < k {
                p.fill
            } else if bad == 0 {
                finish(sum, 0, k, p)
            } else {
                rescanned = true;
                rescan(&x[i + 1 - k..=i], p)
            };
        }
        if rescanned {
            ans.note(Notice::Rescanned);
        }
        note_na(x, p, ans);
    }

    fn adaptive(&self, x: &[f64], k: &[usize], p: &KernelParams, ans: &mut RollAnswer) {
        let n = x.len();
        // Prefix sums of finite values and prefix counts of non-finite ones.
        let mut cs = vec![0.0; n + 1];
        let mut cbad = vec![0usize; n + 1];
        for i in 0..n {
            let finite = x[i].is_finite();
            cs[i + 1] = cs[i] + if finite { x[i] } else { 0.0 };
            cbad[i + 1] = cbad[i] + usize::from(!finite);
        }
        let mut rescanned = false;
        for i in 0..n {
            let w = k[i];
            if w > i + 1 {
                ans.values[i] = p.fill;
                continue;
            }
            let start = i + 1 - w;
            ans.values[i] = if cbad[i + 1] == cbad[start] {
                finish(cs[i + 1] - cs[start], 0, w, p)
            } else {
                rescanned = true;
                rescan(&x[start..=i], p)
            };
        }
        if rescanned {
            ans.note(Notice::Rescanned);
        }
        note_na(x, p, ans);
    }
}

impl RollKernel for ExactKernel {
    fn fixed(&self, x: &[f64], k: usize, p: &KernelParams, ans: &mut RollAnswer) {
        let n = x.len();
        if k > n {
            ans.values.fill(p.fill);
            ans.note(Notice::WindowExceedsInput { window: k, len: n });
            return;
        }
        ans.values[..k - 1].fill(p.fill);
        ans.values[k - 1..]
            .par_iter_mut()
            .enumerate()
            .for_each(|(j, out)| *out = exact_window(&x[j..j + k], p));
        note_na(x, p, ans);
    }

    fn adaptive(&self, x: &[f64], k: &[usize], p: &KernelParams, ans: &mut RollAnswer) {
        ans.values
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, out)| {
                let w = k[i];
                *out = if w > i + 1 {
                    p.fill
                } else {
                    exact_window(&x[i + 1 - w..=i], p)
                };
            });
        note_na(x, p, ans);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(fun: RollFun, na_rm: bool) -> KernelParams {
        KernelParams {
            fun,
            fill: f64::NAN,
            na_rm,
            has_na: NaPolicy::Unknown,
        }
    }

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            if y.is_nan() {
                assert!(x.is_nan(), "{:?} vs {:?}", a, b);
            } else {
                assert!((x - y).abs() < 1e-9, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_fixed_sum_both_kernels() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let p = params(RollFun::Sum, false);
        let expected = [f64::NAN, f64::NAN, 6.0, 9.0, 12.0];
        for kernel in [&FastKernel as &dyn RollKernel, &ExactKernel] {
            let mut ans = RollAnswer::new(5);
            kernel.fixed(&x, 3, &p, &mut ans);
            assert_close(&ans.values, &expected);
        }
    }

    #[test]
    fn test_adaptive_sum_both_kernels() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let p = params(RollFun::Sum, false);
        for kernel in [&FastKernel as &dyn RollKernel, &ExactKernel] {
            let mut ans = RollAnswer::new(4);
            kernel.adaptive(&x, &[1, 2, 2, 3], &p, &mut ans);
            assert_close(&ans.values, &[1.0, 3.0, 5.0, 9.0]);
        }
    }

    #[test]
    fn test_adaptive_width_beyond_history_is_fill() {
        let p = KernelParams {
            fill: -1.0,
            ..params(RollFun::Sum, false)
        };
        let mut ans = RollAnswer::new(2);
        FastKernel.adaptive(&[1.0, 2.0], &[2, 2], &p, &mut ans);
        assert_close(&ans.values, &[-1.0, 3.0]);
    }

    #[test]
    fn test_na_rules() {
        let x = [1.0, f64::NAN, 3.0];
        let mut ans = RollAnswer::new(3);
        FastKernel.fixed(&x, 2, &params(RollFun::Mean, true), &mut ans);
        assert_close(&ans.values, &[f64::NAN, 1.0, 3.0]);

        FastKernel.fixed(&x, 2, &params(RollFun::Mean, false), &mut ans);
        assert_close(&ans.values, &[f64::NAN, f64::NAN, f64::NAN]);

        let all_na = [f64::NAN, f64::NAN];
        let mut ans = RollAnswer::new(2);
        ExactKernel.fixed(&all_na, 2, &params(RollFun::Sum, true), &mut ans);
        assert_eq!(ans.values[1], 0.0);
        ExactKernel.fixed(&all_na, 2, &params(RollFun::Mean, true), &mut ans);
        assert!(ans.values[1].is_nan());
    }

    #[test]
    fn test_infinity_rescan() {
        let x = [1.0, f64::INFINITY, 1.0, 1.0, 1.0];
        let mut ans = RollAnswer::new(5);
        FastKernel.fixed(&x, 2, &params(RollFun::Sum, false), &mut ans);
        assert_eq!(ans.values[1], f64::INFINITY);
        assert_eq!(ans.values[2], f64::INFINITY);
        assert_eq!(ans.values[3], 2.0);
        assert_eq!(ans.values[4], 2.0);
        assert!(ans.notices().any(|n| *n == Notice::Rescanned));
    }

    #[test]
    fn test_exact_keeps_infinity() {
        let x = [1.0, f64::INFINITY, 2.0, 3.0];
        for fun in [RollFun::Sum, RollFun::Mean] {
            let mut ans = RollAnswer::new(4);
            ExactKernel.fixed(&x, 2, &params(fun, false), &mut ans);
            assert_eq!(ans.values[1], f64::INFINITY);
            assert_eq!(ans.values[2], f64::INFINITY);
            assert!(ans.values[3].is_finite());
        }
        let mut ans = RollAnswer::new(3);
        ExactKernel.fixed(&[f64::NEG_INFINITY, 1.0, f64::INFINITY], 2, &params(RollFun::Sum, false), &mut ans);
        assert_eq!(ans.values[1], f64::NEG_INFINITY);
        assert!(ans.values[2].is_infinite());
    }

    #[test]
    fn test_no_na_assertion_contradicted() {
        let p = KernelParams {
            has_na: NaPolicy::NoNa,
            ..params(RollFun::Sum, false)
        };
        let mut ans = RollAnswer::new(3);
        FastKernel.fixed(&[1.0, f64::NAN, 2.0], 2, &p, &mut ans);
        assert!(ans.notices().any(|n| *n == Notice::NaDespiteNoNa));
    }

    #[test]
    fn test_window_wider_than_input() {
        let p = KernelParams {
            fill: 0.5,
            ..params(RollFun::Mean, false)
        };
        let mut ans = RollAnswer::new(2);
        ExactKernel.fixed(&[1.0, 2.0], 3, &p, &mut ans);
        assert_eq!(ans.values, vec![0.5, 0.5]);
    }

    #[test]
    fn test_align_shift() {
        let mut v = [9.0, 9.0, 6.0, 9.0, 12.0];
        align_shift(&mut v, 1, 0.0);
        assert_eq!(v, [9.0, 6.0, 9.0, 12.0, 0.0]);
        let mut w = [1.0, 2.0];
        align_shift(&mut w, 3, 7.0);
        assert_eq!(w, [7.0, 7.0]);
    }

    #[test]
    fn test_exact_mean_is_accurate() {
        let x = [1e16, 1.0, -1e16, 1.0];
        let mut ans = RollAnswer::new(4);
        ExactKernel.fixed(&x, 4, &params(RollFun::Sum, false), &mut ans);
        assert_eq!(ans.values[3], 2.0);
    }
}
