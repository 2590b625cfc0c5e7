//! Rolling sum/mean and callback application across algorithms.

use dtframe_query::{
    roll_apply, roll_fun, Algo, Align, NaPolicy, RollFun, RollOptions, RollSpec, ScalarFn, Windows,
};
use proptest::prelude::*;

fn opts() -> RollOptions {
    RollOptions {
        verbose: false,
        num_threads: 4,
    }
}

fn close(a: &[f64], b: &[f64], tol: f64) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x == y || (x.is_nan() && y.is_nan()) || (x - y).abs() <= tol * (1.0 + y.abs())
        })
}

#[test]
fn test_sum_window_three() {
    let x: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0];
    for algo in [Algo::Fast, Algo::Exact] {
        let spec = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![3]))
            .fill(-1.0)
            .algo(algo);
        let res = roll_fun(&[x], &spec, &opts()).unwrap();
        assert!(close(res.get(0, 0), &[-1.0, -1.0, 6.0, 9.0, 12.0], 1e-12));
    }
}

#[test]
fn test_adaptive_sum() {
    let x: &[f64] = &[1.0, 2.0, 3.0, 4.0];
    for algo in [Algo::Fast, Algo::Exact] {
        let spec = RollSpec::new(RollFun::Sum, Windows::Adaptive(vec![vec![1, 2, 2, 3]])).algo(algo);
        let res = roll_fun(&[x], &spec, &opts()).unwrap();
        assert_eq!(res.get(0, 0), &[1.0, 3.0, 5.0, 9.0]);
    }
}

#[test]
fn test_mean_drops_na_when_asked() {
    let x: &[f64] = &[2.0, f64::NAN, 4.0, 6.0];
    let spec = RollSpec::new(RollFun::Mean, Windows::Fixed(vec![3]))
        .na_rm(true)
        .has_na(NaPolicy::MayHaveNa);
    let res = roll_fun(&[x], &spec, &opts()).unwrap();
    let out = res.get(0, 0);
    assert_eq!(out[2], 3.0);
    assert_eq!(out[3], 5.0);

    let keep = RollSpec::new(RollFun::Mean, Windows::Fixed(vec![3]));
    let res = roll_fun(&[x], &keep, &opts()).unwrap();
    assert!(res.get(0, 0)[2].is_nan());
    assert!(res.get(0, 0)[3].is_nan());
}

#[test]
fn test_infinite_values_agree_across_algorithms() {
    let x: &[f64] = &[1.0, f64::INFINITY, 2.0, 3.0];
    for fun in [RollFun::Sum, RollFun::Mean] {
        let fast = roll_fun(&[x], &RollSpec::new(fun, Windows::Fixed(vec![2])), &opts()).unwrap();
        let exact = roll_fun(
            &[x],
            &RollSpec::new(fun, Windows::Fixed(vec![2])).algo(Algo::Exact),
            &opts(),
        )
        .unwrap();
        assert_eq!(exact.get(0, 0)[1], f64::INFINITY);
        assert_eq!(exact.get(0, 0)[2], f64::INFINITY);
        assert!(close(fast.get(0, 0), exact.get(0, 0), 1e-12));
    }
}

#[test]
fn test_many_pairs() {
    let seqs: Vec<Vec<f64>> = (0..5)
        .map(|s| (0..50).map(|i| (i * (s + 1)) as f64).collect())
        .collect();
    let views: Vec<&[f64]> = seqs.iter().map(|v| v.as_slice()).collect();
    let spec = RollSpec::new(RollFun::Sum, Windows::Fixed(vec![1, 5, 10]));
    let res = roll_fun(&views, &spec, &opts()).unwrap();
    assert_eq!(res.len(), 15);
    assert_eq!(res.num_windows(), 3);
    for (s, seq) in seqs.iter().enumerate() {
        assert_eq!(res.get(s, 0), seq.as_slice());
        let expected: f64 = seq[45..50].iter().sum();
        assert_eq!(res.get(s, 1)[49], expected);
    }
}

#[test]
fn test_apply_matches_builtin_sum() {
    let x: &[f64] = &[0.5, 1.5, -2.0, 4.0, 8.0, 1.0];
    let builtin = roll_fun(
        &[x],
        &RollSpec::new(RollFun::Sum, Windows::Fixed(vec![2, 4])).align(Align::Center),
        &opts(),
    )
    .unwrap();
    let applied = roll_apply(
        &[x],
        &[2, 4],
        Align::Center,
        f64::NAN,
        ScalarFn(|w: &[f64]| w.iter().sum()),
        &opts(),
    )
    .unwrap();
    for w in 0..2 {
        assert!(close(builtin.get(0, w), applied.get(0, w), 1e-12));
    }
}

fn value() -> impl Strategy<Value = f64> {
    prop_oneof![
        18 => -1000.0f64..1000.0,
        2 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn fast_matches_exact_fixed(
        x in proptest::collection::vec(value(), 0..80),
        k in 1i64..12,
        mean in any::<bool>(),
        na_rm in any::<bool>(),
        align in prop_oneof![Just(Align::Right), Just(Align::Center), Just(Align::Left)],
    ) {
        let xs: &[f64] = &x;
        let fun = if mean { RollFun::Mean } else { RollFun::Sum };
        let spec = RollSpec::new(fun, Windows::Fixed(vec![k])).na_rm(na_rm).align(align);
        let fast = roll_fun(&[xs], &spec.clone().algo(Algo::Fast), &opts()).unwrap();
        let exact = roll_fun(&[xs], &spec.algo(Algo::Exact), &opts()).unwrap();
        prop_assert!(close(fast.get(0, 0), exact.get(0, 0), 1e-9));
    }

    #[test]
    fn fast_matches_exact_adaptive(
        x in proptest::collection::vec(value(), 1..60),
        seed in proptest::collection::vec(1i64..10, 60),
        na_rm in any::<bool>(),
    ) {
        let xs: &[f64] = &x;
        let widths: Vec<i64> = seed[..x.len()].to_vec();
        let spec = RollSpec::new(RollFun::Mean, Windows::Adaptive(vec![widths])).na_rm(na_rm);
        let fast = roll_fun(&[xs], &spec.clone().algo(Algo::Fast), &opts()).unwrap();
        let exact = roll_fun(&[xs], &spec.algo(Algo::Exact), &opts()).unwrap();
        prop_assert!(close(fast.get(0, 0), exact.get(0, 0), 1e-9));
    }
}
