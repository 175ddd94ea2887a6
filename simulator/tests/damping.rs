use wavesim_simulator::damping::Damping;
use wavesim_simulator::GridSpec;

fn checkerboard(spec: &GridSpec, keep: impl Fn([usize; 3]) -> bool) -> Vec<f64> {
    (0..spec.len())
        .map(|i| {
            let c = spec.coords(i);
            if keep(c) {
                0.1 + 0.01 * (i % 13) as f64
            } else {
                0.0
            }
        })
        .collect()
}

#[test]
fn interior_packet_is_untouched() {
    let spec = GridSpec::new(&[16, 16, 16]).unwrap();
    let damping = Damping::new(3, 4.0, 0.05).unwrap();
    let interior = |[x, y, z]: [usize; 3]| {
        (3..13).contains(&x) && (3..13).contains(&y) && (3..13).contains(&z)
    };
    let original = checkerboard(&spec, interior);
    let mut real = original.clone();
    let mut minus = original.clone();
    let mut plus = original.clone();
    damping.apply(&spec, [&mut real[..], &mut minus[..], &mut plus[..]], true);
    for grid in [&real, &minus, &plus] {
        assert!(grid
            .iter()
            .zip(&original)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}

#[test]
fn packet_in_one_layer_is_scaled_by_that_layer() {
    let spec = GridSpec::new(&[20, 20]).unwrap();
    let damping = Damping::new(4, 3.0, 0.1).unwrap();
    for layer in 0..4 {
        // cells of `layer` on the left and right x faces, away from y borders
        let in_layer = |[x, y, _]: [usize; 3]| {
            (x == layer || x == 19 - layer) && (6..14).contains(&y)
        };
        let original = checkerboard(&spec, in_layer);
        let mut grid = original.clone();
        damping.apply(&spec, [&mut grid[..]], false);
        let f = damping.factors()[layer];
        let expected = 1.0 - 3.0 * 0.1 * (1.0 - (std::f64::consts::FRAC_PI_2 * layer as f64 / 4.0).sin());
        assert_eq!(f, expected);
        for (damped, before) in grid.iter().zip(&original) {
            assert_eq!(*damped, before * f);
        }
    }
}

#[test]
fn damping_must_fit_the_grid() {
    let damping = Damping::new(5, 1.0, 0.01).unwrap();
    assert!(damping.check_fits(&GridSpec::new(&[10, 10]).unwrap()).is_ok());
    assert!(damping.check_fits(&GridSpec::new(&[10, 9]).unwrap()).is_err());
}
