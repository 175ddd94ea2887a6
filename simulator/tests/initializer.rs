use wavesim_simulator::ics::{create_gaussian_wave_packet, GaussianPacket};
use wavesim_simulator::{GridSpec, VisscherWf, WaveFunction};

fn initial_state() -> (WaveFunction, Vec<f64>) {
    let spec = GridSpec::new(&[20, 20]).unwrap();
    let packet = GaussianPacket {
        center: [10.0, 10.0, 0.0],
        width: [2.5, 2.0, 1.0],
        momentum: [0.6, 0.3, 0.0],
    };
    let wf = create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).unwrap();
    let potential = (0..spec.len()).map(|i| 0.001 * (i % 20) as f64).collect();
    (wf, potential)
}

/// Largest deviation of both staggered imaginary grids from Im ψ0.
fn imaginary_error(dt: f64) -> f64 {
    let (wf, potential) = initial_state();
    let state = VisscherWf::new(&wf, &potential, 1.0, dt, false).unwrap();
    wf.amplitudes()
        .iter()
        .zip(state.imag_plus().iter().zip(state.imag_minus()))
        .map(|(a, (plus, minus))| (plus - a.im).abs().max((minus - a.im).abs()))
        .fold(0.0, f64::max)
}

#[test]
fn half_step_imaginary_parts_converge_linearly() {
    let coarse = imaginary_error(1e-2);
    let fine = imaginary_error(1e-3);
    let finest = imaginary_error(1e-4);
    assert!(coarse > 0.0);
    assert!(fine < coarse / 5.0, "{fine} vs {coarse}");
    assert!(finest < fine / 5.0, "{finest} vs {fine}");
    assert!(finest < 1e-4);
}

#[test]
fn staggered_parts_straddle_the_initial_state() {
    // ImagPlus and ImagMinus differ only in the sign of the first order term
    let (wf, potential) = initial_state();
    let dt = 0.02;
    let state = VisscherWf::new(&wf, &potential, 1.0, dt, true).unwrap();
    let h = wf.apply_h(&potential, 1.0, true).unwrap();
    for ((plus, minus), h) in state
        .imag_plus()
        .iter()
        .zip(state.imag_minus())
        .zip(h.amplitudes())
    {
        approx::assert_abs_diff_eq!(minus - plus, dt * h.re, epsilon = 1e-12);
    }
}
