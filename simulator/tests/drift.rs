use approx::assert_abs_diff_eq;
use wavesim_simulator::ics::{create_gaussian_wave_packet, GaussianPacket};
use wavesim_simulator::watcher::{KeyframeContent, KeyframeStorage};
use wavesim_simulator::{Evolver, EvolverConfig, GridSpec};

#[test]
fn free_packet_drifts_with_its_momentum() {
    let spec = GridSpec::new(&[32, 32]).unwrap();
    let packet = GaussianPacket {
        center: [16.0, 16.0, 0.0],
        width: [3.0, 3.0, 1.0],
        momentum: [0.5, 0.0, 0.0],
    };
    let initial = create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).unwrap();
    let config = EvolverConfig::new(spec, 1.0, 0.01, 1.0, 2);
    let free = |_: [f64; 3], _: [f64; 3]| 0.0;
    let evolver = Evolver::single(config, 1.0, initial, Box::new(free)).unwrap();
    assert_eq!(evolver.total_steps(), 101);

    let mut storage = KeyframeStorage::new();
    let outcome = evolver.run_blocking(&mut storage);
    assert!(outcome.is_success(), "{outcome}");

    let frames = storage.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].index, frames[0].step), (0, 0));
    assert_eq!((frames[1].index, frames[1].step), (1, 100));
    assert_abs_diff_eq!(frames[1].time, 1.0, epsilon = 1e-12);

    let centroid = |content: &KeyframeContent| match content {
        KeyframeContent::WaveFunction(wf) => wf.centroid(),
        other => panic!("unexpected keyframe {other:?}"),
    };
    let start = centroid(&frames[0].content);
    let end = centroid(&frames[1].content);
    assert_abs_diff_eq!(start[0], 16.0, epsilon = 1e-3);
    assert_abs_diff_eq!(end[0] - start[0], 0.5, epsilon = 0.02);
    assert_abs_diff_eq!(end[1] - start[1], 0.0, epsilon = 1e-3);
}

#[test]
fn harmonic_well_holds_packet_in_place() {
    use wavesim_common::PotentialParameters;
    use wavesim_simulator::potential::BuiltinPotential;

    let spec = GridSpec::new(&[24, 24]).unwrap();
    let packet = GaussianPacket {
        center: [12.0, 12.0, 0.0],
        width: [2.0, 2.0, 1.0],
        momentum: [0.0; 3],
    };
    let initial = create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).unwrap();
    let potential = BuiltinPotential::new(
        PotentialParameters::Harmonic {
            omega: 0.25,
            center: Some(vec![12.0, 12.0]),
        },
        false,
    );
    let config = EvolverConfig::new(spec, 1.0, 0.02, 2.0, 3).multithreaded(false);
    let evolver = Evolver::single(config, 1.0, initial, Box::new(potential)).unwrap();
    let mut storage = KeyframeStorage::new();
    assert!(evolver.run_blocking(&mut storage).is_success());

    for frame in storage.frames() {
        let KeyframeContent::WaveFunction(wf) = &frame.content else {
            panic!("single particle runs store wavefunctions");
        };
        let c = wf.centroid();
        assert_abs_diff_eq!(c[0], 12.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c[1], 12.0, epsilon = 1e-6);
        assert_abs_diff_eq!(wf.norm_sq(), 1.0, epsilon = 1e-3);
    }
}
