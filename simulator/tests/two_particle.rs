use approx::assert_abs_diff_eq;
use wavesim_simulator::ics::GaussianPacket;
use wavesim_simulator::watcher::{KeyframeContent, KeyframeStorage};
use wavesim_simulator::{Evolver, EvolverConfig, GridSpec};

fn packet(center: [f64; 3], momentum: [f64; 3]) -> GaussianPacket {
    GaussianPacket {
        center,
        width: [1.5; 3],
        momentum,
    }
}

fn free(_: [f64; 3], _: [f64; 3]) -> f64 {
    0.0
}

#[test]
fn marginals_stay_normalized_2d() {
    let spec = GridSpec::new(&[16, 16]).unwrap();
    let config = EvolverConfig::new(spec, 1.0, 0.01, 0.5, 3);
    let evolver = Evolver::pair(
        config,
        [1.0, 1.0],
        [
            packet([6.0, 8.0, 0.0], [0.3, 0.0, 0.0]),
            packet([10.0, 8.0, 0.0], [-0.3, 0.0, 0.0]),
        ],
        Box::new(free),
    )
    .unwrap();

    let mut storage = KeyframeStorage::new();
    let outcome = evolver.run_blocking(&mut storage);
    assert!(outcome.is_success(), "{outcome}");
    let frames = storage.frames();
    assert_eq!(frames.len(), 3);

    for frame in &frames {
        let KeyframeContent::Pair {
            particle1,
            particle2,
        } = &frame.content
        else {
            panic!("two-particle runs store marginals");
        };
        assert_eq!(particle1.spec(), &spec);
        assert_eq!(particle2.spec(), &spec);
        assert_abs_diff_eq!(particle1.total(), 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(particle2.total(), 1.0, epsilon = 1e-3);
    }

    // Each particle starts around its own packet
    let KeyframeContent::Pair {
        particle1,
        particle2,
    } = &frames[0].content
    else {
        unreachable!()
    };
    assert_abs_diff_eq!(particle1.centroid()[0], 6.0, epsilon = 0.05);
    assert_abs_diff_eq!(particle2.centroid()[0], 10.0, epsilon = 0.05);
    assert_abs_diff_eq!(particle1.centroid()[1], 8.0, epsilon = 0.05);
}

#[test]
fn marginals_stay_normalized_3d() {
    let spec = GridSpec::new(&[8, 8, 8]).unwrap();
    let config = EvolverConfig::new(spec, 1.0, 0.01, 0.1, 2);
    let evolver = Evolver::pair(
        config,
        [1.0, 1.0],
        [
            packet([3.0, 4.0, 4.0], [0.0; 3]),
            packet([4.5, 3.5, 4.0], [0.0; 3]),
        ],
        Box::new(free),
    )
    .unwrap();
    let mut storage = KeyframeStorage::new();
    assert!(evolver.run_blocking(&mut storage).is_success());
    for frame in storage.frames() {
        let KeyframeContent::Pair {
            particle1,
            particle2,
        } = &frame.content
        else {
            panic!("two-particle runs store marginals");
        };
        assert_abs_diff_eq!(particle1.total(), 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(particle2.total(), 1.0, epsilon = 1e-2);
    }
}
