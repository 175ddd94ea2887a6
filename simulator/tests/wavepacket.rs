use approx::assert_abs_diff_eq;
use wavesim_simulator::ics::{create_gaussian_wave_packet, GaussianPacket};
use wavesim_simulator::GridSpec;

#[test]
fn gaussian_packets_are_normalized() {
    let cases: [(&[usize], f64, [f64; 3], [f64; 3], [f64; 3]); 5] = [
        (&[32, 32], 1.0, [16.0, 16.0, 0.0], [3.0, 3.0, 1.0], [0.5, 0.0, 0.0]),
        (&[16, 24], 0.5, [4.0, 6.0, 0.0], [0.4, 1.5, 1.0], [-2.0, 3.0, 0.0]),
        (&[10, 10, 10], 0.2, [1.0, 1.0, 1.0], [0.3, 0.3, 0.3], [0.0, 0.0, 8.0]),
        (&[8, 8], 1.0, [0.0, 0.0, 0.0], [0.2, 0.2, 1.0], [0.0, 0.0, 0.0]),
        (&[12, 7, 5], 2.0, [30.0, 2.0, 4.0], [9.0, 10.0, 3.0], [1.0, 1.0, 1.0]),
    ];
    for (sizes, spacing, center, width, momentum) in cases {
        let spec = GridSpec::new(sizes).unwrap();
        let packet = GaussianPacket {
            center,
            width,
            momentum,
        };
        let wf = create_gaussian_wave_packet(&spec, spacing, &packet, [0; 3]).unwrap();
        assert_abs_diff_eq!(wf.norm_sq(), 1.0, epsilon = 1e-4);
        assert_eq!(wf.spec(), &spec);
    }
}

#[test]
fn relative_origin_recenters_packet() {
    let spec = GridSpec::new(&[8, 8]).unwrap().relative();
    let packet = GaussianPacket {
        center: [-2.0, 0.0, 0.0],
        width: [1.0, 1.0, 1.0],
        momentum: [0.0; 3],
    };
    let wf = create_gaussian_wave_packet(&spec, 1.0, &packet, [7, 7, 0]).unwrap();
    assert_abs_diff_eq!(wf.norm_sq(), 1.0, epsilon = 1e-4);
    let centroid = wf.centroid();
    assert_abs_diff_eq!(centroid[0], 5.0, epsilon = 1e-6);
    assert_abs_diff_eq!(centroid[1], 7.0, epsilon = 1e-6);
}

#[test]
fn packet_outside_the_grid_is_rejected() {
    let spec = GridSpec::new(&[8, 8]).unwrap();
    let packet = GaussianPacket {
        center: [1e4, 1e4, 0.0],
        width: [0.1, 0.1, 1.0],
        momentum: [0.0; 3],
    };
    assert!(create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).is_err());
}
