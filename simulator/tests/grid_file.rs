use num::complex::Complex64;
use wavesim_simulator::marginal::ProbabilityDensity;
use wavesim_simulator::utils::io::{GridFile, GridKind};
use wavesim_simulator::{GridSpec, WaveFunction};

fn sample_wave_function(spec: GridSpec) -> WaveFunction {
    // values chosen to be exactly representable in f32
    let amplitudes = (0..spec.len())
        .map(|i| {
            let re = (i as f32 * 0.37).sin();
            let im = -(i as f32 * 1.3e-3).cos() * 1e-5;
            Complex64::new(re as f64, im as f64)
        })
        .collect();
    WaveFunction::new(spec, 0.25, amplitudes).unwrap()
}

#[test]
fn complex_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    for sizes in [&[7usize, 5][..], &[4, 3, 6][..]] {
        let spec = GridSpec::new(sizes).unwrap();
        let wf = sample_wave_function(spec);
        let path = dir.path().join(format!("psi_{}d.wsg", sizes.len()));

        GridFile::from_wave_function(&wf, "psi")
            .write_path(&path)
            .unwrap();
        let file = GridFile::read_path(&path).unwrap();

        assert_eq!(file.kind, GridKind::Complex);
        assert_eq!(file.spec, spec);
        assert_eq!(file.spacing, 0.25);
        let back = file.to_wave_function().unwrap();
        assert_eq!(back, wf);
    }
}

#[test]
fn amplitude_and_density_round_trip() {
    let spec = GridSpec::new(&[6, 6]).unwrap();
    let wf = sample_wave_function(spec);
    let amplitude = GridFile::amplitude_of(&wf, "abs");
    let mut bytes = Vec::new();
    amplitude.write_to(&mut bytes).unwrap();
    let back = GridFile::read_from(&mut &bytes[..]).unwrap();
    assert_eq!(back, amplitude);
    assert!(back.to_wave_function().is_err());

    let p1 = ProbabilityDensity::new(spec, 0.5, (0..36).map(|i| i as f64 / 64.0).collect()).unwrap();
    let p2 = ProbabilityDensity::new(spec, 0.5, vec![1.0 / 9.0; 36]).unwrap();
    let densities = GridFile::from_densities(&[("particle1", &p1), ("particle2", &p2)]).unwrap();
    let mut bytes = Vec::new();
    densities.write_to(&mut bytes).unwrap();
    let back = GridFile::read_from(&mut &bytes[..]).unwrap();
    assert_eq!(back, densities);
    let second = back.block("particle2").unwrap();
    assert_eq!(second.values[0], (1.0f64 / 9.0) as f32);
}

#[test]
fn mismatched_density_grids_are_rejected() {
    let a = ProbabilityDensity::new(GridSpec::new(&[4, 4]).unwrap(), 1.0, vec![0.0; 16]).unwrap();
    let b = ProbabilityDensity::new(GridSpec::new(&[2, 8]).unwrap(), 1.0, vec![0.0; 16]).unwrap();
    assert!(GridFile::from_densities(&[("a", &a), ("b", &b)]).is_err());
    assert!(GridFile::from_densities(&[]).is_err());
}
