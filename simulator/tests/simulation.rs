use wavesim_common::{parse_run_text, read_run_parameters, read_toml};
use wavesim_simulator::simulation::Simulation;
use wavesim_simulator::utils::io::{GridFile, GridKind};

fn run_text(output: &str) -> String {
    format!(
        "
Grid Size: 12, 12
Spacing: 1
Mass: 1
Center: 6, 6
Width: 1.5, 1.5
Momentum: 0.2, 0
Damping Width: 2
Damping Factor: 1
Time Step: 0.01
Total Time: 0.1
Frames: 3
Multithreaded: yes
Name: tiny
Output: {output}
Potential: Harmonic omega=0.1
"
    )
}

#[test]
fn single_particle_run_writes_keyframes() {
    let dir = tempfile::tempdir().unwrap();
    let mut parameters = parse_run_text(&run_text(&dir.path().display().to_string())).unwrap();
    parameters.output_npy = true;

    let simulation = Simulation::new_from_params(parameters.clone()).unwrap();
    let saved = simulation.save_parameters().unwrap().unwrap();
    let reloaded = read_toml(saved.to_str().unwrap()).unwrap();
    assert_eq!(reloaded, parameters);

    let mut watchers = simulation.watchers(false).unwrap();
    assert_eq!(watchers.len(), 2);
    let outcome = simulation.run(&mut watchers);
    assert!(outcome.is_success(), "{outcome}");

    let run_dir = dir.path().join("tiny");
    for index in 0..3 {
        let file = GridFile::read_path(run_dir.join(format!("tiny_{index:05}.wsg"))).unwrap();
        assert_eq!(file.kind, GridKind::Complex);
        assert_eq!(file.spec.shape(), &[12, 12]);
        let wf = file.to_wave_function().unwrap();
        approx::assert_abs_diff_eq!(wf.norm_sq(), 1.0, epsilon = 1e-2);
        assert!(run_dir
            .join(format!("tiny_{index:05}_density.npy"))
            .exists());
    }
    assert!(!run_dir.join("tiny_00003.wsg").exists());
}

#[test]
fn two_particle_run_writes_both_marginals() {
    let dir = tempfile::tempdir().unwrap();
    let text = format!(
        "{}
Mass 2: 1
Center 2: 8, 6
Width 2: 1.5, 1.5
",
        run_text(&dir.path().display().to_string())
    );
    let path = dir.path().join("pair.txt");
    std::fs::write(&path, text).unwrap();
    let parameters = read_run_parameters(path.to_str().unwrap()).unwrap();
    assert!(parameters.is_two_particle());

    let simulation = Simulation::new_from_params(parameters).unwrap();
    let mut watchers = simulation.watchers(false).unwrap();
    assert!(simulation.run(&mut watchers).is_success());

    let file = GridFile::read_path(dir.path().join("tiny").join("tiny_00002.wsg")).unwrap();
    assert_eq!(file.kind, GridKind::Density);
    let names: Vec<&str> = file.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["particle1", "particle2"]);
    for block in &file.blocks {
        let total: f64 = block.values.iter().map(|&v| v as f64).sum();
        approx::assert_abs_diff_eq!(total, 1.0, epsilon = 1e-2);
    }
}

#[test]
fn invalid_parameters_are_reported_before_running() {
    let mut parameters = parse_run_text(&run_text("unused")).unwrap();
    parameters.dt = -1.0;
    assert!(Simulation::new_from_params(parameters).is_err());
}
