use std::{env, fs, path::PathBuf, process::Command};

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "[utility.cidm]\n"
        + "alpha = 1.0\n"
        + "kappa = 0.8\n"
        + "beta = 0.4\n"
        + "lamda = 0.8\n"
        + "c = 0.6\n"
        + "\n"
        + "[disease]\n"
        + "tau = 6\n"
        + "s = 2.0\n"
        + "gamma = 0.2\n"
        + "mu = 1.5\n"
        + "\n"
        + "[agents]\n"
        + "n_agents = 16\n"
        + "r_sigma = 1.0\n"
        + "r_pi = 1.0\n"
        + "phi = 0.5\n"
        + "psi = 0.5\n"
        + "omega = 0.3\n"
        + "age_range = [ 18, 80,]\n"
        + "n_professions = 2\n"
        + "\n"
        + "[init]\n"
        + "topology = { random = 0.2 }\n"
        + "n_infected = 2\n"
        + "seed = 2024\n"
        + "\n"
        + "[simulation]\n"
        + "order = \"ties_first\"\n"
        + "stable_rounds = 2\n"
        + "assort_attr = \"profession\"\n"
        + "\n"
        + "[output]\n"
        + "rounds_per_file = 40\n"
        + "rounds_per_snapshot = 5\n";

    fs::write(&config_path, config_contents).expect("failed to write config file");

    fn run_bin(args: &[&str]) {
        let bin = PathBuf::from(env!("CARGO_BIN_EXE_tienet"));

        let output = Command::new(bin)
            .args(args)
            .output()
            .expect("failed to execute command");

        let stdout_str =
            std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
        let stderr_str =
            std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

        assert!(
            output.status.success(),
            "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
        );
    }

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "create"]);

    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);
    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "1"]);

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);

    for run_idx in 0..2 {
        let run_dir = test_dir.join(format!("run-{run_idx:04}"));
        assert!(run_dir.join("checkpoint.msgpack").is_file());
        assert!(run_dir.join("trajectory-0000.msgpack").is_file());
        assert!(run_dir.join("trajectory-0001.msgpack").is_file());

        let results = fs::read_to_string(run_dir.join("results.json"))
            .expect("failed to read results file");
        let results: serde_json::Value =
            serde_json::from_str(&results).expect("failed to parse results file");
        assert!(results.as_array().is_some_and(|obs| !obs.is_empty()));
    }

    run_bin(&["--sim-dir", test_dir_str, "clean"]);
    assert!(!test_dir.join("run-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_is_rejected() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("invalid_config");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    fs::write(test_dir.join("config.toml"), "[disease]\ntau = 0\n")
        .expect("failed to write config file");

    let output = Command::new(env!("CARGO_BIN_EXE_tienet"))
        .args(["--sim-dir", test_dir.to_str().expect("invalid path"), "create"])
        .output()
        .expect("failed to execute command");
    assert!(!output.status.success());

    fs::remove_dir_all(&test_dir).ok();
}
