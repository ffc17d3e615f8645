use std::{fs, io::Cursor, num::NonZeroUsize, path::Path};

use neural_network_cli::{
    CliErr,
    config::{LossFnConfig, RunConfig, StopConfig, TrainConfig},
    description::Description,
    network::Network,
    params::{read_params, write_params},
    run::run,
    stream::{Input, VecReader},
    train::train,
};
use tempfile::TempDir;

fn build(text: &str, seed: u64) -> Network {
    Description::parse(text).unwrap().build(Some(seed)).unwrap()
}

fn run_text(net: &Network, input: &str, config: &RunConfig) -> Vec<String> {
    let mut out = Vec::new();
    let records = VecReader::from_text(input).into_chan();
    run(net, records, config, &mut out).unwrap();

    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn outputs(lines: &[String]) -> Vec<f32> {
    lines
        .iter()
        .flat_map(|l| l.split_whitespace().map(|x| x.parse::<f32>().unwrap()))
        .collect()
}

fn single(batch: usize) -> RunConfig {
    RunConfig {
        batch: NonZeroUsize::new(batch).unwrap(),
        persistent: false,
    }
}

const LINEAR: &str = r#"{"feed_forward": {"layers": [{"dense": {"dim": [3, 1]}}]}}"#;

const RNN: &str = r#"{"recurrent": {"cells": [
    {"lstm": {"dim": [2, 3]}},
    {"vanilla": {"dim": [3, 2], "act_fn": "tanh"}}
]}}"#;

#[test]
fn written_parameters_drive_the_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("net.json");
    build(LINEAR, 1).save(&path).unwrap();

    let mut net = Network::load(&path).unwrap();
    write_params(&mut net, &mut VecReader::from_text("1 1 0 0\n")).unwrap();
    net.save(&path).unwrap();

    let net = Network::load(&path).unwrap();
    assert_eq!(run_text(&net, "1 1 0\n", &single(1)), ["2"]);

    let mut out = Vec::new();
    read_params(&net, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().trim_end().split(' ').count(), 4);
}

#[test]
fn short_parameter_lines_are_rejected() {
    let mut net = build(LINEAR, 1);
    let res = write_params(&mut net, &mut VecReader::from_text("1 1 0\n"));
    assert!(matches!(res, Err(CliErr::BadLength { len: 3, chunk: 4, .. })));
}

#[test]
fn persistent_runs_reset_on_blank_lines() {
    let net = build(RNN, 3);
    let config = RunConfig {
        batch: NonZeroUsize::MIN,
        persistent: true,
    };

    let lines = run_text(&net, "1 2\n3 4\n\n1 2\n", &config);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], lines[2]);
    assert_ne!(lines[0], lines[1]);
}

#[test]
fn persistent_runs_need_a_recurrent_network() {
    let net = build(LINEAR, 1);
    let config = RunConfig {
        batch: NonZeroUsize::MIN,
        persistent: true,
    };

    let records = VecReader::from_text("1 2 3\n").into_chan();
    let res = run(&net, records, &config, &mut Vec::new());
    assert!(matches!(res, Err(CliErr::Config(_))));
}

#[test]
fn batching_does_not_change_sequence_outputs() {
    let net = build(RNN, 5);
    let input = "1 2 3 4 5 6\n-1 0\n0.5 0.5 1 1\n2 2 2 2 2 2 2 2\n";

    let one = outputs(&run_text(&net, input, &single(1)));
    let many = outputs(&run_text(&net, input, &single(3)));
    assert_eq!(one.len(), many.len());
    for (a, b) in one.iter().zip(&many) {
        assert!((a - b).abs() < 1e-5, "{a} != {b}");
    }
}

#[test]
fn bidirectional_networks_are_composed_from_files() {
    let dir = TempDir::new().unwrap();
    let save = |name: &str, text: &str| {
        let path = dir.path().join(name);
        build(text, 7).save(&path).unwrap();
        Network::load(&path).unwrap()
    };

    let rnn = r#"{"recurrent": {"cells": [{"vanilla": {"dim": [2, 2], "act_fn": "tanh"}}]}}"#;
    let narrow = r#"{"feed_forward": {"layers": [{"dense": {"dim": [3, 1]}}]}}"#;
    let wide = r#"{"feed_forward": {"layers": [{"dense": {"dim": [4, 1]}}]}}"#;

    let res = Network::bidirectional(save("f", rnn), save("b", rnn), save("m", narrow));
    assert!(matches!(res, Err(CliErr::TypeMismatch { .. })));

    let net = Network::bidirectional(save("f", rnn), save("b", rnn), save("m", wide)).unwrap();
    let path = dir.path().join("bidir.json");
    net.save(&path).unwrap();

    let net = Network::load(&path).unwrap();
    let lines = run_text(&net, "1 2 3 4 5 6\n", &single(1));
    assert_eq!(outputs(&lines).len(), 3);
}

fn linear_error(net: &Network) -> f32 {
    let out = outputs(&run_text(net, "1\n-2\n", &single(2)));
    (out[0] - 2.).abs() + (out[1] + 4.).abs()
}

#[test]
fn training_fits_a_linear_map() {
    let dir = TempDir::new().unwrap();
    let samples = dir.path().join("samples.txt");
    fs::write(&samples, "1\n2\n-1\n-2\n0.5\n1\n-0.5\n-1\n").unwrap();

    let mut net = build(r#"{"feed_forward": {"layers": [{"dense": {"dim": [1, 1]}}]}}"#, 11);
    write_params(&mut net, &mut VecReader::from_text("0.1 0.3\n")).unwrap();
    let before = linear_error(&net);

    let config = TrainConfig {
        step: 0.05,
        loss: LossFnConfig::Mse,
        stop: StopConfig {
            samples: 2000,
            ..StopConfig::default()
        },
        quiet: true,
        ..TrainConfig::default()
    };

    let reader = VecReader::open(Some(Path::new(&samples))).unwrap();
    let processed = train(&mut net, reader, &config).unwrap();

    assert!(processed > 2000);
    let after = linear_error(&net);
    assert!(after < before / 10., "error went from {before} to {after}");
    assert!(after < 0.05);
}

#[test]
fn training_on_a_finite_stream_stops_at_its_end() {
    let mut net = build(r#"{"feed_forward": {"layers": [{"dense": {"dim": [1, 1]}}]}}"#, 11);
    let config = TrainConfig {
        batch: NonZeroUsize::new(3).unwrap(),
        loss: LossFnConfig::Mse,
        quiet: true,
        ..TrainConfig::default()
    };

    let text = "1\n2\n-1\n-2\n0.5\n1\n-0.5\n-1\n";
    let reader = VecReader::new(Input::Pipe(Box::new(Cursor::new(text))));
    assert_eq!(train(&mut net, reader, &config).unwrap(), 4);
}

#[test]
fn training_reports_malformed_samples() {
    let mut net = build(r#"{"feed_forward": {"layers": [{"dense": {"dim": [1, 1]}}]}}"#, 11);
    let config = TrainConfig {
        loss: LossFnConfig::Mse,
        quiet: true,
        ..TrainConfig::default()
    };

    let reader = VecReader::from_text("1\n2\nx\n1\n");
    assert!(matches!(
        train(&mut net, reader, &config),
        Err(CliErr::MalformedLine { .. })
    ));
}

fn train_until(net: &mut Network, dir: &TempDir, samples: &str, limit: usize) -> usize {
    let path = dir.path().join("samples.txt");
    fs::write(&path, samples).unwrap();

    let config = TrainConfig {
        step: 0.01,
        loss: LossFnConfig::Mse,
        stop: StopConfig {
            samples: limit,
            ..StopConfig::default()
        },
        quiet: true,
        ..TrainConfig::default()
    };

    let reader = VecReader::open(Some(path.as_path())).unwrap();
    train(net, reader, &config).unwrap()
}

#[test]
fn sequence_to_vector_networks_train_on_whole_outputs() {
    let dir = TempDir::new().unwrap();
    let rnn = build(
        r#"{"recurrent": {"cells": [{"vanilla": {"dim": [1, 3], "act_fn": "tanh"}}]}}"#,
        13,
    );
    let out = build(r#"{"feed_forward": {"layers": [{"dense": {"dim": [3, 1]}}]}}"#, 14);
    let mut net = Network::seq_to_vec(rnn, out).unwrap();
    let before = net.params().to_vec();

    let processed = train_until(&mut net, &dir, "1 2 3\n0.5\n-1 -1\n-0.5\n", 200);

    assert!(processed > 200);
    assert_ne!(net.params(), before);
    assert!(net.params().iter().all(|p| p.is_finite()));

    let lines = run_text(&net, "1 2 3\n-1\n", &single(2));
    assert_eq!(outputs(&lines).len(), 2);
}

#[test]
fn bidirectional_networks_train_per_step() {
    let dir = TempDir::new().unwrap();
    let rnn = r#"{"recurrent": {"cells": [{"vanilla": {"dim": [1, 2], "act_fn": "tanh"}}]}}"#;
    let mixer = build(r#"{"feed_forward": {"layers": [{"dense": {"dim": [4, 1]}}]}}"#, 17);
    let mut net = Network::bidirectional(build(rnn, 15), build(rnn, 16), mixer).unwrap();
    let before = net.params().to_vec();

    let processed = train_until(&mut net, &dir, "1 2 3\n0 1 0\n-1 0\n1 -1\n", 200);

    assert!(processed > 200);
    assert_ne!(net.params(), before);
    assert!(net.params().iter().all(|p| p.is_finite()));

    // A per-step output can't feed a sequence-to-vector network.
    let mut net = Network::seq_to_vec(
        build(rnn, 15),
        build(r#"{"feed_forward": {"layers": [{"dense": {"dim": [2, 1]}}]}}"#, 18),
    )
    .unwrap();
    let path = dir.path().join("per_step.txt");
    fs::write(&path, "1 2 3\n0 1 0\n").unwrap();
    let config = TrainConfig {
        quiet: true,
        loss: LossFnConfig::Mse,
        ..TrainConfig::default()
    };
    let reader = VecReader::open(Some(path.as_path())).unwrap();
    assert!(matches!(
        train(&mut net, reader, &config),
        Err(CliErr::BadLength { len: 3, chunk: 1, .. })
    ));
}
