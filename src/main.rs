mod cli;

use std::{
    fs,
    io::{self, BufWriter, Read, Write},
    path::Path,
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use neural_network_cli::{
    convert,
    description::Description,
    network::Network,
    params, run,
    stream::VecReader,
    train,
};

use cli::{Cli, Command};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e, &mut io::stderr().lock());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match command {
        Command::New(args) => {
            let text = read_text(args.input.as_deref())?;
            let network = Description::parse(&text)?.build(args.seed)?;
            network
                .save(&args.out)
                .with_context(|| format!("failed to save {}", args.out.display()))?;
        }
        Command::Bidir(args) => {
            let network = Network::bidirectional(
                load(&args.forward)?,
                load(&args.backward)?,
                load(&args.mixer)?,
            )?;
            network.save(&args.out)?;
        }
        Command::Seq2vec(args) => {
            let network = Network::seq_to_vec(load(&args.rnn)?, load(&args.outnet)?)?;
            network.save(&args.out)?;
        }
        Command::Train(args) => {
            let config = args.config()?;
            let mut network = load(&args.net)?;
            let reader = VecReader::open(args.samples.as_deref())?;

            let res = train::train(&mut network, reader, &config);
            if !config.quiet {
                info!("saving network...");
            }
            network
                .save(&args.net)
                .with_context(|| format!("failed to save {}", args.net.display()))?;

            res.context("training interrupted")?;
        }
        Command::Run(args) => {
            let network = load(&args.net)?;
            let records = VecReader::open(args.input.as_deref())?.into_chan();
            run::run(&network, records, &args.config(), &mut out)?;
        }
        Command::Read(args) => {
            let network = load(&args.net)?;
            params::read_params(&network, &mut out)?;
        }
        Command::Write(args) => {
            let mut network = load(&args.net)?;
            let mut reader = VecReader::open(args.input.as_deref())?;
            params::write_params(&mut network, &mut reader)?;
            network.save(&args.net)?;
        }
        Command::Signbit(args) => {
            let records = VecReader::open(args.input.as_deref())?.into_chan();
            convert::signbit(records, &mut out)?;
        }
        Command::Max(args) => {
            let records = VecReader::open(args.input.as_deref())?.into_chan();
            convert::max(records, args.vecsize, args.onehot, &mut out)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Writes the whole error chain, regardless of the log filter.
fn report<W: Write>(e: &anyhow::Error, out: &mut W) {
    let _ = writeln!(out, "error: {e:#}");
}

fn load(path: &Path) -> anyhow::Result<Network> {
    Network::load(path).with_context(|| format!("failed to load network {}", path.display()))
}

fn read_text(path: Option<&Path>) -> anyhow::Result<String> {
    let text = match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    Ok(text)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn reports_the_error_chain() {
        let e = anyhow!("end of unseekable stream").context("training interrupted");
        let mut out = Vec::new();
        report(&e, &mut out);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "error: training interrupted: end of unseekable stream\n"
        );
    }
}
