//! svs-inspect: prints the records a dataset declaration produces.

use anyhow::Context;

use svs_dataset::cli::Cli;
use svs_dataset::loader::describe_loader_types;
use svs_dataset::SvsDataset;

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    if cli.list_types {
        print_loader_types();
        return Ok(());
    }
    if cli.data.is_empty() {
        print_usage();
        return Ok(());
    }

    let config = cli.dataset_config().context("loading configuration")?;
    let dataset =
        SvsDataset::new(cli.data.clone(), None, &config).context("building dataset")?;

    println!("{}", dataset);
    println!("{} utterances, mode {}", dataset.len(), config.mode);

    for id in dataset.ids().take(cli.limit()) {
        let (id, record) = dataset
            .get_record(id)
            .with_context(|| format!("loading \"{}\"", id))?;
        println!();
        println!("{}", id);
        for (name, field) in record.iter() {
            println!("  {:<12} {}", name, field.describe());
        }
    }

    Ok(())
}

fn print_loader_types() {
    for (pattern, help) in describe_loader_types() {
        println!("{}", pattern);
        for line in help.lines() {
            println!("    {}", line);
        }
        println!();
    }
}

fn print_usage() {
    eprintln!("svs-inspect: print records of a singing voice dataset");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  svs-inspect --data dump/wav.scp,input,sound --data dump/label,output,duration");
    eprintln!("  svs-inspect --list-types");
    eprintln!();
    eprintln!("Run 'svs-inspect --help' for full options.");
}
