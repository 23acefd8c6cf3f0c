// Cross-species integration of two datasets with SAMap

use anyhow::Error;
use clap::{value_parser, Arg, ArgAction, Command};
use cross_species::integrator::DEFAULT_PYTHON;
use cross_species::{run_integration, IntegrationRequest, SamapProcess};
use std::path::PathBuf;

pub fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("samap-integrate")
        .about("Run SAMap integration for two species")
        .arg(
            Arg::new("SPECIES1")
                .help("Abbreviation for the first species (e.g. hs)")
                .long("species1")
                .required(true),
        )
        .arg(
            Arg::new("SPECIES2")
                .help("Abbreviation for the second species (e.g. mm)")
                .long("species2")
                .required(true),
        )
        .arg(
            Arg::new("DATA1")
                .help("Data file of the first species")
                .long("data1")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("DATA2")
                .help("Data file of the second species")
                .long("data2")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("MAPS")
                .help("Directory of BLAST/HMMER homology results")
                .long("maps")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("OUT")
                .help("Where to save the SAMap object (.pkl is appended if missing)")
                .long("out")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("PYTHON")
                .help("Python interpreter with samap installed")
                .long("python")
                .env("SAMAP_PYTHON")
                .default_value(DEFAULT_PYTHON)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("SAVE_PROCESSED")
                .help("Also save the preprocessed inputs as *_pr.h5ad")
                .long("save-processed")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let path = |id: &str| -> PathBuf { matches.get_one::<PathBuf>(id).unwrap().clone() };
    let request = IntegrationRequest {
        species1: matches.get_one::<String>("SPECIES1").unwrap().clone(),
        species2: matches.get_one::<String>("SPECIES2").unwrap().clone(),
        data1: path("DATA1"),
        data2: path("DATA2"),
        maps: path("MAPS"),
        out: path("OUT"),
        save_processed: matches.get_flag("SAVE_PROCESSED"),
    };

    run_integration(&request, &SamapProcess::new(path("PYTHON")))?;
    Ok(())
}
