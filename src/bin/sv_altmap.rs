//! ## sv_altmap ##
//! ---------------
//! Takes long reads which align into regions of interest and shows for each of them
//! where else in the genome parts of the read align according to LAST.
//! Each alternative mapping is drawn as an arrow along the read, its height given by
//! the (log) alignment score and its color by the chromosome it maps to.
//! Reverse alignments are drawn below the axis and mirrored, reading from right to left.

use clap::{app_from_crate,crate_name,crate_description,crate_authors,crate_version,Arg};
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::process;
extern crate pretty_env_logger;
#[macro_use] extern crate log;

// our library which is within the same project
extern crate altmapping;
use altmapping::lib::common::{*};
use altmapping::lib::hts_lib_based::{*};
use altmapping::lib::last_based::{*};
use altmapping::lib::layout::{*};
use altmapping::lib::plotting::{*};


fn parse_number<T: std::str::FromStr>(
    matches: &clap::ArgMatches,
    name: &str
) -> Result<T, AltMapError> {
    let value = matches.value_of(name).unwrap_or_default();
    value
        .parse::<T>()
        .map_err(|_| AltMapError::Config(format!("could not parse {:?} for option {}", value, name)))
}

fn run(
    matches: &clap::ArgMatches,
    args_string: &str
) -> Result<(), AltMapError> {
    ////////////////////////
    ////  prep options  ////
    ////////////////////////
    // we can just unwrap as mandatory arguments
    let bam_file    = matches.value_of("BAM").unwrap_or_default();
    let last_file   = matches.value_of("LAST").unwrap_or_default();
    let region_file = matches.value_of("REG").unwrap_or_default();
    check_input_files(bam_file, region_file, last_file)?;

    let config = AltPlotConfig::new(
        parse_number::<u32>(matches, "QUAL")?,
        parse_number::<usize>(matches, "NRAL")?,
        matches.value_of("RANKING").unwrap_or("descending").parse::<RankingPolicy>()?,
        matches.value_of("SCALE").unwrap_or("log").parse::<ScoreScale>()?,
    )?;
    let threads: usize = parse_number(matches, "THREAD")?;
    let predicate = ReadNamePredicate::new(matches.value_of("SUFFIX"), matches.value_of("PREFIX"));
    let out_dir = Path::new(matches.value_of("OUT").unwrap_or("."));
    fs::create_dir_all(out_dir)?;
    debug!("Configuration: {:?}, name filter: {:?}", &config, &predicate);

    /////////////////////////////
    ////  candidate reads    ////
    /////////////////////////////
    // the BAM and BED handles are closed once we got the names
    let candidates = gather_candidate_reads(bam_file, region_file, &predicate, threads)?;
    if candidates.is_empty() {
        warn!("no read in the regions of interest passed the name filter");
    }

    /////////////////////////////
    ////  LAST alternatives  ////
    /////////////////////////////
    let (collection, stats) = collect_alt_mappings(
        LastReader::from_path(last_file)?,
        &candidates,
        config.quality_threshold
    )?;
    info!(
        "LAST: {} alignments parsed, {} kept, {} discarded, {} malformed",
        stats.parsed, stats.kept, stats.discarded, stats.malformed
    );

    //////////////////////////
    ////  layout + output ////
    //////////////////////////
    let layouts = layout_collection(&collection, &config);
    if let Err(err) = write_ranked_tsv_stdout(
        &layouts,
        &VersionInfo {
            program: "sv_altmap",
            version: crate_version!(),
            author: crate_authors!(),
            command: args_string,
        },
    ) {
        return Err(AltMapError::Io(io::Error::new(io::ErrorKind::Other, err.to_string())));
    }
    let written = render_layouts(&layouts, config.score_scale, out_dir, threads)?;
    info!("{} plots written to {}", written.len(), out_dir.display());
    Ok(())
}

fn main() {
    pretty_env_logger::init();

    // now the next is not really for any argument
    // parsing but simply to get the command which
    // was used to execute as I cant get this from clap
    let args: Vec<String> = env::args().collect();
    let args_string = args.join(" ");
    let matches = app_from_crate!()
    .about("
Plots for reads supporting a structural variant all alternative mappings found by LAST. \
Reads are selected from a BAM file if they overlap one of the regions in the BED file \
and their name matches the suffix or prefix filter. \
Each read results in one SVG file named after the read.
    ")
    .arg(Arg::with_name("BAM")
            .short("b")
            .long("bam")
            .value_name("FILE")
            .help("indexed BAM file with the long read alignments")
            .takes_value(true)
            .required(true))
    .arg(Arg::with_name("LAST")
            .short("l")
            .long("last")
            .value_name("FILE")
            .help("LAST alignments of the same reads in MAF format")
            .takes_value(true)
            .required(true))
    .arg(Arg::with_name("REG")
            .short("r")
            .long("reg")
            .value_name("FILE")
            .help("regions of interest in BED format")
            .takes_value(true)
            .required(true))
    .arg(Arg::with_name("QUAL")
            .short("q")
            .long("qual")
            .value_name("int")
            .help("minimum LAST score of an alternative mapping")
            .takes_value(true)
            .default_value("300"))
    .arg(Arg::with_name("NRAL")
            .short("n")
            .long("nral")
            .value_name("int")
            .help("number of best alternative mappings displayed per read")
            .takes_value(true)
            .default_value("15"))
    .arg(Arg::with_name("SUFFIX")
            .short("s")
            .long("suffix")
            .value_name("STR")
            .help("accept reads whose name ends with this, e.g. nanopore 2D reads")
            .takes_value(true)
            .default_value("2d"))
    .arg(Arg::with_name("PREFIX")
            .short("p")
            .long("prefix")
            .value_name("STR")
            .help("accept as well reads whose name starts with this, e.g. \"ctg\" for contigs")
            .takes_value(true))
    .arg(Arg::with_name("SCALE")
            .short("y")
            .long("scale")
            .value_name("STR")
            .help("vertical scale of the score")
            .takes_value(true)
            .possible_values(&["log", "linear"])
            .default_value("log"))
    .arg(Arg::with_name("RANKING")
            .short("k")
            .long("ranking")
            .value_name("STR")
            .help("how the best mappings are picked, decides which of equally scored mappings is kept")
            .takes_value(true)
            .possible_values(&["descending", "ascending"])
            .default_value("descending"))
    .arg(Arg::with_name("OUT")
            .short("o")
            .long("out")
            .value_name("DIR")
            .help("directory for the plots")
            .takes_value(true)
            .default_value("."))
    .arg(Arg::with_name("THREAD")
            .short("t")
            .long("threads")
            .value_name("int")
            .help("number of threads for reading BAM and plotting")
            .takes_value(true)
            .default_value("1"))
    .get_matches();

    if let Err(err) = run(&matches, &args_string) {
        eprintln!("{}", err);
        process::exit(err.exit_code());
    }
    println!("DONE");
}
