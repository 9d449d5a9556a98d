use std::io::{BufWriter, Write};

use arrrg::CommandLine;

use guacamole::Guacamole;

use skewgen::DistinctValueOptions;

const USAGE: &str = "Usage: skewgen [--pool-options] [--mode pool|next|ranges] [--number N]";

////////////////////////////////////////// SkewgenOptions //////////////////////////////////////////

#[derive(Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct SkewgenOptions {
    #[arrrg(nested)]
    pool: DistinctValueOptions,
    #[arrrg(optional, "What to print: pool, next, or ranges.", "MODE")]
    mode: String,
    #[arrrg(optional, "Number of values or ranges to print.", "N")]
    number: u64,
    #[arrrg(optional, "Seed for selecting values and ranges.", "SEED")]
    seed: u64,
}

impl Default for SkewgenOptions {
    fn default() -> Self {
        Self {
            pool: DistinctValueOptions::default(),
            mode: "next".to_string(),
            number: 1_000,
            seed: 0,
        }
    }
}

/////////////////////////////////////////////// main ///////////////////////////////////////////////

fn main() {
    let (options, free) = SkewgenOptions::from_command_line(USAGE);
    if !free.is_empty() {
        eprintln!("free arguments are not accepted");
        std::process::exit(1);
    }
    let dvg = match options.pool.try_build() {
        Ok(dvg) => dvg,
        Err(err) => {
            eprintln!("invalid pool options: {}", err);
            std::process::exit(1);
        }
    };
    let mut guac = Guacamole::new(options.seed);
    let mut fout = BufWriter::new(std::io::stdout());
    let result = match options.mode.as_str() {
        "pool" => dvg
            .values()
            .iter()
            .try_for_each(|v| writeln!(fout, "{}", String::from_utf8_lossy(v))),
        "next" => (0..options.number).try_for_each(|_| {
            writeln!(fout, "{}", String::from_utf8_lossy(dvg.next(&mut guac)))
        }),
        "ranges" => (0..options.number).try_for_each(|_| {
            let (low, high) = dvg.get_indices(&mut guac);
            writeln!(
                fout,
                "{} {} {:?} {:?}",
                low,
                high,
                String::from_utf8_lossy(&dvg.values()[low]),
                String::from_utf8_lossy(&dvg.values()[high])
            )
        }),
        _ => {
            eprintln!("unknown mode {}", options.mode);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };
    if let Err(err) = result.and_then(|_| fout.flush()) {
        eprintln!("could not write output: {}", err);
        std::process::exit(1);
    }
}
