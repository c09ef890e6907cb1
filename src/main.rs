extern crate smaps_analyze;
extern crate simplelog;

#[macro_use]
extern crate log;

use std::env;
use std::process;

use chrono::Utc;
use simplelog::*;

use smaps_analyze::{aggregate, parse, render, Error};

enum Mode {
    Category,
    Flags,
    Dump,
    Rollup,
}

fn main() {
    let (mode, filters, verbose, pid) = match parse_args(env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Usage: smaps_analyze [--mode category|flags|dump|rollup] [--filters FLAG]... [--verbose] [PID]");
            process::exit(2);
        }
    };

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    CombinedLogger::init(vec![TermLogger::new(level, Config::default()).unwrap()]).unwrap();

    let start_time = Utc::now();
    match run(&mode, &filters, &pid) {
        Ok(output) => {
            print!("{}", output);
            info!(
                "---------- Completed analysis in {} ms ----------",
                (Utc::now() - start_time).num_milliseconds()
            );
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn run(mode: &Mode, filters: &[String], pid: &str) -> Result<String, Error> {
    if let Mode::Rollup = mode {
        // the kernel pre-aggregates this one; no per-region pass needed
        let rss = parse::rollup_rss_from_pid(pid)?;
        return Ok(format!("rss={}\n", rss));
    }
    let regions = parse::regions_from_pid(pid)?;
    match mode {
        Mode::Category => Ok(render::category_csv(&aggregate::by_category(&regions))),
        Mode::Flags => Ok(render::flag_lines(&aggregate::by_flags(&regions, filters))),
        Mode::Dump => render::regions_json(&aggregate::sorted_by_size(&regions)),
        Mode::Rollup => unreachable!(),
    }
}

fn parse_args<I>(args: I) -> Result<(Mode, Vec<String>, bool, String), String>
where
    I: Iterator<Item = String>,
{
    let mut mode = Mode::Category;
    let mut filters: Vec<String> = Vec::new();
    let mut verbose = false;
    // "self" is the kernel's name for the calling process
    let mut pid = "self".to_string();

    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args.next().ok_or("--mode needs a value")?;
                mode = match value.as_str() {
                    "category" => Mode::Category,
                    "flags" => Mode::Flags,
                    "dump" => Mode::Dump,
                    "rollup" => Mode::Rollup,
                    other => return Err(format!("unknown mode: {}", other)),
                };
            }
            "--filters" => {
                filters.push(args.next().ok_or("--filters needs a value")?);
            }
            "--verbose" => verbose = true,
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {}", other));
            }
            other => pid = other.to_string(),
        }
    }

    if filters.is_empty() {
        filters = aggregate::DEFAULT_FLAG_FILTERS
            .iter()
            .map(|f| f.to_string())
            .collect();
    }

    Ok((mode, filters, verbose, pid))
}
