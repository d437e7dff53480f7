use anyhow::{bail, Context};
use polishkit::{init_logging, validate_program, PipelineConfig, PolishingCore, BUILD_DATE, VERSION};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

const USAGE: &str = "\
Usage: polishkit <model.stl> [options]

Options:
  -o, --output FILE       Write the RAPID module to FILE (default: stdout)
  -c, --config FILE       Load pipeline settings from a .toml or .json file
  -s, --strategy NAME     Rough-stage strategy: adaptive, parallel or spiral
  -u, --force-unit UNIT   Ignore the STL header unit and use UNIT (mm, cm, m, in)
      --allow-partial     Emit a program even if one stage failed to plan
      --no-timestamp      Leave the generation time out of the header
      --report            Print geometry, plan and validation reports as JSON
      --log-json          Emit logs as JSON lines on stderr
  -h, --help              Show this message
  -V, --version           Show version";

#[derive(Debug, Default)]
struct Args {
    model: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    strategy: Option<String>,
    force_unit: Option<String>,
    allow_partial: bool,
    no_timestamp: bool,
    report: bool,
    log_json: bool,
    help: bool,
    version: bool,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = Args::default();
    while let Some(arg) = argv.next() {
        let mut value = |flag: &str| {
            argv.next()
                .with_context(|| format!("{} needs a value", flag))
        };
        match arg.as_str() {
            "-o" | "--output" => args.output = Some(value(&arg)?.into()),
            "-c" | "--config" => args.config = Some(value(&arg)?.into()),
            "-s" | "--strategy" => args.strategy = Some(value(&arg)?),
            "-u" | "--force-unit" => args.force_unit = Some(value(&arg)?),
            "--allow-partial" => args.allow_partial = true,
            "--no-timestamp" => args.no_timestamp = true,
            "--report" => args.report = true,
            "--log-json" => args.log_json = true,
            "-h" | "--help" => args.help = true,
            "-V" | "--version" => args.version = true,
            flag if flag.starts_with('-') => bail!("unknown option {}\n\n{}", flag, USAGE),
            _ if args.model.is_some() => bail!("only one model may be given\n\n{}", USAGE),
            _ => args.model = Some(PathBuf::from(&arg)),
        }
    }
    Ok(args)
}

fn build_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(name) = &args.strategy {
        config = config.with_strategy_name(name)?;
    }
    if let Some(unit) = &args.force_unit {
        config.force_unit = Some(unit.parse()?);
    }
    if !args.no_timestamp && config.timestamp.is_none() {
        config.timestamp = Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if args.version {
        println!("polishkit {} (built {})", VERSION, BUILD_DATE);
        return Ok(());
    }

    init_logging(args.log_json)?;

    let Some(model) = args.model.as_deref() else {
        bail!("no model given\n\n{}", USAGE);
    };

    let config = build_config(&args)?;
    let mut core = PolishingCore::new(&config)?;

    core.load_model(model)
        .with_context(|| format!("loading {}", model.display()))?;

    let geometry = core.analyze()?;
    core.plan()?;
    let summary = core.enrich()?;
    for stage in &summary.stages {
        if let Some(err) = &stage.error {
            warn!("{} stage: {}", stage.stage, err);
        }
    }

    let program = core.generate(args.allow_partial)?;
    let validation = validate_program(program.as_str());
    if !validation.is_valid() {
        for problem in validation.problems() {
            warn!("Generated program: {}", problem);
        }
    }

    match &args.output {
        Some(path) => {
            program
                .save(path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {} lines to {}", program.line_count(), path.display());
        }
        None if !args.report => print!("{}", program),
        None => {}
    }

    if args.report {
        let report = json!({
            "geometry": geometry,
            "plan": summary,
            "validation": validation,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_full_command_line() {
        let parsed = args(&[
            "part.stl",
            "-o",
            "out.mod",
            "--strategy",
            "spiral",
            "--allow-partial",
            "--no-timestamp",
        ])
        .unwrap();
        assert_eq!(parsed.model, Some(PathBuf::from("part.stl")));
        assert_eq!(parsed.output, Some(PathBuf::from("out.mod")));
        assert_eq!(parsed.strategy.as_deref(), Some("spiral"));
        assert!(parsed.allow_partial);
        assert!(parsed.no_timestamp);
        assert!(!parsed.report);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(args(&["--output"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["a.stl", "b.stl"]).is_err());
    }

    #[test]
    fn test_build_config_applies_overrides() {
        let parsed = args(&["part.stl", "-s", "parallel", "-u", "in", "--no-timestamp"]).unwrap();
        let config = build_config(&parsed).unwrap();
        assert_eq!(config.strategy, polishkit::PathStrategy::Parallel);
        assert_eq!(config.force_unit, Some(polishkit::LengthUnit::Inch));
        assert!(config.timestamp.is_none());

        let parsed = args(&["part.stl", "-s", "zigzag"]).unwrap();
        assert!(build_config(&parsed).is_err());
    }

    #[test]
    fn test_every_listed_unit_parses() {
        const FORCE_UNITS: [&str; 4] = ["mm", "cm", "m", "in"];
        assert!(USAGE.contains(&format!("({})", FORCE_UNITS.join(", "))));
        for unit in FORCE_UNITS {
            let parsed = args(&["part.stl", "-u", unit]).unwrap();
            assert!(build_config(&parsed).is_ok(), "unit {} rejected", unit);
        }
        let parsed = args(&["part.stl", "-u", "ft"]).unwrap();
        assert!(build_config(&parsed).is_err());
    }
}
