use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use log::{info, warn};
use std::path::Path;

use evil_twin_detector::{
    Config,
    pipeline::{self, EvilTwinReport},
    server,
};

fn session_arg() -> Arg {
    Arg::new("session")
        .value_name("SESSION")
        .help("Capture session identifier; files are looked up as <SESSION>.* in the captures directory")
        .required(true)
}

fn cli() -> Command {
    Command::new("evil-twin-detector")
        .version("0.1.0")
        .author("itsbryanman <dev@piranhaswarm.com>")
        .about("Detects evil twin access points from 802.11 capture sessions")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/default.json")
                .global(true)
        )
        .arg(
            Arg::new("log-level")
                .short('L')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter, e.g. `info` or `info,evil_twin_detector=debug`")
                .global(true)
        )
        .subcommand(
            Command::new("normalize")
                .about("Strip the station section from <SESSION>_airodump.csv")
                .arg(session_arg())
        )
        .subcommand(
            Command::new("flatten")
                .about("Flatten <SESSION>.json into the <SESSION>.csv frame table")
                .arg(session_arg())
        )
        .subcommand(
            Command::new("detect")
                .about("Classify the session's BSSIDs and write the evil twin report")
                .arg(session_arg())
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the last written evil twin report over HTTP")
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.json");

    if Path::new(config_path).exists() {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load configuration from {}", config_path))
    } else {
        Ok(Config::default())
    }
}

fn session(matches: &ArgMatches) -> anyhow::Result<&str> {
    matches
        .get_one::<String>("session")
        .map(String::as_str)
        .context("missing session identifier")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    let level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.logging.level.clone());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match matches.subcommand() {
        Some(("normalize", sub_matches)) => run_normalize(&config, session(sub_matches)?)?,
        Some(("flatten", sub_matches)) => run_flatten(&config, session(sub_matches)?)?,
        Some(("detect", sub_matches)) => run_detect(&config, session(sub_matches)?)?,
        Some(("serve", _)) => {
            server::serve(&config.server, config.report_path())
                .await
                .context("report server stopped")?;
        }
        _ => {
            eprintln!("No subcommand provided. Use --help for usage information.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run_normalize(config: &Config, session: &str) -> anyhow::Result<()> {
    info!("Normalizing directory export for session {}", session);
    let summary = pipeline::normalize_session(config, session)?;

    println!("Access points kept: {}", summary.retained);
    println!("Station rows dropped: {}", summary.dropped);
    if !summary.marker_found {
        println!("No station section found; export left complete");
    }
    Ok(())
}

fn run_flatten(config: &Config, session: &str) -> anyhow::Result<()> {
    info!("Flattening capture export for session {}", session);
    let summary = pipeline::flatten_session(config, session)?;

    println!("Capture records: {}", summary.records);
    println!("Frames written: {}", summary.frames);
    if summary.dropped > 0 {
        println!("Records dropped: {}", summary.dropped);
    }
    Ok(())
}

fn run_detect(config: &Config, session: &str) -> anyhow::Result<()> {
    info!("Running evil twin detection for session {}", session);
    let report = pipeline::run_session(config, session);
    print_report(&report);

    let output_file = config.report_path();
    report
        .write(&output_file)
        .with_context(|| format!("failed to write report to {}", output_file.display()))?;
    println!("\nOutput written to {}", output_file.display());

    if let Some(error) = report.error() {
        warn!("Report for session {} records a failure", session);
        anyhow::bail!("{}", error);
    }
    Ok(())
}

fn print_report(report: &EvilTwinReport) {
    let detection = match report {
        EvilTwinReport::Completed(detection) => detection,
        EvilTwinReport::Failed { error } => {
            println!("\nDetection failed: {}", error);
            return;
        }
    };

    if detection.has_evil_twins() {
        println!("\n=== EVIL TWIN INSTANCES ===");
        for entry in detection.evil_twins() {
            println!("BSSID: {} | SSID: {}", entry.bssid, entry.ssid);
        }
    } else {
        println!("\nThere is NO Evil Twin in the Search.");
    }

    println!("\n--- Normal BSSIDs ---");
    for entry in detection.normal() {
        println!("BSSID: {} | SSID: {}", entry.bssid, entry.ssid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evil_twin_detector::DetectorError;
    use serde_json::Value;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_session_commands_take_one_argument() {
        assert!(cli().try_get_matches_from(["evil-twin-detector", "detect", "s1"]).is_ok());
        assert!(cli().try_get_matches_from(["evil-twin-detector", "detect"]).is_err());
        assert!(cli().try_get_matches_from(["evil-twin-detector", "flatten", "s1", "s2"]).is_err());
        assert!(cli().try_get_matches_from(["evil-twin-detector", "normalize", "-c", "x.json", "s1"]).is_ok());
    }

    #[test]
    fn test_detect_writes_error_report_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_captures_dir(dir.path().join("captures"));

        assert!(run_detect(&config, "absent").is_err());

        let written = std::fs::read_to_string(config.report_path()).unwrap();
        let report: Value = serde_json::from_str(&written).unwrap();
        let object = report.as_object().unwrap();
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["error"]);
        assert!(!object["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_missing_inputs_fail_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_captures_dir(dir.path());

        let err = run_normalize(&config, "absent").unwrap_err();
        assert!(matches!(err.downcast_ref::<DetectorError>(), Some(DetectorError::NotFound(_))));
        assert!(err.to_string().contains("absent_airodump.csv"));

        let err = run_flatten(&config, "absent").unwrap_err();
        assert!(matches!(err.downcast_ref::<DetectorError>(), Some(DetectorError::NotFound(_))));
        assert!(err.to_string().contains("absent.json"));
    }
}
