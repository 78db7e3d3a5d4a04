use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

mod raytracer;

use raytracer::config::{SchedulerConfig, WorkerConfig};
use raytracer::{scheduler, worker};

const USAGE: &str = "usage:
  prism-render scheduler [--port N] [--workers N] [--size WxH] [--grain XxY]
                         [--scene FILE] [--output FILE] [--secret S]
  prism-render worker    [--host HOST] [--port N] [--secret S]";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("scheduler") => parse_scheduler(&args[1..]).map(|config| {
            scheduler::run(&config).map_err(|e| e.to_string())
        }),
        Some("worker") => parse_worker(&args[1..]).map(|config| {
            worker::run(&config)
                .map(|summary| {
                    info!(
                        "Worker {} done: {} cells, {} pixels ({} failed), {} rays handed off, {} received, {} polls",
                        summary.worker_id,
                        summary.control.cells,
                        summary.render.pixels,
                        summary.render.failures,
                        summary.render.handoffs,
                        summary.control.continuations,
                        summary.control.polls
                    )
                })
                .map_err(|e| e.to_string())
        }),
        _ => Err(USAGE.to_string()),
    };

    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        Err(usage) => {
            eprintln!("{}", usage);
            ExitCode::from(2)
        }
    }
}

fn parse_scheduler(args: &[String]) -> Result<SchedulerConfig, String> {
    let mut config = SchedulerConfig::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .map(String::as_str)
                .ok_or_else(|| format!("{} needs a value\n{}", flag, USAGE))
        };
        match flag.as_str() {
            "--port" => config.port = parse_number(value()?)?,
            "--workers" => config.workers = parse_number(value()?)?,
            "--size" => (config.width, config.height) = parse_pair(value()?)?,
            "--grain" => (config.grain_x, config.grain_y) = parse_pair(value()?)?,
            "--scene" => config.scene = PathBuf::from(value()?),
            "--output" => config.output = PathBuf::from(value()?),
            "--secret" => config.secret = value()?.to_string(),
            other => return Err(format!("unknown flag {}\n{}", other, USAGE)),
        }
    }
    if config.workers == 0 {
        return Err("--workers must be at least 1".to_string());
    }
    Ok(config)
}

fn parse_worker(args: &[String]) -> Result<WorkerConfig, String> {
    let mut config = WorkerConfig::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .map(String::as_str)
                .ok_or_else(|| format!("{} needs a value\n{}", flag, USAGE))
        };
        match flag.as_str() {
            "--host" => config.host = value()?.to_string(),
            "--port" => config.port = parse_number(value()?)?,
            "--secret" => config.secret = value()?.to_string(),
            other => return Err(format!("unknown flag {}\n{}", other, USAGE)),
        }
    }
    Ok(config)
}

fn parse_number<T: std::str::FromStr>(s: &str) -> Result<T, String> {
    s.parse().map_err(|_| format!("'{}' is not a valid number", s))
}

/// Parses `WxH`.
fn parse_pair(s: &str) -> Result<(u32, u32), String> {
    let (a, b) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{}' should look like 640x480", s))?;
    Ok((parse_number(a)?, parse_number(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scheduler_flags() {
        let config = parse_scheduler(&args(&[
            "--workers", "4", "--size", "640x480", "--grain", "32X16", "--scene", "a.json",
        ]))
        .unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!((config.grain_x, config.grain_y), (32, 16));
        assert_eq!(config.scene, PathBuf::from("a.json"));
        assert_eq!(config.port, raytracer::config::DEFAULT_PORT);
    }

    #[test]
    fn test_bad_flags() {
        assert!(parse_scheduler(&args(&["--size", "640"])).is_err());
        assert!(parse_scheduler(&args(&["--workers"])).is_err());
        assert!(parse_scheduler(&args(&["--workers", "0"])).is_err());
        assert!(parse_worker(&args(&["--fast"])).is_err());
    }

    #[test]
    fn test_worker_flags() {
        let config = parse_worker(&args(&["--host", "render-01", "--port", "5000"])).unwrap();
        assert_eq!(config.address(), "render-01:5000");
        assert_eq!(config.secret, raytracer::config::DEFAULT_SECRET);
    }
}
