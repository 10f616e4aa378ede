use crossabi::config::AbiConfig;
use crossabi::consumer::{binding, depth, snapshot, UserProducer};
use crossabi::logging::{self, perf};
use crossabi::{GetUserRequest, GetUserResponse, ProducerKind, Pure, StatusCode};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug)]
struct Args {
    producers: Vec<ProducerKind>,
    request: GetUserRequest,
    shuffle: bool,
    pages: u32,
    default_envelope: bool,
    json: bool,
    config: Option<PathBuf>,
}

impl Args {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let prog = args.first().map(String::as_str).unwrap_or("crossabi-probe");

        let mut parsed = Args {
            producers: Vec::new(),
            request: GetUserRequest::new(1, "probe", false),
            shuffle: false,
            pages: 1,
            default_envelope: false,
            json: false,
            config: None,
        };

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}\n\n{}", name, Self::usage(prog)))
            };
            match arg.as_str() {
                "--help" | "-h" => return Err(Self::usage(prog)),
                "--producer" => {
                    let choice = value("--producer")?;
                    parsed.producers = if choice == "both" {
                        ProducerKind::ALL.to_vec()
                    } else {
                        vec![choice.parse().map_err(|e| format!("{e}"))?]
                    };
                }
                "--user-id" => {
                    parsed.request.user_id = value("--user-id")?
                        .parse()
                        .map_err(|e| format!("Invalid --user-id: {e}"))?;
                }
                "--name" => parsed.request.user_name = value("--name")?,
                "--male" => parsed.request.is_male = true,
                "--shuffle" => parsed.shuffle = true,
                "--pages" => {
                    parsed.pages = value("--pages")?
                        .parse()
                        .map_err(|e| format!("Invalid --pages: {e}"))?;
                }
                "--default" => parsed.default_envelope = true,
                "--json" => parsed.json = true,
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                opt => return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog))),
            }
        }

        Ok(parsed)
    }

    fn usage(prog: &str) -> String {
        format!(
            "crossabi-probe - call the interchange producers and print what comes back\n\n\
            USAGE:\n    {prog} [OPTIONS]\n\n\
            OPTIONS:\n    \
            -h, --help             Print help information\n    \
            --producer <KIND>      owned, raw or both (default: from config)\n    \
            --user-id <N>          Request user id\n    \
            --name <TEXT>          Request user name\n    \
            --male                 Request is_male = true\n    \
            --shuffle              Ask for reversed user order\n    \
            --pages <N>            Number of linked pages\n    \
            --default              Fetch the default envelope instead\n    \
            --json                 Print JSON instead of a summary\n    \
            --config <PATH>        Configuration file (default: discover crossabi.toml)\n\n\
            EXAMPLES:\n    \
            {prog} --producer both --name ann --pages 3\n    \
            {prog} --default --json"
        )
    }
}

#[derive(Debug, Serialize)]
struct Report {
    producer: &'static str,
    status: StatusCode,
    pure: Pure,
    envelopes: usize,
    depth: usize,
    response: GetUserResponse,
}

fn probe(producer: &dyn UserProducer, args: &Args, limit: usize) -> crossabi::AbiResult<Report> {
    let _timer = perf::track("probe");
    let local = args.request.to_local();

    let mut envelope = if args.default_envelope {
        producer.get_default_user()?
    } else if args.pages > 1 {
        producer.get_user_pages(&local, args.shuffle, args.pages)?
    } else {
        producer.get_user(&local, args.shuffle)?
    };

    let response = snapshot(&envelope, limit)?;
    let depth = depth(&envelope, limit)?;
    envelope.mark_consumed()?;

    Ok(Report {
        producer: producer.kind().name(),
        status: producer.probe_status(args.shuffle)?,
        pure: producer.probe_pure(args.shuffle),
        envelopes: response.envelope_count(),
        depth,
        response,
    })
}

fn print_summary(report: &Report) {
    println!(
        "[{}] status={:?} envelopes={} depth={}",
        report.producer, report.status, report.envelopes, report.depth
    );
    let mut page = Some(&report.response);
    let mut index = 0;
    while let Some(current) = page {
        for user in &current.users {
            println!(
                "  page {index}: #{} {:?} male={} extra={}",
                user.user_id,
                user.user_name,
                user.is_male,
                user.extra.as_ref().map_or(0, |extra| extra.len())
            );
        }
        if let Some(keyed) = &current.resp_map {
            for (key, sub) in keyed.iter() {
                println!("  page {index}: keyed {:?} with {} users", key, sub.users.len());
            }
        }
        page = current.resp.as_deref();
        index += 1;
    }
}

fn main() -> ExitCode {
    let args = match Args::from_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let config = match &args.config {
        Some(path) => AbiConfig::load(path),
        None => AbiConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let _guard = logging::init_with_config(config.log_config());
    info!(producer = ?config.producer, limit = config.traversal_depth_limit, "crossabi-probe starting");

    let producers = if args.producers.is_empty() {
        vec![config.producer]
    } else {
        args.producers.clone()
    };

    let mut reports = Vec::with_capacity(producers.len());
    for kind in producers {
        match probe(binding(kind).as_ref(), &args, config.traversal_depth_limit) {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(producer = kind.name(), error = %err, "probe failed");
                eprintln!("{} producer failed: {}", kind.name(), err);
                return ExitCode::FAILURE;
            }
        }
    }

    for report in &reports {
        if args.json {
            match serde_json::to_string_pretty(report) {
                Ok(text) => println!("{text}"),
                Err(err) => {
                    eprintln!("failed to encode report: {err}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            print_summary(report);
        }
    }

    if let [first, rest @ ..] = reports.as_slice() {
        let diverged: Vec<&str> = rest
            .iter()
            .filter(|other| {
                other.response != first.response || other.status != first.status || other.pure != first.pure
            })
            .map(|other| other.producer)
            .collect();
        if !diverged.is_empty() {
            warn!(reference = first.producer, diverged = ?diverged, "producers disagree");
            eprintln!("producers disagree with {}: {}", first.producer, diverged.join(", "));
            return ExitCode::FAILURE;
        }
        if !rest.is_empty() {
            info!("producers agree");
        }
    }

    ExitCode::SUCCESS
}
