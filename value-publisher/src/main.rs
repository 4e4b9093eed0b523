use std::{env, process::ExitCode, str::FromStr, time::Duration};

use getopts::{Matches, Options};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use value_publisher::{PublisherBuilder, Shutdown};

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {program} [options]");
    print!("{}", opts.usage(&brief));
}

fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("a", "address", "collector address to send samples to (default: 127.0.0.1:8094)", "HOST:PORT");
    opts.optopt("i", "interval-ms", "milliseconds between samples (default: 100)", "INTEGER");
    opts.optopt("t", "timeout-ms", "milliseconds to wait for the socket to become writable (default: 5000)", "INTEGER");
    opts.optopt("p", "progress-every", "number of samples between progress notices (default: 50)", "INTEGER");
    opts.optopt("m", "max-line-length", "maximum encoded line length in bytes (default: 2048)", "INTEGER");
    opts.optopt("n", "count", "stop after publishing this many samples", "INTEGER");
    opts.optopt("", "max-failures", "give up after this many consecutive failed sends", "INTEGER");
    opts.optopt("", "measurement", "measurement name (default: series)", "STRING");
    opts.optmulti("", "tag", "constant tag to attach to every sample (repeatable)", "KEY=VALUE");
    opts.optflag("", "no-hostname", "do not attach the system hostname as a tag");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn parse_opt<T>(matches: &Matches, name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    matches
        .opt_str(name)
        .map(|raw| raw.parse::<T>().map_err(|e| format!("invalid value '{raw}' for --{name}: {e}")))
        .transpose()
}

fn configure(matches: &Matches) -> Result<PublisherBuilder, String> {
    let mut builder = PublisherBuilder::default();

    if let Some(addr) = matches.opt_str("address") {
        builder = builder.with_remote_address(addr).map_err(|e| e.to_string())?;
    }
    if let Some(ms) = parse_opt::<u64>(matches, "interval-ms")? {
        builder = builder.with_sample_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = parse_opt::<u64>(matches, "timeout-ms")? {
        builder = builder.with_write_timeout(Duration::from_millis(ms));
    }
    if let Some(samples) = parse_opt::<u64>(matches, "progress-every")? {
        builder = builder.with_progress_interval(samples);
    }
    if let Some(len) = parse_opt::<usize>(matches, "max-line-length")? {
        builder = builder.with_maximum_line_length(len);
    }
    if let Some(measurement) = matches.opt_str("measurement") {
        builder = builder.with_measurement(measurement);
    }
    for tag in matches.opt_strs("tag") {
        let (key, value) =
            tag.split_once('=').ok_or_else(|| format!("invalid tag '{tag}' (expected KEY=VALUE)"))?;
        builder = builder.with_tag(key, value);
    }

    Ok(builder
        .with_hostname_tag(!matches.opt_present("no-hostname"))
        .with_sample_limit(parse_opt(matches, "count")?)
        .with_max_consecutive_failures(parse_opt(matches, "max-failures")?))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("value-publisher", String::as_str);
    let opts = opts();

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return ExitCode::FAILURE;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return ExitCode::SUCCESS;
    }

    let builder = match configure(&matches) {
        Ok(builder) => builder,
        Err(reason) => {
            error!("{}", reason);
            return ExitCode::FAILURE;
        }
    };

    let publisher = match builder.build() {
        Ok(publisher) => publisher,
        Err(e) => {
            error!(error = %e, "Failed to start publisher.");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handle.request()) {
        error!(error = %e, "Failed to install interrupt handler.");
        return ExitCode::FAILURE;
    }

    match publisher.run(&shutdown) {
        Ok(report) => {
            info!(
                published = report.samples_published,
                dropped = report.samples_dropped,
                bytes_sent = report.bytes_sent,
                "Shutting down."
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Publisher stopped.");
            ExitCode::FAILURE
        }
    }
}
