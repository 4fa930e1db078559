use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::SubscriberBuilder;

pub fn setup_logging(verbose_level: u8, to_stdout: bool) {
    setup_logging_with_file(verbose_level, to_stdout, None);
}

/// Log to a file so an embedding application keeps its terminal clean
pub fn setup_logging_to_file(verbose_level: u8, log_file_path: impl Into<PathBuf>) {
    let log_file_path = log_file_path.into();
    if let Some(parent) = log_file_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    setup_logging_with_file(verbose_level, false, Some(log_file_path));
}

/// Default location for `setup_logging_to_file`
pub fn default_log_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("answer-stream")
        .join("answer-stream.log")
}

fn filter_for(verbose_level: u8) -> tracing_subscriber::EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return tracing_subscriber::EnvFilter::from_default_env();
    }

    let filter_str = match verbose_level {
        0 => "warn,answer_stream=info",
        1 => "info,answer_stream=debug",
        _ => "debug,answer_stream=trace",
    };
    tracing_subscriber::EnvFilter::new(filter_str)
}

fn setup_logging_with_file(verbose_level: u8, to_stdout: bool, log_file: Option<PathBuf>) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbose_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    let file = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!(
                    "Warning: Could not open log file {}: {}, falling back to stderr",
                    path.display(),
                    e
                );
                None
            }
        }
    });

    // A global subscriber may already be installed (tests, embedding apps)
    let result = if let Some(file) = file {
        subscriber
            .with_writer(move || match file.try_clone() {
                Ok(handle) => Box::new(handle) as Box<dyn io::Write + Send>,
                Err(_) => Box::new(io::stderr()) as Box<dyn io::Write + Send>,
            })
            .try_init()
    } else {
        let subscriber: SubscriberBuilder<_, _, _, fn() -> Box<dyn io::Write + Send>> = if to_stdout
        {
            subscriber.with_writer(|| Box::new(io::stdout()) as Box<dyn io::Write + Send>)
        } else {
            subscriber.with_writer(|| Box::new(io::stderr()) as Box<dyn io::Write + Send>)
        };
        subscriber.try_init()
    };

    if let Err(e) = result {
        eprintln!("Warning: logging already initialized: {e}");
    }
}
