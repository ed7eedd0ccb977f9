use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt,
    layer::{Layer as _, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Subscriber settings shared by the daemon binary and tests.
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    pub format: LogFormat,
    pub verbose: u8,
    pub quiet: bool,
    pub timestamps: bool,
    pub colored: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            verbose: 0,
            quiet: false,
            timestamps: true,
            colored: false,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder(Self::default())
    }

    fn level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::ERROR
        } else if self.verbose > 1 {
            LevelFilter::DEBUG
        } else if self.verbose > 0 {
            LevelFilter::INFO
        } else {
            LevelFilter::WARN
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SubscriberConfigBuilder(SubscriberConfig);

impl SubscriberConfigBuilder {
    pub fn format(mut self, format: LogFormat) -> Self {
        self.0.format = format;
        self
    }

    pub fn verbose(mut self, verbose: u8) -> Self {
        self.0.verbose = verbose;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.0.quiet = quiet;
        self
    }

    pub fn timestamps(mut self, timestamps: bool) -> Self {
        self.0.timestamps = timestamps;
        self
    }

    pub fn colored(mut self, colored: bool) -> Self {
        self.0.colored = colored;
        self
    }

    pub fn log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.0.log_file = log_file;
        self
    }

    pub fn build(self) -> SubscriberConfig {
        self.0
    }
}

pub fn subscriber(
    cfg: &SubscriberConfig,
) -> io::Result<Box<dyn tracing::Subscriber + Send + Sync>> {
    let filter = EnvFilter::builder()
        .with_default_directive(cfg.level().into())
        .from_env_lossy();

    let writer: Box<dyn Fn() -> Box<dyn io::Write> + Send + Sync> = match &cfg.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let file = Mutex::new(file);
            Box::new(move || {
                let file = file.lock().expect("log file lock");
                Box::new(file.try_clone().expect("log file clone")) as Box<dyn io::Write>
            })
        }
        None => Box::new(|| Box::new(io::stderr()) as Box<dyn io::Write>),
    };

    let layer = fmt::layer()
        .with_ansi(cfg.colored)
        .with_writer(move || writer())
        .with_target(false);
    let layer = if cfg.timestamps {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    };
    match cfg.format {
        LogFormat::Text => Ok(Box::new(
            tracing_subscriber::registry().with(filter).with(layer),
        )),
        LogFormat::Json => {
            let json = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(false)
                .boxed();
            Ok(Box::new(
                tracing_subscriber::registry().with(filter).with(json),
            ))
        }
    }
}

/// Installs the global subscriber. Later calls are no-ops so tests can
/// initialize freely.
pub fn init(cfg: &SubscriberConfig) -> io::Result<()> {
    let sub = subscriber(cfg)?;
    let _ = tracing::subscriber::set_global_default(sub);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        let cfg = SubscriberConfig::builder().build();
        assert_eq!(cfg.level(), LevelFilter::WARN);
        let cfg = SubscriberConfig::builder().verbose(1).build();
        assert_eq!(cfg.level(), LevelFilter::INFO);
        let cfg = SubscriberConfig::builder().verbose(2).build();
        assert_eq!(cfg.level(), LevelFilter::DEBUG);
        let cfg = SubscriberConfig::builder().verbose(2).quiet(true).build();
        assert_eq!(cfg.level(), LevelFilter::ERROR);
    }

    #[test]
    fn log_file_subscriber_builds() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SubscriberConfig::builder()
            .log_file(Some(dir.path().join("daemon.log")))
            .build();
        assert!(subscriber(&cfg).is_ok());
    }
}
