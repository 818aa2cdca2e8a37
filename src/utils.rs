//! Utility functions and helpers
//!
//! Logging setup and pool address parsing.

use crate::config::{LogFormat, LogLevel};
use crate::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};
use url::Url;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. With `log_file`, events are also
/// appended to that file; the returned guard flushes it on drop and must be
/// kept alive for the life of the process.
pub fn init_logging(
    level: LogLevel,
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    layers.push(match format {
        LogFormat::Plain => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_thread_names(true)
            .boxed(),
    });

    let guard = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::config(format!("invalid log file {}", path.display())))?;
            let directory = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(match format {
                LogFormat::Plain => fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .boxed(),
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_thread_names(true)
                    .boxed(),
            });
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::config(format!("failed to initialise logging: {}", e)))?;

    Ok(guard)
}

/// Normalize a pool URL to `host:port`.
///
/// Accepts a bare `host:port`, `stratum+tcp://host:port` or `tcp://host:port`.
pub fn parse_pool_address(url: &str) -> Result<String> {
    let url = url.trim();

    let address = if url.contains("://") {
        let parsed =
            Url::parse(url).map_err(|e| Error::config(format!("invalid pool url {:?}: {}", url, e)))?;
        match parsed.scheme() {
            "stratum+tcp" | "tcp" => {}
            other => {
                return Err(Error::config(format!(
                    "unsupported pool url scheme {:?}, expected stratum+tcp or tcp",
                    other
                )))
            }
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::config(format!("pool url {:?} has no host", url)))?;
        let port = parsed
            .port()
            .ok_or_else(|| Error::config(format!("pool url {:?} has no port", url)))?;
        format!("{}:{}", host, port)
    } else {
        url.to_string()
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| Error::config(format!("pool address {:?} is not host:port", address)))?;
    if host.is_empty() {
        return Err(Error::config(format!("pool address {:?} has no host", address)));
    }
    port.parse::<u16>()
        .map_err(|e| Error::config(format!("invalid port in pool address {:?}: {}", address, e)))?;

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pool_address() {
        assert_eq!(
            parse_pool_address("ckb.uupool.cn:10861").unwrap(),
            "ckb.uupool.cn:10861"
        );
        assert_eq!(
            parse_pool_address("stratum+tcp://pool.example.com:3333").unwrap(),
            "pool.example.com:3333"
        );
        assert_eq!(
            parse_pool_address("tcp://127.0.0.1:4444").unwrap(),
            "127.0.0.1:4444"
        );
        assert_eq!(
            parse_pool_address("  10.0.0.1:1  ").unwrap(),
            "10.0.0.1:1"
        );
    }

    #[test]
    fn test_parse_pool_address_errors() {
        assert!(parse_pool_address("").is_err());
        assert!(parse_pool_address("pool.example.com").is_err());
        assert!(parse_pool_address(":3333").is_err());
        assert!(parse_pool_address("pool.example.com:99999").is_err());
        assert!(parse_pool_address("http://pool.example.com:3333").is_err());
        assert!(parse_pool_address("stratum+tcp://pool.example.com").is_err());
    }
}
