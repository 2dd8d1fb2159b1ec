//! Location sample sources.
//!
//! [`LocationSource`] abstracts the platform location API. Two sources ship
//! with the crate: [`ScriptedSource`] replays a fixed sequence of samples at a
//! fixed cadence (tests, CLI track replay) and [`parse_track`] /
//! [`load_track`] read a plain `latitude,longitude` track file.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geo::Position;

/// Capacity of the channel handed out by [`LocationSource::watch`].
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Errors produced while sampling or loading positions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// The platform has no fix right now.
    #[error("location unavailable")]
    Unavailable,

    /// The platform did not answer in time.
    #[error("location request timed out")]
    Timeout,

    /// Any other platform failure.
    #[error("location provider error: {0}")]
    Provider(String),

    /// A track file line could not be parsed.
    #[error("invalid track line {line}: {reason}")]
    InvalidTrack { line: usize, reason: String },

    /// A track file could not be read.
    #[error("failed to read track: {0}")]
    Io(String),
}

/// Stream of samples from a continuous watch.
pub type SampleStream = mpsc::Receiver<Result<Position, LocationError>>;

/// Boxed future returned by [`LocationSource::current`].
pub type SampleFuture<'a> = Pin<Box<dyn Future<Output = Result<Position, LocationError>> + Send + 'a>>;

/// Platform location API.
pub trait LocationSource: Send + Sync + 'static {
    /// Start a continuous watch. Dropping the receiver stops the watch; a
    /// source may also end the stream when it can no longer deliver.
    ///
    /// Must be called from within a Tokio runtime.
    fn watch(&self) -> SampleStream;

    /// Take a single sample.
    fn current(&self) -> SampleFuture<'_>;
}

/// Replays a fixed list of samples.
///
/// `watch()` emits every sample once, `cadence` apart (the first immediately),
/// then stays open without new fixes until the receiver is dropped.
/// `current()` walks the same list and keeps returning the last sample once
/// it is exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    samples: Arc<Vec<Result<Position, LocationError>>>,
    cadence: Duration,
    cursor: Arc<Mutex<usize>>,
}

impl ScriptedSource {
    pub fn new(samples: Vec<Result<Position, LocationError>>, cadence: Duration) -> Self {
        Self {
            samples: Arc::new(samples),
            cadence,
            cursor: Arc::new(Mutex::new(0)),
        }
    }

    /// Build from a list of positions with no errors.
    pub fn from_positions(positions: Vec<Position>, cadence: Duration) -> Self {
        Self::new(positions.into_iter().map(Ok).collect(), cadence)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl LocationSource for ScriptedSource {
    fn watch(&self) -> SampleStream {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let samples = Arc::clone(&self.samples);
        let cadence = self.cadence;

        tokio::spawn(async move {
            for (i, sample) in samples.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(cadence).await;
                }
                if tx.send(sample.clone()).await.is_err() {
                    // Watcher went away
                    return;
                }
            }
            // A platform watch never ends on its own
            tx.closed().await;
        });

        rx
    }

    fn current(&self) -> SampleFuture<'_> {
        Box::pin(async move {
            if self.samples.is_empty() {
                return Err(LocationError::Unavailable);
            }
            let mut cursor = self.cursor.lock();
            let index = (*cursor).min(self.samples.len() - 1);
            *cursor = cursor.saturating_add(1);
            self.samples[index].clone()
        })
    }
}

/// Parse a track: one `latitude,longitude` pair per line.
///
/// Blank lines and lines starting with `#` are skipped. Extra columns after
/// the first two are ignored so GPS exports with timestamps still load.
pub fn parse_track(contents: &str) -> Result<Vec<Position>, LocationError> {
    let mut positions = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line_no = index + 1;
        let mut fields = line.split(',').map(str::trim);
        let lat = parse_field(fields.next(), line_no, "latitude")?;
        let lon = parse_field(fields.next(), line_no, "longitude")?;

        let position = Position::try_new(lat, lon).map_err(|e| LocationError::InvalidTrack {
            line: line_no,
            reason: e.to_string(),
        })?;
        positions.push(position);
    }

    Ok(positions)
}

fn parse_field(field: Option<&str>, line: usize, name: &str) -> Result<f64, LocationError> {
    let text = field
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LocationError::InvalidTrack {
            line,
            reason: format!("missing {}", name),
        })?;
    text.parse::<f64>().map_err(|e| LocationError::InvalidTrack {
        line,
        reason: format!("{} '{}': {}", name, text, e),
    })
}

/// Read and parse a track file.
pub fn load_track(path: &Path) -> Result<Vec<Position>, LocationError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| LocationError::Io(format!("{}: {}", path.display(), e)))?;
    parse_track(&contents)
}
