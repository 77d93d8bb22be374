use crate::level::Level;
use crate::record::EventRecord;
use crate::sink::{Sink, SinkError};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

type Writer = Box<dyn Write + Send>;

/// One output stream accepting a closed range of levels.
struct StreamHandler {
    min: Level,
    max: Level,
    writer: Mutex<Option<Writer>>,
}

impl StreamHandler {
    fn new(min: Level, max: Level, writer: Writer) -> Self {
        Self {
            min,
            max,
            writer: Mutex::new(Some(writer)),
        }
    }

    fn handles(&self, level: Level) -> bool {
        self.min <= level && level <= self.max
    }

    fn write_line(&self, payload: &str) -> Result<(), SinkError> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = guard.as_mut().ok_or(SinkError::Closed)?;
        writeln!(writer, "{}", payload)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        let taken = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut writer) = taken {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Console sink: DEBUG..=WARNING go to stdout, ERROR..=CRITICAL to stderr.
///
/// The two streams are separate handlers with their own level range, so
/// a record can only ever land on the stream its severity selects.
pub struct ConsoleSink {
    out: StreamHandler,
    err: StreamHandler,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Console sink over arbitrary writers, e.g. in-memory buffers.
    pub fn with_writers(out: Writer, err: Writer) -> Self {
        Self {
            out: StreamHandler::new(Level::Debug, Level::Warning, out),
            err: StreamHandler::new(Level::Error, Level::Critical, err),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn emit(&self, event: &EventRecord, payload: &str) -> Result<(), SinkError> {
        for handler in [&self.out, &self.err] {
            if handler.handles(event.level) {
                handler.write_line(payload)?;
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        let out = self.out.close();
        let err = self.err.close();
        out.and(err)
    }
}

/// Writes every record to a single stream, flushed per line.
///
/// Alternative to [`ConsoleSink`] for environments that capture only
/// stdout.
pub struct PrintSink {
    stream: StreamHandler,
}

impl PrintSink {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(writer: Writer) -> Self {
        Self {
            stream: StreamHandler::new(Level::Debug, Level::Critical, writer),
        }
    }
}

impl Default for PrintSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for PrintSink {
    fn name(&self) -> &str {
        "print"
    }

    fn emit(&self, _event: &EventRecord, payload: &str) -> Result<(), SinkError> {
        self.stream.write_line(payload)
    }

    fn close(&self) -> Result<(), SinkError> {
        self.stream.close()
    }
}
