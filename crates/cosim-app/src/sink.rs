//! Result sinks provided by the service layer.

use std::io::Write;

use cosim_sim::{ResultSink, SimError, SimResult, StepRecord};

/// Streams each step as one JSON object per line.
///
/// Lines are written without flushing; call [`JsonLinesSink::finish`] once the
/// run is over.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Flush buffered lines and hand back the writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> ResultSink for JsonLinesSink<W> {
    fn record(&mut self, step: &StepRecord) -> SimResult<()> {
        let fail = |reason: String| SimError::Sink {
            step: step.step,
            reason,
        };
        let line = serde_json::to_string(step).map_err(|e| fail(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| fail(e.to_string()))?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps every step in memory and forwards it to an optional second sink.
pub(crate) struct Tee<'r, 's> {
    pub(crate) record: &'r mut cosim_sim::SimRecord,
    pub(crate) extra: Option<&'s mut dyn ResultSink>,
}

impl ResultSink for Tee<'_, '_> {
    fn record(&mut self, step: &StepRecord) -> SimResult<()> {
        self.record.record(step)?;
        if let Some(extra) = self.extra.as_deref_mut() {
            extra.record(step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn step(n: usize) -> StepRecord {
        StepRecord {
            step: n,
            time_s: n as f64,
            date_time: NaiveDateTime::default(),
            converged: n != 1,
            iterations: 2,
            max_residual: 0.0,
        }
    }

    #[test]
    fn one_line_per_step() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.record(&step(0)).unwrap();
        sink.record(&step(1)).unwrap();
        assert_eq!(sink.written(), 2);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: StepRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(back, step(1));
    }

    #[derive(Default)]
    struct CountingWriter {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn flushes_once_at_finish() {
        let mut sink = JsonLinesSink::new(CountingWriter::default());
        for n in 0..3 {
            sink.record(&step(n)).unwrap();
        }
        let writer = sink.finish().unwrap();
        assert_eq!(writer.flushes, 1);
        assert_eq!(String::from_utf8(writer.bytes).unwrap().lines().count(), 3);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_name_the_step() {
        let mut sink = JsonLinesSink::new(Broken);
        let err = sink.record(&step(3)).unwrap_err();
        assert!(matches!(err, SimError::Sink { step: 3, .. }), "{err}");
    }
}
