use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::track::TrackPoint;

/// Trait for recorded-track sinks
pub trait OutputHandler: Send {
    /// Handle one recorded point
    fn handle_point(&mut self, point: &TrackPoint);

    /// Flush buffered output
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// CSV track output.
///
/// Columns: `seq,timestamp,lat,lon,elevation,speed`; missing values are empty.
pub struct CsvOutput<W: Write + Send = BufWriter<File>> {
    writer: W,
    failed: bool,
}

impl CsvOutput {
    /// Create (truncating) the file and write the header row
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        CsvOutput::from_writer(BufWriter::new(file))
    }
}

impl<W: Write + Send> CsvOutput<W> {
    pub fn from_writer(mut writer: W) -> std::io::Result<Self> {
        writeln!(writer, "seq,timestamp,lat,lon,elevation,speed")?;
        Ok(CsvOutput {
            writer,
            failed: false,
        })
    }

    fn write_point(&mut self, p: &TrackPoint) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "{},{:.3},{:.7},{:.7},{},{}",
            p.seq,
            p.timestamp,
            p.latitude,
            p.longitude,
            p.elevation.map(|e| format!("{:.1}", e)).unwrap_or_default(),
            p.speed.map(|s| format!("{:.2}", s)).unwrap_or_default(),
        )
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> OutputHandler for CsvOutput<W> {
    fn handle_point(&mut self, point: &TrackPoint) {
        if let Err(e) = self.write_point(point) {
            // Report once; later rows will fail the same way
            if !self.failed {
                warn!(error = %e, "Failed to write CSV");
                self.failed = true;
            }
        }
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::PositionSample;

    fn points() -> Vec<TrackPoint> {
        vec![
            TrackPoint::from_sample(0, &PositionSample::new(41.0, 29.0, 100.0).with_elevation(12.34)),
            TrackPoint::from_sample(1, &PositionSample::new(41.0001, 29.0002, 101.5).with_speed(3.2)),
        ]
    }

    #[test]
    fn test_csv_rows() {
        let mut out = CsvOutput::from_writer(Vec::new()).unwrap();
        for p in &points() {
            out.handle_point(p);
        }
        out.finish().unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "seq,timestamp,lat,lon,elevation,speed");
        assert_eq!(lines[1], "0,100.000,41.0000000,29.0000000,12.3,");
        assert_eq!(lines[2], "1,101.500,41.0001000,29.0002000,,3.20");
    }

    #[test]
    fn test_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.csv");

        let mut out = CsvOutput::create(&path).unwrap();
        for p in &points() {
            out.handle_point(p);
        }
        out.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    /// Writer that fails once `broken` is set
    struct BrokenPipe {
        broken: bool,
        rejected: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.broken {
                self.rejected += 1;
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_flagged() {
        let mut out = CsvOutput::from_writer(BrokenPipe {
            broken: false,
            rejected: 0,
        })
        .unwrap();
        assert!(!out.failed);

        out.writer.broken = true;
        for p in &points() {
            out.handle_point(p);
        }
        assert!(out.failed);
        assert!(out.into_inner().rejected >= 2);
    }
}
