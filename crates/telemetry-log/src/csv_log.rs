//! CSV Log File

use crate::LogError;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use telemetry_protocol::TelemetrySample;
use tracing::{debug, info};

/// Column header written at the top of every log file
pub const CSV_HEADER: &str = "pc_time_iso,src_ip,src_port,ms,t_c,p_pa,p_hpa";

/// One CSV file per run, named after the local start time
pub struct CsvSampleLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: u64,
}

impl CsvSampleLog {
    /// Create `dir` if needed and open `udp_log_<YYYYmmdd_HHMMSS>.csv` in it
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let name = format!("udp_log_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
        Self::open(dir.join(name))
    }

    /// Open (append) a specific file and write the header
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER)?;
        writer.flush()?;

        info!("Logging samples to {}", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    /// Append one row (buffered until the next flush)
    pub fn write(&mut self, sample: &TelemetrySample) -> Result<(), LogError> {
        let writer = self.writer.as_mut().ok_or(LogError::Closed)?;
        // `{:?}` keeps a trailing `.0` on whole floats, matching existing logs
        writeln!(
            writer,
            "{},{},{},{},{:?},{},{:?}",
            sample.captured_at_iso(),
            sample.source().ip(),
            sample.source().port(),
            sample.device_millis(),
            sample.temperature_c(),
            sample.pressure_pa(),
            sample.pressure_hpa(),
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LogError> {
        let writer = self.writer.as_mut().ok_or(LogError::Closed)?;
        writer.flush()?;
        debug!("Flushed {} rows to {}", self.rows, self.path.display());
        Ok(())
    }

    /// Flush and release the file. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), LogError> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                info!("Closed {} ({} rows)", self.path.display(), self.rows);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "telemetry-log-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    pub(crate) fn sample(ms: u64) -> TelemetrySample {
        let captured_at = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        TelemetrySample::new(
            captured_at,
            "192.168.4.2:4210".parse().unwrap(),
            ms,
            2350.0,
            101_325,
        )
    }

    #[test]
    fn test_create_writes_header() {
        let dir = temp_dir("header");
        let log = CsvSampleLog::create(&dir).unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("udp_log_") && name.ends_with(".csv"));
        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, format!("{}\n", CSV_HEADER));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_write_rows() {
        let dir = temp_dir("rows");
        let mut log = CsvSampleLog::create(&dir).unwrap();
        log.write(&sample(1500)).unwrap();
        log.write(&sample(1600)).unwrap();
        log.close().unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2024-05-01T12:30:00.000,192.168.4.2,4210,1500,23.5,101325,1013.25"
        );
        assert_eq!(log.rows(), 2);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_whole_floats_keep_decimal() {
        let dir = temp_dir("floats");
        let mut log = CsvSampleLog::create(&dir).unwrap();
        let captured_at = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let whole = TelemetrySample::new(
            captured_at,
            "10.0.0.1:1".parse().unwrap(),
            0,
            2400.0,
            100_000,
        );
        log.write(&whole).unwrap();
        log.close().unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.lines().nth(1).unwrap().ends_with(",0,24.0,100000,1000.0"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = temp_dir("closed");
        let mut log = CsvSampleLog::create(&dir).unwrap();
        log.close().unwrap();
        log.close().unwrap();
        assert!(log.is_closed());
        assert!(matches!(log.write(&sample(1)), Err(LogError::Closed)));

        fs::remove_dir_all(dir).ok();
    }
}
