use super::ephemeris::EphemerisStore;
use super::time::GpsTime;
use super::{DecodeOutcome, Decoder, Format};
use chrono::NaiveDate;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Keeps the bytes as they come, without decoding anything.
///
/// Every non-empty read counts as one message, so that the health checks
/// of such a stream only follow the connection.
#[derive(Default)]
pub struct PassthroughDecoder {
    ephemerides: EphemerisStore,
}

impl PassthroughDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for PassthroughDecoder {
    fn decode(&mut self, bytes: &[u8], _now: GpsTime) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        if !bytes.is_empty() {
            outcome.messages = 1;
        }
        outcome
    }

    fn reset(&mut self) {}

    fn ephemerides(&self) -> &EphemerisStore {
        &self.ephemerides
    }

    fn format(&self) -> Format {
        Format::Passthrough
    }
}

/// Raw bytes of one station, appended to one file per day named
/// `<station>_<yyMMdd>`.
pub struct RawArchive {
    station: String,
    dir: PathBuf,
    file: Option<(NaiveDate, File)>,
}

impl RawArchive {
    pub fn new(station: &str, dir: PathBuf) -> Self {
        Self {
            station: station.to_string(),
            dir,
            file: None,
        }
    }

    pub fn file_name(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}", self.station, date.format("%y%m%d")))
    }

    /// On error, the file is opened again on the next call
    pub async fn write(
        &mut self,
        bytes: &[u8],
        date: NaiveDate,
    ) -> std::io::Result<()> {
        let mut file = match self.file.take() {
            Some((day, file)) if day == date => file,
            _ => {
                let path = self.file_name(date);
                info!("{}: writing raw data to {}", self.station, path.display());
                OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .await?
            }
        };
        file.write_all(bytes).await?;
        file.flush().await?;
        self.file = Some((date, file));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daily_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = RawArchive::new("WTZR0", dir.path().to_path_buf());

        let day1 = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        archive.write(b"abc", day1).await.unwrap();
        archive.write(b"def", day1).await.unwrap();
        archive.write(b"ghi", day2).await.unwrap();

        let first = std::fs::read(dir.path().join("WTZR0_240309")).unwrap();
        assert_eq!(first, b"abcdef");
        let second = std::fs::read(dir.path().join("WTZR0_240310")).unwrap();
        assert_eq!(second, b"ghi");
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = RawArchive::new("WTZR0", dir.path().join("nowhere"));
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert!(archive.write(b"abc", day).await.is_err());

        std::fs::create_dir(dir.path().join("nowhere")).unwrap();
        archive.write(b"def", day).await.unwrap();
        let path = dir.path().join("nowhere").join("WTZR0_240309");
        assert_eq!(std::fs::read(path).unwrap(), b"def");
    }

    #[test]
    fn test_passthrough() {
        let mut decoder = PassthroughDecoder::new();
        let outcome = decoder.decode(b"\xd3\x00", GpsTime::now());
        assert!(outcome.is_success());
        assert!(outcome.items.is_empty());
        assert!(decoder.decode(b"", GpsTime::now()).is_need_more_data());
    }
}
