/*!
 # Clock correction offset

 The offset is a number of milliseconds read once at startup from a file or
 an HTTP endpoint. Only its sub-minute part moves the bells.
*/

use std::path::PathBuf;

use chrono::TimeDelta;
use reqwest::header::CACHE_CONTROL;
use tracing::{debug, info, instrument, warn};

use crate::{Error, Result};

const MINUTE_MS: i64 = 60 * 1000;

/// Signed clock correction in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeOffset {
    millis: i64,
}

/// Where the offset is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetSource {
    /// Local text file
    File(PathBuf),
    /// `http://` or `https://` URL
    Url(String),
}

impl OffsetSource {
    /// Treats anything with an http(s) scheme as a URL, everything else as a path
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            OffsetSource::Url(value.to_string())
        } else {
            OffsetSource::File(PathBuf::from(value))
        }
    }
}

impl TimeOffset {
    pub const ZERO: TimeOffset = TimeOffset { millis: 0 };

    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Remainder of the offset within one minute, keeping its sign
    pub fn within_minute(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.millis % MINUTE_MS)
    }

    /// Parses the numeric text of an offset source.
    ///
    /// Fractional values are truncated toward zero.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| Error::InvalidOffset(trimmed.to_string()))?;
        if !value.is_finite() {
            return Err(Error::InvalidOffset(trimmed.to_string()));
        }
        Ok(Self::from_millis(value.trunc() as i64))
    }

    /// Reads the offset from `source`, propagating any failure
    #[instrument]
    pub async fn fetch(source: &OffsetSource) -> Result<Self> {
        let text = match source {
            OffsetSource::File(path) => tokio::fs::read_to_string(path).await?,
            OffsetSource::Url(url) => {
                let response = reqwest::Client::new()
                    .get(url)
                    .header(CACHE_CONTROL, "no-cache")
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::OffsetUnavailable(status.as_u16()));
                }
                response.text().await?
            }
        };
        debug!("Offset source returned {:?}", text.trim());
        Self::parse(&text)
    }

    /// Reads the offset from `source`, falling back to zero on any failure
    pub async fn load(source: &OffsetSource) -> Self {
        match Self::fetch(source).await {
            Ok(offset) => {
                info!("Using time offset of {}ms", offset.millis);
                offset
            }
            Err(e) => {
                warn!("Could not load time offset from {:?}: {}", source, e);
                Self::ZERO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn serve(status: u16, body: &str) -> (MockServer, OffsetSource) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timeDelta.txt"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        let source = OffsetSource::parse(&format!("{}/timeDelta.txt", server.uri()));
        (server, source)
    }

    #[test]
    fn parses_integers_fractions_and_negatives() {
        assert_eq!(TimeOffset::parse("1500").unwrap().millis(), 1500);
        assert_eq!(TimeOffset::parse("  -250\n").unwrap().millis(), -250);
        assert_eq!(TimeOffset::parse("12.9").unwrap().millis(), 12);
        assert_eq!(TimeOffset::parse("-12.9").unwrap().millis(), -12);
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(matches!(TimeOffset::parse("soon"), Err(Error::InvalidOffset(_))));
        assert!(matches!(TimeOffset::parse(""), Err(Error::InvalidOffset(_))));
        assert!(matches!(TimeOffset::parse("inf"), Err(Error::InvalidOffset(_))));
        assert!(matches!(TimeOffset::parse("NaN"), Err(Error::InvalidOffset(_))));
    }

    #[test]
    fn within_minute_keeps_sign() {
        assert_eq!(
            TimeOffset::from_millis(61_250).within_minute(),
            TimeDelta::milliseconds(1_250)
        );
        assert_eq!(
            TimeOffset::from_millis(-61_250).within_minute(),
            TimeDelta::milliseconds(-1_250)
        );
        assert_eq!(TimeOffset::from_millis(120_000).within_minute(), TimeDelta::zero());
    }

    #[test]
    fn source_kind_follows_scheme() {
        assert_eq!(
            OffsetSource::parse("https://clock.local/timeDelta.txt"),
            OffsetSource::Url("https://clock.local/timeDelta.txt".to_string())
        );
        assert_eq!(
            OffsetSource::parse("timeDelta.txt"),
            OffsetSource::File(PathBuf::from("timeDelta.txt"))
        );
    }

    #[tokio::test]
    async fn loads_offset_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "-4200.5").unwrap();
        let source = OffsetSource::File(file.path().to_path_buf());
        assert_eq!(TimeOffset::load(&source).await, TimeOffset::from_millis(-4200));
    }

    #[tokio::test]
    async fn garbage_file_falls_back_to_zero() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "<html>not found</html>").unwrap();
        let source = OffsetSource::File(file.path().to_path_buf());
        assert!(TimeOffset::fetch(&source).await.is_err());
        assert_eq!(TimeOffset::load(&source).await, TimeOffset::ZERO);
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let source = OffsetSource::File(dir.path().join("timeDelta.txt"));
        assert!(matches!(TimeOffset::fetch(&source).await, Err(Error::Io(_))));
        assert_eq!(TimeOffset::load(&source).await, TimeOffset::ZERO);
    }

    #[tokio::test]
    async fn fetches_offset_from_url() {
        let (_server, source) = serve(200, "-1500.5\n").await;
        assert!(matches!(source, OffsetSource::Url(_)));
        assert_eq!(
            TimeOffset::fetch(&source).await.unwrap(),
            TimeOffset::from_millis(-1500)
        );
        assert_eq!(TimeOffset::load(&source).await, TimeOffset::from_millis(-1500));
    }

    #[tokio::test]
    async fn non_success_status_falls_back_to_zero() {
        let (_server, source) = serve(404, "-1500").await;
        assert!(matches!(
            TimeOffset::fetch(&source).await,
            Err(Error::OffsetUnavailable(404))
        ));
        assert_eq!(TimeOffset::load(&source).await, TimeOffset::ZERO);
    }

    #[tokio::test]
    async fn non_numeric_body_falls_back_to_zero() {
        let (_server, source) = serve(200, "<html>maintenance</html>").await;
        assert!(matches!(
            TimeOffset::fetch(&source).await,
            Err(Error::InvalidOffset(_))
        ));
        assert_eq!(TimeOffset::load(&source).await, TimeOffset::ZERO);
    }
}
