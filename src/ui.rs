// UI layer: console output around an upload. The library reports progress
// through `ProgressSink`; this module is the terminal implementation of it.

use crate::api::{Transport, UploadRequest, UploadResult, Uploader};
use crate::progress::ProgressSink;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::Write;

/// indicatif bar showing bytes sent out of the encoded body length.
#[derive(Clone)]
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return ConsoleProgress {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "[{bar:40}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        ConsoleProgress { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, bytes_sent: u64, bytes_total: u64) {
        if self.bar.length() != Some(bytes_total) {
            self.bar.set_length(bytes_total);
        }
        self.bar.set_position(bytes_sent);
    }
}

/// Echo the metadata that is about to be sent, as 2-space indented JSON.
pub fn print_metadata<W: Write>(out: &mut W, metadata: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata).context("Serializing metadata")?;
    writeln!(out, "Uploading \n{}", json)?;
    Ok(())
}

pub fn print_outcome<W: Write>(out: &mut W, result: &UploadResult) -> Result<()> {
    writeln!(out, "Status: {}\n", result.status_code)?;
    writeln!(out, "{}", result.reason)?;
    Ok(())
}

/// Full console flow: check the token and file, print the metadata,
/// upload with a progress bar, print the status. Transport and file errors
/// are returned untouched so the caller can tell them apart from a non-2xx
/// status.
pub fn run_upload<T: Transport, W: Write>(
    uploader: &Uploader<T>,
    request: &UploadRequest,
    show_progress: bool,
    out: &mut W,
) -> Result<UploadResult> {
    let prepared = uploader.prepare(request)?;
    print_metadata(out, &request.metadata)?;

    let progress = ConsoleProgress::new(show_progress);
    let outcome = uploader.send(prepared, progress.clone());
    progress.finish();

    let result = outcome?;
    print_outcome(out, &result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OutgoingRequest;
    use crate::config::UploaderConfig;
    use crate::error::UploadError;

    #[test]
    fn hidden_bar_still_tracks_position() {
        let progress = ConsoleProgress::new(false);
        progress.on_progress(512, 2048);
        progress.on_progress(2048, 2048);
        assert_eq!(progress.position(), 2048);
    }

    #[test]
    fn metadata_prints_as_indented_json() {
        let mut metadata = BTreeMap::new();
        metadata.insert("package_id".to_string(), "07a48d23".to_string());
        metadata.insert("name".to_string(), "1GB-file".to_string());

        let mut out = Vec::new();
        print_metadata(&mut out, &metadata).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Uploading \n{\n  \"name\": \"1GB-file\",\n  \"package_id\": \"07a48d23\"\n}\n"
        );
    }

    #[test]
    fn outcome_prints_status_then_reason() {
        let result = UploadResult {
            status_code: 403,
            reason: "Forbidden".into(),
            body: String::new(),
        };
        let mut out = Vec::new();
        print_outcome(&mut out, &result).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Status: 403\n\nForbidden\n");
    }

    struct Answer(u16, &'static str);

    impl Transport for Answer {
        fn send(&self, mut request: OutgoingRequest) -> Result<UploadResult, UploadError> {
            std::io::copy(&mut request.body, &mut std::io::sink()).map_err(UploadError::network)?;
            Ok(UploadResult {
                status_code: self.0,
                reason: self.1.to_string(),
                body: String::new(),
            })
        }
    }

    fn config(token: Option<&str>) -> UploaderConfig {
        UploaderConfig {
            api_token: token.map(str::to_string),
            ..UploaderConfig::default()
        }
    }

    #[test]
    fn console_flow_prints_metadata_then_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1GB.img");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        let uploader = Uploader::with_transport(config(Some("tok")), Answer(201, "Created"));

        let mut out = Vec::new();
        let result = run_upload(&uploader, &UploadRequest::new(&path, "pkg", "img"), false, &mut out)
            .unwrap();
        assert_eq!(result.status_code, 201);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Uploading \n{\n  \"name\": \"img\",\n  \"package_id\": \"pkg\"\n}\nStatus: 201\n\nCreated\n"
        );
    }

    #[test]
    fn nothing_is_announced_when_checks_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1GB.img");
        std::fs::write(&path, b"x").unwrap();

        let no_token = Uploader::with_transport(config(None), Answer(200, "OK"));
        let mut out = Vec::new();
        assert!(run_upload(&no_token, &UploadRequest::new(&path, "pkg", "img"), false, &mut out).is_err());
        assert!(out.is_empty());

        let with_token = Uploader::with_transport(config(Some("tok")), Answer(200, "OK"));
        let missing = UploadRequest::new(dir.path().join("gone.img"), "pkg", "img");
        assert!(run_upload(&with_token, &missing, false, &mut out).is_err());
        assert!(out.is_empty());
    }
}
