//! Client side of the transfer protocol: catalog fetching, the
//! ledger-driven resumable downloader, and the coarse percent-based
//! stream consumer.
//!
//! The downloader runs as a single sequential worker, one file at a time
//! in catalog order. Any network or filesystem error aborts the whole
//! attempt; the ledger as last persisted stays on disk, so the next call
//! resumes from the last completed file instead of starting over.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::catalog::{self, CatalogEntry, GameCatalog, GameList, GameSummary, StartInfo};
use crate::error::{Error, Result};
use crate::framing::{FrameEvent, FrameParser, StreamStart};
use crate::ledger::TransferLedger;

/// Header carrying the shared secret on every request.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Overall timeout for small metadata requests (listing, catalog, start).
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-read timeout while streaming file bodies; bounds a stalled transfer
/// without capping the total duration of a large one.
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for receiving transfer progress updates.
///
/// All methods have default no-op implementations. Callbacks may be
/// delivered from a different task than the one that started the
/// transfer; implementations must not assume an execution context.
pub trait TransferProgress: Send + Sync {
    /// Called with the running aggregate after every received chunk.
    fn on_progress(&self, _bytes_done: u64, _bytes_total: u64) {}

    /// Called with a human-readable status line, e.g. when a file starts.
    fn on_status(&self, _message: &str) {}

    /// Called exactly once on overall success, distinct from per-file
    /// status messages.
    fn on_finished(&self) {}
}

/// A progress sink that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl TransferProgress for NoProgress {}

/// Options governing client transfers.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Re-hash each completed file and compare against the catalog
    /// checksum before moving on.
    pub verify_checksums: bool,
    /// Chunk size requested from the continuous stream endpoint.
    pub stream_chunk_size: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            stream_chunk_size: 64 * 1024,
        }
    }
}

/// HTTP client for a depot server.
pub struct DepotClient {
    http: reqwest::Client,
    server_url: String,
    api_key: Option<String>,
    options: ClientOptions,
}

impl DepotClient {
    /// Creates a client with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(server_url: &str, api_key: Option<&str>) -> Result<Self> {
        Self::with_options(server_url, api_key, ClientOptions::default())
    }

    /// Creates a client with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        server_url: &str,
        api_key: Option<&str>,
        options: ClientOptions,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            options,
        })
    }

    fn endpoint<'a, I>(&self, segments: I) -> Result<reqwest::Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = reqwest::Url::parse(&self.server_url)
            .map_err(|e| Error::Config(format!("invalid server URL {}: {e}", self.server_url)))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("invalid server URL {}", self.server_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: reqwest::Url) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        req
    }

    /// Maps common failure statuses onto the error taxonomy.
    fn check_status(
        resp: reqwest::Response,
        url: &reqwest::Url,
        game_id: Option<&str>,
    ) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Auth);
        }
        if status == reqwest::StatusCode::NOT_FOUND
            && let Some(id) = game_id
        {
            return Err(Error::GameNotFound(id.to_string()));
        }
        Err(Error::ServerStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }

    /// Fetches the game listing.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, auth rejection, or a
    /// malformed response body.
    pub async fn list_games(&self) -> Result<Vec<GameSummary>> {
        let url = self.endpoint(["games"])?;
        let resp = self.request(url.clone()).timeout(CATALOG_TIMEOUT).send().await?;
        let resp = Self::check_status(resp, &url, None)?;
        Ok(resp.json::<GameList>().await?.games)
    }

    /// Fetches the full catalog for one game.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, auth rejection, unknown game,
    /// or a malformed response body.
    pub async fn fetch_catalog(&self, game_id: &str) -> Result<GameCatalog> {
        let url = self.endpoint(["games", game_id])?;
        let resp = self.request(url.clone()).timeout(CATALOG_TIMEOUT).send().await?;
        let resp = Self::check_status(resp, &url, Some(game_id))?;
        Ok(resp.json().await?)
    }

    /// Resolves a percent-based resume point on the server.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, auth rejection, or unknown
    /// game.
    pub async fn fetch_start_info(&self, game_id: &str, progress_percent: f64) -> Result<StartInfo> {
        let mut url = self.endpoint(["games", game_id, "start"])?;
        url.query_pairs_mut()
            .append_pair("progress", &progress_percent.to_string());
        let resp = self.request(url.clone()).timeout(CATALOG_TIMEOUT).send().await?;
        let resp = Self::check_status(resp, &url, Some(game_id))?;
        Ok(resp.json().await?)
    }

    fn file_url(&self, game_id: &str, relative_path: &str, offset: u64) -> Result<reqwest::Url> {
        let mut url = self.endpoint(
            ["download", "file", game_id]
                .into_iter()
                .chain(relative_path.split('/')),
        )?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    /// Downloads (or resumes) every file of a game into `install_dir`.
    ///
    /// Progress already recorded in the install directory's ledger is
    /// honored: completed files are skipped and partial files are resumed
    /// from their recorded offset via range requests. The ledger is
    /// persisted after each completed file and deleted once everything is
    /// done; a deletion failure is reported through `on_status` only.
    ///
    /// # Errors
    ///
    /// Returns an error on the first network or filesystem failure, on an
    /// empty catalog, or on a checksum mismatch. The ledger as last
    /// persisted remains on disk so a later call resumes.
    pub async fn download_game(
        &self,
        game_id: &str,
        install_dir: &Path,
        progress: &dyn TransferProgress,
    ) -> Result<()> {
        // A fully-complete ledger left by a crashed final step needs no
        // network at all: report, clean up, done.
        let mut ledger = TransferLedger::load(install_dir);
        if !ledger.is_empty() && ledger.all_complete() {
            let total = ledger.total_size();
            progress.on_progress(total, total);
            Self::remove_ledger(install_dir, progress);
            progress.on_finished();
            return Ok(());
        }

        let catalog = self.fetch_catalog(game_id).await?;
        if catalog.total_size == 0 {
            return Err(Error::EmptyCatalog(game_id.to_string()));
        }
        tokio::fs::create_dir_all(install_dir).await?;

        // Track every catalog file; seed files already present with the
        // declared size as complete, so content from a prior untracked run
        // is not re-downloaded.
        for entry in &catalog.files {
            if ledger.entry(&entry.path).is_none() {
                let local = install_dir.join(&entry.path);
                match tokio::fs::metadata(&local).await {
                    Ok(meta) if meta.is_file() && meta.len() == entry.size => {
                        ledger.track_complete(&entry.path, entry.size);
                    }
                    _ => ledger.track(&entry.path, entry.size),
                }
            }
        }

        let total = catalog.total_size;
        progress.on_progress(ledger.total_downloaded(), total);

        for entry in &catalog.files {
            let already = ledger.entry(&entry.path).map_or(0, |e| e.downloaded);
            if already >= entry.size {
                continue;
            }
            progress.on_status(&format!("Downloading {}", entry.path));
            self.download_entry(game_id, entry, install_dir, &mut ledger, total, progress)
                .await?;
            if self.options.verify_checksums {
                verify_checksum(install_dir, entry).await?;
            }
            // Crash-durability checkpoint: progress loss is bounded to the
            // in-flight file.
            ledger.save(install_dir)?;
        }

        Self::remove_ledger(install_dir, progress);
        progress.on_finished();
        Ok(())
    }

    fn remove_ledger(install_dir: &Path, progress: &dyn TransferProgress) {
        if let Err(e) = TransferLedger::delete(install_dir) {
            progress.on_status(&format!("warning: could not remove progress file: {e}"));
        }
    }

    /// Fetches one file from its recorded offset, appending to the local
    /// copy. Bytes are written before the ledger counter advances, so the
    /// local length never trails the recorded value.
    async fn download_entry(
        &self,
        game_id: &str,
        entry: &CatalogEntry,
        install_dir: &Path,
        ledger: &mut TransferLedger,
        total: u64,
        progress: &dyn TransferProgress,
    ) -> Result<()> {
        let local_path = install_dir.join(&entry.path);
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let offset = ledger.entry(&entry.path).map_or(0, |e| e.downloaded);
        let url = self.file_url(game_id, &entry.path, offset)?;
        let resp = self.request(url.clone()).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            // The server's copy shrank below the catalog's declared size.
            return Err(Error::Range {
                offset,
                size: entry.size,
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::FileNotFound(entry.path.clone()));
        }
        let resp = Self::check_status(resp, &url, None)?;

        // Append, never truncate: resuming must not discard written bytes.
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&local_path)
            .await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            ledger.record(&entry.path, chunk.len() as u64);
            progress.on_progress(ledger.total_downloaded(), total);
        }
        file.flush().await?;
        Ok(())
    }

    /// Downloads everything from `progress_percent` onward over the
    /// continuous stream endpoint, splitting the single byte stream back
    /// into files via the boundary grammar.
    ///
    /// This is the coarse resume path: it trusts the percentage rather
    /// than the ledger, and the two are independent. The first file is
    /// written from its resolved offset (shorter local copies are
    /// zero-padded up to it); every later file is rewritten from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error on network or filesystem failure, or on a
    /// malformed boundary frame.
    pub async fn download_stream(
        &self,
        game_id: &str,
        install_dir: &Path,
        progress_percent: f64,
        progress: &dyn TransferProgress,
    ) -> Result<()> {
        let start = self.fetch_start_info(game_id, progress_percent).await?;
        if start.start_file_index >= start.files.len() {
            progress.on_status("nothing left to stream");
            progress.on_finished();
            return Ok(());
        }
        tokio::fs::create_dir_all(install_dir).await?;

        let mut url = self.endpoint(["download", "stream", game_id])?;
        url.query_pairs_mut()
            .append_pair("progress", &progress_percent.to_string())
            .append_pair("chunk_size", &self.options.stream_chunk_size.to_string());
        let resp = self.request(url.clone()).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            // The game completed between the start query and this request.
            progress.on_finished();
            return Ok(());
        }
        let resp = Self::check_status(resp, &url, None)?;

        let first = &start.files[start.start_file_index];
        let offset = start.start_file_offset;
        let total = start.files[start.start_file_index..]
            .iter()
            .map(|f| f.size)
            .sum::<u64>()
            - offset;
        let mut done = 0u64;

        // A stream resuming mid-file opens with a boundary marker; one
        // starting at offset zero opens directly with the file's bytes.
        let (mut parser, mut sink) = if offset > 0 {
            (FrameParser::new(StreamStart::Resumed { offset }), None)
        } else {
            progress.on_status(&format!("Streaming {}", first.path));
            (
                FrameParser::new(StreamStart::Content { remaining: first.size }),
                Some(open_stream_target(install_dir, &first.path, 0).await?),
            )
        };
        let mut pending_offset = offset;

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in parser.feed(&chunk)? {
                match event {
                    FrameEvent::Segment(header) => {
                        if let Some(mut file) = sink.take() {
                            file.flush().await?;
                        }
                        progress.on_status(&format!("Streaming {}", header.path));
                        sink = Some(
                            open_stream_target(install_dir, &header.path, pending_offset).await?,
                        );
                        pending_offset = 0;
                    }
                    FrameEvent::Data(data) => {
                        let Some(file) = sink.as_mut() else {
                            return Err(Error::Protocol(
                                "content before any file segment".to_string(),
                            ));
                        };
                        file.write_all(&data).await?;
                        done += data.len() as u64;
                        progress.on_progress(done, total);
                    }
                }
            }
        }
        parser.finish()?;
        if let Some(mut file) = sink {
            file.flush().await?;
        }
        progress.on_finished();
        Ok(())
    }
}

/// Opens a local target for a stream segment: truncated for a fresh file,
/// or positioned at `offset` for the resumed first segment.
async fn open_stream_target(
    install_dir: &Path,
    relative_path: &str,
    offset: u64,
) -> Result<tokio::fs::File> {
    if !catalog::is_clean_relative_path(relative_path) {
        return Err(Error::PathViolation(relative_path.to_string()));
    }
    let path = install_dir.join(relative_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(offset == 0)
        .open(&path)
        .await?;
    if offset > 0 {
        file.set_len(offset).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
    }
    Ok(file)
}

/// Re-hashes a completed file and compares it to the catalog checksum.
async fn verify_checksum(install_dir: &Path, entry: &CatalogEntry) -> Result<()> {
    let path = install_dir.join(&entry.path);
    let actual = tokio::task::spawn_blocking(move || catalog::hash_file(&path))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;
    if actual == entry.checksum {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            path: entry.path.clone(),
            expected: entry.checksum.clone(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_progress_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoProgress>();
    }

    #[test]
    fn default_options_verify() {
        let options = ClientOptions::default();
        assert!(options.verify_checksums);
        assert_eq!(options.stream_chunk_size, 65536);
    }

    #[test]
    fn file_url_encodes_segments_and_offset() {
        let client = DepotClient::new("http://example.test:8000/", None).unwrap();
        let url = client
            .file_url("demo", "sub dir/a.bin", 42)
            .unwrap()
            .to_string();
        assert_eq!(
            url,
            "http://example.test:8000/download/file/demo/sub%20dir/a.bin?offset=42"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = DepotClient::new("http://example.test:8000", None).unwrap();
        let url = client.endpoint(["games", "g1"]).unwrap().to_string();
        assert_eq!(url, "http://example.test:8000/games/g1");
    }

    #[test]
    fn invalid_server_url_is_a_config_error() {
        let client = DepotClient::new("not a url", None).unwrap();
        assert!(matches!(
            client.endpoint(["games"]),
            Err(Error::Config(_))
        ));
    }
}
