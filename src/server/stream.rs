//! Byte-range file delivery and the continuous multi-file stream.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;

use super::{AppState, require_api_key, scan_game};
use crate::catalog::{self, CatalogEntry};
use crate::error::{Error, Result};
use crate::framing::SegmentHeader;
use crate::resolve;

/// Read size for range delivery bodies.
const RANGE_CHUNK_SIZE: usize = 64 * 1024;

/// Bounds for the continuous stream's `chunk_size` query parameter.
const MIN_STREAM_CHUNK: u64 = 1024;
const MAX_STREAM_CHUNK: u64 = 1024 * 1024;
const DEFAULT_STREAM_CHUNK: u64 = 64 * 1024;

/// Resolves a client-supplied relative path against a game root.
///
/// The path must stay a descendant of the root: absolute paths and any
/// `..` traversal are rejected, whether or not a file exists there.
fn resolve_under_root(root: &Path, relative: &str) -> Result<PathBuf> {
    if catalog::is_clean_relative_path(relative) {
        Ok(root.join(relative))
    } else {
        Err(Error::PathViolation(relative.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FileQuery {
    #[serde(default)]
    offset: u64,
}

/// `GET /download/file/{game_id}/{path}?offset=O` serves one file, in full
/// (200) from offset zero or as partial content (206) from a byte offset.
pub(super) async fn download_file(
    UrlPath((game_id, file_path)): UrlPath<(String, String)>,
    Query(query): Query<FileQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    require_api_key(&state, &headers)?;
    let game = state
        .config
        .game(&game_id)
        .ok_or_else(|| Error::GameNotFound(game_id.clone()))?;

    let full_path = resolve_under_root(&game.directory, &file_path)?;
    let meta = tokio::fs::metadata(&full_path)
        .await
        .map_err(|_| Error::FileNotFound(file_path.clone()))?;
    if !meta.is_file() {
        return Err(Error::FileNotFound(file_path));
    }
    let size = meta.len();
    if query.offset >= size {
        return Err(Error::Range {
            offset: query.offset,
            size,
        });
    }

    let filename = full_path
        .file_name()
        .map_or_else(|| file_path.clone(), |n| n.to_string_lossy().into_owned());
    let mut file = tokio::fs::File::open(&full_path).await?;

    if query.offset == 0 {
        let body = Body::from_stream(ReaderStream::with_capacity(file, RANGE_CHUNK_SIZE));
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            body,
        )
            .into_response());
    }

    file.seek(SeekFrom::Start(query.offset)).await?;
    let remaining = size - query.offset;
    let body = Body::from_stream(ReaderStream::with_capacity(
        file.take(remaining),
        RANGE_CHUNK_SIZE,
    ));
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{size}", query.offset, size - 1),
            ),
            (header::CONTENT_LENGTH, remaining.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamQuery {
    #[serde(default)]
    progress: f64,
    #[serde(default = "default_chunk_size")]
    chunk_size: u64,
}

const fn default_chunk_size() -> u64 {
    DEFAULT_STREAM_CHUNK
}

/// `GET /download/stream/{game_id}?progress=P&chunk_size=C` serves every file
/// from the resolved resume point onward as one continuous stream, with
/// boundary markers before each non-initial segment.
pub(super) async fn stream_game(
    UrlPath(game_id): UrlPath<String>,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    require_api_key(&state, &headers)?;
    let game = state
        .config
        .game(&game_id)
        .ok_or_else(|| Error::GameNotFound(game_id.clone()))?;

    let (files, _) = scan_game(game).await?;
    if files.is_empty() {
        return Err(Error::EmptyCatalog(game_id));
    }

    let progress = query.progress.clamp(0.0, 100.0);
    let chunk_size = query.chunk_size.clamp(MIN_STREAM_CHUNK, MAX_STREAM_CHUNK);
    let sizes: Vec<u64> = files.iter().map(|f| f.size).collect();
    let point = resolve::resolve_start(&sizes, progress);
    if point.is_exhausted(files.len()) {
        return Err(Error::NothingToStream(game_id));
    }

    // Advisory only: not recomputed if a file proves missing mid-stream,
    // and the boundary markers themselves add bytes on top.
    let total_remaining: u64 =
        sizes[point.file_index..].iter().sum::<u64>() - point.byte_offset;
    let start_path = files[point.file_index].path.clone();
    let file_count = files.len();

    log::info!(
        "streaming {game_id} from file {} ({start_path}) offset {}",
        point.file_index,
        point.byte_offset
    );

    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(4);
    #[allow(clippy::cast_possible_truncation)]
    let chunk_size = chunk_size as usize;
    tokio::spawn(stream_files(
        game.directory.clone(),
        files,
        point.file_index,
        point.byte_offset,
        chunk_size,
        tx,
    ));

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{game_id}.stream\""),
            ),
            (HeaderName::from_static("x-game-id"), game_id),
            (
                HeaderName::from_static("x-start-file-index"),
                point.file_index.to_string(),
            ),
            (HeaderName::from_static("x-start-file-path"), start_path),
            (
                HeaderName::from_static("x-total-files"),
                file_count.to_string(),
            ),
            (
                HeaderName::from_static("x-total-size"),
                total_remaining.to_string(),
            ),
            (
                HeaderName::from_static("x-current-progress"),
                progress.to_string(),
            ),
        ],
        body,
    )
        .into_response())
}

/// Producer task for the continuous stream. Missing files are skipped
/// without a boundary for the gap; read errors end the stream.
async fn stream_files(
    root: PathBuf,
    files: Vec<CatalogEntry>,
    start_index: usize,
    start_offset: u64,
    chunk_size: usize,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
) {
    for (i, entry) in files.iter().enumerate().skip(start_index) {
        let offset = if i == start_index { start_offset } else { 0 };

        let Ok(path) = resolve_under_root(&root, &entry.path) else {
            continue;
        };
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(_) => {
                log::warn!("skipping missing file in stream: {}", entry.path);
                continue;
            }
        };

        // Every segment after the first, and a first segment resuming
        // mid-file, is preceded by a boundary marker.
        if i > start_index || offset > 0 {
            let header = SegmentHeader {
                path: entry.path.clone(),
                size: entry.size,
            };
            if tx.send(Ok(header.encode())).await.is_err() {
                return;
            }
        }

        if offset > 0
            && let Err(e) = file.seek(SeekFrom::Start(offset)).await
        {
            let _ = tx.send(Err(e)).await;
            return;
        }

        let mut buf = vec![0u8; chunk_size];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx
                        .send(Ok(Bytes::copy_from_slice(&buf[..n])))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}
