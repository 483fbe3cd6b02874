//! Static file responses.
//!
//! Small files go out in one write with a `Content-Length`. Anything above
//! the stream threshold is read `chunk_size` bytes at a time and sent with
//! chunked transfer, so memory use stays flat regardless of file size.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{ByteStream, Response};

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
const DEFAULT_STREAM_THRESHOLD: u64 = 1024 * 1024;

/// Serves files from disk.
#[derive(Clone, Debug)]
pub struct StaticFiles {
    chunk_size: usize,
    stream_threshold: u64,
}

impl StaticFiles {
    /// 8 KiB chunks, streaming above 1 MiB.
    pub fn new() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, stream_threshold: DEFAULT_STREAM_THRESHOLD }
    }

    /// Bytes read per chunk when streaming. Zero is treated as one.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Largest file sent in one write with a `Content-Length`.
    pub fn stream_threshold(mut self, bytes: u64) -> Self {
        self.stream_threshold = bytes;
        self
    }

    /// Builds a response for the file at `path`.
    ///
    /// A missing path, or one that is not a regular file, is an
    /// [`io::ErrorKind::NotFound`] error and maps to `404`.
    pub async fn serve(&self, path: impl AsRef<Path>) -> Result<Response, Error> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        let builder = Response::builder();

        if metadata.len() <= self.stream_threshold {
            let body = tokio::fs::read(path).await?;
            debug!(path = %path.display(), len = body.len(), "serving static file");
            return Ok(builder.bytes(content_type.as_ref(), body));
        }

        debug!(path = %path.display(), len = metadata.len(), chunk = self.chunk_size, "streaming static file");
        let file = File::open(path).await?;
        Ok(builder.stream(content_type.as_ref(), read_chunks(file, self.chunk_size)))
    }

    /// Returns a route handler serving `root/<param>`, where `param` names a
    /// catch-all route segment such as `{*path}`.
    ///
    /// Paths that would leave `root` are answered with `404`.
    pub fn handler(
        self,
        root: impl Into<PathBuf>,
        param: &'static str,
    ) -> impl Fn(Request) -> BoxFuture<Result<Response, Error>> + Send + Sync + 'static {
        let shared = Arc::new((self, root.into()));
        move |req| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                let (files, root) = &*shared;
                let relative = req.param(param).ok_or_else(not_found)?;
                files.serve(resolve(root, relative)?).await
            })
        }
    }
}

impl Default for StaticFiles {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins `relative` onto `root`, rejecting anything but plain names.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf, Error> {
    let relative = Path::new(relative);
    if relative.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(root.join(relative))
    } else {
        Err(not_found())
    }
}

fn not_found() -> Error {
    Error::Io(io::Error::from(io::ErrorKind::NotFound))
}

fn read_chunks(file: File, chunk_size: usize) -> ByteStream {
    stream::try_unfold(file, move |mut file| async move {
        let mut buf = vec![0; chunk_size];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), file)))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[tokio::test]
    async fn small_files_send_content_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "site.css", b"body { margin: 0 }");

        let res = StaticFiles::new().serve(&path).await.unwrap();

        assert!(!res.is_streamed());
        assert_eq!(res.header("content-type"), Some("text/css"));
        assert_eq!(res.header("content-length"), Some("18"));
        assert_eq!(res.body_bytes(), Some(&b"body { margin: 0 }"[..]));
    }

    #[tokio::test]
    async fn large_files_stream_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let contents: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let path = write_file(dir.path(), "blob.bin", &contents);

        let res = StaticFiles::new()
            .stream_threshold(1024)
            .chunk_size(3000)
            .serve(&path)
            .await
            .unwrap();

        assert!(res.is_streamed());
        assert!(res.header("content-length").is_none());
        assert_eq!(res.header("content-type"), Some("application/octet-stream"));
        assert_eq!(res.collect().await.unwrap(), Bytes::from(contents));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticFiles::new().serve(dir.path().join("nope.txt")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = StaticFiles::new().serve(dir.path()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handler_serves_under_root_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        write_file(&dir.path().join("js"), "app.js", b"run()");
        let handler = StaticFiles::new().handler(dir.path(), "path");

        let ok = handler(Request::builder().param("path", "js/app.js").build()).await.unwrap();
        assert_eq!(ok.body_bytes(), Some(&b"run()"[..]));

        let err = handler(Request::builder().param("path", "../etc/passwd").build()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = handler(Request::builder().build()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
