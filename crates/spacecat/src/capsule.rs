//! [`Capsule`]: an in-memory site that can be edited over Titan.
//!
//! A Titan upload to any path stores the body (and its mime type) under that
//! path and redirects the client to the `gemini://` URL of the new page.
//! Gemini requests serve stored pages; `/` falls back to an index of every
//! stored path when no page has been uploaded there. A directory path ending
//! in `/` serves its `index.gmi`.
//!
//! [`CREATE_PATH`] creates a page whose path the client does not know in
//! advance:
//! 1. `gemini://host/new` asks for a file path (`10 Enter a file path.`).
//! 2. `gemini://host/new?notes/today.gmi` redirects to the same URL over `titan://`.
//! 3. The Titan upload to `titan://host/new?notes/today.gmi` is stored under
//!    `/notes/today.gmi` and the client is sent to `gemini://host/notes/today.gmi`.
//!
//! The store holds at most [`Capsule::max_bytes`] of page bodies. An upload
//! that would overflow it is refused with `50` before its body is read.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use protocol::Status;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::server::pattern::{PatternError, WILDCARD};
use crate::server::{handler, HandlerResult, Request, Response, Router};

/// Default budget for stored page bodies (64 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Path of the page-creation flow.
pub const CREATE_PATH: &str = "/new";

const INDEX_FILE: &str = "index.gmi";

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub mime: String,
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct Store {
    pages: BTreeMap<String, Page>,
    bytes: u64,
}

impl Store {
    /// Bytes held once `path` is replaced by a body of `size` bytes.
    fn bytes_after(&self, path: &str, size: u64) -> u64 {
        let replaced = self.pages.get(path).map_or(0, |p| p.body.len() as u64);
        self.bytes - replaced + size
    }

    fn insert(&mut self, path: String, page: Page) {
        self.bytes += page.body.len() as u64;
        if let Some(old) = self.pages.insert(path, page) {
            self.bytes -= old.body.len() as u64;
        }
    }
}

/// Shared page store, keyed by request path.
#[derive(Clone, Debug)]
pub struct Capsule {
    store: Arc<RwLock<Store>>,
    max_bytes: u64,
}

impl Default for Capsule {
    fn default() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_BYTES)
    }
}

impl Capsule {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty capsule holding at most `max_bytes` of page bodies.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Register the page-creation, upload (Titan) and serving (Gemini) routes on `router`.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the patterns are fixed and always compile.
    pub fn mount(&self, router: &mut Router) -> Result<(), PatternError> {
        let creator = self.clone();
        router.use_at(
            CREATE_PATH,
            handler(move |req| {
                let creator = creator.clone();
                Box::pin(async move { creator.create(req).await })
            }),
        )?;

        let uploads = self.clone();
        router.put(
            WILDCARD,
            handler(move |req| {
                let uploads = uploads.clone();
                Box::pin(async move { uploads.upload(req).await })
            }),
        )?;

        let pages = self.clone();
        router.get(
            WILDCARD,
            handler(move |req| {
                let pages = pages.clone();
                Box::pin(async move { pages.serve(req).await })
            }),
        )?;
        Ok(())
    }

    /// Number of stored pages.
    pub async fn len(&self) -> usize {
        self.store.read().await.pages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.pages.is_empty()
    }

    /// Total bytes of stored page bodies.
    pub async fn bytes(&self) -> u64 {
        self.store.read().await.bytes
    }

    pub async fn page(&self, path: &str) -> Option<Page> {
        self.store.read().await.pages.get(path).cloned()
    }

    async fn create(&self, req: &mut Request) -> HandlerResult {
        let Some(query) = req.query() else {
            return Ok(Some(Response::request_input("Enter a file path.")));
        };
        let Some(path) = sanitize_path(query) else {
            return Ok(Some(Response::request_input("Enter a file path.")));
        };

        if req.titan().is_none() {
            let mut target = req.url().clone();
            target
                .set_scheme("titan")
                .map_err(|()| anyhow!("cannot rewrite {target} as a titan URL"))?;
            return Ok(Some(Response::redirect(target)));
        }

        if let Some(refused) = self.store_upload(req, path.clone()).await? {
            return Ok(Some(refused));
        }

        // `notes/index.gmi` is served as `notes/`.
        let shown = match path.strip_suffix(INDEX_FILE) {
            Some(dir) if dir.ends_with('/') => dir.to_owned(),
            _ => path,
        };
        let mut target = req.url().clone();
        target.set_path(&shown);
        gemini_redirect(target)
    }

    async fn upload(&self, req: &mut Request) -> HandlerResult {
        let path = req.path().to_owned();
        if let Some(refused) = self.store_upload(req, path).await? {
            return Ok(Some(refused));
        }
        gemini_redirect(req.url().clone())
    }

    /// Read the upload body of `req` and store it under `path`.
    ///
    /// Returns the refusal to send instead when the page would not fit.
    async fn store_upload(
        &self,
        req: &mut Request,
        path: String,
    ) -> anyhow::Result<Option<Response>> {
        let Some(upload) = req.titan_mut() else {
            return Ok(None);
        };
        if !self.fits(&*self.store.read().await, &path, upload.size()) {
            return Ok(Some(self.full(&path, upload.size())));
        }

        let mime = upload.mime().to_owned();
        let body = upload
            .body_mut()
            .collect()
            .await
            .context("failed to read upload body")?;
        let size = body.len() as u64;

        // Other uploads may have landed while the body was read.
        let mut store = self.store.write().await;
        if !self.fits(&store, &path, size) {
            return Ok(Some(self.full(&path, size)));
        }
        info!(path = %path, size, mime = %mime, "page stored");
        store.insert(path, Page { mime, body });
        Ok(None)
    }

    fn fits(&self, store: &Store, path: &str, size: u64) -> bool {
        store.bytes_after(path, size) <= self.max_bytes
    }

    fn full(&self, path: &str, size: u64) -> Response {
        warn!(path = %path, size, max_bytes = self.max_bytes, "capsule full, upload refused");
        Response::status(Status::PermanentFailure, "Capsule is full.")
    }

    async fn serve(&self, req: &Request) -> HandlerResult {
        let store = self.store.read().await;
        let path = req.path();
        let page = match store.pages.get(path) {
            Some(page) => Some(page),
            None if path.ends_with('/') => store.pages.get(&format!("{path}{INDEX_FILE}")),
            None => None,
        };
        if let Some(page) = page {
            return Ok(Some(Response::send_with_mime(
                page.body.clone(),
                page.mime.clone(),
            )));
        }
        if path == "/" {
            return Ok(Some(Response::send(index(&store.pages))));
        }
        Ok(None)
    }
}

/// Redirect to `target` over `gemini://`, without query or fragment.
fn gemini_redirect(mut target: Url) -> HandlerResult {
    target
        .set_scheme("gemini")
        .map_err(|()| anyhow!("cannot rewrite {target} as a gemini URL"))?;
    target.set_query(None);
    target.set_fragment(None);
    Ok(Some(Response::redirect(target)))
}

/// Turn a client-supplied file path into a store key: `.`, `..` and empty
/// segments are dropped. `None` when nothing is left.
fn sanitize_path(raw: &str) -> Option<String> {
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(format!("/{}", segments.join("/")))
}

fn index(pages: &BTreeMap<String, Page>) -> String {
    let mut out = String::from("# spacecat\n\n");
    let _ = writeln!(out, "=> {CREATE_PATH} Create a page\n");
    if pages.is_empty() {
        out.push_str("Nothing here yet. Upload a page with Titan to any path.\n");
        return out;
    }
    for (path, page) in pages {
        let _ = writeln!(out, "=> {path} {path} ({}, {} bytes)", page.mime, page.body.len());
    }
    out
}
