//! Texture handles, asynchronous image loading and mip generation.
//!
//! A texture is created bound to a single white texel and keeps its
//! [`TextureId`] for the rest of the application's life. Image fetches run
//! elsewhere (a worker thread natively, a spawned future in the browser) and
//! only push their results onto a [`LoadQueue`]; the coordinator drains that
//! queue on its own turn, so texture state is only ever mutated from one
//! logical thread.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::backend::RenderBackend;
use super::error::RenderError;

/// Stable handle to a texture owned by the [`TextureManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque white, shown until a texture's image arrives.
pub const PLACEHOLDER_PIXEL: [u8; 4] = [255, 255, 255, 255];

pub fn placeholder_image() -> RgbaImage {
    RgbaImage::from_pixel(1, 1, Rgba(PLACEHOLDER_PIXEL))
}

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Base image followed by successively halved levels, ending at 1x1.
pub fn build_mip_chain(image: &RgbaImage) -> Vec<RgbaImage> {
    let levels = mip_level_count(image.width(), image.height()) as usize;
    let mut chain = Vec::with_capacity(levels);
    chain.push(image.clone());
    let (mut width, mut height) = image.dimensions();
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        let previous = &chain[chain.len() - 1];
        let level = imageops::resize(previous, width, height, FilterType::Triangle);
        chain.push(level);
    }
    chain
}

/// Fails when either side of `size` exceeds the backend's texture limit.
pub fn check_texture_size(
    texture: TextureId,
    (width, height): (u32, u32),
    max_dimension: u32,
) -> Result<(), RenderError> {
    if width > max_dimension || height > max_dimension {
        return Err(RenderError::TextureTooLarge {
            texture: texture.0,
            width,
            height,
            max: max_dimension,
        });
    }
    Ok(())
}

/// Decodes PNG or JPEG bytes into RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, String> {
    image::load_from_memory(bytes)
        .map(|image| image.to_rgba8())
        .map_err(|err| err.to_string())
}

/// Result of one image fetch.
#[derive(Debug)]
pub struct TextureLoad {
    pub texture: TextureId,
    pub url: String,
    pub result: Result<RgbaImage, String>,
}

/// Completed fetches waiting to be applied.
#[derive(Debug, Clone, Default)]
pub struct LoadQueue {
    inner: Arc<Mutex<VecDeque<TextureLoad>>>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, load: TextureLoad) {
        self.inner.lock().push_back(load);
    }

    pub fn drain(&self) -> Vec<TextureLoad> {
        self.inner.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Starts fetching an image and eventually pushes the outcome onto `queue`.
///
/// Fetches are fire-and-forget: there is no cancellation and no retry.
pub trait ImageFetcher {
    fn fetch(&self, url: &str, texture: TextureId, queue: LoadQueue);
}

/// Reads images from disk, relative to a base directory.
#[derive(Debug)]
pub struct FileImageFetcher {
    base_dir: PathBuf,
    blocking: bool,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl FileImageFetcher {
    /// Loads each image on its own worker thread.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            blocking: false,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Loads each image before `fetch` returns.
    pub fn blocking(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            blocking: true,
            ..Self::new(base_dir)
        }
    }

    /// Waits for every outstanding worker.
    pub fn wait(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                warn!("texture loader thread panicked");
            }
        }
    }

    fn load(path: PathBuf) -> Result<RgbaImage, String> {
        let bytes = std::fs::read(&path).map_err(|err| format!("{}: {err}", path.display()))?;
        decode_image(&bytes)
    }
}

impl ImageFetcher for FileImageFetcher {
    fn fetch(&self, url: &str, texture: TextureId, queue: LoadQueue) {
        let path = self.base_dir.join(url);
        let url = url.to_string();
        if self.blocking {
            let result = Self::load(path);
            queue.push(TextureLoad {
                texture,
                url,
                result,
            });
            return;
        }
        let handle = std::thread::spawn(move || {
            let result = Self::load(path);
            queue.push(TextureLoad {
                texture,
                url,
                result,
            });
        });
        self.workers.lock().push(handle);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureState {
    /// Bound to the white placeholder with no fetch in flight.
    Placeholder,
    Loading,
    Ready,
    /// The fetch failed; the placeholder stays bound.
    Failed,
}

/// Owns every texture handle and applies completed loads.
#[derive(Debug, Default)]
pub struct TextureManager {
    slots: Vec<TextureState>,
    by_url: HashMap<String, TextureId>,
    queue: LoadQueue,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that fetchers deliver into.
    pub fn queue(&self) -> LoadQueue {
        self.queue.clone()
    }

    /// Creates a texture bound to the single white placeholder texel.
    pub fn create_placeholder<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<TextureId, RenderError> {
        let id = TextureId(self.slots.len() as u32);
        backend.create_texture(id, &placeholder_image())?;
        self.slots.push(TextureState::Placeholder);
        Ok(id)
    }

    /// Returns a placeholder handle for `url` and starts fetching the image.
    ///
    /// Repeated calls with the same URL return the same handle without
    /// fetching again.
    pub fn begin_load<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        url: &str,
        fetcher: &dyn ImageFetcher,
    ) -> Result<TextureId, RenderError> {
        if let Some(&id) = self.by_url.get(url) {
            return Ok(id);
        }
        let id = self.create_placeholder(backend)?;
        self.slots[id.0 as usize] = TextureState::Loading;
        self.by_url.insert(url.to_string(), id);
        debug!("loading texture {id} from {url}");
        fetcher.fetch(url, id, self.queue.clone());
        Ok(id)
    }

    /// Uploads every completed load. Returns the number of textures whose
    /// content changed.
    pub fn apply_completed<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut applied = 0;
        for load in self.queue.drain() {
            let Some(slot) = self.slots.get_mut(load.texture.0 as usize) else {
                warn!("{}", RenderError::UnknownTexture(load.texture.0));
                continue;
            };
            if *slot == TextureState::Ready {
                debug!("ignoring repeated load of texture {}", load.texture);
                continue;
            }
            let image = match load.result {
                Ok(image) if image.width() > 0 && image.height() > 0 => image,
                Ok(_) => {
                    warn!("failed to load texture {}: image is empty", load.url);
                    *slot = TextureState::Failed;
                    continue;
                }
                Err(reason) => {
                    warn!("failed to load texture {}: {reason}", load.url);
                    *slot = TextureState::Failed;
                    continue;
                }
            };

            let chain = build_mip_chain(&image);
            match backend.write_texture(load.texture, &chain) {
                Ok(()) => {
                    info!(
                        "texture {} ready ({}x{}, {} levels)",
                        load.url,
                        image.width(),
                        image.height(),
                        chain.len()
                    );
                    *slot = TextureState::Ready;
                    applied += 1;
                }
                Err(err) => {
                    warn!("failed to upload texture {}: {err}", load.url);
                    *slot = TextureState::Failed;
                }
            }
        }
        applied
    }

    pub fn state(&self, id: TextureId) -> Option<TextureState> {
        self.slots.get(id.0 as usize).copied()
    }

    pub fn is_ready(&self, id: TextureId) -> bool {
        self.state(id) == Some(TextureState::Ready)
    }

    /// Textures whose fetch has not completed yet.
    pub fn pending(&self) -> usize {
        self.slots
            .iter()
            .filter(|state| **state == TextureState::Loading)
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
