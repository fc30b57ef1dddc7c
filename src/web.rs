#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::{Array, Promise, Uint8Array};
use log::{error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{HtmlCanvasElement, Response};

use crate::app::{Application, ErrorReporter, ViewerConfig};
use crate::geometry::BuiltinGeometry;
use crate::logging::{init_logging, LoggingConfig};
use crate::render::texture::decode_image;
use crate::render::{
    ImageFetcher, LoadQueue, RenderError, ShaderSources, ShadingAlgorithm, TextureId, TextureLoad,
    WgpuBackend,
};
use crate::scene::SceneDescription;

type SharedApp = Rc<RefCell<Application<WgpuBackend>>>;

#[wasm_bindgen(start)]
pub fn start() {
    init_logging(LoggingConfig::default());
}

/// Viewer bound to a canvas element.
#[wasm_bindgen]
pub struct ShadeApp {
    inner: SharedApp,
    image_base_url: String,
}

#[wasm_bindgen]
impl ShadeApp {
    /// Creates the GPU context on `canvas_id`, fetches the ten shader
    /// sources from `shader_base_url` and renders the first frame.
    pub async fn create(
        canvas_id: String,
        shader_base_url: String,
        image_base_url: String,
    ) -> Result<ShadeApp, JsValue> {
        let reporter = AlertReporter;
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("window not available"))?;
        let canvas = window
            .document()
            .ok_or_else(|| JsValue::from_str("document not available"))?
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;

        let config = ViewerConfig {
            width: canvas.width().max(1),
            height: canvas.height().max(1),
            ..ViewerConfig::default()
        };
        let backend = match WgpuBackend::new(
            wgpu::SurfaceTarget::Canvas(canvas),
            config.width,
            config.height,
        )
        .await
        {
            Ok(backend) => backend,
            Err(err) => {
                reporter.alert(&err.to_string());
                return Err(to_js(err));
            }
        };

        let sources = fetch_shader_sources(&window, &shader_base_url)
            .await
            .map_err(|err| {
                error!("initialization aborted: {err}");
                to_js(err)
            })?;

        let app = Application::initialize(
            backend,
            config,
            &sources,
            &BuiltinGeometry::default(),
            &reporter,
        )
        .map_err(to_js)?;
        info!("viewer ready on #{canvas_id}");

        Ok(Self {
            inner: Rc::new(RefCell::new(app)),
            image_base_url,
        })
    }

    /// Parses a scene file and replaces the current scene with it.
    pub fn load_scene(&self, xml: &str) -> Result<(), JsValue> {
        let description = SceneDescription::from_xml(xml)
            .map_err(|err| JsValue::from_str(&format!("failed to parse scene XML: {err:#}")))?;
        let fetcher = BrowserImageFetcher {
            base_url: self.image_base_url.clone(),
            app: Rc::downgrade(&self.inner),
        };
        self.inner
            .borrow_mut()
            .load_scene(&description, &fetcher)
            .map_err(to_js)
    }

    /// Switches between `"gouraud"` and `"phong"` shading.
    pub fn set_shading_algorithm(&self, algorithm: &str) -> Result<(), JsValue> {
        let algorithm: ShadingAlgorithm = algorithm
            .parse()
            .map_err(|err: anyhow::Error| JsValue::from_str(&err.to_string()))?;
        self.inner
            .borrow_mut()
            .set_shading_algorithm(algorithm)
            .map_err(to_js)
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<(), JsValue> {
        self.inner.borrow_mut().resize(width, height).map_err(to_js)
    }

    pub fn render(&self) -> Result<(), JsValue> {
        self.inner.borrow_mut().render().map_err(to_js)
    }
}

/// Shows user-visible failures with `window.alert`.
struct AlertReporter;

impl ErrorReporter for AlertReporter {
    fn alert(&self, message: &str) {
        error!("{message}");
        if let Some(window) = web_sys::window() {
            let _ = window.alert_with_message(message);
        }
    }
}

/// Fetches images over HTTP and re-renders the viewer as each one lands.
struct BrowserImageFetcher {
    base_url: String,
    app: Weak<RefCell<Application<WgpuBackend>>>,
}

impl ImageFetcher for BrowserImageFetcher {
    fn fetch(&self, url: &str, texture: TextureId, queue: LoadQueue) {
        let location = join_url(&self.base_url, url);
        let url = url.to_string();
        let app = Weak::clone(&self.app);
        spawn_local(async move {
            let result = fetch_bytes(&location)
                .await
                .and_then(|bytes| decode_image(&bytes));
            queue.push(TextureLoad {
                texture,
                url,
                result,
            });
            let Some(app) = app.upgrade() else {
                return;
            };
            // Loads finishing while the viewer is busy are applied on the next completion.
            let Ok(mut app) = app.try_borrow_mut() else {
                return;
            };
            if let Err(err) = app.process_texture_loads() {
                warn!("failed to render after texture load: {err}");
            }
        });
    }
}

/// Issues every shader request at once and succeeds only if all of them do.
async fn fetch_shader_sources(
    window: &web_sys::Window,
    base_url: &str,
) -> Result<ShaderSources, RenderError> {
    let names: Vec<String> = ShaderSources::files()
        .map(|(variant, stage)| ShaderSources::file_name(variant, stage))
        .collect();
    let requests: Array = names
        .iter()
        .map(|name| window.fetch_with_str(&join_url(base_url, name)))
        .collect();
    let responses = JsFuture::from(Promise::all(&requests))
        .await
        .map_err(|err| RenderError::ResourceFetch {
            name: "shader sources".to_string(),
            reason: describe(&err),
        })?;
    let responses: Array = responses.unchecked_into();

    let mut texts = Vec::with_capacity(names.len());
    for (name, response) in names.iter().zip(responses.iter()) {
        texts.push(response_text(name, response));
    }
    let mut sources = Vec::with_capacity(texts.len());
    for (name, text) in names.iter().zip(texts) {
        let source = match text {
            Ok(promise) => JsFuture::from(promise)
                .await
                .map_err(|err| fetch_failure(name, &err))
                .and_then(|value| {
                    value.as_string().ok_or_else(|| RenderError::ResourceFetch {
                        name: name.clone(),
                        reason: "response body is not text".to_string(),
                    })
                }),
            Err(err) => Err(err),
        };
        sources.push(source);
    }
    ShaderSources::try_collect(sources)
}

fn response_text(name: &str, response: JsValue) -> Result<Promise, RenderError> {
    let response: Response = response
        .dyn_into()
        .map_err(|value| fetch_failure(name, &value))?;
    if !response.ok() {
        return Err(RenderError::ResourceFetch {
            name: name.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    response.text().map_err(|err| fetch_failure(name, &err))
}

async fn fetch_bytes(location: &str) -> Result<Vec<u8>, String> {
    let window = web_sys::window().ok_or_else(|| "window not available".to_string())?;
    let response = JsFuture::from(window.fetch_with_str(location))
        .await
        .map_err(|err| describe(&err))?;
    let response: Response = response.dyn_into().map_err(|value| describe(&value))?;
    if !response.ok() {
        return Err(format!("{location}: HTTP {}", response.status()));
    }
    let buffer = JsFuture::from(response.array_buffer().map_err(|err| describe(&err))?)
        .await
        .map_err(|err| describe(&err))?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

fn join_url(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

fn fetch_failure(name: &str, err: &JsValue) -> RenderError {
    RenderError::ResourceFetch {
        name: name.to_string(),
        reason: describe(err),
    }
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn to_js(err: RenderError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
