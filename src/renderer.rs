use std::ffi::OsStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use tracing::debug;

/// Everything the renderer needs to produce one screenshot.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    pub full_page: bool,
    pub background_color: String,
}

pub const DEFAULT_BACKGROUND: &str = "#ffffff";

/// Selector that marks the form as mounted.
const FORM_SELECTOR: &str = "div#form";
const SELECTOR_TIMEOUT: Duration = Duration::from_secs(30);
const IMAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
const IMAGE_POLL: Duration = Duration::from_millis(250);

const IMAGES_SETTLED_JS: &str =
    "Array.from(document.querySelectorAll('img')).every((img) => img.complete && img.naturalHeight > 0)";

const PAGE_METRICS_JS: &str = "JSON.stringify({width: document.documentElement.scrollWidth, height: document.documentElement.scrollHeight})";

/// Render `request.url` to PNG bytes in an isolated headless Chrome.
///
/// Blocking; call through `spawn_blocking`. The browser closes when this
/// returns, success or error, via `Browser`'s `Drop`.
pub fn render(request: &RenderRequest) -> Result<Vec<u8>> {
    let options = LaunchOptions {
        headless: true,
        sandbox: false,
        window_size: Some((1280, 800)),
        args: vec![OsStr::new("--hide-scrollbars")],
        idle_browser_timeout: Duration::from_secs(120),
        ..Default::default()
    };
    let browser = Browser::new(options).context("browser launch failed")?;
    let tab = browser.new_tab()?;

    tab.navigate_to(&request.url)?;
    tab.wait_until_navigated()?;
    tab.wait_for_element_with_custom_timeout(FORM_SELECTOR, SELECTOR_TIMEOUT)?;
    wait_for_images(&tab)?;

    tab.evaluate(&style_override_js(&request.background_color), false)?;

    let clip = if request.full_page { Some(page_clip(&tab)?) } else { None };
    let bytes = tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, clip, true)?;
    debug!(bytes = bytes.len(), url = %request.url, "captured screenshot");
    Ok(bytes)
}

/// Wait until every `<img>` reports a completed load with a real height.
/// Bounded: a page whose images never settle fails the render instead of
/// hanging the request.
fn wait_for_images(tab: &Tab) -> Result<()> {
    let deadline = Instant::now() + IMAGE_LOAD_TIMEOUT;
    loop {
        let settled = tab
            .evaluate(IMAGES_SETTLED_JS, false)?
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(true);
        if settled {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("images did not finish loading within {IMAGE_LOAD_TIMEOUT:?}");
        }
        std::thread::sleep(IMAGE_POLL);
    }
}

/// Forces the layout containers to auto-size so a full-page capture hugs the
/// form, and applies the requested background color.
fn style_override_js(background_color: &str) -> String {
    format!(
        "(() => {{\n\
         const style = document.createElement('style');\n\
         style.textContent = 'html, body, div#__next, main {{ height: auto !important; width: auto !important; background-color: {background_color}; }}';\n\
         document.head.appendChild(style);\n\
         }})()"
    )
}

#[derive(Debug, PartialEq, Deserialize)]
struct PageMetrics {
    width: f64,
    height: f64,
}

/// Measure the scrollable page so a full-page capture spans all of it.
fn page_clip(tab: &Tab) -> Result<Page::Viewport> {
    let raw = tab
        .evaluate(PAGE_METRICS_JS, false)?
        .value
        .and_then(|value| value.as_str().map(String::from))
        .context("page metrics script returned nothing")?;
    let metrics = parse_page_metrics(&raw)?;
    Ok(Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: metrics.width,
        height: metrics.height,
        scale: 1.0,
    })
}

fn parse_page_metrics(raw: &str) -> Result<PageMetrics> {
    serde_json::from_str(raw).with_context(|| format!("unexpected page metrics payload: {raw}"))
}
