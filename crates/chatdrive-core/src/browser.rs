//! [`ChatPage`] backed by a real Chrome through `eoka`.

use std::time::Duration;

use async_trait::async_trait;
use eoka::cdp::KeyEventType;
use eoka::{Browser, Page};
use serde::Deserialize;
use tracing::debug;

use crate::config::{BrowserConfig, ReadyCondition};
use crate::page::{ChatPage, InputKind, InputSurface, ReplyObservation};
use crate::{Error, Result};

/// Network idle window used for [`ReadyCondition::NetworkIdle`].
const NETWORK_IDLE_MS: u64 = 500;

/// Text of the last element matching a selector, or null.
const QUERY_LAST_JS: &str = r#"(() => {
    const els = document.querySelectorAll(arguments[0]);
    if (!els.length) return null;
    return (els[els.length - 1].textContent || '').trim();
})()"#;

/// First selector (in order) with a match, plus what kind of input it is.
const FIND_INPUT_JS: &str = r#"(() => {
    for (const sel of arguments[0]) {
        let el;
        try { el = document.querySelector(sel); } catch (e) { continue; }
        if (!el) continue;
        return JSON.stringify({ selector: sel, tag: el.tagName, editable: !!el.isContentEditable });
    }
    return null;
})()"#;

/// Assign through the native setter so framework-controlled inputs notice.
const SET_VALUE_JS: &str = r#"(() => {
    const el = document.querySelector(arguments[0]);
    if (!el) return false;
    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
    if (setter) setter.call(el, arguments[1]); else el.value = arguments[1];
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
})()"#;

/// Click whatever sits at a viewport fraction and focus it.
const CLICK_AT_JS: &str = r#"(() => {
    const x = window.innerWidth * arguments[0];
    const y = window.innerHeight * arguments[1];
    const el = document.elementFromPoint(x, y);
    if (!el) return false;
    el.dispatchEvent(new MouseEvent('mousedown', { bubbles: true, clientX: x, clientY: y }));
    el.dispatchEvent(new MouseEvent('mouseup', { bubbles: true, clientX: x, clientY: y }));
    el.click();
    if (typeof el.focus === 'function') el.focus();
    return true;
})()"#;

#[derive(Deserialize)]
struct RawInput {
    selector: String,
    tag: String,
    editable: bool,
}

/// Substitute `arguments[i]` placeholders with JSON-encoded values.
///
/// Single pass over `script`, so placeholder-like text inside a substituted
/// value is left alone. Indices without a matching arg are kept verbatim.
fn with_args(script: &str, args: &[serde_json::Value]) -> String {
    const PLACEHOLDER: &str = "arguments[";

    let mut js = String::with_capacity(script.len());
    let mut rest = script;
    while let Some(pos) = rest.find(PLACEHOLDER) {
        js.push_str(&rest[..pos]);
        let after = &rest[pos + PLACEHOLDER.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let arg = after[..digits]
            .parse::<usize>()
            .ok()
            .filter(|_| after[digits..].starts_with(']'))
            .and_then(|i| args.get(i));
        match arg {
            Some(value) => {
                js.push_str(&value.to_string());
                rest = &after[digits + 1..];
            }
            None => {
                js.push_str(PLACEHOLDER);
                rest = after;
            }
        }
    }
    js.push_str(rest);
    js
}

/// CDP `key` and `text` for one typed character.
fn keystroke(ch: char) -> (String, String) {
    match ch {
        '\n' | '\r' => ("Enter".into(), "\r".into()),
        '\t' => ("Tab".into(), "\t".into()),
        _ => (ch.to_string(), ch.to_string()),
    }
}

/// A browser plus the one page the conversation lives in.
pub struct EokaPage {
    browser: Option<Browser>,
    page: Page,
}

impl EokaPage {
    /// Launch Chrome and open a blank page.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.width,
            viewport_height: config.viewport.height,
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser: Some(browser),
            page,
        })
    }

    /// Get a reference to the underlying page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    fn ensure_open(&self) -> Result<()> {
        if self.browser.is_none() {
            return Err(Error::Browser(eoka::Error::CdpSimple(
                "browser already closed".into(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPage for EokaPage {
    async fn navigate(&self, url: &str, ready: &ReadyCondition, timeout_ms: u64) -> Result<()> {
        self.ensure_open()?;
        let load = async {
            self.page.goto(url).await?;
            match ready {
                ReadyCondition::Load => {}
                ReadyCondition::NetworkIdle => {
                    self.page
                        .wait_for_network_idle(NETWORK_IDLE_MS, timeout_ms)
                        .await?;
                }
                ReadyCondition::Selector(sel) => {
                    self.page.wait_for(sel, timeout_ms).await?;
                }
            }
            Ok::<(), Error>(())
        };
        tokio::time::timeout(Duration::from_millis(timeout_ms), load)
            .await
            .map_err(|_| Error::Timeout(format!("navigating to {} ({})", url, ready)))?
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.ensure_open()?;
        self.page
            .execute("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn query_last(&self, selector: &str) -> Result<ReplyObservation> {
        self.ensure_open()?;
        let js = with_args(QUERY_LAST_JS, &[serde_json::json!(selector)]);
        let text: Option<String> = self
            .page
            .evaluate(&js)
            .await
            .map_err(|e| Error::ReplyReadFailed(e.to_string()))?;
        Ok(match text {
            Some(t) => ReplyObservation::present(t),
            None => ReplyObservation::absent(),
        })
    }

    async fn find_input(&self, selectors: &[String]) -> Result<Option<InputSurface>> {
        self.ensure_open()?;
        let js = with_args(FIND_INPUT_JS, &[serde_json::json!(selectors)]);
        let found: Option<String> = self.page.evaluate(&js).await?;
        let Some(json_str) = found else {
            return Ok(None);
        };
        let raw: RawInput = serde_json::from_str(&json_str)
            .map_err(|e| eoka::Error::CdpSimple(format!("input probe parse error: {}", e)))?;
        Ok(Some(InputSurface {
            kind: InputKind::classify(&raw.tag, raw.editable),
            selector: raw.selector,
        }))
    }

    async fn focus(&self, surface: &InputSurface) -> Result<()> {
        self.ensure_open()?;
        self.page.click(&surface.selector).await?;
        Ok(())
    }

    async fn set_value(&self, surface: &InputSurface, text: &str) -> Result<()> {
        self.ensure_open()?;
        let js = with_args(
            SET_VALUE_JS,
            &[serde_json::json!(surface.selector), serde_json::json!(text)],
        );
        let assigned: bool = self.page.evaluate(&js).await?;
        if !assigned {
            return Err(Error::InputNotFound(surface.selector.clone()));
        }
        Ok(())
    }

    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        self.ensure_open()?;
        // keyDown carrying text fires keydown, keypress and input like a real key
        let session = self.page.session();
        for ch in text.chars() {
            let (key, typed) = keystroke(ch);
            session
                .dispatch_key_event(
                    KeyEventType::KeyDown,
                    Some(key.as_str()),
                    Some(typed.as_str()),
                    None,
                )
                .await?;
            session
                .dispatch_key_event(KeyEventType::KeyUp, Some(key.as_str()), None, None)
                .await?;
            if delay_ms > 0 {
                self.page.wait(delay_ms).await;
            }
        }
        Ok(())
    }

    async fn click_at(&self, x_ratio: f64, y_ratio: f64) -> Result<()> {
        self.ensure_open()?;
        let js = with_args(
            CLICK_AT_JS,
            &[serde_json::json!(x_ratio), serde_json::json!(y_ratio)],
        );
        let clicked: bool = self.page.evaluate(&js).await?;
        if !clicked {
            debug!("Nothing under viewport point ({}, {})", x_ratio, y_ratio);
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn sleep(&self, ms: u64) {
        self.page.wait(ms).await;
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            debug!("Closing browser");
            browser.close().await?;
        }
        Ok(())
    }
}
