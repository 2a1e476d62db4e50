//! Keyboard interaction checks
//!
//! Six fixed checks, each a Playwright script body that presses keys on a
//! live page and reports `passed` plus whatever evidence it gathered.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{RunnerError, RunnerResult};
use crate::playwright::{PageScript, ScriptRunner};
use crate::report::ReportDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyboardCheck {
    TabNavigation,
    ArrowNavigation,
    EnterSpaceActivation,
    SkipLinks,
    KeyboardTraps,
    FocusVisibility,
}

impl KeyboardCheck {
    pub const ALL: [KeyboardCheck; 6] = [
        KeyboardCheck::TabNavigation,
        KeyboardCheck::ArrowNavigation,
        KeyboardCheck::EnterSpaceActivation,
        KeyboardCheck::SkipLinks,
        KeyboardCheck::KeyboardTraps,
        KeyboardCheck::FocusVisibility,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            KeyboardCheck::TabNavigation => "tab-navigation",
            KeyboardCheck::ArrowNavigation => "arrow-navigation",
            KeyboardCheck::EnterSpaceActivation => "enter-space-activation",
            KeyboardCheck::SkipLinks => "skip-links",
            KeyboardCheck::KeyboardTraps => "keyboard-traps",
            KeyboardCheck::FocusVisibility => "focus-visibility",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyboardCheck::TabNavigation => "Tab Navigation",
            KeyboardCheck::ArrowNavigation => "Arrow Key Navigation",
            KeyboardCheck::EnterSpaceActivation => "Enter/Space Activation",
            KeyboardCheck::SkipLinks => "Skip Links",
            KeyboardCheck::KeyboardTraps => "Keyboard Traps",
            KeyboardCheck::FocusVisibility => "Focus Visibility",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            KeyboardCheck::TabNavigation => {
                "Tab moves focus through interactive elements in a logical order"
            }
            KeyboardCheck::ArrowNavigation => {
                "Arrow keys move focus inside menus, tab lists, list boxes and radio groups"
            }
            KeyboardCheck::EnterSpaceActivation => "Buttons activate with both Enter and Space",
            KeyboardCheck::SkipLinks => "The first Tab stop is a skip link to the main content",
            KeyboardCheck::KeyboardTraps => "Focus never gets stuck on a single element",
            KeyboardCheck::FocusVisibility => "Focused elements show a visible focus indicator",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    fn body(&self) -> &'static str {
        match self {
            KeyboardCheck::TabNavigation => TAB_NAVIGATION,
            KeyboardCheck::ArrowNavigation => ARROW_NAVIGATION,
            KeyboardCheck::EnterSpaceActivation => ENTER_SPACE_ACTIVATION,
            KeyboardCheck::SkipLinks => SKIP_LINKS,
            KeyboardCheck::KeyboardTraps => KEYBOARD_TRAPS,
            KeyboardCheck::FocusVisibility => FOCUS_VISIBILITY,
        }
    }
}

const TAB_NAVIGATION: &str = r#"const stops = [];
for (let i = 0; i < 25; i++) {
  await page.keyboard.press('Tab');
  const stop = await page.evaluate(() => {
    const el = document.activeElement;
    if (!el || el === document.body) return null;
    return {
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      label: (el.getAttribute('aria-label') || el.innerText || '').trim().slice(0, 60)
    };
  });
  if (!stop) break;
  stops.push(stop);
  if (i === 0) await shot('first-stop');
}
await shot('last-stop');
result = { passed: stops.length > 0, focusableCount: stops.length, focusOrder: stops };"#;

const ARROW_NAVIGATION: &str = r#"const widget = await page.$('[role="menu"], [role="menubar"], [role="tablist"], [role="listbox"], [role="radiogroup"]');
if (!widget) {
  result = { passed: true, skipped: true, reason: 'No composite widgets found' };
} else {
  const item = await widget.$('[role="menuitem"], [role="tab"], [role="option"], [role="radio"], [tabindex]');
  if (item) await item.focus();
  const current = () => page.evaluate(() => document.activeElement ? document.activeElement.outerHTML : null);
  const before = await current();
  await page.keyboard.press('ArrowRight');
  let after = await current();
  if (after === before) {
    await page.keyboard.press('ArrowDown');
    after = await current();
  }
  await shot('after-arrow');
  result = { passed: after !== before, focusMoved: after !== before };
}"#;

const ENTER_SPACE_ACTIVATION: &str = r#"const selector = 'button, [role="button"]';
const count = await page.evaluate((sel) => {
  window.__activations = 0;
  const els = Array.from(document.querySelectorAll(sel));
  els.forEach((el) => el.addEventListener('click', (e) => {
    window.__activations++;
    e.preventDefault();
  }, true));
  return els.length;
}, selector);
if (count === 0) {
  result = { passed: true, skipped: true, reason: 'No buttons found' };
} else {
  await page.focus(selector);
  await page.keyboard.press('Enter');
  const afterEnter = await page.evaluate(() => window.__activations);
  await page.focus(selector);
  await page.keyboard.press('Space');
  const afterSpace = await page.evaluate(() => window.__activations);
  await shot('activated');
  const enterActivated = afterEnter >= 1;
  const spaceActivated = afterSpace > afterEnter;
  result = { passed: enterActivated && spaceActivated, buttonCount: count, enterActivated, spaceActivated };
}"#;

const SKIP_LINKS: &str = r#"await page.keyboard.press('Tab');
const link = await page.evaluate(() => {
  const el = document.activeElement;
  if (!el || el.tagName !== 'A') return null;
  return { href: el.getAttribute('href') || '', text: (el.innerText || '').trim() };
});
await shot('first-tab');
const isSkipLink = !!link && link.href.startsWith('#') && /skip|main|content/i.test(link.text + ' ' + link.href);
let targetExists = false;
if (isSkipLink) {
  targetExists = await page.evaluate((id) => !!document.getElementById(id), link.href.slice(1));
}
result = { passed: isSkipLink && targetExists, skipLink: link, targetExists };"#;

const KEYBOARD_TRAPS: &str = r#"const seen = [];
let trappedAt = null;
for (let i = 0; i < 40; i++) {
  await page.keyboard.press('Tab');
  const key = await page.evaluate(() => {
    const el = document.activeElement;
    if (!el || el === document.body) return null;
    const siblings = el.parentNode ? Array.from(el.parentNode.children) : [];
    return el.tagName + '#' + (el.id || '') + ':' + siblings.indexOf(el);
  });
  seen.push(key);
  const recent = seen.slice(-4);
  if (key && recent.length === 4 && recent.every((k) => k === key)) {
    trappedAt = key;
    await shot('trapped');
    break;
  }
}
result = { passed: trappedAt === null, tabPresses: seen.length, trappedAt };"#;

const FOCUS_VISIBILITY: &str = r#"const samples = [];
for (let i = 0; i < 15; i++) {
  await page.keyboard.press('Tab');
  const sample = await page.evaluate(() => {
    const el = document.activeElement;
    if (!el || el === document.body) return null;
    const style = getComputedStyle(el);
    const outline = style.outlineStyle !== 'none' && parseFloat(style.outlineWidth) > 0;
    const shadow = style.boxShadow && style.boxShadow !== 'none';
    return { tag: el.tagName.toLowerCase(), id: el.id || null, visible: outline || !!shadow };
  });
  if (!sample) break;
  samples.push(sample);
  if (i === 0) await shot('focused');
}
const missing = samples.filter((s) => !s.visible);
result = { passed: samples.length > 0 && missing.length === 0, checked: samples.length, missingIndicator: missing };"#;

/// Catalogue entry
#[derive(Debug, Clone, Serialize)]
pub struct KeyboardCheckInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn catalogue() -> Vec<KeyboardCheckInfo> {
    KeyboardCheck::ALL
        .iter()
        .map(|c| KeyboardCheckInfo {
            id: c.id(),
            name: c.name(),
            description: c.description(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardReport {
    pub test_id: String,
    pub name: String,
    pub url: String,
    pub passed: bool,
    pub details: serde_json::Value,
    pub screenshots: Vec<String>,
    pub tested_at: DateTime<Utc>,
    pub result_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct KeyboardTester {
    scripts: ScriptRunner,
    reports: ReportDir,
    screenshot_dir: PathBuf,
}

impl KeyboardTester {
    pub fn new(scripts: ScriptRunner, results_dir: impl Into<PathBuf>) -> Self {
        let dir = results_dir.into().join("keyboard");
        Self {
            scripts,
            screenshot_dir: dir.join("screenshots"),
            reports: ReportDir::new(dir),
        }
    }

    pub fn script(&self, check: KeyboardCheck, url: &str) -> String {
        let prefix = format!("{}-{}", check.id(), Utc::now().format("%Y%m%dT%H%M%S%3f"));
        PageScript::new(url)
            .screenshots(&self.screenshot_dir, prefix)
            .body(check.body())
            .build()
    }

    pub async fn run(&self, test_id: &str, url: &str, cancel: CancellationToken) -> RunnerResult<KeyboardReport> {
        let check = KeyboardCheck::from_id(test_id)
            .ok_or_else(|| RunnerError::UnknownCheck(test_id.to_string()))?;
        if url.trim().is_empty() {
            return Err(RunnerError::InvalidRequest("url is required".to_string()));
        }

        std::fs::create_dir_all(&self.screenshot_dir)?;
        info!("Keyboard check {} against {}", check.id(), url);

        let mut details = self
            .scripts
            .run(&format!("keyboard:{}", check.id()), &self.script(check, url), cancel)
            .await?;

        let screenshots = details
            .get("screenshots")
            .and_then(|s| s.as_array())
            .map(|s| s.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if let Some(obj) = details.as_object_mut() {
            obj.remove("screenshots");
        }

        let mut report = KeyboardReport {
            test_id: check.id().to_string(),
            name: check.name().to_string(),
            url: url.to_string(),
            passed: details["success"].as_bool().unwrap_or(false)
                && details["passed"].as_bool().unwrap_or(false),
            details,
            screenshots,
            tested_at: Utc::now(),
            result_file: None,
        };
        let path = self.reports.next_path(check.id());
        report.result_file = Some(path.clone());
        self.reports.save(&path, &report)?;
        Ok(report)
    }
}
