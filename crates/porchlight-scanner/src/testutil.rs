//! Scripted in-memory `PageDriver` for unit tests.

use porchlight_browser::{PageDriver, Result};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Fake driver whose URL, markup, and page-height responses are queued by
/// the test. The last queued value repeats once the queue drains.
#[derive(Default)]
pub struct FakeDriver {
    pub url_sequence: Mutex<VecDeque<String>>,
    pub page_sequence: Mutex<VecDeque<String>>,
    pub height_sequence: Mutex<VecDeque<i64>>,
    pub present: Mutex<HashSet<String>>,
    pub digit_field_ids: Mutex<Vec<String>>,
    pub navigations: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<(String, String)>>,
    pub clicks: Mutex<Vec<String>>,
    pub cleared: Mutex<Vec<String>>,
    pub scripts: Mutex<Vec<String>>,
    pub page_reads: Mutex<u32>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_url(&self, url: &str) {
        self.url_sequence.lock().unwrap().push_back(url.to_string());
    }

    pub fn queue_page(&self, markup: &str) {
        self.page_sequence
            .lock()
            .unwrap()
            .push_back(markup.to_string());
    }

    pub fn queue_height(&self, height: i64) {
        self.height_sequence.lock().unwrap().push_back(height);
    }

    pub fn add_present(&self, selector: &str) {
        self.present.lock().unwrap().insert(selector.to_string());
    }

    pub fn set_digit_fields(&self, ids: &[&str]) {
        *self.digit_field_ids.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }

    fn next_or_last<T: Clone>(queue: &Mutex<VecDeque<T>>, fallback: T) -> T {
        let mut queue = queue.lock().unwrap();
        match queue.len() {
            0 => fallback,
            1 => queue.front().cloned().unwrap_or(fallback),
            _ => queue.pop_front().unwrap_or(fallback),
        }
    }
}

#[async_trait::async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(Self::next_or_last(
            &self.url_sequence,
            "about:blank".to_string(),
        ))
    }

    async fn page_source(&self) -> Result<String> {
        *self.page_reads.lock().unwrap() += 1;
        Ok(Self::next_or_last(&self.page_sequence, String::new()))
    }

    async fn exists(&self, selector: &str) -> bool {
        self.present.lock().unwrap().contains(selector)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        self.cleared.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.typed
            .lock()
            .unwrap()
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        self.clicks
            .lock()
            .unwrap()
            .push(format!("enter:{selector}"));
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<Value> {
        self.scripts.lock().unwrap().push(script.to_string());

        if script == "document.body.scrollHeight" {
            return Ok(Value::from(Self::next_or_last(&self.height_sequence, 1000)));
        }
        if script.contains(r#"id^="_r""#) {
            let ids = self.digit_field_ids.lock().unwrap();
            return Ok(Value::Array(
                ids.iter().map(|id| Value::String(id.clone())).collect(),
            ));
        }
        if script.contains("All Time") || script.contains("This week") {
            return Ok(Value::Bool(true));
        }
        if script.contains("closeSelectors") {
            return Ok(Value::from(0));
        }
        Ok(Value::Null)
    }

    async fn clear_cookies(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
