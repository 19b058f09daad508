//! Scripted in-memory completion service for tests.
//!
//! Rules are matched in insertion order against the instruction and
//! prompt text; the first rule whose needles all appear wins.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Completion, CompletionRequest};

enum Reply {
    Text(String),
    Fail(String),
}

struct Rule {
    needles: Vec<String>,
    reply: Reply,
    delay: Duration,
}

pub(crate) struct ScriptedCompletion {
    rules: Vec<Rule>,
    fallback: String,
    base_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub(crate) fn new(fallback: &str) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.to_string(),
            base_delay: Duration::from_millis(5),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `text` when every needle matches.
    pub(crate) fn reply(mut self, needles: &[&str], text: &str) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            reply: Reply::Text(text.to_string()),
            delay: Duration::ZERO,
        });
        self
    }

    /// Fail with `reason` when every needle matches.
    pub(crate) fn fail(mut self, needles: &[&str], reason: &str) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            reply: Reply::Fail(reason.to_string()),
            delay: Duration::ZERO,
        });
        self
    }

    /// Add latency (on top of the base delay) for matching calls.
    pub(crate) fn delay(mut self, needles: &[&str], delay: Duration) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            reply: Reply::Text(String::new()),
            delay,
        });
        self
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub(crate) fn prompts_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .map(|c| {
                c.iter()
                    .filter(|r| r.prompt.contains(needle) || r.instruction.contains(needle))
                    .count()
            })
            .unwrap_or(0)
    }

    fn matches(rule: &Rule, haystack: &str) -> bool {
        rule.needles.iter().all(|n| haystack.contains(n.as_str()))
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        let haystack = format!("{}\n{}", request.instruction, request.prompt);
        let extra: Duration = self
            .rules
            .iter()
            .filter(|r| !r.delay.is_zero() && Self::matches(r, &haystack))
            .map(|r| r.delay)
            .sum();
        tokio::time::sleep(self.base_delay + extra).await;

        let reply = self
            .rules
            .iter()
            .filter(|r| r.delay.is_zero())
            .find(|r| Self::matches(r, &haystack));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match reply {
            Some(Rule { reply: Reply::Text(t), .. }) => Ok(t.clone()),
            Some(Rule { reply: Reply::Fail(e), .. }) => Err(anyhow::anyhow!(e.clone())),
            None => Ok(self.fallback.clone()),
        }
    }
}
