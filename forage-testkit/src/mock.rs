use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use forage::*;
use parking_lot::Mutex;

/// Behaviour of a [`ScriptedSearchExecutor`].
#[derive(Clone, Debug)]
pub enum SearchScript {
    /// Return the sample restaurants.
    Succeed,
    /// Fail every call with the given message.
    AlwaysFail(String),
    /// Fail the first `n` calls, then succeed.
    FailTimes(u32),
    /// Block the calling thread for the given time, then succeed.
    Slow(Duration),
    /// Return a response with `success: false`.
    Unsuccessful(String),
    /// Panic with the given message.
    Panic(String),
}

#[derive(Clone, Debug)]
pub struct SearchRecord {
    pub location: String,
    pub search_query: String,
    pub max_results: u32,
    pub called_at: DateTime<Utc>,
}

/// Search executor that follows a script and records every call.
#[derive(Clone)]
pub struct ScriptedSearchExecutor {
    calls: Arc<Mutex<Vec<SearchRecord>>>,
    script: Arc<Mutex<SearchScript>>,
}

impl ScriptedSearchExecutor {
    pub fn new(script: SearchScript) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(SearchScript::Succeed)
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(SearchScript::AlwaysFail(message.into()))
    }

    pub fn failing_times(times: u32) -> Self {
        Self::new(SearchScript::FailTimes(times))
    }

    pub fn slow(delay: Duration) -> Self {
        Self::new(SearchScript::Slow(delay))
    }

    pub fn set_script(&self, script: SearchScript) {
        *self.script.lock() = script;
    }

    pub fn calls(&self) -> Vec<SearchRecord> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn assert_call_count_eq(&self, expected: usize) {
        let actual = self.call_count();
        assert_eq!(
            actual, expected,
            "Expected {} searches, got {}",
            expected, actual
        );
    }
}

impl Default for ScriptedSearchExecutor {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl SearchExecutor for ScriptedSearchExecutor {
    fn search(&self, request: &SearchRequest) -> anyhow::Result<SearchResponse> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(SearchRecord {
                location: request.location.clone(),
                search_query: request.search_query.clone(),
                max_results: request.max_results,
                called_at: Utc::now(),
            });
            calls.len() as u32
        };
        let script = self.script.lock().clone();

        match script {
            SearchScript::Succeed => SampleSearchExecutor.search(request),
            SearchScript::AlwaysFail(message) => Err(anyhow::anyhow!(message)),
            SearchScript::FailTimes(times) if call_number <= times => {
                Err(anyhow::anyhow!("scripted failure {call_number} of {times}"))
            }
            SearchScript::FailTimes(_) => SampleSearchExecutor.search(request),
            SearchScript::Slow(delay) => {
                std::thread::sleep(delay);
                SampleSearchExecutor.search(request)
            }
            SearchScript::Unsuccessful(message) => {
                let mut response = SampleSearchExecutor.search(request)?;
                response.success = false;
                response.results.clear();
                response.search_metadata.total_found = 0;
                response.error_message = Some(message);
                Ok(response)
            }
            SearchScript::Panic(message) => panic!("{message}"),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
