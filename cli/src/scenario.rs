//! JSON-lines scenario replay.
//!
//! Each line is one step, for example:
//!
//! ```text
//! {"auth": {"is_loading": false}}
//! {"navigate": "/dashboard"}
//! {"wait_ms": 20}
//! {"auth": {"identity": "u1"}}
//! {"take_state": null}
//! ```
//!
//! Steps run back to back without waiting for navigations to land, so a
//! scenario can race requests against each other. Ticket completions are
//! reported as they resolve; the replay ends once the navigator is idle and
//! every ticket has resolved.

#[cfg(test)]
#[path = "scenario_test.rs"]
mod scenario_test;

use std::io::BufRead;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use wayfinder::auth::AuthPublisher;
use wayfinder::feature::FeatureNavigator;
use wayfinder::guard::GuardDecision;
use wayfinder::navigator::NavigatorStatus;
use wayfinder::state::IntentId;
use wayfinder::{AuthSnapshot, Completion, NavError, NavigationState, NavigationTicket, Navigator};

use crate::CliError;

/// One scenario line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Request a navigation.
    Navigate(String),
    /// Request a navigation carrying explicit state.
    NavigateWith { path: String, state: NavigationState },
    /// Navigate on behalf of a feature with a payload.
    Feature { name: String, path: String, value: Value },
    /// Publish an auth snapshot.
    Auth(AuthSnapshot),
    /// The port moved on its own.
    Location(String),
    /// Run the render guard for a path.
    Guard(String),
    /// Consume arrived state, or only one feature's payload when named.
    TakeState(Option<String>),
    /// Pause, letting in-flight navigations progress.
    WaitMs(u64),
}

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Observation {
    Requested {
        line: usize,
        path: String,
        intent: IntentId,
    },
    Rejected {
        line: usize,
        error: String,
    },
    Completed {
        intent: IntentId,
        #[serde(flatten)]
        completion: Completion,
    },
    Failed {
        intent: IntentId,
        error: String,
    },
    Guard {
        line: usize,
        path: String,
        decision: GuardDecision,
    },
    State {
        line: usize,
        state: Option<NavigationState>,
    },
    Feature {
        line: usize,
        feature: String,
        value: Option<Value>,
    },
    Status {
        line: usize,
        #[serde(flatten)]
        status: NavigatorStatus,
    },
}

/// A step with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedStep {
    pub line: usize,
    pub step: Step,
}

/// Parse a scenario, skipping blank lines and `#` comments.
///
/// # Errors
///
/// [`CliError::Io`] on read failure, [`CliError::Scenario`] for a line that
/// is not a valid step.
pub fn parse(reader: impl BufRead) -> Result<Vec<NumberedStep>, CliError> {
    let mut steps = Vec::new();
    for (index, raw) in reader.lines().enumerate() {
        let raw = raw?;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = index + 1;
        let step = serde_json::from_str(trimmed).map_err(|source| CliError::Scenario { line, source })?;
        steps.push(NumberedStep { line, step });
    }
    Ok(steps)
}

type Resolved = (IntentId, Result<Completion, NavError>);

/// Drives a [`Navigator`] through scenario steps.
pub struct Replay {
    navigator: Navigator,
    publisher: AuthPublisher,
    resolved_tx: mpsc::UnboundedSender<Resolved>,
    resolved_rx: mpsc::UnboundedReceiver<Resolved>,
    outstanding: usize,
    observations: Vec<Observation>,
}

impl Replay {
    pub fn new(navigator: Navigator, publisher: AuthPublisher) -> Self {
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();
        Self { navigator, publisher, resolved_tx, resolved_rx, outstanding: 0, observations: Vec::new() }
    }

    /// Run every step, then wait for the navigator to settle.
    pub async fn run(mut self, steps: Vec<NumberedStep>) -> Vec<Observation> {
        for NumberedStep { line, step } in steps {
            self.step(line, step).await;
            tokio::task::yield_now().await;
            self.drain();
            self.observations.push(Observation::Status { line, status: self.navigator.status().borrow().clone() });
        }
        self.navigator.wait_idle().await;
        while self.outstanding > 0 {
            let Some(resolved) = self.resolved_rx.recv().await else {
                break;
            };
            self.record(resolved);
        }
        self.observations
    }

    async fn step(&mut self, line: usize, step: Step) {
        match step {
            Step::Navigate(path) => {
                let result = self.navigator.request_navigation(&path, None);
                self.track(line, path, result);
            }
            Step::NavigateWith { path, state } => {
                let result = self.navigator.request_navigation(&path, Some(state));
                self.track(line, path, result);
            }
            Step::Feature { name, path, value } => {
                let result = FeatureNavigator::new(name, self.navigator.clone()).navigate(&path, &value);
                self.track(line, path, result);
            }
            Step::Auth(snapshot) => self.publisher.publish(snapshot),
            Step::Location(path) => {
                if let Err(e) = self.navigator.location_changed(&path) {
                    self.observations.push(Observation::Rejected { line, error: e.to_string() });
                }
            }
            Step::Guard(path) => match self.navigator.guard(&path) {
                Ok(decision) => self.observations.push(Observation::Guard { line, path, decision }),
                Err(e) => self.observations.push(Observation::Rejected { line, error: e.to_string() }),
            },
            Step::TakeState(None) => {
                let state = self.navigator.take_state();
                self.observations.push(Observation::State { line, state });
            }
            Step::TakeState(Some(feature)) => {
                let value = self.navigator.take_feature(&feature);
                self.observations.push(Observation::Feature { line, feature, value });
            }
            Step::WaitMs(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }

    fn track(&mut self, line: usize, path: String, result: Result<NavigationTicket, NavError>) {
        let ticket = match result {
            Ok(ticket) => ticket,
            Err(e) => {
                self.observations.push(Observation::Rejected { line, error: e.to_string() });
                return;
            }
        };
        let intent = ticket.intent();
        self.observations.push(Observation::Requested { line, path, intent });
        self.outstanding += 1;
        let tx = self.resolved_tx.clone();
        tokio::spawn(async move {
            if tx.send((intent, ticket.await)).is_err() {
                tracing::debug!(%intent, "replay finished before ticket resolved");
            }
        });
    }

    fn drain(&mut self) {
        while let Ok(resolved) = self.resolved_rx.try_recv() {
            self.record(resolved);
        }
    }

    fn record(&mut self, (intent, result): Resolved) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.observations.push(match result {
            Ok(completion) => Observation::Completed { intent, completion },
            Err(e) => Observation::Failed { intent, error: e.to_string() },
        });
    }
}
