//! Proof verification.
//!
//! An oracle looks at a task and an image and says whether the image shows
//! the task done. Its answer is advisory: acceptance only leads to
//! [`ScheduleReconciler::validate_task`], which still enforces the task's
//! window.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use daylock_core::NodeId;
use daylock_storage::WorkflowStore;
use reqwest::{Client, ClientBuilder};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::reconciler::{Outcome, ReconcileError, Reconciliation, Rejection, ScheduleReconciler};

/// An oracle's judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the proof shows the task completed
    pub accepted: bool,
}

/// Error raised while consulting an oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No image bytes were supplied
    #[error("empty image")]
    EmptyImage,

    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Judges whether an image proves a task was done.
#[async_trait]
pub trait ValidationOracle: Send + Sync {
    /// Classify `image` against the task's title and description.
    async fn classify(&self, title: &str, description: &str, image: &[u8]) -> Result<Verdict, OracleError>;
}

/// Ollama connection settings.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Ollama server URL
    pub url: String,
    /// Vision model name
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "llava".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Oracle backed by a local Ollama vision model.
#[derive(Clone)]
pub struct OllamaOracle {
    /// HTTP client
    client: Client,

    /// Ollama server URL
    url: String,

    /// Model name
    model: String,
}

impl OllamaOracle {
    /// Create a new Ollama oracle.
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model,
        }
    }

    /// Ask the model one question about one image.
    async fn generate(&self, prompt: &str, image: &[u8]) -> anyhow::Result<String> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [base64::engine::general_purpose::STANDARD.encode(image)],
            "stream": false,
        });

        debug!("Asking {} about image ({} bytes)", self.model, image.len());

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&payload)
            .send()
            .await
            .context("Failed to call Ollama generate API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error (status {}): {}", status, error_text);
        }

        #[derive(serde::Deserialize)]
        struct Response {
            response: String,
        }

        let response_data: Response = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(response_data.response)
    }

    /// Check if Ollama server is available.
    pub async fn health_check(&self) -> anyhow::Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/version", self.url))
            .send()
            .await
            .context("Failed to check Ollama health")?;

        Ok(response.status().is_success())
    }
}

impl Default for OllamaOracle {
    fn default() -> Self {
        Self::new(OllamaConfig::default())
    }
}

#[async_trait]
impl ValidationOracle for OllamaOracle {
    async fn classify(&self, title: &str, description: &str, image: &[u8]) -> Result<Verdict, OracleError> {
        if image.is_empty() {
            return Err(OracleError::EmptyImage);
        }
        let answer = self.generate(&prompt(title, description), image).await?;
        Ok(Verdict {
            accepted: is_affirmative(&answer),
        })
    }
}

fn prompt(title: &str, description: &str) -> String {
    let mut prompt = format!(
        "Does this image show that the following task has been completed?\nTask: {title}\n"
    );
    if !description.trim().is_empty() {
        prompt.push_str(&format!("Details: {description}\n"));
    }
    prompt.push_str("Answer with a single word: yes or no.");
    prompt
}

/// First word of the answer is "yes", ignoring case and punctuation.
fn is_affirmative(answer: &str) -> bool {
    answer
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .is_some_and(|w| w.eq_ignore_ascii_case("yes"))
}

/// Consult `oracle` about the task's proof image and validate the task
/// when it is accepted.
///
/// An oracle failure is logged and reported as
/// [`Rejection::ProofNotAccepted`].
pub async fn verify_and_validate<S: WorkflowStore + 'static>(
    reconciler: &ScheduleReconciler<S>,
    oracle: &dyn ValidationOracle,
    task_id: &NodeId,
    image: &[u8],
    proof: Option<String>,
) -> Result<Outcome<Reconciliation>, ReconcileError> {
    let Some(workflow) = reconciler.snapshot().await else {
        return Ok(Outcome::Rejected(Rejection::NoWorkflowLoaded));
    };
    let Some(node) = workflow.nodes.iter().find(|n| &n.id == task_id) else {
        return Ok(Outcome::Rejected(Rejection::UnknownNode(task_id.clone())));
    };
    let Some(task) = node.as_task() else {
        return Ok(Outcome::Rejected(Rejection::NotATask(task_id.clone())));
    };

    match oracle.classify(&task.card.title, &task.card.description, image).await {
        Ok(Verdict { accepted: true }) => {
            info!(task = %task_id, "proof accepted");
            reconciler.validate_task(task_id, proof).await
        }
        Ok(Verdict { accepted: false }) => {
            info!(task = %task_id, "proof rejected by oracle");
            Ok(Outcome::Rejected(Rejection::ProofNotAccepted))
        }
        Err(e) => {
            warn!(task = %task_id, error = %e, "oracle failed");
            Ok(Outcome::Rejected(Rejection::ProofNotAccepted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use daylock_core::{ClockTime, Edge, LockType, Node, NodeCard, Schedule, Workflow};
    use daylock_storage::MemoryStorage;
    use std::sync::Mutex;

    struct ScriptedOracle {
        answer: Option<bool>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn answering(answer: Option<bool>) -> Self {
            Self {
                answer,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ValidationOracle for ScriptedOracle {
        async fn classify(&self, title: &str, _description: &str, _image: &[u8]) -> Result<Verdict, OracleError> {
            self.seen.lock().unwrap().push(title.to_string());
            match self.answer {
                Some(accepted) => Ok(Verdict { accepted }),
                None => Err(OracleError::Backend(anyhow::anyhow!("connection refused"))),
            }
        }
    }

    async fn reconciler() -> ScheduleReconciler<MemoryStorage> {
        let schedule = Schedule::new(
            ClockTime::new(8, 0).unwrap(),
            ClockTime::new(9, 0).unwrap(),
            [0],
        );
        let task = Node::task(NodeCard::new("Wash Face", "with soap"), Some(schedule)).with_id("t");
        let gate = Node::control(NodeCard::new("Apps", ""), LockType::Apps).with_id("g");
        let workflow = Workflow::new("Monday", Some(0)).with_graph(vec![task, gate], vec![Edge::new("t", "g")]);

        let store = MemoryStorage::new();
        store.create_workflow(&workflow).await.unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 30, 0).unwrap();
        let reconciler = ScheduleReconciler::new(store).with_clock(ManualClock::new(now));
        reconciler.load(&workflow.id).await.unwrap();
        reconciler
    }

    #[test]
    fn reads_yes_no_answers() {
        assert!(is_affirmative("Yes."));
        assert!(is_affirmative("  yes, the face is clean"));
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative("yesterday"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn prompt_mentions_task() {
        let text = prompt("Wash Face", "with soap");
        assert!(text.contains("Task: Wash Face"));
        assert!(text.contains("Details: with soap"));
        assert!(!prompt("Wash Face", " ").contains("Details"));
    }

    #[tokio::test]
    async fn accepted_proof_validates_task() {
        let reconciler = reconciler().await;
        let oracle = ScriptedOracle::answering(Some(true));

        let outcome = verify_and_validate(&reconciler, &oracle, &NodeId::from("t"), b"img", Some("a.jpg".into()))
            .await
            .unwrap();

        assert!(outcome.is_applied());
        assert_eq!(*oracle.seen.lock().unwrap(), vec!["Wash Face".to_string()]);
        let states = reconciler.gate_states().await.unwrap();
        assert!(!states[&NodeId::from("g")].locked);
    }

    #[tokio::test]
    async fn refused_proof_changes_nothing() {
        let reconciler = reconciler().await;
        let oracle = ScriptedOracle::answering(Some(false));

        let outcome = verify_and_validate(&reconciler, &oracle, &NodeId::from("t"), b"img", None)
            .await
            .unwrap();

        assert_eq!(outcome.rejection(), Some(&Rejection::ProofNotAccepted));
        assert!(reconciler.gate_states().await.unwrap()[&NodeId::from("g")].locked);
    }

    #[tokio::test]
    async fn oracle_failure_is_a_rejection() {
        let reconciler = reconciler().await;
        let oracle = ScriptedOracle::answering(None);

        let outcome = verify_and_validate(&reconciler, &oracle, &NodeId::from("t"), b"img", None)
            .await
            .unwrap();

        assert_eq!(outcome.rejection(), Some(&Rejection::ProofNotAccepted));
    }

    #[tokio::test]
    async fn gates_are_not_sent_to_oracle() {
        let reconciler = reconciler().await;
        let oracle = ScriptedOracle::answering(Some(true));

        let outcome = verify_and_validate(&reconciler, &oracle, &NodeId::from("g"), b"img", None)
            .await
            .unwrap();

        assert_eq!(outcome.rejection(), Some(&Rejection::NotATask(NodeId::from("g"))));
        assert!(oracle.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_image_is_refused_before_any_request() {
        let oracle = OllamaOracle::new(OllamaConfig {
            url: "http://127.0.0.1:9".into(),
            ..Default::default()
        });

        let err = oracle.classify("Wash Face", "", &[]).await.unwrap_err();
        assert!(matches!(err, OracleError::EmptyImage));
    }
}
