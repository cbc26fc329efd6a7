//! User feedback submission.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use catalog::Transport;

use crate::config::ShareConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackForm {
    pub title: String,
    pub name: String,
    pub email: String,
    pub comment: String,
    /// Link to the state the user was looking at, when they chose to send it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_link: Option<String>,
}

/// Feedback could not be delivered. Carries the support address so the user
/// can be asked to send it by e-mail instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not send feedback: {reason}")]
pub struct FeedbackSubmitError {
    pub reason: String,
    pub support_email: Option<String>,
}

impl FeedbackSubmitError {
    /// Message offering the manual route.
    pub fn fallback_message(&self) -> String {
        match &self.support_email {
            Some(email) => format!(
                "Sorry, your feedback could not be sent ({}). Please e-mail it to {email}.",
                self.reason
            ),
            None => format!("Sorry, your feedback could not be sent ({}).", self.reason),
        }
    }
}

pub async fn submit_feedback(
    transport: &dyn Transport,
    config: &ShareConfig,
    form: &FeedbackForm,
) -> Result<(), FeedbackSubmitError> {
    let fail = |reason: String| FeedbackSubmitError {
        reason,
        support_email: config.support_email.clone(),
    };

    let Some(url) = config.feedback_url.as_deref() else {
        return Err(fail("no feedback service is configured".into()));
    };
    let body = serde_json::to_value(form).map_err(|e| fail(e.to_string()))?;
    match transport.post_json(url, &body).await {
        Ok(_) => {
            info!(url, "feedback sent");
            Ok(())
        }
        Err(err) => {
            warn!(url, error = %err, "feedback submission failed");
            Err(fail(err.to_string()))
        }
    }
}
