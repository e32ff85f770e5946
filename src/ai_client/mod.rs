//! AIClient - Frame Classifier Adapter
//!
//! ## Responsibilities
//!
//! - Send still frames (JPEG data URLs) to the blur classifier
//! - Validate the response shape at the boundary
//! - Map the binary result to a camera state and a confidence
//!
//! Every failure is reported as `Error::Classifier` so the monitoring loop
//! can treat it as transient.

use crate::camera_session::{CameraState, Confidence};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anything that can classify a frame
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    async fn classify(&self, image_data_url: &str) -> Result<ClassifyResponse>;
}

/// Classification request body
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest<'a> {
    pub image: &'a str,
}

/// Classifier response (`prediction`: 1 = clear, 0 = not clear)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub prediction: u8,
    pub probability: Vec<f64>,

    /// Patches the classifier averaged over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_patches: Option<u32>,
}

impl ClassifyResponse {
    /// Reject payloads the session cannot interpret
    pub fn validate(&self) -> Result<()> {
        if CameraState::from_prediction(self.prediction).is_none() {
            return Err(Error::Classifier(format!(
                "unexpected prediction value {}",
                self.prediction
            )));
        }

        match self.probability.get(self.prediction as usize) {
            Some(p) if p.is_finite() && (0.0..=1.0).contains(p) => Ok(()),
            Some(p) => Err(Error::Classifier(format!("probability out of range: {}", p))),
            None => Err(Error::Classifier(format!(
                "missing probability for class {} ({} values)",
                self.prediction,
                self.probability.len()
            ))),
        }
    }

    /// Camera state for this prediction
    pub fn state(&self) -> CameraState {
        CameraState::from_prediction(self.prediction).unwrap_or(CameraState::Blurry)
    }

    /// Winning class probability as a percentage
    pub fn confidence(&self) -> Confidence {
        self.probability
            .get(self.prediction as usize)
            .map(|p| Confidence::from_probability(*p))
            .unwrap_or(Confidence::ZERO)
    }
}

/// Blur classifier HTTP client
pub struct AiClient {
    client: reqwest::Client,
    predict_url: String,
    timeout: Duration,
}

impl AiClient {
    /// Create new AI client
    pub fn new(predict_url: String) -> Result<Self> {
        Self::with_timeout(predict_url, Duration::from_secs(30))
    }

    /// Create new AI client with custom timeout
    pub fn with_timeout(predict_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            predict_url,
            timeout,
        })
    }

    /// Check the classifier answers on its root path
    pub async fn health_check(&self) -> bool {
        let url = match reqwest::Url::parse(&self.predict_url).and_then(|u| u.join("/")) {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Get predict URL
    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Get timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl FrameClassifier for AiClient {
    async fn classify(&self, image_data_url: &str) -> Result<ClassifyResponse> {
        let resp = self
            .client
            .post(&self.predict_url)
            .json(&ClassifyRequest {
                image: image_data_url,
            })
            .send()
            .await
            .map_err(|e| Error::Classifier(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Classifier(format!(
                "request failed: {} - {}",
                status,
                body.trim()
            )));
        }

        let result: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| Error::Classifier(format!("invalid response body: {}", e)))?;
        result.validate()?;

        tracing::debug!(
            prediction = result.prediction,
            confidence = %result.confidence(),
            total_patches = ?result.total_patches,
            "Classifier prediction received"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_prediction() {
        let resp = ClassifyResponse {
            prediction: 1,
            probability: vec![0.12, 0.97],
            total_patches: None,
        };
        resp.validate().unwrap();
        assert_eq!(resp.state(), CameraState::Normal);
        assert_eq!(resp.confidence().to_string(), "97.00");
    }

    #[test]
    fn test_blurry_prediction() {
        let resp: ClassifyResponse = serde_json::from_str(
            r#"{"prediction": 0, "probability": [0.8123, 0.1877], "total_patches": 64}"#,
        )
        .unwrap();
        resp.validate().unwrap();
        assert_eq!(resp.state(), CameraState::Blurry);
        assert_eq!(resp.confidence().to_string(), "81.23");
        assert_eq!(resp.total_patches, Some(64));
    }

    #[test]
    fn test_invalid_payloads() {
        let out_of_range = ClassifyResponse {
            prediction: 2,
            probability: vec![0.5, 0.5, 0.0],
            total_patches: None,
        };
        assert!(matches!(out_of_range.validate(), Err(Error::Classifier(_))));

        let short = ClassifyResponse {
            prediction: 1,
            probability: vec![0.4],
            total_patches: None,
        };
        assert!(matches!(short.validate(), Err(Error::Classifier(_))));

        let bad_probability = ClassifyResponse {
            prediction: 0,
            probability: vec![1.7, 0.1],
            total_patches: None,
        };
        assert!(matches!(bad_probability.validate(), Err(Error::Classifier(_))));
    }

    #[test]
    fn test_request_body() {
        let json = serde_json::to_value(ClassifyRequest {
            image: "data:image/jpeg;base64,AAAA",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"image": "data:image/jpeg;base64,AAAA"}));
    }

    #[tokio::test]
    async fn test_unreachable_classifier_is_transient() {
        let client =
            AiClient::with_timeout("http://127.0.0.1:9/predict".to_string(), Duration::from_secs(2))
                .unwrap();
        let err = client.classify("data:image/jpeg;base64,AAAA").await.unwrap_err();
        assert!(err.is_transient());
        assert!(!client.health_check().await);
    }
}
