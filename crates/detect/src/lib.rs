//! grabmodels_detect - Client for the detector inference service
//!
//! The service takes `{model_id, image_uri}` and answers with parallel arrays
//! of boxes, angles, class names and scores. Every failure on this path is
//! turned into an empty [`Detections`] so the calling pipeline keeps going.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub const ENV_SERVICE_NAME: &str = "detector_service_name";
pub const ENV_SERVICE_PORT: &str = "detector_service_PORT";

const DEFAULT_SERVICE_NAME: &str = "detector_inference";
const DEFAULT_SERVICE_PORT: &str = "6050";
const NOTE: &str = "service";

/// Detections for one image, as parallel arrays of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detections {
    pub gids: Vec<u64>,
    /// Boxes rounded to whole pixels
    pub bboxes: Vec<Vec<i64>>,
    pub thetas: Vec<f64>,
    pub class_names: Vec<String>,
    pub scores: Vec<f64>,
    pub notes: Vec<String>,
}

impl Detections {
    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    model_id: &'a str,
    image_uri: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    bboxes: Vec<Vec<f64>>,
    thetas: Vec<f64>,
    class_names: Vec<String>,
    scores: Vec<f64>,
}

impl PredictResponse {
    fn into_detections(self, gid: u64) -> Detections {
        let bboxes: Vec<Vec<i64>> = self
            .bboxes
            .iter()
            .map(|bbox| bbox.iter().map(|x| x.round_ties_even() as i64).collect())
            .collect();
        let n = bboxes.len();
        Detections {
            gids: vec![gid; n],
            bboxes,
            thetas: self.thetas,
            class_names: self.class_names,
            scores: self.scores,
            notes: vec![NOTE.to_string(); n],
        }
    }
}

/// `http://{name}:{port}/predict`, falling back to the default service
/// name and port for unset or empty variables.
pub fn endpoint_from_lookup<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str, default: &str| {
        lookup(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    };
    format!(
        "http://{}:{}/predict",
        get(ENV_SERVICE_NAME, DEFAULT_SERVICE_NAME),
        get(ENV_SERVICE_PORT, DEFAULT_SERVICE_PORT)
    )
}

pub struct DetectorClient {
    client: Client,
    endpoint: String,
}

impl DetectorClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(endpoint_from_lookup(|key| std::env::var(key).ok()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn run_inference_on_image(&self, gid: u64, image_path: &str, model_tag: &str) -> Detections {
        tracing::info!(
            "Sending POST request for path {} to URL: {}",
            image_path,
            self.endpoint
        );

        let request = PredictRequest {
            model_id: model_tag,
            image_uri: image_path,
        };
        let response = match self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Inference request for path {} failed: {}", image_path, e);
                return Detections::default();
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to read inference response for path {}: {}", image_path, e);
                return Detections::default();
            }
        };

        if status != StatusCode::OK {
            tracing::warn!("Failed inference for path {}: {} {}", image_path, status, body);
            return Detections::default();
        }

        match serde_json::from_str::<PredictResponse>(&body) {
            Ok(parsed) => parsed.into_detections(gid),
            Err(e) => {
                tracing::error!("Malformed inference response for path {}: {}", image_path, e);
                Detections::default()
            }
        }
    }
}
