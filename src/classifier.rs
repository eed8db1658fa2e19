use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::color_chart::{ColorChart, ColorChartEntry};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::sampler::SampleHistogram;

const ANALYZE_RPC: &str = "analyze_banana_color";
const COLOR_CHART_RPC: &str = "get_color_chart_data";

/// Ripeness step on the reference chart. Its meaning is owned by the
/// classification authority; this crate only carries and compares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RipenessLevel(pub u8);

impl RipenessLevel {
    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> String {
        format!("Color {}", self.0)
    }
}

impl std::fmt::Display for RipenessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Turns a color histogram into a ripeness level. The scoring rules live
/// behind this trait and are never inlined here.
#[async_trait]
pub trait RipenessClassifier: Send + Sync {
    async fn classify(
        &self,
        user_id: &str,
        histogram: &SampleHistogram,
    ) -> Result<RipenessLevel, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    p_user_id: &'a str,
    p_image_hsv_data: &'a SampleHistogram,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(rename = "detectedLevel")]
    detected_level: i64,
    #[serde(rename = "totalPixels", default)]
    total_pixels: Option<u64>,
}

/// Parses the body returned by the analyze RPC.
pub(crate) fn parse_analyze_response(body: &str) -> Result<RipenessLevel, ClassifierError> {
    let response: AnalyzeResponse = serde_json::from_str(body)
        .map_err(|e| ClassifierError::Malformed(format!("{} ({})", e, body.trim())))?;

    if let Some(total) = response.total_pixels {
        debug!("Classifier saw {} sampled pixels", total);
    }

    u8::try_from(response.detected_level)
        .map(RipenessLevel)
        .map_err(|_| ClassifierError::Malformed(format!("level out of range: {}", response.detected_level)))
}

/// Classification authority reached through PostgREST-style RPC endpoints.
pub struct RemoteClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    async fn call_rpc<T: Serialize + ?Sized>(&self, function: &str, payload: &T) -> Result<String, ClassifierError> {
        let url = self.rpc_url(function);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<empty response>".to_string());

        if !status.is_success() {
            return Err(ClassifierError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(body)
    }

    /// Reference chart as published by the backend.
    pub async fn fetch_color_chart(&self) -> Result<ColorChart, ClassifierError> {
        let body = self.call_rpc(COLOR_CHART_RPC, &serde_json::json!({})).await?;
        let entries: Option<Vec<ColorChartEntry>> = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Malformed(format!("color chart: {}", e)))?;

        let chart = ColorChart::new(entries.unwrap_or_default());
        info!("Color chart fetched: {} levels", chart.entries().len());
        Ok(chart)
    }

    /// Like [`fetch_color_chart`](Self::fetch_color_chart) but never fails:
    /// any error or an empty chart yields the built-in chart.
    pub async fn color_chart_or_default(&self) -> ColorChart {
        match self.fetch_color_chart().await {
            Ok(chart) if !chart.is_empty() => chart,
            Ok(_) => {
                log::warn!("Backend returned an empty color chart, using built-in chart");
                ColorChart::default()
            }
            Err(e) => {
                log::warn!("Failed to fetch color chart: {}. Using built-in chart.", e);
                ColorChart::default()
            }
        }
    }
}

#[async_trait]
impl RipenessClassifier for RemoteClassifier {
    async fn classify(
        &self,
        user_id: &str,
        histogram: &SampleHistogram,
    ) -> Result<RipenessLevel, ClassifierError> {
        let request = AnalyzeRequest {
            p_user_id: user_id,
            p_image_hsv_data: histogram,
        };
        let body = self.call_rpc(ANALYZE_RPC, &request).await?;
        let level = parse_analyze_response(&body)?;
        info!("Classifier returned level {} for {} sampled pixels", level, histogram.total_sampled());
        Ok(level)
    }
}
