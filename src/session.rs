use chrono::{DateTime, Local};
use log::{info, warn};
use std::time::Duration;

use crate::classifier::{RipenessClassifier, RipenessLevel};
use crate::error::SessionError;
use crate::sampler::{ColorSampler, SampleHistogram};

/// Result of one analysis: what the authority detected next to what the
/// field worker picked on the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub histogram: SampleHistogram,
    pub detected_level: RipenessLevel,
    pub manual_level: RipenessLevel,
    pub analyzed_at: DateTime<Local>,
}

impl AnalysisOutcome {
    pub fn is_match(&self) -> bool {
        self.detected_level == self.manual_level
    }

    pub fn match_label(&self) -> &'static str {
        if self.is_match() {
            "Match"
        } else {
            "Mismatch"
        }
    }
}

/// State of one capture, analyze and export workflow. Each workflow owns its
/// own session; nothing here is shared between sessions.
#[derive(Debug)]
pub struct AnalysisSession {
    id: String,
    user_id: String,
    started_at: DateTime<Local>,
    image: Option<Vec<u8>>,
    visual_level: Option<RipenessLevel>,
    outcome: Option<AnalysisOutcome>,
}

impl AnalysisSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            id: format!("session_{}", now.format("%Y%m%d_%H%M%S")),
            user_id: user_id.into(),
            started_at: now,
            image: None,
            visual_level: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    pub fn visual_level(&self) -> Option<RipenessLevel> {
        self.visual_level
    }

    pub fn outcome(&self) -> Option<&AnalysisOutcome> {
        self.outcome.as_ref()
    }

    /// A new photo starts the comparison over: the previous chart pick and
    /// result no longer apply.
    pub fn set_image(&mut self, bytes: Vec<u8>) {
        info!("[{}] Image captured ({} bytes)", self.id, bytes.len());
        self.image = Some(bytes);
        self.visual_level = None;
        self.outcome = None;
    }

    pub fn select_visual_level(&mut self, level: RipenessLevel) {
        if self.visual_level != Some(level) {
            self.outcome = None;
        }
        self.visual_level = Some(level);
    }

    pub fn can_analyze(&self) -> bool {
        self.image.is_some() && self.visual_level.is_some()
    }

    /// Samples the captured photo and asks `classifier` for a level.
    ///
    /// Decoding is bounded by `decode_timeout`. If the photo cannot be
    /// decoded the classifier is never called.
    pub async fn analyze<C>(
        &mut self,
        sampler: &ColorSampler,
        classifier: &C,
        decode_timeout: Duration,
    ) -> Result<&AnalysisOutcome, SessionError>
    where
        C: RipenessClassifier + ?Sized,
    {
        let (image, manual_level) = match (&self.image, self.visual_level) {
            (Some(image), Some(level)) => (image.clone(), level),
            _ => return Err(SessionError::NotReady),
        };

        let histogram = match tokio::time::timeout(decode_timeout, sampler.sample_async(image)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("[{}] Decode did not finish within {:?}", self.id, decode_timeout);
                return Err(SessionError::Timeout(decode_timeout));
            }
        };

        let detected_level = classifier.classify(&self.user_id, &histogram).await?;

        let outcome = AnalysisOutcome {
            histogram,
            detected_level,
            manual_level,
            analyzed_at: Local::now(),
        };
        info!(
            "[{}] Detected {} vs visual {}: {}",
            self.id,
            outcome.detected_level.label(),
            outcome.manual_level.label(),
            outcome.match_label()
        );

        Ok(self.outcome.insert(outcome))
    }

    pub fn reset(&mut self) {
        self.image = None;
        self.visual_level = None;
        self.outcome = None;
    }
}
