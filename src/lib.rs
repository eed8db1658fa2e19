//! Banana ripeness reporting.
//!
//! A photo is reduced to a coarse HSV color histogram by [`ColorSampler`],
//! the histogram is scored by an external [`RipenessClassifier`], and the
//! detected level is compared with the level the field worker picked on the
//! reference chart inside an [`AnalysisSession`].

pub mod bucket;
pub mod classifier;
pub mod color_chart;
pub mod config;
pub mod error;
pub mod export;
pub mod hsv;
pub mod sampler;
pub mod session;
pub mod store;

pub use bucket::ColorBucket;
pub use classifier::{RemoteClassifier, RipenessClassifier, RipenessLevel};
pub use color_chart::{ColorChart, ColorChartEntry};
pub use config::Config;
pub use error::{ClassifierError, ExportError, SamplerError, SessionError, StoreError};
pub use export::{EmailDraft, ReportForm, ReportRecord};
pub use hsv::{rgb_to_hsv, HsvColor};
pub use sampler::{working_size, BucketCounts, ColorSampler, SampleHistogram};
pub use session::{AnalysisOutcome, AnalysisSession};
pub use store::{JsonFileStore, KeyValueStore, MasterData, MemoryStore};
