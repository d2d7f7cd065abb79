pub mod aggregate;
pub mod bundle;
pub mod chart;
pub mod compose;
pub mod config;
pub mod parser;
pub mod pdf;
pub mod pipeline;
pub mod ratings;
pub mod table;

pub use aggregate::{summarize, summarize_comparison, FieldSummary, FrequencyEntry};
pub use bundle::{zip_outputs, NamedOutput};
pub use chart::{ChartKind, ChartRenderer, ChartSeries, ChartSpec};
pub use compose::ReportComposer;
pub use config::{Comparison, FeedbackType, FieldSelection, RatingsScope, ReportConfig};
pub use feedback_lens_common::{FeedbackLensError, Result};
pub use parser::{headers, parse, TabularFormat, UploadPolicy};
pub use pipeline::{RenderedChart, ReportPipeline};
pub use ratings::{group_columns_by_category, score_breakdown, RatingBreakdown, RatingRow};
pub use table::{Cell, Table};
