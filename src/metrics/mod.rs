pub mod exporter;
pub mod flatten;
pub mod otlp;
pub mod percentiles;
pub mod registry;
pub mod stream;
pub mod system;

pub use exporter::{ExportAuth, ExporterHandle, MetricsExporter, TickOutcome};
pub use flatten::{flatten, MetricDomain, MetricPoint, MetricValue};
pub use otlp::{classify, encode, ExportMetricsRequest, MetricKind};
pub use registry::{
    AuthMetrics, HttpMetrics, MetricRegistry, PurchaseMetrics, RegistrySnapshot, UserMetrics,
};
pub use system::{SystemMetrics, SystemSampler};
