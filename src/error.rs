// 🚨 Error Taxonomy - Request-Level Failures
// Tagged errors returned by the pipeline so callers can tell failure kinds apart

// ============================================================================
// PIPELINE ERROR
// ============================================================================

/// Every failure the pipeline can hand back to a caller.
///
/// `Schema` is fatal at ingestion (the process must not serve from a silently
/// empty dataset). The other three are per-request outcomes: the boundary
/// translates them into structured failures instead of letting them propagate
/// as unhandled faults.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A required column or header is missing from a source sheet
    Schema { source: String, detail: String },

    /// Input rejected before fitting (non-positive values, empty query, bad horizon)
    Validation { detail: String },

    /// Series too short for trend estimation
    InsufficientData { required: usize, actual: usize },

    /// Area query matched nothing, exact or partial
    NotFound { query: String },
}

impl PipelineError {
    /// Stable machine-readable kind, used in structured API failures
    pub fn kind(&self) -> &str {
        match self {
            PipelineError::Schema { .. } => "schema",
            PipelineError::Validation { .. } => "validation",
            PipelineError::InsufficientData { .. } => "insufficient_data",
            PipelineError::NotFound { .. } => "not_found",
        }
    }

    pub fn schema(source: &str, detail: impl Into<String>) -> Self {
        PipelineError::Schema {
            source: source.to_string(),
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        PipelineError::Validation { detail: detail.into() }
    }

    pub fn insufficient_data(required: usize, actual: usize) -> Self {
        PipelineError::InsufficientData { required, actual }
    }

    pub fn not_found(query: impl Into<String>) -> Self {
        PipelineError::NotFound { query: query.into() }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Schema { source, detail } => {
                write!(f, "schema error in {}: {}", source, detail)
            }
            PipelineError::Validation { detail } => {
                write!(f, "{}", detail)
            }
            PipelineError::InsufficientData { required, actual } => {
                write!(
                    f,
                    "not enough data points to forecast: need at least {}, got {}",
                    required, actual
                )
            }
            PipelineError::NotFound { query } => {
                write!(f, "area not found: '{}'", query)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

// ============================================================================
// TESTS
// ============================================================================
