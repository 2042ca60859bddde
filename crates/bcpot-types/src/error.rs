use thiserror::Error;

#[derive(Error, Debug)]
pub enum BcpError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown kernel '{0}' (expected one of: plummer, exp-core, ananta-hybrid)")]
    UnknownKernel(String),

    #[error(
        "Taper failure for L={length} (n={n}, dx={dx:.4}): nonzero fraction \
         {nonzero_fraction:.6} < {min_fraction}; enlarge the grid or shrink L"
    )]
    TaperFailure {
        length: f64,
        n: usize,
        dx: f64,
        nonzero_fraction: f64,
        min_fraction: f64,
    },

    #[error("Degenerate kernel integral {integral:.3e} for L={length} (n={n}, dx={dx:.4})")]
    DegenerateKernel {
        length: f64,
        n: usize,
        dx: f64,
        integral: f64,
    },

    #[error("Radial grid mismatch at L={length}: {message}")]
    GridMismatch { length: f64, message: String },

    #[error("Non-finite values in {stage} (L={length}, n={n}, dx={dx:.4})")]
    NonFinite {
        stage: String,
        length: f64,
        n: usize,
        dx: f64,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Kernel cache lock poisoned by a panicking builder")]
    CachePoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BcpError {
    /// True for failures tied to one (kernel, L, grid) combination rather than
    /// to the configuration as a whole.
    pub fn is_numerical_degeneracy(&self) -> bool {
        matches!(
            self,
            BcpError::TaperFailure { .. } | BcpError::DegenerateKernel { .. }
        )
    }
}

pub type BcpResult<T> = Result<T, BcpError>;
