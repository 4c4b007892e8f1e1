use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColorError {
    #[error("Plane index {index} out of range for image with {count} planes")]
    OutOfRange { index: usize, count: usize },

    #[error("No spectral data configured for wavelength {wavelength} nm")]
    MissingSpectralData { wavelength: u32 },

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Registration requires exactly 2 targets, got {0}")]
    RegistrationTargetCountInvalid(usize),

    #[error("Registration targets share the center ({0}, {1})")]
    DegenerateTargets(f32, f32),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("Rectangle {rect:?} does not fit inside a {width}x{height} image")]
    RectOutOfBounds {
        rect: (usize, usize, usize, usize),
        width: usize,
        height: usize,
    },

    #[error("Invalid light weights: {0}")]
    InvalidWeights(String),

    #[error("Malformed table row at line {line}: {reason}")]
    TableParse { line: usize, reason: String },

    #[error("Engine state error: {0}")]
    EngineState(String),

    #[error("Failed to encode TIFF image: {0}")]
    EncodeError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Invalid session description: {0}")]
    SessionInvalid(String),

    #[error("Color worker thread panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ColorError>;
