use thiserror::Error;

/// I/O errors that can occur when reading from a storage context
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Local filesystem error
    #[error("File error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors raised while reading a slab or decoding one of its tiles
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// I/O error while reading the slab
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Slab is shorter than its header or index
    #[error("Invalid slab {key}: {message}")]
    InvalidSlab { key: String, message: String },

    /// Tile index is beyond the slab's tile count
    #[error("Tile {index} out of slab range (slab holds {count} tiles)")]
    TileOutOfSlab { index: u32, count: u32 },

    /// The codec failed to decompress the tile
    #[error("Failed to decode {format} tile: {message}")]
    Codec {
        format: &'static str,
        message: String,
    },

    /// The decoded buffer does not match the tile geometry
    #[error("Decoded tile has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Vector tiles cannot be decoded to pixels
    #[error("Format {0} is not a raster format")]
    NotRaster(&'static str),
}

/// Errors raised while loading TMS and pyramid descriptors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Descriptor could not be read
    #[error("Cannot read descriptor {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: IoError,
    },

    /// Descriptor is not valid JSON or misses required fields
    #[error("Cannot parse descriptor {path}: {message}")]
    Parse { path: String, message: String },

    /// Descriptor is well-formed but inconsistent
    #[error("Invalid descriptor {path}: {message}")]
    Invalid { path: String, message: String },

    /// Pyramid references a tile matrix set that was not loaded
    #[error("Pyramid {path} uses unknown TMS [{tms}]")]
    UnknownTms { path: String, tms: String },

    /// Level composition failed while building a broadcast pyramid
    #[error("Pyramid composition failed: {0}")]
    Composition(#[from] CompositionError),
}

/// Errors raised by a window or bbox retrieval
///
/// Every variant aborts the whole retrieval. Per-tile storage or decoding
/// failures never show up here: they are replaced by no-data tiles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrievalError {
    /// The window touches at least the configured maximum of tiles on one axis
    #[error("Too many tiles on {axis} axis: {count} (limit {limit})")]
    TooManyTiles {
        axis: char,
        count: i64,
        limit: u32,
    },

    /// The window touches no tile on one axis
    #[error("Empty window on {axis} axis")]
    EmptyWindow { axis: char },

    /// Reprojected sampling grid is unusable (failed or contains NaN)
    #[error("Invalid bbox: {0}")]
    InvalidBBox(String),

    /// The request bbox could not be reprojected into the native CRS
    #[error("Cannot reproject bbox from {from} to {to}")]
    ReprojectionFailed { from: String, to: String },

    /// The DPI scaling produced a non-numeric resolution
    #[error("Invalid DPI value {0}")]
    InvalidDpi(u32),

    /// The request bbox lies entirely outside the destination CRS domain
    #[error("Bbox is outside the definition area of {crs}")]
    OutOfCrsDomain { crs: String },

    /// The requested level is not part of the pyramid
    #[error("Unknown level {0}")]
    UnknownLevel(String),

    /// Requested output dimensions are zero
    #[error("Invalid output size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

/// Errors raised when assembling a broadcast pyramid from several sources
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    /// Sources disagree on TMS, format, photometric or channel count
    #[error("{field} has to be the same for all used pyramids ({expected} != {actual})")]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// A level id is supplied twice
    #[error("Level {0} is already present")]
    DuplicateLevel(String),

    /// The bottom level id is not in the source pyramid
    #[error("Bottom level {0} not found in the input pyramid")]
    BottomNotFound(String),

    /// The top level id is missing or finer than the bottom level
    #[error("Top level {0} not found in the input pyramid or lower than the bottom level")]
    TopNotFound(String),

    /// Nothing was composed
    #[error("Broadcast pyramid has no source")]
    NoSource,
}

/// Errors raised while encoding an output image
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// The output format cannot hold the image's channels
    #[error("Cannot encode {channels} channels as {format}")]
    UnsupportedChannels {
        format: &'static str,
        channels: usize,
    },

    /// The image encoder failed
    #[error("Failed to encode {format}: {message}")]
    Image {
        format: &'static str,
        message: String,
    },
}
