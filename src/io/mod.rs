mod file_reader;
mod range_reader;
mod s3_reader;

pub use file_reader::FileRangeReader;
pub use range_reader::{read_u32_le, RangeReader};
pub use s3_reader::{create_s3_client, S3RangeReader};
